use calcsql::{CalcLayout, MicroTranslator, ModelMeta, ReadLayout};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/person.json");

/// Benchmark test case
struct BenchCase {
    name: &'static str,
    calculate: &'static str,
    group_by: &'static [&'static str],
    run_ids: &'static [i32],
}

fn get_test_cases() -> Vec<BenchCase> {
    vec![
        BenchCase {
            name: "avgIncome",
            calculate: "OM_AVG(Income)",
            group_by: &[],
            run_ids: &[],
        },
        BenchCase {
            name: "avgIncomeBySexAgeGroup",
            calculate: "OM_AVG(Income)",
            group_by: &["Sex", "AgeGroup"],
            run_ids: &[221, 222, 223],
        },
        BenchCase {
            name: "nestedSum",
            calculate: "OM_SUM(Income - 0.5 * OM_AVG(Pension))",
            group_by: &["Sex"],
            run_ids: &[],
        },
        BenchCase {
            name: "threeLevels",
            calculate: "OM_MAX(Income - OM_AVG(Salary - OM_MIN(Pension)))",
            group_by: &["AgeGroup"],
            run_ids: &[],
        },
        BenchCase {
            name: "variance",
            calculate: "OM_SD(Income) + OM_CV(Salary)",
            group_by: &["Sex"],
            run_ids: &[],
        },
        BenchCase {
            name: "macros",
            calculate: "OM_SUM(Income) / OM_DIV_BY(OM_COUNT_IF(OM_IF(Age > 17 THEN Income ELSE 0) > 0))",
            group_by: &[],
            run_ids: &[],
        },
        BenchCase {
            name: "parameters",
            calculate: "OM_AVG(Salary * param.BaseSalary + Pension * param.PensionRate)",
            group_by: &["Sex"],
            run_ids: &[221],
        },
        BenchCase {
            name: "runComparison",
            calculate: "OM_AVG(Income[variant] - (Pension[base] + Salary[base]))",
            group_by: &["Sex", "AgeGroup"],
            run_ids: &[221, 222, 223, 224],
        },
    ]
}

fn bench_translate(c: &mut Criterion) {
    let model = ModelMeta::from_json_file(FIXTURE)
        .unwrap_or_else(|e| panic!("Failed to load model fixture: {:#}", e));
    let entity = model.entity_by_name("Person").unwrap();
    let generation = model.entity_gen(entity.entity_hid, None).unwrap();
    let translator = MicroTranslator::new(&model, entity, generation);

    let read = ReadLayout {
        from_id: 219,
        ..Default::default()
    };

    let mut group = c.benchmark_group("calcsql");
    group.measurement_time(Duration::from_secs(5));

    for case in get_test_cases() {
        let calc = CalcLayout {
            calculate: case.calculate.to_string(),
            calc_id: 12001,
            name: case.name.to_string(),
        };
        let group_by: Vec<String> = case.group_by.iter().map(|s| s.to_string()).collect();

        if let Err(e) = translator.translate(&read, &calc, &group_by, case.run_ids) {
            eprintln!("Skipping {}: {}", case.name, e);
            continue;
        }

        group.bench_with_input(BenchmarkId::new("translate", case.name), &calc, |b, calc| {
            b.iter(|| {
                translator
                    .translate(black_box(&read), black_box(calc), &group_by, case.run_ids)
                    .ok()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_translate);
criterion_main!(benches);
