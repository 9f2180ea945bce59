use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use calcsql::{micro_calc_to_sql, CalcLayout, ModelMeta, ReadLayout, TranslateOptions};

const FROM_ID: i32 = 219;
const CALC_ID: i32 = 12001;

/// Calculation and directives of a golden query file
#[derive(Default)]
struct Case {
    expr: String,
    group_by: Vec<String>,
    run_ids: Vec<i32>,
}

/// Strip comments starting with # from the query
fn strip_comments(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn parse_case(content: &str) -> Result<Case> {
    let mut case = Case {
        expr: strip_comments(content),
        ..Default::default()
    };

    for line in content.lines() {
        let Some((key, value)) = line
            .trim_start()
            .strip_prefix('#')
            .and_then(|d| d.split_once(':'))
        else {
            continue;
        };
        let items = value.split(',').map(str::trim).filter(|s| !s.is_empty());

        match key.trim() {
            "group_by" => case.group_by = items.map(String::from).collect(),
            "run_ids" => {
                case.run_ids = items
                    .map(|s| s.parse().with_context(|| format!("Invalid run id: {}", s)))
                    .collect::<Result<_>>()?
            }
            _ => {}
        }
    }
    Ok(case)
}

fn main() -> Result<()> {
    let queries_dir = Path::new("crates/calcsql/queries/golden");
    let model = ModelMeta::from_json_file("crates/calcsql/tests/fixtures/person.json")?;
    let read = ReadLayout {
        from_id: FROM_ID,
        ..Default::default()
    };
    let options = TranslateOptions::default();

    let entries = fs::read_dir(queries_dir)
        .with_context(|| format!("Failed to read {}", queries_dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) != Some("calc") {
            continue;
        }

        let case = parse_case(&fs::read_to_string(&path)?)?;
        if case.expr.is_empty() {
            continue;
        }
        let calc = CalcLayout {
            calculate: case.expr,
            calc_id: CALC_ID,
            name: "Calc".to_string(),
        };

        match micro_calc_to_sql(
            &model,
            "Person",
            None,
            &read,
            &calc,
            &case.group_by,
            &case.run_ids,
            &options,
        ) {
            Ok(sql) => {
                let sql_path = path.with_extension("sql");
                fs::write(&sql_path, format!("{}\n", sql))?;
                println!("Generated: {}", sql_path.display());
            }
            Err(e) => {
                eprintln!("Error converting {}: {:#}", path.display(), e);
            }
        }
    }
    Ok(())
}
