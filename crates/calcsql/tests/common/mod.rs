#![allow(dead_code)]

use calcsql::{CalcLayout, MicroTranslator, ModelMeta, ReadLayout, TranslateError};

pub const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/person.json");

pub const CALC_ID: i32 = 12001;
pub const FROM_ID: i32 = 219;

/// Calculation from a query file
///
/// Lines starting with # are comments, except for directives:
///
/// ```text
/// # group_by: Sex, AgeGroup
/// # run_ids: 221, 222
/// # error: MixedReferenceForms
/// ```
#[derive(Debug, Default)]
pub struct QueryCase {
    pub expr: String,
    pub group_by: Vec<String>,
    pub run_ids: Vec<i32>,
    pub error: Option<String>,
}

/// Strip comments starting with # from the query
pub fn strip_comments(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

pub fn parse_case(content: &str) -> QueryCase {
    let mut case = QueryCase {
        expr: strip_comments(content),
        ..Default::default()
    };

    for line in content.lines() {
        let Some(directive) = line.trim_start().strip_prefix('#') else {
            continue;
        };
        let Some((key, value)) = directive.split_once(':') else {
            continue;
        };
        let items = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match key.trim() {
            "group_by" => case.group_by = items.map(String::from).collect(),
            "run_ids" => {
                case.run_ids = items
                    .map(|s| s.parse().expect("run id must be an integer"))
                    .collect()
            }
            "error" => case.error = Some(value.trim().to_string()),
            _ => {}
        }
    }
    case
}

pub fn model() -> ModelMeta {
    ModelMeta::from_json_file(FIXTURE).expect("fixture model must load")
}

pub fn calc(expr: &str) -> CalcLayout {
    CalcLayout {
        calculate: expr.to_string(),
        calc_id: CALC_ID,
        name: "Calc".to_string(),
    }
}

/// Translate with the first generation of Person
pub fn translate(
    model: &ModelMeta,
    read: &ReadLayout,
    expr: &str,
    group_by: &[&str],
    run_ids: &[i32],
) -> Result<String, TranslateError> {
    let entity = model.entity_by_name("Person").expect("Person entity");
    let generation = model
        .entity_gen(entity.entity_hid, None)
        .expect("Person generation");
    let group_by: Vec<String> = group_by.iter().map(|s| s.to_string()).collect();

    MicroTranslator::new(model, entity, generation).translate(read, &calc(expr), &group_by, run_ids)
}

pub fn translate_case(case: &QueryCase) -> Result<String, TranslateError> {
    let model = model();
    let read = ReadLayout {
        from_id: FROM_ID,
        ..Default::default()
    };
    let group_by: Vec<&str> = case.group_by.iter().map(String::as_str).collect();
    translate(&model, &read, &case.expr, &group_by, &case.run_ids)
}
