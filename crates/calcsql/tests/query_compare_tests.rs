mod common;

use common::{parse_case, translate_case};
use test_each_file::test_each_file;

test_each_file! { for ["calc"] in "./crates/calcsql/queries/compare" => test_run_comparison }

fn test_run_comparison([input]: [&str; 1]) {
    let case = parse_case(input);
    let result = translate_case(&case);

    assert!(
        result.is_ok(),
        "Failed to translate calculation: {}\nExpression: {}",
        result.unwrap_err(),
        case.expr
    );
    let sql = result.unwrap();

    let abase = sql.find("WITH abase (").expect("abase CTE first");
    let avar = sql.find(",\navar (").expect("avar CTE");
    let abv = sql.find(",\nabv (").expect("abv CTE");
    assert!(abase < avar && avar < abv);
    assert!(sql.contains("INNER JOIN avar V ON (V.entity_key = B.entity_key)"));
    assert!(sql.contains("FROM abv M1"));
    assert!(!sql.contains("atts"));
    assert!(!sql.contains("--"), "Comment in generated SQL: {}", sql);
}
