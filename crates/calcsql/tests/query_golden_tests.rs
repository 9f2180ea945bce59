mod common;

use common::{parse_case, translate_case};
use test_each_file::test_each_file;

test_each_file! { for ["calc", "sql"] in "./crates/calcsql/queries/golden" => test_golden }

fn test_golden([input, expected]: [&str; 2]) {
    let case = parse_case(input);
    let sql = translate_case(&case).unwrap();

    assert_eq!(sql.trim_end(), expected.trim_end(), "Expression: {}", case.expr);
}
