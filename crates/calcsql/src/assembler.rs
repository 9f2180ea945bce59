/// Nested query assembly
///
/// Levels are rendered from the outermost down. Every level selects run id, group by
/// columns and its expressions from the aggregation source, joins its parameter CTEs
/// and the next inner level, and groups by run id and group by columns.
use std::fmt::Write;

use crate::catalog::AggregationCatalog;
use crate::error::{CalcError, Result};
use crate::layout::OrderByColumn;
use crate::level::{Level, Levels};

/// Render the nested aggregation query without the WITH clause
pub fn nested_query(levels: &Levels, attrs: &AggregationCatalog, source: &str) -> Result<String> {
    let group: Vec<&str> = attrs.group_columns().map(|c| c.col_name.as_str()).collect();
    let outer_first: Vec<&Level> = levels.iter().rev().collect();

    let mut sql = String::new();
    render_level(&mut sql, &outer_first, &group, source)?;
    Ok(sql)
}

fn render_level(sql: &mut String, levels: &[&Level], group: &[&str], source: &str) -> Result<()> {
    let Some((lvl, inner)) = levels.split_first() else {
        return Ok(());
    };
    let a = lvl.from_alias();

    write!(sql, "SELECT {a}.run_id")?;
    for g in group {
        write!(sql, ", {a}.{g}")?;
    }
    for e in &lvl.exprs {
        write!(sql, ", {} AS {}", e.sql, e.output_name())?;
    }
    write!(sql, "\nFROM {source} {a}")?;

    for join in lvl.joins.values() {
        write!(sql, "\n{join}")?;
    }

    if let Some(next) = inner.first() {
        let ia = next.inner_alias().unwrap_or_default();
        sql.push_str("\nINNER JOIN\n(\n");
        render_level(sql, inner, group, source)?;
        write!(sql, "\n) {ia} ON ({ia}.run_id = {a}.run_id")?;
        for g in group {
            write!(sql, " AND {ia}.{g} = {a}.{g}")?;
        }
        sql.push(')');
    }

    write!(sql, "\nGROUP BY {a}.run_id")?;
    for g in group {
        write!(sql, ", {a}.{g}")?;
    }
    Ok(())
}

/// Wrap the nested query: select run id, calculation id, group by columns and value
pub fn outer_query(
    nested: &str,
    attrs: &AggregationCatalog,
    calc_id: i32,
    value_filter: &[String],
    order_by: &[OrderByColumn],
) -> Result<String> {
    let group: Vec<&str> = attrs.group_columns().map(|c| c.col_name.as_str()).collect();

    let mut sql = format!("SELECT A.run_id, {} AS calc_id", calc_id);
    for g in &group {
        write!(sql, ", A.{g}")?;
    }
    write!(sql, ", A.calc_value\nFROM\n(\n{nested}\n) A")?;

    for (k, p) in value_filter.iter().enumerate() {
        write!(sql, "\n{} {}", if k == 0 { "WHERE" } else { "AND" }, p)?;
    }

    write!(sql, "\nORDER BY {}", order_by_list(order_by, group.len())?)?;
    Ok(sql)
}

/// Explicit ORDER BY positions or run id, calculation id and group by columns
fn order_by_list(order_by: &[OrderByColumn], group_count: usize) -> Result<String> {
    // run_id, calc_id, group columns, calc_value
    let column_count = group_count + 3;

    if order_by.is_empty() {
        return Ok((1..=group_count + 2)
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(", "));
    }

    let items = order_by
        .iter()
        .map(|o| {
            if o.index_one == 0 || o.index_one > column_count {
                return Err(CalcError::InvalidOrderBy(format!(
                    "order by column position out of range: {}",
                    o.index_one
                )));
            }
            Ok(if o.is_desc {
                format!("{} DESC", o.index_one)
            } else {
                o.index_one.to_string()
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_by_list() {
        assert_eq!(order_by_list(&[], 1).unwrap(), "1, 2, 3");
        assert_eq!(
            order_by_list(
                &[
                    OrderByColumn {
                        index_one: 4,
                        is_desc: true
                    },
                    OrderByColumn {
                        index_one: 1,
                        is_desc: false
                    }
                ],
                1
            )
            .unwrap(),
            "4 DESC, 1"
        );
        assert!(order_by_list(
            &[OrderByColumn {
                index_one: 5,
                is_desc: false
            }],
            1
        )
        .is_err());
    }
}
