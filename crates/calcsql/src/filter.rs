/// Read layout filters
///
/// Filters on entity attributes restrict the entity rows read by attribute CTEs.
/// Filters on the calculation name restrict calculated values in the outer query.
/// Filter values never reach SQL as free text: enum codes are converted to enum ids,
/// booleans to 1 or 0 and numbers are checked to be finite numeric literals.
use crate::catalog::AggregationCatalog;
use crate::error::{CalcError, Result};
use crate::layout::{FilterOp, ReadLayout};
use crate::level::CALC_VALUE;
use crate::meta::{ModelMeta, TypeKind, TypeMeta};

/// Filter predicates ready to be joined with AND
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filters {
    /// Predicates on entity table alias E
    pub dimension: Vec<String>,
    /// Predicates on the outer query alias A
    pub value: Vec<String>,
}

/// Split and translate layout filters
pub fn build_filters(
    read: &ReadLayout,
    calc_name: &str,
    attrs: &AggregationCatalog,
    model: &ModelMeta,
) -> Result<Filters> {
    let mut filters = Filters::default();

    for f in &read.filter {
        if !calc_name.is_empty() && f.name == calc_name {
            let values = f
                .values
                .iter()
                .map(|v| numeric_operand(v, &f.name))
                .collect::<Result<Vec<_>>>()?;
            filters.value.push(predicate(
                &format!("A.{}", CALC_VALUE),
                f.op,
                &values,
                &f.name,
            )?);
            continue;
        }

        let col = attrs
            .by_name(&f.name)
            .ok_or_else(|| CalcError::UnknownAttribute(format!("filter by {}", f.name)))?;
        let kind = type_of(model, col.type_id, &f.name)?;

        let values = f
            .values
            .iter()
            .map(|v| attribute_operand(kind, v, &f.name))
            .collect::<Result<Vec<_>>>()?;
        filters.dimension.push(predicate(
            &format!("E.{}", col.col_name),
            f.op,
            &values,
            &f.name,
        )?);
    }

    for f in &read.filter_by_id {
        let col = attrs
            .by_name(&f.name)
            .ok_or_else(|| CalcError::UnknownAttribute(format!("filter by {}", f.name)))?;
        let kind = type_of(model, col.type_id, &f.name)?;
        if kind.kind != TypeKind::Enum && kind.kind != TypeKind::Bool {
            return Err(CalcError::InvalidFilter(format!(
                "filter by enum id on non-enum attribute {}",
                f.name
            )));
        }

        let values: Vec<String> = f.enum_ids.iter().map(|id| id.to_string()).collect();
        filters.dimension.push(predicate(
            &format!("E.{}", col.col_name),
            f.op,
            &values,
            &f.name,
        )?);
    }

    Ok(filters)
}

fn type_of<'a>(model: &'a ModelMeta, type_id: i32, name: &str) -> Result<&'a TypeMeta> {
    model.type_by_id(type_id).ok_or_else(|| {
        CalcError::Metadata(format!("type id {} of attribute {} not found", type_id, name))
    })
}

/// Operand for an attribute of the given type
fn attribute_operand(t: &TypeMeta, value: &str, name: &str) -> Result<String> {
    let v = value.trim();
    match t.kind {
        TypeKind::Enum => t.enum_id_by_code(v).map(|id| id.to_string()).ok_or_else(|| {
            CalcError::InvalidFilter(format!("invalid value {} of {}", v, name))
        }),
        TypeKind::Bool => match v.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok("1".to_string()),
            "false" | "0" => Ok("0".to_string()),
            _ => Err(CalcError::InvalidFilter(format!(
                "invalid boolean value {} of {}",
                v, name
            ))),
        },
        TypeKind::Float | TypeKind::Int => numeric_operand(v, name),
        TypeKind::Other => Err(CalcError::InvalidFilter(format!(
            "filter by attribute {} of type {} is not supported",
            name, t.name
        ))),
    }
}

/// Finite numeric literal, returned as trimmed text
fn numeric_operand(value: &str, name: &str) -> Result<String> {
    let v = value.trim();
    let is_literal = !v.is_empty()
        && v.chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        && v.parse::<f64>().map(|x| x.is_finite()).unwrap_or(false);
    if is_literal {
        Ok(v.to_string())
    } else {
        Err(CalcError::InvalidFilter(format!(
            "invalid numeric value {} of {}",
            v, name
        )))
    }
}

fn predicate(col: &str, op: FilterOp, values: &[String], name: &str) -> Result<String> {
    let count_error = || {
        CalcError::InvalidFilter(format!(
            "invalid number of values for {} filter on {}: {}",
            op,
            name,
            values.len()
        ))
    };

    match op {
        FilterOp::Eq | FilterOp::Ne | FilterOp::Gt | FilterOp::Ge | FilterOp::Lt | FilterOp::Le => {
            let [v] = values else {
                return Err(count_error());
            };
            Ok(format!("{} {} {}", col, op, v))
        }
        FilterOp::InAuto if values.len() == 1 => Ok(format!("{} = {}", col, values[0])),
        FilterOp::In | FilterOp::InAuto => {
            if values.is_empty() {
                return Err(count_error());
            }
            Ok(format!("{} IN ({})", col, values.join(", ")))
        }
        FilterOp::Between => {
            let [lo, hi] = values else {
                return Err(count_error());
            };
            Ok(format!("{} BETWEEN {} AND {}", col, lo, hi))
        }
    }
}
