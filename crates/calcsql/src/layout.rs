/// Request layouts: what to read, how to filter and order it, and what to calculate
use serde::{Deserialize, Serialize};
use std::fmt;

/// Read layout for microdata calculation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadLayout {
    /// Run id to read from; the base run of a run comparison
    pub from_id: i32,
    /// Filters by enum codes or numeric values
    #[serde(default)]
    pub filter: Vec<FilterColumn>,
    /// Filters by enum ids
    #[serde(default)]
    pub filter_by_id: Vec<FilterIdColumn>,
    /// Explicit ORDER BY, default is run id, calc id, group by columns
    #[serde(default)]
    pub order_by: Vec<OrderByColumn>,
}

/// Calculation to perform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalcLayout {
    /// Calculation expression, e.g. OM_AVG(Income)
    pub calculate: String,
    /// Calculation id, returned as calc_id column
    pub calc_id: i32,
    /// Calculation name, value filters refer to it
    #[serde(default)]
    pub name: String,
}

/// Filter operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    /// IN for multiple values, = for a single value
    InAuto,
    Between,
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOp::Eq => write!(f, "="),
            FilterOp::Ne => write!(f, "<>"),
            FilterOp::Gt => write!(f, ">"),
            FilterOp::Ge => write!(f, ">="),
            FilterOp::Lt => write!(f, "<"),
            FilterOp::Le => write!(f, "<="),
            FilterOp::In | FilterOp::InAuto => write!(f, "IN"),
            FilterOp::Between => write!(f, "BETWEEN"),
        }
    }
}

/// Filter by attribute (or calculation) name with values as text:
/// enum codes for classification attributes, numbers otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterColumn {
    pub name: String,
    pub op: FilterOp,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Filter by attribute name with enum ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterIdColumn {
    pub name: String,
    pub op: FilterOp,
    #[serde(default)]
    pub enum_ids: Vec<i32>,
}

/// One-based result column position and direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByColumn {
    pub index_one: usize,
    #[serde(default)]
    pub is_desc: bool,
}

impl FilterColumn {
    pub fn new(name: impl Into<String>, op: FilterOp, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            op,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}
