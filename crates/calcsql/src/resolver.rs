/// Name resolver contracts
///
/// The level planner translates every attribute and parameter reference through a
/// resolver. A resolver does not record anything: it returns the physical SQL
/// reference together with a usage record (catalog index and reference form), and
/// the caller folds the usage records into the catalogs after parsing.
use crate::ast::{RefForm, Reference};
use crate::error::Result;

/// Resolved entity attribute reference
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttribute {
    /// Index of the attribute in the aggregation catalog
    pub index: usize,
    pub form: RefForm,
    /// SQL column reference, e.g. M1.attr4 or M1.attr4_base
    pub sql: String,
    /// Attribute type is numeric and can be aggregated
    pub is_aggr: bool,
}

/// Resolved model parameter reference
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParameter {
    /// Index of the parameter in the parameter catalog
    pub index: usize,
    pub form: RefForm,
    /// SQL value reference, e.g. par_101.param_value
    pub sql: String,
    /// Name of the parameter CTE to join
    pub cte_name: String,
    /// Join clause attaching the parameter CTE to the level
    pub join: String,
}

/// Usage of a catalog entry in one reference form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Usage {
    pub index: usize,
    pub form: RefForm,
}

impl From<&ResolvedAttribute> for Usage {
    fn from(r: &ResolvedAttribute) -> Self {
        Usage {
            index: r.index,
            form: r.form,
        }
    }
}

impl From<&ResolvedParameter> for Usage {
    fn from(r: &ResolvedParameter) -> Self {
        Usage {
            index: r.index,
            form: r.form,
        }
    }
}

/// Translate attribute name and form into a column of the level source table
pub trait AttributeResolver {
    /// `alias` is the source table alias of the level where the reference appears
    fn resolve_attribute(&self, reference: &Reference, alias: &str) -> Result<ResolvedAttribute>;
}

/// Translate parameter name and form into a parameter CTE value and its join
pub trait ParameterResolver {
    /// `alias` is the source table alias of the level where the reference appears
    fn resolve_parameter(&self, reference: &Reference, alias: &str) -> Result<ResolvedParameter>;
}
