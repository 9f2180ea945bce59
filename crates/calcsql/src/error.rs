//! Error types for calculation translation

use thiserror::Error;

/// Result type for calculation translation stages
pub type Result<T> = std::result::Result<T, CalcError>;

/// Errors that can occur while translating a calculation expression to SQL
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    /// Statement separator, comment, quoting trick or DML/DDL keyword outside of literals
    #[error("Unsafe calculation expression: {0}")]
    UnsafeExpression(String),

    /// Attribute name not found in entity generation
    #[error("Entity attribute not found: {0}")]
    UnknownAttribute(String),

    /// Parameter name not found or not a numeric scalar
    #[error("Model parameter not found or not a numeric scalar: {0}")]
    UnknownParameter(String),

    /// Simple and [base] / [variant] attribute forms used together
    #[error("Invalid or mixed forms of attribute names: {0}")]
    MixedReferenceForms(String),

    /// Parameter form does not match run comparison
    #[error("Invalid form of parameter name: {0}")]
    InvalidParameterForm(String),

    #[error("No entity attributes found in calculation expression")]
    NoAttributesFound,

    #[error("Malformed calculation expression: {0}")]
    MalformedExpression(String),

    #[error("Group by attribute not found: {0}")]
    GroupByAttributeNotFound(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid run id set: {0}")]
    InvalidRunSet(String),

    #[error("Invalid order by: {0}")]
    InvalidOrderBy(String),

    #[error("Failed to format SQL")]
    Format(#[from] std::fmt::Error),

    /// Inconsistent model metadata
    #[error("Metadata error: {0}")]
    Metadata(String),
}

/// Translation failure with the entity and source expression attached
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} (entity: {entity}, expression: {expr})")]
pub struct TranslateError {
    pub entity: String,
    pub expr: String,
    #[source]
    pub kind: CalcError,
}

impl TranslateError {
    pub fn new(entity: impl Into<String>, expr: impl Into<String>, kind: CalcError) -> Self {
        Self {
            entity: entity.into(),
            expr: expr.into(),
            kind,
        }
    }

    pub fn kind(&self) -> &CalcError {
        &self.kind
    }
}
