/// Abstract Syntax Tree (AST) definitions for calculation expressions
///
/// A calculation expression aggregates entity attributes, for example:
/// OM_AVG( Income[variant] - (Pension[base] + Salary[base]) )
use std::fmt;

/// Expression types
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal, kept as source text
    Number(String),
    /// String literal, unescaped value
    String(String),
    Null,
    /// Entity attribute: Name, Name[base], Name[variant]
    Attribute(Reference),
    /// Model parameter: param.Name, param.Name[base], param.Name[variant]
    Parameter(Reference),
    /// Parenthesised expression, rendered with its parentheses
    Nested(Box<Expr>),
    /// Unary operation (e.g., -x, NOT x)
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
    /// Binary operation (e.g., a + b, x > 5, a AND b)
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// expr IS [NOT] NULL
    IsNull { expr: Box<Expr>, negated: bool },
    /// CASE WHEN cond THEN value ... [ELSE other] END
    Case {
        branches: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
    /// Function call: aggregate or scalar
    Call { func: Function, args: Vec<Expr> },
}

/// Form of attribute or parameter reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RefForm {
    /// Name
    Simple,
    /// Name[base]
    Base,
    /// Name[variant]
    Variant,
}

impl fmt::Display for RefForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefForm::Simple => Ok(()),
            RefForm::Base => write!(f, "[base]"),
            RefForm::Variant => write!(f, "[variant]"),
        }
    }
}

/// Attribute or parameter reference
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub name: String,
    pub form: RefForm,
}

impl Reference {
    pub fn new(name: impl Into<String>, form: RefForm) -> Self {
        Self {
            name: name.into(),
            form,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.form)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    Minus,
    Plus,
    Not,
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOperator::Minus => write!(f, "-"),
            UnaryOperator::Plus => write!(f, "+"),
            UnaryOperator::Not => write!(f, "NOT "),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOperator::Add => write!(f, "+"),
            BinaryOperator::Sub => write!(f, "-"),
            BinaryOperator::Mul => write!(f, "*"),
            BinaryOperator::Div => write!(f, "/"),
            BinaryOperator::Eq => write!(f, "="),
            BinaryOperator::NotEq => write!(f, "<>"),
            BinaryOperator::Gt => write!(f, ">"),
            BinaryOperator::Gte => write!(f, ">="),
            BinaryOperator::Lt => write!(f, "<"),
            BinaryOperator::Lte => write!(f, "<="),
            BinaryOperator::And => write!(f, "AND"),
            BinaryOperator::Or => write!(f, "OR"),
        }
    }
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    Avg,
    Sum,
    Count,
    CountIf,
    Min,
    Max,
    Var,
    Sd,
    Se,
    Cv,
}

impl Aggregate {
    /// Aggregates of attribute values, as opposed to counts of conditions
    pub fn is_value_aggregate(&self) -> bool {
        !matches!(self, Aggregate::Count | Aggregate::CountIf)
    }
}

/// Scalar SQL functions allowed in calculations
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Abs,
    Sqrt,
    Exp,
    Ln,
    Log,
    Log10,
    Power,
    Round,
    Floor,
    Ceiling,
    Sign,
    Mod,
    Coalesce,
    NullIf,
}

impl Scalar {
    pub fn sql_name(&self) -> &'static str {
        match self {
            Scalar::Abs => "ABS",
            Scalar::Sqrt => "SQRT",
            Scalar::Exp => "EXP",
            Scalar::Ln => "LN",
            Scalar::Log => "LOG",
            Scalar::Log10 => "LOG10",
            Scalar::Power => "POWER",
            Scalar::Round => "ROUND",
            Scalar::Floor => "FLOOR",
            Scalar::Ceiling => "CEILING",
            Scalar::Sign => "SIGN",
            Scalar::Mod => "MOD",
            Scalar::Coalesce => "COALESCE",
            Scalar::NullIf => "NULLIF",
        }
    }

    /// Minimum and maximum number of arguments
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Scalar::Power | Scalar::Mod | Scalar::NullIf => (2, 2),
            Scalar::Round | Scalar::Log => (1, 2),
            Scalar::Coalesce => (1, usize::MAX),
            _ => (1, 1),
        }
    }
}

/// Function called in a calculation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Function {
    Aggregate(Aggregate),
    Scalar(Scalar),
}

impl Function {
    /// Classify a function name, None if the function is not supported
    pub fn from_name(name: &str) -> Option<Function> {
        let f = match name.to_ascii_uppercase().as_str() {
            "OM_AVG" | "AVG" => Function::Aggregate(Aggregate::Avg),
            "OM_SUM" | "SUM" => Function::Aggregate(Aggregate::Sum),
            "OM_COUNT" | "COUNT" => Function::Aggregate(Aggregate::Count),
            "OM_COUNT_IF" => Function::Aggregate(Aggregate::CountIf),
            "OM_MIN" | "MIN" => Function::Aggregate(Aggregate::Min),
            "OM_MAX" | "MAX" => Function::Aggregate(Aggregate::Max),
            "OM_VAR" => Function::Aggregate(Aggregate::Var),
            "OM_SD" => Function::Aggregate(Aggregate::Sd),
            "OM_SE" => Function::Aggregate(Aggregate::Se),
            "OM_CV" => Function::Aggregate(Aggregate::Cv),
            "ABS" => Function::Scalar(Scalar::Abs),
            "SQRT" => Function::Scalar(Scalar::Sqrt),
            "EXP" => Function::Scalar(Scalar::Exp),
            "LN" => Function::Scalar(Scalar::Ln),
            "LOG" => Function::Scalar(Scalar::Log),
            "LOG10" => Function::Scalar(Scalar::Log10),
            "POWER" => Function::Scalar(Scalar::Power),
            "ROUND" => Function::Scalar(Scalar::Round),
            "FLOOR" => Function::Scalar(Scalar::Floor),
            "CEILING" => Function::Scalar(Scalar::Ceiling),
            "SIGN" => Function::Scalar(Scalar::Sign),
            "MOD" => Function::Scalar(Scalar::Mod),
            "COALESCE" => Function::Scalar(Scalar::Coalesce),
            "NULLIF" => Function::Scalar(Scalar::NullIf),
            _ => return None,
        };
        Some(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_names() {
        assert_eq!(
            Function::from_name("om_avg"),
            Some(Function::Aggregate(Aggregate::Avg))
        );
        assert_eq!(
            Function::from_name("AVG"),
            Some(Function::Aggregate(Aggregate::Avg))
        );
        assert_eq!(
            Function::from_name("Sqrt"),
            Some(Function::Scalar(Scalar::Sqrt))
        );
        assert_eq!(Function::from_name("SLEEP"), None);
    }

    #[test]
    fn test_reference_display() {
        assert_eq!(Reference::new("Income", RefForm::Base).to_string(), "Income[base]");
        assert_eq!(Reference::new("Income", RefForm::Simple).to_string(), "Income");
    }
}
