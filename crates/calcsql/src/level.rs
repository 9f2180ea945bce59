/// Aggregation level planner
///
/// Each aggregate nested inside another aggregate is evaluated one level deeper and
/// joined back to its parent by run id and group by columns. Level 0 is the outermost
/// SELECT and reads from alias M1, level d reads from `M<d+1>` and is joined into level
/// d-1 as `L<d>A1`. Hoisted aggregates become columns `ex1`, `ex2`, ... numbered in
/// the order they are planned, the outermost expression is always `calc_value`.
///
/// For example, OM_SUM(Income - 0.5 * OM_AVG(Pension)) is planned as:
///
/// ```text
/// level 1:  AVG(M2.attrPension) AS ex1
/// level 0:  SUM(M1.attrIncome - 0.5 * L1A1.ex1) AS calc_value
/// ```
use std::collections::BTreeMap;

use tracing::trace;

use crate::ast::{Aggregate, Expr, Function, UnaryOperator};
use crate::error::{CalcError, Result};
use crate::resolver::{AttributeResolver, ParameterResolver, Usage};

/// Column name of the outermost expression
pub const CALC_VALUE: &str = "calc_value";

/// Source table alias of the level at `depth`
pub fn from_alias(depth: usize) -> String {
    format!("M{}", depth + 1)
}

/// Alias of the level at `depth` when joined into its parent
pub fn inner_alias(depth: usize) -> String {
    format!("L{}A1", depth)
}

/// SQL expression of a level, the outermost expression has no name
#[derive(Debug, Clone, PartialEq)]
pub struct LevelExpr {
    pub sql: String,
    pub name: String,
}

impl LevelExpr {
    /// Column alias in the level SELECT
    pub fn output_name(&self) -> &str {
        if self.name.is_empty() {
            CALC_VALUE
        } else {
            &self.name
        }
    }
}

/// One SELECT ... GROUP BY of the nested query
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Level {
    pub depth: usize,
    pub exprs: Vec<LevelExpr>,
    /// Parameter CTE name => join clause
    pub joins: BTreeMap<String, String>,
    aggregates: usize,
}

impl Level {
    fn new(depth: usize) -> Self {
        Level {
            depth,
            ..Default::default()
        }
    }

    pub fn from_alias(&self) -> String {
        from_alias(self.depth)
    }

    /// Alias in the parent level, None for the outermost level
    pub fn inner_alias(&self) -> Option<String> {
        (self.depth > 0).then(|| inner_alias(self.depth))
    }
}

/// Planned levels, innermost first
///
/// Depths are contiguous down to 0, inner levels have only named expressions and
/// the outermost level has exactly one unnamed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Levels(Vec<Level>);

impl Levels {
    pub fn new(levels: Vec<Level>) -> Result<Self> {
        let n = levels.len();
        if n == 0 {
            return Err(CalcError::MalformedExpression(
                "calculation has no aggregation levels".to_string(),
            ));
        }
        for (k, lvl) in levels[..n - 1].iter().enumerate() {
            if lvl.depth != n - 1 - k
                || lvl.exprs.is_empty()
                || lvl.exprs.iter().any(|e| e.name.is_empty())
            {
                return Err(CalcError::MalformedExpression(format!(
                    "invalid aggregation level at depth {}",
                    lvl.depth
                )));
            }
        }
        let top = &levels[n - 1];
        if top.depth != 0 || top.exprs.len() != 1 || !top.exprs[0].name.is_empty() {
            return Err(CalcError::MalformedExpression(
                "outermost level must have one calculation value".to_string(),
            ));
        }
        Ok(Levels(levels))
    }

    /// Levels from innermost to outermost
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Level> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn outermost(&self) -> &Level {
        &self.0[self.0.len() - 1]
    }

    /// Parameter CTE names joined at any level
    pub fn joined_ctes(&self) -> impl Iterator<Item = &String> {
        self.0.iter().flat_map(|l| l.joins.keys())
    }
}

/// Result of planning one calculation
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub levels: Levels,
    pub attr_usage: Vec<Usage>,
    pub param_usage: Vec<Usage>,
}

/// Split an expression into aggregation levels
pub struct LevelPlanner<'a> {
    attrs: &'a dyn AttributeResolver,
    params: &'a dyn ParameterResolver,
    epsilon: f64,
    levels: Vec<Level>,
    next_expr: usize,
    attr_usage: Vec<Usage>,
    param_usage: Vec<Usage>,
}

impl<'a> LevelPlanner<'a> {
    /// `epsilon` is the near-zero bound of the coefficient of variation divisor
    pub fn new(
        attrs: &'a dyn AttributeResolver,
        params: &'a dyn ParameterResolver,
        epsilon: f64,
    ) -> Self {
        LevelPlanner {
            attrs,
            params,
            epsilon,
            levels: Vec::new(),
            next_expr: 0,
            attr_usage: Vec::new(),
            param_usage: Vec::new(),
        }
    }

    pub fn plan(mut self, expr: &Expr) -> Result<Plan> {
        self.level_mut(0);
        let sql = self.render(expr, 0, false)?;

        if self.levels[0].aggregates == 0 {
            return Err(CalcError::MalformedExpression(
                "calculation must contain an aggregate function".to_string(),
            ));
        }
        self.levels[0].exprs.push(LevelExpr {
            sql,
            name: String::new(),
        });
        trace!(levels = self.levels.len(), "planned aggregation levels");

        let mut levels = self.levels;
        levels.reverse();
        Ok(Plan {
            levels: Levels::new(levels)?,
            attr_usage: self.attr_usage,
            param_usage: self.param_usage,
        })
    }

    fn level_mut(&mut self, depth: usize) -> &mut Level {
        while self.levels.len() <= depth {
            let d = self.levels.len();
            self.levels.push(Level::new(d));
        }
        &mut self.levels[depth]
    }

    /// Render expression at `depth`, `in_aggr` is true inside of aggregate argument
    fn render(&mut self, expr: &Expr, depth: usize, in_aggr: bool) -> Result<String> {
        match expr {
            Expr::Number(n) => Ok(n.clone()),
            Expr::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
            Expr::Null => Ok("NULL".to_string()),

            Expr::Attribute(r) => {
                if !in_aggr {
                    return Err(CalcError::MalformedExpression(format!(
                        "attribute {} must be inside of aggregate function",
                        r
                    )));
                }
                let resolved = self.attrs.resolve_attribute(r, &from_alias(depth))?;
                self.attr_usage.push(Usage::from(&resolved));
                Ok(resolved.sql)
            }

            Expr::Parameter(r) => {
                if !in_aggr {
                    return Err(CalcError::MalformedExpression(format!(
                        "parameter {} must be inside of aggregate function",
                        r
                    )));
                }
                let resolved = self.params.resolve_parameter(r, &from_alias(depth))?;
                self.param_usage.push(Usage::from(&resolved));
                self.level_mut(depth)
                    .joins
                    .insert(resolved.cte_name.clone(), resolved.join.clone());
                Ok(resolved.sql)
            }

            Expr::Nested(inner) => Ok(format!("({})", self.render(inner, depth, in_aggr)?)),

            Expr::UnaryOp { op, expr } => {
                let e = self.render(expr, depth, in_aggr)?;
                // a sign followed by a sign would render as a -- comment
                if matches!(op, UnaryOperator::Minus | UnaryOperator::Plus)
                    && e.starts_with(['-', '+'])
                {
                    Ok(format!("{}({})", op, e))
                } else {
                    Ok(format!("{}{}", op, e))
                }
            }

            Expr::BinaryOp { left, op, right } => {
                let l = self.render(left, depth, in_aggr)?;
                let r = self.render(right, depth, in_aggr)?;
                Ok(format!("{} {} {}", l, op, r))
            }

            Expr::IsNull { expr, negated } => {
                let e = self.render(expr, depth, in_aggr)?;
                if *negated {
                    Ok(format!("{} IS NOT NULL", e))
                } else {
                    Ok(format!("{} IS NULL", e))
                }
            }

            Expr::Case {
                branches,
                else_expr,
            } => {
                let mut sql = String::from("CASE");
                for (cond, value) in branches {
                    let c = self.render(cond, depth, in_aggr)?;
                    let v = self.render(value, depth, in_aggr)?;
                    sql.push_str(&format!(" WHEN {} THEN {}", c, v));
                }
                if let Some(e) = else_expr {
                    sql.push_str(&format!(" ELSE {}", self.render(e, depth, in_aggr)?));
                }
                sql.push_str(" END");
                Ok(sql)
            }

            Expr::Call {
                func: Function::Scalar(f),
                args,
            } => {
                let (min, max) = f.arity();
                if args.len() < min || args.len() > max {
                    return Err(CalcError::MalformedExpression(format!(
                        "invalid number of arguments of {}: {}",
                        f.sql_name(),
                        args.len()
                    )));
                }
                let args = args
                    .iter()
                    .map(|a| self.render(a, depth, in_aggr))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("{}({})", f.sql_name(), args.join(", ")))
            }

            Expr::Call {
                func: Function::Aggregate(agg),
                args,
            } => {
                let [arg] = args.as_slice() else {
                    return Err(CalcError::MalformedExpression(format!(
                        "aggregate function requires one argument, found: {}",
                        args.len()
                    )));
                };
                if in_aggr {
                    self.hoist(*agg, arg, depth + 1)
                } else {
                    self.render_aggregate(*agg, arg, depth)
                }
            }
        }
    }

    /// Plan aggregate at `depth` and return its reference from the parent level
    fn hoist(&mut self, agg: Aggregate, arg: &Expr, depth: usize) -> Result<String> {
        let sql = self.render_aggregate(agg, arg, depth)?;
        let alias = inner_alias(depth);

        let level = self.level_mut(depth);
        if let Some(e) = level.exprs.iter().find(|e| e.sql == sql) {
            return Ok(format!("{}.{}", alias, e.name));
        }

        self.next_expr += 1;
        let name = format!("ex{}", self.next_expr);
        self.levels[depth].exprs.push(LevelExpr {
            sql,
            name: name.clone(),
        });
        Ok(format!("{}.{}", alias, name))
    }

    fn render_aggregate(&mut self, agg: Aggregate, arg: &Expr, depth: usize) -> Result<String> {
        self.level_mut(depth).aggregates += 1;

        if agg.is_value_aggregate() {
            if let Expr::Attribute(r) = arg {
                let resolved = self.attrs.resolve_attribute(r, &from_alias(depth))?;
                if !resolved.is_aggr {
                    return Err(CalcError::MalformedExpression(format!(
                        "attribute {} is not numeric and cannot be aggregated",
                        r
                    )));
                }
            }
        }

        let x = self.render(arg, depth, true)?;
        let eps = self.epsilon;
        let sql = match agg {
            Aggregate::Avg => format!("AVG({x})"),
            Aggregate::Sum => format!("SUM({x})"),
            Aggregate::Count => format!("COUNT({x})"),
            Aggregate::Min => format!("MIN({x})"),
            Aggregate::Max => format!("MAX({x})"),
            Aggregate::CountIf => format!("COUNT(CASE WHEN {x} THEN 1 ELSE NULL END)"),
            Aggregate::Var => self.variance(arg, &x, depth)?,
            Aggregate::Sd => format!("SQRT({})", self.variance(arg, &x, depth)?),
            Aggregate::Se => format!("SQRT({} / COUNT({x}))", self.variance(arg, &x, depth)?),
            Aggregate::Cv => format!(
                "CASE WHEN ABS(AVG({x})) > {eps:e} THEN 100 * SQRT({var}) / AVG({x}) ELSE NULL END",
                var = self.variance(arg, &x, depth)?,
            ),
        };
        Ok(sql)
    }

    /// Sample variance of `x`, the mean is hoisted one level down
    fn variance(&mut self, arg: &Expr, x: &str, depth: usize) -> Result<String> {
        let m = self.hoist(Aggregate::Avg, arg, depth + 1)?;
        Ok(format!(
            "CASE WHEN COUNT({x}) > 1 THEN SUM(({x} - {m}) * ({x} - {m})) / (COUNT({x}) - 1) ELSE NULL END"
        ))
    }
}
