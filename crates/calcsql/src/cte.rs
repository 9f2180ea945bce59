/// Common table expressions of the calculation query
///
/// A single-run calculation reads entity attributes from `atts`, a run comparison
/// joins base run rows `abase` with variant run rows `avar` by entity key into `abv`.
/// Each referenced parameter has its own CTE: `par_<hid>` for simple references,
/// `pbase_<hid>` and `pvar_<hid>` for run comparison.
use std::fmt;

use crate::catalog::{AggregationCatalog, ParameterCatalog, ParameterColumn};
use crate::error::{CalcError, Result};
use crate::meta::EntityGenMeta;

/// Base run id followed by distinct variant run ids
#[derive(Debug, Clone, PartialEq)]
pub struct RunSet {
    ids: Vec<i32>,
}

impl RunSet {
    /// `from_id` is the base run, duplicates are dropped keeping first occurrence
    pub fn new(from_id: i32, run_ids: &[i32]) -> Result<Self> {
        let mut ids = Vec::with_capacity(run_ids.len() + 1);
        for id in std::iter::once(&from_id).chain(run_ids) {
            if *id <= 0 {
                return Err(CalcError::InvalidRunSet(format!("invalid run id: {}", id)));
            }
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        Ok(RunSet { ids })
    }

    pub fn from_id(&self) -> i32 {
        self.ids[0]
    }

    pub fn all(&self) -> &[i32] {
        &self.ids
    }

    pub fn variants(&self) -> &[i32] {
        &self.ids[1..]
    }

    fn list(ids: &[i32]) -> String {
        ids.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Named subquery of the WITH clause
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub columns: Vec<String>,
    pub body: String,
}

impl fmt::Display for Cte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) AS\n(\n{}\n)",
            self.name,
            self.columns.join(", "),
            self.body
        )
    }
}

/// Entity attribute CTEs
#[derive(Debug, Clone, PartialEq)]
pub enum AttrCtes {
    Single { atts: Cte },
    Compare { abase: Cte, avar: Cte, abv: Cte },
}

impl AttrCtes {
    /// Aggregation source of the nested query
    pub fn source(&self) -> &str {
        match self {
            AttrCtes::Single { atts } => &atts.name,
            AttrCtes::Compare { abv, .. } => &abv.name,
        }
    }

    fn into_vec(self) -> Vec<Cte> {
        match self {
            AttrCtes::Single { atts } => vec![atts],
            AttrCtes::Compare { abase, avar, abv } => vec![abase, avar, abv],
        }
    }
}

/// WITH clause: attribute CTEs followed by parameter CTEs
#[derive(Debug, Clone, PartialEq)]
pub struct CteList {
    ctes: Vec<Cte>,
}

impl CteList {
    pub fn new(attrs: AttrCtes, params: Vec<Cte>) -> Self {
        let mut ctes = attrs.into_vec();
        ctes.extend(params);
        CteList { ctes }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ctes.iter().map(|c| c.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cte> {
        self.ctes.iter()
    }
}

impl fmt::Display for CteList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WITH ")?;
        for (k, cte) in self.ctes.iter().enumerate() {
            if k > 0 {
                writeln!(f, ",")?;
            }
            write!(f, "{}", cte)?;
        }
        Ok(())
    }
}

/// Build entity attribute CTEs
///
/// `dim_filter` are predicates on entity table alias E, applied to all runs of a
/// single-run calculation and to variant runs of a run comparison.
pub fn attribute_ctes(
    generation: &EntityGenMeta,
    attrs: &AggregationCatalog,
    runs: &RunSet,
    is_compare: bool,
    dim_filter: &[String],
    run_entity_table: &str,
) -> AttrCtes {
    let select = |cols: &[&str], where_run: String, filtered: bool| {
        let mut sql = String::from("SELECT RE.run_id, E.entity_key");
        for c in cols {
            sql.push_str(&format!(", E.{}", c));
        }
        sql.push_str(&format!(
            "\nFROM {} E\nINNER JOIN {} RE ON (RE.base_run_id = E.run_id AND RE.entity_gen_hid = {})\nWHERE {}",
            generation.db_entity_table, run_entity_table, generation.gen_hid, where_run
        ));
        if filtered {
            for p in dim_filter {
                sql.push_str(&format!("\nAND {}", p));
            }
        }
        sql
    };
    let cte = |name: &str, cols: Vec<&str>, body: String| {
        let mut columns = vec!["run_id".to_string(), "entity_key".to_string()];
        columns.extend(cols.into_iter().map(String::from));
        Cte {
            name: name.to_string(),
            columns,
            body,
        }
    };

    if !is_compare {
        let cols: Vec<&str> = attrs
            .columns()
            .iter()
            .filter(|c| c.is_group || c.is_simple)
            .map(|c| c.col_name.as_str())
            .collect();
        let body = select(&cols, format!("RE.run_id IN ({})", RunSet::list(runs.all())), true);
        return AttrCtes::Single {
            atts: cte("atts", cols, body),
        };
    }

    let base_cols: Vec<&str> = attrs
        .columns()
        .iter()
        .filter(|c| c.is_base)
        .map(|c| c.col_name.as_str())
        .collect();
    let base_body = select(&base_cols, format!("RE.run_id = {}", runs.from_id()), false);
    let abase = cte("abase", base_cols, base_body);

    let var_cols: Vec<&str> = attrs
        .columns()
        .iter()
        .filter(|c| c.is_group || c.is_var)
        .map(|c| c.col_name.as_str())
        .collect();
    let var_body = select(
        &var_cols,
        format!("RE.run_id IN ({})", RunSet::list(runs.variants())),
        true,
    );
    let avar = cte("avar", var_cols, var_body);

    let mut abv_cols = vec!["run_id".to_string(), "entity_key".to_string()];
    let mut abv_sel = String::from("SELECT V.run_id, V.entity_key");
    for c in attrs.group_columns() {
        abv_cols.push(c.col_name.clone());
        abv_sel.push_str(&format!(", V.{}", c.col_name));
    }
    for c in attrs.referenced_columns() {
        if c.is_base {
            abv_cols.push(format!("{}_base", c.col_name));
            abv_sel.push_str(&format!(", B.{0} AS {0}_base", c.col_name));
        }
        if c.is_var {
            abv_cols.push(format!("{}_var", c.col_name));
            abv_sel.push_str(&format!(", V.{0} AS {0}_var", c.col_name));
        }
    }
    abv_sel.push_str("\nFROM abase B\nINNER JOIN avar V ON (V.entity_key = B.entity_key)");

    AttrCtes::Compare {
        abase,
        avar,
        abv: Cte {
            name: "abv".to_string(),
            columns: abv_cols,
            body: abv_sel,
        },
    }
}

/// Build CTEs of referenced parameters, ordered by parameter hid
pub fn parameter_ctes(
    params: &ParameterCatalog,
    runs: &RunSet,
    run_parameter_table: &str,
) -> Vec<Cte> {
    let mut cols: Vec<&ParameterColumn> = params.columns().iter().collect();
    cols.sort_by_key(|p| p.param_hid);

    let mut ctes = Vec::new();
    for p in cols {
        if p.is_simple {
            ctes.push(run_param_cte(p, "par", "param_value", runs.all(), run_parameter_table));
        }
        if p.is_base {
            ctes.push(Cte {
                name: format!("pbase_{}", p.param_hid),
                columns: vec!["param_base".to_string()],
                body: format!(
                    "SELECT AVG(P.param_value)\nFROM {} RP\nINNER JOIN {} P ON (P.run_id = RP.base_run_id)\nWHERE RP.run_id = {} AND RP.parameter_hid = {}",
                    run_parameter_table,
                    p.db_run_table,
                    runs.from_id(),
                    p.param_hid
                ),
            });
        }
        if p.is_var {
            ctes.push(run_param_cte(p, "pvar", "param_var", runs.variants(), run_parameter_table));
        }
    }
    ctes
}

fn run_param_cte(
    p: &ParameterColumn,
    prefix: &str,
    value_col: &str,
    run_ids: &[i32],
    run_parameter_table: &str,
) -> Cte {
    Cte {
        name: format!("{}_{}", prefix, p.param_hid),
        columns: vec!["run_id".to_string(), value_col.to_string()],
        body: format!(
            "SELECT RP.run_id, AVG(P.param_value)\nFROM {} RP\nINNER JOIN {} P ON (P.run_id = RP.base_run_id)\nWHERE RP.run_id IN ({}) AND RP.parameter_hid = {}\nGROUP BY RP.run_id",
            run_parameter_table,
            p.db_run_table,
            RunSet::list(run_ids),
            p.param_hid
        ),
    }
}
