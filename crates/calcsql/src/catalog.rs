/// Attribute and parameter catalogs of one translation
///
/// Catalogs are built from model metadata before parsing and act as name resolvers
/// for the level planner. Reference usage returned by the planner is folded back with
/// `record` and checked with `check_forms`, which also decides if the calculation is
/// a run comparison.
use crate::ast::{RefForm, Reference};
use crate::error::{CalcError, Result};
use crate::meta::{EntityGenMeta, EntityMeta, ModelMeta};
use crate::resolver::{
    AttributeResolver, ParameterResolver, ResolvedAttribute, ResolvedParameter, Usage,
};

/// Entity generation attribute as a column of the aggregation source
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationColumn {
    pub name: String,
    pub col_name: String,
    pub attr_id: i32,
    pub type_id: i32,
    /// Dimension of the result
    pub is_group: bool,
    /// Numeric attribute, can be aggregated
    pub is_aggr: bool,
    pub is_simple: bool,
    pub is_base: bool,
    pub is_var: bool,
}

impl AggregationColumn {
    /// Column name in the aggregation source for a reference form
    pub fn source_column(&self, form: RefForm) -> String {
        match form {
            RefForm::Simple => self.col_name.clone(),
            RefForm::Base => format!("{}_base", self.col_name),
            RefForm::Variant => format!("{}_var", self.col_name),
        }
    }

    fn mark(&mut self, form: RefForm) {
        match form {
            RefForm::Simple => self.is_simple = true,
            RefForm::Base => self.is_base = true,
            RefForm::Variant => self.is_var = true,
        }
    }
}

/// Attributes of the entity generation, in generation order
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationCatalog {
    cols: Vec<AggregationColumn>,
    /// Group by columns in the order requested by the caller
    group_by: Vec<usize>,
}

impl AggregationCatalog {
    pub fn build(
        model: &ModelMeta,
        entity: &EntityMeta,
        generation: &EntityGenMeta,
        group_by: &[String],
    ) -> Result<Self> {
        let mut cols = Vec::with_capacity(generation.gen_attrs.len());
        for attr in generation.attributes(entity)? {
            let kind = model.type_by_id(attr.type_id).ok_or_else(|| {
                CalcError::Metadata(format!(
                    "type id {} of attribute {} not found",
                    attr.type_id, attr.name
                ))
            })?;
            cols.push(AggregationColumn {
                name: attr.name.clone(),
                col_name: attr.col_name.clone(),
                attr_id: attr.attr_id,
                type_id: attr.type_id,
                is_group: false,
                is_aggr: kind.is_numeric(),
                is_simple: false,
                is_base: false,
                is_var: false,
            });
        }

        let mut catalog = AggregationCatalog {
            cols,
            group_by: Vec::new(),
        };
        for name in group_by {
            let idx = catalog
                .position(name)
                .ok_or_else(|| CalcError::GroupByAttributeNotFound(name.clone()))?;
            if !catalog.group_by.contains(&idx) {
                catalog.group_by.push(idx);
                catalog.cols[idx].is_group = true;
            }
        }
        Ok(catalog)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.cols.iter().position(|c| c.name == name)
    }

    pub fn columns(&self) -> &[AggregationColumn] {
        &self.cols
    }

    pub fn by_name(&self, name: &str) -> Option<&AggregationColumn> {
        self.position(name).map(|i| &self.cols[i])
    }

    /// Group by columns in requested order
    pub fn group_columns(&self) -> impl Iterator<Item = &AggregationColumn> {
        self.group_by.iter().map(move |i| &self.cols[*i])
    }

    /// Attributes referenced by the calculation, excluding pure dimensions
    pub fn referenced_columns(&self) -> impl Iterator<Item = &AggregationColumn> {
        self.cols
            .iter()
            .filter(|c| c.is_simple || c.is_base || c.is_var)
    }

    pub fn record(&mut self, usage: &[Usage]) {
        for u in usage {
            if let Some(col) = self.cols.get_mut(u.index) {
                col.mark(u.form);
            }
        }
    }
}

impl AttributeResolver for AggregationCatalog {
    fn resolve_attribute(&self, reference: &Reference, alias: &str) -> Result<ResolvedAttribute> {
        let index = self
            .position(&reference.name)
            .ok_or_else(|| CalcError::UnknownAttribute(reference.name.clone()))?;
        let col = &self.cols[index];

        Ok(ResolvedAttribute {
            index,
            form: reference.form,
            sql: format!("{}.{}", alias, col.source_column(reference.form)),
            is_aggr: col.is_aggr,
        })
    }
}

/// Scalar numeric model parameter usable in calculations
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterColumn {
    pub param_hid: i32,
    pub name: String,
    pub db_run_table: String,
    pub is_simple: bool,
    pub is_base: bool,
    pub is_var: bool,
}

impl ParameterColumn {
    /// CTE name holding the parameter value for a reference form
    pub fn cte_name(&self, form: RefForm) -> String {
        match form {
            RefForm::Simple => format!("par_{}", self.param_hid),
            RefForm::Base => format!("pbase_{}", self.param_hid),
            RefForm::Variant => format!("pvar_{}", self.param_hid),
        }
    }

    fn mark(&mut self, form: RefForm) {
        match form {
            RefForm::Simple => self.is_simple = true,
            RefForm::Base => self.is_base = true,
            RefForm::Variant => self.is_var = true,
        }
    }
}

/// Scalar numeric parameters of the model, in metadata order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterCatalog {
    cols: Vec<ParameterColumn>,
}

impl ParameterCatalog {
    pub fn build(model: &ModelMeta) -> Self {
        let cols = model
            .params
            .iter()
            .filter(|p| p.rank == 0)
            .filter(|p| {
                model
                    .type_by_id(p.type_id)
                    .map(|t| t.is_numeric())
                    .unwrap_or(false)
            })
            .map(|p| ParameterColumn {
                param_hid: p.param_hid,
                name: p.name.clone(),
                db_run_table: p.db_run_table.clone(),
                is_simple: false,
                is_base: false,
                is_var: false,
            })
            .collect();
        ParameterCatalog { cols }
    }

    pub fn columns(&self) -> &[ParameterColumn] {
        &self.cols
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.cols.iter().position(|c| c.name == name)
    }

    pub fn record(&mut self, usage: &[Usage]) {
        for u in usage {
            if let Some(col) = self.cols.get_mut(u.index) {
                col.mark(u.form);
            }
        }
    }
}

impl ParameterResolver for ParameterCatalog {
    fn resolve_parameter(&self, reference: &Reference, alias: &str) -> Result<ResolvedParameter> {
        let index = self
            .position(&reference.name)
            .ok_or_else(|| CalcError::UnknownParameter(reference.name.clone()))?;
        let cte_name = self.cols[index].cte_name(reference.form);

        let (sql, join) = match reference.form {
            RefForm::Simple => (
                format!("{cte_name}.param_value"),
                format!("INNER JOIN {cte_name} ON ({cte_name}.run_id = {alias}.run_id)"),
            ),
            RefForm::Variant => (
                format!("{cte_name}.param_var"),
                format!("INNER JOIN {cte_name} ON ({cte_name}.run_id = {alias}.run_id)"),
            ),
            RefForm::Base => (
                format!("{cte_name}.param_base"),
                format!("CROSS JOIN {cte_name}"),
            ),
        };

        Ok(ResolvedParameter {
            index,
            form: reference.form,
            sql,
            cte_name,
            join,
        })
    }
}

/// Validate reference forms of recorded usage, return true for a run comparison
pub fn check_forms(attrs: &AggregationCatalog, params: &ParameterCatalog) -> Result<bool> {
    let used: Vec<&AggregationColumn> = attrs.referenced_columns().collect();
    if used.is_empty() {
        return Err(CalcError::NoAttributesFound);
    }

    if let Some(c) = used.iter().find(|c| c.is_simple && (c.is_base || c.is_var)) {
        return Err(CalcError::MixedReferenceForms(c.name.clone()));
    }
    let any_simple = used.iter().any(|c| c.is_simple);
    let any_compare = used.iter().any(|c| c.is_base || c.is_var);
    if any_simple && any_compare {
        return Err(CalcError::MixedReferenceForms(
            "attributes used both with and without [base] or [variant]".to_string(),
        ));
    }

    let any_base = used.iter().any(|c| c.is_base) || params.cols.iter().any(|p| p.is_base);
    let any_var = used.iter().any(|c| c.is_var) || params.cols.iter().any(|p| p.is_var);
    let is_compare = any_base && any_var;

    if is_compare && any_simple {
        return Err(CalcError::MixedReferenceForms(
            "run comparison requires [base] or [variant] attribute forms".to_string(),
        ));
    }
    if any_compare && !is_compare {
        return Err(CalcError::MixedReferenceForms(
            "run comparison requires both [base] and [variant] references".to_string(),
        ));
    }

    let bad_param = if is_compare {
        params.cols.iter().find(|p| p.is_simple)
    } else {
        params.cols.iter().find(|p| p.is_base || p.is_var)
    };
    if let Some(p) = bad_param {
        return Err(CalcError::InvalidParameterForm(p.name.clone()));
    }

    Ok(is_compare)
}
