/// Calculation translator
///
/// Runs the translation pipeline for one calculation of one entity generation:
///
/// 1. sanitize the expression text and expand helper macros
/// 2. parse the expression and plan aggregation levels
/// 3. fold reference usage into the catalogs and check reference forms
/// 4. build filters, the WITH clause, the nested query and the outer query
use tracing::{debug, trace};

use crate::assembler::{nested_query, outer_query};
use crate::catalog::{check_forms, AggregationCatalog, ParameterCatalog};
use crate::cte::{attribute_ctes, parameter_ctes, CteList, RunSet};
use crate::error::{CalcError, Result, TranslateError};
use crate::filter::build_filters;
use crate::layout::{CalcLayout, ReadLayout};
use crate::level::{LevelPlanner, Levels};
use crate::macros;
use crate::meta::{EntityGenMeta, EntityMeta, ModelMeta};
use crate::parser;
use crate::sanitize::sanitize;

/// Default near-zero bound of division helpers
pub const DEFAULT_DIV_BY_EPSILON: f64 = 1.0e-37;

/// Database naming and numeric settings of the generated SQL
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateOptions {
    /// Near-zero bound used by OM_DIV_BY and OM_CV
    pub div_by_epsilon: f64,
    /// Run to entity generation mapping table
    pub run_entity_table: String,
    /// Run to parameter values mapping table
    pub run_parameter_table: String,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        TranslateOptions {
            div_by_epsilon: DEFAULT_DIV_BY_EPSILON,
            run_entity_table: "run_entity".to_string(),
            run_parameter_table: "run_parameter".to_string(),
        }
    }
}

/// Nested aggregation query and run comparison flag of one calculation
#[derive(Debug, Clone, PartialEq)]
pub struct PartialCalc {
    pub levels: Levels,
    pub is_compare: bool,
}

/// Parse and plan a sanitized calculation, folding usage into the catalogs
pub fn partial_translate(
    expr: &str,
    attrs: &mut AggregationCatalog,
    params: &mut ParameterCatalog,
    options: &TranslateOptions,
) -> Result<PartialCalc> {
    let expanded = macros::expand(expr, options.div_by_epsilon)?;
    trace!(expr = %expanded, "expanded calculation macros");

    let ast = parser::parse(&expanded)?;
    let plan = LevelPlanner::new(&*attrs, &*params, options.div_by_epsilon).plan(&ast)?;

    attrs.record(&plan.attr_usage);
    params.record(&plan.param_usage);
    let is_compare = check_forms(attrs, params)?;

    Ok(PartialCalc {
        levels: plan.levels,
        is_compare,
    })
}

/// Translator of microdata calculations into SQL for one entity generation
pub struct MicroTranslator<'a> {
    model: &'a ModelMeta,
    entity: &'a EntityMeta,
    generation: &'a EntityGenMeta,
    options: TranslateOptions,
}

impl<'a> MicroTranslator<'a> {
    pub fn new(model: &'a ModelMeta, entity: &'a EntityMeta, generation: &'a EntityGenMeta) -> Self {
        MicroTranslator {
            model,
            entity,
            generation,
            options: TranslateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TranslateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &TranslateOptions {
        &self.options
    }

    /// Translate calculation into a single SQL statement
    ///
    /// `run_ids` are variant runs, the base run is `read.from_id`. Output is
    /// deterministic: the same input always produces identical SQL text.
    pub fn translate(
        &self,
        read: &ReadLayout,
        calc: &CalcLayout,
        group_by: &[String],
        run_ids: &[i32],
    ) -> std::result::Result<String, TranslateError> {
        self.translate_calc(read, calc, group_by, run_ids)
            .map_err(|kind| TranslateError::new(&self.entity.name, &calc.calculate, kind))
    }

    fn translate_calc(
        &self,
        read: &ReadLayout,
        calc: &CalcLayout,
        group_by: &[String],
        run_ids: &[i32],
    ) -> Result<String> {
        debug!(
            entity = %self.entity.name,
            calc_id = calc.calc_id,
            expr = %calc.calculate,
            "translating calculation"
        );

        let expr = sanitize(&calc.calculate)?;
        let runs = RunSet::new(read.from_id, run_ids)?;

        let mut attrs = AggregationCatalog::build(self.model, self.entity, self.generation, group_by)?;
        let mut params = ParameterCatalog::build(self.model);
        let filters = build_filters(read, &calc.name, &attrs, self.model)?;

        let partial = partial_translate(&expr, &mut attrs, &mut params, &self.options)?;
        if partial.is_compare && runs.variants().is_empty() {
            return Err(CalcError::InvalidRunSet(
                "run comparison requires at least one variant run".to_string(),
            ));
        }

        let attr_ctes = attribute_ctes(
            self.generation,
            &attrs,
            &runs,
            partial.is_compare,
            &filters.dimension,
            &self.options.run_entity_table,
        );
        let param_ctes = parameter_ctes(&params, &runs, &self.options.run_parameter_table);

        let nested = nested_query(&partial.levels, &attrs, attr_ctes.source())?;
        let ctes = CteList::new(attr_ctes, param_ctes);
        let main = outer_query(&nested, &attrs, calc.calc_id, &filters.value, &read.order_by)?;

        debug!(
            levels = partial.levels.len(),
            is_compare = partial.is_compare,
            ctes = ctes.names().count(),
            "translated calculation"
        );
        Ok(format!("{}\n{}", ctes, main))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{EntityAttrMeta, ParamMeta, TypeKind, TypeMeta};

    fn model() -> ModelMeta {
        let attr = |attr_id: i32, name: &str, type_id: i32| EntityAttrMeta {
            attr_id,
            name: name.to_string(),
            type_id,
            col_name: format!("attr{attr_id}"),
            is_internal: false,
        };
        let entity = EntityMeta {
            entity_hid: 7,
            name: "Person".to_string(),
            attrs: vec![attr(1, "Sex", 2), attr(4, "Income", 3), attr(5, "Pension", 3)],
        };
        ModelMeta {
            name: "m".to_string(),
            digest: "d".to_string(),
            types: vec![
                TypeMeta {
                    type_id: 2,
                    name: "SEX".to_string(),
                    kind: TypeKind::Enum,
                    enums: vec![],
                },
                TypeMeta {
                    type_id: 3,
                    name: "double".to_string(),
                    kind: TypeKind::Float,
                    enums: vec![],
                },
            ],
            params: vec![ParamMeta {
                param_hid: 101,
                name: "Rate".to_string(),
                rank: 0,
                type_id: 3,
                db_run_table: "Rate_p101".to_string(),
            }],
            entities: vec![entity],
            entity_gens: vec![EntityGenMeta {
                gen_hid: 11,
                entity_hid: 7,
                gen_digest: "g11".to_string(),
                db_entity_table: "Person_g11".to_string(),
                gen_attrs: vec![1, 4, 5],
            }],
        }
    }

    fn translate(expr: &str, from_id: i32, run_ids: &[i32]) -> std::result::Result<String, TranslateError> {
        let model = model();
        let entity = &model.entities[0];
        let generation = &model.entity_gens[0];
        let read = ReadLayout {
            from_id,
            ..Default::default()
        };
        let calc = CalcLayout {
            calculate: expr.to_string(),
            calc_id: 12001,
            name: "Calc".to_string(),
        };
        MicroTranslator::new(&model, entity, generation).translate(&read, &calc, &["Sex".to_string()], run_ids)
    }

    #[test]
    fn test_partial_translate() {
        let model = model();
        let mut attrs =
            AggregationCatalog::build(&model, &model.entities[0], &model.entity_gens[0], &[]).unwrap();
        let mut params = ParameterCatalog::build(&model);

        let partial = partial_translate(
            "OM_AVG(Income[variant] - Income[base] * param.Rate[base])",
            &mut attrs,
            &mut params,
            &TranslateOptions::default(),
        )
        .unwrap();
        assert!(partial.is_compare);
        assert_eq!(partial.levels.len(), 1);
        let income = attrs.by_name("Income").unwrap();
        assert!(income.is_base && income.is_var && !income.is_simple);
        assert!(params.columns()[0].is_base);
    }

    #[test]
    fn test_translate_single_run() {
        let sql = translate("OM_AVG(Income)", 219, &[]).unwrap();
        assert!(sql.starts_with("WITH atts (run_id, entity_key, attr1, attr4) AS"));
        assert!(sql.contains("SELECT A.run_id, 12001 AS calc_id, A.attr1, A.calc_value"));
        assert!(sql.ends_with("ORDER BY 1, 2, 3"));
    }

    #[test]
    fn test_translate_errors() {
        let err = translate("OM_AVG(Income); DROP TABLE x", 219, &[]).unwrap_err();
        assert!(matches!(err.kind(), CalcError::UnsafeExpression(_)));
        assert_eq!(err.entity, "Person");

        let err = translate("OM_AVG(Income[variant] - Income[base])", 219, &[219]).unwrap_err();
        assert!(matches!(err.kind(), CalcError::InvalidRunSet(_)));

        let err = translate("OM_AVG(Income)", 0, &[]).unwrap_err();
        assert!(matches!(err.kind(), CalcError::InvalidRunSet(_)));
    }

    #[test]
    fn test_translate_is_deterministic() {
        let expr = "OM_SUM(Income * param.Rate - OM_AVG(Pension))";
        assert_eq!(
            translate(expr, 219, &[221]).unwrap(),
            translate(expr, 219, &[221]).unwrap()
        );
    }
}
