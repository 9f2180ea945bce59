/// Microdata calculation support
///
/// This crate translates aggregation expressions over entity microdata into a single
/// SQL query against model run tables.
///
/// # Architecture
///
/// 1. **Sanitizer** (`sanitize.rs`) - Rejects statement separators, comments and DML/DDL keywords
/// 2. **Macros** (`macros.rs`) - Expands OM_DIV_BY and OM_IF helpers
/// 3. **Lexer** (`lexer.rs`) - Tokenizes calculation expressions
/// 4. **Parser** (`parser.rs`) - Builds an Abstract Syntax Tree (AST) from tokens
/// 5. **Catalog** (`catalog.rs`) - Resolves attribute and parameter names from model metadata
/// 6. **Level** (`level.rs`) - Splits nested aggregates into aggregation levels
/// 7. **CTE** (`cte.rs`) - Builds WITH clause of entity attributes and parameters
/// 8. **Assembler** (`assembler.rs`) - Renders nested and outer SELECT
/// 9. **Translate** (`translate.rs`) - Runs the pipeline for one calculation
///
/// # Usage
///
/// ```rust,ignore
/// use calcsql::{CalcLayout, MicroTranslator, ModelMeta, ReadLayout};
///
/// let model = ModelMeta::from_json_file("model.json")?;
/// let entity = model.entity_by_name("Person").unwrap();
/// let generation = model.entity_gen(entity.entity_hid, None).unwrap();
///
/// let read = ReadLayout { from_id: 219, ..Default::default() };
/// let calc = CalcLayout {
///     calculate: "OM_AVG(Income)".to_string(),
///     calc_id: 12001,
///     name: "AvgIncome".to_string(),
/// };
/// let sql = MicroTranslator::new(&model, entity, generation)
///     .translate(&read, &calc, &["Sex".to_string()], &[])?;
/// ```
pub mod assembler;
pub mod ast;
pub mod catalog;
pub mod cte;
pub mod error;
pub mod filter;
pub mod layout;
pub mod level;
pub mod lexer;
pub mod macros;
pub mod meta;
pub mod parser;
pub mod resolver;
pub mod sanitize;
pub mod translate;

pub use error::{CalcError, TranslateError};
pub use layout::{CalcLayout, FilterColumn, FilterIdColumn, FilterOp, OrderByColumn, ReadLayout};
pub use meta::ModelMeta;
pub use translate::{MicroTranslator, TranslateOptions};

use anyhow::{Context, Result};

/// Translate a calculation of an entity into SQL
///
/// This is the main entry point when entity and generation are known by name
/// and digest.
///
/// # Arguments
///
/// * `model` - Model metadata
/// * `entity_name` - Entity name, e.g. `Person`
/// * `gen_digest` - Entity generation digest, the first generation of the entity if None
/// * `read` - Base run id, filters and order by
/// * `calc` - Calculation expression, id and name
/// * `group_by` - Entity attribute names to group by
/// * `run_ids` - Variant run ids
///
/// # Errors
///
/// Returns an error if entity or generation not found or the calculation cannot be translated
#[allow(clippy::too_many_arguments)]
pub fn micro_calc_to_sql(
    model: &ModelMeta,
    entity_name: &str,
    gen_digest: Option<&str>,
    read: &ReadLayout,
    calc: &CalcLayout,
    group_by: &[String],
    run_ids: &[i32],
    options: &TranslateOptions,
) -> Result<String> {
    let entity = model
        .entity_by_name(entity_name)
        .with_context(|| format!("Entity not found: {}", entity_name))?;
    let generation = model
        .entity_gen(entity.entity_hid, gen_digest)
        .with_context(|| format!("Entity generation not found for entity: {}", entity_name))?;

    let sql = MicroTranslator::new(model, entity, generation)
        .with_options(options.clone())
        .translate(read, calc, group_by, run_ids)
        .with_context(|| format!("Failed to translate calculation: {}", calc.name))?;

    Ok(sql)
}
