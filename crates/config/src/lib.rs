use anyhow::{Context, Result};
use calcsql::{ReadLayout, TranslateOptions};
use config_rs::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Model metadata source
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Default query settings of the REPL
    #[serde(default)]
    pub query: QueryConfig,

    /// SQL generation settings
    #[serde(default)]
    pub translate: TranslateConfig,
}

/// Where to read model metadata from and which entity to use
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Model metadata JSON file
    #[serde(default = "default_metadata_path")]
    pub path: String,

    /// Entity name (e.g., "Person")
    #[serde(default)]
    pub entity: String,

    /// Entity generation digest, first generation of the entity if not set
    #[serde(default)]
    pub generation: Option<String>,
}

/// Query defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Calculation id returned as calc_id column
    #[serde(default = "default_calc_id")]
    pub calc_id: i32,

    /// Base run id
    #[serde(default = "default_from_run_id")]
    pub from_run_id: i32,

    /// Variant run ids
    #[serde(default)]
    pub run_ids: Vec<i32>,

    /// Attribute names to group by
    #[serde(default)]
    pub group_by: Vec<String>,
}

/// SQL generation settings, see `calcsql::TranslateOptions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    /// Near-zero bound of OM_DIV_BY and OM_CV (default: 1e-37)
    #[serde(default = "default_div_by_epsilon")]
    pub div_by_epsilon: f64,

    /// Run to entity generation mapping table
    #[serde(default = "default_run_entity_table")]
    pub run_entity_table: String,

    /// Run to parameter values mapping table
    #[serde(default = "default_run_parameter_table")]
    pub run_parameter_table: String,
}

// Default value functions
fn default_metadata_path() -> String {
    "model.json".to_string()
}

fn default_calc_id() -> i32 {
    1
}

fn default_from_run_id() -> i32 {
    1
}

fn default_div_by_epsilon() -> f64 {
    calcsql::translate::DEFAULT_DIV_BY_EPSILON
}

fn default_run_entity_table() -> String {
    "run_entity".to_string()
}

fn default_run_parameter_table() -> String {
    "run_parameter".to_string()
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
            entity: String::new(),
            generation: None,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            calc_id: default_calc_id(),
            from_run_id: default_from_run_id(),
            run_ids: Vec::new(),
            group_by: Vec::new(),
        }
    }
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            div_by_epsilon: default_div_by_epsilon(),
            run_entity_table: default_run_entity_table(),
            run_parameter_table: default_run_parameter_table(),
        }
    }
}

impl Config {
    /// Load Config with layered configuration priority:
    /// 1. Default values
    /// 2. TOML file (if provided)
    /// 3. Environment variables with MICROCALC_ prefix,
    ///    e.g. MICROCALC_METADATA__ENTITY or MICROCALC_QUERY__RUN_IDS=221,222
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder()
            .set_default("metadata.path", default_metadata_path())?
            .set_default("query.calc_id", default_calc_id())?
            .set_default("query.from_run_id", default_from_run_id())?
            .set_default("translate.div_by_epsilon", default_div_by_epsilon())?
            .set_default("translate.run_entity_table", default_run_entity_table())?
            .set_default("translate.run_parameter_table", default_run_parameter_table())?;

        if let Some(file_path) = config_file {
            let path = Path::new(file_path);
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            builder = builder.add_source(File::from(path));
        }

        // Field names contain underscores, sections are separated by a double underscore
        builder = builder.add_source(
            Environment::with_prefix("MICROCALC")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("query.run_ids")
                .with_list_parse_key("query.group_by")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Load Config from a TOML file, environment variables still override the file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file_path = path
            .to_str()
            .with_context(|| format!("Invalid configuration file path: {}", path.display()))?;
        Self::load(Some(file_path))
    }

    /// Create a new Config from environment variables with defaults
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.metadata.validate()?;
        self.query.validate()?;
        self.translate.validate()?;
        Ok(())
    }

    /// Translation options of `calcsql`
    pub fn translate_options(&self) -> TranslateOptions {
        TranslateOptions {
            div_by_epsilon: self.translate.div_by_epsilon,
            run_entity_table: self.translate.run_entity_table.clone(),
            run_parameter_table: self.translate.run_parameter_table.clone(),
        }
    }

    /// Read layout of the base run without filters
    pub fn read_layout(&self) -> ReadLayout {
        ReadLayout {
            from_id: self.query.from_run_id,
            ..Default::default()
        }
    }
}

impl MetadataConfig {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.path.is_empty(), "Metadata path cannot be empty");
        if let Some(digest) = &self.generation {
            anyhow::ensure!(!digest.is_empty(), "Entity generation digest cannot be empty");
        }
        Ok(())
    }
}

impl QueryConfig {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.from_run_id > 0,
            "Base run id must be positive: {}",
            self.from_run_id
        );
        if let Some(id) = self.run_ids.iter().find(|id| **id <= 0) {
            anyhow::bail!("Variant run id must be positive: {}", id);
        }
        Ok(())
    }
}

impl TranslateConfig {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.div_by_epsilon.is_finite() && self.div_by_epsilon > 0.0,
            "Division epsilon must be a positive number: {}",
            self.div_by_epsilon
        );
        anyhow::ensure!(
            !self.run_entity_table.is_empty(),
            "Run entity table name cannot be empty"
        );
        anyhow::ensure!(
            !self.run_parameter_table.is_empty(),
            "Run parameter table name cannot be empty"
        );
        Ok(())
    }
}
