/// Model metadata consumed by the calculation compiler
///
/// These are read-only descriptions of a model's types, parameters, entities and
/// entity generations. They come from the model catalog (or from a JSON export of
/// it) and are borrowed for the duration of a translation.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::CalcError;

/// Model metadata: the subset of the schema catalog used by microdata calculations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub name: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub types: Vec<TypeMeta>,
    #[serde(default)]
    pub params: Vec<ParamMeta>,
    #[serde(default)]
    pub entities: Vec<EntityMeta>,
    #[serde(default)]
    pub entity_gens: Vec<EntityGenMeta>,
}

/// Kind of a model type, as far as aggregation is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Float,
    Int,
    Bool,
    Enum,
    Other,
}

/// Model type: built-in numeric, boolean, classification or range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeMeta {
    pub type_id: i32,
    pub name: String,
    pub kind: TypeKind,
    /// Enum items, empty unless `kind` is `Enum`
    #[serde(default)]
    pub enums: Vec<EnumItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumItem {
    pub enum_id: i32,
    pub code: String,
}

impl TypeMeta {
    /// Float and integer types can be aggregated
    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, TypeKind::Float | TypeKind::Int)
    }

    /// Find enum id by enum code
    pub fn enum_id_by_code(&self, code: &str) -> Option<i32> {
        self.enums
            .iter()
            .find(|e| e.code == code)
            .map(|e| e.enum_id)
    }
}

/// Model parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamMeta {
    pub param_hid: i32,
    pub name: String,
    /// Number of dimensions, zero for scalar parameters
    #[serde(default)]
    pub rank: i32,
    pub type_id: i32,
    /// Run values table: (run_id, sub_id, param_value) for scalars
    pub db_run_table: String,
}

/// Entity and its attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub entity_hid: i32,
    pub name: String,
    #[serde(default)]
    pub attrs: Vec<EntityAttrMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAttrMeta {
    pub attr_id: i32,
    pub name: String,
    pub type_id: i32,
    /// Column name in the entity generation table
    pub col_name: String,
    #[serde(default)]
    pub is_internal: bool,
}

/// Entity generation: the set of attributes written into one microdata table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityGenMeta {
    pub gen_hid: i32,
    pub entity_hid: i32,
    #[serde(default)]
    pub gen_digest: String,
    /// Microdata table: (run_id, entity_key, <attribute columns>)
    pub db_entity_table: String,
    /// Attribute ids in the order of generation table columns
    #[serde(default)]
    pub gen_attrs: Vec<i32>,
}

impl ModelMeta {
    /// Load model metadata from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model metadata: {}", path.display()))?;
        let model: ModelMeta = serde_json::from_str(&text)
            .with_context(|| format!("Invalid model metadata JSON: {}", path.display()))?;
        Ok(model)
    }

    pub fn type_by_id(&self, type_id: i32) -> Option<&TypeMeta> {
        self.types.iter().find(|t| t.type_id == type_id)
    }

    pub fn param_by_name(&self, name: &str) -> Option<&ParamMeta> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn entity_by_name(&self, name: &str) -> Option<&EntityMeta> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn entity_by_hid(&self, entity_hid: i32) -> Option<&EntityMeta> {
        self.entities.iter().find(|e| e.entity_hid == entity_hid)
    }

    /// Entity generation by entity and, optionally, by generation digest.
    /// Without a digest the first generation of the entity is returned.
    pub fn entity_gen(&self, entity_hid: i32, gen_digest: Option<&str>) -> Option<&EntityGenMeta> {
        self.entity_gens.iter().find(|g| {
            g.entity_hid == entity_hid && gen_digest.map_or(true, |d| g.gen_digest == d)
        })
    }
}

impl EntityMeta {
    pub fn attr_by_id(&self, attr_id: i32) -> Option<&EntityAttrMeta> {
        self.attrs.iter().find(|a| a.attr_id == attr_id)
    }

    pub fn attr_by_name(&self, name: &str) -> Option<&EntityAttrMeta> {
        self.attrs.iter().find(|a| a.name == name)
    }
}

impl EntityGenMeta {
    /// Generation attributes resolved against the entity, in generation order
    pub fn attributes<'a>(
        &self,
        entity: &'a EntityMeta,
    ) -> Result<Vec<&'a EntityAttrMeta>, CalcError> {
        if entity.entity_hid != self.entity_hid {
            return Err(CalcError::Metadata(format!(
                "entity generation {} does not belong to entity {}",
                self.gen_hid, entity.name
            )));
        }
        self.gen_attrs
            .iter()
            .map(|id| {
                entity.attr_by_id(*id).ok_or_else(|| {
                    CalcError::Metadata(format!(
                        "entity attribute id {} not found in entity {}",
                        id, entity.name
                    ))
                })
            })
            .collect()
    }
}
