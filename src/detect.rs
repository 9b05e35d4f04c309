//! Default type maps, derived from a table schema or from validation rules,
//! and the cache that keeps them per model.

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::datatype::{AttributeTypes, TypeTag};
use crate::error::{Result, TypecastError};
use crate::model::Model;

// ------------- Schema --------------

/// Abstract type of a column, as the schema layer reports it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Integer,
    Boolean,
    Double,
    String,
}

impl LogicalType {
    /// Derives the abstract type from a declared column type.
    pub fn from_db_type(db_type: &str) -> Self {
        let db_type = db_type.to_lowercase();
        if db_type.contains("int") && !db_type.contains("unsigned int") {
            LogicalType::Integer
        } else if db_type.contains("bool") {
            LogicalType::Boolean
        } else if ["real", "floa", "doub"].iter().any(|t| db_type.contains(t)) {
            LogicalType::Double
        } else {
            LogicalType::String
        }
    }
    pub fn name(&self) -> &'static str {
        match self {
            LogicalType::Integer => "integer",
            LogicalType::Boolean => "boolean",
            LogicalType::Double => "double",
            LogicalType::String => "string",
        }
    }
}
impl FromStr for LogicalType {
    type Err = TypecastError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "integer" => Ok(LogicalType::Integer),
            "boolean" => Ok(LogicalType::Boolean),
            "double" => Ok(LogicalType::Double),
            "string" => Ok(LogicalType::String),
            other => Err(TypecastError::InvalidArgument(format!(
                "Unknown logical column type '{other}'"
            ))),
        }
    }
}
impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub logical_type: LogicalType,
    /// The declared type, such as `TIMESTAMP` or `varchar(255)`.
    pub db_type: String,
}

impl ColumnSchema {
    pub fn new(
        name: impl Into<String>,
        logical_type: LogicalType,
        db_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            logical_type,
            db_type: db_type.into(),
        }
    }
    /// A column whose logical type follows from its declared type.
    pub fn declared(name: impl Into<String>, db_type: impl Into<String>) -> Self {
        let db_type = db_type.into();
        Self::new(name, LogicalType::from_db_type(&db_type), db_type)
    }
}

pub fn detect_type_from_column(column: &ColumnSchema) -> TypeTag {
    match column.logical_type {
        LogicalType::Integer => TypeTag::Integer,
        LogicalType::Boolean => TypeTag::Boolean,
        LogicalType::Double => TypeTag::Float,
        LogicalType::String => {
            let db_type = column.db_type.to_lowercase();
            if db_type.contains("json") {
                TypeTag::ArrayLike
            } else if db_type.contains("date") || db_type.contains("timestamp") {
                TypeTag::DateTime
            } else {
                TypeTag::String
            }
        }
    }
}

pub fn detect_from_schema(columns: &[ColumnSchema]) -> AttributeTypes {
    columns
        .iter()
        .map(|column| (column.name.clone(), detect_type_from_column(column)))
        .collect()
}

// ------------- Validation rules --------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidatorKind {
    Boolean,
    Numeric,
    String,
    Other(String),
}

/// Description of one validation rule declared on a model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorRule {
    pub attributes: Vec<String>,
    pub kind: ValidatorKind,
    /// Numeric rules only.
    pub integer_only: bool,
}

impl ValidatorRule {
    pub fn new(attributes: &[&str], kind: ValidatorKind) -> Self {
        Self {
            attributes: attributes.iter().map(|name| (*name).to_owned()).collect(),
            kind,
            integer_only: false,
        }
    }
    pub fn boolean(attributes: &[&str]) -> Self {
        Self::new(attributes, ValidatorKind::Boolean)
    }
    pub fn numeric(attributes: &[&str], integer_only: bool) -> Self {
        Self {
            integer_only,
            ..Self::new(attributes, ValidatorKind::Numeric)
        }
    }
    pub fn string(attributes: &[&str]) -> Self {
        Self::new(attributes, ValidatorKind::String)
    }
    pub fn other(attributes: &[&str], name: impl Into<String>) -> Self {
        Self::new(attributes, ValidatorKind::Other(name.into()))
    }
    /// The tag this rule implies, if any.
    pub fn implied_type(&self) -> Option<TypeTag> {
        match self.kind {
            ValidatorKind::Boolean => Some(TypeTag::Boolean),
            ValidatorKind::Numeric if self.integer_only => Some(TypeTag::Integer),
            ValidatorKind::Numeric => Some(TypeTag::Float),
            ValidatorKind::String => Some(TypeTag::String),
            ValidatorKind::Other(_) => None,
        }
    }
}

/// Later rules win for an attribute, which keeps the position of its first rule.
pub fn detect_from_rules(validators: &[ValidatorRule]) -> AttributeTypes {
    let mut types = AttributeTypes::new();
    for validator in validators {
        let Some(tag) = validator.implied_type() else {
            continue;
        };
        for name in &validator.attributes {
            if let Some(previous) = types.insert(name.as_str(), tag) {
                trace!(
                    attribute = %name, ?previous, %tag,
                    "validation rule overrides an earlier type"
                );
            }
        }
    }
    types
}

/// Storable models are detected from their columns, the rest from their rules.
pub fn detect_attribute_types<M: Model + ?Sized>(owner: &M) -> Result<AttributeTypes> {
    match owner.as_storable() {
        Some(storable) => Ok(detect_from_schema(&storable.describe_columns()?)),
        None => Ok(detect_from_rules(&owner.validators())),
    }
}

// ------------- Cache --------------

lazy_static! {
    static ref GLOBAL_CACHE: Arc<AttributeTypeCache> = Arc::new(AttributeTypeCache::new());
}

/// Detected type maps keyed by model name.
#[derive(Debug, Default)]
pub struct AttributeTypeCache {
    entries: Mutex<HashMap<String, AttributeTypes>>,
}

impl AttributeTypeCache {
    pub fn new() -> Self {
        Self::default()
    }
    /// The process wide cache used by behaviors unless another one is injected.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_CACHE)
    }
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, AttributeTypes>>> {
        self.entries
            .lock()
            .map_err(|e| TypecastError::Lock(e.to_string()))
    }
    pub fn get(&self, model_name: &str) -> Result<Option<AttributeTypes>> {
        Ok(self.lock()?.get(model_name).cloned())
    }
    pub fn put(&self, model_name: impl Into<String>, types: AttributeTypes) -> Result<()> {
        self.lock()?.insert(model_name.into(), types);
        Ok(())
    }
    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
    /// Cached map for the model, detecting and storing it on a miss.
    ///
    /// The lock is not held while detecting. A failed detection stores nothing.
    pub fn get_or_detect<F>(&self, model_name: &str, detect: F) -> Result<AttributeTypes>
    where
        F: FnOnce() -> Result<AttributeTypes>,
    {
        if let Some(types) = self.get(model_name)? {
            trace!(model = model_name, "attribute types found in cache");
            return Ok(types);
        }
        let types = detect()?;
        debug!(model = model_name, attributes = types.len(), "detected attribute types");
        self.put(model_name, types.clone())?;
        Ok(types)
    }
}

/// Empties the process wide cache.
pub fn clear_auto_detected_attribute_types() -> Result<()> {
    AttributeTypeCache::global().clear()
}
