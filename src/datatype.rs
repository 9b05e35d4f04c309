// used for persistence
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// used for date-time values
use chrono::{DateTime, FixedOffset, Utc};
// used for JSON containers
use serde_json::Value as Json;
// used when type maps are read from config files
use serde::de::{self, Deserialize, Deserializer, MapAccess, Visitor};

// used when parsing a string to a type tag
use std::str::FromStr;
// used to print out readable forms of values and tags
use std::fmt;
// documents and custom values are shared, not copied
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Result, TypecastError};

/// Format of date-times when they are parsed from or written to storage.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ------------- Values --------------

/// A value held by a model attribute.
///
/// Raw input (form strings, driver scalars) and typed results live in the
/// same enum, so an attribute can be read, cast and written back without
/// knowing its type up front. Only [`Value::is_storable`] values can be bound
/// to a storage write.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Raw bytes, as loaded from a BLOB column.
    Bytes(Vec<u8>),
    /// A plain JSON list or map. Object keys keep their document order.
    Json(Json),
    /// A mutable JSON list or map with identity, see [`Document`].
    Document(Document),
    DateTime(DateTime<FixedOffset>),
    /// A user value with optional string, JSON or iteration capabilities.
    Object(Arc<dyn CustomValue>),
    /// Raw SQL handed to the storage driver as is.
    Expression(Expression),
}

impl Value {
    /// Wraps a user value.
    pub fn object<T: CustomValue + 'static>(value: T) -> Self {
        Value::Object(Arc::new(value))
    }
    pub fn expression(sql: impl Into<String>) -> Self {
        Value::Expression(Expression::new(sql))
    }
    /// Converts decoded JSON into a value: lists and maps stay JSON containers,
    /// scalars become the matching scalar variant.
    pub fn from_json(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(0.0)),
            },
            Json::String(s) => Value::String(s),
            container => Value::Json(container),
        }
    }
    /// JSON form of the value, used when containers are encoded for storage.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Integer(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::String(s) => Json::String(s.clone()),
            Value::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
            Value::Json(json) => json.clone(),
            Value::Document(document) => document.copy(),
            Value::DateTime(moment) => Json::String(moment.format(DATETIME_FORMAT).to_string()),
            Value::Object(object) => object
                .to_json()
                .or_else(|| {
                    object
                        .items()
                        .map(|items| Json::Array(items.iter().map(Value::to_json).collect()))
                })
                .unwrap_or_else(|| Json::String(object.to_string())),
            Value::Expression(expression) => Json::String(expression.sql().to_owned()),
        }
    }
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    /// Scalars that a storage driver accepts as they are.
    pub fn is_storable(&self) -> bool {
        matches!(
            self,
            Value::Bool(_)
                | Value::Integer(_)
                | Value::Float(_)
                | Value::String(_)
                | Value::Bytes(_)
        )
    }
    /// Lists, maps and anything that can be iterated.
    pub fn is_container(&self) -> bool {
        match self {
            Value::Json(json) => json.is_array() || json.is_object(),
            Value::Document(_) => true,
            Value::Object(object) => object.items().is_some(),
            _ => false,
        }
    }
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Json(_) => "json",
            Value::Document(_) => "document",
            Value::DateTime(_) => "datetime",
            Value::Object(_) => "object",
            Value::Expression(_) => "expression",
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
    pub fn as_json(&self) -> Option<&Json> {
        match self {
            Value::Json(json) => Some(json),
            _ => None,
        }
    }
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(document) => Some(document),
            _ => None,
        }
    }
    pub fn as_datetime(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Value::DateTime(moment) => Some(moment),
            _ => None,
        }
    }
}

// Objects compare by identity, everything else by content.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Expression(a), Value::Expression(b)) => a == b,
            _ => false,
        }
    }
}
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}
impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}
impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}
impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::from_json(json)
    }
}
impl From<Document> for Value {
    fn from(document: Document) -> Self {
        Value::Document(document)
    }
}
impl From<DateTime<FixedOffset>> for Value {
    fn from(moment: DateTime<FixedOffset>) -> Self {
        Value::DateTime(moment)
    }
}
impl From<DateTime<Utc>> for Value {
    fn from(moment: DateTime<Utc>) -> Self {
        Value::DateTime(moment.fixed_offset())
    }
}
impl From<Expression> for Value {
    fn from(expression: Expression) -> Self {
        Value::Expression(expression)
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Null => Ok(ToSqlOutput::from(rusqlite::types::Null)),
            Value::Bool(b) => Ok(ToSqlOutput::from(*b)),
            Value::Integer(i) => Ok(ToSqlOutput::from(*i)),
            Value::Float(f) => Ok(ToSqlOutput::from(*f)),
            Value::String(s) => Ok(ToSqlOutput::from(s.as_str())),
            Value::Bytes(bytes) => Ok(ToSqlOutput::from(bytes.as_slice())),
            other => Err(rusqlite::Error::ToSqlConversionFailure(Box::new(
                TypecastError::Persistence(format!(
                    "a {} value cannot be bound as a storage scalar",
                    other.kind()
                )),
            ))),
        }
    }
}
impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Integer(i) => Ok(Value::Integer(i)),
            ValueRef::Real(f) => Ok(Value::Float(f)),
            ValueRef::Text(text) => std::str::from_utf8(text)
                .map(|s| Value::String(s.to_owned()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            ValueRef::Blob(bytes) => Ok(Value::Bytes(bytes.to_vec())),
        }
    }
}

// ------------- Special values --------------

/// Capabilities of a user value stored on a model.
///
/// Display is the string conversion. The storage pass prefers JSON, then
/// iteration, then the string form.
pub trait CustomValue: fmt::Debug + fmt::Display + Send + Sync {
    fn to_json(&self) -> Option<Json> {
        None
    }
    fn items(&self) -> Option<Vec<Value>> {
        None
    }
}

/// A mutable JSON list or map shared between everyone holding the handle.
///
/// Cloning a document clones the handle, so a change made through one clone
/// is seen by all of them. [`Document::ptr_eq`] tells handles apart, `==`
/// compares contents.
#[derive(Clone, Debug)]
pub struct Document(Arc<Mutex<Json>>);

impl Document {
    pub fn new(json: Json) -> Self {
        Self(Arc::new(Mutex::new(json)))
    }
    fn lock(&self) -> MutexGuard<'_, Json> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
    /// A detached copy of the contents.
    pub fn copy(&self) -> Json {
        self.lock().clone()
    }
    pub fn get(&self, key: &str) -> Option<Json> {
        self.lock().get(key).cloned()
    }
    pub fn len(&self) -> usize {
        match &*self.lock() {
            Json::Array(items) => items.len(),
            Json::Object(entries) => entries.len(),
            _ => 0,
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Sets a key on a map document. Returns false when the document is a list.
    pub fn insert(&self, key: impl Into<String>, value: Json) -> bool {
        match &mut *self.lock() {
            Json::Object(entries) => {
                entries.insert(key.into(), value);
                true
            }
            _ => false,
        }
    }
    /// Appends to a list document. Returns false when the document is a map.
    pub fn push(&self, value: Json) -> bool {
        match &mut *self.lock() {
            Json::Array(items) => {
                items.push(value);
                true
            }
            _ => false,
        }
    }
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.lock() == *other.lock()
    }
}

/// Raw SQL, for example `datetime('now')`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Expression(String);

impl Expression {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }
    pub fn sql(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ------------- Type tags --------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Integer,
    Float,
    Boolean,
    String,
    /// JSON text to a plain list or map.
    Array,
    /// JSON text to a [`Document`].
    ArrayLike,
    /// `YYYY-MM-DD HH:MM:SS` to a UTC date-time.
    DateTime,
    /// Unix seconds to a UTC date-time.
    Timestamp,
    /// As `DateTime`, through the installed date provider.
    DateTimeExt,
    /// As `Timestamp`, through the installed date provider.
    TimestampExt,
}

impl TypeTag {
    pub const ALL: [TypeTag; 10] = [
        TypeTag::Integer,
        TypeTag::Float,
        TypeTag::Boolean,
        TypeTag::String,
        TypeTag::Array,
        TypeTag::ArrayLike,
        TypeTag::DateTime,
        TypeTag::Timestamp,
        TypeTag::DateTimeExt,
        TypeTag::TimestampExt,
    ];
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Integer => "integer",
            TypeTag::Float => "float",
            TypeTag::Boolean => "boolean",
            TypeTag::String => "string",
            TypeTag::Array => "array",
            TypeTag::ArrayLike => "array-object",
            TypeTag::DateTime => "datetime",
            TypeTag::Timestamp => "timestamp",
            TypeTag::DateTimeExt => "datetime-ext",
            TypeTag::TimestampExt => "timestamp-ext",
        }
    }
    /// Tags that need a date provider.
    pub fn is_extended(&self) -> bool {
        matches!(self, TypeTag::DateTimeExt | TypeTag::TimestampExt)
    }
    /// Tags whose stored form is Unix seconds.
    ///
    /// The extended timestamp is stored like the plain one, so a saved value
    /// reads back to the same instant whichever date provider is installed.
    pub fn reads_epoch_seconds(&self) -> bool {
        matches!(self, TypeTag::Timestamp | TypeTag::TimestampExt)
    }
}
impl FromStr for TypeTag {
    type Err = TypecastError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "integer" | "int" => Ok(TypeTag::Integer),
            "float" => Ok(TypeTag::Float),
            "boolean" | "bool" => Ok(TypeTag::Boolean),
            "string" => Ok(TypeTag::String),
            "array" => Ok(TypeTag::Array),
            "array-object" | "array-like" => Ok(TypeTag::ArrayLike),
            "datetime" => Ok(TypeTag::DateTime),
            "timestamp" => Ok(TypeTag::Timestamp),
            "datetime-ext" => Ok(TypeTag::DateTimeExt),
            "timestamp-ext" => Ok(TypeTag::TimestampExt),
            other => Err(TypecastError::InvalidArgument(format!(
                "Unsupported attribute type '{other}'"
            ))),
        }
    }
}
impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ------------- Conversion rules --------------

/// A user supplied conversion. Its errors reach the caller untouched.
pub type CastFn = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

#[derive(Clone)]
pub enum ConversionRule {
    Tag(TypeTag),
    Custom(CastFn),
}

impl ConversionRule {
    pub fn custom<F>(convert: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        ConversionRule::Custom(Arc::new(convert))
    }
    pub fn tag(&self) -> Option<TypeTag> {
        match self {
            ConversionRule::Tag(tag) => Some(*tag),
            ConversionRule::Custom(_) => None,
        }
    }
}
impl From<TypeTag> for ConversionRule {
    fn from(tag: TypeTag) -> Self {
        ConversionRule::Tag(tag)
    }
}
impl PartialEq for ConversionRule {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConversionRule::Tag(a), ConversionRule::Tag(b)) => a == b,
            (ConversionRule::Custom(a), ConversionRule::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
impl fmt::Debug for ConversionRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConversionRule::Tag(tag) => write!(f, "Tag({tag})"),
            ConversionRule::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Ordered mapping from attribute name to its conversion rule.
///
/// Inserting a name that is already present replaces its rule but keeps its
/// position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeTypes {
    entries: Vec<(String, ConversionRule)>,
}

impl AttributeTypes {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with(mut self, name: impl Into<String>, rule: impl Into<ConversionRule>) -> Self {
        self.insert(name, rule);
        self
    }
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        rule: impl Into<ConversionRule>,
    ) -> Option<ConversionRule> {
        let name = name.into();
        let rule = rule.into();
        match self.entries.iter_mut().find(|(kept, _)| *kept == name) {
            Some((_, kept_rule)) => Some(std::mem::replace(kept_rule, rule)),
            None => {
                self.entries.push((name, rule));
                None
            }
        }
    }
    pub fn get(&self, name: &str) -> Option<&ConversionRule> {
        self.entries
            .iter()
            .find(|(kept, _)| kept == name)
            .map(|(_, rule)| rule)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
    pub fn tag_of(&self, name: &str) -> Option<TypeTag> {
        self.get(name).and_then(ConversionRule::tag)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConversionRule)> {
        self.entries.iter().map(|(name, rule)| (name.as_str(), rule))
    }
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    /// The entries named in `names`, in map order.
    ///
    /// Fails on the first name without a mapping.
    pub fn select(&self, names: &[&str]) -> Result<AttributeTypes> {
        if let Some(missing) = names.iter().find(|name| !self.contains(name)) {
            return Err(TypecastError::InvalidArgument(format!(
                "There is no type mapping for '{missing}'."
            )));
        }
        Ok(Self {
            entries: self
                .entries
                .iter()
                .filter(|(name, _)| names.contains(&name.as_str()))
                .cloned()
                .collect(),
        })
    }
}
impl<N: Into<String>, R: Into<ConversionRule>> FromIterator<(N, R)> for AttributeTypes {
    fn from_iter<I: IntoIterator<Item = (N, R)>>(iter: I) -> Self {
        let mut types = AttributeTypes::new();
        for (name, rule) in iter {
            types.insert(name, rule);
        }
        types
    }
}

// Config files can only name tags; custom rules are added in code.
impl<'de> Deserialize<'de> for AttributeTypes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TypeMapVisitor;
        impl<'de> Visitor<'de> for TypeMapVisitor {
            type Value = AttributeTypes;
            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a map of attribute names to type names")
            }
            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<AttributeTypes, A::Error> {
                let mut types = AttributeTypes::new();
                while let Some((name, tag)) = map.next_entry::<String, String>()? {
                    let tag = TypeTag::from_str(&tag).map_err(de::Error::custom)?;
                    types.insert(name, tag);
                }
                Ok(types)
            }
        }
        deserializer.deserialize_map(TypeMapVisitor)
    }
}
