//! The coercion engine.
//!
//! [`Caster::cast`] turns a raw attribute value and a [`ConversionRule`] into
//! a typed value. Numbers are read from strings by their leading numeric
//! prefix, so `"12abc"` is 12 and `"abc"` is 0, and truthiness treats `""`,
//! `"0"`, zero, null and empty containers as false.
//!
//! The extended date tags go through a [`DateProvider`], which has to be
//! installed on the caster before they can be used.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;

use crate::datatype::{ConversionRule, DATETIME_FORMAT, Document, TypeTag, Value};
use crate::error::{Result, TypecastError};

lazy_static! {
    static ref NUMERIC_PREFIX: Regex = Regex::new(
        r"^[ \t\n\r\x0B\x0C]*([+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?)"
    )
    .expect("numeric prefix pattern");
}

fn numeric_prefix(text: &str) -> Option<&str> {
    NUMERIC_PREFIX
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|prefix| prefix.as_str())
}

fn float_to_int(f: f64) -> i64 {
    if f.is_finite() { f.trunc() as i64 } else { 0 }
}

fn parse_int(text: &str) -> i64 {
    match numeric_prefix(text) {
        Some(number) if number.contains(['.', 'e', 'E']) => {
            float_to_int(number.parse::<f64>().unwrap_or(0.0))
        }
        // integers too large for i64 saturate through the float reading
        Some(number) => number
            .parse::<i64>()
            .unwrap_or_else(|_| float_to_int(number.parse::<f64>().unwrap_or(0.0))),
        None => 0,
    }
}

fn parse_float(text: &str) -> f64 {
    numeric_prefix(text)
        .and_then(|number| number.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NAN".to_owned()
    } else if f.is_infinite() {
        if f > 0.0 { "INF".to_owned() } else { "-INF".to_owned() }
    } else {
        format!("{f}")
    }
}

fn json_is_empty_container(json: &Json) -> Option<bool> {
    match json {
        Json::Array(items) => Some(items.is_empty()),
        Json::Object(entries) => Some(entries.is_empty()),
        _ => None,
    }
}

impl Value {
    /// Integer reading of the value.
    pub fn to_int(&self) -> i64 {
        match self {
            Value::Null => 0,
            Value::Bool(b) => i64::from(*b),
            Value::Integer(i) => *i,
            Value::Float(f) => float_to_int(*f),
            Value::String(s) => parse_int(s),
            Value::Bytes(bytes) => parse_int(&String::from_utf8_lossy(bytes)),
            Value::Json(json) => match json_is_empty_container(json) {
                Some(empty) => i64::from(!empty),
                None => Value::from_json(json.clone()).to_int(),
            },
            Value::Document(document) => i64::from(!document.is_empty()),
            Value::DateTime(_) | Value::Object(_) => 1,
            Value::Expression(expression) => parse_int(expression.sql()),
        }
    }
    /// Float reading of the value.
    pub fn to_float(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Float(f) => *f,
            Value::String(s) => parse_float(s),
            Value::Bytes(bytes) => parse_float(&String::from_utf8_lossy(bytes)),
            Value::Expression(expression) => parse_float(expression.sql()),
            Value::Json(json) if json_is_empty_container(json).is_none() => {
                Value::from_json(json.clone()).to_float()
            }
            other => other.to_int() as f64,
        }
    }
    /// Truthiness of the value.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !(s.is_empty() || s == "0"),
            Value::Bytes(bytes) => !(bytes.is_empty() || bytes.as_slice() == b"0"),
            Value::Json(json) => match json_is_empty_container(json) {
                Some(empty) => !empty,
                None => Value::from_json(json.clone()).to_bool(),
            },
            Value::Document(_) | Value::DateTime(_) | Value::Object(_) | Value::Expression(_) => {
                true
            }
        }
    }
    /// Canonical string form of the value.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(true) => "1".to_owned(),
            Value::Bool(false) => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::String(s) => s.clone(),
            Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Value::Json(json) => json.to_string(),
            Value::Document(document) => document.copy().to_string(),
            Value::DateTime(moment) => moment.format(DATETIME_FORMAT).to_string(),
            Value::Object(object) => object.to_string(),
            Value::Expression(expression) => expression.sql().to_owned(),
        }
    }
}

// ------------- Date providers --------------

/// Date handling for the extended date tags.
pub trait DateProvider: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    /// Reads `YYYY-MM-DD HH:MM:SS` text. None when the text does not match.
    fn parse(&self, text: &str) -> Option<DateTime<FixedOffset>>;
    /// None when the seconds are out of range.
    fn from_timestamp(&self, seconds: i64) -> Option<DateTime<FixedOffset>>;
}

/// Reads date-times in one fixed UTC offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedZoneProvider {
    offset: FixedOffset,
}

impl FixedZoneProvider {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }
    /// None when the offset is a day or more.
    pub fn east(seconds: i32) -> Option<Self> {
        FixedOffset::east_opt(seconds).map(Self::new)
    }
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}
impl DateProvider for FixedZoneProvider {
    fn name(&self) -> &str {
        "fixed-zone"
    }
    fn parse(&self, text: &str) -> Option<DateTime<FixedOffset>> {
        let naive = NaiveDateTime::parse_from_str(text, DATETIME_FORMAT).ok()?;
        self.offset.from_local_datetime(&naive).single()
    }
    fn from_timestamp(&self, seconds: i64) -> Option<DateTime<FixedOffset>> {
        DateTime::<Utc>::from_timestamp(seconds, 0).map(|utc| utc.with_timezone(&self.offset))
    }
}

// ------------- Caster --------------

#[derive(Clone, Default)]
pub struct Caster {
    date_provider: Option<Arc<dyn DateProvider>>,
}

impl fmt::Debug for Caster {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Caster")
            .field(
                "date_provider",
                &self.date_provider.as_ref().map(|p| p.name().to_owned()),
            )
            .finish()
    }
}

impl Caster {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_date_provider(mut self, provider: Arc<dyn DateProvider>) -> Self {
        self.date_provider = Some(provider);
        self
    }
    pub fn date_provider(&self) -> Option<&Arc<dyn DateProvider>> {
        self.date_provider.as_ref()
    }

    pub fn cast(&self, value: Value, rule: &ConversionRule) -> Result<Value> {
        match rule {
            ConversionRule::Custom(convert) => convert(value),
            ConversionRule::Tag(tag) => self.cast_tag(value, *tag),
        }
    }

    /// Casts by tag. Expressions pass every tag unchanged, their value only
    /// exists in storage.
    pub fn cast_tag(&self, value: Value, tag: TypeTag) -> Result<Value> {
        if let Value::Expression(_) = value {
            return Ok(value);
        }
        match tag {
            TypeTag::Integer => Ok(Value::Integer(value.to_int())),
            TypeTag::Float => Ok(Value::Float(value.to_float())),
            TypeTag::Boolean => Ok(Value::Bool(value.to_bool())),
            TypeTag::String => Ok(Value::String(value.to_text())),
            TypeTag::Array => {
                if value.is_null() || value.is_container() {
                    return Ok(value);
                }
                decode_json(&value.to_text()).map(Value::from_json)
            }
            TypeTag::ArrayLike => {
                if value.is_null() || value.is_container() {
                    return Ok(value);
                }
                match decode_json(&value.to_text())? {
                    json @ (Json::Array(_) | Json::Object(_)) => {
                        Ok(Value::Document(Document::new(json)))
                    }
                    other => Err(TypecastError::Typecast(format!(
                        "the JSON document {other} is not a list or a map"
                    ))),
                }
            }
            TypeTag::DateTime | TypeTag::DateTimeExt => {
                if matches!(value, Value::Null | Value::DateTime(_)) {
                    return Ok(value);
                }
                let text = value.to_text();
                let parsed = match self.provider_for(tag)? {
                    Some(provider) => provider.parse(&text),
                    None => FixedZoneProvider::utc().parse(&text),
                };
                parsed.map(Value::DateTime).ok_or_else(|| {
                    TypecastError::Typecast(format!(
                        "'{text}' is not a date-time in the format YYYY-MM-DD HH:MM:SS"
                    ))
                })
            }
            TypeTag::Timestamp | TypeTag::TimestampExt => {
                if matches!(value, Value::Null | Value::DateTime(_)) {
                    return Ok(value);
                }
                let seconds = value.to_int();
                let moment = match self.provider_for(tag)? {
                    Some(provider) => provider.from_timestamp(seconds),
                    None => FixedZoneProvider::utc().from_timestamp(seconds),
                };
                moment.map(Value::DateTime).ok_or_else(|| {
                    TypecastError::Typecast(format!("{seconds} is out of range for a timestamp"))
                })
            }
        }
    }

    // extended tags require an installed provider, plain tags never use one
    fn provider_for(&self, tag: TypeTag) -> Result<Option<&Arc<dyn DateProvider>>> {
        if !tag.is_extended() {
            return Ok(None);
        }
        match &self.date_provider {
            Some(provider) => Ok(Some(provider)),
            None => Err(TypecastError::InvalidArgument(format!(
                "the '{tag}' type needs a date provider, and none has been installed"
            ))),
        }
    }
}

fn decode_json(text: &str) -> Result<Json> {
    serde_json::from_str(text)
        .map_err(|e| TypecastError::Typecast(format!("malformed JSON '{text}': {e}")))
}
