//! Behavior options read from config files and the environment.
//!
//! ```toml
//! skip_on_null = true
//! typecast_before_save = true
//! date_offset_seconds = 3600
//!
//! [attribute_types]
//! amount = "integer"
//! created_at = "datetime"
//! ```
//!
//! Environment variables prefixed with `MODELCAST_` override file values, so
//! `MODELCAST_SKIP_ON_NULL=false` turns null skipping off.

use ::config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use tracing::debug;

use crate::datatype::AttributeTypes;
use crate::error::Result;

pub const ENVIRONMENT_PREFIX: &str = "MODELCAST";

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// None means the types are detected when the behavior is attached.
    pub attribute_types: Option<AttributeTypes>,
    pub skip_on_null: bool,
    pub typecast_after_validate: bool,
    pub typecast_before_save: bool,
    pub typecast_after_save: bool,
    pub typecast_after_find: bool,
    /// Installs a fixed zone date provider at this offset east of UTC.
    pub date_offset_seconds: Option<i32>,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            attribute_types: None,
            skip_on_null: true,
            typecast_after_validate: true,
            typecast_before_save: false,
            typecast_after_save: true,
            typecast_after_find: true,
            date_offset_seconds: None,
        }
    }
}

impl BehaviorConfig {
    /// Reads a config file (format from its extension), then the environment.
    pub fn load(path: &str) -> Result<Self> {
        debug!(path, "loading behavior config");
        Self::build(Config::builder().add_source(File::with_name(path)))
    }
    /// Reads config text in the given format, then the environment.
    pub fn parse(text: &str, format: FileFormat) -> Result<Self> {
        Self::build(Config::builder().add_source(File::from_str(text, format)))
    }
    pub fn from_toml(text: &str) -> Result<Self> {
        Self::parse(text, FileFormat::Toml)
    }
    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings = builder
            .add_source(Environment::with_prefix(ENVIRONMENT_PREFIX).try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
