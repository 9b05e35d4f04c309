
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypecastError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Typecast error: {0}")]
    Typecast(String),
    #[error("Schema not found: {0}")]
    SchemaNotFound(String),
    // errors raised by user supplied conversion functions pass through as they are
    #[error(transparent)]
    Callback(Box<dyn std::error::Error + Send + Sync>),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, TypecastError>;

impl TypecastError {
    /// Wraps an arbitrary error raised inside a custom conversion function.
    pub fn callback<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Callback(error.into())
    }
}

// Helper conversions
impl From<rusqlite::Error> for TypecastError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<::config::ConfigError> for TypecastError {
    fn from(e: ::config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
