//! A storable reference model: one row of one SQLite table.
//!
//! Only attributes that were loaded or assigned are written, so a record found
//! with a subset of its columns leaves the other columns alone when saved.

use rusqlite::Connection;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::behavior::{LifecycleEvent, TypecastBehavior};
use crate::datatype::Value;
use crate::detect::ColumnSchema;
use crate::error::{Result, TypecastError};
use crate::model::{Model, Storable};
use crate::persist::{Persistor, TableSchema};

pub struct Record<'db> {
    persistor: Persistor<'db>,
    schema: TableSchema,
    values: HashMap<String, Value>,
    errors: Vec<String>,
    new_record: bool,
    typecast: Option<TypecastBehavior>,
}

impl<'db> Record<'db> {
    /// A new, unsaved record for the table.
    pub fn new(db: &'db Connection, table: &str) -> Result<Self> {
        let persistor = Persistor::new(db);
        let schema = persistor.describe_table(table)?;
        Ok(Record {
            persistor,
            schema,
            values: HashMap::new(),
            errors: Vec::new(),
            new_record: true,
            typecast: None,
        })
    }
    pub fn with_behavior(
        db: &'db Connection,
        table: &str,
        behavior: TypecastBehavior,
    ) -> Result<Self> {
        let mut record = Self::new(db, table)?;
        record.attach(behavior)?;
        Ok(record)
    }
    pub fn find_by_pk(
        db: &'db Connection,
        table: &str,
        key: impl Into<Value>,
        behavior: Option<TypecastBehavior>,
    ) -> Result<Option<Self>> {
        Self::find(db, table, None, key.into(), behavior)
    }
    /// Loads only the given columns of the row.
    pub fn find_columns_by_pk(
        db: &'db Connection,
        table: &str,
        columns: &[&str],
        key: impl Into<Value>,
        behavior: Option<TypecastBehavior>,
    ) -> Result<Option<Self>> {
        Self::find(db, table, Some(columns), key.into(), behavior)
    }
    fn find(
        db: &'db Connection,
        table: &str,
        columns: Option<&[&str]>,
        key: Value,
        behavior: Option<TypecastBehavior>,
    ) -> Result<Option<Self>> {
        let mut record = Self::new(db, table)?;
        let key_column = record.key_column()?.to_owned();
        let Some(row) = record.persistor.select(table, columns, &key_column, &key)? else {
            return Ok(None);
        };
        record.values = row.into_iter().collect();
        record.new_record = false;
        if let Some(behavior) = behavior {
            record.attach(behavior)?;
        }
        record.fire(LifecycleEvent::AfterFind)?;
        Ok(Some(record))
    }

    pub fn attach(&mut self, mut behavior: TypecastBehavior) -> Result<()> {
        behavior.attach(self)?;
        self.typecast = Some(behavior);
        Ok(())
    }
    pub fn behavior(&self) -> Option<&TypecastBehavior> {
        self.typecast.as_ref()
    }
    pub fn behavior_mut(&mut self) -> Option<&mut TypecastBehavior> {
        self.typecast.as_mut()
    }

    pub fn table(&self) -> &str {
        &self.schema.name
    }
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }
    pub fn is_new_record(&self) -> bool {
        self.new_record
    }
    pub fn get(&self, name: &str) -> Value {
        self.attribute(name)
    }
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.set_attribute(name, value.into());
    }
    pub fn primary_key(&self) -> Value {
        match &self.schema.primary_key {
            Some(key_column) => self.attribute(key_column),
            None => Value::Null,
        }
    }
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// Fires the after-validate hook. Errors are whatever the caller added.
    pub fn validate(&mut self) -> Result<bool> {
        self.fire(LifecycleEvent::AfterValidate)?;
        Ok(!self.has_errors())
    }

    /// Inserts or updates the row.
    ///
    /// Stashed values are restored whether the write succeeds or not. On a
    /// failed write the error is returned and the after-save cast is skipped.
    pub fn save(&mut self) -> Result<()> {
        self.fire(LifecycleEvent::BeforeSave)?;
        match self.write() {
            Ok(()) => self.fire(LifecycleEvent::AfterSave),
            Err(error) => {
                warn!(
                    table = %self.schema.name, %error,
                    "write failed, restoring stashed attributes"
                );
                if let Some(mut behavior) = self.typecast.take() {
                    behavior.restore_from_storage(self);
                    self.typecast = Some(behavior);
                }
                Err(error)
            }
        }
    }

    /// Reloads every column from storage. False when the row is gone.
    pub fn refresh(&mut self) -> Result<bool> {
        let key_column = self.key_column()?.to_owned();
        let key = self.attribute(&key_column);
        match self
            .persistor
            .select(&self.schema.name, None, &key_column, &key)?
        {
            Some(row) => {
                self.values = row.into_iter().collect();
                self.fire(LifecycleEvent::AfterFind)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn typecast_attributes(&mut self, names: Option<&[&str]>) -> Result<&mut Self> {
        let behavior = self.typecast.take().ok_or_else(|| {
            TypecastError::InvalidArgument(format!(
                "no typecast behavior is attached to a record of \"{}\"",
                self.schema.name
            ))
        })?;
        let outcome = behavior.typecast_attributes(self, names).map(|_| ());
        self.typecast = Some(behavior);
        outcome.map(|()| self)
    }

    fn key_column(&self) -> Result<&str> {
        self.schema.primary_key.as_deref().ok_or_else(|| {
            TypecastError::Persistence(format!(
                "the table \"{}\" has no primary key",
                self.schema.name
            ))
        })
    }

    // the behavior is taken off the record while it works on it
    fn fire(&mut self, event: LifecycleEvent) -> Result<()> {
        let Some(mut behavior) = self.typecast.take() else {
            return Ok(());
        };
        let outcome = behavior.handle(event, self);
        self.typecast = Some(behavior);
        outcome
    }

    fn write(&mut self) -> Result<()> {
        let values = self.attributes();
        if self.new_record {
            let key_column = self.schema.primary_key.clone();
            let values: Vec<_> = values
                .into_iter()
                .filter(|(name, value)| !(Some(name) == key_column.as_ref() && value.is_null()))
                .collect();
            let rowid = self.persistor.insert(&self.schema.name, &values)?;
            if let Some(key_column) = key_column {
                if self.attribute(&key_column).is_null() {
                    self.values.insert(key_column, Value::Integer(rowid));
                }
            }
            self.new_record = false;
            debug!(table = %self.schema.name, rowid, "inserted");
        } else {
            let key_column = self.key_column()?.to_owned();
            let key = self.attribute(&key_column);
            let values: Vec<_> = values
                .into_iter()
                .filter(|(name, _)| *name != key_column)
                .collect();
            let changed = self
                .persistor
                .update(&self.schema.name, &key_column, &key, &values)?;
            debug!(table = %self.schema.name, changed, "updated");
        }
        Ok(())
    }
}

impl Model for Record<'_> {
    fn model_name(&self) -> String {
        format!("record:{}", self.schema.name)
    }
    fn attribute(&self, name: &str) -> Value {
        self.values.get(name).cloned().unwrap_or(Value::Null)
    }
    fn set_attribute(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_owned(), value);
    }
    fn attributes(&self) -> Vec<(String, Value)> {
        self.schema
            .columns
            .iter()
            .filter_map(|column| {
                self.values
                    .get(&column.name)
                    .map(|value| (column.name.clone(), value.clone()))
            })
            .collect()
    }
    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
    fn as_storable(&self) -> Option<&dyn Storable> {
        Some(self)
    }
}

impl Storable for Record<'_> {
    fn describe_columns(&self) -> Result<Vec<ColumnSchema>> {
        Ok(self.schema.columns.clone())
    }
}
