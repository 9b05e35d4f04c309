// used for persistence
use rusqlite::{Connection, params, types::ToSql};
use tracing::{debug, trace};

use crate::datatype::Value;
use crate::detect::ColumnSchema;
use crate::error::{Result, TypecastError};

/// Columns and primary key of one table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    pub primary_key: Option<String>,
}

impl TableSchema {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.name == name)
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

// Expressions are written into the statement, everything else is bound.
fn placeholders<'v>(values: &'v [(String, Value)]) -> (Vec<(String, String)>, Vec<&'v dyn ToSql>) {
    let mut slots = Vec::with_capacity(values.len());
    let mut bound: Vec<&dyn ToSql> = Vec::with_capacity(values.len());
    for (name, value) in values {
        match value {
            Value::Expression(expression) => slots.push((quote(name), expression.sql().to_owned())),
            other => {
                slots.push((quote(name), "?".to_owned()));
                bound.push(other);
            }
        }
    }
    (slots, bound)
}

/// Reads and writes rows of arbitrary tables by primary key.
#[derive(Clone, Copy, Debug)]
pub struct Persistor<'db> {
    pub db: &'db Connection,
}
impl<'db> Persistor<'db> {
    pub fn new(connection: &'db Connection) -> Persistor<'db> {
        Persistor { db: connection }
    }

    pub fn describe_table(&self, table: &str) -> Result<TableSchema> {
        let mut table_info = self
            .db
            .prepare(&format!("pragma table_info({})", quote(table)))?;
        let mut columns = Vec::new();
        let mut primary_key = None;
        let mut rows = table_info.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(1)?;
            let declared: String = row.get(2)?;
            let key_position: i64 = row.get(5)?;
            if key_position == 1 {
                primary_key = Some(name.clone());
            }
            columns.push(ColumnSchema::declared(name, declared));
        }
        if columns.is_empty() {
            return Err(TypecastError::SchemaNotFound(format!(
                "The table \"{table}\" cannot be found in the database."
            )));
        }
        debug!(table, columns = columns.len(), ?primary_key, "described table");
        Ok(TableSchema {
            name: table.to_owned(),
            columns,
            primary_key,
        })
    }

    /// Inserts a row and returns its rowid.
    pub fn insert(&self, table: &str, values: &[(String, Value)]) -> Result<i64> {
        let (slots, bound) = placeholders(values);
        let sql = if slots.is_empty() {
            format!("insert into {} default values", quote(table))
        } else {
            let names: Vec<&str> = slots.iter().map(|(name, _)| name.as_str()).collect();
            let markers: Vec<&str> = slots.iter().map(|(_, marker)| marker.as_str()).collect();
            format!(
                "
                insert into {} (
                    {}
                ) values ({})
                ",
                quote(table),
                names.join(", "),
                markers.join(", ")
            )
        };
        trace!(sql = %sql, "insert");
        self.db.execute(&sql, bound.as_slice())?;
        Ok(self.db.last_insert_rowid())
    }

    /// Updates the row with the given key. Returns the number of rows changed.
    pub fn update(
        &self,
        table: &str,
        key_column: &str,
        key: &Value,
        values: &[(String, Value)],
    ) -> Result<usize> {
        if values.is_empty() {
            return Ok(0);
        }
        let (slots, mut bound) = placeholders(values);
        let assignments: Vec<String> = slots
            .iter()
            .map(|(name, marker)| format!("{name} = {marker}"))
            .collect();
        let sql = format!(
            "
            update {}
               set {}
             where {} = ?
            ",
            quote(table),
            assignments.join(", "),
            quote(key_column)
        );
        bound.push(key);
        trace!(sql = %sql, "update");
        Ok(self.db.execute(&sql, bound.as_slice())?)
    }

    /// Reads the row with the given key, all columns unless `columns` names some.
    pub fn select(
        &self,
        table: &str,
        columns: Option<&[&str]>,
        key_column: &str,
        key: &Value,
    ) -> Result<Option<Vec<(String, Value)>>> {
        let projection = match columns {
            Some(columns) => columns
                .iter()
                .map(|column| quote(column))
                .collect::<Vec<_>>()
                .join(", "),
            None => "*".to_owned(),
        };
        let mut select = self.db.prepare(&format!(
            "
            select {projection}
              from {}
             where {} = ?
            ",
            quote(table),
            quote(key_column)
        ))?;
        let names: Vec<String> = select
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut rows = select.query(params![key])?;
        match rows.next()? {
            Some(row) => {
                let mut values = Vec::with_capacity(names.len());
                for (index, name) in names.iter().enumerate() {
                    values.push((name.clone(), row.get::<_, Value>(index)?));
                }
                Ok(Some(values))
            }
            None => Ok(None),
        }
    }
}
