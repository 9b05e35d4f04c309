#![allow(dead_code)]

use modelcast::datatype::{AttributeTypes, ConversionRule, TypeTag, Value};
use modelcast::detect::AttributeTypeCache;
use rusqlite::Connection;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn setup() -> Connection {
    init_tracing();
    let db = Connection::open_in_memory().expect("open in-memory db");
    db.execute_batch(
        "
        create table item (
            id integer primary key autoincrement,
            name varchar(128) not null default '',
            category_id integer,
            price float,
            is_active boolean,
            callback varchar(64),
            created_date datetime,
            created_timestamp integer,
            data_array text,
            data_array_object json,
            updated_at timestamp
        );
        create table note (
            id integer primary key,
            title text not null,
            created_date datetime
        );
        ",
    )
    .expect("create tables");
    db
}

pub fn callback_rule() -> ConversionRule {
    ConversionRule::custom(|value| Ok(Value::String(format!("callback: {}", value.to_text()))))
}

pub fn item_types() -> AttributeTypes {
    AttributeTypes::new()
        .with("name", TypeTag::String)
        .with("category_id", TypeTag::Integer)
        .with("price", TypeTag::Float)
        .with("is_active", TypeTag::Boolean)
        .with("callback", callback_rule())
        .with("created_date", TypeTag::DateTime)
        .with("created_timestamp", TypeTag::Timestamp)
        .with("data_array", TypeTag::Array)
        .with("data_array_object", TypeTag::ArrayLike)
}

/// A cache nobody else in the test binary sees.
pub fn isolated_cache() -> Arc<AttributeTypeCache> {
    Arc::new(AttributeTypeCache::new())
}
