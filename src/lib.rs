//! Modelcast - attribute typecasting for models that live in a relational store.
//!
//! Values arrive on a model loosely typed: strings from a submitted form,
//! scalars from a database driver. A [`behavior::TypecastBehavior`] attached to
//! the model converts its attributes into typed values after validation and
//! after a load, and turns them back into storable scalars for the duration
//! of a save:
//! * A [`datatype::TypeTag`] names one of the built-in conversions (integer,
//!   float, boolean, string, JSON list or map, date-time, Unix timestamp).
//! * A [`datatype::ConversionRule`] is either a tag or a user function.
//! * An [`datatype::AttributeTypes`] map assigns a rule to each attribute.
//!   When none is given it is detected from the model's table schema or from
//!   its validation rules, and cached per model.
//!
//! ## Modules
//! * [`datatype`] - The [`datatype::Value`] carried by attributes, type tags and rules.
//! * [`coercion`] - The [`coercion::Caster`] applying a rule to a value, and date providers.
//! * [`detect`] - Type map detection and the [`detect::AttributeTypeCache`].
//! * [`behavior`] - Lifecycle hooks and the stash / restore protocol around saves.
//! * [`model`] - The [`model::Model`] contract a behavior works against.
//! * [`config`] - Behavior options from config files and the environment.
//! * [`persist`] / [`record`] - A SQLite backed [`record::Record`] driving the save and find hooks.
//! * [`form`] - An in-memory [`form::Form`] typed from its validation rules.
//!
//! ## Storage round trip
//! Before a write every value a driver cannot bind is stashed and replaced:
//! JSON containers become JSON text, date-times become `YYYY-MM-DD HH:MM:SS`
//! in UTC (or Unix seconds for timestamp attributes). After the write the stashed
//! values are put back, so the model holds the same objects it held before.
//!
//! ## Quick Start
//! ```
//! use modelcast::datatype::{AttributeTypes, ConversionRule, TypeTag, Value};
//! use modelcast::{behavior::TypecastBehavior, form::Form};
//!
//! let types = AttributeTypes::new()
//!     .with("amount", TypeTag::Integer)
//!     .with("price", TypeTag::Float)
//!     .with("note", ConversionRule::custom(|value| Ok(Value::from(format!("note: {value}")))));
//! let mut form = Form::new("order", &["amount", "price", "note"]);
//! form.attach(TypecastBehavior::new(types)).unwrap();
//! form.set("amount", "58");
//! form.set("price", "100.8");
//! form.set("note", "fragile");
//! assert!(form.validate().unwrap());
//! assert_eq!(form.get("amount"), Value::Integer(58));
//! assert_eq!(form.get("price"), Value::Float(100.8));
//! assert_eq!(form.get("note"), Value::from("note: fragile"));
//! ```
//!
//! ## Logging
//! The crate logs through `tracing`: attach and detection at `debug`, every
//! cast and stash at `trace`, discarded stashes and failed writes at `warn`.

pub mod behavior;
pub mod coercion;
pub mod config;
pub mod datatype;
pub mod detect;
pub mod error;
pub mod form;
pub mod model;
pub mod persist;
pub mod record;

pub use error::{Result, TypecastError};
