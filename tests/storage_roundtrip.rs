mod common;

use chrono::{TimeZone, Utc};
use common::init_tracing;
use modelcast::behavior::TypecastBehavior;
use modelcast::coercion::Caster;
use modelcast::datatype::{AttributeTypes, CustomValue, Document, TypeTag, Value};
use modelcast::form::Form;
use modelcast::model::Model;
use serde_json::{Value as Json, json};
use std::fmt;

#[derive(Debug)]
struct Money {
    cents: i64,
    currency: &'static str,
}
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:02} {}", self.cents / 100, self.cents % 100, self.currency)
    }
}
impl CustomValue for Money {
    fn to_json(&self) -> Option<Json> {
        Some(json!({"cents": self.cents, "currency": self.currency}))
    }
}

#[derive(Debug)]
struct Tags(Vec<&'static str>);
impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}
impl CustomValue for Tags {
    fn items(&self) -> Option<Vec<Value>> {
        Some(self.0.iter().map(|tag| Value::from(*tag)).collect())
    }
}

#[derive(Debug)]
struct Color(u8, u8, u8);
impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}
impl CustomValue for Color {}

const ATTRIBUTES: [&str; 10] = [
    "amount",
    "created_date",
    "created_timestamp",
    "data_array",
    "data_array_object",
    "price",
    "tags",
    "color",
    "stamp",
    "note",
];

fn fixture() -> (Form, TypecastBehavior) {
    init_tracing();
    let types = AttributeTypes::new()
        .with("created_date", TypeTag::DateTime)
        .with("created_timestamp", TypeTag::Timestamp)
        .with("data_array", TypeTag::Array)
        .with("data_array_object", TypeTag::ArrayLike);
    let mut form = Form::new("storage", &ATTRIBUTES);
    let moment = Utc.with_ymd_and_hms(2015, 5, 15, 10, 20, 30).unwrap();
    form.set("amount", 12);
    form.set("created_date", moment);
    form.set("created_timestamp", moment);
    form.set("data_array", json!({"a": 1, "b": [1, 2]}));
    form.set("data_array_object", Document::new(json!({"foo": "bar"})));
    form.set("price", Value::object(Money { cents: 1050, currency: "EUR" }));
    form.set("tags", Value::object(Tags(vec!["new", "sale"])));
    form.set("color", Value::object(Color(255, 128, 0)));
    form.set("stamp", Value::expression("datetime('now')"));
    let mut behavior = TypecastBehavior::new(types);
    behavior.attach(&form).expect("attach");
    (form, behavior)
}

#[test]
fn prepare_replaces_non_scalars() {
    let (mut form, mut behavior) = fixture();
    behavior.prepare_for_storage(&mut form);

    assert_eq!(form.get("amount"), Value::Integer(12));
    assert_eq!(form.get("created_date"), Value::from("2015-05-15 10:20:30"));
    assert_eq!(form.get("created_timestamp"), Value::Integer(1431685230));
    assert_eq!(form.get("data_array"), Value::from(r#"{"a":1,"b":[1,2]}"#));
    assert_eq!(form.get("data_array_object"), Value::from(r#"{"foo":"bar"}"#));
    assert_eq!(form.get("price"), Value::from(r#"{"cents":1050,"currency":"EUR"}"#));
    assert_eq!(form.get("tags"), Value::from(r#"["new","sale"]"#));
    assert_eq!(form.get("color"), Value::from("#ff8000"));
    assert_eq!(form.get("stamp"), Value::expression("datetime('now')"));
    assert_eq!(form.get("note"), Value::Null);

    let stashed: Vec<&str> = behavior.stashed().names().collect();
    assert_eq!(
        stashed,
        vec![
            "created_date",
            "created_timestamp",
            "data_array",
            "data_array_object",
            "price",
            "tags",
            "color"
        ]
    );
    for (name, value) in form.attributes() {
        assert!(
            value.is_storable() || matches!(value, Value::Expression(_)),
            "{name} is {value:?}"
        );
    }
}

#[test]
fn restore_returns_the_original_values() {
    let (mut form, mut behavior) = fixture();
    let before = form.attributes();
    let document = form.get("data_array_object");

    behavior.prepare_for_storage(&mut form);
    behavior.restore_from_storage(&mut form);

    assert_eq!(form.attributes(), before);
    assert!(behavior.stashed().is_empty());
    assert!(
        form.get("data_array_object")
            .as_document()
            .expect("document")
            .ptr_eq(document.as_document().expect("document"))
    );

    behavior.restore_from_storage(&mut form);
    assert_eq!(form.attributes(), before);
}

#[test]
fn stale_stash_is_discarded_by_the_next_pass() {
    let (mut form, mut behavior) = fixture();
    behavior.prepare_for_storage(&mut form);
    assert_eq!(behavior.stashed().len(), 7);

    behavior.prepare_for_storage(&mut form);
    assert!(behavior.stashed().is_empty());
    behavior.restore_from_storage(&mut form);
    assert_eq!(form.get("created_date"), Value::from("2015-05-15 10:20:30"));
}

#[test]
fn stored_dates_cast_back_to_the_same_instant() {
    let (mut form, mut behavior) = fixture();
    let date = form.get("created_date");
    let timestamp = form.get("created_timestamp");
    behavior.prepare_for_storage(&mut form);

    let caster = Caster::new();
    assert_eq!(
        caster.cast_tag(form.get("created_date"), TypeTag::DateTime).expect("cast"),
        date
    );
    assert_eq!(
        caster.cast_tag(form.get("created_timestamp"), TypeTag::Timestamp).expect("cast"),
        timestamp
    );
}

#[test]
fn extended_timestamps_are_stored_as_seconds() {
    init_tracing();
    let types = AttributeTypes::new().with("seen", TypeTag::TimestampExt);
    let mut form = Form::new("seen", &["seen"]);
    form.set("seen", Utc.with_ymd_and_hms(2015, 5, 15, 10, 20, 30).unwrap());
    let mut behavior = TypecastBehavior::new(types);
    behavior.attach(&form).expect("attach");
    behavior.prepare_for_storage(&mut form);
    assert_eq!(form.get("seen"), Value::Integer(1431685230));
}
