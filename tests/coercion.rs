use chrono::{FixedOffset, TimeZone, Utc};
use modelcast::TypecastError;
use modelcast::coercion::{Caster, FixedZoneProvider};
use modelcast::datatype::{ConversionRule, Document, TypeTag, Value};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;

fn cast(value: impl Into<Value>, tag: TypeTag) -> Value {
    Caster::new().cast_tag(value.into(), tag).expect("cast")
}

fn noon_utc() -> Value {
    Value::from(Utc.with_ymd_and_hms(2015, 5, 15, 10, 20, 30).unwrap())
}

#[test]
fn integer_reads_leading_numeric_prefix() {
    assert_eq!(cast("58", TypeTag::Integer), Value::Integer(58));
    assert_eq!(cast("12abc", TypeTag::Integer), Value::Integer(12));
    assert_eq!(cast("1e3", TypeTag::Integer), Value::Integer(1000));
    assert_eq!(cast("1.9", TypeTag::Integer), Value::Integer(1));
    assert_eq!(cast("abc", TypeTag::Integer), Value::Integer(0));
    assert_eq!(cast("  -7 apples", TypeTag::Integer), Value::Integer(-7));
    assert_eq!(cast("", TypeTag::Integer), Value::Integer(0));
}

#[test]
fn integer_from_other_scalars() {
    assert_eq!(cast(-2.7, TypeTag::Integer), Value::Integer(-2));
    assert_eq!(cast(f64::NAN, TypeTag::Integer), Value::Integer(0));
    assert_eq!(cast(f64::INFINITY, TypeTag::Integer), Value::Integer(0));
    assert_eq!(cast(true, TypeTag::Integer), Value::Integer(1));
    assert_eq!(cast(Value::Null, TypeTag::Integer), Value::Integer(0));
    assert_eq!(cast(Value::Json(json!([])), TypeTag::Integer), Value::Integer(0));
    assert_eq!(cast(Value::Json(json!([4, 5])), TypeTag::Integer), Value::Integer(1));
}

#[test]
fn float_reads_leading_numeric_prefix() {
    assert_eq!(cast("100.8", TypeTag::Float), Value::Float(100.8));
    assert_eq!(cast(".5", TypeTag::Float), Value::Float(0.5));
    assert_eq!(cast("1e3", TypeTag::Float), Value::Float(1000.0));
    assert_eq!(cast("2.5kg", TypeTag::Float), Value::Float(2.5));
    assert_eq!(cast("x", TypeTag::Float), Value::Float(0.0));
    assert_eq!(cast(3, TypeTag::Float), Value::Float(3.0));
    assert_eq!(cast(Value::Null, TypeTag::Float), Value::Float(0.0));
}

#[test]
fn boolean_follows_truthiness() {
    for falsy in [
        Value::Null,
        Value::Bool(false),
        Value::Integer(0),
        Value::Float(0.0),
        Value::from(""),
        Value::from("0"),
        Value::Json(json!([])),
        Value::Json(json!({})),
    ] {
        assert_eq!(cast(falsy.clone(), TypeTag::Boolean), Value::Bool(false), "{falsy:?}");
    }
    for truthy in [
        Value::Integer(1),
        Value::Integer(-1),
        Value::from("a"),
        Value::from("0.0"),
        Value::from("false"),
        Value::Json(json!({"a": 1})),
        noon_utc(),
    ] {
        assert_eq!(cast(truthy.clone(), TypeTag::Boolean), Value::Bool(true), "{truthy:?}");
    }
}

#[test]
fn string_is_canonical() {
    assert_eq!(cast(123, TypeTag::String), Value::from("123"));
    assert_eq!(cast(true, TypeTag::String), Value::from("1"));
    assert_eq!(cast(false, TypeTag::String), Value::from(""));
    assert_eq!(cast(Value::Null, TypeTag::String), Value::from(""));
    assert_eq!(cast(100.8, TypeTag::String), Value::from("100.8"));
    assert_eq!(
        cast(Value::Json(json!({"foo": "bar", "list": [1, 2]})), TypeTag::String),
        Value::from(r#"{"foo":"bar","list":[1,2]}"#)
    );
    assert_eq!(cast(noon_utc(), TypeTag::String), Value::from("2015-05-15 10:20:30"));
}

#[test]
fn array_decodes_json_text() {
    assert_eq!(
        cast(r#"{"foo":"bar"}"#, TypeTag::Array),
        Value::Json(json!({"foo": "bar"}))
    );
    assert_eq!(cast("[1,2,3]", TypeTag::Array), Value::Json(json!([1, 2, 3])));
    assert_eq!(cast("5", TypeTag::Array), Value::Integer(5));
    assert_eq!(cast(Value::Null, TypeTag::Array), Value::Null);

    let error = Caster::new()
        .cast_tag(Value::from("{not json"), TypeTag::Array)
        .unwrap_err();
    assert!(matches!(error, TypecastError::Typecast(_)), "{error}");
}

#[test]
fn array_keeps_object_key_order() {
    let value = cast(r#"{"z":1,"a":2,"m":3}"#, TypeTag::Array);
    let keys: Vec<String> = value
        .as_json()
        .and_then(|json| json.as_object())
        .expect("object")
        .keys()
        .cloned()
        .collect();
    assert_eq!(keys, vec!["z", "a", "m"]);
}

#[test]
fn array_like_wraps_in_document() {
    let value = cast(r#"{"foo":"bar"}"#, TypeTag::ArrayLike);
    let document = value.as_document().expect("document");
    assert_eq!(document.get("foo"), Some(json!("bar")));
    assert_eq!(document.len(), 1);

    let error = Caster::new()
        .cast_tag(Value::from("5"), TypeTag::ArrayLike)
        .unwrap_err();
    assert!(matches!(error, TypecastError::Typecast(_)), "{error}");
}

#[test]
fn array_like_passes_documents_through_as_the_same_handle() {
    let document = Document::new(json!({"foo": "bar"}));
    let value = cast(Value::Document(document.clone()), TypeTag::ArrayLike);
    assert!(value.as_document().expect("document").ptr_eq(&document));
    let value = cast(Value::Json(json!([1])), TypeTag::ArrayLike);
    assert_eq!(value, Value::Json(json!([1])));
}

#[test]
fn datetime_parses_fixed_format_as_utc() {
    assert_eq!(cast("2015-05-15 10:20:30", TypeTag::DateTime), noon_utc());
    assert_eq!(cast(noon_utc(), TypeTag::DateTime), noon_utc());
    assert_eq!(cast(Value::Null, TypeTag::DateTime), Value::Null);

    let error = Caster::new()
        .cast_tag(Value::from("15/05/2015"), TypeTag::DateTime)
        .unwrap_err();
    assert!(matches!(error, TypecastError::Typecast(_)), "{error}");
}

#[test]
fn timestamp_reads_unix_seconds() {
    assert_eq!(cast(1431685230, TypeTag::Timestamp), noon_utc());
    assert_eq!(cast("1431685230", TypeTag::Timestamp), noon_utc());
    assert_eq!(cast(noon_utc(), TypeTag::Timestamp), noon_utc());

    let error = Caster::new()
        .cast_tag(Value::Integer(i64::MAX), TypeTag::Timestamp)
        .unwrap_err();
    assert!(matches!(error, TypecastError::Typecast(_)), "{error}");
}

#[test]
fn extended_dates_need_a_provider() {
    for tag in [TypeTag::DateTimeExt, TypeTag::TimestampExt] {
        let error = Caster::new()
            .cast_tag(Value::from("2015-05-15 10:20:30"), tag)
            .unwrap_err();
        assert!(matches!(error, TypecastError::InvalidArgument(_)), "{error}");
    }
}

#[test]
fn extended_dates_use_the_provider_zone() {
    let provider = FixedZoneProvider::east(3600).expect("offset");
    let caster = Caster::new().with_date_provider(Arc::new(provider));
    let offset = FixedOffset::east_opt(3600).unwrap();

    let local = caster
        .cast_tag(Value::from("2015-05-15 10:20:30"), TypeTag::DateTimeExt)
        .expect("cast");
    let moment = local.as_datetime().expect("datetime");
    assert_eq!(moment.offset(), &offset);
    assert_eq!(moment.timestamp(), 1431681630);

    let stamped = caster
        .cast_tag(Value::Integer(1431685230), TypeTag::TimestampExt)
        .expect("cast");
    assert_eq!(
        stamped.as_datetime().expect("datetime").to_string(),
        "2015-05-15 11:20:30 +01:00"
    );
}

#[test]
fn expressions_pass_tags_unchanged() {
    let expression = Value::expression("datetime('now')");
    for tag in TypeTag::ALL {
        assert_eq!(cast(expression.clone(), tag), expression, "{tag}");
    }
}

#[test]
fn casting_twice_is_casting_once() {
    let samples = [
        Value::from("42"),
        Value::from("2015-05-15 10:20:30"),
        Value::from(r#"{"foo":"bar"}"#),
        Value::Integer(1431685230),
        Value::Bool(true),
    ];
    let caster = Caster::new();
    for tag in [
        TypeTag::Integer,
        TypeTag::Float,
        TypeTag::Boolean,
        TypeTag::String,
        TypeTag::Array,
        TypeTag::ArrayLike,
        TypeTag::DateTime,
        TypeTag::Timestamp,
    ] {
        for sample in &samples {
            let Ok(once) = caster.cast_tag(sample.clone(), tag) else {
                continue;
            };
            let twice = caster.cast_tag(once.clone(), tag).expect("second cast");
            assert_eq!(twice, once, "{tag} of {sample:?}");
        }
    }
}

#[test]
fn custom_rules_see_the_raw_value_and_keep_their_errors() {
    let caster = Caster::new();
    let shout = ConversionRule::custom(|value| Ok(Value::String(value.to_text().to_uppercase())));
    assert_eq!(caster.cast(Value::from("foo"), &shout).expect("cast"), Value::from("FOO"));

    let failing = ConversionRule::custom(|_| Err(TypecastError::callback("rejected by rule")));
    let error = caster.cast(Value::from("foo"), &failing).unwrap_err();
    assert!(matches!(error, TypecastError::Callback(_)));
    assert_eq!(error.to_string(), "rejected by rule");
}

#[test]
fn tag_names_and_aliases() {
    assert_eq!(TypeTag::from_str("int").unwrap(), TypeTag::Integer);
    assert_eq!(TypeTag::from_str("bool").unwrap(), TypeTag::Boolean);
    assert_eq!(TypeTag::from_str("array-like").unwrap(), TypeTag::ArrayLike);
    for tag in TypeTag::ALL {
        assert_eq!(TypeTag::from_str(tag.name()).unwrap(), tag);
    }
    let error = TypeTag::from_str("money").unwrap_err();
    assert!(matches!(error, TypecastError::InvalidArgument(_)));
    assert!(error.to_string().contains("Unsupported attribute type 'money'"));
}
