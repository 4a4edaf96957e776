//! Annotation values.
//!
//! Parsed annotation arguments are a small dynamic value model: PHP scalars,
//! PHP ordered arrays, and nested annotations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AnnotationError;

/// A parsed annotation: the resolved class name and its field values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Fully-qualified class name without leading `\`.
    pub class: String,
    pub fields: BTreeMap<String, Value>,
}

impl Annotation {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into().trim_start_matches('\\').to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The class name without its namespace.
    pub fn short_name(&self) -> &str {
        crate::types::short_name(&self.class)
    }

    /// Convert into a typed annotation.
    pub fn to_typed<T: FromAnnotation>(&self) -> Result<T, AnnotationError> {
        T::from_annotation(self)
    }
}

/// A key of a PHP array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArrayKey {
    Index(i64),
    Name(String),
}

impl ArrayKey {
    /// PHP key normalization: a canonical decimal integer string is an
    /// integer key.
    pub fn from_string(key: String) -> Self {
        match key.parse::<i64>() {
            Ok(n) if n.to_string() == key => ArrayKey::Index(n),
            _ => ArrayKey::Name(key),
        }
    }
}

impl std::fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArrayKey::Index(n) => write!(f, "{}", n),
            ArrayKey::Name(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayEntry {
    pub key: ArrayKey,
    pub value: Value,
}

/// A value appearing in an annotation argument list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(#[serde(with = "php_float")] f64),
    String(String),
    /// Ordered PHP array.
    Array(Vec<ArrayEntry>),
    Annotation(Box<Annotation>),
}

impl Value {
    /// Build a list value with keys `0..n`.
    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        let mut builder = ArrayBuilder::default();
        for value in values {
            builder.push(value);
        }
        builder.finish()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ArrayEntry]> {
        match self {
            Value::Array(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_annotation(&self) -> Option<&Annotation> {
        match self {
            Value::Annotation(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Array element lookup by key.
    pub fn get(&self, key: &ArrayKey) -> Option<&Value> {
        self.as_array()?
            .iter()
            .find(|entry| &entry.key == key)
            .map(|entry| &entry.value)
    }

    /// The values of an array, in order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.as_array()
            .unwrap_or_default()
            .iter()
            .map(|entry| &entry.value)
    }

    /// Plain JSON rendering, used for CLI output.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Integer(n) => Json::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(entries) => {
                let is_list = entries
                    .iter()
                    .enumerate()
                    .all(|(i, e)| e.key == ArrayKey::Index(i as i64));
                if is_list {
                    Json::Array(entries.iter().map(|e| e.value.to_json()).collect())
                } else {
                    Json::Object(
                        entries
                            .iter()
                            .map(|e| (e.key.to_string(), e.value.to_json()))
                            .collect(),
                    )
                }
            }
            Value::Annotation(a) => a.to_json(),
        }
    }
}

impl Annotation {
    /// Plain JSON rendering: `{"@class": ..., field: ...}`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        object.insert("@class".to_string(), serde_json::Value::String(self.class.clone()));
        for (name, value) in &self.fields {
            object.insert(name.clone(), value.to_json());
        }
        serde_json::Value::Object(object)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Annotation> for Value {
    fn from(a: Annotation) -> Self {
        Value::Annotation(Box::new(a))
    }
}

/// JSON has no infinities or NaN, so those are stored under their PHP names.
mod php_float {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NAN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "INF" } else { "-INF" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Named(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Named(name) => match name.as_str() {
                "INF" => Ok(f64::INFINITY),
                "-INF" => Ok(f64::NEG_INFINITY),
                "NAN" => Ok(f64::NAN),
                other => Err(serde::de::Error::custom(format!("invalid float `{}`", other))),
            },
        }
    }
}

/// Builds a PHP array: unkeyed entries get the next integer index, and a
/// repeated key overwrites the earlier entry in place.
#[derive(Debug, Default)]
pub(crate) struct ArrayBuilder {
    entries: Vec<ArrayEntry>,
    next_index: i64,
}

impl ArrayBuilder {
    pub fn push(&mut self, value: Value) {
        let key = ArrayKey::Index(self.next_index);
        self.insert(key, value);
    }

    pub fn insert(&mut self, key: ArrayKey, value: Value) {
        if let ArrayKey::Index(n) = key
            && n >= self.next_index
        {
            self.next_index = n.saturating_add(1);
        }
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.value = value,
            None => self.entries.push(ArrayEntry { key, value }),
        }
    }

    pub fn finish(self) -> Value {
        Value::Array(self.entries)
    }
}

/// Conversion of a parsed [`Annotation`] into a typed Rust value.
pub trait FromAnnotation: Sized {
    fn from_annotation(annotation: &Annotation) -> Result<Self, AnnotationError>;
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_builder_follows_php_key_rules() {
        let mut builder = ArrayBuilder::default();
        builder.push(Value::from("a"));
        builder.insert(ArrayKey::Index(5), Value::from("b"));
        builder.push(Value::from("c"));
        builder.insert(ArrayKey::Name("x".into()), Value::from("d"));
        builder.insert(ArrayKey::Index(0), Value::from("e"));

        let Value::Array(entries) = builder.finish() else {
            panic!("expected array");
        };
        let keys: Vec<_> = entries.iter().map(|e| e.key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                ArrayKey::Index(0),
                ArrayKey::Index(5),
                ArrayKey::Index(6),
                ArrayKey::Name("x".into()),
            ]
        );
        assert_eq!(entries[0].value, Value::from("e"));
    }

    #[test]
    fn numeric_string_keys_become_indexes() {
        assert_eq!(ArrayKey::from_string("12".into()), ArrayKey::Index(12));
        assert_eq!(ArrayKey::from_string("012".into()), ArrayKey::Name("012".into()));
        assert_eq!(ArrayKey::from_string("a".into()), ArrayKey::Name("a".into()));
    }

    struct Column {
        name: String,
        nullable: bool,
    }

    impl FromAnnotation for Column {
        fn from_annotation(annotation: &Annotation) -> Result<Self, AnnotationError> {
            let name = annotation
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| AnnotationError::semantic("@Column requires a name"))?;
            Ok(Column {
                name: name.to_string(),
                nullable: annotation
                    .get("nullable")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            })
        }
    }

    #[test]
    fn typed_conversion() {
        let annotation = Annotation::new("App\\Column").with_field("name", "email".into());
        let column: Column = annotation.to_typed().unwrap();
        assert_eq!(column.name, "email");
        assert!(!column.nullable);

        let err = Annotation::new("App\\Column").to_typed::<Column>().err().unwrap();
        assert!(err.is_semantic());
    }

    #[test]
    fn non_finite_floats_survive_serialization() {
        let value = Value::list([
            Value::Float(f64::INFINITY),
            Value::Float(f64::NEG_INFINITY),
            Value::Float(1.5),
        ]);
        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains("\"INF\"") && json.contains("\"-INF\""));
        assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), value);

        let json = serde_json::to_string(&Value::Float(f64::NAN)).unwrap();
        let nan: Value = serde_json::from_str(&json).unwrap();
        assert!(nan.as_f64().is_some_and(f64::is_nan));
    }

    #[test]
    fn json_rendering_distinguishes_lists_and_maps() {
        let list = Value::list([Value::from(1), Value::from("two")]);
        assert_eq!(list.to_json(), serde_json::json!([1, "two"]));

        let annotation = Annotation::new("\\App\\Route").with_field("path", "/home".into());
        assert_eq!(
            Value::from(annotation).to_json(),
            serde_json::json!({"@class": "App\\Route", "path": "/home"})
        );
    }
}
