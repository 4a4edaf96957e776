//! Registry of annotation classes and constants.
//!
//! The parser never looks classes up at run time by string name; every
//! class an annotation may resolve to is registered here up front, either
//! explicitly or from a reflected PHP class.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::AnnotationError;
use crate::types::{ClassLookup, ReflectionClass};

use super::value::{Annotation, Value};

/// Fully-qualified name of the ignore directive annotation.
pub const IGNORE_ANNOTATION: &str = "Doctrine\\Common\\Annotations\\Annotation\\IgnoreAnnotation";

/// Builds an annotation from its resolved field values.
pub type Constructor =
    Arc<dyn Fn(&str, BTreeMap<String, Value>) -> Result<Annotation, AnnotationError> + Send + Sync>;

/// Description of an annotation class.
#[derive(Clone)]
pub struct AnnotationClass {
    /// Fully-qualified class name without leading `\`.
    pub name: String,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    /// Declared public fields, in declaration order.  An empty list accepts
    /// any field.
    pub fields: Vec<String>,
    pub is_abstract: bool,
    /// Custom construction; the default maps values onto fields.
    pub constructor: Option<Constructor>,
}

impl fmt::Debug for AnnotationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationClass")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("interfaces", &self.interfaces)
            .field("fields", &self.fields)
            .field("is_abstract", &self.is_abstract)
            .field("constructor", &self.constructor.is_some())
            .finish()
    }
}

impl AnnotationClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim_start_matches('\\').to_string(),
            parent: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            is_abstract: false,
            constructor: None,
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into().trim_start_matches('\\').to_string());
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces
            .push(interface.into().trim_start_matches('\\').to_string());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn with_constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(&str, BTreeMap<String, Value>) -> Result<Annotation, AnnotationError>
            + Send
            + Sync
            + 'static,
    {
        self.constructor = Some(Arc::new(constructor));
        self
    }

    /// Describe a reflected PHP class: its public non-static properties
    /// become the declared fields.
    pub fn from_reflection(class: &ReflectionClass) -> Self {
        Self {
            name: class.name().to_string(),
            parent: class.parent.clone(),
            interfaces: class.interfaces.clone(),
            fields: class
                .properties
                .iter()
                .filter(|p| p.is_public() && !p.is_static)
                .map(|p| p.name.clone())
                .collect(),
            is_abstract: class.is_abstract,
            constructor: None,
        }
    }

    /// Default construction: the single `value` entry goes to the first
    /// declared field unless `value` is itself declared; undeclared names
    /// are rejected when the class declares fields.
    fn construct_default(
        &self,
        mut values: BTreeMap<String, Value>,
    ) -> Result<Annotation, AnnotationError> {
        if !self.fields.is_empty()
            && !self.fields.iter().any(|f| f == "value")
            && let Some(value) = values.remove("value")
        {
            values.insert(self.fields[0].clone(), value);
        }

        if !self.fields.is_empty()
            && let Some(unknown) = values.keys().find(|k| !self.fields.contains(k))
        {
            return Err(AnnotationError::semantic(format!(
                "The annotation @{} declared on {{context}} does not have a property named \"{}\". Available properties: {}",
                self.name,
                unknown,
                self.fields.join(", ")
            )));
        }

        Ok(Annotation {
            class: self.name.clone(),
            fields: values,
        })
    }
}

/// Known annotation classes and constants.
#[derive(Debug, Clone)]
pub struct AnnotationRegistry {
    /// Keyed by lower-cased class name.
    classes: HashMap<String, AnnotationClass>,
    /// Global constants (`FOO`) and class constants (`Foo\Bar::BAZ`),
    /// class part lower-cased.
    constants: HashMap<String, Value>,
}

impl Default for AnnotationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationRegistry {
    /// A registry containing the ignore directive annotation.
    pub fn new() -> Self {
        let mut registry = Self {
            classes: HashMap::new(),
            constants: HashMap::new(),
        };
        registry.register(
            AnnotationClass::new(IGNORE_ANNOTATION)
                .with_fields(["names"])
                .with_constructor(construct_ignore_annotation),
        );
        registry
    }

    pub fn register(&mut self, class: AnnotationClass) {
        self.classes.insert(class.name.to_ascii_lowercase(), class);
    }

    /// Register a reflected PHP class (see
    /// [`AnnotationClass::from_reflection`]).
    pub fn register_reflection(&mut self, class: &ReflectionClass) {
        self.register(AnnotationClass::from_reflection(class));
    }

    /// Define a global constant (`name`) or class constant (`Class::NAME`).
    pub fn define_constant(&mut self, name: &str, value: Value) {
        self.constants.insert(constant_key(name), value);
    }

    pub fn constant(&self, name: &str) -> Option<&Value> {
        self.constants.get(&constant_key(name))
    }

    pub fn get(&self, name: &str) -> Option<&AnnotationClass> {
        self.classes
            .get(&name.trim_start_matches('\\').to_ascii_lowercase())
    }

    pub fn class_exists(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether `class` is `ancestor` or extends / implements it.
    pub fn is_a(&self, class: &str, ancestor: &str) -> bool {
        let ancestor = ancestor.trim_start_matches('\\');
        let mut pending = vec![class.trim_start_matches('\\').to_string()];
        let mut depth = 0;

        while let Some(name) = pending.pop() {
            if name.eq_ignore_ascii_case(ancestor) {
                return true;
            }
            depth += 1;
            if depth > 64 {
                break;
            }
            if let Some(c) = self.get(&name) {
                pending.extend(c.parent.iter().cloned());
                pending.extend(c.interfaces.iter().cloned());
            }
        }
        false
    }

    /// Build an annotation of the registered class `name`.
    ///
    /// `{context}` in semantic error messages is left for the caller to
    /// fill in.
    pub fn instantiate(
        &self,
        name: &str,
        values: BTreeMap<String, Value>,
    ) -> Result<Annotation, AnnotationError> {
        let Some(class) = self.get(name) else {
            return Err(AnnotationError::semantic(format!(
                "The annotation \"@{}\" in {{context}} does not exist, or could not be auto-loaded.",
                name.trim_start_matches('\\')
            )));
        };
        if class.is_abstract {
            return Err(AnnotationError::semantic(format!(
                "The annotation @{} declared on {{context}} is abstract and cannot be instantiated.",
                class.name
            )));
        }
        match &class.constructor {
            Some(constructor) => constructor(&class.name, values),
            None => class.construct_default(values),
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassLookup for AnnotationRegistry {
    fn class_exists(&self, name: &str) -> bool {
        AnnotationRegistry::class_exists(self, name)
    }
}

fn constant_key(name: &str) -> String {
    let name = name.trim_start_matches('\\');
    match name.split_once("::") {
        Some((class, constant)) => format!("{}::{}", class.to_ascii_lowercase(), constant),
        None => name.to_string(),
    }
}

/// `@IgnoreAnnotation("name")` / `@IgnoreAnnotation({"a", "b"})`: the names
/// always end up as a list in `names`.
fn construct_ignore_annotation(
    class: &str,
    mut values: BTreeMap<String, Value>,
) -> Result<Annotation, AnnotationError> {
    let raw = values
        .remove("value")
        .or_else(|| values.remove("names"))
        .unwrap_or(Value::Null);

    let names = match raw {
        Value::String(s) => Value::list([Value::String(s)]),
        Value::Array(entries) => {
            if let Some(bad) = entries.iter().find(|e| e.value.as_str().is_none()) {
                return Err(AnnotationError::semantic(format!(
                    "@IgnoreAnnotation on {{context}} expects strings, got {:?}.",
                    bad.value
                )));
            }
            Value::list(entries.into_iter().map(|e| e.value))
        }
        other => {
            return Err(AnnotationError::semantic(format!(
                "@IgnoreAnnotation on {{context}} expects either a string name, or an array of strings, but got {:?}.",
                other
            )));
        }
    };

    Ok(Annotation::new(class).with_field("names", names))
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_value_maps_to_first_declared_field() {
        let mut registry = AnnotationRegistry::new();
        registry.register(AnnotationClass::new("App\\Route").with_fields(["path", "name"]));

        let mut values = BTreeMap::new();
        values.insert("value".to_string(), Value::from("/home"));
        let route = registry.instantiate("\\app\\route", values).unwrap();
        assert_eq!(route.class, "App\\Route");
        assert_eq!(route.get("path"), Some(&Value::from("/home")));
    }

    #[test]
    fn undeclared_field_is_rejected() {
        let mut registry = AnnotationRegistry::new();
        registry.register(AnnotationClass::new("App\\Route").with_fields(["path"]));

        let mut values = BTreeMap::new();
        values.insert("method".to_string(), Value::from("GET"));
        let err = registry.instantiate("App\\Route", values).unwrap_err();
        assert!(err.is_semantic());
        assert!(err.to_string().contains("does not have a property named \"method\""));
    }

    #[test]
    fn is_a_follows_parents_and_interfaces() {
        let mut registry = AnnotationRegistry::new();
        registry.register(AnnotationClass::new("A\\Base").abstract_class());
        registry.register(AnnotationClass::new("A\\Child").with_parent("A\\Base").with_interface("A\\Marker"));
        assert!(registry.is_a("A\\Child", "\\A\\Base"));
        assert!(registry.is_a("A\\Child", "A\\Marker"));
        assert!(!registry.is_a("A\\Base", "A\\Child"));
        assert!(registry.instantiate("A\\Base", BTreeMap::new()).is_err());
    }

    #[test]
    fn ignore_annotation_normalizes_names() {
        let registry = AnnotationRegistry::new();
        let mut values = BTreeMap::new();
        values.insert("value".to_string(), Value::from("foo"));
        let ignore = registry.instantiate(IGNORE_ANNOTATION, values).unwrap();
        assert_eq!(ignore.get("names"), Some(&Value::list([Value::from("foo")])));
    }

    #[test]
    fn class_constants_are_case_insensitive_on_the_class() {
        let mut registry = AnnotationRegistry::new();
        registry.define_constant("App\\Status::ACTIVE", Value::from(1));
        assert_eq!(registry.constant("\\app\\status::ACTIVE"), Some(&Value::from(1)));
        assert_eq!(registry.constant("app\\status::active"), None);
    }
}
