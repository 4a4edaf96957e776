//! Persistence metadata consumed by the proxy generator.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::ReflectionClass;

/// What the proxy generator needs to know about a persistent class.
pub trait ClassMetadata: Send + Sync {
    /// Reflection of the class, including inherited members.
    fn reflection_class(&self) -> &ReflectionClass;

    fn name(&self) -> &str {
        self.reflection_class().name()
    }

    fn has_field(&self, name: &str) -> bool;

    fn has_association(&self, name: &str) -> bool;

    fn is_identifier(&self, name: &str) -> bool;

    fn identifier_field_names(&self) -> Vec<String>;

    /// The mapping type of a field (`integer`, `string`, ...).
    fn type_of_field(&self, name: &str) -> Option<String>;
}

/// A [`ClassMetadata`] built by hand.
#[derive(Debug, Clone)]
pub struct SimpleClassMetadata {
    reflection: ReflectionClass,
    /// Field name → mapping type.
    fields: BTreeMap<String, String>,
    associations: BTreeSet<String>,
    identifiers: Vec<String>,
}

impl SimpleClassMetadata {
    pub fn new(reflection: ReflectionClass) -> Self {
        Self {
            reflection,
            fields: BTreeMap::new(),
            associations: BTreeSet::new(),
            identifiers: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, field_type: impl Into<String>) -> Self {
        self.fields.insert(name.into(), field_type.into());
        self
    }

    /// Declare an identifier field (also a regular field).
    pub fn with_identifier(mut self, name: impl Into<String>, field_type: impl Into<String>) -> Self {
        let name = name.into();
        self.fields.insert(name.clone(), field_type.into());
        if !self.identifiers.contains(&name) {
            self.identifiers.push(name);
        }
        self
    }

    pub fn with_association(mut self, name: impl Into<String>) -> Self {
        self.associations.insert(name.into());
        self
    }

    /// Every non-static property becomes a field; `identifiers` are marked
    /// as the identifier.  Untyped identifiers are assumed `integer`.
    pub fn from_reflection(reflection: ReflectionClass, identifiers: &[String]) -> Self {
        let mut metadata = Self::new(reflection);
        let properties: Vec<(String, String)> = metadata
            .reflection
            .properties
            .iter()
            .filter(|p| !p.is_static)
            .map(|p| {
                let field_type = match p.type_hint.as_ref() {
                    Some(hint) if hint.is_builtin("int") => "integer".to_string(),
                    Some(hint) if hint.is_builtin("string") => "string".to_string(),
                    Some(hint) if hint.is_builtin("bool") => "boolean".to_string(),
                    Some(hint) if hint.is_builtin("float") => "float".to_string(),
                    _ if identifiers.contains(&p.name) => "integer".to_string(),
                    _ => "mixed".to_string(),
                };
                (p.name.clone(), field_type)
            })
            .collect();

        for (name, field_type) in properties {
            metadata = if identifiers.contains(&name) {
                metadata.with_identifier(name, field_type)
            } else {
                metadata.with_field(name, field_type)
            };
        }
        metadata
    }
}

impl ClassMetadata for SimpleClassMetadata {
    fn reflection_class(&self) -> &ReflectionClass {
        &self.reflection
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn has_association(&self, name: &str) -> bool {
        self.associations.contains(name)
    }

    fn is_identifier(&self, name: &str) -> bool {
        self.identifiers.iter().any(|id| id == name)
    }

    fn identifier_field_names(&self) -> Vec<String> {
        self.identifiers.clone()
    }

    fn type_of_field(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }
}
