//! Reflection data types.
//!
//! This module contains the owned "model" structs and enums that describe
//! PHP declarations extracted from source (classes, methods, properties,
//! parameters and type hints).  They play the role of PHP's runtime
//! reflection objects for the annotation reader and the proxy generator.
//! All data is owned so nothing depends on the parser's arena lifetime.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Visibility of a class member (method or property).
///
/// In PHP, members without an explicit visibility modifier default to `Public`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

/// The syntactic kind of a class-like declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassLikeKind {
    Class,
    Interface,
    Trait,
    Enum,
}

/// A native PHP type declaration, with class names already resolved to
/// their fully-qualified form (no leading `\`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeHint {
    /// A builtin type keyword, lower-cased (`int`, `string`, `void`, ...).
    Builtin(String),
    /// A class, interface or enum reference.
    Class(String),
    SelfType,
    Parent,
    Static,
    /// `?T`
    Nullable(Box<TypeHint>),
    /// `A|B|...`
    Union(Vec<TypeHint>),
    /// `A&B&...`
    Intersection(Vec<TypeHint>),
}

impl TypeHint {
    /// Whether this is the given builtin keyword (case-insensitive).
    pub fn is_builtin(&self, keyword: &str) -> bool {
        matches!(self, TypeHint::Builtin(name) if name.eq_ignore_ascii_case(keyword))
    }

    /// Whether `null` is an accepted value of this type.
    pub fn allows_null(&self) -> bool {
        match self {
            TypeHint::Nullable(_) => true,
            TypeHint::Builtin(name) => name == "null" || name == "mixed",
            TypeHint::Union(types) => types.iter().any(TypeHint::allows_null),
            _ => false,
        }
    }
}

impl fmt::Display for TypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeHint::Builtin(name) => write!(f, "{}", name),
            TypeHint::Class(name) => write!(f, "\\{}", name),
            TypeHint::SelfType => write!(f, "self"),
            TypeHint::Parent => write!(f, "parent"),
            TypeHint::Static => write!(f, "static"),
            TypeHint::Nullable(inner) => write!(f, "?{}", inner),
            TypeHint::Union(types) => {
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    if matches!(t, TypeHint::Intersection(_)) {
                        write!(f, "({})", t)?;
                    } else {
                        write!(f, "{}", t)?;
                    }
                }
                Ok(())
            }
            TypeHint::Intersection(types) => {
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, "&")?;
                    }
                    write!(f, "{}", t)?;
                }
                Ok(())
            }
        }
    }
}

/// Identity of the class that declares a member.
///
/// Shared between a class and all of its members so that inherited members
/// still know which file (and which `use` statements) they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaringClass {
    /// Fully-qualified class name without leading `\`.
    pub name: String,
    /// The source file, or `None` for classes that were not loaded from disk.
    pub file: Option<PathBuf>,
    /// The class-level doc comment, including the `/**` and `*/` delimiters.
    pub doc_comment: Option<String>,
}

impl DeclaringClass {
    /// The namespace part of the class name (empty for the global namespace).
    pub fn namespace(&self) -> &str {
        namespace_of(&self.name)
    }

    /// The class name without its namespace.
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }
}

/// A parameter of a method.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionParameter {
    /// The parameter name WITHOUT the `$` prefix.
    pub name: String,
    pub type_hint: Option<TypeHint>,
    /// The default value expression as written in source, with class names
    /// in `Class::CONSTANT` fetches resolved to `\Fully\Qualified::CONSTANT`.
    pub default: Option<String>,
    pub is_variadic: bool,
    pub is_reference: bool,
}

impl ReflectionParameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_hint: None,
            default: None,
            is_variadic: false,
            is_reference: false,
        }
    }
}

/// A method of a class.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionMethod {
    pub name: String,
    pub declaring_class: Arc<DeclaringClass>,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
    /// Whether the method returns by reference (`function &name()`).
    pub returns_reference: bool,
    pub parameters: Vec<ReflectionParameter>,
    pub return_type: Option<TypeHint>,
    pub doc_comment: Option<String>,
    /// When the body is exactly `return $this->prop;`, the property name.
    pub returned_property: Option<String>,
}

impl ReflectionMethod {
    pub fn new(name: impl Into<String>, declaring_class: Arc<DeclaringClass>) -> Self {
        Self {
            name: name.into(),
            declaring_class,
            visibility: Visibility::Public,
            is_static: false,
            is_final: false,
            is_abstract: false,
            returns_reference: false,
            parameters: Vec::new(),
            return_type: None,
            doc_comment: None,
            returned_property: None,
        }
    }

    /// Whether this is the class constructor.
    pub fn is_constructor(&self) -> bool {
        self.name.eq_ignore_ascii_case("__construct")
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

/// A property of a class.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionProperty {
    /// The property name WITHOUT the `$` prefix (e.g. "name", "age").
    pub name: String,
    pub declaring_class: Arc<DeclaringClass>,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_readonly: bool,
    pub type_hint: Option<TypeHint>,
    /// The default value expression as written in source.
    pub default: Option<String>,
    pub doc_comment: Option<String>,
}

impl ReflectionProperty {
    pub fn new(name: impl Into<String>, declaring_class: Arc<DeclaringClass>) -> Self {
        Self {
            name: name.into(),
            declaring_class,
            visibility: Visibility::Public,
            is_static: false,
            is_readonly: false,
            type_hint: None,
            default: None,
            doc_comment: None,
        }
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

/// A class-like declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionClass {
    pub kind: ClassLikeKind,
    pub declaring: Arc<DeclaringClass>,
    /// Fully-qualified parent class name, if any.
    pub parent: Option<String>,
    /// Fully-qualified names of implemented interfaces.
    pub interfaces: Vec<String>,
    /// Fully-qualified names of used traits.
    pub traits: Vec<String>,
    pub is_abstract: bool,
    pub is_final: bool,
    pub is_readonly: bool,
    /// Methods, own first, then inherited ones (when built through
    /// [`crate::source::SourceIndex::reflect`]).
    pub methods: Vec<ReflectionMethod>,
    pub properties: Vec<ReflectionProperty>,
}

impl ReflectionClass {
    /// Create an empty class with no backing file, e.g. for tests or classes
    /// defined at run time.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind: ClassLikeKind::Class,
            declaring: Arc::new(DeclaringClass {
                name: name.trim_start_matches('\\').to_string(),
                file: None,
                doc_comment: None,
            }),
            parent: None,
            interfaces: Vec::new(),
            traits: Vec::new(),
            is_abstract: false,
            is_final: false,
            is_readonly: false,
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Fully-qualified class name without leading `\`.
    pub fn name(&self) -> &str {
        &self.declaring.name
    }

    pub fn namespace(&self) -> &str {
        self.declaring.namespace()
    }

    pub fn short_name(&self) -> &str {
        self.declaring.short_name()
    }

    pub fn file(&self) -> Option<&std::path::Path> {
        self.declaring.file.as_deref()
    }

    pub fn doc_comment(&self) -> Option<&str> {
        self.declaring.doc_comment.as_deref()
    }

    /// Look up a method by name (PHP method names are case-insensitive).
    pub fn method(&self, name: &str) -> Option<&ReflectionMethod> {
        self.methods.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.method(name).is_some()
    }

    /// Look up a property by name (case-sensitive, as in PHP).
    pub fn property(&self, name: &str) -> Option<&ReflectionProperty> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Answers whether a class-like name is known.
///
/// Used wherever PHP would check `class_exists()` / `interface_exists()`.
pub trait ClassLookup: Send + Sync {
    /// `name` is fully qualified; a leading `\` is tolerated.
    fn class_exists(&self, name: &str) -> bool;

    /// The parent class of `name`, when known.
    fn parent_class(&self, _name: &str) -> Option<String> {
        None
    }
}

/// The namespace part of a fully-qualified name (empty for global names).
pub fn namespace_of(name: &str) -> &str {
    let name = name.trim_start_matches('\\');
    match name.rfind('\\') {
        Some(pos) => &name[..pos],
        None => "",
    }
}

/// The last segment of a namespace-qualified name.
pub fn short_name(name: &str) -> &str {
    name.rsplit('\\').next().unwrap_or(name)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_split_into_namespace_and_short_name() {
        let class = ReflectionClass::new("\\App\\Entity\\User");
        assert_eq!(class.name(), "App\\Entity\\User");
        assert_eq!(class.namespace(), "App\\Entity");
        assert_eq!(class.short_name(), "User");
        assert_eq!(namespace_of("Global"), "");
    }

    #[test]
    fn type_hint_display_parenthesizes_intersections_in_unions() {
        let hint = TypeHint::Union(vec![
            TypeHint::Intersection(vec![
                TypeHint::Class("Countable".to_string()),
                TypeHint::Class("Traversable".to_string()),
            ]),
            TypeHint::Builtin("null".to_string()),
        ]);
        assert_eq!(hint.to_string(), "(\\Countable&\\Traversable)|null");
        assert!(hint.allows_null());
    }
}
