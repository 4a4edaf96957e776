//! Error types.
//!
//! Annotation parsing raises two kinds of user-facing errors: syntax errors
//! (the token stream does not match the grammar) and semantic errors (a
//! well-formed reference cannot be resolved or instantiated).  Proxy
//! generation has its own [`ProxyError`].  Everything else is I/O, cache or
//! configuration plumbing.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing or reading annotations.
#[derive(Debug, Error)]
pub enum AnnotationError {
    /// The doc comment does not match the annotation grammar.
    ///
    /// # Fields
    ///
    /// * `expected` - Description of the expected construct
    /// * `found` - The offending token text, or `None` at end of input
    /// * `position` - Byte offset of the offending token in the doc comment
    /// * `context` - Which declaration was being parsed, if known
    #[error(
        "[Syntax Error] Expected {expected}, got {}{}.",
        describe_found(.found, .position),
        describe_context(.context)
    )]
    Syntax {
        expected: String,
        found: Option<String>,
        position: Option<usize>,
        context: Option<String>,
    },

    /// A well-formed annotation reference could not be resolved: not
    /// imported, ambiguous, unknown, or not instantiable.
    #[error("[Semantical Error] {0}")]
    Semantic(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Could not read source file: {0}")]
    Io(#[from] std::io::Error),
}

impl AnnotationError {
    pub(crate) fn semantic(message: impl Into<String>) -> Self {
        AnnotationError::Semantic(message.into())
    }

    /// Whether this is a syntax error.
    pub fn is_syntax(&self) -> bool {
        matches!(self, AnnotationError::Syntax { .. })
    }

    /// Whether this is a semantic error.
    pub fn is_semantic(&self) -> bool {
        matches!(self, AnnotationError::Semantic(_))
    }
}

fn describe_found(found: &Option<String>, position: &Option<usize>) -> String {
    match (found, position) {
        (Some(text), Some(pos)) => format!("'{}' at position {}", text, pos),
        (Some(text), None) => format!("'{}'", text),
        _ => "end of string".to_string(),
    }
}

fn describe_context(context: &Option<String>) -> String {
    match context {
        Some(ctx) if !ctx.is_empty() => format!(" in {}", ctx),
        _ => String::new(),
    }
}

/// Errors raised by annotation cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("The directory \"{}\" does not exist and could not be created.", .0.display())]
    DirectoryMissing(PathBuf),

    #[error("The directory \"{}\" is not writable.", .0.display())]
    DirectoryNotWritable(PathBuf),

    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache entry could not be encoded or decoded: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Errors raised while generating, loading or initializing proxies.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Unable to create a proxy for a final class \"{0}\".")]
    FinalClass(String),

    #[error("Unable to create a proxy for an abstract class \"{0}\".")]
    AbstractClass(String),

    #[error("Unable to create a proxy for a readonly class \"{0}\".")]
    ReadonlyClass(String),

    #[error("Unable to create a proxy for \"{class}\": lazy property \"{property}\" is readonly.")]
    ReadonlyProperty { class: String, property: String },

    #[error("Unable to create a proxy for \"{0}\": only classes can be proxied.")]
    NotAClass(String),

    #[error(
        "The type hint of parameter \"{parameter}\" in method \"{method}\" in class \"{class}\" is invalid."
    )]
    InvalidParameterTypeHint {
        class: String,
        method: String,
        parameter: String,
    },

    #[error("The return type of method \"{method}\" in class \"{class}\" is invalid.")]
    InvalidReturnTypeHint { class: String, method: String },

    #[error("The template placeholder \"<{0}>\" has no value")]
    InvalidPlaceholder(String),

    #[error("You must configure a proxy directory. See docs for details")]
    ProxyDirectoryRequired,

    #[error("You must configure a proxy namespace")]
    ProxyNamespaceRequired,

    #[error("Your proxy directory \"{}\" must be writable", .0.display())]
    ProxyDirectoryNotWritable(PathBuf),

    #[error("The class \"{class}\" is not part of the proxy namespace \"{namespace}\"")]
    NotProxyClass { class: String, namespace: String },

    #[error("Proxy file \"{}\" does not exist", .0.display())]
    ProxyFileMissing(PathBuf),

    #[error("Provided proxy of type \"{0}\" must not be initialized.")]
    UninitializedProxyExpected(String),

    #[error("Missing value for primary key {field} on {class}")]
    MissingIdentifier { class: String, field: String },

    #[error("No metadata is known for class \"{0}\"")]
    UnknownClass(String),

    #[error("Entity of type \"{class}\" with identifier {identifier} was not found")]
    EntityNotFound { class: String, identifier: String },

    #[error("Call to undefined method {class}::{method}()")]
    UndefinedMethod { class: String, method: String },

    #[error("Undefined property: {class}::${property}")]
    UndefinedProperty { class: String, property: String },

    #[error("Serialized proxy of class \"{found}\" cannot be restored as \"{expected}\"")]
    ClassMismatch { expected: String, found: String },

    #[error("Proxy I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Proxy state could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file \"{}\": {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file \"{}\": {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Could not determine a cache directory for this platform")]
    NoCacheDirectory,
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_message_includes_token_position_and_context() {
        let err = AnnotationError::Syntax {
            expected: "PlainValue".to_string(),
            found: Some(")".to_string()),
            position: Some(12),
            context: Some("class Foo".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "[Syntax Error] Expected PlainValue, got ')' at position 12 in class Foo."
        );
        assert!(err.is_syntax());
    }

    #[test]
    fn syntax_error_at_end_of_input() {
        let err = AnnotationError::Syntax {
            expected: "Literal Type: CloseParenthesis".to_string(),
            found: None,
            position: None,
            context: None,
        };
        assert_eq!(
            err.to_string(),
            "[Syntax Error] Expected Literal Type: CloseParenthesis, got end of string."
        );
    }

    #[test]
    fn proxy_error_messages() {
        let err = ProxyError::InvalidParameterTypeHint {
            class: "App\\User".to_string(),
            method: "setGroup".to_string(),
            parameter: "group".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "The type hint of parameter \"group\" in method \"setGroup\" in class \"App\\User\" is invalid."
        );
    }
}
