//! Doc-comment annotations and lazy-loading proxies for PHP persistence
//! layers.
//!
//! Classes are indexed from PHP source with [`source::SourceIndex`].  The
//! [`annotations`] module reads `@Name(...)` annotations from their doc
//! comments, resolving names through the file's `use` statements and an
//! [`annotations::AnnotationRegistry`].  The [`proxy`] module renders
//! lazy-loading proxy subclasses and provides an in-process proxy runtime.

pub mod annotations;
pub mod config;
pub mod error;
pub mod proxy;
pub mod source;
pub mod types;

pub use annotations::{
    Annotation, AnnotationReader, AnnotationRegistry, CachedReader, DocParser, Reader, Value,
};
pub use config::{Config, ReaderConfig};
pub use error::{AnnotationError, CacheError, ConfigError, ProxyError};
pub use proxy::{ClassMetadata, Proxy, ProxyFactory, ProxyGenerator, SimpleClassMetadata};
pub use source::SourceIndex;
pub use types::{ClassLookup, ReflectionClass, ReflectionMethod, ReflectionProperty};
