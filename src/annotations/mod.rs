//! Doc-comment annotations.
//!
//! Pipeline: [`lexer`] → [`parser`] (name resolution against [`imports`]
//! and the [`registry`]) → [`reader`] (per-declaration lookups) →
//! [`cache`] (optional persistence).

pub mod cache;
pub mod imports;
pub mod lexer;
pub mod parser;
pub mod reader;
pub mod registry;
pub mod value;

pub use cache::{ArrayCache, Cache, CacheEntry, CachedReader, FileCache};
pub use imports::{DEFAULT_IGNORED_NAMES, IgnoredNames, ImportTable, NAMESPACE_KEY};
pub use lexer::{Lexer, Token, TokenKind, tokenize};
pub use parser::{AnnotationCreator, DocParser};
pub use reader::{AnnotationReader, Reader, index_by_class};
pub use registry::{AnnotationClass, AnnotationRegistry, Constructor, IGNORE_ANNOTATION};
pub use value::{Annotation, ArrayEntry, ArrayKey, FromAnnotation, Value};
