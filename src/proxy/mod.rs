//! Lazy-loading proxies.
//!
//! [`generator`] renders PHP proxy classes from [`metadata`];
//! [`autoloader`] maps proxy class names back to their files; [`runtime`]
//! and [`factory`] provide the same lazy semantics for entities handled in
//! process.

pub mod autoloader;
pub mod factory;
pub mod generator;
pub mod metadata;
pub mod runtime;

pub use autoloader::{Autoloader, NotFoundCallback, resolve_file};
pub use factory::{AutoGenerate, EntityLoader, ProxyFactory, ProxyFileStatus, ensure_proxy_file};
pub use generator::{
    BASE_PROXY_INTERFACE, MARKER, Placeholder, PlaceholderFn, ProxyGenerator, forwarded_methods,
    is_short_identifier_getter, lazy_loaded_properties, proxy_class_name, proxy_file_name,
};
pub use metadata::{ClassMetadata, SimpleClassMetadata};
pub use runtime::{
    Cloner, Initializer, LazyState, MethodThunk, Proxy, ProxyDefinition, ProxyMethod,
    SerializedProxy,
};
