//! In-process lazy proxies.
//!
//! A [`Proxy`] stands in for an entity whose state is loaded on first
//! use.  It carries an explicit [`LazyState`] and a one-shot initializer
//! instead of intercepting property access: callers go through
//! [`Proxy::get`], [`Proxy::set`], [`Proxy::isset`] and [`Proxy::call`],
//! which fire the initializer for lazy members the way the generated PHP
//! class does.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::annotations::Value;
use crate::error::ProxyError;

use super::generator::{forwarded_methods, is_short_identifier_getter, lazy_loaded_properties};
use super::metadata::ClassMetadata;

/// Loads a proxy's state.  Called with the proxy, the name of the member
/// that triggered the load and its arguments.
pub type Initializer =
    Arc<dyn Fn(&mut Proxy, &str, &[Value]) -> Result<(), ProxyError> + Send + Sync>;

/// Prepares a copy made by [`Proxy::duplicate`].
pub type Cloner = Arc<dyn Fn(&mut Proxy) -> Result<(), ProxyError> + Send + Sync>;

/// The body of a proxied method, run after initialization.
pub type MethodThunk = Arc<dyn Fn(&mut Proxy, &[Value]) -> Result<Value, ProxyError> + Send + Sync>;

/// Where a proxy is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LazyState {
    Uninitialized,
    /// The initializer is running.
    Initializing,
    Initialized,
}

/// A method a proxy answers.
#[derive(Clone)]
pub struct ProxyMethod {
    pub name: String,
    /// Set for short identifier getters: the identifier field and whether
    /// its value is cast to an integer.
    pub identifier_getter: Option<(String, bool)>,
    /// Property returned by a `return $this->x;` body.
    pub returned_property: Option<String>,
    pub returns_value: bool,
    pub thunk: Option<MethodThunk>,
}

impl fmt::Debug for ProxyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyMethod")
            .field("name", &self.name)
            .field("identifier_getter", &self.identifier_getter)
            .field("returned_property", &self.returned_property)
            .field("returns_value", &self.returns_value)
            .field("thunk", &self.thunk.is_some())
            .finish()
    }
}

/// Everything proxies of one class share.
#[derive(Clone)]
pub struct ProxyDefinition {
    pub class_name: String,
    pub proxy_class_name: String,
    pub identifier_fields: Vec<String>,
    /// Non-static property names, in declaration order.
    pub reflected_fields: Vec<String>,
    /// Lazy property name → default value.
    pub lazy_properties: BTreeMap<String, Value>,
    /// Defaults of the remaining properties.
    pub eager_defaults: BTreeMap<String, Value>,
    /// Keyed by lower-cased method name.
    pub methods: HashMap<String, ProxyMethod>,
    pub initializer: Option<Initializer>,
    pub cloner: Option<Cloner>,
}

impl fmt::Debug for ProxyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyDefinition")
            .field("class_name", &self.class_name)
            .field("proxy_class_name", &self.proxy_class_name)
            .field("identifier_fields", &self.identifier_fields)
            .field("lazy_properties", &self.lazy_properties)
            .field("methods", &self.methods.len())
            .finish_non_exhaustive()
    }
}

impl ProxyDefinition {
    /// Describe proxies of `class`.  Method bodies come from `thunks`,
    /// keyed by lower-cased method name.
    pub fn from_metadata(
        class: &dyn ClassMetadata,
        proxy_class_name: String,
        thunks: &HashMap<String, MethodThunk>,
    ) -> Self {
        let reflection = class.reflection_class();
        let lazy_properties: BTreeMap<String, Value> = lazy_loaded_properties(class)
            .into_iter()
            .map(|p| (p.name.clone(), literal_value(p.default.as_deref())))
            .collect();

        let eager_defaults = reflection
            .properties
            .iter()
            .filter(|p| !p.is_static && !lazy_properties.contains_key(&p.name))
            .filter_map(|p| p.default.as_deref().map(|d| (p.name.clone(), literal_value(Some(d)))))
            .collect();

        let methods = forwarded_methods(class)
            .into_iter()
            .map(|method| {
                let lower = method.name.to_ascii_lowercase();
                let identifier_getter = is_short_identifier_getter(method, class)
                    .then(|| method.returned_property.clone())
                    .flatten()
                    .map(|field| {
                        let cast = matches!(
                            class.type_of_field(&field).as_deref(),
                            Some("integer") | Some("smallint")
                        );
                        (field, cast)
                    });
                let returns_value = !method
                    .return_type
                    .as_ref()
                    .is_some_and(|hint| hint.is_builtin("void") || hint.is_builtin("never"));
                let entry = ProxyMethod {
                    name: method.name.clone(),
                    identifier_getter,
                    returned_property: method.returned_property.clone(),
                    returns_value,
                    thunk: thunks.get(&lower).cloned(),
                };
                (lower, entry)
            })
            .collect();

        Self {
            class_name: class.name().to_string(),
            proxy_class_name,
            identifier_fields: class.identifier_field_names(),
            reflected_fields: reflection
                .properties
                .iter()
                .filter(|p| !p.is_static)
                .map(|p| p.name.clone())
                .collect(),
            lazy_properties,
            eager_defaults,
            methods,
            initializer: None,
            cloner: None,
        }
    }

    pub fn with_initializer(mut self, initializer: Initializer) -> Self {
        self.initializer = Some(initializer);
        self
    }

    pub fn with_cloner(mut self, cloner: Cloner) -> Self {
        self.cloner = Some(cloner);
        self
    }

    pub fn is_lazy(&self, property: &str) -> bool {
        self.lazy_properties.contains_key(property)
    }
}

/// A PHP literal as written in source, as a [`Value`].  Anything that is
/// not a scalar literal is kept as its source text.
fn literal_value(source: Option<&str>) -> Value {
    let Some(source) = source.map(str::trim) else {
        return Value::Null;
    };
    match source.to_ascii_lowercase().as_str() {
        "null" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "[]" | "array()" => return Value::Array(Vec::new()),
        _ => {}
    }
    if let Ok(n) = source.parse::<i64>() {
        return Value::Integer(n);
    }
    if let Ok(n) = source.parse::<f64>() {
        return Value::Float(n);
    }
    let quoted = source.len() >= 2
        && ((source.starts_with('\'') && source.ends_with('\''))
            || (source.starts_with('"') && source.ends_with('"')));
    if quoted {
        let inner = &source[1..source.len() - 1];
        return Value::String(inner.replace("\\'", "'").replace("\\\\", "\\"));
    }
    Value::String(source.to_string())
}

/// The serialized form of a proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedProxy {
    pub class: String,
    pub initialized: bool,
    pub fields: BTreeMap<String, Value>,
}

/// A lazily initialized entity.
#[derive(Clone)]
pub struct Proxy {
    definition: Arc<ProxyDefinition>,
    state: LazyState,
    /// Properties currently set.  Unset lazy properties are absent.
    fields: BTreeMap<String, Value>,
    initializer: Option<Initializer>,
    cloner: Option<Cloner>,
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("class", &self.definition.proxy_class_name)
            .field("state", &self.state)
            .field("fields", &self.fields)
            .field("initializer", &self.initializer.is_some())
            .field("cloner", &self.cloner.is_some())
            .finish()
    }
}

impl Proxy {
    /// An uninitialized proxy with the definition's initializer and cloner.
    /// Lazy properties start unset.
    pub fn new(definition: Arc<ProxyDefinition>) -> Self {
        let fields = definition.eager_defaults.clone();
        let initializer = definition.initializer.clone();
        let cloner = definition.cloner.clone();
        Self {
            definition,
            state: LazyState::Uninitialized,
            fields,
            initializer,
            cloner,
        }
    }

    pub fn definition(&self) -> &Arc<ProxyDefinition> {
        &self.definition
    }

    /// Fully-qualified name of the proxied class.
    pub fn class_name(&self) -> &str {
        &self.definition.class_name
    }

    pub fn state(&self) -> LazyState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == LazyState::Initialized
    }

    pub fn set_initialized(&mut self, initialized: bool) {
        self.state = if initialized {
            LazyState::Initialized
        } else {
            LazyState::Uninitialized
        };
    }

    pub fn set_initializer(&mut self, initializer: Option<Initializer>) {
        self.initializer = initializer;
    }

    pub fn initializer(&self) -> Option<&Initializer> {
        self.initializer.as_ref()
    }

    pub fn set_cloner(&mut self, cloner: Option<Cloner>) {
        self.cloner = cloner;
    }

    pub fn cloner(&self) -> Option<&Cloner> {
        self.cloner.as_ref()
    }

    /// Lazy property names with their default values.
    pub fn lazy_properties(&self) -> &BTreeMap<String, Value> {
        &self.definition.lazy_properties
    }

    /// Force initialization.
    pub fn load(&mut self) -> Result<(), ProxyError> {
        self.initialize("__load", &[])
    }

    /// Run the initializer once.  A failing initializer is put back so a
    /// later access can retry, and the error is returned.
    fn initialize(&mut self, trigger: &str, args: &[Value]) -> Result<(), ProxyError> {
        if self.state != LazyState::Uninitialized {
            return Ok(());
        }
        let Some(initializer) = self.initializer.take() else {
            return Ok(());
        };

        trace!("initializing {} via {}", self.definition.class_name, trigger);
        self.state = LazyState::Initializing;
        match initializer(self, trigger, args) {
            Ok(()) => {
                if self.state == LazyState::Initializing {
                    self.state = LazyState::Initialized;
                }
                Ok(())
            }
            Err(e) => {
                self.state = LazyState::Uninitialized;
                if self.initializer.is_none() {
                    self.initializer = Some(initializer);
                }
                Err(e)
            }
        }
    }

    /// Read a property, initializing first when it is lazy.
    pub fn get(&mut self, name: &str) -> Result<Value, ProxyError> {
        if self.definition.is_lazy(name) {
            self.initialize("__get", &[Value::String(name.to_string())])?;
            return Ok(self.fields.get(name).cloned().unwrap_or(Value::Null));
        }
        match self.fields.get(name) {
            Some(value) => Ok(value.clone()),
            None if self.definition.reflected_fields.iter().any(|f| f == name) => Ok(Value::Null),
            None => Err(ProxyError::UndefinedProperty {
                class: self.definition.proxy_class_name.clone(),
                property: name.to_string(),
            }),
        }
    }

    /// Write a property, initializing first when it is lazy.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), ProxyError> {
        if self.definition.is_lazy(name) {
            self.initialize("__set", &[Value::String(name.to_string()), value.clone()])?;
        }
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    /// Whether a property is set and not null, initializing first when it
    /// is lazy.
    pub fn isset(&mut self, name: &str) -> Result<bool, ProxyError> {
        if self.definition.is_lazy(name) {
            self.initialize("__isset", &[Value::String(name.to_string())])?;
        }
        Ok(self.fields.get(name).is_some_and(|v| !v.is_null()))
    }

    /// Call a proxied method.
    ///
    /// Short identifier getters answer from the identifier without loading.
    /// Other methods initialize the proxy and then run the registered
    /// thunk, or return the property a `return $this->x;` body reads.
    pub fn call(&mut self, method: &str, args: &[Value]) -> Result<Value, ProxyError> {
        let Some(entry) = self.definition.methods.get(&method.to_ascii_lowercase()).cloned() else {
            return Err(ProxyError::UndefinedMethod {
                class: self.definition.class_name.clone(),
                method: method.to_string(),
            });
        };

        if let Some((field, cast)) = &entry.identifier_getter
            && !self.is_initialized()
        {
            let value = self.fields.get(field).cloned().unwrap_or(Value::Null);
            return Ok(if *cast { cast_to_int(value) } else { value });
        }

        self.initialize(&entry.name, args)?;

        let result = match (&entry.thunk, &entry.returned_property) {
            (Some(thunk), _) => thunk(self, args)?,
            (None, Some(property)) => self.fields.get(property).cloned().unwrap_or(Value::Null),
            (None, None) => {
                return Err(ProxyError::UndefinedMethod {
                    class: self.definition.class_name.clone(),
                    method: entry.name,
                });
            }
        };
        Ok(if entry.returns_value { result } else { Value::Null })
    }

    /// Read a property without triggering initialization.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Write a property without triggering initialization.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Unset a property without triggering initialization.
    pub fn unset_field(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// The identifier values currently set.
    pub fn identifier(&self) -> BTreeMap<String, Value> {
        self.definition
            .identifier_fields
            .iter()
            .filter_map(|f| self.fields.get(f).map(|v| (f.clone(), v.clone())))
            .collect()
    }

    /// Property names kept by serialization: everything once initialized,
    /// otherwise everything but the lazy properties.
    pub fn sleep(&self) -> Vec<String> {
        self.definition
            .reflected_fields
            .iter()
            .filter(|name| self.is_initialized() || !self.definition.is_lazy(name))
            .cloned()
            .collect()
    }

    /// Install the rehydration initializer on an uninitialized proxy.  It
    /// fills absent lazy properties with their defaults.
    pub fn wakeup(&mut self) {
        if self.is_initialized() {
            return;
        }
        let lazy: Vec<String> = self.definition.lazy_properties.keys().cloned().collect();
        for name in &lazy {
            self.fields.remove(name);
        }
        self.initializer = Some(Arc::new(|proxy: &mut Proxy, _: &str, _: &[Value]| {
            proxy.set_initializer(None);
            proxy.set_cloner(None);
            let defaults = proxy.definition.lazy_properties.clone();
            for (name, default) in defaults {
                proxy.fields.entry(name).or_insert(default);
            }
            Ok(())
        }));
    }

    pub fn to_serialized(&self) -> SerializedProxy {
        let keep: BTreeSet<String> = self.sleep().into_iter().collect();
        SerializedProxy {
            class: self.definition.proxy_class_name.clone(),
            initialized: self.is_initialized(),
            fields: self
                .fields
                .iter()
                .filter(|(name, _)| keep.contains(*name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    pub fn serialize(&self) -> Result<String, ProxyError> {
        Ok(serde_json::to_string(&self.to_serialized())?)
    }

    /// Restore a proxy serialized with [`Proxy::serialize`].  An
    /// uninitialized proxy comes back with the rehydration initializer and
    /// no cloner.
    pub fn unserialize(definition: Arc<ProxyDefinition>, data: &str) -> Result<Self, ProxyError> {
        let serialized: SerializedProxy = serde_json::from_str(data)?;
        Self::from_serialized(definition, serialized)
    }

    pub fn from_serialized(
        definition: Arc<ProxyDefinition>,
        serialized: SerializedProxy,
    ) -> Result<Self, ProxyError> {
        if serialized.class != definition.proxy_class_name {
            return Err(ProxyError::ClassMismatch {
                expected: definition.proxy_class_name.clone(),
                found: serialized.class,
            });
        }
        let mut proxy = Self {
            definition,
            state: if serialized.initialized {
                LazyState::Initialized
            } else {
                LazyState::Uninitialized
            },
            fields: serialized.fields,
            initializer: None,
            cloner: None,
        };
        proxy.wakeup();
        Ok(proxy)
    }

    /// Clone the proxy and run the cloner on the copy.
    pub fn duplicate(&self) -> Result<Self, ProxyError> {
        let mut copy = self.clone();
        if let Some(cloner) = copy.cloner.clone() {
            cloner(&mut copy)?;
        }
        Ok(copy)
    }
}

fn cast_to_int(value: Value) -> Value {
    match value {
        Value::Integer(_) => value,
        Value::Float(f) => Value::Integer(f as i64),
        Value::Bool(b) => Value::Integer(i64::from(b)),
        Value::String(ref s) => s.trim().parse::<i64>().map(Value::Integer).unwrap_or(Value::Integer(0)),
        Value::Null => Value::Integer(0),
        other => other,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_values() {
        assert_eq!(literal_value(None), Value::Null);
        assert_eq!(literal_value(Some("NULL")), Value::Null);
        assert_eq!(literal_value(Some("42")), Value::Integer(42));
        assert_eq!(literal_value(Some("1.5")), Value::Float(1.5));
        assert_eq!(literal_value(Some("'it\\'s'")), Value::String("it's".to_string()));
        assert_eq!(literal_value(Some("[]")), Value::Array(Vec::new()));
        assert_eq!(
            literal_value(Some("self::DEFAULT")),
            Value::String("self::DEFAULT".to_string())
        );
    }

    #[test]
    fn integer_cast() {
        assert_eq!(cast_to_int(Value::String("17".to_string())), Value::Integer(17));
        assert_eq!(cast_to_int(Value::Integer(3)), Value::Integer(3));
        assert_eq!(cast_to_int(Value::Null), Value::Integer(0));
    }
}
