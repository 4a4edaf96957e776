//! Proxy source generation.
//!
//! Renders a PHP subclass of a persistent class whose public methods,
//! magic accessors and serialization hooks run a one-time initializer
//! before touching the parent.  The template is plain text with `<name>`
//! placeholders; each placeholder is either one of the built-in generators
//! below or a custom value set with [`ProxyGenerator::set_placeholder`].

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::ProxyError;
use crate::types::{
    ClassLikeKind, ClassLookup, ReflectionMethod, ReflectionParameter, ReflectionProperty,
    TypeHint, Visibility, namespace_of, short_name,
};

use super::metadata::ClassMetadata;

/// Namespace segment separating the proxy namespace from the proxied
/// class name.
pub const MARKER: &str = "__CG__";

/// Interface every generated proxy implements.
pub const BASE_PROXY_INTERFACE: &str = "Doctrine\\Common\\Proxy\\Proxy";

/// Methods the generator writes itself instead of forwarding.
const SKIPPED_METHODS: &[&str] = &["__sleep", "__clone", "__wakeup", "__get", "__set", "__isset"];

const PROXY_CLASS_TEMPLATE: &str = r#"<?php

namespace <namespace>;

/**
 * DO NOT EDIT THIS FILE - IT WAS CREATED BY THE PROXY GENERATOR
 */
class <proxyShortClassName> extends \<className> implements \<baseProxyInterface>
{
    /**
     * @var \Closure the callback responsible for loading properties in the proxy object. This callback is called with
     *      three parameters, being respectively the proxy object to be initialized, the method that triggered the
     *      initialization process and an array of ordered parameters that were passed to that method.
     */
    public $__initializer__;

    /**
     * @var \Closure the callback responsible of loading properties that need to be copied in the cloned object
     */
    public $__cloner__;

    /**
     * @var boolean flag indicating if this object was already initialized
     */
    public $__isInitialized__ = false;

    /**
     * @var array<string, null> properties to be lazy loaded, indexed by property name
     */
    public static $lazyPropertiesNames = <lazyPropertiesNames>;

    /**
     * @var array<string, mixed> default values of properties to be lazy loaded, with keys being the property names
     */
    public static $lazyPropertiesDefaults = <lazyPropertiesDefaults>;

<additionalProperties>

<constructorImpl>

<magicGet>

<magicSet>

<magicIsset>

<sleepImpl>

<wakeupImpl>

<cloneImpl>

    /**
     * Forces initialization of the proxy
     */
    public function __load(): void
    {
        $this->__initializer__ && $this->__initializer__->__invoke($this, '__load', []);
    }

    /**
     * @internal generated method: use only when explicitly handling proxy specific loading logic
     */
    public function __isInitialized(): bool
    {
        return $this->__isInitialized__;
    }

    /**
     * @internal generated method: use only when explicitly handling proxy specific loading logic
     */
    public function __setInitialized($initialized): void
    {
        $this->__isInitialized__ = $initialized;
    }

    /**
     * @internal generated method: use only when explicitly handling proxy specific loading logic
     */
    public function __setInitializer(?\Closure $initializer = null): void
    {
        $this->__initializer__ = $initializer;
    }

    /**
     * @internal generated method: use only when explicitly handling proxy specific loading logic
     */
    public function __getInitializer(): ?\Closure
    {
        return $this->__initializer__;
    }

    /**
     * @internal generated method: use only when explicitly handling proxy specific loading logic
     */
    public function __setCloner(?\Closure $cloner = null): void
    {
        $this->__cloner__ = $cloner;
    }

    /**
     * @internal generated method: use only when explicitly handling proxy specific cloning logic
     */
    public function __getCloner(): ?\Closure
    {
        return $this->__cloner__;
    }

    /**
     * @internal generated method: use only when explicitly handling proxy specific loading logic
     */
    public function __getLazyProperties(): array
    {
        return self::$lazyPropertiesDefaults;
    }

    <methods>
}
"#;

/// A function computing a placeholder's text for one class.
pub type PlaceholderFn = Arc<dyn Fn(&dyn ClassMetadata) -> String + Send + Sync>;

/// A custom template placeholder.
#[derive(Clone)]
pub enum Placeholder {
    Text(String),
    Generated(PlaceholderFn),
}

impl fmt::Debug for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Placeholder::Generated(_) => f.write_str("Generated(..)"),
        }
    }
}

/// Fully-qualified proxy class name for `class_name`:
/// `<proxy namespace>\__CG__\<class name>`.
pub fn proxy_class_name(proxy_namespace: &str, class_name: &str) -> String {
    format!(
        "{}\\{}\\{}",
        proxy_namespace.trim_end_matches('\\'),
        MARKER,
        class_name.trim_start_matches('\\')
    )
}

/// Proxy file for `class_name`: `<dir>/__CG__<ClassNameWithoutBackslashes>.php`.
pub fn proxy_file_name(directory: &Path, class_name: &str) -> PathBuf {
    let flat: String = class_name.chars().filter(|&c| c != '\\').collect();
    directory.join(format!("{}{}.php", MARKER, flat))
}

/// Public, non-static properties loaded by the initializer: mapped fields
/// and associations that are not part of the identifier.
pub fn lazy_loaded_properties(class: &dyn ClassMetadata) -> Vec<&ReflectionProperty> {
    class
        .reflection_class()
        .properties
        .iter()
        .filter(|p| p.is_public() && !p.is_static)
        .filter(|p| class.has_field(&p.name) || class.has_association(&p.name))
        .filter(|p| !class.is_identifier(&p.name))
        .collect()
}

/// Methods a proxy overrides to initialize itself first: public,
/// non-static, non-final and not the constructor or a magic method the
/// generator writes itself.  The first declaration of a name wins.
pub fn forwarded_methods(class: &dyn ClassMetadata) -> Vec<&ReflectionMethod> {
    let mut seen: HashSet<String> = HashSet::new();
    class
        .reflection_class()
        .methods
        .iter()
        .filter(|method| {
            let lower = method.name.to_ascii_lowercase();
            !method.is_constructor()
                && !SKIPPED_METHODS.contains(&lower.as_str())
                && !method.is_final
                && !method.is_static
                && method.is_public()
                && seen.insert(lower)
        })
        .collect()
}

/// Whether `method` is `getX()` returning `$this->x` for an identifier
/// field `x`.  Such getters answer without initializing the proxy.
pub fn is_short_identifier_getter(method: &ReflectionMethod, class: &dyn ClassMetadata) -> bool {
    let Some(rest) = method.name.strip_prefix("get") else {
        return false;
    };
    let identifier = lcfirst(rest);
    method.parameters.is_empty()
        && class.identifier_field_names().contains(&identifier)
        && class.has_field(&identifier)
        && method.returned_property.as_deref() == Some(identifier.as_str())
}

fn lcfirst(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// A single-quoted PHP string literal.
fn php_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn returns_nothing(method: &ReflectionMethod) -> bool {
    method
        .return_type
        .as_ref()
        .is_some_and(|hint| hint.is_builtin("void") || hint.is_builtin("never"))
}

/// Renders proxy classes and writes them to the proxy directory.
pub struct ProxyGenerator {
    proxy_directory: PathBuf,
    proxy_namespace: String,
    template: String,
    placeholders: BTreeMap<String, Placeholder>,
    class_lookup: Option<Arc<dyn ClassLookup>>,
}

impl fmt::Debug for ProxyGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyGenerator")
            .field("proxy_directory", &self.proxy_directory)
            .field("proxy_namespace", &self.proxy_namespace)
            .field("placeholders", &self.placeholders.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ProxyGenerator {
    pub fn new(
        proxy_directory: impl Into<PathBuf>,
        proxy_namespace: impl Into<String>,
    ) -> Result<Self, ProxyError> {
        let proxy_directory = proxy_directory.into();
        let proxy_namespace = proxy_namespace.into();
        if proxy_directory.as_os_str().is_empty() {
            return Err(ProxyError::ProxyDirectoryRequired);
        }
        if proxy_namespace.trim_matches('\\').is_empty() {
            return Err(ProxyError::ProxyNamespaceRequired);
        }
        Ok(Self {
            proxy_directory,
            proxy_namespace,
            template: PROXY_CLASS_TEMPLATE.to_string(),
            placeholders: BTreeMap::new(),
            class_lookup: None,
        })
    }

    /// Validate class names in type hints against `lookup`.  Without a
    /// lookup every class name is accepted.
    pub fn with_class_lookup(mut self, lookup: Arc<dyn ClassLookup>) -> Self {
        self.class_lookup = Some(lookup);
        self
    }

    pub fn proxy_directory(&self) -> &Path {
        &self.proxy_directory
    }

    pub fn proxy_namespace(&self) -> &str {
        &self.proxy_namespace
    }

    /// Set a placeholder, overriding the built-in one of the same name.
    pub fn set_placeholder(&mut self, name: impl Into<String>, value: Placeholder) {
        self.placeholders.insert(name.into(), value);
    }

    pub fn set_template(&mut self, template: impl Into<String>) {
        self.template = template.into();
    }

    pub fn proxy_class_name(&self, class_name: &str) -> String {
        proxy_class_name(&self.proxy_namespace, class_name)
    }

    pub fn proxy_file_name(&self, class_name: &str) -> PathBuf {
        proxy_file_name(&self.proxy_directory, class_name)
    }

    /// Render the proxy for `class` and, when `file` is given, write it
    /// there atomically.  Returns the generated source.
    pub fn generate_proxy_class(
        &self,
        class: &dyn ClassMetadata,
        file: Option<&Path>,
    ) -> Result<String, ProxyError> {
        let code = self.generate_proxy_code(class)?;
        if let Some(file) = file {
            self.write_atomically(file, &code)?;
            debug!("wrote proxy for {} to {}", class.name(), file.display());
        }
        Ok(code)
    }

    /// Render the proxy source for `class`.
    pub fn generate_proxy_code(&self, class: &dyn ClassMetadata) -> Result<String, ProxyError> {
        verify_class_can_be_proxied(class)?;

        let mut out = String::with_capacity(self.template.len() * 2);
        let mut rest = self.template.as_str();
        while let Some(open) = rest.find('<') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let len = after.bytes().take_while(|b| b.is_ascii_alphabetic()).count();
            if len > 0 && after.as_bytes().get(len) == Some(&b'>') {
                out.push_str(&self.placeholder_value(&after[..len], class)?);
                rest = &after[len + 1..];
            } else {
                out.push('<');
                rest = after;
            }
        }
        out.push_str(rest);
        Ok(out)
    }

    fn placeholder_value(&self, name: &str, class: &dyn ClassMetadata) -> Result<String, ProxyError> {
        if let Some(custom) = self.placeholders.get(name) {
            return Ok(match custom {
                Placeholder::Text(text) => text.clone(),
                Placeholder::Generated(generate) => generate(class),
            });
        }

        match name {
            "namespace" => Ok(namespace_of(&self.proxy_class_name(class.name())).to_string()),
            "proxyShortClassName" => Ok(class.reflection_class().short_name().to_string()),
            "className" => Ok(class.name().to_string()),
            "baseProxyInterface" => Ok(BASE_PROXY_INTERFACE.to_string()),
            "additionalProperties" => Ok(String::new()),
            "constructorImpl" => Ok(generate_constructor_impl(class)),
            "magicGet" => self.generate_magic_get(class),
            "magicSet" => self.generate_magic_set(class),
            "magicIsset" => self.generate_magic_isset(class),
            "sleepImpl" => self.generate_sleep_impl(class),
            "wakeupImpl" => Ok(generate_wakeup_impl(class)),
            "cloneImpl" => Ok(generate_clone_impl(class)),
            "methods" => self.generate_methods(class),
            "lazyPropertiesNames" => Ok(generate_lazy_properties_names(class)),
            "lazyPropertiesDefaults" => Ok(generate_lazy_properties_defaults(class)),
            _ => Err(ProxyError::InvalidPlaceholder(name.to_string())),
        }
    }

    fn write_atomically(&self, file: &Path, code: &str) -> Result<(), ProxyError> {
        let not_writable = || ProxyError::ProxyDirectoryNotWritable(self.proxy_directory.clone());
        let parent = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !parent.is_dir() && std::fs::create_dir_all(parent).is_err() {
            return Err(not_writable());
        }

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|_| not_writable())?;
        tmp.write_all(code.as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o664))?;
        }
        tmp.persist(file).map_err(|e| ProxyError::Io(e.error))?;
        Ok(())
    }

    // ─── Magic methods ──────────────────────────────────────────────────

    fn generate_magic_get(&self, class: &dyn ClassMetadata) -> Result<String, ProxyError> {
        let lazy = lazy_loaded_properties(class);
        let parent_get = class.reflection_class().method("__get");
        if lazy.is_empty() && parent_get.is_none() {
            return Ok(String::new());
        }

        let (inherit_doc, reference, parameters, return_type) = match parent_get {
            Some(method) => (
                "{@inheritDoc}",
                if method.returns_reference { "& " } else { "" },
                self.parameters_string(class, method, &["name"])?,
                self.return_type(class, method)?,
            ),
            None => ("", "", "$name".to_string(), String::new()),
        };
        let returns_void = parent_get.is_some_and(|m| m.return_type.as_ref().is_some_and(|h| h.is_builtin("void")));
        let returns_never = parent_get.is_some_and(|m| m.return_type.as_ref().is_some_and(|h| h.is_builtin("never")));

        let mut code = format!(
            "    /**\n     * {inherit_doc}\n     * @param string $name\n     */\n    public function {reference}__get({parameters}){return_type}\n    {{\n"
        );

        if !lazy.is_empty() {
            code.push_str("        if (\\array_key_exists($name, self::$lazyPropertiesNames)) {\n");
            code.push_str("            $this->__initializer__ && $this->__initializer__->__invoke($this, '__get', [$name]);\n");
            code.push_str(if returns_void {
                "            return;\n"
            } else {
                "            return $this->$name;\n"
            });
            code.push_str("        }\n\n");
        }

        if parent_get.is_some() {
            code.push_str("        $this->__initializer__ && $this->__initializer__->__invoke($this, '__get', [$name]);\n");
            if returns_void {
                code.push_str("        parent::__get($name);\n        return;");
            } else if returns_never {
                code.push_str("        parent::__get($name);");
            } else {
                code.push_str("        return parent::__get($name);");
            }
        } else {
            code.push_str(
                "        trigger_error(sprintf('Undefined property: %s::$%s', __CLASS__, $name), E_USER_NOTICE);",
            );
        }

        code.push_str("\n    }");
        Ok(code)
    }

    fn generate_magic_set(&self, class: &dyn ClassMetadata) -> Result<String, ProxyError> {
        let lazy = lazy_loaded_properties(class);
        let parent_set = class.reflection_class().method("__set");
        if lazy.is_empty() && parent_set.is_none() {
            return Ok(String::new());
        }

        let (inherit_doc, parameters, return_type) = match parent_set {
            Some(method) => (
                "{@inheritDoc}",
                self.parameters_string(class, method, &["name", "value"])?,
                self.return_type(class, method)?,
            ),
            None => ("", "$name, $value".to_string(), String::new()),
        };

        let mut code = format!(
            "    /**\n     * {inherit_doc}\n     * @param string $name\n     * @param mixed  $value\n     */\n    public function __set({parameters}){return_type}\n    {{\n"
        );

        if !lazy.is_empty() {
            code.push_str("        if (\\array_key_exists($name, self::$lazyPropertiesNames)) {\n");
            code.push_str("            $this->__initializer__ && $this->__initializer__->__invoke($this, '__set', [$name, $value]);\n\n");
            code.push_str("            $this->$name = $value;\n\n");
            code.push_str("            return;\n");
            code.push_str("        }\n\n");
        }

        match parent_set {
            Some(method) => {
                code.push_str("        $this->__initializer__ && $this->__initializer__->__invoke($this, '__set', [$name, $value]);\n\n");
                match &method.return_type {
                    Some(hint) if hint.is_builtin("void") => {
                        code.push_str("        parent::__set($name, $value);\n        return;")
                    }
                    Some(hint) if hint.is_builtin("never") => {
                        code.push_str("        parent::__set($name, $value);")
                    }
                    _ => code.push_str("        return parent::__set($name, $value);"),
                }
            }
            None => code.push_str("        $this->$name = $value;"),
        }

        code.push_str("\n    }");
        Ok(code)
    }

    fn generate_magic_isset(&self, class: &dyn ClassMetadata) -> Result<String, ProxyError> {
        let lazy = lazy_loaded_properties(class);
        let parent_isset = class.reflection_class().method("__isset");
        if lazy.is_empty() && parent_isset.is_none() {
            return Ok(String::new());
        }

        let (inherit_doc, parameters, return_type) = match parent_isset {
            Some(method) => (
                "{@inheritDoc}",
                self.parameters_string(class, method, &["name"])?,
                self.return_type(class, method)?,
            ),
            None => ("", "$name".to_string(), String::new()),
        };

        let mut code = format!(
            "    /**\n     * {inherit_doc}\n     * @param  string $name\n     * @return boolean\n     */\n    public function __isset({parameters}){return_type}\n    {{\n"
        );

        if !lazy.is_empty() {
            code.push_str("        if (\\array_key_exists($name, self::$lazyPropertiesNames)) {\n");
            code.push_str("            $this->__initializer__ && $this->__initializer__->__invoke($this, '__isset', [$name]);\n\n");
            code.push_str("            return isset($this->$name);\n");
            code.push_str("        }\n\n");
        }

        if parent_isset.is_some() {
            code.push_str("        $this->__initializer__ && $this->__initializer__->__invoke($this, '__isset', [$name]);\n\n");
            code.push_str("        return parent::__isset($name);");
        } else {
            code.push_str("        return false;");
        }

        code.push_str("\n    }");
        Ok(code)
    }

    fn generate_sleep_impl(&self, class: &dyn ClassMetadata) -> Result<String, ProxyError> {
        let reflection = class.reflection_class();
        let parent_sleep = reflection.method("__sleep");
        let (inherit_doc, return_type) = match parent_sleep {
            Some(method) => ("{@inheritDoc}", self.return_type(class, method)?),
            None => ("", String::new()),
        };

        let mut code = format!(
            "    /**\n     * {inherit_doc}\n     * @return array\n     */\n    public function __sleep(){return_type}\n    {{\n"
        );

        if parent_sleep.is_some() {
            code.push_str("        $properties = array_merge(['__isInitialized__'], parent::__sleep());\n\n");
            code.push_str("        if ($this->__isInitialized__) {\n");
            code.push_str("            $properties = array_diff($properties, array_keys(self::$lazyPropertiesNames));\n");
            code.push_str("        }\n\n");
            code.push_str("        return $properties;\n    }");
            return Ok(code);
        }

        let lazy: HashSet<&str> = lazy_loaded_properties(class)
            .into_iter()
            .map(|p| p.name.as_str())
            .collect();
        let mut all = vec![php_string("__isInitialized__")];
        let mut eager = vec![php_string("__isInitialized__")];
        for property in reflection.properties.iter().filter(|p| !p.is_static) {
            let serialized = match property.visibility {
                Visibility::Private => format!(
                    "\"\\0{}\\0{}\"",
                    property.declaring_class.name.replace('\\', "\\\\"),
                    property.name
                ),
                Visibility::Protected => format!("\"\\0*\\0{}\"", property.name),
                Visibility::Public => php_string(&property.name),
            };
            if !lazy.contains(property.name.as_str()) {
                eager.push(serialized.clone());
            }
            all.push(serialized);
        }

        code.push_str(&format!(
            "        if ($this->__isInitialized__) {{\n            return [{}];\n        }}\n\n        return [{}];\n    }}",
            all.join(", "),
            eager.join(", ")
        ));
        Ok(code)
    }

    // ─── Forwarded methods ──────────────────────────────────────────────

    fn generate_methods(&self, class: &dyn ClassMetadata) -> Result<String, ProxyError> {
        let mut code = String::new();

        for method in forwarded_methods(class) {
            let return_keyword = if returns_nothing(method) { "" } else { "return " };
            code.push_str("\n    /**\n     * {@inheritDoc}\n     */\n    public function ");
            if method.returns_reference {
                code.push('&');
            }
            code.push_str(&format!(
                "{}({}){}\n    {{\n",
                method.name,
                self.parameters_string(class, method, &[])?,
                self.return_type(class, method)?
            ));

            if is_short_identifier_getter(method, class) {
                let identifier = lcfirst(&method.name[3..]);
                let cast = match class.type_of_field(&identifier).as_deref() {
                    Some("integer") | Some("smallint") => "(int) ",
                    _ => "",
                };
                code.push_str("        if ($this->__isInitialized__ === false) {\n");
                code.push_str(&format!(
                    "            {return_keyword}{cast}parent::{}();\n",
                    method.name
                ));
                code.push_str("        }\n\n");
            }

            let invoke: Vec<String> = method
                .parameters
                .iter()
                .map(|p| format!("${}", p.name))
                .collect();
            let call: Vec<String> = method
                .parameters
                .iter()
                .map(|p| format!("{}${}", if p.is_variadic { "..." } else { "" }, p.name))
                .collect();

            code.push_str(&format!(
                "\n        $this->__initializer__ && $this->__initializer__->__invoke($this, {}, [{}]);\n\n        {return_keyword}parent::{}({});\n    }}\n",
                php_string(&method.name),
                invoke.join(", "),
                method.name,
                call.join(", ")
            ));
        }

        Ok(code)
    }

    /// `parameters` rendered as a PHP parameter list.  Parameters are
    /// renamed positionally from `rename` when given.
    fn parameters_string(
        &self,
        class: &dyn ClassMetadata,
        method: &ReflectionMethod,
        rename: &[&str],
    ) -> Result<String, ProxyError> {
        let mut definitions = Vec::with_capacity(method.parameters.len());
        for (i, parameter) in method.parameters.iter().enumerate() {
            let mut definition = String::new();
            if let Some(hint) = &parameter.type_hint {
                definition.push_str(&self.format_type(hint, class, method, Some(parameter))?);
                definition.push(' ');
            }
            if parameter.is_reference {
                definition.push('&');
            }
            if parameter.is_variadic {
                definition.push_str("...");
            }
            definition.push('$');
            definition.push_str(rename.get(i).copied().unwrap_or(&parameter.name));
            if let Some(default) = &parameter.default {
                definition.push_str(" = ");
                definition.push_str(default);
            }
            definitions.push(definition);
        }
        Ok(definitions.join(", "))
    }

    fn return_type(
        &self,
        class: &dyn ClassMetadata,
        method: &ReflectionMethod,
    ) -> Result<String, ProxyError> {
        match &method.return_type {
            Some(hint) => Ok(format!(": {}", self.format_type(hint, class, method, None)?)),
            None => Ok(String::new()),
        }
    }

    /// Render `hint` with `self` and `parent` expanded to the classes they
    /// name, checking referenced classes against the class lookup.
    fn format_type(
        &self,
        hint: &TypeHint,
        class: &dyn ClassMetadata,
        method: &ReflectionMethod,
        parameter: Option<&ReflectionParameter>,
    ) -> Result<String, ProxyError> {
        let invalid = || match parameter {
            Some(parameter) => ProxyError::InvalidParameterTypeHint {
                class: method.declaring_class.name.clone(),
                method: method.name.clone(),
                parameter: parameter.name.clone(),
            },
            None => ProxyError::InvalidReturnTypeHint {
                class: method.declaring_class.name.clone(),
                method: method.name.clone(),
            },
        };

        match hint {
            TypeHint::Union(types) => {
                let mut parts = Vec::with_capacity(types.len());
                for t in types {
                    let formatted = self.format_type(t, class, method, parameter)?;
                    parts.push(if matches!(t, TypeHint::Intersection(_)) {
                        format!("({})", formatted)
                    } else {
                        formatted
                    });
                }
                Ok(parts.join("|"))
            }
            TypeHint::Intersection(types) => {
                let parts = types
                    .iter()
                    .map(|t| self.format_type(t, class, method, parameter))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(parts.join("&"))
            }
            TypeHint::Nullable(inner) => {
                let formatted = self.format_type(inner, class, method, parameter)?;
                if inner.is_builtin("mixed") || inner.is_builtin("null") {
                    Ok(formatted)
                } else {
                    Ok(format!("?{}", formatted))
                }
            }
            TypeHint::Builtin(name) => Ok(name.clone()),
            TypeHint::Static => Ok("static".to_string()),
            TypeHint::SelfType => Ok(format!("\\{}", method.declaring_class.name)),
            TypeHint::Parent => {
                let declaring = &method.declaring_class.name;
                let parent = if declaring.eq_ignore_ascii_case(class.name()) {
                    class.reflection_class().parent.clone()
                } else {
                    self.class_lookup
                        .as_ref()
                        .and_then(|lookup| lookup.parent_class(declaring))
                };
                parent.map(|p| format!("\\{}", p)).ok_or_else(invalid)
            }
            TypeHint::Class(name) => {
                if name.is_empty() || name.ends_with('\\') {
                    return Err(invalid());
                }
                if let Some(lookup) = &self.class_lookup
                    && !lookup.class_exists(name)
                {
                    return Err(invalid());
                }
                Ok(format!("\\{}", name))
            }
        }
    }
}

fn verify_class_can_be_proxied(class: &dyn ClassMetadata) -> Result<(), ProxyError> {
    let reflection = class.reflection_class();
    let name = || class.name().to_string();
    if reflection.kind != ClassLikeKind::Class {
        return Err(ProxyError::NotAClass(name()));
    }
    if reflection.is_final {
        return Err(ProxyError::FinalClass(name()));
    }
    if reflection.is_abstract {
        return Err(ProxyError::AbstractClass(name()));
    }
    if reflection.is_readonly {
        return Err(ProxyError::ReadonlyClass(name()));
    }
    if let Some(property) = lazy_loaded_properties(class).into_iter().find(|p| p.is_readonly) {
        return Err(ProxyError::ReadonlyProperty {
            class: name(),
            property: property.name.clone(),
        });
    }
    Ok(())
}

fn generate_constructor_impl(class: &dyn ClassMetadata) -> String {
    let unset: Vec<String> = lazy_loaded_properties(class)
        .iter()
        .map(|p| format!("$this->{}", p.name))
        .collect();

    let mut code = String::from(
        "    public function __construct(?\\Closure $initializer = null, ?\\Closure $cloner = null)\n    {\n",
    );
    if !unset.is_empty() {
        code.push_str(&format!("        unset({});\n", unset.join(", ")));
    }
    code.push_str("\n        $this->__initializer__ = $initializer;\n        $this->__cloner__      = $cloner;\n    }");
    code
}

fn generate_wakeup_impl(class: &dyn ClassMetadata) -> String {
    let reflection = class.reflection_class();
    let has_wakeup = reflection.has_method("__wakeup");
    let inherit_doc = if has_wakeup { "{@inheritDoc}" } else { "" };
    let short_name = short_name(class.name());
    let unset: Vec<String> = lazy_loaded_properties(class)
        .iter()
        .map(|p| format!("$this->{}", p.name))
        .collect();

    let mut code = format!(
        r#"    /**
     * {inherit_doc}
     */
    public function __wakeup()
    {{
        if ( ! $this->__isInitialized__) {{
            $this->__initializer__ = function ({short_name} $proxy) {{
                $proxy->__setInitializer(null);
                $proxy->__setCloner(null);

                $existingProperties = get_object_vars($proxy);

                foreach ($proxy::$lazyPropertiesDefaults as $property => $defaultValue) {{
                    if ( ! array_key_exists($property, $existingProperties)) {{
                        $proxy->$property = $defaultValue;
                    }}
                }}
            }};
"#
    );
    if !unset.is_empty() {
        code.push_str(&format!("\n            unset({});", unset.join(", ")));
    }
    code.push_str("\n        }");
    if has_wakeup {
        code.push_str("\n        parent::__wakeup();");
    }
    code.push_str("\n    }");
    code
}

fn generate_clone_impl(class: &dyn ClassMetadata) -> String {
    let has_clone = class.reflection_class().has_method("__clone");
    let inherit_doc = if has_clone { "{@inheritDoc}" } else { "" };
    let call_parent = if has_clone { "\n        parent::__clone();\n" } else { "" };
    format!(
        "    /**\n     * {inherit_doc}\n     */\n    public function __clone()\n    {{\n        $this->__cloner__ && $this->__cloner__->__invoke($this, '__clone', []);\n{call_parent}    }}"
    )
}

fn generate_lazy_properties_names(class: &dyn ClassMetadata) -> String {
    let entries: Vec<String> = lazy_loaded_properties(class)
        .iter()
        .map(|p| format!("{} => null", php_string(&p.name)))
        .collect();
    format!("[{}]", entries.join(", "))
}

fn generate_lazy_properties_defaults(class: &dyn ClassMetadata) -> String {
    let entries: Vec<String> = lazy_loaded_properties(class)
        .iter()
        .map(|p| format!("{} => {}", php_string(&p.name), p.default.as_deref().unwrap_or("null")))
        .collect();
    format!("[{}]", entries.join(", "))
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::metadata::SimpleClassMetadata;
    use crate::types::ReflectionClass;

    fn generator() -> ProxyGenerator {
        ProxyGenerator::new("/tmp/proxies", "Proxies").unwrap()
    }

    #[test]
    fn names_use_the_marker() {
        assert_eq!(
            proxy_class_name("Proxies\\", "\\App\\Entity\\User"),
            "Proxies\\__CG__\\App\\Entity\\User"
        );
        assert_eq!(
            proxy_file_name(Path::new("/tmp/p"), "App\\Entity\\User"),
            PathBuf::from("/tmp/p/__CG__AppEntityUser.php")
        );
    }

    #[test]
    fn empty_configuration_is_rejected() {
        assert!(matches!(
            ProxyGenerator::new("", "Proxies"),
            Err(ProxyError::ProxyDirectoryRequired)
        ));
        assert!(matches!(
            ProxyGenerator::new("/tmp", ""),
            Err(ProxyError::ProxyNamespaceRequired)
        ));
    }

    #[test]
    fn custom_placeholders_override_builtin_ones() {
        let mut generator = generator();
        generator.set_template("<?php // <className> <extra> array<int, string>");
        generator.set_placeholder("extra", Placeholder::Text("hello".to_string()));
        generator.set_placeholder(
            "className",
            Placeholder::Generated(Arc::new(|class| class.name().to_uppercase())),
        );
        let metadata = SimpleClassMetadata::new(ReflectionClass::new("App\\User"));
        let code = generator.generate_proxy_code(&metadata).unwrap();
        assert_eq!(code, "<?php // APP\\USER hello array<int, string>");
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        let mut generator = generator();
        generator.set_template("<missing>");
        let metadata = SimpleClassMetadata::new(ReflectionClass::new("App\\User"));
        let err = generator.generate_proxy_code(&metadata).unwrap_err();
        assert!(matches!(err, ProxyError::InvalidPlaceholder(name) if name == "missing"));
    }

    #[test]
    fn final_classes_are_rejected() {
        let mut class = ReflectionClass::new("App\\User");
        class.is_final = true;
        let err = generator()
            .generate_proxy_code(&SimpleClassMetadata::new(class))
            .unwrap_err();
        assert!(matches!(err, ProxyError::FinalClass(_)));
    }

    #[test]
    fn lcfirst_lowers_only_the_first_character() {
        assert_eq!(lcfirst("Id"), "id");
        assert_eq!(lcfirst("UserId"), "userId");
        assert_eq!(lcfirst(""), "");
    }
}
