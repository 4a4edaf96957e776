//! Proxy factory.
//!
//! Owns one [`ProxyDefinition`] per class, makes sure the generated proxy
//! file is in place according to the [`AutoGenerate`] mode, and hands out
//! [`Proxy`] instances whose default initializer and cloner load state
//! through an [`EntityLoader`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::annotations::Value;
use crate::error::ProxyError;
use crate::types::ClassLikeKind;

use super::generator::ProxyGenerator;
use super::metadata::ClassMetadata;
use super::runtime::{Cloner, Initializer, MethodThunk, Proxy, ProxyDefinition};

/// When proxy files are (re)generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AutoGenerate {
    /// Files must already exist.
    Never,
    /// Regenerate on every first use.
    Always,
    /// Generate when the file is missing.
    FileNotExists,
    /// Render in memory only; nothing is written.
    Eval,
    /// Generate when the file is missing or older than the class source.
    FileNotExistsOrChanged,
}

/// What [`ensure_proxy_file`] did with a proxy file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyFileStatus {
    Written,
    /// The existing file was kept.
    Kept,
    /// Rendered without touching the filesystem.
    InMemory,
}

/// Put the proxy file for `metadata` in place as `mode` requires.
pub fn ensure_proxy_file(
    generator: &ProxyGenerator,
    mode: AutoGenerate,
    metadata: &dyn ClassMetadata,
) -> Result<ProxyFileStatus, ProxyError> {
    let file = generator.proxy_file_name(metadata.name());
    let regenerate = match mode {
        AutoGenerate::Never => {
            if !file.is_file() {
                return Err(ProxyError::ProxyFileMissing(file));
            }
            false
        }
        AutoGenerate::Always => true,
        AutoGenerate::FileNotExists => !file.is_file(),
        AutoGenerate::Eval => {
            generator.generate_proxy_class(metadata, None)?;
            return Ok(ProxyFileStatus::InMemory);
        }
        AutoGenerate::FileNotExistsOrChanged => {
            !file.is_file() || is_older_than_source(&file, metadata)
        }
    };

    if !regenerate {
        return Ok(ProxyFileStatus::Kept);
    }
    generator.generate_proxy_class(metadata, Some(&file))?;
    Ok(ProxyFileStatus::Written)
}

/// Loads persisted entity state by identifier.
pub trait EntityLoader: Send + Sync {
    /// Field values of the entity, or `None` when it does not exist.
    fn load(
        &self,
        class: &str,
        identifier: &BTreeMap<String, Value>,
    ) -> Result<Option<BTreeMap<String, Value>>, ProxyError>;
}

/// Creates proxies for registered classes.
pub struct ProxyFactory {
    generator: ProxyGenerator,
    auto_generate: AutoGenerate,
    loader: Arc<dyn EntityLoader>,
    /// Keyed by lower-cased class name.
    metadata: Mutex<HashMap<String, Arc<dyn ClassMetadata>>>,
    thunks: Mutex<HashMap<String, HashMap<String, MethodThunk>>>,
    definitions: Mutex<HashMap<String, Arc<ProxyDefinition>>>,
}

impl ProxyFactory {
    pub fn new(
        generator: ProxyGenerator,
        auto_generate: AutoGenerate,
        loader: Arc<dyn EntityLoader>,
    ) -> Self {
        Self {
            generator,
            auto_generate,
            loader,
            metadata: Mutex::new(HashMap::new()),
            thunks: Mutex::new(HashMap::new()),
            definitions: Mutex::new(HashMap::new()),
        }
    }

    pub fn generator(&self) -> &ProxyGenerator {
        &self.generator
    }

    pub fn auto_generate(&self) -> AutoGenerate {
        self.auto_generate
    }

    /// Make `metadata` available to [`ProxyFactory::get_proxy`].
    pub fn register_class(&self, metadata: Arc<dyn ClassMetadata>) {
        let key = metadata.name().to_ascii_lowercase();
        self.definitions.lock().remove(&key);
        self.metadata.lock().insert(key, metadata);
    }

    /// Register the body of `class::method` run by [`Proxy::call`].
    pub fn register_method(&self, class: &str, method: &str, thunk: MethodThunk) {
        let key = class.trim_start_matches('\\').to_ascii_lowercase();
        self.definitions.lock().remove(&key);
        self.thunks
            .lock()
            .entry(key)
            .or_default()
            .insert(method.to_ascii_lowercase(), thunk);
    }

    fn metadata_for(&self, class: &str) -> Result<Arc<dyn ClassMetadata>, ProxyError> {
        self.metadata
            .lock()
            .get(&class.trim_start_matches('\\').to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| ProxyError::UnknownClass(class.to_string()))
    }

    /// The definition for `class`, creating it (and its proxy file) on
    /// first use.
    pub fn definition(&self, class: &str) -> Result<Arc<ProxyDefinition>, ProxyError> {
        let key = class.trim_start_matches('\\').to_ascii_lowercase();
        if let Some(definition) = self.definitions.lock().get(&key) {
            return Ok(definition.clone());
        }

        let metadata = self.metadata_for(class)?;
        ensure_proxy_file(&self.generator, self.auto_generate, metadata.as_ref())?;

        let thunks = self.thunks.lock().get(&key).cloned().unwrap_or_default();
        let definition = ProxyDefinition::from_metadata(
            metadata.as_ref(),
            self.generator.proxy_class_name(metadata.name()),
            &thunks,
        )
        .with_initializer(self.create_initializer(metadata.clone()))
        .with_cloner(self.create_cloner(metadata.clone()));

        let definition = Arc::new(definition);
        self.definitions.lock().insert(key, definition.clone());
        Ok(definition)
    }

    /// An uninitialized proxy for the entity of `class` with `identifier`.
    /// Every identifier field must have a value.
    pub fn get_proxy(
        &self,
        class: &str,
        identifier: &BTreeMap<String, Value>,
    ) -> Result<Proxy, ProxyError> {
        let definition = self.definition(class)?;
        let mut proxy = Proxy::new(definition.clone());
        for field in &definition.identifier_fields {
            let value = identifier
                .get(field)
                .filter(|v| !v.is_null())
                .ok_or_else(|| ProxyError::MissingIdentifier {
                    class: definition.class_name.clone(),
                    field: field.clone(),
                })?;
            proxy.set_field(field.clone(), value.clone());
        }
        Ok(proxy)
    }

    /// Write proxy files for `classes` into `directory` (the generator's
    /// directory when `None`).  Abstract classes and non-classes are
    /// skipped.  Returns the number of files written.
    pub fn generate_proxy_classes(
        &self,
        classes: &[Arc<dyn ClassMetadata>],
        directory: Option<&Path>,
    ) -> Result<usize, ProxyError> {
        let directory = directory.unwrap_or(self.generator.proxy_directory());
        let mut generated = 0;
        for class in classes {
            let reflection = class.reflection_class();
            if reflection.is_abstract || reflection.kind != ClassLikeKind::Class {
                debug!("skipping proxy for {}", class.name());
                continue;
            }
            let file = super::generator::proxy_file_name(directory, class.name());
            self.generator.generate_proxy_class(class.as_ref(), Some(&file))?;
            generated += 1;
        }
        info!("generated {} proxy classes in {}", generated, directory.display());
        Ok(generated)
    }

    /// Give an uninitialized proxy the definition's initializer and cloner
    /// again, e.g. after it was unserialized.
    pub fn reset_uninitialized_proxy(&self, proxy: &mut Proxy) -> Result<(), ProxyError> {
        if proxy.is_initialized() {
            return Err(ProxyError::UninitializedProxyExpected(
                proxy.definition().proxy_class_name.clone(),
            ));
        }
        let definition = self.definition(proxy.class_name())?;
        proxy.set_initializer(definition.initializer.clone());
        proxy.set_cloner(definition.cloner.clone());
        Ok(())
    }

    /// Loads the entity and copies its lazy properties into the proxy.
    /// On failure the proxy is left uninitialized with its cloner intact.
    fn create_initializer(&self, metadata: Arc<dyn ClassMetadata>) -> Initializer {
        let loader = self.loader.clone();
        Arc::new(move |proxy: &mut Proxy, _: &str, _: &[Value]| {
            let cloner = proxy.cloner().cloned();
            proxy.set_initializer(None);
            proxy.set_cloner(None);

            for (name, default) in proxy.lazy_properties().clone() {
                if proxy.field(&name).is_none() {
                    proxy.set_field(name, default);
                }
            }

            let identifier = proxy.identifier();
            let state = match loader.load(metadata.name(), &identifier) {
                Ok(Some(state)) => state,
                Ok(None) => {
                    proxy.set_cloner(cloner);
                    return Err(not_found(metadata.name(), &identifier));
                }
                Err(e) => {
                    proxy.set_cloner(cloner);
                    return Err(e);
                }
            };

            copy_persistent_fields(metadata.as_ref(), proxy, state, false);
            proxy.set_initialized(true);
            Ok(())
        })
    }

    /// Loads a fresh copy of the entity into a cloned, uninitialized proxy.
    fn create_cloner(&self, metadata: Arc<dyn ClassMetadata>) -> Cloner {
        let loader = self.loader.clone();
        Arc::new(move |proxy: &mut Proxy| {
            if proxy.is_initialized() {
                return Ok(());
            }
            proxy.set_initialized(true);
            proxy.set_initializer(None);

            let identifier = proxy.identifier();
            let state = loader
                .load(metadata.name(), &identifier)?
                .ok_or_else(|| not_found(metadata.name(), &identifier))?;
            copy_persistent_fields(metadata.as_ref(), proxy, state, true);
            Ok(())
        })
    }
}

/// Copy mapped fields and associations from loaded state, leaving
/// identifier fields alone.
fn copy_persistent_fields(
    metadata: &dyn ClassMetadata,
    proxy: &mut Proxy,
    state: BTreeMap<String, Value>,
    skip_identifier: bool,
) {
    for (name, value) in state {
        if skip_identifier && metadata.is_identifier(&name) {
            continue;
        }
        if !metadata.has_field(&name) && !metadata.has_association(&name) {
            continue;
        }
        proxy.set_field(name, value);
    }
}

fn not_found(class: &str, identifier: &BTreeMap<String, Value>) -> ProxyError {
    let identifier = identifier
        .iter()
        .map(|(k, v)| format!("{}={}", k, v.to_json()))
        .collect::<Vec<_>>()
        .join(", ");
    ProxyError::EntityNotFound {
        class: class.to_string(),
        identifier,
    }
}

fn is_older_than_source(file: &Path, metadata: &dyn ClassMetadata) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|m| m.modified()).ok();
    match (modified(file), metadata.reflection_class().file().and_then(modified)) {
        (Some(proxy), Some(source)) => proxy < source,
        _ => false,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_generate_modes_deserialize_from_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: AutoGenerate,
        }
        let parsed: Wrapper = toml::from_str("mode = \"file-not-exists-or-changed\"").unwrap();
        assert_eq!(parsed.mode, AutoGenerate::FileNotExistsOrChanged);
        let parsed: Wrapper = toml::from_str("mode = \"eval\"").unwrap();
        assert_eq!(parsed.mode, AutoGenerate::Eval);
    }
}
