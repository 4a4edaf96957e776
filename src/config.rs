//! Configuration.
//!
//! Settings are read from `.phpantom-meta.toml` in the working directory
//! (or a file given on the command line).  Every key is optional:
//!
//! ```toml
//! [annotations]
//! ignored-names = ["dataProvider"]
//! ignore-not-imported = false
//! indexed = false
//!
//! [annotations.imports]
//! orm = "Doctrine\\ORM\\Mapping"
//!
//! [proxy]
//! directory = "var/proxies"
//! namespace = "Proxies"
//! auto-generate = "file-not-exists"
//!
//! [cache]
//! enabled = true
//! debug = true
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::annotations::imports::{IgnoredNames, ImportTable};
use crate::annotations::registry::IGNORE_ANNOTATION;
use crate::error::ConfigError;
use crate::proxy::AutoGenerate;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".phpantom-meta.toml";

/// Directory name used under the platform cache directory.
const CACHE_DIR_NAME: &str = "phpantom-meta";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub annotations: AnnotationsConfig,
    pub proxy: ProxyConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AnnotationsConfig {
    /// Added to the default ignored names.
    pub ignored_names: Vec<String>,
    /// Added to the default imports.  Keys follow
    /// [`ImportTable::insert`](crate::annotations::ImportTable::insert).
    pub imports: BTreeMap<String, String>,
    pub ignore_not_imported: bool,
    pub indexed: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProxyConfig {
    pub directory: PathBuf,
    pub namespace: String,
    pub auto_generate: AutoGenerate,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("proxies"),
            namespace: "Proxies".to_string(),
            auto_generate: AutoGenerate::FileNotExists,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    pub enabled: bool,
    /// Defaults to a directory under the platform cache directory.
    pub directory: Option<PathBuf>,
    /// Regenerate entries older than their source file.
    pub debug: bool,
}

impl Config {
    /// Parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `.phpantom-meta.toml` from `dir`, or the defaults when the file
    /// does not exist.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            debug!("no {} in {}, using defaults", CONFIG_FILE_NAME, dir.display());
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// The reader configuration: defaults extended with this file's
    /// `[annotations]` section.
    pub fn reader_config(&self) -> ReaderConfig {
        let mut config = ReaderConfig::default();
        config
            .ignored_names
            .extend(self.annotations.ignored_names.iter().cloned());
        for (key, target) in &self.annotations.imports {
            config.imports.insert(key, target);
        }
        config.ignore_not_imported = self.annotations.ignore_not_imported;
        config.indexed = self.annotations.indexed;
        config
    }

    /// The annotation cache directory.
    pub fn cache_directory(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.cache.directory {
            return Ok(dir.clone());
        }
        use etcetera::BaseStrategy;
        let strategy = etcetera::choose_base_strategy().map_err(|_| ConfigError::NoCacheDirectory)?;
        Ok(strategy.cache_dir().join(CACHE_DIR_NAME))
    }
}

/// Settings an [`AnnotationReader`](crate::annotations::AnnotationReader)
/// is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Names skipped in every doc comment.
    pub ignored_names: IgnoredNames,
    /// Imports available in every doc comment.
    pub imports: ImportTable,
    /// Skip annotations that resolve to nothing instead of failing.
    pub ignore_not_imported: bool,
    /// Keep one annotation per class.
    pub indexed: bool,
}

impl Default for ReaderConfig {
    /// [`DEFAULT_IGNORED_NAMES`](crate::annotations::DEFAULT_IGNORED_NAMES)
    /// and the `IgnoreAnnotation` import.
    fn default() -> Self {
        Self {
            ignored_names: IgnoredNames::defaults(),
            imports: ImportTable::from_entries([("ignoreannotation", IGNORE_ANNOTATION)]),
            ignore_not_imported: false,
            indexed: false,
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_sections() {
        let config = Config::parse(
            Path::new("test.toml"),
            r#"
[annotations]
ignored-names = ["dataProvider"]
indexed = true

[annotations.imports]
orm = "Doctrine\\ORM\\Mapping"

[proxy]
directory = "var/proxies"
auto-generate = "always"

[cache]
enabled = true
directory = "/tmp/cache"
"#,
        )
        .unwrap();

        assert!(config.annotations.indexed);
        assert_eq!(config.proxy.directory, PathBuf::from("var/proxies"));
        assert_eq!(config.proxy.namespace, "Proxies");
        assert_eq!(config.proxy.auto_generate, AutoGenerate::Always);
        assert_eq!(config.cache_directory().unwrap(), PathBuf::from("/tmp/cache"));

        let reader = config.reader_config();
        assert!(reader.ignored_names.contains("dataProvider"));
        assert!(reader.ignored_names.contains("param"));
        assert_eq!(reader.imports.get("ORM"), Some("Doctrine\\ORM\\Mapping"));
        assert_eq!(reader.imports.get("IgnoreAnnotation"), Some(IGNORE_ANNOTATION));
    }

    #[test]
    fn invalid_file_reports_path() {
        let err = Config::parse(Path::new("bad.toml"), "[proxy\n").unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let config = Config::discover(dir.path()).unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(config.proxy.auto_generate, AutoGenerate::FileNotExists);
    }
}
