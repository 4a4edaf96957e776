//! Maps proxy class names to generated proxy files.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ProxyError;

/// Called with the proxy directory, the proxy namespace and the class name
/// when a proxy file is missing, before it is read.
pub type NotFoundCallback = Box<dyn Fn(&Path, &str, &str) + Send + Sync>;

/// The file holding `class_name`: the part after the proxy namespace with
/// namespace separators removed.
pub fn resolve_file(
    proxy_dir: &Path,
    proxy_namespace: &str,
    class_name: &str,
) -> Result<PathBuf, ProxyError> {
    let class_name = class_name.trim_start_matches('\\');
    let Some(relative) = class_name.strip_prefix(proxy_namespace) else {
        return Err(ProxyError::NotProxyClass {
            class: class_name.to_string(),
            namespace: proxy_namespace.to_string(),
        });
    };
    let file_name: String = relative.chars().filter(|&c| c != '\\').collect();
    Ok(proxy_dir.join(format!("{}.php", file_name)))
}

/// Loads proxy sources by class name.
pub struct Autoloader {
    proxy_dir: PathBuf,
    proxy_namespace: String,
    not_found: Option<NotFoundCallback>,
}

impl fmt::Debug for Autoloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Autoloader")
            .field("proxy_dir", &self.proxy_dir)
            .field("proxy_namespace", &self.proxy_namespace)
            .field("not_found", &self.not_found.is_some())
            .finish()
    }
}

impl Autoloader {
    pub fn new(proxy_dir: impl Into<PathBuf>, proxy_namespace: impl Into<String>) -> Self {
        Self {
            proxy_dir: proxy_dir.into(),
            proxy_namespace: proxy_namespace.into(),
            not_found: None,
        }
    }

    /// Run `callback` (typically regenerating the proxy) when a file is
    /// missing.
    pub fn with_not_found_callback(mut self, callback: NotFoundCallback) -> Self {
        self.not_found = Some(callback);
        self
    }

    pub fn resolve(&self, class_name: &str) -> Result<PathBuf, ProxyError> {
        resolve_file(&self.proxy_dir, &self.proxy_namespace, class_name)
    }

    /// The source of `class_name`, or `None` for classes outside the proxy
    /// namespace.
    pub fn load(&self, class_name: &str) -> Result<Option<String>, ProxyError> {
        let class_name = class_name.trim_start_matches('\\');
        if self.proxy_namespace.is_empty() || !class_name.starts_with(&self.proxy_namespace) {
            return Ok(None);
        }

        let file = self.resolve(class_name)?;
        if let Some(callback) = &self.not_found
            && !file.is_file()
        {
            debug!("proxy file {} missing, running callback", file.display());
            callback(&self.proxy_dir, &self.proxy_namespace, class_name);
        }

        let source = std::fs::read_to_string(&file).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ProxyError::ProxyFileMissing(file.clone()),
            _ => ProxyError::Io(e),
        })?;
        Ok(Some(source))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn resolves_relative_to_the_namespace() {
        let file = resolve_file(
            Path::new("/tmp/proxies"),
            "Proxies",
            "Proxies\\__CG__\\App\\Entity\\User",
        )
        .unwrap();
        assert_eq!(file, PathBuf::from("/tmp/proxies/__CG__AppEntityUser.php"));
    }

    #[test]
    fn classes_outside_the_namespace_are_rejected() {
        let err = resolve_file(Path::new("/tmp"), "Proxies", "App\\User").unwrap_err();
        assert!(matches!(err, ProxyError::NotProxyClass { .. }));
    }

    #[test]
    fn missing_file_runs_callback_before_reading() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let loader = Autoloader::new(dir.path(), "Proxies").with_not_found_callback(Box::new(
            move |dir, _, class| {
                seen.fetch_add(1, Ordering::SeqCst);
                let file = resolve_file(dir, "Proxies", class).unwrap();
                std::fs::write(file, "<?php // generated").unwrap();
            },
        ));

        let source = loader.load("Proxies\\__CG__\\App\\User").unwrap();
        assert_eq!(source.as_deref(), Some("<?php // generated"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        loader.load("Proxies\\__CG__\\App\\User").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(loader.load("App\\User").unwrap(), None);
    }
}
