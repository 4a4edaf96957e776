//! Import tables and ignored annotation names.

use std::collections::{BTreeMap, BTreeSet};

/// Key of the synthetic import entry that carries the declaring namespace.
pub const NAMESPACE_KEY: &str = "__NAMESPACE__";

/// Doc tags that are never treated as annotations.
pub const DEFAULT_IGNORED_NAMES: &[&str] = &[
    // Annotation tags
    "Annotation",
    "Attribute",
    "Attributes",
    "Required",
    "Target",
    "NamedArgumentConstructor",
    // Widely used tags (but not existent in phpdoc)
    "fix",
    "fixme",
    "override",
    // PHPDocumentor 1 tags
    "abstract",
    "access",
    "code",
    "deprec",
    "endcode",
    "exception",
    "final",
    "ingroup",
    "inheritdoc",
    "inheritDoc",
    "magic",
    "name",
    "toc",
    "tutorial",
    "private",
    "static",
    "staticvar",
    "staticVar",
    "throw",
    // PHPDocumentor 2 tags
    "api",
    "author",
    "category",
    "copyright",
    "deprecated",
    "example",
    "filesource",
    "global",
    "ignore",
    "internal",
    "license",
    "link",
    "method",
    "package",
    "param",
    "property",
    "property-read",
    "property-write",
    "return",
    "see",
    "since",
    "source",
    "subpackage",
    "throws",
    "todo",
    "TODO",
    "usedby",
    "uses",
    "var",
    "version",
    // PHPUnit tags
    "codeCoverageIgnore",
    "codeCoverageIgnoreStart",
    "codeCoverageIgnoreEnd",
    // PHPCheckStyle
    "SuppressWarnings",
    // PHPStorm
    "noinspection",
    // PEAR
    "package_version",
    // PlantUML
    "startuml",
    "enduml",
    // Symfony 3.3 Cache Adapter
    "experimental",
    // Slevomat Coding Standard
    "phpcsSuppress",
    // Static analysis
    "mixin",
    "template",
    "template-covariant",
    "template-contravariant",
    "extends",
    "implements",
    "psalm",
    "phpstan",
    "readonly",
    "immutable",
    "pure",
    "FIXME",
];

/// One wildcard import: `alias*` maps an optional alias prefix to a
/// namespace in which any class may be looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardImport {
    /// Lower-cased alias used as `@alias:Name`, or `None` for a bare `*`.
    pub alias: Option<String>,
    pub namespace: String,
}

/// The names an annotation may be written with in one declaration scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportTable {
    /// The declaring namespace (empty for the global namespace).
    pub namespace: Option<String>,
    /// Lower-cased alias → fully-qualified name.
    exact: BTreeMap<String, String>,
    wildcards: Vec<WildcardImport>,
}

impl ImportTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(key, target)` pairs (see [`ImportTable::insert`]).
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut table = Self::new();
        for (key, target) in entries {
            table.insert(key.as_ref(), target.as_ref());
        }
        table
    }

    /// Add one import.
    ///
    /// - `__NAMESPACE__` sets the declaring namespace.
    /// - A key ending in `*` is a wildcard: `orm*` → `@orm:Name` resolves in
    ///   the target namespace, a bare `*` applies to unprefixed names.
    /// - Anything else is an exact alias (case-insensitive).
    pub fn insert(&mut self, key: &str, target: &str) {
        let target = target.trim_start_matches('\\').trim_end_matches('\\');
        if key == NAMESPACE_KEY {
            self.namespace = Some(target.to_string());
        } else if let Some(alias) = key.strip_suffix('*') {
            let alias = alias.trim_end_matches(':');
            let wildcard = WildcardImport {
                alias: (!alias.is_empty()).then(|| alias.to_ascii_lowercase()),
                namespace: target.to_string(),
            };
            if !self.wildcards.contains(&wildcard) {
                self.wildcards.push(wildcard);
            }
        } else {
            self.exact
                .insert(key.to_ascii_lowercase(), target.to_string());
        }
    }

    /// Add every import of `other`; `other` wins on conflicts.
    pub fn merge(&mut self, other: &ImportTable) {
        if other.namespace.is_some() {
            self.namespace.clone_from(&other.namespace);
        }
        for (alias, target) in &other.exact {
            self.exact.insert(alias.clone(), target.clone());
        }
        for wildcard in &other.wildcards {
            if !self.wildcards.contains(wildcard) {
                self.wildcards.push(wildcard.clone());
            }
        }
    }

    /// Exact import for `alias` (case-insensitive).
    pub fn get(&self, alias: &str) -> Option<&str> {
        self.exact
            .get(&alias.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn exact(&self) -> impl Iterator<Item = (&str, &str)> {
        self.exact.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn wildcards(&self) -> &[WildcardImport] {
        &self.wildcards
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcards.is_empty() && self.namespace.is_none()
    }
}

/// Case-sensitive set of annotation names to skip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoredNames {
    names: BTreeSet<String>,
}

impl IgnoredNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// The [`DEFAULT_IGNORED_NAMES`] set.
    pub fn defaults() -> Self {
        DEFAULT_IGNORED_NAMES.iter().copied().collect()
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for IgnoredNames {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut names = Self::new();
        names.extend(iter);
        names
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_classifies_keys() {
        let table = ImportTable::from_entries([
            ("__NAMESPACE__", "App\\Entity"),
            ("ORM", "\\Doctrine\\ORM\\Mapping"),
            ("orm*", "Doctrine\\ORM\\Mapping\\"),
            ("*", "App\\Annotation"),
        ]);

        assert_eq!(table.namespace.as_deref(), Some("App\\Entity"));
        assert_eq!(table.get("orm"), Some("Doctrine\\ORM\\Mapping"));
        assert_eq!(
            table.wildcards(),
            &[
                WildcardImport {
                    alias: Some("orm".to_string()),
                    namespace: "Doctrine\\ORM\\Mapping".to_string(),
                },
                WildcardImport {
                    alias: None,
                    namespace: "App\\Annotation".to_string(),
                },
            ]
        );
    }

    #[test]
    fn ignored_names_are_case_sensitive() {
        let names = IgnoredNames::defaults();
        assert!(names.contains("param"));
        assert!(names.contains("TODO"));
        assert!(!names.contains("Param"));
    }
}
