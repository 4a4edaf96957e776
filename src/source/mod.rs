//! PHP source index.
//!
//! Parses PHP files with `mago-syntax` and keeps owned [`ReflectionClass`]
//! values for every class-like declaration.  This is the reflection layer
//! the annotation reader and the proxy generator work from.
//!
//! Sub-modules:
//! - [`classes`]: class-like declaration and member extraction
//! - [`docblock`]: doc comment lookup in the trivia list
//! - [`use_statements`]: `use` extraction and the class import scanner

mod classes;
mod docblock;
pub mod use_statements;

use std::collections::HashMap;
use std::path::Path;

use mago_syntax::ast::Program;
use tracing::{debug, error, warn};

use crate::types::{ClassLikeKind, ClassLookup, ReflectionClass, Visibility};

use classes::{NameScope, SourceCtx, extract_classes_from_statements};

pub use use_statements::{imports_for_class, scan_class_imports};

/// Maximum depth of `extends` chains followed by [`SourceIndex::reflect`].
const MAX_INHERITANCE_DEPTH: u32 = 20;

/// Classes and interfaces the PHP runtime always provides.
const BUILTIN_CLASSES: &[&str] = &[
    "ArrayAccess",
    "ArrayIterator",
    "ArrayObject",
    "BackedEnum",
    "Closure",
    "Countable",
    "DateInterval",
    "DatePeriod",
    "DateTime",
    "DateTimeImmutable",
    "DateTimeInterface",
    "DateTimeZone",
    "Error",
    "ErrorException",
    "Exception",
    "Generator",
    "InvalidArgumentException",
    "Iterator",
    "IteratorAggregate",
    "JsonSerializable",
    "LogicException",
    "RuntimeException",
    "Serializable",
    "SplObjectStorage",
    "Stringable",
    "Throwable",
    "Traversable",
    "TypeError",
    "UnitEnum",
    "WeakMap",
    "stdClass",
];

/// Parse `content` and hand the program to `extract`.
///
/// The parser runs inside `catch_unwind`; a panic yields `None`.
pub(crate) fn parse_program<T>(
    content: &str,
    extract: impl FnOnce(&Program<'_>, &str) -> T,
) -> Option<T> {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let arena = bumpalo::Bump::new();
        let file_id = mago_database::file::FileId::new("input.php");
        let program = mago_syntax::parser::parse_file_content(&arena, file_id, content);
        extract(&program, content)
    }));
    result.ok()
}

/// Parse PHP source text and extract every class-like declaration.
///
/// `file` is recorded as the declaring file of each class (the import
/// scanner re-reads it later).
pub fn parse_classes(file: Option<&Path>, content: &str) -> Vec<ReflectionClass> {
    let parsed = parse_program(content, |program, content| {
        let ctx = SourceCtx {
            trivia: program.trivia.as_slice(),
            content,
            file,
        };
        let mut scope = NameScope::default();
        let mut classes = Vec::new();
        extract_classes_from_statements(program.statements.iter(), &mut scope, &ctx, &mut classes);
        classes
    });

    match parsed {
        Some(classes) => classes,
        None => {
            error!(
                "parser panicked in parse_classes ({})",
                file.map(|f| f.display().to_string())
                    .unwrap_or_else(|| "<memory>".to_string())
            );
            Vec::new()
        }
    }
}

/// An index of class-like declarations keyed by lower-cased FQ name.
#[derive(Debug, Default, Clone)]
pub struct SourceIndex {
    classes: HashMap<String, ReflectionClass>,
}

impl SourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `content` and index its classes.  Returns the names of the
    /// classes found.
    pub fn add_source(&mut self, file: Option<&Path>, content: &str) -> Vec<String> {
        let classes = parse_classes(file, content);
        let names = classes.iter().map(|c| c.name().to_string()).collect();
        for class in classes {
            self.insert(class);
        }
        names
    }

    /// Read and index a PHP file.
    pub fn add_file(&mut self, path: &Path) -> std::io::Result<Vec<String>> {
        let content = std::fs::read_to_string(path)?;
        Ok(self.add_source(Some(path), &content))
    }

    /// Index every `*.php` file under `dir`, honouring `.gitignore`.
    /// Unreadable files are logged and skipped.  Returns the number of
    /// classes indexed.
    pub fn add_directory(&mut self, dir: &Path) -> usize {
        let walker = ignore::WalkBuilder::new(dir)
            .hidden(true)
            .git_ignore(true)
            .build();

        let mut count = 0;
        for entry in walker.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "php") {
                continue;
            }
            match self.add_file(path) {
                Ok(names) => count += names.len(),
                Err(e) => warn!("skipping unreadable file {}: {}", path.display(), e),
            }
        }
        debug!("indexed {} classes under {}", count, dir.display());
        count
    }

    /// Index an already-built class, replacing any class of the same name.
    pub fn insert(&mut self, class: ReflectionClass) {
        self.classes.insert(class.name().to_ascii_lowercase(), class);
    }

    /// The class as declared, without inherited members.
    pub fn class(&self, name: &str) -> Option<&ReflectionClass> {
        self.classes
            .get(&name.trim_start_matches('\\').to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.class(name).is_some()
    }

    /// All indexed classes, sorted by name.
    pub fn classes(&self) -> Vec<&ReflectionClass> {
        let mut classes: Vec<_> = self.classes.values().collect();
        classes.sort_by(|a, b| a.name().cmp(b.name()));
        classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Resolve a class together with the members it inherits.
    ///
    /// Precedence: class own > traits > parent chain.  Private members of
    /// parents are never inherited; trait members are copied in whatever
    /// their visibility.  The `extends` chain is followed up to a fixed
    /// depth so circular inheritance cannot loop forever.
    pub fn reflect(&self, name: &str) -> Option<ReflectionClass> {
        let class = self.class(name)?;
        let mut merged = class.clone();

        self.merge_traits_into(&mut merged, &class.traits, 0);

        let mut current = class;
        let mut depth = 0;
        while let Some(parent_name) = current.parent.as_deref() {
            depth += 1;
            if depth > MAX_INHERITANCE_DEPTH {
                break;
            }
            let Some(parent) = self.class(parent_name) else {
                break;
            };

            self.merge_traits_into(&mut merged, &parent.traits, 0);

            for method in &parent.methods {
                if method.visibility == Visibility::Private
                    || merged.has_method(&method.name)
                {
                    continue;
                }
                merged.methods.push(method.clone());
            }
            for property in &parent.properties {
                if property.visibility == Visibility::Private
                    || merged.property(&property.name).is_some()
                {
                    continue;
                }
                merged.properties.push(property.clone());
            }

            current = parent;
        }

        Some(merged)
    }

    fn merge_traits_into(&self, merged: &mut ReflectionClass, traits: &[String], depth: u32) {
        if depth > MAX_INHERITANCE_DEPTH {
            return;
        }
        for trait_name in traits {
            let Some(trait_class) = self.class(trait_name) else {
                continue;
            };
            if trait_class.kind != ClassLikeKind::Trait {
                continue;
            }
            self.merge_traits_into(merged, &trait_class.traits, depth + 1);

            for method in &trait_class.methods {
                if !merged.has_method(&method.name) {
                    merged.methods.push(method.clone());
                }
            }
            for property in &trait_class.properties {
                if merged.property(&property.name).is_none() {
                    merged.properties.push(property.clone());
                }
            }
        }
    }

    /// Whether `class` equals `ancestor` or extends / implements it,
    /// transitively (case-insensitive).
    pub fn is_subclass_of(&self, class: &str, ancestor: &str) -> bool {
        let ancestor = ancestor.trim_start_matches('\\');
        let mut pending = vec![(class.trim_start_matches('\\').to_string(), 0u32)];

        while let Some((name, depth)) = pending.pop() {
            if name.eq_ignore_ascii_case(ancestor) {
                return true;
            }
            if depth > MAX_INHERITANCE_DEPTH {
                continue;
            }
            if let Some(c) = self.class(&name) {
                pending.extend(c.parent.iter().cloned().map(|p| (p, depth + 1)));
                pending.extend(c.interfaces.iter().cloned().map(|i| (i, depth + 1)));
            }
        }
        false
    }
}

impl ClassLookup for SourceIndex {
    fn class_exists(&self, name: &str) -> bool {
        let name = name.trim_start_matches('\\');
        self.contains(name)
            || BUILTIN_CLASSES
                .iter()
                .any(|builtin| builtin.eq_ignore_ascii_case(name))
    }

    fn parent_class(&self, name: &str) -> Option<String> {
        self.class(name.trim_start_matches('\\'))
            .and_then(|class| class.parent.clone())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
