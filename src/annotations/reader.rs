//! Annotation reader.
//!
//! Looks up the annotations of a class, method or property.  For every
//! declaring class the reader builds (once) a parser configured with the
//! imports in scope at the declaration and the names the class asked to
//! ignore.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::ReaderConfig;
use crate::error::AnnotationError;
use crate::source::scan_class_imports;
use crate::types::{DeclaringClass, ReflectionClass, ReflectionMethod, ReflectionProperty};

use super::imports::{IgnoredNames, ImportTable, NAMESPACE_KEY};
use super::parser::{AnnotationCreator, DocParser};
use super::registry::{AnnotationRegistry, IGNORE_ANNOTATION};
use super::value::Annotation;

/// Annotation lookups for reflected declarations.
pub trait Reader: Send + Sync {
    /// The registry annotation classes are resolved against.
    fn registry(&self) -> &AnnotationRegistry;

    fn class_annotations(&self, class: &ReflectionClass) -> Result<Vec<Annotation>, AnnotationError>;

    fn method_annotations(
        &self,
        method: &ReflectionMethod,
    ) -> Result<Vec<Annotation>, AnnotationError>;

    fn property_annotations(
        &self,
        property: &ReflectionProperty,
    ) -> Result<Vec<Annotation>, AnnotationError>;

    /// The first class annotation that is `name` or a subtype of it.
    fn class_annotation(
        &self,
        class: &ReflectionClass,
        name: &str,
    ) -> Result<Option<Annotation>, AnnotationError> {
        let annotations = self.class_annotations(class)?;
        Ok(first_of(self.registry(), annotations, name))
    }

    fn method_annotation(
        &self,
        method: &ReflectionMethod,
        name: &str,
    ) -> Result<Option<Annotation>, AnnotationError> {
        let annotations = self.method_annotations(method)?;
        Ok(first_of(self.registry(), annotations, name))
    }

    fn property_annotation(
        &self,
        property: &ReflectionProperty,
        name: &str,
    ) -> Result<Option<Annotation>, AnnotationError> {
        let annotations = self.property_annotations(property)?;
        Ok(first_of(self.registry(), annotations, name))
    }
}

fn first_of(
    registry: &AnnotationRegistry,
    annotations: Vec<Annotation>,
    name: &str,
) -> Option<Annotation> {
    annotations
        .into_iter()
        .find(|a| registry.is_a(&a.class, name))
}

/// Keep one annotation per class: the position of its first occurrence
/// with the value of its last.
pub fn index_by_class(annotations: Vec<Annotation>) -> Vec<Annotation> {
    let mut indexed: Vec<Annotation> = Vec::with_capacity(annotations.len());
    for annotation in annotations {
        match indexed.iter_mut().find(|a| a.class == annotation.class) {
            Some(existing) => *existing = annotation,
            None => indexed.push(annotation),
        }
    }
    indexed
}

/// The doc-comment annotation reader.
pub struct AnnotationReader {
    registry: Arc<AnnotationRegistry>,
    config: ReaderConfig,
    creator: Option<AnnotationCreator>,
    /// Lenient parser used to find `@IgnoreAnnotation` directives.
    pre_parser: DocParser,
    /// Parsers per declaring class, keyed by class name.
    parsers: Mutex<HashMap<String, DocParser>>,
}

impl AnnotationReader {
    pub fn new(registry: Arc<AnnotationRegistry>, config: ReaderConfig) -> Self {
        let pre_parser = DocParser::new(registry.clone())
            .with_imports(ImportTable::from_entries([("ignoreannotation", IGNORE_ANNOTATION)]))
            .with_ignored_names(config.ignored_names.clone())
            .with_ignore_not_imported(true);

        Self {
            registry,
            config,
            creator: None,
            pre_parser,
            parsers: Mutex::new(HashMap::new()),
        }
    }

    /// Override annotation construction for every parser this reader builds.
    pub fn with_creator(mut self, creator: AnnotationCreator) -> Self {
        self.creator = Some(creator);
        self
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// The import table used for declarations of `class`.
    pub fn class_imports(&self, class: &DeclaringClass) -> Result<ImportTable, AnnotationError> {
        Ok(self.parser_for(class)?.imports().clone())
    }

    /// The parser for declarations of `class`, built on first use.
    fn parser_for(&self, class: &DeclaringClass) -> Result<DocParser, AnnotationError> {
        if let Some(parser) = self.parsers.lock().get(&class.name) {
            return Ok(parser.clone());
        }

        let mut imports = self.config.imports.clone();
        for (alias, target) in scan_class_imports(class)? {
            imports.insert(&alias, &target);
        }
        imports.insert(NAMESPACE_KEY, class.namespace());

        let mut ignored = self.config.ignored_names.clone();
        ignored.extend(self.ignored_names_of(class)?.iter().map(str::to_string));

        trace!(
            "built parser for {} ({} exact imports)",
            class.name,
            imports.exact().count()
        );

        let mut parser = DocParser::new(self.registry.clone())
            .with_imports(imports)
            .with_ignored_names(ignored)
            .with_ignore_not_imported(self.config.ignore_not_imported);
        if let Some(creator) = &self.creator {
            parser = parser.with_creator(creator.clone());
        }

        self.parsers
            .lock()
            .entry(class.name.clone())
            .or_insert(parser.clone());
        Ok(parser)
    }

    /// Names listed in `@IgnoreAnnotation` on the class doc comment.
    fn ignored_names_of(&self, class: &DeclaringClass) -> Result<IgnoredNames, AnnotationError> {
        let mut names = IgnoredNames::new();
        let Some(doc) = class.doc_comment.as_deref() else {
            return Ok(names);
        };

        let context = format!("class {}", class.name);
        for annotation in self.pre_parser.parse(doc, &context)? {
            if !annotation.class.eq_ignore_ascii_case(IGNORE_ANNOTATION) {
                continue;
            }
            if let Some(list) = annotation.get("names") {
                names.extend(list.values().filter_map(|v| v.as_str()).map(str::to_string));
            }
        }
        if !names.is_empty() {
            debug!("{} ignores {} annotation names", class.name, names.len());
        }
        Ok(names)
    }

    fn read(
        &self,
        declaring: &DeclaringClass,
        doc_comment: Option<&str>,
        context: String,
    ) -> Result<Vec<Annotation>, AnnotationError> {
        let Some(doc) = doc_comment else {
            return Ok(Vec::new());
        };
        let parser = self.parser_for(declaring)?;
        let annotations = parser.parse(doc, &context)?;
        Ok(if self.config.indexed {
            index_by_class(annotations)
        } else {
            annotations
        })
    }
}

impl Reader for AnnotationReader {
    fn registry(&self) -> &AnnotationRegistry {
        &self.registry
    }

    fn class_annotations(&self, class: &ReflectionClass) -> Result<Vec<Annotation>, AnnotationError> {
        self.read(
            &class.declaring,
            class.doc_comment(),
            format!("class {}", class.name()),
        )
    }

    fn method_annotations(
        &self,
        method: &ReflectionMethod,
    ) -> Result<Vec<Annotation>, AnnotationError> {
        let declaring = &method.declaring_class;
        self.read(
            declaring,
            method.doc_comment.as_deref(),
            format!("method {}::{}()", declaring.name, method.name),
        )
    }

    fn property_annotations(
        &self,
        property: &ReflectionProperty,
    ) -> Result<Vec<Annotation>, AnnotationError> {
        let declaring = &property.declaring_class;
        self.read(
            declaring,
            property.doc_comment.as_deref(),
            format!("property {}::${}", declaring.name, property.name),
        )
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::value::Value;

    #[test]
    fn index_by_class_keeps_first_position_and_last_value() {
        let annotations = vec![
            Annotation::new("A").with_field("n", Value::Integer(1)),
            Annotation::new("B"),
            Annotation::new("A").with_field("n", Value::Integer(2)),
        ];
        let indexed = index_by_class(annotations);
        assert_eq!(indexed.len(), 2);
        assert_eq!(indexed[0].class, "A");
        assert_eq!(indexed[0].get("n"), Some(&Value::Integer(2)));
        assert_eq!(indexed[1].class, "B");
    }
}
