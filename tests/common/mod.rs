#![allow(dead_code)]

use std::fs;
use std::sync::Arc;

use phpantom_meta::annotations::{AnnotationClass, AnnotationRegistry, DocParser, ImportTable};
use phpantom_meta::source::SourceIndex;

pub const DUMMY_NS: &str = "Tests\\Fixtures";

/// Registry with the dummy annotation classes used across the tests.
pub fn dummy_registry() -> AnnotationRegistry {
    let mut registry = AnnotationRegistry::new();
    registry.register(
        AnnotationClass::new("Tests\\Fixtures\\DummyAnnotation")
            .with_fields(["dummyValue", "value"]),
    );
    registry.register(
        AnnotationClass::new("Tests\\Fixtures\\DummyJoinTable")
            .with_fields(["name", "joinColumns", "inverseJoinColumns"]),
    );
    registry.register(
        AnnotationClass::new("Tests\\Fixtures\\DummyJoinColumn")
            .with_fields(["name", "referencedColumnName"]),
    );
    registry.register(AnnotationClass::new("Tests\\Fixtures\\DummyId"));
    registry.register(AnnotationClass::new("Tests\\Fixtures\\DummyColumn").with_fields(["type"]));
    registry
}

/// A parser seeing every dummy annotation through a wildcard import of
/// the fixtures namespace.
pub fn dummy_parser() -> DocParser {
    DocParser::new(Arc::new(dummy_registry()))
        .with_imports(ImportTable::from_entries([("*", DUMMY_NS)]))
}

/// Write PHP files into a temp directory and index them.
pub fn create_php_workspace(files: &[(&str, &str)]) -> (SourceIndex, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    for (rel_path, content) in files {
        let full = dir.path().join(rel_path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("failed to create dirs");
        }
        fs::write(&full, content).expect("failed to write PHP file");
    }

    let mut index = SourceIndex::new();
    index.add_directory(dir.path());
    (index, dir)
}
