//! Tests for the caching reader and its caches.

mod common;

use std::fs;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::{create_php_workspace, dummy_registry};
use phpantom_meta::annotations::{
    Annotation, AnnotationReader, ArrayCache, Cache, CacheEntry, CachedReader, FileCache, Reader,
    Value,
};
use phpantom_meta::config::ReaderConfig;
use phpantom_meta::error::CacheError;
use phpantom_meta::source::SourceIndex;

fn entity_php(value: &str) -> String {
    format!(
        r#"<?php
namespace Tests\Fixtures;

/** @DummyAnnotation(dummyValue="{value}") */
class Cached
{{
    /** @DummyId */
    public $id;

    /** @DummyColumn("string") */
    public function getName() {{}}
}}
"#
    )
}

fn reader() -> AnnotationReader {
    AnnotationReader::new(Arc::new(dummy_registry()), ReaderConfig::default())
}

fn dummy_value(annotations: &[Annotation]) -> Option<&str> {
    annotations
        .first()
        .and_then(|a| a.get("dummyValue"))
        .and_then(Value::as_str)
}

// ─── Array cache ────────────────────────────────────────────────────

#[test]
fn array_cache_stores_every_lookup_kind() {
    let (index, _dir) = create_php_workspace(&[("Cached.php", &entity_php("one"))]);
    let class = index.reflect("Tests\\Fixtures\\Cached").unwrap();
    let cached = CachedReader::new(reader(), ArrayCache::new(), false);

    let direct = reader().class_annotations(&class).unwrap();
    assert_eq!(cached.class_annotations(&class).unwrap(), direct);
    cached.property_annotations(class.property("id").unwrap()).unwrap();
    cached.method_annotations(class.method("getName").unwrap()).unwrap();
    assert_eq!(cached.cache().len(), 3);

    let stored = cached.cache().fetch("Tests\\Fixtures\\Cached#getName").unwrap().unwrap();
    assert_eq!(stored.annotations[0].get("type"), Some(&Value::from("string")));
    assert!(cached.cache().fetch("Tests\\Fixtures\\Cached$id").unwrap().is_some());
}

#[test]
fn cached_entry_wins_over_delegate() {
    let class = index_with("one").reflect("Tests\\Fixtures\\Cached").unwrap();
    let cache = ArrayCache::new();
    cache
        .save(
            "Tests\\Fixtures\\Cached",
            &CacheEntry::new(vec![Annotation::new("Tests\\Fixtures\\DummyId")]),
        )
        .unwrap();

    let cached = CachedReader::new(reader(), cache, false);
    let annotations = cached.class_annotations(&class).unwrap();
    assert_eq!(annotations[0].short_name(), "DummyId");
}

fn index_with(value: &str) -> SourceIndex {
    let mut index = SourceIndex::new();
    index.add_source(None, &entity_php(value));
    index
}

// ─── File cache ─────────────────────────────────────────────────────

#[test]
fn file_cache_persists_across_readers() {
    let cache_dir = tempfile::tempdir().expect("failed to create temp dir");
    let class = index_with("persisted").reflect("Tests\\Fixtures\\Cached").unwrap();

    let first = CachedReader::new(reader(), FileCache::new(cache_dir.path()).unwrap(), false);
    first.class_annotations(&class).unwrap();
    let path = first.cache().path_for("Tests\\Fixtures\\Cached");
    assert!(path.is_file());

    // A class with different source but the same name still hits the cache.
    let changed = index_with("changed").reflect("Tests\\Fixtures\\Cached").unwrap();
    let second = CachedReader::new(reader(), FileCache::new(cache_dir.path()).unwrap(), false);
    assert_eq!(
        dummy_value(&second.class_annotations(&changed).unwrap()),
        Some("persisted")
    );
}

#[test]
fn debug_mode_regenerates_entries_older_than_the_source() {
    let (index, dir) = create_php_workspace(&[("Cached.php", &entity_php("before"))]);
    let cache_dir = tempfile::tempdir().expect("failed to create temp dir");
    let class = index.reflect("Tests\\Fixtures\\Cached").unwrap();

    let warm = CachedReader::new(reader(), FileCache::new(cache_dir.path()).unwrap(), true);
    assert_eq!(dummy_value(&warm.class_annotations(&class).unwrap()), Some("before"));

    let source = dir.path().join("Cached.php");
    fs::write(&source, entity_php("after")).unwrap();
    fs::File::options()
        .write(true)
        .open(&source)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
    let mut reindexed = SourceIndex::new();
    reindexed.add_file(&source).unwrap();
    let class = reindexed.reflect("Tests\\Fixtures\\Cached").unwrap();

    let production = CachedReader::new(reader(), FileCache::new(cache_dir.path()).unwrap(), false);
    assert_eq!(
        dummy_value(&production.class_annotations(&class).unwrap()),
        Some("before")
    );

    let debug = CachedReader::new(reader(), FileCache::new(cache_dir.path()).unwrap(), true);
    assert_eq!(dummy_value(&debug.class_annotations(&class).unwrap()), Some("after"));
}

#[test]
fn loaded_copies_survive_until_cleared() {
    let cache_dir = tempfile::tempdir().expect("failed to create temp dir");
    let class = index_with("kept").reflect("Tests\\Fixtures\\Cached").unwrap();
    let cached = CachedReader::new(reader(), FileCache::new(cache_dir.path()).unwrap(), false);

    cached.class_annotations(&class).unwrap();
    fs::remove_file(cached.cache().path_for("Tests\\Fixtures\\Cached")).unwrap();
    assert_eq!(dummy_value(&cached.class_annotations(&class).unwrap()), Some("kept"));

    cached.clear_loaded();
    cached.class_annotations(&class).unwrap();
    assert!(cached.cache().path_for("Tests\\Fixtures\\Cached").is_file());
}

#[test]
fn overflowing_numbers_stay_cached() {
    let cache_dir = tempfile::tempdir().expect("failed to create temp dir");
    let source = r#"<?php
namespace Tests\Fixtures;

/** @DummyAnnotation(dummyValue={99999999999999999999999, 1e999, -1e999}) */
class Huge {}
"#;
    let mut index = SourceIndex::new();
    index.add_source(None, source);
    let class = index.reflect("Tests\\Fixtures\\Huge").unwrap();

    let cached = CachedReader::new(reader(), FileCache::new(cache_dir.path()).unwrap(), false);
    let parsed = cached.class_annotations(&class).unwrap();
    let values: Vec<_> = parsed[0]
        .get("dummyValue")
        .unwrap()
        .values()
        .filter_map(Value::as_f64)
        .collect();
    assert_eq!(values[1], f64::INFINITY);
    assert_eq!(values[2], f64::NEG_INFINITY);

    let stored = cached.cache().fetch("Tests\\Fixtures\\Huge").unwrap();
    assert_eq!(stored.map(|entry| entry.annotations), Some(parsed));
}

#[test]
fn corrupt_file_is_a_miss() {
    let cache_dir = tempfile::tempdir().expect("failed to create temp dir");
    let cache = FileCache::new(cache_dir.path()).unwrap();
    fs::write(cache.path_for("Broken"), "{ not json").unwrap();

    assert_eq!(cache.fetch("Broken").unwrap(), None);
    assert_eq!(cache.fetch("Absent").unwrap(), None);
}

#[test]
fn unusable_directory_is_rejected() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let file = dir.path().join("not-a-dir");
    fs::write(&file, "").unwrap();

    let err = FileCache::new(file.join("cache")).unwrap_err();
    assert!(matches!(err, CacheError::DirectoryMissing(_)), "{err}");
    assert!(err.to_string().contains("does not exist and could not be created"));
}
