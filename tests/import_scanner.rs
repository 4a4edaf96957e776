//! Tests for collecting the `use` imports in scope at a class declaration.

mod common;

use std::collections::BTreeMap;
use std::path::PathBuf;

use phpantom_meta::source::{imports_for_class, scan_class_imports};
use phpantom_meta::types::DeclaringClass;

fn imports(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(alias, fqn)| (alias.to_string(), fqn.to_string()))
        .collect()
}

// ─── Forms ──────────────────────────────────────────────────────────

#[test]
fn simple_aliased_and_grouped_imports() {
    let content = r#"<?php
namespace App\Entity;

use Doctrine\ORM\Mapping as ORM;
use Tests\Fixtures\DummyId;
use Tests\Fixtures\{DummyColumn, DummyJoinTable as JoinTable};
use function strlen;
use const PHP_EOL;

class User {}
"#;
    assert_eq!(
        imports_for_class(content, "App\\Entity\\User"),
        imports(&[
            ("orm", "Doctrine\\ORM\\Mapping"),
            ("dummyid", "Tests\\Fixtures\\DummyId"),
            ("dummycolumn", "Tests\\Fixtures\\DummyColumn"),
            ("jointable", "Tests\\Fixtures\\DummyJoinTable"),
        ])
    );
}

#[test]
fn leading_backslash_is_dropped() {
    let content = "<?php\nuse \\Tests\\Fixtures\\DummyId;\nclass Plain {}\n";
    assert_eq!(
        imports_for_class(content, "\\Plain"),
        imports(&[("dummyid", "Tests\\Fixtures\\DummyId")])
    );
}

// ─── Scoping ────────────────────────────────────────────────────────

#[test]
fn only_the_declaring_namespace_block_counts() {
    let content = r#"<?php
namespace First {
    use Tests\Fixtures\DummyId;
    class Alpha {}
}

namespace Second {
    use Tests\Fixtures\DummyColumn;
    class Beta {}
}
"#;
    assert_eq!(
        imports_for_class(content, "Second\\Beta"),
        imports(&[("dummycolumn", "Tests\\Fixtures\\DummyColumn")])
    );
    assert_eq!(
        imports_for_class(content, "First\\Alpha"),
        imports(&[("dummyid", "Tests\\Fixtures\\DummyId")])
    );
}

#[test]
fn imports_after_the_declaration_are_not_in_scope() {
    let content = r#"<?php
namespace App;

use Tests\Fixtures\DummyId;

class Early {}

use Tests\Fixtures\DummyColumn;

class Late {}
"#;
    assert_eq!(
        imports_for_class(content, "App\\Early"),
        imports(&[("dummyid", "Tests\\Fixtures\\DummyId")])
    );
    assert_eq!(imports_for_class(content, "App\\Late").len(), 2);
}

#[test]
fn reopened_namespace_shadows_earlier_block() {
    let content = r#"<?php
namespace App;
use Tests\Fixtures\DummyId;

namespace Other;
use Tests\Fixtures\DummyJoinTable;

namespace App;
use Tests\Fixtures\DummyColumn;

class Reopened {}
"#;
    assert_eq!(
        imports_for_class(content, "App\\Reopened"),
        imports(&[("dummycolumn", "Tests\\Fixtures\\DummyColumn")])
    );
}

// ─── Files ──────────────────────────────────────────────────────────

#[test]
fn class_without_file_has_no_imports() {
    let class = DeclaringClass {
        name: "Runtime\\Thing".to_string(),
        file: None,
        doc_comment: None,
    };
    assert!(scan_class_imports(&class).unwrap().is_empty());
}

#[test]
fn declaring_file_is_read() {
    let (_index, dir) = common::create_php_workspace(&[(
        "Thing.php",
        "<?php\nnamespace App;\nuse Tests\\Fixtures\\DummyId as Id;\nclass Thing {}\n",
    )]);
    let class = DeclaringClass {
        name: "App\\Thing".to_string(),
        file: Some(dir.path().join("Thing.php")),
        doc_comment: None,
    };
    assert_eq!(
        scan_class_imports(&class).unwrap(),
        imports(&[("id", "Tests\\Fixtures\\DummyId")])
    );
}

#[test]
fn missing_file_is_an_io_error() {
    let class = DeclaringClass {
        name: "App\\Gone".to_string(),
        file: Some(PathBuf::from("/nonexistent/phpantom-meta/Gone.php")),
        doc_comment: None,
    };
    assert!(scan_class_imports(&class).is_err());
}
