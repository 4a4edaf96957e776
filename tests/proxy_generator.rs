//! Tests for rendering proxy classes from indexed PHP classes.

mod common;

use std::fs;
use std::sync::Arc;

use common::create_php_workspace;
use phpantom_meta::config::Config;
use phpantom_meta::error::ProxyError;
use phpantom_meta::proxy::{
    AutoGenerate, ProxyFileStatus, ProxyGenerator, SimpleClassMetadata, ensure_proxy_file,
    lazy_loaded_properties,
};
use phpantom_meta::source::SourceIndex;

const USER_PHP: &str = r#"<?php
namespace App\Entity;

class User
{
    private $id;
    public $name;
    public $email = 'none@example.com';
    public static $count = 0;

    public function getId()
    {
        return $this->id;
    }

    public function rename(string $name, ?Group $group = null, &$out = null, int ...$rest): void
    {
    }

    public function &nameRef(): string
    {
        return $this->name;
    }

    public function current(): self
    {
        return $this;
    }

    final public function locked() {}

    public static function create() {}

    private function hidden() {}
}

class Group {}
"#;

fn generator(index: &Arc<SourceIndex>) -> ProxyGenerator {
    ProxyGenerator::new("/tmp/phpantom-meta-proxies", "Proxies")
        .unwrap()
        .with_class_lookup(index.clone())
}

fn user_metadata(index: &SourceIndex) -> SimpleClassMetadata {
    let user = index.reflect("App\\Entity\\User").expect("User indexed");
    SimpleClassMetadata::from_reflection(user, &["id".to_string()])
}

fn indexed(files: &[(&str, &str)]) -> Arc<SourceIndex> {
    let mut index = SourceIndex::new();
    for (_, content) in files {
        index.add_source(None, content);
    }
    Arc::new(index)
}

// ─── Class shell ────────────────────────────────────────────────────

#[test]
fn proxy_extends_the_class_in_the_marker_namespace() {
    let index = indexed(&[("User.php", USER_PHP)]);
    let code = generator(&index).generate_proxy_code(&user_metadata(&index)).unwrap();

    assert!(code.starts_with("<?php"));
    assert!(code.contains("namespace Proxies\\__CG__\\App\\Entity;"));
    assert!(code.contains(
        "class User extends \\App\\Entity\\User implements \\Doctrine\\Common\\Proxy\\Proxy"
    ));
    assert!(!code.contains("<methods>"), "every placeholder is replaced");
}

#[test]
fn lazy_properties_exclude_identifier_and_statics() {
    let index = indexed(&[("User.php", USER_PHP)]);
    let metadata = user_metadata(&index);

    let lazy: Vec<&str> = lazy_loaded_properties(&metadata)
        .into_iter()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(lazy, ["name", "email"]);

    let code = generator(&index).generate_proxy_code(&metadata).unwrap();
    assert!(code.contains("['name' => null, 'email' => null]"));
    assert!(code.contains("['name' => null, 'email' => 'none@example.com']"));
    assert!(code.contains("unset($this->name, $this->email);"));
}

// ─── Forwarded methods ──────────────────────────────────────────────

#[test]
fn forwarded_signature_keeps_types_defaults_and_modifiers() {
    let index = indexed(&[("User.php", USER_PHP)]);
    let code = generator(&index).generate_proxy_code(&user_metadata(&index)).unwrap();

    assert!(code.contains(
        "public function rename(string $name, ?\\App\\Entity\\Group $group = null, &$out = null, int ...$rest): void"
    ));
    assert!(code.contains(
        "$this->__initializer__ && $this->__initializer__->__invoke($this, 'rename', [$name, $group, $out, $rest]);"
    ));
    assert!(code.contains("        parent::rename($name, $group, $out, ...$rest);"));
    assert!(!code.contains("return parent::rename"));

    assert!(code.contains("public function &nameRef(): string"));
    assert!(code.contains("public function current(): \\App\\Entity\\User"));
}

#[test]
fn skipped_methods_are_not_forwarded() {
    let index = indexed(&[("User.php", USER_PHP)]);
    let code = generator(&index).generate_proxy_code(&user_metadata(&index)).unwrap();

    assert!(!code.contains("function locked"));
    assert!(!code.contains("function create"));
    assert!(!code.contains("function hidden"));
}

#[test]
fn identifier_getter_short_circuits_with_cast() {
    let index = indexed(&[("User.php", USER_PHP)]);
    let code = generator(&index).generate_proxy_code(&user_metadata(&index)).unwrap();

    let getter = code.find("public function getId()").expect("getter forwarded");
    let body = &code[getter..];
    assert!(body.contains(
        "if ($this->__isInitialized__ === false) {\n            return (int) parent::getId();\n        }"
    ));
}

// ─── Magic methods ──────────────────────────────────────────────────

#[test]
fn parent_magic_get_is_called_after_lazy_check() {
    let source = r#"<?php
namespace App;

class Bag
{
    public $items;

    public function __get($key)
    {
        return null;
    }
}
"#;
    let index = indexed(&[("Bag.php", source)]);
    let bag = index.reflect("App\\Bag").unwrap();
    let metadata = SimpleClassMetadata::from_reflection(bag, &[]);
    let code = generator(&index).generate_proxy_code(&metadata).unwrap();

    assert!(code.contains("public function __get($name)"));
    assert!(code.contains("if (\\array_key_exists($name, self::$lazyPropertiesNames)) {"));
    assert!(code.contains("return parent::__get($name);"));
    assert!(!code.contains("trigger_error"));
}

#[test]
fn sleep_lists_private_properties_with_declaring_class() {
    let index = indexed(&[("User.php", USER_PHP)]);
    let code = generator(&index).generate_proxy_code(&user_metadata(&index)).unwrap();

    assert!(code.contains(
        "return ['__isInitialized__', \"\\0App\\\\Entity\\\\User\\0id\", 'name', 'email'];"
    ));
    assert!(code.contains("return ['__isInitialized__', \"\\0App\\\\Entity\\\\User\\0id\"];"));
}

// ─── Errors ─────────────────────────────────────────────────────────

#[test]
fn unproxyable_classes_are_rejected() {
    let source = r#"<?php
namespace App;

final class Sealed {}
abstract class Shape {}
readonly class Point {}
interface Named {}

class Money
{
    private $id;

    public function __construct(public readonly int $amount, private readonly string $currency) {}
}

class Ledger
{
    public readonly int $id;
    private readonly array $lines;
}
"#;
    let index = indexed(&[("Kinds.php", source)]);
    let generator = generator(&index);
    let generate = |name: &str| {
        let class = index.reflect(name).unwrap();
        generator.generate_proxy_code(&SimpleClassMetadata::new(class))
    };

    assert!(matches!(generate("App\\Sealed"), Err(ProxyError::FinalClass(_))));
    assert!(matches!(generate("App\\Shape"), Err(ProxyError::AbstractClass(_))));
    assert!(matches!(generate("App\\Point"), Err(ProxyError::ReadonlyClass(_))));
    assert!(matches!(generate("App\\Named"), Err(ProxyError::NotAClass(_))));

    let mapped = |name: &str| {
        let class = index.reflect(name).unwrap();
        let metadata = SimpleClassMetadata::from_reflection(class, &["id".to_string()]);
        generator.generate_proxy_code(&metadata)
    };
    assert!(matches!(
        mapped("App\\Money"),
        Err(ProxyError::ReadonlyProperty { property, .. }) if property == "amount"
    ));
    // Readonly properties outside the lazy set do not block the proxy.
    assert!(mapped("App\\Ledger").is_ok());
}

#[test]
fn unknown_type_hint_class_is_rejected() {
    let source = r#"<?php
namespace App;

class Order
{
    public function ship(Missing $carrier): Unknown {}
}
"#;
    let index = indexed(&[("Order.php", source)]);
    let order = index.reflect("App\\Order").unwrap();
    let err = generator(&index)
        .generate_proxy_code(&SimpleClassMetadata::new(order))
        .unwrap_err();

    assert!(matches!(
        &err,
        ProxyError::InvalidParameterTypeHint { method, parameter, .. }
            if method == "ship" && parameter == "carrier"
    ));
}

// ─── Files ──────────────────────────────────────────────────────────

#[test]
fn proxy_file_is_written_to_the_proxy_directory() {
    let (index, dir) = create_php_workspace(&[("User.php", USER_PHP)]);
    let index = Arc::new(index);
    let proxy_dir = dir.path().join("proxies");
    let generator = ProxyGenerator::new(&proxy_dir, "Proxies")
        .unwrap()
        .with_class_lookup(index.clone());

    let file = generator.proxy_file_name("App\\Entity\\User");
    assert_eq!(file, proxy_dir.join("__CG__AppEntityUser.php"));

    let code = generator
        .generate_proxy_class(&user_metadata(&index), Some(&file))
        .unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), code);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o664);
    }
}

#[test]
fn configured_auto_generate_mode_decides_file_writes() {
    let (index, dir) = create_php_workspace(&[("User.php", USER_PHP)]);
    let index = Arc::new(index);
    fs::write(
        dir.path().join(".phpantom-meta.toml"),
        "[proxy]\ndirectory = \"proxies\"\nauto-generate = \"never\"\n",
    )
    .unwrap();
    let config = Config::discover(dir.path()).unwrap();
    let generator = ProxyGenerator::new(dir.path().join(&config.proxy.directory), "Proxies")
        .unwrap()
        .with_class_lookup(index.clone());
    let metadata = user_metadata(&index);
    let file = generator.proxy_file_name("App\\Entity\\User");

    let err = ensure_proxy_file(&generator, config.proxy.auto_generate, &metadata).unwrap_err();
    assert!(matches!(err, ProxyError::ProxyFileMissing(path) if path == file));

    assert_eq!(
        ensure_proxy_file(&generator, AutoGenerate::Eval, &metadata).unwrap(),
        ProxyFileStatus::InMemory
    );
    assert!(!file.exists());

    assert_eq!(
        ensure_proxy_file(&generator, AutoGenerate::FileNotExists, &metadata).unwrap(),
        ProxyFileStatus::Written
    );
    fs::write(&file, "<?php // stale").unwrap();
    assert_eq!(
        ensure_proxy_file(&generator, config.proxy.auto_generate, &metadata).unwrap(),
        ProxyFileStatus::Kept
    );
    assert_eq!(
        ensure_proxy_file(&generator, AutoGenerate::FileNotExists, &metadata).unwrap(),
        ProxyFileStatus::Kept
    );
    assert_eq!(fs::read_to_string(&file).unwrap(), "<?php // stale");

    assert_eq!(
        ensure_proxy_file(&generator, AutoGenerate::Always, &metadata).unwrap(),
        ProxyFileStatus::Written
    );
    assert!(fs::read_to_string(&file).unwrap().contains("class User extends"));
}
