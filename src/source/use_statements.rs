//! `use` statement extraction and the class import scanner.
//!
//! The scanner answers one question for the annotation reader: which short
//! names are imported in the scope where a given class is declared?  It
//! re-parses the class's own source file and collects the `use` clauses of
//! the namespace block that contains the declaration, up to the
//! declaration itself.
use std::collections::BTreeMap;

use mago_syntax::ast::*;
use tracing::{trace, warn};

use crate::types::{DeclaringClass, short_name};

use super::parse_program;

/// Extract individual class imports from a `UseItems` node into `imports`
/// as `(lower-cased alias, fully-qualified name)` pairs, in source order.
///
/// Handles:
///   - Simple use: `use Foo\Bar;`
///   - Aliased use: `use Foo\Bar as Baz;`
///   - Grouped use: `use Foo\{Bar, Baz};`
///   - Mixed grouped use: `use Foo\{Bar, function baz, const QUX};`
///     (function / const imports are skipped, only classes are tracked)
pub(crate) fn extract_use_items(items: &UseItems, imports: &mut Vec<(String, String)>) {
    match items {
        UseItems::Sequence(seq) => {
            for item in seq.items.iter() {
                register_use_item(item, None, imports);
            }
        }
        UseItems::TypedSequence(seq) => {
            if seq.r#type.is_function() || seq.r#type.is_const() {
                return;
            }
            for item in seq.items.iter() {
                register_use_item(item, None, imports);
            }
        }
        UseItems::TypedList(list) => {
            if list.r#type.is_function() || list.r#type.is_const() {
                return;
            }
            let prefix = list.namespace.value();
            for item in list.items.iter() {
                register_use_item(item, Some(prefix), imports);
            }
        }
        UseItems::MixedList(list) => {
            let prefix = list.namespace.value();
            for maybe_typed in list.items.iter() {
                if let Some(ref t) = maybe_typed.r#type
                    && (t.is_function() || t.is_const())
                {
                    continue;
                }
                register_use_item(&maybe_typed.item, Some(prefix), imports);
            }
        }
    }
}

/// Register a single `UseItem`.
///
/// For grouped imports the item name is relative to `group_prefix`
/// (`use Foo\{Bar}` gives `Foo\Bar`).
fn register_use_item(
    item: &UseItem,
    group_prefix: Option<&str>,
    imports: &mut Vec<(String, String)>,
) {
    let item_name = item.name.value().trim_start_matches('\\');
    let fqn = match group_prefix {
        Some(prefix) => format!("{}\\{}", prefix.trim_start_matches('\\'), item_name),
        None => item_name.to_string(),
    };

    let alias = match item.alias {
        Some(ref alias) => alias.identifier.value.to_string(),
        None => short_name(&fqn).to_string(),
    };

    imports.push((alias.to_ascii_lowercase(), fqn));
}

/// Rewrite imports whose target starts with an alias imported earlier in
/// the same scope, so every value is a final fully-qualified name.
fn resolve_alias_chains(imports: &mut [(String, String)]) {
    for i in 0..imports.len() {
        let target = imports[i].1.clone();
        let (head, rest) = match target.split_once('\\') {
            Some((head, rest)) => (head, Some(rest)),
            None => (target.as_str(), None),
        };
        let head_lower = head.to_ascii_lowercase();

        let expanded = imports[..i]
            .iter()
            .rev()
            .find(|(alias, fqn)| *alias == head_lower && !fqn.eq_ignore_ascii_case(head))
            .map(|(_, fqn)| match rest {
                Some(rest) => format!("{}\\{}", fqn, rest),
                None => fqn.clone(),
            });

        if let Some(expanded) = expanded {
            trace!("import '{}' canonicalized to '{}'", target, expanded);
            imports[i].1 = expanded;
        }
    }
}

/// Scanner state while walking towards the target declaration.
struct ImportScan<'n> {
    namespace: &'n str,
    short_name: &'n str,
    imports: Vec<(String, String)>,
    found: bool,
}

impl ImportScan<'_> {
    fn walk<'a>(&mut self, statements: impl Iterator<Item = &'a Statement<'a>>, current: &str) {
        for statement in statements {
            if self.found {
                return;
            }
            match statement {
                Statement::Use(use_stmt) => {
                    if current.eq_ignore_ascii_case(self.namespace) {
                        extract_use_items(&use_stmt.items, &mut self.imports);
                    }
                }
                Statement::Namespace(namespace) => {
                    let name = namespace
                        .name
                        .as_ref()
                        .map(|ident| ident.value().trim_start_matches('\\').to_string())
                        .unwrap_or_default();
                    if name.eq_ignore_ascii_case(self.namespace) {
                        // A later block with the same name shadows the
                        // imports of any earlier one.
                        self.imports.clear();
                    }
                    self.walk(namespace.statements().iter(), &name);
                }
                Statement::Class(class) => self.check_declaration(class.name.value, current),
                Statement::Interface(iface) => self.check_declaration(iface.name.value, current),
                Statement::Trait(trait_def) => {
                    self.check_declaration(trait_def.name.value, current)
                }
                Statement::Enum(enum_def) => self.check_declaration(enum_def.name.value, current),
                _ => {}
            }
        }
    }

    fn check_declaration(&mut self, name: &str, current: &str) {
        if name.eq_ignore_ascii_case(self.short_name)
            && current.eq_ignore_ascii_case(self.namespace)
        {
            self.found = true;
        }
    }
}

/// Collect the imports in scope at the declaration of `class_name` inside
/// `content`.
///
/// Returns a map from lower-cased alias to fully-qualified name.  When the
/// declaration is never reached, the imports of the last matching namespace
/// block are returned.
pub fn imports_for_class(content: &str, class_name: &str) -> BTreeMap<String, String> {
    let class_name = class_name.trim_start_matches('\\');
    let namespace = crate::types::namespace_of(class_name).to_string();
    let short = short_name(class_name).to_string();

    let scanned = parse_program(content, |program, _| {
        let mut scan = ImportScan {
            namespace: &namespace,
            short_name: &short,
            imports: Vec::new(),
            found: false,
        };
        scan.walk(program.statements.iter(), "");
        scan.imports
    });

    let mut imports = match scanned {
        Some(imports) => imports,
        None => {
            warn!("parser panicked while scanning imports of {}", class_name);
            Vec::new()
        }
    };

    resolve_alias_chains(&mut imports);
    imports.into_iter().collect()
}

/// Read the declaring class's source file and collect its imports.
///
/// A class without a backing file (defined at run time) has no imports.
pub fn scan_class_imports(class: &DeclaringClass) -> std::io::Result<BTreeMap<String, String>> {
    let Some(path) = class.file.as_deref() else {
        return Ok(BTreeMap::new());
    };
    let content = std::fs::read_to_string(path)?;
    let imports = imports_for_class(&content, &class.name);
    trace!(
        "scanned {} imports for {} in {}",
        imports.len(),
        class.name,
        path.display()
    );
    Ok(imports)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
