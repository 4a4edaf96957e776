//! Class, interface, trait, and enum extraction.
//!
//! Each class-like declaration becomes a [`ReflectionClass`] with its
//! members.  Names appearing in `extends`, `implements`, `use` (traits),
//! type hints and constant defaults are resolved to fully-qualified names
//! against the `use` imports and namespace in effect at the declaration.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use mago_span::HasSpan;
use mago_syntax::ast::*;

use crate::types::*;

use super::docblock::doc_comment_for;
use super::use_statements::extract_use_items;

/// Source context shared by all extraction functions of one file.
pub(crate) struct SourceCtx<'a> {
    pub trivia: &'a [Trivia<'a>],
    pub content: &'a str,
    pub file: Option<&'a Path>,
}

impl SourceCtx<'_> {
    fn doc_comment(&self, node: &impl HasSpan) -> Option<String> {
        doc_comment_for(self.trivia, self.content, node).map(str::to_string)
    }

    fn text(&self, node: &impl HasSpan) -> String {
        let span = node.span();
        self.content
            .get(span.start.offset as usize..span.end.offset as usize)
            .unwrap_or_default()
            .to_string()
    }
}

/// The name-resolution scope of a namespace block.
#[derive(Default)]
pub(crate) struct NameScope {
    pub namespace: String,
    /// Lower-cased alias → fully-qualified name.
    pub uses: HashMap<String, String>,
}

impl NameScope {
    /// Resolve a class reference as written in source to a fully-qualified
    /// name without leading `\`.
    pub fn resolve(&self, name: &str) -> String {
        if let Some(fq) = name.strip_prefix('\\') {
            return fq.to_string();
        }

        let (first, rest) = match name.find('\\') {
            Some(pos) => (&name[..pos], &name[pos..]),
            None => (name, ""),
        };
        if let Some(fqn) = self.uses.get(&first.to_ascii_lowercase()) {
            return format!("{}{}", fqn, rest);
        }

        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}\\{}", self.namespace, name)
        }
    }
}

/// Walk statements and collect every class-like declaration.  Handles
/// declarations at the top level and inside namespace blocks.
pub(crate) fn extract_classes_from_statements<'a>(
    statements: impl Iterator<Item = &'a Statement<'a>>,
    scope: &mut NameScope,
    ctx: &SourceCtx<'a>,
    classes: &mut Vec<ReflectionClass>,
) {
    for statement in statements {
        match statement {
            Statement::Use(use_stmt) => {
                let mut imports = Vec::new();
                extract_use_items(&use_stmt.items, &mut imports);
                scope.uses.extend(imports);
            }
            Statement::Namespace(namespace) => {
                let mut inner = NameScope {
                    namespace: namespace
                        .name
                        .as_ref()
                        .map(|ident| ident.value().trim_start_matches('\\').to_string())
                        .unwrap_or_default(),
                    uses: HashMap::new(),
                };
                extract_classes_from_statements(
                    namespace.statements().iter(),
                    &mut inner,
                    ctx,
                    classes,
                );
            }
            Statement::Class(class) => {
                let mut reflection = new_class(class.name.value, ClassLikeKind::Class, class, scope, ctx);
                reflection.parent = class
                    .extends
                    .as_ref()
                    .and_then(|ext| ext.types.first().map(|ident| scope.resolve(ident.value())));
                reflection.interfaces = class
                    .implements
                    .as_ref()
                    .map(|imp| imp.types.iter().map(|ident| scope.resolve(ident.value())).collect())
                    .unwrap_or_default();
                reflection.is_final = class.modifiers.contains_final();
                reflection.is_abstract = class.modifiers.contains_abstract();
                reflection.is_readonly = class.modifiers.contains_readonly();
                extract_members(class.members.iter(), &mut reflection, scope, ctx);
                classes.push(reflection);
            }
            Statement::Interface(iface) => {
                let mut reflection =
                    new_class(iface.name.value, ClassLikeKind::Interface, iface, scope, ctx);
                // Interface `extends` lists are parents in the `is_a` sense.
                reflection.interfaces = iface
                    .extends
                    .as_ref()
                    .map(|ext| ext.types.iter().map(|ident| scope.resolve(ident.value())).collect())
                    .unwrap_or_default();
                reflection.is_abstract = true;
                extract_members(iface.members.iter(), &mut reflection, scope, ctx);
                classes.push(reflection);
            }
            Statement::Trait(trait_def) => {
                let mut reflection =
                    new_class(trait_def.name.value, ClassLikeKind::Trait, trait_def, scope, ctx);
                extract_members(trait_def.members.iter(), &mut reflection, scope, ctx);
                classes.push(reflection);
            }
            Statement::Enum(enum_def) => {
                let mut reflection =
                    new_class(enum_def.name.value, ClassLikeKind::Enum, enum_def, scope, ctx);
                reflection.interfaces = enum_def
                    .implements
                    .as_ref()
                    .map(|imp| imp.types.iter().map(|ident| scope.resolve(ident.value())).collect())
                    .unwrap_or_default();
                // Enums are implicitly final.
                reflection.is_final = true;
                extract_members(enum_def.members.iter(), &mut reflection, scope, ctx);
                classes.push(reflection);
            }
            _ => {}
        }
    }
}

fn new_class(
    short: &str,
    kind: ClassLikeKind,
    node: &impl HasSpan,
    scope: &NameScope,
    ctx: &SourceCtx<'_>,
) -> ReflectionClass {
    let name = if scope.namespace.is_empty() {
        short.to_string()
    } else {
        format!("{}\\{}", scope.namespace, short)
    };
    let mut class = ReflectionClass::new(name.clone());
    class.kind = kind;
    class.declaring = Arc::new(DeclaringClass {
        name,
        file: ctx.file.map(Path::to_path_buf),
        doc_comment: ctx.doc_comment(node),
    });
    class
}

/// Extract methods, properties and used traits into `class`.
fn extract_members<'a>(
    members: impl Iterator<Item = &'a ClassLikeMember<'a>>,
    class: &mut ReflectionClass,
    scope: &NameScope,
    ctx: &SourceCtx<'a>,
) {
    let declaring = class.declaring.clone();

    for member in members {
        match member {
            ClassLikeMember::Method(method) => {
                let mut reflection = ReflectionMethod::new(method.name.value, declaring.clone());
                reflection.visibility = extract_visibility(method.modifiers.iter());
                reflection.is_static = method.modifiers.iter().any(|m| m.is_static());
                reflection.is_final = method.modifiers.contains_final();
                reflection.is_abstract = method.modifiers.contains_abstract()
                    || class.kind == ClassLikeKind::Interface;
                reflection.returns_reference = method.ampersand.is_some();
                reflection.parameters =
                    extract_parameters(&method.parameter_list, scope, &declaring, ctx);
                reflection.return_type = method
                    .return_type_hint
                    .as_ref()
                    .map(|rth| convert_hint(&rth.hint, scope));
                reflection.doc_comment = ctx.doc_comment(method);
                reflection.returned_property = returned_property(&method.body);

                // Promoted constructor parameters are properties too.
                if reflection.is_constructor() {
                    for param in method.parameter_list.parameters.iter() {
                        if !param.is_promoted_property() {
                            continue;
                        }
                        let name = param.variable.name.trim_start_matches('$');
                        let mut property = ReflectionProperty::new(name, declaring.clone());
                        property.visibility = extract_visibility(param.modifiers.iter());
                        property.is_readonly = class.is_readonly
                            || param.modifiers.iter().any(|m| matches!(m, Modifier::Readonly(_)));
                        property.type_hint = param.hint.as_ref().map(|h| convert_hint(h, scope));
                        property.doc_comment = ctx.doc_comment(param);
                        class.properties.push(property);
                    }
                }

                class.methods.push(reflection);
            }
            ClassLikeMember::Property(property) => {
                let visibility = extract_visibility(property.modifiers().iter());
                let is_static = property.modifiers().iter().any(|m| m.is_static());
                let is_readonly = class.is_readonly
                    || property
                        .modifiers()
                        .iter()
                        .any(|m| matches!(m, Modifier::Readonly(_)));
                let type_hint = property.hint().map(|h| convert_hint(h, scope));
                let doc_comment = ctx.doc_comment(member);

                let items: Vec<&PropertyItem> = match property {
                    Property::Plain(plain) => plain.items.iter().collect(),
                    Property::Hooked(hooked) => vec![&hooked.item],
                };

                for item in items {
                    let name = item.variable().name.trim_start_matches('$');
                    let mut reflection = ReflectionProperty::new(name, declaring.clone());
                    reflection.visibility = visibility;
                    reflection.is_static = is_static;
                    reflection.is_readonly = is_readonly;
                    reflection.type_hint = type_hint.clone();
                    reflection.doc_comment = doc_comment.clone();
                    if let PropertyItem::Concrete(concrete) = item {
                        reflection.default =
                            Some(resolve_constant_fetch(&ctx.text(&concrete.value), scope, &declaring));
                    }
                    class.properties.push(reflection);
                }
            }
            ClassLikeMember::TraitUse(trait_use) => {
                for trait_name in trait_use.trait_names.iter() {
                    class.traits.push(scope.resolve(trait_name.value()));
                }
            }
            ClassLikeMember::Constant(_) | ClassLikeMember::EnumCase(_) => {}
        }
    }
}

/// Extract visibility from a set of modifiers.
/// Defaults to `Public` if no visibility modifier is present.
fn extract_visibility<'a>(modifiers: impl Iterator<Item = &'a Modifier<'a>>) -> Visibility {
    for m in modifiers {
        if m.is_private() {
            return Visibility::Private;
        }
        if m.is_protected() {
            return Visibility::Protected;
        }
        if m.is_public() {
            return Visibility::Public;
        }
    }
    Visibility::Public
}

fn extract_parameters(
    parameter_list: &FunctionLikeParameterList,
    scope: &NameScope,
    declaring: &DeclaringClass,
    ctx: &SourceCtx<'_>,
) -> Vec<ReflectionParameter> {
    parameter_list
        .parameters
        .iter()
        .map(|param| ReflectionParameter {
            name: param.variable.name.trim_start_matches('$').to_string(),
            type_hint: param.hint.as_ref().map(|h| convert_hint(h, scope)),
            default: param
                .default_value
                .as_ref()
                .map(|dv| resolve_constant_fetch(&ctx.text(&dv.value), scope, declaring)),
            is_variadic: param.ellipsis.is_some(),
            is_reference: param.ampersand.is_some(),
        })
        .collect()
}

/// Convert an AST type hint into a [`TypeHint`] with resolved class names.
pub(crate) fn convert_hint(hint: &Hint, scope: &NameScope) -> TypeHint {
    match hint {
        Hint::Identifier(ident) => TypeHint::Class(scope.resolve(ident.value())),
        Hint::Nullable(nullable) => TypeHint::Nullable(Box::new(convert_hint(nullable.hint, scope))),
        Hint::Union(union) => {
            let mut types = Vec::new();
            for side in [union.left, union.right] {
                match convert_hint(side, scope) {
                    TypeHint::Union(inner) => types.extend(inner),
                    other => types.push(other),
                }
            }
            TypeHint::Union(types)
        }
        Hint::Intersection(intersection) => {
            let mut types = Vec::new();
            for side in [intersection.left, intersection.right] {
                match convert_hint(side, scope) {
                    TypeHint::Intersection(inner) => types.extend(inner),
                    other => types.push(other),
                }
            }
            TypeHint::Intersection(types)
        }
        Hint::Void(ident)
        | Hint::Never(ident)
        | Hint::Float(ident)
        | Hint::Bool(ident)
        | Hint::Integer(ident)
        | Hint::String(ident)
        | Hint::Object(ident)
        | Hint::Mixed(ident)
        | Hint::Iterable(ident) => TypeHint::Builtin(ident.value.to_ascii_lowercase()),
        Hint::Null(keyword)
        | Hint::True(keyword)
        | Hint::False(keyword)
        | Hint::Array(keyword)
        | Hint::Callable(keyword) => TypeHint::Builtin(keyword.value.to_ascii_lowercase()),
        Hint::Static(_) => TypeHint::Static,
        Hint::Self_(_) => TypeHint::SelfType,
        Hint::Parent(_) => TypeHint::Parent,
        Hint::Parenthesized(paren) => convert_hint(paren.hint, scope),
    }
}

/// Rewrite a `Class::CONSTANT` default so the class part is fully
/// qualified (`\Ns\Class::CONSTANT`).  Other expressions are returned
/// verbatim.
fn resolve_constant_fetch(text: &str, scope: &NameScope, declaring: &DeclaringClass) -> String {
    let text = text.trim();
    let Some((class, constant)) = text.split_once("::") else {
        return text.to_string();
    };
    let is_name = !class.is_empty()
        && class
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '\\');
    let is_constant = !constant.is_empty()
        && constant
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !is_name || !is_constant {
        return text.to_string();
    }

    match class.to_ascii_lowercase().as_str() {
        "self" => format!("\\{}::{}", declaring.name, constant),
        "static" | "parent" => text.to_string(),
        _ => format!("\\{}::{}", scope.resolve(class), constant),
    }
}

/// The property name when the method body is exactly `return $this->prop;`.
fn returned_property(body: &MethodBody) -> Option<String> {
    let MethodBody::Concrete(block) = body else {
        return None;
    };
    let mut statements = block.statements.iter();
    let (Some(Statement::Return(ret)), None) = (statements.next(), statements.next()) else {
        return None;
    };

    if let Some(Expression::Access(Access::Property(pa))) = ret.value
        && let Expression::Variable(Variable::Direct(dv)) = pa.object
        && dv.name == "$this"
        && let ClassLikeMemberSelector::Identifier(ident) = &pa.property
    {
        return Some(ident.value.to_string());
    }
    None
}

// ─── Tests ──────────────────────────────────────────────────────────────────
