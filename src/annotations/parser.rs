//! Recursive-descent annotation parser.
//!
//! Grammar:
//!
//! ```text
//! Annotations     ::= Annotation {[ "*" ]* [Annotation]}*
//! Annotation      ::= "@" AnnotationName [ "(" [Values] ")" ]
//! AnnotationName  ::= QualifiedName | SimpleName | Alias ":" SimpleName
//! Values          ::= Value {"," Value}* [","]
//! Value           ::= PlainValue | FieldAssignment
//! FieldAssignment ::= identifier "=" PlainValue
//! PlainValue      ::= integer | float | string | boolean | null | Array | Annotation | Constant
//! Array           ::= "{" [ArrayEntry {"," ArrayEntry}* [","]] "}"
//! ArrayEntry      ::= (string | integer | identifier) ("=" | ":") PlainValue | PlainValue
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use crate::error::AnnotationError;
use crate::types::short_name;

use super::imports::{IgnoredNames, ImportTable};
use super::lexer::{Lexer, Token, TokenKind};
use super::registry::AnnotationRegistry;
use super::value::{Annotation, ArrayBuilder, ArrayKey, Value};

/// Overrides annotation construction.  Returning `None` falls back to the
/// registry.
pub type AnnotationCreator =
    Arc<dyn Fn(&str, &BTreeMap<String, Value>) -> Option<Annotation> + Send + Sync>;

const CLASS_IDENTIFIERS: &[TokenKind] = &[
    TokenKind::Identifier,
    TokenKind::True,
    TokenKind::False,
    TokenKind::Null,
];

/// Parses annotations out of doc comments.
///
/// Cheap to clone; the tables are shared.
#[derive(Clone)]
pub struct DocParser {
    registry: Arc<AnnotationRegistry>,
    imports: Arc<ImportTable>,
    ignored_names: Arc<IgnoredNames>,
    ignore_not_imported: bool,
    creator: Option<AnnotationCreator>,
}

impl std::fmt::Debug for DocParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocParser")
            .field("imports", &self.imports)
            .field("ignored_names", &self.ignored_names.len())
            .field("ignore_not_imported", &self.ignore_not_imported)
            .field("creator", &self.creator.is_some())
            .finish()
    }
}

impl DocParser {
    /// A parser with no imports and no ignored names.
    pub fn new(registry: Arc<AnnotationRegistry>) -> Self {
        Self {
            registry,
            imports: Arc::new(ImportTable::new()),
            ignored_names: Arc::new(IgnoredNames::new()),
            ignore_not_imported: false,
            creator: None,
        }
    }

    pub fn with_imports(mut self, imports: impl Into<Arc<ImportTable>>) -> Self {
        self.imports = imports.into();
        self
    }

    pub fn with_ignored_names(mut self, names: impl Into<Arc<IgnoredNames>>) -> Self {
        self.ignored_names = names.into();
        self
    }

    /// Silently skip annotations whose name resolves to nothing.
    pub fn with_ignore_not_imported(mut self, ignore: bool) -> Self {
        self.ignore_not_imported = ignore;
        self
    }

    pub fn with_creator(mut self, creator: AnnotationCreator) -> Self {
        self.creator = Some(creator);
        self
    }

    pub fn registry(&self) -> &Arc<AnnotationRegistry> {
        &self.registry
    }

    pub fn imports(&self) -> &ImportTable {
        &self.imports
    }

    /// Parse all annotations in `input`.
    ///
    /// `context` names the declaration being parsed (`class Foo`,
    /// `method Foo::bar()`) and is quoted in error messages.
    pub fn parse(&self, input: &str, context: &str) -> Result<Vec<Annotation>, AnnotationError> {
        let Some(start) = find_initial_token_position(input) else {
            return Ok(Vec::new());
        };
        let body = input[start..].trim_end_matches(['*', '/', ' ', '\t', '\r', '\n']);

        let mut session = Session {
            parser: self,
            lexer: Lexer::new(body),
            context,
            offset: start,
        };
        session.annotations()
    }
}

/// Offset of the first `@` at the start of input or after a space, tab
/// or `*`.
fn find_initial_token_position(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    memchr::memchr_iter(b'@', bytes)
        .find(|&pos| pos == 0 || matches!(bytes[pos - 1], b' ' | b'*' | b'\t'))
}

fn push_unique(candidates: &mut Vec<String>, candidate: String) {
    if !candidates.iter().any(|c| c.eq_ignore_ascii_case(&candidate)) {
        candidates.push(candidate);
    }
}

enum Argument {
    Named(String, Value),
    Positional(Value),
}

/// How an annotation name resolved.
enum Resolution {
    Class(String),
    Skip,
}

/// State of one `parse` call.
struct Session<'p> {
    parser: &'p DocParser,
    lexer: Lexer,
    context: &'p str,
    /// Offset of the lexer input within the original doc comment.
    offset: usize,
}

impl Session<'_> {
    // ── Errors ──────────────────────────────────────────────────────────

    fn syntax_error(&self, expected: &str) -> AnnotationError {
        let token = self.lexer.lookahead();
        AnnotationError::Syntax {
            expected: expected.to_string(),
            found: token.map(|t| t.value.clone()),
            position: token.map(|t| t.position + self.offset),
            context: (!self.context.is_empty()).then(|| self.context.to_string()),
        }
    }

    fn context_label(&self) -> &str {
        if self.context.is_empty() {
            "doc comment"
        } else {
            self.context
        }
    }

    fn semantic_error(&self, message: String) -> AnnotationError {
        AnnotationError::semantic(message)
    }

    /// Fill the `{context}` placeholder of errors raised outside the session.
    fn with_context(&self, err: AnnotationError) -> AnnotationError {
        match err {
            AnnotationError::Semantic(message) => {
                AnnotationError::Semantic(message.replace("{context}", self.context_label()))
            }
            other => other,
        }
    }

    // ── Token helpers ───────────────────────────────────────────────────

    fn match_token(&mut self, kind: TokenKind) -> Result<Token, AnnotationError> {
        if !self.lexer.is_next_token(kind) {
            return Err(self.syntax_error(&kind.to_string()));
        }
        self.lexer.move_next();
        self.current()
    }

    fn match_any(&mut self, kinds: &[TokenKind]) -> Result<Token, AnnotationError> {
        if !self.lexer.is_next_token_any(kinds) {
            let expected: Vec<String> = kinds.iter().map(ToString::to_string).collect();
            return Err(self.syntax_error(&expected.join(" or ")));
        }
        self.lexer.move_next();
        self.current()
    }

    fn current(&self) -> Result<Token, AnnotationError> {
        self.lexer
            .token()
            .cloned()
            .ok_or_else(|| self.syntax_error("a token"))
    }

    /// Consume a balanced `( ... )` following a skipped annotation name.
    fn skip_arguments(&mut self) {
        if !self.lexer.is_next_token(TokenKind::OpenParenthesis) {
            return;
        }
        let mut depth = 0usize;
        while let Some(kind) = self.lexer.lookahead().map(|t| t.kind) {
            self.lexer.move_next();
            match kind {
                TokenKind::OpenParenthesis => depth += 1,
                TokenKind::CloseParenthesis => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }

    // ── Productions ─────────────────────────────────────────────────────

    /// Annotations ::= Annotation {[ "*" ]* [Annotation]}*
    fn annotations(&mut self) -> Result<Vec<Annotation>, AnnotationError> {
        let mut annotations = Vec::new();

        while let Some(lookahead) = self.lexer.lookahead() {
            if lookahead.kind != TokenKind::At {
                self.lexer.move_next();
                continue;
            }

            // An `@` glued to the previous token (`foo@bar.com`) is text.
            if self.lexer.token().is_some() && self.lexer.next_token_is_adjacent() {
                self.lexer.move_next();
                continue;
            }

            // The `@` must be directly followed by a name.
            let at_end = lookahead.end;
            let followed_by_name = self.lexer.glimpse().is_some_and(|peek| {
                peek.position == at_end
                    && (peek.kind == TokenKind::NamespaceSeparator
                        || CLASS_IDENTIFIERS.contains(&peek.kind))
            });
            if !followed_by_name {
                self.lexer.move_next();
                continue;
            }

            if let Some(annotation) = self.annotation()? {
                annotations.push(annotation);
            }
        }

        Ok(annotations)
    }

    /// Annotation ::= "@" AnnotationName [ "(" [Values] ")" ]
    ///
    /// Returns `None` for skipped occurrences.
    fn annotation(&mut self) -> Result<Option<Annotation>, AnnotationError> {
        self.match_token(TokenKind::At)?;
        let name = self.identifier()?;

        // `@phpstan-param` and friends.
        if self.lexer.is_next_token(TokenKind::Minus) && self.lexer.next_token_is_adjacent() {
            return Ok(None);
        }

        let class = match self.resolve_annotation_name(&name)? {
            Resolution::Class(class) => class,
            Resolution::Skip => {
                trace!("skipping annotation @{} in {}", name, self.context_label());
                self.skip_arguments();
                return Ok(None);
            }
        };

        let mut values = BTreeMap::new();
        if self.lexer.is_next_token(TokenKind::OpenParenthesis) {
            self.match_token(TokenKind::OpenParenthesis)?;
            if !self.lexer.is_next_token(TokenKind::CloseParenthesis) {
                values = self.values()?;
            }
            self.match_token(TokenKind::CloseParenthesis)?;
        }

        self.construct(&class, values).map(Some)
    }

    fn construct(
        &self,
        class: &str,
        values: BTreeMap<String, Value>,
    ) -> Result<Annotation, AnnotationError> {
        if let Some(creator) = &self.parser.creator
            && let Some(annotation) = creator(class, &values)
        {
            return Ok(annotation);
        }
        self.parser
            .registry
            .instantiate(class, values)
            .map_err(|err| self.with_context(err))
    }

    /// QualifiedName ::= NameSpacePart "\" {NameSpacePart "\"}* SimpleName
    fn identifier(&mut self) -> Result<String, AnnotationError> {
        if !self.lexer.is_next_token_any(CLASS_IDENTIFIERS) {
            return Err(self.syntax_error("namespace separator or identifier"));
        }
        self.lexer.move_next();
        let mut name = self.current()?.value;

        while self.lexer.next_token_is_adjacent()
            && self.lexer.is_next_token(TokenKind::NamespaceSeparator)
        {
            self.match_token(TokenKind::NamespaceSeparator)?;
            let part = self.match_any(CLASS_IDENTIFIERS)?;
            name.push('\\');
            name.push_str(&part.value);
        }

        Ok(name)
    }

    fn resolve_annotation_name(&self, name: &str) -> Result<Resolution, AnnotationError> {
        let parser = self.parser;
        let registry = &parser.registry;

        if parser.ignored_names.contains(name) {
            return Ok(Resolution::Skip);
        }

        // Fully qualified: existence check only.
        if let Some(fq) = name.strip_prefix('\\') {
            if registry.class_exists(fq) {
                return Ok(Resolution::Class(fq.to_string()));
            }
            return Err(self.semantic_error(format!(
                "The annotation \"@{}\" in {} does not exist, or could not be auto-loaded.",
                fq,
                self.context_label()
            )));
        }

        if let Some((first, rest)) = name.split_once('\\') {
            let fq = match parser.imports.get(first) {
                Some(import) => format!("{}\\{}", import, rest),
                None => name.to_string(),
            };
            if registry.class_exists(&fq) {
                return Ok(Resolution::Class(fq));
            }
            return self.not_found(name);
        }

        let (alias, short) = match name.split_once(':') {
            Some((alias, short)) => (Some(alias.to_ascii_lowercase()), short),
            None => (None, name),
        };

        let mut candidates: Vec<String> = Vec::new();

        for wildcard in parser.imports.wildcards() {
            if wildcard.alias == alias {
                let candidate = format!("{}\\{}", wildcard.namespace, short);
                if registry.class_exists(&candidate) {
                    push_unique(&mut candidates, candidate);
                }
            }
        }

        match &alias {
            None => {
                for (key, target) in parser.imports.exact() {
                    if key.eq_ignore_ascii_case(short)
                        || short_name(target).eq_ignore_ascii_case(short)
                    {
                        push_unique(&mut candidates, target.to_string());
                    }
                }
            }
            Some(alias) => {
                if let Some(target) = parser.imports.get(alias) {
                    let candidate = format!("{}\\{}", target, short);
                    if registry.class_exists(&candidate) {
                        push_unique(&mut candidates, candidate);
                    }
                }
            }
        }

        if candidates.is_empty() && alias.is_none() {
            if let Some(namespace) = parser.imports.namespace.as_deref().filter(|ns| !ns.is_empty())
                && registry.class_exists(&format!("{}\\{}", namespace, short))
            {
                push_unique(&mut candidates, format!("{}\\{}", namespace, short));
            } else if registry.class_exists(short) {
                push_unique(&mut candidates, short.to_string());
            }
        }

        match candidates.len() {
            0 => self.not_found(name),
            1 => {
                let class = candidates.remove(0);
                match registry.get(&class) {
                    Some(known) => Ok(Resolution::Class(known.name.clone())),
                    None => Err(self.semantic_error(format!(
                        "The annotation \"@{}\" in {} does not exist, or could not be auto-loaded.",
                        class,
                        self.context_label()
                    ))),
                }
            }
            _ => Err(self.semantic_error(format!(
                "The annotation \"@{}\" in {} is ambiguous; it could refer to any of: {}.",
                name,
                self.context_label(),
                candidates.join(", ")
            ))),
        }
    }

    fn not_found(&self, name: &str) -> Result<Resolution, AnnotationError> {
        if self.parser.ignore_not_imported {
            return Ok(Resolution::Skip);
        }
        Err(self.semantic_error(format!(
            "The annotation \"@{}\" in {} was never imported. Did you maybe forget to add a \"use\" statement for this annotation?",
            name,
            self.context_label()
        )))
    }

    /// Values ::= Value {"," Value}* [","]
    fn values(&mut self) -> Result<BTreeMap<String, Value>, AnnotationError> {
        let mut arguments = vec![self.value()?];
        while self.lexer.is_next_token(TokenKind::Comma) {
            self.match_token(TokenKind::Comma)?;
            if self.lexer.is_next_token(TokenKind::CloseParenthesis) {
                break;
            }
            arguments.push(self.value()?);
        }

        let mut positional = Vec::new();
        let mut named = Vec::new();
        for argument in arguments {
            match argument {
                Argument::Positional(value) => positional.push(value),
                Argument::Named(name, value) => named.push((name, value)),
            }
        }

        let mut values = BTreeMap::new();
        match positional.len() {
            0 => {}
            1 => {
                values.insert("value".to_string(), positional.remove(0));
            }
            _ => {
                values.insert("value".to_string(), Value::list(positional));
            }
        }
        values.extend(named);
        Ok(values)
    }

    /// Value ::= PlainValue | FieldAssignment
    fn value(&mut self) -> Result<Argument, AnnotationError> {
        if self.lexer.glimpse().is_some_and(|t| t.kind == TokenKind::Equals) {
            return self.field_assignment();
        }
        self.plain_value().map(Argument::Positional)
    }

    /// FieldAssignment ::= identifier "=" PlainValue
    fn field_assignment(&mut self) -> Result<Argument, AnnotationError> {
        let name = self.match_token(TokenKind::Identifier)?.value;
        self.match_token(TokenKind::Equals)?;
        let value = self.plain_value()?;
        Ok(Argument::Named(name, value))
    }

    /// PlainValue ::= integer | float | string | boolean | null | Array | Annotation | Constant
    fn plain_value(&mut self) -> Result<Value, AnnotationError> {
        let Some(kind) = self.lexer.lookahead().map(|t| t.kind) else {
            return Err(self.syntax_error("PlainValue"));
        };

        match kind {
            TokenKind::OpenCurlyBraces => self.array(),
            TokenKind::At => Ok(self
                .annotation()?
                .map_or(Value::Null, Value::from)),
            TokenKind::Identifier => self.constant(),
            TokenKind::String => {
                let token = self.match_token(TokenKind::String)?;
                Ok(Value::String(token.value))
            }
            TokenKind::Integer => {
                let token = self.match_token(TokenKind::Integer)?;
                match token.value.parse::<i64>() {
                    Ok(n) => Ok(Value::Integer(n)),
                    // PHP turns integer overflow into a float.
                    Err(_) => Ok(Value::Float(token.value.parse::<f64>().unwrap_or(f64::INFINITY))),
                }
            }
            TokenKind::Float => {
                let token = self.match_token(TokenKind::Float)?;
                token
                    .value
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| self.syntax_error("PlainValue"))
            }
            TokenKind::True => {
                self.lexer.move_next();
                Ok(Value::Bool(true))
            }
            TokenKind::False => {
                self.lexer.move_next();
                Ok(Value::Bool(false))
            }
            TokenKind::Null => {
                self.lexer.move_next();
                Ok(Value::Null)
            }
            _ => Err(self.syntax_error("PlainValue")),
        }
    }

    /// Array ::= "{" [ArrayEntry {"," ArrayEntry}* [","]] "}"
    fn array(&mut self) -> Result<Value, AnnotationError> {
        self.match_token(TokenKind::OpenCurlyBraces)?;
        let mut builder = ArrayBuilder::default();

        if self.lexer.is_next_token(TokenKind::CloseCurlyBraces) {
            self.match_token(TokenKind::CloseCurlyBraces)?;
            return Ok(builder.finish());
        }

        self.array_entry(&mut builder)?;
        while self.lexer.is_next_token(TokenKind::Comma) {
            self.match_token(TokenKind::Comma)?;
            if self.lexer.is_next_token(TokenKind::CloseCurlyBraces) {
                break;
            }
            self.array_entry(&mut builder)?;
        }
        self.match_token(TokenKind::CloseCurlyBraces)?;

        Ok(builder.finish())
    }

    /// ArrayEntry ::= (string | integer | identifier) ("=" | ":") PlainValue | PlainValue
    fn array_entry(&mut self, builder: &mut ArrayBuilder) -> Result<(), AnnotationError> {
        let keyed = self
            .lexer
            .glimpse()
            .is_some_and(|t| matches!(t.kind, TokenKind::Equals | TokenKind::Colon));

        if !keyed {
            let value = self.plain_value()?;
            builder.push(value);
            return Ok(());
        }

        let key = if self.lexer.is_next_token(TokenKind::Identifier) {
            let identifier = self.identifier()?;
            match self.lookup_constant(&identifier) {
                Some(Value::Integer(n)) => ArrayKey::Index(n),
                Some(Value::String(s)) => ArrayKey::from_string(s),
                _ => ArrayKey::Name(identifier),
            }
        } else {
            let token = self.match_any(&[TokenKind::Integer, TokenKind::String])?;
            match token.kind {
                TokenKind::Integer => token
                    .value
                    .parse::<i64>()
                    .map(ArrayKey::Index)
                    .unwrap_or(ArrayKey::Name(token.value)),
                _ => ArrayKey::from_string(token.value),
            }
        };

        self.match_any(&[TokenKind::Equals, TokenKind::Colon])?;
        let value = self.plain_value()?;
        builder.insert(key, value);
        Ok(())
    }

    /// Constant ::= integer | string | float | boolean
    ///
    /// A registered constant, `Class::CONSTANT` or `Class::class`.
    fn constant(&mut self) -> Result<Value, AnnotationError> {
        let identifier = self.identifier()?;

        if let Some(class) = identifier
            .strip_suffix("::class")
            .filter(|c| !c.is_empty())
        {
            return Ok(Value::String(self.resolve_class_reference(class)));
        }

        self.lookup_constant(&identifier).ok_or_else(|| {
            self.semantic_error(format!(
                "Couldn't find constant {}, {}.",
                identifier,
                self.context_label()
            ))
        })
    }

    fn lookup_constant(&self, identifier: &str) -> Option<Value> {
        let registry = &self.parser.registry;
        if let Some(value) = registry.constant(identifier) {
            return Some(value.clone());
        }
        let (class, constant) = identifier.split_once("::")?;
        if class.starts_with('\\') {
            return None;
        }
        let class = self.resolve_class_reference(class);
        registry
            .constant(&format!("{}::{}", class, constant))
            .cloned()
    }

    /// Resolve a class name written inside a constant expression through the
    /// imports and the declaring namespace.
    fn resolve_class_reference(&self, class: &str) -> String {
        if let Some(fq) = class.strip_prefix('\\') {
            return fq.to_string();
        }
        let imports = &self.parser.imports;
        let (first, rest) = match class.split_once('\\') {
            Some((first, rest)) => (first, Some(rest)),
            None => (class, None),
        };
        if let Some(import) = imports.get(first) {
            return match rest {
                Some(rest) => format!("{}\\{}", import, rest),
                None => import.to_string(),
            };
        }
        if let Some(namespace) = imports.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            let candidate = format!("{}\\{}", namespace, class);
            if self.parser.registry.class_exists(&candidate) {
                return candidate;
            }
        }
        class.to_string()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::registry::AnnotationClass;

    fn parser() -> DocParser {
        let mut registry = AnnotationRegistry::new();
        registry.register(AnnotationClass::new("Ns\\Name").with_fields(["value", "extra"]));
        registry.define_constant("Ns\\Name::LEVEL", Value::Integer(3));
        DocParser::new(Arc::new(registry))
            .with_imports(ImportTable::from_entries([("name", "Ns\\Name")]))
    }

    #[test]
    fn initial_position_requires_separator_before_at() {
        assert_eq!(find_initial_token_position("foo@bar @Baz"), Some(8));
        assert_eq!(find_initial_token_position("@A"), Some(0));
        assert_eq!(find_initial_token_position("mail me at a@b.c"), None);
    }

    #[test]
    fn positional_values_collapse_into_value() {
        let parser = parser();
        let one = parser.parse("/** @Name(1) */", "").unwrap();
        assert_eq!(one[0].get("value"), Some(&Value::Integer(1)));

        let many = parser.parse("/** @Name(1, \"a\", ) */", "").unwrap();
        assert_eq!(
            many[0].get("value"),
            Some(&Value::list([Value::Integer(1), Value::from("a")]))
        );
    }

    #[test]
    fn class_constants_resolve_through_imports() {
        let parser = parser();
        let parsed = parser
            .parse("/** @Name(Name::LEVEL, extra=Name::class) */", "")
            .unwrap();
        assert_eq!(parsed[0].get("value"), Some(&Value::Integer(3)));
        assert_eq!(parsed[0].get("extra"), Some(&Value::from("Ns\\Name")));
    }

    #[test]
    fn glued_and_hyphenated_names_are_noise() {
        let parser = parser();
        let parsed = parser
            .parse("/** mail@Name.com @phpstan-param int $x @Name */", "")
            .unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn skipped_annotation_consumes_its_arguments() {
        let parser = parser().with_ignore_not_imported(true);
        let parsed = parser.parse("/** @Unknown(@Name(1)) @Name(2) */", "").unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].get("value"), Some(&Value::Integer(2)));
    }

    #[test]
    fn unknown_constant_is_semantic_error() {
        let err = parser().parse("/** @Name(MISSING) */", "class Foo").unwrap_err();
        assert_eq!(
            err.to_string(),
            "[Semantical Error] Couldn't find constant MISSING, class Foo."
        );
    }
}
