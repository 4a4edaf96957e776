//! Doc comment lexer.
//!
//! Splits a doc comment into annotation tokens.  The comment gutter (`*`
//! runs) and whitespace are dropped; every other character ends up in some
//! token, so the parser always sees what it stumbled over.

use std::fmt;

/// Kind of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Anything the lexer does not recognise.
    None,
    Integer,
    String,
    Identifier,
    Float,
    At,
    Comma,
    OpenParenthesis,
    CloseParenthesis,
    OpenCurlyBraces,
    CloseCurlyBraces,
    Equals,
    Colon,
    Minus,
    NamespaceSeparator,
    True,
    False,
    Null,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::None => "None",
            TokenKind::Integer => "Integer",
            TokenKind::String => "String",
            TokenKind::Identifier => "Identifier",
            TokenKind::Float => "Float",
            TokenKind::At => "At",
            TokenKind::Comma => "Comma",
            TokenKind::OpenParenthesis => "OpenParenthesis",
            TokenKind::CloseParenthesis => "CloseParenthesis",
            TokenKind::OpenCurlyBraces => "OpenCurlyBraces",
            TokenKind::CloseCurlyBraces => "CloseCurlyBraces",
            TokenKind::Equals => "Equals",
            TokenKind::Colon => "Colon",
            TokenKind::Minus => "Minus",
            TokenKind::NamespaceSeparator => "NamespaceSeparator",
            TokenKind::True => "True",
            TokenKind::False => "False",
            TokenKind::Null => "Null",
        };
        f.write_str(name)
    }
}

/// A lexed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// The token text; string literals are unquoted and unescaped.
    pub value: String,
    /// Byte offset of the token in the input.
    pub position: usize,
    /// Byte offset just past the token's raw text.
    pub end: usize,
}

/// A restartable, forward-only token stream with one token of lookahead
/// and an independent peek cursor.
#[derive(Debug, Clone, Default)]
pub struct Lexer {
    tokens: Vec<Token>,
    /// Index of `lookahead` in `tokens`.
    position: usize,
    peek: usize,
    token: Option<Token>,
    lookahead: Option<Token>,
}

impl Lexer {
    /// Tokenize `input` and position the stream before the first token.
    pub fn new(input: &str) -> Self {
        let mut lexer = Self {
            tokens: tokenize(input),
            ..Self::default()
        };
        lexer.reset();
        lexer
    }

    /// Replace the input, as if freshly constructed.
    pub fn set_input(&mut self, input: &str) {
        self.tokens = tokenize(input);
        self.reset();
    }

    /// Rewind to before the first token.
    pub fn reset(&mut self) {
        self.position = 0;
        self.peek = 0;
        self.token = None;
        self.lookahead = self.tokens.first().cloned();
    }

    pub fn reset_peek(&mut self) {
        self.peek = 0;
    }

    /// Advance: the lookahead becomes the current token.  Returns whether
    /// a new lookahead exists.
    pub fn move_next(&mut self) -> bool {
        self.peek = 0;
        self.token = self.lookahead.take();
        if self.token.is_some() {
            self.position += 1;
        }
        self.lookahead = self.tokens.get(self.position).cloned();
        self.lookahead.is_some()
    }

    /// The most recently consumed token.
    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    /// The next token to be consumed.
    pub fn lookahead(&self) -> Option<&Token> {
        self.lookahead.as_ref()
    }

    /// Advance the peek cursor and return the token it lands on.  The
    /// first call returns the token after the lookahead.
    pub fn peek(&mut self) -> Option<&Token> {
        self.peek += 1;
        self.tokens.get(self.position + self.peek)
    }

    /// The token after the lookahead, without moving the peek cursor.
    pub fn glimpse(&mut self) -> Option<&Token> {
        self.reset_peek();
        self.tokens.get(self.position + 1)
    }

    pub fn is_next_token(&self, kind: TokenKind) -> bool {
        self.lookahead.as_ref().is_some_and(|t| t.kind == kind)
    }

    pub fn is_next_token_any(&self, kinds: &[TokenKind]) -> bool {
        self.lookahead
            .as_ref()
            .is_some_and(|t| kinds.contains(&t.kind))
    }

    /// Whether the lookahead starts exactly where the current token ends.
    pub fn next_token_is_adjacent(&self) -> bool {
        match (&self.token, &self.lookahead) {
            (Some(token), Some(next)) => token.end == next.position,
            (None, Some(next)) => next.position == 0,
            _ => false,
        }
    }

    /// Advance until the lookahead is of `kind` (or the input ends).
    pub fn skip_until(&mut self, kind: TokenKind) {
        while self.lookahead.as_ref().is_some_and(|t| t.kind != kind) {
            self.move_next();
        }
    }
}

fn is_identifier_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'\\' || b >= 0x80
}

fn is_identifier_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b':' || b == b'\\' || b >= 0x80
}

/// Tokenize the whole input.
pub fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b.is_ascii_whitespace() || b == b'*' {
            i += 1;
            continue;
        }

        if b == b'"' {
            if let Some((value, end)) = scan_string(input, i) {
                tokens.push(Token {
                    kind: TokenKind::String,
                    value,
                    position: i,
                    end,
                });
                i = end;
            } else {
                tokens.push(single(TokenKind::None, input, i));
                i += 1;
            }
            continue;
        }

        if let Some((kind, end)) = scan_number(bytes, i) {
            tokens.push(Token {
                kind,
                value: input[i..end].to_string(),
                position: i,
                end,
            });
            i = end;
            continue;
        }

        // A lone `\` is punctuation; `\Foo` starts a qualified name.
        if is_identifier_start(b)
            && !(b == b'\\' && !bytes.get(i + 1).copied().is_some_and(is_identifier_start))
        {
            let mut end = i + 1;
            while end < bytes.len() && is_identifier_continue(bytes[end]) {
                end += 1;
            }
            // Trailing separators belong to the next token.
            while end > i + 1 && matches!(bytes[end - 1], b':' | b'\\') {
                end -= 1;
            }
            let value = &input[i..end];
            let kind = match value.to_ascii_lowercase().as_str() {
                "true" => TokenKind::True,
                "false" => TokenKind::False,
                "null" => TokenKind::Null,
                _ => TokenKind::Identifier,
            };
            tokens.push(Token {
                kind,
                value: value.to_string(),
                position: i,
                end,
            });
            i = end;
            continue;
        }

        let kind = match b {
            b'@' => TokenKind::At,
            b',' => TokenKind::Comma,
            b'(' => TokenKind::OpenParenthesis,
            b')' => TokenKind::CloseParenthesis,
            b'{' => TokenKind::OpenCurlyBraces,
            b'}' => TokenKind::CloseCurlyBraces,
            b'=' => TokenKind::Equals,
            b':' => TokenKind::Colon,
            b'-' => TokenKind::Minus,
            b'\\' => TokenKind::NamespaceSeparator,
            _ => TokenKind::None,
        };
        let token = single(kind, input, i);
        i = token.end;
        tokens.push(token);
    }

    tokens
}

/// A one-character token at byte `i` (the whole UTF-8 character).
fn single(kind: TokenKind, input: &str, i: usize) -> Token {
    let len = input[i..].chars().next().map_or(1, char::len_utf8);
    Token {
        kind,
        value: input[i..i + len].to_string(),
        position: i,
        end: i + len,
    }
}

/// Scan a double-quoted string starting at `start`.  `""` inside the
/// string stands for one quote.  Returns `None` when unterminated.
fn scan_string(input: &str, start: usize) -> Option<(String, usize)> {
    let bytes = input.as_bytes();
    let mut value = String::new();
    let mut i = start + 1;
    let mut chunk_start = i;

    loop {
        let offset = memchr::memchr(b'"', &bytes[i..])?;
        let quote = i + offset;
        value.push_str(&input[chunk_start..quote]);
        if bytes.get(quote + 1) == Some(&b'"') {
            value.push('"');
            i = quote + 2;
            chunk_start = i;
        } else {
            return Some((value, quote + 1));
        }
    }
}

/// Scan `[+-]?digits[.digits][(e|E)[+-]digits]` at `start`.
fn scan_number(bytes: &[u8], start: usize) -> Option<(TokenKind, usize)> {
    let digits = |from: usize| {
        let mut end = from;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        end
    };

    let mut i = start;
    if matches!(bytes[i], b'+' | b'-') {
        i += 1;
    }
    let int_end = digits(i);
    if int_end == i {
        return None;
    }
    i = int_end;

    let mut kind = TokenKind::Integer;
    if bytes.get(i) == Some(&b'.') {
        let frac_end = digits(i + 1);
        if frac_end > i + 1 {
            kind = TokenKind::Float;
            i = frac_end;
        }
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let exp_end = digits(j);
        if exp_end > j {
            kind = TokenKind::Float;
            i = exp_end;
        }
    }

    Some((kind, i))
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_annotation_with_values() {
        let tokens = tokenize(r#"@Foo\Bar(name="x", 12, -1.5e3, {true})"#);
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::At,
                TokenKind::Identifier,
                TokenKind::OpenParenthesis,
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::String,
                TokenKind::Comma,
                TokenKind::Integer,
                TokenKind::Comma,
                TokenKind::Float,
                TokenKind::Comma,
                TokenKind::OpenCurlyBraces,
                TokenKind::True,
                TokenKind::CloseCurlyBraces,
                TokenKind::CloseParenthesis,
            ]
        );
        assert_eq!(tokens[1].value, "Foo\\Bar");
        assert_eq!(tokens[5].value, "x");
        assert_eq!(tokens[9].value, "-1.5e3");
    }

    #[test]
    fn doubled_quote_escapes_quote() {
        let tokens = tokenize(r#""say ""hi""""#);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].value, "say \"hi\"");
    }

    #[test]
    fn gutter_is_discarded_and_unknown_characters_kept() {
        assert_eq!(
            kinds("/**\n * @A ; */"),
            vec![
                TokenKind::None,
                TokenKind::At,
                TokenKind::Identifier,
                TokenKind::None,
                TokenKind::None,
            ]
        );
    }

    #[test]
    fn trailing_separators_are_not_part_of_identifiers() {
        let tokens = tokenize("ORM: Foo\\");
        assert_eq!(tokens[0].value, "ORM");
        assert_eq!(tokens[1].kind, TokenKind::Colon);
        assert_eq!(tokens[2].value, "Foo");
        assert_eq!(tokens[3].kind, TokenKind::NamespaceSeparator);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            kinds("TRUE False nULL"),
            vec![TokenKind::True, TokenKind::False, TokenKind::Null]
        );
    }

    #[test]
    fn cursor_moves_and_peeks() {
        let mut lexer = Lexer::new("@A(1)");
        assert!(lexer.token().is_none());
        assert!(lexer.is_next_token(TokenKind::At));
        lexer.move_next();
        assert_eq!(lexer.token().map(|t| t.kind), Some(TokenKind::At));
        assert!(lexer.next_token_is_adjacent());
        assert_eq!(lexer.peek().map(|t| t.kind), Some(TokenKind::OpenParenthesis));
        assert_eq!(lexer.peek().map(|t| t.kind), Some(TokenKind::Integer));
        assert_eq!(lexer.glimpse().map(|t| t.kind), Some(TokenKind::OpenParenthesis));
        lexer.reset();
        assert!(lexer.is_next_token(TokenKind::At));
    }

    #[test]
    fn skip_until_and_new_input() {
        let mut lexer = Lexer::new("@A(x, y) @B");
        lexer.skip_until(TokenKind::CloseParenthesis);
        assert!(lexer.is_next_token(TokenKind::CloseParenthesis));
        lexer.skip_until(TokenKind::Comma);
        assert!(lexer.lookahead().is_none());

        lexer.set_input("{1}");
        assert!(lexer.token().is_none());
        assert!(lexer.is_next_token_any(&[TokenKind::OpenCurlyBraces, TokenKind::At]));
    }
}
