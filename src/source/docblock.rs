//! Doc comment lookup.
//!
//! mago keeps comments out of the AST; they live in the program's trivia
//! list, sorted by offset.  A declaration owns the `/** ... */` comment that
//! precedes it with nothing but whitespace or other comments in between.

use mago_span::HasSpan;
use mago_syntax::ast::*;

/// Return the doc comment (delimiters included) attached to `node`.
///
/// Walks the trivia backwards from the node's start offset.  Whitespace and
/// ordinary comments are skipped; any code in the gap means the node has no
/// doc comment.
pub(crate) fn doc_comment_for<'a>(
    trivia: &'a [Trivia<'a>],
    content: &str,
    node: &impl HasSpan,
) -> Option<&'a str> {
    let node_start = node.span().start.offset;
    let preceding = trivia.partition_point(|t| t.span.start.offset < node_start);
    let bytes = content.as_bytes();
    let mut covered_from = node_start as usize;

    for t in trivia[..preceding].iter().rev() {
        let gap = bytes
            .get(t.span.end.offset as usize..covered_from)
            .unwrap_or(&[]);
        if !gap.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        match t.kind {
            TriviaKind::DocBlockComment => return Some(t.value),
            TriviaKind::WhiteSpace
            | TriviaKind::SingleLineComment
            | TriviaKind::MultiLineComment
            | TriviaKind::HashComment => covered_from = t.span.start.offset as usize,
        }
    }

    None
}
