//! Static extraction of the references a file makes.
//!
//! Works on tokens only; nothing is parsed or type-checked. Recognized:
//! - `/// <reference path="..." />` and `/// <reference types="..." />`
//!   directives in the leading comments of the file
//! - `import ... from "x"`, `import "x"`, `import type ... from "x"`
//! - `import x = require("x")`
//! - `export ... from "x"`, `export * from "x"`
//! - `import("x")` with a literal argument

use tsincr_lexer::{Comment, CommentKind, Lexer, Span, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// `/// <reference path />`; resolved relative to the referencing file.
    Directive,
    /// Any module specifier; passed verbatim to the resolver.
    Import,
}

/// An unresolved reference as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub specifier: String,
    /// Span of the specifier text, without quotes.
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreprocessedFile {
    /// Directives first, then imports in source order.
    pub references: Vec<Reference>,
    /// `/// <reference no-default-lib="true" />` was present.
    pub no_default_lib: bool,
}

/// Extract every reference of `text`.
pub fn preprocess(text: &str) -> PreprocessedFile {
    let scanned = Lexer::scan(text);
    let first_token = scanned
        .tokens
        .iter()
        .find(|token| token.kind != TokenKind::Error)
        .map_or(text.len(), |token| token.span.start);

    let mut file = PreprocessedFile::default();
    for comment in scanned.comments.iter().take_while(|c| c.span.start < first_token) {
        read_directive(comment, &mut file);
    }
    collect_imports(&scanned.tokens, &mut file.references);
    file
}

fn read_directive(comment: &Comment, file: &mut PreprocessedFile) {
    if comment.kind != CommentKind::Line {
        return;
    }
    let Some(body) = comment.text.strip_prefix('/') else {
        return;
    };
    if !body.trim_start().starts_with("<reference") {
        return;
    }
    // `//` plus the third slash
    let body_start = comment.span.start + 3;

    if let Some((offset, value)) = attribute(body, "path") {
        let start = body_start + offset;
        file.references.push(Reference {
            kind: ReferenceKind::Directive,
            specifier: value.to_string(),
            span: Span::new(start, start + value.len()),
        });
    } else if let Some((offset, value)) = attribute(body, "types") {
        let start = body_start + offset;
        file.references.push(Reference {
            kind: ReferenceKind::Import,
            specifier: value.to_string(),
            span: Span::new(start, start + value.len()),
        });
    }
    if let Some((_, value)) = attribute(body, "no-default-lib") {
        file.no_default_lib |= value == "true";
    }
}

/// Value of `name="..."` (or single-quoted) in a directive, with the byte
/// offset of the value inside `text`.
fn attribute<'t>(text: &'t str, name: &str) -> Option<(usize, &'t str)> {
    let bytes = text.as_bytes();
    let mut search = 0;
    while let Some(found) = text[search..].find(name) {
        let at = search + found;
        search = at + name.len();
        let preceded_by_space = at > 0 && bytes[at - 1].is_ascii_whitespace();
        if !preceded_by_space {
            continue;
        }
        let rest = &text[search..];
        let after_eq = match rest.trim_start().strip_prefix('=') {
            Some(after) => after.trim_start(),
            None => continue,
        };
        let Some(quote) = after_eq.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            continue;
        };
        let value_start = text.len() - after_eq.len() + 1;
        let value_len = text[value_start..].find(quote)?;
        return Some((value_start, &text[value_start..value_start + value_len]));
    }
    None
}

fn collect_imports(tokens: &[Token], references: &mut Vec<Reference>) {
    let kind_at = |i: usize| tokens.get(i).map_or(TokenKind::Eof, |t| t.kind);

    for (i, token) in tokens.iter().enumerate() {
        let after_dot = i > 0 && matches!(kind_at(i - 1), TokenKind::Dot | TokenKind::QuestionDot);
        if after_dot {
            continue;
        }
        match token.kind {
            TokenKind::Import => match kind_at(i + 1) {
                // import("x")
                TokenKind::LParen => {
                    if kind_at(i + 2) == TokenKind::StringLiteral {
                        push_import(references, &tokens[i + 2]);
                    }
                }
                // import "x"
                TokenKind::StringLiteral => push_import(references, &tokens[i + 1]),
                // import.meta
                TokenKind::Dot => {}
                _ => {
                    if let Some(specifier) = import_clause_source(tokens, i + 1) {
                        push_import(references, specifier);
                    }
                }
            },
            TokenKind::Export => {
                if let Some(specifier) = export_clause_source(tokens, i + 1) {
                    push_import(references, specifier);
                }
            }
            _ => {}
        }
    }
}

fn push_import(references: &mut Vec<Reference>, literal: &Token) {
    references.push(Reference {
        kind: ReferenceKind::Import,
        specifier: literal.value.clone(),
        span: unquoted(literal.span),
    });
}

fn unquoted(span: Span) -> Span {
    if span.len() >= 2 {
        Span::new(span.start + 1, span.end - 1)
    } else {
        span
    }
}

/// `from "x"` or `= require("x")` after an `import` keyword.
fn import_clause_source(tokens: &[Token], start: usize) -> Option<&Token> {
    let mut i = start;
    while let Some(token) = tokens.get(i) {
        match token.kind {
            TokenKind::From => {
                let next = tokens.get(i + 1)?;
                if next.kind == TokenKind::StringLiteral {
                    return Some(next);
                }
            }
            TokenKind::Eq => {
                let is_require = tokens.get(i + 1).map(|t| t.kind) == Some(TokenKind::Require)
                    && tokens.get(i + 2).map(|t| t.kind) == Some(TokenKind::LParen);
                let literal = tokens.get(i + 3)?;
                return (is_require && literal.kind == TokenKind::StringLiteral).then_some(literal);
            }
            TokenKind::Semicolon
            | TokenKind::Eof
            | TokenKind::Import
            | TokenKind::Export
            | TokenKind::LParen => return None,
            _ => {}
        }
        i += 1;
    }
    None
}

/// `from "x"` after `export *`, `export * as ns`, `export { .. }` or
/// `export type { .. }`.
fn export_clause_source(tokens: &[Token], start: usize) -> Option<&Token> {
    let mut i = start;
    if tokens.get(i)?.kind == TokenKind::Type && tokens.get(i + 1)?.kind == TokenKind::LBrace {
        i += 1;
    }
    match tokens.get(i)?.kind {
        TokenKind::Star => {
            i += 1;
            if tokens.get(i)?.kind == TokenKind::As {
                i += 2;
            }
        }
        TokenKind::LBrace => {
            let mut depth = 0usize;
            loop {
                match tokens.get(i)?.kind {
                    TokenKind::LBrace => depth += 1,
                    TokenKind::RBrace => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    TokenKind::Eof => return None,
                    _ => {}
                }
                i += 1;
            }
            i += 1;
        }
        _ => return None,
    }
    let from = tokens.get(i)?;
    let literal = tokens.get(i + 1)?;
    (from.kind == TokenKind::From && literal.kind == TokenKind::StringLiteral).then_some(literal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn specifiers(text: &str) -> Vec<(ReferenceKind, String)> {
        preprocess(text)
            .references
            .into_iter()
            .map(|r| (r.kind, r.specifier))
            .collect()
    }

    #[test]
    fn test_import_forms() {
        let source = r#"
import a from "./a";
import { b, c as d } from './b';
import * as e from "e";
import type { F } from "./types";
import "./side-effect";
import g = require("./g");
const h = await import("./h");
"#;
        let found: Vec<String> = specifiers(source).into_iter().map(|(_, s)| s).collect();
        assert_eq!(
            found,
            vec!["./a", "./b", "e", "./types", "./side-effect", "./g", "./h"]
        );
    }

    #[test]
    fn test_export_forms() {
        let source = r#"
export * from "./all";
export * as ns from "./ns";
export { x, y as z } from "./named";
export type { T } from "./t";
export { local };
export const value = 1;
export default function () {}
"#;
        let found: Vec<String> = specifiers(source).into_iter().map(|(_, s)| s).collect();
        assert_eq!(found, vec!["./all", "./ns", "./named", "./t"]);
    }

    #[test]
    fn test_reference_directives() {
        let source = "/// <reference path=\"./globals.d.ts\" />\n/// <reference types='node' />\n/// <reference no-default-lib=\"true\"/>\nimport x from './x';\n/// <reference path=\"ignored.d.ts\" />\n";
        let file = preprocess(source);

        assert_eq!(
            file.references.iter().map(|r| (r.kind, r.specifier.as_str())).collect::<Vec<_>>(),
            vec![
                (ReferenceKind::Directive, "./globals.d.ts"),
                (ReferenceKind::Import, "node"),
                (ReferenceKind::Import, "./x"),
            ]
        );
        assert!(file.no_default_lib);

        let span = file.references[0].span;
        assert_eq!(&source[span.start..span.end], "./globals.d.ts");
    }

    #[test]
    fn test_spans_point_at_specifier() {
        let source = "import { a } from './dep';";
        let file = preprocess(source);
        let span = file.references[0].span;
        assert_eq!(&source[span.start..span.end], "./dep");
    }

    #[test]
    fn test_ignores_non_imports() {
        let source = r#"
const s = "import x from './not-real'";
// import y from './commented';
obj.import("./member");
const meta = import.meta.url;
function f(from: string) { return from; }
"#;
        assert!(specifiers(source).is_empty());
    }
}
