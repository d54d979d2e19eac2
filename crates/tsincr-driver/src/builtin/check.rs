//! Diagnostics of the built-in compiler.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tsincr_diagnostic::Diagnostic;
use tsincr_lexer::lexer::errors;
use tsincr_lexer::{Span, TokenKind};

use super::declarations::{declarator_names, BindingKind};
use super::syntax::Tokens;
use crate::options::{CompilerOptions, ModuleKind};

const NON_ERASABLE: &str = "This syntax is not allowed when 'erasableSyntaxOnly' is enabled.";

pub(crate) fn options_diagnostics(options: &CompilerOptions) -> Vec<Diagnostic> {
    match options.module {
        ModuleKind::Amd | ModuleKind::Umd | ModuleKind::System => vec![Diagnostic::error(
            6046,
            format!(
                "Argument for '--module' option must be: 'none', 'commonjs', 'es2015', 'esnext'. '{}' is not supported.",
                options.module
            ),
        )],
        _ => Vec::new(),
    }
}

/// Scanner errors and unbalanced brackets.
pub(crate) fn syntactic(path: &Path, text: &Arc<str>, t: &Tokens<'_>) -> Vec<Diagnostic> {
    let at = |code: u32, message: String, span: Span| {
        Diagnostic::error(code, message).in_file(path, text.clone(), span.start..span.end)
    };

    let mut diagnostics = Vec::new();
    let mut stack: Vec<(TokenKind, Span)> = Vec::new();
    let mut bracket_error = false;

    for token in t.tokens {
        match token.kind {
            TokenKind::Error => {
                let code = match token.value.as_str() {
                    errors::UNTERMINATED_STRING => 1002,
                    errors::UNTERMINATED_COMMENT => 1010,
                    errors::UNTERMINATED_TEMPLATE => 1160,
                    errors::UNTERMINATED_REGEX => 1161,
                    _ => 1127,
                };
                diagnostics.push(at(code, token.value.clone(), token.span));
            }
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                stack.push((token.kind, token.span));
            }
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace if !bracket_error => {
                match stack.pop() {
                    Some((open, _)) if closer(open) == token.kind => {}
                    Some((open, _)) => {
                        bracket_error = true;
                        diagnostics.push(at(1005, format!("'{}' expected.", closer_text(open)), token.span));
                    }
                    None => {
                        bracket_error = true;
                        diagnostics.push(at(1128, "Declaration or statement expected.".into(), token.span));
                    }
                }
            }
            TokenKind::Eof if !bracket_error => {
                if let Some((open, _)) = stack.last() {
                    diagnostics.push(at(1005, format!("'{}' expected.", closer_text(*open)), token.span));
                }
            }
            _ => {}
        }
    }
    diagnostics
}

fn closer(open: TokenKind) -> TokenKind {
    match open {
        TokenKind::LParen => TokenKind::RParen,
        TokenKind::LBracket => TokenKind::RBracket,
        _ => TokenKind::RBrace,
    }
}

fn closer_text(open: TokenKind) -> &'static str {
    match open {
        TokenKind::LParen => ")",
        TokenKind::LBracket => "]",
        _ => "}",
    }
}

/// Redeclared block-scoped variables and syntax that cannot be erased.
///
/// `ambient` holds the globals of the bundled lib and of the files the
/// checked file depends on; it only applies when the file is a script.
pub(crate) fn semantic(
    path: &Path,
    text: &Arc<str>,
    t: &Tokens<'_>,
    is_declaration: bool,
    ambient: &HashMap<String, BindingKind>,
) -> Vec<Diagnostic> {
    let at = |code: u32, message: String, span: Span| {
        Diagnostic::error(code, message).in_file(path, text.clone(), span.start..span.end)
    };
    let mut diagnostics = Vec::new();

    let redeclared = |name: &str| format!("Cannot redeclare block-scoped variable '{name}'.");
    let check_ambient = !t.is_module();
    for scope in block_scopes(t) {
        let mut seen: HashMap<&str, Vec<Span>> = HashMap::new();
        for (name, span) in &scope.names {
            seen.entry(name.as_str()).or_default().push(*span);
        }
        let mut reported: Vec<(Span, String)> = Vec::new();
        for (name, spans) in &seen {
            if spans.len() > 1 || (scope.top_level && check_ambient && ambient.contains_key(*name)) {
                reported.extend(spans.iter().map(|span| (*span, name.to_string())));
            }
        }
        reported.sort_by_key(|(span, _)| span.start);
        for (span, name) in reported {
            diagnostics.push(at(2451, redeclared(&name), span));
        }
    }

    if !is_declaration {
        for span in non_erasable(t) {
            diagnostics.push(at(1294, NON_ERASABLE.to_string(), span));
        }
    }
    diagnostics
}

struct Scope {
    top_level: bool,
    names: Vec<(String, Span)>,
    /// Open parentheses and brackets inside this scope.
    nesting: usize,
}

/// `let`/`const` names per brace scope. Declarations inside parentheses
/// (`for (const x of ..)`) are not collected.
fn block_scopes(t: &Tokens<'_>) -> Vec<Scope> {
    let mut done = Vec::new();
    let mut stack = vec![Scope {
        top_level: true,
        names: Vec::new(),
        nesting: 0,
    }];

    let mut i = 0;
    while i < t.tokens.len() {
        match t.kind(i) {
            TokenKind::LBrace => stack.push(Scope {
                top_level: false,
                names: Vec::new(),
                nesting: 0,
            }),
            TokenKind::RBrace if stack.len() > 1 => {
                if let Some(scope) = stack.pop() {
                    done.push(scope);
                }
            }
            TokenKind::LParen | TokenKind::LBracket => {
                if let Some(scope) = stack.last_mut() {
                    scope.nesting += 1;
                }
            }
            TokenKind::RParen | TokenKind::RBracket => {
                if let Some(scope) = stack.last_mut() {
                    scope.nesting = scope.nesting.saturating_sub(1);
                }
            }
            kind @ (TokenKind::Let | TokenKind::Const) if t.kind(i + 1).is_identifier_like() => {
                let nested = stack.last().is_some_and(|scope| scope.nesting > 0);
                if !nested {
                    let binding_kind = if kind == TokenKind::Let {
                        BindingKind::Let
                    } else {
                        BindingKind::Const
                    };
                    let stop = t.statement_end(i);
                    if let Some(scope) = stack.last_mut() {
                        for binding in declarator_names(t, i + 1, stop, binding_kind) {
                            scope.names.push((binding.name, binding.span));
                        }
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    done.extend(stack);
    done
}

/// `enum`, namespaces holding values, and parameter properties.
fn non_erasable(t: &Tokens<'_>) -> Vec<Span> {
    let mut spans = Vec::new();
    let span_of = |i: usize| t.token(i).map(|token| token.span).unwrap_or_default();
    let ambient_before = |i: usize| {
        (i > 0 && t.kind(i - 1) == TokenKind::Declare)
            || (i > 1 && t.kind(i - 1) == TokenKind::Const && t.kind(i - 2) == TokenKind::Declare)
            || (i > 1 && t.kind(i - 1) == TokenKind::Export && t.kind(i - 2) == TokenKind::Declare)
    };
    let after_dot = |i: usize| i > 0 && matches!(t.kind(i - 1), TokenKind::Dot | TokenKind::QuestionDot);

    let mut i = 0;
    while i < t.tokens.len() {
        match t.kind(i) {
            TokenKind::Enum if !after_dot(i) && t.kind(i + 1).is_identifier_like() && !ambient_before(i) => {
                spans.push(span_of(i));
            }
            TokenKind::Namespace | TokenKind::Module
                if !after_dot(i) && t.kind(i + 1).is_identifier_like() && !ambient_before(i) =>
            {
                let mut open = i + 2;
                while t.kind(open) == TokenKind::Dot && t.kind(open + 1).is_identifier_like() {
                    open += 2;
                }
                if t.kind(open) == TokenKind::LBrace {
                    let close = t.matching(open).unwrap_or(t.eof());
                    let holds_values = (open + 1..close).any(|k| {
                        matches!(
                            t.kind(k),
                            TokenKind::Var
                                | TokenKind::Let
                                | TokenKind::Const
                                | TokenKind::Function
                                | TokenKind::Class
                                | TokenKind::Enum
                        )
                    });
                    if holds_values {
                        spans.push(span_of(i));
                    }
                    i = close;
                }
            }
            TokenKind::Identifier if t.value(i) == "constructor" && t.kind(i + 1) == TokenKind::LParen => {
                let open = i + 1;
                let close = t.matching(open).unwrap_or(t.eof());
                let mut k = open + 1;
                let mut param_start = true;
                while k < close {
                    match t.kind(k) {
                        kind if param_start && (kind.is_access_modifier() || kind == TokenKind::Override) => {
                            spans.push(span_of(k));
                            param_start = false;
                        }
                        TokenKind::Comma => param_start = true,
                        TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                            param_start = false;
                            k = t.matching(k).unwrap_or(close);
                        }
                        _ => param_start = false,
                    }
                    k += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsincr_lexer::Lexer;

    fn run(text: &str, ambient: &[&str]) -> Vec<(u32, usize)> {
        let text: Arc<str> = Arc::from(text);
        let scanned = Lexer::scan(&text);
        let t = Tokens::new(&text, &scanned.tokens);
        let ambient: HashMap<String, BindingKind> = ambient
            .iter()
            .map(|name| (name.to_string(), BindingKind::Var))
            .collect();
        let mut found: Vec<Diagnostic> = syntactic(Path::new("/p/a.ts"), &text, &t);
        found.extend(semantic(Path::new("/p/a.ts"), &text, &t, false, &ambient));
        found.iter().map(|d| (d.code, d.start)).collect()
    }

    #[test]
    fn test_scanner_errors() {
        assert_eq!(run("let s = 'abc\n", &[]), vec![(1002, 8)]);
        assert_eq!(run("let a = 1; /* open", &[]), vec![(1010, 11)]);
    }

    #[test]
    fn test_bracket_balance() {
        assert_eq!(run("function f() {\n  return (1;\n}", &[]), vec![(1005, 28)]);
        assert_eq!(run("let a = 1;\n}", &[]), vec![(1128, 11)]);
        assert_eq!(run("if (a) {", &[]), vec![(1005, 8)]);
    }

    #[test]
    fn test_redeclared_in_same_scope() {
        let found = run("let a = 1;\nconst a = 2;\n{ let a = 3; }\nfor (const a of []) {}", &[]);
        assert_eq!(found, vec![(2451, 4), (2451, 17)]);
    }

    #[test]
    fn test_redeclared_against_ambient_globals() {
        assert_eq!(run("const NaN = 1;", &["NaN"]), vec![(2451, 6)]);
        // modules have their own scope
        assert!(run("export const NaN = 1;", &["NaN"]).is_empty());
    }

    #[test]
    fn test_non_erasable_syntax() {
        let found = run(
            "enum Color { Red }\ndeclare enum Ambient { A }\nnamespace Types { export type T = 1; }\nnamespace Values { export const v = 1; }\nclass P { constructor(private x: number, y: number) {} }",
            &[],
        );
        let codes: Vec<u32> = found.iter().map(|(code, _)| *code).collect();
        assert_eq!(codes, vec![1294, 1294, 1294]);
    }
}
