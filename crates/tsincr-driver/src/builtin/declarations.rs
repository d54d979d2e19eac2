//! Value declarations visible at the top level of a file.

use std::collections::HashMap;

use tsincr_lexer::{Span, TokenKind};

use super::syntax::Tokens;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindingKind {
    Var,
    Let,
    Const,
    Function,
    Class,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Binding {
    pub name: String,
    pub kind: BindingKind,
    pub span: Span,
}

/// Names a file adds to the global scope.
///
/// A script contributes all of its top-level bindings, a module only the
/// contents of its `declare global { }` blocks.
pub(crate) fn global_bindings(t: &Tokens<'_>) -> HashMap<String, BindingKind> {
    let is_module = t.is_module();
    let mut globals = HashMap::new();
    for binding in bindings_in(t, 0, t.eof(), !is_module) {
        globals.entry(binding.name).or_insert(binding.kind);
    }
    globals
}

/// `let`/`const`/`var`/`function`/`class` declarations directly in
/// `[start, end)`. Nested blocks are skipped except `declare global`.
/// Plain statements are only collected when `statements` is set.
pub(crate) fn bindings_in(t: &Tokens<'_>, start: usize, end: usize, statements: bool) -> Vec<Binding> {
    let mut bindings = Vec::new();
    let mut i = start;
    while i < end {
        let kind = t.kind(i);
        if kind == TokenKind::Declare && t.kind(i + 1) == TokenKind::Global && t.kind(i + 2) == TokenKind::LBrace {
            let close = t.matching(i + 2).unwrap_or(end);
            bindings.extend(bindings_in(t, i + 3, close, true));
            i = close + 1;
            continue;
        }
        match kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                i = t.matching(i).map_or(end, |close| close + 1);
                continue;
            }
            TokenKind::Var | TokenKind::Let | TokenKind::Const if statements => {
                let binding_kind = match kind {
                    TokenKind::Var => BindingKind::Var,
                    TokenKind::Let => BindingKind::Let,
                    _ => BindingKind::Const,
                };
                let stop = t.statement_end(i).min(end);
                bindings.extend(declarator_names(t, i + 1, stop, binding_kind));
                i = stop.max(i + 1);
                continue;
            }
            TokenKind::Function | TokenKind::Class if statements && t.kind(i + 1).is_identifier_like() => {
                let binding_kind = if kind == TokenKind::Function {
                    BindingKind::Function
                } else {
                    BindingKind::Class
                };
                push_name(&mut bindings, t, i + 1, binding_kind);
            }
            TokenKind::Function if statements && t.kind(i + 1) == TokenKind::Star && t.kind(i + 2).is_identifier_like() => {
                push_name(&mut bindings, t, i + 2, BindingKind::Function);
            }
            _ => {}
        }
        i += 1;
    }
    bindings
}

/// Simple identifiers declared by a declarator list in `[start, stop)`.
pub(crate) fn declarator_names(t: &Tokens<'_>, start: usize, stop: usize, kind: BindingKind) -> Vec<Binding> {
    let mut bindings = Vec::new();
    let mut expect_name = true;
    let mut i = start;
    while i < stop {
        match t.kind(i) {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                expect_name = false;
                i = t.matching(i).map_or(stop, |close| close + 1);
                continue;
            }
            TokenKind::Lt => {
                expect_name = false;
                if let Some(close) = t.matching_angle(i) {
                    i = close;
                }
            }
            TokenKind::Comma => expect_name = true,
            k if expect_name && k.is_identifier_like() => {
                push_name(&mut bindings, t, i, kind);
                expect_name = false;
            }
            _ => expect_name = false,
        }
        i += 1;
    }
    bindings
}

fn push_name(bindings: &mut Vec<Binding>, t: &Tokens<'_>, i: usize, kind: BindingKind) {
    if let Some(token) = t.token(i) {
        bindings.push(Binding {
            name: token.value.clone(),
            kind,
            span: token.span,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsincr_lexer::Lexer;

    fn globals(text: &str) -> HashMap<String, BindingKind> {
        let scanned = Lexer::scan(text);
        global_bindings(&Tokens::new(text, &scanned.tokens))
    }

    #[test]
    fn test_script_globals() {
        let found = globals(
            "declare var NaN: number;\ndeclare const VERSION: string, BUILD: number;\ndeclare function parseInt(s: string): number;\ninterface Point { x: number }\nfunction local() { let inner = 1; }",
        );

        assert_eq!(found.get("NaN"), Some(&BindingKind::Var));
        assert_eq!(found.get("VERSION"), Some(&BindingKind::Const));
        assert_eq!(found.get("BUILD"), Some(&BindingKind::Const));
        assert_eq!(found.get("parseInt"), Some(&BindingKind::Function));
        assert_eq!(found.get("local"), Some(&BindingKind::Function));
        assert!(!found.contains_key("Point"));
        assert!(!found.contains_key("inner"));
    }

    #[test]
    fn test_module_only_exports_declare_global() {
        let found = globals(
            "export declare const hidden: number;\ndeclare global {\n  const injected: string;\n}\n",
        );

        assert!(!found.contains_key("hidden"));
        assert_eq!(found.get("injected"), Some(&BindingKind::Const));
    }

    #[test]
    fn test_initializers_are_not_names() {
        let text = "let a = b, c = { d: 1 }, [e] = f;";
        let scanned = Lexer::scan(text);
        let t = Tokens::new(text, &scanned.tokens);
        let names: Vec<String> = bindings_in(&t, 0, t.eof(), true)
            .into_iter()
            .map(|binding| binding.name)
            .collect();

        assert_eq!(names, vec!["a", "c"]);
    }
}
