//! JavaScript emission by type erasure.
//!
//! The emitter never re-prints the program. It records edits against the
//! source text: type-only tokens are erased, and under CommonJS the
//! `import`/`export` statements are rewritten in place. An erased range
//! keeps its line breaks, so line `n` of the output comes from line `n` of
//! the input and the source map can be line-to-line.

use std::collections::HashSet;

use tsincr_lexer::TokenKind;

use super::syntax::Tokens;
use crate::options::{ModuleKind, ScriptTarget};

const ES_MODULE_MARKER: &str =
    "\"use strict\"; Object.defineProperty(exports, \"__esModule\", { value: true }); ";

pub(crate) fn emit_javascript(t: Tokens<'_>, module: ModuleKind, target: ScriptTarget) -> String {
    let mut emitter = Emitter::new(t, module, target);
    emitter.run();
    emitter.finish()
}

#[derive(Debug)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

struct Specifier {
    /// First and one-past-last token, trailing comma included.
    first: usize,
    last: usize,
    name: usize,
    alias: Option<usize>,
    type_only: bool,
}

struct Emitter<'a> {
    t: Tokens<'a>,
    commonjs: bool,
    decl: &'static str,
    /// Whether the target has destructuring declarations (ES2015+).
    destructuring: bool,
    /// Brace and paren nesting before each token.
    depth: Vec<u32>,
    consumed: Vec<bool>,
    edits: Vec<Edit>,
    class_bodies: HashSet<usize>,
    temps: usize,
}

impl<'a> Emitter<'a> {
    fn new(t: Tokens<'a>, module: ModuleKind, target: ScriptTarget) -> Self {
        let mut depth = Vec::with_capacity(t.tokens.len());
        let mut level = 0u32;
        for token in t.tokens {
            match token.kind {
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    level = level.saturating_sub(1);
                    depth.push(level);
                }
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                    depth.push(level);
                    level += 1;
                }
                _ => depth.push(level),
            }
        }
        Self {
            t,
            commonjs: !module.is_es_module(),
            decl: if target <= ScriptTarget::Es5 { "var" } else { "const" },
            destructuring: target > ScriptTarget::Es5,
            depth,
            consumed: vec![false; t.tokens.len()],
            edits: Vec::new(),
            class_bodies: HashSet::new(),
            temps: 0,
        }
    }

    fn run(&mut self) {
        if self.commonjs && self.t.is_module() {
            self.edits.push(Edit {
                start: 0,
                end: 0,
                text: ES_MODULE_MARKER.to_string(),
            });
        }
        let mut i = 0;
        while i < self.t.eof() {
            if self.consumed[i] {
                i += 1;
                continue;
            }
            i = self.visit(i).max(i + 1);
        }
    }

    fn finish(mut self) -> String {
        let text = self.t.text;
        self.edits.sort_by_key(|edit| (edit.start, edit.end));
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for edit in &self.edits {
            if edit.start < cursor {
                continue;
            }
            out.push_str(&text[cursor..edit.start]);
            out.push_str(&edit.text);
            let lines = text[edit.start..edit.end].matches('\n').count();
            out.extend(std::iter::repeat('\n').take(lines));
            cursor = edit.end;
        }
        out.push_str(&text[cursor..]);
        out
    }

    fn start_of(&self, i: usize) -> usize {
        self.t.token(i).map_or(self.t.text.len(), |token| token.span.start)
    }

    fn end_of(&self, i: usize) -> usize {
        self.t.token(i).map_or(self.t.text.len(), |token| token.span.end)
    }

    /// Erase tokens `[from, to)`, skipping those another edit already owns.
    fn erase(&mut self, from: usize, to: usize) {
        let to = to.min(self.t.eof());
        let mut run: Option<usize> = None;
        for i in from..=to {
            let free = i < to && !self.consumed[i];
            match (run, free) {
                (None, true) => run = Some(i),
                (Some(first), false) => {
                    self.edits.push(Edit {
                        start: self.start_of(first),
                        end: self.end_of(i - 1),
                        text: String::new(),
                    });
                    run = None;
                }
                _ => {}
            }
            if i < to {
                self.consumed[i] = true;
            }
        }
    }

    fn replace(&mut self, from: usize, to: usize, text: String) {
        let to = to.min(self.t.eof()).max(from + 1);
        self.edits.push(Edit {
            start: self.start_of(from),
            end: self.end_of(to - 1),
            text,
        });
        self.consume(from, to);
    }

    fn insert_after(&mut self, i: usize, text: String) {
        let at = self.end_of(i);
        self.edits.push(Edit {
            start: at,
            end: at,
            text,
        });
    }

    fn consume(&mut self, from: usize, to: usize) {
        let to = to.min(self.consumed.len());
        for slot in &mut self.consumed[from..to] {
            *slot = true;
        }
    }

    fn visit(&mut self, i: usize) -> usize {
        let t = self.t;
        let top_level = self.depth[i] == 0;
        let statement = t.at_statement_start(i);
        match t.kind(i) {
            TokenKind::Import
                if statement && top_level && !matches!(t.kind(i + 1), TokenKind::LParen | TokenKind::Dot) =>
            {
                self.import_declaration(i)
            }
            TokenKind::Export if statement && top_level => self.export_declaration(i),
            TokenKind::Interface if statement && t.kind(i + 1).is_identifier_like() => {
                let end = self.interface_end(i);
                self.erase(i, end);
                end
            }
            TokenKind::Type
                if statement
                    && t.kind(i + 1).is_identifier_like()
                    && matches!(t.kind(i + 2), TokenKind::Eq | TokenKind::Lt) =>
            {
                let end = self.type_alias_end(i);
                self.erase(i, end);
                end
            }
            TokenKind::Declare if statement && !t.newline_before(i + 1) && starts_declaration(t.kind(i + 1)) => {
                let end = t.statement_end(i);
                self.erase(i, end);
                end
            }
            TokenKind::Abstract if t.kind(i + 1) == TokenKind::Class => {
                self.erase(i, i + 1);
                i + 1
            }
            TokenKind::Function => match self.overload_end(i) {
                Some(end) if statement => {
                    self.erase(i, end);
                    end
                }
                _ => i + 1,
            },
            TokenKind::Class => {
                self.class_header(i);
                i + 1
            }
            TokenKind::LBrace if self.class_bodies.contains(&i) => {
                self.class_body(i);
                i + 1
            }
            TokenKind::LParen => {
                if t.is_parameter_list(i) {
                    self.parameters(i);
                }
                i + 1
            }
            TokenKind::Lt => self.type_arguments(i),
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                self.declarators(i);
                i + 1
            }
            TokenKind::As | TokenKind::Satisfies
                if i > 0 && t.can_end_statement(i - 1) && !t.newline_before(i) =>
            {
                let end = if t.kind(i + 1) == TokenKind::Const {
                    i + 2
                } else {
                    t.skip_type(i + 1)
                };
                self.erase(i, end);
                end
            }
            TokenKind::Bang if i > 0 && self.is_non_null_assertion(i) => {
                self.erase(i, i + 1);
                i + 1
            }
            _ => i + 1,
        }
    }

    /// `x!`, `f()!` and `a[0]!`, written without a space.
    fn is_non_null_assertion(&self, i: usize) -> bool {
        let prev = self.t.kind(i - 1);
        (prev.is_identifier_like() || matches!(prev, TokenKind::RParen | TokenKind::RBracket))
            && self.end_of(i - 1) == self.start_of(i)
    }

    fn interface_end(&self, i: usize) -> usize {
        let t = self.t;
        let mut k = i + 1;
        while k < t.eof() {
            match t.kind(k) {
                TokenKind::LBrace => return t.matching(k).map_or(t.eof(), |close| close + 1),
                TokenKind::Lt => k = t.matching_angle(k).map_or(k + 1, |close| close + 1),
                TokenKind::Semicolon => return k + 1,
                _ => k += 1,
            }
        }
        t.eof()
    }

    fn type_alias_end(&self, i: usize) -> usize {
        let t = self.t;
        let mut k = i + 2;
        if t.kind(k) == TokenKind::Lt {
            match t.matching_angle(k) {
                Some(close) => k = close + 1,
                None => return t.statement_end(i),
            }
        }
        if t.kind(k) != TokenKind::Eq {
            return t.statement_end(i);
        }
        let end = t.skip_type(k + 1);
        if t.kind(end) == TokenKind::Semicolon {
            end + 1
        } else {
            end
        }
    }

    /// End of a `function` declaration that has no body, if it is one.
    fn overload_end(&self, function: usize) -> Option<usize> {
        let t = self.t;
        let mut k = function + 1;
        if t.kind(k) == TokenKind::Star {
            k += 1;
        }
        if !t.kind(k).is_identifier_like() {
            return None;
        }
        k += 1;
        if t.kind(k) == TokenKind::Lt {
            k = t.matching_angle(k)? + 1;
        }
        if t.kind(k) != TokenKind::LParen {
            return None;
        }
        let close = t.matching(k)?;
        let after = if t.kind(close + 1) == TokenKind::Colon {
            t.skip_type(close + 2)
        } else {
            close + 1
        };
        match t.kind(after) {
            TokenKind::LBrace => None,
            TokenKind::Semicolon => Some(after + 1),
            _ => Some(after),
        }
    }

    /// Closing brace of the body of the function declared at `function`.
    fn function_body_close(&self, function: usize) -> Option<usize> {
        let t = self.t;
        let mut k = function + 1;
        while k < t.eof() {
            match t.kind(k) {
                TokenKind::LParen => {
                    let close = t.matching(k)?;
                    let after = if t.kind(close + 1) == TokenKind::Colon {
                        t.skip_type(close + 2)
                    } else {
                        close + 1
                    };
                    return (t.kind(after) == TokenKind::LBrace)
                        .then(|| t.matching(after))
                        .flatten();
                }
                TokenKind::Lt => k = t.matching_angle(k)? + 1,
                _ => k += 1,
            }
        }
        None
    }

    fn class_body_open(&self, class: usize) -> Option<usize> {
        let t = self.t;
        let mut k = class + 1;
        while k < t.eof() {
            match t.kind(k) {
                TokenKind::LBrace => return Some(k),
                TokenKind::Lt => k = t.matching_angle(k)? + 1,
                TokenKind::LParen | TokenKind::LBracket => k = t.matching(k)? + 1,
                TokenKind::Semicolon => return None,
                _ => k += 1,
            }
        }
        None
    }

    fn class_header(&mut self, class: usize) {
        let t = self.t;
        let mut k = class + 1;
        if t.kind(k).is_identifier_like() && t.kind(k) != TokenKind::Implements {
            k += 1;
        }
        if t.kind(k) == TokenKind::Lt {
            if let Some(close) = t.matching_angle(k) {
                self.erase(k, close + 1);
                k = close + 1;
            }
        }
        if t.kind(k) == TokenKind::Extends {
            k += 1;
            loop {
                match t.kind(k) {
                    TokenKind::LBrace | TokenKind::Implements | TokenKind::Eof => break,
                    TokenKind::Lt => match t.matching_angle(k) {
                        Some(close) => {
                            self.erase(k, close + 1);
                            k = close + 1;
                        }
                        None => k += 1,
                    },
                    TokenKind::LParen | TokenKind::LBracket => {
                        k = t.matching(k).map_or(t.eof(), |close| close + 1)
                    }
                    _ => k += 1,
                }
            }
        }
        if t.kind(k) == TokenKind::Implements {
            let Some(open) = self.class_body_open(k) else {
                return;
            };
            self.erase(k, open);
            k = open;
        }
        if t.kind(k) == TokenKind::LBrace {
            self.class_bodies.insert(k);
        }
    }

    fn class_body(&mut self, open: usize) {
        let t = self.t;
        let Some(close) = t.matching(open) else {
            return;
        };
        let mut k = open + 1;
        while k < close {
            if t.kind(k) == TokenKind::Semicolon {
                k += 1;
                continue;
            }
            let end = self.member_end(k, close);
            self.class_member(k, end);
            k = end.max(k + 1);
        }
    }

    fn member_end(&self, start: usize, close: usize) -> usize {
        let t = self.t;
        let mut k = start;
        while k < close {
            match t.kind(k) {
                TokenKind::LBrace => return t.matching(k).map_or(close, |c| c + 1),
                TokenKind::Semicolon => return k + 1,
                TokenKind::LParen | TokenKind::LBracket => {
                    k = t.matching(k).map_or(close, |c| c + 1);
                }
                TokenKind::Lt => k = t.matching_angle(k).map_or(k + 1, |c| c + 1),
                _ => k += 1,
            }
            if k < close && t.newline_before(k) && t.can_end_statement(k - 1) && !t.continues_expression(k) {
                return k;
            }
        }
        close
    }

    fn class_member(&mut self, start: usize, end: usize) {
        let t = self.t;
        // a modifier is followed by the member name, not by `:`/`(`/`=`
        let is_modifier = |k: usize| {
            let next = t.kind(k + 1);
            next.is_identifier_like()
                || matches!(
                    next,
                    TokenKind::LBracket
                        | TokenKind::StringLiteral
                        | TokenKind::NumberLiteral
                        | TokenKind::Star
                        | TokenKind::Operator
                        | TokenKind::LBrace
                )
        };

        let mut k = start;
        let mut bodiless = false;
        loop {
            match t.kind(k) {
                kind if (kind.is_access_modifier() || kind == TokenKind::Override) && is_modifier(k) => {
                    self.erase(k, k + 1);
                }
                TokenKind::Abstract | TokenKind::Declare if is_modifier(k) => bodiless = true,
                TokenKind::Static | TokenKind::Async if is_modifier(k) => {}
                TokenKind::Identifier
                    if matches!(t.value(k), "get" | "set") && is_modifier(k) && t.kind(k + 1) != TokenKind::LBrace => {}
                _ => break,
            }
            k += 1;
        }
        if bodiless {
            self.erase(start, end);
            return;
        }
        if t.kind(k) == TokenKind::LBracket
            && t.kind(k + 1).is_identifier_like()
            && t.kind(k + 2) == TokenKind::Colon
        {
            // index signature
            self.erase(start, end);
            return;
        }

        if t.kind(k) == TokenKind::Star {
            k += 1;
        }
        match t.kind(k) {
            TokenKind::LBracket => k = t.matching(k).map_or(end, |close| close + 1),
            TokenKind::Operator if t.value(k) == "#" => k += 2,
            kind if kind.is_identifier_like() || matches!(kind, TokenKind::StringLiteral | TokenKind::NumberLiteral) => {
                k += 1
            }
            _ => return,
        }
        if matches!(t.kind(k), TokenKind::Question | TokenKind::Bang) {
            self.erase(k, k + 1);
            k += 1;
        }
        match t.kind(k) {
            TokenKind::Colon => {
                let type_end = t.skip_type(k + 1).min(end);
                self.erase(k, type_end);
            }
            TokenKind::Lt | TokenKind::LParen => {
                let open = if t.kind(k) == TokenKind::Lt {
                    t.matching_angle(k).map_or(end, |close| close + 1)
                } else {
                    k
                };
                let Some(close) = (t.kind(open) == TokenKind::LParen).then(|| t.matching(open)).flatten() else {
                    return;
                };
                let after = if t.kind(close + 1) == TokenKind::Colon {
                    t.skip_type(close + 2)
                } else {
                    close + 1
                };
                if t.kind(after) != TokenKind::LBrace {
                    // overload signature
                    self.erase(start, end);
                }
            }
            _ => {}
        }
    }

    fn parameters(&mut self, open: usize) {
        let t = self.t;
        let Some(close) = t.matching(open) else {
            return;
        };
        let mut k = open + 1;
        let mut param_start = true;
        while k < close {
            if param_start {
                param_start = false;
                while (t.kind(k).is_access_modifier() || t.kind(k) == TokenKind::Override)
                    && (t.kind(k + 1).is_identifier_like()
                        || matches!(t.kind(k + 1), TokenKind::LBrace | TokenKind::LBracket))
                {
                    self.erase(k, k + 1);
                    k += 1;
                }
                if t.is_word(k, "this") && t.kind(k + 1) == TokenKind::Colon {
                    let mut end = t.skip_type(k + 2).min(close);
                    if t.kind(end) == TokenKind::Comma {
                        end += 1;
                    }
                    self.erase(k, end);
                    k = end;
                    param_start = true;
                    continue;
                }
                if t.kind(k) == TokenKind::DotDotDot {
                    k += 1;
                }
                match t.kind(k) {
                    TokenKind::LBrace | TokenKind::LBracket => {
                        k = t.matching(k).map_or(close, |c| c + 1);
                    }
                    kind if kind.is_identifier_like() => k += 1,
                    _ => {}
                }
                if t.kind(k) == TokenKind::Question {
                    self.erase(k, k + 1);
                    k += 1;
                }
                if t.kind(k) == TokenKind::Colon {
                    let end = t.skip_type(k + 1).min(close);
                    self.erase(k, end);
                    k = end;
                }
                continue;
            }
            match t.kind(k) {
                TokenKind::Comma => {
                    param_start = true;
                    k += 1;
                }
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                    k = t.matching(k).map_or(close, |c| c + 1);
                }
                _ => k += 1,
            }
        }
        if t.kind(close + 1) == TokenKind::Colon {
            let end = t.skip_type(close + 2);
            self.erase(close + 1, end);
        }
    }

    /// `f<T>(..)`, `new Map<K, V>()` and `<T>(x: T) => x`.
    fn type_arguments(&mut self, open: usize) -> usize {
        let t = self.t;
        let prev_ok = open > 0
            && (t.kind(open - 1).is_identifier_like()
                || matches!(
                    t.kind(open - 1),
                    TokenKind::Function
                        | TokenKind::Eq
                        | TokenKind::LParen
                        | TokenKind::Comma
                        | TokenKind::Arrow
                        | TokenKind::Colon
                        | TokenKind::Question
                        | TokenKind::Return
                ));
        if !prev_ok {
            return open + 1;
        }
        match t.matching_angle(open) {
            Some(close) if t.kind(close + 1) == TokenKind::LParen => {
                self.erase(open, close + 1);
                close + 1
            }
            _ => open + 1,
        }
    }

    fn declarators(&mut self, keyword: usize) {
        let t = self.t;
        let stop = t.statement_end(keyword);
        let mut k = keyword + 1;
        let mut expect_name = true;
        while k < stop {
            if expect_name {
                expect_name = false;
                match t.kind(k) {
                    TokenKind::LBrace | TokenKind::LBracket => {
                        k = t.matching(k).map_or(stop, |c| c + 1);
                    }
                    kind if kind.is_identifier_like() => k += 1,
                    _ => continue,
                }
                if t.kind(k) == TokenKind::Bang {
                    self.erase(k, k + 1);
                    k += 1;
                }
                if t.kind(k) == TokenKind::Colon {
                    let end = t.skip_type(k + 1).min(stop);
                    self.erase(k, end);
                    k = end;
                }
                continue;
            }
            match t.kind(k) {
                TokenKind::Comma => {
                    expect_name = true;
                    k += 1;
                }
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                    k = t.matching(k).map_or(stop, |c| c + 1);
                }
                _ => k += 1,
            }
        }
    }

    /// Specifiers between the braces at `open` and `close`.
    fn specifiers(&self, open: usize, close: usize) -> Vec<Specifier> {
        let t = self.t;
        let mut specifiers = Vec::new();
        let mut first = open + 1;
        while first < close {
            let mut last = first;
            while last < close && t.kind(last) != TokenKind::Comma {
                last += 1;
            }
            let len = last - first;
            let type_only = t.kind(first) == TokenKind::Type
                && len >= 2
                && !(len == 3 && t.kind(first + 1) == TokenKind::As);
            let name = first + usize::from(type_only);
            let alias = (t.kind(name + 1) == TokenKind::As && name + 2 < last).then_some(name + 2);
            if len > 0 {
                specifiers.push(Specifier {
                    first,
                    last: if last < close { last + 1 } else { last },
                    name,
                    alias,
                    type_only,
                });
            }
            first = last + 1;
        }
        specifiers
    }

    fn erase_type_specifiers(&mut self, specifiers: &[Specifier]) {
        for specifier in specifiers.iter().filter(|s| s.type_only) {
            self.erase(specifier.first, specifier.last);
        }
    }

    fn temp_name(&mut self, source: usize) -> String {
        self.temps += 1;
        let specifier = self.t.value(source);
        let base = specifier.rsplit('/').next().unwrap_or(specifier);
        let base = base.split('.').next().unwrap_or(base);
        let mut name: String = base
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
            .collect();
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            name.insert(0, '_');
        }
        format!("{name}_{}", self.temps)
    }

    fn import_declaration(&mut self, i: usize) -> usize {
        let t = self.t;
        let end = t.statement_end(i);
        let mut k = i + 1;

        let type_only = t.kind(k) == TokenKind::Type
            && !(t.kind(k + 1) == TokenKind::From && t.kind(k + 2) == TokenKind::StringLiteral)
            && !matches!(t.kind(k + 1), TokenKind::Comma | TokenKind::Eq);
        if type_only {
            self.erase(i, end);
            return end;
        }

        // import x = require("m") / import x = A.B
        if t.kind(k).is_identifier_like() && t.kind(k + 1) == TokenKind::Eq {
            let is_require = t.kind(k + 2) == TokenKind::Require
                && t.kind(k + 3) == TokenKind::LParen
                && t.kind(k + 4) == TokenKind::StringLiteral;
            if self.commonjs && is_require {
                let text = format!("{} {} = require({});", self.decl, t.value(k), t.source(k + 4));
                self.replace(i, end, text);
            } else {
                let decl = self.decl.to_string();
                self.replace(i, i + 1, decl);
                self.consume(i, k + 2);
            }
            return end;
        }

        let mut default = None;
        let mut namespace = None;
        let mut specifiers = Vec::new();
        let mut source = None;
        if t.kind(k) == TokenKind::StringLiteral {
            source = Some(k);
        } else {
            if t.kind(k).is_identifier_like() && !(t.kind(k) == TokenKind::From && t.kind(k + 1) == TokenKind::StringLiteral) {
                default = Some(k);
                k += 1;
                if t.kind(k) == TokenKind::Comma {
                    k += 1;
                }
            }
            if t.kind(k) == TokenKind::Star && t.kind(k + 1) == TokenKind::As {
                namespace = Some(k + 2);
                k += 3;
            }
            if t.kind(k) == TokenKind::LBrace {
                let close = t.matching(k).unwrap_or(end);
                specifiers = self.specifiers(k, close);
                k = close + 1;
            }
            if t.kind(k) == TokenKind::From && t.kind(k + 1) == TokenKind::StringLiteral {
                source = Some(k + 1);
            }
        }

        if !self.commonjs {
            self.erase_type_specifiers(&specifiers);
            self.consume(i, end);
            return end;
        }
        let Some(source) = source else {
            self.consume(i, end);
            return end;
        };

        let decl = self.decl;
        let destructuring = self.destructuring;
        let require = format!("require({})", t.source(source));
        // (imported name, local name)
        let named: Vec<(&str, &str)> = specifiers
            .iter()
            .filter(|s| !s.type_only)
            .map(|s| (t.value(s.name), t.value(s.alias.unwrap_or(s.name))))
            .collect();
        let destructure = |from: &str| {
            if destructuring {
                let fields: Vec<String> = named
                    .iter()
                    .map(|(name, local)| if name == local { name.to_string() } else { format!("{name}: {local}") })
                    .collect();
                format!("{decl} {{ {} }} = {from};", fields.join(", "))
            } else {
                // ES5: one binding per name, read off the module object
                let fields: Vec<String> = named
                    .iter()
                    .map(|(name, local)| format!("{local} = {from}.{name}"))
                    .collect();
                format!("{decl} {};", fields.join(", "))
            }
        };

        let bindings = usize::from(default.is_some()) + usize::from(namespace.is_some()) + usize::from(!named.is_empty());
        let text = match (default, namespace) {
            _ if bindings == 0 => format!("{require};"),
            (Some(default), None) if named.is_empty() => {
                format!("{decl} {} = {require}.default;", t.value(default))
            }
            (None, Some(namespace)) if named.is_empty() => {
                format!("{decl} {} = {require};", t.value(namespace))
            }
            (None, None) if destructuring => destructure(&require),
            (default, namespace) => {
                let temp = self.temp_name(source);
                let mut parts = vec![format!("{decl} {temp} = {require};")];
                if let Some(default) = default {
                    parts.push(format!("{decl} {} = {temp}.default;", t.value(default)));
                }
                if let Some(namespace) = namespace {
                    parts.push(format!("{decl} {} = {temp};", t.value(namespace)));
                }
                if !named.is_empty() {
                    parts.push(destructure(&temp));
                }
                parts.join(" ")
            }
        };
        self.replace(i, end, text);
        end
    }

    fn export_declaration(&mut self, i: usize) -> usize {
        let t = self.t;
        let next = i + 1;

        // type-level exports disappear under every module kind
        match t.kind(next) {
            TokenKind::Type if matches!(t.kind(next + 1), TokenKind::LBrace | TokenKind::Star) => {
                let end = t.statement_end(i);
                self.erase(i, end);
                return end;
            }
            TokenKind::Type if t.kind(next + 1).is_identifier_like() => {
                let end = self.type_alias_end(next);
                self.erase(i, end);
                return end;
            }
            TokenKind::Interface => {
                let end = self.interface_end(next);
                self.erase(i, end);
                return end;
            }
            TokenKind::Default if t.kind(next + 1) == TokenKind::Interface => {
                let end = self.interface_end(next + 1);
                self.erase(i, end);
                return end;
            }
            TokenKind::Declare => {
                let end = t.statement_end(i);
                self.erase(i, end);
                return end;
            }
            _ => {}
        }
        let function = match t.kind(next) {
            TokenKind::Function => Some(next),
            TokenKind::Async if t.kind(next + 1) == TokenKind::Function => Some(next + 1),
            _ => None,
        };
        if let Some(end) = function.and_then(|f| self.overload_end(f)) {
            self.erase(i, end);
            return end;
        }

        if !self.commonjs {
            if matches!(t.kind(next), TokenKind::LBrace | TokenKind::Star) {
                let end = t.statement_end(i);
                if t.kind(next) == TokenKind::LBrace {
                    let close = t.matching(next).unwrap_or(end);
                    let specifiers = self.specifiers(next, close);
                    self.erase_type_specifiers(&specifiers);
                }
                self.consume(i, end);
                return end;
            }
            return next;
        }

        match t.kind(next) {
            TokenKind::Const | TokenKind::Let | TokenKind::Var => {
                let stop = t.statement_end(next);
                let names = super::declarations::declarator_names(&t, next + 1, stop, super::declarations::BindingKind::Var);
                self.erase(i, next);
                let assignments: String = names
                    .iter()
                    .map(|binding| format!(" exports.{0} = {0};", binding.name))
                    .collect();
                self.insert_after(stop - 1, assignments);
                next
            }
            TokenKind::Function | TokenKind::Async => {
                let function = function.unwrap_or(next);
                self.erase(i, next);
                let name = function + 1 + usize::from(t.kind(function + 1) == TokenKind::Star);
                if let Some(close) = self.function_body_close(function) {
                    self.insert_after(close, format!(" exports.{0} = {0};", t.value(name)));
                }
                next
            }
            TokenKind::Class | TokenKind::Abstract => {
                let class = if t.kind(next) == TokenKind::Abstract { next + 1 } else { next };
                self.erase(i, next);
                if let Some(close) = self.class_body_open(class).and_then(|open| t.matching(open)) {
                    self.insert_after(close, format!(" exports.{0} = {0};", t.value(class + 1)));
                }
                next
            }
            TokenKind::Default => self.export_default(i),
            TokenKind::Eq => {
                self.replace(i, next + 1, "module.exports =".to_string());
                next + 1
            }
            TokenKind::LBrace => {
                let end = t.statement_end(i);
                let close = t.matching(next).unwrap_or(end);
                let specifiers = self.specifiers(next, close);
                let source = (t.kind(close + 1) == TokenKind::From && t.kind(close + 2) == TokenKind::StringLiteral)
                    .then_some(close + 2);
                let values: Vec<(&str, &str)> = specifiers
                    .iter()
                    .filter(|s| !s.type_only)
                    .map(|s| (t.value(s.name), s.alias.map_or(t.value(s.name), |a| t.value(a))))
                    .collect();
                let text = match source {
                    Some(source) if values.is_empty() => format!("require({});", t.source(source)),
                    Some(source) => {
                        let temp = self.temp_name(source);
                        let mut parts = vec![format!("{} {temp} = require({});", self.decl, t.source(source))];
                        parts.extend(values.iter().map(|(local, exported)| format!("exports.{exported} = {temp}.{local};")));
                        parts.join(" ")
                    }
                    None => values
                        .iter()
                        .map(|(local, exported)| format!("exports.{exported} = {local};"))
                        .collect::<Vec<_>>()
                        .join(" "),
                };
                self.replace(i, end, text);
                end
            }
            TokenKind::Star => {
                let end = t.statement_end(i);
                let Some(source) = (next..end).find(|&k| t.kind(k) == TokenKind::StringLiteral) else {
                    self.consume(i, end);
                    return end;
                };
                let require = format!("require({})", t.source(source));
                let text = if t.kind(next + 1) == TokenKind::As {
                    format!("exports.{} = {require};", t.value(next + 2))
                } else {
                    let temp = self.temp_name(source);
                    format!(
                        "{} {temp} = {require}; Object.keys({temp}).forEach(function (k) {{ if (k !== \"default\" && !Object.prototype.hasOwnProperty.call(exports, k)) exports[k] = {temp}[k]; }});",
                        self.decl
                    )
                };
                self.replace(i, end, text);
                end
            }
            _ => {
                self.erase(i, next);
                next
            }
        }
    }

    fn export_default(&mut self, i: usize) -> usize {
        let t = self.t;
        let value = i + 2;
        let (declaration, name) = match t.kind(value) {
            TokenKind::Function => (Some(value), value + 1 + usize::from(t.kind(value + 1) == TokenKind::Star)),
            TokenKind::Async if t.kind(value + 1) == TokenKind::Function => {
                (Some(value + 1), value + 2 + usize::from(t.kind(value + 2) == TokenKind::Star))
            }
            TokenKind::Class => (Some(value), value + 1),
            TokenKind::Abstract if t.kind(value + 1) == TokenKind::Class => (Some(value + 1), value + 2),
            _ => (None, value),
        };
        let named = declaration.is_some()
            && t.kind(name).is_identifier_like()
            && !matches!(t.kind(name), TokenKind::Implements);
        let close = declaration.and_then(|d| {
            if t.kind(d) == TokenKind::Class {
                self.class_body_open(d).and_then(|open| t.matching(open))
            } else {
                self.function_body_close(d)
            }
        });
        match close {
            Some(close) if named => {
                self.erase(i, value);
                self.insert_after(close, format!(" exports.default = {};", t.value(name)));
            }
            _ => self.replace(i, value, "exports.default =".to_string()),
        }
        value
    }
}

fn starts_declaration(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Var
            | TokenKind::Let
            | TokenKind::Const
            | TokenKind::Function
            | TokenKind::Class
            | TokenKind::Enum
            | TokenKind::Module
            | TokenKind::Namespace
            | TokenKind::Global
            | TokenKind::Abstract
            | TokenKind::Type
            | TokenKind::Interface
            | TokenKind::Async
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tsincr_lexer::Lexer;

    fn emit(text: &str, module: ModuleKind) -> String {
        let scanned = Lexer::scan(text);
        emit_javascript(Tokens::new(text, &scanned.tokens), module, ScriptTarget::Es5)
    }

    /// Non-empty lines with runs of whitespace collapsed.
    fn compact(text: &str) -> String {
        text.lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_erases_types() {
        let source = "interface Point {\n  x: number;\n}\ntype Id = string | number;\nexport function dist(p: Point, q?: Point): number {\n  const d: number = p.x as number;\n  return d!;\n}\n";
        let out = emit(source, ModuleKind::EsNext);

        assert_eq!(
            compact(&out),
            "export function dist(p, q) {\nconst d = p.x ;\nreturn d;\n}"
        );
        assert_eq!(out.lines().count(), source.lines().count());
    }

    #[test]
    fn test_commonjs_imports() {
        let source = "import def from \"./a\";\nimport * as ns from \"./b\";\nimport { x, y as z, type T } from \"./c\";\nimport d2, { w } from \"./d\";\nimport type { Only } from \"./e\";\nimport \"./side\";\nimport fs = require(\"fs\");\n";
        let out = emit(source, ModuleKind::CommonJs);

        assert_eq!(
            compact(&out),
            [
                "\"use strict\"; Object.defineProperty(exports, \"__esModule\", { value: true }); var def = require(\"./a\").default;",
                "var ns = require(\"./b\");",
                "var c_1 = require(\"./c\"); var x = c_1.x, z = c_1.y;",
                "var d_2 = require(\"./d\"); var d2 = d_2.default; var w = d_2.w;",
                "require(\"./side\");",
                "var fs = require(\"fs\");",
            ]
            .join("\n")
        );
        assert_eq!(out.lines().count(), source.lines().count());
    }

    #[test]
    fn test_named_imports_destructure_from_es2015() {
        let source = "import { x, y as z } from \"./c\";\nimport d2, { w } from \"./d\";\n";
        let scanned = Lexer::scan(source);
        let out = emit_javascript(Tokens::new(source, &scanned.tokens), ModuleKind::CommonJs, ScriptTarget::Es2015);

        let lines: Vec<String> = compact(&out).lines().map(str::to_string).collect();
        assert!(lines[0].ends_with("const { x, y: z } = require(\"./c\");"));
        assert_eq!(lines[1], "const d_1 = require(\"./d\"); const d2 = d_1.default; const { w } = d_1;");
    }

    #[test]
    fn test_commonjs_exports() {
        let source = "export const a = 1, b = 2;\nexport function f() {\n  return a;\n}\nexport class C {}\nexport default f;\nexport { a as alias };\nexport * from \"./m\";\nexport type { T } from \"./t\";\n";
        let out = emit(source, ModuleKind::CommonJs);
        let lines: Vec<String> = compact(&out).lines().map(str::to_string).collect();

        assert!(lines[0].ends_with("const a = 1, b = 2; exports.a = a; exports.b = b;"));
        assert_eq!(lines[1], "function f() {");
        assert_eq!(lines[3], "} exports.f = f;");
        assert_eq!(lines[4], "class C {} exports.C = C;");
        assert_eq!(lines[5], "exports.default = f;");
        assert_eq!(lines[6], "exports.alias = a;");
        assert!(lines[7].starts_with("var m_1 = require(\"./m\"); Object.keys(m_1).forEach("));
        assert_eq!(lines.len(), 8);
    }

    #[test]
    fn test_es_modules_keep_value_specifiers() {
        let out = emit(
            "import { a, type B } from \"./x\";\nexport { type B, a };\nexport default class {}\n",
            ModuleKind::EsNext,
        );

        assert_eq!(
            compact(&out),
            "import { a, } from \"./x\";\nexport { a };\nexport default class {}"
        );
    }

    #[test]
    fn test_class_members() {
        let source = "abstract class Base<T> implements Shape {\n  private readonly id: number = 1;\n  abstract area(): number;\n  constructor(public name: string) {}\n  get label(): string { return this.name; }\n}\n";
        let out = emit(source, ModuleKind::CommonJs);

        assert_eq!(
            compact(&out),
            "class Base {\nid = 1;\nconstructor( name) {}\nget label() { return this.name; }\n}"
        );
    }

    #[test]
    fn test_generics_and_overloads() {
        let out = emit(
            "const m = new Map<string, number>();\nconst r = f<number>(1);\nfunction g<T>(x: T): T { return x; }\nfunction h(a: string): string;\nfunction h(a: any) { return a; }\n",
            ModuleKind::CommonJs,
        );

        assert_eq!(
            compact(&out),
            "const m = new Map();\nconst r = f(1);\nfunction g(x) { return x; }\nfunction h(a) { return a; }"
        );
    }

    #[test]
    fn test_ambient_declarations_keep_line_count() {
        let source = "declare const VERSION: string;\ndeclare module \"x\" {\n  export const y: number;\n}\nlet v = VERSION;\n";
        let out = emit(source, ModuleKind::CommonJs);

        assert_eq!(compact(&out), "let v = VERSION;");
        assert_eq!(out.lines().count(), 5);
    }

    #[test]
    fn test_scripts_have_no_module_prologue() {
        assert_eq!(emit("let a = 1;", ModuleKind::CommonJs), "let a = 1;");
        assert_eq!(compact(&emit("const c = [1] as const;", ModuleKind::CommonJs)), "const c = [1] ;");
    }
}
