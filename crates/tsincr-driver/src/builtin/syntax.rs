//! Token-level navigation shared by the checker and the emitter.

use tsincr_lexer::{Token, TokenKind};

/// Names that look like calls when followed by `(` but open a block.
const CONTROL_WORDS: &[&str] = &["if", "while", "for", "switch", "with", "catch", "return", "await", "typeof", "void", "delete", "in", "of", "instanceof"];

/// A scanned file: its text and tokens, the last one being `Eof`.
#[derive(Clone, Copy)]
pub(crate) struct Tokens<'a> {
    pub text: &'a str,
    pub tokens: &'a [Token],
}

impl<'a> Tokens<'a> {
    pub fn new(text: &'a str, tokens: &'a [Token]) -> Self {
        Self { text, tokens }
    }

    pub fn eof(&self) -> usize {
        self.tokens.len().saturating_sub(1)
    }

    pub fn kind(&self, i: usize) -> TokenKind {
        self.tokens.get(i).map_or(TokenKind::Eof, |t| t.kind)
    }

    pub fn value(&self, i: usize) -> &'a str {
        self.tokens.get(i).map_or("", |t| t.value.as_str())
    }

    pub fn token(&self, i: usize) -> Option<&'a Token> {
        self.tokens.get(i)
    }

    /// Source text of token `i`, quotes included.
    pub fn source(&self, i: usize) -> &'a str {
        self.tokens
            .get(i)
            .and_then(|t| self.text.get(t.span.start..t.span.end))
            .unwrap_or("")
    }

    pub fn is_word(&self, i: usize, word: &str) -> bool {
        self.kind(i) == TokenKind::Identifier && self.value(i) == word
    }

    /// Whether a line break separates token `i` from the one before it.
    pub fn newline_before(&self, i: usize) -> bool {
        if i == 0 {
            return true;
        }
        match (self.tokens.get(i - 1), self.tokens.get(i)) {
            (Some(prev), Some(cur)) => self
                .text
                .get(prev.span.end..cur.span.start)
                .is_some_and(|gap| gap.contains('\n')),
            _ => true,
        }
    }

    /// Index of the bracket closing the `(`, `[` or `{` at `open`.
    pub fn matching(&self, open: usize) -> Option<usize> {
        let (opener, closer) = match self.kind(open) {
            TokenKind::LParen => (TokenKind::LParen, TokenKind::RParen),
            TokenKind::LBracket => (TokenKind::LBracket, TokenKind::RBracket),
            TokenKind::LBrace => (TokenKind::LBrace, TokenKind::RBrace),
            _ => return None,
        };
        let mut depth = 0usize;
        for i in open..self.tokens.len() {
            let kind = self.kind(i);
            if kind == opener {
                depth += 1;
            } else if kind == closer {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
        }
        None
    }

    /// Index of the `>` closing a type argument list at `open`. `None` when
    /// the tokens in between cannot be types.
    pub fn matching_angle(&self, open: usize) -> Option<usize> {
        if self.kind(open) != TokenKind::Lt {
            return None;
        }
        let mut depth = 0usize;
        let mut i = open;
        while i < self.tokens.len() {
            match self.kind(i) {
                TokenKind::Lt => depth += 1,
                TokenKind::Gt => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                    i = self.matching(i)?;
                }
                TokenKind::Semicolon
                | TokenKind::Eof
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::Bang
                | TokenKind::Operator => return None,
                _ => {}
            }
            i += 1;
        }
        None
    }

    /// Index just past the type starting at `i`.
    pub fn skip_type(&self, i: usize) -> usize {
        let mut i = i;
        if matches!(self.kind(i), TokenKind::Pipe | TokenKind::Amp) {
            i += 1;
        }
        loop {
            let next = self.skip_type_operand(i);
            if next == i {
                return i;
            }
            i = next;
            match self.kind(i) {
                TokenKind::Pipe | TokenKind::Amp => i += 1,
                TokenKind::Extends if !self.newline_before(i) => {
                    // conditional type
                    i = self.skip_type(i + 1);
                    if self.kind(i) != TokenKind::Question {
                        return i;
                    }
                    i = self.skip_type(i + 1);
                    if self.kind(i) != TokenKind::Colon {
                        return i;
                    }
                    return self.skip_type(i + 1);
                }
                _ => return i,
            }
        }
    }

    fn skip_type_operand(&self, start: usize) -> usize {
        let mut i = start;
        loop {
            match self.kind(i) {
                TokenKind::Keyof | TokenKind::Readonly | TokenKind::New => i += 1,
                TokenKind::Abstract if self.kind(i + 1) == TokenKind::New => i += 1,
                TokenKind::Identifier
                    if matches!(self.value(i), "unique" | "infer" | "asserts")
                        && self.kind(i + 1).is_identifier_like() =>
                {
                    i += 1
                }
                _ => break,
            }
        }

        match self.kind(i) {
            TokenKind::Typeof => {
                i = self.skip_dotted(i + 1);
            }
            TokenKind::LParen => {
                let Some(close) = self.matching(i) else {
                    return self.eof();
                };
                i = close + 1;
                if self.kind(i) == TokenKind::Arrow {
                    return self.skip_type(i + 1);
                }
            }
            TokenKind::Lt => {
                let Some(close) = self.matching_angle(i) else {
                    return start;
                };
                let Some(params_close) = self.matching(close + 1) else {
                    return start;
                };
                i = params_close + 1;
                if self.kind(i) == TokenKind::Arrow {
                    return self.skip_type(i + 1);
                }
            }
            TokenKind::LBrace | TokenKind::LBracket => {
                i = self.matching(i).map_or(self.eof(), |close| close + 1);
            }
            TokenKind::StringLiteral | TokenKind::NumberLiteral | TokenKind::TemplateLiteral => i += 1,
            TokenKind::TemplateHead => {
                while !matches!(self.kind(i), TokenKind::TemplateTail | TokenKind::Eof) {
                    i += 1;
                }
                i += 1;
            }
            TokenKind::Operator if self.value(i) == "-" && self.kind(i + 1) == TokenKind::NumberLiteral => {
                i += 2
            }
            kind if kind.is_identifier_like() => {
                i = self.skip_dotted(i);
                if self.kind(i) == TokenKind::Lt {
                    if let Some(close) = self.matching_angle(i) {
                        i = close + 1;
                    }
                }
                if self.is_word(i, "is") && !self.newline_before(i) {
                    return self.skip_type(i + 1);
                }
            }
            _ => return start,
        }

        // array and indexed access types
        while self.kind(i) == TokenKind::LBracket && !self.newline_before(i) {
            match self.matching(i) {
                Some(close) => i = close + 1,
                None => return self.eof(),
            }
        }
        i
    }

    fn skip_dotted(&self, mut i: usize) -> usize {
        if !self.kind(i).is_identifier_like() {
            return i;
        }
        i += 1;
        while self.kind(i) == TokenKind::Dot && self.kind(i + 1).is_identifier_like() {
            i += 2;
        }
        i
    }

    /// Whether token `i` can be the last token of an expression statement.
    pub fn can_end_statement(&self, i: usize) -> bool {
        let kind = self.kind(i);
        kind.is_identifier_like()
            || matches!(
                kind,
                TokenKind::StringLiteral
                    | TokenKind::NumberLiteral
                    | TokenKind::RegexLiteral
                    | TokenKind::TemplateLiteral
                    | TokenKind::TemplateTail
                    | TokenKind::RParen
                    | TokenKind::RBracket
                    | TokenKind::RBrace
            )
            || (kind == TokenKind::Operator && matches!(self.value(i), "++" | "--"))
    }

    /// Whether token `i` can start a new statement after a line break.
    pub fn continues_expression(&self, i: usize) -> bool {
        matches!(
            self.kind(i),
            TokenKind::Dot
                | TokenKind::QuestionDot
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::Operator
                | TokenKind::Arrow
                | TokenKind::Comma
                | TokenKind::Question
                | TokenKind::Colon
                | TokenKind::Eq
                | TokenKind::Pipe
                | TokenKind::Amp
                | TokenKind::Star
                | TokenKind::Lt
                | TokenKind::Gt
                | TokenKind::As
                | TokenKind::Satisfies
                | TokenKind::Extends
                | TokenKind::Implements
                | TokenKind::TemplateLiteral
                | TokenKind::TemplateHead
        )
    }

    /// Index just past the statement starting at `start`: after its `;`, or
    /// at the first line break where automatic semicolon insertion applies.
    pub fn statement_end(&self, start: usize) -> usize {
        let mut depth = 0usize;
        let mut i = start;
        loop {
            match self.kind(i) {
                TokenKind::Eof => return i,
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if depth == 0 {
                        return i;
                    }
                    depth -= 1;
                }
                TokenKind::Semicolon if depth == 0 => return i + 1,
                _ => {}
            }
            i += 1;
            if depth == 0
                && self.newline_before(i)
                && self.can_end_statement(i - 1)
                && !self.continues_expression(i)
            {
                return i;
            }
        }
    }

    /// Whether token `i` begins a statement.
    pub fn at_statement_start(&self, i: usize) -> bool {
        if i == 0 {
            return true;
        }
        matches!(
            self.kind(i - 1),
            TokenKind::Semicolon | TokenKind::LBrace | TokenKind::RBrace
        ) || (self.newline_before(i) && self.can_end_statement(i - 1))
    }

    /// Whether the `(` at `open` starts a parameter list rather than a call
    /// or a parenthesized expression.
    pub fn is_parameter_list(&self, open: usize) -> bool {
        let Some(close) = self.matching(open) else {
            return false;
        };
        if open > 0 {
            let prev = open - 1;
            if self.kind(prev) == TokenKind::Function
                || (prev > 0 && self.kind(prev - 1) == TokenKind::Function && self.kind(prev).is_identifier_like())
                || (self.kind(prev) == TokenKind::Star && prev > 0 && self.kind(prev - 1) == TokenKind::Function)
            {
                return true;
            }
            if self.is_word(prev, "catch") {
                return true;
            }
        }

        let after = if self.kind(close + 1) == TokenKind::Colon {
            self.skip_type(close + 2)
        } else {
            close + 1
        };
        if self.kind(after) == TokenKind::Arrow {
            return true;
        }

        // method, accessor or constructor: `name(...) {`
        open > 0
            && self.kind(after) == TokenKind::LBrace
            && (self.kind(open - 1).is_identifier_like() || self.kind(open - 1) == TokenKind::Gt)
            && !CONTROL_WORDS.contains(&self.value(open - 1))
    }

    /// Whether the file has a top-level `import` or `export`.
    pub fn is_module(&self) -> bool {
        let mut depth = 0usize;
        for i in 0..self.tokens.len() {
            match self.kind(i) {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1)
                }
                TokenKind::Export if depth == 0 => return true,
                TokenKind::Import
                    if depth == 0
                        && !matches!(self.kind(i + 1), TokenKind::LParen | TokenKind::Dot)
                        && !(i > 0 && matches!(self.kind(i - 1), TokenKind::Dot | TokenKind::QuestionDot)) =>
                {
                    return true
                }
                _ => {}
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsincr_lexer::Lexer;

    fn with_tokens<R>(text: &str, f: impl FnOnce(Tokens<'_>) -> R) -> R {
        let scanned = Lexer::scan(text);
        f(Tokens::new(text, &scanned.tokens))
    }

    fn find(t: &Tokens<'_>, value: &str) -> usize {
        (0..t.tokens.len()).find(|&i| t.value(i) == value).unwrap()
    }

    #[test]
    fn test_skip_type() {
        with_tokens("let x: Map<string, number[]> | undefined = y;", |t| {
            let colon = find(&t, ":");
            assert_eq!(t.kind(t.skip_type(colon + 1)), TokenKind::Eq);
        });
        with_tokens("let f: (a: number) => { b: string }[];", |t| {
            let colon = find(&t, ":");
            assert_eq!(t.kind(t.skip_type(colon + 1)), TokenKind::Semicolon);
        });
        with_tokens("type C<T> = T extends string ? 'a' : 'b';", |t| {
            let eq = find(&t, "=");
            assert_eq!(t.kind(t.skip_type(eq + 1)), TokenKind::Semicolon);
        });
    }

    #[test]
    fn test_statement_end_with_asi() {
        with_tokens("const a = {\n  b: 1\n}\nconst c = 2", |t| {
            let end = t.statement_end(0);
            assert_eq!(t.kind(end), TokenKind::Const);
            assert_eq!(t.statement_end(end), t.eof());
        });
        with_tokens("foo\n  .bar();\nbaz", |t| {
            assert_eq!(t.value(t.statement_end(0)), "baz");
        });
    }

    #[test]
    fn test_parameter_lists() {
        with_tokens("function f(a: number): string { return g(a); }", |t| {
            assert!(t.is_parameter_list(find(&t, "(")));
            let call = (0..t.tokens.len())
                .filter(|&i| t.kind(i) == TokenKind::LParen)
                .nth(1)
                .unwrap();
            assert!(!t.is_parameter_list(call));
        });
        with_tokens("const h = (x: number): number => x; if (x) { }", |t| {
            let parens: Vec<usize> = (0..t.tokens.len())
                .filter(|&i| t.kind(i) == TokenKind::LParen)
                .collect();
            assert!(t.is_parameter_list(parens[0]));
            assert!(!t.is_parameter_list(parens[1]));
        });
        with_tokens("const v = c ? f(a) : b;", |t| {
            assert!(!t.is_parameter_list(find(&t, "(")));
        });
    }

    #[test]
    fn test_module_detection() {
        with_tokens("const a = import('./x');", |t| assert!(!t.is_module()));
        with_tokens("export {};", |t| assert!(t.is_module()));
        with_tokens("import a from './a';", |t| assert!(t.is_module()));
        with_tokens("function f() { return import.meta; }", |t| assert!(!t.is_module()));
    }
}
