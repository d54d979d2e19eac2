use crate::token::{Comment, CommentKind, Span, Token, TokenKind};

/// Messages carried by `TokenKind::Error` tokens.
pub mod errors {
    pub const UNTERMINATED_STRING: &str = "Unterminated string literal.";
    pub const UNTERMINATED_TEMPLATE: &str = "Unterminated template literal.";
    pub const UNTERMINATED_COMMENT: &str = "'*/' expected.";
    pub const UNTERMINATED_REGEX: &str = "Unterminated regular expression literal.";
    pub const INVALID_CHARACTER: &str = "Invalid character.";
}

/// Tokens and comment trivia of one file.
#[derive(Debug, Clone, Default)]
pub struct Scanned {
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
}

/// Multi-character punctuators, longest first.
const PUNCTUATORS: &[(&str, TokenKind)] = &[
    (">>>=", TokenKind::Operator),
    ("...", TokenKind::DotDotDot),
    ("===", TokenKind::Operator),
    ("!==", TokenKind::Operator),
    ("**=", TokenKind::Operator),
    ("&&=", TokenKind::Operator),
    ("||=", TokenKind::Operator),
    ("??=", TokenKind::Operator),
    ("<<=", TokenKind::Operator),
    ("=>", TokenKind::Arrow),
    ("?.", TokenKind::QuestionDot),
    ("==", TokenKind::Operator),
    ("!=", TokenKind::Operator),
    ("<=", TokenKind::Operator),
    ("&&", TokenKind::Operator),
    ("||", TokenKind::Operator),
    ("??", TokenKind::Operator),
    ("++", TokenKind::Operator),
    ("--", TokenKind::Operator),
    ("+=", TokenKind::Operator),
    ("-=", TokenKind::Operator),
    ("*=", TokenKind::Operator),
    ("/=", TokenKind::Operator),
    ("%=", TokenKind::Operator),
    ("&=", TokenKind::Operator),
    ("|=", TokenKind::Operator),
    ("^=", TokenKind::Operator),
    ("**", TokenKind::Operator),
    ("<<", TokenKind::Operator),
];

/// The scanner for TypeScript source.
///
/// `>` is always scanned as a single character so that nested generic
/// arguments close one level at a time.
pub struct Lexer<'a> {
    source: &'a str,
    chars: std::str::CharIndices<'a>,
    current_pos: usize,
    current_char: Option<char>,
    comments: Vec<Comment>,
    brace_depth: usize,
    /// Brace depth at each open `${` substitution.
    template_stack: Vec<usize>,
    regex_allowed: bool,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer from source code.
    pub fn new(source: &'a str) -> Self {
        let mut chars = source.char_indices();
        let current_char = chars.next().map(|(_, c)| c);
        Self {
            source,
            chars,
            current_pos: 0,
            current_char,
            comments: Vec::new(),
            brace_depth: 0,
            template_stack: Vec::new(),
            regex_allowed: true,
        }
    }

    /// Scans a whole file into tokens and comments.
    pub fn scan(source: &'a str) -> Scanned {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize();
        Scanned {
            tokens,
            comments: lexer.comments,
        }
    }

    /// Tokenizes the entire source code and returns all tokens.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    /// Comments seen so far.
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Gets the next token from the source.
    pub fn next_token(&mut self) -> Token {
        if let Some(error_token) = self.skip_whitespace_and_comments() {
            return error_token;
        }

        let start = self.current_pos;
        let token = match self.current_char {
            None => Token::new(TokenKind::Eof, Span::new(start, start), String::new()),
            Some(ch) => match ch {
                '"' | '\'' => self.read_string_literal(ch),
                '`' => {
                    self.advance();
                    self.read_template_span(start, true)
                }
                '}' if self.template_stack.last() == Some(&self.brace_depth) => {
                    self.template_stack.pop();
                    self.advance();
                    self.read_template_span(start, false)
                }
                '0'..='9' => self.read_number(),
                '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number(),
                '/' if self.regex_allowed => self.read_regex(),
                c if is_identifier_start(c) => self.read_identifier_or_keyword(),
                _ => self.read_punctuation(),
            },
        };

        self.regex_allowed = regex_allowed_after(&token);
        token
    }

    // Helper methods

    fn advance(&mut self) {
        if let Some((pos, ch)) = self.chars.next() {
            self.current_pos = pos;
            self.current_char = Some(ch);
        } else {
            self.current_pos = self.source.len();
            self.current_char = None;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next().map(|(_, c)| c)
    }

    fn text(&self, start: usize) -> String {
        self.source[start..self.current_pos].to_string()
    }

    fn skip_whitespace_and_comments(&mut self) -> Option<Token> {
        loop {
            match self.current_char {
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek() == Some('/') => {
                    self.read_single_line_comment();
                }
                Some('/') if self.peek() == Some('*') => {
                    let start = self.current_pos;
                    if !self.read_multi_line_comment() {
                        return Some(Token::new(
                            TokenKind::Error,
                            Span::new(start, self.current_pos),
                            errors::UNTERMINATED_COMMENT.to_string(),
                        ));
                    }
                }
                _ => break,
            }
        }
        None
    }

    fn read_single_line_comment(&mut self) {
        let start = self.current_pos;
        // Skip //
        self.advance();
        self.advance();
        let body_start = self.current_pos;

        while let Some(ch) = self.current_char {
            if ch == '\n' {
                break;
            }
            self.advance();
        }

        let body = self.source[body_start..self.current_pos].trim_end_matches('\r');
        self.comments.push(Comment {
            kind: CommentKind::Line,
            span: Span::new(start, self.current_pos),
            text: body.to_string(),
        });
    }

    fn read_multi_line_comment(&mut self) -> bool {
        let start = self.current_pos;
        // Skip /*
        self.advance();
        self.advance();
        let body_start = self.current_pos;

        while let Some(ch) = self.current_char {
            if ch == '*' && self.peek() == Some('/') {
                let body_end = self.current_pos;
                self.advance(); // *
                self.advance(); // /
                self.comments.push(Comment {
                    kind: CommentKind::Block,
                    span: Span::new(start, self.current_pos),
                    text: self.source[body_start..body_end].to_string(),
                });
                return true;
            }
            self.advance();
        }
        false
    }

    fn read_string_literal(&mut self, quote: char) -> Token {
        let start = self.current_pos;
        self.advance(); // Skip opening quote

        let mut value = String::new();

        while let Some(ch) = self.current_char {
            if ch == quote {
                self.advance(); // Skip closing quote
                return Token::new(TokenKind::StringLiteral, Span::new(start, self.current_pos), value);
            } else if ch == '\\' {
                self.advance();
                if let Some(escaped) = self.current_char {
                    match escaped {
                        'u' => {
                            self.advance();
                            value.push(self.read_hex_digits(4));
                        }
                        'x' => {
                            self.advance();
                            value.push(self.read_hex_digits(2));
                        }
                        // Line continuation
                        '\n' => self.advance(),
                        '\r' => {
                            self.advance();
                            if self.current_char == Some('\n') {
                                self.advance();
                            }
                        }
                        _ => {
                            value.push(match escaped {
                                'n' => '\n',
                                'r' => '\r',
                                't' => '\t',
                                'b' => '\u{8}',
                                'f' => '\u{c}',
                                'v' => '\u{b}',
                                '0' => '\0',
                                other => other,
                            });
                            self.advance();
                        }
                    }
                }
            } else if ch == '\n' {
                break;
            } else {
                value.push(ch);
                self.advance();
            }
        }

        Token::new(
            TokenKind::Error,
            Span::new(start, self.current_pos),
            errors::UNTERMINATED_STRING.to_string(),
        )
    }

    fn read_hex_digits(&mut self, count: usize) -> char {
        let mut code = 0u32;
        for _ in 0..count {
            match self.current_char.and_then(|ch| ch.to_digit(16)) {
                Some(digit) => {
                    code = code * 16 + digit;
                    self.advance();
                }
                None => break,
            }
        }
        char::from_u32(code).unwrap_or('\u{FFFD}')
    }

    /// Reads template text after a backtick (`head`) or after the `}` that
    /// closes a substitution.
    fn read_template_span(&mut self, start: usize, head: bool) -> Token {
        while let Some(ch) = self.current_char {
            match ch {
                '`' => {
                    self.advance();
                    let kind = if head {
                        TokenKind::TemplateLiteral
                    } else {
                        TokenKind::TemplateTail
                    };
                    return Token::new(kind, Span::new(start, self.current_pos), self.text(start));
                }
                '$' if self.peek() == Some('{') => {
                    self.advance();
                    self.advance();
                    self.template_stack.push(self.brace_depth);
                    let kind = if head {
                        TokenKind::TemplateHead
                    } else {
                        TokenKind::TemplateMiddle
                    };
                    return Token::new(kind, Span::new(start, self.current_pos), self.text(start));
                }
                '\\' => {
                    self.advance();
                    self.advance();
                }
                _ => self.advance(),
            }
        }

        Token::new(
            TokenKind::Error,
            Span::new(start, self.current_pos),
            errors::UNTERMINATED_TEMPLATE.to_string(),
        )
    }

    fn read_number(&mut self) -> Token {
        let start = self.current_pos;

        let radix_prefix = self.current_char == Some('0')
            && matches!(self.peek(), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B'));
        if radix_prefix {
            self.advance();
            self.advance();
            while let Some(ch) = self.current_char {
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    self.advance();
                } else {
                    break;
                }
            }
            return Token::new(TokenKind::NumberLiteral, Span::new(start, self.current_pos), self.text(start));
        }

        self.skip_digits();
        if self.current_char == Some('.') {
            self.advance();
            self.skip_digits();
        }
        if matches!(self.current_char, Some('e' | 'E')) {
            self.advance();
            if matches!(self.current_char, Some('+' | '-')) {
                self.advance();
            }
            self.skip_digits();
        }
        // BigInt suffix
        if self.current_char == Some('n') {
            self.advance();
        }

        Token::new(TokenKind::NumberLiteral, Span::new(start, self.current_pos), self.text(start))
    }

    fn skip_digits(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_regex(&mut self) -> Token {
        let start = self.current_pos;
        self.advance(); // Skip opening slash

        let mut in_class = false;
        loop {
            match self.current_char {
                None | Some('\n') => {
                    return Token::new(
                        TokenKind::Error,
                        Span::new(start, self.current_pos),
                        errors::UNTERMINATED_REGEX.to_string(),
                    );
                }
                Some('\\') => {
                    self.advance();
                    if self.current_char.is_some_and(|c| c != '\n') {
                        self.advance();
                    }
                }
                Some('[') => {
                    in_class = true;
                    self.advance();
                }
                Some(']') => {
                    in_class = false;
                    self.advance();
                }
                Some('/') if !in_class => {
                    self.advance();
                    break;
                }
                Some(_) => self.advance(),
            }
        }

        // Flags
        while let Some(ch) = self.current_char {
            if is_identifier_part(ch) {
                self.advance();
            } else {
                break;
            }
        }

        Token::new(TokenKind::RegexLiteral, Span::new(start, self.current_pos), self.text(start))
    }

    fn read_identifier_or_keyword(&mut self) -> Token {
        let start = self.current_pos;

        while let Some(ch) = self.current_char {
            if is_identifier_part(ch) {
                self.advance();
            } else {
                break;
            }
        }

        let value = self.text(start);
        let kind = TokenKind::keyword(&value).unwrap_or(TokenKind::Identifier);
        Token::new(kind, Span::new(start, self.current_pos), value)
    }

    fn read_punctuation(&mut self) -> Token {
        let start = self.current_pos;
        let rest = &self.source[start..];

        for (text, kind) in PUNCTUATORS {
            if !rest.starts_with(text) {
                continue;
            }
            // `a ? .5 : b` is a conditional, not optional chaining
            if *kind == TokenKind::QuestionDot
                && rest[2..].chars().next().is_some_and(|c| c.is_ascii_digit())
            {
                break;
            }
            for _ in 0..text.len() {
                self.advance();
            }
            return Token::new(*kind, Span::new(start, self.current_pos), text.to_string());
        }

        let ch = match self.current_char {
            Some(ch) => ch,
            None => return Token::new(TokenKind::Eof, Span::new(start, start), String::new()),
        };
        self.advance();

        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => {
                self.brace_depth += 1;
                TokenKind::LBrace
            }
            '}' => {
                self.brace_depth = self.brace_depth.saturating_sub(1);
                TokenKind::RBrace
            }
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '?' => TokenKind::Question,
            '.' => TokenKind::Dot,
            '=' => TokenKind::Eq,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '*' => TokenKind::Star,
            '|' => TokenKind::Pipe,
            '&' => TokenKind::Amp,
            '!' => TokenKind::Bang,
            '@' => TokenKind::At,
            '+' | '-' | '/' | '%' | '^' | '~' | '#' => TokenKind::Operator,
            _ => {
                return Token::new(
                    TokenKind::Error,
                    Span::new(start, self.current_pos),
                    errors::INVALID_CHARACTER.to_string(),
                );
            }
        };

        Token::new(kind, Span::new(start, self.current_pos), ch.to_string())
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// Whether a `/` following `token` starts a regular expression.
fn regex_allowed_after(token: &Token) -> bool {
    match token.kind {
        TokenKind::Identifier => matches!(
            token.value.as_str(),
            "case" | "do" | "else" | "in" | "instanceof" | "delete" | "void" | "throw" | "yield"
                | "await" | "of"
        ),
        TokenKind::StringLiteral
        | TokenKind::NumberLiteral
        | TokenKind::RegexLiteral
        | TokenKind::TemplateLiteral
        | TokenKind::TemplateTail
        | TokenKind::RParen
        | TokenKind::RBracket
        | TokenKind::RBrace => false,
        TokenKind::Operator => !matches!(token.value.as_str(), "++" | "--"),
        kind if kind.is_contextual_keyword() => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_module_keywords() {
        let source = "import type { A } from './a'; export default x";
        let tokens = Lexer::new(source).tokenize();

        assert_eq!(tokens[0].kind, TokenKind::Import);
        assert_eq!(tokens[1].kind, TokenKind::Type);
        assert_eq!(tokens[2].kind, TokenKind::LBrace);
        assert_eq!(tokens[3].kind, TokenKind::Identifier);
        assert_eq!(tokens[4].kind, TokenKind::RBrace);
        assert_eq!(tokens[5].kind, TokenKind::From);
        assert_eq!(tokens[6].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[6].value, "./a");
        assert_eq!(tokens[6].span, Span::new(23, 28));
        assert_eq!(tokens[7].kind, TokenKind::Semicolon);
        assert_eq!(tokens[8].kind, TokenKind::Export);
        assert_eq!(tokens[9].kind, TokenKind::Default);
    }

    #[test]
    fn test_strings() {
        let tokens = Lexer::new(r#""he\"llo" 'wor\x41ld'"#).tokenize();

        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].value, "he\"llo");
        assert_eq!(tokens[1].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[1].value, "worAld");
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = Lexer::new("let s = 'oops\nlet t = 1;").tokenize();
        let error = tokens.iter().find(|t| t.kind == TokenKind::Error).unwrap();
        assert_eq!(error.value, errors::UNTERMINATED_STRING);
        assert_eq!(error.span.start, 8);
        // Scanning resumes on the next line
        assert!(tokens.iter().any(|t| t.value == "t"));
    }

    #[test]
    fn test_comments_are_trivia() {
        let source = "/// <reference path=\"a.d.ts\" />\nlet x = 5; /* block */";
        let scanned = Lexer::scan(source);

        assert_eq!(scanned.tokens[0].kind, TokenKind::Let);
        assert_eq!(scanned.comments.len(), 2);
        assert_eq!(scanned.comments[0].kind, CommentKind::Line);
        assert_eq!(scanned.comments[0].text, "/ <reference path=\"a.d.ts\" />");
        assert_eq!(scanned.comments[1].kind, CommentKind::Block);
        assert_eq!(scanned.comments[1].text, " block ");
    }

    #[test]
    fn test_unterminated_block_comment() {
        let tokens = Lexer::new("let a; /* never closed").tokenize();
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::Error && t.value == errors::UNTERMINATED_COMMENT));
    }

    #[test]
    fn test_template_substitutions() {
        let source = "`a${ {b: 1}.b }c${d}e` + 1";
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::TemplateHead,
                TokenKind::LBrace,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::NumberLiteral,
                TokenKind::RBrace,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::TemplateMiddle,
                TokenKind::Identifier,
                TokenKind::TemplateTail,
                TokenKind::Operator,
                TokenKind::NumberLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_regex_versus_division() {
        let tokens = Lexer::new("let r = /a[/]b/g; let q = a / b / c;").tokenize();

        assert_eq!(tokens[3].kind, TokenKind::RegexLiteral);
        assert_eq!(tokens[3].value, "/a[/]b/g");
        let divisions = tokens.iter().filter(|t| t.value == "/").count();
        assert_eq!(divisions, 2);
    }

    #[test]
    fn test_punctuators() {
        assert_eq!(
            kinds("(a?: T) => a?.b ... x === y ? .5 : 0"),
            vec![
                TokenKind::LParen,
                TokenKind::Identifier,
                TokenKind::Question,
                TokenKind::Colon,
                TokenKind::Identifier,
                TokenKind::RParen,
                TokenKind::Arrow,
                TokenKind::Identifier,
                TokenKind::QuestionDot,
                TokenKind::Identifier,
                TokenKind::DotDotDot,
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::Identifier,
                TokenKind::Question,
                TokenKind::NumberLiteral,
                TokenKind::Colon,
                TokenKind::NumberLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_nested_generics_close_one_at_a_time() {
        assert_eq!(
            kinds("Array<Array<T>>"),
            vec![
                TokenKind::Identifier,
                TokenKind::Lt,
                TokenKind::Identifier,
                TokenKind::Lt,
                TokenKind::Identifier,
                TokenKind::Gt,
                TokenKind::Gt,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = Lexer::new("123 45.67 0x1A 1_000 1e-3 10n .5").tokenize();
        let values: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::NumberLiteral)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(values, vec!["123", "45.67", "0x1A", "1_000", "1e-3", "10n", ".5"]);
    }
}
