/// A byte range in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(&self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Token kinds produced by the scanner.
///
/// Only the keywords that matter for module, declaration and type syntax get
/// their own kind; every other word is an `Identifier`. Several of the
/// keywords are contextual in TypeScript (`type`, `from`, `as`, ...), see
/// [`TokenKind::is_contextual_keyword`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Reserved words
    Import,
    Export,
    Const,
    Let,
    Var,
    Function,
    Class,
    Enum,
    Default,
    Extends,
    Return,
    Typeof,
    New,

    // Contextual keywords
    From,
    As,
    Type,
    Interface,
    Declare,
    Namespace,
    Module,
    Global,
    Require,
    Abstract,
    Async,
    Implements,
    Public,
    Private,
    Protected,
    Readonly,
    Static,
    Override,
    Satisfies,
    Keyof,

    // Literals
    Identifier,
    StringLiteral,
    NumberLiteral,
    RegexLiteral,
    /// Template literal without substitutions: `` `text` ``
    TemplateLiteral,
    /// `` `text${ ``
    TemplateHead,
    /// `` }text${ ``
    TemplateMiddle,
    /// `` }text` ``
    TemplateTail,

    // Delimiters
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
    Semicolon, // ;
    Comma,     // ,
    Colon,     // :
    Question,  // ?
    QuestionDot, // ?.
    Dot,       // .
    DotDotDot, // ...
    Eq,        // =
    Arrow,     // =>
    Lt,        // <
    Gt,        // >
    Star,      // *
    Pipe,      // |
    Amp,       // &
    Bang,      // !
    At,        // @
    /// Any other operator; the exact text is in [`Token::value`].
    Operator,

    // Special
    Eof,
    Error,
}

impl TokenKind {
    /// Keywords that are valid identifiers outside their special position.
    pub fn is_contextual_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::From
                | TokenKind::As
                | TokenKind::Type
                | TokenKind::Interface
                | TokenKind::Declare
                | TokenKind::Namespace
                | TokenKind::Module
                | TokenKind::Global
                | TokenKind::Require
                | TokenKind::Abstract
                | TokenKind::Async
                | TokenKind::Implements
                | TokenKind::Public
                | TokenKind::Private
                | TokenKind::Protected
                | TokenKind::Readonly
                | TokenKind::Static
                | TokenKind::Override
                | TokenKind::Satisfies
                | TokenKind::Keyof
        )
    }

    /// `Identifier` or a contextual keyword used as a name.
    pub fn is_identifier_like(self) -> bool {
        self == TokenKind::Identifier || self.is_contextual_keyword()
    }

    pub fn is_access_modifier(self) -> bool {
        matches!(
            self,
            TokenKind::Public | TokenKind::Private | TokenKind::Protected | TokenKind::Readonly
        )
    }

    pub(crate) fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "import" => TokenKind::Import,
            "export" => TokenKind::Export,
            "const" => TokenKind::Const,
            "let" => TokenKind::Let,
            "var" => TokenKind::Var,
            "function" => TokenKind::Function,
            "class" => TokenKind::Class,
            "enum" => TokenKind::Enum,
            "default" => TokenKind::Default,
            "extends" => TokenKind::Extends,
            "return" => TokenKind::Return,
            "typeof" => TokenKind::Typeof,
            "new" => TokenKind::New,
            "from" => TokenKind::From,
            "as" => TokenKind::As,
            "type" => TokenKind::Type,
            "interface" => TokenKind::Interface,
            "declare" => TokenKind::Declare,
            "namespace" => TokenKind::Namespace,
            "module" => TokenKind::Module,
            "global" => TokenKind::Global,
            "require" => TokenKind::Require,
            "abstract" => TokenKind::Abstract,
            "async" => TokenKind::Async,
            "implements" => TokenKind::Implements,
            "public" => TokenKind::Public,
            "private" => TokenKind::Private,
            "protected" => TokenKind::Protected,
            "readonly" => TokenKind::Readonly,
            "static" => TokenKind::Static,
            "override" => TokenKind::Override,
            "satisfies" => TokenKind::Satisfies,
            "keyof" => TokenKind::Keyof,
            _ => return None,
        };
        Some(kind)
    }
}

/// Represents a token with its kind, span, and value.
///
/// For string literals `value` is the unescaped content; for errors it is the
/// error message; otherwise it is the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub value: String,
}

impl Token {
    pub(crate) fn new(kind: TokenKind, span: Span, value: String) -> Self {
        Self { kind, span, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    /// `// ...`
    Line,
    /// `/* ... */`
    Block,
}

/// A comment kept as trivia.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub kind: CommentKind,
    pub span: Span,
    /// Text between the delimiters. For `/// <reference />` this starts with `/`.
    pub text: String,
}
