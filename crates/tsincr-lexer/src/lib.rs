//! TypeScript scanner for the tsincr engine.
//!
//! Produces a flat token stream plus comment trivia. The engine uses it to
//! statically extract `import`/`export` specifiers and `/// <reference>`
//! directives, and the built-in compiler uses it for type erasure.

pub mod token;
pub mod lexer;

// Re-export all public types from modules
pub use token::{Comment, CommentKind, Span, Token, TokenKind};
pub use lexer::{Lexer, Scanned};
