//! KataScript lexer: converts snippet text into a token stream.

pub mod lexer;
pub mod token;

pub use lexer::{LexResult, Lexer};
pub use token::{Token, TokenKind, ALL_KEYWORDS, UNSUPPORTED_KEYWORDS};
