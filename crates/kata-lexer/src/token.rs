//! Token types for the KataScript lexer.
//!
//! Defines [`TokenKind`] covering every lexeme of the dialect and [`Token`],
//! which pairs a kind with a source [`Span`].

use kata_types::Span;
use std::fmt;

/// Reserved words the lexer turns into keyword tokens.
pub const ALL_KEYWORDS: &[&str] = &[
    "let", "const", "var", "function", "return", "if", "else", "while", "do", "for", "of",
    "break", "continue", "throw", "new", "true", "false",
];

/// Words reserved by TypeScript that the dialect does not support.
///
/// They lex as [`TokenKind::Unsupported`] so the parser can name them.
pub const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "null", "undefined", "class", "interface", "try", "catch", "finally", "switch", "case",
    "typeof", "async", "await", "import", "export", "enum", "type", "in", "instanceof",
];

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

/// A single token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn is_keyword(&self) -> bool {
        self.kind.is_keyword()
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────
    /// `42`, `3.14`, `1e3`
    NumberLit(f64),
    /// `"hello"`, `'hello'`, or a template with no interpolation.
    StringLiteral(String),

    // ── Template Literals ────────────────────────────────────
    /// Text between the opening backtick and the first `${`.
    TemplateStart(String),
    /// Text between a `}` and the next `${`.
    TemplatePart(String),
    /// Text between the last `}` and the closing backtick.
    TemplateEnd(String),
    /// `${`
    InterpolationStart,
    /// The `}` closing an interpolation.
    InterpolationEnd,

    // ── Identifiers ──────────────────────────────────────────
    Identifier(String),

    // ── Keywords ─────────────────────────────────────────────
    Let,
    Const,
    Var,
    Function,
    Return,
    If,
    Else,
    While,
    Do,
    For,
    Of,
    Break,
    Continue,
    Throw,
    New,
    True,
    False,
    /// A TypeScript keyword the dialect rejects.
    Unsupported(String),

    // ── Operators ────────────────────────────────────────────
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    Eq,
    EqEq,
    EqEqEq,
    BangEq,
    BangEqEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    AmpAmp,
    PipePipe,
    Bang,
    Question,
    /// `=>`, lexed so the parser can report arrow functions clearly.
    FatArrow,

    // ── Punctuation ──────────────────────────────────────────
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semicolon,
    Dot,

    // ── Special ──────────────────────────────────────────────
    Newline,
    Eof,
}

impl TokenKind {
    pub fn from_keyword(s: &str) -> Option<TokenKind> {
        Some(match s {
            "let" => TokenKind::Let,
            "const" => TokenKind::Const,
            "var" => TokenKind::Var,
            "function" => TokenKind::Function,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "for" => TokenKind::For,
            "of" => TokenKind::Of,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "throw" => TokenKind::Throw,
            "new" => TokenKind::New,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ if UNSUPPORTED_KEYWORDS.contains(&s) => TokenKind::Unsupported(s.to_string()),
            _ => return None,
        })
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Let
                | TokenKind::Const
                | TokenKind::Var
                | TokenKind::Function
                | TokenKind::Return
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::For
                | TokenKind::Of
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Throw
                | TokenKind::New
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Unsupported(_)
        )
    }

    /// `=` or a compound assignment operator.
    pub fn is_assignment(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::PlusEq
                | TokenKind::MinusEq
                | TokenKind::StarEq
                | TokenKind::SlashEq
                | TokenKind::PercentEq
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::NumberLit(n) => write!(f, "{n}"),
            TokenKind::StringLiteral(s) => write!(f, "\"{s}\""),
            TokenKind::TemplateStart(_) => f.write_str("template start"),
            TokenKind::TemplatePart(_) => f.write_str("template part"),
            TokenKind::TemplateEnd(_) => f.write_str("template end"),
            TokenKind::InterpolationStart => f.write_str("${"),
            TokenKind::InterpolationEnd => f.write_str("interpolation end"),
            TokenKind::Identifier(s) => f.write_str(s),
            TokenKind::Let => f.write_str("let"),
            TokenKind::Const => f.write_str("const"),
            TokenKind::Var => f.write_str("var"),
            TokenKind::Function => f.write_str("function"),
            TokenKind::Return => f.write_str("return"),
            TokenKind::If => f.write_str("if"),
            TokenKind::Else => f.write_str("else"),
            TokenKind::While => f.write_str("while"),
            TokenKind::Do => f.write_str("do"),
            TokenKind::For => f.write_str("for"),
            TokenKind::Of => f.write_str("of"),
            TokenKind::Break => f.write_str("break"),
            TokenKind::Continue => f.write_str("continue"),
            TokenKind::Throw => f.write_str("throw"),
            TokenKind::New => f.write_str("new"),
            TokenKind::True => f.write_str("true"),
            TokenKind::False => f.write_str("false"),
            TokenKind::Unsupported(s) => f.write_str(s),
            TokenKind::Plus => f.write_str("+"),
            TokenKind::Minus => f.write_str("-"),
            TokenKind::Star => f.write_str("*"),
            TokenKind::StarStar => f.write_str("**"),
            TokenKind::Slash => f.write_str("/"),
            TokenKind::Percent => f.write_str("%"),
            TokenKind::PlusPlus => f.write_str("++"),
            TokenKind::MinusMinus => f.write_str("--"),
            TokenKind::PlusEq => f.write_str("+="),
            TokenKind::MinusEq => f.write_str("-="),
            TokenKind::StarEq => f.write_str("*="),
            TokenKind::SlashEq => f.write_str("/="),
            TokenKind::PercentEq => f.write_str("%="),
            TokenKind::Eq => f.write_str("="),
            TokenKind::EqEq => f.write_str("=="),
            TokenKind::EqEqEq => f.write_str("==="),
            TokenKind::BangEq => f.write_str("!="),
            TokenKind::BangEqEq => f.write_str("!=="),
            TokenKind::Less => f.write_str("<"),
            TokenKind::LessEq => f.write_str("<="),
            TokenKind::Greater => f.write_str(">"),
            TokenKind::GreaterEq => f.write_str(">="),
            TokenKind::AmpAmp => f.write_str("&&"),
            TokenKind::PipePipe => f.write_str("||"),
            TokenKind::Bang => f.write_str("!"),
            TokenKind::Question => f.write_str("?"),
            TokenKind::FatArrow => f.write_str("=>"),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::LBrace => f.write_str("{"),
            TokenKind::RBrace => f.write_str("}"),
            TokenKind::LBracket => f.write_str("["),
            TokenKind::RBracket => f.write_str("]"),
            TokenKind::Comma => f.write_str(","),
            TokenKind::Colon => f.write_str(":"),
            TokenKind::Semicolon => f.write_str(";"),
            TokenKind::Dot => f.write_str("."),
            TokenKind::Newline => f.write_str("newline"),
            TokenKind::Eof => f.write_str("end of file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip_keywords() {
        for &kw in ALL_KEYWORDS.iter().chain(UNSUPPORTED_KEYWORDS) {
            let kind = TokenKind::from_keyword(kw).unwrap();
            assert_eq!(kind.to_string(), kw, "Display mismatch for '{kw}'");
            assert!(kind.is_keyword());
        }
    }

    #[test]
    fn test_type_names_are_identifiers() {
        for name in ["number", "string", "boolean", "void", "Error", "Array", "console"] {
            assert_eq!(TokenKind::from_keyword(name), None, "{name}");
        }
    }

    #[test]
    fn test_keyword_case_sensitivity() {
        assert!(TokenKind::from_keyword("let").is_some());
        assert!(TokenKind::from_keyword("Let").is_none());
        assert!(TokenKind::from_keyword("FUNCTION").is_none());
    }

    #[test]
    fn test_display_operators() {
        assert_eq!(TokenKind::EqEqEq.to_string(), "===");
        assert_eq!(TokenKind::BangEqEq.to_string(), "!==");
        assert_eq!(TokenKind::StarStar.to_string(), "**");
        assert_eq!(TokenKind::PercentEq.to_string(), "%=");
        assert_eq!(TokenKind::FatArrow.to_string(), "=>");
    }

    #[test]
    fn test_is_assignment() {
        assert!(TokenKind::Eq.is_assignment());
        assert!(TokenKind::SlashEq.is_assignment());
        assert!(!TokenKind::EqEq.is_assignment());
        assert!(!TokenKind::PlusPlus.is_assignment());
    }

    #[test]
    fn test_non_keywords() {
        for kind in [
            TokenKind::NumberLit(1.0),
            TokenKind::Identifier("x".into()),
            TokenKind::Semicolon,
            TokenKind::Eof,
        ] {
            assert!(!kind.is_keyword(), "{kind:?}");
        }
    }
}
