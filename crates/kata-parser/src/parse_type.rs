//! Type annotation parsing.

use kata_lexer::token::TokenKind;
use kata_types::ast::*;
use kata_types::DiagnosticCode;

use crate::parser::Parser;

impl<'src> Parser<'src> {
    /// Parse a type annotation.
    ///
    /// ```ebnf
    /// Type     = BaseType { "[" "]" } ;
    /// BaseType = "number" | "string" | "boolean" | "void" | "Error"
    ///          | "Array" "<" Type ">"
    ///          | "(" Type ")"
    ///          | Identifier ;
    /// ```
    ///
    /// Unknown names parse as `TypeKind::Named` and are rejected by the
    /// checker, which can point at the annotation.
    pub(crate) fn parse_type_annotation(&mut self) -> Option<TypeAnnotation> {
        let start = self.current_span();
        let kind = match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                match name.as_str() {
                    "number" => TypeKind::Number,
                    "string" => TypeKind::String,
                    "boolean" => TypeKind::Boolean,
                    "void" => TypeKind::Void,
                    "Error" => TypeKind::Error,
                    "Array" => {
                        self.expect(&TokenKind::Less)?;
                        let inner = self.parse_type_annotation()?;
                        self.expect(&TokenKind::Greater)?;
                        TypeKind::Array(Box::new(inner))
                    }
                    _ => TypeKind::Named(name),
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_type_annotation()?;
                self.expect(&TokenKind::RParen)?;
                inner.kind
            }
            TokenKind::Unsupported(word) => {
                self.error_at_current(
                    DiagnosticCode::UNKNOWN_TYPE,
                    format!("'{word}' is not a supported type"),
                );
                return None;
            }
            other => {
                self.error_at_current(
                    DiagnosticCode::UNEXPECTED_TOKEN,
                    format!("Expected a type, got '{other}'"),
                );
                return None;
            }
        };

        let mut ann = TypeAnnotation::new(kind, start.merge(self.previous_span()));
        while self.check_exact(&TokenKind::LBracket) && self.look_ahead(1) == &TokenKind::RBracket {
            self.advance();
            let end = self.advance().span;
            let span = ann.span.merge(end);
            ann = TypeAnnotation::new(TypeKind::Array(Box::new(ann)), span);
        }
        Some(ann)
    }
}
