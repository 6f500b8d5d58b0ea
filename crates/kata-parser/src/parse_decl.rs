//! Function declaration parsing.

use kata_lexer::token::TokenKind;
use kata_types::ast::*;
use kata_types::DiagnosticCode;

use crate::parser::Parser;

impl<'src> Parser<'src> {
    /// ```ebnf
    /// FunctionDecl = "function" Identifier "(" [ Param { "," Param } ] ")"
    ///                [ ":" Type ] Block ;
    /// ```
    pub(crate) fn parse_function_decl(&mut self) -> Option<FunctionDecl> {
        let start = self.expect(&TokenKind::Function)?.span;
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LParen)?;

        let mut params = Vec::new();
        while !self.check_exact(&TokenKind::RParen) && !self.at_end() {
            params.push(self.parse_param()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;

        let ret = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };

        self.skip_newlines();
        let body = self.parse_block()?;
        let span = start.merge(body.span);
        Some(FunctionDecl {
            name,
            params,
            ret,
            body,
            span,
        })
    }

    /// `Identifier ":" Type`
    ///
    /// A missing annotation is reported here; the parameter is kept with an
    /// empty named type so the body can still be checked.
    fn parse_param(&mut self) -> Option<Param> {
        let name = self.expect_identifier()?;
        if self.eat(&TokenKind::Colon) {
            let type_ann = self.parse_type_annotation()?;
            let span = name.span.merge(type_ann.span);
            return Some(Param {
                name,
                type_ann,
                span,
            });
        }

        self.error_with_suggestion(
            DiagnosticCode::MISSING_ANNOTATION,
            format!("Parameter '{}' needs a type annotation", name.name),
            name.span,
            format!("Write '{}: number' or another type", name.name),
        );
        Some(Param {
            type_ann: TypeAnnotation::new(TypeKind::Named(String::new()), name.span),
            span: name.span,
            name,
        })
    }
}
