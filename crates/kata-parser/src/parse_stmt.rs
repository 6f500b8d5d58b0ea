//! Statement and block parsing.

use kata_lexer::token::TokenKind;
use kata_types::ast::*;
use kata_types::DiagnosticCode;

use crate::parser::{Parser, MAX_NESTING};

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Blocks
    // ══════════════════════════════════════════════════════════════════════════

    /// `Block = "{" { Statement } "}"`
    pub(crate) fn parse_block(&mut self) -> Option<Block> {
        let start = self.expect(&TokenKind::LBrace)?.span;
        let mut stmts = Vec::new();

        loop {
            self.skip_separators();
            if self.check_exact(&TokenKind::RBrace) || self.at_end() || self.too_many_errors() {
                break;
            }
            let start_pos = self.position();
            match self.parse_statement() {
                Some(stmt) => stmts.push(stmt),
                None => self.recover_from(start_pos),
            }
        }

        let end = self.expect(&TokenKind::RBrace)?.span;
        Some(Block {
            stmts,
            span: start.merge(end),
        })
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse a single statement, including its terminator where it has one.
    pub(crate) fn parse_statement(&mut self) -> Option<Stmt> {
        self.stmt_depth += 1;
        if self.stmt_depth > MAX_NESTING {
            self.error_at_current(
                DiagnosticCode::NESTING_TOO_DEEP,
                format!("Blocks may nest at most {MAX_NESTING} levels deep"),
            );
            self.stmt_depth -= 1;
            return None;
        }
        let result = self.parse_statement_inner();
        self.stmt_depth -= 1;
        result
    }

    fn parse_statement_inner(&mut self) -> Option<Stmt> {
        match self.peek_kind() {
            TokenKind::LBrace => self.parse_block().map(Stmt::Block),
            TokenKind::Let | TokenKind::Const | TokenKind::Var => {
                let stmt = self.parse_declaration()?;
                self.expect_terminator();
                Some(stmt)
            }
            TokenKind::Function => {
                let span = self.current_span();
                self.error_with_suggestion(
                    DiagnosticCode::NESTED_FUNCTION,
                    "Functions can only be declared at the top level",
                    span,
                    "Move this function outside of the enclosing block",
                );
                // Consume the whole declaration so recovery resumes after it.
                self.parse_function_decl();
                None
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Break => {
                let span = self.advance().span;
                self.expect_terminator();
                Some(Stmt::Break(span))
            }
            TokenKind::Continue => {
                let span = self.advance().span;
                self.expect_terminator();
                Some(Stmt::Continue(span))
            }
            TokenKind::Return => self.parse_return(),
            TokenKind::Throw => {
                let start = self.advance().span;
                if self.at_terminator() {
                    self.error_at_current(
                        DiagnosticCode::EXPECTED_EXPRESSION,
                        "'throw' needs a value on the same line",
                    );
                    return None;
                }
                let value = self.parse_expression()?;
                let span = start.merge(value.span);
                self.expect_terminator();
                Some(Stmt::Throw(ThrowStmt { value, span }))
            }
            TokenKind::Else => {
                self.error_at_current(
                    DiagnosticCode::UNEXPECTED_TOKEN,
                    "'else' without a matching 'if'",
                );
                None
            }
            _ => {
                let stmt = self.parse_simple_statement()?;
                self.expect_terminator();
                Some(stmt)
            }
        }
    }

    /// `("let" | "const") Identifier [":" Type] ["=" Expression]`
    ///
    /// `var` is reported and then parsed as `let`.
    pub(crate) fn parse_declaration(&mut self) -> Option<Stmt> {
        let token = self.advance();
        let kind = match token.kind {
            TokenKind::Const => DeclKind::Const,
            TokenKind::Var => {
                self.error_with_suggestion(
                    DiagnosticCode::RESERVED_WORD,
                    "'var' is not supported",
                    token.span,
                    "Use 'let' or 'const' instead of 'var'",
                );
                DeclKind::Let
            }
            _ => DeclKind::Let,
        };
        let name = self.expect_identifier()?;
        let type_ann = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        let init = if self.eat(&TokenKind::Eq) {
            self.skip_newlines();
            Some(self.parse_expression()?)
        } else {
            None
        };
        Some(Stmt::Let(LetStmt {
            kind,
            name,
            type_ann,
            init,
            span: token.span.merge(self.previous_span()),
        }))
    }

    /// Assignment, `x++` / `x--` / `++x` / `--x`, or an expression statement.
    /// Does not consume a terminator, so `for` headers can reuse it.
    pub(crate) fn parse_simple_statement(&mut self) -> Option<Stmt> {
        if let Some(op) = self.increment_op() {
            let op_span = self.advance().span;
            let target_expr = self.parse_expression()?;
            let target = self.assign_target(target_expr)?;
            let one = self.mk_expr(ExprKind::NumberLit(1.0), op_span);
            let span = op_span.merge(self.previous_span());
            return Some(Stmt::Assign(AssignStmt {
                target,
                op: AssignOp::Compound(op),
                value: one,
                span,
            }));
        }

        let expr = self.parse_expression()?;
        let start = expr.span;

        if let Some(op) = self.increment_op() {
            let op_span = self.advance().span;
            let target = self.assign_target(expr)?;
            let one = self.mk_expr(ExprKind::NumberLit(1.0), op_span);
            return Some(Stmt::Assign(AssignStmt {
                target,
                op: AssignOp::Compound(op),
                value: one,
                span: start.merge(op_span),
            }));
        }

        let op = match self.peek_kind() {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::Compound(BinOp::Add),
            TokenKind::MinusEq => AssignOp::Compound(BinOp::Sub),
            TokenKind::StarEq => AssignOp::Compound(BinOp::Mul),
            TokenKind::SlashEq => AssignOp::Compound(BinOp::Div),
            TokenKind::PercentEq => AssignOp::Compound(BinOp::Rem),
            _ => {
                return Some(Stmt::Expr(ExprStmt {
                    expr,
                    span: start,
                }))
            }
        };
        self.advance();
        self.skip_newlines();
        let target = self.assign_target(expr)?;
        let value = self.parse_expression()?;
        let span = start.merge(value.span);
        Some(Stmt::Assign(AssignStmt {
            target,
            op,
            value,
            span,
        }))
    }

    fn increment_op(&self) -> Option<BinOp> {
        match self.peek_kind() {
            TokenKind::PlusPlus => Some(BinOp::Add),
            TokenKind::MinusMinus => Some(BinOp::Sub),
            _ => None,
        }
    }

    fn assign_target(&mut self, expr: Expr) -> Option<AssignTarget> {
        match expr.kind {
            ExprKind::Identifier(name) => Some(AssignTarget::Variable(Ident::new(name, expr.span))),
            ExprKind::Index { object, index } => Some(AssignTarget::Index {
                object: *object,
                index: *index,
            }),
            ExprKind::Paren(inner) => self.assign_target(*inner),
            ExprKind::Member { property, .. } => {
                self.error_at(
                    DiagnosticCode::UNEXPECTED_TOKEN,
                    format!("Cannot assign to '{}'", property.name),
                    expr.span,
                );
                None
            }
            _ => {
                self.error_at(
                    DiagnosticCode::UNEXPECTED_TOKEN,
                    "Invalid assignment target",
                    expr.span,
                );
                None
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Control Flow
    // ══════════════════════════════════════════════════════════════════════════

    /// `"(" Expression ")"`
    fn parse_condition(&mut self) -> Option<Expr> {
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        Some(condition)
    }

    /// A loop or branch body, which may start on the next line.
    fn parse_body(&mut self) -> Option<Box<Stmt>> {
        self.skip_newlines();
        if self.check_exact(&TokenKind::RBrace) || self.at_end() {
            let message = format!("Expected statement, got '{}'", self.peek_kind());
            self.error_at_current(DiagnosticCode::UNEXPECTED_TOKEN, message);
            return None;
        }
        self.parse_statement().map(Box::new)
    }

    /// `if (c) stmt [else stmt]`
    fn parse_if(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let condition = self.parse_condition()?;
        let then_branch = self.parse_body()?;
        let else_branch = if self.eat_past_newlines(&TokenKind::Else) {
            Some(self.parse_body()?)
        } else {
            None
        };
        let span = start.merge(self.previous_span());
        Some(Stmt::If(IfStmt {
            condition,
            then_branch,
            else_branch,
            span,
        }))
    }

    /// `while (c) stmt`
    fn parse_while(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let condition = self.parse_condition()?;
        let body = self.parse_body()?;
        let span = start.merge(self.previous_span());
        Some(Stmt::While(WhileStmt {
            condition,
            body,
            span,
        }))
    }

    /// `do stmt while (c)`
    fn parse_do_while(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let body = self.parse_body()?;
        if !self.eat_past_newlines(&TokenKind::While) {
            let message = format!("Expected 'while' after 'do' body, got '{}'", self.peek_kind());
            self.error_at_current(DiagnosticCode::UNEXPECTED_TOKEN, message);
            return None;
        }
        let condition = self.parse_condition()?;
        let span = start.merge(self.previous_span());
        self.expect_terminator();
        Some(Stmt::DoWhile(WhileStmt {
            condition,
            body,
            span,
        }))
    }

    /// `for (init; cond; update) stmt` or `for (const x of e) stmt`
    fn parse_for(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        self.expect(&TokenKind::LParen)?;

        let is_for_of = matches!(self.peek_kind(), TokenKind::Let | TokenKind::Const)
            && matches!(self.look_ahead(1), TokenKind::Identifier(_))
            && self.look_ahead(2) == &TokenKind::Of;
        if is_for_of {
            let kind = match self.advance().kind {
                TokenKind::Const => DeclKind::Const,
                _ => DeclKind::Let,
            };
            let binding = self.expect_identifier()?;
            self.expect(&TokenKind::Of)?;
            let iterable = self.parse_expression()?;
            self.expect(&TokenKind::RParen)?;
            let body = self.parse_body()?;
            let span = start.merge(self.previous_span());
            return Some(Stmt::ForOf(ForOfStmt {
                kind,
                binding,
                iterable,
                body,
                span,
            }));
        }

        let init = match self.peek_kind() {
            TokenKind::Semicolon => None,
            TokenKind::Let | TokenKind::Const | TokenKind::Var => {
                Some(Box::new(self.parse_declaration()?))
            }
            _ => Some(Box::new(self.parse_simple_statement()?)),
        };
        self.expect(&TokenKind::Semicolon)?;

        let condition = if self.check_exact(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        let update = if self.check_exact(&TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_simple_statement()?))
        };
        self.expect(&TokenKind::RParen)?;

        let body = self.parse_body()?;
        let span = start.merge(self.previous_span());
        Some(Stmt::For(ForStmt {
            init,
            condition,
            update,
            body,
            span,
        }))
    }

    /// `return [Expression]`
    fn parse_return(&mut self) -> Option<Stmt> {
        let start = self.advance().span;
        let value = if self.at_terminator() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        let span = start.merge(self.previous_span());
        self.expect_terminator();
        Some(Stmt::Return(ReturnStmt { value, span }))
    }
}
