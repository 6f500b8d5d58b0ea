//! Expression parsing with full operator precedence.
//!
//! Precedence (lowest → highest):
//! 9. `c ? a : b` (right-associative)
//! 8. `||`
//! 7. `&&`
//! 6. `===`, `!==`, `==`, `!=`
//! 5. `<`, `<=`, `>`, `>=`
//! 4. `+`, `-`
//! 3. `*`, `/`, `%`
//! 2. `**` (right-associative), unary `!`, `-`, `+`
//! 1. `.` (member / method call), `[]` (index), `()` (call)
//!
//! A binary operator at the start of the next line continues the
//! expression, except `+` and `-`, which may begin a new statement.

use kata_lexer::token::TokenKind;
use kata_types::ast::*;
use kata_types::{DiagnosticCode, Span};

use crate::parser::{Parser, MAX_NESTING};

fn logical_or_op(kind: &TokenKind) -> Option<BinOp> {
    matches!(kind, TokenKind::PipePipe).then_some(BinOp::Or)
}

fn logical_and_op(kind: &TokenKind) -> Option<BinOp> {
    matches!(kind, TokenKind::AmpAmp).then_some(BinOp::And)
}

fn equality_op(kind: &TokenKind) -> Option<BinOp> {
    match kind {
        TokenKind::EqEqEq => Some(BinOp::StrictEq),
        TokenKind::BangEqEq => Some(BinOp::StrictNe),
        TokenKind::EqEq => Some(BinOp::LooseEq),
        TokenKind::BangEq => Some(BinOp::LooseNe),
        _ => None,
    }
}

fn relational_op(kind: &TokenKind) -> Option<BinOp> {
    match kind {
        TokenKind::Less => Some(BinOp::Lt),
        TokenKind::LessEq => Some(BinOp::Le),
        TokenKind::Greater => Some(BinOp::Gt),
        TokenKind::GreaterEq => Some(BinOp::Ge),
        _ => None,
    }
}

fn additive_op(kind: &TokenKind) -> Option<BinOp> {
    match kind {
        TokenKind::Plus => Some(BinOp::Add),
        TokenKind::Minus => Some(BinOp::Sub),
        _ => None,
    }
}

fn multiplicative_op(kind: &TokenKind) -> Option<BinOp> {
    match kind {
        TokenKind::Star => Some(BinOp::Mul),
        TokenKind::Slash => Some(BinOp::Div),
        TokenKind::Percent => Some(BinOp::Rem),
        _ => None,
    }
}

impl<'src> Parser<'src> {
    // ══════════════════════════════════════════════════════════════════════════
    // Entry Point
    // ══════════════════════════════════════════════════════════════════════════

    /// Parse an expression.
    pub(crate) fn parse_expression(&mut self) -> Option<Expr> {
        self.nested(Self::parse_conditional)
    }

    /// Run a recursive parse one nesting level deeper.
    fn nested(&mut self, parse: fn(&mut Self) -> Option<Expr>) -> Option<Expr> {
        self.expr_depth += 1;
        if self.expr_depth > MAX_NESTING {
            self.error_at_current(
                DiagnosticCode::NESTING_TOO_DEEP,
                format!("Expressions may nest at most {MAX_NESTING} levels deep"),
            );
            self.expr_depth -= 1;
            return None;
        }
        let result = parse(self);
        self.expr_depth -= 1;
        result
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Precedence Chain
    // ══════════════════════════════════════════════════════════════════════════

    /// `Conditional = Or [ "?" Expression ":" Conditional ]`
    fn parse_conditional(&mut self) -> Option<Expr> {
        let condition = self.parse_binary_level(0)?;
        if !self.eat_past_newlines(&TokenKind::Question) {
            return Some(condition);
        }
        self.skip_newlines();
        let then_expr = self.parse_expression()?;
        if !self.eat_past_newlines(&TokenKind::Colon) {
            let message = format!("Expected ':' in conditional expression, got '{}'", self.peek_kind());
            self.error_at_current(DiagnosticCode::UNEXPECTED_TOKEN, message);
            return None;
        }
        self.skip_newlines();
        let else_expr = self.nested(Self::parse_conditional)?;
        let span = condition.span.merge(else_expr.span);
        let expr = self.mk_expr(
            ExprKind::Conditional {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        );
        self.within_height(expr)
    }

    /// Left-associative binary levels, from `||` (0) to `* / %` (5).
    fn parse_binary_level(&mut self, level: usize) -> Option<Expr> {
        let classify: fn(&TokenKind) -> Option<BinOp> = match level {
            0 => logical_or_op,
            1 => logical_and_op,
            2 => equality_op,
            3 => relational_op,
            4 => additive_op,
            5 => multiplicative_op,
            _ => return self.parse_unary(),
        };

        let mut left = self.parse_binary_level(level + 1)?;
        while let Some(op) = self.match_binary(classify) {
            let right = self.parse_binary_level(level + 1)?;
            let span = left.span.merge(right.span);
            let expr = self.mk_expr(
                ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
            left = self.within_height(expr)?;
        }
        Some(left)
    }

    /// Consume a binary operator of the given class, looking past newlines
    /// where continuation is unambiguous.
    fn match_binary(&mut self, classify: fn(&TokenKind) -> Option<BinOp>) -> Option<BinOp> {
        let op = classify(self.peek_past_newlines())?;
        if self.check_exact(&TokenKind::Newline) && matches!(op, BinOp::Add | BinOp::Sub) {
            return None;
        }
        self.skip_newlines();
        self.advance();
        self.skip_newlines();
        Some(op)
    }

    /// `Unary = Prefix | Power`
    ///
    /// A prefixed operand may not be the base of `**`.
    fn parse_unary(&mut self) -> Option<Expr> {
        if self.unary_op().is_none() {
            return self.parse_power();
        }
        let expr = self.parse_prefix()?;
        if self.check_exact(&TokenKind::StarStar) {
            self.error_with_suggestion(
                DiagnosticCode::UNEXPECTED_TOKEN,
                "A unary operator cannot appear directly before '**'",
                self.current_span(),
                "Wrap the left operand in parentheses, like '(-2) ** 2'",
            );
            return None;
        }
        Some(expr)
    }

    /// `Prefix = ("!" | "-" | "+") Prefix | Postfix`
    fn parse_prefix(&mut self) -> Option<Expr> {
        let Some(op) = self.unary_op() else {
            return self.parse_postfix();
        };
        let start = self.advance().span;
        let operand = self.nested(Self::parse_prefix)?;
        let span = start.merge(operand.span);
        let expr = self.mk_expr(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        );
        self.within_height(expr)
    }

    fn unary_op(&self) -> Option<UnaryOp> {
        match self.peek_kind() {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            _ => None,
        }
    }

    /// `Power = Postfix [ "**" Unary ]`
    fn parse_power(&mut self) -> Option<Expr> {
        let base = self.parse_postfix()?;
        if !self.eat_past_newlines(&TokenKind::StarStar) {
            return Some(base);
        }
        self.skip_newlines();
        let exponent = self.nested(Self::parse_unary)?;
        let span = base.span.merge(exponent.span);
        let expr = self.mk_expr(
            ExprKind::Binary {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exponent),
            },
            span,
        );
        self.within_height(expr)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Postfix: member access, method calls, indexing, calls
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.eat_past_newlines(&TokenKind::Dot) {
                let name = self.expect_member_name()?;
                if self.check_exact(&TokenKind::LParen) {
                    let (args, end) = self.parse_call_args()?;
                    let span = expr.span.merge(end);
                    expr = self.mk_expr(
                        ExprKind::MethodCall {
                            object: Box::new(expr),
                            method: name,
                            args,
                        },
                        span,
                    );
                } else {
                    let span = expr.span.merge(name.span);
                    expr = self.mk_expr(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: name,
                        },
                        span,
                    );
                }
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                let end = self.expect(&TokenKind::RBracket)?.span;
                let span = expr.span.merge(end);
                expr = self.mk_expr(
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else if self.check_exact(&TokenKind::LParen) {
                let callee = match &expr.kind {
                    ExprKind::Identifier(name) => Ident::new(name.clone(), expr.span),
                    _ => {
                        self.error_at(
                            DiagnosticCode::NOT_CALLABLE,
                            "This expression is not callable",
                            expr.span,
                        );
                        return None;
                    }
                };
                let (args, end) = self.parse_call_args()?;
                let span = expr.span.merge(end);
                expr = self.mk_expr(ExprKind::Call { callee, args }, span);
            } else {
                break;
            }
            expr = self.within_height(expr)?;
        }

        Some(expr)
    }

    /// `"(" [ Expression { "," Expression } [","] ] ")"`; returns the span of
    /// the closing parenthesis.
    pub(crate) fn parse_call_args(&mut self) -> Option<(Vec<Expr>, Span)> {
        self.expect(&TokenKind::LParen)?;
        let args = self.parse_expression_list(&TokenKind::RParen)?;
        let end = self.expect(&TokenKind::RParen)?.span;
        Some((args, end))
    }

    /// Comma-separated expressions up to (not including) `close`.
    fn parse_expression_list(&mut self, close: &TokenKind) -> Option<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check_exact(close) && !self.at_end() {
            items.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Some(items)
    }

    // ══════════════════════════════════════════════════════════════════════════
    // Primary Expressions
    // ══════════════════════════════════════════════════════════════════════════

    fn parse_primary(&mut self) -> Option<Expr> {
        let span = self.current_span();
        match self.peek_kind().clone() {
            TokenKind::NumberLit(value) => {
                self.advance();
                Some(self.mk_expr(ExprKind::NumberLit(value), span))
            }
            TokenKind::StringLiteral(value) => {
                self.advance();
                Some(self.mk_expr(ExprKind::StringLit(value), span))
            }
            TokenKind::True => {
                self.advance();
                Some(self.mk_expr(ExprKind::BoolLit(true), span))
            }
            TokenKind::False => {
                self.advance();
                Some(self.mk_expr(ExprKind::BoolLit(false), span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Some(self.mk_expr(ExprKind::Identifier(name), span))
            }
            TokenKind::TemplateStart(head) => self.parse_template(head),
            TokenKind::LBracket => {
                self.advance();
                let items = self.parse_expression_list(&TokenKind::RBracket)?;
                let end = self.expect(&TokenKind::RBracket)?.span;
                Some(self.mk_expr(ExprKind::ArrayLit(items), span.merge(end)))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                let end = self.expect(&TokenKind::RParen)?.span;
                let expr = self.mk_expr(ExprKind::Paren(Box::new(inner)), span.merge(end));
                self.within_height(expr)
            }
            TokenKind::New => self.parse_new_error(),
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let message = format!(
                    "'{}' is only supported as a statement, like 'x++'",
                    self.peek_kind()
                );
                self.error_at_current(DiagnosticCode::EXPECTED_EXPRESSION, message);
                None
            }
            TokenKind::Unsupported(word) => {
                let suggestion = match word.as_str() {
                    "null" | "undefined" => "Give the variable a value of its declared type",
                    "typeof" => "Types are checked before the program runs",
                    _ => "Snippets support functions, loops, arrays and strings",
                };
                self.error_with_suggestion(
                    DiagnosticCode::RESERVED_WORD,
                    format!("'{word}' is not supported"),
                    span,
                    suggestion,
                );
                None
            }
            other => {
                let message = format!("Expected expression, got '{other}'");
                self.error_at_current(DiagnosticCode::EXPECTED_EXPRESSION, message);
                None
            }
        }
    }

    /// `` `head ${e} middle ${e} tail` ``
    fn parse_template(&mut self, head: String) -> Option<Expr> {
        let start = self.advance().span;
        let mut parts = Vec::new();
        if !head.is_empty() {
            parts.push(TemplatePart::Literal(head));
        }

        loop {
            self.expect(&TokenKind::InterpolationStart)?;
            let expr = self.parse_expression()?;
            parts.push(TemplatePart::Expr(expr));
            self.expect(&TokenKind::InterpolationEnd)?;

            match self.peek_kind().clone() {
                TokenKind::TemplatePart(text) => {
                    self.advance();
                    if !text.is_empty() {
                        parts.push(TemplatePart::Literal(text));
                    }
                }
                TokenKind::TemplateEnd(text) => {
                    let end = self.advance().span;
                    if !text.is_empty() {
                        parts.push(TemplatePart::Literal(text));
                    }
                    return Some(self.mk_expr(ExprKind::Template(parts), start.merge(end)));
                }
                other => {
                    let message = format!("Expected the rest of the template literal, got '{other}'");
                    self.error_at_current(DiagnosticCode::UNTERMINATED_STRING, message);
                    return None;
                }
            }
        }
    }

    /// `new Error(args...)`
    fn parse_new_error(&mut self) -> Option<Expr> {
        let start = self.advance().span;
        match self.peek_kind() {
            TokenKind::Identifier(name) if name == "Error" => {
                self.advance();
            }
            _ => {
                self.error_with_suggestion(
                    DiagnosticCode::UNEXPECTED_TOKEN,
                    "Only 'new Error(...)' is supported",
                    self.current_span(),
                    "Use an array literal or a function instead",
                );
                return None;
            }
        }
        let (args, end) = self.parse_call_args()?;
        Some(self.mk_expr(ExprKind::NewError { args }, start.merge(end)))
    }
}
