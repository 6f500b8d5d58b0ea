//! Core parser infrastructure: token cursor, error reporting, helpers.

use kata_lexer::token::{Token, TokenKind};
use kata_types::ast::{Expr, ExprId, ExprKind, Ident, Item, Program, TemplatePart};
use kata_types::{Diagnostic, DiagnosticCode, Diagnostics, SourceFile, Span, MAX_DIAGNOSTICS};

/// Maximum nesting of expressions or statements before the parser gives up
/// on a construct.
pub(crate) const MAX_NESTING: u32 = 64;

/// Maximum height of one expression tree, counting every operator, call and
/// member link. Operator chains are built in loops, so they are bounded here
/// rather than by `MAX_NESTING`.
pub(crate) const MAX_EXPR_HEIGHT: u32 = 2 * MAX_NESTING;

/// The KataScript parser.
///
/// Consumes a token stream produced by the lexer and builds an AST.
/// Collects errors and attempts recovery when possible.
pub struct Parser<'src> {
    tokens: Vec<Token>,
    /// Current index into `tokens`.
    pos: usize,
    source_file: &'src SourceFile,
    file_name: String,
    errors: Diagnostics,
    next_expr_id: u32,
    /// Tree height of each expression built so far, indexed by `ExprId`.
    heights: Vec<u32>,
    pub(crate) expr_depth: u32,
    pub(crate) stmt_depth: u32,
}

/// Result of parsing.
pub struct ParseResult {
    pub program: Program,
    pub errors: Diagnostics,
}

impl<'src> Parser<'src> {
    pub fn new(tokens: Vec<Token>, source_file: &'src SourceFile) -> Self {
        let mut tokens = tokens;
        if tokens.last().map_or(true, |t| t.kind != TokenKind::Eof) {
            tokens.push(Token::new(TokenKind::Eof, Span::point(1, 1)));
        }
        Self {
            tokens,
            pos: 0,
            file_name: source_file.name.clone(),
            source_file,
            errors: Diagnostics::empty(),
            next_expr_id: 0,
            heights: Vec::new(),
            expr_depth: 0,
            stmt_depth: 0,
        }
    }

    // ── Token Cursor ──────────────────────────────────────────────────────────

    /// Returns the current token without advancing.
    pub(crate) fn peek(&self) -> &Token {
        // `new` guarantees a trailing Eof, so the index is clamped onto it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    /// Advance the cursor by one and return the consumed token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Returns the previously consumed token's span.
    pub(crate) fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::point(1, 1)
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn check_exact(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// If the current token matches, advance and return `true`.
    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check_exact(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Look ahead by `n` tokens from current position.
    pub(crate) fn look_ahead(&self, n: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    // ── Newline Handling ──────────────────────────────────────────────────────

    /// Skip all consecutive newline tokens.
    pub(crate) fn skip_newlines(&mut self) {
        while self.check_exact(&TokenKind::Newline) {
            self.advance();
        }
    }

    /// The first non-newline token kind from the current position.
    pub(crate) fn peek_past_newlines(&self) -> &TokenKind {
        let mut idx = self.pos;
        while let Some(token) = self.tokens.get(idx) {
            if token.kind != TokenKind::Newline {
                return &token.kind;
            }
            idx += 1;
        }
        &TokenKind::Eof
    }

    /// Skip newlines only if `kind` follows them, then consume it.
    pub(crate) fn eat_past_newlines(&mut self, kind: &TokenKind) -> bool {
        if self.peek_past_newlines() == kind {
            self.skip_newlines();
            self.advance();
            true
        } else {
            false
        }
    }

    /// Whether the current token ends a statement without being consumed
    /// by it.
    pub(crate) fn at_terminator(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Semicolon | TokenKind::Newline | TokenKind::RBrace | TokenKind::Eof
        )
    }

    /// Expect `;`, a newline, `}` or end of file after a simple statement.
    pub(crate) fn expect_terminator(&mut self) {
        match self.peek_kind() {
            TokenKind::Semicolon | TokenKind::Newline => {
                self.advance();
            }
            TokenKind::RBrace | TokenKind::Eof => {}
            other => {
                let message = format!("Expected ';' or newline, got '{other}'");
                self.error_at_current(DiagnosticCode::UNEXPECTED_TOKEN, message);
                self.synchronize();
            }
        }
    }

    // ── Expect Helpers ────────────────────────────────────────────────────────

    /// Expect a specific token kind. Returns the token if matched, or emits an error.
    pub(crate) fn expect(&mut self, expected: &TokenKind) -> Option<Token> {
        if self.check_exact(expected) {
            Some(self.advance())
        } else {
            let message = format!("Expected '{}', got '{}'", expected, self.peek_kind());
            self.error_at_current(DiagnosticCode::UNEXPECTED_TOKEN, message);
            None
        }
    }

    /// Expect an identifier token.
    pub(crate) fn expect_identifier(&mut self) -> Option<Ident> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                let span = self.advance().span;
                Some(Ident::new(name, span))
            }
            kind if kind.is_keyword() => {
                let message = format!("'{kind}' is a reserved word and cannot be used as a name");
                self.error_at_current(DiagnosticCode::RESERVED_WORD, message);
                None
            }
            kind => {
                let message = format!("Expected identifier, got '{kind}'");
                self.error_at_current(DiagnosticCode::UNEXPECTED_TOKEN, message);
                None
            }
        }
    }

    /// Expect a property or method name after `.`; keywords are allowed here.
    pub(crate) fn expect_member_name(&mut self) -> Option<Ident> {
        let kind = self.peek_kind().clone();
        match &kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let span = self.advance().span;
                Some(Ident::new(name, span))
            }
            _ if kind.is_keyword() => {
                let span = self.advance().span;
                Some(Ident::new(kind.to_string(), span))
            }
            _ => {
                let message = format!("Expected property name, got '{kind}'");
                self.error_at_current(DiagnosticCode::UNEXPECTED_TOKEN, message);
                None
            }
        }
    }

    // ── Expression Construction ───────────────────────────────────────────────

    /// Build an expression node with a fresh id.
    pub(crate) fn mk_expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        let id = ExprId(self.next_expr_id);
        self.next_expr_id += 1;
        let height = 1 + self.children_height(&kind);
        self.heights.push(height);
        Expr::new(id, kind, span)
    }

    fn height(&self, expr: &Expr) -> u32 {
        self.heights.get(expr.id.0 as usize).copied().unwrap_or(1)
    }

    fn tallest<'e>(&self, exprs: impl Iterator<Item = &'e Expr>) -> u32 {
        exprs.map(|e| self.height(e)).max().unwrap_or(0)
    }

    /// Height of the tallest direct child of `kind`.
    fn children_height(&self, kind: &ExprKind) -> u32 {
        match kind {
            ExprKind::NumberLit(_)
            | ExprKind::StringLit(_)
            | ExprKind::BoolLit(_)
            | ExprKind::Identifier(_) => 0,
            ExprKind::Template(parts) => self.tallest(parts.iter().filter_map(|p| match p {
                TemplatePart::Expr(e) => Some(e),
                TemplatePart::Literal(_) => None,
            })),
            ExprKind::ArrayLit(items) => self.tallest(items.iter()),
            ExprKind::Call { args, .. } | ExprKind::NewError { args } => self.tallest(args.iter()),
            ExprKind::Member { object, .. } => self.height(object),
            ExprKind::MethodCall { object, args, .. } => {
                self.tallest(std::iter::once(&**object).chain(args))
            }
            ExprKind::Index { object, index } => self.height(object).max(self.height(index)),
            ExprKind::Binary { left, right, .. } => self.height(left).max(self.height(right)),
            ExprKind::Unary { operand, .. } | ExprKind::Paren(operand) => self.height(operand),
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => self
                .height(condition)
                .max(self.height(then_expr))
                .max(self.height(else_expr)),
        }
    }

    /// Pass `expr` through unless its tree is taller than `MAX_EXPR_HEIGHT`,
    /// in which case report it and stop parsing the expression.
    pub(crate) fn within_height(&mut self, expr: Expr) -> Option<Expr> {
        if self.height(&expr) <= MAX_EXPR_HEIGHT {
            return Some(expr);
        }
        self.error_at(
            DiagnosticCode::NESTING_TOO_DEEP,
            format!("Expressions may chain at most {MAX_EXPR_HEIGHT} operations deep"),
            expr.span,
        );
        None
    }

    // ── Error Reporting ───────────────────────────────────────────────────────

    pub(crate) fn error_at_current(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        let span = self.current_span();
        self.error_at(code, message, span);
    }

    pub(crate) fn error_at(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        let diagnostic = self.diagnostic(code, message, span);
        self.errors.push(diagnostic);
    }

    pub(crate) fn error_with_suggestion(
        &mut self,
        code: DiagnosticCode,
        message: impl Into<String>,
        span: Span,
        suggestion: impl Into<String>,
    ) {
        let diagnostic = self.diagnostic(code, message, span).with_suggestion(suggestion);
        self.errors.push(diagnostic);
    }

    fn diagnostic(&self, code: DiagnosticCode, message: impl Into<String>, span: Span) -> Diagnostic {
        let source_line = self
            .source_file
            .line(span.start_line)
            .unwrap_or("")
            .to_string();
        Diagnostic::new(&self.file_name, code, message, span, source_line)
    }

    /// Returns `true` if we've hit the error limit and should stop.
    pub(crate) fn too_many_errors(&self) -> bool {
        self.errors.total_errors >= MAX_DIAGNOSTICS
    }

    // ── Synchronization ───────────────────────────────────────────────────────

    /// Skip tokens until a statement boundary.
    /// Used after an error to resume at a known-good position.
    pub(crate) fn synchronize(&mut self) {
        while !self.at_end() {
            match self.peek_kind() {
                TokenKind::Newline | TokenKind::Semicolon => {
                    self.advance();
                    self.skip_newlines();
                    return;
                }
                TokenKind::Let
                | TokenKind::Const
                | TokenKind::Var
                | TokenKind::Function
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::For
                | TokenKind::Return
                | TokenKind::Throw
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::RBrace => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Recover after a failed statement, guaranteeing forward progress.
    pub(crate) fn recover_from(&mut self, start_pos: usize) {
        self.synchronize();
        if self.position() == start_pos && !self.at_end() {
            self.advance();
        }
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Parse the token stream into a `Program` AST.
    pub fn parse(mut self) -> ParseResult {
        let start = self.current_span();
        let mut items = Vec::new();

        loop {
            self.skip_separators();
            if self.at_end() || self.too_many_errors() {
                break;
            }
            let start_pos = self.position();

            if self.check_exact(&TokenKind::RBrace) {
                self.error_at_current(DiagnosticCode::UNEXPECTED_TOKEN, "Unexpected '}'");
                self.advance();
                continue;
            }

            let item = if self.check_exact(&TokenKind::Function) {
                self.parse_function_decl().map(Item::Function)
            } else {
                self.parse_statement().map(Item::Stmt)
            };

            match item {
                Some(item) => items.push(item),
                None => self.recover_from(start_pos),
            }
        }

        let span = start.merge(self.previous_span());
        ParseResult {
            program: Program { items, span },
            errors: self.errors,
        }
    }

    /// Skip blank lines and empty statements.
    pub(crate) fn skip_separators(&mut self) {
        while matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }
}
