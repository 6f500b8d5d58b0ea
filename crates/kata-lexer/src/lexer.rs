//! Core KataScript lexer: converts snippet text to a token stream.
//!
//! Features:
//! - Template literals with nested `${expr}` via a mode stack
//! - Line (`//`) and block (`/* */`) comments stripped
//! - Newlines are statement terminators except inside `()`, `[]` and
//!   interpolations
//! - Error recovery: collects up to [`MAX_DIAGNOSTICS`] errors instead of
//!   stopping at the first

use kata_types::{Diagnostic, DiagnosticCode, Diagnostics, SourceFile, Span, MAX_DIAGNOSTICS};

use crate::token::{Token, TokenKind};

/// Lexer mode, tracking whether we are scanning code or template text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    /// Inside a template literal, scanning text until `` ` `` or `${`.
    Template,
    /// Inside `${...}`. `brace_depth` counts nested `{` so the closing `}`
    /// of the interpolation can be told apart.
    Interpolation { brace_depth: u32 },
}

/// The KataScript lexer.
pub struct Lexer<'src> {
    text: &'src str,
    source: &'src [u8],
    source_file: &'src SourceFile,
    file_name: &'src str,
    /// Current byte offset into `source`.
    pos: usize,
    /// Current line number (1-based).
    line: u32,
    /// Current column number in characters (1-based).
    col: u32,
    errors: Diagnostics,
    mode_stack: Vec<Mode>,
    /// Tokens to emit before the next scan (used for interpolation).
    pending: Vec<Token>,
    /// Open `(` and `[` count.
    group_depth: u32,
}

/// Result of lexing: tokens + any errors collected.
pub struct LexResult {
    /// The token stream (always ends with [`TokenKind::Eof`]).
    pub tokens: Vec<Token>,
    pub errors: Diagnostics,
}

impl<'src> Lexer<'src> {
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self {
            text: &source_file.source,
            source: source_file.source.as_bytes(),
            source_file,
            file_name: &source_file.name,
            pos: 0,
            line: 1,
            col: 1,
            errors: Diagnostics::empty(),
            mode_stack: vec![Mode::Normal],
            pending: Vec::new(),
            group_depth: 0,
        }
    }

    /// Lex the entire source file into a token stream.
    pub fn lex(mut self) -> LexResult {
        let mut tokens = Vec::new();

        loop {
            if self.error_cap_reached() {
                break;
            }

            if let Some(pending) = self.pending.pop() {
                tokens.push(pending);
                continue;
            }

            let token = match self.current_mode() {
                Mode::Normal | Mode::Interpolation { .. } => self.scan_normal(),
                Mode::Template => self.scan_template_continuation(),
            };

            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);

            if is_eof {
                break;
            }
        }

        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            tokens.push(Token::new(TokenKind::Eof, self.current_span()));
        }

        LexResult {
            tokens,
            errors: self.errors,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Mode stack helpers
    // ─────────────────────────────────────────────────────────────

    fn current_mode(&self) -> Mode {
        *self.mode_stack.last().unwrap_or(&Mode::Normal)
    }

    fn push_mode(&mut self, mode: Mode) {
        self.mode_stack.push(mode);
    }

    fn pop_mode(&mut self) {
        if self.mode_stack.len() > 1 {
            self.mode_stack.pop();
        }
    }

    fn newlines_significant(&self) -> bool {
        self.group_depth == 0 && self.current_mode() == Mode::Normal
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else if ch & 0xC0 != 0x80 {
            // UTF-8 continuation bytes do not start a new column.
            self.col += 1;
        }
        Some(ch)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn current_span(&self) -> Span {
        Span::point(self.line, self.col)
    }

    fn span_from(&self, start_line: u32, start_col: u32) -> Span {
        Span::new(
            start_line,
            start_col,
            self.line,
            self.col.saturating_sub(1).max(1),
        )
    }

    fn error_cap_reached(&self) -> bool {
        self.errors.total_errors >= MAX_DIAGNOSTICS
    }

    fn source_line_at(&self, line: u32) -> String {
        self.source_file.line(line).unwrap_or("").to_string()
    }

    fn emit_error(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        let source_line = self.source_line_at(span.start_line);
        let err = Diagnostic::new(self.file_name, code, message, span, source_line);
        self.errors.push(err);
    }

    fn emit_error_with_suggestion(
        &mut self,
        code: DiagnosticCode,
        message: impl Into<String>,
        span: Span,
        suggestion: impl Into<String>,
    ) {
        let source_line = self.source_line_at(span.start_line);
        let err = Diagnostic::new(self.file_name, code, message, span, source_line)
            .with_suggestion(suggestion);
        self.errors.push(err);
    }

    // ─────────────────────────────────────────────────────────────
    // Whitespace & comments
    // ─────────────────────────────────────────────────────────────

    /// Skip spaces, tabs and comments (NOT newlines, those are tokens).
    ///
    /// Returns the span of a block comment that contained a line break,
    /// since such a comment terminates a statement like a newline does.
    fn skip_trivia(&mut self) -> Option<Span> {
        let mut broke_line = None;
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(b' ' | b'\t' | b'\r'), _) => {
                    self.advance();
                }
                (Some(b'/'), Some(b'/')) => {
                    while let Some(ch) = self.peek() {
                        if ch == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    let start_line = self.line;
                    let start_col = self.col;
                    self.advance();
                    self.advance();
                    let mut closed = false;
                    while let Some(ch) = self.peek() {
                        if ch == b'*' && self.peek_at(1) == Some(b'/') {
                            self.advance();
                            self.advance();
                            closed = true;
                            break;
                        }
                        self.advance();
                    }
                    let span = self.span_from(start_line, start_col);
                    if !closed {
                        self.emit_error(
                            DiagnosticCode::UNEXPECTED_TOKEN,
                            "Unterminated block comment",
                            span,
                        );
                    } else if self.line > start_line {
                        broke_line = Some(span);
                    }
                }
                _ => return broke_line,
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Normal-mode scanning
    // ─────────────────────────────────────────────────────────────

    /// Scan one token in code mode.
    fn scan_normal(&mut self) -> Token {
        loop {
            let comment_break = self.skip_trivia();
            if let Some(span) = comment_break {
                if self.newlines_significant() {
                    return Token::new(TokenKind::Newline, span);
                }
            }

            if self.error_cap_reached() {
                return Token::new(TokenKind::Eof, self.current_span());
            }

            if self.at_end() {
                if self
                    .mode_stack
                    .iter()
                    .any(|m| matches!(m, Mode::Template | Mode::Interpolation { .. }))
                {
                    self.emit_error(
                        DiagnosticCode::UNTERMINATED_STRING,
                        "Unterminated template literal",
                        self.current_span(),
                    );
                    self.mode_stack.truncate(1);
                }
                return Token::new(TokenKind::Eof, self.current_span());
            }

            let start_pos = self.pos;
            let start_line = self.line;
            let start_col = self.col;
            let Some(ch) = self.advance() else {
                return Token::new(TokenKind::Eof, self.current_span());
            };

            let kind = match ch {
                b'\n' => {
                    if !self.newlines_significant() {
                        continue;
                    }
                    TokenKind::Newline
                }

                b'"' | b'\'' => return self.scan_string(ch, start_line, start_col),
                b'`' => return self.scan_template(start_line, start_col),

                b'0'..=b'9' => return self.scan_number(start_pos, start_line, start_col),
                b'.' if matches!(self.peek(), Some(b'0'..=b'9')) => {
                    return self.scan_number(start_pos, start_line, start_col)
                }

                b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => {
                    return self.scan_identifier(start_pos, start_line, start_col)
                }

                // ── Operators ──
                b'+' => self.pick(
                    &[("+", TokenKind::PlusPlus), ("=", TokenKind::PlusEq)],
                    TokenKind::Plus,
                ),
                b'-' => self.pick(
                    &[("-", TokenKind::MinusMinus), ("=", TokenKind::MinusEq)],
                    TokenKind::Minus,
                ),
                b'*' => self.pick(
                    &[("*", TokenKind::StarStar), ("=", TokenKind::StarEq)],
                    TokenKind::Star,
                ),
                b'/' => self.pick(&[("=", TokenKind::SlashEq)], TokenKind::Slash),
                b'%' => self.pick(&[("=", TokenKind::PercentEq)], TokenKind::Percent),
                b'=' => self.pick(
                    &[
                        ("==", TokenKind::EqEqEq),
                        ("=", TokenKind::EqEq),
                        (">", TokenKind::FatArrow),
                    ],
                    TokenKind::Eq,
                ),
                b'!' => self.pick(
                    &[("==", TokenKind::BangEqEq), ("=", TokenKind::BangEq)],
                    TokenKind::Bang,
                ),
                b'<' => self.pick(&[("=", TokenKind::LessEq)], TokenKind::Less),
                b'>' => self.pick(&[("=", TokenKind::GreaterEq)], TokenKind::Greater),
                b'&' | b'|' if self.peek() == Some(ch) => {
                    self.advance();
                    if ch == b'&' {
                        TokenKind::AmpAmp
                    } else {
                        TokenKind::PipePipe
                    }
                }
                b'&' | b'|' => {
                    let span = self.span_from(start_line, start_col);
                    let (op, name) = if ch == b'&' { ("&&", "and") } else { ("||", "or") };
                    self.emit_error_with_suggestion(
                        DiagnosticCode::INVALID_CHARACTER,
                        format!("Bitwise operator '{}' is not supported", ch as char),
                        span,
                        format!("Use '{op}' for logical {name}"),
                    );
                    continue;
                }
                b'?' => TokenKind::Question,

                // ── Punctuation ──
                b'(' => {
                    self.group_depth += 1;
                    TokenKind::LParen
                }
                b')' => {
                    self.group_depth = self.group_depth.saturating_sub(1);
                    TokenKind::RParen
                }
                b'[' => {
                    self.group_depth += 1;
                    TokenKind::LBracket
                }
                b']' => {
                    self.group_depth = self.group_depth.saturating_sub(1);
                    TokenKind::RBracket
                }
                b',' => TokenKind::Comma,
                b':' => TokenKind::Colon,
                b';' => TokenKind::Semicolon,
                b'.' => TokenKind::Dot,

                b'{' => {
                    if let Some(Mode::Interpolation { brace_depth }) = self.mode_stack.last_mut() {
                        *brace_depth += 1;
                    }
                    TokenKind::LBrace
                }
                b'}' => match self.current_mode() {
                    Mode::Interpolation { brace_depth: 0 } => {
                        // This `}` ends the interpolation; back to template text.
                        self.pop_mode();
                        self.push_mode(Mode::Template);
                        TokenKind::InterpolationEnd
                    }
                    _ => {
                        if let Some(Mode::Interpolation { brace_depth }) =
                            self.mode_stack.last_mut()
                        {
                            *brace_depth -= 1;
                        }
                        TokenKind::RBrace
                    }
                },

                _ => {
                    // Skip the rest of a multi-byte character.
                    while matches!(self.peek(), Some(b) if b & 0xC0 == 0x80) {
                        self.advance();
                    }
                    let bad = self.text[start_pos..self.pos].to_string();
                    let span = self.span_from(start_line, start_col);
                    if matches!(bad.as_str(), "\u{201C}" | "\u{201D}" | "\u{2018}" | "\u{2019}") {
                        self.emit_error_with_suggestion(
                            DiagnosticCode::INVALID_CHARACTER,
                            format!("Invalid character '{bad}'"),
                            span,
                            "Use straight quotes (\" or ') for strings",
                        );
                    } else {
                        self.emit_error(
                            DiagnosticCode::INVALID_CHARACTER,
                            format!("Invalid character '{bad}'"),
                            span,
                        );
                    }
                    continue;
                }
            };

            return Token::new(kind, self.span_from(start_line, start_col));
        }
    }

    /// Consume the first matching continuation and return its kind.
    fn pick(&mut self, options: &[(&str, TokenKind)], fallback: TokenKind) -> TokenKind {
        for (rest, kind) in options {
            let matches = rest
                .bytes()
                .enumerate()
                .all(|(i, b)| self.peek_at(i) == Some(b));
            if matches {
                for _ in 0..rest.len() {
                    self.advance();
                }
                return kind.clone();
            }
        }
        fallback
    }

    // ─────────────────────────────────────────────────────────────
    // Number literals
    // ─────────────────────────────────────────────────────────────

    fn scan_number(&mut self, start_pos: usize, start_line: u32, start_col: u32) -> Token {
        let leading_dot = self.source[start_pos] == b'.';

        while let Some(b'0'..=b'9') = self.peek() {
            self.advance();
        }

        if !leading_dot && self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9'))
        {
            self.advance();
            while let Some(b'0'..=b'9') = self.peek() {
                self.advance();
            }
        }

        if matches!(self.peek(), Some(b'e' | b'E')) {
            let digits_at = if matches!(self.peek_at(1), Some(b'+' | b'-')) { 2 } else { 1 };
            if matches!(self.peek_at(digits_at), Some(b'0'..=b'9')) {
                for _ in 0..digits_at {
                    self.advance();
                }
                while let Some(b'0'..=b'9') = self.peek() {
                    self.advance();
                }
            }
        }

        // A literal running straight into identifier characters is malformed.
        if matches!(self.peek(), Some(ch) if ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'$')
        {
            while matches!(self.peek(), Some(ch) if ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'$')
            {
                self.advance();
            }
            let text = &self.text[start_pos..self.pos];
            let span = self.span_from(start_line, start_col);
            if text.contains('_') {
                self.emit_error_with_suggestion(
                    DiagnosticCode::INVALID_NUMBER,
                    format!("Numeric separators are not supported in '{text}'"),
                    span,
                    "Remove the underscores",
                );
            } else {
                self.emit_error(
                    DiagnosticCode::INVALID_NUMBER,
                    format!("Invalid number literal '{text}'"),
                    span,
                );
            }
            return Token::new(TokenKind::NumberLit(0.0), span);
        }

        let span = self.span_from(start_line, start_col);
        let text = &self.text[start_pos..self.pos];
        let parsed = if leading_dot {
            format!("0{text}").parse::<f64>()
        } else {
            text.parse::<f64>()
        };
        match parsed {
            Ok(value) => Token::new(TokenKind::NumberLit(value), span),
            Err(_) => {
                self.emit_error(
                    DiagnosticCode::INVALID_NUMBER,
                    format!("Invalid number literal '{text}'"),
                    span,
                );
                Token::new(TokenKind::NumberLit(0.0), span)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Identifiers & keywords
    // ─────────────────────────────────────────────────────────────

    fn scan_identifier(&mut self, start_pos: usize, start_line: u32, start_col: u32) -> Token {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'$' {
                self.advance();
            } else {
                break;
            }
        }

        let span = self.span_from(start_line, start_col);
        let text = &self.text[start_pos..self.pos];
        let kind =
            TokenKind::from_keyword(text).unwrap_or_else(|| TokenKind::Identifier(text.to_string()));

        Token::new(kind, span)
    }

    // ─────────────────────────────────────────────────────────────
    // String & template literals
    // ─────────────────────────────────────────────────────────────

    /// Scan a quoted string after its opening quote.
    fn scan_string(&mut self, quote: u8, start_line: u32, start_col: u32) -> Token {
        let mut buf = Vec::new();

        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    let span = self.span_from(start_line, start_col);
                    self.emit_error_with_suggestion(
                        DiagnosticCode::UNTERMINATED_STRING,
                        "Unterminated string literal",
                        span,
                        format!("Close the string with {}", quote as char),
                    );
                    return Token::new(TokenKind::StringLiteral(into_string(buf)), span);
                }
                Some(ch) if ch == quote => {
                    self.advance();
                    return Token::new(
                        TokenKind::StringLiteral(into_string(buf)),
                        self.span_from(start_line, start_col),
                    );
                }
                Some(b'\\') => self.scan_escape_sequence(&mut buf),
                Some(ch) => {
                    self.advance();
                    buf.push(ch);
                }
            }
        }
    }

    /// Scan a template literal after its opening backtick.
    fn scan_template(&mut self, start_line: u32, start_col: u32) -> Token {
        let mut buf = Vec::new();

        loop {
            match self.peek() {
                None => {
                    let span = self.span_from(start_line, start_col);
                    self.emit_error(
                        DiagnosticCode::UNTERMINATED_STRING,
                        "Unterminated template literal",
                        span,
                    );
                    return Token::new(TokenKind::StringLiteral(into_string(buf)), span);
                }
                Some(b'`') => {
                    self.advance();
                    return Token::new(
                        TokenKind::StringLiteral(into_string(buf)),
                        self.span_from(start_line, start_col),
                    );
                }
                Some(b'\\') => self.scan_escape_sequence(&mut buf),
                Some(b'$') if self.peek_at(1) == Some(b'{') => {
                    let text_span = self.span_from(start_line, start_col);
                    self.open_interpolation();
                    return Token::new(TokenKind::TemplateStart(into_string(buf)), text_span);
                }
                Some(ch) => {
                    self.advance();
                    buf.push(ch);
                }
            }
        }
    }

    /// Continue template text after an interpolation ends.
    fn scan_template_continuation(&mut self) -> Token {
        let start_line = self.line;
        let start_col = self.col;
        let mut buf = Vec::new();

        loop {
            match self.peek() {
                None => {
                    let span = self.span_from(start_line, start_col);
                    self.emit_error(
                        DiagnosticCode::UNTERMINATED_STRING,
                        "Unterminated template literal",
                        span,
                    );
                    self.pop_mode();
                    return Token::new(TokenKind::TemplateEnd(into_string(buf)), span);
                }
                Some(b'`') => {
                    self.advance();
                    self.pop_mode();
                    return Token::new(
                        TokenKind::TemplateEnd(into_string(buf)),
                        self.span_from(start_line, start_col),
                    );
                }
                Some(b'\\') => self.scan_escape_sequence(&mut buf),
                Some(b'$') if self.peek_at(1) == Some(b'{') => {
                    let text_span = self.span_from(start_line, start_col);
                    // Replace the Template mode with the new interpolation.
                    self.pop_mode();
                    self.open_interpolation();
                    return Token::new(TokenKind::TemplatePart(into_string(buf)), text_span);
                }
                Some(ch) => {
                    self.advance();
                    buf.push(ch);
                }
            }
        }
    }

    /// Consume `${`, enter interpolation mode and queue its token.
    fn open_interpolation(&mut self) {
        let start_line = self.line;
        let start_col = self.col;
        self.advance();
        self.advance();
        let span = self.span_from(start_line, start_col);
        self.push_mode(Mode::Interpolation { brace_depth: 0 });
        self.pending
            .push(Token::new(TokenKind::InterpolationStart, span));
    }

    /// Scan an escape sequence starting at the `\`, appending its UTF-8 bytes.
    fn scan_escape_sequence(&mut self, buf: &mut Vec<u8>) {
        let start_line = self.line;
        let start_col = self.col;
        self.advance();

        let escaped = match self.peek() {
            // Leave the terminator for the caller to report.
            None => return,
            Some(b'n') => '\n',
            Some(b't') => '\t',
            Some(b'r') => '\r',
            Some(b'0') => '\0',
            Some(b'b') => '\u{8}',
            Some(b'f') => '\u{c}',
            Some(b'v') => '\u{b}',
            Some(b'\n') => {
                // Line continuation.
                self.advance();
                return;
            }
            Some(b'u') => {
                self.advance();
                match self.scan_unicode_escape() {
                    Some(c) => {
                        push_char(buf, c);
                    }
                    None => {
                        let span = self.span_from(start_line, start_col);
                        self.emit_error(
                            DiagnosticCode::INVALID_CHARACTER,
                            "Invalid Unicode escape sequence",
                            span,
                        );
                    }
                }
                return;
            }
            // Any other character escapes to itself.
            Some(ch) => {
                self.advance();
                buf.push(ch);
                return;
            }
        };
        self.advance();
        push_char(buf, escaped);
    }

    /// Parse the part of `\uXXXX` or `\u{X...}` after the `u`.
    fn scan_unicode_escape(&mut self) -> Option<char> {
        let mut digits = String::new();
        if self.peek() == Some(b'{') {
            self.advance();
            while let Some(ch) = self.peek() {
                if ch == b'}' {
                    self.advance();
                    break;
                }
                if !ch.is_ascii_hexdigit() || digits.len() >= 6 {
                    return None;
                }
                self.advance();
                digits.push(ch as char);
            }
        } else {
            for _ in 0..4 {
                match self.peek() {
                    Some(ch) if ch.is_ascii_hexdigit() => {
                        self.advance();
                        digits.push(ch as char);
                    }
                    _ => return None,
                }
            }
        }
        let code = u32::from_str_radix(&digits, 16).ok()?;
        char::from_u32(code)
    }
}

fn push_char(buf: &mut Vec<u8>, c: char) {
    let mut tmp = [0u8; 4];
    buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
}

fn into_string(buf: Vec<u8>) -> String {
    String::from_utf8(buf).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
