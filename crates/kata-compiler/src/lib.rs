//! Kata compiler host: orchestrates the full compilation pipeline.
//!
//! ```text
//! KataScript source → Lexer → Parser → Type Checker → Wasm Emitter → ExecutableModule
//! ```
//!
//! Every call performs a fresh lex, parse, check and emission. Compile
//! problems come back as [`Diagnostics`]; only faults of the toolchain itself
//! are Rust errors ([`HostError`]).

pub mod checker;
pub mod env;

pub use checker::TypeChecker;

use kata_codegen::CodegenError;
use kata_lexer::Lexer;
use kata_parser::Parser;
use kata_types::{Diagnostics, ExecutableModule, SourceFile, TypeTable};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// File name used in diagnostics when none is configured.
pub const DEFAULT_FILE_NAME: &str = "main.ts";

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

/// A fault of the toolchain itself, as opposed to a problem in the snippet.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The emitter could not lower a checked program.
    #[error("emitter failure: {0}")]
    Emitter(#[from] CodegenError),

    /// The host was configured with an unusable file name.
    #[error("invalid source file name {0:?}")]
    InvalidFileName(String),
}

// ══════════════════════════════════════════════════════════════════════════════
// Compilation
// ══════════════════════════════════════════════════════════════════════════════

/// Outcome of compiling one snippet.
#[derive(Debug, Clone, PartialEq)]
pub enum Compilation {
    /// The snippet compiled; non-blocking diagnostics ride along.
    Emitted {
        module: ExecutableModule,
        warnings: Diagnostics,
    },
    /// At least one blocking diagnostic. Warnings are included in order.
    Diagnostics(Diagnostics),
}

impl Compilation {
    pub fn is_emitted(&self) -> bool {
        matches!(self, Compilation::Emitted { .. })
    }

    pub fn module(&self) -> Option<&ExecutableModule> {
        match self {
            Compilation::Emitted { module, .. } => Some(module),
            Compilation::Diagnostics(_) => None,
        }
    }

    /// Every diagnostic of this compilation, blocking or not.
    pub fn diagnostics(&self) -> &Diagnostics {
        match self {
            Compilation::Emitted { warnings, .. } => warnings,
            Compilation::Diagnostics(diagnostics) => diagnostics,
        }
    }
}

/// Serializable summary of a compilation, for JSON consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileReport {
    pub success: bool,
    /// Hex SHA-256 of the emitted module.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_size: Option<usize>,
    pub diagnostics: Diagnostics,
}

impl From<&Compilation> for CompileReport {
    fn from(compilation: &Compilation) -> Self {
        let module = compilation.module();
        Self {
            success: compilation.is_emitted(),
            fingerprint: module.map(|m| m.fingerprint.clone()),
            module_size: module.map(ExecutableModule::size),
            diagnostics: compilation.diagnostics().clone(),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// CompilerHost
// ══════════════════════════════════════════════════════════════════════════════

/// An in-memory compiler for KataScript snippets.
///
/// The host holds no state between calls; it is cheap to clone and safe to
/// share across threads.
#[derive(Debug, Clone)]
pub struct CompilerHost {
    file_name: String,
}

impl CompilerHost {
    pub fn new(file_name: impl Into<String>) -> Result<Self, HostError> {
        let file_name = file_name.into();
        if file_name.trim().is_empty() || file_name.contains(['\n', '\r']) {
            return Err(HostError::InvalidFileName(file_name));
        }
        Ok(Self { file_name })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Compile `source` to a validated module, or report why it can't run.
    pub fn compile(&self, source: &str) -> Result<Compilation, HostError> {
        let _span = tracing::debug_span!("compile", file = %self.file_name, bytes = source.len())
            .entered();

        let (mut diagnostics, analysis) = self.analyze(source);
        let Some((program, types)) = analysis else {
            tracing::debug!(errors = diagnostics.total_errors, "compilation blocked");
            return Ok(Compilation::Diagnostics(diagnostics));
        };
        if diagnostics.has_errors() {
            tracing::debug!(errors = diagnostics.total_errors, "compilation blocked");
            return Ok(Compilation::Diagnostics(diagnostics));
        }

        let wasm = kata_codegen::compile(&program, &types)?;
        let fingerprint = fingerprint(&wasm);
        tracing::debug!(
            size = wasm.len(),
            warnings = diagnostics.total_warnings,
            %fingerprint,
            "module emitted"
        );
        Ok(Compilation::Emitted {
            module: ExecutableModule::new(wasm, fingerprint),
            warnings: diagnostics,
        })
    }

    /// Run every front-end phase and return all diagnostics without emitting.
    pub fn check(&self, source: &str) -> Diagnostics {
        self.analyze(source).0
    }

    /// Lex, parse and check. The program and its type facts are returned
    /// when the front end got far enough to produce them.
    fn analyze(&self, source: &str) -> (Diagnostics, Option<(kata_types::ast::Program, TypeTable)>) {
        let source_file = SourceFile::new(self.file_name.clone(), source);

        let lex_result = Lexer::new(&source_file).lex();
        let mut diagnostics = lex_result.errors;

        let parse_result = Parser::new(lex_result.tokens, &source_file).parse();
        diagnostics.merge(parse_result.errors);

        // Checking a tree rebuilt after syntax errors only adds noise.
        if diagnostics.has_errors() {
            return (diagnostics, None);
        }

        let types = TypeChecker::new(&source_file, &mut diagnostics).check(&parse_result.program);
        (diagnostics, Some((parse_result.program, types)))
    }
}

impl Default for CompilerHost {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_FILE_NAME.to_string(),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Convenience functions
// ══════════════════════════════════════════════════════════════════════════════

/// Compile with the default host.
pub fn compile(source: &str) -> Result<Compilation, HostError> {
    CompilerHost::default().compile(source)
}

/// Compile and summarize as a [`CompileReport`]. A host fault is reported as
/// an unsuccessful compilation with an internal diagnostic.
pub fn compile_to_report(source: &str) -> CompileReport {
    match compile(source) {
        Ok(compilation) => CompileReport::from(&compilation),
        Err(err) => CompileReport {
            success: false,
            fingerprint: None,
            module_size: None,
            diagnostics: internal_fault_diagnostics(&err, DEFAULT_FILE_NAME),
        },
    }
}

/// Front-end diagnostics only.
pub fn type_check(source: &str, file_name: &str) -> Diagnostics {
    match CompilerHost::new(file_name) {
        Ok(host) => host.check(source),
        Err(err) => internal_fault_diagnostics(&err, file_name),
    }
}

/// A single blocking `E900` diagnostic describing a host fault.
pub fn internal_fault_diagnostics(err: &HostError, file_name: &str) -> Diagnostics {
    let mut diagnostics = Diagnostics::empty();
    diagnostics.push(kata_types::Diagnostic::new(
        file_name,
        kata_types::DiagnosticCode::INTERNAL_COMPILER_FAULT,
        format!("Internal compiler fault: {err}"),
        kata_types::Span::point(1, 1),
        "",
    ));
    diagnostics
}

/// Hex-encoded SHA-256 of a module binary.
pub fn fingerprint(wasm: &[u8]) -> String {
    Sha256::digest(wasm)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
