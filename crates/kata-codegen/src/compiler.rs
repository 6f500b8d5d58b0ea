//! Main Wasm module assembler.
//!
//! Orchestrates the code generation pipeline:
//! 1. Assign global slots to top-level variables and indices to functions
//! 2. Emit user function bodies, then the `run` entry point, interning
//!    string literals into the data segment as they are met
//! 3. Assemble all Wasm sections into a module
//! 4. Validate with `wasmparser`

use std::collections::HashMap;

use kata_types::abi::{self, HostFn};
use kata_types::ast::*;
use kata_types::{Type, TypeTable};
use wasm_encoder::{
    CodeSection, ConstExpr, CustomSection, DataSection, EntityType, ExportKind, ExportSection,
    Function, FunctionSection, GlobalSection, GlobalType, ImportSection, Instruction,
    MemorySection, MemoryType, Module, TypeSection, ValType,
};

use crate::error::{CodegenError, CodegenResult};
use crate::gas;
use crate::stmt::{emit_stmt, emit_stmts};
use crate::types::*;

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// Compile a checked [`Program`] into a `.wasm` binary.
///
/// `types` must be the table the checker produced for this very program.
/// Returns the raw bytes of a valid WebAssembly module on success, or a
/// [`CodegenError`] describing what went wrong.
pub fn compile(program: &Program, types: &TypeTable) -> CodegenResult<Vec<u8>> {
    let mut compiler = Compiler::new(program, types);
    compiler.compile()
}

// ══════════════════════════════════════════════════════════════════════════════
// Compiler
// ══════════════════════════════════════════════════════════════════════════════

/// A global slot holding a top-level variable.
#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub index: u32,
    pub val_type: ValType,
    pub ty: Type,
}

/// The top-level compiler state.
struct Compiler<'a> {
    program: &'a Program,
    types: &'a TypeTable,
    /// Function signatures in type-section order.
    signatures: Vec<(Vec<ValType>, Vec<ValType>)>,
    /// User function name → absolute Wasm function index.
    functions: HashMap<String, u32>,
    /// Top-level variable name → global slot.
    globals: HashMap<String, GlobalVar>,
    /// Global slots in index order.
    global_order: Vec<GlobalVar>,
    strings: StringPool,
}

impl<'a> Compiler<'a> {
    fn new(program: &'a Program, types: &'a TypeTable) -> Self {
        Self {
            program,
            types,
            signatures: Vec::new(),
            functions: HashMap::new(),
            globals: HashMap::new(),
            global_order: Vec::new(),
            strings: StringPool::default(),
        }
    }

    /// Run the full compilation pipeline.
    fn compile(&mut self) -> CodegenResult<Vec<u8>> {
        self.collect_metadata()?;

        // Bodies first: they decide the data segment size.
        let (func_section, code_section) = self.emit_functions()?;

        let mut module = Module::new();

        // Imports register their signatures before the type section is built.
        let imports = self.emit_imports();

        // 1. Type section
        let types = self.emit_types();
        module.section(&types);

        // 2. Import section
        module.section(&imports);

        // 3. Function section
        module.section(&func_section);

        // 4. Memory section
        let memory = self.emit_memory()?;
        module.section(&memory);

        // 5. Global section
        let globals = self.emit_globals();
        module.section(&globals);

        // 6. Export section
        let exports = self.emit_exports();
        module.section(&exports);

        // 7. Code section
        module.section(&code_section);

        // 8. Data section
        let data_sec = self.emit_data();
        module.section(&data_sec);

        // 9. Custom section (emitter version)
        let custom = self.emit_custom();
        module.section(&custom);

        let wasm_bytes = module.finish();

        // 10. Validate
        wasmparser::validate(&wasm_bytes)
            .map_err(|e| CodegenError::ValidationFailed(format!("{e}")))?;

        tracing::trace!(
            functions = self.functions.len(),
            globals = self.global_order.len(),
            data = self.strings.len(),
            "module assembled"
        );
        Ok(wasm_bytes)
    }

    // ── Metadata collection ──────────────────────────────────────────────

    fn collect_metadata(&mut self) -> CodegenResult<()> {
        let program = self.program;
        for (i, func) in program.functions().enumerate() {
            let index = IMPORT_COUNT + u32::try_from(i).map_err(too_many("functions"))?;
            self.functions.insert(func.name.name.clone(), index);
        }

        // Only direct top-level declarations become globals; declarations
        // in blocks and loop headers are locals of `run`.
        for stmt in program.statements() {
            if let Stmt::Let(decl) = stmt {
                let ty = declared_type(decl, self.types)?;
                let index = FIRST_VARIABLE_GLOBAL
                    + u32::try_from(self.global_order.len()).map_err(too_many("globals"))?;
                let global = GlobalVar {
                    index,
                    val_type: value_val_type(&ty)?,
                    ty,
                };
                self.globals.insert(decl.name.name.clone(), global.clone());
                self.global_order.push(global);
            }
        }
        Ok(())
    }

    /// Type index for a signature, registering it on first use.
    fn signature_index(&mut self, params: Vec<ValType>, results: Vec<ValType>) -> u32 {
        if let Some(pos) = self
            .signatures
            .iter()
            .position(|(p, r)| *p == params && *r == results)
        {
            return pos as u32;
        }
        self.signatures.push((params, results));
        (self.signatures.len() - 1) as u32
    }

    // ── Type section ─────────────────────────────────────────────────────

    fn emit_types(&self) -> TypeSection {
        let mut types = TypeSection::new();
        for (params, results) in &self.signatures {
            types
                .ty()
                .function(params.iter().copied(), results.iter().copied());
        }
        types
    }

    // ── Import section ───────────────────────────────────────────────────

    fn emit_imports(&mut self) -> ImportSection {
        let mut imports = ImportSection::new();
        for host in HostFn::ALL {
            let (params, results) = host.signature();
            let ty = self.signature_index(
                params.iter().copied().map(val_kind).collect(),
                results.iter().copied().map(val_kind).collect(),
            );
            imports.import(abi::MODULE, host.name(), EntityType::Function(ty));
        }
        imports
    }

    // ── Memory section ───────────────────────────────────────────────────

    fn emit_memory(&self) -> CodegenResult<MemorySection> {
        let pages = u64::from(self.strings.len().div_ceil(PAGE_SIZE).max(1));
        if pages > MAX_MEMORY_PAGES {
            return Err(CodegenError::LimitExceeded(format!(
                "string literals need {pages} memory pages"
            )));
        }
        let mut memory = MemorySection::new();
        memory.memory(MemoryType {
            minimum: pages,
            maximum: Some(pages),
            memory64: false,
            shared: false,
            page_size_log2: None,
        });
        Ok(memory)
    }

    // ── Global section ───────────────────────────────────────────────────

    fn emit_globals(&self) -> GlobalSection {
        let mut globals = GlobalSection::new();

        // GLOBAL_GAS
        globals.global(
            GlobalType {
                val_type: ValType::I32,
                mutable: true,
                shared: false,
            },
            &ConstExpr::i32_const(0),
        );

        // GLOBAL_GAS_LIMIT
        globals.global(
            GlobalType {
                val_type: ValType::I32,
                mutable: true,
                shared: false,
            },
            &ConstExpr::i32_const(0),
        );

        // Top-level variables
        for global in &self.global_order {
            let init = match global.val_type {
                ValType::F64 => ConstExpr::f64_const(0.0),
                _ => ConstExpr::i32_const(0),
            };
            globals.global(
                GlobalType {
                    val_type: global.val_type,
                    mutable: true,
                    shared: false,
                },
                &init,
            );
        }

        globals
    }

    // ── Function + Code sections ─────────────────────────────────────────

    fn emit_functions(&mut self) -> CodegenResult<(FunctionSection, CodeSection)> {
        let mut func_section = FunctionSection::new();
        let mut code_section = CodeSection::new();
        let program = self.program;
        let mut strings = std::mem::take(&mut self.strings);

        // ── User functions ───────────────────────────────────────────────
        for func in program.functions() {
            let param_types = func
                .params
                .iter()
                .map(|p| annotation_type(&p.type_ann))
                .collect::<CodegenResult<Vec<_>>>()?;
            let params = param_types
                .iter()
                .map(value_val_type)
                .collect::<CodegenResult<Vec<_>>>()?;
            let ret = match &func.ret {
                Some(ann) => annotation_type(ann)?,
                None => Type::Void,
            };
            let results: Vec<ValType> = val_type(&ret)?.into_iter().collect();
            let param_count = u32::try_from(params.len()).map_err(too_many("parameters"))?;
            let ty = self.signature_index(params, results);
            func_section.function(ty);

            let mut ctx = FuncContext::new(
                self.types,
                &self.functions,
                &self.globals,
                strings,
                param_count,
                false,
            );
            let mut scratch = Function::new(vec![]);
            ctx.push_scope();
            for (i, (param, ty)) in func.params.iter().zip(param_types).enumerate() {
                ctx.push_local(&param.name.name, i as u32, ty);
            }
            gas::emit_gas_tick(&mut scratch);
            emit_stmts(&func.body.stmts, &mut ctx, &mut scratch)?;
            if ret != Type::Void {
                // Every path returned or threw; the checker guarantees it.
                scratch.instruction(&Instruction::Unreachable);
            }
            scratch.instruction(&Instruction::End);
            ctx.pop_scope();

            code_section.function(&finalize_function(scratch, &ctx));
            strings = ctx.into_strings();
        }

        // ── run(gas_limit: i32) ──────────────────────────────────────────
        let ty = self.signature_index(vec![ValType::I32], vec![]);
        func_section.function(ty);

        let mut ctx = FuncContext::new(
            self.types,
            &self.functions,
            &self.globals,
            strings,
            1,
            true,
        );
        let mut scratch = Function::new(vec![]);
        scratch.instruction(&Instruction::LocalGet(0));
        scratch.instruction(&Instruction::GlobalSet(GLOBAL_GAS_LIMIT));
        scratch.instruction(&Instruction::I32Const(0));
        scratch.instruction(&Instruction::GlobalSet(GLOBAL_GAS));
        for stmt in program.statements() {
            emit_stmt(stmt, &mut ctx, &mut scratch)?;
        }
        scratch.instruction(&Instruction::End);
        code_section.function(&finalize_function(scratch, &ctx));
        self.strings = ctx.into_strings();

        Ok((func_section, code_section))
    }

    fn run_index(&self) -> u32 {
        IMPORT_COUNT + self.functions.len() as u32
    }

    // ── Export section ────────────────────────────────────────────────────

    fn emit_exports(&self) -> ExportSection {
        let mut exports = ExportSection::new();
        exports.export(abi::ENTRY_EXPORT, ExportKind::Func, self.run_index());
        exports.export(abi::MEMORY_EXPORT, ExportKind::Memory, 0);
        exports
    }

    // ── Data section ─────────────────────────────────────────────────────

    fn emit_data(&self) -> DataSection {
        let mut data_sec = DataSection::new();
        data_sec.active(0, &ConstExpr::i32_const(0), self.strings.bytes().iter().copied());
        data_sec
    }

    // ── Custom section ───────────────────────────────────────────────────

    fn emit_custom(&self) -> CustomSection<'_> {
        CustomSection {
            name: std::borrow::Cow::Borrowed(CUSTOM_SECTION_NAME),
            data: std::borrow::Cow::Borrowed(COMPILER_VERSION.as_bytes()),
        }
    }
}

/// Finalize a scratch function: rebuild with correct local declarations.
///
/// `Function::new(vec![])` declares 0 locals, so its raw body starts with
/// a single 0x00 byte (LEB128 zero). We strip that byte and prepend the
/// actual locals from `ctx`.
fn finalize_function(scratch: Function, ctx: &FuncContext) -> Function {
    let raw = scratch.into_raw_body();
    let instr_bytes = &raw[1..];
    let mut f = Function::new(ctx.locals.clone());
    f.raw(instr_bytes.iter().copied());
    f
}

fn too_many(what: &'static str) -> impl Fn(std::num::TryFromIntError) -> CodegenError {
    move |_| CodegenError::LimitExceeded(format!("too many {what}"))
}

/// Resolve a source annotation the checker already accepted.
pub fn annotation_type(ann: &TypeAnnotation) -> CodegenResult<Type> {
    Type::from_annotation(ann)
        .ok_or_else(|| CodegenError::Internal("unresolved type annotation".into()))
}

/// The type of a declared variable: its annotation, else its initializer's.
pub fn declared_type(decl: &LetStmt, types: &TypeTable) -> CodegenResult<Type> {
    if let Some(ann) = &decl.type_ann {
        return annotation_type(ann);
    }
    decl.init
        .as_ref()
        .and_then(|init| types.type_of(init.id))
        .cloned()
        .ok_or_else(|| {
            CodegenError::Internal(format!("no type recorded for '{}'", decl.name.name))
        })
}

// ══════════════════════════════════════════════════════════════════════════════
// StringPool: interned string literals in the data segment
// ══════════════════════════════════════════════════════════════════════════════

/// String literal bytes laid out from offset 0 of linear memory.
#[derive(Debug, Default)]
pub struct StringPool {
    bytes: Vec<u8>,
    offsets: HashMap<String, (u32, u32)>,
}

impl StringPool {
    /// Intern a string constant, returning `(offset, length)` in bytes.
    pub fn intern(&mut self, s: &str) -> (u32, u32) {
        if let Some(&found) = self.offsets.get(s) {
            return found;
        }
        let entry = (self.bytes.len() as u32, s.len() as u32);
        self.bytes.extend_from_slice(s.as_bytes());
        self.offsets.insert(s.to_string(), entry);
        entry
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// FuncContext: per-function codegen state
// ══════════════════════════════════════════════════════════════════════════════

/// Where a variable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Local(u32),
    Global(u32),
}

/// Labels of an enclosing loop, as absolute block depths.
#[derive(Debug, Clone, Copy)]
struct LoopLabels {
    break_depth: u32,
    continue_depth: u32,
}

/// State maintained while generating code for a single function body.
pub struct FuncContext<'a> {
    pub types: &'a TypeTable,
    functions: &'a HashMap<String, u32>,
    globals: &'a HashMap<String, GlobalVar>,
    strings: StringPool,
    /// Additional locals declared during codegen: (count, type).
    pub locals: Vec<(u32, ValType)>,
    /// Name → local index stack (for scoped bindings).
    local_names: HashMap<String, Vec<(u32, Type)>>,
    /// Names bound in each open scope, innermost last.
    scopes: Vec<Vec<String>>,
    /// Next available local index.
    next_local: u32,
    /// Whether this is the `run` body, where top-level declarations are globals.
    is_entry: bool,
    /// Number of enclosing Wasm blocks, loops and ifs.
    block_depth: u32,
    loops: Vec<LoopLabels>,
}

impl<'a> FuncContext<'a> {
    fn new(
        types: &'a TypeTable,
        functions: &'a HashMap<String, u32>,
        globals: &'a HashMap<String, GlobalVar>,
        strings: StringPool,
        param_count: u32,
        is_entry: bool,
    ) -> Self {
        Self {
            types,
            functions,
            globals,
            strings,
            locals: Vec::new(),
            local_names: HashMap::new(),
            scopes: Vec::new(),
            next_local: param_count,
            is_entry,
            block_depth: 0,
            loops: Vec::new(),
        }
    }

    fn into_strings(self) -> StringPool {
        self.strings
    }

    /// Allocate a new local of the given type. Returns the local index.
    pub fn alloc_local(&mut self, ty: ValType) -> u32 {
        let idx = self.next_local;
        self.next_local += 1;
        self.locals.push((1, ty));
        idx
    }

    /// Push a named local binding into the innermost scope.
    pub fn push_local(&mut self, name: &str, idx: u32, ty: Type) {
        self.local_names
            .entry(name.to_string())
            .or_default()
            .push((idx, ty));
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(name.to_string());
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Close the innermost scope, unbinding its names.
    pub fn pop_scope(&mut self) {
        for name in self.scopes.pop().unwrap_or_default() {
            if let Some(stack) = self.local_names.get_mut(&name) {
                stack.pop();
            }
        }
    }

    /// Whether a declaration here is a top-level variable of the snippet.
    pub fn declares_global(&self) -> bool {
        self.is_entry && self.scopes.is_empty()
    }

    /// Resolve a variable: innermost local first, then top-level globals.
    pub fn lookup(&self, name: &str) -> CodegenResult<(Slot, Type)> {
        if let Some((idx, ty)) = self.local_names.get(name).and_then(|s| s.last()) {
            return Ok((Slot::Local(*idx), ty.clone()));
        }
        self.global_slot(name)
    }

    /// Resolve a top-level variable, skipping locals.
    pub fn global_slot(&self, name: &str) -> CodegenResult<(Slot, Type)> {
        self.globals
            .get(name)
            .map(|g| (Slot::Global(g.index), g.ty.clone()))
            .ok_or_else(|| CodegenError::UnresolvedSymbol(name.to_string()))
    }

    /// Absolute Wasm function index of a user function.
    pub fn function_index(&self, name: &str) -> CodegenResult<u32> {
        self.functions
            .get(name)
            .copied()
            .ok_or_else(|| CodegenError::UnresolvedSymbol(name.to_string()))
    }

    /// Checked type of an expression.
    pub fn type_of(&self, expr: &Expr) -> CodegenResult<Type> {
        self.types.type_of(expr.id).cloned().ok_or_else(|| {
            CodegenError::Internal(format!(
                "no type recorded for expression at {}",
                expr.span
            ))
        })
    }

    /// Intern a string constant, returning `(offset, length)`.
    pub fn intern_string(&mut self, s: &str) -> (u32, u32) {
        self.strings.intern(s)
    }

    // ── Block structure ──────────────────────────────────────────────────

    /// Record entry into a Wasm `block`, `loop` or `if`.
    pub fn enter_block(&mut self) -> u32 {
        self.block_depth += 1;
        self.block_depth
    }

    pub fn exit_block(&mut self) {
        self.block_depth -= 1;
    }

    pub fn push_loop(&mut self, break_depth: u32, continue_depth: u32) {
        self.loops.push(LoopLabels {
            break_depth,
            continue_depth,
        });
    }

    pub fn pop_loop(&mut self) {
        self.loops.pop();
    }

    /// Relative branch depth for `break` out of the innermost loop.
    pub fn break_target(&self) -> CodegenResult<u32> {
        let labels = self
            .loops
            .last()
            .ok_or_else(|| CodegenError::Internal("'break' outside a loop".into()))?;
        Ok(self.block_depth - labels.break_depth)
    }

    /// Relative branch depth for `continue` in the innermost loop.
    pub fn continue_target(&self) -> CodegenResult<u32> {
        let labels = self
            .loops
            .last()
            .ok_or_else(|| CodegenError::Internal("'continue' outside a loop".into()))?;
        Ok(self.block_depth - labels.continue_depth)
    }
}

/// Emit a call to a host import.
pub fn call_host(f: &mut Function, host: HostFn) {
    f.instruction(&Instruction::Call(host.index()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_pool_interns_once() {
        let mut pool = StringPool::default();
        assert_eq!(pool.intern("hello"), (0, 5));
        assert_eq!(pool.intern("world"), (5, 5));
        assert_eq!(pool.intern("hello"), (0, 5));
        assert_eq!(pool.bytes(), b"helloworld");
    }

    #[test]
    fn test_string_pool_counts_utf8_bytes() {
        let mut pool = StringPool::default();
        assert_eq!(pool.intern("é"), (0, 2));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_branch_targets() {
        let types = TypeTable::new();
        let functions = HashMap::new();
        let globals = HashMap::new();
        let mut ctx = FuncContext::new(&types, &functions, &globals, StringPool::default(), 0, true);
        let brk = ctx.enter_block();
        ctx.enter_block();
        let cont = ctx.enter_block();
        ctx.push_loop(brk, cont);
        assert_eq!(ctx.break_target().unwrap(), 2);
        assert_eq!(ctx.continue_target().unwrap(), 0);
        ctx.enter_block();
        assert_eq!(ctx.break_target().unwrap(), 3);
    }

    #[test]
    fn test_scopes_shadow_and_restore() {
        let types = TypeTable::new();
        let functions = HashMap::new();
        let mut globals = HashMap::new();
        globals.insert(
            "x".to_string(),
            GlobalVar {
                index: FIRST_VARIABLE_GLOBAL,
                val_type: ValType::F64,
                ty: Type::Number,
            },
        );
        let mut ctx = FuncContext::new(&types, &functions, &globals, StringPool::default(), 1, true);
        assert!(ctx.declares_global());
        ctx.push_scope();
        assert!(!ctx.declares_global());
        let local = ctx.alloc_local(ValType::I32);
        ctx.push_local("x", local, Type::String);
        assert_eq!(ctx.lookup("x").unwrap(), (Slot::Local(1), Type::String));
        ctx.pop_scope();
        assert_eq!(
            ctx.lookup("x").unwrap(),
            (Slot::Global(FIRST_VARIABLE_GLOBAL), Type::Number)
        );
        assert!(ctx.lookup("y").is_err());
    }
}
