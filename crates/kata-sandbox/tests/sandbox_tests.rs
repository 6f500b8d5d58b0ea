//! Sandbox integration tests.
//!
//! Modules are assembled by hand with `wasm-encoder` against the host ABI,
//! so these tests exercise the sandbox without the compiler.

use kata_sandbox::{Fault, RunResult, Sandbox, SandboxLimits, Stream};
use kata_types::abi::{self, HostFn};
use kata_types::ExecutableModule;
use wasm_encoder::{
    BlockType, CodeSection, ConstExpr, DataSection, EntityType, ExportKind, ExportSection, Function,
    FunctionSection, ImportSection, Instruction, MemorySection, MemoryType, Module, TypeSection,
    ValType,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn val(kind: abi::ValKind) -> ValType {
    match kind {
        abi::ValKind::I32 => ValType::I32,
        abi::ValKind::F64 => ValType::F64,
    }
}

const IMPORTS: u32 = HostFn::ALL.len() as u32;

/// i32 locals declared after the parameters of every test function.
const SCRATCH_LOCALS: u32 = 2;

/// A module importing every host function, with `data` at offset 0 and the
/// given local functions. The last function is exported as `run` unless
/// `export_run` is false.
struct TestModule {
    data: Vec<u8>,
    /// `(params, body)`; every local function returns nothing.
    functions: Vec<(Vec<ValType>, Vec<Instruction<'static>>)>,
    export_run: bool,
}

impl TestModule {
    fn new(data: &str) -> Self {
        Self {
            data: data.as_bytes().to_vec(),
            functions: Vec::new(),
            export_run: true,
        }
    }

    fn function(mut self, params: Vec<ValType>, body: Vec<Instruction<'static>>) -> Self {
        self.functions.push((params, body));
        self
    }

    /// `run(gas_limit: i32)` with `body`.
    fn run(self, body: Vec<Instruction<'static>>) -> Self {
        self.function(vec![ValType::I32], body)
    }

    fn without_run_export(mut self) -> Self {
        self.export_run = false;
        self
    }

    fn build(self) -> ExecutableModule {
        let mut types = TypeSection::new();
        let mut imports = ImportSection::new();
        for (i, host) in HostFn::ALL.iter().enumerate() {
            let (params, results) = host.signature();
            types.ty().function(
                params.iter().map(|k| val(*k)),
                results.iter().map(|k| val(*k)),
            );
            imports.import(abi::MODULE, host.name(), EntityType::Function(i as u32));
        }

        let mut funcs = FunctionSection::new();
        let mut code = CodeSection::new();
        for (i, (params, body)) in self.functions.iter().enumerate() {
            types.ty().function(params.iter().copied(), []);
            funcs.function(IMPORTS + i as u32);
            let mut f = Function::new([(SCRATCH_LOCALS, ValType::I32)]);
            for instr in body {
                f.instruction(instr);
            }
            f.instruction(&Instruction::End);
            code.function(&f);
        }

        let mut memory = MemorySection::new();
        memory.memory(MemoryType {
            minimum: 1,
            maximum: Some(1),
            memory64: false,
            shared: false,
            page_size_log2: None,
        });

        let mut exports = ExportSection::new();
        if self.export_run {
            let run = IMPORTS + self.functions.len() as u32 - 1;
            exports.export(abi::ENTRY_EXPORT, ExportKind::Func, run);
        }
        exports.export(abi::MEMORY_EXPORT, ExportKind::Memory, 0);

        let mut data = DataSection::new();
        data.active(0, &ConstExpr::i32_const(0), self.data.iter().copied());

        let mut module = Module::new();
        module.section(&types);
        module.section(&imports);
        module.section(&funcs);
        module.section(&memory);
        module.section(&exports);
        module.section(&code);
        module.section(&data);
        ExecutableModule::new(module.finish(), "test".into())
    }
}

fn call(host: HostFn) -> Instruction<'static> {
    Instruction::Call(host.index())
}

/// `str_const(offset, len)`.
fn literal(offset: i32, len: i32) -> Vec<Instruction<'static>> {
    vec![
        Instruction::I32Const(offset),
        Instruction::I32Const(len),
        call(HostFn::StrConst),
    ]
}

fn flush(stream: i32) -> Vec<Instruction<'static>> {
    vec![Instruction::I32Const(stream), call(HostFn::ConFlush)]
}

fn execute(module: &ExecutableModule) -> RunResult {
    Sandbox::new(SandboxLimits::default()).unwrap().execute(module)
}

fn expect_fault(result: &RunResult) -> &Fault {
    result
        .fault()
        .unwrap_or_else(|| panic!("expected a fault, got {result:?}"))
}

// ══════════════════════════════════════════════════════════════════════════════
// Output capture
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_console_arguments_join_with_space() {
    let body = [
        literal(0, 5),
        vec![call(HostFn::ConStr), Instruction::F64Const(42.0), call(HostFn::ConNum)],
        vec![Instruction::I32Const(1), call(HostFn::ConBool)],
        flush(abi::STREAM_LOG),
    ]
    .concat();
    let module = TestModule::new("hello").run(body).build();

    let result = execute(&module);
    assert!(result.is_completed(), "{result:?}");
    assert_eq!(result.output().text(), "hello 42 true");
}

#[test]
fn test_events_keep_call_order_and_stream() {
    let body = [
        vec![Instruction::F64Const(1.0), call(HostFn::ConNum)],
        flush(abi::STREAM_LOG),
        vec![Instruction::F64Const(0.5), call(HostFn::ConNum)],
        flush(abi::STREAM_WARN),
    ]
    .concat();
    let module = TestModule::new("").run(body).build();

    let result = execute(&module);
    let events: Vec<_> = result.output().iter().cloned().collect();
    assert_eq!(events.len(), 2);
    assert_eq!((events[0].stream, events[0].text.as_str()), (Stream::Log, "1"));
    assert_eq!((events[1].stream, events[1].text.as_str()), (Stream::Warn, "0.5"));
}

#[test]
fn test_console_inspects_arrays() {
    // [1, 2] pushed onto a fresh number array.
    let body = vec![
        Instruction::I32Const(abi::KIND_NUMBER),
        call(HostFn::ArrNew),
        Instruction::LocalSet(1),
        Instruction::LocalGet(1),
        Instruction::F64Const(1.0),
        call(HostFn::ArrPushF64),
        Instruction::Drop,
        Instruction::LocalGet(1),
        Instruction::F64Const(2.0),
        call(HostFn::ArrPushF64),
        Instruction::Drop,
        Instruction::LocalGet(1),
        call(HostFn::ConRef),
        Instruction::I32Const(abi::STREAM_LOG),
        call(HostFn::ConFlush),
    ];
    let module = TestModule::new("").run(body).build();

    let result = execute(&module);
    assert_eq!(result.output().text(), "[ 1, 2 ]");
}

// ══════════════════════════════════════════════════════════════════════════════
// Faults
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_uncaught_string_keeps_partial_output() {
    let body = [
        literal(0, 6),
        vec![call(HostFn::ConStr)],
        flush(abi::STREAM_LOG),
        literal(6, 4),
        vec![
            Instruction::I32Const(0),
            call(HostFn::Throw),
            Instruction::Unreachable,
        ],
    ]
    .concat();
    let module = TestModule::new("beforeboom").run(body).build();

    let result = execute(&module);
    assert_eq!(expect_fault(&result), &Fault::Uncaught("Uncaught boom".into()));
    assert_eq!(result.output().text(), "before");
}

#[test]
fn test_uncaught_error_renders_message() {
    let body = [
        literal(0, 3),
        vec![
            call(HostFn::ErrNew),
            Instruction::I32Const(1),
            call(HostFn::Throw),
            Instruction::Unreachable,
        ],
    ]
    .concat();
    let module = TestModule::new("bad").run(body).build();

    let result = execute(&module);
    assert_eq!(expect_fault(&result).to_string(), "Error: bad");
}

#[test]
fn test_gas_exhaustion_reports_limit() {
    let module = TestModule::new("")
        .run(vec![call(HostFn::GasExhausted), Instruction::Unreachable])
        .build();
    let limits = SandboxLimits {
        gas_limit: 500,
        ..SandboxLimits::default()
    };

    let result = Sandbox::new(limits).unwrap().execute(&module);
    assert_eq!(expect_fault(&result), &Fault::BudgetExhausted { limit: 500 });
}

#[test]
fn test_unbounded_recursion_is_stack_overflow() {
    // f() { f() }  run() { f() }
    let module = TestModule::new("")
        .function(vec![], vec![Instruction::Call(IMPORTS)])
        .run(vec![Instruction::Call(IMPORTS)])
        .build();

    let result = execute(&module);
    assert_eq!(expect_fault(&result), &Fault::StackOverflow);
}

#[test]
fn test_array_read_out_of_range() {
    let body = vec![
        Instruction::I32Const(abi::KIND_NUMBER),
        call(HostFn::ArrNew),
        Instruction::F64Const(5.0),
        call(HostFn::ArrGetF64),
        call(HostFn::ConNum),
    ];
    let module = TestModule::new("").run(body).build();

    let result = execute(&module);
    assert_eq!(
        expect_fault(&result).to_string(),
        "TypeError: Cannot read properties of undefined (reading '5')"
    );
}

#[test]
fn test_pop_from_empty_array() {
    let body = vec![
        Instruction::I32Const(abi::KIND_NUMBER),
        call(HostFn::ArrNew),
        call(HostFn::ArrPopF64),
        Instruction::Drop,
    ];
    let module = TestModule::new("").run(body).build();

    let result = execute(&module);
    assert!(matches!(expect_fault(&result), Fault::TypeError(_)));
}

#[test]
fn test_unassigned_handle_is_uninitialized() {
    let body = vec![Instruction::I32Const(0), call(HostFn::ConStr)];
    let module = TestModule::new("").run(body).build();

    let result = execute(&module);
    assert_eq!(expect_fault(&result), &Fault::Uninitialized);
}

#[test]
fn test_unreachable_is_trap() {
    let module = TestModule::new("").run(vec![Instruction::Unreachable]).build();

    let result = execute(&module);
    assert!(matches!(expect_fault(&result), Fault::Trap(_)));
}

#[test]
fn test_missing_entry_point_is_internal() {
    let module = TestModule::new("")
        .run(vec![])
        .without_run_export()
        .build();

    let result = execute(&module);
    assert!(matches!(expect_fault(&result), Fault::Internal(_)));
}

// ══════════════════════════════════════════════════════════════════════════════
// Limits
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_output_limit() {
    let body = [literal(0, 5), vec![call(HostFn::ConStr)], flush(abi::STREAM_LOG)].concat();
    let module = TestModule::new("hello").run(body).build();
    let limits = SandboxLimits {
        max_output_bytes: 3,
        ..SandboxLimits::default()
    };

    let result = Sandbox::new(limits).unwrap().execute(&module);
    assert_eq!(expect_fault(&result), &Fault::OutputLimit { limit: 3 });
    assert!(result.output().is_empty());
}

#[test]
fn test_heap_limit() {
    let body = vec![
        Instruction::I32Const(abi::KIND_NUMBER),
        call(HostFn::ArrNew),
        Instruction::Drop,
        Instruction::I32Const(abi::KIND_NUMBER),
        call(HostFn::ArrNew),
        Instruction::Drop,
    ];
    let module = TestModule::new("").run(body).build();
    let limits = SandboxLimits {
        max_heap_objects: 1,
        ..SandboxLimits::default()
    };

    let result = Sandbox::new(limits).unwrap().execute(&module);
    assert_eq!(expect_fault(&result), &Fault::HeapLimit { limit: 1 });
}

#[test]
fn test_runaway_concatenation_hits_memory_limit() {
    // s = "x"; loop { s = s + "x" }
    let body = [
        literal(0, 1),
        vec![
            Instruction::LocalSet(1),
            Instruction::Loop(BlockType::Empty),
            Instruction::LocalGet(1),
        ],
        literal(0, 1),
        vec![
            call(HostFn::StrConcat),
            Instruction::LocalSet(1),
            Instruction::Br(0),
            Instruction::End,
        ],
    ]
    .concat();
    let module = TestModule::new("x").run(body).build();
    let limits = SandboxLimits {
        max_heap_bytes: 4096,
        ..SandboxLimits::default()
    };

    let result = Sandbox::new(limits).unwrap().execute(&module);
    assert_eq!(expect_fault(&result), &Fault::MemoryLimit { limit: 4096 });
}

#[test]
fn test_array_growth_hits_memory_limit() {
    // xs = []; loop { xs.push(1) }
    let body = vec![
        Instruction::I32Const(abi::KIND_NUMBER),
        call(HostFn::ArrNew),
        Instruction::LocalSet(1),
        Instruction::Loop(BlockType::Empty),
        Instruction::LocalGet(1),
        Instruction::F64Const(1.0),
        call(HostFn::ArrPushF64),
        Instruction::Drop,
        Instruction::Br(0),
        Instruction::End,
    ];
    let module = TestModule::new("").run(body).build();
    let limits = SandboxLimits {
        max_heap_bytes: 1024,
        ..SandboxLimits::default()
    };

    let result = Sandbox::new(limits).unwrap().execute(&module);
    assert_eq!(expect_fault(&result), &Fault::MemoryLimit { limit: 1024 });
}

// ══════════════════════════════════════════════════════════════════════════════
// Isolation
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_runs_share_no_output() {
    let body = [literal(0, 2), vec![call(HostFn::ConStr)], flush(abi::STREAM_LOG)].concat();
    let module = TestModule::new("hi").run(body).build();
    let sandbox = Sandbox::new(SandboxLimits::default()).unwrap();

    let first = sandbox.execute(&module);
    let second = sandbox.execute(&module);
    assert_eq!(first, second);
    assert_eq!(second.output().len(), 1);
}

#[test]
fn test_fault_does_not_leak_into_next_run() {
    let faulty = TestModule::new("x")
        .run(
            [
                literal(0, 1),
                vec![call(HostFn::ConStr)],
                flush(abi::STREAM_LOG),
                vec![Instruction::Unreachable],
            ]
            .concat(),
        )
        .build();
    let clean = TestModule::new("").run(vec![]).build();
    let sandbox = Sandbox::new(SandboxLimits::default()).unwrap();

    let failed = sandbox.execute(&faulty);
    assert_eq!(failed.output().text(), "x");
    let next = sandbox.execute(&clean);
    assert!(next.is_completed());
    assert!(next.output().is_empty());
}

#[test]
fn test_determinism_100_iterations() {
    let body = [
        literal(0, 3),
        vec![
            Instruction::F64Const(3.0),
            call(HostFn::StrRepeat),
            call(HostFn::ConStr),
        ],
        flush(abi::STREAM_LOG),
    ]
    .concat();
    let module = TestModule::new("ab ").run(body).build();
    let sandbox = Sandbox::new(SandboxLimits::default()).unwrap();

    let reference = sandbox.execute(&module);
    assert_eq!(reference.output().text(), "ab ab ab ");
    for _ in 0..100 {
        assert_eq!(sandbox.execute(&module), reference);
    }
}

#[test]
fn test_run_result_serializes_with_status_tag() {
    let module = TestModule::new("").run(vec![Instruction::Unreachable]).build();
    let json = serde_json::to_value(execute(&module)).unwrap();
    assert_eq!(json["status"], "faulted");
    assert_eq!(json["fault"]["kind"], "Trap");
}
