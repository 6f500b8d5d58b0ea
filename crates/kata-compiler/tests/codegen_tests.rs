//! Emitted module structure tests.
//!
//! Inspects compiled modules with `wasmparser`: the host contract (imports,
//! exports, memory), the data segment and byte-for-byte determinism.

use kata_compiler::{compile, Compilation};
use kata_types::abi::{self, HostFn};
use kata_types::ExecutableModule;
use wasmparser::{ExternalKind, Payload, TypeRef};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn module(source: &str) -> ExecutableModule {
    match compile(source).expect("host fault") {
        Compilation::Emitted { module, .. } => module,
        Compilation::Diagnostics(diagnostics) => panic!(
            "compile failed:\n{}",
            diagnostics
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")
        ),
    }
}

fn exports(wasm: &[u8]) -> Vec<(String, ExternalKind)> {
    let mut exports = Vec::new();
    for payload in wasmparser::Parser::new(0).parse_all(wasm) {
        if let Ok(Payload::ExportSection(reader)) = payload {
            for export in reader {
                let export = export.unwrap();
                exports.push((export.name.to_string(), export.kind));
            }
        }
    }
    exports
}

fn imports(wasm: &[u8]) -> Vec<(String, String)> {
    let mut imports = Vec::new();
    for payload in wasmparser::Parser::new(0).parse_all(wasm) {
        if let Ok(Payload::ImportSection(reader)) = payload {
            for import in reader {
                let import = import.unwrap();
                assert!(matches!(import.ty, TypeRef::Func(_)));
                imports.push((import.module.to_string(), import.name.to_string()));
            }
        }
    }
    imports
}

fn local_function_count(wasm: &[u8]) -> u32 {
    for payload in wasmparser::Parser::new(0).parse_all(wasm) {
        if let Ok(Payload::FunctionSection(reader)) = payload {
            return reader.count();
        }
    }
    0
}

fn data_bytes(wasm: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for payload in wasmparser::Parser::new(0).parse_all(wasm) {
        if let Ok(Payload::DataSection(reader)) = payload {
            for data in reader {
                bytes.extend_from_slice(data.unwrap().data);
            }
        }
    }
    bytes
}

fn custom_section(wasm: &[u8], name: &str) -> Option<Vec<u8>> {
    for payload in wasmparser::Parser::new(0).parse_all(wasm) {
        if let Ok(Payload::CustomSection(reader)) = payload {
            if reader.name() == name {
                return Some(reader.data().to_vec());
            }
        }
    }
    None
}

// ══════════════════════════════════════════════════════════════════════════════
// Host contract
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_module_validates() {
    let m = module("console.log('hi')");
    wasmparser::validate(&m.wasm).expect("emitted module must validate");
}

#[test]
fn test_exports_run_and_memory() {
    let m = module("console.log(1)");
    let exports = exports(&m.wasm);
    assert!(exports.contains(&(abi::ENTRY_EXPORT.to_string(), ExternalKind::Func)));
    assert!(exports.contains(&(abi::MEMORY_EXPORT.to_string(), ExternalKind::Memory)));
    assert_eq!(exports.len(), 2, "only the host contract is exported");
}

#[test]
fn test_imports_every_host_function_in_order() {
    let m = module("console.log(1)");
    let imports = imports(&m.wasm);
    assert_eq!(imports.len(), HostFn::ALL.len());
    for (import, host) in imports.iter().zip(HostFn::ALL) {
        assert_eq!(import.0, abi::MODULE);
        assert_eq!(import.1, host.name());
    }
}

#[test]
fn test_functions_are_emitted_before_run() {
    let source = r#"
function double(n: number): number {
  return n * 2
}
function greet(): void {
  console.log("hi")
}
greet()
console.log(double(2))
"#;
    let m = module(source);
    // double, greet, run
    assert_eq!(local_function_count(&m.wasm), 3);
}

#[test]
fn test_string_literals_interned_once() {
    let m = module("console.log('abc')\nconsole.log('abc', 'xyz')");
    assert_eq!(data_bytes(&m.wasm), b"abcxyz");
}

#[test]
fn test_custom_section_carries_version() {
    let m = module("console.log(1)");
    let version = custom_section(&m.wasm, "kata").expect("kata custom section");
    assert_eq!(version, env!("CARGO_PKG_VERSION").as_bytes());
}

#[test]
fn test_empty_program_still_has_entry_point() {
    let m = module("");
    assert!(exports(&m.wasm)
        .iter()
        .any(|(name, _)| name == abi::ENTRY_EXPORT));
}

// ══════════════════════════════════════════════════════════════════════════════
// Fingerprints and determinism
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_fingerprint_is_sha256_hex() {
    let m = module("console.log(1)");
    assert_eq!(m.fingerprint.len(), 64);
    assert!(m.fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(m.fingerprint, kata_compiler::fingerprint(&m.wasm));
}

#[test]
fn test_different_sources_differ() {
    assert_ne!(
        module("console.log(1)").fingerprint,
        module("console.log(2)").fingerprint
    );
}

#[test]
fn test_emission_determinism_100_iterations() {
    let source = r#"
const words = ["b", "a", "c"]
let out = ""
for (const w of words) {
  out += w.toUpperCase()
}
function count(s: string): number {
  return s.length
}
console.log(out, count(out))
"#;
    let reference = module(source);
    for i in 0..100 {
        let again = module(source);
        assert_eq!(again.wasm, reference.wasm, "Determinism failure at iteration {i}");
        assert_eq!(again.fingerprint, reference.fingerprint);
    }
}
