//! Module layout constants and value representation.
//!
//! | KataScript type          | Wasm value | Meaning                          |
//! |--------------------------|------------|----------------------------------|
//! | `number`                 | `f64`      | the number itself                |
//! | `boolean`                | `i32`      | 0 or 1                           |
//! | `string`, `T[]`, `Error` | `i32`      | handle into the per-run host heap |
//!
//! Handle `0` is never allocated by the host; a reference variable read
//! before its declaration ran holds `0` and faults on use.

use kata_types::abi::{HostFn, ValKind};
use kata_types::Type;
use wasm_encoder::ValType;

use crate::error::{CodegenError, CodegenResult};

// ── Global variable indices ──────────────────────────────────────────────────
// (order must match the global section emission in compiler.rs)

/// Gas counter, incremented on each tick.
pub const GLOBAL_GAS: u32 = 0;
/// Gas limit, set by `run` from its argument.
pub const GLOBAL_GAS_LIMIT: u32 = 1;
/// First global holding a top-level variable.
pub const FIRST_VARIABLE_GLOBAL: u32 = 2;

// ── Function indices ─────────────────────────────────────────────────────────

/// Number of imported functions (offset for locally-defined function indices).
pub const IMPORT_COUNT: u32 = HostFn::ALL.len() as u32;

// ── Memory ───────────────────────────────────────────────────────────────────

/// Wasm page size in bytes.
pub const PAGE_SIZE: u32 = 65_536;
/// Upper bound on memory pages; string literals are the only memory users.
pub const MAX_MEMORY_PAGES: u64 = 16;

// ── Custom section ───────────────────────────────────────────────────────────

/// Name of the custom section carrying the emitter version.
pub const CUSTOM_SECTION_NAME: &str = "kata";
/// Emitter version written into the custom section.
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wasm value type for a host ABI value kind.
pub fn val_kind(kind: ValKind) -> ValType {
    match kind {
        ValKind::I32 => ValType::I32,
        ValKind::F64 => ValType::F64,
    }
}

/// Wasm value type holding values of `ty`; `None` for `void`.
pub fn val_type(ty: &Type) -> CodegenResult<Option<ValType>> {
    match ty {
        Type::Number => Ok(Some(ValType::F64)),
        Type::Boolean | Type::String | Type::Array(_) | Type::Error => Ok(Some(ValType::I32)),
        Type::Void => Ok(None),
        Type::Unknown => Err(CodegenError::Internal(
            "unresolved type reached the emitter".into(),
        )),
    }
}

/// Like [`val_type`] for positions that must hold a value.
pub fn value_val_type(ty: &Type) -> CodegenResult<ValType> {
    val_type(ty)?.ok_or_else(|| CodegenError::Internal("'void' used as a value".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_val_types() {
        assert_eq!(val_type(&Type::Number).unwrap(), Some(ValType::F64));
        assert_eq!(
            val_type(&Type::array_of(Type::Number)).unwrap(),
            Some(ValType::I32)
        );
        assert_eq!(val_type(&Type::Void).unwrap(), None);
        assert!(val_type(&Type::Unknown).is_err());
        assert!(value_val_type(&Type::Void).is_err());
    }

    #[test]
    fn test_import_count_covers_abi() {
        assert_eq!(IMPORT_COUNT, 53);
    }
}
