//! Host ABI shared by the emitter and the sandbox.
//!
//! Every output primitive and every heap operation of a snippet is an import
//! from the `env` module. The emitter imports [`HostFn::ALL`] in order, so a
//! host function's import index is its discriminant.
//!
//! Reference values (strings, arrays, errors) are `i32` handles into the
//! per-run host heap. Handle `0` is never allocated; it marks a variable that
//! has not been initialised yet. Numbers are `f64`, booleans `i32` 0/1.

/// Import module name.
pub const MODULE: &str = "env";

/// Export name of the entry point: `run(gas_limit: i32)`.
pub const ENTRY_EXPORT: &str = "run";

/// Export name of the linear memory holding string literal bytes.
pub const MEMORY_EXPORT: &str = "memory";

// ── Output streams ──

pub const STREAM_LOG: i32 = 0;
pub const STREAM_INFO: i32 = 1;
pub const STREAM_WARN: i32 = 2;
pub const STREAM_ERROR: i32 = 3;
pub const STREAM_DEBUG: i32 = 4;

// ── Array element kinds ──

pub const KIND_NUMBER: i32 = 0;
pub const KIND_STRING: i32 = 1;
pub const KIND_BOOLEAN: i32 = 2;
pub const KIND_ARRAY: i32 = 3;
pub const KIND_ERROR: i32 = 4;

/// Wasm value type of a host function parameter or result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValKind {
    I32,
    F64,
}

use ValKind::{F64, I32};

/// Host functions imported by every emitted module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum HostFn {
    // ── Console ──
    /// Append a number argument to the pending console line.
    ConNum,
    ConStr,
    ConBool,
    /// Append an array or error argument, inspected.
    ConRef,
    /// Emit the pending line on a stream.
    ConFlush,

    // ── Control ──
    /// `throw` of a string (`is_error = 0`) or an `Error` (`is_error = 1`).
    Throw,
    GasExhausted,

    // ── Strings ──
    StrConst,
    StrConcat,
    StrEq,
    /// Orders by Unicode scalar value, not by UTF-16 code unit as JS does.
    StrCmp,
    /// Counts Unicode scalar values, not UTF-16 code units as JS does.
    StrLen,
    /// Indexes by Unicode scalar value, not by UTF-16 code unit as JS does.
    StrAt,
    StrCharAt,
    StrUpper,
    StrLower,
    StrTrim,
    StrIncludes,
    StrIndexOf,
    StrStartsWith,
    StrEndsWith,
    StrRepeat,
    StrSlice,
    StrSplit,

    // ── Conversions ──
    StrToNum,
    StrParseInt,
    NumToStr,
    NumToFixed,
    BoolToStr,

    // ── Math ──
    NumPow,
    NumRem,
    NumSign,

    // ── Arrays ──
    ArrNew,
    ArrPushF64,
    ArrPushI32,
    ArrGetF64,
    ArrGetI32,
    ArrSetF64,
    ArrSetI32,
    ArrPopF64,
    ArrPopI32,
    ArrLen,
    ArrJoin,
    ArrIncludesF64,
    ArrIncludesI32,
    ArrIndexOfF64,
    ArrIndexOfI32,
    ArrReverse,
    ArrSlice,
    ArrToStr,

    // ── Errors ──
    ErrNew,
    ErrMessage,
    ErrToStr,
}

impl HostFn {
    /// All host functions in import order.
    pub const ALL: [HostFn; 53] = [
        HostFn::ConNum,
        HostFn::ConStr,
        HostFn::ConBool,
        HostFn::ConRef,
        HostFn::ConFlush,
        HostFn::Throw,
        HostFn::GasExhausted,
        HostFn::StrConst,
        HostFn::StrConcat,
        HostFn::StrEq,
        HostFn::StrCmp,
        HostFn::StrLen,
        HostFn::StrAt,
        HostFn::StrCharAt,
        HostFn::StrUpper,
        HostFn::StrLower,
        HostFn::StrTrim,
        HostFn::StrIncludes,
        HostFn::StrIndexOf,
        HostFn::StrStartsWith,
        HostFn::StrEndsWith,
        HostFn::StrRepeat,
        HostFn::StrSlice,
        HostFn::StrSplit,
        HostFn::StrToNum,
        HostFn::StrParseInt,
        HostFn::NumToStr,
        HostFn::NumToFixed,
        HostFn::BoolToStr,
        HostFn::NumPow,
        HostFn::NumRem,
        HostFn::NumSign,
        HostFn::ArrNew,
        HostFn::ArrPushF64,
        HostFn::ArrPushI32,
        HostFn::ArrGetF64,
        HostFn::ArrGetI32,
        HostFn::ArrSetF64,
        HostFn::ArrSetI32,
        HostFn::ArrPopF64,
        HostFn::ArrPopI32,
        HostFn::ArrLen,
        HostFn::ArrJoin,
        HostFn::ArrIncludesF64,
        HostFn::ArrIncludesI32,
        HostFn::ArrIndexOfF64,
        HostFn::ArrIndexOfI32,
        HostFn::ArrReverse,
        HostFn::ArrSlice,
        HostFn::ArrToStr,
        HostFn::ErrNew,
        HostFn::ErrMessage,
        HostFn::ErrToStr,
    ];

    /// Function index of this import in an emitted module.
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Import field name.
    pub fn name(self) -> &'static str {
        match self {
            HostFn::ConNum => "con_num",
            HostFn::ConStr => "con_str",
            HostFn::ConBool => "con_bool",
            HostFn::ConRef => "con_ref",
            HostFn::ConFlush => "con_flush",
            HostFn::Throw => "throw",
            HostFn::GasExhausted => "gas_exhausted",
            HostFn::StrConst => "str_const",
            HostFn::StrConcat => "str_concat",
            HostFn::StrEq => "str_eq",
            HostFn::StrCmp => "str_cmp",
            HostFn::StrLen => "str_len",
            HostFn::StrAt => "str_at",
            HostFn::StrCharAt => "str_char_at",
            HostFn::StrUpper => "str_upper",
            HostFn::StrLower => "str_lower",
            HostFn::StrTrim => "str_trim",
            HostFn::StrIncludes => "str_includes",
            HostFn::StrIndexOf => "str_index_of",
            HostFn::StrStartsWith => "str_starts_with",
            HostFn::StrEndsWith => "str_ends_with",
            HostFn::StrRepeat => "str_repeat",
            HostFn::StrSlice => "str_slice",
            HostFn::StrSplit => "str_split",
            HostFn::StrToNum => "str_to_num",
            HostFn::StrParseInt => "str_parse_int",
            HostFn::NumToStr => "num_to_str",
            HostFn::NumToFixed => "num_to_fixed",
            HostFn::BoolToStr => "bool_to_str",
            HostFn::NumPow => "num_pow",
            HostFn::NumRem => "num_rem",
            HostFn::NumSign => "num_sign",
            HostFn::ArrNew => "arr_new",
            HostFn::ArrPushF64 => "arr_push_f64",
            HostFn::ArrPushI32 => "arr_push_i32",
            HostFn::ArrGetF64 => "arr_get_f64",
            HostFn::ArrGetI32 => "arr_get_i32",
            HostFn::ArrSetF64 => "arr_set_f64",
            HostFn::ArrSetI32 => "arr_set_i32",
            HostFn::ArrPopF64 => "arr_pop_f64",
            HostFn::ArrPopI32 => "arr_pop_i32",
            HostFn::ArrLen => "arr_len",
            HostFn::ArrJoin => "arr_join",
            HostFn::ArrIncludesF64 => "arr_includes_f64",
            HostFn::ArrIncludesI32 => "arr_includes_i32",
            HostFn::ArrIndexOfF64 => "arr_index_of_f64",
            HostFn::ArrIndexOfI32 => "arr_index_of_i32",
            HostFn::ArrReverse => "arr_reverse",
            HostFn::ArrSlice => "arr_slice",
            HostFn::ArrToStr => "arr_to_str",
            HostFn::ErrNew => "err_new",
            HostFn::ErrMessage => "err_message",
            HostFn::ErrToStr => "err_to_str",
        }
    }

    /// `(params, results)` of the import.
    pub fn signature(self) -> (&'static [ValKind], &'static [ValKind]) {
        match self {
            HostFn::ConNum => (&[F64], &[]),
            HostFn::ConStr | HostFn::ConBool | HostFn::ConRef | HostFn::ConFlush => {
                (&[I32], &[])
            }
            HostFn::Throw => (&[I32, I32], &[]),
            HostFn::GasExhausted => (&[], &[]),
            HostFn::StrConst
            | HostFn::StrConcat
            | HostFn::StrEq
            | HostFn::StrCmp
            | HostFn::StrIncludes
            | HostFn::StrStartsWith
            | HostFn::StrEndsWith
            | HostFn::StrSplit
            | HostFn::ArrJoin
            | HostFn::ArrIncludesI32 => (&[I32, I32], &[I32]),
            HostFn::StrLen | HostFn::StrToNum | HostFn::StrParseInt | HostFn::ArrLen => {
                (&[I32], &[F64])
            }
            HostFn::StrAt | HostFn::StrCharAt | HostFn::StrRepeat | HostFn::ArrGetI32 => {
                (&[I32, F64], &[I32])
            }
            HostFn::StrUpper
            | HostFn::StrLower
            | HostFn::StrTrim
            | HostFn::BoolToStr
            | HostFn::ArrNew
            | HostFn::ArrPopI32
            | HostFn::ArrReverse
            | HostFn::ArrToStr
            | HostFn::ErrNew
            | HostFn::ErrMessage
            | HostFn::ErrToStr => (&[I32], &[I32]),
            HostFn::StrIndexOf | HostFn::ArrPushI32 | HostFn::ArrIndexOfI32 => {
                (&[I32, I32], &[F64])
            }
            HostFn::StrSlice | HostFn::ArrSlice => (&[I32, F64, F64], &[I32]),
            HostFn::NumToStr => (&[F64], &[I32]),
            HostFn::NumToFixed => (&[F64, F64], &[I32]),
            HostFn::NumPow | HostFn::NumRem => (&[F64, F64], &[F64]),
            HostFn::NumSign => (&[F64], &[F64]),
            HostFn::ArrPushF64 | HostFn::ArrIndexOfF64 => (&[I32, F64], &[F64]),
            HostFn::ArrGetF64 => (&[I32, F64], &[F64]),
            HostFn::ArrSetF64 => (&[I32, F64, F64], &[]),
            HostFn::ArrSetI32 => (&[I32, F64, I32], &[]),
            HostFn::ArrPopF64 => (&[I32], &[F64]),
            HostFn::ArrIncludesF64 => (&[I32, F64], &[I32]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_import_order_matches_discriminants() {
        for (i, f) in HostFn::ALL.iter().enumerate() {
            assert_eq!(f.index() as usize, i, "{} out of order", f.name());
        }
    }

    #[test]
    fn test_import_names_unique() {
        let names: HashSet<_> = HostFn::ALL.iter().map(|f| f.name()).collect();
        assert_eq!(names.len(), HostFn::ALL.len());
    }

    #[test]
    fn test_signatures() {
        assert_eq!(HostFn::Throw.signature(), (&[I32, I32][..], &[][..]));
        assert_eq!(HostFn::ArrSetI32.signature(), (&[I32, F64, I32][..], &[][..]));
        assert_eq!(HostFn::StrLen.signature(), (&[I32][..], &[F64][..]));
    }
}
