//! The ambient library: built-in functions, namespaces and methods.
//!
//! The checker resolves every built-in use to a [`Builtin`] and records it in
//! the [`TypeTable`](crate::ty::TypeTable); the emitter lowers each variant
//! without looking at names again.

use crate::abi;
use crate::ty::Type;

/// Namespace objects that exist without a declaration.
pub const NAMESPACES: &[&str] = &["console", "Math"];

/// Global functions that exist without a declaration.
pub const GLOBAL_FUNCTIONS: &[&str] = &["print", "String", "Number", "isNaN", "parseInt"];

/// Global number constants.
pub const GLOBAL_CONSTANTS: &[&str] = &["NaN", "Infinity"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    // ── Global constants ──
    NaN,
    Infinity,

    // ── Global functions ──
    Print,
    StringOf,
    NumberOf,
    IsNaN,
    ParseInt,

    // ── console ──
    /// `console.<method>(...)`, carrying the output stream code.
    Console(i32),

    // ── Math ──
    MathPi,
    MathE,
    MathFloor,
    MathCeil,
    MathRound,
    MathTrunc,
    MathAbs,
    MathSqrt,
    MathSign,
    MathMin,
    MathMax,
    MathPow,

    // ── string ──
    StrLength,
    StrUpper,
    StrLower,
    StrTrim,
    StrIncludes,
    StrIndexOf,
    StrStartsWith,
    StrEndsWith,
    StrRepeat,
    StrCharAt,
    StrSlice,
    StrSplit,
    StrToString,

    // ── number / boolean ──
    NumToString,
    NumToFixed,
    BoolToString,

    // ── array ──
    ArrLength,
    ArrPush,
    ArrPop,
    ArrJoin,
    ArrIncludes,
    ArrIndexOf,
    ArrReverse,
    ArrSlice,
    ArrToString,

    // ── Error ──
    ErrMessage,
    ErrToString,
}

impl Builtin {
    /// A bare name that is not a variable.
    pub fn global_constant(name: &str) -> Option<Builtin> {
        match name {
            "NaN" => Some(Builtin::NaN),
            "Infinity" => Some(Builtin::Infinity),
            _ => None,
        }
    }

    /// `name(...)` where `name` is not a user function.
    pub fn global_function(name: &str) -> Option<Builtin> {
        Some(match name {
            "print" => Builtin::Print,
            "String" => Builtin::StringOf,
            "Number" => Builtin::NumberOf,
            "isNaN" => Builtin::IsNaN,
            "parseInt" => Builtin::ParseInt,
            _ => return None,
        })
    }

    /// `namespace.name` or `namespace.name(...)`.
    pub fn namespace_member(namespace: &str, name: &str) -> Option<Builtin> {
        Some(match (namespace, name) {
            ("console", "log") => Builtin::Console(abi::STREAM_LOG),
            ("console", "info") => Builtin::Console(abi::STREAM_INFO),
            ("console", "warn") => Builtin::Console(abi::STREAM_WARN),
            ("console", "error") => Builtin::Console(abi::STREAM_ERROR),
            ("console", "debug") => Builtin::Console(abi::STREAM_DEBUG),
            ("Math", "PI") => Builtin::MathPi,
            ("Math", "E") => Builtin::MathE,
            ("Math", "floor") => Builtin::MathFloor,
            ("Math", "ceil") => Builtin::MathCeil,
            ("Math", "round") => Builtin::MathRound,
            ("Math", "trunc") => Builtin::MathTrunc,
            ("Math", "abs") => Builtin::MathAbs,
            ("Math", "sqrt") => Builtin::MathSqrt,
            ("Math", "sign") => Builtin::MathSign,
            ("Math", "min") => Builtin::MathMin,
            ("Math", "max") => Builtin::MathMax,
            ("Math", "pow") => Builtin::MathPow,
            _ => return None,
        })
    }

    /// `receiver.name(...)` on a value of type `receiver`.
    pub fn method(receiver: &Type, name: &str) -> Option<Builtin> {
        Some(match (receiver, name) {
            (Type::String, "toUpperCase") => Builtin::StrUpper,
            (Type::String, "toLowerCase") => Builtin::StrLower,
            (Type::String, "trim") => Builtin::StrTrim,
            (Type::String, "includes") => Builtin::StrIncludes,
            (Type::String, "indexOf") => Builtin::StrIndexOf,
            (Type::String, "startsWith") => Builtin::StrStartsWith,
            (Type::String, "endsWith") => Builtin::StrEndsWith,
            (Type::String, "repeat") => Builtin::StrRepeat,
            (Type::String, "charAt") => Builtin::StrCharAt,
            (Type::String, "slice") => Builtin::StrSlice,
            (Type::String, "split") => Builtin::StrSplit,
            (Type::String, "toString") => Builtin::StrToString,
            (Type::Number, "toString") => Builtin::NumToString,
            (Type::Number, "toFixed") => Builtin::NumToFixed,
            (Type::Boolean, "toString") => Builtin::BoolToString,
            (Type::Array(_), "push") => Builtin::ArrPush,
            (Type::Array(_), "pop") => Builtin::ArrPop,
            (Type::Array(_), "join") => Builtin::ArrJoin,
            (Type::Array(_), "includes") => Builtin::ArrIncludes,
            (Type::Array(_), "indexOf") => Builtin::ArrIndexOf,
            (Type::Array(_), "reverse") => Builtin::ArrReverse,
            (Type::Array(_), "slice") => Builtin::ArrSlice,
            (Type::Array(_), "toString") => Builtin::ArrToString,
            (Type::Error, "toString") => Builtin::ErrToString,
            _ => return None,
        })
    }

    /// `receiver.name` on a value of type `receiver`.
    pub fn property(receiver: &Type, name: &str) -> Option<Builtin> {
        Some(match (receiver, name) {
            (Type::String, "length") => Builtin::StrLength,
            (Type::Array(_), "length") => Builtin::ArrLength,
            (Type::Error, "message") => Builtin::ErrMessage,
            _ => return None,
        })
    }

    /// Whether this built-in is read as a property rather than called.
    pub fn is_property(self) -> bool {
        matches!(
            self,
            Builtin::NaN
                | Builtin::Infinity
                | Builtin::MathPi
                | Builtin::MathE
                | Builtin::StrLength
                | Builtin::ArrLength
                | Builtin::ErrMessage
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_streams() {
        assert_eq!(
            Builtin::namespace_member("console", "warn"),
            Some(Builtin::Console(abi::STREAM_WARN))
        );
        assert_eq!(Builtin::namespace_member("console", "table"), None);
    }

    #[test]
    fn test_methods_depend_on_receiver() {
        let nums = Type::array_of(Type::Number);
        assert_eq!(Builtin::method(&nums, "slice"), Some(Builtin::ArrSlice));
        assert_eq!(Builtin::method(&Type::String, "slice"), Some(Builtin::StrSlice));
        assert_eq!(Builtin::method(&Type::Number, "slice"), None);
        assert_eq!(Builtin::method(&Type::Boolean, "toString"), Some(Builtin::BoolToString));
    }

    #[test]
    fn test_properties() {
        assert_eq!(Builtin::property(&Type::String, "length"), Some(Builtin::StrLength));
        assert_eq!(Builtin::property(&Type::Number, "length"), None);
        assert!(Builtin::MathPi.is_property());
        assert!(!Builtin::MathFloor.is_property());
    }

    #[test]
    fn test_global_names_listed() {
        for name in GLOBAL_FUNCTIONS {
            assert!(Builtin::global_function(name).is_some(), "{name}");
        }
        for name in GLOBAL_CONSTANTS {
            assert!(Builtin::global_constant(name).is_some(), "{name}");
        }
    }
}
