//! Runtime faults: every way a run can stop early.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a run stopped before `run` returned.
///
/// The `Display` text is what the learner sees.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum Fault {
    /// An uncaught `throw`, already rendered (`Error: msg`, `Uncaught msg`).
    #[error("{0}")]
    Uncaught(String),

    #[error("TypeError: {0}")]
    TypeError(String),

    #[error("RangeError: {0}")]
    RangeError(String),

    /// A reference variable was read before its declaration ran.
    #[error("ReferenceError: Cannot access a variable before initialization")]
    Uninitialized,

    #[error("RangeError: Maximum call stack size exceeded")]
    StackOverflow,

    #[error("Execution stopped: step budget of {limit} exhausted (infinite loop?)")]
    BudgetExhausted { limit: u32 },

    #[error("Execution stopped: output exceeded {limit} bytes")]
    OutputLimit { limit: usize },

    #[error("Execution stopped: more than {limit} values allocated")]
    HeapLimit { limit: usize },

    #[error("Execution stopped: more than {limit} bytes of memory used")]
    MemoryLimit { limit: usize },

    /// A WebAssembly trap the emitter never plans for.
    #[error("RuntimeError: {0}")]
    Trap(String),

    /// The module could not be loaded or linked.
    #[error("InternalError: {0}")]
    Internal(String),
}

impl Fault {
    /// `arr[i]` / `s[i]` outside the value.
    pub fn read_out_of_range(index: &str) -> Self {
        Fault::TypeError(format!(
            "Cannot read properties of undefined (reading '{index}')"
        ))
    }

    /// Whether the fault was raised by the snippet itself rather than a limit.
    pub fn is_program_error(&self) -> bool {
        matches!(
            self,
            Fault::Uncaught(_)
                | Fault::TypeError(_)
                | Fault::RangeError(_)
                | Fault::Uninitialized
                | Fault::StackOverflow
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            Fault::read_out_of_range("5").to_string(),
            "TypeError: Cannot read properties of undefined (reading '5')"
        );
        assert_eq!(Fault::Uncaught("Error: boom".into()).to_string(), "Error: boom");
        assert_eq!(
            Fault::StackOverflow.to_string(),
            "RangeError: Maximum call stack size exceeded"
        );
    }

    #[test]
    fn test_limits_are_not_program_errors() {
        assert!(!Fault::BudgetExhausted { limit: 10 }.is_program_error());
        assert!(!Fault::OutputLimit { limit: 10 }.is_program_error());
        assert!(!Fault::MemoryLimit { limit: 10 }.is_program_error());
        assert!(Fault::Uninitialized.is_program_error());
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(Fault::BudgetExhausted { limit: 7 }).unwrap();
        assert_eq!(json["kind"], "BudgetExhausted");
        assert_eq!(json["detail"]["limit"], 7);
    }
}
