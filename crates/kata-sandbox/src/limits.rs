//! Per-run resource limits.

use serde::{Deserialize, Serialize};

use crate::error::{SandboxError, SandboxResult};

/// Resource limits applied to every run.
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxLimits {
    /// Gas ticks (loop iterations plus function entries) before the run stops.
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u32,
    /// Total bytes of captured output.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Strings, arrays and errors allocated during one run.
    #[serde(default = "default_max_heap_objects")]
    pub max_heap_objects: usize,
    /// Longest string a run may build, in bytes.
    #[serde(default = "default_max_string_bytes")]
    pub max_string_bytes: usize,
    /// Total bytes of strings and array slots a run may allocate.
    #[serde(default = "default_max_heap_bytes")]
    pub max_heap_bytes: usize,
}

fn default_gas_limit() -> u32 {
    1_000_000
}

fn default_max_output_bytes() -> usize {
    64 * 1024
}

fn default_max_heap_objects() -> usize {
    1_000_000
}

fn default_max_string_bytes() -> usize {
    1 << 20
}

fn default_max_heap_bytes() -> usize {
    256 << 20
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            gas_limit: default_gas_limit(),
            max_output_bytes: default_max_output_bytes(),
            max_heap_objects: default_max_heap_objects(),
            max_string_bytes: default_max_string_bytes(),
            max_heap_bytes: default_max_heap_bytes(),
        }
    }
}

impl SandboxLimits {
    /// Reject limits no run could work under.
    pub fn validate(&self) -> SandboxResult<()> {
        if self.gas_limit == 0 {
            return Err(SandboxError::InvalidLimits("gas_limit must be positive".into()));
        }
        // The emitted module compares gas as an unsigned i32.
        if self.gas_limit > i32::MAX as u32 {
            return Err(SandboxError::InvalidLimits(format!(
                "gas_limit must be at most {}",
                i32::MAX
            )));
        }
        if self.max_output_bytes == 0 {
            return Err(SandboxError::InvalidLimits(
                "max_output_bytes must be positive".into(),
            ));
        }
        if self.max_heap_objects == 0 {
            return Err(SandboxError::InvalidLimits(
                "max_heap_objects must be positive".into(),
            ));
        }
        if self.max_string_bytes == 0 {
            return Err(SandboxError::InvalidLimits(
                "max_string_bytes must be positive".into(),
            ));
        }
        if self.max_heap_bytes == 0 {
            return Err(SandboxError::InvalidLimits(
                "max_heap_bytes must be positive".into(),
            ));
        }
        Ok(())
    }
}
