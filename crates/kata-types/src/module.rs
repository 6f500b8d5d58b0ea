use serde::{Deserialize, Serialize};

/// A validated WebAssembly module ready for the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableModule {
    /// The module binary.
    #[serde(skip)]
    pub wasm: Vec<u8>,
    /// Hex-encoded SHA-256 of `wasm`.
    pub fingerprint: String,
}

impl ExecutableModule {
    pub fn new(wasm: Vec<u8>, fingerprint: String) -> Self {
        Self { wasm, fingerprint }
    }

    pub fn size(&self) -> usize {
        self.wasm.len()
    }
}
