//! Toolchain loading: the one-time suspension point before the first run.

use std::sync::Arc;

use kata_compiler::{Compilation, CompilerHost, HostError};
use kata_sandbox::{RunResult, Sandbox, SandboxError};
use thiserror::Error;

use crate::config::{ConfigError, KataConfig};

/// Program compiled and run once while loading.
const WARM_UP_SOURCE: &str = "console.log(\"ready\")";
const WARM_UP_OUTPUT: &str = "ready";

/// Why a toolchain could not be made ready. Persistent for the session.
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("compiler unavailable: {0}")]
    Compiler(#[from] HostError),

    #[error("sandbox unavailable: {0}")]
    Sandbox(#[from] SandboxError),

    /// The warm-up program did not compile, faulted or printed the wrong thing.
    #[error("warm-up run failed: {0}")]
    WarmUp(String),

    #[error("toolchain loader stopped before reporting")]
    LoaderDisconnected,
}

/// A ready compiler host and sandbox sharing one configuration.
#[derive(Debug)]
pub struct Toolchain {
    config: KataConfig,
    compiler: CompilerHost,
    sandbox: Sandbox,
}

impl Toolchain {
    /// Validate `config`, build the compiler and sandbox, and check them
    /// end to end with a warm-up program.
    pub fn load(config: KataConfig) -> Result<Self, ToolchainError> {
        let _span = tracing::debug_span!("toolchain_load", file = %config.file_name).entered();

        let toolchain = Self::load_cold(config)?;
        if let Err(err) = toolchain.warm_up() {
            tracing::warn!(error = %err, "toolchain warm-up run failed");
            return Err(err);
        }
        tracing::debug!("toolchain ready");
        Ok(toolchain)
    }

    fn load_cold(config: KataConfig) -> Result<Self, ToolchainError> {
        let result = config
            .validate()
            .map_err(ToolchainError::from)
            .and_then(|()| {
                let compiler = CompilerHost::new(config.file_name.clone())?;
                let sandbox = Sandbox::new(config.limits.clone())?;
                Ok((compiler, sandbox))
            });
        match result {
            Ok((compiler, sandbox)) => Ok(Self {
                config,
                compiler,
                sandbox,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "toolchain configuration rejected");
                Err(err)
            }
        }
    }

    fn warm_up(&self) -> Result<(), ToolchainError> {
        let module = match self.compiler.compile(WARM_UP_SOURCE)? {
            Compilation::Emitted { module, .. } => module,
            Compilation::Diagnostics(diagnostics) => {
                let first = diagnostics
                    .iter()
                    .next()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                return Err(ToolchainError::WarmUp(format!(
                    "warm-up program did not compile: {first}"
                )));
            }
        };
        match self.sandbox.execute(&module) {
            RunResult::Completed { output } if output.text() == WARM_UP_OUTPUT => Ok(()),
            RunResult::Completed { output } => Err(ToolchainError::WarmUp(format!(
                "warm-up program printed {:?}",
                output.text()
            ))),
            RunResult::Faulted { fault, .. } => Err(ToolchainError::WarmUp(fault.to_string())),
        }
    }

    pub fn config(&self) -> &KataConfig {
        &self.config
    }

    pub fn compiler(&self) -> &CompilerHost {
        &self.compiler
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }
}

/// Where a session's toolchain stands.
#[derive(Debug, Default)]
pub enum ToolchainStatus {
    #[default]
    Loading,
    Ready(Arc<Toolchain>),
    /// Not retried.
    Failed(ToolchainError),
}

impl ToolchainStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ToolchainStatus::Ready(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ToolchainStatus::Loading)
    }

    pub fn error(&self) -> Option<&ToolchainError> {
        match self {
            ToolchainStatus::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Loads a toolchain on a background thread.
///
/// Poll with [`try_take`](Self::try_take) from the controlling loop, or block
/// with [`wait`](Self::wait).
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
pub struct ToolchainLoader {
    receiver: std::sync::mpsc::Receiver<Result<Toolchain, ToolchainError>>,
    taken: bool,
}

#[cfg(not(target_arch = "wasm32"))]
impl ToolchainLoader {
    pub fn spawn(config: KataConfig) -> Self {
        let (sender, receiver) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            // The loader may have been dropped; nobody is waiting then.
            let _ = sender.send(Toolchain::load(config));
        });
        Self {
            receiver,
            taken: false,
        }
    }

    /// The load result once it is available. Returns `None` while loading
    /// and after the result has been taken.
    pub fn try_take(&mut self) -> Option<Result<Arc<Toolchain>, ToolchainError>> {
        use std::sync::mpsc::TryRecvError;

        if self.taken {
            return None;
        }
        let result = match self.receiver.try_recv() {
            Ok(result) => result.map(Arc::new),
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(ToolchainError::LoaderDisconnected),
        };
        self.taken = true;
        Some(result)
    }

    /// Block until the load finishes.
    pub fn wait(self) -> Result<Arc<Toolchain>, ToolchainError> {
        if self.taken {
            return Err(ToolchainError::LoaderDisconnected);
        }
        match self.receiver.recv() {
            Ok(result) => result.map(Arc::new),
            Err(_) => Err(ToolchainError::LoaderDisconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kata_sandbox::SandboxLimits;

    #[test]
    fn test_default_config_loads() {
        let toolchain = Toolchain::load(KataConfig::default()).unwrap();
        assert_eq!(toolchain.compiler().file_name(), "main.ts");
        assert_eq!(toolchain.sandbox().limits(), &SandboxLimits::default());
    }

    #[test]
    fn test_invalid_config_fails() {
        let config = KataConfig {
            file_name: String::new(),
            ..KataConfig::default()
        };
        assert!(matches!(
            Toolchain::load(config),
            Err(ToolchainError::Config(ConfigError::InvalidFileName(_)))
        ));
    }

    #[test]
    fn test_limits_too_tight_for_warm_up() {
        let config = KataConfig {
            limits: SandboxLimits {
                max_output_bytes: 2,
                ..SandboxLimits::default()
            },
            ..KataConfig::default()
        };
        let err = Toolchain::load(config).unwrap_err();
        assert!(matches!(err, ToolchainError::WarmUp(_)));
        assert!(err.to_string().contains("output exceeded 2 bytes"));
    }

    #[test]
    fn test_loader_delivers_once() {
        let mut loader = ToolchainLoader::spawn(KataConfig::default());
        let result = loop {
            if let Some(result) = loader.try_take() {
                break result;
            }
            std::thread::yield_now();
        };
        assert!(result.is_ok());
        assert!(loader.try_take().is_none());
    }

    #[test]
    fn test_loader_wait() {
        assert!(ToolchainLoader::spawn(KataConfig::default()).wait().is_ok());
    }

    #[test]
    fn test_status_helpers() {
        let status = ToolchainStatus::default();
        assert!(status.is_loading());
        assert!(!status.is_ready());
        let failed = ToolchainStatus::Failed(ToolchainError::WarmUp("x".into()));
        assert!(failed.error().is_some());
    }
}
