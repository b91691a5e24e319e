//! Runtime backend selection.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;
use crate::Result;

/// Environment variable selecting the backend (`auto`, `cuda`, `hip`, `disabled`).
pub const ENV_BACKEND: &str = "KORE_GPU_BACKEND";
/// Environment variable overriding the runtime library path.
pub const ENV_RUNTIME_LIB: &str = "KORE_GPU_RUNTIME_LIB";

/// Which GPU runtime to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Try CUDA, then HIP; fall back to no GPU.
    #[default]
    Auto,
    Cuda,
    Hip,
    /// Never load a runtime; every device query reports zero devices.
    Disabled,
}

impl FromStr for Backend {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Backend::Auto),
            "cuda" => Ok(Backend::Cuda),
            "hip" | "rocm" => Ok(Backend::Hip),
            "disabled" | "none" | "cpu" => Ok(Backend::Disabled),
            other => Err(DeviceError::Config(format!("unknown GPU backend '{other}'"))),
        }
    }
}

/// Configuration for the process-wide GPU context.
///
/// The sync warning level is deliberately not here; it is only changed
/// through [`crate::set_sync_warning_level`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runtime to load.
    pub backend: Backend,

    /// Explicit runtime library (e.g. `/opt/rocm/lib/libamdhip64.so`).
    /// Ignored for `Auto` and `Disabled`.
    pub library_path: Option<PathBuf>,
}

impl RuntimeConfig {
    pub fn new(backend: Backend) -> Self {
        Self { backend, library_path: None }
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Read `KORE_GPU_BACKEND` and `KORE_GPU_RUNTIME_LIB`; unset means default.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let backend = match lookup(ENV_BACKEND) {
            Some(v) => v.parse()?,
            None => Backend::Auto,
        };
        let library_path = lookup(ENV_RUNTIME_LIB)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Ok(Self { backend, library_path })
    }
}
