//! GPU context: the loaded runtime plus the cached device probe.
//!
//! A process normally uses the global context behind [`context()`]; tests and
//! embedders can build their own with [`GpuContext::new`].

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::config::{Backend, RuntimeConfig};
use crate::error::DeviceError;
use crate::runtime::{DynRuntime, GpuRuntime, NullRuntime, RuntimeFlavor};
use crate::Result;

/// Outcome of the first device-count query against a runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeviceProbe {
    pub(crate) count: crate::DeviceIndex,
    /// Driver problem observed while probing, if any.
    pub(crate) problem: Option<String>,
}

/// Owns a GPU runtime and the per-runtime device-count cache.
pub struct GpuContext {
    pub(crate) runtime: Arc<dyn GpuRuntime>,
    pub(crate) probe: OnceLock<DeviceProbe>,
}

impl GpuContext {
    pub fn new(runtime: Arc<dyn GpuRuntime>) -> Self {
        Self { runtime, probe: OnceLock::new() }
    }

    /// Load the runtime selected by `config`.
    ///
    /// `Auto` never fails: if neither CUDA nor HIP can be loaded the context
    /// falls back to a runtime that reports zero devices.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        let runtime: Arc<dyn GpuRuntime> = match config.backend {
            Backend::Disabled => Arc::new(NullRuntime),
            Backend::Cuda => Arc::new(load_explicit(RuntimeFlavor::Cuda, config)?),
            Backend::Hip => Arc::new(load_explicit(RuntimeFlavor::Hip, config)?),
            Backend::Auto => match DynRuntime::load(RuntimeFlavor::Cuda) {
                Ok(rt) => Arc::new(rt),
                Err(cuda_err) => match DynRuntime::load(RuntimeFlavor::Hip) {
                    Ok(rt) => Arc::new(rt),
                    Err(hip_err) => {
                        tracing::debug!(
                            "no GPU runtime loaded (cuda: {}; hip: {})",
                            cuda_err,
                            hip_err
                        );
                        Arc::new(NullRuntime)
                    }
                },
            },
        };
        Ok(Self::new(runtime))
    }

    pub fn runtime(&self) -> &dyn GpuRuntime {
        &*self.runtime
    }
}

fn load_explicit(flavor: RuntimeFlavor, config: &RuntimeConfig) -> Result<DynRuntime> {
    let loaded = match &config.library_path {
        Some(path) => DynRuntime::load_from(flavor, path),
        None => DynRuntime::load(flavor),
    };
    loaded.map_err(|e| DeviceError::RuntimeUnavailable(format!("{}: {}", flavor.name(), e)))
}

impl fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuContext")
            .field("runtime", &self.runtime.name())
            .field("probe", &self.probe.get())
            .finish()
    }
}

static CONTEXT: OnceLock<GpuContext> = OnceLock::new();

/// Install the process-wide context. Fails if one is already in place,
/// including one created lazily by an earlier [`context()`] call.
pub fn init(config: &RuntimeConfig) -> Result<&'static GpuContext> {
    init_with(GpuContext::from_config(config)?)
}

/// Install an already-built context as the process-wide one.
pub fn init_with(ctx: GpuContext) -> Result<&'static GpuContext> {
    let mut installed = false;
    let ctx_ref = CONTEXT.get_or_init(|| {
        installed = true;
        ctx
    });
    if installed {
        tracing::info!("GPU context initialized with {} runtime", ctx_ref.runtime.name());
        Ok(ctx_ref)
    } else {
        Err(DeviceError::AlreadyInitialized)
    }
}

/// The process-wide context, loaded from the environment on first use.
pub fn context() -> &'static GpuContext {
    CONTEXT.get_or_init(|| {
        let config = RuntimeConfig::from_env().unwrap_or_else(|e| {
            tracing::warn!("{}; using default GPU runtime config", e);
            RuntimeConfig::default()
        });
        GpuContext::from_config(&config).unwrap_or_else(|e| {
            tracing::warn!("{}; continuing without a GPU runtime", e);
            GpuContext::new(Arc::new(NullRuntime))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::SimRuntime;

    #[test]
    fn test_disabled_backend() {
        let ctx = GpuContext::from_config(&RuntimeConfig::new(Backend::Disabled)).unwrap();
        assert_eq!(ctx.runtime().name(), "none");
    }

    #[test]
    fn test_explicit_backend_missing_library() {
        let cfg = RuntimeConfig::new(Backend::Hip).with_library_path("/nonexistent/libamdhip64.so");
        let err = GpuContext::from_config(&cfg).unwrap_err();
        assert!(matches!(err, DeviceError::RuntimeUnavailable(_)), "got {err}");
    }

    #[test]
    fn test_debug_names_runtime() {
        let ctx = GpuContext::new(Arc::new(SimRuntime::with_devices(1)));
        assert!(format!("{ctx:?}").contains("sim"));
    }
}
