//! Error type shared by every device and synchronization operation.

/// Errors surfaced by `kore-device`.
///
/// `device_count()` never produces one of these; every other fallible
/// operation propagates them straight to the caller without retrying.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// A runtime call returned a non-success status.
    #[error("GPU runtime error {code} in {context}: {message}")]
    Runtime {
        code: i32,
        message: String,
        context: &'static str,
    },

    /// No GPU devices were detected.
    #[error("No GPU devices are available: 0 devices found{}", detail_suffix(.detail))]
    NoDevice { detail: Option<String> },

    /// A gated synchronization was attempted while the sync warning level is `error`.
    #[error("called a synchronizing GPU operation ({op}) at {location} while the sync warning level is `error`")]
    SyncForbidden { op: &'static str, location: String },

    /// The runtime reported a device ordinal that does not fit a `DeviceIndex`.
    #[error("device ordinal {0} is out of range")]
    IndexOutOfRange(i32),

    /// An explicitly requested GPU runtime library could not be loaded.
    #[error("GPU runtime not available: {0}")]
    RuntimeUnavailable(String),

    /// The process-wide context was already installed.
    #[error("GPU context already initialized")]
    AlreadyInitialized,

    /// Invalid runtime configuration.
    #[error("invalid GPU runtime configuration: {0}")]
    Config(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(" ({d})"),
        None => String::new(),
    }
}

impl DeviceError {
    /// Raw runtime status code, if this error came from the runtime.
    pub fn code(&self) -> Option<i32> {
        match self {
            DeviceError::Runtime { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether this is the sync-policy rejection.
    pub fn is_sync_forbidden(&self) -> bool {
        matches!(self, DeviceError::SyncForbidden { .. })
    }
}
