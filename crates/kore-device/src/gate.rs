//! Sync policy gate run at the top of every gated synchronization primitive.
//!
//! The inline part is one relaxed load and a compare. Everything else lives
//! in the `#[cold]` enforcement function, so the default (disabled) path
//! never pulls in logging or formatting.

use std::panic::Location;

use crate::error::DeviceError;
use crate::warning::{warning_state, SyncWarningLevel, WarningState};
use crate::Result;

/// `tracing` target of sync diagnostics.
pub const SYNC_TARGET: &str = "kore_device::sync";

/// Check the process-wide warning level before a blocking operation `op`.
#[inline]
#[track_caller]
pub fn check_sync(op: &'static str) -> Result<()> {
    check_sync_with(warning_state(), op)
}

/// Same as [`check_sync`] against an explicit state.
#[inline]
#[track_caller]
pub fn check_sync_with(state: &WarningState, op: &'static str) -> Result<()> {
    let level = state.get_sync_warning_level();
    if level != SyncWarningLevel::Disabled {
        return warn_or_error_on_sync(level, op, Location::caller());
    }
    Ok(())
}

/// Enforce a non-disabled level: log for `Warn`, reject for `Error`.
#[cold]
#[inline(never)]
pub fn warn_or_error_on_sync(
    level: SyncWarningLevel,
    op: &'static str,
    location: &'static Location<'static>,
) -> Result<()> {
    match level {
        SyncWarningLevel::Disabled => Ok(()),
        SyncWarningLevel::Warn => {
            tracing::warn!(
                target: SYNC_TARGET,
                op,
                %location,
                "called a synchronizing GPU operation"
            );
            Ok(())
        }
        SyncWarningLevel::Error => Err(DeviceError::SyncForbidden {
            op,
            location: location.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_passes() {
        let state = WarningState::new();
        assert!(check_sync_with(&state, "stream_synchronize").is_ok());
    }

    #[test]
    fn test_warn_passes() {
        let state = WarningState::new();
        state.set_sync_warning_level(SyncWarningLevel::Warn);
        assert!(check_sync_with(&state, "stream_synchronize").is_ok());
    }

    #[test]
    fn test_error_rejects_with_caller_location() {
        let state = WarningState::new();
        state.set_sync_warning_level(SyncWarningLevel::Error);
        let err = check_sync_with(&state, "memcpy_and_sync").unwrap_err();
        match err {
            DeviceError::SyncForbidden { op, location } => {
                assert_eq!(op, "memcpy_and_sync");
                assert!(location.contains("gate.rs"), "location was {location}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_enforcement_disabled_is_noop() {
        assert!(warn_or_error_on_sync(SyncWarningLevel::Disabled, "op", Location::caller()).is_ok());
    }
}
