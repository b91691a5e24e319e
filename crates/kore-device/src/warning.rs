//! Process-wide synchronization warning level.
//!
//! Read on every gated synchronization call, written rarely (usually once
//! during setup). The read is a single relaxed atomic load.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// How strictly host/device synchronization is policed, in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SyncWarningLevel {
    #[default]
    Disabled = 0,
    Warn = 1,
    Error = 2,
}

impl SyncWarningLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncWarningLevel::Disabled => "disabled",
            SyncWarningLevel::Warn => "warn",
            SyncWarningLevel::Error => "error",
        }
    }

    #[inline]
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SyncWarningLevel::Disabled,
            1 => SyncWarningLevel::Warn,
            _ => SyncWarningLevel::Error,
        }
    }
}

impl fmt::Display for SyncWarningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncWarningLevel {
    type Err = DeviceError;

    /// Accepts the level names plus the numeric debug-mode spellings `0`/`1`/`2`
    /// (`default` is an alias for `disabled`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" | "default" | "0" => Ok(SyncWarningLevel::Disabled),
            "warn" | "1" => Ok(SyncWarningLevel::Warn),
            "error" | "2" => Ok(SyncWarningLevel::Error),
            other => Err(DeviceError::Config(format!(
                "unknown sync warning level '{other}', expected disabled, warn or error"
            ))),
        }
    }
}

impl TryFrom<i32> for SyncWarningLevel {
    type Error = DeviceError;

    fn try_from(value: i32) -> Result<Self, DeviceError> {
        match value {
            0 => Ok(SyncWarningLevel::Disabled),
            1 => Ok(SyncWarningLevel::Warn),
            2 => Ok(SyncWarningLevel::Error),
            other => Err(DeviceError::Config(format!(
                "sync warning level must be 0, 1 or 2, got {other}"
            ))),
        }
    }
}

/// Shared cell holding the current [`SyncWarningLevel`].
///
/// Writes become visible to other threads without any ordering guarantee
/// beyond the atomic itself; a racing reader may still see the old level.
#[derive(Debug)]
pub struct WarningState {
    level: AtomicU8,
}

impl WarningState {
    pub const fn new() -> Self {
        Self { level: AtomicU8::new(SyncWarningLevel::Disabled as u8) }
    }

    #[inline]
    pub fn get_sync_warning_level(&self) -> SyncWarningLevel {
        SyncWarningLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    pub fn set_sync_warning_level(&self, level: SyncWarningLevel) {
        let prev = self.level.swap(level as u8, Ordering::Relaxed);
        if prev != level as u8 {
            tracing::debug!(
                "sync warning level {} -> {}",
                SyncWarningLevel::from_u8(prev),
                level
            );
        }
    }
}

impl Default for WarningState {
    fn default() -> Self {
        Self::new()
    }
}

static WARNING_STATE: WarningState = WarningState::new();

/// The process-wide warning state read by every gated synchronization call.
#[inline]
pub fn warning_state() -> &'static WarningState {
    &WARNING_STATE
}

/// Current process-wide sync warning level.
#[inline]
pub fn get_sync_warning_level() -> SyncWarningLevel {
    warning_state().get_sync_warning_level()
}

/// Replace the process-wide sync warning level.
pub fn set_sync_warning_level(level: SyncWarningLevel) {
    warning_state().set_sync_warning_level(level)
}
