//! Reconnect policy and backoff bookkeeping.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Delay before the first reconnect attempt.
const BASE_DELAY_MS: u64 = 5_000;
/// Ceiling applied to the exponential backoff.
const MAX_DELAY_MS: u64 = 60_000;

/// Controls whether and how often a dropped connection is
/// re-established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Automatically reconnect after a non-user-initiated disconnect.
    pub enabled: bool,
    /// Attempt ceiling; `0` means unlimited.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Policy with automatic reconnection turned off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            max_attempts: 0,
        }
    }

    /// Whether attempt number `attempts` (zero-based count of attempts
    /// already made) may be scheduled. The `0 = unlimited` sentinel is
    /// interpreted here and nowhere else.
    pub fn attempt_allowed(&self, attempts: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempts < self.max_attempts)
    }
}

/// Delay before reconnect attempt number `attempt` (zero-based):
/// 5s, 10s, 20s, 40s, then capped at 60s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let ms = BASE_DELAY_MS
        .checked_shl(attempt)
        .unwrap_or(u64::MAX)
        .min(MAX_DELAY_MS);
    Duration::from_millis(ms)
}

/// Mutable reconnect bookkeeping, guarded by one mutex in the engine.
#[derive(Debug, Default)]
pub(crate) struct ReconnectState {
    /// Attempts made since the last successful registration.
    pub attempts: u32,
    /// Set by an explicit `disconnect`; blocks automatic reconnects.
    pub user_initiated: bool,
    /// Bumped by every connect/disconnect; an armed timer from an
    /// earlier epoch must not fire.
    pub epoch: u64,
    /// The armed one-shot timer, if any.
    pub timer: Option<JoinHandle<()>>,
}

impl ReconnectState {
    pub fn cancel_timer(&mut self) {
        self.epoch += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
