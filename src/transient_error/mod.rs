//! TransientError - Self-expiring user-visible error
//!
//! One slot, shared by the session and the orchestrator. A raised error
//! replaces the previous one and expires 5 seconds after it was raised.
//! Reads never return an expired entry; `check_expiration` drops it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Lifetime of a surfaced error
pub const ERROR_TTL: Duration = Duration::from_secs(5);

/// A surfaced error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientError {
    pub message: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

struct Entry {
    error: TransientError,
    expires_at: Instant,
}

/// Holder for at most one live error
pub struct TransientErrorSlot {
    entry: Mutex<Option<Entry>>,
    ttl: Duration,
}

impl TransientErrorSlot {
    pub fn new() -> Self {
        Self::with_ttl(ERROR_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entry: Mutex::new(None),
            ttl,
        }
    }

    fn entry(&self) -> MutexGuard<'_, Option<Entry>> {
        self.entry.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Surface an error, replacing any current one
    pub fn raise(&self, code: &str, message: impl Into<String>) -> TransientError {
        let error = TransientError {
            message: message.into(),
            code: code.to_string(),
            created_at: Utc::now(),
        };

        tracing::warn!(code = %error.code, message = %error.message, "Error surfaced");

        *self.entry() = Some(Entry {
            error: error.clone(),
            expires_at: Instant::now() + self.ttl,
        });
        error
    }

    /// Surface a crate error
    pub fn raise_error(&self, err: &crate::error::Error) -> TransientError {
        self.raise(err.category(), err.user_message())
    }

    /// Clear the current error. Returns true if one was live.
    pub fn clear(&self) -> bool {
        let mut entry = self.entry();
        let live = entry
            .as_ref()
            .map(|e| Instant::now() < e.expires_at)
            .unwrap_or(false);
        *entry = None;
        live
    }

    /// Current live error
    pub fn current(&self) -> Option<TransientError> {
        self.entry()
            .as_ref()
            .filter(|e| Instant::now() < e.expires_at)
            .map(|e| e.error.clone())
    }

    /// Drop the entry if it has expired. Returns true if one was dropped.
    pub fn check_expiration(&self) -> bool {
        let mut entry = self.entry();
        match entry.as_ref() {
            Some(e) if Instant::now() >= e.expires_at => {
                tracing::debug!(code = %e.error.code, "Error expired");
                *entry = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for TransientErrorSlot {
    fn default() -> Self {
        Self::new()
    }
}
