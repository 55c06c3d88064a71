use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Process-level diagnostics, exposed by the health endpoint.
///
/// All state is explicit and owned here; nothing is stashed in ambient
/// globals.
pub struct Diagnostics {
    started_at: DateTime<Utc>,
    votes_cast: AtomicU64,
    last_email_failure: Mutex<Option<EmailFailure>>,
}

/// A record of the most recent failed email delivery.
#[derive(Debug, Clone, Serialize)]
pub struct EmailFailure {
    pub at: DateTime<Utc>,
    pub message: String,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            votes_cast: AtomicU64::new(0),
            last_email_failure: Mutex::new(None),
        }
    }

    /// Seconds since this process started serving.
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    /// Record a successfully committed vote.
    pub fn record_vote(&self) {
        self.votes_cast.fetch_add(1, Ordering::Relaxed);
    }

    /// Votes committed by this process since start.
    pub fn votes_cast(&self) -> u64 {
        self.votes_cast.load(Ordering::Relaxed)
    }

    /// Record a failed email delivery for later inspection.
    pub fn record_email_failure(&self, message: String) {
        let failure = EmailFailure {
            at: Utc::now(),
            message,
        };
        // Unwrap safe: the lock is never held across a panic.
        *self.last_email_failure.lock().unwrap() = Some(failure);
    }

    /// The most recent failed email delivery, if any.
    pub fn last_email_failure(&self) -> Option<EmailFailure> {
        self.last_email_failure.lock().unwrap().clone()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}
