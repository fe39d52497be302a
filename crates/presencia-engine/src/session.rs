//! Per-session attendance deduplication.
//!
//! For each identity the session tracks one of: not seen, seen and waiting
//! out the dedup window, or registered. The transition into `Registered` is
//! reported exactly once per identity per session, even when frames for the
//! same identity race each other.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Time source for the dedup state machine. Injected so tests can drive the
/// window deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock production implementation.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy)]
enum SeenState {
    Pending { since: Instant },
    Registered,
}

/// Outcome of one observation of a recognized identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First sighting this session; the dedup window starts now.
    FirstSeen,
    /// Sighted again, but the window has not elapsed yet.
    Pending,
    /// The window elapsed with this observation — register attendance.
    /// Returned exactly once per identity per session.
    Register,
    /// Attendance was already registered this session.
    AlreadyRegistered,
}

/// Per-session dedup bookkeeping. `observe` and `reset` are the only
/// mutators.
pub struct SessionState {
    window: Duration,
    entries: Mutex<HashMap<String, SeenState>>,
}

impl SessionState {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Advance the state machine for `identity` at time `now`.
    pub fn observe(&self, identity: &str, now: Instant) -> Observation {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        match entries.get(identity).copied() {
            None => {
                entries.insert(identity.to_string(), SeenState::Pending { since: now });
                Observation::FirstSeen
            }
            Some(SeenState::Pending { since })
                if now.saturating_duration_since(since) >= self.window =>
            {
                entries.insert(identity.to_string(), SeenState::Registered);
                Observation::Register
            }
            Some(SeenState::Pending { .. }) => Observation::Pending,
            Some(SeenState::Registered) => Observation::AlreadyRegistered,
        }
    }

    /// Clear all entries back to not-seen. Starts a fresh attendance window
    /// (a new class session).
    pub fn reset(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::info!("session state reset");
    }
}
