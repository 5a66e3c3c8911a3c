//! Whether a job is running.
//!
//! The wire protocol has no "job started" or "job ended" message,
//! so job boundaries are guessed:
//!
//! - A job starts when, while idle, the client sends a line beginning with
//!   one of [`JOB_PREFIXES`] (settings, G-code or M-code).
//! - A job ends when the client disconnects.
//!
//! A client sending `$$` to read settings therefore "starts a job" too.
//! That is a known limitation of guessing from traffic.

use tracing::info;

use crate::{
    air::{AirAssist, Reason},
    state::StateStore,
};

/// First characters of lines which start a job.
pub const JOB_PREFIXES: [char; 3] = ['$', 'G', 'M'];

/// True if `line` (already trimmed) would start a job.
pub fn starts_job(line: &str) -> bool {
    line.chars()
        .next()
        .map_or(false, |first| JOB_PREFIXES.contains(&first))
}

/// The two states of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No job running.
    Idle,

    /// A job is being streamed.
    Streaming,
}

/// Drives [`StreamState`] transitions, keeping the state store up to date.
#[derive(Debug, Clone)]
pub struct StreamTracker {
    store: StateStore,
    air: AirAssist,
}

impl StreamTracker {
    /// Track jobs, closing `air` at their boundaries.
    pub fn new(store: StateStore, air: AirAssist) -> Self {
        Self { store, air }
    }

    /// The current state.
    pub async fn state(&self) -> StreamState {
        if self.store.snapshot().await.streaming {
            StreamState::Streaming
        } else {
            StreamState::Idle
        }
    }

    /// Look at a line from the client before it is forwarded.
    ///
    /// Returns true if it started a job.
    pub async fn observe_client_line(&self, line: &str) -> bool {
        if starts_job(line) && self.state().await == StreamState::Idle {
            self.start().await;
            true
        } else {
            false
        }
    }

    /// Idle to streaming. A new job starts with the air off.
    pub async fn start(&self) {
        self.store.update(|state| state.streaming = true).await;
        info!("STREAM START");

        if !self.air.is_forced() {
            self.air.set(false, Reason::StreamStart).await;
        }
    }

    /// Back to idle. Runs in full even if already idle.
    pub async fn end(&self) {
        self.store.update(|state| state.streaming = false).await;
        info!("STREAM END");

        if !self.air.is_forced() {
            self.air.set(false, Reason::StreamEnd).await;
        }
    }
}
