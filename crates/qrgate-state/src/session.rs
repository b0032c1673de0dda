//! # Session Record
//!
//! The one mutable entity of the bridge: a time-bounded detection window
//! opened by presence and closed by expiry, cancellation, re-arm or
//! issuance completion.
//!
//! ## Invariants
//!
//! - An armed session holds exactly one live expiry timer.
//! - `issuance_triggered` goes from `false` to `true` at most once and is
//!   never reset within the same session.
//! - Only a re-arm creates a new session, and it tears the old one down
//!   first.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use qrgate_core::SessionId;

// ── Timer Scheduling ─────────────────────────────────────────────────

/// Arms and disarms session expiry timers.
///
/// The machine calls [`schedule`](Self::schedule) when a session is armed
/// and [`cancel`](Self::cancel) on every transition out of it. When a timer
/// elapses, the implementation must feed the session id back through
/// [`SessionMachine::on_timer_fired`](crate::SessionMachine::on_timer_fired).
pub trait ExpiryScheduler {
    /// Handle that can cancel one scheduled timer.
    type Handle;

    /// Start a timer that fires for `session_id` after `ttl`.
    fn schedule(&mut self, session_id: SessionId, ttl: Duration) -> Self::Handle;

    /// Cancel a timer. Cancelling one that already fired is a no-op.
    fn cancel(&mut self, handle: Self::Handle);
}

// ── Phase ────────────────────────────────────────────────────────────

/// Session phase, derived from the session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No session window is open.
    Idle,
    /// Presence seen, waiting for a thumb hold.
    Armed,
    /// A thumb hold is in progress.
    ThumbPending,
    /// Issuance has been triggered and its outcome is pending.
    Issuing,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Armed => f.write_str("armed"),
            Self::ThumbPending => f.write_str("thumb_pending"),
            Self::Issuing => f.write_str("issuing"),
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────

/// One armed detection window.
#[derive(Debug)]
pub struct Session<H> {
    /// Identifier matching timer firings and issuance outcomes to this session.
    pub id: SessionId,
    /// Whether the window is open.
    pub armed: bool,
    /// Whether presence was observed since arming.
    pub presence_confirmed: bool,
    /// Whether a completed thumb hold was observed since arming.
    pub thumb_confirmed: bool,
    /// Whether issuance was started for this session.
    pub issuance_triggered: bool,
    /// Last reported hold progress in `0..=1`.
    pub thumb_progress: Option<f64>,
    /// Session window length.
    pub ttl: Duration,
    pub(crate) timer: Option<H>,
}

impl<H> Session<H> {
    /// A freshly armed session with presence confirmed.
    pub(crate) fn arm(ttl: Duration) -> Self {
        Self {
            id: SessionId::new(),
            armed: true,
            presence_confirmed: true,
            thumb_confirmed: false,
            issuance_triggered: false,
            thumb_progress: None,
            ttl,
            timer: None,
        }
    }

    /// The phase this record is in.
    pub fn phase(&self) -> Phase {
        if !self.armed {
            Phase::Idle
        } else if self.issuance_triggered {
            Phase::Issuing
        } else if self.thumb_progress.is_some() {
            Phase::ThumbPending
        } else {
            Phase::Armed
        }
    }
}
