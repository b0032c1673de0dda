#![deny(missing_docs)]

//! # qrgate-state: Check-in Session State Machine
//!
//! Owns the single [`Session`] record of a bridge instance and applies
//! every event to it through explicit transition functions. The machine is
//! sans-I/O: it returns the messages to publish and an optional
//! [`IssuanceTicket`] instead of performing either, and it arms expiry
//! timers through the [`ExpiryScheduler`] trait.
//!
//! ## Phases
//!
//! ```text
//! Idle ─presence──▶ Armed ─progress──▶ ThumbPending
//!                     │                     │
//!                     └──hold_complete──────┤
//!                                           ▼
//!                                        Issuing ─outcome──▶ Idle
//!
//! Armed | ThumbPending ─cancel / ttl──▶ Idle
//! ```
//!
//! The phase is derived from the session record, never stored.

pub mod error;
pub mod machine;
pub mod session;

pub use error::Rejection;
pub use machine::{IssuanceTicket, SessionMachine, Transition};
pub use session::{ExpiryScheduler, Phase, Session};
