#![deny(missing_docs)]

//! # qrgate-core: Foundational Types for the QR Gate Check-in Bridge
//!
//! This crate defines the types every other crate in the workspace shares.
//! It has no internal crate dependencies, only `serde`, `serde_json`,
//! `thiserror`, `chrono`, and `uuid` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** A [`SiteId`] cannot be passed
//!    where a [`DeviceId`] is expected, and every armed session carries its
//!    own [`SessionId`].
//!
//! 2. **One channel registry.** Topic strings are derived in exactly one
//!    place, [`ChannelRegistry`], from the site/device pair.
//!
//! 3. **Tagged payload parsing.** Sensor payloads never propagate missing
//!    fields implicitly. [`Parsed`] distinguishes a well-formed payload from
//!    one that was defaulted because it was malformed.
//!
//! 4. **Typed outbound messages.** Every message the bridge publishes is an
//!    [`Outbound`] value bound to its channel.

pub mod channel;
pub mod credential;
pub mod error;
pub mod identity;
pub mod message;
pub mod payload;
pub mod temporal;

// Re-export primary types at crate root for ergonomic imports.
pub use channel::{Channel, ChannelRegistry};
pub use credential::{Credential, IssuanceContext};
pub use error::ValidationError;
pub use identity::{DeviceId, SessionId, SiteId};
pub use message::{
    ArmedPayload, CancelPayload, Outbound, SessionStatusPayload, StatusKind,
};
pub use payload::{Parsed, PresencePayload, ThumbPayload};
pub use temporal::Timestamp;
