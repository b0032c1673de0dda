//! # Error Types
//!
//! Validation errors for the domain primitives defined in this crate,
//! built with `thiserror`. Each variant carries the rejected input so that
//! a misconfigured site or device can be diagnosed from the log line alone.

use thiserror::Error;

/// Validation errors for identifier newtypes and topic lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Site identifier is empty or contains topic-reserved characters.
    #[error("invalid site ID: \"{0}\" (expected non-empty, no '/', '+' or '#')")]
    InvalidSiteId(String),

    /// Device identifier is empty or contains topic-reserved characters.
    #[error("invalid device ID: \"{0}\" (expected non-empty, no '/', '+' or '#')")]
    InvalidDeviceId(String),

    /// A topic string does not belong to this site/device.
    #[error("unknown topic: \"{0}\"")]
    UnknownTopic(String),
}
