//! Precondition violations reported by the session machine.
//!
//! A [`Rejection`] is not a failure of the bridge: the event was valid
//! input that arrived at the wrong time. The caller logs it and publishes
//! nothing.

use qrgate_core::SessionId;
use thiserror::Error;

/// Why an event was ignored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A hold-complete arrived with no armed session.
    #[error("thumb hold completed while no session is armed")]
    NotArmed,

    /// The session was armed but presence was never confirmed.
    #[error("thumb hold completed before presence was confirmed in session {session_id}")]
    PresenceNotConfirmed {
        /// The current session.
        session_id: SessionId,
    },

    /// Issuance was already triggered for this session.
    #[error("issuance already triggered for session {session_id}")]
    AlreadyIssuing {
        /// The current session.
        session_id: SessionId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_session() {
        let id = SessionId::new();
        let msg = Rejection::AlreadyIssuing { session_id: id }.to_string();
        assert!(msg.contains(&id.to_string()));
        assert_eq!(
            Rejection::NotArmed.to_string(),
            "thumb hold completed while no session is armed"
        );
    }
}
