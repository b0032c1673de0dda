//! # Session Machine
//!
//! Applies sensor events, timer firings and issuance outcomes to the
//! current [`Session`]. Each call returns a [`Transition`] describing what
//! the caller must do: messages to publish in order, and at most one
//! issuance call to start.
//!
//! The machine must be driven from a single task. The bridge actor does
//! this by funnelling every event through one mailbox, so a timer firing
//! can never interleave with a thumb event mid-transition.
//!
//! ## Issuance
//!
//! A completed thumb hold is accepted only while the session is armed,
//! presence is confirmed and issuance has not yet been triggered. The
//! acceptance sets `issuance_triggered` and returns the
//! [`IssuanceTicket`] in the same call, so a duplicate hold-complete
//! delivered while the backend call is in flight is rejected.

use std::time::Duration;

use qrgate_core::{
    ArmedPayload, CancelPayload, Credential, DeviceId, IssuanceContext, Outbound,
    PresencePayload, SessionId, SessionStatusPayload, SiteId, StatusKind, ThumbPayload,
};

use crate::error::Rejection;
use crate::session::{ExpiryScheduler, Phase, Session};

/// Teardown reason when presence is lost.
pub const REASON_NO_PRESENCE: &str = "no_presence";
/// Teardown reason when the session window elapses.
pub const REASON_TTL_EXPIRED: &str = "ttl_expired";

/// Everything the caller must do after one event.
#[derive(Debug, Default)]
pub struct Transition {
    /// Messages to publish, in order.
    pub outbound: Vec<Outbound>,
    /// Issuance call to start, if the event triggered one.
    pub issuance: Option<IssuanceTicket>,
    /// Why the event was ignored, if it was.
    pub rejected: Option<Rejection>,
}

impl Transition {
    fn rejected(rejection: Rejection) -> Self {
        Self {
            rejected: Some(rejection),
            ..Self::default()
        }
    }

    /// Whether the event changed nothing observable.
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.issuance.is_none()
    }
}

/// Permission to make exactly one issuance call for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuanceTicket {
    /// The session the credential is for.
    pub session_id: SessionId,
    /// Request context for the issuance backend.
    pub context: IssuanceContext,
}

/// The session state machine of one bridge instance.
pub struct SessionMachine<S: ExpiryScheduler> {
    site: SiteId,
    device: DeviceId,
    ttl: Duration,
    scheduler: S,
    session: Option<Session<S::Handle>>,
}

impl<S: ExpiryScheduler> SessionMachine<S> {
    /// An idle machine for one site/device pair.
    pub fn new(site: SiteId, device: DeviceId, ttl: Duration, scheduler: S) -> Self {
        Self {
            site,
            device,
            ttl,
            scheduler,
            session: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.session.as_ref().map_or(Phase::Idle, Session::phase)
    }

    /// The current session, if one is open.
    pub fn session(&self) -> Option<&Session<S::Handle>> {
        self.session.as_ref()
    }

    /// Session window length used when arming.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The timer scheduler.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Apply a presence reading.
    ///
    /// Presence re-arms from any phase, discarding prior progress. Loss of
    /// presence always publishes a `no_presence` cancel, armed or not.
    pub fn on_presence(&mut self, payload: &PresencePayload) -> Transition {
        if payload.present {
            self.arm()
        } else {
            self.cancel(REASON_NO_PRESENCE, false)
        }
    }

    /// Apply a thumb reading.
    pub fn on_thumb(&mut self, payload: &ThumbPayload) -> Transition {
        if payload.hold_complete {
            self.accept_hold()
        } else {
            self.record_progress(payload);
            Transition::default()
        }
    }

    /// Apply an expiry timer firing.
    ///
    /// Firings for a superseded session, or for one already issuing, are
    /// ignored.
    pub fn on_timer_fired(&mut self, session_id: SessionId) -> Transition {
        let current = match &self.session {
            Some(s) if s.id == session_id && s.armed && !s.issuance_triggered => s.id,
            Some(s) => {
                tracing::debug!(
                    %session_id,
                    current = %s.id,
                    phase = %s.phase(),
                    "ignoring expiry timer"
                );
                return Transition::default();
            }
            None => {
                tracing::debug!(%session_id, "ignoring expiry timer, no session");
                return Transition::default();
            }
        };
        tracing::info!(session_id = %current, "session expired");
        self.cancel(REASON_TTL_EXPIRED, false)
    }

    /// Apply the outcome of an issuance call.
    ///
    /// The outcome messages are always published, since the credential
    /// exists (or the failure happened) regardless of what the session did
    /// meanwhile. The session is torn down only if it is still the one the
    /// call was made for.
    pub fn on_issuance_complete(
        &mut self,
        session_id: SessionId,
        result: Result<Credential, String>,
    ) -> Transition {
        let mut outbound = Vec::with_capacity(2);
        match result {
            Ok(credential) => {
                tracing::info!(%session_id, qr_id = ?credential.id, "credential issued");
                outbound.push(Outbound::Cancel(CancelPayload::Outcome {
                    success: true,
                    qr_id: credential.id,
                    error: None,
                }));
                outbound.push(Outbound::Status(
                    SessionStatusPayload::new(StatusKind::QrGenerated)
                        .with_qr_data(credential.data),
                ));
            }
            Err(error) => {
                tracing::warn!(%session_id, %error, "credential issuance failed");
                outbound.push(Outbound::Cancel(CancelPayload::Outcome {
                    success: false,
                    qr_id: None,
                    error: Some(error),
                }));
            }
        }

        if self.session.as_ref().is_some_and(|s| s.id == session_id) {
            self.teardown();
        } else {
            tracing::info!(%session_id, "issuance completed for a superseded session");
        }

        Transition {
            outbound,
            ..Transition::default()
        }
    }

    /// Tear down the current session.
    ///
    /// Unless `silent`, publishes `cancel {reason}` and an idle status,
    /// whether or not a session was open.
    pub fn cancel(&mut self, reason: &str, silent: bool) -> Transition {
        if let Some(id) = self.teardown() {
            tracing::info!(session_id = %id, reason, "session cancelled");
        } else {
            tracing::debug!(reason, "cancel with no session armed");
        }
        if silent {
            return Transition::default();
        }
        Transition {
            outbound: vec![
                Outbound::Cancel(CancelPayload::Reason {
                    reason: reason.to_string(),
                }),
                Outbound::Status(SessionStatusPayload::new(StatusKind::Idle).with_reason(reason)),
            ],
            ..Transition::default()
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn arm(&mut self) -> Transition {
        if let Some(previous) = self.teardown() {
            tracing::info!(session_id = %previous, "re-arm discards previous session");
        }

        let mut session = Session::arm(self.ttl);
        session.timer = Some(self.scheduler.schedule(session.id, self.ttl));
        let ttl_ms = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        tracing::info!(session_id = %session.id, ttl_ms, "session armed");
        self.session = Some(session);

        Transition {
            outbound: vec![
                Outbound::Armed(ArmedPayload { ttl: ttl_ms }),
                Outbound::Status(SessionStatusPayload::new(StatusKind::Armed).with_ttl(ttl_ms)),
                Outbound::Status(SessionStatusPayload::new(StatusKind::SensorDetected)),
            ],
            ..Transition::default()
        }
    }

    fn accept_hold(&mut self) -> Transition {
        let session = match self.session.as_mut() {
            Some(s) if s.armed => s,
            _ => {
                let rejection = Rejection::NotArmed;
                tracing::info!(%rejection, "thumb hold ignored");
                return Transition::rejected(rejection);
            }
        };
        if !session.presence_confirmed {
            let rejection = Rejection::PresenceNotConfirmed {
                session_id: session.id,
            };
            tracing::info!(%rejection, "thumb hold ignored");
            return Transition::rejected(rejection);
        }
        if session.issuance_triggered {
            let rejection = Rejection::AlreadyIssuing {
                session_id: session.id,
            };
            tracing::info!(%rejection, "thumb hold ignored");
            return Transition::rejected(rejection);
        }

        session.thumb_confirmed = true;
        session.issuance_triggered = true;
        tracing::info!(session_id = %session.id, "thumb hold accepted, issuing credential");

        let context =
            IssuanceContext::for_session(self.site.clone(), self.device.clone(), session.id);
        Transition {
            outbound: vec![Outbound::Status(SessionStatusPayload::new(
                StatusKind::ThumbDetected,
            ))],
            issuance: Some(IssuanceTicket {
                session_id: session.id,
                context,
            }),
            rejected: None,
        }
    }

    fn record_progress(&mut self, payload: &ThumbPayload) {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.armed && !s.issuance_triggered)
        else {
            tracing::debug!(thumb = payload.thumb, progress = ?payload.progress, "thumb progress with no open session");
            return;
        };
        if payload.thumb {
            if payload.progress.is_some() {
                session.thumb_progress = payload.progress;
            }
        } else {
            session.thumb_confirmed = false;
            session.thumb_progress = None;
        }
        tracing::debug!(
            session_id = %session.id,
            thumb = payload.thumb,
            progress = ?session.thumb_progress,
            "thumb progress"
        );
    }

    /// Discard the current session and cancel its timer.
    fn teardown(&mut self) -> Option<SessionId> {
        let mut session = self.session.take()?;
        if let Some(handle) = session.timer.take() {
            self.scheduler.cancel(handle);
        }
        Some(session.id)
    }
}

impl<S: ExpiryScheduler> std::fmt::Debug for SessionMachine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMachine")
            .field("site", &self.site)
            .field("device", &self.device)
            .field("ttl", &self.ttl)
            .field("phase", &self.phase())
            .field("session_id", &self.session.as_ref().map(|s| s.id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Records every schedule and cancel call.
    #[derive(Debug, Default)]
    struct FakeScheduler {
        next: u64,
        scheduled: Vec<(u64, SessionId, Duration)>,
        cancelled: Vec<u64>,
    }

    impl FakeScheduler {
        fn live(&self) -> usize {
            self.scheduled
                .iter()
                .filter(|(h, _, _)| !self.cancelled.contains(h))
                .count()
        }
    }

    impl ExpiryScheduler for FakeScheduler {
        type Handle = u64;

        fn schedule(&mut self, session_id: SessionId, ttl: Duration) -> u64 {
            self.next += 1;
            self.scheduled.push((self.next, session_id, ttl));
            self.next
        }

        fn cancel(&mut self, handle: u64) {
            self.cancelled.push(handle);
        }
    }

    fn machine() -> SessionMachine<FakeScheduler> {
        SessionMachine::new(
            SiteId::new("gateA").unwrap(),
            DeviceId::new("esp32-01").unwrap(),
            Duration::from_millis(6000),
            FakeScheduler::default(),
        )
    }

    fn present() -> PresencePayload {
        PresencePayload::default()
    }

    fn absent() -> PresencePayload {
        PresencePayload {
            present: false,
            ..PresencePayload::default()
        }
    }

    fn hold_complete() -> ThumbPayload {
        ThumbPayload {
            thumb: true,
            hold_complete: true,
            progress: Some(1.0),
        }
    }

    fn progress(p: f64) -> ThumbPayload {
        ThumbPayload {
            thumb: true,
            hold_complete: false,
            progress: Some(p),
        }
    }

    fn statuses(t: &Transition) -> Vec<StatusKind> {
        t.outbound.iter().filter_map(Outbound::status).collect()
    }

    fn current_id(m: &SessionMachine<FakeScheduler>) -> SessionId {
        m.session().map(|s| s.id).unwrap()
    }

    // ── Scenarios ────────────────────────────────────────────────────

    #[test]
    fn presence_arms_session_with_timer() {
        let mut m = machine();
        let t = m.on_presence(&present());

        assert_eq!(t.outbound[0], Outbound::Armed(ArmedPayload { ttl: 6000 }));
        assert_eq!(t.outbound[1].to_json()["status"], "armed");
        assert_eq!(t.outbound[1].to_json()["ttl"], 6000);
        assert_eq!(
            statuses(&t),
            vec![StatusKind::Armed, StatusKind::SensorDetected]
        );
        assert!(t.issuance.is_none());
        assert_eq!(m.phase(), Phase::Armed);
        assert_eq!(m.scheduler().live(), 1);
        let (_, sid, ttl) = m.scheduler().scheduled[0];
        assert_eq!(sid, current_id(&m));
        assert_eq!(ttl, Duration::from_millis(6000));
    }

    #[test]
    fn progress_changes_nothing_observable() {
        let mut m = machine();
        m.on_presence(&present());
        let t = m.on_thumb(&progress(0.4));

        assert!(t.is_empty());
        assert!(t.rejected.is_none());
        assert_eq!(m.phase(), Phase::ThumbPending);
        assert_eq!(m.session().unwrap().thumb_progress, Some(0.4));
    }

    #[test]
    fn hold_complete_issues_once_then_resets() {
        let mut m = machine();
        m.on_presence(&present());
        let sid = current_id(&m);

        let t = m.on_thumb(&hold_complete());
        assert_eq!(statuses(&t), vec![StatusKind::ThumbDetected]);
        let ticket = t.issuance.unwrap();
        assert_eq!(ticket.session_id, sid);
        assert_eq!(ticket.context.trigger, "sensor_and_thumb");
        assert_eq!(ticket.context.via, "mqtt-bridge");
        assert_eq!(ticket.context.site.as_str(), "gateA");
        assert_eq!(m.phase(), Phase::Issuing);
        assert!(m.session().unwrap().thumb_confirmed);

        let credential = Credential::from_qr_object(json!({"id": "X", "uuid": "U"}));
        let t = m.on_issuance_complete(sid, Ok(credential));
        assert_eq!(t.outbound.len(), 2);
        assert_eq!(
            t.outbound[0].to_json(),
            json!({"success": true, "qr_id": "X"})
        );
        let status = t.outbound[1].to_json();
        assert_eq!(status["status"], "qr_generated");
        assert_eq!(status["qr_data"]["uuid"], "U");

        assert_eq!(m.phase(), Phase::Idle);
        assert_eq!(m.scheduler().live(), 0);
    }

    #[test]
    fn issuance_failure_reports_error_without_qr() {
        let mut m = machine();
        m.on_presence(&present());
        let sid = m.on_thumb(&hold_complete()).issuance.unwrap().session_id;

        let t = m.on_issuance_complete(sid, Err("network down".into()));
        assert_eq!(t.outbound.len(), 1);
        assert_eq!(
            t.outbound[0].to_json(),
            json!({"success": false, "error": "network down"})
        );
        assert!(statuses(&t).is_empty());
        assert_eq!(m.phase(), Phase::Idle);
        assert_eq!(m.scheduler().live(), 0);
    }

    #[test]
    fn hold_complete_while_idle_is_rejected_silently() {
        let mut m = machine();
        let t = m.on_thumb(&hold_complete());
        assert!(t.is_empty());
        assert_eq!(t.rejected, Some(Rejection::NotArmed));
        assert_eq!(m.phase(), Phase::Idle);
    }

    // ── Properties ───────────────────────────────────────────────────

    #[test]
    fn latest_presence_wins_and_cancels_previous_timer() {
        let mut m = machine();
        m.on_presence(&present());
        let first = current_id(&m);
        m.on_thumb(&progress(0.7));

        m.on_presence(&present());
        let second = current_id(&m);

        assert_ne!(first, second);
        assert_eq!(m.phase(), Phase::Armed);
        assert_eq!(m.session().unwrap().thumb_progress, None);
        assert_eq!(m.scheduler().cancelled, vec![1]);
        assert_eq!(m.scheduler().live(), 1);
    }

    #[test]
    fn duplicate_hold_complete_issues_at_most_once() {
        let mut m = machine();
        m.on_presence(&present());
        let sid = current_id(&m);

        assert!(m.on_thumb(&hold_complete()).issuance.is_some());
        let again = m.on_thumb(&hold_complete());
        assert!(again.is_empty());
        assert_eq!(
            again.rejected,
            Some(Rejection::AlreadyIssuing { session_id: sid })
        );
    }

    #[test]
    fn ttl_expiry_publishes_idle_and_never_issues() {
        let mut m = machine();
        m.on_presence(&present());
        let sid = current_id(&m);

        let t = m.on_timer_fired(sid);
        assert_eq!(
            t.outbound[0].to_json(),
            json!({"reason": "ttl_expired"})
        );
        let idle = t.outbound[1].to_json();
        assert_eq!(idle["status"], "idle");
        assert_eq!(idle["reason"], "ttl_expired");
        assert!(t.issuance.is_none());
        assert_eq!(m.phase(), Phase::Idle);

        assert_eq!(m.on_thumb(&hold_complete()).rejected, Some(Rejection::NotArmed));
    }

    #[test]
    fn stale_timer_is_ignored() {
        let mut m = machine();
        m.on_presence(&present());
        let old = current_id(&m);
        m.on_presence(&present());

        let t = m.on_timer_fired(old);
        assert!(t.is_empty());
        assert_eq!(m.phase(), Phase::Armed);
    }

    #[test]
    fn timer_while_issuing_is_ignored() {
        let mut m = machine();
        m.on_presence(&present());
        let sid = current_id(&m);
        m.on_thumb(&hold_complete());

        assert!(m.on_timer_fired(sid).is_empty());
        assert_eq!(m.phase(), Phase::Issuing);
    }

    #[test]
    fn presence_lost_cancels_and_blocks_hold() {
        let mut m = machine();
        m.on_presence(&present());

        let t = m.on_presence(&absent());
        assert_eq!(t.outbound[0].to_json(), json!({"reason": "no_presence"}));
        assert_eq!(t.outbound[1].to_json()["reason"], "no_presence");
        assert_eq!(m.scheduler().live(), 0);

        let t = m.on_thumb(&hold_complete());
        assert!(t.issuance.is_none());
        assert_eq!(t.rejected, Some(Rejection::NotArmed));
    }

    #[test]
    fn presence_lost_while_idle_still_publishes_cancel() {
        let mut m = machine();
        let t = m.on_presence(&absent());
        assert_eq!(t.outbound.len(), 2);
        assert_eq!(statuses(&t), vec![StatusKind::Idle]);
    }

    #[test]
    fn silent_cancel_publishes_nothing() {
        let mut m = machine();
        m.on_presence(&present());
        let t = m.cancel("shutdown", true);
        assert!(t.is_empty());
        assert_eq!(m.phase(), Phase::Idle);
        assert_eq!(m.scheduler().live(), 0);
    }

    #[test]
    fn superseded_issuance_reports_but_keeps_new_session() {
        let mut m = machine();
        m.on_presence(&present());
        let old = m.on_thumb(&hold_complete()).issuance.unwrap().session_id;

        m.on_presence(&present());
        let new = current_id(&m);

        let t = m.on_issuance_complete(old, Ok(Credential::from_qr_object(json!({"id": 5}))));
        assert_eq!(t.outbound[0].to_json(), json!({"success": true, "qr_id": "5"}));
        assert_eq!(current_id(&m), new);
        assert_eq!(m.phase(), Phase::Armed);
        assert_eq!(m.scheduler().live(), 1);
    }

    #[test]
    fn release_clears_progress() {
        let mut m = machine();
        m.on_presence(&present());
        m.on_thumb(&progress(0.5));
        m.on_thumb(&ThumbPayload::default());
        assert_eq!(m.phase(), Phase::Armed);
        assert!(!m.session().unwrap().thumb_confirmed);
    }

    #[test]
    fn progress_without_session_is_ignored() {
        let mut m = machine();
        assert!(m.on_thumb(&progress(0.3)).is_empty());
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn exactly_one_live_timer_while_armed() {
        let mut m = machine();
        for _ in 0..5 {
            m.on_presence(&present());
            assert_eq!(m.scheduler().live(), 1);
        }
        m.cancel("manual", false);
        assert_eq!(m.scheduler().live(), 0);
    }
}
