//! Tracking-session lifecycle.
//!
//! The host forwards platform session events here. Redundant or out-of-order
//! calls (a second `stop`, `pause` before `start`) are no-ops, never errors.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// Lifecycle state of the tracking session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum TrackingState {
    #[default]
    Stopped,
    Running,
    Paused,
    Error(String),
}

impl TrackingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Error(_) => "error",
        }
    }
}

/// Pose reliability as reported by the tracking provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum TrackingQuality {
    #[default]
    Unknown,
    NotAvailable,
    Limited,
    Normal,
}

impl TrackingQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::NotAvailable => "notAvailable",
            Self::Limited => "limited",
            Self::Normal => "normal",
        }
    }

    /// Whether poses are good enough to place content.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Limited | Self::Normal)
    }
}

/// Outcome of a lifecycle call. `from == to` means the call was a no-op.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: TrackingState,
    pub to: TrackingState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

struct SessionInner {
    state: TrackingState,
    quality: TrackingQuality,
}

/// Owns the tracking-session state machine.
///
/// State can be polled from any thread while session callbacks drive
/// transitions; every method takes `&self`.
pub struct SessionController {
    inner: Mutex<SessionInner>,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                state: TrackingState::Stopped,
                quality: TrackingQuality::Unknown,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        // Every transition writes a complete state, so a poisoned lock is still consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, next: impl FnOnce(&TrackingState) -> Option<TrackingState>) -> Transition {
        let mut inner = self.lock();
        let from = inner.state.clone();
        if let Some(to) = next(&from) {
            inner.state = to;
        }
        let t = Transition {
            from,
            to: inner.state.clone(),
        };
        if t.changed() {
            tracing::debug!("session {} -> {}", t.from.as_str(), t.to.as_str());
        }
        t
    }

    /// Any state → Running. Clears a previous error.
    pub fn start(&self) -> Transition {
        self.transition(|_| Some(TrackingState::Running))
    }

    /// Running/Paused/Error → Stopped.
    pub fn stop(&self) -> Transition {
        self.transition(|s| match s {
            TrackingState::Stopped => None,
            _ => Some(TrackingState::Stopped),
        })
    }

    /// Running → Paused.
    pub fn pause(&self) -> Transition {
        self.transition(|s| match s {
            TrackingState::Running => Some(TrackingState::Paused),
            _ => None,
        })
    }

    /// Paused → Running.
    pub fn resume(&self) -> Transition {
        self.transition(|s| match s {
            TrackingState::Paused => Some(TrackingState::Running),
            _ => None,
        })
    }

    /// Any state → Error(message). Recovery is only through `start`.
    pub fn report_error(&self, message: impl Into<String>) -> Transition {
        let message = message.into();
        tracing::warn!("tracking session error: {message}");
        self.transition(|_| Some(TrackingState::Error(message)))
    }

    pub fn update_tracking_quality(&self, quality: TrackingQuality) {
        let mut inner = self.lock();
        if inner.quality != quality {
            tracing::debug!(
                "tracking quality {} -> {}",
                inner.quality.as_str(),
                quality.as_str()
            );
            inner.quality = quality;
        }
    }

    pub fn state(&self) -> TrackingState {
        self.lock().state.clone()
    }

    pub fn tracking_quality(&self) -> TrackingQuality {
        self.lock().quality
    }

    pub fn error_message(&self) -> Option<String> {
        match &self.lock().state {
            TrackingState::Error(message) => Some(message.clone()),
            _ => None,
        }
    }

    /// Running or Paused: the session has been started and not torn down.
    pub fn is_active(&self) -> bool {
        matches!(
            self.lock().state,
            TrackingState::Running | TrackingState::Paused
        )
    }

    /// Running with a usable tracking quality.
    pub fn is_tracking(&self) -> bool {
        let inner = self.lock();
        inner.state == TrackingState::Running && inner.quality.is_usable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_initial_state() {
        let session = SessionController::new();
        assert_eq!(session.state(), TrackingState::Stopped);
        assert_eq!(session.tracking_quality(), TrackingQuality::Unknown);
        assert!(session.error_message().is_none());
        assert!(!session.is_active());
    }

    #[test]
    fn test_start_pause_resume_stop() {
        let session = SessionController::new();
        session.update_tracking_quality(TrackingQuality::Normal);

        assert!(session.start().changed());
        assert_eq!(session.state(), TrackingState::Running);
        assert!(session.pause().changed());
        assert_eq!(session.state(), TrackingState::Paused);
        assert!(session.is_active());
        assert!(session.resume().changed());
        assert_eq!(session.state(), TrackingState::Running);
        assert!(session.stop().changed());
        assert_eq!(session.state(), TrackingState::Stopped);

        assert_eq!(session.tracking_quality(), TrackingQuality::Normal);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let session = SessionController::new();
        session.start();
        session.stop();
        assert_eq!(session.state(), TrackingState::Stopped);
        let second = session.stop();
        assert!(!second.changed());
        assert_eq!(session.state(), TrackingState::Stopped);
    }

    #[test]
    fn test_stop_and_pause_before_start_are_noops() {
        let session = SessionController::new();
        assert!(!session.stop().changed());
        assert!(!session.pause().changed());
        assert!(!session.resume().changed());
        assert_eq!(session.state(), TrackingState::Stopped);
    }

    #[test]
    fn test_resume_from_running_is_noop() {
        let session = SessionController::new();
        session.start();
        let t = session.resume();
        assert!(!t.changed());
        assert_eq!(t.to, TrackingState::Running);
    }

    #[test]
    fn test_pause_from_paused_is_noop() {
        let session = SessionController::new();
        session.start();
        session.pause();
        assert!(!session.pause().changed());
        assert_eq!(session.state(), TrackingState::Paused);
    }

    #[test]
    fn test_error_then_restart_clears_message() {
        let session = SessionController::new();
        session.start();
        session.report_error("x");
        assert_eq!(session.state(), TrackingState::Error("x".into()));
        assert_eq!(session.error_message().as_deref(), Some("x"));

        session.start();
        assert_eq!(session.state(), TrackingState::Running);
        assert!(session.error_message().is_none());
    }

    #[test]
    fn test_error_can_be_stopped() {
        let session = SessionController::new();
        session.report_error("sensor lost");
        let t = session.stop();
        assert_eq!(t.from, TrackingState::Error("sensor lost".into()));
        assert_eq!(session.state(), TrackingState::Stopped);
        assert!(session.error_message().is_none());
    }

    #[test]
    fn test_pause_from_error_is_noop() {
        let session = SessionController::new();
        session.report_error("boom");
        assert!(!session.pause().changed());
        assert!(!session.resume().changed());
        assert_eq!(session.error_message().as_deref(), Some("boom"));
    }

    #[test]
    fn test_quality_accepted_in_any_state() {
        let session = SessionController::new();
        session.update_tracking_quality(TrackingQuality::Limited);
        assert_eq!(session.tracking_quality(), TrackingQuality::Limited);
        session.report_error("e");
        session.update_tracking_quality(TrackingQuality::NotAvailable);
        assert_eq!(session.tracking_quality(), TrackingQuality::NotAvailable);
    }

    #[test]
    fn test_is_tracking_needs_running_and_quality() {
        let session = SessionController::new();
        session.update_tracking_quality(TrackingQuality::Normal);
        assert!(!session.is_tracking());
        session.start();
        assert!(session.is_tracking());
        session.update_tracking_quality(TrackingQuality::NotAvailable);
        assert!(!session.is_tracking());
        session.update_tracking_quality(TrackingQuality::Limited);
        session.pause();
        assert!(!session.is_tracking());
    }

    #[test]
    fn test_state_serializes_tagged() {
        let json = serde_json::to_string(&TrackingState::Error("lost".into())).unwrap();
        assert_eq!(json, r#"{"state":"error","message":"lost"}"#);
        let json = serde_json::to_string(&TrackingState::Running).unwrap();
        assert_eq!(json, r#"{"state":"running"}"#);
    }

    #[test]
    fn test_concurrent_transitions_leave_valid_state() {
        let session = Arc::new(SessionController::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let s = Arc::clone(&session);
                thread::spawn(move || {
                    for _ in 0..200 {
                        match i % 4 {
                            0 => {
                                let _ = s.start();
                            }
                            1 => {
                                let _ = s.pause();
                            }
                            2 => {
                                let _ = s.resume();
                            }
                            _ => {
                                let _ = s.stop();
                            }
                        }
                        let _ = s.state();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        session.stop();
        assert_eq!(session.state(), TrackingState::Stopped);
    }
}
