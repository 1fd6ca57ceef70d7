use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::types::{Principal, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectReason {
    SessionExpired,
}

impl RedirectReason {
    pub fn notice(&self) -> &'static str {
        match self {
            RedirectReason::SessionExpired => "Your session has expired. Please sign in again.",
        }
    }
}

/// Why the last forced logout happened, kept until the entry screen reads it
#[derive(Debug, Clone, Default)]
pub struct RedirectSignal {
    inner: Arc<Mutex<Option<RedirectReason>>>,
}

impl RedirectSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self, reason: RedirectReason) {
        *self.inner.lock() = Some(reason);
    }

    pub fn peek(&self) -> Option<RedirectReason> {
        *self.inner.lock()
    }

    pub fn take(&self) -> Option<RedirectReason> {
        self.inner.lock().take()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Session still resolving; render nothing yet
    Hold,
    Render(Principal),
    Redirect {
        to: String,
        reason: Option<RedirectReason>,
    },
}

/// Decides what a protected route renders from the current session state
pub struct RouteGate {
    state: watch::Receiver<SessionState>,
    entry_path: String,
    signal: RedirectSignal,
}

impl RouteGate {
    pub fn new(state: watch::Receiver<SessionState>, entry_path: impl Into<String>, signal: RedirectSignal) -> Self {
        Self {
            state,
            entry_path: entry_path.into(),
            signal,
        }
    }

    pub fn decide(&self) -> GateDecision {
        match &*self.state.borrow() {
            SessionState::Resolving => GateDecision::Hold,
            SessionState::Authenticated(session) => GateDecision::Render(session.principal.clone()),
            SessionState::Unauthenticated => GateDecision::Redirect {
                to: self.entry_path.clone(),
                reason: self.signal.peek(),
            },
        }
    }

    /// Wait until the session is resolved, then decide
    pub async fn resolved(&mut self) -> GateDecision {
        // A closed channel leaves the last state in place; decide on it
        let _ = self.state.wait_for(|state| !state.is_resolving()).await;
        self.decide()
    }

    /// Wait for the next state change and decide again
    pub async fn next(&mut self) -> Option<GateDecision> {
        self.state.changed().await.ok()?;
        Some(self.decide())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CredentialBundle, Session};

    fn authenticated() -> SessionState {
        SessionState::Authenticated(Session {
            principal: Principal::new("E100", "Ana", "QA Clerk"),
            credentials: CredentialBundle::new("access", None),
        })
    }

    #[test]
    fn decision_follows_state() {
        let (tx, rx) = watch::channel(SessionState::Resolving);
        let gate = RouteGate::new(rx, "/", RedirectSignal::new());
        assert_eq!(gate.decide(), GateDecision::Hold);

        tx.send_replace(authenticated());
        assert!(matches!(gate.decide(), GateDecision::Render(p) if p.id == "E100"));

        tx.send_replace(SessionState::Unauthenticated);
        assert_eq!(
            gate.decide(),
            GateDecision::Redirect {
                to: "/".to_string(),
                reason: None
            }
        );
    }

    #[test]
    fn redirect_carries_expiry_reason_until_taken() {
        let (_tx, rx) = watch::channel(SessionState::Unauthenticated);
        let signal = RedirectSignal::new();
        let gate = RouteGate::new(rx, "/login", signal.clone());

        signal.raise(RedirectReason::SessionExpired);
        assert_eq!(
            gate.decide(),
            GateDecision::Redirect {
                to: "/login".to_string(),
                reason: Some(RedirectReason::SessionExpired)
            }
        );

        assert_eq!(signal.take(), Some(RedirectReason::SessionExpired));
        assert!(matches!(gate.decide(), GateDecision::Redirect { reason: None, .. }));
    }

    #[tokio::test]
    async fn resolved_waits_past_resolving() {
        let (tx, rx) = watch::channel(SessionState::Resolving);
        let mut gate = RouteGate::new(rx, "/", RedirectSignal::new());

        let waiter = tokio::spawn(async move { gate.resolved().await });
        tokio::task::yield_now().await;
        tx.send_replace(authenticated());

        assert!(matches!(waiter.await.unwrap(), GateDecision::Render(_)));
    }

    #[tokio::test]
    async fn next_reports_each_change_until_the_store_is_gone() {
        let (tx, rx) = watch::channel(SessionState::Unauthenticated);
        let mut gate = RouteGate::new(rx, "/", RedirectSignal::new());

        tx.send_replace(authenticated());
        assert!(matches!(gate.next().await, Some(GateDecision::Render(_))));

        drop(tx);
        assert_eq!(gate.next().await, None);
    }
}
