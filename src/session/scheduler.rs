use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::gate::{RedirectReason, RedirectSignal};
use super::store::SessionStore;
use crate::auth;
use crate::collab::{CollabError, Issuer};
use crate::config::SessionConfig;
use crate::error::SessionError;

const MIN_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Nothing to refresh: logged out or no refresh token stored
    Skipped,
    Refreshed,
    /// The session changed while the exchange was in flight; result dropped
    Discarded,
    /// Transient failure; the session is kept and retried later
    Deferred(String),
}

type Flight = Shared<BoxFuture<'static, Result<RefreshOutcome, SessionError>>>;

/// Keeps the access token fresh for one context.
///
/// At most one exchange is in flight at a time; concurrent callers await the
/// same result. The periodic ticker is bound to the generation it was started
/// under and stops as soon as that generation ends.
pub struct RefreshScheduler {
    store: Arc<SessionStore>,
    issuer: Arc<dyn Issuer>,
    signal: RedirectSignal,
    config: SessionConfig,
    in_flight: Mutex<Option<(u64, Flight)>>,
    next_flight: AtomicU64,
    ticker: Mutex<Option<(u64, JoinHandle<()>)>>,
}

impl RefreshScheduler {
    pub fn new(store: Arc<SessionStore>, issuer: Arc<dyn Issuer>, signal: RedirectSignal, config: SessionConfig) -> Self {
        Self {
            store,
            issuer,
            signal,
            config,
            in_flight: Mutex::new(None),
            next_flight: AtomicU64::new(0),
            ticker: Mutex::new(None),
        }
    }

    /// Refresh now, joining an exchange that is already running
    pub async fn refresh(&self) -> Result<RefreshOutcome, SessionError> {
        let (id, flight) = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some((id, flight)) => {
                    debug!("Joining in-flight token refresh");
                    (*id, flight.clone())
                }
                None => {
                    let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
                    let flight = exchange(
                        Arc::clone(&self.store),
                        Arc::clone(&self.issuer),
                        self.signal.clone(),
                    )
                    .boxed()
                    .shared();
                    *slot = Some((id, flight.clone()));
                    (id, flight)
                }
            }
        };

        let result = flight.await;

        let mut slot = self.in_flight.lock();
        if matches!(slot.as_ref(), Some((current, _)) if *current == id) {
            *slot = None;
        }
        result
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Start the periodic ticker for the current generation. A ticker already
    /// running for this generation is left alone.
    pub fn start(self: &Arc<Self>) {
        let generation = self.store.generation();
        let mut ticker = self.ticker.lock();

        if let Some((bound, handle)) = ticker.as_ref() {
            if *bound == generation && !handle.is_finished() {
                return;
            }
            handle.abort();
        }

        debug!("Starting refresh ticker for generation {}", generation);
        let weak = Arc::downgrade(self);
        *ticker = Some((generation, tokio::spawn(run_ticker(weak, generation))));
    }

    pub fn cancel(&self) {
        if let Some((generation, handle)) = self.ticker.lock().take() {
            debug!("Cancelling refresh ticker for generation {}", generation);
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .as_ref()
            .map_or(false, |(_, handle)| !handle.is_finished())
    }

    /// Delay until the next scheduled refresh
    pub fn next_delay(&self) -> Duration {
        let expires_at = self.store.access_token().and_then(|token| auth::expires_at(&token));
        refresh_delay(
            self.config.refresh_interval(),
            self.config.expiry_leeway(),
            expires_at,
            Utc::now(),
        )
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// The fixed interval, pulled forward to `leeway` before a known expiry
pub fn refresh_delay(
    interval: Duration,
    leeway: Duration,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Duration {
    let Some(expires_at) = expires_at else {
        return interval.max(MIN_DELAY);
    };

    let until_expiry = (expires_at - now).to_std().unwrap_or(Duration::ZERO);
    interval
        .min(until_expiry.saturating_sub(leeway))
        .max(MIN_DELAY)
}

async fn exchange(
    store: Arc<SessionStore>,
    issuer: Arc<dyn Issuer>,
    signal: RedirectSignal,
) -> Result<RefreshOutcome, SessionError> {
    let Some(ticket) = store.refresh_ticket() else {
        debug!("No refresh token stored, skipping refresh");
        return Ok(RefreshOutcome::Skipped);
    };

    match issuer.refresh_token(&ticket.refresh_token).await {
        Ok(access_token) => {
            if store.apply_access_token(&ticket, access_token) {
                info!("Access token refreshed");
                Ok(RefreshOutcome::Refreshed)
            } else {
                Ok(RefreshOutcome::Discarded)
            }
        }
        Err(CollabError::AuthExpired(reason)) => {
            if store.generation() != ticket.generation {
                debug!("Refresh rejected for a session that already ended; ignoring");
                return Ok(RefreshOutcome::Discarded);
            }

            warn!("Refresh token rejected, ending session: {}", reason);
            store.logout();
            signal.raise(RedirectReason::SessionExpired);
            Err(SessionError::AuthenticationExpired(reason))
        }
        Err(e) => {
            let err = SessionError::from(e);
            warn!("Token refresh deferred: {}", err);
            Ok(RefreshOutcome::Deferred(err.to_string()))
        }
    }
}

async fn run_ticker(weak: Weak<RefreshScheduler>, generation: u64) {
    let mut delay = match weak.upgrade() {
        Some(scheduler) => scheduler.next_delay(),
        None => return,
    };

    loop {
        tokio::time::sleep(delay).await;

        let Some(scheduler) = weak.upgrade() else {
            break;
        };
        if scheduler.store.generation() != generation || !scheduler.store.state().is_authenticated() {
            debug!("Refresh ticker for generation {} stopping", generation);
            break;
        }

        delay = match scheduler.refresh().await {
            Ok(RefreshOutcome::Refreshed) | Ok(RefreshOutcome::Skipped) => scheduler.next_delay(),
            Ok(RefreshOutcome::Deferred(_)) => scheduler.config.refresh_retry(),
            Ok(RefreshOutcome::Discarded) | Err(_) => break,
        };
    }
}
