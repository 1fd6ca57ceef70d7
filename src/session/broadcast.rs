use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store::SessionStore;
use crate::storage::{SessionStorage, StorageError, MARKER_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Login,
    Logout,
}

impl SessionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEvent::Login => "login",
            SessionEvent::Logout => "logout",
        }
    }
}

/// Shared marker value `"<event>-<timestamp>"`, timestamp in epoch millis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMarker {
    pub event: SessionEvent,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerParseError {
    #[error("marker '{0}' is not of the form <event>-<timestamp>")]
    Shape(String),

    #[error("unknown session event '{0}'")]
    Event(String),

    #[error("invalid marker timestamp '{0}'")]
    Timestamp(String),
}

impl fmt::Display for SessionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.event.as_str(), self.timestamp_ms)
    }
}

impl FromStr for SessionMarker {
    type Err = MarkerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (event, timestamp) = s
            .split_once('-')
            .ok_or_else(|| MarkerParseError::Shape(s.to_string()))?;

        let event = match event {
            "login" => SessionEvent::Login,
            "logout" => SessionEvent::Logout,
            other => return Err(MarkerParseError::Event(other.to_string())),
        };

        let timestamp_ms = timestamp
            .parse()
            .map_err(|_| MarkerParseError::Timestamp(timestamp.to_string()))?;

        Ok(Self { event, timestamp_ms })
    }
}

/// A marker change seen by a transport. `origin` is known only for
/// transports that carry it; polling sees bare values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerNotice {
    pub origin: Option<Uuid>,
    pub raw: String,
}

/// Generic broadcast-channel capability between contexts of one profile
pub trait MarkerTransport: Send + Sync {
    fn notify(&self, notice: MarkerNotice);

    fn subscribe(&self) -> broadcast::Receiver<MarkerNotice>;
}

/// In-process hub. Clones share one channel, so contexts built from clones of
/// the same transport see each other's notices immediately.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: broadcast::Sender<MarkerNotice>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerTransport for ChannelTransport {
    fn notify(&self, notice: MarkerNotice) {
        // No subscribers is fine: nobody else is open
        let _ = self.tx.send(notice);
    }

    fn subscribe(&self) -> broadcast::Receiver<MarkerNotice> {
        self.tx.subscribe()
    }
}

/// Watches the persisted marker key for platforms without a change event.
/// The storage write is the signal, so `notify` does nothing.
pub struct PollingTransport {
    storage: Arc<dyn SessionStorage>,
    interval: Duration,
    tx: broadcast::Sender<MarkerNotice>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl PollingTransport {
    pub fn new(storage: Arc<dyn SessionStorage>, interval: Duration) -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            storage,
            interval,
            tx,
            poller: Mutex::new(None),
        }
    }

    fn ensure_polling(&self) {
        let mut poller = self.poller.lock();
        if poller.as_ref().map_or(false, |handle| !handle.is_finished()) {
            return;
        }

        let storage = Arc::clone(&self.storage);
        let tx = self.tx.clone();
        let interval = self.interval;
        // Baseline taken now so an existing marker is not replayed
        let mut last_seen = storage.get_or_absent(MARKER_KEY);

        *poller = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let current = storage.get_or_absent(MARKER_KEY);
                if current == last_seen {
                    continue;
                }
                if let Some(raw) = current.clone() {
                    debug!("Polling saw marker change: {}", raw);
                    let _ = tx.send(MarkerNotice { origin: None, raw });
                }
                last_seen = current;
            }
        }));
    }
}

impl MarkerTransport for PollingTransport {
    fn notify(&self, _notice: MarkerNotice) {}

    fn subscribe(&self) -> broadcast::Receiver<MarkerNotice> {
        let rx = self.tx.subscribe();
        self.ensure_polling();
        rx
    }
}

impl Drop for PollingTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
        }
    }
}

/// Emits login/logout markers for one context and resynchronizes that
/// context when another one emits.
pub struct Broadcaster {
    context_id: Uuid,
    storage: Arc<dyn SessionStorage>,
    transport: Arc<dyn MarkerTransport>,
    last_emitted: Mutex<Option<SessionMarker>>,
}

impl Broadcaster {
    pub fn new(storage: Arc<dyn SessionStorage>, transport: Arc<dyn MarkerTransport>) -> Self {
        Self {
            context_id: Uuid::new_v4(),
            storage,
            transport,
            last_emitted: Mutex::new(None),
        }
    }

    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    /// Write the marker, then notify. Callers must have made their session
    /// write durable before calling this.
    pub fn emit(&self, event: SessionEvent) -> Result<SessionMarker, StorageError> {
        let marker = {
            let mut last = self.last_emitted.lock();
            let now = Utc::now().timestamp_millis();
            // Two events in the same millisecond must still change the value
            let timestamp_ms = match last.as_ref() {
                Some(prev) if prev.timestamp_ms >= now => prev.timestamp_ms + 1,
                _ => now,
            };
            let marker = SessionMarker { event, timestamp_ms };
            *last = Some(marker.clone());
            marker
        };

        let raw = marker.to_string();
        self.storage.set(MARKER_KEY, &raw)?;
        self.transport.notify(MarkerNotice {
            origin: Some(self.context_id),
            raw,
        });

        info!("Broadcast session marker {} from context {}", marker, self.context_id);
        Ok(marker)
    }

    fn is_own(&self, notice: &MarkerNotice) -> bool {
        match notice.origin {
            Some(origin) => origin == self.context_id,
            None => self
                .last_emitted
                .lock()
                .as_ref()
                .map_or(false, |marker| marker.to_string() == notice.raw),
        }
    }

    /// Resync `store` whenever another context changes the marker
    pub fn listen(self: &Arc<Self>, store: Arc<SessionStore>) -> JoinHandle<()> {
        let mut rx = self.transport.subscribe();
        let this = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(notice) => {
                        if this.is_own(&notice) {
                            continue;
                        }
                        match notice.raw.parse::<SessionMarker>() {
                            Ok(marker) => info!(
                                "Context {} observed {} marker, resynchronizing",
                                this.context_id,
                                marker.event.as_str()
                            ),
                            Err(e) => warn!("Unparseable session marker, resynchronizing anyway: {}", e),
                        }
                        store.resync();
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} session markers, resynchronizing", skipped);
                        store.resync();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
