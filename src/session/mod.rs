//! Session lifecycle for one client context.
//!
//! `SessionStore` owns the state, `RefreshScheduler` keeps the access token
//! fresh, `Broadcaster` keeps sibling contexts in step, and `RouteGate`
//! turns the state into a render/redirect decision. `SessionContext` wires
//! them together.

pub mod broadcast;
pub mod context;
pub mod gate;
pub mod scheduler;
pub mod store;

pub use broadcast::{
    Broadcaster, ChannelTransport, MarkerNotice, MarkerParseError, MarkerTransport, PollingTransport, SessionEvent,
    SessionMarker,
};
pub use context::{Collaborators, SessionContext};
pub use gate::{GateDecision, RedirectReason, RedirectSignal, RouteGate};
pub use scheduler::{refresh_delay, RefreshOutcome, RefreshScheduler};
pub use store::{Initialization, PersistedSession, RefreshTicket, SessionStore};
