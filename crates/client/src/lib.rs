//! `pantry-client`: the live-update layer of the pantry inventory client.
//!
//! Data flows one way:
//!
//! 1. the [`transport`] carries push frames from the server;
//! 2. the [`connection`] manager decodes them ([`wire`]) and publishes them on
//!    the shared bus;
//! 3. every mounted page in [`views`] applies them to its own
//!    [`ViewCache`](cache::ViewCache) and recomputes what it derives;
//! 4. [`notifications`] watches the same stream for the badge and toasts.
//!
//! Polling ([`poller`]) and push feed the same idempotent reducers, so the two
//! can overlap freely. [`report`] checks the pages' aggregates against the
//! server's own.

pub mod actions;
pub mod api;
pub mod cache;
pub mod config;
pub mod connection;
pub mod notifications;
pub mod poller;
pub mod report;
pub mod scope;
pub mod state;
pub mod testing;
pub mod transport;
pub mod views;
pub mod wire;

pub use actions::{ActionError, ProductActions};
pub use api::{ApiClient, ApiError, InventoryApi};
pub use cache::{Applied, ViewCache};
pub use config::{ClientConfig, ConfigError};
pub use connection::ConnectionManager;
pub use notifications::{Notifications, PanelEvent, PanelState, ToastKind};
pub use report::{Drift, ServerSnapshot};
pub use scope::PageScope;
pub use state::AppState;
pub use transport::{Connector, MemoryConnector, TransportError, WebSocketConnector};
pub use wire::{EventKind, Message};
