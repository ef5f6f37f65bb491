//! # relaynet Backend
//!
//! Control plane for the relaynet relay overlay.
//!
//! This crate provides:
//! - The relay lifecycle state machine
//! - A two-tier relay directory: a durable [`Storer`] plus an expiring
//!   [`EphemeralStore`], joined behind deadline-bounded calls
//! - The ping-mesh engine: peer selection and the relay ping relation graph
//! - Handlers for relay init/update and server init, server update and
//!   session update packets
//!
//! ## Architecture
//!
//! ```text
//!   relay (HTTP)            game server (UDP)
//!        │                        │
//!        ▼                        ▼
//! ┌──────────────┐     ┌─────────────────────┐
//! │ relay_init   │     │ handle_server_packet│
//! │ relay_update │     │  server_init/update │
//! └──────┬───────┘     │  session_update     │
//!        │             └──────────┬──────────┘
//!        ▼                        ▼
//! ┌──────────────────────────────────────────┐
//! │ BackendContext                           │
//! │  RelayDirectory ── Storer (durable)      │
//! │                 └─ EphemeralStore (TTL)  │
//! │  StatsDatabase (ping relation graph)     │
//! └──────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod ping_mesh;
pub mod state;
pub mod stats;
pub mod store;
pub mod storer;

pub use config::BackendConfig;
pub use context::{BackendContext, BackendKeys};
pub use directory::{RelayDirectory, RelayStoreData, ServerCacheEntry, SessionCacheEntry};
pub use error::{HandlerError, Status, StoreError};
pub use handlers::{
    ContentType, Response, handle_server_packet, relay_init, relay_update, server_init,
    server_update, session_update,
};
pub use state::{LifecycleError, LifecycleEvent, RelayState, transition};
pub use stats::StatsDatabase;
pub use store::{EphemeralStore, InMemoryStore};
pub use storer::{Buyer, Datacenter, InMemoryStorer, Relay, Seller, Storer};
