//! # consul-sync core
//!
//! Registry-facing logic of consul-sync.
//!
//! ## Layout
//!
//! ```text
//! consul-sync-core/src/
//! ├── agent/          # agent options + HTTP transport
//! ├── router.rs       # per-service agent routing, lookups, deregistration
//! ├── register/       # descriptor, config diff, reconciler, cyclic loop
//! ├── access_points/  # access point table + polling updater
//! ├── api.rs          # per-config facade and its cache
//! ├── config.rs       # JSON config loading
//! ├── events.rs       # broadcast bus (health checks, access point updates)
//! └── utils/          # hashing, bounded caches, config value parsing
//! ```
//!
//! Long-running loops (cyclic registration, access point polling) are tokio
//! tasks stopped through a `watch` channel.

#![allow(
    clippy::significant_drop_tightening,
    reason = "Lock guards in async code require careful lifetime management"
)]
#![allow(clippy::implicit_clone, reason = "Explicit .clone() vs .to_string() is stylistic")]
#![allow(
    clippy::derive_partial_eq_without_eq,
    reason = "Some types intentionally don't implement Eq"
)]
#![cfg_attr(
    test,
    allow(clippy::panic, clippy::float_cmp, clippy::assertions_on_result_states)
)]

pub mod access_points;
pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod register;
pub mod router;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use access_points::{AccessPoints, AccessPointsUpdater, PollResult};
pub use agent::{AgentClient, AgentConnector, HttpAgentClient, HttpConnector};
pub use api::{ApiCache, ConsulApi};
pub use config::{load_config, parse_config};
pub use error::{ConsulError, ConsulResult};
pub use events::{ConsulEvent, EventBus};
pub use register::{CyclicOptions, CyclicRegistrar, Reconciler, StartOutcome};
pub use router::{AgentRouter, ClientCache, ServiceSocket};
