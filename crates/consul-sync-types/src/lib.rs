//! # consul-sync types
//!
//! Core types, models, and error definitions for consul-sync.
//!
//! This crate provides the foundational type system for the workspace:
//!
//! - **`error`** - Typed error hierarchy for configuration and registry calls
//! - **`models`** - Domain models (agent options, service info, register descriptor,
//!   access points, configuration tree)
//!
//! ## Architecture Role
//!
//! `consul-sync-types` sits at the bottom of the dependency graph:
//!
//! ```text
//!          consul-sync-types (this crate)
//!                   │
//!                   ▼
//!          consul-sync-core
//!                   │
//!                   ▼
//!          consul-sync-server
//! ```
//!
//! Nothing here performs I/O. Models are serde-friendly, `Clone`, and `PartialEq`
//! so they can be hashed, compared and handed out as copies.

pub mod error;
pub mod models;

// Re-export error types for convenience
pub use error::{ConfigError, RegistryError, Result, TypedError};

// Re-export core model types
pub use models::{
    AccessPoint, AccessPointData, AgentMember, AgentOptions, ConsulSyncConfig, FieldChange,
    HealthNode, HealthQuery, HealthServiceEntry, RegisterCheck, RegisterDescriptor,
    RegisterOptions, RegisterOutcome, RegisterType, ServiceInfo,
};
pub use models::access_point::{normalize_port, normalize_protocol};
pub use models::agent::PRIMARY_AGENT;
pub use models::config::{
    AgentConfig, AgentSection, ConsulSection, FlagValue, MetaValue, PortValue, ServiceConfig,
    TagsValue, WebServerConfig,
};
