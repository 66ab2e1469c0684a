//! Domain models.

pub mod access_point;
pub mod agent;
pub mod config;
pub mod register;
pub mod service;

pub use access_point::{AccessPoint, AccessPointData, FieldChange};
pub use agent::AgentOptions;
pub use config::ConsulSyncConfig;
pub use register::{
    RegisterCheck, RegisterDescriptor, RegisterOptions, RegisterOutcome, RegisterType,
};
pub use service::{AgentMember, HealthNode, HealthQuery, HealthServiceEntry, ServiceInfo};
