//! Configuration tree consumed by the core.
//!
//! The JSON layout mirrors the classic `consul` section of service configs:
//! `consul.agent.<class>`, `consul.service`, `consul.check`, `webServer` and
//! `accessPoints`.

mod app;
mod consul;
mod values;

pub use app::ConsulSyncConfig;
pub use consul::{AgentConfig, AgentSection, ConsulSection, ServiceConfig, WebServerConfig};
pub use values::{FlagValue, MetaValue, PortValue, TagsValue};
