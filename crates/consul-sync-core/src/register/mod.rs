//! Service registration: descriptor, diff, reconciler and the cyclic loop.

pub mod cyclic;
pub mod descriptor;
pub mod diff;
pub mod reconciler;

pub use cyclic::{CyclicOptions, CyclicRegistrar, StartOutcome, TickOutcome};
pub use descriptor::{build_register_descriptor, consul_ui_address, resolve_service_id, service_id};
pub use diff::{service_config_diff, ConfigDiff};
pub use reconciler::Reconciler;
