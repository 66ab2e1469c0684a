//! Idempotent registration of the local service.

use consul_sync_types::{RegisterDescriptor, RegisterOptions, RegisterOutcome, RegisterType};
use std::sync::Arc;

use super::diff::service_config_diff;
use crate::error::{ConsulError, ConsulResult};
use crate::router::AgentRouter;

/// Registers a descriptor through the primary agent according to a policy.
pub struct Reconciler {
    router: Arc<AgentRouter>,
}

impl Reconciler {
    pub fn new(router: Arc<AgentRouter>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Arc<AgentRouter> {
        &self.router
    }

    /// One reconciliation pass.
    ///
    /// Transport failures become [`RegisterOutcome::Failed`]; only an unusable
    /// descriptor (no address, no port) or agent options are returned as errors.
    pub async fn register_service(
        &self,
        descriptor: &RegisterDescriptor,
        options: RegisterOptions,
    ) -> ConsulResult<RegisterOutcome> {
        if descriptor.address.trim().is_empty() {
            return Err(ConsulError::missing("Address"));
        }
        if descriptor.port == 0 {
            return Err(ConsulError::missing("Port"));
        }

        let srv = format!("Service '{}'", descriptor.id);
        let info = self.router.get_service_info(&descriptor.id).await;
        let already = || {
            if !options.no_already_registered_message {
                tracing::info!("{} already registered in Consul", srv);
            }
            Ok(RegisterOutcome::Already)
        };

        match options.register_type {
            RegisterType::IfConfigDiffer => match service_config_diff(descriptor, info.as_ref()) {
                None => return already(),
                Some(diff) => {
                    tracing::info!("{}. Configuration difference detected. {}", srv, diff);
                },
            },
            RegisterType::IfNotRegistered if info.is_some() => return already(),
            RegisterType::IfNotRegistered | RegisterType::Force => {},
        }

        let handle = self.router.primary().await?;
        if info.is_some()
            && options.delete_other_instance
            && self.router.deregister(&handle, &descriptor.id).await
        {
            tracing::info!("Previous registration of {} removed from Consul", srv);
        }

        if self.router.register(&handle, descriptor).await {
            tracing::info!("{} is registered in Consul", srv);
            Ok(RegisterOutcome::Just)
        } else {
            tracing::error!("{} is NOT registered in Consul", srv);
            Ok(RegisterOutcome::Failed)
        }
    }
}
