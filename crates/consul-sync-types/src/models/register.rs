//! Registration descriptor and reconciliation policy types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Health check attached to a registration.
///
/// Field names follow the agent's lower-case config keys, so the same struct
/// is read from configuration (`consul.check`) and stored in the descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCheck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(
        default,
        rename = "dockercontainerid",
        alias = "docker_container_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub docker_container_id: Option<String>,
    /// Go-style duration (`10s`, `1m`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(
        default,
        rename = "deregistercriticalserviceafter",
        alias = "deregister_critical_service_after",
        skip_serializing_if = "Option::is_none"
    )]
    pub deregister_critical_service_after: Option<String>,
}

impl RegisterCheck {
    /// True when any probe target (http, tcp, script, shell) is set.
    pub fn has_target(&self) -> bool {
        self.http.is_some() || self.tcp.is_some() || self.script.is_some() || self.shell.is_some()
    }
}

/// Canonical record describing how the local service appears in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDescriptor {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<RegisterCheck>,
}

/// Idempotency policy used when (re)registering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegisterType {
    /// Register only when the agent knows nothing about the service id
    #[default]
    IfNotRegistered,
    /// Register when the live record differs from the descriptor
    IfConfigDiffer,
    /// Always register
    Force,
}

impl RegisterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IfNotRegistered => "if-not-registered",
            Self::IfConfigDiffer => "if-config-differ",
            Self::Force => "force",
        }
    }
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegisterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "if-not-registered" => Ok(Self::IfNotRegistered),
            "if-config-differ" => Ok(Self::IfConfigDiffer),
            "force" => Ok(Self::Force),
            other => Err(format!(
                "unknown register type '{}', expected if-not-registered, if-config-differ or force",
                other
            )),
        }
    }
}

/// Options of a single reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    pub register_type: RegisterType,
    /// Deregister an existing record before registering again
    pub delete_other_instance: bool,
    /// Do not log "already registered"
    pub no_already_registered_message: bool,
}

impl RegisterOptions {
    pub fn with_type(register_type: RegisterType) -> Self {
        Self { register_type, ..Self::default() }
    }
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterOutcome {
    /// Registry already matched the policy, nothing sent
    Already,
    /// Register call succeeded
    Just,
    /// Register call failed
    Failed,
}

impl RegisterOutcome {
    pub fn is_registered(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_register_type_parsing() {
        assert_eq!("force".parse::<RegisterType>().unwrap(), RegisterType::Force);
        assert_eq!(
            " If-Config-Differ ".parse::<RegisterType>().unwrap(),
            RegisterType::IfConfigDiffer
        );
        assert!("sometimes".parse::<RegisterType>().is_err());
        assert_eq!(RegisterType::default(), RegisterType::IfNotRegistered);
    }

    #[test]
    fn test_check_config_keys() {
        let check: RegisterCheck = serde_json::from_str(
            r#"{"tcp": "h:1", "interval": "15s", "deregistercriticalserviceafter": "1m"}"#,
        )
        .unwrap();
        assert!(check.has_target());
        assert_eq!(check.deregister_critical_service_after.as_deref(), Some("1m"));
        assert!(!RegisterCheck::default().has_target());
    }
}
