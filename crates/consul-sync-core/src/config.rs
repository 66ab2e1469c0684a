//! Loading of the JSON configuration file.

use consul_sync_types::{ConfigError, ConsulSyncConfig};
use std::path::Path;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

use crate::error::{ConsulError, ConsulResult};

/// Reads, parses and validates a config file.
pub fn load_config(path: impl AsRef<Path>) -> ConsulResult<ConsulSyncConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConsulError::Config(ConfigError::NotFound { path: path.display().to_string() })
        } else {
            ConsulError::Io(e)
        }
    })?;
    let config = parse_config(&content)?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Parses and validates config JSON.
pub fn parse_config(content: &str) -> ConsulResult<ConsulSyncConfig> {
    let config: ConsulSyncConfig =
        serde_json::from_str(content).map_err(|e| ConfigError::from_json_error(&e))?;
    config.validate().map_err(|errors| {
        let (field, message) = first_invalid_field(&errors, "")
            .unwrap_or_else(|| ("config".to_string(), errors.to_string()));
        ConfigError::invalid(field, message)
    })?;
    Ok(config)
}

/// Dotted path and message of the first failing field, in field-name order.
fn first_invalid_field(errors: &ValidationErrors, prefix: &str) -> Option<(String, String)> {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));
    for (name, kind) in fields {
        let path = if prefix.is_empty() { name.to_string() } else { format!("{}.{}", prefix, name) };
        let found = match kind {
            ValidationErrorsKind::Field(list) => list.first().map(|e| {
                let message = e.message.as_ref().map_or_else(|| e.code.to_string(), |m| m.to_string());
                (path.clone(), message)
            }),
            ValidationErrorsKind::Struct(inner) => first_invalid_field(inner, &path),
            ValidationErrorsKind::List(items) => items
                .iter()
                .find_map(|(i, inner)| first_invalid_field(inner, &format!("{}[{}]", path, i))),
        };
        if found.is_some() {
            return found;
        }
    }
    None
}
