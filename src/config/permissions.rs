//! Loading of the optional permissions file.

use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use super::errors::{ConfigError, ConfigResult};
use crate::compiler::PermissionsConfig;
use crate::observability::Event;

/// Read the permissions file.
///
/// A missing file is not an error: a warning is logged and an empty rule
/// set is returned. A file that exists but is not a JSON array aborts
/// startup.
pub fn load_permissions(path: &Path) -> ConfigResult<PermissionsConfig> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!(
                event = Event::PermissionsMissing.as_str(),
                path = %path.display(),
                "Permissions file not found, continuing without permissions"
            );
            return Ok(PermissionsConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::PermissionsRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let rules: Vec<Value> =
        serde_json::from_str(&raw).map_err(|source| ConfigError::PermissionsParse {
            path: path.to_path_buf(),
            source,
        })?;

    info!(
        event = Event::PermissionsLoaded.as_str(),
        path = %path.display(),
        rules = rules.len(),
        "Permissions loaded"
    );
    Ok(PermissionsConfig::new(rules))
}
