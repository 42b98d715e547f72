//! Loading `config.toml` from the MessageLater home

use crate::permissions::Permission;
use crate::{MessageLaterConfig, MessageLaterError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Name of the optional config file inside the home directory
pub const CONFIG_FILE: &str = "config.toml";

/// Every key is optional; missing keys keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    /// Relative paths resolve against the home directory
    database_file: Option<PathBuf>,
    contacts_file: Option<PathBuf>,
    boot_budget_secs: Option<u64>,
    resync_interval_secs: Option<u64>,
    messaging_app_installed: Option<bool>,
    exact_alarms_allowed: Option<bool>,
    granted_permissions: Option<Vec<Permission>>,
    message_max_len: Option<usize>,
}

/// Resolve the home directory: `MESSAGELATER_HOME`, else `~/.messagelater`
pub fn resolve_home() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("MESSAGELATER_HOME") {
        return Ok(PathBuf::from(home));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| MessageLaterError::Config("Could not find home directory".to_string()))?;
    Ok(home.join(".messagelater"))
}

/// Build the config for `home`, applying `config.toml` when it exists
pub fn load(home: &Path) -> Result<MessageLaterConfig> {
    let config_file = home.join(CONFIG_FILE);
    let mut config = MessageLaterConfig::new(home.to_path_buf());
    if !config_file.exists() {
        debug!("No config file at {:?}, using defaults", config_file);
        return Ok(config);
    }

    let content = std::fs::read_to_string(&config_file)?;
    let file = toml::from_str::<ConfigToml>(&content)
        .map_err(|e| MessageLaterError::Config(format!("{}: {}", config_file.display(), e)))?;

    if let Some(path) = file.database_file {
        config = config.with_database_file(home.join(path));
    }
    if let Some(path) = file.contacts_file {
        config = config.with_contacts_file(home.join(path));
    }
    if let Some(secs) = file.boot_budget_secs {
        config = config.with_boot_budget(Duration::from_secs(secs));
    }
    if let Some(secs) = file.resync_interval_secs {
        if secs == 0 {
            return Err(MessageLaterError::Config(
                "resync_interval_secs must be greater than zero".to_string(),
            ));
        }
        config = config.with_resync_interval(Duration::from_secs(secs));
    }
    if let Some(installed) = file.messaging_app_installed {
        config = config.with_messaging_app_installed(installed);
    }
    if let Some(allowed) = file.exact_alarms_allowed {
        config = config.with_exact_alarms_allowed(allowed);
    }
    if let Some(granted) = file.granted_permissions {
        config = config.with_granted_permissions(granted);
    }
    if let Some(max_len) = file.message_max_len {
        config = config.with_message_max_len(max_len);
    }

    debug!("Loaded config from {:?}", config_file);
    Ok(config)
}
