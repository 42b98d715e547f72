//! Permission capability consumed by the create flow

use crate::{MessageLaterError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Contacts,
    Notifications,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Contacts => write!(f, "contacts"),
            Self::Notifications => write!(f, "notifications"),
        }
    }
}

/// Outcome of a permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    /// Denied this time; asking again may succeed
    DeniedRetryable,
    /// Denied for good; only the settings screen can change it
    DeniedPermanently,
}

#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn is_granted(&self, permission: Permission) -> bool;

    async fn request(&self, permission: Permission) -> PermissionStatus;

    fn open_settings(&self);
}

/// Make sure `permission` is granted, prompting as needed.
///
/// A retryable denial is asked once more; a permanent denial sends the user
/// to the settings screen.
pub async fn ensure_permission(
    provider: &dyn PermissionProvider,
    permission: Permission,
) -> Result<()> {
    if provider.is_granted(permission).await {
        return Ok(());
    }

    let mut status = provider.request(permission).await;
    if status == PermissionStatus::DeniedRetryable {
        status = provider.request(permission).await;
    }

    match status {
        PermissionStatus::Granted => Ok(()),
        PermissionStatus::DeniedPermanently => {
            warn!("Permission {} permanently denied, opening settings", permission);
            provider.open_settings();
            Err(MessageLaterError::PermissionDenied(permission))
        }
        PermissionStatus::DeniedRetryable => {
            warn!("Permission {} denied", permission);
            Err(MessageLaterError::PermissionDenied(permission))
        }
    }
}

/// Desktop provider: a fixed grant set from config. Anything outside the set
/// is permanently denied.
#[derive(Debug, Default)]
pub struct StaticPermissions {
    granted: HashSet<Permission>,
    settings_opened: AtomicUsize,
}

impl StaticPermissions {
    pub fn new(granted: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            granted: granted.into_iter().collect(),
            settings_opened: AtomicUsize::new(0),
        }
    }

    /// How many times the settings screen was requested
    pub fn settings_opened(&self) -> usize {
        self.settings_opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissions {
    async fn is_granted(&self, permission: Permission) -> bool {
        self.granted.contains(&permission)
    }

    async fn request(&self, permission: Permission) -> PermissionStatus {
        if self.granted.contains(&permission) {
            PermissionStatus::Granted
        } else {
            PermissionStatus::DeniedPermanently
        }
    }

    fn open_settings(&self) {
        self.settings_opened.fetch_add(1, Ordering::SeqCst);
        info!("Grant permissions via `granted_permissions` in config.toml");
    }
}
