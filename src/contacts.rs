//! Read-only contact directory

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone_numbers: Vec<String>,
}

impl Contact {
    /// Case-insensitive match against the name and every phone number
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        std::iter::once(&self.name)
            .chain(self.phone_numbers.iter())
            .any(|field| field.to_lowercase().contains(&query))
    }

    pub fn primary_number(&self) -> Option<&str> {
        self.phone_numbers.first().map(String::as_str)
    }
}

#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn get_contacts(&self) -> Result<Vec<Contact>>;

    async fn search(&self, query: &str) -> Result<Vec<Contact>> {
        Ok(self
            .get_contacts()
            .await?
            .into_iter()
            .filter(|c| c.matches(query))
            .collect())
    }
}

/// Contacts read from a JSON array on disk. A missing file is an empty
/// directory.
#[derive(Debug, Clone)]
pub struct FileContactDirectory {
    path: PathBuf,
}

impl FileContactDirectory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ContactDirectory for FileContactDirectory {
    async fn get_contacts(&self) -> Result<Vec<Contact>> {
        if !self.path.exists() {
            warn!("Contacts file {:?} not found", self.path);
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).await?;
        let mut contacts: Vec<Contact> = serde_json::from_str(&content)?;
        contacts.retain(|c| !c.phone_numbers.is_empty());
        contacts.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        debug!("Loaded {} contacts", contacts.len());
        Ok(contacts)
    }
}
