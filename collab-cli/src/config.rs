//! Configuration management for collab-cli.

use anyhow::{Context, Result};
use collab_client::ClientConfig;
use collab_types::UserId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const IDENTITY_FILE: &str = "identity.json";

/// Load the client configuration.
///
/// An explicit path must exist. Without one, the platform config file is
/// used if present, and built-in defaults otherwise.
pub fn load_client_config(path: Option<&Path>) -> Result<ClientConfig> {
    if let Some(path) = path {
        return ClientConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    match default_config_path() {
        Some(path) if path.exists() => ClientConfig::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        _ => Ok(ClientConfig::default()),
    }
}

/// `collab.toml` in the platform config directory.
fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "ydun", "collab-cli")
        .map(|dirs| dirs.config_dir().join("collab.toml"))
}

/// The local user, stored so the same id is reused across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier.
    pub user_id: UserId,
    /// Display name.
    pub user_name: String,
    /// When the identity was created (Unix seconds).
    pub created_at: u64,
}

impl Identity {
    /// Create a new identity with a random id.
    pub fn new(name: &str) -> Self {
        Self {
            user_id: UserId::random(),
            user_name: name.to_string(),
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Load the stored identity, creating it on first use.
    ///
    /// A `name` given here replaces the stored display name.
    pub async fn load_or_create(data_dir: &Path, name: Option<&str>) -> Result<Self> {
        let mut identity = if Self::exists(data_dir) {
            Self::load(data_dir).await?
        } else {
            let identity = Self::new(name.unwrap_or("anonymous"));
            identity.save(data_dir).await?;
            identity
        };

        if let Some(name) = name {
            if identity.user_name != name {
                identity.user_name = name.to_string();
                identity.save(data_dir).await?;
            }
        }
        Ok(identity)
    }

    /// Load the identity from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(IDENTITY_FILE);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Failed to read identity")?;
        serde_json::from_str(&contents).context("Invalid identity file")
    }

    /// Save the identity to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(IDENTITY_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save identity")?;
        Ok(())
    }

    /// Check if an identity is stored.
    pub fn exists(data_dir: &Path) -> bool {
        data_dir.join(IDENTITY_FILE).exists()
    }
}
