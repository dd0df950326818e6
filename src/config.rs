use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::drive::auth::ServiceAccountKey;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub drive: DriveConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    /// Service account fields pasted straight into the config file.
    /// Takes precedence over `auth.credentials_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp_service_account: Option<ServiceAccountKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// File name of the tag database on Drive.
    #[serde(default = "default_database_name")]
    pub database_name: String,

    /// Folder holding the tag database. When unset the lookup is not
    /// restricted to a parent.
    #[serde(default)]
    pub parent_folder_id: Option<String>,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_upload_base")]
    pub upload_base: String,

    #[serde(default = "default_download_chunk_size")]
    pub download_chunk_size: u64,

    /// Must be a multiple of 256 KiB for resumable uploads.
    #[serde(default = "default_upload_chunk_size")]
    pub upload_chunk_size: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_database_name() -> String {
    "drivetag.db".to_string()
}

fn default_api_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_upload_base() -> String {
    "https://www.googleapis.com/upload/drive/v3".to_string()
}

fn default_download_chunk_size() -> u64 {
    100 * 1024 * 1024
}

fn default_upload_chunk_size() -> u64 {
    8 * 256 * 1024
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            database_name: default_database_name(),
            parent_folder_id: None,
            api_base: default_api_base(),
            upload_base: default_upload_base(),
            download_chunk_size: default_download_chunk_size(),
            upload_chunk_size: default_upload_chunk_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Path to a service account JSON key file.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,

    /// Pre-issued OAuth bearer token. Skips the service account flow.
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default = "default_scope")]
    pub scope: String,
}

fn default_scope() -> String {
    "https://www.googleapis.com/auth/drive".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_path: None,
            access_token: None,
            scope: default_scope(),
        }
    }
}

/// Where the session gets its bearer token from, in priority order.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    AccessToken(String),
    ServiceAccount(ServiceAccountKey),
    KeyFile(PathBuf),
}

impl Config {
    /// Load from `DRIVETAG_CONFIG` if set, otherwise the default location.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("DRIVETAG_CONFIG") {
            return Self::load_from(Path::new(&path));
        }

        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("drivetag")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Resolve credentials: env token, configured token, inline service
    /// account, configured key file, then `GOOGLE_APPLICATION_CREDENTIALS`.
    pub fn credential_source(&self) -> Option<CredentialSource> {
        if let Ok(token) = std::env::var("DRIVETAG_ACCESS_TOKEN") {
            if !token.is_empty() {
                return Some(CredentialSource::AccessToken(token));
            }
        }
        if let Some(token) = self.auth.access_token.as_ref().filter(|t| !t.is_empty()) {
            return Some(CredentialSource::AccessToken(token.clone()));
        }
        if let Some(key) = &self.gcp_service_account {
            return Some(CredentialSource::ServiceAccount(key.clone()));
        }
        if let Some(path) = &self.auth.credentials_path {
            return Some(CredentialSource::KeyFile(path.clone()));
        }
        std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS").map(|p| CredentialSource::KeyFile(PathBuf::from(p)))
    }
}
