//! Remote file store access.
//!
//! [`RemoteStore`] is the seam between the session and Google Drive.
//! [`DriveClient`] talks to the Drive v3 REST API; tests swap in the
//! in-memory store from `memory`.

pub mod auth;
pub mod client;
#[cfg(test)]
pub(crate) mod memory;

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::DriveTagResult;

pub use auth::{ServiceAccountKey, TokenProvider};
pub use client::DriveClient;

/// Content type used to find and create the tag database.
pub const DATABASE_MIME_TYPE: &str = "application/x-sqlite3";

/// Drive object reference as returned by `files.get`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl FileMetadata {
    pub fn is_folder(&self) -> bool {
        self.mime_type == "application/vnd.google-apps.folder"
    }
}

/// Operations the session needs from a cloud file store.
///
/// Nothing here retries. Every failure is returned to the caller.
pub trait RemoteStore: Send + Sync {
    /// Return the id of the first file named `name` (inside `parent`, when
    /// given) with the database content type, creating an empty one if
    /// there is none.
    fn find_or_create(&self, name: &str, parent: Option<&str>) -> DriveTagResult<String>;

    /// Write the full content of `file_id` into `dest`, returning the byte count.
    fn download(&self, file_id: &str, dest: &Path) -> DriveTagResult<u64>;

    /// Replace the content of `file_id` with the content of `source`.
    fn upload(&self, file_id: &str, source: &Path) -> DriveTagResult<()>;

    fn get_metadata(&self, file_id: &str) -> DriveTagResult<FileMetadata>;

    /// Overwrite only the description field.
    fn update_description(&self, file_id: &str, description: &str) -> DriveTagResult<()>;

    fn provider_name(&self) -> &'static str;
}
