//! One user session: a remote store client, the mirrored tag database and
//! the annotator, wired together.

use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

use crate::annotate::{describe, Annotation, Annotator};
use crate::config::Config;
use crate::drive::{DriveClient, FileMetadata, RemoteStore, TokenProvider};
use crate::error::{DriveTagError, DriveTagResult};
use crate::link::extract_id_from_url;
use crate::mirror::LocalMirror;
use crate::tags::TagStore;

/// Drive rejects resumable chunks that are not a multiple of 256 KiB.
const UPLOAD_CHUNK_GRANULARITY: u64 = 256 * 1024;

pub struct Session {
    tags: TagStore,
    annotator: Annotator,
}

impl Session {
    /// Authenticate against Drive and mirror the configured tag database.
    pub fn connect(config: &Config) -> DriveTagResult<Self> {
        if config.drive.upload_chunk_size == 0 || config.drive.upload_chunk_size % UPLOAD_CHUNK_GRANULARITY != 0 {
            return Err(DriveTagError::config(format!(
                "drive.upload_chunk_size must be a positive multiple of {} bytes",
                UPLOAD_CHUNK_GRANULARITY
            )));
        }
        if config.drive.download_chunk_size == 0 {
            return Err(DriveTagError::config("drive.download_chunk_size must be positive"));
        }

        let source = config.credential_source().ok_or_else(|| {
            DriveTagError::auth(
                "no credentials configured: set [gcp_service_account], auth.credentials_path, \
                 GOOGLE_APPLICATION_CREDENTIALS or DRIVETAG_ACCESS_TOKEN",
            )
        })?;
        let timeout = Duration::from_secs(config.drive.timeout_secs);
        let tokens = TokenProvider::from_source(source, &config.auth.scope, timeout)?;
        if let Some(account) = tokens.account() {
            tracing::info!(account, "Using service account credentials");
        }

        let client = DriveClient::new(&config.drive, tokens);
        Self::open(Arc::new(client), config)
    }

    /// Start a session on an already constructed store.
    pub fn open(store: Arc<dyn RemoteStore>, config: &Config) -> DriveTagResult<Self> {
        tracing::debug!(provider = store.provider_name(), "Opening session");
        let mirror = LocalMirror::open(
            store.clone(),
            &config.drive.database_name,
            config.drive.parent_folder_id.as_deref(),
        )?;

        Ok(Self {
            annotator: Annotator::new(store),
            tags: TagStore::new(mirror),
        })
    }

    pub fn tags(&self) -> &TagStore {
        &self.tags
    }

    /// Metadata and parsed annotation of the object behind `link`.
    pub fn inspect(&self, link: &str) -> DriveTagResult<(FileMetadata, Option<Annotation>)> {
        let file_id = resolve_link(link)?;
        self.annotator.current(&file_id)
    }

    /// Tags from `wanted` that are not in the tag table.
    pub fn unknown_tags(&self, wanted: &[String]) -> DriveTagResult<Vec<String>> {
        let known = self.tags.list_tags()?;
        Ok(wanted
            .iter()
            .filter(|w| !known.iter().any(|t| &t.name == *w))
            .cloned()
            .collect())
    }

    /// Write the date and tags into the description of the object behind
    /// `link`, returning the text written.
    pub fn annotate_link(&self, link: &str, date: NaiveDate, tags: &[String]) -> DriveTagResult<String> {
        let file_id = resolve_link(link)?;
        let text = describe(date, tags);
        self.annotator.annotate(&file_id, &text)?;
        Ok(text)
    }

    /// Add a tag from user input. A blank name is rejected before the
    /// database is touched; the values themselves are stored as given.
    pub fn add_tag(&self, name: &str, archtype: &str, description: &str) -> DriveTagResult<()> {
        if name.trim().is_empty() {
            return Err(DriveTagError::validation("name", "tag name must not be empty"));
        }
        self.tags.add_tag(name, archtype, description)
    }
}

/// Extract the object id from `link`, or fail with [`DriveTagError::InvalidLink`].
pub fn resolve_link(link: &str) -> DriveTagResult<String> {
    extract_id_from_url(link).ok_or_else(|| DriveTagError::InvalidLink(link.to_string()))
}
