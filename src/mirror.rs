//! Session-local copy of the remote tag database.
//!
//! The remote file is resolved and downloaded once when the mirror is
//! opened. Reads re-open the local copy every time; writes go through
//! [`LocalMirror::with_write`], which uploads the whole file back after the
//! mutation succeeds.
//!
//! Two sessions writing the same remote file are not coordinated: whichever
//! uploads last wins, and neither sees the other's rows until it opens a
//! new session.

use rusqlite::{Connection, OpenFlags};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

use crate::drive::RemoteStore;
use crate::error::DriveTagResult;

pub struct LocalMirror {
    store: Arc<dyn RemoteStore>,
    file_id: String,
    // Deleted when the mirror is dropped
    file: NamedTempFile,
}

impl LocalMirror {
    /// Find or create `name` on the remote store and download it into a
    /// fresh temporary file.
    pub fn open(store: Arc<dyn RemoteStore>, name: &str, parent: Option<&str>) -> DriveTagResult<Self> {
        let file_id = store.find_or_create(name, parent)?;
        let file = tempfile::Builder::new()
            .prefix("drivetag-")
            .suffix(".db")
            .tempfile()?;

        let bytes = store.download(&file_id, file.path())?;
        tracing::info!(
            file_id = %file_id,
            bytes,
            path = %file.path().display(),
            "Mirrored remote database"
        );

        let mirror = Self { store, file_id, file };
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(sha256 = %mirror.digest()?, "Mirror content after download");
        }
        Ok(mirror)
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Run `query` against a read-only connection to the local copy.
    pub fn read<T>(&self, query: impl FnOnce(&Connection) -> DriveTagResult<T>) -> DriveTagResult<T> {
        let conn = Connection::open_with_flags(
            self.path(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        query(&conn)
    }

    /// Apply `mutation` to the local copy, then upload it to the same file id.
    ///
    /// If the mutation fails nothing is uploaded. Once it succeeds the
    /// upload always happens; an upload failure is returned and leaves the
    /// remote copy stale.
    pub fn with_write<T>(
        &self,
        mutation: impl FnOnce(&mut Connection) -> DriveTagResult<T>,
    ) -> DriveTagResult<T> {
        let mut conn = Connection::open(self.path())?;
        let value = mutation(&mut conn)?;
        // The mutation has committed; a failed close must not skip the upload
        if let Err((_, e)) = conn.close() {
            tracing::warn!(error = %e, "Closing mirror connection failed");
        }

        self.store.upload(&self.file_id, self.path())?;
        tracing::info!(file_id = %self.file_id, "Uploaded mirror to remote store");
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(sha256 = %self.digest()?, "Mirror content after upload");
        }

        Ok(value)
    }

    /// SHA-256 of the local copy, hex encoded.
    pub fn digest(&self) -> DriveTagResult<String> {
        let mut reader = BufReader::new(File::open(self.path())?);
        let mut hasher = Sha256::new();

        let mut buffer = [0u8; 8192];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }
}
