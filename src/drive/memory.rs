//! In-memory [`RemoteStore`] for tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{FileMetadata, RemoteStore, DATABASE_MIME_TYPE};
use crate::error::{DriveTagError, DriveTagResult};

#[derive(Debug, Clone, Default)]
struct StoredFile {
    metadata: FileMetadata,
    parent: Option<String>,
    content: Vec<u8>,
}

/// Files keyed by id, kept in creation order.
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<Vec<StoredFile>>,
    next_id: AtomicU64,
    uploads: AtomicUsize,
    creates: AtomicUsize,
    fail_uploads: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an arbitrary object (a Drive file or folder a user may annotate).
    pub fn insert(&self, id: &str, name: &str, mime_type: &str, description: Option<&str>) {
        self.files.lock().unwrap().push(StoredFile {
            metadata: FileMetadata {
                id: id.to_string(),
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                description: description.map(str::to_string),
            },
            parent: None,
            content: Vec::new(),
        });
    }

    /// Seed a database file with the given bytes.
    pub fn insert_database(&self, id: &str, name: &str, parent: Option<&str>, content: Vec<u8>) {
        self.files.lock().unwrap().push(StoredFile {
            metadata: FileMetadata {
                id: id.to_string(),
                name: name.to_string(),
                mime_type: DATABASE_MIME_TYPE.to_string(),
                description: None,
            },
            parent: parent.map(str::to_string),
            content,
        });
    }

    pub fn content(&self, id: &str) -> Option<Vec<u8>> {
        let files = self.files.lock().unwrap();
        files.iter().find(|f| f.metadata.id == id).map(|f| f.content.clone())
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        *self.fail_uploads.lock().unwrap() = fail;
    }

    fn with_file<T>(&self, id: &str, f: impl FnOnce(&mut StoredFile) -> T) -> DriveTagResult<T> {
        let mut files = self.files.lock().unwrap();
        files
            .iter_mut()
            .find(|file| file.metadata.id == id)
            .map(f)
            .ok_or_else(|| DriveTagError::NotFound(format!("File not found: {}.", id)))
    }
}

impl RemoteStore for MemoryStore {
    fn find_or_create(&self, name: &str, parent: Option<&str>) -> DriveTagResult<String> {
        let mut files = self.files.lock().unwrap();
        let existing = files.iter().find(|f| {
            f.metadata.name == name
                && f.metadata.mime_type == DATABASE_MIME_TYPE
                && (parent.is_none() || f.parent.as_deref() == parent)
        });
        if let Some(file) = existing {
            return Ok(file.metadata.id.clone());
        }

        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        files.push(StoredFile {
            metadata: FileMetadata {
                id: id.clone(),
                name: name.to_string(),
                mime_type: DATABASE_MIME_TYPE.to_string(),
                description: None,
            },
            parent: parent.map(str::to_string),
            content: Vec::new(),
        });
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn download(&self, file_id: &str, dest: &Path) -> DriveTagResult<u64> {
        let content = self.with_file(file_id, |f| f.content.clone())?;
        std::fs::write(dest, &content)?;
        Ok(content.len() as u64)
    }

    fn upload(&self, file_id: &str, source: &Path) -> DriveTagResult<()> {
        if *self.fail_uploads.lock().unwrap() {
            return Err(DriveTagError::Remote {
                status: 503,
                message: "upload rejected".to_string(),
            });
        }
        let content = std::fs::read(source)?;
        self.with_file(file_id, |f| f.content = content)?;
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_metadata(&self, file_id: &str) -> DriveTagResult<FileMetadata> {
        self.with_file(file_id, |f| f.metadata.clone())
    }

    fn update_description(&self, file_id: &str, description: &str) -> DriveTagResult<()> {
        self.with_file(file_id, |f| f.metadata.description = Some(description.to_string()))
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
