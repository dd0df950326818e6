//! Date and tag annotations stored in a Drive object's description.
//!
//! The description holds exactly two lines:
//!
//! ```text
//! date: 05/01/2024
//! tag: A, B
//! ```
//!
//! Other tools read this text back, so the layout must not change.

use chrono::NaiveDate;
use std::sync::Arc;

use crate::drive::{FileMetadata, RemoteStore};
use crate::error::DriveTagResult;

const DATE_FORMAT: &str = "%d/%m/%Y";
const DATE_PREFIX: &str = "date:";
const TAG_PREFIX: &str = "tag:";
const TAG_SEPARATOR: &str = ", ";

/// Render the two-line description for `date` and `tags`.
pub fn describe(date: NaiveDate, tags: &[String]) -> String {
    format!(
        "date: {}\ntag: {}",
        date.format(DATE_FORMAT),
        tags.join(TAG_SEPARATOR)
    )
}

/// A parsed description. Either half may be missing when the description
/// was written by something else.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Annotation {
    pub date: Option<NaiveDate>,
    pub tags: Vec<String>,
}

impl Annotation {
    /// Read back a description written by [`describe`]. Returns `None` when
    /// neither a `date:` nor a `tag:` line is present.
    pub fn parse(text: &str) -> Option<Self> {
        let mut date = None;
        let mut tags = None;

        for line in text.lines() {
            let line = line.trim();
            if let Some(value) = line.strip_prefix(DATE_PREFIX) {
                date = NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok();
            } else if let Some(value) = line.strip_prefix(TAG_PREFIX) {
                tags = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect::<Vec<_>>(),
                );
            }
        }

        if date.is_none() && tags.is_none() {
            return None;
        }
        Some(Self {
            date,
            tags: tags.unwrap_or_default(),
        })
    }
}

/// Reads and overwrites object descriptions on the remote store.
pub struct Annotator {
    store: Arc<dyn RemoteStore>,
}

impl Annotator {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Current metadata of `file_id`, with its description parsed when it
    /// follows the annotation layout.
    pub fn current(&self, file_id: &str) -> DriveTagResult<(FileMetadata, Option<Annotation>)> {
        let metadata = self.store.get_metadata(file_id)?;
        let annotation = metadata.description.as_deref().and_then(Annotation::parse);
        Ok((metadata, annotation))
    }

    /// Replace the description of `file_id` with `text`. Whatever was there
    /// before is lost.
    pub fn annotate(&self, file_id: &str, text: &str) -> DriveTagResult<()> {
        self.store.update_description(file_id, text)?;
        tracing::info!(file_id, "Updated description");
        Ok(())
    }
}
