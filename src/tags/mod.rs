//! Tag vocabulary stored in the mirrored SQLite database.

mod export;
mod schema;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::DriveTagResult;
use crate::mirror::LocalMirror;

pub use export::{export_tags, ExportFormat};

/// One row of the `tags` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Archtype")]
    pub archtype: String,
    #[serde(rename = "Description")]
    pub description: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, archtype: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            archtype: archtype.into(),
            description: description.into(),
        }
    }
}

pub struct TagStore {
    mirror: LocalMirror,
}

impl TagStore {
    pub fn new(mirror: LocalMirror) -> Self {
        Self { mirror }
    }

    pub fn mirror(&self) -> &LocalMirror {
        &self.mirror
    }

    /// All tags in insertion order. A database without the `tags` table
    /// yields an empty list; any other failure is returned.
    pub fn list_tags(&self) -> DriveTagResult<Vec<Tag>> {
        self.mirror.read(|conn| {
            if !table_exists(conn)? {
                tracing::debug!("No tags table yet");
                return Ok(Vec::new());
            }

            let mut stmt = conn.prepare(schema::SELECT_TAGS)?;
            let tags = stmt
                .query_map([], |row| {
                    Ok(Tag {
                        name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                        archtype: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tags)
        })
    }

    /// Distinct archtypes in the order they first appear.
    pub fn archtypes(&self) -> DriveTagResult<Vec<String>> {
        let mut seen = Vec::new();
        for tag in self.list_tags()? {
            if !tag.archtype.is_empty() && !seen.contains(&tag.archtype) {
                seen.push(tag.archtype);
            }
        }
        Ok(seen)
    }

    /// Append one row exactly as given and upload the database.
    ///
    /// Values are not trimmed or checked here; rejecting an empty name is
    /// up to the caller. Duplicate names are allowed.
    pub fn add_tag(&self, name: &str, archtype: &str, description: &str) -> DriveTagResult<()> {
        self.mirror.with_write(|conn| {
            let tx = conn.transaction()?;
            tx.execute(schema::CREATE_TAGS_TABLE, [])?;
            tx.execute(schema::INSERT_TAG, params![name, archtype, description])?;
            tx.commit()?;
            Ok(())
        })?;

        tracing::info!(name, archtype, "Added tag");
        Ok(())
    }
}

fn table_exists(conn: &Connection) -> DriveTagResult<bool> {
    let count: i64 = conn.query_row(schema::TABLE_EXISTS, [], |row| row.get(0))?;
    Ok(count > 0)
}
