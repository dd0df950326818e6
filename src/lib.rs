//! drivetag - tag Google Drive files and folders with a date and categories.
//!
//! The tag vocabulary lives in a small SQLite database stored on Drive
//! itself. A [`Session`] downloads it once, reads it locally and uploads
//! it again after every change. Annotations are written into the
//! description field of the tagged Drive object.
//!
//! - [`drive`]: remote store trait and the Drive v3 client
//! - [`mirror`]: the session's local copy of the tag database
//! - [`tags`]: the tag table
//! - [`annotate`]: description formatting and updates
//! - [`link`]: share link parsing

pub mod annotate;
pub mod config;
pub mod drive;
pub mod error;
pub mod link;
pub mod logging;
pub mod mirror;
pub mod session;
pub mod tags;

pub use annotate::{describe, Annotation};
pub use config::Config;
pub use error::{DriveTagError, DriveTagResult};
pub use link::extract_id_from_url;
pub use session::Session;
pub use tags::{Tag, TagStore};
