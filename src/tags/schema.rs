/// Tag vocabulary table. Column names are shared with other tools that
/// read the same database, so they keep their capitalisation.
pub const CREATE_TAGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tags (
    Name TEXT,
    Archtype TEXT,
    Description TEXT
)
"#;

pub const TABLE_EXISTS: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'tags'";

pub const SELECT_TAGS: &str = "SELECT Name, Archtype, Description FROM tags ORDER BY rowid";

pub const INSERT_TAG: &str = "INSERT INTO tags (Name, Archtype, Description) VALUES (?1, ?2, ?3)";
