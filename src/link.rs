//! Pulling Drive object ids out of share links.

/// Markers tried in order. The first one present decides the id.
const ID_MARKERS: [&str; 3] = ["folders/", "file/d/", "id="];

/// Extract the object id from a Drive folder or file link.
///
/// The id is whatever follows the first matching marker, up to the next
/// `/`, `?` or `&`. Returns `None` when no marker is present or the id
/// would be empty.
pub fn extract_id_from_url(url: &str) -> Option<String> {
    let rest = ID_MARKERS
        .iter()
        .find_map(|marker| url.find(marker).map(|idx| &url[idx + marker.len()..]))?;

    let end = rest.find(['/', '?', '&']).unwrap_or(rest.len());
    let id = &rest[..end];
    (!id.is_empty()).then(|| id.to_string())
}
