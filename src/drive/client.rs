use serde::Deserialize;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::Duration;

use super::auth::TokenProvider;
use super::{FileMetadata, RemoteStore, DATABASE_MIME_TYPE};
use crate::config::DriveConfig;
use crate::error::{DriveTagError, DriveTagResult};

const METADATA_FIELDS: &str = "id,name,mimeType,description";
const MULTIPART_BOUNDARY: &str = "drivetag_part_boundary";

/// Drive v3 REST client.
pub struct DriveClient {
    agent: ureq::Agent,
    // Resumable upload chunks answer 308 without a Location header, so
    // redirects must not be followed on this agent.
    upload_agent: ureq::Agent,
    tokens: TokenProvider,
    api_base: String,
    upload_base: String,
    download_chunk_size: u64,
    upload_chunk_size: u64,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileMetadata>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

impl DriveClient {
    pub fn new(config: &DriveConfig, tokens: TokenProvider) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            upload_agent: ureq::AgentBuilder::new().timeout(timeout).redirects(0).build(),
            tokens,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            download_chunk_size: config.download_chunk_size.max(1),
            upload_chunk_size: config.upload_chunk_size.max(1),
        }
    }

    fn bearer(&self) -> DriveTagResult<String> {
        Ok(format!("Bearer {}", self.tokens.token()?))
    }

    fn find(&self, name: &str, parent: Option<&str>) -> DriveTagResult<Option<String>> {
        let url = format!("{}/files", self.api_base);
        let list: FileList = self
            .agent
            .get(&url)
            .set("Authorization", &self.bearer()?)
            .query("q", &search_query(name, parent))
            .query("fields", "files(id,name,mimeType)")
            .query("spaces", "drive")
            .query("supportsAllDrives", "true")
            .query("includeItemsFromAllDrives", "true")
            .call()?
            .into_json()?;

        if list.files.len() > 1 {
            tracing::warn!(
                name,
                matches = list.files.len(),
                "Several files share the database name, using the first"
            );
        }
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    fn create_empty(&self, name: &str, parent: Option<&str>) -> DriveTagResult<String> {
        let mut metadata = serde_json::json!({
            "name": name,
            "mimeType": DATABASE_MIME_TYPE,
        });
        if let Some(parent) = parent {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let url = format!("{}/files", self.upload_base);
        let created: CreatedFile = self
            .agent
            .post(&url)
            .set("Authorization", &self.bearer()?)
            .set(
                "Content-Type",
                &format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .query("uploadType", "multipart")
            .query("fields", "id")
            .query("supportsAllDrives", "true")
            .send_bytes(&multipart_body(&metadata, DATABASE_MIME_TYPE, &[]))?
            .into_json()?;

        Ok(created.id)
    }

    fn start_upload_session(&self, file_id: &str, total: u64) -> DriveTagResult<String> {
        let url = format!("{}/files/{}", self.upload_base, file_id);
        let response = self
            .agent
            .request("PATCH", &url)
            .set("Authorization", &self.bearer()?)
            .set("X-Upload-Content-Type", DATABASE_MIME_TYPE)
            .set("X-Upload-Content-Length", &total.to_string())
            .query("uploadType", "resumable")
            .query("supportsAllDrives", "true")
            .send_json(serde_json::json!({}))?;

        match response.header("Location") {
            Some(location) => Ok(location.to_string()),
            None => Err(DriveTagError::Remote {
                status: response.status(),
                message: "resumable upload session has no Location header".to_string(),
            }),
        }
    }
}

impl RemoteStore for DriveClient {
    fn find_or_create(&self, name: &str, parent: Option<&str>) -> DriveTagResult<String> {
        if let Some(id) = self.find(name, parent)? {
            tracing::debug!(name, id = %id, "Found remote database");
            return Ok(id);
        }

        let id = self.create_empty(name, parent)?;
        tracing::info!(name, id = %id, "Created empty remote database");
        Ok(id)
    }

    fn download(&self, file_id: &str, dest: &Path) -> DriveTagResult<u64> {
        let url = format!("{}/files/{}", self.api_base, file_id);
        let mut file = File::create(dest)?;
        let mut received = 0u64;

        loop {
            let range = format!(
                "bytes={}-{}",
                received,
                received + self.download_chunk_size - 1
            );
            let result = self
                .agent
                .get(&url)
                .set("Authorization", &self.bearer()?)
                .set("Range", &range)
                .query("alt", "media")
                .query("supportsAllDrives", "true")
                .call();

            let response = match result {
                Ok(response) => response,
                // Range requests on a zero-byte object are unsatisfiable
                Err(ureq::Error::Status(416, _)) if received == 0 => break,
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            let total = response.header("Content-Range").and_then(content_range_total);
            let chunk = std::io::copy(&mut response.into_reader(), &mut file)?;
            received += chunk;
            tracing::trace!(file_id, received, ?total, "Downloaded chunk");

            match (status, total) {
                (206, Some(total)) if received < total && chunk > 0 => continue,
                _ => break,
            }
        }

        file.flush()?;
        file.sync_all()?;
        Ok(received)
    }

    fn upload(&self, file_id: &str, source: &Path) -> DriveTagResult<()> {
        let mut file = File::open(source)?;
        let total = file.metadata()?.len();
        let session = self.start_upload_session(file_id, total)?;

        let mut offset = 0u64;
        loop {
            let len = (total - offset).min(self.upload_chunk_size);
            if len == 0 && total > 0 {
                return Err(DriveTagError::Remote {
                    status: 308,
                    message: "upload session did not finalize after the last byte".to_string(),
                });
            }
            let mut chunk = vec![0u8; len as usize];
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut chunk)?;

            let response = self
                .upload_agent
                .put(&session)
                .set("Authorization", &self.bearer()?)
                .set("Content-Range", &upload_content_range(offset, len, total))
                .send_bytes(&chunk)?;

            match response.status() {
                200 | 201 => break,
                308 => {
                    let next = response
                        .header("Range")
                        .and_then(received_range_end)
                        .map(|end| end + 1)
                        .unwrap_or(0);
                    // An empty final chunk must be answered with 200/201
                    if len == 0 || next <= offset {
                        return Err(DriveTagError::Remote {
                            status: 308,
                            message: format!("upload stalled at byte {}", offset),
                        });
                    }
                    offset = next;
                }
                status => {
                    return Err(DriveTagError::Remote {
                        status,
                        message: "unexpected response to upload chunk".to_string(),
                    })
                }
            }
        }

        tracing::debug!(file_id, bytes = total, "Upload complete");
        Ok(())
    }

    fn get_metadata(&self, file_id: &str) -> DriveTagResult<FileMetadata> {
        let url = format!("{}/files/{}", self.api_base, file_id);
        let metadata = self
            .agent
            .get(&url)
            .set("Authorization", &self.bearer()?)
            .query("fields", METADATA_FIELDS)
            .query("supportsAllDrives", "true")
            .call()?
            .into_json()?;
        Ok(metadata)
    }

    fn update_description(&self, file_id: &str, description: &str) -> DriveTagResult<()> {
        let url = format!("{}/files/{}", self.api_base, file_id);
        self.agent
            .request("PATCH", &url)
            .set("Authorization", &self.bearer()?)
            .query("fields", "id")
            .query("supportsAllDrives", "true")
            .send_json(serde_json::json!({ "description": description }))?;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "Google Drive"
    }
}

/// Drive `q` expression for the tag database.
fn search_query(name: &str, parent: Option<&str>) -> String {
    let mut q = format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escape_query_value(name),
        DATABASE_MIME_TYPE
    );
    if let Some(parent) = parent {
        q.push_str(&format!(" and '{}' in parents", escape_query_value(parent)));
    }
    q
}

fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_body(metadata: &serde_json::Value, media_type: &str, media: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: {media_type}\r\n\r\n",
        b = MULTIPART_BOUNDARY,
        meta = metadata,
    )
    .into_bytes();
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

/// Total size from a `Content-Range: bytes 0-99/1234` header.
fn content_range_total(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

/// Last byte the server holds, from a `Range: bytes=0-524287` header.
fn received_range_end(header: &str) -> Option<u64> {
    header.rsplit_once('-')?.1.trim().parse().ok()
}

fn upload_content_range(offset: u64, len: u64, total: u64) -> String {
    if total == 0 {
        "bytes */0".to_string()
    } else {
        format!("bytes {}-{}/{}", offset, offset + len - 1, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query() {
        assert_eq!(
            search_query("tags.db", None),
            "name = 'tags.db' and mimeType = 'application/x-sqlite3' and trashed = false"
        );
        assert_eq!(
            search_query("tags.db", Some("FOLDER")),
            "name = 'tags.db' and mimeType = 'application/x-sqlite3' and trashed = false and 'FOLDER' in parents"
        );
    }

    #[test]
    fn test_query_escaping() {
        assert_eq!(escape_query_value("bob's.db"), "bob\\'s.db");
        assert_eq!(escape_query_value("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_content_range_parsing() {
        assert_eq!(content_range_total("bytes 0-99/1234"), Some(1234));
        assert_eq!(content_range_total("bytes */1234"), Some(1234));
        assert_eq!(content_range_total("bytes 0-99/*"), None);
        assert_eq!(received_range_end("bytes=0-524287"), Some(524287));
        assert_eq!(received_range_end("garbage"), None);
    }

    #[test]
    fn test_upload_content_range() {
        assert_eq!(upload_content_range(0, 0, 0), "bytes */0");
        assert_eq!(upload_content_range(0, 10, 25), "bytes 0-9/25");
        assert_eq!(upload_content_range(20, 5, 25), "bytes 20-24/25");
    }

    #[test]
    fn test_multipart_body_with_empty_media() {
        let metadata = serde_json::json!({ "name": "tags.db" });
        let body = String::from_utf8(multipart_body(&metadata, DATABASE_MIME_TYPE, &[])).unwrap();

        assert!(body.starts_with("--drivetag_part_boundary\r\nContent-Type: application/json"));
        assert!(body.contains(r#"{"name":"tags.db"}"#));
        assert!(body.contains("Content-Type: application/x-sqlite3\r\n\r\n\r\n--drivetag_part_boundary--"));
    }

    // Scripted Drive endpoints on a loopback port

    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    struct SeenRequest {
        method: String,
        url: String,
        range: Option<String>,
        content_range: Option<String>,
    }

    struct Reply {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: Vec<u8>,
    }

    impl Reply {
        fn new(status: u16) -> Self {
            Self {
                status,
                headers: Vec::new(),
                body: Vec::new(),
            }
        }

        fn header(mut self, name: &'static str, value: String) -> Self {
            self.headers.push((name, value));
            self
        }

        fn body(mut self, body: Vec<u8>) -> Self {
            self.body = body;
            self
        }
    }

    fn header_value(request: &tiny_http::Request, name: &'static str) -> Option<String> {
        request
            .headers()
            .iter()
            .find(|h| h.field.equiv(name))
            .map(|h| h.value.as_str().to_string())
    }

    /// Serve `handler` on 127.0.0.1, returning the base URL and the request log.
    fn serve<F>(handler: F) -> (String, Arc<Mutex<Vec<SeenRequest>>>)
    where
        F: Fn(&SeenRequest, Vec<u8>, &str) -> Reply + Send + 'static,
    {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let base = format!("http://{}", addr);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        let thread_base = base.clone();
        std::thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let mut body = Vec::new();
                let _ = request.as_reader().read_to_end(&mut body);
                let entry = SeenRequest {
                    method: request.method().to_string(),
                    url: request.url().to_string(),
                    range: header_value(&request, "Range"),
                    content_range: header_value(&request, "Content-Range"),
                };

                let reply = handler(&entry, body, &thread_base);
                log.lock().unwrap().push(entry);

                let mut response = tiny_http::Response::from_data(reply.body).with_status_code(reply.status);
                for (name, value) in reply.headers {
                    response.add_header(tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap());
                }
                let _ = request.respond(response);
            }
        });

        (base, seen)
    }

    fn client_for(base: &str, download_chunk_size: u64, upload_chunk_size: u64) -> DriveClient {
        let config = DriveConfig {
            api_base: format!("{}/drive/v3", base),
            upload_base: format!("{}/upload/drive/v3", base),
            download_chunk_size,
            upload_chunk_size,
            timeout_secs: 10,
            ..Default::default()
        };
        DriveClient::new(&config, TokenProvider::from_token("test-token"))
    }

    /// `bytes=a-b` or `bytes a-b/total` into `(a, b)`.
    fn byte_span(header: &str) -> (u64, u64) {
        let span = header
            .trim_start_matches("bytes=")
            .trim_start_matches("bytes ")
            .split('/')
            .next()
            .unwrap();
        let (start, end) = span.split_once('-').unwrap();
        (start.parse().unwrap(), end.parse().unwrap())
    }

    fn sample_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_download_in_ranged_chunks() {
        let data = sample_bytes(700_000);
        let served = data.clone();
        let (base, seen) = serve(move |request, _body, _base| {
            let (start, end) = byte_span(request.range.as_deref().unwrap());
            let end = end.min(served.len() as u64 - 1);
            Reply::new(206)
                .header(
                    "Content-Range",
                    format!("bytes {}-{}/{}", start, end, served.len()),
                )
                .body(served[start as usize..=end as usize].to_vec())
        });
        let client = client_for(&base, 300_000, 256 * 1024);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("mirror.db");

        let received = client.download("DB1", &dest).unwrap();

        assert_eq!(received, 700_000);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
        let seen = seen.lock().unwrap();
        let ranges: Vec<&str> = seen.iter().map(|r| r.range.as_deref().unwrap()).collect();
        assert_eq!(
            ranges,
            vec!["bytes=0-299999", "bytes=300000-599999", "bytes=600000-899999"]
        );
        assert!(seen.iter().all(|r| r.method == "GET"));
        assert!(seen[0].url.starts_with("/drive/v3/files/DB1?"));
        assert!(seen[0].url.contains("alt=media"));
    }

    #[test]
    fn test_download_empty_object() {
        let (base, seen) = serve(|_request, _body, _base| Reply::new(416));
        let client = client_for(&base, 300_000, 256 * 1024);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("mirror.db");
        std::fs::write(&dest, b"stale").unwrap();

        assert_eq!(client.download("DB1", &dest).unwrap(), 0);
        assert!(std::fs::read(&dest).unwrap().is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_download_missing_object() {
        let (base, _seen) = serve(|_request, _body, _base| {
            Reply::new(404).body(br#"{"error":{"code":404,"message":"File not found: DB1."}}"#.to_vec())
        });
        let client = client_for(&base, 300_000, 256 * 1024);
        let dir = tempfile::tempdir().unwrap();

        let result = client.download("DB1", &dir.path().join("mirror.db"));
        assert!(matches!(result, Err(DriveTagError::NotFound(ref m)) if m == "File not found: DB1."));
    }

    #[test]
    fn test_resumable_upload_in_chunks() {
        let data = sample_bytes(700_000);
        let stored = Arc::new(Mutex::new(Vec::new()));
        let sink = stored.clone();
        let (base, seen) = serve(move |request, body, base| match request.method.as_str() {
            "PATCH" => Reply::new(200).header("Location", format!("{}/upload-session/1", base)),
            "PUT" => {
                let header = request.content_range.as_deref().unwrap();
                let (_, end) = byte_span(header);
                let total: u64 = header.rsplit_once('/').unwrap().1.parse().unwrap();
                sink.lock().unwrap().extend_from_slice(&body);
                if end + 1 < total {
                    Reply::new(308).header("Range", format!("bytes=0-{}", end))
                } else {
                    Reply::new(200).body(br#"{"id":"DB1"}"#.to_vec())
                }
            }
            _ => Reply::new(405),
        });
        let client = client_for(&base, 300_000, 256 * 1024);
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("mirror.db");
        std::fs::write(&source, &data).unwrap();

        client.upload("DB1", &source).unwrap();

        assert_eq!(*stored.lock().unwrap(), data);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].method, "PATCH");
        assert!(seen[0].url.starts_with("/upload/drive/v3/files/DB1?"));
        assert!(seen[0].url.contains("uploadType=resumable"));
        let chunks: Vec<&str> = seen[1..]
            .iter()
            .map(|r| r.content_range.as_deref().unwrap())
            .collect();
        assert_eq!(
            chunks,
            vec![
                "bytes 0-262143/700000",
                "bytes 262144-524287/700000",
                "bytes 524288-699999/700000",
            ]
        );
        assert!(seen[1..].iter().all(|r| r.method == "PUT" && r.url == "/upload-session/1"));
    }

    #[test]
    fn test_empty_upload_not_finalized_is_an_error() {
        let (base, seen) = serve(|request, _body, base| match request.method.as_str() {
            "PATCH" => Reply::new(200).header("Location", format!("{}/upload-session/1", base)),
            _ => Reply::new(308),
        });
        let client = client_for(&base, 300_000, 256 * 1024);
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("mirror.db");
        std::fs::write(&source, b"").unwrap();

        let result = client.upload("DB1", &source);

        assert!(matches!(result, Err(DriveTagError::Remote { status: 308, .. })));
        let seen = seen.lock().unwrap();
        let puts: Vec<&SeenRequest> = seen.iter().filter(|r| r.method == "PUT").collect();
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].content_range.as_deref(), Some("bytes */0"));
    }

    #[test]
    fn test_empty_upload() {
        let (base, _seen) = serve(|request, _body, base| match request.method.as_str() {
            "PATCH" => Reply::new(200).header("Location", format!("{}/upload-session/1", base)),
            _ => Reply::new(200).body(br#"{"id":"DB1"}"#.to_vec()),
        });
        let client = client_for(&base, 300_000, 256 * 1024);
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("mirror.db");
        std::fs::write(&source, b"").unwrap();

        client.upload("DB1", &source).unwrap();
    }
}
