//! Stand-ins for pg_dump, the object store and the volume host.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;

use crate::backup::s3_upload::ObjectStore;
use crate::errors::{BackupError, Result};

/// Writes an executable shell script named `pg_dump` into `dir`.
///
/// Tests that execute these scripts run `#[serial]`: a concurrent fork can
/// inherit the script's write handle and make exec fail with ETXTBSY.
#[cfg(unix)]
pub fn write_fake_pg_dump(dir: &Path, body: &str) -> PathBuf {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("pg_dump");
    {
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh\n{}", body).unwrap();
        file.sync_all().unwrap();
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUpload {
    pub key: String,
    pub local_path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Keeps every uploaded object in memory. Keys containing a `reject` fragment fail.
#[derive(Default)]
pub struct RecordingStore {
    uploads: Mutex<Vec<RecordedUpload>>,
    reject: Vec<String>,
    remove_local_files: bool,
}

impl RecordingStore {
    pub fn rejecting(key_fragment: &str) -> Self {
        RecordingStore {
            reject: vec![key_fragment.to_string()],
            ..Default::default()
        }
    }

    /// Deletes each local file after reading it, so the later cleanup step finds nothing.
    pub fn removing_local_files() -> Self {
        RecordingStore {
            remove_local_files: true,
            ..Default::default()
        }
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

impl ObjectStore for RecordingStore {
    fn bucket(&self) -> &str {
        "test-bucket"
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        let failed = |reason: String| BackupError::UploadFailed {
            bucket: self.bucket().to_string(),
            key: key.to_string(),
            reason,
        };
        if self.reject.iter().any(|fragment| key.contains(fragment.as_str())) {
            return Err(failed("AccessDenied".to_string()));
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if self.remove_local_files {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| failed(e.to_string()))?;
        }
        self.uploads.lock().unwrap().push(RecordedUpload {
            key: key.to_string(),
            local_path: path.to_path_buf(),
            bytes,
        });
        Ok(())
    }
}

/// Local axum server answering every request with the same status and body.
pub struct TestHttpServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

#[derive(Clone)]
struct ServerState {
    status: StatusCode,
    body: Arc<Vec<u8>>,
    declared_length: Option<u64>,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestHttpServer {
    pub async fn start(status: u16, body: Vec<u8>) -> Self {
        Self::serve(status, body, None).await
    }

    /// Announces `declared_length` bytes but sends only `body`, then drops the connection.
    pub async fn truncated(declared_length: u64, body: Vec<u8>) -> Self {
        Self::serve(200, body, Some(declared_length)).await
    }

    async fn serve(status: u16, body: Vec<u8>, declared_length: Option<u64>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let state = ServerState {
            status: StatusCode::from_u16(status).unwrap(),
            body: Arc::new(body),
            declared_length,
            hits: hits.clone(),
            requests: requests.clone(),
        };
        let app = Router::new().fallback(respond).with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestHttpServer { addr, hits, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Number of requests handled.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Method and path of each request, e.g. `GET /volume.zip`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn respond(State(state): State<ServerState>, method: Method, uri: Uri, _body: Bytes) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.requests.lock().unwrap().push(format!("{} {}", method, uri));

    let body = Bytes::from(state.body.as_ref().clone());
    match state.declared_length {
        None => (state.status, body).into_response(),
        Some(length) => {
            // A streamed body has no known size, so hyper frames it by the
            // header and closes the connection when the stream ends early.
            let stream = futures::stream::iter([Ok::<_, std::io::Error>(body)]);
            let mut response = (state.status, Body::from_stream(stream)).into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            response
        }
    }
}
