#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use multiup_hosts::HostRegistry;
use multiup_upload::{
    CancelFlag, EngineConfig, FileUpload, GalleryFile, HostSettings, HttpRequest, HttpResponse,
    HttpTransport, Method, ProgressSink, RequestBody, TokenStore, TransportError,
    TransportErrorKind, UploadEngine,
};
use tempfile::TempDir;

pub const TEST_HOSTS: &str = r#"
[hosts.plain]
auth_kind = "api_key"
protocol = "single_step"
api_key_header = "X-Key"
max_file_size = 4096
stale_auth_patterns = ["key expired"]
endpoints.upload = "https://plain.test/upload"
rules.download_url = { json = "/url" }
rules.error = { json = "/error" }

[hosts.gal]
auth_kind = "api_key"
protocol = "single_step"
api_key_header = "X-Key"
supports_gallery = true
endpoints.upload = "https://gal.test/upload"
endpoints.gallery_create = "https://gal.test/create"
fields.gallery_id = "gallery_id"
fields.gallery_name = "gallery_name"
rules.download_url = { json = "/url" }
rules.gallery_id = { json = "/gallery_id" }

[hosts.mgal]
auth_kind = "api_key"
protocol = "multi_step"
api_key_header = "X-Key"
supports_gallery = true
endpoints.init = "https://mgal.test/init"
endpoints.gallery_create = "https://mgal.test/init"
fields.gallery_id = "gallery_id"
fields.gallery_name = "gallery_name"
rules.upload_url = { json = "/upload_url" }
rules.dedupe_url = { json = "/existing" }
rules.download_url = { json = "/url" }
rules.gallery_id = { json = "/gallery_id" }

[hosts.tokup]
auth_kind = "token_login"
protocol = "single_step"
token_ttl = 3600
stale_auth_patterns = ["invalid token"]
endpoints.login = "https://tokup.test/login"
endpoints.upload = "https://tokup.test/upload"
fields.token = "token"
rules.token = { json = "/token" }
rules.download_url = { json = "/url" }
rules.error = { json = "/error" }

[hosts.poll]
auth_kind = "token_login"
protocol = "multi_step_with_polling"
token_ttl = 3600
send_hash = true
verifies_hash = true
endpoints.login = "https://poll.test/login"
endpoints.init = "https://poll.test/init"
endpoints.poll = "https://poll.test/status/{upload_id}"
fields.token = "token"
rules.token = { json = "/token" }
rules.upload_url = { json = "/upload_url" }
rules.upload_id = { json = "/upload_id" }
rules.dedupe_url = { json = "/existing" }
rules.poll_status = { json = "/state" }
rules.poll_done = ["done"]
rules.poll_failed = ["failed"]
rules.download_url = { json = "/url" }
rules.remote_hash = { json = "/sha256" }
poll.interval_ms = 5
poll.max_attempts = 3

[hosts.sess]
auth_kind = "session_login"
protocol = "single_step"
token_ttl = 3600
session_cookie = "xfss"
endpoints.login_page = "https://sess.test/login.html"
endpoints.login = "https://sess.test/login"
endpoints.upload_page = "https://sess.test/upload_form"
endpoints.upload = "https://sess.test/upload"
fields.username = "login"
fields.captcha = "code"
fields.session_id = "sess_id"
rules.session_id = { pattern = 'name="sess_id"\s+value="([^"]+)"' }
rules.download_url = { json = "/url" }
"#;

/// One request the mock saw.
#[derive(Debug, Clone)]
pub struct Call {
    pub upload: bool,
    pub method: Method,
    pub url: String,
    /// URL, parameter values and file name joined by spaces; what routes match on.
    pub key: String,
    pub headers: Vec<(String, String)>,
    pub fields: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

impl Call {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .chain(self.query.iter())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

enum Reply {
    Respond(HttpResponse),
    Fail(TransportErrorKind),
}

struct Route {
    fragment: String,
    queued: VecDeque<Reply>,
    fallback: Option<HttpResponse>,
}

/// Scripted in-process transport.
///
/// Routes match when their fragment occurs in a request's key. Queued
/// replies are used first, in order; after that the route's standing reply,
/// if any. Unmatched requests get a 404.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<Call>>,
    cancel_on_upload: Mutex<Option<CancelFlag>>,
    latency: Duration,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Standing reply for every request matching `fragment`.
    pub fn always(&self, fragment: &str, status: u16, body: &str) -> &Self {
        self.always_with(fragment, HttpResponse::new(status, body))
    }

    pub fn always_with(&self, fragment: &str, response: HttpResponse) -> &Self {
        self.route(fragment, |route| route.fallback = Some(response));
        self
    }

    /// One-shot reply, used before any standing reply.
    pub fn once(&self, fragment: &str, status: u16, body: &str) -> &Self {
        self.once_with(fragment, HttpResponse::new(status, body))
    }

    pub fn once_with(&self, fragment: &str, response: HttpResponse) -> &Self {
        self.route(fragment, |route| route.queued.push_back(Reply::Respond(response)));
        self
    }

    /// One-shot transport failure.
    pub fn fail_once(&self, fragment: &str, kind: TransportErrorKind) -> &Self {
        self.route(fragment, |route| route.queued.push_back(Reply::Fail(kind)));
        self
    }

    /// Set `flag` halfway through the next upload.
    pub fn cancel_during_upload(&self, flag: CancelFlag) {
        *self.cancel_on_upload.lock().unwrap() = Some(flag);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, fragment: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.key.contains(fragment))
            .count()
    }

    fn route(&self, fragment: &str, edit: impl FnOnce(&mut Route)) {
        let mut routes = self.routes.lock().unwrap();
        let idx = match routes.iter().position(|r| r.fragment == fragment) {
            Some(idx) => idx,
            None => {
                routes.push(Route {
                    fragment: fragment.to_string(),
                    queued: VecDeque::new(),
                    fallback: None,
                });
                routes.len() - 1
            }
        };
        edit(&mut routes[idx]);
    }

    fn reply(&self, key: &str) -> Result<HttpResponse, TransportError> {
        let mut routes = self.routes.lock().unwrap();
        for route in routes.iter_mut().filter(|r| key.contains(&r.fragment)) {
            if let Some(reply) = route.queued.pop_front() {
                return match reply {
                    Reply::Respond(response) => Ok(response),
                    Reply::Fail(kind) => Err(TransportError::new(kind, "scripted failure")),
                };
            }
            if let Some(response) = &route.fallback {
                return Ok(response.clone());
            }
        }
        Ok(HttpResponse::new(404, format!("no route for {key}")))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn body_fields(body: &RequestBody) -> Vec<(String, String)> {
    match body {
        RequestBody::Empty => Vec::new(),
        RequestBody::Form(pairs) => pairs.clone(),
        RequestBody::Json(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())))
            .collect(),
    }
}

fn key_of(url: &str, query: &[(String, String)], fields: &[(String, String)], file: Option<&str>) -> String {
    let mut parts = vec![url.to_string()];
    parts.extend(query.iter().map(|(_, v)| v.clone()));
    parts.extend(fields.iter().map(|(_, v)| v.clone()));
    parts.extend(file.map(str::to_string));
    parts.join(" ")
}

impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let fields = body_fields(&request.body);
        let key = key_of(&request.url, &request.query, &fields, None);
        self.record(Call {
            upload: false,
            method: request.method,
            url: request.url.clone(),
            key: key.clone(),
            headers: request.headers.clone(),
            fields,
            query: request.query.clone(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.reply(&key)
    }

    async fn upload(&self, upload: FileUpload, sink: ProgressSink) -> Result<HttpResponse, TransportError> {
        let key = key_of(&upload.url, &upload.query, &upload.fields, Some(&upload.file_name));
        self.record(Call {
            upload: true,
            method: Method::Post,
            url: upload.url.clone(),
            key: key.clone(),
            headers: upload.headers.clone(),
            fields: upload.fields.clone(),
            query: upload.query.clone(),
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        sink.report(upload.size / 2)?;
        if let Some(flag) = self.cancel_on_upload.lock().unwrap().take() {
            flag.cancel();
        }
        sink.report(upload.size)?;
        self.reply(&key)
    }
}

pub fn registry() -> Arc<HostRegistry> {
    let registry = HostRegistry::from_toml_str(TEST_HOSTS).unwrap();
    assert!(registry.rejected().is_empty(), "{:?}", registry.rejected());
    Arc::new(registry)
}

/// Credentials for every test host, fast backoff.
pub fn config() -> EngineConfig {
    EngineConfig::default()
        .retry_backoff(Duration::from_millis(1))
        .progress_interval(Duration::ZERO)
        .host("plain", HostSettings::with_api_key("plain-key"))
        .host("gal", HostSettings::with_api_key("gal-key"))
        .host("mgal", HostSettings::with_api_key("mgal-key"))
        .host("tokup", HostSettings::with_login("user", "pass"))
        .host("poll", HostSettings::with_login("user", "pass"))
        .host("sess", HostSettings::with_login("user", "pass"))
}

pub fn engine(mock: &Arc<MockTransport>, config: EngineConfig) -> UploadEngine<MockTransport> {
    UploadEngine::new(
        registry(),
        config,
        Arc::clone(mock),
        Arc::new(TokenStore::temporary().unwrap()),
    )
}

/// Write `names` into a fresh directory, 1000 bytes each.
pub fn gallery(names: &[&str]) -> (TempDir, Vec<GalleryFile>) {
    let dir = tempfile::tempdir().unwrap();
    let files = names.iter().map(|name| write_file(dir.path(), name, 1000)).collect();
    (dir, files)
}

pub fn write_file(dir: &Path, name: &str, size: usize) -> GalleryFile {
    let path = dir.join(name);
    std::fs::write(&path, vec![b'x'; size]).unwrap();
    GalleryFile::new(path, size as u64)
}

pub fn link(name: &str) -> String {
    format!(r#"{{"url":"https://dl.test/{name}"}}"#)
}
