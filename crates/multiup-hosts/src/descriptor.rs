use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::rule::ResponseRule;

/// How a host authenticates upload requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    /// A static key sent with every request. No network login.
    ApiKey,
    /// Username/password exchanged for a temporary token with a TTL.
    TokenLogin,
    /// Username/password form login producing session cookies and a
    /// session id scraped from the upload page.
    SessionLogin,
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthKind::ApiKey => write!(f, "api-key"),
            AuthKind::TokenLogin => write!(f, "token-login"),
            AuthKind::SessionLogin => write!(f, "session-login"),
        }
    }
}

/// Shape of the upload conversation with a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolShape {
    /// One multipart request carries the file and answers with the link.
    SingleStep,
    /// `init` → `transfer` → link parsed from the transfer response.
    MultiStep,
    /// As [`ProtocolShape::MultiStep`], then poll until the host reports completion.
    MultiStepWithPolling,
}

impl fmt::Display for ProtocolShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolShape::SingleStep => write!(f, "single-step"),
            ProtocolShape::MultiStep => write!(f, "multi-step"),
            ProtocolShape::MultiStepWithPolling => write!(f, "multi-step+poll"),
        }
    }
}

/// Encoding of non-file request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyFormat {
    #[default]
    Form,
    Json,
}

/// URL templates for every step a host may need.
///
/// Templates may contain `{upload_id}`, `{gallery_id}` and `{session_id}`
/// placeholders; everything else is passed as query or form fields.
#[derive(Debug, Clone, Default)]
pub struct Endpoints {
    pub upload: Option<String>,
    pub gallery_create: Option<String>,
    pub login: Option<String>,
    pub login_page: Option<String>,
    pub upload_page: Option<String>,
    pub init: Option<String>,
    pub poll: Option<String>,
}

/// Names of the request fields a host expects.
#[derive(Debug, Clone)]
pub struct FormFields {
    pub file: String,
    pub username: String,
    pub password: String,
    pub api_key: Option<String>,
    pub token: Option<String>,
    pub session_id: Option<String>,
    pub captcha: Option<String>,
    pub gallery_id: Option<String>,
    pub gallery_name: Option<String>,
    pub file_name: String,
    pub file_size: String,
    pub file_hash: String,
    pub upload_id: String,
    /// Static fields sent with every upload request.
    pub extra: BTreeMap<String, String>,
}

impl Default for FormFields {
    fn default() -> Self {
        Self {
            file: "file".into(),
            username: "username".into(),
            password: "password".into(),
            api_key: None,
            token: None,
            session_id: None,
            captcha: None,
            gallery_id: None,
            gallery_name: None,
            file_name: "name".into(),
            file_size: "size".into(),
            file_hash: "hash".into(),
            upload_id: "upload_id".into(),
            extra: BTreeMap::new(),
        }
    }
}

/// Rules for pulling values out of host responses.
#[derive(Debug, Clone)]
pub struct ResponseRules {
    pub download_url: ResponseRule,
    /// Format applied to the extracted download value, with `{value}` as placeholder.
    pub download_url_format: Option<String>,
    pub file_id: Option<ResponseRule>,
    pub error: Option<ResponseRule>,
    pub token: Option<ResponseRule>,
    pub token_ttl: Option<ResponseRule>,
    pub session_id: Option<ResponseRule>,
    pub upload_url: Option<ResponseRule>,
    pub upload_id: Option<ResponseRule>,
    pub transfer_fields: Option<ResponseRule>,
    pub dedupe_url: Option<ResponseRule>,
    pub poll_status: Option<ResponseRule>,
    pub poll_done: Vec<String>,
    pub poll_failed: Vec<String>,
    pub gallery_id: Option<ResponseRule>,
    pub remote_hash: Option<ResponseRule>,
}

impl ResponseRules {
    /// Extract the download link, applying [`ResponseRules::download_url_format`].
    pub fn download_url(&self, body: &str) -> Option<String> {
        let value = self.download_url.extract(body)?;
        Some(match &self.download_url_format {
            Some(format) => format.replace("{value}", &value),
            None => value,
        })
    }
}

/// Poll cadence for [`ProtocolShape::MultiStepWithPolling`] hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 30,
        }
    }
}

/// Immutable description of one file-hosting service.
#[derive(Debug, Clone)]
pub struct HostDescriptor {
    pub id: String,
    pub display_name: String,
    pub auth_kind: AuthKind,
    pub protocol: ProtocolShape,
    pub enabled: bool,
    /// Largest accepted file in bytes. `0` means unlimited.
    pub max_file_size: u64,
    pub max_connections_global_hint: u32,
    pub max_connections_per_host: u32,
    /// Default token lifetime in seconds. `0` means the token never expires.
    pub token_ttl: u64,
    pub endpoints: Endpoints,
    pub fields: FormFields,
    pub rules: ResponseRules,
    pub stale_auth_patterns: Vec<Regex>,
    pub poll: PollSettings,
    pub api_key_header: Option<String>,
    /// Cookie whose presence proves a session login succeeded.
    pub session_cookie: Option<String>,
    pub init_format: BodyFormat,
    pub send_hash: bool,
    pub verifies_hash: bool,
    pub supports_gallery: bool,
}

impl HostDescriptor {
    /// Whether a file of `size` bytes is within this host's limit.
    pub fn accepts_size(&self, size: u64) -> bool {
        self.max_file_size == 0 || size <= self.max_file_size
    }

    /// Whether `body` contains any of the host's stale-authentication markers.
    pub fn matches_stale_auth(&self, body: &str) -> bool {
        self.stale_auth_patterns.iter().any(|p| p.is_match(body))
    }
}

/// Fill `{name}` placeholders in an endpoint template.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{name}}}"), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_template_replaces_every_placeholder() {
        let url = render_template(
            "https://h/{upload_id}/status?g={gallery_id}&again={upload_id}",
            &[("upload_id", "u1"), ("gallery_id", "g9")],
        );
        assert_eq!(url, "https://h/u1/status?g=g9&again=u1");
    }

    #[test]
    fn render_template_leaves_unknown_placeholders() {
        assert_eq!(render_template("https://h/{x}", &[]), "https://h/{x}");
    }

    #[test]
    fn display_names_are_kebab_case() {
        assert_eq!(AuthKind::SessionLogin.to_string(), "session-login");
        assert_eq!(ProtocolShape::MultiStepWithPolling.to_string(), "multi-step+poll");
    }
}
