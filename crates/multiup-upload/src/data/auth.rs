use std::collections::BTreeMap;

use multiup_hosts::HostDescriptor;
use serde::{Deserialize, Serialize};

use crate::data::credential::Secret;
use crate::data::request::{HttpRequest, Method};

/// Cookies and session id captured by a form login.
///
/// Stored JSON-encoded as the value of a [`CachedToken`](crate::CachedToken).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBundle {
    pub cookies: BTreeMap<String, String>,
    pub session_id: String,
    /// Hidden fields scraped from the upload page, sent with every upload.
    #[serde(default)]
    pub form: BTreeMap<String, String>,
}

impl SessionBundle {
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMaterial {
    ApiKey(Secret),
    Bearer(Secret),
    Session(SessionBundle),
}

/// Read-only authentication bundle for one host, ready to attach to requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub host_id: String,
    pub material: AuthMaterial,
}

impl AuthContext {
    pub fn new(host_id: impl Into<String>, material: AuthMaterial) -> Self {
        Self {
            host_id: host_id.into(),
            material,
        }
    }

    /// Attach this context to `request` the way `host` expects it.
    ///
    /// API keys go into the configured header and/or field. Bearer tokens go
    /// into the token field when the host names one, otherwise into an
    /// `Authorization` header. Sessions send their cookies and session id.
    pub fn apply(&self, host: &HostDescriptor, request: HttpRequest) -> HttpRequest {
        match &self.material {
            AuthMaterial::ApiKey(key) => {
                let mut request = request;
                if let Some(header) = &host.api_key_header {
                    request = request.header(header, key.expose());
                }
                if let Some(field) = &host.fields.api_key {
                    request = request.field(field, key.expose());
                }
                request
            }
            AuthMaterial::Bearer(token) => match &host.fields.token {
                Some(field) => request.query(field, token.expose()),
                None => request.header("Authorization", format!("Bearer {}", token.expose())),
            },
            AuthMaterial::Session(session) => {
                let mut request = request;
                if !session.cookies.is_empty() {
                    request = request.header("Cookie", session.cookie_header());
                }
                if let Some(field) = &host.fields.session_id {
                    request = request.field(field, &session.session_id);
                }
                if request.method == Method::Post {
                    let extra = session
                        .form
                        .iter()
                        .filter(|(k, _)| request.field_value(k).is_none())
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect::<Vec<_>>();
                    request = request.fields(extra);
                }
                request
            }
        }
    }
}
