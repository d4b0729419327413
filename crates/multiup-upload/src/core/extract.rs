use multiup_hosts::HostDescriptor;

use crate::data::HttpResponse;
use crate::error::{ErrorKind, UploadError};

const MAX_MESSAGE_LEN: usize = 200;

/// Classify an HTTP status. `None` for success and redirects.
pub fn classify_status(status: u16) -> Option<ErrorKind> {
    match status {
        200..=399 => None,
        401 | 403 => Some(ErrorKind::Authentication),
        400..=499 => Some(ErrorKind::Client),
        _ => Some(ErrorKind::Server),
    }
}

/// Whether an error response says the cached authentication went stale.
pub fn looks_like_stale_auth(host: &HostDescriptor, body: Option<&str>, status: Option<u16>) -> bool {
    matches!(status, Some(401 | 403)) || body.is_some_and(|b| host.matches_stale_auth(b))
}

/// Human-readable message for a failed response: the host's error rule if it
/// matches, otherwise the start of the body.
pub fn error_message(host: &HostDescriptor, response: &HttpResponse) -> String {
    host.rules
        .error
        .as_ref()
        .and_then(|rule| rule.extract(&response.body))
        .unwrap_or_else(|| truncate(&response.body))
}

/// Turn a response into an error if its status says it failed.
pub fn check_status(host: &HostDescriptor, response: &HttpResponse) -> Result<(), UploadError> {
    match classify_status(response.status) {
        None => Ok(()),
        Some(kind) => Err(response_error(host, response, kind)),
    }
}

/// Error for a successful-status response that lacks a value we need.
pub fn missing_value(host: &HostDescriptor, response: &HttpResponse, what: &str) -> UploadError {
    let detail = error_message(host, response);
    UploadError::Client {
        status: response.status,
        message: format!("{} response has no {what}: {detail}", host.id),
        body: response.body.clone(),
    }
}

fn response_error(host: &HostDescriptor, response: &HttpResponse, kind: ErrorKind) -> UploadError {
    let message = error_message(host, response);
    match kind {
        ErrorKind::Authentication => UploadError::Authentication {
            message,
            status: Some(response.status),
            body: Some(response.body.clone()),
        },
        ErrorKind::Server => UploadError::Server {
            status: response.status,
            message,
            body: response.body.clone(),
        },
        _ => UploadError::Client {
            status: response.status,
            message,
            body: response.body.clone(),
        },
    }
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "empty response".to_string();
    }
    match body.char_indices().nth(MAX_MESSAGE_LEN) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiup_hosts::HostRegistry;

    fn host() -> HostDescriptor {
        HostRegistry::builtin().unwrap().get("rapidgator").unwrap().clone()
    }

    #[test]
    fn statuses_map_to_kinds() {
        assert_eq!(classify_status(200), None);
        assert_eq!(classify_status(302), None);
        assert_eq!(classify_status(401), Some(ErrorKind::Authentication));
        assert_eq!(classify_status(403), Some(ErrorKind::Authentication));
        assert_eq!(classify_status(404), Some(ErrorKind::Client));
        assert_eq!(classify_status(503), Some(ErrorKind::Server));
    }

    #[test]
    fn stale_auth_from_status_or_pattern() {
        let h = host();
        assert!(looks_like_stale_auth(&h, None, Some(401)));
        assert!(looks_like_stale_auth(&h, Some(r#"{"details":"Invalid token"}"#), Some(200)));
        assert!(!looks_like_stale_auth(&h, Some("quota exceeded"), Some(400)));
        assert!(!looks_like_stale_auth(&h, None, None));
    }

    #[test]
    fn error_rule_supplies_message() {
        let h = host();
        let resp = HttpResponse::new(500, r#"{"status":500,"details":"storage offline"}"#);
        let err = check_status(&h, &resp).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(err.to_string().contains("storage offline"), "{err}");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let h = host();
        let resp = HttpResponse::new(400, "x".repeat(1000));
        let err = check_status(&h, &resp).unwrap_err();
        assert!(err.to_string().len() < 400);
        assert_eq!(err.body().map(str::len), Some(1000));
    }
}
