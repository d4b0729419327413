use multiup_hosts::{BodyFormat, HostDescriptor};
use tracing::debug;

use crate::core::{classify_status, error_message};
use crate::data::{CachedToken, HttpRequest, HttpResponse};
use crate::effects::http::HttpTransport;
use crate::error::{ErrorKind, Result, UploadError};

/// Exchange a username and password for a bearer token.
pub(super) async fn login<T: HttpTransport>(
    transport: &T,
    host: &HostDescriptor,
    username: &str,
    password: &str,
) -> Result<CachedToken> {
    let url = host
        .endpoints
        .login
        .as_deref()
        .ok_or_else(|| UploadError::Validation(format!("{} has no login endpoint", host.id)))?;

    let mut request = HttpRequest::post(url);
    if host.init_format == BodyFormat::Json {
        request = request.json();
    }
    let request = request
        .field(&host.fields.username, username)
        .field(&host.fields.password, password);

    let response = transport.send(request).await?;
    reject_failed_login(host, &response)?;

    let token = host
        .rules
        .token
        .as_ref()
        .and_then(|rule| rule.extract(&response.body))
        .ok_or_else(|| login_error(host, &response, "login response carried no token"))?;

    let ttl = host
        .rules
        .token_ttl
        .as_ref()
        .and_then(|rule| rule.extract(&response.body))
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(host.token_ttl);

    debug!(host = %host.id, ttl, "token login succeeded");
    Ok(CachedToken::new(host.id.clone(), token, ttl))
}

/// Server faults stay retryable; every other failed status is a rejected login.
pub(super) fn reject_failed_login(host: &HostDescriptor, response: &HttpResponse) -> Result<()> {
    match classify_status(response.status) {
        None => Ok(()),
        Some(ErrorKind::Server) => Err(UploadError::Server {
            status: response.status,
            message: error_message(host, response),
            body: response.body.clone(),
        }),
        Some(_) => Err(login_error(host, response, &error_message(host, response))),
    }
}

pub(super) fn login_error(host: &HostDescriptor, response: &HttpResponse, message: &str) -> UploadError {
    UploadError::Authentication {
        message: format!("{} login failed: {message}", host.id),
        status: Some(response.status),
        body: Some(response.body.clone()),
    }
}
