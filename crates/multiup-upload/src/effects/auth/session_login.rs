use std::collections::BTreeMap;

use multiup_hosts::HostDescriptor;
use tracing::debug;

use super::token_login::{login_error, reject_failed_login};
use crate::core::{hidden_fields, solve_positional_captcha};
use crate::data::{CachedToken, HttpRequest, SessionBundle};
use crate::effects::http::HttpTransport;
use crate::error::{Result, UploadError};

/// Form login: fetch the login page, answer its CAPTCHA if it has one, post
/// the credentials, then scrape the session id from the upload page.
pub(super) async fn login<T: HttpTransport>(
    transport: &T,
    host: &HostDescriptor,
    username: &str,
    password: &str,
) -> Result<CachedToken> {
    let endpoint = |url: &Option<String>, what: &str| {
        url.clone()
            .ok_or_else(|| UploadError::Validation(format!("{} has no {what} endpoint", host.id)))
    };
    let login_page = endpoint(&host.endpoints.login_page, "login page")?;
    let login_url = endpoint(&host.endpoints.login, "login")?;
    let upload_page = endpoint(&host.endpoints.upload_page, "upload page")?;

    let page = transport.send(HttpRequest::get(login_page)).await?;
    reject_failed_login(host, &page)?;
    let mut cookies: BTreeMap<String, String> = page.cookies.clone();

    let mut request = HttpRequest::post(login_url).fields(hidden_fields(&page.body));
    if let Some(code) = solve_positional_captcha(&page.body) {
        let field = host.fields.captcha.as_ref().ok_or_else(|| {
            login_error(host, &page, "login page shows a CAPTCHA but no CAPTCHA field is configured")
        })?;
        debug!(host = %host.id, "answering login CAPTCHA");
        request = request.field(field, code);
    }
    request = request
        .field(&host.fields.username, username)
        .field(&host.fields.password, password);
    if !cookies.is_empty() {
        request = request.header("Cookie", cookie_header(&cookies));
    }

    let response = transport.send(request).await?;
    reject_failed_login(host, &response)?;
    cookies.extend(response.cookies.clone());

    if host
        .session_cookie
        .as_ref()
        .is_some_and(|name| !cookies.contains_key(name))
    {
        return Err(login_error(host, &response, "credentials or CAPTCHA were not accepted"));
    }

    let mut request = HttpRequest::get(upload_page);
    if !cookies.is_empty() {
        request = request.header("Cookie", cookie_header(&cookies));
    }
    let page = transport.send(request).await?;
    reject_failed_login(host, &page)?;
    cookies.extend(page.cookies.clone());

    let session_id = host
        .rules
        .session_id
        .as_ref()
        .and_then(|rule| rule.extract(&page.body))
        .ok_or_else(|| login_error(host, &page, "upload page carried no session id"))?;

    let session = SessionBundle {
        cookies,
        session_id,
        form: hidden_fields(&page.body).into_iter().collect(),
    };
    let value = serde_json::to_string(&session)
        .map_err(|e| UploadError::Validation(format!("cannot encode session for {}: {e}", host.id)))?;

    debug!(host = %host.id, "session login succeeded");
    Ok(CachedToken::new(host.id.clone(), value, host.token_ttl))
}

fn cookie_header(cookies: &BTreeMap<String, String>) -> String {
    cookies
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}
