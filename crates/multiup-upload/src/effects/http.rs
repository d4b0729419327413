use std::future::Future;

use crate::data::{FileUpload, HttpRequest, HttpResponse};
use crate::effects::sink::ProgressSink;
use crate::error::TransportError;

/// The HTTP seam every host conversation goes through.
///
/// Implementations follow redirects themselves and return the final
/// response with every cookie set along the way. Non-2xx statuses are
/// responses, not errors; only transport faults are errors.
pub trait HttpTransport: Send + Sync + 'static {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;

    /// Stream a file as a multipart upload.
    ///
    /// The implementation must call [`ProgressSink::report`] with the
    /// cumulative byte count as chunks go out, and abort with the error it
    /// returns once cancellation is requested.
    fn upload(
        &self,
        upload: FileUpload,
        sink: ProgressSink,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// Parse `Set-Cookie` header values into name/value pairs, ignoring attributes.
pub fn parse_set_cookie<'a>(headers: impl IntoIterator<Item = &'a str>) -> Vec<(String, String)> {
    headers
        .into_iter()
        .filter_map(|raw| {
            let pair = raw.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(feature = "reqwest")]
mod reqwest_transport {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use bytes::Bytes;
    use futures_util::stream;
    use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
    use reqwest::multipart::{Form, Part};
    use reqwest::{Body, Client, StatusCode, redirect};
    use tokio::io::AsyncReadExt;
    use tracing::debug;

    use super::*;
    use crate::data::{Method, RequestBody};
    use crate::error::TransportErrorKind;

    const MAX_REDIRECTS: usize = 10;
    const CHUNK_SIZE: usize = 64 * 1024;
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
    /// Longest a connection may go without delivering a byte.
    const STALL_TIMEOUT: Duration = Duration::from_secs(120);
    const UPLOAD_TIMEOUT_FLOOR: Duration = Duration::from_secs(300);
    /// Slowest upload rate tolerated before an upload counts as hung.
    const MIN_UPLOAD_BYTES_PER_SEC: u64 = 16 * 1024;

    /// Whole-request budget for uploading `size` bytes.
    fn upload_timeout(size: u64) -> Duration {
        UPLOAD_TIMEOUT_FLOOR + Duration::from_secs(size / MIN_UPLOAD_BYTES_PER_SEC)
    }

    /// [`HttpTransport`] backed by `reqwest`.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: Client,
    }

    impl ReqwestTransport {
        pub fn new() -> Result<Self, TransportError> {
            let client = Client::builder()
                .redirect(redirect::Policy::none())
                .connect_timeout(CONNECT_TIMEOUT)
                .read_timeout(STALL_TIMEOUT)
                .user_agent(concat!("multiup/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(map_error)?;
            Ok(Self { client })
        }

        /// Wrap an existing client. It should not follow redirects on its own,
        /// or cookies set along a redirect chain are lost.
        pub fn with_client(client: Client) -> Self {
            Self { client }
        }

        fn build(&self, request: &HttpRequest, cookies: &BTreeMap<String, String>) -> reqwest::RequestBuilder {
            let mut builder = match request.method {
                Method::Get => self.client.get(&request.url),
                Method::Post => self.client.post(&request.url),
            };
            builder = builder.query(&request.query).timeout(REQUEST_TIMEOUT);
            for (name, value) in request.headers.iter().filter(|(n, _)| !n.eq_ignore_ascii_case("cookie")) {
                builder = builder.header(name, value);
            }
            if let Some(cookie) = merged_cookie_header(request, cookies) {
                builder = builder.header(COOKIE, cookie);
            }
            match &request.body {
                RequestBody::Empty => builder,
                RequestBody::Form(pairs) => builder.form(pairs),
                RequestBody::Json(map) => builder.json(map),
            }
        }
    }

    fn merged_cookie_header(request: &HttpRequest, cookies: &BTreeMap<String, String>) -> Option<String> {
        let mut all: BTreeMap<String, String> = request
            .header_value("Cookie")
            .map(|h| parse_set_cookie(h.split(';').map(str::trim).collect::<Vec<_>>()))
            .unwrap_or_default()
            .into_iter()
            .collect();
        all.extend(cookies.iter().map(|(k, v)| (k.clone(), v.clone())));
        if all.is_empty() {
            return None;
        }
        Some(
            all.iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn collect_cookies(response: &reqwest::Response, jar: &mut BTreeMap<String, String>) {
        let raw = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok());
        jar.extend(parse_set_cookie(raw));
    }

    fn map_error(e: reqwest::Error) -> TransportError {
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_connect() {
            TransportErrorKind::Connect
        } else {
            TransportErrorKind::Request
        };
        TransportError::new(kind, e.to_string())
    }

    async fn finish(response: reqwest::Response, cookies: BTreeMap<String, String>) -> Result<HttpResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_error)?;
        Ok(HttpResponse {
            status,
            body,
            cookies,
        })
    }

    impl HttpTransport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let mut request = request;
            let mut cookies = BTreeMap::new();

            for _ in 0..=MAX_REDIRECTS {
                let response = self.build(&request, &cookies).send().await.map_err(map_error)?;
                collect_cookies(&response, &mut cookies);

                if !response.status().is_redirection() {
                    return finish(response, cookies).await;
                }
                let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|loc| response.url().join(loc).ok())
                else {
                    return finish(response, cookies).await;
                };

                debug!(from = %request.url, to = %location, "following redirect");
                let keep_method = matches!(
                    response.status(),
                    StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
                );
                request = if keep_method {
                    HttpRequest {
                        url: location.to_string(),
                        query: Vec::new(),
                        ..request
                    }
                } else {
                    HttpRequest {
                        method: Method::Get,
                        url: location.to_string(),
                        query: Vec::new(),
                        body: RequestBody::Empty,
                        ..request
                    }
                };
            }

            Err(TransportError::new(
                TransportErrorKind::TooManyRedirects,
                format!("more than {MAX_REDIRECTS} redirects"),
            ))
        }

        async fn upload(&self, upload: FileUpload, sink: ProgressSink) -> Result<HttpResponse, TransportError> {
            let file = tokio::fs::File::open(&upload.path)
                .await
                .map_err(|e| TransportError::new(TransportErrorKind::Io, format!("{}: {e}", upload.path.display())))?;

            let chunks = stream::try_unfold((file, sink.clone(), 0u64), |(mut file, sink, sent)| async move {
                let mut buf = vec![0u8; CHUNK_SIZE];
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                let sent = sent + n as u64;
                sink.report(sent)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e))?;
                Ok::<_, std::io::Error>(Some((Bytes::from(buf), (file, sink, sent))))
            });

            let part = Part::stream_with_length(Body::wrap_stream(chunks), upload.size)
                .file_name(upload.file_name.clone());
            let form = upload
                .fields
                .iter()
                .fold(Form::new(), |form, (k, v)| form.text(k.clone(), v.clone()))
                .part(upload.file_field.clone(), part);

            let mut builder = self
                .client
                .post(&upload.url)
                .query(&upload.query)
                .timeout(upload_timeout(upload.size));
            for (name, value) in &upload.headers {
                builder = builder.header(name, value);
            }

            let response = match builder.multipart(form).send().await {
                Ok(response) => response,
                Err(_) if sink.is_cancelled() => return Err(TransportError::cancelled()),
                Err(e) => return Err(map_error(e)),
            };
            let mut cookies = BTreeMap::new();
            collect_cookies(&response, &mut cookies);
            finish(response, cookies).await
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn upload_budget_grows_with_size() {
            assert_eq!(upload_timeout(0), UPLOAD_TIMEOUT_FLOOR);
            assert_eq!(upload_timeout(1024), UPLOAD_TIMEOUT_FLOOR);
            let big = upload_timeout(64 * 1024 * 1024);
            assert_eq!(big, UPLOAD_TIMEOUT_FLOOR + Duration::from_secs(4096));
        }

        #[test]
        fn client_builds_with_timeouts() {
            assert!(ReqwestTransport::new().is_ok());
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_transport::ReqwestTransport;
