use multiup_hosts::{HostDescriptor, render_template};
use tracing::debug;

use super::ensure_live;
use crate::core::{check_status, error_message};
use crate::data::{AuthContext, HttpRequest, HttpResponse, UploadTask};
use crate::effects::http::HttpTransport;
use crate::error::{Result, UploadError};

/// Ask the host about `upload_id` until it reports a done or failed state.
///
/// Sleeps `host.poll.interval` between attempts and gives up with a
/// [`UploadError::Timeout`] after `host.poll.max_attempts`.
pub(super) async fn poll_until_done<T: HttpTransport>(
    transport: &T,
    host: &HostDescriptor,
    auth: &AuthContext,
    task: &UploadTask,
    upload_id: &str,
) -> Result<HttpResponse> {
    let template = host
        .endpoints
        .poll
        .as_deref()
        .ok_or_else(|| UploadError::Validation(format!("{} has no poll endpoint", host.id)))?;
    let status_rule = host
        .rules
        .poll_status
        .as_ref()
        .ok_or_else(|| UploadError::Validation(format!("{} has no poll status rule", host.id)))?;
    let url = render_template(template, &[("upload_id", upload_id)]);
    let templated = template.contains("{upload_id}");

    for attempt in 1..=host.poll.max_attempts {
        let mut request = HttpRequest::get(&url);
        if !templated {
            request = request.field(&host.fields.upload_id, upload_id);
        }
        let request = auth.apply(host, request);

        ensure_live(task)?;
        let response = transport.send(request).await?;
        check_status(host, &response)?;

        match status_rule.extract(&response.body) {
            Some(state) if host.rules.poll_done.contains(&state) => return Ok(response),
            Some(state) if host.rules.poll_failed.contains(&state) => {
                return Err(UploadError::Server {
                    status: response.status,
                    message: format!(
                        "{} rejected upload {upload_id}: {}",
                        host.id,
                        error_message(host, &response)
                    ),
                    body: response.body.clone(),
                });
            }
            state => debug!(host = %host.id, upload_id, attempt, ?state, "upload still processing"),
        }

        if attempt < host.poll.max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(host.poll.interval) => {}
                _ = task.cancel_flag().cancelled() => return Err(UploadError::Cancelled),
            }
        }
    }

    Err(UploadError::Timeout(format!(
        "{} did not finish processing upload {upload_id} after {} polls",
        host.id, host.poll.max_attempts
    )))
}
