use multiup_hosts::{BodyFormat, HostDescriptor, ProtocolShape};
use tracing::{debug, info, warn};

use super::{GalleryTarget, ProtocolOutcome, ensure_live, finish, gallery_id_from, polling, with_gallery_fields};
use crate::core::{check_status, missing_value};
use crate::data::{AuthContext, FileUpload, HttpRequest, HttpResponse, TaskState, UploadTask};
use crate::effects::hash::sha256_file;
use crate::effects::http::HttpTransport;
use crate::effects::sink::ProgressSink;
use crate::error::{Result, UploadError};

/// `init` → `transfer` → link, with an optional poll loop before the link
/// is read.
pub(super) async fn run<T: HttpTransport>(
    transport: &T,
    host: &HostDescriptor,
    auth: &AuthContext,
    gallery: &GalleryTarget,
    task: &mut UploadTask,
    sink: ProgressSink,
) -> Result<ProtocolOutcome> {
    let init_url = host
        .endpoints
        .init
        .as_ref()
        .ok_or_else(|| UploadError::Validation(format!("{} has no init endpoint", host.id)))?;

    task.advance(TaskState::Initializing);
    let hash = if host.send_hash || host.verifies_hash {
        Some(sha256_file(&task.file_path).await?)
    } else {
        None
    };

    let mut request = HttpRequest::post(init_url);
    if host.init_format == BodyFormat::Json {
        request = request.json();
    }
    request = request
        .field(&host.fields.file_name, &task.file_name)
        .field(&host.fields.file_size, task.file_size.to_string());
    if let (true, Some(hash)) = (host.send_hash, &hash) {
        request = request.field(&host.fields.file_hash, hash);
    }
    let request = auth.apply(host, with_gallery_fields(host, gallery, request));

    ensure_live(task)?;
    debug!(host = %host.id, file = %task.file_name, attempt = task.attempt, "init");
    let init = transport.send(request).await?;
    check_status(host, &init)?;

    if let Some(url) = host
        .rules
        .dedupe_url
        .as_ref()
        .and_then(|rule| rule.extract(&init.body))
    {
        verify_hash(host, &init, hash.as_deref())?;
        info!(host = %host.id, file = %task.file_name, "host already has this file, skipping transfer");
        return Ok(ProtocolOutcome {
            download_url: url,
            host_file_id: host
                .rules
                .file_id
                .as_ref()
                .and_then(|rule| rule.extract(&init.body)),
            bytes_uploaded: 0,
            deduplicated: true,
            gallery_id: gallery_id_from(host, gallery, &init)?,
        });
    }

    let upload_url = host
        .rules
        .upload_url
        .as_ref()
        .and_then(|rule| rule.extract(&init.body))
        .ok_or_else(|| missing_value(host, &init, "upload url"))?;
    let upload_id = host
        .rules
        .upload_id
        .as_ref()
        .and_then(|rule| rule.extract(&init.body));
    let transfer_fields = host
        .rules
        .transfer_fields
        .as_ref()
        .map(|rule| rule.extract_object(&init.body))
        .unwrap_or_default();

    // the upload url is pre-authorized by init, so no auth is attached here
    task.advance(TaskState::Transferring);
    let request = HttpRequest::post(upload_url).fields(transfer_fields);
    let upload = FileUpload::new(
        request,
        &host.fields.file,
        &task.file_path,
        &task.file_name,
        task.file_size,
    );

    ensure_live(task)?;
    let transferred = transport.upload(upload, sink.clone()).await?;
    task.record_transferred(sink.transferred());
    check_status(host, &transferred)?;

    let done = if host.protocol == ProtocolShape::MultiStepWithPolling {
        let upload_id = upload_id.ok_or_else(|| missing_value(host, &init, "upload id"))?;
        task.advance(TaskState::Polling);
        polling::poll_until_done(transport, host, auth, task, &upload_id).await?
    } else {
        transferred
    };

    verify_hash(host, &done, hash.as_deref())?;
    finish(host, gallery, &done, sink.transferred())
}

/// Compare the host-reported hash with ours, for hosts that report one.
fn verify_hash(host: &HostDescriptor, response: &HttpResponse, local: Option<&str>) -> Result<()> {
    if !host.verifies_hash {
        return Ok(());
    }
    let Some(local) = local else {
        return Ok(());
    };
    match host
        .rules
        .remote_hash
        .as_ref()
        .and_then(|rule| rule.extract(&response.body))
    {
        Some(remote) if remote.eq_ignore_ascii_case(local) => Ok(()),
        Some(remote) => Err(UploadError::Client {
            status: response.status,
            message: format!("{} stored a different file: hash {remote}, expected {local}", host.id),
            body: response.body.clone(),
        }),
        None => {
            warn!(host = %host.id, "host did not report a hash to verify");
            Ok(())
        }
    }
}
