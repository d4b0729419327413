use multiup_hosts::HostDescriptor;
use tracing::debug;

use super::{GalleryTarget, ProtocolOutcome, ensure_live, finish, with_gallery_fields};
use crate::core::check_status;
use crate::data::{AuthContext, FileUpload, HttpRequest, TaskState, UploadTask};
use crate::effects::http::HttpTransport;
use crate::effects::sink::ProgressSink;
use crate::error::{Result, UploadError};

/// One multipart request carries the file and answers with the link.
pub(super) async fn run<T: HttpTransport>(
    transport: &T,
    host: &HostDescriptor,
    auth: &AuthContext,
    gallery: &GalleryTarget,
    task: &mut UploadTask,
    sink: ProgressSink,
) -> Result<ProtocolOutcome> {
    let url = match gallery {
        GalleryTarget::Create { .. } => host
            .endpoints
            .gallery_create
            .as_ref()
            .or(host.endpoints.upload.as_ref()),
        _ => host.endpoints.upload.as_ref(),
    }
    .ok_or_else(|| UploadError::Validation(format!("{} has no upload endpoint", host.id)))?;

    task.advance(TaskState::Transferring);
    let request = HttpRequest::post(url).fields(host.fields.extra.clone());
    let request = auth.apply(host, with_gallery_fields(host, gallery, request));
    let upload = FileUpload::new(
        request,
        &host.fields.file,
        &task.file_path,
        &task.file_name,
        task.file_size,
    );

    ensure_live(task)?;
    debug!(host = %host.id, file = %task.file_name, attempt = task.attempt, "single-step upload");
    let response = transport.upload(upload, sink.clone()).await?;
    task.record_transferred(sink.transferred());
    check_status(host, &response)?;

    finish(host, gallery, &response, sink.transferred())
}
