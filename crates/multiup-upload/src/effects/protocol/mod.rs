//! Per-host upload conversations.
//!
//! [`UploadProtocol::run`] dispatches on the host's [`ProtocolShape`]; each
//! shape lives in its own module and shares the helpers below.

mod multi_step;
mod polling;
mod single_step;

use std::sync::Arc;

use multiup_hosts::{HostDescriptor, ProtocolShape};

use crate::core::missing_value;
use crate::data::{AuthContext, HttpRequest, HttpResponse, UploadTask};
use crate::effects::http::HttpTransport;
use crate::effects::sink::ProgressSink;
use crate::error::{Result, UploadError};

/// Where an upload lands relative to a gallery container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GalleryTarget {
    #[default]
    None,
    /// Upload the file and create the container in the same request.
    Create { name: String },
    /// Add the file to a container that already exists.
    Append { gallery_id: String },
}

/// What a successful protocol run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolOutcome {
    pub download_url: String,
    pub host_file_id: Option<String>,
    pub bytes_uploaded: u64,
    pub deduplicated: bool,
    /// Container id, when the run created or appended to one.
    pub gallery_id: Option<String>,
}

pub struct UploadProtocol<T> {
    transport: Arc<T>,
}

impl<T> std::fmt::Debug for UploadProtocol<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadProtocol").finish_non_exhaustive()
    }
}

impl<T: HttpTransport> UploadProtocol<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Upload `task`'s file to `host`, advancing the task through its states.
    ///
    /// The task is left in its last non-terminal state; the caller decides
    /// whether the attempt ends `Completed`, `Failed` or `Cancelled`.
    pub async fn run(
        &self,
        host: &HostDescriptor,
        auth: &AuthContext,
        gallery: &GalleryTarget,
        task: &mut UploadTask,
        sink: ProgressSink,
    ) -> Result<ProtocolOutcome> {
        let transport = self.transport.as_ref();
        match host.protocol {
            ProtocolShape::SingleStep => single_step::run(transport, host, auth, gallery, task, sink).await,
            ProtocolShape::MultiStep | ProtocolShape::MultiStepWithPolling => {
                multi_step::run(transport, host, auth, gallery, task, sink).await
            }
        }
    }
}

/// Checkpoint before every network call.
fn ensure_live(task: &UploadTask) -> Result<()> {
    if task.cancel_requested() {
        return Err(UploadError::Cancelled);
    }
    Ok(())
}

fn with_gallery_fields(host: &HostDescriptor, gallery: &GalleryTarget, request: HttpRequest) -> HttpRequest {
    match gallery {
        GalleryTarget::Create { name } => match &host.fields.gallery_name {
            Some(field) => request.field(field, name),
            None => request,
        },
        GalleryTarget::Append { gallery_id } => match &host.fields.gallery_id {
            Some(field) => request.field(field, gallery_id),
            None => request,
        },
        GalleryTarget::None => request,
    }
}

/// The container id a run ends up in. Creating a container without getting
/// its id back is an error: later files would have nowhere to go.
fn gallery_id_from(host: &HostDescriptor, gallery: &GalleryTarget, response: &HttpResponse) -> Result<Option<String>> {
    match gallery {
        GalleryTarget::None => Ok(None),
        GalleryTarget::Append { gallery_id } => Ok(Some(gallery_id.clone())),
        GalleryTarget::Create { .. } => host
            .rules
            .gallery_id
            .as_ref()
            .and_then(|rule| rule.extract(&response.body))
            .map(Some)
            .ok_or_else(|| missing_value(host, response, "gallery id")),
    }
}

fn finish(
    host: &HostDescriptor,
    gallery: &GalleryTarget,
    response: &HttpResponse,
    bytes_uploaded: u64,
) -> Result<ProtocolOutcome> {
    let download_url = host
        .rules
        .download_url(&response.body)
        .ok_or_else(|| missing_value(host, response, "download link"))?;
    let host_file_id = host
        .rules
        .file_id
        .as_ref()
        .and_then(|rule| rule.extract(&response.body));
    Ok(ProtocolOutcome {
        download_url,
        host_file_id,
        bytes_uploaded,
        deduplicated: false,
        gallery_id: gallery_id_from(host, gallery, response)?,
    })
}
