use tokio::runtime::{Builder, Runtime};

use crate::data::{CancelFlag, GalleryRequest, GalleryUploadReport, UploadCallbacks};
use crate::effects::engine::UploadEngine;
use crate::effects::http::HttpTransport;
use crate::error::EngineError;

/// Build the multi-threaded runtime galleries run on when driven from
/// blocking code.
pub fn upload_runtime(worker_threads: usize) -> Result<Runtime, EngineError> {
    Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .thread_name("multiup-worker")
        .enable_all()
        .build()
        .map_err(EngineError::Runtime)
}

/// Blocking entry point: upload one gallery and return its report.
///
/// Meant to be called from a dedicated thread, never from inside an async
/// runtime. Callbacks fire on worker threads.
pub fn start_gallery_upload<T: HttpTransport>(
    engine: &UploadEngine<T>,
    request: GalleryRequest,
    callbacks: UploadCallbacks,
    cancel: CancelFlag,
) -> Result<GalleryUploadReport, EngineError> {
    let runtime = upload_runtime(engine.config().parallelism)?;
    runtime.block_on(engine.upload_gallery(request, callbacks, cancel))
}
