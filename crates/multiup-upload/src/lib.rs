//! Concurrent gallery uploads to many file hosts at once.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - `data` - credentials, tokens, tasks, results, reports and settings
//! - `core` - pure transformations: natural ordering, retry decisions,
//!   progress deltas, response scraping and the CAPTCHA solver
//! - `effects` - HTTP transport, token store, authentication, upload
//!   protocols, connection governor and the gallery engine
//!
//! # Key Features
//!
//! - **Per-host strategies**: every [`HostDescriptor`](multiup_hosts::HostDescriptor)
//!   picks one auth kind and one protocol shape; a single generic task runner
//!   drives them all
//! - **Single-flight refresh**: concurrent tasks for one host share one login
//! - **Two-level connection limits**: a global pool and one pool per host
//! - **Cooperative cancellation**: checked at every progress checkpoint and
//!   before every request

mod core;
mod data;
mod effects;
mod error;

pub use crate::core::{
    RetryDecision, RetryPolicy, TransferProgress, classify_status, hidden_fields, natural_cmp,
    retry_delay, solve_positional_captcha, sort_naturally_by,
};
pub use crate::data::{
    AuthContext, AuthMaterial, CachedToken, CancelFlag, Credential, DimensionStats, EngineConfig,
    FileCompleteEvent, FileFailure, FileUpload, GalleryFile, GalleryRequest, GalleryUploadReport,
    HostSettings, HttpRequest, HttpResponse, Method, ProgressEvent, RequestBody, Secret,
    SessionBundle, TaskState, UploadCallbacks, UploadFailure, UploadOutcome, UploadResult,
    UploadSuccess, UploadTask,
};
pub use crate::data::events::{FileCompleteCallback, ProgressCallback};
pub use effects::{
    AuthProvider, BandwidthCounter, BandwidthSnapshot, ConnectionGovernor, ConnectionSlot,
    GalleryTarget, HttpTransport, ProgressSink, ProtocolOutcome, TokenStore, UploadEngine,
    UploadProtocol, parse_set_cookie, sha256_file, start_gallery_upload, upload_runtime,
};

#[cfg(feature = "reqwest")]
pub use effects::ReqwestTransport;

pub use error::{EngineError, ErrorKind, Result, TransportError, TransportErrorKind, UploadError};
