//! Plain data: credentials, tokens, requests, tasks, results and settings.

pub mod auth;
pub mod config;
pub mod credential;
pub mod events;
pub mod gallery;
pub mod report;
pub mod request;
pub mod result;
pub mod task;
pub mod token;

pub use auth::{AuthContext, AuthMaterial, SessionBundle};
pub use config::{EngineConfig, HostSettings};
pub use credential::{Credential, Secret};
pub use events::{FileCompleteEvent, ProgressEvent, UploadCallbacks};
pub use gallery::{GalleryFile, GalleryRequest};
pub use report::{DimensionStats, FileFailure, GalleryUploadReport};
pub use request::{FileUpload, HttpRequest, HttpResponse, Method, RequestBody};
pub use result::{UploadFailure, UploadOutcome, UploadResult, UploadSuccess};
pub use task::{CancelFlag, TaskState, UploadTask};
pub use token::CachedToken;
