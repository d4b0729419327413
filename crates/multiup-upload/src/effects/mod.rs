//! Everything that touches the network, the disk, the clock or shared state.

pub mod auth;
pub mod bandwidth;
pub mod engine;
pub mod governor;
pub mod hash;
pub mod http;
pub mod protocol;
pub mod runtime;
pub mod sink;
pub mod token_store;

pub use auth::AuthProvider;
pub use bandwidth::{BandwidthCounter, BandwidthSnapshot};
pub use engine::UploadEngine;
pub use governor::{ConnectionGovernor, ConnectionSlot};
pub use hash::sha256_file;
#[cfg(feature = "reqwest")]
pub use http::ReqwestTransport;
pub use http::{HttpTransport, parse_set_cookie};
pub use protocol::{GalleryTarget, ProtocolOutcome, UploadProtocol};
pub use runtime::{start_gallery_upload, upload_runtime};
pub use sink::ProgressSink;
pub use token_store::TokenStore;
