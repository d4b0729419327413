//! Static descriptions of third-party file hosts.
//!
//! A [`HostDescriptor`] is pure data: the authentication kind, the shape of
//! the upload conversation, URL templates, form field names and the rules
//! used to read values back out of responses. Descriptors are loaded once
//! into a [`HostRegistry`] and never mutated afterwards.
//!
//! The registry starts from a built-in catalogue and merges an optional
//! user TOML file on top, keyed by host id. Each `[hosts.<id>]` table is
//! validated on its own; an invalid table is logged and skipped.

mod descriptor;
mod entry;
mod error;
mod registry;
mod rule;

pub use descriptor::{
    AuthKind, BodyFormat, Endpoints, FormFields, HostDescriptor, PollSettings, ProtocolShape,
    ResponseRules, render_template,
};
pub use error::{HostError, Result};
pub use registry::{BUILTIN_HOSTS, HostRegistry};
pub use rule::ResponseRule;
