use multiup_hosts::HostDescriptor;

use crate::data::{AuthContext, AuthMaterial, Credential};
use crate::error::{Result, UploadError};

/// API-key hosts need no login; the key is attached to every request as is.
pub(super) fn context(host: &HostDescriptor, credential: &Credential) -> Result<AuthContext> {
    match credential {
        Credential::ApiKey(key) if !key.is_blank() => {
            Ok(AuthContext::new(host.id.clone(), AuthMaterial::ApiKey(key.clone())))
        }
        _ => Err(UploadError::Validation(format!(
            "{} needs a non-empty API key",
            host.id
        ))),
    }
}
