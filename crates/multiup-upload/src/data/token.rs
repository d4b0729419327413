use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Authentication material cached for one host.
///
/// Tokens are immutable once stored. Refreshing a host replaces its token
/// as a whole, so concurrent readers only ever see a complete value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub host_id: String,
    /// Bearer token, or a JSON-encoded session bundle for session logins.
    pub value: String,
    /// Unix timestamp (seconds) at which the token was obtained.
    pub issued_at: i64,
    /// Lifetime in seconds. `0` never expires.
    pub ttl: u64,
    pub extra: BTreeMap<String, String>,
}

impl CachedToken {
    /// A token issued now.
    pub fn new(host_id: impl Into<String>, value: impl Into<String>, ttl: u64) -> Self {
        Self {
            host_id: host_id.into(),
            value: value.into(),
            issued_at: Utc::now().timestamp(),
            ttl,
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn issued_at(mut self, unix_secs: i64) -> Self {
        self.issued_at = unix_secs;
        self
    }

    #[must_use]
    pub fn with_extra(mut self, extra: BTreeMap<String, String>) -> Self {
        self.extra = extra;
        self
    }

    /// Unix timestamp after which the token is expired, or `None` if it never expires.
    pub fn expires_at(&self) -> Option<i64> {
        (self.ttl != 0).then(|| self.issued_at.saturating_add(clamp_i64(self.ttl)))
    }

    /// `now < issued_at + ttl - safety_margin`, or always true for `ttl == 0`.
    pub fn is_fresh_at(&self, now: i64, safety_margin_secs: u64) -> bool {
        match self.expires_at() {
            None => true,
            Some(expires) => now < expires.saturating_sub(clamp_i64(safety_margin_secs)),
        }
    }

    pub fn is_fresh(&self, safety_margin_secs: u64) -> bool {
        self.is_fresh_at(Utc::now().timestamp(), safety_margin_secs)
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("host_id", &self.host_id)
            .field("value", &"***")
            .field("issued_at", &self.issued_at)
            .field("ttl", &self.ttl)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}
