use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::data::CachedToken;
use crate::error::{ErrorKind, Result, UploadError};

const TOKENS_TREE: &str = "tokens";

/// Persisted per-host token cache.
///
/// Tokens live in a sled tree keyed by host id, postcard-encoded. Reads are
/// served from an in-memory shadow that every write refreshes. Writes are
/// serialized by one writer lock and flushed before they are visible.
pub struct TokenStore {
    tree: sled::Tree,
    shadow: RwLock<HashMap<String, Arc<CachedToken>>>,
    writer: Mutex<()>,
    refresh_gates: Mutex<HashMap<String, Arc<RefreshGate>>>,
}

/// A rejected login is answered from memory for this long instead of being
/// sent to the host again.
const REJECTED_LOGIN_HOLD: Duration = Duration::from_secs(60);

/// Serializes logins for one host and remembers how the last one ended.
///
/// `generation` moves on every finished login. A caller that saw the
/// generation change while it queued joined that login, and takes its
/// failure instead of logging in again. A login the host rejected is
/// held for everyone until [`REJECTED_LOGIN_HOLD`] passes.
#[derive(Default)]
pub(crate) struct RefreshGate {
    generation: AtomicU64,
    last_failure: tokio::sync::Mutex<Option<(Instant, UploadError)>>,
}

pub(crate) struct RefreshTurn<'a> {
    gate: &'a RefreshGate,
    joined: bool,
    last_failure: tokio::sync::MutexGuard<'a, Option<(Instant, UploadError)>>,
}

impl RefreshGate {
    pub(crate) async fn enter(&self) -> RefreshTurn<'_> {
        let before = self.generation.load(Ordering::Acquire);
        let last_failure = self.last_failure.lock().await;
        RefreshTurn {
            gate: self,
            joined: self.generation.load(Ordering::Acquire) != before,
            last_failure,
        }
    }
}

impl RefreshTurn<'_> {
    /// The failure this caller should share rather than log in again.
    pub(crate) fn shared_failure(&self) -> Option<UploadError> {
        let (at, error) = self.last_failure.as_ref()?;
        let rejected = error.kind() == ErrorKind::Authentication && at.elapsed() < REJECTED_LOGIN_HOLD;
        (self.joined || rejected).then(|| error.replay())
    }

    /// Record how this caller's login ended.
    pub(crate) fn finish<T>(mut self, outcome: &Result<T>) {
        *self.last_failure = outcome.as_ref().err().map(|e| (Instant::now(), e.replay()));
        self.gate.generation.fetch_add(1, Ordering::AcqRel);
    }
}

struct TokenKeys;

impl TokenKeys {
    fn host(host_id: &str) -> Vec<u8> {
        format!("token:{host_id}").into_bytes()
    }

    fn host_of(key: &[u8]) -> Option<String> {
        std::str::from_utf8(key)
            .ok()?
            .strip_prefix("token:")
            .map(str::to_string)
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("hosts", &self.hosts())
            .finish_non_exhaustive()
    }
}

impl TokenStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(&db)
    }

    /// A store that lives only as long as this process.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(&db)
    }

    fn from_db(db: &sled::Db) -> Result<Self> {
        let tree = db.open_tree(TOKENS_TREE)?;

        let mut shadow = HashMap::new();
        for entry in tree.iter() {
            let (key, value) = entry?;
            let Some(host_id) = TokenKeys::host_of(&key) else {
                continue;
            };
            match postcard::from_bytes::<CachedToken>(&value) {
                Ok(token) => {
                    shadow.insert(host_id, Arc::new(token));
                }
                Err(e) => warn!(host = %host_id, error = %e, "dropping undecodable cached token"),
            }
        }
        debug!(tokens = shadow.len(), "token store loaded");

        Ok(Self {
            tree,
            shadow: RwLock::new(shadow),
            writer: Mutex::new(()),
            refresh_gates: Mutex::new(HashMap::new()),
        })
    }

    pub fn get(&self, host_id: &str) -> Option<Arc<CachedToken>> {
        self.shadow
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host_id)
            .cloned()
    }

    /// Replace the token for `host_id` as a whole.
    pub fn put(&self, host_id: &str, mut token: CachedToken) -> Result<Arc<CachedToken>> {
        token.host_id = host_id.to_string();
        let encoded = postcard::to_stdvec(&token)?;
        let token = Arc::new(token);

        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.tree.insert(TokenKeys::host(host_id), encoded)?;
        self.tree.flush()?;
        self.shadow
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host_id.to_string(), Arc::clone(&token));

        debug!(host = %host_id, ttl = token.ttl, "token stored");
        Ok(token)
    }

    /// True if a token exists and has at least `safety_margin_secs` left.
    pub fn is_fresh(&self, host_id: &str, safety_margin_secs: u64) -> bool {
        self.fresh(host_id, safety_margin_secs).is_some()
    }

    pub fn fresh(&self, host_id: &str, safety_margin_secs: u64) -> Option<Arc<CachedToken>> {
        self.get(host_id).filter(|t| t.is_fresh(safety_margin_secs))
    }

    pub fn invalidate(&self, host_id: &str) -> Result<()> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.remove_locked(host_id)
    }

    /// Invalidate only if the stored token is still `current`.
    ///
    /// A task that saw a stale token must not throw away a newer one that a
    /// sibling task stored in the meantime.
    pub fn invalidate_if(&self, host_id: &str, current: &CachedToken) -> Result<bool> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match self.get(host_id) {
            Some(stored) if *stored == *current => {
                self.remove_locked(host_id)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn clear(&self) -> Result<()> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.tree.clear()?;
        self.tree.flush()?;
        self.shadow.write().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }

    /// Host ids with a cached token, sorted.
    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .shadow
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        hosts.sort();
        hosts
    }

    /// Per-host gate held while a refresh is in flight, so concurrent
    /// callers wait for one login instead of each starting their own.
    pub(crate) fn refresh_gate(&self, host_id: &str) -> Arc<RefreshGate> {
        let mut gates = self.refresh_gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(host_id.to_string()).or_default())
    }

    fn remove_locked(&self, host_id: &str) -> Result<()> {
        self.tree.remove(TokenKeys::host(host_id))?;
        self.tree.flush()?;
        self.shadow
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(host_id);
        debug!(host = %host_id, "token invalidated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_replaces_whole_token() {
        let store = TokenStore::temporary().unwrap();
        store.put("h", CachedToken::new("ignored", "one", 60)).unwrap();
        let first = store.get("h").unwrap();
        store.put("h", CachedToken::new("h", "two", 60)).unwrap();

        assert_eq!(first.value, "one");
        assert_eq!(first.host_id, "h");
        assert_eq!(store.get("h").unwrap().value, "two");
    }

    #[test]
    fn freshness_uses_margin() {
        let store = TokenStore::temporary().unwrap();
        let now = chrono::Utc::now().timestamp();
        store
            .put("h", CachedToken::new("h", "t", 3600).issued_at(now - 3500))
            .unwrap();
        assert!(store.is_fresh("h", 60));
        assert!(!store.is_fresh("h", 200));
        assert!(!store.is_fresh("other", 0));
    }

    #[test]
    fn invalidate_if_keeps_newer_tokens() {
        let store = TokenStore::temporary().unwrap();
        let old = store.put("h", CachedToken::new("h", "old", 60)).unwrap();
        store.put("h", CachedToken::new("h", "new", 60)).unwrap();

        assert!(!store.invalidate_if("h", &old).unwrap());
        assert_eq!(store.get("h").unwrap().value, "new");

        let current = store.get("h").unwrap();
        assert!(store.invalidate_if("h", &current).unwrap());
        assert!(store.get("h").is_none());
    }

    #[test]
    fn tokens_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = TokenStore::open(dir.path()).unwrap();
            store
                .put("h", CachedToken::new("h", "persisted", 0).with_extra([("csrf".to_string(), "x".to_string())].into()))
                .unwrap();
            store.put("gone", CachedToken::new("gone", "t", 0)).unwrap();
            store.invalidate("gone").unwrap();
        }
        let store = TokenStore::open(dir.path()).unwrap();
        let token = store.get("h").unwrap();
        assert_eq!(token.value, "persisted");
        assert_eq!(token.extra.get("csrf").map(String::as_str), Some("x"));
        assert_eq!(store.hosts(), vec!["h".to_string()]);
    }
}
