use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Result, UploadError};

/// Global and per-host connection ceilings.
///
/// A slot holds one global permit and one host permit. The global permit is
/// always taken first. Both are released when the slot is dropped, whatever
/// path the task leaves by.
#[derive(Debug)]
pub struct ConnectionGovernor {
    global: Arc<Semaphore>,
    hosts: HashMap<String, Arc<Semaphore>>,
}

/// Proof of an acquired connection. Dropping it frees both permits.
#[derive(Debug)]
pub struct ConnectionSlot {
    _host: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

impl ConnectionGovernor {
    pub fn new(global_max: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(global_max.max(1))),
            hosts: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_host(mut self, host_id: impl Into<String>, max: usize) -> Self {
        self.register(host_id, max);
        self
    }

    pub fn register(&mut self, host_id: impl Into<String>, max: usize) {
        self.hosts
            .insert(host_id.into(), Arc::new(Semaphore::new(max.max(1))));
    }

    /// Wait for a global slot, then a slot on `host_id`.
    pub async fn acquire(&self, host_id: &str) -> Result<ConnectionSlot> {
        let host = self
            .hosts
            .get(host_id)
            .ok_or_else(|| UploadError::Validation(format!("no connection pool for host {host_id}")))?;

        let global = Arc::clone(&self.global)
            .acquire_owned()
            .await
            .map_err(|_| UploadError::Cancelled)?;
        let host = Arc::clone(host)
            .acquire_owned()
            .await
            .map_err(|_| UploadError::Cancelled)?;

        Ok(ConnectionSlot {
            _host: host,
            _global: global,
        })
    }

    pub fn available_global(&self) -> usize {
        self.global.available_permits()
    }

    pub fn available_for(&self, host_id: &str) -> Option<usize> {
        self.hosts.get(host_id).map(|s| s.available_permits())
    }
}
