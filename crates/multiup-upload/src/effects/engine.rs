//! Gallery orchestration.
//!
//! One gallery runs as: resolve and check hosts, create gallery containers
//! with the first file, then push every remaining (file, host) pair through
//! a bounded worker pool in up to `1 + max_retries` passes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{StreamExt, stream::FuturesUnordered};
use multiup_hosts::{HostDescriptor, HostRegistry};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::core::{RetryDecision, RetryPolicy, sort_naturally_by};
use crate::data::{
    CancelFlag, Credential, EngineConfig, FileCompleteEvent, GalleryFile, GalleryRequest,
    GalleryUploadReport, TaskState, UploadCallbacks, UploadFailure, UploadResult, UploadSuccess,
    UploadTask,
};
use crate::effects::auth::AuthProvider;
use crate::effects::bandwidth::BandwidthCounter;
use crate::effects::governor::ConnectionGovernor;
use crate::effects::http::HttpTransport;
use crate::effects::protocol::{GalleryTarget, ProtocolOutcome, UploadProtocol};
use crate::effects::sink::ProgressSink;
use crate::effects::token_store::TokenStore;
use crate::error::{EngineError, ErrorKind, UploadError};

/// Uploads galleries to any number of hosts at once.
///
/// One engine owns one [`TokenStore`] and one [`BandwidthCounter`]; both are
/// shared by every gallery it runs.
pub struct UploadEngine<T> {
    registry: Arc<HostRegistry>,
    config: EngineConfig,
    auth: Arc<AuthProvider<T>>,
    protocol: Arc<UploadProtocol<T>>,
    bandwidth: Arc<BandwidthCounter>,
}

impl<T> std::fmt::Debug for UploadEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadEngine")
            .field("hosts", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One host taking part in a gallery.
struct Lane {
    host: HostDescriptor,
    credential: Credential,
    gallery: GalleryTarget,
}

/// One (file, host) pair, carried from pass to pass.
struct Job {
    lane: Arc<Lane>,
    file: GalleryFile,
    attempts: u32,
    passes: u32,
    refreshed: bool,
}

enum Attempt {
    Done(UploadResult),
    Again(Duration),
}

/// Everything a worker task needs, shared across one gallery.
struct Workers<T> {
    auth: Arc<AuthProvider<T>>,
    protocol: Arc<UploadProtocol<T>>,
    governor: ConnectionGovernor,
    pool: Semaphore,
    policy: RetryPolicy,
    bandwidth: Arc<BandwidthCounter>,
    callbacks: UploadCallbacks,
    progress_interval: Duration,
    cancel: CancelFlag,
}

/// Collects terminal results and emits file-complete events in arrival order.
struct Tally {
    report: GalleryUploadReport,
    callbacks: UploadCallbacks,
    completed: usize,
    total: usize,
}

impl Tally {
    fn settle(&mut self, result: UploadResult) {
        self.completed += 1;
        self.callbacks.file_complete(&FileCompleteEvent {
            result: result.clone(),
            completed: self.completed,
            total: self.total,
        });
        self.report.record(result);
    }

    fn cancel_all<'a>(&mut self, pairs: impl IntoIterator<Item = (&'a str, &'a str, u32)>) {
        for (file, host, attempts) in pairs {
            self.settle(UploadResult::cancelled(file, host, attempts));
        }
    }
}

impl<T: HttpTransport> UploadEngine<T> {
    pub fn new(
        registry: Arc<HostRegistry>,
        config: EngineConfig,
        transport: Arc<T>,
        store: Arc<TokenStore>,
    ) -> Self {
        let auth = AuthProvider::new(Arc::clone(&transport), store, config.token_safety_margin_secs);
        Self {
            registry,
            config,
            auth: Arc::new(auth),
            protocol: Arc::new(UploadProtocol::new(transport)),
            bandwidth: Arc::new(BandwidthCounter::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &HostRegistry {
        &self.registry
    }

    pub fn bandwidth(&self) -> &Arc<BandwidthCounter> {
        &self.bandwidth
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        self.auth.store()
    }

    pub fn auth(&self) -> &AuthProvider<T> {
        &self.auth
    }

    /// Upload one gallery to every host in `request.hosts`.
    ///
    /// Per-file failures land in the report; only a failed container
    /// creation aborts the gallery with an error. Cancellation is not an
    /// error either: the report marks the affected pairs `Cancelled`.
    pub async fn upload_gallery(
        &self,
        request: GalleryRequest,
        callbacks: UploadCallbacks,
        cancel: CancelFlag,
    ) -> Result<GalleryUploadReport, EngineError> {
        if request.hosts.is_empty() {
            return Err(EngineError::InvalidRequest("no hosts selected".into()));
        }
        let mut seen = HashSet::new();
        let mut hosts = Vec::new();
        for id in &request.hosts {
            if seen.insert(id.as_str()) {
                hosts.push(self.registry.get(id)?.clone());
            }
        }

        let started = Instant::now();
        let baseline = self.bandwidth.snapshot();

        let mut files = request.files.clone();
        sort_naturally_by(&mut files, |f| f.name.as_str());
        let (resumed, todo): (Vec<GalleryFile>, Vec<GalleryFile>) = files
            .iter()
            .cloned()
            .partition(|f| request.already_uploaded.contains(&f.name));

        let mut tally = Tally {
            report: GalleryUploadReport::new(&request.name, files.len()),
            callbacks: callbacks.clone(),
            completed: resumed.len() * hosts.len(),
            total: files.len() * hosts.len(),
        };
        tally.report.skipped = resumed.len() * hosts.len();
        info!(
            gallery = %request.name,
            files = files.len(),
            resumed = resumed.len(),
            hosts = hosts.len(),
            "starting gallery upload"
        );

        let (mut lanes, governor) = self.open_lanes(hosts, &todo, &mut tally);

        let workers = Arc::new(Workers {
            auth: Arc::clone(&self.auth),
            protocol: Arc::clone(&self.protocol),
            governor,
            pool: Semaphore::new(self.config.parallelism.max(1)),
            policy: RetryPolicy::new(self.config.max_retries, self.config.retry_backoff_base()),
            bandwidth: Arc::clone(&self.bandwidth),
            callbacks,
            progress_interval: self.config.progress_interval_duration(),
            cancel: cancel.clone(),
        });

        // containers first: nothing else starts until every one exists
        let mut seeded: HashSet<String> = HashSet::new();
        let lane_hosts: Vec<String> = lanes.iter().map(|l| l.host.id.clone()).collect();
        for lane in lanes.iter_mut().filter(|l| l.host.supports_gallery) {
            let host_id = lane.host.id.clone();
            if let Some(gallery_id) = request.existing_gallery_ids.get(&host_id) {
                debug!(host = %host_id, gallery_id = %gallery_id, "appending to existing gallery");
                tally.report.gallery_ids.insert(host_id, gallery_id.clone());
                lane.gallery = GalleryTarget::Append {
                    gallery_id: gallery_id.clone(),
                };
                continue;
            }
            let Some(first) = todo.first() else {
                continue;
            };

            match workers.create_gallery(lane, first, &request.name).await {
                Ok((result, gallery_id)) => {
                    info!(host = %host_id, gallery_id = %gallery_id, "gallery created");
                    tally.report.gallery_ids.insert(host_id.clone(), gallery_id.clone());
                    tally.settle(result);
                    seeded.insert(host_id);
                    lane.gallery = GalleryTarget::Append { gallery_id };
                }
                Err(e) if e.kind() == ErrorKind::Cancelled || cancel.is_cancelled() => {
                    warn!(gallery = %request.name, "cancelled while creating gallery");
                    for id in &lane_hosts {
                        let skip = usize::from(seeded.contains(id));
                        tally.cancel_all(todo.iter().skip(skip).map(|f| (f.name.as_str(), id.as_str(), 0)));
                    }
                    tally.report.finish(&files, self.bandwidth.since(&baseline), started.elapsed());
                    return Ok(tally.report);
                }
                Err(source) => {
                    warn!(host = %host_id, file = %first.name, error = %source, "gallery creation failed");
                    return Err(EngineError::GalleryCreation {
                        host: host_id,
                        file: first.name.clone(),
                        source,
                    });
                }
            }
        }

        let mut jobs = Vec::new();
        for lane in lanes.into_iter().map(Arc::new) {
            let skip_first = seeded.contains(&lane.host.id);
            for file in todo.iter().skip(usize::from(skip_first)) {
                jobs.push(Job {
                    lane: Arc::clone(&lane),
                    file: file.clone(),
                    attempts: 0,
                    passes: 0,
                    refreshed: false,
                });
            }
        }

        // each job carries its own pass count, so `decide` ends the loop
        let mut pass = 0u32;
        while !jobs.is_empty() {
            let (again, delay) = Self::run_pass(&workers, jobs, &mut tally).await;
            jobs = again;
            pass += 1;

            if !jobs.is_empty() {
                warn!(pass, retrying = jobs.len(), ?delay, "starting retry pass");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        tally.report.finish(&files, self.bandwidth.since(&baseline), started.elapsed());
        info!(
            gallery = %request.name,
            succeeded = tally.report.succeeded,
            failed = tally.report.failed,
            cancelled = tally.report.cancelled,
            skipped = tally.report.skipped,
            elapsed_secs = tally.report.elapsed_secs,
            "gallery upload finished"
        );
        Ok(tally.report)
    }

    /// Check each host's switches and credential, and size its connection
    /// pool. Unusable hosts fail all their pairs up front without touching
    /// the network.
    fn open_lanes(
        &self,
        hosts: Vec<HostDescriptor>,
        todo: &[GalleryFile],
        tally: &mut Tally,
    ) -> (Vec<Lane>, ConnectionGovernor) {
        let mut governor = ConnectionGovernor::new(self.config.max_global_connections);
        let mut lanes = Vec::new();

        for host in hosts {
            let settings = self.config.host_settings(&host.id);
            let checked = if !host.enabled || settings.is_some_and(|s| !s.enabled) {
                Err(UploadError::Validation(format!("{} is disabled", host.id)))
            } else {
                let credential = settings.and_then(|s| s.credential(host.auth_kind));
                AuthProvider::<T>::validate_credential(&host, credential.as_ref()).and_then(|()| {
                    credential.ok_or_else(|| UploadError::Validation(format!("{} has no credential", host.id)))
                })
            };

            match checked {
                Ok(credential) => {
                    let max = settings
                        .and_then(|s| s.max_connections)
                        .unwrap_or(host.max_connections_per_host);
                    governor.register(&host.id, max as usize);
                    lanes.push(Lane {
                        host,
                        credential,
                        gallery: GalleryTarget::None,
                    });
                }
                Err(e) => {
                    warn!(host = %host.id, error = %e, "host cannot be used");
                    for file in todo {
                        tally.settle(UploadResult::failed(
                            &file.name,
                            &host.id,
                            0,
                            UploadFailure::from_error(&e, false),
                        ));
                    }
                }
            }
        }
        (lanes, governor)
    }

    /// Run one pass over `jobs`. Returns the jobs to retry and how long to
    /// wait before the next pass.
    async fn run_pass(workers: &Arc<Workers<T>>, jobs: Vec<Job>, tally: &mut Tally) -> (Vec<Job>, Duration) {
        let mut running = FuturesUnordered::new();
        for job in jobs {
            let identity = (job.file.name.clone(), job.lane.host.id.clone(), job.attempts);
            let workers = Arc::clone(workers);
            let handle = tokio::spawn(async move { workers.run(job).await });
            running.push(async move { (identity, handle.await) });
        }

        let mut again = Vec::new();
        let mut delay = Duration::ZERO;
        while let Some((identity, joined)) = running.next().await {
            match joined {
                Ok((_, Attempt::Done(result))) => tally.settle(result),
                Ok((mut job, Attempt::Again(wait))) => {
                    delay = delay.max(wait);
                    job.passes += 1;
                    again.push(job);
                }
                Err(e) => {
                    let (file, host, attempts) = identity;
                    warn!(host = %host, file = %file, error = %e, "upload task aborted");
                    tally.settle(UploadResult::failed(
                        file,
                        host,
                        attempts,
                        UploadFailure {
                            kind: ErrorKind::Validation,
                            message: format!("upload task aborted: {e}"),
                            status: None,
                            retries_exhausted: false,
                        },
                    ));
                }
            }
        }
        (again, delay)
    }
}

impl<T: HttpTransport> Workers<T> {
    async fn run(&self, mut job: Job) -> (Job, Attempt) {
        let attempt = self.attempt(&mut job).await;
        (job, attempt)
    }

    async fn attempt(&self, job: &mut Job) -> Attempt {
        let lane = Arc::clone(&job.lane);
        let host = &lane.host;
        let file = job.file.clone();
        let cancelled = |attempts| Attempt::Done(UploadResult::cancelled(&file.name, &host.id, attempts));

        let permit = tokio::select! {
            permit = self.pool.acquire() => permit.ok(),
            _ = self.cancel.cancelled() => None,
        };
        let Some(_permit) = permit else {
            return cancelled(job.attempts);
        };
        if self.cancel.is_cancelled() {
            return cancelled(job.attempts);
        }

        let size = match preflight(host, &file).await {
            Ok(size) => size,
            Err(e) => {
                debug!(host = %host.id, file = %file.name, error = %e, "pre-flight check failed");
                return Attempt::Done(UploadResult::failed(
                    &file.name,
                    &host.id,
                    job.attempts,
                    UploadFailure::from_error(&e, false),
                ));
            }
        };

        let slot = tokio::select! {
            slot = self.governor.acquire(&host.id) => slot,
            _ = self.cancel.cancelled() => Err(UploadError::Cancelled),
        };
        let _slot = match slot {
            Ok(slot) => slot,
            Err(UploadError::Cancelled) => return cancelled(job.attempts),
            Err(e) => {
                return Attempt::Done(UploadResult::failed(
                    &file.name,
                    &host.id,
                    job.attempts,
                    UploadFailure::from_error(&e, false),
                ));
            }
        };

        job.attempts += 1;
        let mut task = UploadTask::new(&file.path, &file.name, size, &host.id, self.cancel.clone())
            .with_attempt(job.attempts);

        loop {
            if self.cancel.is_cancelled() {
                task.advance(TaskState::Cancelled);
                return cancelled(job.attempts);
            }

            let started = Instant::now();
            task.advance(TaskState::Authenticating);
            let (error, seen) = match self.auth.ensure_authenticated(host, &lane.credential).await {
                Err(e) => (e, None),
                Ok(ctx) => {
                    let sink = self.sink(&host.id, &file.name, size);
                    match self.protocol.run(host, &ctx, &lane.gallery, &mut task, sink).await {
                        Ok(outcome) => {
                            task.advance(TaskState::Completed);
                            info!(
                                host = %host.id,
                                file = %file.name,
                                attempt = job.attempts,
                                bytes = outcome.bytes_uploaded,
                                deduplicated = outcome.deduplicated,
                                "upload completed"
                            );
                            return Attempt::Done(completed(&file.name, &host.id, job.attempts, outcome, started));
                        }
                        Err(e) => (e, Some(ctx)),
                    }
                }
            };

            if error.kind() == ErrorKind::Cancelled || self.cancel.is_cancelled() {
                task.advance(TaskState::Cancelled);
                debug!(host = %host.id, file = %file.name, "upload cancelled");
                return cancelled(job.attempts);
            }

            let stale = self.auth.looks_like_stale_auth(host, error.body(), error.status());
            // a login that just failed is not refreshed by logging in again
            let refreshed = job.refreshed || seen.is_none();
            match self.policy.decide(error.kind(), stale, job.passes, refreshed) {
                RetryDecision::RetryWithRefresh => {
                    warn!(host = %host.id, file = %file.name, attempt = job.attempts, error = %error, "authentication looks stale, refreshing once");
                    job.refreshed = true;
                    if let Some(Err(e)) = seen.as_ref().map(|ctx| self.auth.invalidate(host, ctx)) {
                        warn!(host = %host.id, error = %e, "could not drop cached token");
                    }
                    task = task.retry();
                    job.attempts = task.attempt;
                }
                RetryDecision::RetryWithBackoff(delay) => {
                    warn!(host = %host.id, file = %file.name, attempt = job.attempts, error = %error, ?delay, "upload failed, will retry");
                    return Attempt::Again(delay);
                }
                RetryDecision::RetryImmediately => {
                    warn!(host = %host.id, file = %file.name, attempt = job.attempts, error = %error, "upload timed out, will retry");
                    return Attempt::Again(Duration::ZERO);
                }
                RetryDecision::Fail => {
                    task.advance(TaskState::Failed);
                    warn!(host = %host.id, file = %file.name, attempt = job.attempts, error = %error, "upload failed");
                    return Attempt::Done(UploadResult::failed(
                        &file.name,
                        &host.id,
                        job.attempts,
                        UploadFailure::from_error(&error, error.kind().is_retryable()),
                    ));
                }
            }
        }
    }

    /// Upload `file` while creating the gallery container on `lane`'s host,
    /// on a freshly logged-in session.
    async fn create_gallery(
        &self,
        lane: &Lane,
        file: &GalleryFile,
        name: &str,
    ) -> Result<(UploadResult, String), UploadError> {
        let host = &lane.host;
        if self.cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        let size = preflight(host, file).await?;
        let _slot = tokio::select! {
            slot = self.governor.acquire(&host.id) => slot?,
            _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
        };

        let started = Instant::now();
        let mut task = UploadTask::new(&file.path, &file.name, size, &host.id, self.cancel.clone());
        task.advance(TaskState::Authenticating);
        let ctx = self.auth.fresh_session(host, &lane.credential).await?;
        let target = GalleryTarget::Create { name: name.to_string() };
        let sink = self.sink(&host.id, &file.name, size);
        let outcome = self.protocol.run(host, &ctx, &target, &mut task, sink).await?;
        task.advance(TaskState::Completed);

        let gallery_id = outcome
            .gallery_id
            .clone()
            .ok_or_else(|| UploadError::Validation(format!("{} returned no gallery id", host.id)))?;
        Ok((completed(&file.name, &host.id, task.attempt, outcome, started), gallery_id))
    }

    fn sink(&self, host_id: &str, file_name: &str, size: u64) -> ProgressSink {
        ProgressSink::new(file_name, host_id, size, Arc::clone(&self.bandwidth), self.cancel.clone())
            .with_callback(self.callbacks.on_progress.clone(), self.progress_interval)
    }
}

/// Local checks that need no network: the file is there, is not empty, and
/// the host takes files that big. Returns the size on disk.
async fn preflight(host: &HostDescriptor, file: &GalleryFile) -> Result<u64, UploadError> {
    let meta = tokio::fs::metadata(&file.path)
        .await
        .map_err(|e| UploadError::Validation(format!("{}: {e}", file.path.display())))?;
    if !meta.is_file() {
        return Err(UploadError::Validation(format!(
            "{} is not a regular file",
            file.path.display()
        )));
    }
    let size = meta.len();
    if size == 0 {
        return Err(UploadError::Validation(format!("{} is empty", file.name)));
    }
    if !host.accepts_size(size) {
        return Err(UploadError::Validation(format!(
            "{} is {size} bytes, over the {} byte limit of {}",
            file.name, host.max_file_size, host.id
        )));
    }
    Ok(size)
}

fn completed(file_name: &str, host_id: &str, attempts: u32, outcome: ProtocolOutcome, started: Instant) -> UploadResult {
    UploadResult::completed(
        file_name,
        host_id,
        attempts,
        UploadSuccess {
            download_url: outcome.download_url,
            host_file_id: outcome.host_file_id,
            bytes_uploaded: outcome.bytes_uploaded,
            elapsed_secs: started.elapsed().as_secs_f64(),
            deduplicated: outcome.deduplicated,
        },
    )
}
