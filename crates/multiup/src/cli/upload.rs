use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use multiup_upload::{
    CancelFlag, GalleryFile, GalleryRequest, GalleryUploadReport, ReqwestTransport, UploadEngine,
    upload_runtime,
};
use tracing::{info, warn};

use crate::env::MultiupEnv;
use crate::ui::GalleryTracker;

#[derive(Clone, Debug, Args)]
pub struct UploadArg {
    /// Directory holding the gallery's files
    pub dir: PathBuf,

    /// Host to upload to; repeat for more hosts
    #[arg(short = 'H', long = "host", value_name = "HOST", required = true)]
    pub hosts: Vec<String>,

    /// Gallery name [default: the directory name]
    #[arg(short, long)]
    pub name: Option<String>,

    /// Add to a gallery that already exists, as HOST=ID
    #[arg(long = "gallery-id", value_name = "HOST=ID", value_parser = parse_gallery_id)]
    pub gallery_ids: Vec<(String, String)>,

    /// File listing names uploaded by an earlier run, one per line
    #[arg(long, value_name = "FILE")]
    pub resume_from: Option<PathBuf>,

    /// Write the full report as JSON
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Files uploaded at once [default: from config]
    #[arg(short = 'j', long)]
    pub parallelism: Option<usize>,
}

fn parse_gallery_id(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((host, id)) if !host.trim().is_empty() && !id.trim().is_empty() => {
            Ok((host.trim().to_string(), id.trim().to_string()))
        }
        _ => Err(format!("expected HOST=ID, got `{s}`")),
    }
}

pub fn run(arg: UploadArg, env: &MultiupEnv) -> Result<()> {
    let mut config = env.engine_config()?;
    if let Some(n) = arg.parallelism {
        config = config.parallelism(n);
    }
    let registry = Arc::new(env.registry()?);
    let store = Arc::new(env.token_store()?);
    let transport = Arc::new(ReqwestTransport::new().context("failed to build the HTTP client")?);

    let request = build_request(&arg)?;
    let total_bytes = request.files.iter().map(|f| f.size).sum::<u64>() * request.hosts.len() as u64;
    info!(gallery = %request.name, files = request.files.len(), hosts = request.hosts.len(), "starting upload");

    let engine = UploadEngine::new(registry, config, transport, store);
    let tracker = GalleryTracker::new(total_bytes, request.name.clone());
    let cancel = CancelFlag::new();

    let runtime = upload_runtime(engine.config().parallelism)?;
    let report = runtime.block_on(async {
        let flag = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling uploads");
                flag.cancel();
            }
        });
        engine.upload_gallery(request, tracker.callbacks(), cancel).await
    });
    tracker.finish(Some("done".to_string()));
    let report = report?;

    print_summary(&report);
    if let Some(path) = &arg.report {
        let json = serde_json::to_string_pretty(&report).context("failed to encode the report")?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    }

    if !report.is_complete() {
        bail!(
            "{} upload(s) failed and {} were cancelled",
            report.failed,
            report.cancelled
        );
    }
    Ok(())
}

fn build_request(arg: &UploadArg) -> Result<GalleryRequest> {
    let files = gallery_files(&arg.dir)?;
    if files.is_empty() {
        bail!("{} holds no files", arg.dir.display());
    }
    let name = match &arg.name {
        Some(name) => name.clone(),
        None => arg
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "gallery".to_string()),
    };

    let mut request = GalleryRequest::new(name, files).hosts(arg.hosts.iter().cloned());
    for (host, id) in &arg.gallery_ids {
        request = request.existing_gallery(host.clone(), id.clone());
    }
    if let Some(path) = &arg.resume_from {
        request = request.already_uploaded(resume_list(path)?);
    }
    Ok(request)
}

/// Regular, non-hidden files directly inside `dir`.
fn gallery_files(dir: &Path) -> Result<Vec<GalleryFile>> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if !entry.file_type()?.is_file() {
            continue;
        }
        files.push(GalleryFile::from_path(entry.path())?);
    }
    Ok(files)
}

fn resume_list(path: &Path) -> Result<HashSet<String>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn print_summary(report: &GalleryUploadReport) {
    println!(
        "{}: {} uploaded, {} failed, {} skipped, {} cancelled in {:.1}s ({:.0} KiB/s)",
        report.gallery_name,
        report.succeeded,
        report.failed,
        report.skipped,
        report.cancelled,
        report.elapsed_secs,
        report.average_throughput_bps / 1024.0,
    );
    for (host, id) in &report.gallery_ids {
        println!("  {host} gallery: {id}");
    }
    for host in report.per_host.keys() {
        let links = report.links(host);
        if !links.is_empty() {
            println!("  {host}:");
            for link in links {
                println!("    {link}");
            }
        }
    }
    for failure in &report.failures {
        println!("  failed {} on {}: {}", failure.file_name, failure.host_id, failure.message);
    }
}
