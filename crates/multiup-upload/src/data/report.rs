use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::data::gallery::GalleryFile;
use crate::data::result::{UploadOutcome, UploadResult};

/// Summary of one gallery upload across every host.
///
/// Counts are per (file, host) pair. `skipped` counts pairs resumed from a
/// previous run through the gallery's already-uploaded set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GalleryUploadReport {
    pub gallery_name: String,
    pub per_host: BTreeMap<String, Vec<UploadResult>>,
    pub gallery_ids: BTreeMap<String, String>,
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub total_bytes: u64,
    pub elapsed_secs: f64,
    pub average_throughput_bps: f64,
    pub dimensions: Option<DimensionStats>,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub file_name: String,
    pub host_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DimensionStats {
    pub average_width: f64,
    pub average_height: f64,
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl DimensionStats {
    /// Aggregate over files that carry dimensions. `None` if none do.
    pub fn from_files(files: &[GalleryFile]) -> Option<Self> {
        let dims: Vec<(u32, u32)> = files.iter().filter_map(|f| f.dimensions).collect();
        if dims.is_empty() {
            return None;
        }
        let n = dims.len() as f64;
        let (sum_w, sum_h) = dims
            .iter()
            .fold((0u64, 0u64), |(w, h), (dw, dh)| (w + u64::from(*dw), h + u64::from(*dh)));
        Some(Self {
            average_width: sum_w as f64 / n,
            average_height: sum_h as f64 / n,
            min_width: dims.iter().map(|d| d.0).min().unwrap_or(0),
            min_height: dims.iter().map(|d| d.1).min().unwrap_or(0),
            max_width: dims.iter().map(|d| d.0).max().unwrap_or(0),
            max_height: dims.iter().map(|d| d.1).max().unwrap_or(0),
        })
    }
}

impl GalleryUploadReport {
    pub fn new(gallery_name: impl Into<String>, total_files: usize) -> Self {
        Self {
            gallery_name: gallery_name.into(),
            total_files,
            ..Self::default()
        }
    }

    pub fn record(&mut self, result: UploadResult) {
        match &result.outcome {
            UploadOutcome::Completed(_) => self.succeeded += 1,
            UploadOutcome::Cancelled => self.cancelled += 1,
            UploadOutcome::Failed(failure) => {
                self.failed += 1;
                self.failures.push(FileFailure {
                    file_name: result.file_name.clone(),
                    host_id: result.host_id.clone(),
                    message: failure.message.clone(),
                });
            }
        }
        self.per_host
            .entry(result.host_id.clone())
            .or_default()
            .push(result);
    }

    /// Close the report: order results by file, then fill in totals.
    pub fn finish(&mut self, order: &[GalleryFile], total_bytes: u64, elapsed: Duration) {
        let position = |name: &str| order.iter().position(|f| f.name == name).unwrap_or(usize::MAX);
        for results in self.per_host.values_mut() {
            results.sort_by_key(|r| position(&r.file_name));
        }
        self.failures
            .sort_by(|a, b| (position(&a.file_name), &a.host_id).cmp(&(position(&b.file_name), &b.host_id)));

        self.total_bytes = total_bytes;
        self.elapsed_secs = elapsed.as_secs_f64();
        self.average_throughput_bps = if self.elapsed_secs > 0.0 {
            total_bytes as f64 / self.elapsed_secs
        } else {
            0.0
        };
        self.dimensions = DimensionStats::from_files(order);
    }

    /// Every successful download link for `host_id`, in gallery order.
    pub fn links(&self, host_id: &str) -> Vec<&str> {
        self.per_host
            .get(host_id)
            .map(|results| results.iter().filter_map(UploadResult::download_url).collect())
            .unwrap_or_default()
    }

    /// Partial success is a normal terminal state; this is true only when
    /// nothing failed or was cancelled.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::result::{UploadFailure, UploadSuccess};
    use crate::error::ErrorKind;

    fn success(name: &str) -> UploadResult {
        UploadResult::completed(
            name,
            "h",
            1,
            UploadSuccess {
                download_url: format!("https://h/{name}"),
                host_file_id: None,
                bytes_uploaded: 10,
                elapsed_secs: 0.1,
                deduplicated: false,
            },
        )
    }

    #[test]
    fn results_are_ordered_by_gallery_position() {
        let files = vec![
            GalleryFile::new("/g/1.jpg", 10),
            GalleryFile::new("/g/2.jpg", 10),
            GalleryFile::new("/g/10.jpg", 10),
        ];
        let mut report = GalleryUploadReport::new("g", 3);
        report.record(success("10.jpg"));
        report.record(success("1.jpg"));
        report.record(UploadResult::failed(
            "2.jpg",
            "h",
            3,
            UploadFailure {
                kind: ErrorKind::Network,
                message: "reset".into(),
                status: None,
                retries_exhausted: true,
            },
        ));
        report.finish(&files, 20, Duration::from_secs(2));

        assert_eq!(report.links("h"), vec!["https://h/1.jpg", "https://h/10.jpg"]);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].file_name, "2.jpg");
        assert_eq!(report.average_throughput_bps, 10.0);
        assert!(!report.is_complete());
    }

    #[test]
    fn dimension_stats_skip_unscanned_files() {
        let files = vec![
            GalleryFile::new("/g/a.jpg", 1).with_dimensions(100, 50),
            GalleryFile::new("/g/b.jpg", 1),
            GalleryFile::new("/g/c.jpg", 1).with_dimensions(300, 150),
        ];
        let stats = DimensionStats::from_files(&files).unwrap();
        assert_eq!(stats.average_width, 200.0);
        assert_eq!(stats.min_height, 50);
        assert_eq!(stats.max_width, 300);
        assert!(DimensionStats::from_files(&files[1..2]).is_none());
    }
}
