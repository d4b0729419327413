use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// One local file of a gallery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    /// Pixel dimensions, when the caller pre-scanned the file.
    pub dimensions: Option<(u32, u32)>,
}

impl GalleryFile {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            path,
            name,
            size,
            dimensions: None,
        }
    }

    /// Build from a file on disk, reading its size.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path)?;
        Ok(Self::new(path, meta.len()))
    }

    #[must_use]
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some((width, height));
        self
    }
}

/// Everything needed to upload one gallery.
#[derive(Debug, Clone, Default)]
pub struct GalleryRequest {
    pub name: String,
    pub files: Vec<GalleryFile>,
    /// Host ids to upload to.
    pub hosts: Vec<String>,
    /// File names uploaded by a previous run. Skipped, but still counted.
    pub already_uploaded: HashSet<String>,
    /// Gallery ids the caller already holds, by host id.
    pub existing_gallery_ids: BTreeMap<String, String>,
}

impl GalleryRequest {
    pub fn new(name: impl Into<String>, files: Vec<GalleryFile>) -> Self {
        Self {
            name: name.into(),
            files,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn host(mut self, host_id: impl Into<String>) -> Self {
        self.hosts.push(host_id.into());
        self
    }

    #[must_use]
    pub fn hosts<I, S>(mut self, host_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts.extend(host_ids.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn already_uploaded<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.already_uploaded.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn existing_gallery(mut self, host_id: impl Into<String>, gallery_id: impl Into<String>) -> Self {
        self.existing_gallery_ids.insert(host_id.into(), gallery_id.into());
        self
    }
}
