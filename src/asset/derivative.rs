//! One derived representation of a media asset.

use crate::derivative::Generator;
use crate::imaging::size_in_kb;
use crate::store::DerivativeRow;
use crate::types::{AssetId, DerivativeType, MimeCategory};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// A derivative path that does not resolve under any allowed root.
#[derive(Error, Debug)]
#[error("Path {} is outside the allowed derivative roots", .path.display())]
pub struct PathOutsideRoots {
    pub path: PathBuf,
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Thumbnail, optimized or original file of a media asset.
///
/// The physical path is private: it can only be set through
/// [`set_physical_path`](Self::set_physical_path), which rejects paths
/// outside the asset's original, thumbnail and optimized directories.
#[derive(Debug, Clone)]
pub struct DerivativeRecord {
    pub kind: DerivativeType,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub file_name: String,
    pub file_size_kb: u64,
    pub mime: Option<MimeCategory>,
    /// HTML embed code; only external media have one, on the original.
    pub external_html: Option<String>,
    /// Id of the owning media asset, backfilled after its first save.
    pub media_id: AssetId,
    pub generator: Generator,
    physical_path: Option<PathBuf>,
    allowed_roots: Vec<PathBuf>,
}

impl DerivativeRecord {
    pub fn new(kind: DerivativeType, generator: Generator) -> Self {
        Self {
            kind,
            width: None,
            height: None,
            file_name: String::new(),
            file_size_kb: 0,
            mime: None,
            external_html: None,
            media_id: AssetId::UNASSIGNED,
            generator,
            physical_path: None,
            allowed_roots: Vec::new(),
        }
    }

    /// Directories a physical path may live in. A path already set that is
    /// no longer allowed is cleared.
    pub fn set_allowed_roots(&mut self, roots: impl IntoIterator<Item = PathBuf>) {
        self.allowed_roots = roots.into_iter().map(|r| normalize_path(&r)).collect();
        if let Some(path) = &self.physical_path
            && !self.is_allowed(path)
        {
            self.physical_path = None;
        }
    }

    fn is_allowed(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        self.allowed_roots.iter().any(|root| path.starts_with(root))
    }

    /// Point the record at a file. Also updates `file_name`.
    pub fn set_physical_path(&mut self, path: impl Into<PathBuf>) -> Result<(), PathOutsideRoots> {
        let path = normalize_path(&path.into());
        if !self.is_allowed(&path) {
            return Err(PathOutsideRoots { path });
        }
        self.file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.physical_path = Some(path);
        Ok(())
    }

    pub fn physical_path(&self) -> Option<&Path> {
        self.physical_path.as_deref()
    }

    /// Whether the record points at a file that exists on disk.
    pub fn exists(&self) -> bool {
        self.physical_path.as_deref().is_some_and(Path::is_file)
    }

    /// Fill size and dimensions after the file at the physical path was
    /// written.
    pub fn record_file(&mut self, dimensions: Option<(u32, u32)>) -> std::io::Result<()> {
        let bytes = match &self.physical_path {
            Some(path) => std::fs::metadata(path)?.len(),
            None => 0,
        };
        self.file_size_kb = size_in_kb(bytes);
        self.width = dimensions.map(|d| d.0);
        self.height = dimensions.map(|d| d.1);
        self.mime = Some(MimeCategory::from_path(Path::new(&self.file_name)));
        Ok(())
    }

    /// Make this record describe the same file as `other`. Returns whether
    /// anything changed.
    pub fn copy_from(&mut self, other: &DerivativeRecord) -> bool {
        let before = (
            self.file_name.clone(),
            self.width,
            self.height,
            self.file_size_kb,
            self.mime,
            self.physical_path.clone(),
        );
        self.file_name = other.file_name.clone();
        self.width = other.width;
        self.height = other.height;
        self.file_size_kb = other.file_size_kb;
        self.mime = other.mime;
        self.physical_path = other.physical_path.clone();
        before
            != (
                self.file_name.clone(),
                self.width,
                self.height,
                self.file_size_kb,
                self.mime,
                self.physical_path.clone(),
            )
    }

    /// Whether both records name the same file.
    pub fn shares_file_with(&self, other: &DerivativeRecord) -> bool {
        self.physical_path.is_some() && self.physical_path == other.physical_path
    }

    pub fn clear(&mut self) {
        self.width = None;
        self.height = None;
        self.file_name.clear();
        self.file_size_kb = 0;
        self.mime = None;
        self.physical_path = None;
    }

    pub fn to_row(&self) -> DerivativeRow {
        DerivativeRow {
            file_name: self.file_name.clone(),
            width: self.width,
            height: self.height,
            file_size_kb: self.file_size_kb,
            mime: self.mime,
        }
    }

    /// Load persisted fields; the physical path is `dir` + file name.
    pub fn apply_row(&mut self, row: &DerivativeRow, dir: &Path) -> Result<(), PathOutsideRoots> {
        self.width = row.width;
        self.height = row.height;
        self.file_size_kb = row.file_size_kb;
        self.mime = row.mime;
        self.file_name = row.file_name.clone();
        self.physical_path = None;
        if !row.file_name.is_empty() {
            self.set_physical_path(dir.join(&row.file_name))?;
        }
        Ok(())
    }

    /// Longer of the two recorded dimensions.
    pub fn longer_side(&self) -> Option<u32> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(w.max(h)),
            _ => None,
        }
    }
}
