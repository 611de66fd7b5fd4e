//! Workspace roots and where their index shards live.

use crate::utils::normalize_path_separators;
use std::path::{Path, PathBuf};

/// Directory name used when shards are stored inside the workspace itself
pub const DEFAULT_INDEX_DIR_NAME: &str = ".zoekt-index";

/// Where index directories are placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexPlacement {
    /// `<root>/<dir_name>`
    InsideRoot { dir_name: String },
    /// `<storage_root>/<root name>-<hash>`, one subdirectory per workspace
    SharedStorage { storage_root: PathBuf },
}

impl Default for IndexPlacement {
    fn default() -> Self {
        Self::InsideRoot {
            dir_name: DEFAULT_INDEX_DIR_NAME.to_string(),
        }
    }
}

impl IndexPlacement {
    pub fn index_dir_for(&self, root: &Path) -> PathBuf {
        match self {
            IndexPlacement::InsideRoot { dir_name } => root.join(dir_name),
            IndexPlacement::SharedStorage { storage_root } => {
                let name = root
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "workspace".to_string());
                let key = normalize_path_separators(&root.to_string_lossy());
                let digest = format!("{:x}", md5::compute(key.as_bytes()));
                storage_root.join(format!("{}-{}", name, &digest[..8]))
            }
        }
    }
}

/// One workspace root and its index directory. Both are fixed for the
/// lifetime of the target; the indexing state lives in the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTarget {
    root: PathBuf,
    index_dir: PathBuf,
}

impl IndexTarget {
    pub fn new(root: impl Into<PathBuf>, index_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_dir: index_dir.into(),
        }
    }

    pub fn with_placement(root: impl Into<PathBuf>, placement: &IndexPlacement) -> Self {
        let root = root.into();
        let index_dir = placement.index_dir_for(&root);
        Self { root, index_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Progress key: the root path, case preserved
    pub fn key(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }

    /// Create the index directory (and parents) if it is missing
    pub fn ensure_index_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.index_dir)
    }

    /// Whether `path` lies inside the index directory
    pub fn is_index_path(&self, path: &Path) -> bool {
        path.starts_with(&self.index_dir)
    }
}
