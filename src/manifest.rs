//! Manifest references.
//!
//! A manifest is an opaque file the cluster client applies or deletes. The
//! harness never reads its contents; it only resolves where the file lives.

use std::fmt;
use std::path::{Path, PathBuf};

/// Cluster operation a manifest reference is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestOp {
    /// Create or update every object in the file
    Apply,
    /// Remove every object in the file
    Delete,
}

impl fmt::Display for ManifestOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestOp::Apply => write!(f, "apply"),
            ManifestOp::Delete => write!(f, "delete"),
        }
    }
}

/// A resolved manifest path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ManifestReference {
    path: PathBuf,
}

impl ManifestReference {
    /// Operations every manifest reference supports
    pub const OPERATIONS: [ManifestOp; 2] = [ManifestOp::Apply, ManifestOp::Delete];

    /// Reference a manifest at `path`, made absolute against the current directory.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Self { path }
    }

    /// Resolved path of the manifest
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the reference can be used for `op`
    pub fn supports(&self, op: ManifestOp) -> bool {
        Self::OPERATIONS.contains(&op)
    }

    /// kubectl arguments performing `op` on this manifest
    pub fn kubectl_args(&self, op: ManifestOp) -> Vec<String> {
        vec![
            op.to_string(),
            "-f".to_string(),
            self.path.display().to_string(),
        ]
    }
}

impl fmt::Display for ManifestReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Resolves manifest names against the harness's manifest roots.
#[derive(Debug, Clone)]
pub struct ManifestResolver {
    crd_dir: PathBuf,
    manifest_dir: PathBuf,
}

impl ManifestResolver {
    /// Create a resolver with the given CRD and manifest directories
    pub fn new(crd_dir: impl Into<PathBuf>, manifest_dir: impl Into<PathBuf>) -> Self {
        Self {
            crd_dir: crd_dir.into(),
            manifest_dir: manifest_dir.into(),
        }
    }

    /// Reference a CRD manifest by file name
    pub fn crd(&self, file_name: impl AsRef<Path>) -> ManifestReference {
        ManifestReference::new(self.crd_dir.join(file_name))
    }

    /// Reference a test manifest (values files and the like) by file name
    pub fn manifest(&self, file_name: impl AsRef<Path>) -> ManifestReference {
        ManifestReference::new(self.manifest_dir.join(file_name))
    }
}
