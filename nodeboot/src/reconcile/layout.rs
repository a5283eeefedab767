//! Filesystem layout of a build node

use std::path::PathBuf;

/// Default root of the build node on the target host
pub const DEFAULT_NODE_ROOT: &str = "/srv/buildnode";

/// Layout of the build node's working tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLayout {
    /// Base directory for everything the node owns
    pub base_dir: PathBuf,
}

impl NodeLayout {
    /// Create a new node layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Scratch space for builds
    pub fn work_dir(&self) -> PathBuf {
        self.base_dir.join("work")
    }

    /// Download and build caches
    pub fn cache_dir(&self) -> PathBuf {
        self.base_dir.join("cache")
    }

    /// Node service logs
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Checkout of the build-node sources
    pub fn source_dir(&self) -> PathBuf {
        self.base_dir.join("src")
    }

    /// Isolated dependency environment
    pub fn venv_dir(&self) -> PathBuf {
        self.base_dir.join("venv")
    }

    /// Desired-state declaration rendered for the node
    pub fn declaration_file(&self) -> PathBuf {
        self.base_dir.join("node.yml")
    }

    /// Directories that must exist, parents first
    pub fn directories(&self) -> Vec<PathBuf> {
        vec![
            self.base_dir.clone(),
            self.work_dir(),
            self.cache_dir(),
            self.logs_dir(),
        ]
    }
}

impl Default for NodeLayout {
    fn default() -> Self {
        Self::new(DEFAULT_NODE_ROOT)
    }
}
