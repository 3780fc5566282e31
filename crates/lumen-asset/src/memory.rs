//! In-memory filesystem and transport
//!
//! Implements both [`Fetch`] and [`Probe`] over shared state so a cache can
//! be exercised without network or disk. Clones share the same state.

use crate::cache::Probe;
use crate::fetch::Fetch;
use lumen_core::{LumenError, Result};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct MemoryState {
    files: BTreeSet<PathBuf>,
    dirs: BTreeSet<PathBuf>,
    failing: HashSet<String>,
    fetches: Vec<(String, PathBuf)>,
}

#[derive(Clone, Default)]
pub struct MemoryFs {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pretend `path` (and its ancestors) already exist
    pub fn insert_file(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut state = self.state();
        for ancestor in path.ancestors().skip(1) {
            if !ancestor.as_os_str().is_empty() {
                state.dirs.insert(ancestor.to_path_buf());
            }
        }
        state.files.insert(path);
    }

    pub fn insert_dir(&self, path: impl Into<PathBuf>) {
        self.state().dirs.insert(path.into());
    }

    /// Make every fetch of `url` fail
    pub fn fail_url(&self, url: impl Into<String>) {
        self.state().failing.insert(url.into());
    }

    /// Number of fetch attempts, failed ones included
    pub fn fetch_count(&self) -> usize {
        self.state().fetches.len()
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.state().fetches.iter().map(|(url, _)| url.clone()).collect()
    }
}

impl Fetch for MemoryFs {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let mut state = self.state();
        state.fetches.push((url.to_string(), dest.to_path_buf()));
        if state.failing.contains(url) {
            return Err(LumenError::FetchFailure {
                url: url.to_string(),
                reason: "simulated transport error".to_string(),
            });
        }
        state.files.insert(dest.to_path_buf());
        Ok(())
    }
}

impl Probe for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        let state = self.state();
        state.files.contains(path) || state.dirs.contains(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.state();
        for ancestor in path.ancestors() {
            if !ancestor.as_os_str().is_empty() {
                state.dirs.insert(ancestor.to_path_buf());
            }
        }
        Ok(())
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let state = self.state();
        if !state.dirs.contains(dir) {
            return Err(LumenError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", dir.display()),
            )));
        }
        // BTreeSet iteration keeps the result sorted
        Ok(state
            .files
            .iter()
            .filter(|f| f.parent() == Some(dir))
            .filter_map(|f| f.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect())
    }
}
