//! Path-addressed cache for remote weight files

use crate::fetch::Fetch;
use lumen_core::{ContentHash, LumenError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// What a remote asset is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Base checkpoint; a prediction cannot run without it
    BaseModel,
    /// LoRA file; a failed download only drops that adapter
    StyleAdapter,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::BaseModel => write!(f, "base model"),
            AssetKind::StyleAdapter => write!(f, "style adapter"),
        }
    }
}

/// A remote resource and the local path it is cached at.
///
/// Identity is `local_path`: two assets with the same path are the same
/// cache entry whatever their URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAsset {
    pub url: String,
    pub local_path: PathBuf,
    pub kind: AssetKind,
}

impl RemoteAsset {
    pub fn new(url: impl Into<String>, local_path: impl Into<PathBuf>, kind: AssetKind) -> Self {
        Self {
            url: url.into(),
            local_path: local_path.into(),
            kind,
        }
    }
}

/// Result of [`AssetCache::ensure`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The file was already present; nothing was downloaded
    Cached,
    /// The file was downloaded by this call
    Fetched {
        elapsed: Duration,
        /// Digest of the downloaded file, when it could be read back
        hash: Option<ContentHash>,
    },
}

impl FetchOutcome {
    pub fn was_fetched(&self) -> bool {
        matches!(self, FetchOutcome::Fetched { .. })
    }
}

/// Filesystem queries the cache depends on
pub trait Probe: Send {
    fn exists(&self, path: &Path) -> bool;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// File names directly inside `dir`, sorted
    fn list_dir(&self, dir: &Path) -> Result<Vec<String>>;
}

/// [`Probe`] backed by the real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskProbe;

impl Probe for DiskProbe {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Process-wide, append-only cache of downloaded assets.
///
/// Writes are not locked: two processes missing the same file will both
/// fetch it.
pub struct AssetCache {
    fetcher: Box<dyn Fetch>,
    probe: Box<dyn Probe>,
}

impl AssetCache {
    pub fn new(fetcher: Box<dyn Fetch>, probe: Box<dyn Probe>) -> Self {
        Self { fetcher, probe }
    }

    /// Cache on the real filesystem using the given transport
    pub fn on_disk(fetcher: Box<dyn Fetch>) -> Self {
        Self::new(fetcher, Box::new(DiskProbe))
    }

    /// Make sure `asset` exists locally, downloading it if it does not.
    ///
    /// Fetch errors are returned for every kind; whether they are fatal is
    /// the caller's decision.
    pub fn ensure(&self, asset: &RemoteAsset) -> Result<FetchOutcome> {
        let path = &asset.local_path;
        if self.probe.exists(path) {
            tracing::info!(kind = %asset.kind, path = %path.display(), "already cached");
            return Ok(FetchOutcome::Cached);
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.probe.create_dir_all(parent)?;
        }

        tracing::info!(
            kind = %asset.kind,
            url = %asset.url,
            dest = %path.display(),
            via = self.fetcher.name(),
            "downloading"
        );
        let start = Instant::now();
        self.fetcher.fetch(&asset.url, path)?;
        let elapsed = start.elapsed();

        if !self.probe.exists(path) {
            return Err(LumenError::FetchFailure {
                url: asset.url.clone(),
                reason: format!("fetcher produced no file at {}", path.display()),
            });
        }

        let hash = ContentHash::from_file(path).ok();
        match hash {
            Some(h) => tracing::info!(
                dest = %path.display(),
                secs = elapsed.as_secs_f64(),
                sha256 = %h.to_prefixed_hex(),
                "download finished"
            ),
            None => tracing::info!(
                dest = %path.display(),
                secs = elapsed.as_secs_f64(),
                "download finished"
            ),
        }

        Ok(FetchOutcome::Fetched { elapsed, hash })
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.probe.exists(path)
    }

    /// Sorted names of the files in `dir` ending with `.{extension}`
    pub fn list_dir(&self, dir: &Path, extension: &str) -> Result<Vec<String>> {
        let suffix = format!(".{}", extension);
        Ok(self
            .probe
            .list_dir(dir)?
            .into_iter()
            .filter(|name| name.ends_with(&suffix))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFs;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lumen_cache_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Writes the URL as the file body
    struct EchoFetcher;

    impl Fetch for EchoFetcher {
        fn name(&self) -> &str {
            "echo"
        }

        fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
            std::fs::write(dest, url)?;
            Ok(())
        }
    }

    /// Reports success without writing anything
    struct SilentFetcher;

    impl Fetch for SilentFetcher {
        fn name(&self) -> &str {
            "silent"
        }

        fn fetch(&self, _url: &str, _dest: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_ensure_fetches_once() {
        let fs = MemoryFs::new();
        let cache = AssetCache::new(Box::new(fs.clone()), Box::new(fs.clone()));
        let asset = RemoteAsset::new(
            "https://example.com/base.safetensors",
            "/models/base.safetensors",
            AssetKind::BaseModel,
        );

        let first = cache.ensure(&asset).unwrap();
        let second = cache.ensure(&asset).unwrap();

        assert!(first.was_fetched());
        assert_eq!(second, FetchOutcome::Cached);
        assert_eq!(fs.fetch_count(), 1);
        assert!(cache.is_cached(Path::new("/models/base.safetensors")));
    }

    #[test]
    fn test_identity_is_local_path() {
        let fs = MemoryFs::new();
        let cache = AssetCache::new(Box::new(fs.clone()), Box::new(fs.clone()));

        let kind = AssetKind::StyleAdapter;
        let a = RemoteAsset::new("https://a.example/x", "/lora/x.safetensors", kind);
        let b = RemoteAsset::new("https://b.example/x", "/lora/x.safetensors", kind);
        cache.ensure(&a).unwrap();
        assert_eq!(cache.ensure(&b).unwrap(), FetchOutcome::Cached);
        assert_eq!(fs.fetched_urls(), vec!["https://a.example/x".to_string()]);
    }

    #[test]
    fn test_existing_file_is_never_fetched() {
        let fs = MemoryFs::new();
        fs.insert_file("/models/base.safetensors");
        let cache = AssetCache::new(Box::new(fs.clone()), Box::new(fs.clone()));

        let asset = RemoteAsset::new("https://x", "/models/base.safetensors", AssetKind::BaseModel);
        assert_eq!(cache.ensure(&asset).unwrap(), FetchOutcome::Cached);
        assert_eq!(fs.fetch_count(), 0);
    }

    #[test]
    fn test_failed_fetch_is_not_cached() {
        let fs = MemoryFs::new();
        fs.fail_url("https://broken.example/a");
        let cache = AssetCache::new(Box::new(fs.clone()), Box::new(fs.clone()));
        let asset = RemoteAsset::new(
            "https://broken.example/a",
            "/lora/a.safetensors",
            AssetKind::StyleAdapter,
        );

        let err = cache.ensure(&asset).unwrap_err();
        assert!(matches!(err, LumenError::FetchFailure { .. }));
        assert!(!cache.is_cached(&asset.local_path));

        // A later attempt tries the transport again
        assert!(cache.ensure(&asset).is_err());
        assert_eq!(fs.fetch_count(), 2);
    }

    #[test]
    fn test_fetch_without_file_is_failure() {
        let root = temp_dir();
        let cache = AssetCache::on_disk(Box::new(SilentFetcher));
        let asset = RemoteAsset::new(
            "https://example.com/base",
            root.join("base.safetensors"),
            AssetKind::BaseModel,
        );

        let err = cache.ensure(&asset).unwrap_err();
        assert!(matches!(
            err,
            LumenError::FetchFailure { ref reason, .. } if reason.contains("no file")
        ));
        assert!(!cache.is_cached(&asset.local_path));

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_ensure_creates_parent_dirs_on_disk() {
        let root = temp_dir();
        let cache = AssetCache::on_disk(Box::new(EchoFetcher));
        let dest = root.join("models").join("Lora").join("style.safetensors");
        let asset = RemoteAsset::new("https://example.com/style", &dest, AssetKind::StyleAdapter);

        let outcome = cache.ensure(&asset).unwrap();
        match outcome {
            FetchOutcome::Fetched { hash, .. } => {
                assert_eq!(hash, Some(ContentHash::from_bytes(b"https://example.com/style")));
            }
            FetchOutcome::Cached => panic!("expected a fetch"),
        }
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "https://example.com/style");
        assert_eq!(cache.ensure(&asset).unwrap(), FetchOutcome::Cached);

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_list_dir_filters_extension() {
        let root = temp_dir();
        std::fs::write(root.join("b.safetensors"), b"").unwrap();
        std::fs::write(root.join("a.safetensors"), b"").unwrap();
        std::fs::write(root.join("notes.txt"), b"").unwrap();
        std::fs::create_dir_all(root.join("sub.safetensors")).unwrap();

        let cache = AssetCache::on_disk(Box::new(EchoFetcher));
        let names = cache.list_dir(&root, "safetensors").unwrap();
        assert_eq!(names, vec!["a.safetensors", "b.safetensors"]);

        std::fs::remove_dir_all(&root).ok();
    }
}
