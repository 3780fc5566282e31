//! Download transports

use lumen_core::{LumenError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 3600;
const MAX_RETRIES: usize = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;
const DEFAULT_FETCH_PROGRAM: &str = "pget";

/// Capability that places the resource at `url` into `dest`.
///
/// Implementations must either leave a complete file at `dest` or fail.
pub trait Fetch: Send {
    /// Transport name for diagnostics (e.g. "http", "pget")
    fn name(&self) -> &str;

    /// Download `url` to `dest`. The parent directory already exists.
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Blocking HTTP(S) downloader
pub struct HttpFetcher {
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn build_agent(&self) -> ureq::Agent {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build();
        config.into()
    }

    fn download_once(
        &self,
        url: &str,
        partial: &Path,
    ) -> std::result::Result<(), FetchAttemptError> {
        let response = self
            .build_agent()
            .get(url)
            .call()
            .map_err(FetchAttemptError::Http)?;

        let mut reader = response.into_body().into_reader();
        let mut file = std::fs::File::create(partial).map_err(FetchAttemptError::Local)?;
        std::io::copy(&mut reader, &mut file).map_err(FetchAttemptError::Local)?;
        Ok(())
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

enum FetchAttemptError {
    Http(ureq::Error),
    Local(std::io::Error),
}

impl Fetch for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        // Stream into a sibling file so an interrupted download never
        // masquerades as a cached one.
        let partial = partial_path(dest);

        for attempt in 0..MAX_RETRIES {
            match self.download_once(url, &partial) {
                Ok(()) => {
                    std::fs::rename(&partial, dest)?;
                    return Ok(());
                }
                Err(FetchAttemptError::Http(e)) => {
                    std::fs::remove_file(&partial).ok();
                    if attempt + 1 < MAX_RETRIES && is_retryable_error(&e) {
                        tracing::warn!(url, attempt = attempt + 1, error = %e, "retrying download");
                        sleep_backoff(attempt);
                        continue;
                    }
                    return Err(LumenError::FetchFailure {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(FetchAttemptError::Local(e)) => {
                    std::fs::remove_file(&partial).ok();
                    return Err(LumenError::FetchFailure {
                        url: url.to_string(),
                        reason: format!("failed writing {}: {}", partial.display(), e),
                    });
                }
            }
        }

        Err(LumenError::FetchFailure {
            url: url.to_string(),
            reason: "download failed after retries".to_string(),
        })
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name: OsString = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn is_retryable_error(e: &ureq::Error) -> bool {
    match e {
        ureq::Error::Timeout(_)
        | ureq::Error::Io(_)
        | ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound => true,
        ureq::Error::StatusCode(code) => matches!(code, 429 | 500 | 502 | 503 | 504),
        _ => false,
    }
}

fn sleep_backoff(attempt: usize) {
    let delay_ms = RETRY_BASE_DELAY_MS.saturating_mul(1u64 << attempt);
    std::thread::sleep(Duration::from_millis(delay_ms));
}

/// Delegates the download to an external program invoked as
/// `<program> <url> <dest>` (`pget` by default).
pub struct CommandFetcher {
    program: String,
}

impl CommandFetcher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_PROGRAM)
    }
}

impl Fetch for CommandFetcher {
    fn name(&self) -> &str {
        &self.program
    }

    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let status = Command::new(&self.program)
            .arg(url)
            .arg(dest)
            .status()
            .map_err(|e| LumenError::FetchFailure {
                url: url.to_string(),
                reason: format!("failed to run {}: {}", self.program, e),
            })?;

        if !status.success() {
            return Err(LumenError::FetchFailure {
                url: url.to_string(),
                reason: format!("{} exited with {}", self.program, status),
            });
        }
        Ok(())
    }
}
