//! Content-addressed download cache.
//!
//! Files are stored at `<cache_dir>/<url_key>/<file_name>`. The key is a short
//! SHA-256 of the URL, so the same URL always maps to the same place and is
//! fetched at most once. A changed artifact behind an unchanged URL needs the
//! cache entry removed by hand.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::io::process::{RunOptions, run_checked};

/// Cache key for a URL: 16 hex chars of its SHA-256.
pub fn url_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

/// File name for a URL: the last non-empty path segment, else the host.
pub fn url_file_name(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url).with_context(|| format!("parse url {url}"))?;
    let from_path = parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(str::to_string);
    from_path
        .or_else(|| parsed.host_str().map(str::to_string))
        .ok_or_else(|| anyhow!("cannot derive a file name from {url}"))
}

/// A cached artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub local: PathBuf,
    pub key: String,
    pub file_name: String,
}

impl CachedFile {
    /// The same relative location under another (remote, POSIX) cache root.
    pub fn mirrored_path(&self, remote_root: &str) -> String {
        format!(
            "{}/{}/{}",
            remote_root.trim_end_matches('/'),
            self.key,
            self.file_name
        )
    }
}

/// Abstraction over the local download cache.
pub trait DownloadCache {
    /// Ensure `url` is cached locally and return where it lives.
    fn get(&self, url: &str) -> Result<CachedFile>;
}

/// Downloads a URL to a local file.
pub trait Fetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Fetcher that shells out to `curl`.
#[derive(Debug, Clone)]
pub struct CurlFetcher {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Fetcher for CurlFetcher {
    #[instrument(skip_all, fields(url = %url))]
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        info!(url, dest = %dest.display(), "downloading");
        let mut cmd = Command::new("curl");
        cmd.arg("-fsSL")
            .arg("--retry")
            .arg("3")
            .arg("-o")
            .arg(dest)
            .arg(url);
        run_checked(
            cmd,
            &RunOptions {
                timeout: self.timeout,
                output_limit_bytes: self.output_limit_bytes,
                echo_label: None,
            },
        )
        .with_context(|| format!("download {url}"))?;
        Ok(())
    }
}

/// Filesystem-backed [`DownloadCache`].
#[derive(Debug, Clone)]
pub struct FileCache<F> {
    root: PathBuf,
    fetcher: F,
}

impl<F: Fetcher> FileCache<F> {
    pub fn new(root: impl Into<PathBuf>, fetcher: F) -> Self {
        Self {
            root: root.into(),
            fetcher,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Where `url` is (or would be) cached.
    pub fn cache_path(&self, url: &str) -> Result<PathBuf> {
        Ok(self.root.join(url_key(url)).join(url_file_name(url)?))
    }
}

impl<F: Fetcher> DownloadCache for FileCache<F> {
    #[instrument(skip_all, fields(url = %url))]
    fn get(&self, url: &str) -> Result<CachedFile> {
        let key = url_key(url);
        let file_name = url_file_name(url)?;
        let local = self.root.join(&key).join(&file_name);

        if local.is_file() {
            debug!(path = %local.display(), "cache hit");
        } else {
            let dir = self.root.join(&key);
            fs::create_dir_all(&dir)
                .with_context(|| format!("create cache dir {}", dir.display()))?;
            let partial = dir.join(format!("{file_name}.part"));
            self.fetcher.fetch(url, &partial)?;
            fs::rename(&partial, &local)
                .with_context(|| format!("replace cache entry {}", local.display()))?;
            debug!(path = %local.display(), "cached");
        }

        Ok(CachedFile {
            local,
            key,
            file_name,
        })
    }
}
