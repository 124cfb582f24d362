/*
 * aurforge - AUR helper with recursive dependency builds.
 * Copyright (C) 2025  aurforge contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Snapshot download and extraction.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tar::Archive;
use tracing::{debug, warn};

use crate::config::AurConfig;
use crate::error::{AurforgeError, AurforgeResult};

/// Transfers a snapshot archive to disk
#[async_trait(?Send)]
pub trait Downloader {
    /// Download `url_path` (relative to the AUR host) into `destination`,
    /// returning the number of bytes written
    async fn download(&self, url_path: &str, destination: &Path) -> AurforgeResult<u64>;
}

/// Downloads over HTTPS from the AUR host
pub struct HttpDownloader {
    client: reqwest::Client,
    base_url: String,
    progress: bool,
}

impl HttpDownloader {
    pub fn new(config: &AurConfig, progress: bool) -> AurforgeResult<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("aurforge/", env!("CARGO_PKG_VERSION")));
        if config.request_timeout_secs > 0 {
            builder = builder.connect_timeout(Duration::from_secs(config.request_timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| AurforgeError::Other(format!("cannot create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            progress,
        })
    }

    fn progress_bar(&self, total: Option<u64>) -> Option<ProgressBar> {
        if !self.progress {
            return None;
        }
        let total = total.filter(|t| *t > 0)?;
        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        Some(pb)
    }
}

#[async_trait(?Send)]
impl Downloader for HttpDownloader {
    async fn download(&self, url_path: &str, destination: &Path) -> AurforgeResult<u64> {
        let url = format!("{}/{}", self.base_url, url_path.trim_start_matches('/'));
        debug!("downloading {} to {}", url, destination.display());

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AurforgeError::network(&url, e))?;

        if !response.status().is_success() {
            return Err(AurforgeError::HttpStatus {
                url,
                status: response.status().as_u16(),
            });
        }

        let pb = self.progress_bar(response.content_length());
        let partial = partial_path(destination);
        let file = File::create(&partial)
            .map_err(|e| AurforgeError::filesystem(&partial, "cannot create", e))?;
        let mut writer = BufWriter::new(file);

        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = fs::remove_file(&partial);
                    return Err(AurforgeError::network(&url, e));
                }
            };
            writer
                .write_all(&chunk)
                .map_err(|e| AurforgeError::filesystem(&partial, "cannot write", e))?;
            written += chunk.len() as u64;
            if let Some(ref pb) = pb {
                pb.set_position(written);
            }
        }
        writer
            .flush()
            .map_err(|e| AurforgeError::filesystem(&partial, "cannot write", e))?;
        drop(writer);

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        if written == 0 {
            let _ = fs::remove_file(&partial);
            return Err(AurforgeError::Download {
                url,
                reason: "0 bytes downloaded".to_string(),
            });
        }

        fs::rename(&partial, destination)
            .map_err(|e| AurforgeError::filesystem(destination, "cannot move into place", e))?;
        Ok(written)
    }
}

/// `foo.tar.gz` is staged as `foo.tar.gz.part` until complete
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Unpack a gzipped tarball into `into`, returning the number of entries
pub fn extract(archive: &Path, into: &Path) -> AurforgeResult<usize> {
    let extract_error = |reason: String| AurforgeError::Extract {
        archive: archive.display().to_string(),
        reason,
    };

    let file = File::open(archive).map_err(|e| extract_error(e.to_string()))?;
    let mut tarball = Archive::new(GzDecoder::new(file));
    let entries = tarball.entries().map_err(|e| extract_error(e.to_string()))?;

    let mut count = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| extract_error(e.to_string()))?;
        let unpacked = entry
            .unpack_in(into)
            .map_err(|e| extract_error(e.to_string()))?;
        if unpacked {
            count += 1;
        } else {
            warn!("skipped archive entry outside {}", into.display());
        }
    }

    if count == 0 {
        return Err(extract_error("no files extracted".to_string()));
    }
    Ok(count)
}

/// Extracted sources for one build attempt.
///
/// The build tool is pointed at [`WorkingDirectory::path`]; the process
/// working directory is never changed. With cleanup enabled the tree and
/// its archive are removed when the value is dropped, whichever way the
/// attempt ends.
#[derive(Debug)]
pub struct WorkingDirectory {
    root: PathBuf,
    path: PathBuf,
    archive: PathBuf,
    cleanup: bool,
}

impl WorkingDirectory {
    /// Reserve `<root>/<dir_name>` for a fresh extraction
    pub fn prepare(
        root: &Path,
        package: &str,
        dir_name: &str,
        cleanup: bool,
    ) -> AurforgeResult<Self> {
        fs::create_dir_all(root)
            .map_err(|e| AurforgeError::filesystem(root, "cannot create build directory", e))?;

        let path = root.join(dir_name);
        if path.exists() {
            debug!("removing stale {}", path.display());
            fs::remove_dir_all(&path).map_err(|e| {
                AurforgeError::filesystem(&path, "cannot clean old build directory", e)
            })?;
        }

        Ok(Self {
            root: root.to_path_buf(),
            archive: root.join(format!("{}.tar.gz", package)),
            path,
            cleanup,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the snapshot archive is downloaded to
    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Contents of the extracted PKGBUILD
    pub fn read_recipe(&self) -> AurforgeResult<String> {
        let recipe = self.path.join("PKGBUILD");
        fs::read_to_string(&recipe).map_err(|e| AurforgeError::Extract {
            archive: self.archive.display().to_string(),
            reason: format!("cannot read {}: {}", recipe.display(), e),
        })
    }
}

impl Drop for WorkingDirectory {
    fn drop(&mut self) {
        if !self.cleanup {
            return;
        }
        if self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                warn!("cannot remove {}: {}", self.path.display(), e);
            }
        }
        let _ = fs::remove_file(&self.archive);
        let _ = fs::remove_file(partial_path(&self.archive));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{closed_port_url, empty_archive, snapshot_archive, OneShotServer};

    fn downloader_for(base: &str) -> HttpDownloader {
        let config = AurConfig {
            base_url: base.to_string(),
            request_timeout_secs: 5,
            ..AurConfig::default()
        };
        HttpDownloader::new(&config, false).unwrap()
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/b/foo.tar.gz")),
            PathBuf::from("/tmp/b/foo.tar.gz.part")
        );
    }

    #[test]
    fn test_extract_counts_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("foo.tar.gz");
        fs::write(
            &archive,
            snapshot_archive("foo", "pkgname=foo\n", &[(".SRCINFO", "x")]),
        )
        .unwrap();

        let count = extract(&archive, dir.path()).unwrap();
        assert_eq!(count, 2);
        assert!(dir.path().join("foo/PKGBUILD").is_file());
        assert!(dir.path().join("foo/.SRCINFO").is_file());
    }

    #[test]
    fn test_extract_empty_archive_fails() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("empty.tar.gz");
        fs::write(&archive, empty_archive()).unwrap();

        let err = extract(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, AurforgeError::Extract { .. }));
        assert!(err.to_string().contains("no files extracted"));
    }

    #[test]
    fn test_extract_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.tar.gz");
        fs::write(&archive, b"<html>not a tarball</html>").unwrap();
        assert!(matches!(
            extract(&archive, dir.path()),
            Err(AurforgeError::Extract { .. })
        ));
    }

    #[test]
    fn test_working_directory_cleanup_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let wd = WorkingDirectory::prepare(dir.path(), "foo", "foo", true).unwrap();
            fs::create_dir_all(wd.path()).unwrap();
            fs::write(wd.archive(), b"x").unwrap();
            path = wd.path().to_path_buf();
            assert!(path.exists());
        }
        assert!(!path.exists());
        assert!(!dir.path().join("foo.tar.gz").exists());
    }

    #[test]
    fn test_working_directory_removes_stale_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("foo")).unwrap();
        fs::write(dir.path().join("foo/old"), b"x").unwrap();

        let wd = WorkingDirectory::prepare(dir.path(), "foo", "foo", false).unwrap();
        assert!(!wd.path().exists());
        drop(wd);
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_download_writes_body() {
        let body = snapshot_archive("foo", "pkgname=foo\n", &[]);
        let server = OneShotServer::serve(200, "application/x-gzip", body.clone());
        let downloader = downloader_for(&server.base_url);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("foo.tar.gz");

        let bytes = downloader
            .download("/cgit/aur.git/snapshot/foo.tar.gz", &dest)
            .await
            .unwrap();

        assert_eq!(bytes, body.len() as u64);
        assert_eq!(fs::read(&dest).unwrap(), body);
        assert!(!partial_path(&dest).exists());
        assert!(server
            .request_line()
            .starts_with("GET /cgit/aur.git/snapshot/foo.tar.gz "));
    }

    #[tokio::test]
    async fn test_download_zero_bytes_fails() {
        let server = OneShotServer::serve(200, "application/x-gzip", Vec::new());
        let downloader = downloader_for(&server.base_url);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("foo.tar.gz");

        let err = downloader.download("/foo.tar.gz", &dest).await.unwrap_err();
        assert!(matches!(err, AurforgeError::Download { .. }));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_download_http_error() {
        let server = OneShotServer::serve(404, "text/plain", b"gone".to_vec());
        let downloader = downloader_for(&server.base_url);
        let dir = tempfile::tempdir().unwrap();

        let err = downloader
            .download("/foo.tar.gz", &dir.path().join("foo.tar.gz"))
            .await
            .unwrap_err();
        assert!(matches!(err, AurforgeError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_download_connection_refused() {
        let downloader = downloader_for(&closed_port_url());
        let dir = tempfile::tempdir().unwrap();
        let err = downloader
            .download("/foo.tar.gz", &dir.path().join("foo.tar.gz"))
            .await
            .unwrap_err();
        assert!(matches!(err, AurforgeError::Network { .. }));
    }
}
