//! Download and unpack the reference release bundle

use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::error::SyncError;
use crate::logging::*;

pub const ARCHIVE_NAME: &str = "release.tar.gz";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// `{base}/{version}.tar.gz`
pub fn release_url(base_url: &str, version: &str) -> String {
	format!("{}/{}.tar.gz", base_url.trim_end_matches('/'), version.trim())
}

pub struct ReleaseFetcher {
	http: Client,
	base_url: String,
}

impl ReleaseFetcher {
	pub fn new(base_url: impl Into<String>) -> Result<Self, SyncError> {
		let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
		Ok(ReleaseFetcher { http, base_url: base_url.into() })
	}

	/// Replace `dest` with the contents of release `version`
	///
	/// The archive's leading `{project}-{version}/` directory is stripped and
	/// the archive itself is removed afterwards.
	pub async fn fetch(&self, version: &str, dest: &Path) -> Result<PathBuf, SyncError> {
		let version = version.trim();
		if version.is_empty() {
			return Err(SyncError::InvalidConfig { message: "Release version is empty".to_string() });
		}

		if tokio::fs::metadata(dest).await.is_ok() {
			info!("Cleaning folder: {}", dest.display());
			tokio::fs::remove_dir_all(dest).await.map_err(|e| SyncError::io(dest, e))?;
		}
		tokio::fs::create_dir_all(dest).await.map_err(|e| SyncError::io(dest, e))?;

		let url = release_url(&self.base_url, version);
		let archive = dest.join(ARCHIVE_NAME);
		let bytes = self.download(&url, &archive).await?;
		info!("Downloaded {} ({} bytes)", url, bytes);

		extract_archive(&archive, dest).await?;
		tokio::fs::remove_file(&archive).await.map_err(|e| SyncError::io(&archive, e))?;

		Ok(dest.to_path_buf())
	}

	async fn download(&self, url: &str, archive: &Path) -> Result<u64, SyncError> {
		debug!("GET {}", url);
		let mut response = self.http.get(url).send().await?;
		let status = response.status();
		if !status.is_success() {
			return Err(SyncError::Fetch { message: format!("{} returned {}", url, status) });
		}

		let mut file = tokio::fs::File::create(archive).await.map_err(|e| SyncError::io(archive, e))?;
		let mut written = 0u64;
		while let Some(chunk) = response.chunk().await? {
			file.write_all(&chunk).await.map_err(|e| SyncError::io(archive, e))?;
			written += chunk.len() as u64;
		}
		file.flush().await.map_err(|e| SyncError::io(archive, e))?;
		Ok(written)
	}
}

/// Unpack a gzipped tarball into `dest` with the system `tar`, dropping the
/// first path component
pub async fn extract_archive(archive: &Path, dest: &Path) -> Result<(), SyncError> {
	let output = tokio::process::Command::new("tar")
		.arg("-xzf")
		.arg(archive)
		.arg("-C")
		.arg(dest)
		.arg("--strip-components=1")
		.output()
		.await
		.map_err(|e| SyncError::Fetch { message: format!("Cannot run tar: {}", e) })?;

	if !output.status.success() {
		return Err(SyncError::Fetch {
			message: format!(
				"tar failed on {}: {}",
				archive.display(),
				String::from_utf8_lossy(&output.stderr).trim()
			),
		});
	}
	Ok(())
}


// vim: ts=4
