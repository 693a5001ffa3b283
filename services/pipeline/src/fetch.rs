//! Downloads the employees CSV and stores it on the local filesystem.
//!
//! The body goes to a `.part` file next to the destination first. It is
//! renamed into place only after the header check passes, so a failed fetch
//! never leaves a truncated or mismatched file at the destination path.

use crate::error::{PipelineError, Result};
use crate::schema;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;

/// A downloaded and header-validated CSV file
#[derive(Debug, Clone)]
pub struct FetchedCsv {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub content_hash: String,
}

/// Build the HTTP client used for the download.
pub fn build_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("employees-etl/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

/// Fetch `url`, write the body verbatim to `dest` and validate its header.
pub async fn fetch_csv(client: &reqwest::Client, url: &str, dest: &Path) -> Result<FetchedCsv> {
    tracing::info!(%url, "fetching employees CSV");
    let resp = client.get(url).send().await?.error_for_status()?;
    let bytes = resp.bytes().await?;

    let size_bytes = bytes.len() as u64;
    let content_hash = content_hash(&bytes);
    tracing::info!(size_bytes, hash = %content_hash, "downloaded");

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    let part = part_path(dest);
    let stored = async {
        fs::write(&part, &bytes).await?;
        schema::validate_header(&part).await?;
        fs::rename(&part, dest).await?;
        Ok::<(), PipelineError>(())
    }
    .await;

    if let Err(e) = stored {
        if let Err(cleanup) = fs::remove_file(&part).await {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %part.display(), error = %cleanup, "could not remove part file");
            }
        }
        return Err(e);
    }

    tracing::info!(path = %dest.display(), "saved");

    Ok(FetchedCsv {
        path: dest.to_path_buf(),
        size_bytes,
        content_hash,
    })
}
