//! Archive fetcher
//!
//! Resolves a source locator to a local zip file and fingerprints it.
//! `http(s)://` locators are streamed into a temporary file that lives as long
//! as the returned [`FetchedArchive`]; anything else is read in place.

use futures::StreamExt;
use namestat_common::checksum::compute_file_checksum;
use namestat_common::ChecksumAlgorithm;
use reqwest::{header, redirect, Client};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::HttpConfig;
use crate::error::{IngestError, Result};

const MAX_REDIRECTS: usize = 10;

/// A local copy of an archive plus its content checksum
#[derive(Debug)]
pub struct FetchedArchive {
    path: PathBuf,
    size: u64,
    checksum: String,
    // Removed from disk on drop.
    download: Option<NamedTempFile>,
}

impl FetchedArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn is_download(&self) -> bool {
        self.download.is_some()
    }
}

/// HTTP/local archive retrieval with checksum
#[derive(Clone)]
pub struct ArchiveFetcher {
    client: Client,
    referer: Option<String>,
    algorithm: ChecksumAlgorithm,
}

fn is_remote(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

impl ArchiveFetcher {
    pub fn new(http: &HttpConfig, algorithm: ChecksumAlgorithm) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(http.connect_timeout())
            .timeout(http.request_timeout())
            .user_agent(http.user_agent.as_str())
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| IngestError::Validation(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            referer: http.referer.clone(),
            algorithm,
        })
    }

    /// Make `source` available locally and compute its checksum.
    pub async fn fetch(&self, source: &str) -> Result<FetchedArchive> {
        let (path, size, download) = if is_remote(source) {
            let (temp, size) = self.download(source).await?;
            (temp.path().to_path_buf(), size, Some(temp))
        } else {
            let path = PathBuf::from(source.strip_prefix("file://").unwrap_or(source));
            let metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|e| IngestError::transport(source, e))?;
            if !metadata.is_file() {
                return Err(IngestError::transport(source, "not a regular file"));
            }
            (path, metadata.len(), None)
        };

        let algorithm = self.algorithm;
        let checksum_path = path.clone();
        let checksum =
            tokio::task::spawn_blocking(move || compute_file_checksum(&checksum_path, algorithm))
                .await??;

        info!(
            source = %source,
            bytes = size,
            checksum = %checksum,
            algorithm = %algorithm,
            "Archive ready"
        );

        Ok(FetchedArchive {
            path,
            size,
            checksum,
            download,
        })
    }

    async fn download(&self, url: &str) -> Result<(NamedTempFile, u64)> {
        info!(url = %url, "Downloading archive");

        let mut request = self.client.get(url);
        if let Some(referer) = &self.referer {
            request = request.header(header::REFERER, referer);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IngestError::transport(url, e))?;

        if !response.status().is_success() {
            return Err(IngestError::transport(url, format!("HTTP {}", response.status())));
        }

        let temp = NamedTempFile::new()?;
        let mut file = tokio::fs::File::from_std(temp.reopen()?);
        let mut stream = response.bytes_stream();
        let mut size: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| IngestError::transport(url, e))?;
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(url = %url, path = %temp.path().display(), bytes = size, "Download complete");
        Ok((temp, size))
    }
}
