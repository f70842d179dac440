// Streaming downloads to disk

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::constants;
use crate::error::{HostdbError, Result};
use crate::ui::Ui;

/// Buffer size for local (file://) copies (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Fetches a URL into a file.
///
/// Implementations must leave nothing at `dest` unless the whole body was
/// written: on any error, including the timeout firing, `dest` is untouched.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Returns the number of bytes written.
    async fn fetch(&self, url: &str, dest: &Path, timeout: Duration) -> Result<u64>;
}

/// Sibling path a download is written to before it is renamed into place.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(constants::PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

fn download_error(url: &str, reason: impl Into<String>) -> HostdbError {
    HostdbError::DownloadError {
        url: url.to_string(),
        reason: reason.into(),
    }
}

fn write_error(path: &Path, e: std::io::Error) -> HostdbError {
    HostdbError::io(format!("failed to write {}", path.display()), e)
}

/// Fetcher for `http(s)://` URLs and `file://` mirrors.
pub struct HttpFetcher {
    client: Client,
    ui: Ui,
}

impl HttpFetcher {
    pub fn new(ui: Ui) -> Result<Self> {
        let client = Client::builder()
            .user_agent(constants::REHOSTED_BY)
            .build()
            .map_err(|e| download_error("(client)", e.to_string()))?;
        Ok(Self { client, ui })
    }

    fn display_name(url: &str) -> &str {
        url.rsplit('/')
            .next()
            .and_then(|s| s.split('?').next())
            .filter(|s| !s.is_empty())
            .unwrap_or(url)
    }

    async fn stream_http(&self, url: &str, partial: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_error(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_error(url, format!("HTTP {}", status)));
        }

        let mut progress = self
            .ui
            .download_progress(Self::display_name(url), response.content_length());
        let mut file = File::create(partial)
            .await
            .map_err(|e| write_error(partial, e))?;

        // Each chunk is fully written before the next one is requested, so a
        // slow disk stalls the socket instead of growing memory.
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| download_error(url, e.to_string()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| write_error(partial, e))?;
            progress.advance(chunk.len() as u64);
        }

        file.flush().await.map_err(|e| write_error(partial, e))?;
        file.sync_all().await.map_err(|e| write_error(partial, e))?;

        let received = progress.received();
        progress.finish();
        Ok(received)
    }

    async fn stream_file(&self, url: &str, source: &Path, partial: &Path) -> Result<u64> {
        let mut input = File::open(source)
            .await
            .map_err(|e| download_error(url, e.to_string()))?;
        let total = input.metadata().await.ok().map(|m| m.len());

        let mut progress = self.ui.download_progress(Self::display_name(url), total);
        let mut output = File::create(partial)
            .await
            .map_err(|e| write_error(partial, e))?;
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            let read = input
                .read(&mut buffer)
                .await
                .map_err(|e| download_error(url, e.to_string()))?;
            if read == 0 {
                break;
            }
            output
                .write_all(&buffer[..read])
                .await
                .map_err(|e| write_error(partial, e))?;
            progress.advance(read as u64);
        }

        output.flush().await.map_err(|e| write_error(partial, e))?;
        output.sync_all().await.map_err(|e| write_error(partial, e))?;

        let received = progress.received();
        progress.finish();
        Ok(received)
    }

    async fn stream(&self, url: &str, partial: &Path) -> Result<u64> {
        if let Some(path) = url.strip_prefix("file://") {
            self.stream_file(url, Path::new(path), partial).await
        } else if url.starts_with("https://") || url.starts_with("http://") {
            self.stream_http(url, partial).await
        } else {
            Err(download_error(url, "unsupported URL scheme"))
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path, timeout: Duration) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                HostdbError::io(format!("failed to create {}", parent.display()), e)
            })?;
        }

        let partial = partial_path(dest);
        debug!("Fetching {} -> {}", url, partial.display());

        // Timing out drops the in-flight stream, which cancels the request.
        let result = match tokio::time::timeout(timeout, self.stream(url, &partial)).await {
            Ok(result) => result,
            Err(_) => Err(download_error(
                url,
                format!("timed out after {:?}", timeout),
            )),
        };

        match result {
            Ok(bytes) => {
                tokio::fs::rename(&partial, dest)
                    .await
                    .map_err(|e| write_error(dest, e))?;
                debug!("Fetched {} bytes into {}", bytes, dest.display());
                Ok(bytes)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    debug!("No partial file to remove at {}: {}", partial.display(), cleanup);
                }
                Err(e)
            }
        }
    }
}
