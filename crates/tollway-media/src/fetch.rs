//! Remote media downloads with a byte ceiling

use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::TryStreamExt;
use http::StatusCode;
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use tollway_config::{MediaConfig, WorkerConfig};

use crate::error::MediaError;
use crate::sniff::{DETECT_BYTES, ImageInfo, detect_image_mime, is_image_content_type, sniff_image};

const DOWNLOADER_USER_AGENT: &str = "OpenAI Image Downloader";

/// Body of a downloaded resource
pub type MediaBody = Pin<Box<dyn AsyncRead + Send>>;

/// A response whose body has not been consumed yet
pub struct Download {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: MediaBody,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct WorkerRequest<'a> {
    url: &'a str,
    key: &'a str,
}

/// Downloads remote media directly or through the relay worker
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    config: Arc<MediaConfig>,
}

impl Fetcher {
    /// Build a fetcher with its own client, bounded by the configured timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: Arc<MediaConfig>) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self::with_client(client, config))
    }

    pub const fn with_client(client: reqwest::Client, config: Arc<MediaConfig>) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    /// Download `url`, enforcing the size ceiling
    ///
    /// A body larger than the ceiling is discarded whole; one of exactly the
    /// ceiling is returned.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails, when a worker download is
    /// asked for a non-https source, or when the body is too large
    pub async fn fetch(&self, url: &str) -> Result<Download, MediaError> {
        let response = match &self.config.worker {
            Some(worker) => self.fetch_via_worker(worker, url).await?,
            None => {
                tracing::debug!(url, "fetching media directly");
                self.client
                    .get(url)
                    .header(USER_AGENT, DOWNLOADER_USER_AGENT)
                    .header(ACCEPT, "*/*")
                    .send()
                    .await?
            }
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let reader: MediaBody = Box::pin(StreamReader::new(stream));

        let body = match self.config.max_image_bytes() {
            Some(limit) => bounded(reader, limit).await?,
            None => reader,
        };

        Ok(Download {
            status,
            content_type,
            body,
        })
    }

    async fn fetch_via_worker(&self, worker: &WorkerConfig, url: &str) -> Result<reqwest::Response, MediaError> {
        if !url.starts_with("https://") {
            return Err(MediaError::InsecureUrl(url.to_owned()));
        }

        let mut endpoint = worker.url.to_string();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }

        tracing::debug!(url, worker = %endpoint, "fetching media through worker");

        let response = self
            .client
            .post(endpoint)
            .json(&WorkerRequest {
                url,
                key: worker.key.expose_secret(),
            })
            .send()
            .await?;

        Ok(response)
    }

    /// Fetch an image and read its format and dimensions
    ///
    /// # Errors
    ///
    /// Returns [`MediaError::Status`] for any status but 200, or the fetch and sniff errors
    pub async fn decode_url_image(&self, url: &str) -> Result<ImageInfo, MediaError> {
        let download = self.fetch(url).await?;
        if download.status != StatusCode::OK {
            return Err(MediaError::Status(download.status));
        }

        sniff_image(download.content_type.as_deref(), download.body).await
    }

    /// Fetch an image and return its MIME type with the base64-encoded body
    ///
    /// # Errors
    ///
    /// Returns the fetch errors, [`MediaError::Status`] for any status but
    /// 200, or [`MediaError::InvalidContentType`] when the body is not an image
    pub async fn fetch_image_base64(&self, url: &str) -> Result<(String, String), MediaError> {
        let mut download = self.fetch(url).await?;
        if download.status != StatusCode::OK {
            return Err(MediaError::Status(download.status));
        }

        let mut bytes = Vec::new();
        download.body.read_to_end(&mut bytes).await?;

        let mime = match download.content_type {
            Some(content_type) if is_image_content_type(Some(&content_type)) => content_type,
            _ => detect_image_mime(&bytes[..bytes.len().min(DETECT_BYTES)])?.to_owned(),
        };

        Ok((mime, STANDARD.encode(&bytes)))
    }
}

/// Buffer at most `limit + 1` bytes, failing if the extra byte arrives
async fn bounded(reader: MediaBody, limit: u64) -> Result<MediaBody, MediaError> {
    let mut body = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut body).await?;

    if u64::try_from(body.len()).unwrap_or(u64::MAX) > limit {
        tracing::debug!(limit, "media body exceeds ceiling");
        return Err(MediaError::Oversize { limit });
    }

    Ok(Box::pin(Cursor::new(body)))
}
