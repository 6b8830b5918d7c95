use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::blob::BlobStore;
use crate::domain::DatasetDescriptor;
use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub cause: String,
    pub transient: bool,
}

pub trait DownloadClient: Send + Sync {
    fn download(&self, url: &str) -> Result<Vec<u8>, FetchFailure>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt as u32)
    }
}

#[derive(Clone)]
pub struct HttpDownloadClient {
    client: Client,
}

impl HttpDownloadClient {
    pub fn new() -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("xena-sting/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PipelineError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| PipelineError::Discovery(err.to_string()))?;
        Ok(Self { client })
    }
}

impl DownloadClient for HttpDownloadClient {
    fn download(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let response = self.client.get(url).send().map_err(|err| FetchFailure {
            cause: err.to_string(),
            transient: is_retryable_error(&err),
        })?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(FetchFailure {
                cause: format!("status {status}"),
                transient: is_retryable_status(status),
            });
        }
        let bytes = response.bytes().map_err(|err| FetchFailure {
            cause: err.to_string(),
            transient: true,
        })?;
        Ok(bytes.to_vec())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    if err.is_builder() {
        return false;
    }
    err.is_timeout() || err.is_connect() || err.is_request()
}

pub struct Fetcher<D: DownloadClient> {
    client: D,
    policy: RetryPolicy,
}

impl<D: DownloadClient> Fetcher<D> {
    pub fn new(client: D, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn download_once(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        self.client.download(url)
    }

    pub fn fetch(
        &self,
        descriptor: &DatasetDescriptor,
        blob: &dyn BlobStore,
    ) -> Result<Vec<u8>, PipelineError> {
        let dataset_id = descriptor.dataset_id.as_str();
        let mut attempt = 0usize;
        let bytes = loop {
            match self.client.download(&descriptor.download_url) {
                Ok(bytes) => break bytes,
                Err(failure) => {
                    if failure.transient && attempt + 1 < self.policy.max_attempts {
                        tracing::debug!(attempt, cause = %failure.cause, "retrying transient download failure");
                        thread::sleep(self.policy.backoff_delay(attempt));
                        attempt += 1;
                        continue;
                    }
                    return Err(PipelineError::Fetch {
                        dataset_id: dataset_id.to_string(),
                        cause: failure.cause,
                        transient: failure.transient,
                    });
                }
            }
        };

        // Not fetched until archived.
        blob.put(dataset_id, &bytes)
            .map_err(|err| PipelineError::Fetch {
                dataset_id: dataset_id.to_string(),
                cause: format!("archival failed: {err}"),
                transient: false,
            })?;
        Ok(bytes)
    }
}
