use crate::types::{FetchConfig, FetchResult, Result, ScraperError};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use chrono::Utc;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    last_request: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            last_request: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn backoff(&self) -> ExponentialBackoff<backoff::SystemClock> {
        let delay = self.config.retry_delay_seconds;
        ExponentialBackoff {
            current_interval: Duration::from_secs(delay),
            initial_interval: Duration::from_secs(delay),
            max_interval: Duration::from_secs(delay * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(delay * 60)),
            ..Default::default()
        }
    }

    /// Fetches a feed body. Transport and HTTP failures are retried with
    /// exponential backoff and then reported through `FetchResult::error`
    /// rather than as an `Err`.
    pub async fn fetch_feed(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchResult> {
        let start_time = Instant::now();
        let fetch_time = Utc::now();

        debug!("Fetching feed: {}", url);
        self.apply_rate_limit(url).await?;

        let mut backoff = self.backoff();
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.fetch_with_conditional_headers(url, etag, last_modified).await {
                Ok(response) => {
                    let response_time = start_time.elapsed().as_millis() as u64;
                    let status = response.status();

                    if status == StatusCode::NOT_MODIFIED {
                        debug!("Feed not modified: {}", url);
                        return Ok(FetchResult {
                            success: true,
                            error: None,
                            fetch_time,
                            response_time_ms: response_time,
                            http_status: Some(status.as_u16()),
                            etag: etag.map(|s| s.to_string()),
                            last_modified: last_modified.map(|s| s.to_string()),
                            content: None,
                        });
                    }

                    if !status.is_success() {
                        last_error = Some(ScraperError::General(format!(
                            "HTTP {}: {}",
                            status,
                            status.canonical_reason().unwrap_or("Unknown")
                        )));
                        // Client errors will not fix themselves on retry.
                        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                            break;
                        }
                    } else {
                        let new_etag = header_value(&response, "etag");
                        let new_last_modified = header_value(&response, "last-modified");

                        let max_bytes = self.config.max_feed_size_mb * BYTES_PER_MB;
                        if let Some(content_length) = response.content_length() {
                            if content_length as usize > max_bytes {
                                return Ok(FetchResult::failed(
                                    fetch_time,
                                    response_time,
                                    too_large(content_length as usize).to_string(),
                                ));
                            }
                        }

                        match read_capped(response.bytes_stream(), max_bytes).await {
                            Err(e @ ScraperError::FeedTooLarge { .. }) => {
                                return Ok(FetchResult::failed(
                                    fetch_time,
                                    response_time,
                                    e.to_string(),
                                ));
                            }
                            Ok(body) => {
                                let content = String::from_utf8_lossy(&body).into_owned();
                                info!("Fetched {} ({} bytes)", url, content.len());
                                return Ok(FetchResult {
                                    success: true,
                                    error: None,
                                    fetch_time,
                                    response_time_ms: response_time,
                                    http_status: Some(status.as_u16()),
                                    etag: new_etag,
                                    last_modified: new_last_modified,
                                    content: Some(content),
                                });
                            }
                            Err(e) => last_error = Some(e),
                        }
                    }
                }
                Err(e) => last_error = Some(e),
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        let error_msg = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        error!("Failed to fetch {}: {}", url, error_msg);

        Ok(FetchResult::failed(
            fetch_time,
            start_time.elapsed().as_millis() as u64,
            error_msg,
        ))
    }

    /// Fetches a body and fails on anything but a successful response.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let result = self.fetch_feed(url, None, None).await?;
        match (result.success, result.content) {
            (true, Some(content)) => Ok(content),
            (true, None) => Ok(String::new()),
            (false, _) => Err(ScraperError::General(
                result.error.unwrap_or_else(|| "Fetch failed".to_string()),
            )),
        }
    }

    async fn fetch_with_conditional_headers(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<Response> {
        let mut request = self.client.get(url);

        if let Some(etag) = etag {
            request = request.header("If-None-Match", etag);
        }
        if let Some(last_modified) = last_modified {
            request = request.header("If-Modified-Since", last_modified);
        }

        Ok(request.send().await?)
    }

    async fn apply_rate_limit(&self, url: &str) -> Result<()> {
        let host = Url::parse(url)?.host_str().unwrap_or("").to_string();
        let min_interval = Duration::from_millis(self.config.min_host_interval_ms);

        let mut last_request = self.last_request.lock().await;
        if let Some(previous) = last_request.get(&host) {
            let elapsed = previous.elapsed();
            if elapsed < min_interval {
                let wait_time = min_interval - elapsed;
                debug!("Rate limiting {}: waiting {:?}", host, wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        last_request.insert(host, Instant::now());

        Ok(())
    }
}

const BYTES_PER_MB: usize = 1024 * 1024;

fn too_large(bytes: usize) -> ScraperError {
    ScraperError::FeedTooLarge {
        size_mb: bytes.div_ceil(BYTES_PER_MB),
    }
}

/// Collect a response body, giving up once it grows past `max_bytes`.
async fn read_capped<S, B>(stream: S, max_bytes: usize) -> Result<Vec<u8>>
where
    S: Stream<Item = reqwest::Result<B>>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        body.extend_from_slice(chunk.as_ref());
        if body.len() > max_bytes {
            return Err(too_large(body.len()));
        }
    }
    Ok(body)
}

fn header_value(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
