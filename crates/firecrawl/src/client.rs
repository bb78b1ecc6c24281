use std::time::Duration;

use async_trait::async_trait;
use dash_core::config::{AppConfig, FirecrawlConfig};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::error::{describe_failure, describe_value, FirecrawlError};
use crate::models::{
    AgentRequest, CrawlRequest, ExtractRequest, JobStarted, MapRequest, ScrapeRequest,
};
use crate::poll::{poll_job, with_deadline, PollSettings};

/// Upstream operations the proxy handlers depend on.
///
/// Each call returns the raw upstream JSON. Job-based tools (crawl, extract,
/// agent) resolve only once the job reaches a terminal state or the poll
/// deadline expires.
#[async_trait]
pub trait ScrapeBackend: Send + Sync {
    async fn scrape(&self, request: &ScrapeRequest) -> Result<Value, FirecrawlError>;
    async fn crawl(&self, request: &CrawlRequest) -> Result<Value, FirecrawlError>;
    async fn map(&self, request: &MapRequest) -> Result<Value, FirecrawlError>;
    async fn extract(&self, request: &ExtractRequest) -> Result<Value, FirecrawlError>;
    async fn agent(&self, request: &AgentRequest) -> Result<Value, FirecrawlError>;
}

#[derive(Debug, Clone)]
pub struct FirecrawlClient {
    http: Client,
    base_url: String,
    poll: PollSettings,
}

impl FirecrawlClient {
    pub fn from_app_config(config: &AppConfig) -> anyhow::Result<Self> {
        let firecrawl = config.require_firecrawl_config()?;
        let poll = PollSettings {
            interval: config.poll.interval(),
            timeout: config.poll.timeout(),
        };
        Ok(Self::new(firecrawl, poll)?)
    }

    pub fn new(config: &FirecrawlConfig, poll: PollSettings) -> Result<Self, FirecrawlError> {
        let base_url = config.endpoint.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(FirecrawlError::InvalidUrl(base_url));
        }

        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key.trim()))
            .map_err(|_| FirecrawlError::Upstream("API key is not a valid header value".into()))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Per-request timeout stays above the poll deadline; the deadline is
        // what callers observe.
        let http = Client::builder()
            .user_agent("scrape-dashboard/0.1")
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(poll.timeout + Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url,
            poll,
        })
    }

    pub fn poll_settings(&self) -> PollSettings {
        self.poll
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, FirecrawlError> {
        info!("Firecrawl POST {}", path);
        let builder = self
            .http
            .request(Method::POST, self.url(path))
            .json(body);
        self.execute(builder).await
    }

    async fn get(&self, path: &str) -> Result<Value, FirecrawlError> {
        let builder = self.http.request(Method::GET, self.url(path));
        self.execute(builder).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Value, FirecrawlError> {
        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(FirecrawlError::HttpStatus {
                status,
                message: describe_failure(&body),
            });
        }

        let body = response.text().await?;
        let value: Value = serde_json::from_str(&body)?;
        if value.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(FirecrawlError::Upstream(
                describe_value(&value).unwrap_or_else(|| "success=false".to_string()),
            ));
        }
        Ok(value)
    }

    /// Start a job and wait for its terminal status under the poll deadline.
    async fn run_job<B: Serialize + ?Sized + Sync>(
        &self,
        job: &'static str,
        start_path: &str,
        status_prefix: &str,
        body: &B,
    ) -> Result<Value, FirecrawlError> {
        let work = async {
            let started = self.post(start_path, body).await?;
            let job_id = match serde_json::from_value::<JobStarted>(started.clone()) {
                Ok(JobStarted { id: Some(id), .. }) if !id.trim().is_empty() => id,
                _ => {
                    // Upstream answered synchronously.
                    return Ok(started);
                }
            };

            info!(job, job_id = %job_id, "upstream job started, polling");
            let status_path = format!("{}/{}", status_prefix.trim_end_matches('/'), job_id);
            poll_job(job, self.poll.interval, || self.get(&status_path)).await
        };

        let result = with_deadline(self.poll.timeout, work).await;
        if let Err(err) = &result {
            if err.is_timeout() {
                warn!(
                    job,
                    limit_secs = self.poll.timeout.as_secs(),
                    "upstream job exceeded poll deadline"
                );
            }
        }
        result
    }
}

#[async_trait]
impl ScrapeBackend for FirecrawlClient {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn scrape(&self, request: &ScrapeRequest) -> Result<Value, FirecrawlError> {
        with_deadline(self.poll.timeout, self.post("/v1/scrape", request)).await
    }

    #[instrument(skip(self, request), fields(url = %request.url, limit = request.limit))]
    async fn crawl(&self, request: &CrawlRequest) -> Result<Value, FirecrawlError> {
        self.run_job("crawl", "/v1/crawl", "/v1/crawl", request).await
    }

    #[instrument(skip(self, request), fields(url = %request.url, limit = request.limit))]
    async fn map(&self, request: &MapRequest) -> Result<Value, FirecrawlError> {
        with_deadline(self.poll.timeout, self.post("/v1/map", request)).await
    }

    #[instrument(skip(self, request), fields(urls = request.urls.len()))]
    async fn extract(&self, request: &ExtractRequest) -> Result<Value, FirecrawlError> {
        self.run_job("extract", "/v1/extract", "/v1/extract", request).await
    }

    #[instrument(skip(self, request), fields(urls = request.urls.len()))]
    async fn agent(&self, request: &AgentRequest) -> Result<Value, FirecrawlError> {
        self.run_job("agent", "/v2/agent", "/v2/agent", request).await
    }
}
