use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::post;
use axum::{Extension, Json, Router};
use dash_core::Session;
use firecrawl::{
    credits_used, AgentRequest, CrawlRequest, ExtractRequest, FirecrawlError, MapRequest,
    PrimaryOutput, ScrapeBackend, ScrapeFormat, ScrapeRequest,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};
use url::Url;

use crate::envelope::{failure, ApiResponse};
use crate::state::AppState;

pub const AGENT_PROMPT_MIN_CHARS: usize = 10;
const CRAWL_LIMIT_DEFAULT: u32 = 10;
const CRAWL_LIMIT_MAX: u32 = 100;
const MAP_LIMIT_DEFAULT: u32 = 100;
const MAP_LIMIT_MAX: u32 = 5000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/scrape", post(scrape))
        .route("/crawl", post(crawl))
        .route("/map", post(map))
        .route("/extract", post(extract))
        .route("/agent", post(agent))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid request body: {0}")]
    Body(String),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },
    #[error("{field} is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A URL list field that may arrive as one string or as a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UrlInput {
    One(String),
    Many(Vec<String>),
}

/// Trim every entry and drop blank ones; a bare string becomes a one-element list.
pub fn normalize_urls(input: Option<UrlInput>) -> Vec<String> {
    let raw = match input {
        None => Vec::new(),
        Some(UrlInput::One(url)) => vec![url],
        Some(UrlInput::Many(urls)) => urls,
    };

    raw.into_iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct ScrapeBody {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    formats: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CrawlBody {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MapBody {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractBody {
    #[serde(default)]
    urls: Option<UrlInput>,
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AgentBody {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    urls: Option<UrlInput>,
}

impl ScrapeBody {
    pub fn validate(self) -> Result<ScrapeRequest, ValidationError> {
        let url = required_url("url", self.url)?;
        let mut formats = Vec::new();
        for raw in self.formats.unwrap_or_default() {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let format = ScrapeFormat::parse(raw).ok_or_else(|| ValidationError::InvalidField {
                field: "formats",
                reason: format!(
                    "unsupported format {raw:?}, expected one of {}",
                    ScrapeFormat::ALL.map(|f| f.as_str()).join(", ")
                ),
            })?;
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        if formats.is_empty() {
            formats.push(ScrapeFormat::Markdown);
        }
        Ok(ScrapeRequest { url, formats })
    }
}

impl CrawlBody {
    pub fn validate(self) -> Result<CrawlRequest, ValidationError> {
        Ok(CrawlRequest {
            url: required_url("url", self.url)?,
            limit: bounded("limit", self.limit, CRAWL_LIMIT_DEFAULT, CRAWL_LIMIT_MAX)?,
        })
    }
}

impl MapBody {
    pub fn validate(self) -> Result<MapRequest, ValidationError> {
        Ok(MapRequest {
            url: required_url("url", self.url)?,
            search: self
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            limit: bounded("limit", self.limit, MAP_LIMIT_DEFAULT, MAP_LIMIT_MAX)?,
        })
    }
}

impl ExtractBody {
    pub fn validate(self) -> Result<ExtractRequest, ValidationError> {
        let urls = normalize_urls(self.urls);
        if urls.is_empty() {
            return Err(ValidationError::MissingField("urls"));
        }
        let urls = urls
            .into_iter()
            .map(|url| parse_http_url("urls", &url))
            .collect::<Result<Vec<_>, _>>()?;

        let prompt = self
            .prompt
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or(ValidationError::MissingField("prompt"))?;

        Ok(ExtractRequest { urls, prompt })
    }
}

impl AgentBody {
    pub fn validate(self) -> Result<AgentRequest, ValidationError> {
        let prompt = self
            .prompt
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or(ValidationError::MissingField("prompt"))?;
        if prompt.chars().count() < AGENT_PROMPT_MIN_CHARS {
            return Err(ValidationError::TooShort {
                field: "prompt",
                min: AGENT_PROMPT_MIN_CHARS,
            });
        }

        let urls = normalize_urls(self.urls)
            .into_iter()
            .map(|url| parse_http_url("urls", &url))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AgentRequest { prompt, urls })
    }
}

fn required_url(field: &'static str, raw: Option<String>) -> Result<String, ValidationError> {
    let raw = raw
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or(ValidationError::MissingField(field))?;
    parse_http_url(field, &raw)
}

fn parse_http_url(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidField { field, reason };
    let parsed = Url::parse(raw).map_err(|err| invalid(format!("{raw:?}: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(invalid(format!("{raw:?} is not an http(s) url")));
    }
    Ok(raw.to_string())
}

fn bounded(
    field: &'static str,
    raw: Option<i64>,
    default: u32,
    max: u32,
) -> Result<u32, ValidationError> {
    match raw {
        None => Ok(default),
        Some(value) if value >= 1 && value <= i64::from(max) => Ok(value as u32),
        Some(value) => Err(ValidationError::InvalidField {
            field,
            reason: format!("{value} is outside 1..={max}"),
        }),
    }
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ValidationError> {
    body.map(|Json(inner)| inner)
        .map_err(|rejection| ValidationError::Body(rejection.body_text()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Scrape,
    Crawl,
    Map,
    Extract,
    Agent,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Scrape => "scrape",
            Tool::Crawl => "crawl",
            Tool::Map => "map",
            Tool::Extract => "extract",
            Tool::Agent => "agent",
        }
    }

    /// Shape the raw upstream reply into the envelope's `data`.
    pub fn shape(&self, raw: Value, duration_ms: u64) -> Value {
        match self {
            Tool::Scrape | Tool::Extract => match raw.get("data") {
                Some(data) if !data.is_null() => data.clone(),
                _ => PrimaryOutput::extract(&raw).into_value(),
            },
            Tool::Crawl | Tool::Map => raw,
            Tool::Agent => {
                let output = PrimaryOutput::extract(&raw).into_value();
                json!({
                    "output": output,
                    "duration": duration_ms,
                    "creditsUsed": credits_used(&raw),
                    "raw": raw,
                })
            }
        }
    }
}

fn rejected(tool: Tool, session: &Session, err: ValidationError) -> Response {
    warn!(tool = tool.as_str(), subject = %session.subject, error = %err, "tool request rejected");
    failure(StatusCode::BAD_REQUEST, err.to_string())
}

async fn dispatch<F, Fut>(state: &AppState, session: &Session, tool: Tool, call: F) -> Response
where
    F: FnOnce(Arc<dyn ScrapeBackend>) -> Fut,
    Fut: Future<Output = Result<Value, FirecrawlError>>,
{
    let Some(backend) = state.backend.clone() else {
        error!(tool = tool.as_str(), "Firecrawl client not initialised");
        return ApiResponse::<Value>::error("scraping service is not configured")
            .with_duration(0)
            .into_response_with(StatusCode::INTERNAL_SERVER_ERROR);
    };

    info!(tool = tool.as_str(), subject = %session.subject, "dispatching tool request");
    let started = Instant::now();
    let result = call(backend).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(raw) => {
            let credits = credits_used(&raw);
            info!(
                tool = tool.as_str(),
                subject = %session.subject,
                duration_ms,
                credits,
                "tool request succeeded"
            );
            ApiResponse::ok(tool.shape(raw, duration_ms))
                .with_duration(duration_ms)
                .with_credits(credits)
                .into_response_with(StatusCode::OK)
        }
        Err(err) => {
            error!(
                tool = tool.as_str(),
                subject = %session.subject,
                duration_ms,
                timeout = err.is_timeout(),
                error = %err,
                "tool request failed"
            );
            ApiResponse::<Value>::error(err.to_string())
                .with_duration(duration_ms)
                .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn scrape(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Result<Json<ScrapeBody>, JsonRejection>,
) -> Response {
    let request = match parse_body(body).and_then(ScrapeBody::validate) {
        Ok(request) => request,
        Err(err) => return rejected(Tool::Scrape, &session, err),
    };
    dispatch(&state, &session, Tool::Scrape, move |backend| async move {
        backend.scrape(&request).await
    })
    .await
}

async fn crawl(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Result<Json<CrawlBody>, JsonRejection>,
) -> Response {
    let request = match parse_body(body).and_then(CrawlBody::validate) {
        Ok(request) => request,
        Err(err) => return rejected(Tool::Crawl, &session, err),
    };
    dispatch(&state, &session, Tool::Crawl, move |backend| async move {
        backend.crawl(&request).await
    })
    .await
}

async fn map(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Result<Json<MapBody>, JsonRejection>,
) -> Response {
    let request = match parse_body(body).and_then(MapBody::validate) {
        Ok(request) => request,
        Err(err) => return rejected(Tool::Map, &session, err),
    };
    dispatch(&state, &session, Tool::Map, move |backend| async move {
        backend.map(&request).await
    })
    .await
}

async fn extract(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Result<Json<ExtractBody>, JsonRejection>,
) -> Response {
    let request = match parse_body(body).and_then(ExtractBody::validate) {
        Ok(request) => request,
        Err(err) => return rejected(Tool::Extract, &session, err),
    };
    dispatch(&state, &session, Tool::Extract, move |backend| async move {
        backend.extract(&request).await
    })
    .await
}

async fn agent(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    body: Result<Json<AgentBody>, JsonRejection>,
) -> Response {
    let request = match parse_body(body).and_then(AgentBody::validate) {
        Ok(request) => request,
        Err(err) => return rejected(Tool::Agent, &session, err),
    };
    info!(
        prompt_chars = request.prompt.chars().count(),
        urls = request.urls.len(),
        "agent request accepted"
    );
    dispatch(&state, &session, Tool::Agent, move |backend| async move {
        backend.agent(&request).await
    })
    .await
}
