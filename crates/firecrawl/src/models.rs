use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScrapeFormat {
    Markdown,
    Html,
    RawHtml,
    Links,
    Screenshot,
}

impl ScrapeFormat {
    pub const ALL: [ScrapeFormat; 5] = [
        ScrapeFormat::Markdown,
        ScrapeFormat::Html,
        ScrapeFormat::RawHtml,
        ScrapeFormat::Links,
        ScrapeFormat::Screenshot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeFormat::Markdown => "markdown",
            ScrapeFormat::Html => "html",
            ScrapeFormat::RawHtml => "rawHtml",
            ScrapeFormat::Links => "links",
            ScrapeFormat::Screenshot => "screenshot",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.as_str() == raw)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapeRequest {
    pub url: String,
    pub formats: Vec<ScrapeFormat>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlRequest {
    pub url: String,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractRequest {
    pub urls: Vec<String>,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
}

/// Reply to a job-starting call (crawl, extract, agent).
#[derive(Debug, Clone, Deserialize)]
pub struct JobStarted {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Completed,
    Failed,
}

impl JobState {
    /// Classify a job `status` string; unknown values keep the poll going.
    pub fn from_status(status: Option<&str>) -> Self {
        match status.map(|s| s.to_ascii_lowercase()) {
            Some(s) if s == "completed" => JobState::Completed,
            Some(s) if s == "failed" || s == "cancelled" || s == "canceled" => JobState::Failed,
            _ => JobState::Pending,
        }
    }

    pub fn of(payload: &Value) -> Self {
        Self::from_status(payload.get("status").and_then(Value::as_str))
    }
}
