pub mod client;
pub mod error;
pub mod models;
pub mod output;
pub mod poll;

pub use client::{FirecrawlClient, ScrapeBackend};
pub use error::FirecrawlError;
pub use models::{
    AgentRequest, CrawlRequest, ExtractRequest, MapRequest, ScrapeFormat, ScrapeRequest,
};
pub use output::{credits_used, PrimaryOutput};
pub use poll::PollSettings;
