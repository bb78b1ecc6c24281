use anyhow::Result;
use clap::{Parser, Subcommand};
use dash_core::config::AppConfig;
use firecrawl::{
    AgentRequest, FirecrawlClient, MapRequest, PrimaryOutput, ScrapeBackend, ScrapeFormat,
    ScrapeRequest,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "firecrawl-cli", about = "Smoke-test the configured Firecrawl API", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape a single page as markdown
    Scrape {
        #[arg(long, short = 'u')]
        url: String,
    },
    /// List the links of a site
    Map {
        #[arg(long, short = 'u')]
        url: String,
        /// Optional search term to rank links
        #[arg(long, short = 's')]
        search: Option<String>,
        #[arg(long, short = 'l', default_value = "20")]
        limit: u32,
    },
    /// Run the agent and print its primary output
    Agent {
        #[arg(long, short = 'p')]
        prompt: String,
        #[arg(long, short = 'u')]
        url: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load_from_env()?;
    let client = FirecrawlClient::from_app_config(&config)?;

    match cli.command {
        Command::Scrape { url } => {
            let raw = client
                .scrape(&ScrapeRequest {
                    url,
                    formats: vec![ScrapeFormat::Markdown],
                })
                .await?;
            let markdown = raw
                .pointer("/data/markdown")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            println!("{markdown}");
        }
        Command::Map { url, search, limit } => {
            let raw = client.map(&MapRequest { url, search, limit }).await?;
            let links = raw
                .get("links")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            println!("Retrieved {} links:", links.len());
            for link in links {
                let link = link
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| link.to_string());
                println!("  {link}");
            }
        }
        Command::Agent { prompt, url } => {
            let raw = client.agent(&AgentRequest { prompt, urls: url }).await?;
            let output = PrimaryOutput::extract(&raw);
            eprintln!("output source: {}", output.source());
            println!("{}", serde_json::to_string_pretty(&output.into_value())?);
        }
    }

    Ok(())
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("tracing already initialised");
    }
}
