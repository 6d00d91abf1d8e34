use anyhow::Context;
use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use clap::{Parser, Subcommand};
use ollama_rs::Ollama;
use std::env;
use tracing::info;

use geonews::db::Database;
use geonews::logging::configure_logging;
use geonews::models::Article;
use geonews::{api, trending, LLMClient, LLMParams};

#[derive(Parser)]
#[command(name = "geonews", about = "Location-aware news retrieval service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Load articles into the store from a JSON file.
    Seed {
        /// Path to a JSON array of articles.
        path: String,
    },
    /// Generate synthetic interaction events against stored articles.
    SimulateEvents {
        #[arg(long, default_value_t = 100)]
        count: usize,
    },
}

/// Build the LLM client from the environment. `LLM_TYPE` selects the backend
/// ("ollama" or "openai"); Ollama is the default and needs no credentials.
fn llm_params_from_env() -> anyhow::Result<LLMParams> {
    let model = env::var("LLM_MODEL").unwrap_or_else(|_| "llama3".to_string());
    let temperature = env::var("LLM_TEMPERATURE")
        .ok()
        .and_then(|s| s.parse::<f32>().ok())
        .unwrap_or(0.0);

    let llm_client = match env::var("LLM_TYPE")
        .unwrap_or_else(|_| "ollama".to_string())
        .as_str()
    {
        "openai" => {
            let api_key = env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY is required when LLM_TYPE=openai")?;
            let config = OpenAIConfig::new().with_api_key(api_key);
            LLMClient::OpenAI(OpenAIClient::with_config(config))
        }
        _ => {
            let host = env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string());
            let port = env::var("OLLAMA_PORT")
                .ok()
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(11434);
            info!("Connecting to Ollama at {}:{}", host, port);
            LLMClient::Ollama(Ollama::new(host, port))
        }
    };

    Ok(LLMParams {
        llm_client,
        model,
        temperature,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    configure_logging();

    let cli = Cli::parse();
    let db = Database::instance().await.clone();

    match cli.command {
        Command::Serve { port } => {
            let llm = llm_params_from_env()?;
            api::serve(db, llm, port).await?;
        }
        Command::Seed { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path))?;
            let articles: Vec<Article> =
                serde_json::from_str(&raw).context("seed file must be a JSON array of articles")?;
            for article in &articles {
                db.add_article(article).await?;
            }
            info!("Seeded {} articles from {}", articles.len(), path);
        }
        Command::SimulateEvents { count } => {
            let created = trending::simulate_events(&db, count, 50.0).await?;
            info!("Simulated {} interaction events", created);
        }
    }

    Ok(())
}
