mod config;
mod counter;
mod error;
mod images;
mod metadata;
mod response;
mod search;
mod similarity;
mod store;
mod stores;
mod web_server;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::metadata::ImageDetail;
use crate::similarity::{HttpSimilarityClient, SimilarityProvider};
use crate::store::MetadataStore;
use crate::stores::{memory::MemoryStore, sqlite::SqliteStore};
use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "meme_search", about = "Meme image search service")]
struct Args {
    /// Overrides `web_port` from the configuration files
    #[arg(long)]
    port: Option<u16>,

    /// JSON array of images (with tags) to load into the store before serving
    #[arg(long)]
    seed: Option<PathBuf>,
}

pub async fn seed_store(store: &dyn MetadataStore, path: &Path) -> Result<usize, AppError> {
    info!("Seeding metadata store from {:?}", path);
    let raw = tokio::fs::read_to_string(path).await?;
    let entries: Vec<ImageDetail> = serde_json::from_str(&raw)?;
    let count = entries.len();
    for entry in entries {
        store.upsert_image(entry).await?;
    }
    info!("Seeded {} images.", count);
    Ok(count)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::new()?;
    if let Some(port) = args.port {
        config.web_port = port;
    }

    env_logger::Builder::new()
        .filter_level(config.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .init();

    info!("Starting meme_search");

    let store: Arc<dyn MetadataStore> = if config.uses_sqlite() {
        info!("Using SQLite metadata store at {}", config.database_url);
        Arc::new(SqliteStore::connect(&config.database_url).await?)
    } else {
        info!("Using in-memory metadata store");
        Arc::new(MemoryStore::new())
    };
    store.ensure_schema().await?;

    if let Some(path) = &args.seed {
        seed_store(store.as_ref(), path).await?;
    }

    let similarity: Arc<dyn SimilarityProvider> =
        Arc::new(HttpSimilarityClient::new(&config.similarity)?);

    if let Err(e) = web_server::start_web_server(Arc::new(config), store, similarity).await {
        log::error!("Web server error: {}", e);
    }

    info!("meme_search finished");

    Ok(())
}
