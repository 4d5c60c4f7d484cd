mod api;
mod cli;
mod config;
mod logging;
mod provider;

use std::sync::Arc;

use anyhow::{Context, Result};
use logai_core::{TriageEngine, shared};
use logai_storage::Database;
use tracing::info;

use crate::api::AppState;
use crate::config::GatewayConfig;
use crate::provider::ConfiguredProvider;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = cli::parse_args(&args)?;
    if args.help {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    let config = GatewayConfig::load(&args)?;
    let log_tx = logging::init(&config.logging)?;

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    let db = shared(
        Database::open(&db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?,
    );
    info!("Database ready at {}", db_path.display());

    let provider = Arc::new(ConfiguredProvider::new(config.triage.llm.clone(), db.clone())?);
    let engine = Arc::new(TriageEngine::new(db, config.triage.clone(), provider));
    let state = AppState { engine, log_tx };

    api::serve(state, &config.server.host, config.server.port).await
}
