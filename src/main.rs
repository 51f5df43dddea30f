use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

mod auth;
mod chat;
mod config;
mod db;
mod embedding;
mod ingest;
mod llm;
mod util;
mod vector;
mod web;

use crate::auth::{InMemorySessionStore, UserStore};
use crate::chat::classifier::QuestionClassifier;
use crate::chat::fallback::Fallback;
use crate::chat::history::HistoryRecorder;
use crate::chat::semantic::SemanticSearch;
use crate::chat::sql_agent::{DuckDbSqlChain, SqlAgent};
use crate::chat::table_image::TableRenderer;
use crate::chat::{ChatParts, ChatService};
use crate::config::{AppConfig, CliArgs, Command};
use crate::db::warehouse::Warehouse;
use crate::embedding::OpenAIEmbedder;
use crate::llm::LlmManager;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

fn open_warehouse(config: &AppConfig) -> Result<Warehouse, Box<dyn std::error::Error>> {
    let pool_size = u32::try_from(config.database.pool_size).unwrap_or(u32::MAX);
    let warehouse = Warehouse::open(config.database.path(), pool_size)?;
    info!("Opened DuckDB at {}", warehouse.path().display());
    Ok(warehouse)
}

fn build_chat_service(
    config: &AppConfig,
    warehouse: &Warehouse,
) -> Result<ChatService, Box<dyn std::error::Error>> {
    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm = LlmManager::new(&config.llm)?;
    let embedder = Arc::new(OpenAIEmbedder::new(&config.embedding)?);
    let index = vector::from_config(&config.vector)?;

    let chain = DuckDbSqlChain::new(
        warehouse.clone(),
        llm.sql_generator(),
        config.router.allowed_tables.clone(),
        config.router.sql_top_k,
    );

    Ok(ChatService::new(ChatParts {
        classifier: QuestionClassifier::from_config(&config.router),
        sql: SqlAgent::new(Arc::new(chain)),
        semantic: SemanticSearch::new(
            embedder,
            index,
            Arc::new(warehouse.clone()),
            config.embedding.dimensions,
        ),
        renderer: TableRenderer::new(&config.charts_dir)?,
        fallback: Fallback::new(llm.chat_model(), Some(warehouse.clone())),
        history: HistoryRecorder::new(&config.history.path),
        semantic_top_k: config.vector.top_k,
        recent_limit: config.history.recent_limit,
    }))
}

async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = PathBuf::from(&config.data_dir);
    if !data_dir.exists() {
        info!("Creating data directory: {}", config.data_dir);
        std::fs::create_dir_all(&data_dir)?;
    }

    let warehouse = open_warehouse(&config)?;
    let chat = build_chat_service(&config, &warehouse)?;
    let users = UserStore::open(warehouse.clone()).await?;
    if config.auth.registration_secret.is_none() {
        warn!("No registration secret configured; /register will reject every request");
    }

    let web_config = config.web.clone();
    let state = Arc::new(AppState::new(
        config,
        chat,
        warehouse,
        Arc::new(InMemorySessionStore::new()),
        users,
    ));

    info!("Starting KYDxBot server on {}:{}", web_config.host, web_config.port);
    match web::run_server(web_config, state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match args.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Load { dir } => {
            let warehouse = open_warehouse(&config)?;
            let reports = ingest::load_directory(&warehouse, &dir).await?;
            info!("All staging tables loaded ({} files)", reports.len());
            Ok(())
        }
        Command::Index => {
            let warehouse = open_warehouse(&config)?;
            let embedder = OpenAIEmbedder::new(&config.embedding)?;
            let index = vector::from_config(&config.vector)?;
            let reports =
                ingest::index_entities(&warehouse, &embedder, index.as_ref(), ingest::ENTITY_SOURCES)
                    .await?;
            for report in reports {
                info!("Embedded {} {} rows", report.upserted, report.source);
            }
            Ok(())
        }
    }
}
