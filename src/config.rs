use clap::{Parser, Subcommand};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub connection_string: Option<String>, // falls back to DUCKDB_PATH, then DEFAULT_DATABASE_PATH
    pub pool_size: usize,
}

pub const DEFAULT_DATABASE_PATH: &str = "ingested_data/ingest.db";

impl DatabaseConfig {
    pub fn path(&self) -> &str {
        self.connection_string.as_deref().unwrap_or(DEFAULT_DATABASE_PATH)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: String,    // "remote" or "ollama"
    pub model: String,      // Model used for SQL generation
    pub chat_model: String, // Model used for fallback answers and summaries
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimensions: usize,
    pub api_key: Option<String>,
    pub api_url: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorConfig {
    pub backend: String, // "pinecone" or "memory"
    pub api_key: Option<String>,
    pub index_host: Option<String>,
    pub namespace: Option<String>,
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RouterConfig {
    pub keywords: Vec<String>,
    pub reference_questions: String,
    pub similarity_threshold: f64,
    pub allowed_tables: Vec<String>,
    pub sql_top_k: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub path: String,
    pub recent_limit: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub registration_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vector: VectorConfig,
    pub router: RouterConfig,
    pub history: HistoryConfig,
    pub auth: AuthConfig,
    pub data_dir: String,
    pub charts_dir: String,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory for data storage
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "KYDXBOT_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the chat API server (default)
    Serve,
    /// Load raw_* staging files from a directory into DuckDB
    Load {
        /// Directory holding raw_*.csv / .json / .parquet files
        dir: PathBuf,
    },
    /// Embed customers, products and distribution centers into the vector index
    Index,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/kydxbot/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // KYDXBOT__LLM__API_KEY=... style overrides
        config_builder = config_builder.add_source(
            Environment::with_prefix("KYDXBOT")
                .prefix_separator("__")
                .separator("__"),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(data_dir) = &args.data_dir {
            config.data_dir = data_dir.clone();
        }

        config.apply_legacy_env();
        Ok(config)
    }

    /// Fills unset secrets and paths from the conventional environment variables.
    fn apply_legacy_env(&mut self) {
        self.apply_env_lookup(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
    }

    fn apply_env_lookup<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.llm.api_key.is_none() {
            self.llm.api_key = lookup("OPENAI_API_KEY");
        }
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = self.llm.api_key.clone();
        }
        if self.vector.api_key.is_none() {
            self.vector.api_key = lookup("PINECONE_API_KEY");
        }
        if self.vector.index_host.is_none() {
            self.vector.index_host = lookup("PINECONE_INDEX_HOST");
        }
        if self.database.connection_string.is_none() {
            self.database.connection_string = lookup("DUCKDB_PATH");
        }
    }
}

pub const DEFAULT_KEYWORDS: &[&str] = &[
    "average", "sum(", "count(", "how many", "what is", "list", "top", "highest", "lowest",
    "per", "between", "profit", "sales", "customers", "products", "revenue", "orders",
    "invoices", "inventory", "expenses", "transactions", "employees", "payroll", "income",
    "metrics", "database", "dataset", "the data",
];

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            pool_size: 5,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "remote".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            chat_model: "gpt-4.1".to_string(),
            api_key: None,
            api_url: Some("https://api.openai.com/v1/chat/completions".to_string()),
            timeout_secs: 60,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-ada-002".to_string(),
            dimensions: 1536,
            api_key: None,
            api_url: "https://api.openai.com/v1/embeddings".to_string(),
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: "pinecone".to_string(),
            api_key: None,
            index_host: None,
            namespace: None,
            top_k: 3,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            reference_questions: "data/preloaded/analysis_quest.txt".to_string(),
            similarity_threshold: 0.5,
            allowed_tables: vec![
                "customers".to_string(),
                "products".to_string(),
                "distribution_center_inventory".to_string(),
            ],
            sql_top_k: 20,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: "chatbot_responses.json".to_string(),
            recent_limit: 10,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            web: WebConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector: VectorConfig::default(),
            router: RouterConfig::default(),
            history: HistoryConfig::default(),
            auth: AuthConfig::default(),
            data_dir: "data".to_string(),
            charts_dir: "charts".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_route_to_openai_and_pinecone() {
        let config = AppConfig::default();
        assert_eq!(config.llm.backend, "remote");
        assert_eq!(config.vector.backend, "pinecone");
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.router.similarity_threshold, 0.5);
        assert!(config.router.keywords.iter().any(|k| k == "revenue"));
    }

    #[test]
    fn toml_overrides_only_named_fields() {
        let toml = r#"
            charts_dir = "out/charts"

            [web]
            port = 9001

            [router]
            similarity_threshold = 0.7
        "#;
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.web.port, 9001);
        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.charts_dir, "out/charts");
        assert_eq!(config.router.similarity_threshold, 0.7);
        assert_eq!(config.router.sql_top_k, 20);
    }

    #[test]
    fn legacy_env_fills_unset_keys_only() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-env"),
            ("PINECONE_API_KEY", "pc-env"),
            ("DUCKDB_PATH", "/tmp/other.db"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.vector.api_key = Some("pc-file".to_string());
        config.apply_env_lookup(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.vector.api_key.as_deref(), Some("pc-file"));
        assert_eq!(config.database.path(), "/tmp/other.db");

        let mut configured = AppConfig::default();
        configured.database.connection_string = Some("data/warehouse.db".to_string());
        configured.apply_env_lookup(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(configured.database.path(), "data/warehouse.db");

        let mut bare = AppConfig::default();
        bare.apply_env_lookup(|_| None);
        assert_eq!(bare.database.path(), DEFAULT_DATABASE_PATH);
    }
}
