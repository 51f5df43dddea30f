//! Staging-table loads from raw files, and vector indexing of entity tables.

mod indexer;

pub use indexer::{index_entities, EntitySource, IndexReport, ENTITY_SOURCES};

use crate::db::warehouse::{quote_ident, Warehouse, WarehouseError};
use crate::embedding::EmbeddingError;
use crate::vector::VectorError;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] WarehouseError),
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("Vector index error: {0}")]
    Vector(#[from] VectorError),
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Csv,
    Json,
    Parquet,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| IngestError::UnsupportedFileType("No extension".to_string()))?;
        match ext.as_str() {
            "csv" => Ok(FileFormat::Csv),
            "json" => Ok(FileFormat::Json),
            "parquet" => Ok(FileFormat::Parquet),
            other => Err(IngestError::UnsupportedFileType(other.to_string())),
        }
    }

    /// DuckDB table function reading `path`.
    fn reader(&self, path: &Path) -> String {
        let literal = path.to_string_lossy().replace('\'', "''");
        match self {
            FileFormat::Csv => format!("read_csv_auto('{}')", literal),
            FileFormat::Json => format!("read_json_auto('{}')", literal),
            FileFormat::Parquet => format!("read_parquet('{}')", literal),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub table: String,
    pub file: PathBuf,
    pub rows: i64,
}

/// Table name for a staging file: the file stem with non-identifier characters replaced.
fn table_name_for(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    Some(name)
}

/// Drops and recreates one staging table from a raw file.
pub async fn load_file(warehouse: &Warehouse, path: &Path) -> Result<LoadReport, IngestError> {
    let format = FileFormat::from_path(path)?;
    let table = table_name_for(path)
        .ok_or_else(|| IngestError::UnsupportedFileType(path.display().to_string()))?;
    let reader = format.reader(path);
    let ident = quote_ident(&table);

    let rows = warehouse
        .with_connection(move |conn| {
            conn.execute_batch(&format!(
                "DROP TABLE IF EXISTS {ident}; CREATE TABLE {ident} AS SELECT * FROM {reader};"
            ))?;
            let count = conn.query_row(&format!("SELECT COUNT(*) FROM {ident}"), [], |row| {
                row.get::<_, i64>(0)
            })?;
            Ok(count)
        })
        .await?;

    info!("Ingested {} ({} rows) from {}", table, rows, path.display());
    Ok(LoadReport {
        table,
        file: path.to_path_buf(),
        rows,
    })
}

/// Loads every `raw_*` csv, json or parquet file in `dir`. A file that fails
/// to load is logged and skipped.
pub async fn load_directory(warehouse: &Warehouse, dir: &Path) -> Result<Vec<LoadReport>, IngestError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("raw_"))
        })
        .collect();
    paths.sort();

    let mut reports = Vec::new();
    for path in paths {
        if FileFormat::from_path(&path).is_err() {
            warn!("Unsupported file type for {}, skipping", path.display());
            continue;
        }
        match load_file(warehouse, &path).await {
            Ok(report) => reports.push(report),
            Err(e) => warn!("Failed to load {}: {}", path.display(), e),
        }
    }

    info!("QA: row counts for {} loaded tables", reports.len());
    for report in &reports {
        info!("  {}: {} rows", report.table, report.rows);
    }
    Ok(reports)
}
