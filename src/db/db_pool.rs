use duckdb::Connection;
use r2d2::{ManageConnection, Pool};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

/// r2d2 manager handing out connections to a single DuckDB database.
///
/// DuckDB holds a file lock per database instance, so every pooled
/// connection is cloned from one root connection instead of reopening the file.
pub struct DuckDBConnectionManager {
    root: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, duckdb::Error> {
        let root = Connection::open(path)?;
        Ok(Self {
            root: Mutex::new(root),
        })
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let root = self.root.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        root.try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Failed to open database: {0}")]
    Open(#[from] duckdb::Error),
    #[error("Failed to build connection pool: {0}")]
    Pool(#[from] r2d2::Error),
}

/// Builds a pool for the DuckDB file at `path`, creating its parent directory.
pub fn build_pool(
    path: impl AsRef<Path>,
    max_size: u32,
) -> Result<Pool<DuckDBConnectionManager>, PoolError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            info!("Creating database directory: {}", parent.display());
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Failed to create database directory {}: {}", parent.display(), e);
            }
        }
    }

    let manager = DuckDBConnectionManager::new(path)?;
    let pool = Pool::builder().max_size(max_size.max(1)).build(manager)?;
    Ok(pool)
}
