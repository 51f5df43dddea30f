//! Append-only JSON log of answered questions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query_text: String,
    pub retrieved_response: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

/// Sole writer of the history file for this process.
pub struct HistoryRecorder {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry. I/O problems are logged and swallowed.
    pub async fn record_interaction(&self, query: &str, response: &str, confidence: Option<f64>) {
        let entry = HistoryEntry {
            query_text: query.to_string(),
            retrieved_response: response.to_string(),
            timestamp: chrono::Local::now()
                .naive_local()
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string(),
            confidence_score: confidence,
        };

        let _guard = self.write_lock.lock().await;
        let mut entries = self.read_raw().await;
        match serde_json::to_value(&entry) {
            Ok(value) => entries.push(value),
            Err(e) => {
                warn!("Could not encode history entry: {}", e);
                return;
            }
        }
        if let Err(e) = self.write_raw(&entries).await {
            warn!("Couldn't write to {}: {}", self.path.display(), e);
        }
    }

    /// The last `n` entries, oldest first.
    pub async fn load_recent_history(&self, n: usize) -> Vec<HistoryEntry> {
        let entries: Vec<HistoryEntry> = self
            .read_raw()
            .await
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        let skip = entries.len().saturating_sub(n);
        entries.into_iter().skip(skip).collect()
    }

    pub async fn clear(&self) {
        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.write_raw(&[]).await {
            warn!("Couldn't clear {}: {}", self.path.display(), e);
        }
    }

    /// Missing, malformed, or non-array files read as empty.
    async fn read_raw(&self) -> Vec<Value> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) => {
                debug!("No history at {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                warn!("History file {} is not a JSON array, starting over", self.path.display());
                Vec::new()
            }
            Err(e) => {
                warn!("History file {} is malformed ({}), starting over", self.path.display(), e);
                Vec::new()
            }
        }
    }

    async fn write_raw(&self, entries: &[Value]) -> std::io::Result<()> {
        let body = serde_json::to_string_pretty(entries)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}
