//! Natural-language question to SQL to tagged rows.

use super::literal::{parse_rows, LiteralError};
use super::rows::{tag_rows, ResultRow};
use crate::db::values::Scalar;
use crate::db::warehouse::{Warehouse, WarehouseError};
use crate::llm::{LlmError, SqlGenerator};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SqlAgentError {
    #[error("SQL generation failed: {0}")]
    Llm(#[from] LlmError),
    #[error("SQL execution failed: {0}")]
    Database(#[from] WarehouseError),
    #[error("Refusing to run statement: {0}")]
    Refused(String),
    #[error("Could not parse SQL result {raw:?}: {source}")]
    Parse {
        raw: String,
        #[source]
        source: LiteralError,
    },
    #[error("SQL pipeline failed after retry: {0}")]
    RetryExhausted(Box<SqlAgentError>),
}

/// Column names of the executed statement plus its rows as a literal list of tuples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainOutput {
    pub columns: Vec<String>,
    pub result: String,
}

/// Generates and runs SQL for a question.
#[async_trait]
pub trait SqlChain: Send + Sync {
    async fn run(&self, question: &str) -> Result<ChainOutput, SqlAgentError>;
}

/// Chain backed by an LLM SQL generator and the local DuckDB warehouse.
pub struct DuckDbSqlChain {
    warehouse: Warehouse,
    generator: Arc<dyn SqlGenerator>,
    tables: Vec<String>,
    top_k: usize,
}

impl DuckDbSqlChain {
    pub fn new(
        warehouse: Warehouse,
        generator: Arc<dyn SqlGenerator>,
        tables: Vec<String>,
        top_k: usize,
    ) -> Self {
        Self {
            warehouse,
            generator,
            tables,
            top_k,
        }
    }
}

#[async_trait]
impl SqlChain for DuckDbSqlChain {
    async fn run(&self, question: &str) -> Result<ChainOutput, SqlAgentError> {
        let schema = self.warehouse.describe_tables(self.tables.clone()).await?;
        let raw = self
            .generator
            .generate_sql(question, &schema, self.top_k)
            .await?;
        let sql = read_only_statement(&raw)?;
        debug!("Generated SQL: {}", sql);

        let tree = self.warehouse.parse_tree(sql.clone()).await?;
        let existing = self.warehouse.table_names().await?;
        check_table_scope(&tree, &self.tables, &existing)?;

        let output = self.warehouse.query(sql).await?;
        Ok(ChainOutput {
            columns: output.columns,
            result: render_literal(&output.rows),
        })
    }
}

/// Strips fences and a trailing `;`, then accepts only a single SELECT or WITH statement.
fn read_only_statement(raw: &str) -> Result<String, SqlAgentError> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```sql")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
        .trim_matches('`')
        .trim()
        .trim_end_matches(';')
        .trim()
        .to_string();

    let keyword = cleaned
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase();
    if keyword != "SELECT" && keyword != "WITH" {
        return Err(SqlAgentError::Refused(format!(
            "expected SELECT or WITH, got {:?}",
            keyword
        )));
    }
    if cleaned.contains(';') {
        return Err(SqlAgentError::Refused("multiple statements".to_string()));
    }
    Ok(cleaned)
}

/// Refuses statements that read anything besides the allowed tables and the
/// CTEs they define. Table functions (`read_csv`, `duckdb_tables`, ...),
/// qualified names outside `main` and CTEs shadowing other tables are refused too.
fn check_table_scope(tree: &Value, allowed: &[String], existing: &[String]) -> Result<(), SqlAgentError> {
    if tree.get("error").and_then(Value::as_bool).unwrap_or(true) {
        let message = tree
            .get("error_message")
            .and_then(Value::as_str)
            .unwrap_or("unparsable statement");
        return Err(SqlAgentError::Refused(message.to_string()));
    }

    let mut ctes = HashSet::new();
    collect_cte_names(tree, &mut ctes);
    let allowed: HashSet<String> = allowed.iter().map(|t| t.to_lowercase()).collect();
    if let Some(shadow) = existing
        .iter()
        .map(|t| t.to_lowercase())
        .find(|t| ctes.contains(t) && !allowed.contains(t))
    {
        return Err(SqlAgentError::Refused(format!("CTE {:?} shadows a table", shadow)));
    }

    let mut refused = None;
    visit_table_refs(tree, &mut |node| {
        if refused.is_some() {
            return;
        }
        let field = |key| str_field(node, key);
        match field("type") {
            "TABLE_FUNCTION" => refused = Some("table functions are not allowed".to_string()),
            "BASE_TABLE" => {
                let table = field("table_name").to_lowercase();
                let schema = field("schema_name").to_lowercase();
                let qualified = !field("catalog_name").is_empty() || !(schema.is_empty() || schema == "main");
                let known = allowed.contains(&table) || (!qualified && ctes.contains(&table));
                if qualified || !known {
                    refused = Some(format!("table {:?} is outside the allowed tables", field("table_name")));
                }
            }
            _ => {}
        }
    });

    match refused {
        Some(reason) => Err(SqlAgentError::Refused(reason)),
        None => Ok(()),
    }
}

fn str_field<'a>(node: &'a Value, key: &str) -> &'a str {
    node.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn collect_cte_names(value: &Value, names: &mut HashSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(entries) = map
                .get("cte_map")
                .and_then(|m| m.get("map"))
                .and_then(Value::as_array)
            {
                for entry in entries {
                    if let Some(name) = entry.get("key").and_then(Value::as_str) {
                        names.insert(name.to_lowercase());
                    }
                }
            }
            map.values().for_each(|v| collect_cte_names(v, names));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_cte_names(v, names)),
        _ => {}
    }
}

fn visit_table_refs(value: &Value, visit: &mut impl FnMut(&Value)) {
    match value {
        Value::Object(map) => {
            visit(value);
            for child in map.values() {
                visit_table_refs(child, visit);
            }
        }
        Value::Array(items) => {
            for child in items {
                visit_table_refs(child, visit);
            }
        }
        _ => {}
    }
}

/// `[(1, 'a'), (2, 'b')]`; no rows renders as an empty string.
fn render_literal(rows: &[Vec<Scalar>]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    let tuples: Vec<String> = rows
        .iter()
        .map(|row| {
            let cells: Vec<String> = row.iter().map(Scalar::to_literal).collect();
            if cells.len() == 1 {
                format!("({},)", cells[0])
            } else {
                format!("({})", cells.join(", "))
            }
        })
        .collect();
    format!("[{}]", tuples.join(", "))
}

pub struct SqlAgent {
    chain: Arc<dyn SqlChain>,
}

impl SqlAgent {
    pub fn new(chain: Arc<dyn SqlChain>) -> Self {
        Self { chain }
    }

    /// Runs the chain, retrying once with a `LIMIT 10` hint when the first attempt fails.
    pub async fn query_via_sqlagent(&self, question: &str) -> Result<Vec<ResultRow>, SqlAgentError> {
        let question = question.trim();
        match self.attempt(question).await {
            Ok(rows) => Ok(rows),
            Err(first) => {
                warn!("SQL pipeline failed, retrying with LIMIT 10: {}", first);
                let retry = format!("{} LIMIT 10", question);
                self.attempt(&retry)
                    .await
                    .map_err(|e| SqlAgentError::RetryExhausted(Box::new(e)))
            }
        }
    }

    async fn attempt(&self, question: &str) -> Result<Vec<ResultRow>, SqlAgentError> {
        let output = self.chain.run(question).await?;
        let rows = parse_rows(&output.result).map_err(|source| SqlAgentError::Parse {
            raw: output.result.clone(),
            source,
        })?;
        info!("SQL pipeline returned {} rows", rows.len());
        Ok(tag_rows(&output.columns, rows))
    }
}
