use crate::db::db_pool::{build_pool, DuckDBConnectionManager, PoolError};
use crate::db::values::Scalar;
use async_trait::async_trait;
use duckdb::{params, Connection, OptionalExt, Row};
use r2d2::Pool;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("{0}")]
    Open(#[from] PoolError),
    #[error("Database task failed: {0}")]
    Task(String),
    #[error("Unreadable parse tree: {0}")]
    ParseTree(#[from] serde_json::Error),
}

/// Rows and column names of one executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSummary {
    pub name: String,
    pub row_count: Option<i64>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRecord {
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub orders_cancelled: i64,
    pub orders_returned: i64,
    pub web_sessions: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub product_id: i64,
    pub name: String,
    pub category: String,
    pub sales: f64,
    pub cost_of_goods_sold: f64,
    pub profit: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CenterRecord {
    pub center_id: i64,
    pub name: String,
    pub items_in_stock: i64,
    pub total_sales: f64,
    pub inventory_cost: f64,
}

/// Resolves vector-match keys to authoritative rows.
#[async_trait]
pub trait EntityLookup: Send + Sync {
    async fn customer(&self, id: i64) -> Result<Option<CustomerRecord>, WarehouseError>;
    async fn product(&self, id: i64) -> Result<Option<ProductRecord>, WarehouseError>;
    async fn distribution_center(&self, id: i64) -> Result<Option<CenterRecord>, WarehouseError>;
}

/// The local analytical database. Every call borrows a pooled connection
/// inside a blocking task.
#[derive(Clone)]
pub struct Warehouse {
    pool: Pool<DuckDBConnectionManager>,
    path: PathBuf,
}

impl Warehouse {
    pub fn open(path: impl AsRef<Path>, pool_size: u32) -> Result<Self, WarehouseError> {
        let path = path.as_ref().to_path_buf();
        let pool = build_pool(&path, pool_size)?;
        Ok(Self { pool, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the database file in bytes, 0 when it cannot be read.
    pub fn database_size(&self) -> u64 {
        match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!("Could not stat database {}: {}", self.path.display(), e);
                0
            }
        }
    }

    pub async fn with_connection<T, F>(&self, f: F) -> Result<T, WarehouseError>
    where
        F: FnOnce(&Connection) -> Result<T, WarehouseError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| WarehouseError::Task(e.to_string()))?
    }

    /// Executes one statement and collects every row.
    pub async fn query(&self, sql: String) -> Result<QueryOutput, WarehouseError> {
        self.with_connection(move |conn| {
            debug!("Executing SQL: {}", sql);
            collect_rows(conn, &sql)
        })
        .await
    }

    /// DuckDB's JSON parse tree for a SELECT statement. Parser failures are
    /// reported inside the tree (`"error": true`), not as an `Err`.
    pub async fn parse_tree(&self, sql: String) -> Result<serde_json::Value, WarehouseError> {
        self.with_connection(move |conn| {
            let tree: String =
                conn.query_row("SELECT json_serialize_sql(?)", params![sql], |row| row.get(0))?;
            Ok(serde_json::from_str(&tree)?)
        })
        .await
    }

    pub async fn table_names(&self) -> Result<Vec<String>, WarehouseError> {
        self.with_connection(|conn| list_tables(conn)).await
    }

    /// Builds the schema description handed to the SQL generator: a
    /// `CREATE TABLE` block plus three sample rows per existing table.
    pub async fn describe_tables(&self, tables: Vec<String>) -> Result<String, WarehouseError> {
        self.with_connection(move |conn| {
            let existing = list_tables(conn)?;
            let mut blocks = Vec::new();

            for table in tables.iter().filter(|t| existing.contains(t)) {
                let columns = table_columns(conn, table)?;

                let mut block = format!("CREATE TABLE {} (\n", quote_ident(table));
                let defs: Vec<String> = columns
                    .iter()
                    .map(|(name, ty)| format!("    {} {}", quote_ident(name), ty))
                    .collect();
                block.push_str(&defs.join(",\n"));
                block.push_str("\n)\n");

                let sample = collect_rows(conn, &format!("SELECT * FROM {} LIMIT 3", quote_ident(table)))?;
                block.push_str(&format!("/*\n3 rows from {} table:\n", table));
                block.push_str(&sample.columns.join("\t"));
                block.push('\n');
                for row in &sample.rows {
                    let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
                    block.push_str(&cells.join("\t"));
                    block.push('\n');
                }
                block.push_str("*/");
                blocks.push(block);
            }

            Ok(blocks.join("\n\n"))
        })
        .await
    }

    /// Row counts and column names for every table; a table that cannot be
    /// counted reports `None`.
    pub async fn summarize_tables(&self) -> Result<Vec<TableSummary>, WarehouseError> {
        self.with_connection(|conn| {
            let tables = list_tables(conn)?;
            let mut summaries = Vec::with_capacity(tables.len());
            for name in tables {
                let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&name));
                let row_count = conn.query_row(&sql, [], |row| row.get::<_, i64>(0)).ok();
                let columns = table_columns(conn, &name)?
                    .into_iter()
                    .map(|(column, _)| column)
                    .collect();
                summaries.push(TableSummary {
                    name,
                    row_count,
                    columns,
                });
            }
            Ok(summaries)
        })
        .await
    }
}

/// `"customers: 10 rows, cols: a, b"` lines listing at most five columns,
/// `?` for tables that could not be counted.
pub fn render_table_summary(summaries: &[TableSummary]) -> String {
    summaries
        .iter()
        .map(|s| {
            let count = s.row_count.map_or_else(|| "?".to_string(), |n| n.to_string());
            let cols: Vec<&str> = s.columns.iter().take(5).map(String::as_str).collect();
            format!("{}: {} rows, cols: {}", s.name, count, cols.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl EntityLookup for Warehouse {
    async fn customer(&self, id: i64) -> Result<Option<CustomerRecord>, WarehouseError> {
        self.with_connection(move |conn| {
            let record = conn
                .query_row(
                    "SELECT CAST(user_id AS BIGINT), \
                            CAST(customer_first_name AS VARCHAR), \
                            CAST(customer_last_name AS VARCHAR), \
                            CAST(num_orders_Cancelled AS BIGINT), \
                            CAST(num_orders_Returned AS BIGINT), \
                            CAST(num_web_sessions AS BIGINT) \
                     FROM customers WHERE user_id = ?",
                    params![id],
                    |row| {
                        Ok(CustomerRecord {
                            user_id: row.get(0)?,
                            first_name: text_or_empty(row, 1)?,
                            last_name: text_or_empty(row, 2)?,
                            orders_cancelled: int_or_zero(row, 3)?,
                            orders_returned: int_or_zero(row, 4)?,
                            web_sessions: int_or_zero(row, 5)?,
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn product(&self, id: i64) -> Result<Option<ProductRecord>, WarehouseError> {
        self.with_connection(move |conn| {
            let record = conn
                .query_row(
                    "SELECT CAST(product_id AS BIGINT), \
                            CAST(product_name AS VARCHAR), \
                            CAST(product_category AS VARCHAR), \
                            CAST(sales_amount AS DOUBLE), \
                            CAST(cost_of_goods_sold AS DOUBLE), \
                            CAST(profit AS DOUBLE) \
                     FROM products WHERE product_id = ?",
                    params![id],
                    |row| {
                        Ok(ProductRecord {
                            product_id: row.get(0)?,
                            name: text_or_empty(row, 1)?,
                            category: text_or_empty(row, 2)?,
                            sales: float_or_zero(row, 3)?,
                            cost_of_goods_sold: float_or_zero(row, 4)?,
                            profit: float_or_zero(row, 5)?,
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn distribution_center(&self, id: i64) -> Result<Option<CenterRecord>, WarehouseError> {
        self.with_connection(move |conn| {
            let record = conn
                .query_row(
                    "SELECT CAST(distribution_center_id AS BIGINT), \
                            CAST(distribution_center_name AS VARCHAR), \
                            CAST(items_in_stock AS BIGINT), \
                            CAST(total_sales AS DOUBLE), \
                            CAST(total_inventory_cost AS DOUBLE) \
                     FROM distribution_center_inventory WHERE distribution_center_id = ?",
                    params![id],
                    |row| {
                        Ok(CenterRecord {
                            center_id: row.get(0)?,
                            name: text_or_empty(row, 1)?,
                            items_in_stock: int_or_zero(row, 2)?,
                            total_sales: float_or_zero(row, 3)?,
                            inventory_cost: float_or_zero(row, 4)?,
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
        .await
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn list_tables(conn: &Connection) -> Result<Vec<String>, WarehouseError> {
    let mut stmt = conn.prepare(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'main' ORDER BY table_name",
    )?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .filter_map(Result::ok)
        .collect();
    Ok(tables)
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<(String, String)>, WarehouseError> {
    let mut stmt = conn.prepare(
        "SELECT column_name, data_type FROM information_schema.columns \
         WHERE table_schema = 'main' AND table_name = ? ORDER BY ordinal_position",
    )?;
    let columns = stmt
        .query_map([table], |row| Ok((row.get(0)?, row.get(1)?)))?
        .filter_map(Result::ok)
        .collect();
    Ok(columns)
}

fn collect_rows(conn: &Connection, sql: &str) -> Result<QueryOutput, WarehouseError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut output = QueryOutput::default();

    while let Some(row) = rows.next()? {
        if output.columns.is_empty() {
            output.columns = row.as_ref().column_names();
        }
        let width = output.columns.len();
        let cells = (0..width).map(|i| read_cell(row, i)).collect();
        output.rows.push(cells);
    }

    Ok(output)
}

fn read_cell(row: &Row<'_>, idx: usize) -> Scalar {
    match row.get_ref(idx) {
        Ok(value) => Scalar::from_value_ref(value)
            .or_else(|| row.get::<_, String>(idx).ok().map(Scalar::Text))
            .unwrap_or_else(|| Scalar::Text("ERROR".to_string())),
        Err(_) => Scalar::Text("ERROR".to_string()),
    }
}

fn text_or_empty(row: &Row<'_>, idx: usize) -> duckdb::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

fn int_or_zero(row: &Row<'_>, idx: usize) -> duckdb::Result<i64> {
    Ok(row.get::<_, Option<i64>>(idx)?.unwrap_or(0))
}

fn float_or_zero(row: &Row<'_>, idx: usize) -> duckdb::Result<f64> {
    Ok(row.get::<_, Option<f64>>(idx)?.unwrap_or(0.0))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// A warehouse seeded with one customer, two products and one center.
    pub(crate) async fn seeded_warehouse() -> (TempDir, Warehouse) {
        let dir = tempfile::tempdir().unwrap();
        let warehouse = Warehouse::open(dir.path().join("ingest.db"), 2).unwrap();
        warehouse
            .with_connection(|conn| {
                conn.execute_batch(
                    "CREATE TABLE customers (
                        user_id BIGINT, customer_first_name VARCHAR, customer_last_name VARCHAR,
                        num_orders_Cancelled INTEGER, num_orders_Returned INTEGER,
                        num_web_sessions INTEGER, total_amount_spent DOUBLE);
                     INSERT INTO customers VALUES (42, 'Ada', 'Lovelace', 1, 0, 17, 1234.5);
                     CREATE TABLE products (
                        product_id BIGINT, product_name VARCHAR, product_category VARCHAR,
                        sales_amount DOUBLE, cost_of_goods_sold DOUBLE, profit DOUBLE);
                     INSERT INTO products VALUES
                        (7, 'Desk Lamp', 'Home', 2500.0, 1000.0, 1500.0),
                        (8, 'Mug', 'Kitchen', 300.0, 120.0, 180.0);
                     CREATE TABLE distribution_center_inventory (
                        distribution_center_id BIGINT, distribution_center_name VARCHAR,
                        items_in_stock BIGINT, total_sales DOUBLE, total_inventory_cost DOUBLE);
                     INSERT INTO distribution_center_inventory VALUES (3, 'Memphis TN', 120, 98765.4, 4321.0);",
                )?;
                Ok(())
            })
            .await
            .unwrap();
        (dir, warehouse)
    }

    #[tokio::test]
    async fn entity_lookups_hit_and_miss() {
        let (_dir, warehouse) = seeded_warehouse().await;

        let customer = warehouse.customer(42).await.unwrap().unwrap();
        assert_eq!(customer.first_name, "Ada");
        assert_eq!(customer.web_sessions, 17);
        assert!(warehouse.customer(9999).await.unwrap().is_none());

        let product = warehouse.product(7).await.unwrap().unwrap();
        assert_eq!(product.category, "Home");
        assert_eq!(product.profit, 1500.0);

        let center = warehouse.distribution_center(3).await.unwrap().unwrap();
        assert_eq!(center.items_in_stock, 120);
    }

    #[tokio::test]
    async fn query_returns_columns_and_typed_cells() {
        let (_dir, warehouse) = seeded_warehouse().await;
        let output = warehouse
            .query("SELECT product_name, profit FROM products ORDER BY profit DESC".to_string())
            .await
            .unwrap();

        assert_eq!(output.columns, vec!["product_name", "profit"]);
        assert_eq!(output.rows.len(), 2);
        assert_eq!(output.rows[0][0], Scalar::Text("Desk Lamp".into()));
        assert_eq!(output.rows[0][1], Scalar::Float(1500.0));
    }

    #[tokio::test]
    async fn schema_description_covers_only_existing_allowed_tables() {
        let (_dir, warehouse) = seeded_warehouse().await;
        let schema = warehouse
            .describe_tables(vec!["products".to_string(), "missing_table".to_string()])
            .await
            .unwrap();

        assert!(schema.contains("CREATE TABLE \"products\""));
        assert!(schema.contains("\"product_name\" VARCHAR"));
        assert!(schema.contains("3 rows from products table"));
        assert!(!schema.contains("missing_table"));
        assert!(!schema.contains("customers"));
    }

    #[tokio::test]
    async fn table_summary_counts_rows() {
        let (_dir, warehouse) = seeded_warehouse().await;
        let summaries = warehouse.summarize_tables().await.unwrap();
        let text = render_table_summary(&summaries);

        assert!(text.contains("customers: 1 rows"));
        assert!(text.contains("products: 2 rows, cols: product_id, product_name"));
        assert!(warehouse.database_size() > 0);
    }
}
