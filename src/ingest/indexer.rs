use super::IngestError;
use crate::db::values::Scalar;
use crate::db::warehouse::{quote_ident, Warehouse};
use crate::embedding::Embedder;
use crate::vector::{VectorIndex, VectorRecord};
use serde_json::{Map, Number, Value};
use tracing::{info, warn};

const BATCH_SIZE: usize = 100;

/// A table whose rows become vectors keyed `<prefix><id>`.
#[derive(Debug, Clone, Copy)]
pub struct EntitySource {
    pub table: &'static str,
    pub id_column: &'static str,
    pub prefix: &'static str,
    pub source: &'static str,
}

pub const ENTITY_SOURCES: &[EntitySource] = &[
    EntitySource {
        table: "customers",
        id_column: "user_id",
        prefix: "cust_",
        source: "customer",
    },
    EntitySource {
        table: "products",
        id_column: "product_id",
        prefix: "prod_",
        source: "product",
    },
    EntitySource {
        table: "distribution_center_inventory",
        id_column: "distribution_center_id",
        prefix: "dc_",
        source: "distribution_center_inventory",
    },
    EntitySource {
        table: "monthly_sales",
        id_column: "month",
        prefix: "month_",
        source: "monthly_sales",
    },
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexReport {
    pub source: String,
    pub upserted: usize,
}

fn metadata_value(value: &Scalar) -> Value {
    match value {
        Scalar::Null => Value::String(String::new()),
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Int(v) => Value::Number((*v).into()),
        Scalar::Float(v) => Number::from_f64(*v).map(Value::Number).unwrap_or(Value::from(0.0)),
        other => Value::String(other.to_string()),
    }
}

/// `key=value` pairs for every non-null column; this is the embedded text.
fn describe_row(columns: &[String], row: &[Scalar]) -> String {
    columns
        .iter()
        .zip(row)
        .filter(|(_, v)| !matches!(v, Scalar::Null))
        .map(|(c, v)| match v {
            Scalar::Float(f) => format!("{}={:.2}", c, f),
            other => format!("{}={}", c, other),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn id_of(value: &Scalar) -> Option<String> {
    match value {
        Scalar::Null => None,
        Scalar::Float(f) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
        other => Some(other.to_string()),
    }
}

async fn index_source(
    warehouse: &Warehouse,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    source: &EntitySource,
) -> Result<usize, IngestError> {
    let output = warehouse
        .query(format!("SELECT * FROM {}", quote_ident(source.table)))
        .await?;
    let Some(id_pos) = output.columns.iter().position(|c| c == source.id_column) else {
        warn!("{} has no {} column, skipping", source.table, source.id_column);
        return Ok(0);
    };

    let mut upserted = 0;
    for chunk in output.rows.chunks(BATCH_SIZE) {
        let keyed: Vec<(String, &Vec<Scalar>)> = chunk
            .iter()
            .filter_map(|row| id_of(&row[id_pos]).map(|id| (id, row)))
            .collect();
        let texts: Vec<String> = keyed
            .iter()
            .map(|(_, row)| describe_row(&output.columns, row))
            .collect();
        let vectors = embedder.embed_batch(&texts).await?;

        let records: Vec<VectorRecord> = keyed
            .into_iter()
            .zip(vectors)
            .map(|((id, row), values)| {
                let mut metadata = Map::new();
                metadata.insert("source".to_string(), Value::String(source.source.to_string()));
                for (column, value) in output.columns.iter().zip(row.iter()) {
                    metadata.insert(column.clone(), metadata_value(value));
                }
                VectorRecord {
                    id: format!("{}{}", source.prefix, id),
                    values,
                    metadata,
                }
            })
            .collect();
        upserted += index.upsert(records).await?;
    }

    info!("Embedded {} rows from {} into the vector index", upserted, source.table);
    Ok(upserted)
}

/// Embeds every row of each source table that exists. Missing tables are skipped.
pub async fn index_entities(
    warehouse: &Warehouse,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    sources: &[EntitySource],
) -> Result<Vec<IndexReport>, IngestError> {
    let existing = warehouse.table_names().await?;
    let mut reports = Vec::new();

    for source in sources {
        if !existing.iter().any(|t| t == source.table) {
            warn!("Table {} not found, skipping", source.table);
            continue;
        }
        let upserted = index_source(warehouse, embedder, index, source).await?;
        reports.push(IndexReport {
            source: source.source.to_string(),
            upserted,
        });
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::semantic::tests::ConstantEmbedder;
    use crate::db::warehouse::tests::seeded_warehouse;
    use crate::vector::MemoryVectorIndex;

    #[test]
    fn rows_describe_non_null_columns() {
        let columns = vec!["product_name".to_string(), "profit".to_string(), "note".to_string()];
        let row = vec![Scalar::Text("Mug".into()), Scalar::Float(180.0), Scalar::Null];
        assert_eq!(describe_row(&columns, &row), "product_name=Mug profit=180.00");
        assert_eq!(metadata_value(&Scalar::Null), Value::String(String::new()));
    }

    #[tokio::test]
    async fn seeded_tables_are_indexed_with_prefixed_ids() {
        let (_dir, warehouse) = seeded_warehouse().await;
        let index = MemoryVectorIndex::new();
        let embedder = ConstantEmbedder(vec![1.0, 0.0]);

        let reports = index_entities(&warehouse, &embedder, &index, ENTITY_SOURCES)
            .await
            .unwrap();
        let counts: Vec<(&str, usize)> = reports.iter().map(|r| (r.source.as_str(), r.upserted)).collect();
        assert_eq!(
            counts,
            vec![("customer", 1), ("product", 2), ("distribution_center_inventory", 1)]
        );

        let matches = index.query(&[1.0, 0.0], 10).await.unwrap();
        let mut ids: Vec<&str> = matches.iter().map(|m| m.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["cust_42", "dc_3", "prod_7", "prod_8"]);

        let customer = matches.iter().find(|m| m.id == "cust_42").unwrap();
        assert_eq!(customer.metadata["source"], "customer");
        assert_eq!(customer.metadata["customer_first_name"], "Ada");
    }
}
