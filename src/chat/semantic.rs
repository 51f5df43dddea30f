use crate::db::values::format_amount;
use crate::db::warehouse::EntityLookup;
use crate::embedding::{validate_embedding, Embedder, EmbeddingError};
use crate::vector::{VectorError, VectorIndex, VectorMatch};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const NO_MATCHES: &str = "No relevant customers or products found.";

#[derive(Debug, thiserror::Error)]
pub enum SemanticError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Vector(#[from] VectorError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityKind {
    Customer,
    Product,
    Center,
}

impl EntityKind {
    fn label(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customer",
            EntityKind::Product => "product",
            EntityKind::Center => "distribution center",
        }
    }
}

/// What a vector-match id points at.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityId {
    Known(EntityKind, i64),
    Unparsable(EntityKind),
    Unknown,
}

impl EntityId {
    pub fn parse(id: &str) -> Self {
        let kind = if id.starts_with("cust_") {
            EntityKind::Customer
        } else if id.starts_with("prod_") {
            EntityKind::Product
        } else if id.starts_with("dc_") {
            EntityKind::Center
        } else {
            return EntityId::Unknown;
        };

        match id.split_once('_').and_then(|(_, key)| key.parse::<i64>().ok()) {
            Some(key) => EntityId::Known(kind, key),
            None => EntityId::Unparsable(kind),
        }
    }
}

/// Embeds a question, finds the nearest entities and describes them from the warehouse.
pub struct SemanticSearch {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    lookup: Arc<dyn EntityLookup>,
    dimensions: usize,
}

impl SemanticSearch {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        lookup: Arc<dyn EntityLookup>,
        dimensions: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            lookup,
            dimensions,
        }
    }

    pub async fn handle_semantic_search(&self, question: &str, top_k: usize) -> Result<String, SemanticError> {
        let vector = self.embedder.embed(question).await?;
        validate_embedding(&vector, self.dimensions);

        let matches = self.index.query(&vector, top_k).await?;
        debug!("Vector index returned {} matches", matches.len());
        if matches.is_empty() {
            return Ok(NO_MATCHES.to_string());
        }

        let mut lines = Vec::with_capacity(matches.len());
        for m in &matches {
            lines.push(self.describe(m).await);
        }
        Ok(lines.join("\n"))
    }

    async fn describe(&self, m: &VectorMatch) -> String {
        let score = m.score;
        let entity = EntityId::parse(&m.id);
        let (kind, key) = match entity {
            EntityId::Known(kind, key) => (kind, key),
            EntityId::Unparsable(kind) => {
                return format!(
                    "Unparsable {} ID='{}', metadata: {}",
                    kind.label(),
                    m.id,
                    Value::Object(m.metadata.clone())
                );
            }
            EntityId::Unknown => {
                return format!(
                    "(Match ID={}, score={:.3}, metadata={})",
                    m.id,
                    score,
                    Value::Object(m.metadata.clone())
                );
            }
        };

        let described = match kind {
            EntityKind::Customer => self.lookup.customer(key).await.map(|found| match found {
                Some(c) => format!(
                    "Customer {} {} (ID {}): cancelled={}, returned={}, sessions={} (score={:.3})",
                    c.first_name, c.last_name, c.user_id, c.orders_cancelled, c.orders_returned,
                    c.web_sessions, score
                ),
                None => format!("Customer ID {} not found (score={:.3})", key, score),
            }),
            EntityKind::Product => self.lookup.product(key).await.map(|found| match found {
                Some(p) => format!(
                    "Product '{}' (ID {}), category={}, sales=${}, COGS=${}, profit=${} (score={:.3})",
                    p.name,
                    p.product_id,
                    p.category,
                    format_amount(p.sales),
                    format_amount(p.cost_of_goods_sold),
                    format_amount(p.profit),
                    score
                ),
                None => format!("Product ID {} not found (score={:.3})", key, score),
            }),
            EntityKind::Center => self.lookup.distribution_center(key).await.map(|found| match found {
                Some(d) => format!(
                    "Center '{}' (ID {}): stock={}, sales=${}, cost=${} (score={:.3})",
                    d.name,
                    d.center_id,
                    d.items_in_stock,
                    format_amount(d.total_sales),
                    format_amount(d.inventory_cost),
                    score
                ),
                None => format!("Distribution center ID {} not found (score={:.3})", key, score),
            }),
        };

        described.unwrap_or_else(|e| {
            warn!("Lookup failed for {}: {}", m.id, e);
            format!("Lookup failed for {}: {} (score={:.3})", m.id, e, score)
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::warehouse::tests::seeded_warehouse;
    use crate::db::warehouse::{CenterRecord, CustomerRecord, ProductRecord, WarehouseError};
    use crate::vector::{MemoryVectorIndex, VectorRecord};
    use async_trait::async_trait;
    use serde_json::{json, Map};

    /// Embeds every text as the same fixed vector.
    pub(crate) struct ConstantEmbedder(pub(crate) Vec<f32>);

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(self.0.clone())
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }

        fn dimensions(&self) -> usize {
            self.0.len()
        }
    }

    /// Customer lookups fail; every product exists.
    struct FlakyLookup;

    #[async_trait]
    impl EntityLookup for FlakyLookup {
        async fn customer(&self, _: i64) -> Result<Option<CustomerRecord>, WarehouseError> {
            Err(WarehouseError::Task("connection reset".to_string()))
        }

        async fn product(&self, id: i64) -> Result<Option<ProductRecord>, WarehouseError> {
            Ok(Some(ProductRecord {
                product_id: id,
                name: "Mug".to_string(),
                category: "Kitchen".to_string(),
                sales: 300.0,
                cost_of_goods_sold: 120.0,
                profit: 180.0,
            }))
        }

        async fn distribution_center(&self, _: i64) -> Result<Option<CenterRecord>, WarehouseError> {
            Ok(None)
        }
    }

    fn record(id: &str, values: Vec<f32>, metadata: Value) -> VectorRecord {
        let metadata = match metadata {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        VectorRecord {
            id: id.to_string(),
            values,
            metadata,
        }
    }

    #[test]
    fn ids_parse_by_prefix() {
        assert_eq!(EntityId::parse("cust_42"), EntityId::Known(EntityKind::Customer, 42));
        assert_eq!(EntityId::parse("dc_3"), EntityId::Known(EntityKind::Center, 3));
        assert_eq!(EntityId::parse("prod_abc"), EntityId::Unparsable(EntityKind::Product));
        assert_eq!(EntityId::parse("order_1"), EntityId::Unknown);
    }

    #[tokio::test]
    async fn empty_index_reports_no_matches() {
        let (_dir, warehouse) = seeded_warehouse().await;
        let search = SemanticSearch::new(
            Arc::new(ConstantEmbedder(vec![1.0, 0.0])),
            Arc::new(MemoryVectorIndex::new()),
            Arc::new(warehouse),
            2,
        );
        let reply = search.handle_semantic_search("How do I reset my password?", 3).await.unwrap();
        assert_eq!(reply, NO_MATCHES);
    }

    #[tokio::test]
    async fn matches_are_described_from_the_warehouse() {
        let (_dir, warehouse) = seeded_warehouse().await;
        let index = MemoryVectorIndex::new();
        index
            .upsert(vec![
                record("cust_42", vec![1.0, 0.0], json!({})),
                record("prod_7", vec![0.8, 0.6], json!({})),
                record("cust_9999", vec![0.6, 0.8], json!({})),
                record("dc_x", vec![0.0, 1.0], json!({"source": "dc"})),
                record("order_5", vec![-1.0, 0.0], json!({})),
            ])
            .await
            .unwrap();

        let search = SemanticSearch::new(
            Arc::new(ConstantEmbedder(vec![1.0, 0.0])),
            Arc::new(index),
            Arc::new(warehouse),
            2,
        );
        let reply = search.handle_semantic_search("who is ada", 5).await.unwrap();
        let lines: Vec<&str> = reply.lines().collect();

        assert_eq!(
            lines[0],
            "Customer Ada Lovelace (ID 42): cancelled=1, returned=0, sessions=17 (score=1.000)"
        );
        assert_eq!(
            lines[1],
            "Product 'Desk Lamp' (ID 7), category=Home, sales=$2,500.00, COGS=$1,000.00, profit=$1,500.00 (score=0.800)"
        );
        assert_eq!(lines[2], "Customer ID 9999 not found (score=0.600)");
        assert_eq!(lines[3], r#"Unparsable distribution center ID='dc_x', metadata: {"source":"dc"}"#);
        assert_eq!(lines[4], "(Match ID=order_5, score=-1.000, metadata={})");
    }

    #[tokio::test]
    async fn failed_lookup_is_reported_inline_and_later_matches_survive() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(vec![
                record("cust_1", vec![1.0, 0.0], json!({})),
                record("prod_3", vec![0.6, 0.8], json!({})),
                record("dc_4", vec![0.0, 1.0], json!({})),
            ])
            .await
            .unwrap();

        let search = SemanticSearch::new(
            Arc::new(ConstantEmbedder(vec![1.0, 0.0])),
            Arc::new(index),
            Arc::new(FlakyLookup),
            2,
        );
        let reply = search.handle_semantic_search("mugs and buyers", 3).await.unwrap();
        let lines: Vec<&str> = reply.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "Lookup failed for cust_1: Database task failed: connection reset (score=1.000)"
        );
        assert_eq!(
            lines[1],
            "Product 'Mug' (ID 3), category=Kitchen, sales=$300.00, COGS=$120.00, profit=$180.00 (score=0.600)"
        );
        assert_eq!(lines[2], "Distribution center ID 4 not found (score=0.000)");
    }
}
