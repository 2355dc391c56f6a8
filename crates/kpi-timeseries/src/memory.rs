use crate::error::{Result, StoreError};
use crate::query::KpiQuery;
use crate::store::KpiStore;
use async_trait::async_trait;
use kpi_types::{KpiSample, NodeType};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// 进程内存储，用于测试与演练模式
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<NodeType, Vec<KpiSample>>>,
    failing_nodes: HashSet<String>,
    fail_queries: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入包含该网元的数据时返回错误
    pub fn with_failing_node(mut self, node: impl Into<String>) -> Self {
        self.failing_nodes.insert(node.into());
        self
    }

    /// 所有查询返回错误
    pub fn with_failing_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    /// 某类网元的全部数据
    pub async fn rows(&self, node_type: NodeType) -> Vec<KpiSample> {
        self.tables
            .read()
            .await
            .get(&node_type)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl KpiStore for MemoryStore {
    async fn ingest(&self, node_type: NodeType, samples: &[KpiSample]) -> Result<usize> {
        if let Some(sample) = samples
            .iter()
            .find(|s| self.failing_nodes.contains(&s.node))
        {
            return Err(StoreError::Unavailable(format!(
                "ingest rejected for node {}",
                sample.node
            )));
        }

        self.tables
            .write()
            .await
            .entry(node_type)
            .or_default()
            .extend_from_slice(samples);
        Ok(samples.len())
    }

    async fn query(&self, query: &KpiQuery) -> Result<Vec<KpiSample>> {
        if self.fail_queries {
            return Err(StoreError::Unavailable("query rejected".to_string()));
        }

        let tables = self.tables.read().await;
        let mut rows: Vec<KpiSample> = tables
            .get(&query.node_type)
            .map(|rows| {
                rows.iter()
                    .filter(|s| query.matches(&s.node, &s.kpi_name, s.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by(|a, b| {
            (&a.node, &a.kpi_name)
                .cmp(&(&b.node, &b.kpi_name))
                .then(b.timestamp.cmp(&a.timestamp))
        });
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_memory_store_query_order() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let samples = vec![
            KpiSample::new("N2", "k", 1.0, now).unwrap(),
            KpiSample::new("N1", "k", 2.0, now - Duration::minutes(5)).unwrap(),
            KpiSample::new("N1", "k", 3.0, now).unwrap(),
            KpiSample::new("N1", "old", 4.0, now - Duration::hours(10)).unwrap(),
        ];
        assert_eq!(store.ingest(NodeType::Mme, &samples).await.unwrap(), 4);

        let query = KpiQuery::new(NodeType::Mme, now - Duration::hours(1))
            .with_kpis(["k", "old"])
            .with_nodes(["N1", "N2"]);
        let rows = store.query(&query).await.unwrap();

        let values: Vec<f64> = rows.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![3.0, 2.0, 1.0]);
        assert!(store
            .query(&KpiQuery::new(NodeType::Pgw, now))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failing_node_rejects_ingest() {
        let store = MemoryStore::new().with_failing_node("BAD");
        let sample = KpiSample::new("BAD", "k", 1.0, Utc::now()).unwrap();

        assert!(store.ingest(NodeType::Sbg, &[sample]).await.is_err());
        assert!(store.rows(NodeType::Sbg).await.is_empty());
    }
}
