//! Per-tenant registry of question graphs.
//!
//! Graphs are immutable once installed. Installing a new version replaces the
//! catalog entry; sessions already running keep the `Arc` they started with.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use super::model::QuestionGraph;

#[derive(Default)]
pub struct GraphCatalog {
    graphs: RwLock<HashMap<String, Arc<QuestionGraph>>>,
}

impl GraphCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install a graph for a tenant, returning the version it replaced.
    pub async fn install(&self, tenant: &str, graph: QuestionGraph) -> Option<Arc<QuestionGraph>> {
        info!(
            tenant = %tenant,
            version = graph.version,
            questions = graph.questions.len(),
            "Question graph installed"
        );
        self.graphs
            .write()
            .await
            .insert(tenant.to_string(), Arc::new(graph))
    }

    pub async fn get(&self, tenant: &str) -> Option<Arc<QuestionGraph>> {
        self.graphs.read().await.get(tenant).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(version: u32) -> QuestionGraph {
        QuestionGraph::from_json(&format!(
            r#"{{ "version": {version}, "questions": [
                {{ "id": "q1", "order": 1, "type": "text_input", "text": "Name?" }}
            ] }}"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn install_replaces_but_keeps_old_arcs_alive() {
        let catalog = GraphCatalog::new();
        assert!(catalog.get("t1").await.is_none());

        assert!(catalog.install("t1", graph(1)).await.is_none());
        let pinned = catalog.get("t1").await.unwrap();

        let previous = catalog.install("t1", graph(2)).await.unwrap();
        assert_eq!(previous.version, 1);
        assert_eq!(pinned.version, 1);
        assert_eq!(catalog.get("t1").await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let catalog = GraphCatalog::new();
        catalog.install("t1", graph(1)).await;
        assert!(catalog.get("t2").await.is_none());
        assert_eq!(catalog.get("t1").await.unwrap().version, 1);
    }
}
