//! In-memory reference backend: adjacency maps keyed by `(account, from node)`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::edge::{EdgeUpdate, COMBINED_EDGE_NAME};
use super::node::{data_source_prefix, ContactNode};
use super::query::{rank_candidates, ContactResult, ContactsParams};
use super::ContactGraph;
use crate::error::{AffinityError, Result};

/// Accumulator for one edge type on one directed edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct EdgeStats {
    weight: u64,
    last_update: i64,
}

/// A directed edge record; a missing type means zero weight.
#[derive(Debug, Clone, Default)]
struct EdgeRecord {
    stats: HashMap<String, EdgeStats>,
}

impl EdgeRecord {
    fn apply(&mut self, type_name: &str, increment: u64, timestamp: i64) {
        for name in [type_name, COMBINED_EDGE_NAME] {
            let stats = self.stats.entry(name.to_string()).or_default();
            stats.weight += increment;
            stats.last_update = stats.last_update.max(timestamp);
        }
    }

    fn get(&self, type_name: &str) -> EdgeStats {
        self.stats.get(type_name).copied().unwrap_or_default()
    }
}

type Adjacency = HashMap<(String, String), HashMap<String, EdgeRecord>>;

/// Shared store behind every in-memory account graph.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraphFactory {
    edges: Arc<RwLock<Adjacency>>,
}

impl MemoryGraphFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn graph(&self, account_id: &str) -> MemoryContactGraph {
        MemoryContactGraph {
            account_id: account_id.to_string(),
            edges: Arc::clone(&self.edges),
        }
    }
}

/// One account's view of the in-memory store.
#[derive(Debug, Clone)]
pub struct MemoryContactGraph {
    account_id: String,
    edges: Arc<RwLock<Adjacency>>,
}

impl MemoryContactGraph {
    fn read(&self) -> Result<RwLockReadGuard<'_, Adjacency>> {
        self.edges
            .read()
            .map_err(|_| AffinityError::Backend("contact graph lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Adjacency>> {
        self.edges
            .write()
            .map_err(|_| AffinityError::Backend("contact graph lock poisoned".to_string()))
    }

    fn key(&self, node_name: &str) -> (String, String) {
        (self.account_id.clone(), node_name.to_string())
    }

    /// Drop `to` entries matching the predicate across this account, then
    /// forget empty adjacency lists.
    fn retain_edges<F>(&self, mut keep: F) -> Result<()>
    where
        F: FnMut(&str, &str, &EdgeRecord) -> bool,
    {
        let mut edges = self.write()?;
        edges.retain(|(account, from), targets| {
            if account != &self.account_id {
                return true;
            }
            targets.retain(|to, record| keep(from, to, record));
            !targets.is_empty()
        });
        Ok(())
    }
}

impl ContactGraph for MemoryContactGraph {
    fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn update_edge(&self, a: &ContactNode, b: &ContactNode, update: &EdgeUpdate) -> Result<()> {
        let increment = update.increment()?;
        let from = a.storage_name();
        let to = b.storage_name();
        let type_name = update.edge_type.name();

        let mut edges = self.write()?;
        // Create-if-absent, then increment.
        edges
            .entry(self.key(&from))
            .or_default()
            .entry(to.clone())
            .or_default()
            .apply(type_name, increment, update.timestamp);
        if !update.directed {
            edges
                .entry(self.key(&to))
                .or_default()
                .entry(from)
                .or_default()
                .apply(type_name, increment, update.timestamp);
        }
        Ok(())
    }

    async fn delete_node(&self, node: &ContactNode) -> Result<()> {
        let name = node.storage_name();
        self.retain_edges(|from, to, _| from != name && to != name)
    }

    async fn delete_edge(&self, a: &ContactNode, b: &ContactNode) -> Result<()> {
        let a = a.storage_name();
        let b = b.storage_name();
        self.retain_edges(|from, to, _| !((from == a && to == b) || (from == b && to == a)))
    }

    async fn delete_data_source(&self, data_source_id: &str) -> Result<()> {
        let prefix = data_source_prefix(data_source_id);
        self.retain_edges(|from, to, _| !from.starts_with(&prefix) && !to.starts_with(&prefix))
    }

    async fn delete_graph(&self) -> Result<()> {
        let mut edges = self.write()?;
        edges.retain(|(account, _), _| account != &self.account_id);
        Ok(())
    }

    async fn prune_edges(&self, cutoff: i64) -> Result<()> {
        self.retain_edges(|_, _, record| record.get(COMBINED_EDGE_NAME).last_update > cutoff)
    }

    async fn get_related_contacts(&self, params: &ContactsParams) -> Result<Vec<ContactResult>> {
        let seeds: HashSet<String> = params.seed_nodes()?.iter().map(ContactNode::storage_name).collect();
        let field = params.edge().field_name();
        let edges = self.read()?;

        let mut totals: HashMap<String, u64> = HashMap::new();
        for seed in &seeds {
            let Some(targets) = edges.get(&self.key(seed)) else {
                continue;
            };
            for (to, record) in targets {
                if seeds.contains(to) {
                    continue;
                }
                // no accumulator for the selected type: not an edge of that type
                let Some(stats) = record.stats.get(field) else {
                    continue;
                };
                if stats.weight < params.lower_bound() {
                    continue;
                }
                if matches!(params.update_cutoff(), Some(cutoff) if stats.last_update < cutoff) {
                    continue;
                }
                *totals.entry(to.clone()).or_insert(0) += stats.weight;
            }
        }

        Ok(rank_candidates(totals, params.num_results()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::conformance;
    use crate::graph::EdgeType;

    fn graph() -> MemoryContactGraph {
        MemoryGraphFactory::new().graph("acct-1")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_conformance_suite() {
        let factory = MemoryGraphFactory::new();
        conformance::run_all(|account| {
            let g = factory.graph(account);
            async move { g }
        })
        .await;
    }

    #[tokio::test]
    async fn test_update_writes_both_directions() {
        let graph = graph();
        let a = ContactNode::new("a");
        let b = ContactNode::new("b");
        graph.update_edge(&a, &b, &EdgeUpdate::new(EdgeType::cc(), 10)).await.unwrap();

        let edges = graph.read().unwrap();
        let ab = edges[&graph.key("a")]["b"].get("cc");
        let ba = edges[&graph.key("b")]["a"].get(COMBINED_EDGE_NAME);
        assert_eq!(ab, EdgeStats { weight: 2, last_update: 10 });
        assert_eq!(ba, EdgeStats { weight: 2, last_update: 10 });
    }

    #[tokio::test]
    async fn test_empty_adjacency_lists_are_dropped() {
        let graph = graph();
        let a = ContactNode::new("a");
        let b = ContactNode::new("b");
        graph.update_edge(&a, &b, &EdgeUpdate::new(EdgeType::to(), 10)).await.unwrap();
        graph.delete_edge(&b, &a).await.unwrap();
        assert!(graph.read().unwrap().is_empty());
    }
}
