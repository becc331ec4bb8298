//! Backend selection and per-account graph handles.

use std::sync::{Arc, RwLock};

use super::edge::{EdgeTypeRegistry, EdgeUpdate};
use super::memory::{MemoryContactGraph, MemoryGraphFactory};
use super::node::ContactNode;
use super::query::{ContactResult, ContactsParams};
use super::sqlite::{SqliteContactGraph, SqliteGraphFactory};
use super::ContactGraph;
use crate::config::{BackendConfig, BackendKind};
use crate::error::{AffinityError, Result};

/// A configured backend, able to open any account's graph.
#[derive(Debug)]
pub enum GraphFactory {
    Memory(MemoryGraphFactory),
    Sqlite(SqliteGraphFactory),
}

impl GraphFactory {
    pub async fn from_config(config: &BackendConfig) -> Result<Self> {
        match config.kind {
            BackendKind::Memory => Ok(GraphFactory::Memory(MemoryGraphFactory::new())),
            BackendKind::Sqlite => Ok(GraphFactory::Sqlite(SqliteGraphFactory::open(config).await?)),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            GraphFactory::Memory(_) => BackendKind::Memory,
            GraphFactory::Sqlite(_) => BackendKind::Sqlite,
        }
    }

    pub async fn graph(&self, account_id: &str) -> Result<AccountGraph> {
        match self {
            GraphFactory::Memory(f) => Ok(AccountGraph::Memory(f.graph(account_id))),
            GraphFactory::Sqlite(f) => Ok(AccountGraph::Sqlite(f.graph(account_id).await?)),
        }
    }

    pub fn shutdown(&self) {
        match self {
            GraphFactory::Memory(_) => log::info!("in-memory contact graph backend shut down"),
            GraphFactory::Sqlite(f) => f.shutdown(),
        }
    }
}

/// One account's graph on whichever backend was configured when it was opened.
#[derive(Debug, Clone)]
pub enum AccountGraph {
    Memory(MemoryContactGraph),
    Sqlite(SqliteContactGraph),
}

impl ContactGraph for AccountGraph {
    fn account_id(&self) -> &str {
        match self {
            AccountGraph::Memory(g) => g.account_id(),
            AccountGraph::Sqlite(g) => g.account_id(),
        }
    }

    async fn update_edge(&self, a: &ContactNode, b: &ContactNode, update: &EdgeUpdate) -> Result<()> {
        match self {
            AccountGraph::Memory(g) => g.update_edge(a, b, update).await,
            AccountGraph::Sqlite(g) => g.update_edge(a, b, update).await,
        }
    }

    async fn delete_node(&self, node: &ContactNode) -> Result<()> {
        match self {
            AccountGraph::Memory(g) => g.delete_node(node).await,
            AccountGraph::Sqlite(g) => g.delete_node(node).await,
        }
    }

    async fn delete_edge(&self, a: &ContactNode, b: &ContactNode) -> Result<()> {
        match self {
            AccountGraph::Memory(g) => g.delete_edge(a, b).await,
            AccountGraph::Sqlite(g) => g.delete_edge(a, b).await,
        }
    }

    async fn delete_data_source(&self, data_source_id: &str) -> Result<()> {
        match self {
            AccountGraph::Memory(g) => g.delete_data_source(data_source_id).await,
            AccountGraph::Sqlite(g) => g.delete_data_source(data_source_id).await,
        }
    }

    async fn delete_graph(&self) -> Result<()> {
        match self {
            AccountGraph::Memory(g) => g.delete_graph().await,
            AccountGraph::Sqlite(g) => g.delete_graph().await,
        }
    }

    async fn prune_edges(&self, cutoff: i64) -> Result<()> {
        match self {
            AccountGraph::Memory(g) => g.prune_edges(cutoff).await,
            AccountGraph::Sqlite(g) => g.prune_edges(cutoff).await,
        }
    }

    async fn get_related_contacts(&self, params: &ContactsParams) -> Result<Vec<ContactResult>> {
        match self {
            AccountGraph::Memory(g) => g.get_related_contacts(params).await,
            AccountGraph::Sqlite(g) => g.get_related_contacts(params).await,
        }
    }
}

/// Holds the active backend factory and the known edge types.
///
/// Reconfiguring swaps the factory for new lookups; handles opened earlier
/// keep using the backend they came from.
#[derive(Debug, Default)]
pub struct GraphRegistry {
    factory: RwLock<Option<Arc<GraphFactory>>>,
    edge_types: EdgeTypeRegistry,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a backend already configured
    pub async fn with_backend(config: &BackendConfig) -> Result<Self> {
        let registry = Self::new();
        registry.configure(config).await?;
        Ok(registry)
    }

    /// Build a backend from configuration and make it current.
    pub async fn configure(&self, config: &BackendConfig) -> Result<()> {
        let factory = Arc::new(GraphFactory::from_config(config).await?);
        log::info!("contact graph backend configured: {:?} ({:?} index)", factory.kind(), config.index_type);
        let previous = self.slot_write()?.replace(factory);
        if previous.is_some() {
            log::info!("previous contact graph backend retired");
        }
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.factory.read().map(|f| f.is_some()).unwrap_or(false)
    }

    /// Graph handle for an account on the current backend
    pub async fn graph(&self, account_id: &str) -> Result<AccountGraph> {
        let factory = self
            .factory
            .read()
            .map_err(|_| AffinityError::Backend("contact graph registry lock poisoned".to_string()))?
            .clone()
            .ok_or_else(|| AffinityError::NotFound("contact graph backend is not configured".to_string()))?;
        factory.graph(account_id).await
    }

    /// Detach and shut down the current backend.
    pub fn shutdown(&self) -> Result<()> {
        if let Some(factory) = self.slot_write()?.take() {
            factory.shutdown();
        }
        Ok(())
    }

    pub fn edge_types(&self) -> &EdgeTypeRegistry {
        &self.edge_types
    }

    fn slot_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Option<Arc<GraphFactory>>>> {
        self.factory
            .write()
            .map_err(|_| AffinityError::Backend("contact graph registry lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexType;
    use crate::graph::EdgeType;
    use tempfile::TempDir;

    fn sqlite_config(dir: &TempDir) -> BackendConfig {
        BackendConfig {
            kind: BackendKind::Sqlite,
            index_type: IndexType::Account,
            data_dir: dir.path().to_path_buf(),
            ..BackendConfig::default()
        }
    }

    async fn link(graph: &AccountGraph, a: &str, b: &str) {
        graph
            .update_edge(&ContactNode::new(a), &ContactNode::new(b), &EdgeUpdate::new(EdgeType::to(), 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unconfigured_registry_is_not_found() {
        let registry = GraphRegistry::new();
        assert!(!registry.is_configured());
        let err = registry.graph("acct-1").await.unwrap_err();
        assert!(matches!(err, AffinityError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_backend_shares_state_between_handles() {
        let registry = GraphRegistry::with_backend(&BackendConfig::memory()).await.unwrap();
        link(&registry.graph("acct-1").await.unwrap(), "a", "b").await;

        let again = registry.graph("acct-1").await.unwrap();
        let results = again.get_related_contacts(&ContactsParams::new(["a"])).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(again.account_id(), "acct-1");
    }

    #[tokio::test]
    async fn test_reconfigure_keeps_old_handles_working() {
        let temp = TempDir::new().unwrap();
        let registry = GraphRegistry::with_backend(&BackendConfig::memory()).await.unwrap();
        let old = registry.graph("acct-1").await.unwrap();
        link(&old, "a", "b").await;

        registry.configure(&sqlite_config(&temp)).await.unwrap();
        let new = registry.graph("acct-1").await.unwrap();
        assert!(matches!(new, AccountGraph::Sqlite(_)));
        assert!(new.get_related_contacts(&ContactsParams::new(["a"])).await.unwrap().is_empty());

        link(&old, "a", "c").await;
        assert_eq!(old.get_related_contacts(&ContactsParams::new(["a"])).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_detaches_backend() {
        let temp = TempDir::new().unwrap();
        let registry = GraphRegistry::with_backend(&sqlite_config(&temp)).await.unwrap();
        let graph = registry.graph("acct-1").await.unwrap();

        registry.shutdown().unwrap();
        assert!(!registry.is_configured());
        assert!(matches!(registry.graph("acct-1").await, Err(AffinityError::NotFound(_))));
        let err = graph.get_related_contacts(&ContactsParams::new(["a"])).await.unwrap_err();
        assert!(err.is_backend_failure());
    }

    #[tokio::test]
    async fn test_bad_data_dir_is_configuration_failure() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let config = BackendConfig {
            data_dir: file.join("graphs"),
            ..sqlite_config(&temp)
        };

        let registry = GraphRegistry::new();
        let err = registry.configure(&config).await.unwrap_err();
        assert!(matches!(err, AffinityError::Configuration(_)));
        assert!(!registry.is_configured());
    }

    #[test]
    fn test_edge_types_are_per_registry() {
        let first = GraphRegistry::new();
        let second = GraphRegistry::new();
        first.edge_types().register(EdgeType::new("reply", 4).unwrap()).unwrap();
        assert!(first.edge_types().get("reply").is_some());
        assert!(second.edge_types().get("reply").is_none());
    }
}
