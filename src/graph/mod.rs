//! Contact affinity graph: data model, store contract and backends.
//!
//! Each account owns a weighted, typed, directed multi-graph over contact
//! identities. Edges accumulate per-type weight and a last-update timestamp,
//! plus a synthetic `combined` relation summing every typed write. Backends
//! implement [`ContactGraph`]; [`GraphRegistry`] hands out per-account
//! handles for whichever backend is configured.

mod edge;
mod memory;
mod node;
mod query;
mod registry;
mod sqlite;

#[cfg(test)]
mod conformance;

pub use edge::{EdgeSelector, EdgeType, EdgeTypeRegistry, EdgeUpdate, COMBINED_EDGE_NAME};
pub use memory::{MemoryContactGraph, MemoryGraphFactory};
pub use node::{display_name, ContactNode};
pub use query::{ContactResult, ContactsParams};
pub use registry::{AccountGraph, GraphFactory, GraphRegistry};
pub use sqlite::{SqliteContactGraph, SqliteGraphFactory};

use std::future::Future;

use crate::error::Result;

/// Per-account contract for mutating and querying the affinity graph.
///
/// Writes are additive (weights) or max (timestamps), so concurrent updates
/// to the same pair converge without coordination.
pub trait ContactGraph: Send + Sync {
    fn account_id(&self) -> &str;

    /// Create missing edge records, then add `multiplier * type weight` to the
    /// typed and combined weights of `a -> b` (and `b -> a` unless directed).
    fn update_edge(
        &self,
        a: &ContactNode,
        b: &ContactNode,
        update: &EdgeUpdate,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove every edge with `node` at either end
    fn delete_node(&self, node: &ContactNode) -> impl Future<Output = Result<()>> + Send;

    /// Remove both directed edges between `a` and `b`
    fn delete_edge(&self, a: &ContactNode, b: &ContactNode) -> impl Future<Output = Result<()>> + Send;

    /// Remove every edge touching a node stored under the datasource
    fn delete_data_source(&self, data_source_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Remove every edge of the account
    fn delete_graph(&self) -> impl Future<Output = Result<()>> + Send;

    /// Remove edges whose combined relation was last updated at or before `cutoff`
    fn prune_edges(&self, cutoff: i64) -> impl Future<Output = Result<()>> + Send;

    /// Seed search, one-hop expansion, aggregation and top-K ranking.
    fn get_related_contacts(
        &self,
        params: &ContactsParams,
    ) -> impl Future<Output = Result<Vec<ContactResult>>> + Send;

    /// Update every unordered pair in `contacts`. All pairs are attempted; the
    /// first failure is returned once the clique is done.
    fn add_clique(
        &self,
        contacts: &[ContactNode],
        update: &EdgeUpdate,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            let mut first_error = None;
            for (i, from) in contacts.iter().enumerate() {
                for to in &contacts[i + 1..] {
                    if let Err(e) = self.update_edge(from, to, update).await {
                        log::error!(
                            "unable to update '{}' affinity between {} and {}: {}",
                            update.edge_type.name(),
                            from,
                            to,
                            e
                        );
                        first_error.get_or_insert(e);
                    }
                }
            }
            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }
}
