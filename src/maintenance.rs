//! Graph upkeep: pruning stale edges and reacting to contacts, datasources or
//! accounts leaving scope.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::Result;
use crate::graph::{ContactGraph, ContactNode, GraphRegistry};

/// Newest last-update time (ms since epoch) that counts as stale.
pub fn prune_cutoff(now_ms: i64, max_age: Duration) -> i64 {
    let age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(age_ms)
}

/// Drop every edge whose combined last update is older than `max_age`.
pub async fn prune_stale_edges<G: ContactGraph>(graph: &G, max_age: Duration) -> Result<i64> {
    let cutoff = prune_cutoff(chrono::Utc::now().timestamp_millis(), max_age);
    graph.prune_edges(cutoff).await?;
    log::info!("pruned contact edges for account {} not updated since {}", graph.account_id(), cutoff);
    Ok(cutoff)
}

/// Something left the account's scope and must be forgotten by the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeChange {
    ContactRemoved(ContactNode),
    EdgeRemoved(ContactNode, ContactNode),
    DataSourceRemoved(String),
    AccountReset,
}

pub async fn apply_scope_change<G: ContactGraph>(graph: &G, change: &ScopeChange) -> Result<()> {
    match change {
        ScopeChange::ContactRemoved(node) => graph.delete_node(node).await?,
        ScopeChange::EdgeRemoved(a, b) => graph.delete_edge(a, b).await?,
        ScopeChange::DataSourceRemoved(id) => graph.delete_data_source(id).await?,
        ScopeChange::AccountReset => graph.delete_graph().await?,
    }
    log::debug!("applied {:?} to contact graph of account {}", change, graph.account_id());
    Ok(())
}

/// Periodically prune each listed account on whatever backend the registry
/// currently holds. Failures for one account are logged and do not stop the
/// others.
pub fn spawn_prune_job(
    registry: Arc<GraphRegistry>,
    accounts: Vec<String>,
    interval: Duration,
    max_age: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            for account in &accounts {
                let graph = match registry.graph(account).await {
                    Ok(graph) => graph,
                    Err(e) => {
                        log::warn!("prune skipped for account {}: {}", account, e);
                        continue;
                    }
                };
                if let Err(e) = prune_stale_edges(&graph, max_age).await {
                    log::error!("prune failed for account {}: {}", account, e);
                }
            }
        }
    })
}
