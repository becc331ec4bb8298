//! Indexed-store backend on SQLite.
//!
//! Edges live in `contact_edges` (one row per directed edge) with per-type
//! accumulators in `contact_edge_weights`. Writes are two-phase: the edge row
//! is created with `INSERT OR IGNORE`, then the typed and combined
//! accumulators are upserted additively. Queries run the whole
//! search/expand/rank pipeline as one aggregate statement.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, params_from_iter, Connection, ToSql, TransactionBehavior};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use super::edge::{EdgeUpdate, COMBINED_EDGE_NAME};
use super::node::{data_source_prefix, ContactNode};
use super::query::{ContactResult, ContactsParams};
use super::ContactGraph;
use crate::config::{BackendConfig, IndexType};
use crate::db::{migrate, Db};
use crate::error::{AffinityError, Result};

const SHARED_DB_FILE: &str = "contacts.db";

/// Opens per-account graphs over SQLite files under `data_dir`.
#[derive(Debug)]
pub struct SqliteGraphFactory {
    data_dir: PathBuf,
    index_type: IndexType,
    query_timeout: Duration,
    /// One migration gate per database file; initialized once the schema is current
    migrated: Mutex<HashMap<PathBuf, Arc<OnceCell<()>>>>,
    closed: Arc<AtomicBool>,
}

impl SqliteGraphFactory {
    pub async fn open(config: &BackendConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            AffinityError::Configuration(format!(
                "unable to create contact graph data dir {}: {}",
                config.data_dir.display(),
                e
            ))
        })?;

        let factory = Self {
            data_dir: config.data_dir.clone(),
            index_type: config.index_type,
            query_timeout: config.query_timeout(),
            migrated: Mutex::new(HashMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
        };

        if factory.index_type == IndexType::Combined {
            factory.ensure_schema(&factory.data_dir.join(SHARED_DB_FILE)).await?;
        }

        Ok(factory)
    }

    /// Database file holding an account's edges
    pub fn db_path(&self, account_id: &str) -> PathBuf {
        match self.index_type {
            IndexType::Combined => self.data_dir.join(SHARED_DB_FILE),
            IndexType::Account => self.data_dir.join(format!("contacts_{}.db", file_safe(account_id))),
        }
    }

    pub async fn graph(&self, account_id: &str) -> Result<SqliteContactGraph> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AffinityError::Backend("contact graph factory has been shut down".to_string()));
        }
        let path = self.db_path(account_id);
        self.ensure_schema(&path).await?;
        Ok(SqliteContactGraph {
            db: Db::new(path),
            account_id: account_id.to_string(),
            query_timeout: self.query_timeout,
            closed: Arc::clone(&self.closed),
        })
    }

    /// Mark the factory closed; graphs handed out earlier start failing.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        log::info!("contact graph backend at {} shut down", self.data_dir.display());
    }

    /// Migrate a database file once. Concurrent first opens of the same file
    /// wait on the same migration; a failed migration is retried next time.
    async fn ensure_schema(&self, path: &Path) -> Result<()> {
        let gate = {
            let mut migrated = self
                .migrated
                .lock()
                .map_err(|_| AffinityError::Backend("migration tracker lock poisoned".to_string()))?;
            Arc::clone(migrated.entry(path.to_path_buf()).or_default())
        };
        gate.get_or_try_init(|| async {
            Db::new(path)
                .with_connection(migrate::run_migrations)
                .await
                .map_err(|e| {
                    AffinityError::Configuration(format!("unable to prepare {}: {}", path.display(), e))
                })
        })
        .await?;
        Ok(())
    }
}

fn file_safe(account_id: &str) -> String {
    account_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Edge id: SHA256 of `(account, from, to)`
fn edge_id(account_id: &str, from: &str, to: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(account_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(from.as_bytes());
    hasher.update([0u8]);
    hasher.update(to.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One account's graph in a SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteContactGraph {
    db: Db,
    account_id: String,
    query_timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl SqliteContactGraph {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AffinityError::Backend("contact graph backend has been shut down".to_string()));
        }
        Ok(())
    }

    /// Run a statement against the account's database, bounded by the query timeout.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.check_open()?;
        match tokio::time::timeout(self.query_timeout, self.db.with_connection(f)).await {
            Ok(result) => result,
            Err(_) => Err(AffinityError::Backend(format!(
                "contact graph query timed out after {}ms",
                self.query_timeout.as_millis()
            ))),
        }
    }

    async fn delete_where(&self, condition: &'static str, args: Vec<String>) -> Result<()> {
        let account_id = self.account_id.clone();
        let deleted = self
            .run(move |conn| {
                let sql = format!("DELETE FROM contact_edges WHERE account_id = ?1 AND ({})", condition);
                let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(account_id)];
                for arg in args {
                    values.push(Box::new(arg));
                }
                Ok(conn.execute(&sql, params_from_iter(values))?)
            })
            .await?;
        log::debug!("deleted {} contact edges for account {}", deleted, self.account_id);
        Ok(())
    }
}

fn write_edge(
    conn: &Connection,
    account_id: &str,
    from: &str,
    to: &str,
    type_name: &str,
    increment: u64,
    timestamp: i64,
) -> Result<()> {
    let id = edge_id(account_id, from, to);
    // Phase one: create the record if absent; never overwrites.
    conn.execute(
        "INSERT OR IGNORE INTO contact_edges (edge_id, account_id, from_node, to_node) VALUES (?1, ?2, ?3, ?4)",
        params![id, account_id, from, to],
    )?;
    // Phase two: additive weight, max timestamp.
    let increment = i64::try_from(increment)
        .map_err(|_| AffinityError::InvalidArgument("edge weight increment too large".to_string()))?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO contact_edge_weights (edge_id, edge_type, weight, last_update) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT (edge_id, edge_type) DO UPDATE SET \
             weight = weight + excluded.weight, \
             last_update = MAX(last_update, excluded.last_update)",
    )?;
    for name in [type_name, COMBINED_EDGE_NAME] {
        stmt.execute(params![id, name, increment, timestamp])?;
    }
    Ok(())
}

impl ContactGraph for SqliteContactGraph {
    fn account_id(&self) -> &str {
        &self.account_id
    }

    async fn update_edge(&self, a: &ContactNode, b: &ContactNode, update: &EdgeUpdate) -> Result<()> {
        let increment = update.increment()?;
        let account_id = self.account_id.clone();
        let from = a.storage_name();
        let to = b.storage_name();
        let type_name = update.edge_type.name().to_string();
        let timestamp = update.timestamp;
        let directed = update.directed;

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            write_edge(&tx, &account_id, &from, &to, &type_name, increment, timestamp)?;
            if !directed {
                write_edge(&tx, &account_id, &to, &from, &type_name, increment, timestamp)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_node(&self, node: &ContactNode) -> Result<()> {
        self.delete_where("from_node = ?2 OR to_node = ?2", vec![node.storage_name()]).await
    }

    async fn delete_edge(&self, a: &ContactNode, b: &ContactNode) -> Result<()> {
        self.delete_where(
            "(from_node = ?2 AND to_node = ?3) OR (from_node = ?3 AND to_node = ?2)",
            vec![a.storage_name(), b.storage_name()],
        )
        .await
    }

    async fn delete_data_source(&self, data_source_id: &str) -> Result<()> {
        self.delete_where(
            "substr(from_node, 1, length(?2)) = ?2 OR substr(to_node, 1, length(?2)) = ?2",
            vec![data_source_prefix(data_source_id)],
        )
        .await
    }

    async fn delete_graph(&self) -> Result<()> {
        self.delete_where("1 = 1", Vec::new()).await
    }

    async fn prune_edges(&self, cutoff: i64) -> Result<()> {
        let account_id = self.account_id.clone();
        let pruned = self
            .run(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM contact_edges WHERE account_id = ?1 AND edge_id IN ( \
                         SELECT edge_id FROM contact_edge_weights WHERE edge_type = ?2 AND last_update <= ?3)",
                    params![account_id, COMBINED_EDGE_NAME, cutoff],
                )?)
            })
            .await?;
        log::info!("pruned {} contact edges for account {} (cutoff {})", pruned, self.account_id, cutoff);
        Ok(())
    }

    async fn get_related_contacts(&self, params: &ContactsParams) -> Result<Vec<ContactResult>> {
        let seeds: Vec<String> = params.seed_nodes()?.iter().map(ContactNode::storage_name).collect();
        let account_id = self.account_id.clone();
        let field = params.edge().field_name().to_string();
        let lower_bound = i64::try_from(params.lower_bound()).unwrap_or(i64::MAX);
        let cutoff = params.update_cutoff().unwrap_or(i64::MIN);
        let num_results = params.num_results();

        self.run(move |conn| {
            // Seeds bind from ?5 onwards and are reused for the leaf filter.
            let placeholders = (0..seeds.len())
                .map(|i| format!("?{}", i + 5))
                .collect::<Vec<_>>()
                .join(",");
            let mut sql = format!(
                "SELECT e.to_node, SUM(w.weight) AS total \
                 FROM contact_edges e JOIN contact_edge_weights w ON w.edge_id = e.edge_id \
                 WHERE e.account_id = ?1 AND w.edge_type = ?2 AND w.weight >= ?3 AND w.last_update >= ?4 \
                   AND e.from_node IN ({p}) AND e.to_node NOT IN ({p}) \
                 GROUP BY e.to_node \
                 ORDER BY total DESC, e.to_node ASC",
                p = placeholders
            );
            if num_results > 0 {
                sql.push_str(&format!(" LIMIT {}", num_results));
            }

            let mut values: Vec<Box<dyn ToSql>> = vec![
                Box::new(account_id),
                Box::new(field),
                Box::new(lower_bound),
                Box::new(cutoff),
            ];
            for seed in seeds {
                values.push(Box::new(seed));
            }

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut results = Vec::new();
            for row in rows {
                let (name, total) = row?;
                results.push(ContactResult::from_storage(&name, u64::try_from(total).unwrap_or(0)));
            }
            Ok(results)
        })
        .await
        .map_err(|e| match e {
            AffinityError::Backend(_) => e,
            other => AffinityError::Backend(format!("unable to run related contacts query: {}", other)),
        })
    }
}
