use anyhow::Result;
use clap::{Parser, Subcommand};
use contact_affinity::graph::{ContactGraph, ContactNode, ContactsParams, GraphRegistry};
use contact_affinity::maintenance::{apply_scope_change, prune_stale_edges, ScopeChange};
use contact_affinity::tracking::{AffinityTracker, MessageAddresses, SendAsIdentity, UpdateSummary};
use contact_affinity::Config;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "affinity")]
#[command(about = "Track and query contact affinity graphs", version)]
struct Args {
    /// Account whose graph to use
    #[arg(short, long, global = true, default_value = "default")]
    account: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a message sent by the account
    Sent {
        #[arg(long, value_delimiter = ',')]
        to: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        cc: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        bcc: Vec<String>,
        /// Message time in ms since epoch (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,
        #[arg(long)]
        datasource: Option<String>,
    },
    /// Record a message received by the account
    Received {
        #[arg(long, value_delimiter = ',')]
        from: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        to: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        cc: Vec<String>,
        /// The account's own address
        #[arg(long)]
        me: String,
        /// Additional addresses the account sends as
        #[arg(long, value_delimiter = ',')]
        send_as: Vec<String>,
        #[arg(long)]
        timestamp: Option<i64>,
        #[arg(long)]
        datasource: Option<String>,
    },
    /// Rank contacts related to the given ones
    Related {
        #[arg(required = true)]
        contacts: Vec<String>,
        /// Edge type (to, cc, bcc, ...); all types when omitted
        #[arg(long = "type")]
        edge_type: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 1)]
        lower_bound: u64,
        /// Ignore edges last updated before this time (ms since epoch)
        #[arg(long)]
        cutoff: Option<i64>,
        #[arg(long)]
        datasource: Option<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget a contact
    DeleteNode {
        email: String,
        #[arg(long)]
        datasource: Option<String>,
    },
    /// Forget the connection between two contacts
    DeleteEdge {
        first: String,
        second: String,
        #[arg(long)]
        datasource: Option<String>,
    },
    /// Forget every contact of a datasource
    DeleteDatasource { datasource: String },
    /// Forget the account's whole graph
    DeleteGraph,
    /// Drop edges not updated recently
    Prune {
        /// Drop edges last updated at or before this time (ms since epoch)
        #[arg(long, conflicts_with = "max_age_days")]
        cutoff: Option<i64>,
        /// Defaults to maintenance.max_edge_age_days
        #[arg(long)]
        max_age_days: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .filter_or("RUST_LOG", &config.affinity.log_level)
    ).init();

    log::info!("Starting affinity v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Backend: {:?}, data dir: {}", config.backend.kind, config.backend.data_dir.display());

    let registry = GraphRegistry::with_backend(&config.backend).await?;
    let graph = registry.graph(&args.account).await?;

    let result = run(&config, &registry, graph, args.command).await;
    registry.shutdown()?;
    result
}

async fn run<G: ContactGraph>(
    config: &Config,
    registry: &GraphRegistry,
    graph: G,
    command: Command,
) -> Result<()> {
    match command {
        Command::Sent { to, cc, bcc, timestamp, datasource } => {
            let max_clique_size = config.max_clique_size_for(graph.account_id());
            let tracker = AffinityTracker::new(graph).with_max_clique_size(max_clique_size);
            let message = MessageAddresses { to, cc, bcc, ..Default::default() };
            let summary = tracker
                .update_from_sent(&message, timestamp.unwrap_or_else(now_ms), datasource.as_deref())
                .await;
            report(&summary);
        }
        Command::Received { from, to, cc, me, send_as, timestamp, datasource } => {
            let max_clique_size = config.max_clique_size_for(graph.account_id());
            let tracker = AffinityTracker::new(graph).with_max_clique_size(max_clique_size);
            let identity = SendAsIdentity::new(&me, send_as);
            let message = MessageAddresses { from, to, cc, ..Default::default() };
            let timestamp = timestamp.unwrap_or_else(now_ms);
            let summary = tracker
                .update_from_received(&message, timestamp, &identity, datasource.as_deref())
                .await;
            report(&summary);
        }
        Command::Related { contacts, edge_type, limit, lower_bound, cutoff, datasource, json } => {
            let selector = registry.edge_types().resolve(edge_type.as_deref())?;
            let mut params = ContactsParams::new(contacts)
                .with_selector(selector)
                .with_lower_bound(lower_bound)
                .with_num_results(config.query.limit_for(limit));
            if let Some(cutoff) = cutoff {
                params = params.with_update_cutoff(cutoff);
            }
            if let Some(datasource) = datasource {
                params = params.with_data_source(datasource);
            }

            let results = graph.get_related_contacts(&params).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No related contacts found.");
            } else {
                for result in &results {
                    println!("{:>8}  {}", result.weight, result.name);
                }
            }
        }
        Command::DeleteNode { email, datasource } => {
            let node = ContactNode::tagged(email, datasource.as_deref());
            apply_scope_change(&graph, &ScopeChange::ContactRemoved(node)).await?;
        }
        Command::DeleteEdge { first, second, datasource } => {
            let a = ContactNode::tagged(first, datasource.as_deref());
            let b = ContactNode::tagged(second, datasource.as_deref());
            apply_scope_change(&graph, &ScopeChange::EdgeRemoved(a, b)).await?;
        }
        Command::DeleteDatasource { datasource } => {
            apply_scope_change(&graph, &ScopeChange::DataSourceRemoved(datasource)).await?;
        }
        Command::DeleteGraph => {
            apply_scope_change(&graph, &ScopeChange::AccountReset).await?;
        }
        Command::Prune { cutoff: Some(cutoff), .. } => {
            graph.prune_edges(cutoff).await?;
            log::info!("Pruned edges last updated at or before {}", cutoff);
        }
        Command::Prune { cutoff: None, max_age_days } => {
            let max_age = match max_age_days {
                Some(days) => Duration::from_secs(days.saturating_mul(24 * 60 * 60)),
                None => config.maintenance.max_edge_age(),
            };
            prune_stale_edges(&graph, max_age).await?;
        }
    }
    Ok(())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn report(summary: &UpdateSummary) {
    log::info!(
        "Cliques applied: {}, skipped (too large): {}, sender edges: {}, failures: {}",
        summary.cliques_applied,
        summary.cliques_skipped,
        summary.sender_edges,
        summary.failures
    );
    if summary.failures > 0 {
        log::warn!("{} affinity updates failed; see errors above", summary.failures);
    }
}
