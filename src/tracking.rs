//! Turns observed mail into affinity edge updates.
//!
//! Sent mail strengthens every pair inside each recipient list. Received mail
//! does the same for To and Cc (minus the receiving account itself) and adds
//! directed sender-to-recipient edges. Tracking is best-effort: failures are
//! logged and counted, never returned.

use std::collections::HashSet;

use crate::error::Result;
use crate::graph::{ContactGraph, ContactNode, EdgeType, EdgeUpdate};

/// Default upper bound on recipients per clique update
pub const DEFAULT_MAX_CLIQUE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecipientType {
    To,
    Cc,
    Bcc,
}

impl RecipientType {
    pub fn edge_type(self) -> EdgeType {
        match self {
            RecipientType::To => EdgeType::to(),
            RecipientType::Cc => EdgeType::cc(),
            RecipientType::Bcc => EdgeType::bcc(),
        }
    }
}

/// Plain addresses extracted from one message.
#[derive(Debug, Clone, Default)]
pub struct MessageAddresses {
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
}

impl MessageAddresses {
    pub fn recipients(&self, recipient_type: RecipientType) -> &[String] {
        match recipient_type {
            RecipientType::To => &self.to,
            RecipientType::Cc => &self.cc,
            RecipientType::Bcc => &self.bcc,
        }
    }
}

/// Answers whether an address belongs to an account or one of its send-as
/// identities.
pub trait AccountIdentity {
    fn owns_address(&self, address: &str) -> Result<bool>;
}

/// An account's primary address plus its send-as aliases, compared
/// case-insensitively.
#[derive(Debug, Clone)]
pub struct SendAsIdentity {
    addresses: HashSet<String>,
}

impl SendAsIdentity {
    pub fn new<I, S>(primary: &str, send_as: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut addresses: HashSet<String> = send_as
            .into_iter()
            .map(|a| a.as_ref().trim().to_lowercase())
            .collect();
        addresses.insert(primary.trim().to_lowercase());
        Self { addresses }
    }
}

impl AccountIdentity for SendAsIdentity {
    fn owns_address(&self, address: &str) -> Result<bool> {
        Ok(self.addresses.contains(&address.trim().to_lowercase()))
    }
}

/// What one message did to the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub cliques_applied: usize,
    /// Recipient lists over the clique size limit
    pub cliques_skipped: usize,
    pub sender_edges: usize,
    pub failures: usize,
}

/// Applies mail events to one account's graph.
#[derive(Debug, Clone)]
pub struct AffinityTracker<G> {
    graph: G,
    max_clique_size: usize,
}

impl<G: ContactGraph> AffinityTracker<G> {
    pub fn new(graph: G) -> Self {
        Self {
            graph,
            max_clique_size: DEFAULT_MAX_CLIQUE_SIZE,
        }
    }

    pub fn with_max_clique_size(mut self, max_clique_size: usize) -> Self {
        self.max_clique_size = max_clique_size;
        self
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// Strengthen every pair within the To, Cc and Bcc lists of a sent message.
    pub async fn update_from_sent(
        &self,
        message: &MessageAddresses,
        timestamp: i64,
        data_source_id: Option<&str>,
    ) -> UpdateSummary {
        let mut summary = UpdateSummary::default();
        for recipient_type in [RecipientType::To, RecipientType::Cc, RecipientType::Bcc] {
            let nodes = to_nodes(message.recipients(recipient_type).iter(), data_source_id);
            let update = EdgeUpdate::new(recipient_type.edge_type(), timestamp);
            self.update_clique(&nodes, &update, &mut summary).await;
        }
        summary
    }

    /// Strengthen To and Cc pairs of a received message, excluding the
    /// receiving account, and link each sender one-way to each recipient.
    pub async fn update_from_received<I>(
        &self,
        message: &MessageAddresses,
        timestamp: i64,
        receiving_account: &I,
        data_source_id: Option<&str>,
    ) -> UpdateSummary
    where
        I: AccountIdentity + Sync + ?Sized,
    {
        let mut summary = UpdateSummary::default();
        let mut lists = Vec::with_capacity(2);
        for recipient_type in [RecipientType::To, RecipientType::Cc] {
            let others = message
                .recipients(recipient_type)
                .iter()
                .filter(|address| !is_me(receiving_account, address));
            lists.push((recipient_type, to_nodes(others, data_source_id)));
        }

        for (recipient_type, nodes) in &lists {
            let update = EdgeUpdate::new(recipient_type.edge_type(), timestamp);
            self.update_clique(nodes, &update, &mut summary).await;
        }

        for sender in message.from.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            let sender = ContactNode::new(sender);
            for (recipient_type, nodes) in &lists {
                let update = EdgeUpdate::directed(recipient_type.edge_type(), timestamp);
                self.update_sender_affinity(&sender, nodes, &update, &mut summary).await;
            }
        }
        summary
    }

    async fn update_clique(
        &self,
        nodes: &[ContactNode],
        update: &EdgeUpdate,
        summary: &mut UpdateSummary,
    ) {
        if nodes.len() < 2 {
            return;
        }
        if nodes.len() > self.max_clique_size {
            log::debug!(
                "not updating '{}' contact affinity for account {}: {} contacts exceeds max clique size {}",
                update.edge_type.name(),
                self.graph.account_id(),
                nodes.len(),
                self.max_clique_size
            );
            summary.cliques_skipped += 1;
            return;
        }
        match self.graph.add_clique(nodes, update).await {
            Ok(()) => summary.cliques_applied += 1,
            Err(e) => {
                log::error!(
                    "unable to update affinity of type '{}' for {} contacts: {}",
                    update.edge_type.name(),
                    nodes.len(),
                    e
                );
                summary.failures += 1;
            }
        }
    }

    async fn update_sender_affinity(
        &self,
        sender: &ContactNode,
        recipients: &[ContactNode],
        update: &EdgeUpdate,
        summary: &mut UpdateSummary,
    ) {
        for recipient in recipients {
            // the sender node carries no datasource tag, so compare emails
            if recipient.email().eq_ignore_ascii_case(sender.email()) {
                continue;
            }
            match self.graph.update_edge(sender, recipient, update).await {
                Ok(()) => summary.sender_edges += 1,
                Err(e) => {
                    log::error!(
                        "unable to update sender contact affinity {} -> {}: {}",
                        sender,
                        recipient,
                        e
                    );
                    summary.failures += 1;
                }
            }
        }
    }
}

fn is_me<I: AccountIdentity + ?Sized>(account: &I, address: &str) -> bool {
    match account.owns_address(address) {
        Ok(owned) => owned,
        Err(e) => {
            log::warn!("unable to check whether {} belongs to the receiving account: {}", address, e);
            false
        }
    }
}

/// Distinct, non-empty addresses as nodes, first occurrence first.
fn to_nodes<'a, A>(addresses: A, data_source_id: Option<&str>) -> Vec<ContactNode>
where
    A: Iterator<Item = &'a String>,
{
    let mut seen = HashSet::new();
    addresses
        .map(|a| a.trim())
        .filter(|a| !a.is_empty() && seen.insert(a.to_lowercase()))
        .map(|a| ContactNode::tagged(a, data_source_id))
        .collect()
}
