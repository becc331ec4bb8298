//! Related-contacts query parameters and result ranking.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::edge::{EdgeSelector, EdgeType};
use super::node::{display_name, ContactNode};
use crate::error::{AffinityError, Result};

/// Parameters for a "which contacts are most related to these" query.
#[derive(Debug, Clone)]
pub struct ContactsParams {
    contacts: Vec<String>,
    data_source_id: Option<String>,
    edge: EdgeSelector,
    lower_bound: u64,
    update_cutoff: Option<i64>,
    num_results: usize,
}

impl ContactsParams {
    pub fn new<I, S>(contacts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            contacts: contacts.into_iter().map(Into::into).collect(),
            data_source_id: None,
            edge: EdgeSelector::Combined,
            lower_bound: 1,
            update_cutoff: None,
            num_results: 0,
        }
    }

    /// Scope the seed contacts to a datasource
    pub fn with_data_source(mut self, data_source_id: impl Into<String>) -> Self {
        self.data_source_id = Some(data_source_id.into());
        self
    }

    pub fn with_edge_type(mut self, edge_type: EdgeType) -> Self {
        self.edge = EdgeSelector::Typed(edge_type);
        self
    }

    pub fn with_selector(mut self, edge: EdgeSelector) -> Self {
        self.edge = edge;
        self
    }

    /// Rank by the combined relation
    pub fn all_edges(mut self) -> Self {
        self.edge = EdgeSelector::Combined;
        self
    }

    pub fn with_lower_bound(mut self, lower_bound: u64) -> Self {
        self.lower_bound = lower_bound;
        self
    }

    /// Ignore edges whose selected relation was last updated before `cutoff`
    pub fn with_update_cutoff(mut self, cutoff: i64) -> Self {
        self.update_cutoff = Some(cutoff);
        self
    }

    /// 0 returns every match
    pub fn with_num_results(mut self, num_results: usize) -> Self {
        self.num_results = num_results;
        self
    }

    pub fn edge(&self) -> &EdgeSelector {
        &self.edge
    }

    pub fn lower_bound(&self) -> u64 {
        self.lower_bound
    }

    pub fn update_cutoff(&self) -> Option<i64> {
        self.update_cutoff
    }

    pub fn num_results(&self) -> usize {
        self.num_results
    }

    /// Distinct seed nodes, in input order. Fails on an empty seed set.
    pub fn seed_nodes(&self) -> Result<Vec<ContactNode>> {
        let mut seen = HashSet::new();
        let nodes: Vec<ContactNode> = self
            .contacts
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| ContactNode::tagged(c, self.data_source_id.as_deref()))
            .filter(|n| seen.insert(n.clone()))
            .collect();
        if nodes.is_empty() {
            return Err(AffinityError::InvalidArgument(
                "at least one seed contact is required".to_string(),
            ));
        }
        Ok(nodes)
    }
}

/// A ranked related contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactResult {
    pub name: String,
    pub weight: u64,
}

impl ContactResult {
    /// Build a result from a stored node name, dropping any datasource prefix.
    pub fn from_storage(storage_name: &str, weight: u64) -> Self {
        Self {
            name: display_name(storage_name).to_string(),
            weight,
        }
    }
}

/// Order summed weights descending, storage name ascending on ties, and keep
/// the top `num_results` (all when 0).
pub(crate) fn rank_candidates(totals: HashMap<String, u64>, num_results: usize) -> Vec<ContactResult> {
    let mut ranked: Vec<(String, u64)> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if num_results > 0 {
        ranked.truncate(num_results);
    }
    ranked
        .iter()
        .map(|(name, weight)| ContactResult::from_storage(name, *weight))
        .collect()
}
