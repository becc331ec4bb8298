//! Edge types, the type registry and edge update commands.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{AffinityError, Result};

/// Reserved name of the synthetic relation summing every typed relation.
pub const COMBINED_EDGE_NAME: &str = "combined";

// Heavier edge types dominate combined-affinity ranking.
const TO_EDGE_WEIGHT: u32 = 3;
const CC_EDGE_WEIGHT: u32 = 2;
const BCC_EDGE_WEIGHT: u32 = 1;

/// A named, weighted relation class. Names are case-insensitive and stored
/// lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeType {
    name: String,
    weight: u32,
}

impl EdgeType {
    pub fn new(name: &str, weight: u32) -> Result<Self> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(AffinityError::InvalidArgument("edge type name cannot be empty".to_string()));
        }
        if name == COMBINED_EDGE_NAME || name == "all" {
            return Err(AffinityError::InvalidArgument(format!("'{}' is a reserved edge type name", name)));
        }
        if weight == 0 {
            return Err(AffinityError::InvalidArgument(format!("edge type '{}' must have a weight of at least 1", name)));
        }
        Ok(Self { name, weight })
    }

    pub fn to() -> Self {
        Self { name: "to".to_string(), weight: TO_EDGE_WEIGHT }
    }

    pub fn cc() -> Self {
        Self { name: "cc".to_string(), weight: CC_EDGE_WEIGHT }
    }

    pub fn bcc() -> Self {
        Self { name: "bcc".to_string(), weight: BCC_EDGE_WEIGHT }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }
}

/// Which relation a query reads: one typed relation or the combined one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeSelector {
    Typed(EdgeType),
    Combined,
}

impl EdgeSelector {
    /// Name of the accumulator the selector reads
    pub fn field_name(&self) -> &str {
        match self {
            EdgeSelector::Typed(edge_type) => edge_type.name(),
            EdgeSelector::Combined => COMBINED_EDGE_NAME,
        }
    }
}

impl From<EdgeType> for EdgeSelector {
    fn from(edge_type: EdgeType) -> Self {
        EdgeSelector::Typed(edge_type)
    }
}

/// Known edge types, looked up by name.
#[derive(Debug)]
pub struct EdgeTypeRegistry {
    types: RwLock<HashMap<String, EdgeType>>,
}

impl Default for EdgeTypeRegistry {
    fn default() -> Self {
        let types = [EdgeType::to(), EdgeType::cc(), EdgeType::bcc()]
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();
        Self { types: RwLock::new(types) }
    }
}

impl EdgeTypeRegistry {
    /// Registry holding the built-in `to`, `cc` and `bcc` types
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a known edge type
    pub fn register(&self, edge_type: EdgeType) -> Result<()> {
        let mut types = self
            .types
            .write()
            .map_err(|_| AffinityError::Backend("edge type registry lock poisoned".to_string()))?;
        log::info!("registering contact affinity edge type '{}' (weight {})", edge_type.name, edge_type.weight);
        types.insert(edge_type.name.clone(), edge_type);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<EdgeType> {
        let types = self.types.read().ok()?;
        types.get(&name.trim().to_lowercase()).cloned()
    }

    /// Map a request's type string to a selector; missing or `all` means combined.
    pub fn resolve(&self, name: Option<&str>) -> Result<EdgeSelector> {
        match name.map(str::trim) {
            None => Ok(EdgeSelector::Combined),
            Some(n) if n.eq_ignore_ascii_case("all") || n.eq_ignore_ascii_case(COMBINED_EDGE_NAME) => {
                Ok(EdgeSelector::Combined)
            }
            Some(n) => self
                .get(n)
                .map(EdgeSelector::Typed)
                .ok_or_else(|| AffinityError::InvalidArgument(format!("{} is not a known contact affinity type", n))),
        }
    }
}

/// One observation to apply to an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeUpdate {
    pub edge_type: EdgeType,
    /// Milliseconds since the epoch
    pub timestamp: i64,
    pub multiplier: u32,
    /// Only write `from -> to`, not the mirror edge
    pub directed: bool,
}

impl EdgeUpdate {
    pub fn new(edge_type: EdgeType, timestamp: i64) -> Self {
        Self {
            edge_type,
            timestamp,
            multiplier: 1,
            directed: false,
        }
    }

    pub fn directed(edge_type: EdgeType, timestamp: i64) -> Self {
        Self {
            directed: true,
            ..Self::new(edge_type, timestamp)
        }
    }

    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Amount added to both the typed and the combined weight.
    pub fn increment(&self) -> Result<u64> {
        if self.multiplier < 1 {
            return Err(AffinityError::InvalidArgument("edge weight multiplier cannot be < 1".to_string()));
        }
        Ok(u64::from(self.multiplier) * u64::from(self.edge_type.weight))
    }
}
