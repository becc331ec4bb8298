pub mod config;
pub mod error;
pub mod db;
pub mod graph;
pub mod tracking;
pub mod maintenance;

pub use config::Config;
pub use error::{AffinityError, Result};
pub use graph::{AccountGraph, ContactGraph, ContactNode, ContactResult, ContactsParams, EdgeType, EdgeUpdate, GraphRegistry};
pub use tracking::{AccountIdentity, AffinityTracker, MessageAddresses, SendAsIdentity, UpdateSummary};
