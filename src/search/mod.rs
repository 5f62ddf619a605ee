//! Query-time pipeline: route, retrieve, filter, merge.
//!
//! A query is embedded once, routed to the clusters whose centroids are
//! closest, and every selected cluster is searched independently. Each
//! cluster over-fetches so the hard-criteria filter still leaves enough
//! candidates, and the merger produces a single ranking across clusters.

mod criteria;
mod engine;
mod filter;
mod merger;
mod retriever;
mod router;

pub use criteria::HardCriteria;
pub use engine::{SearchEngine, SearchResult};
pub use filter::{CATEGORIES, Category, Check, Policy, filter_candidates, passes};
pub use merger::merge;
pub use retriever::{Candidate, fetch_count, retrieve};
pub use router::{RoutedCluster, route};
