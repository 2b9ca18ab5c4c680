//! Request construction: immutable query, filter and facet trees plus the
//! top-level [`SearchRequest`].

pub mod facet;
pub mod filter;
pub mod query;

pub use facet::{
    DateInterval, FacetKind, FacetResult, FacetSpec, RangeBucketSpec, StatisticalResult,
};
pub use filter::{FilterSpec, GeoPoint};
pub use query::{NoMatchQuery, QuerySpec, ScoreFunction};

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// One blocking search round trip: target indices (empty = all), optional
/// type restriction, query, optional non-scoring filter, facets, result
/// window and highlight fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub indices: Vec<String>,
    pub doc_types: Vec<String>,
    pub query: QuerySpec,
    pub filter: Option<FilterSpec>,
    pub facets: Vec<FacetSpec>,
    pub from: usize,
    pub size: usize,
    pub highlight: Vec<String>,
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl SearchRequest {
    pub fn new(query: QuerySpec) -> Self {
        SearchRequest {
            indices: Vec::new(),
            doc_types: Vec::new(),
            query,
            filter: None,
            facets: Vec::new(),
            from: 0,
            size: DEFAULT_PAGE_SIZE,
            highlight: Vec::new(),
            timeout: None,
        }
    }

    pub fn index(mut self, index: &str) -> Self {
        self.indices.push(index.to_string());
        self
    }

    pub fn indices(mut self, indices: &[&str]) -> Self {
        self.indices
            .extend(indices.iter().map(|i| i.to_string()));
        self
    }

    pub fn doc_type(mut self, doc_type: &str) -> Self {
        self.doc_types.push(doc_type.to_string());
        self
    }

    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn facet(mut self, facet: FacetSpec) -> Self {
        self.facets.push(facet);
        self
    }

    pub fn from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn highlight(mut self, field: &str) -> Self {
        self.highlight.push(field.to_string());
        self
    }

    /// Best-effort deadline: checked between per-index passes and after
    /// execution, never interrupting a pass already underway. Exceeding it
    /// yields `ClusterUnavailable`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
