//! Embersearch: an embedded, Elasticsearch-style document search facade on
//! top of tantivy.
//!
//! The crate has four surfaces:
//! - [`spec`] — immutable query/filter/facet specification trees built from
//!   primitive parameters, composable without I/O.
//! - [`SearchClient`] — a blocking execution client with exact totals,
//!   multi-index merging and order-preserving multi-search.
//! - [`IndexFixture`] — a per-test index lifecycle state machine with
//!   deadline-bounded health waits.
//! - [`SearchResponse`] — typed results with assertion helpers.
//!
//! ```no_run
//! use embersearch::node::{BulkOp, LocalNode};
//! use embersearch::spec::{QuerySpec, SearchRequest};
//! use embersearch::{IndexFixture, SearchClient};
//! use std::sync::Arc;
//!
//! # fn main() -> embersearch::Result<()> {
//! let node = Arc::new(LocalNode::new("/tmp/embersearch"));
//! let mut fixture = IndexFixture::new(Arc::clone(&node), "meal");
//! fixture.provision(
//!     None,
//!     &[BulkOp::Index {
//!         id: "1".into(),
//!         doc_type: "beer".into(),
//!         source: serde_json::json!({"brand": "Heineken", "price": 3.5}),
//!     }],
//! )?;
//!
//! let client = SearchClient::new(node);
//! let response = client.search(
//!     &SearchRequest::new(QuerySpec::term("brand", "heineken")).index("meal"),
//! )?;
//! response.expect_total_hits(1)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fixture;
pub mod node;
pub mod schema;
pub mod search;
pub mod spec;

pub use error::{BulkItemFailure, Error, Result};
pub use fixture::{FixtureState, IndexFixture};
pub use search::{Hit, SearchClient, SearchResponse};
