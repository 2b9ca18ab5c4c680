//! Execution: plan translation, the blocking client, facet evaluation,
//! geo predicates, highlighting and the response surface.

mod client;
pub mod facets;
pub mod geo;
mod highlight;
mod response;
pub mod translate;

pub use client::SearchClient;
pub use response::{Hit, SearchResponse};
pub use translate::{ExecPlan, PostPredicate, RescoreOp};
