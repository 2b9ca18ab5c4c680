//! Search responses and the assertion helpers tests hang off them.

use crate::spec::FacetResult;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One returned document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub index: String,
    pub doc_type: String,
    pub score: f64,
    /// The exact source payload the document was indexed with.
    pub source: serde_json::Value,
    pub highlight: BTreeMap<String, Vec<String>>,
}

impl Hit {
    pub fn source_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.source.clone()).map_err(|e| {
            Error::AssertionMismatch(format!("hit '{}': source does not deserialize: {e}", self.id))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Exact count of all matching documents, regardless of the window.
    pub total_hits: u64,
    /// The requested window, best first.
    pub hits: Vec<Hit>,
    pub facets: BTreeMap<String, FacetResult>,
    pub took_ms: u64,
}

impl SearchResponse {
    /// Fails with [`Error::AssertionMismatch`] unless the total is exact.
    pub fn expect_total_hits(&self, expected: u64) -> Result<&Self> {
        if self.total_hits == expected {
            Ok(self)
        } else {
            Err(Error::AssertionMismatch(format!(
                "expected {expected} total hits, got {}",
                self.total_hits
            )))
        }
    }

    pub fn expect_hit_count(&self, expected: usize) -> Result<&Self> {
        if self.hits.len() == expected {
            Ok(self)
        } else {
            Err(Error::AssertionMismatch(format!(
                "expected {expected} hits in the page, got {}",
                self.hits.len()
            )))
        }
    }

    /// Deserializes every hit in the page into a domain entity.
    pub fn hits_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.hits.iter().map(Hit::source_as).collect()
    }

    pub fn facet(&self, name: &str) -> Result<&FacetResult> {
        self.facets.get(name).ok_or_else(|| {
            Error::AssertionMismatch(format!("no facet named '{name}' in the response"))
        })
    }

    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(total: u64) -> SearchResponse {
        SearchResponse {
            total_hits: total,
            hits: vec![Hit {
                id: "1".into(),
                index: "meal".into(),
                doc_type: "beer".into(),
                score: 1.0,
                source: json!({"brand": "Heineken", "price": 3.5}),
                highlight: BTreeMap::new(),
            }],
            facets: BTreeMap::new(),
            took_ms: 1,
        }
    }

    #[derive(Debug, Deserialize)]
    struct Beer {
        brand: String,
        price: f64,
    }

    #[test]
    fn test_expect_total_hits() {
        let r = response(1);
        assert!(r.expect_total_hits(1).is_ok());
        assert!(matches!(
            r.expect_total_hits(2),
            Err(Error::AssertionMismatch(_))
        ));
    }

    #[test]
    fn test_hits_deserialize_into_entity() {
        let beers: Vec<Beer> = response(1).hits_as().unwrap();
        assert_eq!(beers[0].brand, "Heineken");
        assert_eq!(beers[0].price, 3.5);
    }

    #[test]
    fn test_missing_facet_is_a_mismatch() {
        assert!(matches!(
            response(1).facet("colours"),
            Err(Error::AssertionMismatch(_))
        ));
    }
}
