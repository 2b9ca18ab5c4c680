//! Facet specifications and their typed results.
//!
//! Facets are evaluated over the full set of query matches, independent of
//! the hit page: asking for `size: 0` still yields complete facet counts.

use super::filter::{FilterSpec, GeoPoint};
use super::query::QuerySpec;
use serde::{Deserialize, Serialize};

/// Calendar bucket width for a date histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateInterval {
    Year,
    Month,
    Day,
}

/// One requested bucket of a range facet; either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeBucketSpec {
    pub from: Option<f64>,
    pub to: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetKind {
    Terms {
        field: String,
        size: u32,
    },
    Range {
        field: String,
        ranges: Vec<RangeBucketSpec>,
    },
    Histogram {
        field: String,
        interval: f64,
    },
    DateHistogram {
        field: String,
        interval: DateInterval,
    },
    Statistical {
        field: String,
    },
    TermsStats {
        key_field: String,
        value_field: String,
    },
    /// Distance rings about `center`; ring bounds and the per-ring distance
    /// statistics are expressed in `unit` ("km", "m" or "mi").
    GeoDistance {
        field: String,
        center: GeoPoint,
        unit: String,
        ranges: Vec<RangeBucketSpec>,
    },
    Filter(FilterSpec),
    Query(QuerySpec),
}

/// A named facet request. An attached `facet_filter` narrows this facet's
/// base set without touching the hits or the other facets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetSpec {
    pub name: String,
    pub kind: FacetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facet_filter: Option<FilterSpec>,
}

impl FacetSpec {
    fn new(name: &str, kind: FacetKind) -> Self {
        FacetSpec {
            name: name.to_string(),
            kind,
            facet_filter: None,
        }
    }

    pub fn terms(name: &str, field: &str, size: u32) -> Self {
        FacetSpec::new(
            name,
            FacetKind::Terms {
                field: field.to_string(),
                size,
            },
        )
    }

    pub fn range(name: &str, field: &str, ranges: Vec<RangeBucketSpec>) -> Self {
        FacetSpec::new(
            name,
            FacetKind::Range {
                field: field.to_string(),
                ranges,
            },
        )
    }

    pub fn histogram(name: &str, field: &str, interval: f64) -> Self {
        FacetSpec::new(
            name,
            FacetKind::Histogram {
                field: field.to_string(),
                interval,
            },
        )
    }

    pub fn date_histogram(name: &str, field: &str, interval: DateInterval) -> Self {
        FacetSpec::new(
            name,
            FacetKind::DateHistogram {
                field: field.to_string(),
                interval,
            },
        )
    }

    pub fn statistical(name: &str, field: &str) -> Self {
        FacetSpec::new(
            name,
            FacetKind::Statistical {
                field: field.to_string(),
            },
        )
    }

    pub fn terms_stats(name: &str, key_field: &str, value_field: &str) -> Self {
        FacetSpec::new(
            name,
            FacetKind::TermsStats {
                key_field: key_field.to_string(),
                value_field: value_field.to_string(),
            },
        )
    }

    pub fn geo_distance(
        name: &str,
        field: &str,
        center: GeoPoint,
        unit: &str,
        ranges: Vec<RangeBucketSpec>,
    ) -> Self {
        FacetSpec::new(
            name,
            FacetKind::GeoDistance {
                field: field.to_string(),
                center,
                unit: unit.to_string(),
                ranges,
            },
        )
    }

    pub fn filter(name: &str, filter: FilterSpec) -> Self {
        FacetSpec::new(name, FacetKind::Filter(filter))
    }

    pub fn query(name: &str, query: QuerySpec) -> Self {
        FacetSpec::new(name, FacetKind::Query(query))
    }

    /// Scopes this facet to documents matching `filter` as well.
    pub fn facet_filter(mut self, filter: FilterSpec) -> Self {
        self.facet_filter = Some(filter);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermsEntry {
    pub term: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeEntry {
    pub from: Option<f64>,
    pub to: Option<f64>,
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramEntry {
    /// Lower bound of the bucket (`key * interval`).
    pub key: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateHistogramEntry {
    /// Bucket start as epoch milliseconds UTC.
    pub time: i64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalResult {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub total: f64,
    pub sum_of_squares: f64,
    pub mean: Option<f64>,
    pub variance: Option<f64>,
    pub std_deviation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermsStatsEntry {
    pub term: String,
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub total: f64,
    pub mean: Option<f64>,
}

/// The evaluated form of one facet, keyed by the request name in the
/// response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetResult {
    Terms(Vec<TermsEntry>),
    Range(Vec<RangeEntry>),
    Histogram(Vec<HistogramEntry>),
    DateHistogram(Vec<DateHistogramEntry>),
    Statistical(StatisticalResult),
    /// Matching-document count of a filter or query facet.
    Count(u64),
    TermsStats(Vec<TermsStatsEntry>),
}

impl FacetResult {
    pub fn as_terms(&self) -> Option<&[TermsEntry]> {
        match self {
            FacetResult::Terms(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_range(&self) -> Option<&[RangeEntry]> {
        match self {
            FacetResult::Range(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&[HistogramEntry]> {
        match self {
            FacetResult::Histogram(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_date_histogram(&self) -> Option<&[DateHistogramEntry]> {
        match self {
            FacetResult::DateHistogram(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_statistical(&self) -> Option<&StatisticalResult> {
        match self {
            FacetResult::Statistical(stats) => Some(stats),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            FacetResult::Count(count) => Some(*count),
            _ => None,
        }
    }

    pub fn as_terms_stats(&self) -> Option<&[TermsStatsEntry]> {
        match self {
            FacetResult::TermsStats(entries) => Some(entries),
            _ => None,
        }
    }
}
