//! Immutable filter specification trees.
//!
//! Filters are the non-scoring side of the DSL: structurally parallel to
//! queries, composed with `and`/`or`/`not`/`bool`, plus the geo predicates
//! that only exist in filter form.

use super::query::QuerySpec;
use serde::{Deserialize, Serialize};

/// One corner-or-vertex coordinate, degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint { lat, lon }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterSpec {
    MatchAll,
    Term {
        field: String,
        value: serde_json::Value,
    },
    Terms {
        field: String,
        values: Vec<String>,
    },
    Range {
        field: String,
        from: Option<serde_json::Value>,
        to: Option<serde_json::Value>,
        include_lower: bool,
        include_upper: bool,
    },
    NumericRange {
        field: String,
        from: Option<f64>,
        to: Option<f64>,
        include_lower: bool,
        include_upper: bool,
    },
    Prefix {
        field: String,
        value: String,
    },
    Exists {
        field: String,
    },
    Missing {
        field: String,
    },
    Ids {
        values: Vec<String>,
    },
    /// Restricts to documents of one type label.
    DocType {
        value: String,
    },
    /// Evaluates at most `size` candidate documents, in doc order.
    Limit {
        size: u64,
    },
    Query(Box<QuerySpec>),
    And {
        filters: Vec<FilterSpec>,
        /// Accepted for wire parity; the embedded engine has no filter cache.
        cache: bool,
    },
    Or {
        filters: Vec<FilterSpec>,
    },
    Not(Box<FilterSpec>),
    Bool {
        must: Vec<FilterSpec>,
        should: Vec<FilterSpec>,
        must_not: Vec<FilterSpec>,
    },
    GeoDistance {
        field: String,
        center: GeoPoint,
        /// Human form, e.g. "0.5km" or "200m".
        distance: String,
    },
    GeoDistanceRange {
        field: String,
        center: GeoPoint,
        from: String,
        to: String,
    },
    GeoBoundingBox {
        field: String,
        top_left: GeoPoint,
        bottom_right: GeoPoint,
    },
    GeoPolygon {
        field: String,
        points: Vec<GeoPoint>,
    },
}

impl FilterSpec {
    pub fn match_all() -> Self {
        FilterSpec::MatchAll
    }

    pub fn term(field: &str, value: impl Into<serde_json::Value>) -> Self {
        FilterSpec::Term {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn terms(field: &str, values: &[&str]) -> Self {
        FilterSpec::Terms {
            field: field.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn range(
        field: &str,
        from: Option<impl Into<serde_json::Value>>,
        to: Option<impl Into<serde_json::Value>>,
    ) -> Self {
        FilterSpec::Range {
            field: field.to_string(),
            from: from.map(Into::into),
            to: to.map(Into::into),
            include_lower: true,
            include_upper: true,
        }
    }

    pub fn numeric_range(field: &str, from: Option<f64>, to: Option<f64>) -> Self {
        FilterSpec::NumericRange {
            field: field.to_string(),
            from,
            to,
            include_lower: true,
            include_upper: true,
        }
    }

    pub fn prefix(field: &str, value: &str) -> Self {
        FilterSpec::Prefix {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn exists(field: &str) -> Self {
        FilterSpec::Exists {
            field: field.to_string(),
        }
    }

    pub fn missing(field: &str) -> Self {
        FilterSpec::Missing {
            field: field.to_string(),
        }
    }

    pub fn ids(values: &[&str]) -> Self {
        FilterSpec::Ids {
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn doc_type(value: &str) -> Self {
        FilterSpec::DocType {
            value: value.to_string(),
        }
    }

    pub fn limit(size: u64) -> Self {
        FilterSpec::Limit { size }
    }

    pub fn query(query: QuerySpec) -> Self {
        FilterSpec::Query(Box::new(query))
    }

    pub fn and(filters: Vec<FilterSpec>) -> Self {
        FilterSpec::And {
            filters,
            cache: false,
        }
    }

    pub fn and_cached(filters: Vec<FilterSpec>) -> Self {
        FilterSpec::And {
            filters,
            cache: true,
        }
    }

    pub fn or(filters: Vec<FilterSpec>) -> Self {
        FilterSpec::Or { filters }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: FilterSpec) -> Self {
        FilterSpec::Not(Box::new(filter))
    }

    pub fn bool() -> BoolFilterBuilder {
        BoolFilterBuilder::default()
    }

    pub fn geo_distance(field: &str, center: GeoPoint, distance: &str) -> Self {
        FilterSpec::GeoDistance {
            field: field.to_string(),
            center,
            distance: distance.to_string(),
        }
    }

    pub fn geo_distance_range(field: &str, center: GeoPoint, from: &str, to: &str) -> Self {
        FilterSpec::GeoDistanceRange {
            field: field.to_string(),
            center,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn geo_bounding_box(field: &str, top_left: GeoPoint, bottom_right: GeoPoint) -> Self {
        FilterSpec::GeoBoundingBox {
            field: field.to_string(),
            top_left,
            bottom_right,
        }
    }

    pub fn geo_polygon(field: &str, points: Vec<GeoPoint>) -> Self {
        FilterSpec::GeoPolygon {
            field: field.to_string(),
            points,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoolFilterBuilder {
    must: Vec<FilterSpec>,
    should: Vec<FilterSpec>,
    must_not: Vec<FilterSpec>,
}

impl BoolFilterBuilder {
    pub fn must(mut self, filter: FilterSpec) -> Self {
        self.must.push(filter);
        self
    }

    pub fn should(mut self, filter: FilterSpec) -> Self {
        self.should.push(filter);
        self
    }

    pub fn must_not(mut self, filter: FilterSpec) -> Self {
        self.must_not.push(filter);
        self
    }

    pub fn build(self) -> FilterSpec {
        FilterSpec::Bool {
            must: self.must,
            should: self.should,
            must_not: self.must_not,
        }
    }
}

impl From<BoolFilterBuilder> for FilterSpec {
    fn from(builder: BoolFilterBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_defaults_to_uncached() {
        match FilterSpec::and(vec![FilterSpec::term("brand", "heineken")]) {
            FilterSpec::And { cache, .. } => assert!(!cache),
            other => panic!("expected And, got {other:?}"),
        }
        match FilterSpec::and_cached(vec![FilterSpec::match_all()]) {
            FilterSpec::And { cache, .. } => assert!(cache),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_geo_distance_shape() {
        let filter = FilterSpec::geo_distance("location", GeoPoint::new(5.0, 5.0), "0.5km");
        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["geo_distance"]["distance"], "0.5km");
        assert_eq!(json["geo_distance"]["center"]["lat"], 5.0);
    }

    #[test]
    fn test_filters_nest() {
        let filter = FilterSpec::not(FilterSpec::or(vec![
            FilterSpec::term("colour", "dark"),
            FilterSpec::prefix("brand", "hein"),
        ]));
        assert!(matches!(filter, FilterSpec::Not(_)));
    }
}
