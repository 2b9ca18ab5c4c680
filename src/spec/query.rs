//! Immutable query specification trees.
//!
//! A [`QuerySpec`] is pure data: constructing one performs no I/O and no
//! validation against any index. Field/type mismatches only surface when the
//! spec is executed. Combinators take child specs by value, so arbitrary
//! nesting composes naturally.

use super::filter::FilterSpec;
use serde::{Deserialize, Serialize};

/// Fallback behavior of an `indices` query on indices outside its list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoMatchQuery {
    /// Match every document (the default).
    All,
    /// Match nothing.
    None,
    Query(Box<QuerySpec>),
}

/// Structured replacement for a script-based custom score: the natural score
/// is multiplied by `doc[field] * factor` per document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreFunction {
    pub field: String,
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySpec {
    MatchAll,
    Term {
        field: String,
        value: serde_json::Value,
    },
    Terms {
        field: String,
        values: Vec<String>,
        minimum_match: Option<u32>,
    },
    Match {
        field: String,
        text: String,
    },
    MatchPhrase {
        field: String,
        text: String,
        slop: u32,
    },
    MultiMatch {
        fields: Vec<String>,
        text: String,
    },
    QueryString {
        query: String,
    },
    Fuzzy {
        field: String,
        value: String,
    },
    Prefix {
        field: String,
        value: String,
    },
    Wildcard {
        field: String,
        pattern: String,
    },
    Range {
        field: String,
        from: Option<serde_json::Value>,
        to: Option<serde_json::Value>,
        include_lower: bool,
        include_upper: bool,
    },
    Ids {
        values: Vec<String>,
    },
    Bool {
        must: Vec<QuerySpec>,
        should: Vec<QuerySpec>,
        must_not: Vec<QuerySpec>,
    },
    Filtered {
        query: Box<QuerySpec>,
        filter: Box<FilterSpec>,
    },
    ConstantScore {
        filter: Box<FilterSpec>,
        boost: f32,
    },
    Boosting {
        positive: Box<QuerySpec>,
        negative: Box<QuerySpec>,
        negative_boost: f32,
    },
    DisMax {
        queries: Vec<QuerySpec>,
        tie_breaker: f32,
    },
    SpanTerm {
        field: String,
        value: String,
    },
    SpanFirst {
        matching: Box<QuerySpec>,
        end: u32,
    },
    SpanNear {
        clauses: Vec<QuerySpec>,
        slop: u32,
        in_order: bool,
    },
    SpanNot {
        include: Box<QuerySpec>,
        exclude: Box<QuerySpec>,
    },
    SpanOr {
        clauses: Vec<QuerySpec>,
    },
    ScriptedScore {
        query: Box<QuerySpec>,
        function: ScoreFunction,
    },
    Indices {
        indices: Vec<String>,
        query: Box<QuerySpec>,
        no_match: NoMatchQuery,
    },
    /// Constructible for parity with the wire DSL; execution rejects it.
    Nested {
        path: String,
        query: Box<QuerySpec>,
    },
    Boost {
        query: Box<QuerySpec>,
        boost: f32,
    },
}

impl QuerySpec {
    pub fn match_all() -> Self {
        QuerySpec::MatchAll
    }

    pub fn term(field: &str, value: impl Into<serde_json::Value>) -> Self {
        QuerySpec::Term {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn terms(field: &str, values: &[&str]) -> Self {
        QuerySpec::Terms {
            field: field.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
            minimum_match: None,
        }
    }

    pub fn terms_minimum_match(field: &str, values: &[&str], minimum_match: u32) -> Self {
        QuerySpec::Terms {
            field: field.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
            minimum_match: Some(minimum_match),
        }
    }

    pub fn match_text(field: &str, text: &str) -> Self {
        QuerySpec::Match {
            field: field.to_string(),
            text: text.to_string(),
        }
    }

    pub fn match_phrase(field: &str, text: &str) -> Self {
        QuerySpec::match_phrase_slop(field, text, 0)
    }

    pub fn match_phrase_slop(field: &str, text: &str, slop: u32) -> Self {
        QuerySpec::MatchPhrase {
            field: field.to_string(),
            text: text.to_string(),
            slop,
        }
    }

    pub fn multi_match(text: &str, fields: &[&str]) -> Self {
        QuerySpec::MultiMatch {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            text: text.to_string(),
        }
    }

    pub fn query_string(query: &str) -> Self {
        QuerySpec::QueryString {
            query: query.to_string(),
        }
    }

    pub fn fuzzy(field: &str, value: &str) -> Self {
        QuerySpec::Fuzzy {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn prefix(field: &str, value: &str) -> Self {
        QuerySpec::Prefix {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn wildcard(field: &str, pattern: &str) -> Self {
        QuerySpec::Wildcard {
            field: field.to_string(),
            pattern: pattern.to_string(),
        }
    }

    /// Inclusive range on both given bounds.
    pub fn range(
        field: &str,
        from: Option<impl Into<serde_json::Value>>,
        to: Option<impl Into<serde_json::Value>>,
    ) -> Self {
        QuerySpec::Range {
            field: field.to_string(),
            from: from.map(Into::into),
            to: to.map(Into::into),
            include_lower: true,
            include_upper: true,
        }
    }

    pub fn ids(values: &[&str]) -> Self {
        QuerySpec::Ids {
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn bool() -> BoolQueryBuilder {
        BoolQueryBuilder::default()
    }

    pub fn filtered(query: QuerySpec, filter: FilterSpec) -> Self {
        QuerySpec::Filtered {
            query: Box::new(query),
            filter: Box::new(filter),
        }
    }

    pub fn constant_score(filter: FilterSpec, boost: f32) -> Self {
        QuerySpec::ConstantScore {
            filter: Box::new(filter),
            boost,
        }
    }

    pub fn boosting(positive: QuerySpec, negative: QuerySpec, negative_boost: f32) -> Self {
        QuerySpec::Boosting {
            positive: Box::new(positive),
            negative: Box::new(negative),
            negative_boost,
        }
    }

    pub fn dis_max(queries: Vec<QuerySpec>, tie_breaker: f32) -> Self {
        QuerySpec::DisMax {
            queries,
            tie_breaker,
        }
    }

    pub fn span_term(field: &str, value: &str) -> Self {
        QuerySpec::SpanTerm {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn span_first(matching: QuerySpec, end: u32) -> Self {
        QuerySpec::SpanFirst {
            matching: Box::new(matching),
            end,
        }
    }

    pub fn span_near(clauses: Vec<QuerySpec>, slop: u32, in_order: bool) -> Self {
        QuerySpec::SpanNear {
            clauses,
            slop,
            in_order,
        }
    }

    pub fn span_not(include: QuerySpec, exclude: QuerySpec) -> Self {
        QuerySpec::SpanNot {
            include: Box::new(include),
            exclude: Box::new(exclude),
        }
    }

    pub fn span_or(clauses: Vec<QuerySpec>) -> Self {
        QuerySpec::SpanOr { clauses }
    }

    pub fn scripted_score(query: QuerySpec, function: ScoreFunction) -> Self {
        QuerySpec::ScriptedScore {
            query: Box::new(query),
            function,
        }
    }

    pub fn indices(indices: &[&str], query: QuerySpec, no_match: NoMatchQuery) -> Self {
        QuerySpec::Indices {
            indices: indices.iter().map(|i| i.to_string()).collect(),
            query: Box::new(query),
            no_match,
        }
    }

    pub fn nested(path: &str, query: QuerySpec) -> Self {
        QuerySpec::Nested {
            path: path.to_string(),
            query: Box::new(query),
        }
    }

    /// Wraps the query with a score multiplier.
    pub fn boost(self, boost: f32) -> Self {
        QuerySpec::Boost {
            query: Box::new(self),
            boost,
        }
    }
}

/// Accumulates clauses for a boolean query; `build` (or `From`) yields the
/// immutable spec.
#[derive(Debug, Clone, Default)]
pub struct BoolQueryBuilder {
    must: Vec<QuerySpec>,
    should: Vec<QuerySpec>,
    must_not: Vec<QuerySpec>,
}

impl BoolQueryBuilder {
    pub fn must(mut self, query: QuerySpec) -> Self {
        self.must.push(query);
        self
    }

    pub fn should(mut self, query: QuerySpec) -> Self {
        self.should.push(query);
        self
    }

    pub fn must_not(mut self, query: QuerySpec) -> Self {
        self.must_not.push(query);
        self
    }

    pub fn build(self) -> QuerySpec {
        QuerySpec::Bool {
            must: self.must,
            should: self.should,
            must_not: self.must_not,
        }
    }
}

impl From<BoolQueryBuilder> for QuerySpec {
    fn from(builder: BoolQueryBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_builder_collects_clauses() {
        let query = QuerySpec::bool()
            .must(QuerySpec::term("brand", "heineken"))
            .must(QuerySpec::range("price", Some(5.0), Some(10.0)))
            .must_not(QuerySpec::term("colour", "dark"))
            .build();
        match query {
            QuerySpec::Bool {
                must,
                should,
                must_not,
            } => {
                assert_eq!(must.len(), 2);
                assert!(should.is_empty());
                assert_eq!(must_not.len(), 1);
            }
            other => panic!("expected Bool, got {other:?}"),
        }
    }

    #[test]
    fn test_specs_nest_without_limit() {
        let inner = QuerySpec::dis_max(
            vec![
                QuerySpec::term("brand", "heineken").boost(3.0),
                QuerySpec::prefix("brand", "hein"),
            ],
            0.7,
        );
        let outer = QuerySpec::boosting(inner, QuerySpec::term("colour", "dark"), 0.2);
        assert!(matches!(outer, QuerySpec::Boosting { .. }));
    }

    #[test]
    fn test_serde_shape_is_snake_case() {
        let query = QuerySpec::term("brand", "heineken");
        let json = serde_json::to_value(&query).unwrap();
        assert!(json.get("term").is_some());
    }
}
