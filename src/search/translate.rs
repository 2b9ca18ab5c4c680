//! Translation of query and filter specifications into an executable plan:
//! a tantivy query tree, conjunctive post-predicates that tantivy cannot
//! express (geo, limit), and client-side rescoring operations.

use crate::node::OpenIndex;
use crate::schema::{FieldKind, GEO_LAT_SUFFIX, GEO_LON_SUFFIX, ID_FIELD, TYPE_FIELD};
use crate::search::geo::{self, Distance};
use crate::spec::{FilterSpec, GeoPoint, NoMatchQuery, QuerySpec};
use crate::{Error, Result};
use std::ops::Bound;
use tantivy::query::{
    AllQuery, BooleanQuery, BoostQuery, ConstScoreQuery, DisjunctionMaxQuery, EmptyQuery,
    ExistsQuery, FuzzyTermQuery, Occur, PhraseQuery, Query, QueryParser, RangeQuery, RegexQuery,
    TermQuery, TermSetQuery,
};
use tantivy::schema::IndexRecordOption;
use tantivy::{DocAddress, Searcher, Term};

/// A predicate evaluated per candidate document after tantivy matching,
/// over fast columns. Only valid in conjunctive position.
#[derive(Debug, Clone)]
pub enum PostPredicate {
    GeoDistance {
        field: String,
        center: GeoPoint,
        min_km: Option<f64>,
        max_km: Option<f64>,
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
    /// Keep only the first `size` documents in global doc order.
    Limit { size: u64 },
}

impl PostPredicate {
    pub fn matches(
        &self,
        searcher: &Searcher,
        doc: DocAddress,
        global_ord: u64,
    ) -> Result<bool> {
        match self {
            PostPredicate::Limit { size } => Ok(global_ord < *size),
            PostPredicate::GeoDistance {
                field,
                center,
                min_km,
                max_km,
            } => {
                let Some(point) = read_point(searcher, doc, field)? else {
                    return Ok(false);
                };
                let d = geo::haversine_km(*center, point);
                Ok(min_km.map_or(true, |min| d >= min) && max_km.map_or(true, |max| d <= max))
            }
            PostPredicate::GeoBoundingBox {
                field,
                top_left,
                bottom_right,
            } => {
                let Some(point) = read_point(searcher, doc, field)? else {
                    return Ok(false);
                };
                Ok(geo::in_bounding_box(point, *top_left, *bottom_right))
            }
            PostPredicate::GeoPolygon { field, points } => {
                let Some(point) = read_point(searcher, doc, field)? else {
                    return Ok(false);
                };
                Ok(geo::in_polygon(point, points))
            }
        }
    }
}

fn read_point(searcher: &Searcher, doc: DocAddress, field: &str) -> Result<Option<GeoPoint>> {
    let reader = searcher.segment_reader(doc.segment_ord);
    let lat = reader
        .fast_fields()
        .f64(&format!("{field}{GEO_LAT_SUFFIX}"))?
        .first(doc.doc_id);
    let lon = reader
        .fast_fields()
        .f64(&format!("{field}{GEO_LON_SUFFIX}"))?
        .first(doc.doc_id);
    Ok(match (lat, lon) {
        (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
        _ => None,
    })
}

/// A client-side score adjustment applied after the main pass.
#[derive(Debug)]
pub enum RescoreOp {
    /// Multiply the score of documents matching `negative` by `factor`.
    NegativeBoost {
        negative: Box<dyn Query>,
        factor: f32,
    },
    /// Multiply every score by `doc[field] * factor`.
    FieldFactor { field: String, factor: f64 },
}

/// The executable form of one request against one index. The scoring query
/// and the filter are kept apart: facets are computed over query matches
/// only, the filter narrows hits without scoring.
#[derive(Debug)]
pub struct ExecPlan {
    pub query: Box<dyn Query>,
    pub query_post: Vec<PostPredicate>,
    pub filter: Option<Box<dyn Query>>,
    pub filter_post: Vec<PostPredicate>,
    pub rescore: Vec<RescoreOp>,
}

pub fn plan(
    open: &OpenIndex,
    index_name: &str,
    query: &QuerySpec,
    filter: Option<&FilterSpec>,
) -> Result<ExecPlan> {
    // Score-shaping wrappers at the root become rescore passes over the
    // inner query's matches.
    let mut rescore = Vec::new();
    let mut current = query;
    loop {
        match current {
            QuerySpec::ScriptedScore { query, function } => {
                rescore.push(RescoreOp::FieldFactor {
                    field: function.field.clone(),
                    factor: function.factor,
                });
                current = query;
            }
            QuerySpec::Boosting {
                positive,
                negative,
                negative_boost,
            } => {
                let mut dropped = Vec::new();
                let negative = translate_query(open, index_name, negative, &mut dropped)?;
                require_no_post(dropped, "boosting negative clause")?;
                rescore.push(RescoreOp::NegativeBoost {
                    negative,
                    factor: *negative_boost,
                });
                current = positive;
            }
            _ => break,
        }
    }

    let mut query_post = Vec::new();
    let query = translate_query(open, index_name, current, &mut query_post)?;

    let mut filter_post = Vec::new();
    let filter = match filter {
        Some(spec) => {
            let q = translate_filter(open, index_name, spec, &mut filter_post, true)?;
            Some(Box::new(ConstScoreQuery::new(q, 0.0)) as Box<dyn Query>)
        }
        None => None,
    };

    Ok(ExecPlan {
        query,
        query_post,
        filter,
        filter_post,
        rescore,
    })
}

pub fn translate_query(
    open: &OpenIndex,
    index_name: &str,
    spec: &QuerySpec,
    post: &mut Vec<PostPredicate>,
) -> Result<Box<dyn Query>> {
    match spec {
        QuerySpec::MatchAll => Ok(Box::new(AllQuery)),

        QuerySpec::Term { field, value } => {
            let term = make_term(open, field, value)?;
            Ok(Box::new(TermQuery::new(term, IndexRecordOption::Basic)))
        }

        QuerySpec::Terms {
            field,
            values,
            minimum_match,
        } => {
            if let Some(m) = minimum_match {
                if *m > 1 {
                    return Err(Error::InvalidSpec(format!(
                        "terms query: minimum_match {m} is not supported, only 1"
                    )));
                }
            }
            let clauses = values
                .iter()
                .map(|v| {
                    let term = make_term(open, field, &serde_json::Value::String(v.clone()))?;
                    Ok((
                        Occur::Should,
                        Box::new(TermQuery::new(term, IndexRecordOption::Basic))
                            as Box<dyn Query>,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Box::new(BooleanQuery::new(clauses)))
        }

        QuerySpec::Match { field, text } => {
            let tokens = analyze(open, field, text)?;
            match tokens.len() {
                0 => Ok(Box::new(EmptyQuery)),
                1 => {
                    let field_ref = named_field(open, field)?;
                    Ok(Box::new(TermQuery::new(
                        Term::from_field_text(field_ref, &tokens[0].1),
                        IndexRecordOption::WithFreqs,
                    )))
                }
                _ => {
                    let field_ref = named_field(open, field)?;
                    let clauses = tokens
                        .iter()
                        .map(|(_, text)| {
                            (
                                Occur::Should,
                                Box::new(TermQuery::new(
                                    Term::from_field_text(field_ref, text),
                                    IndexRecordOption::WithFreqs,
                                )) as Box<dyn Query>,
                            )
                        })
                        .collect();
                    Ok(Box::new(BooleanQuery::new(clauses)))
                }
            }
        }

        QuerySpec::MatchPhrase { field, text, slop } => {
            let tokens = analyze(open, field, text)?;
            let field_ref = named_field(open, field)?;
            match tokens.len() {
                0 => Ok(Box::new(EmptyQuery)),
                1 => Ok(Box::new(TermQuery::new(
                    Term::from_field_text(field_ref, &tokens[0].1),
                    IndexRecordOption::WithFreqs,
                ))),
                _ => {
                    let terms = tokens
                        .iter()
                        .map(|(pos, text)| (*pos, Term::from_field_text(field_ref, text)))
                        .collect();
                    Ok(Box::new(PhraseQuery::new_with_offset_and_slop(
                        terms, *slop,
                    )))
                }
            }
        }

        QuerySpec::MultiMatch { fields, text } => {
            let clauses = fields
                .iter()
                .map(|field| {
                    let q = translate_query(
                        open,
                        index_name,
                        &QuerySpec::match_text(field, text),
                        post,
                    )?;
                    Ok((Occur::Should, q))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Box::new(BooleanQuery::new(clauses)))
        }

        QuerySpec::QueryString { query } => {
            let defaults: Vec<_> = open
                .mapping
                .properties
                .iter()
                .filter(|(_, m)| matches!(m.kind, FieldKind::Text | FieldKind::Keyword))
                .filter_map(|(name, _)| open.field(name))
                .collect();
            let parser = QueryParser::for_index(&open.index, defaults);
            parser
                .parse_query(query)
                .map_err(|e| Error::InvalidSpec(format!("query_string '{query}': {e}")))
        }

        QuerySpec::Fuzzy { field, value } => {
            let term_text = match open.mapping.kind_of(field) {
                Some(FieldKind::Text) => analyze(open, field, value)?
                    .into_iter()
                    .next()
                    .map(|(_, t)| t)
                    .unwrap_or_default(),
                _ => value.clone(),
            };
            let field_ref = named_field(open, field)?;
            Ok(Box::new(FuzzyTermQuery::new(
                Term::from_field_text(field_ref, &term_text),
                2,
                true,
            )))
        }

        QuerySpec::Prefix { field, value } => {
            let value = fold_case(open, field, value);
            let field_ref = named_field(open, field)?;
            let pattern = format!("{}.*", escape_regex(&value));
            Ok(Box::new(
                RegexQuery::from_pattern(&pattern, field_ref)
                    .map_err(|e| Error::InvalidSpec(format!("prefix '{value}': {e}")))?,
            ))
        }

        QuerySpec::Wildcard { field, pattern } => {
            let pattern = fold_case(open, field, pattern);
            let field_ref = named_field(open, field)?;
            let regex = wildcard_to_regex(&pattern);
            Ok(Box::new(
                RegexQuery::from_pattern(&regex, field_ref)
                    .map_err(|e| Error::InvalidSpec(format!("wildcard '{pattern}': {e}")))?,
            ))
        }

        QuerySpec::Range {
            field,
            from,
            to,
            include_lower,
            include_upper,
        } => range_query(open, field, from.as_ref(), to.as_ref(), *include_lower, *include_upper),

        QuerySpec::Ids { values } => {
            let id_field = open.field(ID_FIELD).ok_or_else(|| {
                Error::Execution("index has no id field".to_string())
            })?;
            let terms = values
                .iter()
                .map(|id| Term::from_field_text(id_field, id));
            Ok(Box::new(TermSetQuery::new(terms)))
        }

        QuerySpec::Bool {
            must,
            should,
            must_not,
        } => {
            let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
            for q in must {
                clauses.push((Occur::Must, translate_query(open, index_name, q, post)?));
            }
            for q in should {
                let mut dropped = Vec::new();
                clauses.push((
                    Occur::Should,
                    translate_query(open, index_name, q, &mut dropped)?,
                ));
                require_no_post(dropped, "should clause")?;
            }
            if must.is_empty() && should.is_empty() && !must_not.is_empty() {
                clauses.push((Occur::Must, Box::new(AllQuery)));
            }
            for q in must_not {
                let mut dropped = Vec::new();
                clauses.push((
                    Occur::MustNot,
                    translate_query(open, index_name, q, &mut dropped)?,
                ));
                require_no_post(dropped, "must_not clause")?;
            }
            Ok(Box::new(BooleanQuery::new(clauses)))
        }

        QuerySpec::Filtered { query, filter } => {
            let q = translate_query(open, index_name, query, post)?;
            let f = translate_filter(open, index_name, filter, post, true)?;
            Ok(Box::new(BooleanQuery::new(vec![
                (Occur::Must, q),
                (
                    Occur::Must,
                    Box::new(ConstScoreQuery::new(f, 0.0)) as Box<dyn Query>,
                ),
            ])))
        }

        QuerySpec::ConstantScore { filter, boost } => {
            let f = translate_filter(open, index_name, filter, post, true)?;
            Ok(Box::new(ConstScoreQuery::new(f, *boost)))
        }

        // Nested score shapers keep their hit set; the score adjustment only
        // applies at the root (see `plan`).
        QuerySpec::Boosting { positive, .. } => {
            translate_query(open, index_name, positive, post)
        }
        QuerySpec::ScriptedScore { query, .. } => {
            translate_query(open, index_name, query, post)
        }

        QuerySpec::DisMax {
            queries,
            tie_breaker,
        } => {
            let disjuncts = queries
                .iter()
                .map(|q| {
                    let mut dropped = Vec::new();
                    let q = translate_query(open, index_name, q, &mut dropped)?;
                    require_no_post(dropped, "dis_max clause")?;
                    Ok(q)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Box::new(DisjunctionMaxQuery::with_tie_breaker(
                disjuncts,
                *tie_breaker,
            )))
        }

        QuerySpec::SpanTerm { field, value } => {
            let field_ref = named_field(open, field)?;
            Ok(Box::new(TermQuery::new(
                Term::from_field_text(field_ref, value),
                IndexRecordOption::WithFreqsAndPositions,
            )))
        }

        QuerySpec::SpanFirst { matching, .. } => {
            translate_query(open, index_name, matching, post)
        }

        QuerySpec::SpanNear { clauses, slop, .. } => {
            let mut terms = Vec::new();
            let mut span_field: Option<&str> = None;
            for (offset, clause) in clauses.iter().enumerate() {
                let QuerySpec::SpanTerm { field, value } = clause else {
                    return Err(Error::InvalidSpec(
                        "span_near clauses must be span_term".to_string(),
                    ));
                };
                match span_field {
                    None => span_field = Some(field),
                    Some(prev) if prev == field => {}
                    Some(prev) => {
                        return Err(Error::InvalidSpec(format!(
                            "span_near mixes fields '{prev}' and '{field}'"
                        )))
                    }
                }
                terms.push((offset, Term::from_field_text(named_field(open, field)?, value)));
            }
            match terms.len() {
                0 => Ok(Box::new(EmptyQuery)),
                1 => Ok(Box::new(TermQuery::new(
                    terms.remove(0).1,
                    IndexRecordOption::WithFreqsAndPositions,
                ))),
                _ => Ok(Box::new(PhraseQuery::new_with_offset_and_slop(
                    terms, *slop,
                ))),
            }
        }

        QuerySpec::SpanNot { include, exclude } => {
            let inc = translate_query(open, index_name, include, post)?;
            let mut dropped = Vec::new();
            let exc = translate_query(open, index_name, exclude, &mut dropped)?;
            require_no_post(dropped, "span_not exclude")?;
            Ok(Box::new(BooleanQuery::new(vec![
                (Occur::Must, inc),
                (Occur::MustNot, exc),
            ])))
        }

        QuerySpec::SpanOr { clauses } => {
            let parts = clauses
                .iter()
                .map(|q| {
                    translate_query(open, index_name, q, post).map(|q| (Occur::Should, q))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Box::new(BooleanQuery::new(parts)))
        }

        QuerySpec::Indices {
            indices,
            query,
            no_match,
        } => {
            if indices.iter().any(|i| i == index_name) {
                translate_query(open, index_name, query, post)
            } else {
                match no_match {
                    NoMatchQuery::All => Ok(Box::new(AllQuery)),
                    NoMatchQuery::None => Ok(Box::new(EmptyQuery)),
                    NoMatchQuery::Query(q) => translate_query(open, index_name, q, post),
                }
            }
        }

        QuerySpec::Nested { path, .. } => Err(Error::InvalidSpec(format!(
            "nested query on path '{path}' cannot be executed against a flat index"
        ))),

        QuerySpec::Boost { query, boost } => {
            let inner = translate_query(open, index_name, query, post)?;
            Ok(Box::new(BoostQuery::new(inner, *boost)))
        }
    }
}

pub fn translate_filter(
    open: &OpenIndex,
    index_name: &str,
    spec: &FilterSpec,
    post: &mut Vec<PostPredicate>,
    conjunctive: bool,
) -> Result<Box<dyn Query>> {
    match spec {
        FilterSpec::MatchAll => Ok(Box::new(AllQuery)),

        FilterSpec::Term { field, value } => {
            let term = make_term(open, field, value)?;
            Ok(Box::new(TermQuery::new(term, IndexRecordOption::Basic)))
        }

        FilterSpec::Terms { field, values } => {
            let clauses = values
                .iter()
                .map(|v| {
                    let term = make_term(open, field, &serde_json::Value::String(v.clone()))?;
                    Ok((
                        Occur::Should,
                        Box::new(TermQuery::new(term, IndexRecordOption::Basic))
                            as Box<dyn Query>,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Box::new(BooleanQuery::new(clauses)))
        }

        FilterSpec::Range {
            field,
            from,
            to,
            include_lower,
            include_upper,
        } => range_query(open, field, from.as_ref(), to.as_ref(), *include_lower, *include_upper),

        FilterSpec::NumericRange {
            field,
            from,
            to,
            include_lower,
            include_upper,
        } => {
            let from = from.and_then(|v| serde_json::Number::from_f64(v).map(serde_json::Value::Number));
            let to = to.and_then(|v| serde_json::Number::from_f64(v).map(serde_json::Value::Number));
            range_query(open, field, from.as_ref(), to.as_ref(), *include_lower, *include_upper)
        }

        FilterSpec::Prefix { field, value } => translate_query(
            open,
            index_name,
            &QuerySpec::prefix(field, value),
            post,
        ),

        FilterSpec::Exists { field } => match exists_field(open, field) {
            Some(name) => Ok(Box::new(ExistsQuery::new_exists_query(name))),
            None => Ok(Box::new(EmptyQuery)),
        },

        FilterSpec::Missing { field } => match exists_field(open, field) {
            Some(name) => Ok(Box::new(BooleanQuery::new(vec![
                (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
                (
                    Occur::MustNot,
                    Box::new(ExistsQuery::new_exists_query(name)) as Box<dyn Query>,
                ),
            ]))),
            None => Ok(Box::new(AllQuery)),
        },

        FilterSpec::Ids { values } => translate_query(
            open,
            index_name,
            &QuerySpec::Ids {
                values: values.clone(),
            },
            post,
        ),

        FilterSpec::DocType { value } => {
            let type_field = open.field(TYPE_FIELD).ok_or_else(|| {
                Error::Execution("index has no type field".to_string())
            })?;
            Ok(Box::new(TermQuery::new(
                Term::from_field_text(type_field, value),
                IndexRecordOption::Basic,
            )))
        }

        FilterSpec::Limit { size } => {
            if !conjunctive {
                return Err(Error::InvalidSpec(
                    "limit filter is only supported in conjunctive position".to_string(),
                ));
            }
            post.push(PostPredicate::Limit { size: *size });
            Ok(Box::new(AllQuery))
        }

        FilterSpec::Query(query) => translate_query(open, index_name, query, post),

        FilterSpec::And { filters, cache } => {
            // `cache` is a wire-level hint with no embedded equivalent.
            let _ = cache;
            let clauses = filters
                .iter()
                .map(|f| {
                    translate_filter(open, index_name, f, post, conjunctive)
                        .map(|q| (Occur::Must, q))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Box::new(BooleanQuery::new(clauses)))
        }

        FilterSpec::Or { filters } => {
            let clauses = filters
                .iter()
                .map(|f| {
                    translate_filter(open, index_name, f, post, false)
                        .map(|q| (Occur::Should, q))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Box::new(BooleanQuery::new(clauses)))
        }

        FilterSpec::Not(inner) => {
            let q = translate_filter(open, index_name, inner, post, false)?;
            Ok(Box::new(BooleanQuery::new(vec![
                (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
                (Occur::MustNot, q),
            ])))
        }

        FilterSpec::Bool {
            must,
            should,
            must_not,
        } => {
            let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
            for f in must {
                clauses.push((
                    Occur::Must,
                    translate_filter(open, index_name, f, post, conjunctive)?,
                ));
            }
            for f in should {
                clauses.push((
                    Occur::Should,
                    translate_filter(open, index_name, f, post, false)?,
                ));
            }
            if must.is_empty() && should.is_empty() && !must_not.is_empty() {
                clauses.push((Occur::Must, Box::new(AllQuery)));
            }
            for f in must_not {
                clauses.push((
                    Occur::MustNot,
                    translate_filter(open, index_name, f, post, false)?,
                ));
            }
            Ok(Box::new(BooleanQuery::new(clauses)))
        }

        FilterSpec::GeoDistance {
            field,
            center,
            distance,
        } => {
            require_geo(open, field, conjunctive)?;
            let max = Distance::parse(distance)?;
            post.push(PostPredicate::GeoDistance {
                field: field.clone(),
                center: *center,
                min_km: None,
                max_km: Some(max.kilometers),
            });
            Ok(Box::new(AllQuery))
        }

        FilterSpec::GeoDistanceRange {
            field,
            center,
            from,
            to,
        } => {
            require_geo(open, field, conjunctive)?;
            let min = Distance::parse(from)?;
            let max = Distance::parse(to)?;
            post.push(PostPredicate::GeoDistance {
                field: field.clone(),
                center: *center,
                min_km: Some(min.kilometers),
                max_km: Some(max.kilometers),
            });
            Ok(Box::new(AllQuery))
        }

        FilterSpec::GeoBoundingBox {
            field,
            top_left,
            bottom_right,
        } => {
            require_geo(open, field, conjunctive)?;
            post.push(PostPredicate::GeoBoundingBox {
                field: field.clone(),
                top_left: *top_left,
                bottom_right: *bottom_right,
            });
            Ok(Box::new(AllQuery))
        }

        FilterSpec::GeoPolygon { field, points } => {
            require_geo(open, field, conjunctive)?;
            post.push(PostPredicate::GeoPolygon {
                field: field.clone(),
                points: points.clone(),
            });
            Ok(Box::new(AllQuery))
        }
    }
}

fn require_geo(open: &OpenIndex, field: &str, conjunctive: bool) -> Result<()> {
    if open.mapping.kind_of(field) != Some(FieldKind::GeoPoint) {
        return Err(Error::InvalidSpec(format!(
            "'{field}' is not a geo_point field"
        )));
    }
    if !conjunctive {
        return Err(Error::InvalidSpec(
            "geo filters are only supported in conjunctive position".to_string(),
        ));
    }
    Ok(())
}

fn require_no_post(dropped: Vec<PostPredicate>, context: &str) -> Result<()> {
    if dropped.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidSpec(format!(
            "geo/limit predicates are not supported inside a {context}"
        )))
    }
}

/// The `exists` column name for a field, accounting for geo points which
/// materialize as lat/lon columns. `None` for unmapped fields.
fn exists_field(open: &OpenIndex, field: &str) -> Option<String> {
    match open.mapping.kind_of(field)? {
        FieldKind::GeoPoint => Some(format!("{field}{GEO_LAT_SUFFIX}")),
        _ => Some(field.to_string()),
    }
}

fn named_field(open: &OpenIndex, name: &str) -> Result<tantivy::schema::Field> {
    open.field(name)
        .ok_or_else(|| Error::InvalidSpec(format!("unknown field '{name}'")))
}

fn range_query(
    open: &OpenIndex,
    field: &str,
    from: Option<&serde_json::Value>,
    to: Option<&serde_json::Value>,
    include_lower: bool,
    include_upper: bool,
) -> Result<Box<dyn Query>> {
    if from.is_none() && to.is_none() {
        return Err(Error::InvalidSpec(format!(
            "range on '{field}' has no bounds"
        )));
    }
    let lower = match from {
        Some(v) => {
            let term = make_term(open, field, v)?;
            if include_lower {
                Bound::Included(term)
            } else {
                Bound::Excluded(term)
            }
        }
        None => Bound::Unbounded,
    };
    let upper = match to {
        Some(v) => {
            let term = make_term(open, field, v)?;
            if include_upper {
                Bound::Included(term)
            } else {
                Bound::Excluded(term)
            }
        }
        None => Bound::Unbounded,
    };
    let value_type = match (&lower, &upper) {
        (Bound::Included(t) | Bound::Excluded(t), _)
        | (_, Bound::Included(t) | Bound::Excluded(t)) => t.typ(),
        (Bound::Unbounded, Bound::Unbounded) => unreachable!("checked above"),
    };
    Ok(Box::new(RangeQuery::new_term_bounds(
        field.to_string(),
        value_type,
        &lower,
        &upper,
    )))
}

/// Builds the exact term for a value against its mapped field kind. System
/// fields (`_id`, `_type`) and unmapped text are treated as raw strings.
fn make_term(open: &OpenIndex, field_name: &str, value: &serde_json::Value) -> Result<Term> {
    let field = named_field(open, field_name)?;
    match open.mapping.kind_of(field_name) {
        None | Some(FieldKind::Text) | Some(FieldKind::Keyword) => {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(Term::from_field_text(field, &text))
        }
        Some(FieldKind::F64) => value
            .as_f64()
            .map(|v| Term::from_field_f64(field, v))
            .ok_or_else(|| {
                Error::InvalidSpec(format!("field '{field_name}': expected number"))
            }),
        Some(FieldKind::I64) => value
            .as_i64()
            .map(|v| Term::from_field_i64(field, v))
            .ok_or_else(|| {
                Error::InvalidSpec(format!("field '{field_name}': expected integer"))
            }),
        Some(FieldKind::Bool) => value
            .as_bool()
            .map(|v| Term::from_field_bool(field, v))
            .ok_or_else(|| {
                Error::InvalidSpec(format!("field '{field_name}': expected boolean"))
            }),
        Some(FieldKind::Date) => {
            let text = value.as_str().ok_or_else(|| {
                Error::InvalidSpec(format!("field '{field_name}': expected RFC 3339 string"))
            })?;
            let parsed = chrono::DateTime::parse_from_rfc3339(text)
                .map_err(|e| Error::InvalidSpec(format!("field '{field_name}': {e}")))?;
            Ok(Term::from_field_date(
                field,
                tantivy::DateTime::from_timestamp_millis(parsed.timestamp_millis()),
            ))
        }
        Some(FieldKind::GeoPoint) => Err(Error::InvalidSpec(format!(
            "field '{field_name}': geo_point fields only support geo filters"
        ))),
    }
}

/// Tokenizes `text` with the analyzer of `field`, returning
/// `(position, token)` pairs.
fn analyze(open: &OpenIndex, field: &str, text: &str) -> Result<Vec<(usize, String)>> {
    let field_ref = named_field(open, field)?;
    let mut analyzer = open
        .index
        .tokenizer_for_field(field_ref)
        .map_err(|e| Error::InvalidSpec(format!("field '{field}': {e}")))?;
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while stream.advance() {
        let token = stream.token();
        tokens.push((token.position, token.text.clone()));
    }
    Ok(tokens)
}

/// Lowercases constant query text against analyzed fields so prefix and
/// wildcard patterns line up with indexed tokens.
fn fold_case(open: &OpenIndex, field: &str, text: &str) -> String {
    match open.mapping.kind_of(field) {
        Some(FieldKind::Text) => text.to_lowercase(),
        _ => text.to_string(),
    }
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => push_escaped(&mut out, c),
        }
    }
    out
}

fn escape_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        push_escaped(&mut out, c);
    }
    out
}

fn push_escaped(out: &mut String, c: char) {
    if "\\.+*?()|[]{}^$#&-~\"".contains(c) {
        out.push('\\');
    }
    out.push(c);
}
