//! Facet evaluation over the full set of query matches.
//!
//! Bucketing facets (terms, range, histogram, terms_stats) ride on tantivy's
//! native aggregations, built as JSON and read back from the serialized
//! result. Statistical, calendar date-histogram and geo-distance facets fold
//! fast columns over the matching doc set; filter and query facets are plain
//! counts. A per-facet filter narrows that facet's base set only.

use crate::node::OpenIndex;
use crate::schema::{FieldKind, GEO_LAT_SUFFIX, GEO_LON_SUFFIX};
use crate::search::geo;
use crate::search::translate::{self, PostPredicate};
use crate::spec::facet::{
    DateHistogramEntry, DateInterval, FacetKind, FacetResult, FacetSpec, HistogramEntry,
    RangeBucketSpec, RangeEntry, StatisticalResult, TermsEntry, TermsStatsEntry,
};
use crate::spec::GeoPoint;
use crate::{Error, Result};
use chrono::{Datelike, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use tantivy::aggregation::agg_req::Aggregations;
use tantivy::aggregation::AggregationCollector;
use tantivy::collector::{Count, DocSetCollector};
use tantivy::query::{BooleanQuery, Occur, Query};
use tantivy::{DocAddress, Searcher};

const TERMS_STATS_KEY_LIMIT: u32 = 1000;

pub fn execute(
    open: &OpenIndex,
    index_name: &str,
    base: &dyn Query,
    specs: &[FacetSpec],
) -> Result<BTreeMap<String, FacetResult>> {
    let searcher = open.reader.searcher();
    let mut results = BTreeMap::new();
    for spec in specs {
        // A facet filter narrows this facet's base set only.
        let scoped: Box<dyn Query> = match &spec.facet_filter {
            Some(filter) => {
                let mut post = Vec::new();
                let f = translate::translate_filter(open, index_name, filter, &mut post, true)?;
                if !post.is_empty() {
                    return Err(Error::InvalidSpec(
                        "geo/limit predicates are not supported in a facet filter".to_string(),
                    ));
                }
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, base.box_clone()),
                    (Occur::Must, f),
                ]))
            }
            None => base.box_clone(),
        };
        let result = evaluate(open, index_name, &searcher, &*scoped, spec)?;
        results.insert(spec.name.clone(), result);
    }
    Ok(results)
}

fn evaluate(
    open: &OpenIndex,
    index_name: &str,
    searcher: &Searcher,
    base: &dyn Query,
    spec: &FacetSpec,
) -> Result<FacetResult> {
    match &spec.kind {
        FacetKind::Terms { field, size } => {
            let value = native_facet(
                searcher,
                base,
                &spec.name,
                serde_json::json!({"terms": {"field": field, "size": size}}),
            )?;
            parse_terms(&value)
        }
        FacetKind::Range { field, ranges } => {
            let requested: Vec<serde_json::Value> = ranges
                .iter()
                .map(|r| {
                    let mut bucket = serde_json::Map::new();
                    if let Some(from) = r.from {
                        bucket.insert("from".to_string(), from.into());
                    }
                    if let Some(to) = r.to {
                        bucket.insert("to".to_string(), to.into());
                    }
                    serde_json::Value::Object(bucket)
                })
                .collect();
            let value = native_facet(
                searcher,
                base,
                &spec.name,
                serde_json::json!({
                    "range": {"field": field, "ranges": requested},
                    "aggs": {"stats": {"stats": {"field": field}}}
                }),
            )?;
            parse_range(&value, ranges)
        }
        FacetKind::Histogram { field, interval } => {
            let value = native_facet(
                searcher,
                base,
                &spec.name,
                serde_json::json!({"histogram": {"field": field, "interval": interval}}),
            )?;
            parse_histogram(&value)
        }
        FacetKind::TermsStats {
            key_field,
            value_field,
        } => {
            let value = native_facet(
                searcher,
                base,
                &spec.name,
                serde_json::json!({
                    "terms": {"field": key_field, "size": TERMS_STATS_KEY_LIMIT},
                    "aggs": {"stats": {"stats": {"field": value_field}}}
                }),
            )?;
            parse_terms_stats(&value)
        }
        FacetKind::Statistical { field } => {
            let docs = doc_set(searcher, base)?;
            statistical(open, searcher, &docs, field)
        }
        FacetKind::DateHistogram { field, interval } => {
            let docs = doc_set(searcher, base)?;
            date_histogram(searcher, &docs, field, *interval)
        }
        FacetKind::GeoDistance {
            field,
            center,
            unit,
            ranges,
        } => {
            let docs = doc_set(searcher, base)?;
            geo_distance(open, searcher, &docs, field, *center, unit, ranges)
        }
        FacetKind::Filter(filter) => {
            let mut post = Vec::new();
            let q = translate::translate_filter(open, index_name, filter, &mut post, true)?;
            count_facet(searcher, base, q, post)
        }
        FacetKind::Query(query) => {
            let mut post = Vec::new();
            let q = translate::translate_query(open, index_name, query, &mut post)?;
            count_facet(searcher, base, q, post)
        }
    }
}

/// Runs one native aggregation named after the facet and hands back its
/// serialized result node.
fn native_facet(
    searcher: &Searcher,
    base: &dyn Query,
    name: &str,
    request: serde_json::Value,
) -> Result<serde_json::Value> {
    let mut native = serde_json::Map::new();
    native.insert(name.to_string(), request);
    let aggs: Aggregations = serde_json::from_value(serde_json::Value::Object(native))?;
    let collector = AggregationCollector::from_aggs(aggs, Default::default());
    let agg_results = searcher
        .search(base, &collector)
        .map_err(|e| Error::Execution(format!("facet aggregation: {e}")))?;
    let mut value = serde_json::to_value(agg_results)?;
    Ok(value[name].take())
}

fn doc_set(searcher: &Searcher, base: &dyn Query) -> Result<Vec<DocAddress>> {
    Ok(searcher
        .search(base, &DocSetCollector)
        .map_err(|e| Error::Execution(format!("facet doc set: {e}")))?
        .into_iter()
        .collect())
}

fn count_facet(
    searcher: &Searcher,
    base: &dyn Query,
    facet_query: Box<dyn Query>,
    post: Vec<PostPredicate>,
) -> Result<FacetResult> {
    if !post.is_empty() {
        return Err(Error::InvalidSpec(
            "geo/limit predicates are not supported inside facets".to_string(),
        ));
    }
    let combined = BooleanQuery::new(vec![
        (Occur::Must, base.box_clone()),
        (Occur::Must, facet_query),
    ]);
    let count = searcher
        .search(&combined, &Count)
        .map_err(|e| Error::Execution(format!("count facet: {e}")))?;
    Ok(FacetResult::Count(count as u64))
}

fn parse_terms(value: &serde_json::Value) -> Result<FacetResult> {
    let buckets = buckets_of(value)?;
    let entries = buckets
        .iter()
        .map(|bucket| TermsEntry {
            term: key_as_string(&bucket["key"]),
            count: bucket["doc_count"].as_u64().unwrap_or(0),
        })
        .collect();
    Ok(FacetResult::Terms(entries))
}

fn parse_histogram(value: &serde_json::Value) -> Result<FacetResult> {
    let buckets = buckets_of(value)?;
    let entries = buckets
        .iter()
        .filter(|bucket| bucket["doc_count"].as_u64().unwrap_or(0) > 0)
        .map(|bucket| HistogramEntry {
            key: bucket["key"].as_f64().unwrap_or(0.0),
            count: bucket["doc_count"].as_u64().unwrap_or(0),
        })
        .collect();
    Ok(FacetResult::Histogram(entries))
}

fn parse_range(
    value: &serde_json::Value,
    requested: &[RangeBucketSpec],
) -> Result<FacetResult> {
    let buckets = buckets_of(value)?;
    // The engine pads the number line with open-ended buckets; keep only the
    // ones that were asked for, in request order.
    let mut entries = Vec::with_capacity(requested.len());
    for want in requested {
        let found = buckets.iter().find(|bucket| {
            bound_eq(bucket.get("from"), want.from) && bound_eq(bucket.get("to"), want.to)
        });
        let Some(bucket) = found else {
            entries.push(RangeEntry {
                from: want.from,
                to: want.to,
                count: 0,
                min: None,
                max: None,
                mean: None,
                total: 0.0,
            });
            continue;
        };
        let stats = &bucket["stats"];
        entries.push(RangeEntry {
            from: want.from,
            to: want.to,
            count: bucket["doc_count"].as_u64().unwrap_or(0),
            min: stats["min"].as_f64(),
            max: stats["max"].as_f64(),
            mean: stats["avg"].as_f64(),
            total: stats["sum"].as_f64().unwrap_or(0.0),
        });
    }
    Ok(FacetResult::Range(entries))
}

fn parse_terms_stats(value: &serde_json::Value) -> Result<FacetResult> {
    let buckets = buckets_of(value)?;
    let entries = buckets
        .iter()
        .map(|bucket| {
            let stats = &bucket["stats"];
            TermsStatsEntry {
                term: key_as_string(&bucket["key"]),
                count: bucket["doc_count"].as_u64().unwrap_or(0),
                min: stats["min"].as_f64(),
                max: stats["max"].as_f64(),
                total: stats["sum"].as_f64().unwrap_or(0.0),
                mean: stats["avg"].as_f64(),
            }
        })
        .collect();
    Ok(FacetResult::TermsStats(entries))
}

fn buckets_of(value: &serde_json::Value) -> Result<&Vec<serde_json::Value>> {
    value["buckets"]
        .as_array()
        .ok_or_else(|| Error::Execution(format!("malformed facet result: {value}")))
}

fn key_as_string(key: &serde_json::Value) -> String {
    match key {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn bound_eq(actual: Option<&serde_json::Value>, wanted: Option<f64>) -> bool {
    match (actual.and_then(|v| v.as_f64()), wanted) {
        (None, None) => true,
        (Some(a), Some(w)) => (a - w).abs() < 1e-9,
        _ => false,
    }
}

fn statistical(
    open: &OpenIndex,
    searcher: &Searcher,
    docs: &[DocAddress],
    field: &str,
) -> Result<FacetResult> {
    if !matches!(
        open.mapping.kind_of(field),
        Some(FieldKind::F64) | Some(FieldKind::I64)
    ) {
        return Err(Error::InvalidSpec(format!(
            "statistical facet on non-numeric field '{field}'"
        )));
    }
    let mut columns = HashMap::new();
    let mut count = 0u64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut total = 0.0;
    let mut sum_of_squares = 0.0;
    for doc in docs {
        let column = match columns.entry(doc.segment_ord) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => e.insert(
                searcher
                    .segment_reader(doc.segment_ord)
                    .fast_fields()
                    .f64(field)?,
            ),
        };
        let Some(value) = column.first(doc.doc_id) else {
            continue;
        };
        count += 1;
        min = min.min(value);
        max = max.max(value);
        total += value;
        sum_of_squares += value * value;
    }
    let (min, max, mean, variance) = if count == 0 {
        (None, None, None, None)
    } else {
        let mean = total / count as f64;
        let variance = sum_of_squares / count as f64 - mean * mean;
        (Some(min), Some(max), Some(mean), Some(variance.max(0.0)))
    };
    Ok(FacetResult::Statistical(StatisticalResult {
        count,
        min,
        max,
        total,
        sum_of_squares,
        mean,
        variance,
        std_deviation: variance.map(f64::sqrt),
    }))
}

fn date_histogram(
    searcher: &Searcher,
    docs: &[DocAddress],
    field: &str,
    interval: DateInterval,
) -> Result<FacetResult> {
    let mut columns = HashMap::new();
    let mut buckets: BTreeMap<i64, u64> = BTreeMap::new();
    for doc in docs {
        let column = match columns.entry(doc.segment_ord) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => e.insert(
                searcher
                    .segment_reader(doc.segment_ord)
                    .fast_fields()
                    .date(field)?,
            ),
        };
        let Some(value) = column.first(doc.doc_id) else {
            continue;
        };
        let millis = value.into_timestamp_millis();
        let Some(datetime) = Utc.timestamp_millis_opt(millis).single() else {
            continue;
        };
        let bucket_start = match interval {
            DateInterval::Year => Utc
                .with_ymd_and_hms(datetime.year(), 1, 1, 0, 0, 0)
                .single(),
            DateInterval::Month => Utc
                .with_ymd_and_hms(datetime.year(), datetime.month(), 1, 0, 0, 0)
                .single(),
            DateInterval::Day => Utc
                .with_ymd_and_hms(datetime.year(), datetime.month(), datetime.day(), 0, 0, 0)
                .single(),
        };
        let Some(bucket_start) = bucket_start else {
            continue;
        };
        *buckets.entry(bucket_start.timestamp_millis()).or_insert(0) += 1;
    }
    Ok(FacetResult::DateHistogram(
        buckets
            .into_iter()
            .map(|(time, count)| DateHistogramEntry { time, count })
            .collect(),
    ))
}

/// Distance rings about a center point. Each matching document falls into
/// every ring containing its distance; ring statistics aggregate the
/// distances themselves, expressed in the requested unit.
fn geo_distance(
    open: &OpenIndex,
    searcher: &Searcher,
    docs: &[DocAddress],
    field: &str,
    center: GeoPoint,
    unit: &str,
    ranges: &[RangeBucketSpec],
) -> Result<FacetResult> {
    if open.mapping.kind_of(field) != Some(FieldKind::GeoPoint) {
        return Err(Error::InvalidSpec(format!(
            "geo_distance facet on non-geo field '{field}'"
        )));
    }
    let km_per_unit = geo::Distance::parse(&format!("1{unit}"))?.kilometers;

    struct Ring {
        count: u64,
        min: f64,
        max: f64,
        total: f64,
    }
    let mut rings: Vec<Ring> = ranges
        .iter()
        .map(|_| Ring {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            total: 0.0,
        })
        .collect();

    let mut columns = HashMap::new();
    for doc in docs {
        let (lat_col, lon_col) = match columns.entry(doc.segment_ord) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                let fast = searcher.segment_reader(doc.segment_ord).fast_fields();
                e.insert((
                    fast.f64(&format!("{field}{GEO_LAT_SUFFIX}"))?,
                    fast.f64(&format!("{field}{GEO_LON_SUFFIX}"))?,
                ))
            }
        };
        let (Some(lat), Some(lon)) = (lat_col.first(doc.doc_id), lon_col.first(doc.doc_id))
        else {
            continue;
        };
        let distance =
            geo::haversine_km(center, GeoPoint::new(lat, lon)) / km_per_unit;
        for (ring, bounds) in rings.iter_mut().zip(ranges) {
            // From-inclusive, to-exclusive, like numeric range buckets.
            if bounds.from.map_or(true, |from| distance >= from)
                && bounds.to.map_or(true, |to| distance < to)
            {
                ring.count += 1;
                ring.min = ring.min.min(distance);
                ring.max = ring.max.max(distance);
                ring.total += distance;
            }
        }
    }

    let entries = ranges
        .iter()
        .zip(rings)
        .map(|(bounds, ring)| RangeEntry {
            from: bounds.from,
            to: bounds.to,
            count: ring.count,
            min: (ring.count > 0).then_some(ring.min),
            max: (ring.count > 0).then_some(ring.max),
            mean: (ring.count > 0).then(|| ring.total / ring.count as f64),
            total: ring.total,
        })
        .collect();
    Ok(FacetResult::Range(entries))
}
