//! The blocking execution client: one search is one full round trip against
//! the embedded node, multi-search is a batch of independent round trips.

use crate::node::{LocalNode, OpenIndex};
use crate::schema::{ID_FIELD, SOURCE_FIELD, TYPE_FIELD};
use crate::search::facets;
use crate::search::highlight::Highlighter;
use crate::search::response::{Hit, SearchResponse};
use crate::search::translate::{self, RescoreOp};
use crate::spec::SearchRequest;
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{DocAddress, Searcher, TantivyDocument, Term};

pub struct SearchClient {
    node: Arc<LocalNode>,
}

struct Candidate {
    score: f64,
    target: usize,
    address: DocAddress,
}

struct TargetExec {
    name: String,
    open: Arc<OpenIndex>,
    searcher: Searcher,
    highlighter: Option<Highlighter>,
}

impl SearchClient {
    pub fn new(node: Arc<LocalNode>) -> Self {
        SearchClient { node }
    }

    pub fn node(&self) -> &LocalNode {
        &self.node
    }

    /// Executes one search round trip. Results across multiple indices are
    /// merged by score before the `from`/`size` window is applied; the total
    /// stays exact regardless of the window.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();
        tracing::info!(
            query = %serde_json::to_string(&request.query).unwrap_or_default(),
            indices = ?request.indices,
            "search"
        );

        let resolved = self.node.resolve(&request.indices)?;
        let open_targets: Vec<(String, Arc<OpenIndex>)> = resolved
            .into_iter()
            .filter_map(|(name, open)| open.map(|open| (name, open)))
            .collect();

        if !request.facets.is_empty() && open_targets.len() > 1 {
            return Err(Error::InvalidSpec(
                "facets are only supported against a single index".to_string(),
            ));
        }

        let mut targets = Vec::with_capacity(open_targets.len());
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut total_hits = 0u64;
        let mut facet_results = std::collections::BTreeMap::new();

        for (target_ord, (name, open)) in open_targets.into_iter().enumerate() {
            check_deadline(start, request.timeout)?;
            let plan =
                translate::plan(&open, &name, &request.query, request.filter.as_ref())?;
            if !request.facets.is_empty() && !plan.query_post.is_empty() {
                return Err(Error::InvalidSpec(
                    "facets cannot be combined with geo or limit predicates".to_string(),
                ));
            }
            let searcher = open.reader.searcher();

            // Scoring side: user query plus the type restriction. The
            // top-level filter narrows hits but never the facet base.
            let scoring = compose_scoring(&open, &*plan.query, &request.doc_types)?;
            let hits_query: Box<dyn Query> = match &plan.filter {
                Some(filter) => Box::new(BooleanQuery::new(vec![
                    (Occur::Must, scoring.box_clone()),
                    (Occur::Must, filter.box_clone()),
                ])),
                None => scoring.box_clone(),
            };

            let limit = searcher.num_docs().max(1) as usize;
            let top = searcher
                .search(&*hits_query, &TopDocs::with_limit(limit))
                .map_err(|e| Error::Execution(format!("search on '{name}': {e}")))?;

            let mut post = plan.query_post;
            post.extend(plan.filter_post);
            let offsets = segment_offsets(&searcher);

            let mut scored: Vec<(f64, DocAddress)> = Vec::with_capacity(top.len());
            'docs: for (score, address) in top {
                let global_ord =
                    offsets[address.segment_ord as usize] + address.doc_id as u64;
                for predicate in &post {
                    if !predicate.matches(&searcher, address, global_ord)? {
                        continue 'docs;
                    }
                }
                scored.push((score as f64, address));
            }

            apply_rescore(&searcher, &plan.rescore, &mut scored)?;

            if !request.facets.is_empty() {
                facet_results = facets::execute(&open, &name, &*scoring, &request.facets)?;
            }

            total_hits += scored.len() as u64;
            candidates.extend(scored.into_iter().map(|(score, address)| Candidate {
                score,
                target: target_ord,
                address,
            }));

            let highlighter = if request.highlight.is_empty() {
                None
            } else {
                Some(Highlighter::new(
                    &open,
                    &searcher,
                    &*scoring,
                    &request.highlight,
                )?)
            };
            targets.push(TargetExec {
                name,
                open,
                searcher,
                highlighter,
            });
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.target.cmp(&b.target))
                .then_with(|| a.address.cmp(&b.address))
        });

        let window = candidates
            .into_iter()
            .skip(request.from)
            .take(request.size);
        let mut hits = Vec::new();
        for candidate in window {
            let target = &targets[candidate.target];
            hits.push(load_hit(target, candidate)?);
        }

        check_deadline(start, request.timeout)?;

        Ok(SearchResponse {
            total_hits,
            hits,
            facets: facet_results,
            took_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Executes a batch in order. Items are independent: a failing item
    /// yields its error in place without aborting the rest.
    pub fn multi_search(&self, requests: &[SearchRequest]) -> Vec<Result<SearchResponse>> {
        requests
            .iter()
            .map(|request| {
                self.search(request).inspect_err(|e| {
                    tracing::warn!(error = %e, "multi_search item failed");
                })
            })
            .collect()
    }
}

/// Best-effort deadline: a pass already underway is not interrupted.
fn check_deadline(start: Instant, timeout: Option<Duration>) -> Result<()> {
    if let Some(timeout) = timeout {
        if start.elapsed() > timeout {
            return Err(Error::ClusterUnavailable(format!(
                "search exceeded its {timeout:?} deadline"
            )));
        }
    }
    Ok(())
}

fn compose_scoring(
    open: &OpenIndex,
    query: &dyn Query,
    doc_types: &[String],
) -> Result<Box<dyn Query>> {
    if doc_types.is_empty() {
        return Ok(query.box_clone());
    }
    let type_field = open
        .field(TYPE_FIELD)
        .ok_or_else(|| Error::Execution("index has no type field".to_string()))?;
    let type_clauses: Vec<(Occur, Box<dyn Query>)> = doc_types
        .iter()
        .map(|t| {
            (
                Occur::Should,
                Box::new(TermQuery::new(
                    Term::from_field_text(type_field, t),
                    IndexRecordOption::Basic,
                )) as Box<dyn Query>,
            )
        })
        .collect();
    Ok(Box::new(BooleanQuery::new(vec![
        (Occur::Must, query.box_clone()),
        (Occur::Must, Box::new(BooleanQuery::new(type_clauses))),
    ])))
}

fn segment_offsets(searcher: &Searcher) -> Vec<u64> {
    let mut offsets = Vec::with_capacity(searcher.segment_readers().len());
    let mut acc = 0u64;
    for reader in searcher.segment_readers() {
        offsets.push(acc);
        acc += reader.max_doc() as u64;
    }
    offsets
}

fn apply_rescore(
    searcher: &Searcher,
    ops: &[RescoreOp],
    scored: &mut [(f64, DocAddress)],
) -> Result<()> {
    for op in ops {
        match op {
            RescoreOp::NegativeBoost { negative, factor } => {
                let demoted: HashSet<DocAddress> = searcher
                    .search(&**negative, &DocSetCollector)
                    .map_err(|e| Error::Execution(format!("rescore pass: {e}")))?;
                for (score, address) in scored.iter_mut() {
                    if demoted.contains(address) {
                        *score *= *factor as f64;
                    }
                }
            }
            RescoreOp::FieldFactor { field, factor } => {
                for (score, address) in scored.iter_mut() {
                    let column = searcher
                        .segment_reader(address.segment_ord)
                        .fast_fields()
                        .f64(field)?;
                    if let Some(value) = column.first(address.doc_id) {
                        *score *= value * factor;
                    }
                }
            }
        }
    }
    Ok(())
}

fn load_hit(target: &TargetExec, candidate: Candidate) -> Result<Hit> {
    let doc: TantivyDocument = target
        .searcher
        .doc(candidate.address)
        .map_err(|e| Error::Execution(format!("loading hit: {e}")))?;
    let id = stored_text(target, &doc, ID_FIELD)?;
    let doc_type = stored_text(target, &doc, TYPE_FIELD)?;
    let source = serde_json::from_str(&stored_text(target, &doc, SOURCE_FIELD)?)?;
    let highlight = match &target.highlighter {
        Some(highlighter) => highlighter.render(&doc),
        None => Default::default(),
    };
    Ok(Hit {
        id,
        index: target.name.clone(),
        doc_type,
        score: candidate.score,
        source,
        highlight,
    })
}

fn stored_text(target: &TargetExec, doc: &TantivyDocument, field: &str) -> Result<String> {
    let field_ref = target
        .open
        .field(field)
        .ok_or_else(|| Error::Execution(format!("missing system field '{field}'")))?;
    doc.get_first(field_ref)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            Error::Execution(format!("document without stored '{field}'"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BulkOp;
    use crate::schema::{FieldKind, IndexMapping};
    use crate::spec::{FilterSpec, QuerySpec};
    use serde_json::json;

    fn seeded_client() -> (tempfile::TempDir, SearchClient) {
        let dir = tempfile::tempdir().unwrap();
        let node = Arc::new(LocalNode::new(dir.path()));
        let mapping = IndexMapping::new()
            .field("brand", FieldKind::Text)
            .field("colour", FieldKind::Text)
            .field("price", FieldKind::F64);
        node.create_index("meal", Some(mapping)).unwrap();
        let ops: Vec<BulkOp> = [
            ("1", "Heineken", "pale", 3.5),
            ("2", "Kriek", "dark", 2.5),
            ("3", "Grimbergen", "dark", 6.0),
        ]
        .iter()
        .map(|(id, brand, colour, price)| BulkOp::Index {
            id: id.to_string(),
            doc_type: "beer".to_string(),
            source: json!({"brand": brand, "colour": colour, "price": price}),
        })
        .collect();
        node.bulk("meal", &ops).unwrap();
        node.refresh("meal").unwrap();
        (dir, SearchClient::new(node))
    }

    #[test]
    fn test_match_all_counts_everything() {
        let (_dir, client) = seeded_client();
        let response = client
            .search(&SearchRequest::new(QuerySpec::match_all()).index("meal"))
            .unwrap();
        assert_eq!(response.total_hits, 3);
        assert_eq!(response.hits.len(), 3);
    }

    #[test]
    fn test_term_query_is_exact() {
        let (_dir, client) = seeded_client();
        let response = client
            .search(&SearchRequest::new(QuerySpec::term("brand", "heineken")).index("meal"))
            .unwrap();
        assert_eq!(response.total_hits, 1);
        assert_eq!(response.hits[0].id, "1");
    }

    #[test]
    fn test_filter_narrows_hits_without_scoring() {
        let (_dir, client) = seeded_client();
        let response = client
            .search(
                &SearchRequest::new(QuerySpec::match_all())
                    .index("meal")
                    .filter(FilterSpec::term("colour", "dark")),
            )
            .unwrap();
        assert_eq!(response.total_hits, 2);
    }

    #[test]
    fn test_window_keeps_total_exact() {
        let (_dir, client) = seeded_client();
        let response = client
            .search(
                &SearchRequest::new(QuerySpec::match_all())
                    .index("meal")
                    .from(1)
                    .size(1),
            )
            .unwrap();
        assert_eq!(response.total_hits, 3);
        assert_eq!(response.hits.len(), 1);
    }

    #[test]
    fn test_multi_search_is_order_preserving_and_independent() {
        let (_dir, client) = seeded_client();
        let requests = vec![
            SearchRequest::new(QuerySpec::match_all()).index("meal"),
            SearchRequest::new(QuerySpec::match_all()).index("no_such_index"),
            SearchRequest::new(QuerySpec::term("brand", "kriek")).index("meal"),
        ];
        let results = client.multi_search(&requests);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().total_hits, 3);
        assert!(matches!(results[1], Err(Error::IndexNotFound(_))));
        assert_eq!(results[2].as_ref().unwrap().total_hits, 1);
    }

    #[test]
    fn test_deadline_exceeded_reports_cluster_unavailable() {
        let (_dir, client) = seeded_client();
        let err = client
            .search(
                &SearchRequest::new(QuerySpec::match_all())
                    .index("meal")
                    .timeout(Duration::from_nanos(1)),
            )
            .unwrap_err();
        assert!(matches!(err, Error::ClusterUnavailable(_)));
    }

    #[test]
    fn test_source_round_trips_exactly() {
        let (_dir, client) = seeded_client();
        let response = client
            .search(&SearchRequest::new(QuerySpec::ids(&["3"])).index("meal"))
            .unwrap();
        assert_eq!(
            response.hits[0].source,
            json!({"brand": "Grimbergen", "colour": "dark", "price": 6.0})
        );
    }
}
