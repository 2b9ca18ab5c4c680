//! Mapping round trips and the exact-match behavior of analyzed versus
//! not-analyzed string fields.

use embersearch::node::{BulkOp, HealthStatus, LocalNode};
use embersearch::schema::{FieldKind, IndexMapping};
use embersearch::spec::{QuerySpec, SearchRequest};
use embersearch::{Error, IndexFixture, SearchClient};
use serde_json::json;
use std::sync::Arc;

fn node() -> (tempfile::TempDir, Arc<LocalNode>) {
    let dir = tempfile::tempdir().unwrap();
    let node = Arc::new(LocalNode::new(dir.path()));
    (dir, node)
}

#[test]
fn test_explicit_mapping_round_trips() {
    let (_dir, node) = node();
    let mapping = IndexMapping::new()
        .field("brand", FieldKind::Text)
        .field("price", FieldKind::F64)
        .field("date", FieldKind::Date);
    node.create_index("meal", Some(mapping.clone())).unwrap();
    assert_eq!(node.get_mapping("meal").unwrap(), Some(mapping));
}

#[test]
fn test_dynamic_mapping_inferred_from_first_bulk() {
    let (_dir, node) = node();
    node.create_index("meal", None).unwrap();
    assert_eq!(node.get_mapping("meal").unwrap(), None);
    assert_eq!(node.health("meal"), HealthStatus::Yellow);

    node.bulk(
        "meal",
        &[BulkOp::Index {
            id: "1".into(),
            doc_type: "beer".into(),
            source: json!({
                "brand": "Heineken",
                "price": 3.5,
                "fresh": true,
                "date": "2012-12-26T00:00:00Z",
                "location": {"lat": 5.0, "lon": 5.0}
            }),
        }],
    )
    .unwrap();

    let mapping = node.get_mapping("meal").unwrap().unwrap();
    assert_eq!(mapping.kind_of("brand"), Some(FieldKind::Text));
    assert_eq!(mapping.kind_of("price"), Some(FieldKind::F64));
    assert_eq!(mapping.kind_of("fresh"), Some(FieldKind::Bool));
    assert_eq!(mapping.kind_of("date"), Some(FieldKind::Date));
    assert_eq!(mapping.kind_of("location"), Some(FieldKind::GeoPoint));
    assert_eq!(node.health("meal"), HealthStatus::Green);
}

#[test]
fn test_conflicting_mapping_is_rejected() {
    let (_dir, node) = node();
    node.create_index(
        "meal",
        Some(IndexMapping::new().field("brand", FieldKind::Text)),
    )
    .unwrap();
    let err = node
        .put_mapping("meal", IndexMapping::new().field("brand", FieldKind::Keyword))
        .unwrap_err();
    assert!(matches!(err, Error::Mapping(_)));
}

#[test]
fn test_search_against_pending_index_is_empty() {
    let (_dir, node) = node();
    node.create_index("meal", None).unwrap();
    let client = SearchClient::new(Arc::clone(&node));
    let response = client
        .search(&SearchRequest::new(QuerySpec::match_all()).index("meal"))
        .unwrap();
    assert_eq!(response.total_hits, 0);
    assert!(response.hits.is_empty());
}

#[test]
fn test_analyzed_versus_not_analyzed_term_matching() {
    let (_dir, node) = node();
    let mapping = IndexMapping::new()
        .field("analyzed", FieldKind::Text)
        .field("notanalyzed", FieldKind::Keyword);
    let mut fixture = IndexFixture::new(Arc::clone(&node), "meal");
    fixture
        .provision(
            Some(mapping),
            &[BulkOp::Index {
                id: "1".into(),
                doc_type: "beer".into(),
                source: json!({"analyzed": "Abc Def", "notanalyzed": "Abc Def"}),
            }],
        )
        .unwrap();
    let client = SearchClient::new(node);

    let expect = |field: &str, value: &str, hits: u64| {
        let response = client
            .search(&SearchRequest::new(QuerySpec::term(field, value)).index("meal"))
            .unwrap();
        assert_eq!(
            response.total_hits, hits,
            "term '{value}' on field '{field}'"
        );
    };

    // Analyzed text is tokenized and lowercased; the stored literal as a
    // whole no longer exists as a term.
    expect("analyzed", "abc", 1);
    expect("analyzed", "Abc Def", 0);
    // The not-analyzed field only holds the exact literal.
    expect("notanalyzed", "Abc Def", 1);
    expect("notanalyzed", "abc", 0);
}

#[test]
fn test_match_phrase_respects_token_order_and_slop() {
    let (_dir, node) = node();
    let mapping = IndexMapping::new().field("title", FieldKind::Text);
    let mut fixture = IndexFixture::new(Arc::clone(&node), "meal");
    fixture
        .provision(
            Some(mapping),
            &[BulkOp::Index {
                id: "1".into(),
                doc_type: "beer".into(),
                source: json!({"title": "Abc Def Ghi"}),
            }],
        )
        .unwrap();
    let client = SearchClient::new(node);
    let total = |query: QuerySpec| {
        client
            .search(&SearchRequest::new(query).index("meal"))
            .unwrap()
            .total_hits
    };

    // The phrase text runs through the field analyzer, so case folds away.
    assert_eq!(total(QuerySpec::match_phrase("title", "Abc Def")), 1);
    assert_eq!(total(QuerySpec::match_phrase("title", "def abc")), 0);
    // One position of slack lets the phrase step over "def".
    assert_eq!(total(QuerySpec::match_phrase("title", "abc ghi")), 0);
    assert_eq!(total(QuerySpec::match_phrase_slop("title", "abc ghi", 1)), 1);
    // A single-token phrase degrades to a term query.
    assert_eq!(total(QuerySpec::match_phrase("title", "Def")), 1);
}
