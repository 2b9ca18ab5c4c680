//! Fixture lifecycle guarantees: read-after-refresh visibility, bounded
//! health waits, fatal bulk failures and idempotent teardown.

mod common;

use embersearch::node::{BulkOp, HealthStatus, LocalNode};
use embersearch::schema::{FieldKind, IndexMapping};
use embersearch::spec::{QuerySpec, SearchRequest};
use embersearch::{Error, FixtureState, IndexFixture, SearchClient};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn node() -> (tempfile::TempDir, Arc<LocalNode>) {
    let dir = tempfile::tempdir().unwrap();
    let node = Arc::new(LocalNode::new(dir.path()));
    (dir, node)
}

#[test]
fn test_read_after_refresh() {
    let (_dir, node) = node();
    let beers = common::corpus(100, 42);
    let mut fixture = IndexFixture::new(Arc::clone(&node), "meal");
    fixture.create(None).unwrap();
    fixture.await_health().unwrap();
    fixture.load(&common::beer_ops(&beers)).unwrap();
    fixture.refresh().unwrap();

    // Everything loaded before refresh returned is visible.
    let client = SearchClient::new(node);
    let response = client
        .search(&SearchRequest::new(QuerySpec::match_all()).index("meal"))
        .unwrap();
    response.expect_total_hits(100).unwrap();
}

#[test]
fn test_incremental_loads_between_refreshes() {
    let (_dir, node) = node();
    let beers = common::corpus(20, 43);
    let mut fixture = IndexFixture::new(Arc::clone(&node), "meal");
    fixture
        .provision(None, &common::beer_ops(&beers[..10]))
        .unwrap();
    let client = SearchClient::new(Arc::clone(&node));
    let total = |client: &SearchClient| {
        client
            .search(&SearchRequest::new(QuerySpec::match_all()).index("meal"))
            .unwrap()
            .total_hits
    };
    assert_eq!(total(&client), 10);

    let more: Vec<BulkOp> = beers[10..]
        .iter()
        .enumerate()
        .map(|(i, beer)| BulkOp::Index {
            id: format!("extra_{i}"),
            doc_type: "beer".to_string(),
            source: serde_json::to_value(beer).unwrap(),
        })
        .collect();
    fixture.load(&more).unwrap();
    fixture.refresh().unwrap();
    assert_eq!(total(&client), 20);
}

#[test]
fn test_health_wait_fails_at_the_deadline() {
    let (_dir, node) = node();
    let err = node
        .wait_for_health("absent", HealthStatus::Yellow, Duration::from_millis(50))
        .unwrap_err();
    assert!(matches!(err, Error::ClusterUnavailable(_)));
}

#[test]
fn test_fixture_deadline_applies_to_health_phase() {
    let (_dir, node) = node();
    let mut fixture =
        IndexFixture::new(Arc::clone(&node), "meal").with_deadline(Duration::from_millis(50));
    fixture.create(None).unwrap();
    // A pending index reaches yellow immediately, so the bounded wait
    // succeeds well inside the deadline.
    fixture.await_health().unwrap();
    assert_eq!(fixture.state(), FixtureState::Ready);
}

#[test]
fn test_bulk_partial_failure_is_fatal_and_reported() {
    let (_dir, node) = node();
    let mapping = IndexMapping::new()
        .field("brand", FieldKind::Text)
        .field("price", FieldKind::F64);
    let mut fixture = IndexFixture::new(Arc::clone(&node), "meal");
    fixture.create(Some(mapping)).unwrap();
    fixture.await_health().unwrap();

    let ops = vec![
        BulkOp::Index {
            id: "good".into(),
            doc_type: "beer".into(),
            source: json!({"brand": "Heineken", "price": 3.5}),
        },
        BulkOp::Index {
            id: "bad".into(),
            doc_type: "beer".into(),
            source: json!({"brand": "Kriek", "price": "free"}),
        },
    ];
    match fixture.load(&ops).unwrap_err() {
        Error::BulkPartialFailure(failures) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].id, "bad");
            assert_eq!(failures[0].position, 1);
        }
        other => panic!("expected BulkPartialFailure, got {other:?}"),
    }

    // Nothing from the failed batch was written.
    node.refresh("meal").unwrap();
    let client = SearchClient::new(node);
    let response = client
        .search(&SearchRequest::new(QuerySpec::match_all()).index("meal"))
        .unwrap();
    response.expect_total_hits(0).unwrap();
}

#[test]
fn test_teardown_is_idempotent_and_leaves_no_index() {
    let (_dir, node) = node();
    let mut fixture = IndexFixture::new(Arc::clone(&node), "meal");
    fixture
        .provision(None, &common::beer_ops(&common::corpus(5, 44)))
        .unwrap();
    assert_eq!(node.health("meal"), HealthStatus::Green);

    fixture.tear_down();
    fixture.tear_down();
    assert_eq!(node.health("meal"), HealthStatus::Red);

    // Deleting through the node again is also a no-op.
    node.delete_index("meal").unwrap();
}

#[test]
fn test_fixture_is_reusable_after_teardown() {
    let (_dir, node) = node();
    let mut fixture = IndexFixture::new(Arc::clone(&node), "meal");
    fixture
        .provision(None, &common::beer_ops(&common::corpus(5, 45)))
        .unwrap();
    fixture.tear_down();
    fixture
        .provision(None, &common::beer_ops(&common::corpus(3, 46)))
        .unwrap();
    let client = SearchClient::new(node);
    let response = client
        .search(&SearchRequest::new(QuerySpec::match_all()).index("meal"))
        .unwrap();
    response.expect_total_hits(3).unwrap();
}
