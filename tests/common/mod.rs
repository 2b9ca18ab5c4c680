#![allow(dead_code)]

//! Shared corpus for the integration tests: a beer catalogue of random
//! documents loaded into a queryable index through the fixture.

use chrono::{DateTime, TimeZone, Utc};
use embersearch::node::{BulkOp, LocalNode};
use embersearch::{IndexFixture, SearchClient};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const BRANDS: [&str; 3] = ["Heineken", "Grimbergen", "Kriek"];
pub const COLOURS: [&str; 3] = ["dark", "pale", "white"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beer {
    pub brand: String,
    pub colour: String,
    pub size: f64,
    pub price: f64,
    pub date: DateTime<Utc>,
}

pub fn brew_dates() -> [DateTime<Utc>; 3] {
    [
        Utc.with_ymd_and_hms(2010, 7, 17, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2011, 10, 31, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2012, 12, 26, 0, 0, 0).unwrap(),
    ]
}

/// Deterministic random catalogue: brand and colour drawn from three
/// values each, size in [0, 2), price in [0, 10), one of three brew dates.
pub fn corpus(count: usize, seed: u64) -> Vec<Beer> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dates = brew_dates();
    (0..count)
        .map(|_| Beer {
            brand: BRANDS[rng.gen_range(0..BRANDS.len())].to_string(),
            colour: COLOURS[rng.gen_range(0..COLOURS.len())].to_string(),
            size: rng.gen::<f64>() * 2.0,
            price: rng.gen::<f64>() * 10.0,
            date: dates[rng.gen_range(0..dates.len())],
        })
        .collect()
}

pub fn beer_ops(beers: &[Beer]) -> Vec<BulkOp> {
    beers
        .iter()
        .enumerate()
        .map(|(i, beer)| BulkOp::Index {
            id: format!("beer_{i}"),
            doc_type: "beer".to_string(),
            source: serde_json::to_value(beer).expect("beer serializes"),
        })
        .collect()
}

pub fn count_matching<F>(beers: &[Beer], predicate: F) -> u64
where
    F: Fn(&Beer) -> bool,
{
    beers.iter().filter(|b| predicate(b)).count() as u64
}

/// A queryable `meal` index holding `count` random beers. The fixture is
/// kept alive so teardown runs when the test ends.
pub struct MealIndex {
    _dir: tempfile::TempDir,
    _fixture: IndexFixture,
    pub node: Arc<LocalNode>,
    pub client: SearchClient,
    pub beers: Vec<Beer>,
}

pub fn meal_index(count: usize, seed: u64) -> MealIndex {
    let dir = tempfile::tempdir().expect("temp dir");
    let node = Arc::new(LocalNode::new(dir.path()));
    let beers = corpus(count, seed);
    let mut fixture = IndexFixture::new(Arc::clone(&node), "meal");
    fixture
        .provision(None, &beer_ops(&beers))
        .expect("fixture provision");
    MealIndex {
        _dir: dir,
        _fixture: fixture,
        client: SearchClient::new(Arc::clone(&node)),
        node,
        beers,
    }
}
