//! Filter construction and execution: the non-scoring side of the DSL,
//! always attached to a match-all query over the random catalogue.

mod common;

use common::{count_matching, meal_index};
use embersearch::spec::{FilterSpec, QuerySpec, SearchRequest};
use embersearch::Error;

const CORPUS: usize = 1000;
const SEED: u64 = 20111031;

fn filtered_total(idx: &common::MealIndex, filter: FilterSpec) -> u64 {
    idx.client
        .search(
            &SearchRequest::new(QuerySpec::match_all())
                .index("meal")
                .filter(filter),
        )
        .unwrap()
        .total_hits
}

#[test]
fn test_match_all_filter() {
    let idx = meal_index(CORPUS, SEED);
    assert_eq!(filtered_total(&idx, FilterSpec::match_all()), CORPUS as u64);
}

#[test]
fn test_term_filter() {
    let idx = meal_index(CORPUS, SEED);
    let expected = count_matching(&idx.beers, |b| b.colour == "dark");
    assert_eq!(
        filtered_total(&idx, FilterSpec::term("colour", "dark")),
        expected
    );
}

#[test]
fn test_terms_filter() {
    let idx = meal_index(CORPUS, SEED);
    let expected = count_matching(&idx.beers, |b| {
        b.colour == "dark" || b.colour == "pale"
    });
    assert_eq!(
        filtered_total(&idx, FilterSpec::terms("colour", &["dark", "pale"])),
        expected
    );
}

#[test]
fn test_and_filter_with_cache_hint() {
    let idx = meal_index(CORPUS, SEED);
    let expected = count_matching(&idx.beers, |b| {
        b.colour == "dark" && b.price >= 0.0 && b.price <= 5.0
    });
    let filter = FilterSpec::and_cached(vec![
        FilterSpec::term("colour", "dark"),
        FilterSpec::numeric_range("price", Some(0.0), Some(5.0)),
    ]);
    assert_eq!(filtered_total(&idx, filter), expected);
}

#[test]
fn test_or_filter() {
    let idx = meal_index(CORPUS, SEED);
    let expected = count_matching(&idx.beers, |b| {
        b.brand == "Heineken" || b.colour == "white"
    });
    let filter = FilterSpec::or(vec![
        FilterSpec::term("brand", "heineken"),
        FilterSpec::term("colour", "white"),
    ]);
    assert_eq!(filtered_total(&idx, filter), expected);
}

#[test]
fn test_not_filter() {
    let idx = meal_index(CORPUS, SEED);
    let expected = count_matching(&idx.beers, |b| b.colour != "dark");
    let filter = FilterSpec::not(FilterSpec::term("colour", "dark"));
    assert_eq!(filtered_total(&idx, filter), expected);
}

#[test]
fn test_bool_filter() {
    let idx = meal_index(CORPUS, SEED);
    let expected = count_matching(&idx.beers, |b| {
        b.brand == "Kriek" && b.colour != "pale"
    });
    let filter = FilterSpec::bool()
        .must(FilterSpec::term("brand", "kriek"))
        .must_not(FilterSpec::term("colour", "pale"))
        .build();
    assert_eq!(filtered_total(&idx, filter), expected);
}

#[test]
fn test_exists_and_missing_filters() {
    let idx = meal_index(CORPUS, SEED);
    assert_eq!(filtered_total(&idx, FilterSpec::exists("colour")), CORPUS as u64);
    assert_eq!(filtered_total(&idx, FilterSpec::missing("colour")), 0);
    // A field no document carries.
    assert_eq!(filtered_total(&idx, FilterSpec::exists("abv")), 0);
    assert_eq!(filtered_total(&idx, FilterSpec::missing("abv")), CORPUS as u64);
}

#[test]
fn test_ids_filter() {
    let idx = meal_index(CORPUS, SEED);
    assert_eq!(
        filtered_total(&idx, FilterSpec::ids(&["beer_0", "beer_500", "beer_999"])),
        3
    );
}

#[test]
fn test_limit_filter_caps_evaluated_documents() {
    let idx = meal_index(CORPUS, SEED);
    assert_eq!(filtered_total(&idx, FilterSpec::limit(10)), 10);
}

#[test]
fn test_type_filter() {
    let idx = meal_index(CORPUS, SEED);
    assert_eq!(filtered_total(&idx, FilterSpec::doc_type("beer")), CORPUS as u64);
    assert_eq!(filtered_total(&idx, FilterSpec::doc_type("wine")), 0);
}

#[test]
fn test_prefix_filter() {
    let idx = meal_index(CORPUS, SEED);
    let expected = count_matching(&idx.beers, |b| b.brand == "Grimbergen");
    assert_eq!(filtered_total(&idx, FilterSpec::prefix("brand", "grim")), expected);
}

#[test]
fn test_query_filter() {
    let idx = meal_index(CORPUS, SEED);
    let expected = count_matching(&idx.beers, |b| b.colour == "pale");
    let filter = FilterSpec::query(QuerySpec::match_text("colour", "pale"));
    assert_eq!(filtered_total(&idx, filter), expected);
}

#[test]
fn test_range_filter_on_dates() {
    let idx = meal_index(CORPUS, SEED);
    let cutoff = common::brew_dates()[1];
    let expected = count_matching(&idx.beers, |b| b.date >= cutoff);
    let filter = FilterSpec::range(
        "date",
        Some(cutoff.to_rfc3339()),
        None::<serde_json::Value>,
    );
    assert_eq!(filtered_total(&idx, filter), expected);
}

#[test]
fn test_numeric_range_filter() {
    let idx = meal_index(CORPUS, SEED);
    let expected = count_matching(&idx.beers, |b| b.size >= 1.0 && b.size <= 2.0);
    let filter = FilterSpec::numeric_range("size", Some(1.0), Some(2.0));
    assert_eq!(filtered_total(&idx, filter), expected);
}

#[test]
fn test_filter_does_not_change_scoring_of_hits() {
    let idx = meal_index(CORPUS, SEED);
    let response = idx
        .client
        .search(
            &SearchRequest::new(QuerySpec::match_all())
                .index("meal")
                .filter(FilterSpec::term("colour", "dark")),
        )
        .unwrap();
    // A match-all hit scores 1.0; the filter contributes nothing.
    for hit in &response.hits {
        assert!((hit.score - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_limit_filter_inside_or_is_rejected() {
    let idx = meal_index(CORPUS, SEED);
    let filter = FilterSpec::or(vec![FilterSpec::limit(10), FilterSpec::match_all()]);
    let err = idx
        .client
        .search(
            &SearchRequest::new(QuerySpec::match_all())
                .index("meal")
                .filter(filter),
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSpec(_)));
}
