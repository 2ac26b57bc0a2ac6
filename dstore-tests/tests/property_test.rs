/// Property-based tests
///
/// Generated keys, filters and page sizes are checked against invariants
/// that must hold for every input.

use dstore_client::{
    Entity, Key, MoreResults, Operator, OrderOptions, PathToken, Query, Requests,
};
use dstore_emulator::EmulatorConfig;
use dstore_test_utils::{ids, TestDatastore};
use proptest::prelude::*;

fn kind() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{0,8}"
}

fn token() -> impl Strategy<Value = PathToken> {
    prop_oneof![
        (1i64..i64::MAX).prop_map(PathToken::from),
        "[a-z][a-z0-9]{0,10}".prop_map(PathToken::from),
    ]
}

#[derive(Debug, Clone)]
enum Step {
    Filter(String, Operator, i64),
    Order(String, bool),
    GroupBy(String),
    Select(String),
    Limit(usize),
    Offset(usize),
}

fn step() -> impl Strategy<Value = Step> {
    let property = "[a-z]{1,6}";
    let operator = prop_oneof![
        Just(Operator::LessThan),
        Just(Operator::LessThanOrEqual),
        Just(Operator::Equal),
        Just(Operator::GreaterThanOrEqual),
        Just(Operator::GreaterThan),
    ];
    prop_oneof![
        (property, operator, any::<i64>()).prop_map(|(p, o, v)| Step::Filter(p, o, v)),
        (property, any::<bool>()).prop_map(|(p, d)| Step::Order(p, d)),
        property.prop_map(Step::GroupBy),
        property.prop_map(Step::Select),
        (0usize..100).prop_map(Step::Limit),
        (0usize..100).prop_map(Step::Offset),
    ]
}

fn build(steps: &[Step]) -> Query {
    steps.iter().fold(Query::new("Task"), |query, step| match step.clone() {
        Step::Filter(p, o, v) => query.filter(p, o, v),
        Step::Order(p, descending) => query.order(p, OrderOptions { descending }),
        Step::GroupBy(p) => query.group_by([p]),
        Step::Select(p) => query.select([p]),
        Step::Limit(n) => query.limit(n),
        Step::Offset(n) => query.offset(n),
    })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn prop_key_path_round_trip(elements in prop::collection::vec((kind(), token()), 1..5)) {
        let path: Vec<PathToken> = elements
            .into_iter()
            .flat_map(|(kind, id)| [PathToken::from(kind), id])
            .collect();
        let key = Key::from_path(path.clone()).unwrap();
        prop_assert!(key.is_complete());
        prop_assert_eq!(key.path(), path.clone());
        prop_assert_eq!(key.ancestors().len(), path.len() / 2 - 1);
        prop_assert_eq!(Key::from_path(key.path()).unwrap(), key);
    }

    #[test]
    fn prop_query_replay_is_equal(steps in prop::collection::vec(step(), 0..12)) {
        let first = build(&steps);
        let second = build(&steps);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.filters().len(), steps.iter().filter(|s| matches!(s, Step::Filter(..))).count());
        prop_assert_eq!(first.orders().len(), steps.iter().filter(|s| matches!(s, Step::Order(..))).count());
    }

    #[test]
    fn prop_cursor_pages_cover_results(count in 0usize..30, page in 1usize..8, batch in 1usize..6) {
        let results = runtime().block_on(async {
            let db = TestDatastore::with_config(EmulatorConfig::new().with_query_batch_size(batch));
            db.seed("Item", count).await;

            let query = Query::new("Item").order_desc("index").limit(page);
            let mut seen = Vec::new();
            let mut next = query.clone();
            loop {
                let result = db.datastore.run_query(&next).await.unwrap();
                assert!(result.entities.len() <= page);
                seen.extend(ids(&result.entities));
                if result.info.more_results == MoreResults::NoMoreResults {
                    break;
                }
                next = query.clone().start(result.info.end_cursor.unwrap());
            }
            seen
        });

        let expected: Vec<i64> = (1..=count as i64).rev().collect();
        prop_assert_eq!(results, expected);
    }

    #[test]
    fn prop_filter_matches_reference(values in prop::collection::vec(-20i64..20, 0..25), pivot in -20i64..20) {
        let (found, expected) = runtime().block_on(async {
            let db = TestDatastore::new();
            let entities: Vec<Entity> = values
                .iter()
                .enumerate()
                .map(|(i, v)| Entity::new(Key::with_id("Num", i as i64 + 1).unwrap()).set("v", *v))
                .collect();
            db.datastore.save(entities).await.unwrap();

            let query = Query::new("Num").filter("v", Operator::GreaterThanOrEqual, pivot);
            let found = ids(&db.datastore.run_query(&query).await.unwrap().entities);
            let expected: Vec<i64> = values
                .iter()
                .enumerate()
                .filter(|(_, v)| **v >= pivot)
                .map(|(i, _)| i as i64 + 1)
                .collect();
            (found, expected)
        });
        prop_assert_eq!(found, expected);
    }
}
