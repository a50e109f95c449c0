//! Property-based agreement between the document and relational compilers.
//!
//! The same records go into a `MemoryBackend` (evaluating the MongoDB filters)
//! and a `SqliteBackend` (evaluating the JSON1 SQL); every generated query must
//! select the same ids from both.
//!
//! Fields may hold a scalar in one record and an array in another, so plain
//! paths are compared against arrays and `[*]` paths against scalars.
//! Generated shapes stay clear of the documented divergences: `exists` is
//! never asked of a `[*]` path, strings are ASCII, and numeric strings are
//! plain integers.

use objdb::store::ReadRequest;
use objdb::{MemoryBackend, Obj, ObjQuery, ObjStore, SqliteBackend, StorageBackend};
use objdb_api::{FieldOp, PartQueryItem, SortItem};
use proptest::prelude::*;
use proptest::sample::select;
use serde_json::{Map, Value, json};

const WORDS: [&str; 3] = ["alpha", "Beta", "gamma"];
const COLORS: [&str; 3] = ["red", "blue", "green"];

fn number_field() -> impl Strategy<Value = Option<Value>> {
    prop::option::of(prop_oneof![
        (-5i64..5).prop_map(Value::from),
        Just(json!(1.5)),
        (-5i64..5).prop_map(|i| Value::String(i.to_string())),
        Just(json!("x")),
        any::<bool>().prop_map(Value::Bool),
    ])
}

fn words() -> impl Strategy<Value = Value> {
    prop_oneof![
        select(WORDS.to_vec()).prop_map(|w| json!(w)),
        prop::collection::vec(select(WORDS.to_vec()), 0..3).prop_map(|ws| json!(ws)),
    ]
}

fn colors() -> impl Strategy<Value = Value> {
    prop_oneof![
        3 => prop::collection::vec(select(COLORS.to_vec()), 0..3).prop_map(|cs| json!(cs)),
        1 => select(COLORS.to_vec()).prop_map(|c| json!(c)),
    ]
}

fn record_strategy() -> impl Strategy<Value = Value> {
    (
        number_field(),
        prop::option::of(words()),
        prop::option::of(colors()),
    )
        .prop_map(|(n, s, tags)| {
            let mut doc = Map::new();
            if let Some(n) = n {
                doc.insert("n".into(), n);
            }
            if let Some(s) = s {
                doc.insert("s".into(), s);
            }
            if let Some(tags) = tags {
                doc.insert("tags".into(), tags);
            }
            Value::Object(doc)
        })
}

fn word_query() -> impl Strategy<Value = PartQueryItem> {
    let word = select(vec!["alpha", "Beta", "gamma", "zzz"]).prop_map(|w| json!(w));
    let value = prop_oneof![3 => word.clone(), 1 => Just(json!(["alpha"]))];
    prop_oneof![
        (select(vec![FieldOp::Eq, FieldOp::Neq]), value.clone())
            .prop_map(|(op, w)| PartQueryItem::new(op, "s", w)),
        (
            select(vec![FieldOp::In, FieldOp::NotIn]),
            prop::collection::vec(value, 1..3)
        )
            .prop_map(|(op, ws)| PartQueryItem::new(op, "s", json!(ws))),
        (select(vec!["a", "ET", "amm", "Al"]), any::<bool>()).prop_map(|(needle, sensitive)| {
            let item = PartQueryItem::new(FieldOp::Like, "s", json!(needle));
            if sensitive {
                item
            } else {
                item.case_insensitive()
            }
        }),
        any::<bool>().prop_map(|flag| PartQueryItem::new(FieldOp::Exists, "s", json!(flag))),
    ]
}

fn number_query() -> impl Strategy<Value = PartQueryItem> {
    prop_oneof![
        (
            select(vec![FieldOp::Gt, FieldOp::Gte, FieldOp::Lt, FieldOp::Lte]),
            -6i64..6
        )
            .prop_map(|(op, bound)| PartQueryItem::new(op, "n", json!(bound))),
        (-6i64..6, 0i64..4)
            .prop_map(|(min, span)| PartQueryItem::new(FieldOp::Between, "n", json!([min, min + span]))),
        (select(vec![FieldOp::Eq, FieldOp::Neq]), -5i64..5)
            .prop_map(|(op, v)| PartQueryItem::new(op, "n", json!(v))),
        prop::collection::vec(-5i64..5, 1..3)
            .prop_map(|vs| PartQueryItem::new(FieldOp::In, "n", json!(vs))),
    ]
}

fn tag_query() -> impl Strategy<Value = PartQueryItem> {
    let color = select(vec!["red", "blue", "green", "black"]);
    let field = select(vec!["tags", "tags.[*]"]);
    prop_oneof![
        (field.clone(), select(vec![FieldOp::Eq, FieldOp::Neq]), color.clone())
            .prop_map(|(f, op, c)| PartQueryItem::new(op, f, json!(c))),
        (
            field.clone(),
            select(vec![FieldOp::In, FieldOp::NotIn]),
            prop::collection::vec(color.clone(), 1..3)
        )
            .prop_map(|(f, op, cs)| PartQueryItem::new(op, f, json!(cs))),
        (field, select(vec!["re", "E"]), any::<bool>()).prop_map(|(f, needle, sensitive)| {
            let item = PartQueryItem::new(FieldOp::Like, f, json!(needle));
            if sensitive {
                item
            } else {
                item.case_insensitive()
            }
        }),
        (select(vec![FieldOp::Eq, FieldOp::Neq]), prop::collection::vec(color, 0..3))
            .prop_map(|(op, cs)| PartQueryItem::new(op, "tags", json!(cs))),
    ]
}

fn query_strategy() -> impl Strategy<Value = ObjQuery> {
    prop::collection::vec(prop_oneof![word_query(), number_query(), tag_query()], 0..3).prop_map(
        |items| {
            items
                .into_iter()
                .fold(ObjQuery::new(), |query, item| query.with_part(item))
        },
    )
}

fn obj(index: usize, record: Value) -> Obj {
    Obj {
        id: format!("obj-{:03}", index),
        app_id: "app".into(),
        group_id: "g".into(),
        tag: "note".into(),
        obj_record: record,
        created_at: index as i64,
        updated_at: index as i64,
        created_by: "u1".into(),
        created_by_type: "user".into(),
        updated_by: "u1".into(),
        updated_by_type: "user".into(),
        deleted_at: None,
        deleted_by: None,
        deleted_by_type: None,
        should_index: true,
        fields_to_index: None,
    }
}

async fn matching_ids<B: StorageBackend>(store: &ObjStore<B>, query: &ObjQuery) -> Vec<String> {
    let request = ReadRequest::new("app", "note")
        .with_query(query.clone())
        .with_sort(vec![SortItem::asc("id")])
        .with_page(1, 1_000);
    store
        .read(request)
        .await
        .unwrap()
        .objs
        .into_iter()
        .map(|o| o.id)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn prop_backends_select_the_same_records(
        records in prop::collection::vec(record_strategy(), 0..12),
        queries in prop::collection::vec(query_strategy(), 1..6),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let objs: Vec<Obj> = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| obj(i, record))
            .collect();

        let (memory_results, sqlite_results) = rt.block_on(async {
            let memory = MemoryBackend::new();
            memory.insert(&objs).await.unwrap();
            let sqlite = SqliteBackend::new_in_memory().await.unwrap();
            sqlite.insert(&objs).await.unwrap();

            let memory = ObjStore::new(memory);
            let sqlite = ObjStore::new(sqlite);
            let mut left = Vec::new();
            let mut right = Vec::new();
            for query in &queries {
                left.push(matching_ids(&memory, query).await);
                right.push(matching_ids(&sqlite, query).await);
            }
            (left, right)
        });

        for ((query, mem), sql) in queries.iter().zip(&memory_results).zip(&sqlite_results) {
            prop_assert_eq!(mem, sql, "query {:?}", query);
        }
    }

    #[test]
    fn prop_empty_query_selects_everything(records in prop::collection::vec(record_strategy(), 0..8)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let objs: Vec<Obj> = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| obj(i, record))
            .collect();
        let expected: Vec<String> = objs.iter().map(|o| o.id.clone()).collect();

        let ids = rt.block_on(async {
            let sqlite = SqliteBackend::new_in_memory().await.unwrap();
            sqlite.insert(&objs).await.unwrap();
            matching_ids(&ObjStore::new(sqlite), &ObjQuery::new()).await
        });
        prop_assert_eq!(ids, expected);
    }
}
