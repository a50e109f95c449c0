use super::*;
use crate::QueryCompiler;
use objdb_api::{
    DeletedAtQuery, FieldOp, LogicalQuery, MetaQuery, MetaQueryMap, NumberOrDuration, ObjQuery,
    PartQueryItem, SortItem, StringMetaQuery, TopLevelFieldsQuery,
};
use serde_json::json;

fn compiler() -> DocQueryCompiler {
    DocQueryCompiler::new()
}

fn part(op: FieldOp, field: &str, value: Value) -> Value {
    compiler()
        .compile_part(&PartQueryItem::new(op, field, value), 0)
        .unwrap()
}

#[test]
fn test_empty_query_is_always_true() {
    let c = compiler();
    assert_eq!(c.transform_filter(&ObjQuery::default(), 0).unwrap(), json!({}));

    let empty_groups = ObjQuery {
        part_query: Some(LogicalQuery {
            and: Some(vec![]),
            or: None,
        }),
        meta_query: Some(MetaQueryMap::default()),
        top_level_fields: Some(TopLevelFieldsQuery::default()),
    };
    assert_eq!(c.transform_filter(&empty_groups, 0).unwrap(), json!({}));
}

fn field(key: &str, input: Value) -> Value {
    json!({"$getField": {"field": key, "input": input}})
}

fn top(key: &str) -> Value {
    field(key, json!("$objRecord"))
}

fn whole_value_eq(key: &str, value: Value) -> Value {
    json!({"$expr": {"$eq": [top(key), {"$literal": value}]}})
}

#[test]
fn test_plain_paths_compare_whole_values() {
    assert_eq!(part(FieldOp::Eq, "status", json!("open")), whole_value_eq("status", json!("open")));

    let a_b = field("b", top("a"));
    assert_eq!(
        part(FieldOp::NotIn, "a.b", json!([1, 2])),
        json!({"$expr": {"$not": [{"$or": [
            {"$eq": [a_b, {"$literal": 1}]},
            {"$eq": [a_b, {"$literal": 2}]}
        ]}]}})
    );
    assert_eq!(
        part(FieldOp::Neq, "points.1", json!(2)),
        json!({"$expr": {"$not": [{"$eq": [
            {"$arrayElemAt": [top("points"), 1]},
            {"$literal": 2}
        ]}]}})
    );
    // Operator-looking literals are not evaluated
    assert_eq!(
        part(FieldOp::Eq, "ref", json!("$id")),
        whole_value_eq("ref", json!("$id"))
    );
}

#[test]
fn test_wildcards_map_over_elements() {
    let items = top("items");
    assert_eq!(
        part(FieldOp::Eq, "items.[*].sku", json!("A1")),
        json!({"$expr": {"$anyElementTrue": [{"$map": {
            "input": {"$cond": [{"$isArray": [items]}, items, []]},
            "as": "el0",
            "in": {"$eq": [field("sku", json!("$$el0")), {"$literal": "A1"}]}
        }}]}})
    );

    // Negation wraps the whole scope
    let filter = part(FieldOp::Neq, "tags.[*]", json!("a"));
    let map = &filter["$expr"]["$not"][0]["$anyElementTrue"][0]["$map"];
    assert_eq!(map["in"], json!({"$eq": ["$$el0", {"$literal": "a"}]}));

    let nested = part(FieldOp::In, "rows.[*].cells.[*]", json!([1]));
    let outer = &nested["$expr"]["$anyElementTrue"][0]["$map"];
    let inner = &outer["in"]["$anyElementTrue"][0]["$map"];
    assert_eq!(inner["as"], json!("el1"));
    assert_eq!(inner["input"]["$cond"][1], field("cells", json!("$$el0")));
}

#[test]
fn test_exists_keeps_the_query_operator() {
    assert_eq!(
        part(FieldOp::Exists, "tags.[*]", json!(true)),
        json!({"objRecord.tags": {"$exists": true}})
    );
    assert_eq!(
        part(FieldOp::Exists, "name", json!(false)),
        json!({"objRecord.name": {"$exists": false}})
    );
}

#[test]
fn test_like_escapes_and_sets_options() {
    let name = top("name");
    assert_eq!(
        part(FieldOp::Like, "name", json!("a.b")),
        json!({"$expr": {"$and": [
            {"$eq": [{"$type": name}, "string"]},
            {"$regexMatch": {"input": name, "regex": "a\\.b"}}
        ]}})
    );

    let item = PartQueryItem::new(FieldOp::Like, "name", json!("Ab")).case_insensitive();
    let filter = compiler().compile_part(&item, 0).unwrap();
    assert_eq!(filter["$expr"]["$and"][1]["$regexMatch"]["options"], json!("i"));
}

#[test]
fn test_numeric_comparison_coerces_strings() {
    let filter = part(FieldOp::Gt, "score", json!(5));
    let expr = &filter["$expr"]["$and"];
    assert_eq!(expr.as_array().unwrap().len(), 2);
    assert_eq!(expr[1]["$gt"][1], json!(5.0));
    assert_eq!(expr[1]["$gt"][0]["$cond"][1]["$convert"]["input"], top("score"));
}

#[test]
fn test_numeric_comparison_maps_over_wildcards() {
    let filter = part(FieldOp::Between, "items.[*].price", json!([1, 10]));
    let any = &filter["$expr"]["$anyElementTrue"][0]["$map"];
    assert_eq!(any["as"], json!("el0"));
    assert_eq!(any["input"]["$cond"][1], top("items"));
    assert_eq!(
        any["in"]["$and"][1]["$gte"][0]["$cond"][1]["$convert"]["input"],
        field("price", json!("$$el0"))
    );
}

#[test]
fn test_numeric_index_segments_use_array_elem_at() {
    let filter = part(FieldOp::Lt, "points.0", json!(3));
    assert_eq!(
        filter["$expr"]["$and"][1]["$lt"][0]["$cond"][1]["$convert"]["input"],
        json!({"$arrayElemAt": [top("points"), 0]})
    );
}

#[test]
fn test_or_group_is_and_combined() {
    let query = ObjQuery {
        part_query: Some(LogicalQuery {
            and: Some(vec![PartQueryItem::new(FieldOp::Eq, "a", json!(1))]),
            or: Some(vec![
                PartQueryItem::new(FieldOp::Eq, "b", json!(2)),
                PartQueryItem::new(FieldOp::Eq, "c", json!(3)),
            ]),
        }),
        ..Default::default()
    };
    assert_eq!(
        compiler().transform_filter(&query, 0).unwrap(),
        json!({"$and": [
            whole_value_eq("a", json!(1)),
            {"$and": [whole_value_eq("b", json!(2)), whole_value_eq("c", json!(3))]}
        ]})
    );
}

#[test]
fn test_meta_and_top_level_predicates() {
    let query = ObjQuery {
        meta_query: Some(MetaQueryMap {
            created_by: Some(MetaQuery {
                in_: Some(vec![json!("u1")]),
                ..Default::default()
            }),
            created_at: Some(MetaQuery {
                gte: Some(NumberOrDuration::Number(100.0)),
                ..Default::default()
            }),
            ..Default::default()
        }),
        top_level_fields: Some(TopLevelFieldsQuery {
            should_index: Some(true),
            tag: Some(StringMetaQuery::eq("log")),
            deleted_at: Some(DeletedAtQuery::is_null(true)),
            ..Default::default()
        }),
        ..Default::default()
    };
    assert_eq!(
        compiler().transform_filter(&query, 0).unwrap(),
        json!({"$and": [
            {"$and": [
                {"createdAt": {"$gte": 100.0}},
                {"createdBy": {"$in": ["u1"]}}
            ]},
            {"$and": [
                {"shouldIndex": {"$eq": true}},
                {"tag": {"$eq": "log"}},
                {"deletedAt": {"$eq": null}}
            ]}
        ]})
    );
}

#[test]
fn test_mixed_meta_families_fail_validation() {
    let query = ObjQuery::new().with_meta(MetaQueryMap {
        id: Some(MetaQuery {
            eq: Some(json!("a")),
            lt: Some(NumberOrDuration::Number(3.0)),
            ..Default::default()
        }),
        ..Default::default()
    });
    assert!(compiler().transform_filter(&query, 0).unwrap_err().is_validation());
}

#[test]
fn test_sort_defaults_and_tie_breaker() {
    let c = compiler();
    assert_eq!(
        c.transform_sort(&[]).unwrap(),
        vec![
            ("createdAt".to_string(), SortDirection::Desc),
            ("id".to_string(), SortDirection::Asc)
        ]
    );
    assert_eq!(
        c.transform_sort(&[SortItem::asc("profile.age"), SortItem::desc("id")])
            .unwrap(),
        vec![
            ("objRecord.profile.age".to_string(), SortDirection::Asc),
            ("id".to_string(), SortDirection::Desc)
        ]
    );
}

#[test]
fn test_pagination() {
    let c = compiler();
    assert_eq!(
        c.transform_pagination(3, 10).unwrap(),
        DocPagination { skip: 20, limit: 10 }
    );
    assert!(c.transform_pagination(0, 10).unwrap_err().is_validation());
    assert!(c.transform_pagination(1, 0).unwrap_err().is_validation());
}
