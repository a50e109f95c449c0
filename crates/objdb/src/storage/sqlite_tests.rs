use super::*;
use objdb_api::{Column, FieldOp, ObjQuery, PartQueryItem, SortItem};
use objdb_query::QueryCompiler;
use serde_json::json;

fn obj(id: &str, record: serde_json::Value) -> Obj {
    Obj {
        id: id.to_string(),
        app_id: "app".into(),
        group_id: "grp".into(),
        tag: "note".into(),
        obj_record: record,
        created_at: 10,
        updated_at: 10,
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

async fn find_all(backend: &SqliteBackend, query: &ObjQuery) -> Vec<Obj> {
    let c = backend.compiler();
    let filter = c.transform_filter(query, 0).unwrap();
    let sort = c.transform_sort(&[SortItem::asc("id")]).unwrap();
    backend.find(&filter, &sort, None).await.unwrap()
}

#[cfg(test)]
mod row_mapping_tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_read_back_every_column() {
        let backend = SqliteBackend::new_in_memory().await.unwrap();

        let mut stored = obj("a", json!({"n": 1, "nested": {"list": [1, "x", null]}}));
        stored.fields_to_index = Some(vec!["n".into(), "nested.list".into()]);
        stored.deleted_at = Some(99);
        stored.deleted_by = Some("u2".into());
        stored.deleted_by_type = Some("agentToken".into());
        stored.should_index = false;
        backend.insert(&[stored.clone()]).await.unwrap();

        let found = find_all(&backend, &ObjQuery::default()).await;
        assert_eq!(found, vec![stored]);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_a_conflict_and_rolls_back_the_batch() {
        let backend = SqliteBackend::new_in_memory().await.unwrap();
        backend.insert(&[obj("a", json!({}))]).await.unwrap();

        let err = backend
            .insert(&[obj("b", json!({})), obj("a", json!({}))])
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let ids: Vec<String> = find_all(&backend, &ObjQuery::default())
            .await
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec!["a"]);
    }
}

#[cfg(test)]
mod filter_execution_tests {
    use super::*;

    async fn seeded() -> SqliteBackend {
        let backend = SqliteBackend::new_in_memory().await.unwrap();
        backend
            .insert(&[
                obj("a", json!({"score": 5, "tags": ["red"], "items": [{"sku": "A"}]})),
                obj("b", json!({"score": "12", "tags": ["blue", "red"]})),
                obj("c", json!({"score": true, "items": [{"sku": "B"}, {"sku": "C"}]})),
            ])
            .await
            .unwrap();
        backend
    }

    fn part(op: FieldOp, field: &str, value: serde_json::Value) -> ObjQuery {
        ObjQuery::new().with_part(PartQueryItem::new(op, field, value))
    }

    async fn ids(backend: &SqliteBackend, query: ObjQuery) -> Vec<String> {
        find_all(backend, &query)
            .await
            .into_iter()
            .map(|o| o.id)
            .collect()
    }

    #[tokio::test]
    async fn test_numeric_comparison_coerces_numeric_strings_only() {
        let backend = seeded().await;
        assert_eq!(ids(&backend, part(FieldOp::Gt, "score", json!(4))).await, vec!["a", "b"]);
        assert_eq!(
            ids(&backend, part(FieldOp::Between, "score", json!([10, 20]))).await,
            vec!["b"]
        );
    }

    #[tokio::test]
    async fn test_wildcard_paths() {
        let backend = seeded().await;
        assert_eq!(
            ids(&backend, part(FieldOp::Eq, "tags.[*]", json!("red"))).await,
            vec!["a", "b"]
        );
        assert_eq!(
            ids(&backend, part(FieldOp::In, "items.[*].sku", json!(["C", "Z"]))).await,
            vec!["c"]
        );
        assert_eq!(
            ids(&backend, part(FieldOp::Neq, "tags.[*]", json!("blue"))).await,
            vec!["a", "c"]
        );
    }

    #[tokio::test]
    async fn test_mark_deleted_and_remove() {
        let backend = seeded().await;
        let c = backend.compiler();
        let marker = DeleteMarker {
            at: 50,
            by: "u9".into(),
            by_type: "user".into(),
        };
        let filter = c.ids_in(&["a".into(), "c".into()]).unwrap();
        assert_eq!(backend.mark_deleted(&filter, &marker).await.unwrap(), 2);

        let live = c.is_null(Column::DeletedAt, true).unwrap();
        assert_eq!(backend.count(&live).await.unwrap(), 1);

        assert_eq!(
            backend
                .remove(&["a".into(), "missing".into()])
                .await
                .unwrap(),
            1
        );
        assert_eq!(backend.count(&c.always_true()).await.unwrap(), 2);
    }
}

#[cfg(test)]
mod transaction_tests {
    use super::*;

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let backend = SqliteBackend::new_in_memory().await.unwrap();
        let tx = backend.begin().await.unwrap().expect("sqlite supports transactions");
        tx.insert(&[obj("a", json!({}))]).await.unwrap();
        assert_eq!(tx.count(&tx.compiler().always_true()).await.unwrap(), 1);
        tx.rollback().await.unwrap();

        assert_eq!(
            backend.count(&backend.compiler().always_true()).await.unwrap(),
            0
        );
        assert!(tx.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_commit_keeps_writes_and_nesting_reuses_the_transaction() {
        let backend = SqliteBackend::new_in_memory().await.unwrap();
        let tx = backend.begin().await.unwrap().unwrap();
        assert!(tx.begin().await.unwrap().is_none());

        let mut record = obj("a", json!({"v": 1}));
        tx.insert(&[record.clone()]).await.unwrap();
        record.obj_record = json!({"v": 2});
        assert_eq!(tx.replace(&[record.clone()]).await.unwrap(), 1);
        tx.commit().await.unwrap();

        let found = find_all(&backend, &ObjQuery::default()).await;
        assert_eq!(found, vec![record]);
    }
}

#[tokio::test]
async fn test_invalid_table_name_is_rejected() {
    let backend = SqliteBackend::new_in_memory().await.unwrap();
    let pool = backend.pool().clone();
    let err = SqliteBackend::from_pool(pool, "objs;--").unwrap_err();
    assert!(err.is_validation());
}
