//! Isolation and rollback behaviour across both backends.

use proptest::prelude::*;
use serde_json::json;
use tessera_core::{TransactionState, ID_FIELD};
use tessera_testkit::prelude::*;

fn id_of(doc: &Document) -> String {
    doc[ID_FIELD].as_str().unwrap().to_string()
}

#[test]
fn uncommitted_writes_are_invisible_outside_the_context() {
    with_each_backend(|adapter| {
        let ops = adapter.operations();
        let ctx = RequestContext::new();
        adapter.init_transaction(&ctx).unwrap();

        let created = ops
            .create(Some(&ctx), "posts", doc(json!({"title": "draft"})))
            .unwrap();
        let id = id_of(&created);

        assert!(ops.find_by_id(Some(&ctx), "posts", &id).is_ok());
        assert!(matches!(
            ops.find_by_id(None, "posts", &id),
            Err(AdapterError::NotFound { .. })
        ));
        let other = RequestContext::new();
        assert!(matches!(
            ops.find_by_id(Some(&other), "posts", &id),
            Err(AdapterError::NotFound { .. })
        ));

        adapter.rollback_transaction(&ctx).unwrap();
    });
}

#[test]
fn commit_publishes_writes_and_clears_the_context() {
    with_each_backend(|adapter| {
        let ops = adapter.operations();
        let ctx = RequestContext::new();
        adapter.init_transaction(&ctx).unwrap();

        let a = ops
            .create(Some(&ctx), "posts", doc(json!({"title": "a"})))
            .unwrap();
        let b = ops
            .create(Some(&ctx), "posts", doc(json!({"title": "b"})))
            .unwrap();
        ops.update(Some(&ctx), "posts", &id_of(&a), &doc(json!({"title": "a2"})))
            .unwrap();

        assert!(adapter.commit_transaction(&ctx).unwrap().is_some());
        assert!(adapter.registry().get_session(ctx.id()).is_none());
        assert_eq!(adapter.coordinator().state(&ctx), TransactionState::NoTransaction);

        assert_eq!(
            ops.find_by_id(None, "posts", &id_of(&a)).unwrap()["title"],
            json!("a2")
        );
        assert_eq!(
            ops.find_by_id(None, "posts", &id_of(&b)).unwrap()["title"],
            json!("b")
        );
    });
}

#[test]
fn failed_write_rolls_back_earlier_writes_of_the_transaction() {
    with_each_backend(|adapter| {
        let ops = adapter.operations();
        ops.create_collection(None, "users").unwrap();
        ops.create_index(None, "users", "email", true).unwrap();
        ops.create(None, "users", doc(json!({"email": "taken@example.com"})))
            .unwrap();

        let ctx = RequestContext::new();
        adapter.init_transaction(&ctx).unwrap();
        let first = ops
            .create(Some(&ctx), "users", doc(json!({"email": "new@example.com"})))
            .unwrap();
        let dup = ops.create(Some(&ctx), "users", doc(json!({"email": "taken@example.com"})));
        assert!(matches!(dup, Err(AdapterError::Validation { .. })));

        assert!(adapter.registry().get_session(ctx.id()).is_none());
        assert!(matches!(
            ops.find_by_id(None, "users", &id_of(&first)),
            Err(AdapterError::NotFound { .. })
        ));
        assert_eq!(ops.count(None, "users", &Where::All).unwrap(), 1);

        // the context is clean; later calls run standalone
        ops.create(Some(&ctx), "users", doc(json!({"email": "later@example.com"})))
            .unwrap();
        assert_eq!(ops.count(None, "users", &Where::All).unwrap(), 2);
    });
}

#[test]
fn rollback_discards_updates_and_deletes() {
    with_each_backend(|adapter| {
        let ops = adapter.operations();
        let kept = ops
            .create(None, "posts", doc(json!({"title": "kept"})))
            .unwrap();
        let id = id_of(&kept);

        let ctx = RequestContext::new();
        adapter.init_transaction(&ctx).unwrap();
        ops.update(Some(&ctx), "posts", &id, &doc(json!({"title": "changed"})))
            .unwrap();
        ops.delete(Some(&ctx), "posts", &id).unwrap();
        assert!(ops.find_by_id(Some(&ctx), "posts", &id).is_err());
        assert!(adapter.rollback_transaction(&ctx).unwrap());

        assert_eq!(
            ops.find_by_id(None, "posts", &id).unwrap()["title"],
            json!("kept")
        );
    });
}

#[test]
fn versions_and_globals_follow_the_transaction() {
    with_each_backend(|adapter| {
        let ops = adapter.operations();
        let post = ops
            .create(None, "posts", doc(json!({"title": "v1"})))
            .unwrap();
        let id = id_of(&post);

        let ctx = RequestContext::new();
        adapter
            .transaction(&ctx, |ctx| {
                ops.update(Some(ctx), "posts", &id, &doc(json!({"title": "v2"})))?;
                ops.create_version(Some(ctx), "posts", &id, doc(json!({"title": "v2"})))?;
                ops.create_global(Some(ctx), "header", doc(json!({"nav": "home"})))?;
                ops.create_global_version(Some(ctx), "header", doc(json!({"nav": "home"})))?;
                Err::<(), _>(AdapterError::invalid_operation("abort"))
            })
            .unwrap_err();

        assert_eq!(ops.find_versions(None, "posts", &Query::all()).unwrap().total_docs, 0);
        assert!(matches!(
            ops.find_global(None, "header"),
            Err(AdapterError::NotFound { .. })
        ));
        assert_eq!(
            ops.find_global_versions(None, "header", &Query::all())
                .unwrap()
                .total_docs,
            0
        );
        assert_eq!(
            ops.find_by_id(None, "posts", &id).unwrap()["title"],
            json!("v1")
        );
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn random_documents_stay_isolated_until_commit(
        docs in documents_strategy(6),
        collection in collection_name_strategy(),
    ) {
        for kind in BACKENDS {
            let adapter = TestAdapter::memory(kind);
            let ops = adapter.operations();
            let ctx = RequestContext::new();
            adapter.init_transaction(&ctx).unwrap();

            for d in &docs {
                ops.create(Some(&ctx), &collection, d.clone()).unwrap();
            }
            prop_assert_eq!(ops.count(None, &collection, &Where::All).unwrap(), 0);
            prop_assert_eq!(ops.count(Some(&ctx), &collection, &Where::All).unwrap(), docs.len());

            adapter.commit_transaction(&ctx).unwrap();
            prop_assert_eq!(ops.count(None, &collection, &Where::All).unwrap(), docs.len());
        }
    }

    #[test]
    fn array_documents_read_back_whole(d in document_with_arrays_strategy()) {
        for kind in BACKENDS {
            let adapter = TestAdapter::memory(kind);
            let ops = adapter.operations();
            let ctx = RequestContext::new();
            let created = adapter
                .transaction(&ctx, |ctx| ops.create(Some(ctx), "items", d.clone()))
                .unwrap();
            let read = ops.find_by_id(None, "items", &id_of(&created)).unwrap();
            for (field, value) in &d {
                prop_assert_eq!(&read[field.as_str()], value);
            }
        }
    }
}
