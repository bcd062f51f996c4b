mod common;

use common::{named, open_test_store};
use serde_json::json;
use todostore_core::{Predicate, StoreError, Value};

#[test]
fn handles_observe_updates_and_invalidation() {
    let store = open_test_store();
    let (first, alex) = store
        .write(|| {
            let first = store.create("TestModel1", named("John"), false)?;
            let alex = store.create("TestModel3", named("Alex"), false)?;
            Ok((first, alex))
        })
        .unwrap();
    let second = store
        .object_for_primary_key("TestModel1", "John")
        .unwrap()
        .unwrap();

    store
        .write(|| second.set("model3", Value::Object(alex.id())))
        .unwrap();
    assert_eq!(first.linked("model3").unwrap(), Some(alex));

    store.write(|| store.delete(&second)).unwrap();
    assert!(!first.is_valid());
    let err = first.get_string("name").unwrap_err();
    assert!(matches!(err, StoreError::ObjectInvalidated { model: "TestModel1" }));
    assert_eq!(
        err.to_string(),
        "Accessing object of type TestModel1 which has been invalidated or deleted"
    );
}

#[test]
fn primary_key_cannot_be_changed() {
    let store = open_test_store();
    let object = store
        .write(|| store.create("TestModel2", named("George"), false))
        .unwrap();

    let err = store.write(|| object.set("name", "Other")).unwrap_err();
    assert!(matches!(err.root_cause(), StoreError::InvalidArgument(_)));
    assert_eq!(object.get_string("name").unwrap(), "George");
}

#[test]
fn lookups_report_missing_objects_as_none() {
    let store = open_test_store();
    assert!(store
        .object_for_primary_key("TestModel1", "nobody")
        .unwrap()
        .is_none());
    assert!(store.object("TestModel1", 1).unwrap().is_none());
    assert!(matches!(
        store.object_for_primary_key("TestModel1", 5_i64),
        Err(StoreError::TypeMismatch { .. })
    ));
    assert!(matches!(
        store.objects("Missing"),
        Err(StoreError::UnknownModel(_))
    ));
}

#[test]
fn results_are_ordered_by_insertion_and_indexable() {
    let store = open_test_store();
    store
        .write(|| {
            for name in ["c", "a", "b"] {
                store.create("TestModel4", named(name), false)?;
            }
            Ok(())
        })
        .unwrap();

    let all = store.objects("TestModel4").unwrap();
    let names: Vec<String> = all
        .objects()
        .unwrap()
        .iter()
        .map(|object| object.get_string("name").unwrap())
        .collect();
    assert_eq!(names, vec!["c", "a", "b"]);
    assert_eq!(all.get(1).unwrap().unwrap().get_string("name").unwrap(), "a");
    assert!(all.get(3).unwrap().is_none());
}

#[test]
fn filtered_requires_a_bool_property() {
    let store = open_test_store();
    let all = store.objects("TestModel1").unwrap();

    assert!(matches!(
        all.filtered(&Predicate::equals("missing", true)),
        Err(StoreError::UnknownProperty { .. })
    ));
    assert!(matches!(
        all.filtered(&Predicate::equals("name", true)),
        Err(StoreError::InvalidArgument(_))
    ));
}

#[test]
fn to_json_follows_links_up_to_max_depth() {
    let store = open_test_store();
    let owner = store
        .write(|| {
            let george = store.create("TestModel2", named("George"), false)?;
            let alex = store.create("TestModel3", named("Alex"), false)?;
            let mut fields = named("John");
            fields.insert("models2".to_string(), Value::List(vec![george.id()]));
            fields.insert("model3".to_string(), Value::Object(alex.id()));
            store.create("TestModel1", fields, false)
        })
        .unwrap();

    assert_eq!(
        owner.to_json(1).unwrap(),
        json!({
            "name": "John",
            "models2": [{ "name": "George" }],
            "model3": { "name": "Alex" },
        })
    );
    assert_eq!(
        owner.to_json(0).unwrap(),
        json!({
            "name": "John",
            "models2": "TestModel2[]",
            "model3": "TestModel3",
        })
    );
}

#[test]
fn subscribe_rejects_unknown_models() {
    let store = open_test_store();
    assert!(matches!(
        store.subscribe("Missing", || {}),
        Err(StoreError::UnknownModel(_))
    ));
}

#[test]
fn listeners_may_read_the_store_after_commit() {
    let store = std::rc::Rc::new(open_test_store());
    let seen = std::rc::Rc::new(std::cell::Cell::new(0));

    let weak = std::rc::Rc::downgrade(&store);
    let sink = std::rc::Rc::clone(&seen);
    store
        .subscribe("TestModel2", move || {
            if let Some(store) = weak.upgrade() {
                assert!(!store.is_in_transaction());
                sink.set(store.objects("TestModel2").unwrap().len().unwrap());
            }
        })
        .unwrap();

    store
        .write(|| store.create("TestModel2", named("George"), false))
        .unwrap();
    assert_eq!(seen.get(), 1);
}
