mod common;

use common::{count, named, open_test_store, seed};
use todostore_core::{ModelSchema, ObjectStore, Property, StoreConfig, StoreError, Value};

#[test]
fn empty_database_empties_every_model() {
    let store = open_test_store();
    seed(&store);
    let all_model1 = store.objects("TestModel1").unwrap();
    assert_eq!(all_model1.len().unwrap(), 3);

    store.empty_database().unwrap();
    assert_eq!(all_model1.len().unwrap(), 0);
    for model in ["TestModel2", "TestModel3", "TestModel4"] {
        assert_eq!(count(&store, model), 0, "{model} not emptied");
    }
    assert!(!store.is_in_transaction());
}

#[test]
fn delete_all_cascades_to_child_models() {
    let store = open_test_store();
    seed(&store);

    store.delete_all(&["TestModel1"]).unwrap();
    assert_eq!(count(&store, "TestModel1"), 0);
    assert_eq!(count(&store, "TestModel2"), 0);
    assert_eq!(count(&store, "TestModel3"), 0);
    assert_eq!(count(&store, "TestModel4"), 2);
}

#[test]
fn delete_all_with_no_names_is_a_no_op() {
    let store = open_test_store();
    seed(&store);

    store.delete_all(&[]).unwrap();
    assert_eq!(count(&store, "TestModel1"), 3);
    assert_eq!(count(&store, "TestModel4"), 2);
}

#[test]
fn delete_all_skips_unknown_names() {
    let store = open_test_store();
    seed(&store);

    store.delete_all(&["Missing", "TestModel4"]).unwrap();
    assert_eq!(count(&store, "TestModel4"), 0);
    assert_eq!(count(&store, "TestModel1"), 3);
}

#[test]
fn delete_all_except_keeps_named_models() {
    let store = open_test_store();
    seed(&store);

    store
        .delete_all_except(&["TestModel1", "TestModel4"])
        .unwrap();
    assert_eq!(count(&store, "TestModel1"), 3);
    assert_eq!(count(&store, "TestModel2"), 0);
    assert_eq!(count(&store, "TestModel3"), 0);
    assert_eq!(count(&store, "TestModel4"), 2);
}

#[test]
fn delete_all_except_without_names_empties_everything() {
    let store = open_test_store();
    seed(&store);

    store.delete_all_except(&[]).unwrap();
    for model in ["TestModel1", "TestModel2", "TestModel3", "TestModel4"] {
        assert_eq!(count(&store, model), 0, "{model} not emptied");
    }
}

#[test]
fn cascade_reaches_kept_children_of_deleted_models() {
    let store = open_test_store();
    seed(&store);

    store
        .delete_all_except(&["TestModel2", "TestModel4"])
        .unwrap();
    assert_eq!(count(&store, "TestModel1"), 0);
    assert_eq!(count(&store, "TestModel2"), 0);
    assert_eq!(count(&store, "TestModel3"), 0);
    assert_eq!(count(&store, "TestModel4"), 2);
}

#[test]
fn deleting_objects_clears_links_to_them() {
    let store = open_test_store();
    let (owner, kept) = store
        .write(|| {
            let first = store.create("TestModel2", named("George"), false)?;
            let second = store.create("TestModel2", named("Jane"), false)?;
            let alex = store.create("TestModel3", named("Alex"), false)?;
            let mut fields = named("John");
            fields.insert(
                "models2".to_string(),
                Value::List(vec![first.id(), second.id()]),
            );
            fields.insert("model3".to_string(), Value::Object(alex.id()));
            let owner = store.create("TestModel1", fields, false)?;
            store.delete(&first)?;
            Ok((owner, second))
        })
        .unwrap();

    assert_eq!(owner.linked_list("models2").unwrap(), vec![kept]);
    assert_eq!(owner.get("models2").unwrap(), Value::List(vec![kept.id()]));

    store.delete_all(&["TestModel3"]).unwrap();
    assert_eq!(owner.get("model3").unwrap(), Value::Null);
    assert_eq!(owner.linked("model3").unwrap(), None);
}

#[test]
fn dangling_links_are_rejected() {
    let store = open_test_store();
    store.begin_transaction().unwrap();
    let mut fields = named("John");
    fields.insert("model3".to_string(), Value::Object(404));
    assert!(matches!(
        store.create("TestModel1", fields, false),
        Err(StoreError::InvalidArgument(_))
    ));
    store.cancel_transaction().unwrap();
}

#[test]
fn delete_results_removes_only_matching_objects() {
    static FLAGGED: ModelSchema = ModelSchema::new(
        "Flagged",
        &[Property::string("name"), Property::bool("hot")],
    )
    .with_primary_key("name");

    let store = ObjectStore::open(StoreConfig::new().schema(&[&FLAGGED])).unwrap();
    store
        .write(|| {
            for (name, hot) in [("a", true), ("b", false), ("c", true)] {
                let mut fields = named(name);
                fields.insert("hot".to_string(), Value::Bool(hot));
                store.create("Flagged", fields, false)?;
            }
            Ok(())
        })
        .unwrap();

    let hot = store
        .objects("Flagged")
        .unwrap()
        .filtered(&todostore_core::Predicate::parse("hot == true").unwrap())
        .unwrap();
    assert_eq!(hot.len().unwrap(), 2);

    let removed = store.write(|| store.delete_results(&hot)).unwrap();
    assert_eq!(removed, 2);
    assert!(hot.is_empty().unwrap());
    assert_eq!(count(&store, "Flagged"), 1);
}

#[test]
fn cyclic_child_models_fail_construction() {
    static LOOP_A: ModelSchema =
        ModelSchema::new("LoopA", &[Property::string("name")]).with_child_models(&["LoopB"]);
    static LOOP_B: ModelSchema =
        ModelSchema::new("LoopB", &[Property::string("name")]).with_child_models(&["LoopA"]);

    let err = ObjectStore::open(StoreConfig::new().schema(&[&LOOP_A, &LOOP_B]))
        .err()
        .unwrap();
    assert!(matches!(err, StoreError::Initialization(message) if message.contains("cycle")));
}
