#![allow(dead_code)]

use todostore_core::{Fields, ModelSchema, ObjectStore, Property, StoreConfig, Value};

pub static TEST_MODEL_1: ModelSchema = ModelSchema::new(
    "TestModel1",
    &[
        Property::string("name"),
        Property::list("models2", "TestModel2"),
        Property::object("model3", "TestModel3"),
    ],
)
.with_primary_key("name")
.with_child_models(&["TestModel2", "TestModel3"]);

pub static TEST_MODEL_2: ModelSchema =
    ModelSchema::new("TestModel2", &[Property::string("name")]).with_primary_key("name");

pub static TEST_MODEL_3: ModelSchema =
    ModelSchema::new("TestModel3", &[Property::string("name")]).with_primary_key("name");

pub static TEST_MODEL_4: ModelSchema =
    ModelSchema::new("TestModel4", &[Property::string("name")]).with_primary_key("name");

pub static TEST_MODELS: &[&ModelSchema] =
    &[&TEST_MODEL_1, &TEST_MODEL_2, &TEST_MODEL_3, &TEST_MODEL_4];

pub fn open_test_store() -> ObjectStore {
    ObjectStore::open(StoreConfig::new().schema(TEST_MODELS)).unwrap()
}

pub fn named(name: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("name".to_string(), Value::from(name));
    fields
}

pub fn count(store: &ObjectStore, model: &str) -> usize {
    store.objects(model).unwrap().len().unwrap()
}

/// Seeds 3 / 1 / 1 / 2 objects into TestModel1..4.
pub fn seed(store: &ObjectStore) {
    store
        .write(|| {
            for name in ["John", "Mary", "Doe"] {
                store.create("TestModel1", named(name), false)?;
            }
            store.create("TestModel2", named("George"), false)?;
            store.create("TestModel3", named("Alex"), false)?;
            store.create("TestModel4", named("Gary"), false)?;
            store.create("TestModel4", named("Jane"), false)?;
            Ok(())
        })
        .unwrap();
}
