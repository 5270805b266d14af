//! Model CRUD and mass-assignment filtering over the in-memory store.

use chrono::{TimeZone, Utc};
use quarry_orm::{
    ColumnDefinition, DataType, DefaultValue, MemoryStore, Model, ModelRegistry, ModelSpec,
    OnUpdate, Payload, PrimaryKeySpec, SchemaBuilder, Store, Value,
};
use std::sync::Arc;

fn payload(pairs: &[(&str, Value)]) -> Payload {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

async fn setup() -> (Arc<MemoryStore>, Model) {
    let store = Arc::new(MemoryStore::new());

    let builder = SchemaBuilder::new(&*store);
    builder
        .create(
            "users",
            &[
                ColumnDefinition::new("id", DataType::BigInt)
                    .unsigned()
                    .auto_increment()
                    .required(),
                ColumnDefinition::new("name", DataType::VarChar(50)).required(),
                ColumnDefinition::new("email", DataType::VarChar(255))
                    .required()
                    .unique(),
                ColumnDefinition::new("password", DataType::VarChar(255)).required(),
                ColumnDefinition::new("active", DataType::Bool)
                    .default_value(DefaultValue::Bool(false)),
                ColumnDefinition::new("updated_at", DataType::Timestamp)
                    .default_value(DefaultValue::CurrentTimestamp)
                    .on_update(OnUpdate::CurrentTimestamp),
            ],
            &PrimaryKeySpec::new(["id"]),
            &[],
        )
        .await
        .unwrap();

    let registry = ModelRegistry::new(store.clone() as Arc<dyn Store>);
    let users = registry
        .make(
            ModelSpec::new("users")
                .columns(["id", "name", "email", "password", "active", "updated_at"])
                .fillable(["name", "email", "password"]),
        )
        .unwrap();

    (store, users)
}

#[tokio::test]
async fn create_persists_only_the_fillable_intersection() {
    let (_store, users) = setup().await;

    let status = users
        .create(payload(&[
            ("id", Value::Int(99)),
            ("name", Value::from("Ada")),
            ("email", Value::from("ada@example.com")),
            ("password", Value::from("secret")),
            ("active", Value::Bool(true)),
            ("is_admin", Value::Bool(true)),
        ]))
        .await
        .unwrap();

    // The id is generated, not the over-posted 99.
    assert_eq!(status.insert_id, Some(1));
    assert_eq!(status.affected_rows, 1);

    let row = users.find(1).await.unwrap().unwrap();
    assert_eq!(row.get("name"), Some(&Value::from("Ada")));
    // Non-fillable keys were dropped: active kept its column default and
    // the unknown key never reached the store.
    assert_eq!(row.get("active"), Some(&Value::Bool(false)));
    assert!(!row.contains_key("is_admin"));
}

#[tokio::test]
async fn update_ignores_keys_outside_fillable() {
    let (_store, users) = setup().await;

    users
        .create(payload(&[
            ("name", Value::from("Ada")),
            ("email", Value::from("ada@example.com")),
            ("password", Value::from("secret")),
        ]))
        .await
        .unwrap();

    let status = users
        .update(
            1,
            payload(&[
                ("email", Value::from("lovelace@example.com")),
                ("id", Value::Int(42)),
                ("active", Value::Bool(true)),
            ]),
        )
        .await
        .unwrap();
    assert_eq!(status.affected_rows, 1);
    assert_eq!(status.changed_rows, 1);

    let row = users.find(1).await.unwrap().unwrap();
    assert_eq!(row.get("email"), Some(&Value::from("lovelace@example.com")));
    assert_eq!(row.get("id"), Some(&Value::Int(1)));
    assert_eq!(row.get("active"), Some(&Value::Bool(false)));
}

#[tokio::test]
async fn update_with_nothing_fillable_is_a_noop() {
    let (store, users) = setup().await;

    users
        .create(payload(&[
            ("name", Value::from("Ada")),
            ("email", Value::from("ada@example.com")),
            ("password", Value::from("secret")),
        ]))
        .await
        .unwrap();

    let statements_before = store.statement_log().len();
    let status = users
        .update(1, payload(&[("active", Value::Bool(true))]))
        .await
        .unwrap();

    assert_eq!(status.affected_rows, 0);
    // Nothing fillable survived, so no statement was issued at all.
    assert_eq!(store.statement_log().len(), statements_before);
}

#[tokio::test]
async fn find_missing_row_returns_none() {
    let (_store, users) = setup().await;
    assert!(users.find(12345).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_removes_the_row() {
    let (_store, users) = setup().await;

    users
        .create(payload(&[
            ("name", Value::from("Ada")),
            ("email", Value::from("ada@example.com")),
            ("password", Value::from("secret")),
        ]))
        .await
        .unwrap();

    let status = users.delete(1).await.unwrap();
    assert_eq!(status.affected_rows, 1);
    assert!(users.find(1).await.unwrap().is_none());

    // Deleting again affects nothing and is not an error.
    let status = users.delete(1).await.unwrap();
    assert_eq!(status.affected_rows, 0);
}

#[tokio::test]
async fn insert_ids_are_sequential() {
    let (_store, users) = setup().await;

    for (i, email) in ["a@example.com", "b@example.com"].iter().enumerate() {
        let status = users
            .create(payload(&[
                ("name", Value::from("User")),
                ("email", Value::from(*email)),
                ("password", Value::from("secret")),
            ]))
            .await
            .unwrap();
        assert_eq!(status.insert_id, Some(i as i64 + 1));
    }
}

#[tokio::test]
async fn all_returns_rows_in_insertion_order() {
    let (_store, users) = setup().await;

    for email in ["a@example.com", "b@example.com", "c@example.com"] {
        users
            .create(payload(&[
                ("name", Value::from("User")),
                ("email", Value::from(email)),
                ("password", Value::from("secret")),
            ]))
            .await
            .unwrap();
    }

    let rows = users.all().await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("email"), Some(&Value::from("a@example.com")));
    assert_eq!(rows[2].get("email"), Some(&Value::from("c@example.com")));
}

#[tokio::test]
async fn updates_refresh_on_update_columns() {
    let (store, users) = setup().await;

    // Seed with a fixed, old timestamp so the refresh is observable.
    let epoch = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    store
        .execute(
            "INSERT INTO \"users\" (\"name\", \"email\", \"password\", \"updated_at\") \
             VALUES ($1, $2, $3, $4) RETURNING \"id\"",
            &[
                Value::from("Ada"),
                Value::from("ada@example.com"),
                Value::from("secret"),
                Value::Timestamp(epoch),
            ],
        )
        .await
        .unwrap();

    users
        .update(1, payload(&[("name", Value::from("Lovelace"))]))
        .await
        .unwrap();

    let row = users.find(1).await.unwrap().unwrap();
    match row.get("updated_at") {
        Some(Value::Timestamp(t)) => assert!(*t > epoch),
        other => panic!("expected refreshed timestamp, got {:?}", other),
    }
}

#[tokio::test]
async fn duplicate_unique_values_surface_as_store_errors() {
    let (_store, users) = setup().await;

    let make = payload(&[
        ("name", Value::from("Ada")),
        ("email", Value::from("ada@example.com")),
        ("password", Value::from("secret")),
    ]);
    users.create(make.clone()).await.unwrap();
    let err = users.create(make).await.unwrap_err();
    assert!(err.to_string().contains("duplicate key"));
}
