//! Relationship resolution over the in-memory store.

use quarry_orm::{
    ColumnDefinition, DataType, ForeignKeySpec, MemoryStore, Model, ModelRegistry, ModelSpec,
    Payload, PrimaryKeySpec, QuarryError, Relation, ReferentialAction, Row, SchemaBuilder, Store,
    Value,
};
use std::sync::Arc;

fn payload(pairs: &[(&str, Value)]) -> Payload {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

struct Fixture {
    store: Arc<MemoryStore>,
    users: Model,
    posts: Model,
    roles: Model,
}

async fn setup() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let builder = SchemaBuilder::new(&*store);

    let id = || {
        ColumnDefinition::new("id", DataType::BigInt)
            .unsigned()
            .auto_increment()
            .required()
    };

    builder
        .create(
            "users",
            &[id(), ColumnDefinition::new("name", DataType::VarChar(50)).required()],
            &PrimaryKeySpec::new(["id"]),
            &[],
        )
        .await
        .unwrap();

    builder
        .create(
            "posts",
            &[
                id(),
                ColumnDefinition::new("user_id", DataType::BigInt).unsigned().required(),
                ColumnDefinition::new("title", DataType::VarChar(255)).required(),
            ],
            &PrimaryKeySpec::new(["id"]),
            &[ForeignKeySpec::new("user_id", "users", "id")
                .on_delete(ReferentialAction::Cascade)],
        )
        .await
        .unwrap();

    builder
        .create(
            "roles",
            &[id(), ColumnDefinition::new("title", DataType::VarChar(50)).required()],
            &PrimaryKeySpec::new(["id"]),
            &[],
        )
        .await
        .unwrap();

    builder
        .create(
            "roles_users",
            &[
                ColumnDefinition::new("user_id", DataType::BigInt).unsigned().required(),
                ColumnDefinition::new("role_id", DataType::BigInt).unsigned().required(),
            ],
            &PrimaryKeySpec { columns: vec![] },
            &[
                ForeignKeySpec::new("user_id", "users", "id"),
                ForeignKeySpec::new("role_id", "roles", "id"),
            ],
        )
        .await
        .unwrap();

    let registry = ModelRegistry::new(store.clone() as Arc<dyn Store>);

    let posts = registry
        .make(
            ModelSpec::new("posts")
                .columns(["id", "user_id", "title"])
                .fillable(["user_id", "title"]),
        )
        .unwrap();
    let roles = registry
        .make(
            ModelSpec::new("roles")
                .columns(["id", "title"])
                .fillable(["title"]),
        )
        .unwrap();
    let users = registry
        .make(
            ModelSpec::new("users")
                .columns(["id", "name"])
                .fillable(["name"])
                .relationship(Relation::has_many("posts", "posts", "user_id"))
                .relationship(Relation::pivot(
                    "roles",
                    "roles",
                    "roles_users",
                    "user_id",
                    "role_id",
                )),
        )
        .unwrap();

    Fixture {
        store,
        users,
        posts,
        roles,
    }
}

async fn create_user(fixture: &Fixture, name: &str) -> Row {
    let status = fixture
        .users
        .create(payload(&[("name", Value::from(name))]))
        .await
        .unwrap();
    fixture
        .users
        .find(status.insert_id.unwrap())
        .await
        .unwrap()
        .unwrap()
}

async fn attach_role(fixture: &Fixture, user_id: i64, role_id: i64) {
    fixture
        .store
        .execute(
            "INSERT INTO \"roles_users\" (\"user_id\", \"role_id\") VALUES ($1, $2)",
            &[Value::Int(user_id), Value::Int(role_id)],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn has_many_returns_matching_rows_in_insertion_order() {
    let fixture = setup().await;
    let owner = create_user(&fixture, "Ada").await;
    let other = create_user(&fixture, "Grace").await;

    for (user, title) in [(&owner, "first"), (&owner, "second"), (&other, "theirs")] {
        fixture
            .posts
            .create(payload(&[
                ("user_id", user.get("id").cloned().unwrap()),
                ("title", Value::from(title)),
            ]))
            .await
            .unwrap();
    }

    let related = fixture.users.related(&owner, "posts").await.unwrap();
    assert_eq!(related.len(), 2);
    assert_eq!(related[0].get("title"), Some(&Value::from("first")));
    assert_eq!(related[1].get("title"), Some(&Value::from("second")));
}

#[tokio::test]
async fn has_many_with_no_rows_is_empty_not_an_error() {
    let fixture = setup().await;
    let owner = create_user(&fixture, "Ada").await;

    let related = fixture.users.related(&owner, "posts").await.unwrap();
    assert!(related.is_empty());
}

#[tokio::test]
async fn pivot_returns_exactly_the_attached_rows() {
    let fixture = setup().await;
    let owner = create_user(&fixture, "Ada").await;

    for title in ["admin", "editor"] {
        fixture
            .roles
            .create(payload(&[("title", Value::from(title))]))
            .await
            .unwrap();
    }
    attach_role(&fixture, 1, 1).await;
    attach_role(&fixture, 1, 2).await;

    let related = fixture.users.related(&owner, "roles").await.unwrap();
    assert_eq!(related.len(), 2);
    assert_eq!(related[0].get("title"), Some(&Value::from("admin")));
    assert_eq!(related[1].get("title"), Some(&Value::from("editor")));
}

#[tokio::test]
async fn pivot_skips_dangling_rows_silently() {
    let fixture = setup().await;
    let owner = create_user(&fixture, "Ada").await;

    for title in ["admin", "editor"] {
        fixture
            .roles
            .create(payload(&[("title", Value::from(title))]))
            .await
            .unwrap();
    }
    attach_role(&fixture, 1, 1).await;
    attach_role(&fixture, 1, 2).await;

    // The pivot row for role 2 now dangles.
    fixture.roles.delete(2).await.unwrap();

    let related = fixture.users.related(&owner, "roles").await.unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].get("title"), Some(&Value::from("admin")));
}

#[tokio::test]
async fn pivot_results_follow_pivot_row_order() {
    let fixture = setup().await;
    let owner = create_user(&fixture, "Ada").await;

    for title in ["admin", "editor"] {
        fixture
            .roles
            .create(payload(&[("title", Value::from(title))]))
            .await
            .unwrap();
    }
    attach_role(&fixture, 1, 2).await;
    attach_role(&fixture, 1, 1).await;

    let related = fixture.users.related(&owner, "roles").await.unwrap();
    assert_eq!(related[0].get("title"), Some(&Value::from("editor")));
    assert_eq!(related[1].get("title"), Some(&Value::from("admin")));
}

#[tokio::test]
async fn pivot_with_no_rows_is_empty() {
    let fixture = setup().await;
    let owner = create_user(&fixture, "Ada").await;

    let related = fixture.users.related(&owner, "roles").await.unwrap();
    assert!(related.is_empty());
}

#[tokio::test]
async fn belongs_to_resolves_through_the_owning_foreign_key() {
    let store = Arc::new(MemoryStore::new());
    let builder = SchemaBuilder::new(&*store);

    builder
        .create(
            "statuses",
            &[
                ColumnDefinition::new("id", DataType::BigInt)
                    .auto_increment()
                    .required(),
                ColumnDefinition::new("label", DataType::VarChar(50)).required(),
            ],
            &PrimaryKeySpec::new(["id"]),
            &[],
        )
        .await
        .unwrap();
    builder
        .create(
            "orders",
            &[
                ColumnDefinition::new("id", DataType::BigInt)
                    .auto_increment()
                    .required(),
                ColumnDefinition::new("status_id", DataType::BigInt),
            ],
            &PrimaryKeySpec::new(["id"]),
            &[ForeignKeySpec::new("status_id", "statuses", "id")],
        )
        .await
        .unwrap();

    let registry = ModelRegistry::new(store.clone() as Arc<dyn Store>);
    let statuses = registry
        .make(
            ModelSpec::new("statuses")
                .columns(["id", "label"])
                .fillable(["label"]),
        )
        .unwrap();
    let orders = registry
        .make(
            ModelSpec::new("orders")
                .columns(["id", "status_id"])
                .fillable(["status_id"])
                .relationship(Relation::belongs_to("status", "statuses", "status_id")),
        )
        .unwrap();

    statuses
        .create(payload(&[("label", Value::from("shipped"))]))
        .await
        .unwrap();
    orders
        .create(payload(&[("status_id", Value::Int(1))]))
        .await
        .unwrap();
    // An order with no status: the foreign key stays NULL.
    orders.create(Payload::new()).await.unwrap();

    let with_status = orders.find(1).await.unwrap().unwrap();
    let status = orders
        .related_one(&with_status, "status")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.get("label"), Some(&Value::from("shipped")));

    let without_status = orders.find(2).await.unwrap().unwrap();
    let none = orders
        .related_one(&without_status, "status")
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn unknown_relationship_name_is_a_resolution_error() {
    let fixture = setup().await;
    let owner = create_user(&fixture, "Ada").await;

    let err = fixture
        .users
        .related(&owner, "followers")
        .await
        .unwrap_err();
    assert!(matches!(err, QuarryError::RelationResolution { .. }));
}

#[tokio::test]
async fn owner_row_without_its_key_is_a_resolution_error() {
    let fixture = setup().await;

    let err = fixture
        .users
        .related(&Row::new(), "posts")
        .await
        .unwrap_err();
    assert!(matches!(err, QuarryError::RelationResolution { .. }));
}

#[tokio::test]
async fn resolution_is_lazy_until_the_accessor_is_called() {
    let fixture = setup().await;
    let owner = create_user(&fixture, "Ada").await;

    let touched_posts = |log: &[String]| log.iter().any(|s| s.contains("FROM \"posts\""));
    assert!(
        !touched_posts(&fixture.store.statement_log()),
        "loading the owner must not query the related table"
    );

    fixture.users.related(&owner, "posts").await.unwrap();
    assert!(touched_posts(&fixture.store.statement_log()));
}
