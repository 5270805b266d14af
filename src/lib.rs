//! quarry-orm
//!
//! Declarative relational models and versioned schema migrations for
//! PostgreSQL. Models are built at startup from specs and expose CRUD
//! plus lazy relationship accessors (HasMany, BelongsTo, and
//! many-to-many through pivot tables); migrations are reversible,
//! name-ordered, and tracked in a ledger table so re-runs are no-ops.
//!
//! All store access goes through the [`store::Store`] seam. Production
//! code runs over [`store::PgStore`]; the test suite runs over
//! [`store::MemoryStore`].

pub mod error;
pub mod model;
pub mod schema;
pub mod store;

pub use error::{QuarryError, Result};
pub use model::{Model, ModelRegistry, ModelSpec, Relation};
pub use schema::{
    ColumnDefinition, DataType, DefaultValue, ForeignKeySpec, Migration, Migrator, OnUpdate,
    PrimaryKeySpec, ReferentialAction, SchemaBuilder,
};
pub use store::{MemoryStore, Payload, PgStore, Row, Store, StoreConfig, Value, WriteStatus};
