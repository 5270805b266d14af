//! Declarative model specs.
//!
//! A spec names a table, its full column set, the fillable subset
//! writable through mass assignment, and the model's relationships. The
//! registry turns a spec into a runtime model after validating it; the
//! spec itself carries no behavior. Specs serialize cleanly, so they can
//! also be loaded from configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub table: String,
    /// Primary-key column, `id` unless overridden.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub fillable: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<Relation>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl ModelSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: default_primary_key(),
            columns: Vec::new(),
            fillable: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn fillable<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fillable = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn relationship(mut self, relation: Relation) -> Self {
        self.relationships.push(relation);
        self
    }
}

/// A relationship between two registered models, one variant per kind.
///
/// `related` references the other model by table name; it must already
/// be registered when the owning spec is validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Relation {
    /// Rows of `related` whose `foreign_key` column points at the
    /// owner's primary key.
    HasMany {
        name: String,
        related: String,
        foreign_key: String,
        #[serde(default)]
        order_by: Option<String>,
    },
    /// The single `related` row whose primary key the owner's
    /// `foreign_key` column points at.
    BelongsTo {
        name: String,
        related: String,
        foreign_key: String,
    },
    /// Many-to-many through `pivot_table`, whose rows pair an
    /// `owner_key` value with an `asset_key` value.
    Pivot {
        name: String,
        related: String,
        pivot_table: String,
        owner_key: String,
        asset_key: String,
    },
}

impl Relation {
    pub fn has_many(
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Relation::HasMany {
            name: name.into(),
            related: related.into(),
            foreign_key: foreign_key.into(),
            order_by: None,
        }
    }

    pub fn belongs_to(
        name: impl Into<String>,
        related: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Relation::BelongsTo {
            name: name.into(),
            related: related.into(),
            foreign_key: foreign_key.into(),
        }
    }

    pub fn pivot(
        name: impl Into<String>,
        related: impl Into<String>,
        pivot_table: impl Into<String>,
        owner_key: impl Into<String>,
        asset_key: impl Into<String>,
    ) -> Self {
        Relation::Pivot {
            name: name.into(),
            related: related.into(),
            pivot_table: pivot_table.into(),
            owner_key: owner_key.into(),
            asset_key: asset_key.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Relation::HasMany { name, .. }
            | Relation::BelongsTo { name, .. }
            | Relation::Pivot { name, .. } => name,
        }
    }

    pub fn related(&self) -> &str {
        match self {
            Relation::HasMany { related, .. }
            | Relation::BelongsTo { related, .. }
            | Relation::Pivot { related, .. } => related,
        }
    }
}
