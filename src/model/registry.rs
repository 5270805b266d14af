//! Model registry.
//!
//! Validates declarative specs and turns them into runtime models. All
//! validation happens here, before any query runs; a model that exists
//! is a model whose spec was well-formed. Definitions are immutable once
//! constructed and shared behind `Arc`.

use crate::error::{QuarryError, Result};
use crate::model::model::Model;
use crate::model::spec::{ModelSpec, Relation};
use crate::schema::is_valid_identifier;
use crate::store::Store;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Immutable runtime description of one model.
#[derive(Debug)]
pub struct ModelDefinition {
    pub table: String,
    pub primary_key: String,
    pub columns: Vec<String>,
    pub fillable: Vec<String>,
    pub relationships: Vec<Relation>,
}

impl ModelDefinition {
    pub fn relationship(&self, name: &str) -> Option<&Relation> {
        self.relationships.iter().find(|r| r.name() == name)
    }

    pub fn is_fillable(&self, column: &str) -> bool {
        self.fillable.iter().any(|c| c == column)
    }
}

pub(crate) struct RegistryInner {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) models: DashMap<String, Arc<ModelDefinition>>,
}

/// Registry of model definitions, keyed by table name.
#[derive(Clone)]
pub struct ModelRegistry {
    inner: Arc<RegistryInner>,
}

impl ModelRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                store,
                models: DashMap::new(),
            }),
        }
    }

    /// Validate `spec` and register the resulting model.
    ///
    /// Specs must arrive in dependency order: every relationship's
    /// `related` model has to be registered already (self-references are
    /// allowed). Malformed specs fail here, before any query runs.
    pub fn make(&self, spec: ModelSpec) -> Result<Model> {
        self.validate(&spec)?;

        let definition = Arc::new(ModelDefinition {
            table: spec.table.clone(),
            primary_key: spec.primary_key,
            columns: spec.columns,
            fillable: spec.fillable,
            relationships: spec.relationships,
        });

        self.inner
            .models
            .insert(spec.table.clone(), definition.clone());
        info!("registered model {}", spec.table);

        Ok(Model::new(definition, self.inner.clone()))
    }

    /// Fetch a previously registered model.
    pub fn model(&self, table: &str) -> Option<Model> {
        self.inner
            .models
            .get(table)
            .map(|def| Model::new(def.clone(), self.inner.clone()))
    }

    fn validate(&self, spec: &ModelSpec) -> Result<()> {
        let table = spec.table.as_str();
        let fail = |cause: String| Err(QuarryError::configuration(table, cause));

        if !is_valid_identifier(table) {
            return fail(format!("invalid table name: {:?}", table));
        }
        if self.inner.models.contains_key(table) {
            return fail("table already registered".to_string());
        }
        if spec.columns.is_empty() {
            return fail("model has no columns".to_string());
        }

        let mut seen = HashSet::new();
        for column in &spec.columns {
            if !is_valid_identifier(column) {
                return fail(format!("invalid column name: {:?}", column));
            }
            if !seen.insert(column.as_str()) {
                return fail(format!("duplicate column: {:?}", column));
            }
        }

        if !spec.columns.contains(&spec.primary_key) {
            return fail(format!(
                "primary key {:?} is not a declared column",
                spec.primary_key
            ));
        }

        for column in &spec.fillable {
            if !spec.columns.contains(column) {
                return fail(format!(
                    "fillable column {:?} is not a declared column",
                    column
                ));
            }
        }

        let mut relation_names = HashSet::new();
        for relation in &spec.relationships {
            if relation.name().is_empty() {
                return fail("relationship with empty name".to_string());
            }
            if !relation_names.insert(relation.name()) {
                return fail(format!(
                    "duplicate relationship name: {:?}",
                    relation.name()
                ));
            }
            self.validate_relation(spec, relation)?;
        }

        Ok(())
    }

    fn validate_relation(&self, spec: &ModelSpec, relation: &Relation) -> Result<()> {
        let table = spec.table.as_str();
        let fail = |cause: String| Err(QuarryError::configuration(table, cause));

        // Self-references resolve against the spec being validated.
        let related_lookup = |related: &str| -> Option<(Vec<String>, String)> {
            if related == spec.table {
                Some((spec.columns.clone(), spec.primary_key.clone()))
            } else {
                self.inner
                    .models
                    .get(related)
                    .map(|def| (def.columns.clone(), def.primary_key.clone()))
            }
        };

        let (related_columns, related_pk) = match related_lookup(relation.related()) {
            Some(found) => found,
            None => {
                return fail(format!(
                    "relationship {:?} references undefined model {:?}",
                    relation.name(),
                    relation.related()
                ))
            }
        };

        match relation {
            Relation::HasMany {
                name,
                foreign_key,
                order_by,
                ..
            } => {
                if !related_columns.contains(foreign_key) {
                    return fail(format!(
                        "relationship {:?}: foreign key {:?} is not a column of {:?}",
                        name,
                        foreign_key,
                        relation.related()
                    ));
                }
                if let Some(order_by) = order_by {
                    if !related_columns.contains(order_by) {
                        return fail(format!(
                            "relationship {:?}: order column {:?} is not a column of {:?}",
                            name,
                            order_by,
                            relation.related()
                        ));
                    }
                }
            }
            Relation::BelongsTo {
                name, foreign_key, ..
            } => {
                if !spec.columns.contains(foreign_key) {
                    return fail(format!(
                        "relationship {:?}: foreign key {:?} is not a column of {:?}",
                        name, foreign_key, spec.table
                    ));
                }
            }
            Relation::Pivot {
                name,
                pivot_table,
                owner_key,
                asset_key,
                ..
            } => {
                if !is_valid_identifier(pivot_table) {
                    return fail(format!(
                        "relationship {:?}: invalid pivot table {:?}",
                        name, pivot_table
                    ));
                }
                for key in [owner_key, asset_key] {
                    if !is_valid_identifier(key) {
                        return fail(format!(
                            "relationship {:?}: invalid pivot key {:?}",
                            name, key
                        ));
                    }
                }
                if owner_key == asset_key {
                    return fail(format!(
                        "relationship {:?}: owner key and asset key must differ",
                        name
                    ));
                }
                // Pivot keys are pivot-table columns; reusing a primary-key
                // name from either side makes the pair ambiguous.
                if *owner_key == spec.primary_key || *asset_key == related_pk {
                    return fail(format!(
                        "relationship {:?}: pivot keys must differ from both primary keys",
                        name
                    ));
                }
            }
        }

        Ok(())
    }
}
