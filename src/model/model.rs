//! Runtime model handle.
//!
//! CRUD by primary key plus one accessor per declared relationship.
//! Write payloads are intersected with the fillable set before anything
//! reaches the store: keys outside fillable are dropped silently, never
//! errored, whatever the caller supplies. Relationship queries run only
//! when an accessor is called.

use crate::error::{QuarryError, Result};
use crate::model::registry::{ModelDefinition, RegistryInner};
use crate::model::relation;
use crate::store::{Payload, Row, Value, WriteStatus};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct Model {
    def: Arc<ModelDefinition>,
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("table", &self.def.table)
            .finish_non_exhaustive()
    }
}

impl Model {
    pub(crate) fn new(def: Arc<ModelDefinition>, inner: Arc<RegistryInner>) -> Self {
        Self { def, inner }
    }

    pub fn table(&self) -> &str {
        &self.def.table
    }

    pub fn definition(&self) -> &ModelDefinition {
        &self.def
    }

    /// Fetch the row with the given primary-key value.
    pub async fn find(&self, id: impl Into<Value>) -> Result<Option<Row>> {
        let sql = format!(
            "SELECT * FROM \"{}\" WHERE \"{}\" = $1 LIMIT 1",
            self.def.table, self.def.primary_key
        );
        let rows = self.inner.store.query(&sql, &[id.into()]).await?;
        Ok(rows.into_iter().next())
    }

    /// Fetch every row, in store order.
    pub async fn all(&self) -> Result<Vec<Row>> {
        let sql = format!("SELECT * FROM \"{}\"", self.def.table);
        self.inner.store.query(&sql, &[]).await
    }

    /// Insert a row from the fillable intersection of `payload`.
    pub async fn create(&self, payload: Payload) -> Result<WriteStatus> {
        let filtered = self.filter_fillable(payload);

        if filtered.is_empty() {
            let sql = format!(
                "INSERT INTO \"{}\" DEFAULT VALUES RETURNING \"{}\"",
                self.def.table, self.def.primary_key
            );
            return self.inner.store.execute(&sql, &[]).await;
        }

        let columns: Vec<String> = filtered.keys().map(|k| format!("\"{}\"", k)).collect();
        let placeholders: Vec<String> =
            (1..=filtered.len()).map(|n| format!("${}", n)).collect();
        let params: Vec<Value> = filtered.into_values().collect();

        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({}) RETURNING \"{}\"",
            self.def.table,
            columns.join(", "),
            placeholders.join(", "),
            self.def.primary_key
        );
        self.inner.store.execute(&sql, &params).await
    }

    /// Update the row with the given primary-key value from the fillable
    /// intersection of `payload`. A payload with nothing fillable is a
    /// no-op, not an error.
    pub async fn update(&self, id: impl Into<Value>, payload: Payload) -> Result<WriteStatus> {
        let filtered = self.filter_fillable(payload);

        if filtered.is_empty() {
            debug!("update on {} carried no fillable keys", self.def.table);
            return Ok(WriteStatus::default());
        }

        let assignments: Vec<String> = filtered
            .keys()
            .enumerate()
            .map(|(i, k)| format!("\"{}\" = ${}", k, i + 1))
            .collect();
        let mut params: Vec<Value> = filtered.into_values().collect();
        let id_placeholder = params.len() + 1;
        params.push(id.into());

        let sql = format!(
            "UPDATE \"{}\" SET {} WHERE \"{}\" = ${}",
            self.def.table,
            assignments.join(", "),
            self.def.primary_key,
            id_placeholder
        );
        self.inner.store.execute(&sql, &params).await
    }

    /// Delete the row with the given primary-key value.
    pub async fn delete(&self, id: impl Into<Value>) -> Result<WriteStatus> {
        let sql = format!(
            "DELETE FROM \"{}\" WHERE \"{}\" = $1",
            self.def.table, self.def.primary_key
        );
        self.inner.store.execute(&sql, &[id.into()]).await
    }

    /// Resolve the named relationship for `owner`.
    ///
    /// HasMany and Pivot yield any number of rows; BelongsTo yields at
    /// most one. Zero matches are an empty result, not an error.
    pub async fn related(&self, owner: &Row, name: &str) -> Result<Vec<Row>> {
        let relation = self.def.relationship(name).ok_or_else(|| {
            QuarryError::relation(&self.def.table, name, "relationship is not declared")
        })?;
        relation::resolve(&self.inner, &self.def, owner, relation).await
    }

    /// Like [`related`](Self::related), returning the first row.
    pub async fn related_one(&self, owner: &Row, name: &str) -> Result<Option<Row>> {
        Ok(self.related(owner, name).await?.into_iter().next())
    }

    fn filter_fillable(&self, payload: Payload) -> Payload {
        let before = payload.len();
        let filtered: Payload = payload
            .into_iter()
            .filter(|(key, _)| self.def.is_fillable(key))
            .collect();

        if filtered.len() < before {
            debug!(
                "dropped {} non-fillable key(s) from {} payload",
                before - filtered.len(),
                self.def.table
            );
        }
        filtered
    }
}
