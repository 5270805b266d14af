//! Versioned, reversible migrations.
//!
//! A migration is identified by a unique, totally ordered name
//! (timestamp-prefixed by convention). The [`Migrator`] owns an explicit
//! ordered collection handed in by the caller, applies pending
//! migrations in ascending name order, and records each one in the
//! ledger table with a batch number. Re-running an already-applied set
//! changes no schema state; `rollback` reverses the most recent batch.
//!
//! Failure semantics: the first DDL failure aborts the remaining batch.
//! Migrations applied before the failure stay recorded.

use crate::error::{QuarryError, Result};
use crate::schema::builder::SchemaBuilder;
use crate::store::{Store, Value};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Ledger of applied migrations.
pub const LEDGER_TABLE: &str = "_quarry_migrations";

/// One reversible schema change.
///
/// `down` must be the structural inverse of `up`; that contract is
/// reviewed, not enforced at runtime.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique, totally ordered identity.
    fn name(&self) -> &str;

    /// Table this migration targets.
    fn table(&self) -> &str;

    async fn up(&self, schema: &SchemaBuilder<'_>) -> Result<()>;

    async fn down(&self, schema: &SchemaBuilder<'_>) -> Result<()>;
}

pub struct Migrator {
    store: Arc<dyn Store>,
}

impl Migrator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Apply every pending migration in ascending name order.
    ///
    /// Returns the number of migrations applied in this batch.
    pub async fn run(&self, migrations: &[&dyn Migration]) -> Result<usize> {
        self.ensure_ledger().await?;
        check_unique_names(migrations)?;

        let mut ordered: Vec<&dyn Migration> = migrations.to_vec();
        ordered.sort_by(|a, b| a.name().cmp(b.name()));

        let ledger = self.ledger_rows().await?;
        let applied: HashSet<&str> = ledger.iter().map(|(name, _)| name.as_str()).collect();
        let batch = ledger.iter().map(|(_, b)| *b).max().unwrap_or(0) + 1;

        let builder = SchemaBuilder::new(&*self.store);
        let mut count = 0;

        for migration in ordered {
            if applied.contains(migration.name()) {
                debug!("skipping already applied migration {}", migration.name());
                continue;
            }

            info!("applying migration {}", migration.name());
            migration.up(&builder).await?;
            self.record(migration.name(), batch).await?;
            count += 1;
        }

        info!("migration run complete: {} applied", count);
        Ok(count)
    }

    /// Revert the most recently applied batch, newest name first.
    ///
    /// Returns the number of migrations rolled back.
    pub async fn rollback(&self, migrations: &[&dyn Migration]) -> Result<usize> {
        self.ensure_ledger().await?;

        let ledger = self.ledger_rows().await?;
        let latest = match ledger.iter().map(|(_, b)| *b).max() {
            Some(batch) => batch,
            None => return Ok(0),
        };

        let mut names: Vec<String> = ledger
            .into_iter()
            .filter(|(_, b)| *b == latest)
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names.reverse();

        let builder = SchemaBuilder::new(&*self.store);
        let mut count = 0;

        for name in names {
            let migration = migrations
                .iter()
                .find(|m| m.name() == name)
                .ok_or_else(|| {
                    QuarryError::schema(
                        LEDGER_TABLE,
                        format!("applied migration {:?} is not registered with the runner", name),
                    )
                })?;

            info!("rolling back migration {}", name);
            migration.down(&builder).await?;
            self.store
                .execute(
                    &format!("DELETE FROM \"{}\" WHERE \"name\" = $1", LEDGER_TABLE),
                    &[Value::Text(name)],
                )
                .await?;
            count += 1;
        }

        Ok(count)
    }

    /// Names of applied migrations, in application order.
    pub async fn applied(&self) -> Result<Vec<String>> {
        self.ensure_ledger().await?;
        Ok(self
            .ledger_rows()
            .await?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    async fn ensure_ledger(&self) -> Result<()> {
        self.store
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (\
                 \"id\" BIGSERIAL NOT NULL, \
                 \"name\" TEXT NOT NULL UNIQUE, \
                 \"batch\" BIGINT NOT NULL, \
                 \"applied_at\" TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP, \
                 PRIMARY KEY (\"id\"))",
                LEDGER_TABLE
            ))
            .await
    }

    async fn ledger_rows(&self) -> Result<Vec<(String, i64)>> {
        let rows = self
            .store
            .query(
                &format!("SELECT * FROM \"{}\" ORDER BY \"id\" ASC", LEDGER_TABLE),
                &[],
            )
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let name = row.get("name")?.as_text()?.to_string();
                let batch = row.get("batch")?.as_int()?;
                Some((name, batch))
            })
            .collect())
    }

    async fn record(&self, name: &str, batch: i64) -> Result<()> {
        self.store
            .execute(
                &format!(
                    "INSERT INTO \"{}\" (\"name\", \"batch\") VALUES ($1, $2) RETURNING \"id\"",
                    LEDGER_TABLE
                ),
                &[Value::Text(name.to_string()), Value::Int(batch)],
            )
            .await?;
        Ok(())
    }
}

fn check_unique_names(migrations: &[&dyn Migration]) -> Result<()> {
    let mut seen = HashSet::new();
    for migration in migrations {
        if !seen.insert(migration.name()) {
            return Err(QuarryError::schema(
                migration.table(),
                format!("duplicate migration name: {:?}", migration.name()),
            ));
        }
    }
    Ok(())
}
