//! Relationship resolution.
//!
//! Two shapes: direct (HasMany, BelongsTo) filters the related table by
//! one key; pivot-mediated first reads the pivot table for the owner's
//! key pairs, then fetches the related rows whose primary key appears in
//! that set. Pivot rows pointing at rows that no longer exist are
//! skipped, and results follow pivot-row fetch order.

use crate::error::{QuarryError, Result};
use crate::model::registry::{ModelDefinition, RegistryInner};
use crate::model::spec::Relation;
use crate::store::{Row, Value};
use tracing::debug;

pub(crate) async fn resolve(
    inner: &RegistryInner,
    def: &ModelDefinition,
    owner: &Row,
    relation: &Relation,
) -> Result<Vec<Row>> {
    match relation {
        Relation::HasMany {
            name,
            related,
            foreign_key,
            order_by,
        } => {
            let owner_id = owner_key_value(def, owner, name)?;
            let mut sql = format!(
                "SELECT * FROM \"{}\" WHERE \"{}\" = $1",
                related, foreign_key
            );
            if let Some(order_by) = order_by {
                sql.push_str(&format!(" ORDER BY \"{}\" ASC", order_by));
            }
            inner.store.query(&sql, &[owner_id]).await
        }

        Relation::BelongsTo {
            name,
            related,
            foreign_key,
        } => {
            let fk_value = match owner.get(foreign_key) {
                Some(value) => value.clone(),
                None => {
                    return Err(QuarryError::relation(
                        &def.table,
                        name,
                        format!("owner row is missing column {:?}", foreign_key),
                    ))
                }
            };
            if fk_value.is_null() {
                return Ok(Vec::new());
            }

            let related_pk = related_primary_key(inner, def, name, related)?;
            let sql = format!(
                "SELECT * FROM \"{}\" WHERE \"{}\" = $1 LIMIT 1",
                related, related_pk
            );
            inner.store.query(&sql, &[fk_value]).await
        }

        Relation::Pivot {
            name,
            related,
            pivot_table,
            owner_key,
            asset_key,
        } => {
            let owner_id = owner_key_value(def, owner, name)?;

            let pivot_sql = format!(
                "SELECT * FROM \"{}\" WHERE \"{}\" = $1",
                pivot_table, owner_key
            );
            let pivot_rows = inner.store.query(&pivot_sql, &[owner_id]).await?;

            let assets: Vec<Value> = pivot_rows
                .iter()
                .filter_map(|row| row.get(asset_key))
                .filter(|v| !v.is_null())
                .cloned()
                .collect();
            if assets.is_empty() {
                return Ok(Vec::new());
            }

            let related_pk = related_primary_key(inner, def, name, related)?;
            let placeholders: Vec<String> =
                (1..=assets.len()).map(|n| format!("${}", n)).collect();
            let related_sql = format!(
                "SELECT * FROM \"{}\" WHERE \"{}\" IN ({})",
                related,
                related_pk,
                placeholders.join(", ")
            );
            let fetched = inner.store.query(&related_sql, &assets).await?;

            // Reorder to pivot fetch order; assets with no surviving
            // related row drop out here.
            let mut results = Vec::with_capacity(assets.len());
            for asset in &assets {
                if let Some(row) = fetched
                    .iter()
                    .find(|r| r.get(&related_pk) == Some(asset))
                {
                    results.push(row.clone());
                } else {
                    debug!(
                        "pivot row in {} points at missing {} row",
                        pivot_table, related
                    );
                }
            }
            Ok(results)
        }
    }
}

fn owner_key_value(def: &ModelDefinition, owner: &Row, relation: &str) -> Result<Value> {
    match owner.get(&def.primary_key) {
        Some(value) if !value.is_null() => Ok(value.clone()),
        _ => Err(QuarryError::relation(
            &def.table,
            relation,
            format!(
                "owner row is missing primary key column {:?}",
                def.primary_key
            ),
        )),
    }
}

/// Primary key of the related model, via the registry. Self-references
/// resolve against the owning definition.
fn related_primary_key(
    inner: &RegistryInner,
    def: &ModelDefinition,
    relation: &str,
    related: &str,
) -> Result<String> {
    if related == def.table {
        return Ok(def.primary_key.clone());
    }
    inner
        .models
        .get(related)
        .map(|d| d.primary_key.clone())
        .ok_or_else(|| {
            QuarryError::relation(
                &def.table,
                relation,
                format!("related model {:?} is not registered", related),
            )
        })
}
