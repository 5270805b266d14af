//! DDL rendering and execution.
//!
//! The builder owns the statement shapes of the crate: everything it
//! renders is a single statement executed through the store seam, and
//! every store failure during DDL is reported as a schema error.
//!
//! Policy: creating a table that already exists FAILS. Idempotent
//! re-runs are the migration ledger's job, not the builder's.

use crate::error::{QuarryError, Result};
use crate::schema::column::{ColumnDefinition, ForeignKeySpec, PrimaryKeySpec};
use crate::schema::is_valid_identifier;
use crate::schema::types::OnUpdate;
use crate::store::Store;
use tracing::{debug, info};

pub struct SchemaBuilder<'a> {
    store: &'a dyn Store,
}

impl<'a> SchemaBuilder<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Create `table` with the given columns, primary key, and foreign
    /// keys. Columns flagged for on-update refresh additionally get a
    /// trigger pair installed after the table exists.
    pub async fn create(
        &self,
        table: &str,
        columns: &[ColumnDefinition],
        primary_key: &PrimaryKeySpec,
        foreign_keys: &[ForeignKeySpec],
    ) -> Result<()> {
        let sql = render_create_table(table, columns, primary_key, foreign_keys)?;

        self.store
            .batch_execute(&sql)
            .await
            .map_err(|e| QuarryError::schema(table, e.cause()))?;

        for column in columns {
            if column.on_update == Some(OnUpdate::CurrentTimestamp) {
                self.store
                    .batch_execute(&render_touch_function(&column.name))
                    .await
                    .map_err(|e| QuarryError::schema(table, e.cause()))?;
                self.store
                    .batch_execute(&render_touch_trigger(table, &column.name))
                    .await
                    .map_err(|e| QuarryError::schema(table, e.cause()))?;
            }
        }

        info!("created table {}", table);
        Ok(())
    }

    /// Drop `table` if present. Absence is success.
    pub async fn drop_if_exists(&self, table: &str) -> Result<()> {
        check_identifier(table, table)?;

        self.store
            .batch_execute(&format!("DROP TABLE IF EXISTS \"{}\"", table))
            .await
            .map_err(|e| QuarryError::schema(table, e.cause()))?;

        debug!("dropped table {} (if it existed)", table);
        Ok(())
    }
}

fn check_identifier(table: &str, name: &str) -> Result<()> {
    if !is_valid_identifier(name) {
        return Err(QuarryError::schema(
            table,
            format!("invalid identifier: {:?}", name),
        ));
    }
    Ok(())
}

pub(crate) fn render_create_table(
    table: &str,
    columns: &[ColumnDefinition],
    primary_key: &PrimaryKeySpec,
    foreign_keys: &[ForeignKeySpec],
) -> Result<String> {
    check_identifier(table, table)?;

    if columns.is_empty() {
        return Err(QuarryError::schema(table, "table has no columns"));
    }

    let column_names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let mut items = Vec::with_capacity(columns.len() + 1 + foreign_keys.len());

    for column in columns {
        items.push(render_column(table, column)?);
    }

    if !primary_key.columns.is_empty() {
        for key in &primary_key.columns {
            if !column_names.contains(&key.as_str()) {
                return Err(QuarryError::schema(
                    table,
                    format!("primary key column {:?} is not defined", key),
                ));
            }
        }
        items.push(format!(
            "PRIMARY KEY ({})",
            quote_list(&primary_key.columns)
        ));
    }

    for fk in foreign_keys {
        check_identifier(table, &fk.references_table)?;
        for col in &fk.columns {
            if !column_names.contains(&col.as_str()) {
                return Err(QuarryError::schema(
                    table,
                    format!("foreign key column {:?} is not defined", col),
                ));
            }
        }
        for col in &fk.references_columns {
            check_identifier(table, col)?;
        }
        if fk.columns.len() != fk.references_columns.len() {
            return Err(QuarryError::schema(
                table,
                "foreign key column count does not match referenced columns",
            ));
        }

        let mut clause = format!(
            "FOREIGN KEY ({}) REFERENCES \"{}\" ({})",
            quote_list(&fk.columns),
            fk.references_table,
            quote_list(&fk.references_columns)
        );
        if let Some(keyword) = fk.on_delete.keyword() {
            clause.push_str(&format!(" ON DELETE {}", keyword));
        }
        if let Some(keyword) = fk.on_update.keyword() {
            clause.push_str(&format!(" ON UPDATE {}", keyword));
        }
        items.push(clause);
    }

    Ok(format!(
        "CREATE TABLE \"{}\" ({})",
        table,
        items.join(", ")
    ))
}

fn render_column(table: &str, column: &ColumnDefinition) -> Result<String> {
    check_identifier(table, &column.name)?;

    let declaration = if column.auto_increment {
        column
            .data_type
            .serial_declaration()
            .ok_or_else(|| {
                QuarryError::schema(
                    table,
                    format!(
                        "column {:?} cannot auto-increment: not an integer type",
                        column.name
                    ),
                )
            })?
            .to_string()
    } else {
        column.data_type.declaration()
    };

    if column.unsigned && !column.data_type.is_numeric() {
        return Err(QuarryError::schema(
            table,
            format!("column {:?} cannot be unsigned: not numeric", column.name),
        ));
    }

    let mut rendered = format!("\"{}\" {}", column.name, declaration);
    if column.required {
        rendered.push_str(" NOT NULL");
    }
    if column.unique {
        rendered.push_str(" UNIQUE");
    }
    if let Some(default) = &column.default {
        rendered.push_str(&format!(" DEFAULT {}", default.render()));
    }
    if column.unsigned {
        rendered.push_str(&format!(" CHECK (\"{}\" >= 0)", column.name));
    }

    Ok(rendered)
}

pub(crate) fn render_touch_function(column: &str) -> String {
    format!(
        "CREATE OR REPLACE FUNCTION \"quarry_touch_{col}\"() RETURNS trigger AS $$ BEGIN NEW.\"{col}\" := CURRENT_TIMESTAMP; RETURN NEW; END $$ LANGUAGE plpgsql",
        col = column
    )
}

pub(crate) fn render_touch_trigger(table: &str, column: &str) -> String {
    format!(
        "CREATE TRIGGER \"{table}_{col}_touch\" BEFORE UPDATE ON \"{table}\" FOR EACH ROW EXECUTE FUNCTION \"quarry_touch_{col}\"()",
        table = table,
        col = column
    )
}

fn quote_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("\"{}\"", n))
        .collect::<Vec<_>>()
        .join(", ")
}
