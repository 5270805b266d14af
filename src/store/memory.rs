//! In-memory store.
//!
//! Interprets the statement shapes this crate renders: CREATE/DROP TABLE,
//! touch-trigger registration, and INSERT/SELECT/UPDATE/DELETE with `$n`
//! parameters. Tables preserve insertion order. Unique columns,
//! table-exists conflicts, and foreign-key targets are enforced, which is
//! enough to exercise every schema and model path without a running
//! PostgreSQL instance.

use crate::error::{QuarryError, Result};
use crate::store::{Row, Store, Value, WriteStatus};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use regex::Regex;

#[derive(Debug, Clone)]
enum ColumnDefault {
    Literal(Value),
    CurrentTimestamp,
}

#[derive(Debug, Clone)]
struct ColumnMeta {
    name: String,
    serial: bool,
    unique: bool,
    default: Option<ColumnDefault>,
}

#[derive(Debug, Default)]
struct Table {
    columns: Vec<ColumnMeta>,
    primary_key: Vec<String>,
    touch_columns: Vec<String>,
    rows: Vec<Row>,
    next_id: i64,
}

#[derive(Debug, Default)]
struct Outcome {
    rows: Vec<Row>,
    status: WriteStatus,
}

/// In-process store keyed by table name.
#[derive(Default)]
pub struct MemoryStore {
    tables: DashMap<String, Table>,
    statements: std::sync::Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every statement executed so far, in order.
    pub fn statement_log(&self) -> Vec<String> {
        self.statements
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of rows currently held by a table.
    pub fn row_count(&self, name: &str) -> usize {
        self.tables.get(name).map(|t| t.rows.len()).unwrap_or(0)
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<Outcome> {
        let sql = sql.trim();

        if let Ok(mut log) = self.statements.lock() {
            log.push(sql.to_string());
        }

        if sql.starts_with("CREATE TABLE ") {
            return self.run_create_table(sql);
        }
        if sql.starts_with("DROP TABLE IF EXISTS ") {
            return self.run_drop_table(sql);
        }
        if sql.starts_with("CREATE OR REPLACE FUNCTION ") {
            return Ok(Outcome::default());
        }
        if sql.starts_with("CREATE TRIGGER ") {
            return self.run_create_trigger(sql);
        }
        if sql.starts_with("INSERT INTO ") {
            return self.run_insert(sql, params);
        }
        if sql.starts_with("SELECT ") {
            return self.run_select(sql, params);
        }
        if sql.starts_with("UPDATE ") {
            return self.run_update(sql, params);
        }
        if sql.starts_with("DELETE FROM ") {
            return self.run_delete(sql, params);
        }

        Err(QuarryError::store(format!(
            "unsupported statement: {}",
            sql
        )))
    }

    fn run_create_table(&self, sql: &str) -> Result<Outcome> {
        let re = Regex::new(r#"^CREATE TABLE (IF NOT EXISTS )?"([A-Za-z_][A-Za-z0-9_]*)" \((.+)\)$"#)
            .expect("static regex");
        let caps = re
            .captures(sql)
            .ok_or_else(|| QuarryError::store(format!("malformed CREATE TABLE: {}", sql)))?;

        let if_not_exists = caps.get(1).is_some();
        let name = caps[2].to_string();
        let body = caps[3].to_string();

        if self.tables.contains_key(&name) {
            if if_not_exists {
                return Ok(Outcome::default());
            }
            return Err(QuarryError::store(format!(
                "relation \"{}\" already exists",
                name
            )));
        }

        let mut table = Table {
            next_id: 1,
            ..Table::default()
        };

        for item in split_top_level(&body) {
            let item = item.trim();

            if let Some(stripped) = item.strip_prefix("PRIMARY KEY ") {
                table.primary_key = parse_ident_list(stripped)?;
                continue;
            }

            if item.starts_with("FOREIGN KEY ") {
                let fk_re = Regex::new(r#"REFERENCES "([A-Za-z_][A-Za-z0-9_]*)""#)
                    .expect("static regex");
                let fk_caps = fk_re.captures(item).ok_or_else(|| {
                    QuarryError::store(format!("malformed FOREIGN KEY clause: {}", item))
                })?;
                let referenced = &fk_caps[1];
                if referenced != name && !self.tables.contains_key(referenced) {
                    return Err(QuarryError::store(format!(
                        "referenced relation \"{}\" does not exist",
                        referenced
                    )));
                }
                continue;
            }

            if item.starts_with('"') {
                table.columns.push(parse_column(item)?);
                continue;
            }

            // Other table constraints are accepted and ignored.
        }

        self.tables.insert(name, table);
        Ok(Outcome::default())
    }

    fn run_drop_table(&self, sql: &str) -> Result<Outcome> {
        let re = Regex::new(r#"^DROP TABLE IF EXISTS "([A-Za-z_][A-Za-z0-9_]*)"$"#)
            .expect("static regex");
        let caps = re
            .captures(sql)
            .ok_or_else(|| QuarryError::store(format!("malformed DROP TABLE: {}", sql)))?;

        // Dropping an absent table is not an error.
        self.tables.remove(&caps[1]);
        Ok(Outcome::default())
    }

    fn run_create_trigger(&self, sql: &str) -> Result<Outcome> {
        let re = Regex::new(
            r#"^CREATE TRIGGER "\w+" BEFORE UPDATE ON "(\w+)" FOR EACH ROW EXECUTE FUNCTION "quarry_touch_(\w+)"\(\)$"#,
        )
        .expect("static regex");
        let caps = re
            .captures(sql)
            .ok_or_else(|| QuarryError::store(format!("malformed CREATE TRIGGER: {}", sql)))?;

        let mut table = self.tables.get_mut(&caps[1]).ok_or_else(|| {
            QuarryError::store(format!("relation \"{}\" does not exist", &caps[1]))
        })?;
        let column = caps[2].to_string();
        if !table.touch_columns.contains(&column) {
            table.touch_columns.push(column);
        }
        Ok(Outcome::default())
    }

    fn run_insert(&self, sql: &str, params: &[Value]) -> Result<Outcome> {
        let re = Regex::new(
            r#"^INSERT INTO "(\w+)" (?:\(([^)]*)\) VALUES \(([^)]*)\)|DEFAULT VALUES)( RETURNING "(\w+)")?$"#,
        )
        .expect("static regex");
        let caps = re
            .captures(sql)
            .ok_or_else(|| QuarryError::store(format!("malformed INSERT: {}", sql)))?;

        let name = caps[1].to_string();
        let mut given = Row::new();

        if let (Some(cols), Some(vals)) = (caps.get(2), caps.get(3)) {
            let cols = parse_ident_list_bare(cols.as_str())?;
            let indices = parse_placeholders(vals.as_str())?;
            if cols.len() != indices.len() {
                return Err(QuarryError::store("column/value count mismatch"));
            }
            for (col, idx) in cols.into_iter().zip(indices) {
                given.insert(col, param_at(params, idx)?.clone());
            }
        }

        let returning = caps.get(5).map(|m| m.as_str().to_string());

        let mut table = self
            .tables
            .get_mut(&name)
            .ok_or_else(|| QuarryError::store(format!("relation \"{}\" does not exist", name)))?;

        let mut row = given;
        for meta in table.columns.clone() {
            if row.contains_key(&meta.name) {
                continue;
            }
            let value = if meta.serial {
                let id = table.next_id;
                table.next_id += 1;
                Value::Int(id)
            } else {
                match &meta.default {
                    Some(ColumnDefault::Literal(v)) => v.clone(),
                    Some(ColumnDefault::CurrentTimestamp) => Value::Timestamp(Utc::now()),
                    None => Value::Null,
                }
            };
            row.insert(meta.name, value);
        }

        // Unique enforcement over declared unique columns and the primary key.
        let unique_cols: Vec<String> = table
            .columns
            .iter()
            .filter(|c| c.unique)
            .map(|c| c.name.clone())
            .chain(table.primary_key.iter().cloned())
            .collect();
        for col in unique_cols {
            let candidate = row.get(&col).cloned().unwrap_or(Value::Null);
            if candidate.is_null() {
                continue;
            }
            if table
                .rows
                .iter()
                .any(|r| r.get(&col).map(|v| *v == candidate).unwrap_or(false))
            {
                return Err(QuarryError::store(format!(
                    "duplicate key value violates unique constraint on \"{}\"",
                    col
                )));
            }
        }

        let insert_id = table
            .primary_key
            .first()
            .and_then(|pk| row.get(pk))
            .and_then(Value::as_int)
            .or_else(|| {
                table
                    .columns
                    .iter()
                    .find(|c| c.serial)
                    .and_then(|c| row.get(&c.name))
                    .and_then(Value::as_int)
            });

        let returned = returning.map(|col| {
            let mut r = Row::new();
            r.insert(col.clone(), row.get(&col).cloned().unwrap_or(Value::Null));
            r
        });

        table.rows.push(row);

        Ok(Outcome {
            rows: returned.into_iter().collect(),
            status: WriteStatus {
                affected_rows: 1,
                changed_rows: 1,
                insert_id,
                warning_count: 0,
            },
        })
    }

    fn run_select(&self, sql: &str, params: &[Value]) -> Result<Outcome> {
        let re = Regex::new(
            r#"^SELECT \* FROM "(?P<table>\w+)"(?: WHERE "(?P<col>\w+)" (?P<op>=|IN) (?P<rhs>\$\d+|\([^)]*\)))?(?: ORDER BY "(?P<ord>\w+)"(?P<dir> ASC| DESC)?)?(?: LIMIT (?P<lim>\d+))?$"#,
        )
        .expect("static regex");
        let caps = re
            .captures(sql)
            .ok_or_else(|| QuarryError::store(format!("malformed SELECT: {}", sql)))?;

        let name = caps.name("table").map(|m| m.as_str()).unwrap_or_default();
        let table = self
            .tables
            .get(name)
            .ok_or_else(|| QuarryError::store(format!("relation \"{}\" does not exist", name)))?;

        let mut rows: Vec<Row> = match (caps.name("col"), caps.name("op"), caps.name("rhs")) {
            (Some(col), Some(op), Some(rhs)) => {
                let indices = parse_placeholders(rhs.as_str())?;
                let wanted: Vec<Value> = indices
                    .into_iter()
                    .map(|i| param_at(params, i).cloned())
                    .collect::<Result<_>>()?;
                let col = col.as_str();
                match op.as_str() {
                    "=" => {
                        let target = wanted
                            .first()
                            .ok_or_else(|| QuarryError::store("missing parameter for WHERE"))?;
                        table
                            .rows
                            .iter()
                            .filter(|r| r.get(col).map(|v| v == target).unwrap_or(false))
                            .cloned()
                            .collect()
                    }
                    _ => table
                        .rows
                        .iter()
                        .filter(|r| r.get(col).map(|v| wanted.contains(v)).unwrap_or(false))
                        .cloned()
                        .collect(),
                }
            }
            _ => table.rows.clone(),
        };

        if let Some(ord) = caps.name("ord") {
            let col = ord.as_str().to_string();
            rows.sort_by(|a, b| {
                a.get(&col)
                    .unwrap_or(&Value::Null)
                    .compare(b.get(&col).unwrap_or(&Value::Null))
            });
            if caps.name("dir").map(|d| d.as_str()) == Some(" DESC") {
                rows.reverse();
            }
        }

        if let Some(lim) = caps.name("lim") {
            let lim: usize = lim.as_str().parse().unwrap_or(usize::MAX);
            rows.truncate(lim);
        }

        Ok(Outcome {
            rows,
            status: WriteStatus::default(),
        })
    }

    fn run_update(&self, sql: &str, params: &[Value]) -> Result<Outcome> {
        let re = Regex::new(r#"^UPDATE "(\w+)" SET (.+) WHERE "(\w+)" = \$(\d+)$"#)
            .expect("static regex");
        let caps = re
            .captures(sql)
            .ok_or_else(|| QuarryError::store(format!("malformed UPDATE: {}", sql)))?;

        let name = caps[1].to_string();
        let where_col = caps[3].to_string();
        let where_idx: usize = caps[4]
            .parse()
            .map_err(|_| QuarryError::store("bad parameter index"))?;
        let target = param_at(params, where_idx)?.clone();

        let set_re = Regex::new(r#"^"(\w+)" = \$(\d+)$"#).expect("static regex");
        let mut assignments: Vec<(String, Value)> = Vec::new();
        for part in caps[2].split(", ") {
            let set_caps = set_re
                .captures(part.trim())
                .ok_or_else(|| QuarryError::store(format!("malformed SET clause: {}", part)))?;
            let idx: usize = set_caps[2]
                .parse()
                .map_err(|_| QuarryError::store("bad parameter index"))?;
            assignments.push((set_caps[1].to_string(), param_at(params, idx)?.clone()));
        }

        let mut table = self
            .tables
            .get_mut(&name)
            .ok_or_else(|| QuarryError::store(format!("relation \"{}\" does not exist", name)))?;

        let touch: Vec<String> = table
            .touch_columns
            .iter()
            .filter(|c| !assignments.iter().any(|(col, _)| col == *c))
            .cloned()
            .collect();

        let mut affected = 0;
        let mut changed = 0;
        for row in table.rows.iter_mut() {
            if row.get(&where_col) != Some(&target) {
                continue;
            }
            affected += 1;
            let mut row_changed = false;
            for (col, value) in &assignments {
                if row.get(col) != Some(value) {
                    row_changed = true;
                }
                row.insert(col.clone(), value.clone());
            }
            if row_changed {
                changed += 1;
                for col in &touch {
                    row.insert(col.clone(), Value::Timestamp(Utc::now()));
                }
            }
        }

        Ok(Outcome {
            rows: Vec::new(),
            status: WriteStatus {
                affected_rows: affected,
                changed_rows: changed,
                insert_id: None,
                warning_count: 0,
            },
        })
    }

    fn run_delete(&self, sql: &str, params: &[Value]) -> Result<Outcome> {
        let re = Regex::new(r#"^DELETE FROM "(\w+)" WHERE "(\w+)" = \$(\d+)$"#)
            .expect("static regex");
        let caps = re
            .captures(sql)
            .ok_or_else(|| QuarryError::store(format!("malformed DELETE: {}", sql)))?;

        let name = caps[1].to_string();
        let col = caps[2].to_string();
        let idx: usize = caps[3]
            .parse()
            .map_err(|_| QuarryError::store("bad parameter index"))?;
        let target = param_at(params, idx)?.clone();

        let mut table = self
            .tables
            .get_mut(&name)
            .ok_or_else(|| QuarryError::store(format!("relation \"{}\" does not exist", name)))?;

        let before = table.rows.len();
        table.rows.retain(|r| r.get(&col) != Some(&target));
        let removed = (before - table.rows.len()) as u64;

        Ok(Outcome {
            rows: Vec::new(),
            status: WriteStatus {
                affected_rows: removed,
                changed_rows: removed,
                insert_id: None,
                warning_count: 0,
            },
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        Ok(self.run(sql, params)?.rows)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<WriteStatus> {
        Ok(self.run(sql, params)?.status)
    }

    async fn batch_execute(&self, sql: &str) -> Result<()> {
        self.run(sql, &[])?;
        Ok(())
    }
}

/// Split a CREATE TABLE body on commas that sit outside parentheses and
/// quoted literals.
fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut current = String::new();

    for c in body.chars() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                current.push(c);
            }
            '(' if !in_quote => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_quote => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 && !in_quote => {
                parts.push(current.trim().to_string());
                current = String::new();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn parse_column(item: &str) -> Result<ColumnMeta> {
    let re = Regex::new(r#"^"(\w+)"\s+(.+)$"#).expect("static regex");
    let caps = re
        .captures(item)
        .ok_or_else(|| QuarryError::store(format!("malformed column definition: {}", item)))?;

    let name = caps[1].to_string();
    let rest = caps[2].to_string();

    let serial = rest.starts_with("BIGSERIAL")
        || rest.starts_with("SMALLSERIAL")
        || rest.starts_with("SERIAL");
    let unique = rest.contains(" UNIQUE");

    let default_re = Regex::new(
        r#"DEFAULT (CURRENT_TIMESTAMP|TRUE|FALSE|-?\d+\.\d+|-?\d+|'(?:[^']|'')*')"#,
    )
    .expect("static regex");
    let default = default_re.captures(&rest).map(|d| {
        let raw = &d[1];
        if raw == "CURRENT_TIMESTAMP" {
            ColumnDefault::CurrentTimestamp
        } else if raw == "TRUE" {
            ColumnDefault::Literal(Value::Bool(true))
        } else if raw == "FALSE" {
            ColumnDefault::Literal(Value::Bool(false))
        } else if raw.starts_with('\'') {
            let inner = raw[1..raw.len() - 1].replace("''", "'");
            ColumnDefault::Literal(Value::Text(inner))
        } else if raw.contains('.') {
            ColumnDefault::Literal(
                raw.parse::<f64>().map(Value::Float).unwrap_or(Value::Null),
            )
        } else {
            ColumnDefault::Literal(raw.parse::<i64>().map(Value::Int).unwrap_or(Value::Null))
        }
    });

    Ok(ColumnMeta {
        name,
        serial,
        unique,
        default,
    })
}

/// Parse `("a", "b")` into identifier names.
fn parse_ident_list(s: &str) -> Result<Vec<String>> {
    let trimmed = s.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| QuarryError::store(format!("malformed identifier list: {}", s)))?;
    parse_ident_list_bare(inner)
}

/// Parse `"a", "b"` into identifier names.
fn parse_ident_list_bare(s: &str) -> Result<Vec<String>> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split(", ")
        .map(|part| {
            let part = part.trim();
            part.strip_prefix('"')
                .and_then(|p| p.strip_suffix('"'))
                .map(|p| p.to_string())
                .ok_or_else(|| QuarryError::store(format!("malformed identifier: {}", part)))
        })
        .collect()
}

/// Collect `$n` indices in order of appearance.
fn parse_placeholders(s: &str) -> Result<Vec<usize>> {
    let re = Regex::new(r"\$(\d+)").expect("static regex");
    let mut out = Vec::new();
    for caps in re.captures_iter(s) {
        out.push(
            caps[1]
                .parse()
                .map_err(|_| QuarryError::store("bad parameter index"))?,
        );
    }
    if out.is_empty() {
        return Err(QuarryError::store(format!("no parameters in: {}", s)));
    }
    Ok(out)
}

fn param_at(params: &[Value], idx: usize) -> Result<&Value> {
    params
        .get(idx.wrapping_sub(1))
        .ok_or_else(|| QuarryError::store(format!("parameter ${} out of range", idx)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_ddl() -> &'static str {
        r#"CREATE TABLE "users" ("id" BIGSERIAL NOT NULL, "email" VARCHAR(255) NOT NULL UNIQUE, "active" BOOLEAN DEFAULT FALSE, PRIMARY KEY ("id"))"#
    }

    #[test]
    fn create_insert_select_roundtrip() {
        let store = MemoryStore::new();
        tokio_test::block_on(async {
            store.batch_execute(users_ddl()).await.unwrap();

            let status = store
                .execute(
                    r#"INSERT INTO "users" ("email") VALUES ($1) RETURNING "id""#,
                    &[Value::from("a@example.com")],
                )
                .await
                .unwrap();
            assert_eq!(status.insert_id, Some(1));

            let rows = store
                .query(
                    r#"SELECT * FROM "users" WHERE "id" = $1 LIMIT 1"#,
                    &[Value::Int(1)],
                )
                .await
                .unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].get("active"), Some(&Value::Bool(false)));
        });
    }

    #[test]
    fn create_existing_table_conflicts() {
        let store = MemoryStore::new();
        tokio_test::block_on(async {
            store.batch_execute(users_ddl()).await.unwrap();
            let err = store.batch_execute(users_ddl()).await.unwrap_err();
            assert!(err.to_string().contains("already exists"));
        });
    }

    #[test]
    fn unique_column_is_enforced() {
        let store = MemoryStore::new();
        tokio_test::block_on(async {
            store.batch_execute(users_ddl()).await.unwrap();
            let insert = r#"INSERT INTO "users" ("email") VALUES ($1) RETURNING "id""#;
            store
                .execute(insert, &[Value::from("dup@example.com")])
                .await
                .unwrap();
            let err = store
                .execute(insert, &[Value::from("dup@example.com")])
                .await
                .unwrap_err();
            assert!(err.to_string().contains("duplicate key"));
        });
    }

    #[test]
    fn foreign_key_requires_existing_target() {
        let store = MemoryStore::new();
        tokio_test::block_on(async {
            let err = store
                .batch_execute(
                    r#"CREATE TABLE "posts" ("id" BIGSERIAL NOT NULL, "user_id" BIGINT NOT NULL, PRIMARY KEY ("id"), FOREIGN KEY ("user_id") REFERENCES "users" ("id"))"#,
                )
                .await
                .unwrap_err();
            assert!(err.to_string().contains("does not exist"));
        });
    }

    #[test]
    fn update_counts_changed_rows() {
        let store = MemoryStore::new();
        tokio_test::block_on(async {
            store.batch_execute(users_ddl()).await.unwrap();
            store
                .execute(
                    r#"INSERT INTO "users" ("email") VALUES ($1) RETURNING "id""#,
                    &[Value::from("a@example.com")],
                )
                .await
                .unwrap();

            let update = r#"UPDATE "users" SET "active" = $1 WHERE "id" = $2"#;
            let first = store
                .execute(update, &[Value::Bool(true), Value::Int(1)])
                .await
                .unwrap();
            assert_eq!(first.affected_rows, 1);
            assert_eq!(first.changed_rows, 1);

            let second = store
                .execute(update, &[Value::Bool(true), Value::Int(1)])
                .await
                .unwrap();
            assert_eq!(second.affected_rows, 1);
            assert_eq!(second.changed_rows, 0);
        });
    }

    #[test]
    fn drop_if_exists_tolerates_absent_table() {
        let store = MemoryStore::new();
        tokio_test::block_on(async {
            store
                .batch_execute(r#"DROP TABLE IF EXISTS "missing""#)
                .await
                .unwrap();
        });
    }
}
