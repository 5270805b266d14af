//! PostgreSQL-backed store over a deadpool connection pool.

use crate::error::{QuarryError, Result};
use crate::store::{Row, Store, StoreConfig, Value, WriteStatus};
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, TimeZone, Utc};
use deadpool_postgres::{Config as PoolConfig, Pool, Runtime};
use postgres_types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::NoTls;
use tracing::{debug, info};

pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Create the pool and verify the connection with a ping.
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let pool = create_pool(&config.database_url, config.max_pool_size)?;

        let client = pool.get().await?;
        client
            .execute("SELECT 1", &[])
            .await
            .map_err(|e| QuarryError::store(format!("ping failed: {}", e)))?;

        info!("connected to PostgreSQL store");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let client = self.pool.get().await?;
        let refs = param_refs(params);
        let rows = client.query(sql, &refs).await?;
        Ok(rows.iter().map(row_from_pg).collect())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<WriteStatus> {
        let client = self.pool.get().await?;
        let refs = param_refs(params);

        // Statements with a RETURNING clause go through the query path so
        // the generated key can be read back.
        if sql.contains("RETURNING") {
            let rows = client.query(sql, &refs).await?;
            let insert_id = rows.first().and_then(|r| r.try_get::<_, i64>(0).ok());
            let affected = rows.len() as u64;
            Ok(WriteStatus {
                affected_rows: affected,
                changed_rows: affected,
                insert_id,
                warning_count: 0,
            })
        } else {
            let affected = client.execute(sql, &refs).await?;
            Ok(WriteStatus {
                affected_rows: affected,
                changed_rows: affected,
                insert_id: None,
                warning_count: 0,
            })
        }
    }

    async fn batch_execute(&self, sql: &str) -> Result<()> {
        let client = self.pool.get().await?;
        client.batch_execute(sql).await?;
        Ok(())
    }
}

fn create_pool(database_url: &str, max_size: usize) -> Result<Pool> {
    let mut cfg = PoolConfig::new();
    cfg.url = Some(database_url.to_string());

    cfg.pool = Some(deadpool_postgres::PoolConfig {
        max_size,
        ..Default::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| QuarryError::store(format!("failed to create pool: {}", e)))
}

fn param_refs(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(n) => {
                if *ty == Type::INT2 {
                    (*n as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*n as i32).to_sql(ty, out)
                } else {
                    n.to_sql(ty, out)
                }
            }
            Value::Float(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            Value::Text(s) => s.to_sql(ty, out),
            Value::Timestamp(t) => t.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // The store decides at runtime; mismatches surface as statement
        // failures from the server.
        true
    }

    to_sql_checked!();
}

fn row_from_pg(row: &tokio_postgres::Row) -> Row {
    let mut out = Row::new();

    for (idx, col) in row.columns().iter().enumerate() {
        let ty = col.type_();
        let value = if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)
                .ok()
                .flatten()
                .map(Value::Int)
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)
                .ok()
                .flatten()
                .map(|n| Value::Int(n as i64))
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)
                .ok()
                .flatten()
                .map(|n| Value::Int(n as i64))
        } else if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)
                .ok()
                .flatten()
                .map(Value::Bool)
        } else if *ty == Type::FLOAT8 || *ty == Type::NUMERIC {
            row.try_get::<_, Option<f64>>(idx)
                .ok()
                .flatten()
                .map(Value::Float)
        } else if *ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(idx)
                .ok()
                .flatten()
                .map(|f| Value::Float(f as f64))
        } else if *ty == Type::TIMESTAMPTZ {
            row.try_get::<_, Option<DateTime<Utc>>>(idx)
                .ok()
                .flatten()
                .map(Value::Timestamp)
        } else if *ty == Type::TIMESTAMP {
            row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
                .ok()
                .flatten()
                .map(|t| Value::Timestamp(Utc.from_utc_datetime(&t)))
        } else if *ty == Type::DATE {
            row.try_get::<_, Option<chrono::NaiveDate>>(idx)
                .ok()
                .flatten()
                .map(|d| Value::Text(d.to_string()))
        } else if *ty == Type::JSON || *ty == Type::JSONB {
            row.try_get::<_, Option<serde_json::Value>>(idx)
                .ok()
                .flatten()
                .map(|v| Value::Text(v.to_string()))
        } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR {
            row.try_get::<_, Option<String>>(idx)
                .ok()
                .flatten()
                .map(Value::Text)
        } else {
            debug!("unmapped column type {} for {}", ty, col.name());
            None
        };

        out.insert(col.name().to_string(), value.unwrap_or(Value::Null));
    }

    out
}
