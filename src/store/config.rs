use crate::error::{QuarryError, Result};
use std::env;
use std::time::Duration;

/// Connection settings for the PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_pool_size: usize,
    pub connect_timeout: Duration,
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_pool_size: 10,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Build the configuration from the environment.
    ///
    /// `DATABASE_URL` wins when set; otherwise the URL is assembled from
    /// the discrete `DB_HOST`/`DB_PORT`/`DB_NAME`/`DB_USER`/`DB_PASSWORD`
    /// variables. The password is URL-encoded to survive special
    /// characters.
    pub fn from_env() -> Result<Self> {
        let database_url = if let Ok(url) = env::var("DATABASE_URL") {
            url
        } else {
            let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
            let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
            let db_name = env::var("DB_NAME").unwrap_or_else(|_| "postgres".to_string());
            let db_user = env::var("DB_USER").unwrap_or_else(|_| "quarry".to_string());
            let db_password = env::var("DB_PASSWORD").unwrap_or_else(|_| "password".to_string());

            let encoded_password = urlencoding::encode(&db_password);

            format!(
                "postgres://{}:{}@{}:{}/{}",
                db_user, encoded_password, db_host, db_port, db_name
            )
        };

        let max_pool_size = env::var("MAX_POOL_SIZE")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let connect_timeout_secs: u64 = env::var("CONNECT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        if database_url.is_empty() {
            return Err(QuarryError::store("empty DATABASE_URL"));
        }

        Ok(StoreConfig {
            database_url,
            max_pool_size,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        })
    }

    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = size;
        self
    }
}
