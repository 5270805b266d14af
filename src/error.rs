use thiserror::Error;

/// Errors produced by the model and migration core.
///
/// Absence of matching rows is never an error; lookups that find nothing
/// return empty results instead.
#[derive(Debug, Error)]
pub enum QuarryError {
    #[error("invalid configuration for model {model}: {cause}")]
    Configuration { model: String, cause: String },

    #[error("schema change failed on {table}: {cause}")]
    Schema { table: String, cause: String },

    #[error("failed to resolve relation {relation} on {model}: {cause}")]
    RelationResolution {
        model: String,
        relation: String,
        cause: String,
    },

    #[error("store error: {cause}")]
    Store { cause: String },
}

impl QuarryError {
    pub fn configuration(model: impl Into<String>, cause: impl Into<String>) -> Self {
        QuarryError::Configuration {
            model: model.into(),
            cause: cause.into(),
        }
    }

    pub fn schema(table: impl Into<String>, cause: impl Into<String>) -> Self {
        QuarryError::Schema {
            table: table.into(),
            cause: cause.into(),
        }
    }

    pub fn relation(
        model: impl Into<String>,
        relation: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        QuarryError::RelationResolution {
            model: model.into(),
            relation: relation.into(),
            cause: cause.into(),
        }
    }

    pub fn store(cause: impl Into<String>) -> Self {
        QuarryError::Store {
            cause: cause.into(),
        }
    }

    /// The underlying cause, without the variant prefix.
    ///
    /// Used when a store failure is re-classified as a schema failure
    /// during DDL execution.
    pub fn cause(&self) -> String {
        match self {
            QuarryError::Configuration { cause, .. }
            | QuarryError::Schema { cause, .. }
            | QuarryError::RelationResolution { cause, .. }
            | QuarryError::Store { cause } => cause.clone(),
        }
    }
}

impl From<tokio_postgres::Error> for QuarryError {
    fn from(err: tokio_postgres::Error) -> Self {
        QuarryError::store(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for QuarryError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        QuarryError::store(format!("pool error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, QuarryError>;
