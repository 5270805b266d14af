pub mod builder;
pub mod column;
pub mod migration;
pub mod types;

pub use builder::SchemaBuilder;
pub use column::{ColumnDefinition, ForeignKeySpec, PrimaryKeySpec, ReferentialAction};
pub use migration::{Migration, Migrator};
pub use types::{DataType, DefaultValue, OnUpdate};

/// PostgreSQL identifier rules: lowercase start, 63 bytes max.
pub(crate) fn is_valid_identifier(name: &str) -> bool {
    if name.is_empty() || name.len() > 63 {
        return false;
    }

    let first_char = match name.chars().next() {
        Some(c) => c,
        None => return false,
    };
    if !first_char.is_ascii_lowercase() && first_char != '_' {
        return false;
    }

    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
