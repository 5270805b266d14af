//! Column, primary-key, and foreign-key definitions.

use crate::schema::types::{DataType, DefaultValue, OnUpdate};
use serde::{Deserialize, Serialize};

/// A single column in a CREATE TABLE definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: DataType,
    /// Disallow negative values (rendered as a CHECK constraint).
    #[serde(default)]
    pub unsigned: bool,
    /// Auto-incrementing column (rendered as the SERIAL family).
    #[serde(default)]
    pub auto_increment: bool,
    /// NOT NULL.
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<DefaultValue>,
    #[serde(default)]
    pub on_update: Option<OnUpdate>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            unsigned: false,
            auto_increment: false,
            required: false,
            unique: false,
            default: None,
            on_update: None,
        }
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn on_update(mut self, behavior: OnUpdate) -> Self {
        self.on_update = Some(behavior);
        self
    }
}

/// Ordered set of primary-key column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeySpec {
    pub columns: Vec<String>,
}

impl PrimaryKeySpec {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Action taken when a referenced row is deleted or its key updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Cascade,
    Restrict,
    SetNull,
}

impl ReferentialAction {
    /// Render the action keyword, or `None` for the store default.
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            ReferentialAction::NoAction => None,
            ReferentialAction::Cascade => Some("CASCADE"),
            ReferentialAction::Restrict => Some("RESTRICT"),
            ReferentialAction::SetNull => Some("SET NULL"),
        }
    }
}

/// A foreign-key constraint.
///
/// The referenced table must already exist when the constraint is
/// created: its creation migration has to precede the referencing one in
/// ledger order, and the store rejects the DDL otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    pub columns: Vec<String>,
    pub references_table: String,
    pub references_columns: Vec<String>,
    #[serde(default)]
    pub on_delete: ReferentialAction,
    #[serde(default)]
    pub on_update: ReferentialAction,
}

impl ForeignKeySpec {
    pub fn new(
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        Self {
            columns: vec![column.into()],
            references_table: references_table.into(),
            references_columns: vec![references_column.into()],
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        }
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }
}
