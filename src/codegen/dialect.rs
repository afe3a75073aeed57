//! SQL dialect conventions: placeholders, key retrieval and column types.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::validate::ValueKind;

/// Per-engine conventions used by statement templating. Statement lowering
/// takes a [`Dialect`] tag and looks the implementation up through
/// [`Dialect::sql`].
pub trait SqlDialect {
    /// Placeholder for the parameter at 1-based `index`.
    fn placeholder(&self, index: usize) -> String;

    /// Whether an insert needs `RETURNING id` to hand back the generated key.
    fn requires_returning(&self) -> bool;

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn column_type(&self, kind: ValueKind) -> &'static str;

    /// Column definition of the implicit `id` key.
    fn primary_key_column(&self) -> &'static str;
}

/// Embedded single-file engine: sequential `?`, key read back by the driver.
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn requires_returning(&self) -> bool {
        false
    }

    fn column_type(&self, kind: ValueKind) -> &'static str {
        match kind {
            ValueKind::Integer | ValueKind::Boolean => "INTEGER",
            ValueKind::Number => "REAL",
            ValueKind::Text | ValueKind::Passthrough => "TEXT",
        }
    }

    fn primary_key_column(&self) -> &'static str {
        "id INTEGER PRIMARY KEY AUTOINCREMENT"
    }
}

/// Client-server engine: numbered `$n`, key returned by the statement.
pub struct Postgres;

impl SqlDialect for Postgres {
    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn requires_returning(&self) -> bool {
        true
    }

    fn column_type(&self, kind: ValueKind) -> &'static str {
        match kind {
            ValueKind::Integer => "INTEGER",
            ValueKind::Number => "DOUBLE PRECISION",
            ValueKind::Boolean => "BOOLEAN",
            ValueKind::Text => "TEXT",
            ValueKind::Passthrough => "JSONB",
        }
    }

    fn primary_key_column(&self) -> &'static str {
        "id SERIAL PRIMARY KEY"
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS, JsonSchema, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn sql(self) -> &'static dyn SqlDialect {
        match self {
            Dialect::Sqlite => &Sqlite,
            Dialect::Postgres => &Postgres,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
