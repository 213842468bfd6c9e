use serde::{Deserialize, Serialize};

/// Display label for skipping indexes, which carry no logical name.
pub const SKIPPING_INDEX_NAME: &str = "skipping_index";

/// Kind of acceleration. Unrecognised kinds reported by the engine are kept
/// verbatim so they round-trip through the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AccelerationKind {
    Skipping,
    Covering,
    Materialized,
    Other(String),
}

impl AccelerationKind {
    /// Normalizes the engine's `kind` column (`mv` means materialized view).
    pub fn from_engine(kind: &str) -> Self {
        match kind {
            "mv" => AccelerationKind::Materialized,
            other => AccelerationKind::from(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AccelerationKind::Skipping => "skipping",
            AccelerationKind::Covering => "covering",
            AccelerationKind::Materialized => "materialized",
            AccelerationKind::Other(kind) => kind,
        }
    }
}

impl From<String> for AccelerationKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "skipping" => AccelerationKind::Skipping,
            "covering" => AccelerationKind::Covering,
            "materialized" => AccelerationKind::Materialized,
            _ => AccelerationKind::Other(kind),
        }
    }
}

impl From<AccelerationKind> for String {
    fn from(kind: AccelerationKind) -> Self {
        kind.as_str().to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CachedAcceleration {
    pub flint_index_name: String,
    #[serde(rename = "type")]
    pub kind: AccelerationKind,
    pub database: String,
    /// Empty for materialized views.
    #[serde(default)]
    pub table: String,
    /// Empty for skipping indexes.
    #[serde(default)]
    pub index_name: String,
    #[serde(default)]
    pub auto_refresh: bool,
    #[serde(default)]
    pub status: String,
}

/// Key under which an acceleration is unique within its data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccelerationIdentity {
    /// One skipping index per table.
    Skipping { database: String, table: String },
    Covering {
        database: String,
        table: String,
        index_name: String,
    },
    Materialized { database: String, view: String },
    Physical(String),
}

impl CachedAcceleration {
    pub fn display_name(&self) -> &str {
        if self.index_name.is_empty() {
            SKIPPING_INDEX_NAME
        } else {
            &self.index_name
        }
    }

    pub fn identity(&self) -> AccelerationIdentity {
        match &self.kind {
            AccelerationKind::Skipping => AccelerationIdentity::Skipping {
                database: self.database.clone(),
                table: self.table.clone(),
            },
            AccelerationKind::Covering => AccelerationIdentity::Covering {
                database: self.database.clone(),
                table: self.table.clone(),
                index_name: self.index_name.clone(),
            },
            AccelerationKind::Materialized => AccelerationIdentity::Materialized {
                database: self.database.clone(),
                view: self.index_name.clone(),
            },
            AccelerationKind::Other(_) => {
                AccelerationIdentity::Physical(self.flint_index_name.clone())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccelerationOperation {
    Delete,
    Vacuum,
    Sync,
}

impl AccelerationOperation {
    pub fn keyword(&self) -> &'static str {
        match self {
            AccelerationOperation::Delete => "DROP",
            AccelerationOperation::Vacuum => "VACUUM",
            AccelerationOperation::Sync => "REFRESH",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccelerationOperation::Delete => "delete",
            AccelerationOperation::Vacuum => "vacuum",
            AccelerationOperation::Sync => "sync",
        }
    }
}
