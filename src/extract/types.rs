// src/extract/types.rs

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};

/// Name of the synthetic partition column appended to every header and row.
pub const PARTITION_COLUMN: &str = "reporting_date";

/// Destination column type in the warehouse.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum BigQueryType {
    Date,
    String,
    Integer,
    Float,
    Timestamp,
}

impl BigQueryType {
    /// Type used for any unknown or missing WebQuery class token.
    pub const DEFAULT: BigQueryType = BigQueryType::String;

    pub fn as_str(&self) -> &'static str {
        match self {
            BigQueryType::Date => "DATE",
            BigQueryType::String => "STRING",
            BigQueryType::Integer => "INTEGER",
            BigQueryType::Float => "FLOAT",
            BigQueryType::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for BigQueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single output column: sanitized name plus the inferred destination type.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct ColumnHeader {
    pub name: String,
    pub ty: BigQueryType,
}

impl ColumnHeader {
    pub fn new(name: impl Into<String>, ty: BigQueryType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// WebQuery `<col class="…">` token → destination type.
static WEBQUERY_TYPES: Lazy<HashMap<&'static str, BigQueryType>> = Lazy::new(|| {
    HashMap::from([
        ("date", BigQueryType::Date),
        ("text", BigQueryType::String),
        ("integral", BigQueryType::Integer),
        ("decimal", BigQueryType::Float),
        ("percent", BigQueryType::Float),
    ])
});

/// Map a WebQuery column class into a destination type.
///
/// Exact match only: `"Integral"` or `" integral"` are unknown tokens and,
/// like a missing class, resolve to [`BigQueryType::DEFAULT`].
pub fn map_webquery_type(class: Option<&str>) -> BigQueryType {
    class
        .and_then(|token| WEBQUERY_TYPES.get(token).copied())
        .unwrap_or(BigQueryType::DEFAULT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tokens() {
        assert_eq!(map_webquery_type(Some("date")), BigQueryType::Date);
        assert_eq!(map_webquery_type(Some("text")), BigQueryType::String);
        assert_eq!(map_webquery_type(Some("integral")), BigQueryType::Integer);
        assert_eq!(map_webquery_type(Some("decimal")), BigQueryType::Float);
        assert_eq!(map_webquery_type(Some("percent")), BigQueryType::Float);
    }

    #[test]
    fn test_unknown_and_missing_fall_back() {
        for token in [None, Some(""), Some("Integral"), Some(" date"), Some("currency")] {
            assert_eq!(map_webquery_type(token), BigQueryType::DEFAULT);
        }
        assert_eq!(BigQueryType::DEFAULT.as_str(), "STRING");
    }

    #[test]
    fn test_type_renders_as_warehouse_name() {
        assert_eq!(BigQueryType::Timestamp.to_string(), "TIMESTAMP");
        assert_eq!(
            serde_json::to_string(&ColumnHeader::new("clicks", BigQueryType::Integer)).unwrap(),
            r#"{"name":"clicks","ty":"INTEGER"}"#
        );
    }
}
