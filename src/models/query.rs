use serde::{Deserialize, Serialize};
use std::fmt;

use super::file::FileInfo;

/// Schema-backed metadata fields eligible for every operator and for sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    ProvidedId,
    ProvidedName,
    Size,
    CreatedAt,
    DeletedAt,
}

impl Column {
    pub const ALL: [Column; 5] = [
        Column::ProvidedId,
        Column::ProvidedName,
        Column::Size,
        Column::CreatedAt,
        Column::DeletedAt,
    ];

    pub fn from_key(key: &str) -> Option<Column> {
        Column::ALL.into_iter().find(|c| c.key() == key)
    }

    pub fn key(self) -> &'static str {
        match self {
            Column::ProvidedId => "provided_id",
            Column::ProvidedName => "provided_name",
            Column::Size => "size",
            Column::CreatedAt => "created_at",
            Column::DeletedAt => "deleted_at",
        }
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, Column::CreatedAt | Column::DeletedAt)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Column::Size | Column::CreatedAt | Column::DeletedAt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Equal,
    Contains,
    LessThan,
    GreaterThan,
}

impl FilterOperator {
    pub fn parse(op: &str) -> Option<FilterOperator> {
        match op {
            "EQUAL" => Some(FilterOperator::Equal),
            "CONTAINS" => Some(FilterOperator::Contains),
            "LESS_THAN" => Some(FilterOperator::LessThan),
            "GREATER_THAN" => Some(FilterOperator::GreaterThan),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilterOperator::Equal => "EQUAL",
            FilterOperator::Contains => "CONTAINS",
            FilterOperator::LessThan => "LESS_THAN",
            FilterOperator::GreaterThan => "GREATER_THAN",
        }
    }

    /// Free-form metadata values only support equality and substring match.
    pub fn allowed_for(self, key: &str) -> bool {
        Column::from_key(key).is_some()
            || matches!(self, FilterOperator::Equal | FilterOperator::Contains)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub key: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl FilterPredicate {
    /// The value as a user would type it. Temporal values are stored as
    /// epoch seconds and rendered back as RFC 3339.
    fn display_value(&self) -> String {
        let temporal = Column::from_key(&self.key).is_some_and(Column::is_temporal);
        match self.value.parse::<i64>() {
            Ok(secs) if temporal => chrono::DateTime::from_timestamp(secs, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| self.value.clone()),
            _ => self.value.clone(),
        }
    }
}

impl fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.display_value();
        if self.key.chars().any(char::is_whitespace) {
            write!(f, "'{}' {} '{}'", self.key, self.operator.as_str(), value)
        } else {
            write!(f, "{} {} '{}'", self.key, self.operator.as_str(), value)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(order: &str) -> Option<SortOrder> {
        match order {
            "ASC" => Some(SortOrder::Asc),
            "DESC" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: String,
    pub order: SortOrder,
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.order.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFileMetadataRequest {
    #[serde(default)]
    pub filter_by: Vec<FilterPredicate>,
    #[serde(default)]
    pub sort_by: Vec<SortSpec>,
}

/// One line of a list response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListFileMetadataResponse {
    Results(FileInfo),
    Error { message: String },
}
