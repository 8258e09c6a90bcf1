//! Textual filter and sort expressions.
//!
//! A filter is `key OPERATOR value`, a sort is `key ORDER`. Single quotes group
//! characters (including whitespace) into one token:
//!
//! ```text
//! description CONTAINS 'operator file'
//! created_at GREATER_THAN 2021-03-20
//! provided_name ASC
//! ```

use chrono::{DateTime, NaiveDate};

use crate::models::query::{Column, FilterOperator, FilterPredicate, SortOrder, SortSpec};

const FILTER_ARGS: usize = 3;
const SORT_ARGS: usize = 2;
const CALENDAR_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("'{expression}' : invalid number of arguments provided for {operation} operation, Required {required} | Provided {provided}")]
    ArgumentCount {
        expression: String,
        operation: &'static str,
        required: usize,
        provided: usize,
    },

    #[error("invalid filter operation used: {0}")]
    InvalidOperator(String),

    #[error("invalid operand passed for sort operation: {0}")]
    InvalidSortKey(String),

    #[error("invalid sort operation used: {0}")]
    InvalidSortOrder(String),

    #[error("invalid date '{value}': not RFC 3339 ({rfc3339}) and not yyyy-mm-dd ({calendar})")]
    InvalidDate {
        value: String,
        rfc3339: String,
        calendar: String,
    },
}

/// Split an expression into tokens.
pub fn tokenize(expression: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in expression.chars() {
        if c == '\'' {
            quoted = !quoted;
            flush(&mut tokens, &mut current);
        } else if !quoted && c.is_whitespace() {
            flush(&mut tokens, &mut current);
        } else {
            current.push(c);
        }
    }
    flush(&mut tokens, &mut current);

    tokens
}

fn flush(tokens: &mut Vec<String>, current: &mut String) {
    let token = current.trim();
    if !token.is_empty() {
        tokens.push(token.to_string());
    }
    current.clear();
}

pub fn parse_filters<S: AsRef<str>>(expressions: &[S]) -> Result<Vec<FilterPredicate>, QueryError> {
    expressions
        .iter()
        .map(|e| parse_filter(e.as_ref()))
        .collect()
}

pub fn parse_filter(expression: &str) -> Result<FilterPredicate, QueryError> {
    let args = tokenize(expression);
    if args.len() != FILTER_ARGS {
        return Err(QueryError::ArgumentCount {
            expression: expression.to_string(),
            operation: "filter",
            required: FILTER_ARGS,
            provided: args.len(),
        });
    }

    let key = &args[0];
    let operator = parse_filter_operator(&args[1], key)?;
    let value = match Column::from_key(key) {
        Some(column) if column.is_temporal() => date_to_epoch(&args[2])?,
        _ => args[2].clone(),
    };

    Ok(FilterPredicate {
        key: key.clone(),
        operator,
        value,
    })
}

/// Resolve an operator, honouring the narrower set allowed for free-form keys.
pub fn parse_filter_operator(op: &str, key: &str) -> Result<FilterOperator, QueryError> {
    FilterOperator::parse(op)
        .filter(|operator| operator.allowed_for(key))
        .ok_or_else(|| QueryError::InvalidOperator(op.to_string()))
}

pub fn parse_sorts<S: AsRef<str>>(expressions: &[S]) -> Result<Vec<SortSpec>, QueryError> {
    expressions
        .iter()
        .map(|e| parse_sort(e.as_ref()))
        .collect()
}

pub fn parse_sort(expression: &str) -> Result<SortSpec, QueryError> {
    let args = tokenize(expression);
    if args.len() != SORT_ARGS {
        return Err(QueryError::ArgumentCount {
            expression: expression.to_string(),
            operation: "sort",
            required: SORT_ARGS,
            provided: args.len(),
        });
    }

    let key = &args[0];
    if Column::from_key(key).is_none() {
        return Err(QueryError::InvalidSortKey(key.clone()));
    }
    let order =
        SortOrder::parse(&args[1]).ok_or_else(|| QueryError::InvalidSortOrder(args[1].clone()))?;

    Ok(SortSpec {
        key: key.clone(),
        order,
    })
}

/// Convert an RFC 3339 timestamp or a `yyyy-mm-dd` date (midnight UTC) to
/// Unix epoch seconds.
pub fn date_to_epoch(date: &str) -> Result<String, QueryError> {
    // Wall-clock fields are read as UTC; the offset is not applied.
    let rfc3339_err = match DateTime::parse_from_rfc3339(date) {
        Ok(dt) => return Ok(dt.naive_local().and_utc().timestamp().to_string()),
        Err(e) => e,
    };

    let day = NaiveDate::parse_from_str(date, CALENDAR_FORMAT).map_err(|calendar_err| {
        QueryError::InvalidDate {
            value: date.to_string(),
            rfc3339: rfc3339_err.to_string(),
            calendar: calendar_err.to_string(),
        }
    })?;

    let midnight = day.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    Ok(midnight.timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_quoted_date() {
        assert_eq!(
            tokenize("created_at GREATER_THAN '2021-03-20'"),
            vec!["created_at", "GREATER_THAN", "2021-03-20"]
        );
    }

    #[test]
    fn test_tokenize_keeps_whitespace_inside_quotes() {
        assert_eq!(
            tokenize("  description   CONTAINS 'operator file ' "),
            vec!["description", "CONTAINS", "operator file"]
        );
    }

    #[test]
    fn test_tokenize_drops_empty_tokens() {
        assert_eq!(tokenize("size '' EQUAL ' ' 10"), vec!["size", "EQUAL", "10"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_tokenize_unterminated_quote_runs_to_end() {
        assert_eq!(
            tokenize("description EQUAL 'two words"),
            vec!["description", "EQUAL", "two words"]
        );
    }

    #[test]
    fn test_filter_wrong_argument_count() {
        let err = parse_filter("provided_name EQUAL").unwrap_err();
        assert_eq!(
            err,
            QueryError::ArgumentCount {
                expression: "provided_name EQUAL".into(),
                operation: "filter",
                required: 3,
                provided: 2,
            }
        );
        let msg = err.to_string();
        assert!(msg.contains("'provided_name EQUAL'"));
        assert!(msg.contains("Required 3 | Provided 2"));
    }

    #[test]
    fn test_sort_wrong_argument_count() {
        let err = parse_sort("size ASC extra").unwrap_err();
        assert!(err.to_string().contains("Required 2 | Provided 3"));
    }

    #[test]
    fn test_predefined_key_accepts_all_operators() {
        for op in ["EQUAL", "CONTAINS", "LESS_THAN", "GREATER_THAN"] {
            let pred = parse_filter(&format!("size {} 10", op)).unwrap();
            assert_eq!(pred.operator.as_str(), op);
        }
    }

    #[test]
    fn test_free_form_key_rejects_ordering_operators() {
        for op in ["LESS_THAN", "GREATER_THAN"] {
            let err = parse_filter(&format!("description {} 10", op)).unwrap_err();
            assert_eq!(err, QueryError::InvalidOperator(op.to_string()));
            assert!(err.to_string().contains(op));
        }
        assert!(parse_filter("description EQUAL x").is_ok());
        assert!(parse_filter("description CONTAINS x").is_ok());
    }

    #[test]
    fn test_unknown_operator() {
        let err = parse_filter("size LIKE 10").unwrap_err();
        assert_eq!(err, QueryError::InvalidOperator("LIKE".into()));
    }

    #[test]
    fn test_sort_rejects_free_form_key_and_bad_order() {
        assert_eq!(
            parse_sort("description ASC").unwrap_err(),
            QueryError::InvalidSortKey("description".into())
        );
        assert_eq!(
            parse_sort("size UP").unwrap_err(),
            QueryError::InvalidSortOrder("UP".into())
        );
    }

    #[test]
    fn test_sort_order_preserved() {
        let sorts = parse_sorts(&["size DESC", "provided_name ASC"]).unwrap();
        assert_eq!(sorts[0].key, "size");
        assert_eq!(sorts[0].order, SortOrder::Desc);
        assert_eq!(sorts[1].key, "provided_name");
        assert_eq!(sorts[1].order, SortOrder::Asc);
    }

    #[test]
    fn test_date_forms_agree() {
        assert_eq!(
            date_to_epoch("2021-04-13").unwrap(),
            date_to_epoch("2021-04-13T00:00:00Z").unwrap()
        );
        assert_eq!(date_to_epoch("2021-04-13").unwrap(), "1618272000");
    }

    #[test]
    fn test_date_offset_is_ignored() {
        assert_eq!(date_to_epoch("2021-04-13T02:00:00+02:00").unwrap(), "1618279200");
        assert_eq!(
            date_to_epoch("2021-04-13T02:00:00+02:00").unwrap(),
            date_to_epoch("2021-04-13T02:00:00Z").unwrap()
        );
    }

    #[test]
    fn test_invalid_date_reports_both_failures() {
        match date_to_epoch("13/04/2021").unwrap_err() {
            QueryError::InvalidDate {
                value,
                rfc3339,
                calendar,
            } => {
                assert_eq!(value, "13/04/2021");
                assert!(!rfc3339.is_empty());
                assert!(!calendar.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_temporal_filter_value_converted() {
        let pred = parse_filter("created_at GREATER_THAN 2021-03-20").unwrap();
        assert_eq!(pred.value, "1616198400");
        assert!(parse_filter("deleted_at LESS_THAN yesterday").is_err());
    }

    #[test]
    fn test_filter_display_reparses_to_same_predicate() {
        let filters = parse_filters(&[
            "provided_name EQUAL 'dummy'",
            "description CONTAINS 'operator file'",
            "'my key' EQUAL value",
            "size LESS_THAN 100",
            "created_at GREATER_THAN 2021-03-20",
            "deleted_at LESS_THAN '2021-04-13T10:30:00Z'",
        ])
        .unwrap();

        for pred in filters {
            let reparsed = parse_filter(&pred.to_string()).unwrap();
            assert_eq!(reparsed, pred);
        }
    }
}
