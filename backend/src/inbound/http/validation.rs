//! Shared validation helpers for inbound HTTP adapters.

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::domain::Error;

/// Validation error codes for HTTP request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    InvalidUuid,
    InvalidTimestamp,
    InvalidAmount,
    InvalidLimit,
}

impl ErrorCode {
    fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidUuid => "invalid_uuid",
            ErrorCode::InvalidTimestamp => "invalid_timestamp",
            ErrorCode::InvalidAmount => "invalid_amount",
            ErrorCode::InvalidLimit => "invalid_limit",
        }
    }
}

/// Newtype wrapper for HTTP field names to provide type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldName(&'static str);

impl FieldName {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self(name)
    }

    fn as_str(&self) -> &str {
        self.0
    }
}

/// Builder for validation errors with field context.
struct ValidationError {
    field: String,
    message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    fn with_value(self, code: ErrorCode, value: serde_json::Value) -> Error {
        Error::invalid_request(self.message).with_details(json!({
            "field": self.field,
            "value": value,
            "code": code.as_str(),
        }))
    }

    fn with_index(self, code: ErrorCode, index: usize, value: serde_json::Value) -> Error {
        Error::invalid_request(self.message).with_details(json!({
            "field": self.field,
            "index": index,
            "value": value,
            "code": code.as_str(),
        }))
    }
}

pub(crate) fn invalid_uuid_error(field: FieldName, value: &str) -> Error {
    let field = field.as_str();
    ValidationError::new(field, format!("{field} must be a valid UUID"))
        .with_value(ErrorCode::InvalidUuid, json!(value))
}

pub(crate) fn parse_uuid(value: String, field: FieldName) -> Result<Uuid, Error> {
    Uuid::parse_str(&value).map_err(|_| invalid_uuid_error(field, &value))
}

pub(crate) fn invalid_timestamp_error(field: FieldName, value: &str) -> Error {
    let field = field.as_str();
    ValidationError::new(field, format!("{field} must be an RFC 3339 timestamp"))
        .with_value(ErrorCode::InvalidTimestamp, json!(value))
}

pub(crate) fn parse_rfc3339_timestamp(
    value: String,
    field: FieldName,
) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|_| invalid_timestamp_error(field, &value))
}

pub(crate) fn parse_optional_rfc3339_timestamp(
    value: Option<String>,
    field: FieldName,
) -> Result<Option<DateTime<Utc>>, Error> {
    value
        .map(|raw| parse_rfc3339_timestamp(raw, field))
        .transpose()
}

/// Reject a negative amount on the cart line at `index`.
pub(crate) fn negative_amount_error(field: FieldName, index: usize, cents: i64) -> Error {
    let field = field.as_str();
    ValidationError::new(field, format!("{field} must not be negative")).with_index(
        ErrorCode::InvalidAmount,
        index,
        json!(cents),
    )
}

pub(crate) fn invalid_limit_error(field: FieldName, value: usize, max: usize) -> Error {
    let field = field.as_str();
    ValidationError::new(field, format!("{field} must be between 1 and {max}"))
        .with_value(ErrorCode::InvalidLimit, json!(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode as DomainErrorCode;
    use rstest::rstest;

    fn detail<'a>(error: &'a Error, key: &str) -> Option<&'a serde_json::Value> {
        error.details().and_then(|details| details.get(key))
    }

    #[rstest]
    fn parse_uuid_reports_field_and_value() {
        let err = parse_uuid("nope".to_owned(), FieldName::new("accountId"))
            .expect_err("invalid uuid");

        assert_eq!(err.code(), DomainErrorCode::InvalidRequest);
        assert_eq!(detail(&err, "field"), Some(&json!("accountId")));
        assert_eq!(detail(&err, "value"), Some(&json!("nope")));
        assert_eq!(detail(&err, "code"), Some(&json!("invalid_uuid")));
    }

    #[rstest]
    #[case(None, None)]
    #[case(Some("2026-03-01T12:00:00Z"), Some("2026-03-01T12:00:00+00:00"))]
    #[case(Some("2026-03-01T13:00:00+01:00"), Some("2026-03-01T12:00:00+00:00"))]
    fn optional_timestamps_normalise_to_utc(
        #[case] raw: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        let parsed =
            parse_optional_rfc3339_timestamp(raw.map(str::to_owned), FieldName::new("from"))
                .expect("valid timestamp");

        assert_eq!(parsed.map(|value| value.to_rfc3339()), expected.map(str::to_owned));
    }

    #[rstest]
    fn malformed_timestamp_is_invalid_request() {
        let err = parse_rfc3339_timestamp("yesterday".to_owned(), FieldName::new("to"))
            .expect_err("malformed timestamp");

        assert_eq!(detail(&err, "code"), Some(&json!("invalid_timestamp")));
    }

    #[rstest]
    fn negative_amount_carries_line_index() {
        let err = negative_amount_error(FieldName::new("unitPriceCents"), 2, -5);

        assert_eq!(detail(&err, "index"), Some(&json!(2)));
        assert_eq!(detail(&err, "value"), Some(&json!(-5)));
        assert_eq!(detail(&err, "code"), Some(&json!("invalid_amount")));
    }
}
