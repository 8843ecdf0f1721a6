//! Feed record normalization.
//!
//! Feed records are loosely typed JSON documents. They are converted into
//! [`InventoryItem`] at the subscription boundary so nothing downstream sees
//! backend representation drift. Accepted shapes:
//!
//! - timestamps as RFC 3339 strings, epoch milliseconds, or
//!   `{seconds, nanoseconds}` objects (with or without leading underscores)
//! - numbers as JSON numbers or numeric strings
//! - owner under `ownerId` or `userId`; category under `categoryId` or `category`
//!
//! A missing `archived` flag means `false`. Records without an id, an owner,
//! or a readable `lastUpdated` are rejected.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ErrorCode;
use crate::feed::SubscriptionKey;
use crate::model::{CategoryId, InventoryItem, ItemId, OwnerId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("record is not an object")]
    NotAnObject,

    #[error("record is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("record field '{field}' has unreadable value {value}")]
    InvalidField { field: &'static str, value: String },
}

impl NormalizeError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::MalformedRecord
    }
}

/// Normalize a single record.
///
/// # Errors
///
/// Returns a [`NormalizeError`] when a required field is missing or a
/// present field cannot be read.
pub fn normalize_record(value: &Value) -> Result<InventoryItem, NormalizeError> {
    let obj = value.as_object().ok_or(NormalizeError::NotAnObject)?;

    let id = required_string(obj, "id", &["id"])?;
    let owner = required_string(obj, "ownerId", &["ownerId", "userId"])?;
    let last_updated = field(obj, &["lastUpdated"])
        .filter(|v| !v.is_null())
        .ok_or(NormalizeError::MissingField("lastUpdated"))
        .and_then(|v| parse_timestamp("lastUpdated", v))?;

    let expiration_date = match field(obj, &["expirationDate"]) {
        None | Some(Value::Null) => None,
        Some(v) => Some(parse_timestamp("expirationDate", v)?),
    };

    let archived = match field(obj, &["archived"]) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(NormalizeError::InvalidField {
                field: "archived",
                value: other.to_string(),
            });
        }
    };

    Ok(InventoryItem {
        id: ItemId::new(id),
        name: optional_string(obj, &["name"]).unwrap_or_default(),
        category_id: CategoryId::new(
            optional_string(obj, &["categoryId", "category"]).unwrap_or_default(),
        ),
        quantity: parse_number(obj, "quantity")?,
        unit: optional_string(obj, &["unit"]).unwrap_or_default(),
        reorder_point: parse_number(obj, "reorderPoint")?,
        expiration_date,
        last_updated,
        archived,
        owner_id: OwnerId::new(owner),
    })
}

/// Normalize a full snapshot for `key`.
///
/// Malformed records are skipped with a warning. Records belonging to a
/// different owner or partition than `key` are dropped as well, so the result
/// only ever holds items for the subscribed tuple.
#[must_use]
pub fn normalize_snapshot(records: &[Value], key: &SubscriptionKey) -> Vec<InventoryItem> {
    let mut items = Vec::with_capacity(records.len());
    for record in records {
        match normalize_record(record) {
            Ok(item) if item.owner_id != key.owner => {
                warn!(item = %item.id, subscription = %key, "dropping record owned by another identity");
            }
            Ok(item) if item.archived != key.archived => {
                warn!(item = %item.id, subscription = %key, "dropping record from the other partition");
            }
            Ok(item) => items.push(item),
            Err(err) => {
                warn!(subscription = %key, code = %err.code(), "skipping malformed record: {err}");
            }
        }
    }
    items
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| obj.get(*name))
}

fn optional_string(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    match field(obj, names)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_string(
    obj: &Map<String, Value>,
    canonical: &'static str,
    names: &[&str],
) -> Result<String, NormalizeError> {
    optional_string(obj, names)
        .filter(|s| !s.is_empty())
        .ok_or(NormalizeError::MissingField(canonical))
}

fn parse_number(obj: &Map<String, Value>, name: &'static str) -> Result<f64, NormalizeError> {
    let invalid = |v: &Value| NormalizeError::InvalidField {
        field: name,
        value: v.to_string(),
    };
    match obj.get(name) {
        None | Some(Value::Null) => Ok(0.0),
        Some(v @ Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(v)),
        Some(v @ Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(0.0);
            }
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| invalid(v))
        }
        Some(v) => Err(invalid(v)),
    }
}

fn parse_timestamp(name: &'static str, value: &Value) -> Result<DateTime<Utc>, NormalizeError> {
    let invalid = || NormalizeError::InvalidField {
        field: name,
        value: value.to_string(),
    };
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| invalid()),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(invalid),
        Value::Object(obj) => {
            let seconds = field(obj, &["seconds", "_seconds"])
                .and_then(Value::as_i64)
                .ok_or_else(invalid)?;
            let nanos = field(obj, &["nanoseconds", "_nanoseconds"])
                .and_then(Value::as_u64)
                .unwrap_or(0);
            let nanos = u32::try_from(nanos).map_err(|_| invalid())?;
            DateTime::from_timestamp(seconds, nanos).ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "id": "p1",
            "name": "Flour",
            "categoryId": "dry-goods",
            "quantity": 12,
            "unit": "kg",
            "reorderPoint": 5,
            "lastUpdated": "2026-03-01T10:00:00Z",
            "userId": "u1",
            "archived": false
        })
    }

    #[test]
    fn full_record_normalizes() {
        let item = normalize_record(&record()).expect("normalize");
        assert_eq!(item.id.as_str(), "p1");
        assert_eq!(item.owner_id.as_str(), "u1");
        assert_eq!(item.category_id.as_str(), "dry-goods");
        assert!((item.quantity - 12.0).abs() < f64::EPSILON);
        assert!(item.expiration_date.is_none());
        assert!(!item.archived);
    }

    #[test]
    fn missing_archived_defaults_false() {
        let mut r = record();
        r.as_object_mut().expect("object").remove("archived");
        assert!(!normalize_record(&r).expect("normalize").archived);
    }

    #[test]
    fn firestore_timestamp_object_is_accepted() {
        let mut r = record();
        r["lastUpdated"] = json!({"seconds": 1_700_000_000, "nanoseconds": 500});
        r["expirationDate"] = json!({"_seconds": 1_700_086_400, "_nanoseconds": 0});
        let item = normalize_record(&r).expect("normalize");
        assert_eq!(item.last_updated.timestamp(), 1_700_000_000);
        assert_eq!(
            item.expiration_date.map(|d| d.timestamp()),
            Some(1_700_086_400)
        );
    }

    #[test]
    fn epoch_millis_timestamp_is_accepted() {
        let mut r = record();
        r["lastUpdated"] = json!(1_700_000_000_000_i64);
        let item = normalize_record(&r).expect("normalize");
        assert_eq!(item.last_updated.timestamp(), 1_700_000_000);
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let mut r = record();
        r["quantity"] = json!(" 7.5 ");
        r["reorderPoint"] = json!("");
        let item = normalize_record(&r).expect("normalize");
        assert!((item.quantity - 7.5).abs() < f64::EPSILON);
        assert!(item.reorder_point.abs() < f64::EPSILON);
    }

    #[test]
    fn garbage_quantity_is_rejected() {
        let mut r = record();
        r["quantity"] = json!("lots");
        assert!(matches!(
            normalize_record(&r),
            Err(NormalizeError::InvalidField { field: "quantity", .. })
        ));
    }

    #[test]
    fn missing_last_updated_is_rejected() {
        let mut r = record();
        r["lastUpdated"] = Value::Null;
        assert_eq!(
            normalize_record(&r),
            Err(NormalizeError::MissingField("lastUpdated"))
        );
    }

    #[test]
    fn missing_owner_is_rejected() {
        let mut r = record();
        r.as_object_mut().expect("object").remove("userId");
        assert_eq!(
            normalize_record(&r),
            Err(NormalizeError::MissingField("ownerId"))
        );
    }

    #[test]
    fn snapshot_drops_foreign_and_malformed_records() {
        let mut foreign = record();
        foreign["id"] = json!("p2");
        foreign["userId"] = json!("someone-else");
        let mut archived = record();
        archived["id"] = json!("p3");
        archived["archived"] = json!(true);
        let records = vec![record(), foreign, archived, json!("not a record")];

        let items = normalize_snapshot(&records, &SubscriptionKey::new("u1", false));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id.as_str(), "p1");
    }

    #[test]
    fn snapshot_preserves_feed_order() {
        let mut second = record();
        second["id"] = json!("p0");
        let items = normalize_snapshot(&[record(), second], &SubscriptionKey::new("u1", false));
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p0"]);
    }
}
