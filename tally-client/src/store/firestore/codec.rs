//! Firestore REST value encoding
//!
//! Documents travel as `{"name": ".../documents/salesData/<id>", "fields": {...}}`
//! where every field is a typed value (`stringValue`, `doubleValue`,
//! `integerValue` as a decimal string, `timestampValue` as RFC 3339).

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde_json::{Map, Value, json};
use shared::error::{StoreError, StoreErrorCode};
use shared::models::{NewSalesRecord, SalesRecord, SalesRecordPatch};

fn string_value(s: &str) -> Value {
    json!({ "stringValue": s })
}

fn integer_value(n: u32) -> Value {
    json!({ "integerValue": n.to_string() })
}

fn double_value(d: Decimal) -> Value {
    json!({ "doubleValue": d.to_f64().unwrap_or_default() })
}

fn timestamp_value(ts: DateTime<Utc>) -> Value {
    json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::Micros, true) })
}

/// Fields of a new document (server timestamps are added as transforms)
pub(super) fn encode_fields(record: &NewSalesRecord) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("date".into(), string_value(&record.date.to_string()));
    fields.insert("sales".into(), double_value(record.sales));
    fields.insert("wechat".into(), integer_value(record.wechat));
    fields.insert("samples".into(), integer_value(record.samples));
    fields.insert("notes".into(), string_value(&record.notes));
    if let Some(ts) = record.timestamp {
        fields.insert("timestamp".into(), string_value(&ts.to_rfc3339()));
    }
    fields
}

/// Only the fields present in the patch; pair with `patch.field_paths()` as mask
pub(super) fn encode_patch(patch: &SalesRecordPatch) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(date) = patch.date {
        fields.insert("date".into(), string_value(&date.to_string()));
    }
    if let Some(sales) = patch.sales {
        fields.insert("sales".into(), double_value(sales));
    }
    if let Some(wechat) = patch.wechat {
        fields.insert("wechat".into(), integer_value(wechat));
    }
    if let Some(samples) = patch.samples {
        fields.insert("samples".into(), integer_value(samples));
    }
    if let Some(notes) = &patch.notes {
        fields.insert("notes".into(), string_value(notes));
    }
    if let Some(ts) = patch.timestamp {
        fields.insert("timestamp".into(), string_value(&ts.to_rfc3339()));
    }
    fields
}

fn as_str(value: &Value) -> Option<&str> {
    value.get("stringValue")?.as_str()
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    if let Some(d) = value.get("doubleValue") {
        return d.as_f64().and_then(Decimal::from_f64);
    }
    match value.get("integerValue")? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64().map(Decimal::from),
        _ => None,
    }
}

fn as_count(value: &Value) -> Option<u32> {
    if let Some(i) = value.get("integerValue") {
        return match i {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            _ => None,
        };
    }
    // 旧数据可能以浮点数存储计数
    let d = value.get("doubleValue")?.as_f64()?;
    (d >= 0.0 && d <= f64::from(u32::MAX)).then(|| d.trunc() as u32)
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value
        .get("timestampValue")
        .or_else(|| value.get("stringValue"))?
        .as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn malformed(name: &str, field: &str) -> StoreError {
    StoreError::new(
        StoreErrorCode::InvalidArgument,
        format!("malformed document {name}: bad or missing `{field}`"),
    )
}

/// Decode one REST document into a record
pub(super) fn decode_document(doc: &Value) -> Result<SalesRecord, StoreError> {
    let name = doc.get("name").and_then(Value::as_str).unwrap_or_default();
    let id = name.rsplit('/').next().unwrap_or_default();
    if id.is_empty() {
        return Err(malformed(name, "name"));
    }

    let empty = Map::new();
    let fields = doc.get("fields").and_then(Value::as_object).unwrap_or(&empty);
    let field = |key: &str| fields.get(key);

    let date = field("date")
        .and_then(as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .ok_or_else(|| malformed(name, "date"))?;
    let sales = field("sales")
        .and_then(as_decimal)
        .ok_or_else(|| malformed(name, "sales"))?;
    let wechat = field("wechat")
        .and_then(as_count)
        .ok_or_else(|| malformed(name, "wechat"))?;
    let samples = field("samples")
        .and_then(as_count)
        .ok_or_else(|| malformed(name, "samples"))?;

    Ok(SalesRecord {
        id: id.to_string(),
        date,
        sales,
        wechat,
        samples,
        notes: field("notes").and_then(as_str).unwrap_or_default().to_string(),
        timestamp: field("timestamp").and_then(as_timestamp),
        created_at: field("createdAt").and_then(as_timestamp),
        updated_at: field("updatedAt").and_then(as_timestamp),
    })
}

/// Decode a `runQuery` response; malformed documents are skipped
pub(super) fn decode_query_response(body: &Value) -> Vec<SalesRecord> {
    let Some(items) = body.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| item.get("document"))
        .filter_map(|doc| match decode_document(doc) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed document");
                None
            }
        })
        .collect()
}

/// Turn a failed REST response into a store error
///
/// Bodies look like `{"error": {"code": 403, "status": "PERMISSION_DENIED", "message": "..."}}`;
/// `runQuery` wraps the same object in an array.
pub(super) fn decode_error(http_status: u16, body: &str) -> StoreError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| match v {
        Value::Array(items) => items.first().and_then(|i| i.get("error")),
        other => other.get("error"),
    });

    let code = error
        .and_then(|e| e.get("status"))
        .and_then(Value::as_str)
        .map(StoreErrorCode::from_status)
        .filter(|c| *c != StoreErrorCode::Unknown)
        .unwrap_or_else(|| StoreErrorCode::from_http_status(http_status));
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {http_status}: {body}"));

    StoreError::new(code, message)
}
