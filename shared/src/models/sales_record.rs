//! Sales Record Model (每日销售记录)

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default collection holding the sales records
pub const SALES_COLLECTION: &str = "salesData";

/// One entry per reporting day, as stored in the remote collection.
///
/// `date` acts as a soft unique key: the desk asks before overwriting an
/// existing day, the backend does not enforce it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesRecord {
    /// Backend-assigned document id
    pub id: String,
    /// Business date (YYYY-MM-DD)
    pub date: NaiveDate,
    /// Sales amount
    pub sales: Decimal,
    /// WeChat contacts added
    pub wechat: u32,
    /// Samples sent
    pub samples: u32,
    #[serde(default)]
    pub notes: String,
    /// Client-side submission time, stored as sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Server timestamp, set on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Server timestamp, set on every write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Create payload - the fields a client submits for a new day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSalesRecord {
    pub date: NaiveDate,
    pub sales: Decimal,
    pub wechat: u32,
    pub samples: u32,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewSalesRecord {
    /// Materialize the stored record once the backend has assigned an id.
    ///
    /// `now` stands in for the server clock and stamps both timestamps.
    pub fn into_record(self, id: impl Into<String>, now: DateTime<Utc>) -> SalesRecord {
        SalesRecord {
            id: id.into(),
            date: self.date,
            sales: self.sales,
            wechat: self.wechat,
            samples: self.samples,
            notes: self.notes,
            timestamp: self.timestamp,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// Update payload - present fields overwrite, absent fields are kept
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesRecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wechat: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SalesRecordPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merge into a stored record and stamp `updated_at`.
    pub fn apply(&self, record: &mut SalesRecord, now: DateTime<Utc>) {
        if let Some(date) = self.date {
            record.date = date;
        }
        if let Some(sales) = self.sales {
            record.sales = sales;
        }
        if let Some(wechat) = self.wechat {
            record.wechat = wechat;
        }
        if let Some(samples) = self.samples {
            record.samples = samples;
        }
        if let Some(notes) = &self.notes {
            record.notes = notes.clone();
        }
        if let Some(timestamp) = self.timestamp {
            record.timestamp = Some(timestamp);
        }
        record.updated_at = Some(now);
    }

    /// Wire names of the fields this patch touches (update mask order).
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.date.is_some() {
            paths.push("date");
        }
        if self.sales.is_some() {
            paths.push("sales");
        }
        if self.wechat.is_some() {
            paths.push("wechat");
        }
        if self.samples.is_some() {
            paths.push("samples");
        }
        if self.notes.is_some() {
            paths.push("notes");
        }
        if self.timestamp.is_some() {
            paths.push("timestamp");
        }
        paths
    }
}

/// Overwriting a day replaces every user-entered field
impl From<NewSalesRecord> for SalesRecordPatch {
    fn from(record: NewSalesRecord) -> Self {
        Self {
            date: Some(record.date),
            sales: Some(record.sales),
            wechat: Some(record.wechat),
            samples: Some(record.samples),
            notes: Some(record.notes),
            timestamp: record.timestamp,
        }
    }
}

/// Backend query order: newest day first, ties broken by id for stability
pub fn sort_by_date_desc(records: &mut [SalesRecord]) {
    records.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
}
