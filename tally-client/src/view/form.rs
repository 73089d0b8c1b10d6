//! Entry form - raw text fields and their validation

use crate::error::{SyncError, SyncResult};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::models::{NewSalesRecord, SalesRecord};
use std::str::FromStr;

const REQUIRED: &str = "请填写所有必填字段";

/// 单日销售额上限
pub const MAX_SALES: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Unvalidated form input, exactly as typed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SalesForm {
    /// YYYY-MM-DD
    pub date: String,
    pub sales: String,
    pub wechat: String,
    pub samples: String,
    pub notes: String,
}

impl SalesForm {
    /// Blank form dated `date`
    pub fn blank(date: NaiveDate) -> Self {
        Self {
            date: date.format("%Y-%m-%d").to_string(),
            ..Default::default()
        }
    }

    /// Reset state: blank form dated today
    pub fn today() -> Self {
        Self::blank(shared::util::today())
    }

    /// Pre-filled form for editing `record`
    pub fn from_record(record: &SalesRecord) -> Self {
        Self {
            date: record.date.format("%Y-%m-%d").to_string(),
            sales: record.sales.normalize().to_string(),
            wechat: record.wechat.to_string(),
            samples: record.samples.to_string(),
            notes: record.notes.clone(),
        }
    }

    /// Validate required fields and build the record to write
    pub fn parse(&self) -> SyncResult<NewSalesRecord> {
        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d")
            .map_err(|_| SyncError::Validation(REQUIRED.into()))?;
        let sales = Decimal::from_str(self.sales.trim())
            .map_err(|_| SyncError::Validation(REQUIRED.into()))?;
        if sales.is_sign_negative() && !sales.is_zero() {
            return Err(SyncError::Validation("销售额不能为负数".into()));
        }
        if sales > MAX_SALES {
            return Err(SyncError::Validation("销售额超出范围".into()));
        }
        let wechat = parse_count(&self.wechat)?;
        let samples = parse_count(&self.samples)?;

        Ok(NewSalesRecord {
            date,
            sales,
            wechat,
            samples,
            notes: self.notes.clone(),
            timestamp: Some(Utc::now()),
        })
    }
}

fn parse_count(raw: &str) -> SyncResult<u32> {
    let raw = raw.trim();
    if raw.starts_with('-') {
        return Err(SyncError::Validation("数量不能为负数".into()));
    }
    raw.parse::<u32>()
        .map_err(|_| SyncError::Validation(REQUIRED.into()))
}
