//! CSV export of the cached records

use crate::error::{SyncError, SyncResult};
use chrono::NaiveDate;
use shared::models::SalesRecord;
use std::path::{Path, PathBuf};

pub const CSV_HEADER: &str = "日期,销售额,微信添加量,样品发出量,备注";

/// Rendered export, ready to be written or offered for download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub file_name: String,
    pub content: String,
}

impl CsvExport {
    /// Render `records` in their given order; an empty set is an error
    pub fn build(records: &[SalesRecord], today: NaiveDate) -> SyncResult<Self> {
        if records.is_empty() {
            return Err(SyncError::Export("没有数据可导出".into()));
        }
        Ok(Self {
            file_name: export_file_name(today),
            content: to_csv(records),
        })
    }

    /// Write into `dir` (created if missing), returning the file path
    pub async fn write_to(&self, dir: &Path) -> SyncResult<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| SyncError::Export(format!("无法创建目录 {}: {}", dir.display(), e)))?;

        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, self.content.as_bytes())
            .await
            .map_err(|e| SyncError::Export(format!("写入 {} 失败: {}", path.display(), e)))?;

        tracing::info!(path = %path.display(), bytes = self.content.len(), "CSV exported");
        Ok(path)
    }
}

/// `销售数据_YYYYMMDD.csv`
pub fn export_file_name(today: NaiveDate) -> String {
    format!("销售数据_{}.csv", today.format("%Y%m%d"))
}

pub fn to_csv(records: &[SalesRecord]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + records.len() * 48);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for record in records {
        out.push_str(&csv_row(record));
        out.push('\n');
    }
    out
}

/// One data line; notes are always quoted
pub fn csv_row(record: &SalesRecord) -> String {
    format!(
        "{},{},{},{},\"{}\"",
        record.date.format("%Y-%m-%d"),
        record.sales.normalize(),
        record.wechat,
        record.samples,
        record.notes.replace('"', "\"\"")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn record(date: &str, sales: Decimal, notes: &str) -> SalesRecord {
        SalesRecord {
            id: "x".into(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            sales,
            wechat: 3,
            samples: 5,
            notes: notes.into(),
            timestamp: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_row_quotes_notes() {
        let row = csv_row(&record("2024-01-15", Decimal::new(1005, 1), "he said \"hi\""));
        assert_eq!(row, "2024-01-15,100.5,3,5,\"he said \"\"hi\"\"\"");

        let row = csv_row(&record("2024-01-16", Decimal::new(20000, 2), ""));
        assert_eq!(row, "2024-01-16,200,3,5,\"\"");
    }

    #[test]
    fn test_document_layout() {
        let csv = to_csv(&[
            record("2024-01-16", Decimal::from(1), "a,b"),
            record("2024-01-15", Decimal::from(2), ""),
        ]);
        let lines: Vec<_> = csv.split('\n').collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "2024-01-16,1,3,5,\"a,b\"");
        assert_eq!(lines[2], "2024-01-15,2,3,5,\"\"");
        assert_eq!(lines[3], "");
    }

    #[test]
    fn test_empty_export_rejected() {
        let err = CsvExport::build(&[], NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()).unwrap_err();
        assert_eq!(err, SyncError::Export("没有数据可导出".into()));
    }

    #[tokio::test]
    async fn test_write_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let export = CsvExport::build(&[record("2024-03-07", Decimal::from(5), "")], today).unwrap();
        assert_eq!(export.file_name, "销售数据_20240307.csv");

        let path = export.write_to(&dir.path().join("out")).await.unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(written, export.content);
    }
}
