//! Derived views over the cached records

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use shared::models::SalesRecord;

/// Number of cards in the recent strip
pub const RECENT_LIMIT: usize = 3;

/// Placeholder shown when there is nothing to list
pub const NO_DATA: &str = "暂无销售数据";

/// Totals over the current calendar month
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub sales: Decimal,
    pub wechat: u64,
    pub samples: u64,
    /// 本月记录条数
    pub days: usize,
}

impl MonthlySummary {
    pub fn sales_text(&self) -> String {
        format_amount(self.sales)
    }

    pub fn wechat_text(&self) -> String {
        format!("{}人", self.wechat)
    }

    pub fn samples_text(&self) -> String {
        format!("{}份", self.samples)
    }
}

/// One card of the recent strip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentCard {
    pub id: String,
    /// "1月15日"
    pub date: String,
    pub sales: String,
    pub wechat: String,
    pub samples: String,
}

/// One row of the full table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub id: String,
    /// "2024年1月15日"
    pub date: String,
    pub sales: String,
    pub wechat: String,
    pub samples: String,
    /// "-" when empty
    pub notes: String,
}

/// `¥` amount with two decimals, half away from zero
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("¥{:.2}", rounded)
}

/// zh-CN long date, e.g. "2024年1月15日"
pub fn format_date_zh(date: NaiveDate) -> String {
    format!("{}年{}月{}日", date.year(), date.month(), date.day())
}

/// zh-CN month and day, e.g. "1月15日"
pub fn format_month_day_zh(date: NaiveDate) -> String {
    format!("{}月{}日", date.month(), date.day())
}

/// Sum sales, wechat adds and samples over records in `today`'s month
pub fn monthly_summary(records: &[SalesRecord], today: NaiveDate) -> MonthlySummary {
    records
        .iter()
        .filter(|r| r.date.year() == today.year() && r.date.month() == today.month())
        .fold(
            MonthlySummary {
                year: today.year(),
                month: today.month(),
                ..Default::default()
            },
            |mut acc, r| {
                acc.sales = acc.sales.checked_add(r.sales).unwrap_or(Decimal::MAX);
                acc.wechat += u64::from(r.wechat);
                acc.samples += u64::from(r.samples);
                acc.days += 1;
                acc
            },
        )
}

/// The newest records (input is already ordered newest first)
pub fn recent(records: &[SalesRecord]) -> &[SalesRecord] {
    &records[..records.len().min(RECENT_LIMIT)]
}

pub fn recent_cards(records: &[SalesRecord]) -> Vec<RecentCard> {
    recent(records)
        .iter()
        .map(|r| RecentCard {
            id: r.id.clone(),
            date: format_month_day_zh(r.date),
            sales: format_amount(r.sales),
            wechat: format!("{}人", r.wechat),
            samples: format!("{}份", r.samples),
        })
        .collect()
}

pub fn table_rows(records: &[SalesRecord]) -> Vec<TableRow> {
    records
        .iter()
        .map(|r| TableRow {
            id: r.id.clone(),
            date: format_date_zh(r.date),
            sales: format_amount(r.sales),
            wechat: format!("{}人", r.wechat),
            samples: format!("{}份", r.samples),
            notes: if r.notes.is_empty() {
                "-".to_string()
            } else {
                r.notes.clone()
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, date: (i32, u32, u32), sales: Decimal, notes: &str) -> SalesRecord {
        SalesRecord {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            sales,
            wechat: 3,
            samples: 5,
            notes: notes.to_string(),
            timestamp: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_monthly_summary_only_counts_current_month() {
        let records = vec![
            record("a", (2024, 3, 20), Decimal::new(10050, 2), ""),
            record("b", (2024, 3, 2), Decimal::new(20000, 2), ""),
            record("c", (2024, 2, 28), Decimal::new(5000, 2), ""),
            record("d", (2023, 3, 15), Decimal::new(999, 0), ""),
        ];
        let today = NaiveDate::from_ymd_opt(2024, 3, 25).unwrap();

        let summary = monthly_summary(&records, today);
        assert_eq!(summary.sales_text(), "¥300.50");
        assert_eq!(summary.wechat_text(), "6人");
        assert_eq!(summary.samples_text(), "10份");
        assert_eq!(summary.days, 2);
    }

    #[test]
    fn test_empty_month() {
        let summary = monthly_summary(&[], NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(summary.sales_text(), "¥0.00");
        assert_eq!(summary.wechat_text(), "0人");
    }

    #[test]
    fn test_monthly_summary_saturates_on_huge_amounts() {
        let huge = Decimal::MAX;
        let records = vec![
            record("a", (2024, 1, 2), huge, ""),
            record("b", (2024, 1, 1), huge, ""),
        ];

        let summary = monthly_summary(&records, NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(summary.sales, Decimal::MAX);
        assert_eq!(summary.days, 2);
    }

    #[test]
    fn test_amount_rounding() {
        assert_eq!(format_amount(Decimal::new(1005, 1)), "¥100.50");
        assert_eq!(format_amount(Decimal::new(12345, 3)), "¥12.35");
        assert_eq!(format_amount(Decimal::from(7)), "¥7.00");
    }

    #[test]
    fn test_recent_takes_first_three() {
        let records: Vec<_> = (1..=5)
            .rev()
            .map(|d| record(&d.to_string(), (2024, 1, d), Decimal::from(1), ""))
            .collect();
        let ids: Vec<_> = recent(&records).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["5", "4", "3"]);
        assert_eq!(recent(&records[..1]).len(), 1);

        let cards = recent_cards(&records);
        assert_eq!(cards[0].date, "1月5日");
    }

    #[test]
    fn test_table_rows() {
        let rows = table_rows(&[
            record("a", (2024, 1, 15), Decimal::new(1005, 1), ""),
            record("b", (2024, 1, 14), Decimal::from(80), "雨天"),
        ]);
        assert_eq!(
            rows[0],
            TableRow {
                id: "a".into(),
                date: "2024年1月15日".into(),
                sales: "¥100.50".into(),
                wechat: "3人".into(),
                samples: "5份".into(),
                notes: "-".into(),
            }
        );
        assert_eq!(rows[1].notes, "雨天");
    }
}
