use chrono::{Local, NaiveDate};

/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 本地日历日期 (月度统计、默认表单日期、导出文件名都以本地日期为准)
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
