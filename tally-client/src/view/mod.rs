//! View layer - 表单、投影、导出与桌面控制器

mod desk;
mod export;
mod form;
mod projection;

pub use desk::{ConfirmAction, ConfirmDialog, DeskView, SalesDesk, SubmitOutcome};
pub use export::{CSV_HEADER, CsvExport, csv_row, export_file_name, to_csv};
pub use form::{MAX_SALES, SalesForm};
pub use projection::{
    MonthlySummary, NO_DATA, RECENT_LIMIT, RecentCard, TableRow, format_amount, format_date_zh,
    format_month_day_zh, monthly_summary, recent, recent_cards, table_rows,
};
