//! Terminal front end
//!
//! Reads commands from stdin, prints views and notifications. Confirm
//! prompts read from the same line feed as the command loop.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tally_client::view::{NO_DATA, format_date_zh};
use tally_client::{
    ConfirmAction, ConfirmDialog, DeskView, Notification, SalesDesk, SalesForm, Severity,
    SubmitOutcome, Toast,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

/// 编辑时输入此值清空字段
const CLEAR: &str = "-";

const HELP: &str = "\
命令:
  add <日期|today> <销售额> <微信添加> <样品发出> [备注]   添加记录
  edit <id>                                               修改记录 (回车保留原值, - 清空)
  delete <id>                                             删除记录
  list                                                    全部记录
  summary                                                 本月统计与近三天数据
  export [目录]                                           导出 CSV
  online | offline                                        模拟网络恢复 / 断开
  status                                                  连接与同步状态
  help                                                    显示帮助
  quit                                                    退出";

/// Parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(SalesForm),
    Edit(String),
    Delete(String),
    List,
    Summary,
    Export(Option<PathBuf>),
    Online,
    Offline,
    Status,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            return Err("空命令".into());
        };
        let rest: Vec<&str> = parts.collect();

        match name {
            "add" => {
                if rest.len() < 4 {
                    return Err("用法: add <日期|today> <销售额> <微信添加> <样品发出> [备注]".into());
                }
                let date = if rest[0] == "today" {
                    SalesForm::today().date
                } else {
                    rest[0].to_string()
                };
                Ok(Self::Add(SalesForm {
                    date,
                    sales: rest[1].to_string(),
                    wechat: rest[2].to_string(),
                    samples: rest[3].to_string(),
                    notes: rest[4..].join(" "),
                }))
            }
            "edit" | "delete" => {
                let [id] = rest.as_slice() else {
                    return Err(format!("用法: {name} <id>"));
                };
                Ok(if name == "edit" {
                    Self::Edit(id.to_string())
                } else {
                    Self::Delete(id.to_string())
                })
            }
            "list" => Ok(Self::List),
            "summary" => Ok(Self::Summary),
            "export" => Ok(Self::Export(rest.first().map(PathBuf::from))),
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "status" => Ok(Self::Status),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("未知命令: {other} (输入 help 查看帮助)")),
        }
    }
}

/// Stdin line feed shared by the command loop and the prompts
#[derive(Clone)]
pub struct LineFeed {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>,
}

impl LineFeed {
    /// Spawn the stdin reader
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
        });
        Self::from_receiver(rx)
    }

    pub fn from_receiver(rx: mpsc::Receiver<String>) -> Self {
        Self {
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    /// Next line; `None` at end of input
    pub async fn next_line(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }

    /// Print `prompt` and read the answer
    pub async fn ask(&self, prompt: &str) -> Option<String> {
        println!("{prompt}");
        self.next_line().await.map(|l| l.trim().to_string())
    }
}

/// Confirm dialog answered on the terminal with y / n / c
pub struct TerminalConfirm {
    lines: LineFeed,
}

impl TerminalConfirm {
    pub fn new(lines: LineFeed) -> Self {
        Self { lines }
    }
}

pub fn parse_answer(answer: &str) -> ConfirmAction {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" | "是" => ConfirmAction::Yes,
        "n" | "no" | "否" => ConfirmAction::No,
        _ => ConfirmAction::Close,
    }
}

#[async_trait]
impl ConfirmDialog for TerminalConfirm {
    async fn confirm(&self, title: &str, message: &str) -> ConfirmAction {
        let prompt = format!("【{title}】{message} [y/n/c]");
        match self.lines.ask(&prompt).await {
            Some(answer) => parse_answer(&answer),
            None => ConfirmAction::Close,
        }
    }
}

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Success => "✔",
        Severity::Error => "✖",
        Severity::Warning => "!",
        Severity::Info => "i",
    }
}

/// Print notifications as they arrive and keep the toast current
pub fn spawn_notification_printer(
    mut rx: broadcast::Receiver<Notification>,
    toast: Arc<Mutex<Toast>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    println!(
                        "[{}] {}",
                        severity_tag(notification.severity),
                        notification.message
                    );
                    toast
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .show(notification, Instant::now());
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

pub fn render_table(view: &DeskView) -> String {
    if view.is_empty() {
        return NO_DATA.to_string();
    }
    let mut out = String::new();
    for row in &view.table {
        out.push_str(&format!(
            "{:<34} {:<16} {:>12} {:>6} {:>6}  {}\n",
            row.id, row.date, row.sales, row.wechat, row.samples, row.notes
        ));
    }
    out
}

pub fn render_summary(view: &DeskView) -> String {
    let summary = &view.summary;
    let mut out = format!(
        "{}年{}月: 销售额 {}  微信添加 {}  样品发出 {}\n",
        summary.year,
        summary.month,
        summary.sales_text(),
        summary.wechat_text(),
        summary.samples_text()
    );
    if view.recent.is_empty() {
        out.push_str(NO_DATA);
        out.push('\n');
    }
    for card in &view.recent {
        out.push_str(&format!(
            "  {}  销售额: {}  微信添加: {}  样品发出: {}\n",
            card.date, card.sales, card.wechat, card.samples
        ));
    }
    out
}

/// Interactive session over a running desk
pub struct Console {
    desk: Arc<SalesDesk>,
    lines: LineFeed,
    toast: Arc<Mutex<Toast>>,
    export_dir: PathBuf,
}

impl Console {
    pub fn new(
        desk: Arc<SalesDesk>,
        lines: LineFeed,
        toast: Arc<Mutex<Toast>>,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            desk,
            lines,
            toast,
            export_dir,
        }
    }

    pub async fn run(&self) {
        println!("{HELP}");
        while let Some(line) = self.lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match Command::parse(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => self.execute(command).await,
                Err(message) => println!("{message}"),
            }
        }
    }

    async fn execute(&self, command: Command) {
        // 操作失败已通过通知显示，这里只记录日志
        match command {
            Command::Add(form) => match self.desk.submit(&form).await {
                Ok(SubmitOutcome::Declined) => println!("已取消"),
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "Submit failed"),
            },
            Command::Edit(id) => self.edit(&id).await,
            Command::Delete(id) => match self.desk.delete(&id).await {
                Ok(true) => {}
                Ok(false) => println!("未删除"),
                Err(e) => tracing::debug!(error = %e, "Delete failed"),
            },
            Command::List => print!("{}", render_table(&self.desk.view())),
            Command::Summary => print!("{}", render_summary(&self.desk.view())),
            Command::Export(dir) => {
                let dir = dir.unwrap_or_else(|| self.export_dir.clone());
                match self.desk.export_to(&dir).await {
                    Ok(path) => println!("已导出: {}", path.display()),
                    Err(e) => tracing::debug!(error = %e, "Export failed"),
                }
            }
            Command::Online => {
                if let Err(e) = self.desk.network_restored().await {
                    tracing::debug!(error = %e, "Reconnect failed");
                }
            }
            Command::Offline => self.desk.network_lost(),
            Command::Status => self.status(),
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
    }

    /// Walk the fields of the cached record
    async fn edit(&self, id: &str) {
        let Some(mut form) = self.desk.edit(id) else {
            println!("未找到记录: {id}");
            return;
        };

        let fields: [(&str, &mut String); 5] = [
            ("日期", &mut form.date),
            ("销售额", &mut form.sales),
            ("微信添加", &mut form.wechat),
            ("样品发出", &mut form.samples),
            ("备注", &mut form.notes),
        ];
        for (label, value) in fields {
            let Some(answer) = self.lines.ask(&format!("{label} [{value}]:")).await else {
                return;
            };
            apply_answer(value, answer);
        }

        match self.desk.submit(&form).await {
            Ok(SubmitOutcome::Declined) => println!("已取消"),
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Edit failed"),
        }
    }

    fn status(&self) {
        let connector = self.desk.connector();
        match connector.session() {
            Some(session) => println!(
                "已连接: {} (第 {} 次握手, {})",
                session.collection.name,
                session.generation,
                format_date_zh(session.established_at.date_naive())
            ),
            None => println!("未连接"),
        }
        let sync = self.desk.sync();
        println!(
            "同步: {}  重试次数: {}  缓存记录: {}",
            if sync.is_active() { "进行中" } else { "已停止" },
            sync.retry_count(),
            self.desk.cache().len()
        );
        let toast = self.toast.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = toast.visible(Instant::now()) {
            println!("当前通知: {}", current.message);
        }
    }
}

/// Empty input keeps the value, `-` clears it
fn apply_answer(value: &mut String, answer: String) {
    match answer.as_str() {
        "" => {}
        CLEAR => value.clear(),
        _ => *value = answer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_answers() {
        let mut notes = "雨天".to_string();
        apply_answer(&mut notes, String::new());
        assert_eq!(notes, "雨天");
        apply_answer(&mut notes, "晴天 ".into());
        assert_eq!(notes, "晴天 ");
        apply_answer(&mut notes, "-".into());
        assert_eq!(notes, "");
    }

    #[test]
    fn test_parse_add() {
        let command = Command::parse("add 2024-01-15 100.5 3 5 he said hi").unwrap();
        assert_eq!(
            command,
            Command::Add(SalesForm {
                date: "2024-01-15".into(),
                sales: "100.5".into(),
                wechat: "3".into(),
                samples: "5".into(),
                notes: "he said hi".into(),
            })
        );

        let Command::Add(form) = Command::parse("add today 1 2 3").unwrap() else {
            panic!("expected add");
        };
        assert_eq!(form.date, SalesForm::today().date);
        assert!(form.notes.is_empty());

        assert!(Command::parse("add 2024-01-15 100").is_err());
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(Command::parse("edit abc").unwrap(), Command::Edit("abc".into()));
        assert_eq!(Command::parse("delete abc").unwrap(), Command::Delete("abc".into()));
        assert!(Command::parse("delete").is_err());
        assert_eq!(Command::parse("export").unwrap(), Command::Export(None));
        assert_eq!(
            Command::parse("export /tmp/out").unwrap(),
            Command::Export(Some(PathBuf::from("/tmp/out")))
        );
        assert_eq!(Command::parse("  quit ").unwrap(), Command::Quit);
        assert!(Command::parse("dance").is_err());
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y"), ConfirmAction::Yes);
        assert_eq!(parse_answer(" YES "), ConfirmAction::Yes);
        assert_eq!(parse_answer("n"), ConfirmAction::No);
        assert_eq!(parse_answer("c"), ConfirmAction::Close);
        assert_eq!(parse_answer(""), ConfirmAction::Close);
    }

    #[tokio::test]
    async fn test_terminal_confirm_reads_shared_feed() {
        let (tx, rx) = mpsc::channel(4);
        let lines = LineFeed::from_receiver(rx);
        let dialog = TerminalConfirm::new(lines.clone());

        tx.send("y".into()).await.unwrap();
        tx.send("list".into()).await.unwrap();
        assert_eq!(dialog.confirm("t", "m").await, ConfirmAction::Yes);
        assert_eq!(lines.next_line().await.as_deref(), Some("list"));

        drop(tx);
        assert_eq!(dialog.confirm("t", "m").await, ConfirmAction::Close);
    }
}
