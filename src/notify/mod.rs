//! Notifications: chat webhooks per alert category plus a direct-message bot.

pub mod webhook;

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{FixedOffset, Utc};

use crate::ledger::CellChange;

pub use webhook::WebhookNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertChannel {
    NewOrder,
    DataChange,
    Error,
}

impl AlertChannel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewOrder => "new_order",
            Self::DataChange => "data_change",
            Self::Error => "error",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post to the webhook of `channel`.
    async fn send(&self, channel: AlertChannel, text: &str) -> Result<()>;

    /// Send a direct message to the operator chat. Delivery is best effort.
    async fn send_direct(&self, text: &str) -> Result<()>;
}

/// Timestamp used in alert texts and log rows.
pub fn alert_time(tz: &FixedOffset) -> String {
    Utc::now()
        .with_timezone(tz)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

// ── Message builders ─────────────────────────────────────────────────

pub fn new_order_message(label: &str, line: i64, order_no: &str) -> String {
    format!(
        "[New order] #{} (row {}): order {}",
        label, line, order_no
    )
}

pub fn new_dispatch_message(time: &str, line: i64, cells: &[String]) -> String {
    format!(
        "[{}] Dispatch requested on row {}\n{}",
        time,
        line,
        cells
            .iter()
            .filter(|c| !c.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" / ")
    )
}

pub fn status_change_message(time: &str, line: i64, old: &str, new: &str) -> String {
    format!(
        "[{}] Row {} status changed: {} -> {}",
        time,
        line,
        if old.is_empty() { "(blank)" } else { old },
        if new.is_empty() { "(blank)" } else { new }
    )
}

pub fn row_diff_message(time: &str, ledger: &str, line: i64, changes: &[CellChange]) -> String {
    let mut text = format!("[{}] {} row {} changed", time, ledger, line);
    for change in changes {
        text.push_str(&format!(
            "\n  {}: {} -> {}",
            change.column, change.old, change.new
        ));
    }
    text
}

pub fn error_message(task: &str, err: &anyhow::Error) -> String {
    format!("{} failed\n{:#}", task, err)
}

/// Collects messages in memory. Used by tests and dry runs.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(AlertChannel, String)>>,
    direct: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(AlertChannel, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_on(&self, channel: AlertChannel) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn direct(&self) -> Vec<String> {
        self.direct.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, channel: AlertChannel, text: &str) -> Result<()> {
        tracing::debug!(channel = channel.name(), "Recorded alert");
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((channel, text.to_string()));
        Ok(())
    }

    async fn send_direct(&self, text: &str) -> Result<()> {
        self.direct
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_message_lists_each_column() {
        let changes = vec![
            CellChange {
                column: "C".into(),
                old: "접수".into(),
                new: "배차요청".into(),
            },
            CellChange {
                column: "AH".into(),
                old: String::new(),
                new: "window seat".into(),
            },
        ];
        let text = row_diff_message("2024-05-12 10:00:00", "order", 4, &changes);
        assert!(text.starts_with("[2024-05-12 10:00:00] order row 4 changed"));
        assert!(text.contains("\n  C: 접수 -> 배차요청"));
        assert!(text.contains("\n  AH:  -> window seat"));
    }

    #[test]
    fn status_change_marks_blank_cells() {
        let text = status_change_message("t", 7, "", "배차완료");
        assert_eq!(text, "[t] Row 7 status changed: (blank) -> 배차완료");
    }

    #[test]
    fn new_order_and_dispatch_messages() {
        assert!(new_order_message("1", 4, "O-100").contains("O-100"));
        let text = new_dispatch_message("t", 5, &["2".into(), String::new(), "O-100".into()]);
        assert!(text.ends_with("2 / O-100"));
    }

    #[test]
    fn error_message_includes_cause_chain() {
        let err = anyhow::anyhow!("connection refused").context("Failed to list orders");
        let text = error_message("intake", &err);
        assert!(text.contains("intake failed"));
        assert!(text.contains("Failed to list orders: connection refused"));
    }

    #[tokio::test]
    async fn recording_notifier_keeps_channels_apart() {
        let notifier = RecordingNotifier::new();
        notifier.send(AlertChannel::NewOrder, "a").await.unwrap();
        notifier.send(AlertChannel::Error, "b").await.unwrap();
        notifier.send_direct("c").await.unwrap();

        assert_eq!(notifier.sent_on(AlertChannel::NewOrder), vec!["a".to_string()]);
        assert_eq!(notifier.sent_on(AlertChannel::DataChange), Vec::<String>::new());
        assert_eq!(notifier.direct(), vec!["c".to_string()]);
    }

    #[test]
    fn alert_time_format() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let time = alert_time(&tz);
        assert_eq!(time.len(), 19);
        assert_eq!(&time[4..5], "-");
        assert_eq!(&time[13..14], ":");
    }
}
