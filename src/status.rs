//! Order and dispatch status enums.
//!
//! Both ledgers carry their status as a free-text cell that operators edit by
//! hand, so the enums round-trip through the exact label text shown on the
//! sheet.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Initial status right after intake.
    #[serde(rename = "접수")]
    Receipt,
    /// Operator checked the order and asked for a vehicle.
    #[serde(rename = "배차요청")]
    DispatchRequest,
    #[serde(rename = "배차완료")]
    DispatchDone,
    /// Dispatch details were sent to the customer.
    #[serde(rename = "전송완료")]
    DispatchSend,
    #[serde(rename = "전체완료")]
    Done,
    #[serde(rename = "정보오류")]
    InfoError,
    #[serde(rename = "배차실패")]
    DispatchFail,
    #[serde(rename = "취소완료")]
    Cancel,
    /// Pickup time or vehicle changed after dispatch.
    #[serde(rename = "배차변경")]
    DispatchChange,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        Self::Receipt,
        Self::DispatchRequest,
        Self::DispatchDone,
        Self::DispatchSend,
        Self::Done,
        Self::InfoError,
        Self::DispatchFail,
        Self::Cancel,
        Self::DispatchChange,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Receipt => "접수",
            Self::DispatchRequest => "배차요청",
            Self::DispatchDone => "배차완료",
            Self::DispatchSend => "전송완료",
            Self::Done => "전체완료",
            Self::InfoError => "정보오류",
            Self::DispatchFail => "배차실패",
            Self::Cancel => "취소완료",
            Self::DispatchChange => "배차변경",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancel)
    }

    /// Labels of the terminal statuses, for `NOT IN (...)` queries.
    pub fn terminal_labels() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|s| s.is_terminal())
            .map(|s| s.label())
            .collect()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.label() == s)
            .ok_or_else(|| format!("Invalid order status: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DispatchStatus {
    /// Nothing entered yet. An empty status cell reads as this.
    #[serde(rename = "미입력")]
    Init,
    #[serde(rename = "확인중")]
    Checking,
    #[serde(rename = "미배차")]
    DispatchNo,
    #[serde(rename = "배차완료")]
    DispatchDone,
    #[serde(rename = "취소")]
    Cancel,
    #[serde(rename = "지니변경")]
    ChangeJini,
    #[serde(rename = "예약변경확인완료")]
    CheckChangeBook,
    #[serde(rename = "예정")]
    Expected,
    #[serde(rename = "대기중")]
    Waiting,
    #[serde(rename = "종료")]
    Done,
}

impl DispatchStatus {
    pub const ALL: [DispatchStatus; 10] = [
        Self::Init,
        Self::Checking,
        Self::DispatchNo,
        Self::DispatchDone,
        Self::Cancel,
        Self::ChangeJini,
        Self::CheckChangeBook,
        Self::Expected,
        Self::Waiting,
        Self::Done,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Init => "미입력",
            Self::Checking => "확인중",
            Self::DispatchNo => "미배차",
            Self::DispatchDone => "배차완료",
            Self::Cancel => "취소",
            Self::ChangeJini => "지니변경",
            Self::CheckChangeBook => "예약변경확인완료",
            Self::Expected => "예정",
            Self::Waiting => "대기중",
            Self::Done => "종료",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancel)
    }

    pub fn terminal_labels() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|s| s.is_terminal())
            .map(|s| s.label())
            .collect()
    }

    /// Read a status cell from the dispatch ledger. Blank cells are `Init`.
    pub fn from_cell(cell: &str) -> Result<Self, String> {
        if cell.trim().is_empty() {
            return Ok(Self::Init);
        }
        cell.parse()
    }
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DispatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.label() == s)
            .ok_or_else(|| format!("Invalid dispatch status: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_status_labels_round_trip() {
        for status in OrderStatus::ALL {
            assert_eq!(status.label().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!(" 배차요청 ".parse::<OrderStatus>().unwrap(), OrderStatus::DispatchRequest);
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn dispatch_status_blank_cell_is_init() {
        assert_eq!(DispatchStatus::from_cell("").unwrap(), DispatchStatus::Init);
        assert_eq!(DispatchStatus::from_cell("  ").unwrap(), DispatchStatus::Init);
        assert_eq!(
            DispatchStatus::from_cell("배차완료").unwrap(),
            DispatchStatus::DispatchDone
        );
        assert!(DispatchStatus::from_cell("???").is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Done.is_terminal());
        assert!(OrderStatus::Cancel.is_terminal());
        assert!(!OrderStatus::DispatchChange.is_terminal());
        assert_eq!(OrderStatus::terminal_labels(), vec!["전체완료", "취소완료"]);

        assert!(DispatchStatus::Cancel.is_terminal());
        assert!(DispatchStatus::Done.is_terminal());
        assert!(!DispatchStatus::Waiting.is_terminal());
        assert_eq!(DispatchStatus::terminal_labels(), vec!["취소", "종료"]);
    }

    #[test]
    fn serde_uses_ledger_labels() {
        let json = serde_json::to_string(&OrderStatus::DispatchFail).unwrap();
        assert_eq!(json, "\"배차실패\"");
        let parsed: DispatchStatus = serde_json::from_str("\"예약변경확인완료\"").unwrap();
        assert_eq!(parsed, DispatchStatus::CheckChangeBook);
    }
}
