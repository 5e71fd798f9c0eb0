use serde::Serialize;

use crate::config::SheetsConfig;
use crate::status::{DispatchStatus, OrderStatus};

/// The four ledger line counters. Each holds the last row written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineNumbers {
    pub order: i64,
    pub order_log: i64,
    pub dispatch: i64,
    pub dispatch_log: i64,
}

impl LineNumbers {
    /// Every counter at the same starting row.
    pub fn starting_at(line: i64) -> Self {
        Self {
            order: line,
            order_log: line,
            dispatch: line,
            dispatch_log: line,
        }
    }

    /// Counters before anything is written: each range's configured first line.
    pub fn initial(sheets: &SheetsConfig) -> Self {
        Self {
            order: sheets.order.start_line,
            order_log: sheets.order_log.start_line,
            dispatch: sheets.dispatch.start_line,
            dispatch_log: sheets.dispatch_log.start_line,
        }
    }
}

/// Shadow of one order ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderRecord {
    pub id: i64,
    pub external_id: String,
    pub line: i64,
    /// Status cell text as last seen on the ledger.
    pub status: String,
    pub snapshot: String,
}

impl OrderRecord {
    /// Parsed status; `None` when operators typed something unknown.
    pub fn order_status(&self) -> Option<OrderStatus> {
        self.status.parse().ok()
    }
}

/// Shadow of one dispatch ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRecord {
    pub id: i64,
    pub order_id: i64,
    pub line: i64,
    pub status: String,
    pub snapshot: String,
}

impl DispatchRecord {
    pub fn dispatch_status(&self) -> Option<DispatchStatus> {
        DispatchStatus::from_cell(&self.status).ok()
    }
}

/// Record counts shown by `orderbridge status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub orders: i64,
    pub open_orders: i64,
    pub dispatches: i64,
    pub open_dispatches: i64,
}
