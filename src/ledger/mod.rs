//! Spreadsheet ledger.
//!
//! The ledger is four row-addressable ranges (orders, order log, dispatch,
//! dispatch log). Every logical record occupies exactly one row; operators
//! edit those rows by hand and the bridge notices by comparing the row it
//! reads back against the snapshot it stored last time.
//!
//! | Module   | Responsibility                                        |
//! |----------|-------------------------------------------------------|
//! | `a1`     | Column letters and `Tab!B4:AK4` ranges                |
//! | `sheets` | `SheetsLedger`, the REST client for the hosted sheet  |
//! | `memory` | `MemoryLedger`, an in-process ledger for tests        |

pub mod a1;
pub mod memory;
pub mod sheets;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryLedger;
pub use sheets::SheetsLedger;

/// Current snapshot encoding version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Separator of the pre-versioned snapshot format.
pub const LEGACY_DELIMITER: char = '|';

/// The four named ranges of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sheet {
    Order,
    OrderLog,
    Dispatch,
    DispatchLog,
}

impl Sheet {
    pub const ALL: [Sheet; 4] = [
        Sheet::Order,
        Sheet::OrderLog,
        Sheet::Dispatch,
        Sheet::DispatchLog,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::OrderLog => "order_log",
            Self::Dispatch => "dispatch",
            Self::DispatchLog => "dispatch_log",
        }
    }
}

/// One ledger row, as an ordered list of cell values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerRow {
    cells: Vec<String>,
}

/// A single cell that differs between two versions of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellChange {
    pub column: String,
    pub old: String,
    pub new: String,
}

#[derive(Serialize, Deserialize)]
struct EncodedSnapshot {
    v: u32,
    cells: Vec<String>,
}

impl LedgerRow {
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    /// Pad with blank cells (or truncate) to exactly `width` cells.
    ///
    /// The hosted sheet drops trailing blank cells on read, so rows are
    /// always normalized to the range width before comparing or storing.
    pub fn padded(mut cells: Vec<String>, width: usize) -> Self {
        cells.resize(width, String::new());
        Self { cells }
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn into_cells(self) -> Vec<String> {
        self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.is_empty())
    }

    /// Cell at `index`, blank when the row is shorter.
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn set_cell(&mut self, index: usize, value: impl Into<String>) {
        if index >= self.cells.len() {
            self.cells.resize(index + 1, String::new());
        }
        self.cells[index] = value.into();
    }

    /// A new row with `first` in front of these cells (log sheet layout).
    pub fn prepended(&self, first: impl Into<String>) -> Self {
        let mut cells = Vec::with_capacity(self.cells.len() + 1);
        cells.push(first.into());
        cells.extend(self.cells.iter().cloned());
        Self { cells }
    }

    /// Serialize into the stored snapshot form.
    pub fn encode_snapshot(&self) -> Result<String> {
        serde_json::to_string(&EncodedSnapshot {
            v: SNAPSHOT_VERSION,
            cells: self.cells.clone(),
        })
        .context("Failed to encode row snapshot")
    }

    /// Parse a stored snapshot. Accepts the versioned JSON encoding and the
    /// legacy `|`-joined form.
    pub fn decode_snapshot(snapshot: &str) -> Result<Self> {
        if snapshot.trim_start().starts_with('{')
            && let Ok(encoded) = serde_json::from_str::<EncodedSnapshot>(snapshot)
        {
            if encoded.v != SNAPSHOT_VERSION {
                anyhow::bail!("Unsupported snapshot version {}", encoded.v);
            }
            return Ok(Self {
                cells: encoded.cells,
            });
        }
        Ok(Self {
            cells: snapshot.split(LEGACY_DELIMITER).map(str::to_string).collect(),
        })
    }

    /// Cells that differ from `newer`, labelled with sheet column letters.
    /// `first_column` is the zero-based sheet column of cell 0.
    pub fn diff(&self, newer: &LedgerRow, first_column: usize) -> Vec<CellChange> {
        let width = self.cells.len().max(newer.cells.len());
        (0..width)
            .filter(|i| self.cell(*i) != newer.cell(*i))
            .map(|i| CellChange {
                column: a1::column_letter(first_column + i),
                old: self.cell(i).to_string(),
                new: newer.cell(i).to_string(),
            })
            .collect()
    }
}

impl From<Vec<String>> for LedgerRow {
    fn from(cells: Vec<String>) -> Self {
        Self::new(cells)
    }
}

/// Row-addressable access to the ledger. Rows are 1-based sheet rows.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Read one row, padded to the width of the sheet's range.
    async fn read_row(&self, sheet: Sheet, row: i64) -> Result<LedgerRow>;

    /// Overwrite one row starting at the range's first column.
    async fn write_row(&self, sheet: Sheet, row: i64, cells: &LedgerRow) -> Result<()>;

    /// Overwrite a single cell.
    async fn write_cell(&self, sheet: Sheet, column: &str, row: i64, value: &str) -> Result<()>;
}
