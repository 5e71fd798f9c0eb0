use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::{Ledger, LedgerRow, Sheet};
use crate::config::SheetsConfig;

/// In-process ledger keyed by `(sheet, row)`.
///
/// Behaves like the hosted sheet for the bridge's purposes: rows are padded
/// to the range width on read and unknown rows read as blank.
pub struct MemoryLedger {
    sheets: SheetsConfig,
    rows: Mutex<HashMap<(Sheet, i64), Vec<String>>>,
    writes: Mutex<Vec<(Sheet, i64)>>,
}

impl MemoryLedger {
    pub fn new(sheets: SheetsConfig) -> Self {
        Self {
            sheets,
            rows: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Put a row in place without recording a write (operator edit).
    pub fn set_row(&self, sheet: Sheet, row: i64, cells: Vec<String>) {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.insert((sheet, row), cells);
    }

    /// Edit one cell by position without recording a write (operator edit).
    pub fn edit_cell(&self, sheet: Sheet, row: i64, index: usize, value: &str) {
        let width = self.sheets.range(sheet).width();
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let cells = rows.entry((sheet, row)).or_insert_with(|| vec![String::new(); width]);
        if cells.len() <= index {
            cells.resize(index + 1, String::new());
        }
        cells[index] = value.to_string();
    }

    pub fn row(&self, sheet: Sheet, row: i64) -> Option<LedgerRow> {
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        rows.get(&(sheet, row)).cloned().map(LedgerRow::new)
    }

    /// Every write made through the `Ledger` trait, in order.
    pub fn writes(&self) -> Vec<(Sheet, i64)> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record_write(&self, sheet: Sheet, row: i64) {
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((sheet, row));
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn read_row(&self, sheet: Sheet, row: i64) -> Result<LedgerRow> {
        let width = self.sheets.range(sheet).width();
        let rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        let cells = rows.get(&(sheet, row)).cloned().unwrap_or_default();
        Ok(LedgerRow::padded(cells, width))
    }

    async fn write_row(&self, sheet: Sheet, row: i64, cells: &LedgerRow) -> Result<()> {
        let width = self.sheets.range(sheet).width();
        if cells.len() > width {
            anyhow::bail!(
                "Row has {} cells but the {} range is {} wide",
                cells.len(),
                sheet.name(),
                width
            );
        }
        {
            let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
            let entry = rows.entry((sheet, row)).or_default();
            if entry.len() < cells.len() {
                entry.resize(cells.len(), String::new());
            }
            for (i, cell) in cells.cells().iter().enumerate() {
                entry[i] = cell.clone();
            }
        }
        self.record_write(sheet, row);
        Ok(())
    }

    async fn write_cell(&self, sheet: Sheet, column: &str, row: i64, value: &str) -> Result<()> {
        let range = self.sheets.range(sheet);
        let index = range.offset_of(column).ok_or_else(|| {
            anyhow::anyhow!(
                "Column {} is outside the {} range {}:{}",
                column,
                sheet.name(),
                range.start,
                range.end
            )
        })?;
        self.edit_cell(sheet, row, index, value);
        self.record_write(sheet, row);
        Ok(())
    }
}
