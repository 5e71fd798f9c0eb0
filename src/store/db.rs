use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use super::models::*;
use crate::errors::StoreError;
use crate::status::{DispatchStatus, OrderStatus};

const ORDER_COLUMNS: &str = "id, external_id, line, status, snapshot";
const DISPATCH_COLUMNS: &str = "id, order_id, line, status, snapshot";

pub struct ShadowDb {
    conn: Connection,
}

fn read_order(row: &Row<'_>) -> rusqlite::Result<OrderRecord> {
    Ok(OrderRecord {
        id: row.get(0)?,
        external_id: row.get(1)?,
        line: row.get(2)?,
        status: row.get(3)?,
        snapshot: row.get(4)?,
    })
}

fn read_dispatch(row: &Row<'_>) -> rusqlite::Result<DispatchRecord> {
    Ok(DispatchRecord {
        id: row.get(0)?,
        order_id: row.get(1)?,
        line: row.get(2)?,
        status: row.get(3)?,
        snapshot: row.get(4)?,
    })
}

/// `?1, ?2, ...` for an `IN (...)` list.
fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

impl ShadowDb {
    /// Open (or create) the database at `path` and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing and dry runs).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS line_numbers (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    order_line INTEGER NOT NULL,
                    order_log_line INTEGER NOT NULL,
                    dispatch_line INTEGER NOT NULL,
                    dispatch_log_line INTEGER NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS order_info (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    external_id TEXT NOT NULL UNIQUE,
                    line INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    snapshot TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS dispatch_info (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    order_id INTEGER NOT NULL UNIQUE REFERENCES order_info(id),
                    line INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    snapshot TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_order_info_status ON order_info(status);
                CREATE INDEX IF NOT EXISTS idx_dispatch_info_status ON dispatch_info(status);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    pub(super) fn execute_batch(&self, sql: &str) -> rusqlite::Result<()> {
        self.conn.execute_batch(sql)
    }

    // ── Line numbers ──────────────────────────────────────────────────

    /// Seed the counters once. Returns `false` when they already exist.
    pub fn ensure_line_numbers(&self, initial: &LineNumbers) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO line_numbers
                 (id, order_line, order_log_line, dispatch_line, dispatch_log_line)
                 VALUES (1, ?1, ?2, ?3, ?4)",
                params![
                    initial.order,
                    initial.order_log,
                    initial.dispatch,
                    initial.dispatch_log
                ],
            )
            .context("Failed to seed line numbers")?;
        Ok(inserted == 1)
    }

    pub fn line_numbers(&self) -> Result<LineNumbers> {
        let numbers = self
            .conn
            .query_row(
                "SELECT order_line, order_log_line, dispatch_line, dispatch_log_line
                 FROM line_numbers WHERE id = 1",
                [],
                |row| {
                    Ok(LineNumbers {
                        order: row.get(0)?,
                        order_log: row.get(1)?,
                        dispatch: row.get(2)?,
                        dispatch_log: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)?;
        Ok(numbers.ok_or(StoreError::LineNumberMissing)?)
    }

    pub fn save_line_numbers(&self, numbers: &LineNumbers) -> Result<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE line_numbers
                 SET order_line = ?1, order_log_line = ?2, dispatch_line = ?3,
                     dispatch_log_line = ?4, updated_at = datetime('now')
                 WHERE id = 1",
                params![
                    numbers.order,
                    numbers.order_log,
                    numbers.dispatch,
                    numbers.dispatch_log
                ],
            )
            .context("Failed to save line numbers")?;
        if updated == 0 {
            return Err(StoreError::LineNumberMissing.into());
        }
        Ok(())
    }

    // ── Orders ────────────────────────────────────────────────────────

    pub fn insert_order(
        &self,
        external_id: &str,
        line: i64,
        status: &str,
        snapshot: &str,
    ) -> Result<OrderRecord> {
        self.conn
            .execute(
                "INSERT INTO order_info (external_id, line, status, snapshot)
                 VALUES (?1, ?2, ?3, ?4)",
                params![external_id, line, status, snapshot],
            )
            .with_context(|| format!("Failed to insert order {}", external_id))?;
        let id = self.conn.last_insert_rowid();
        self.get_order(id)?
            .context("Order not found after insert")
    }

    pub fn get_order(&self, id: i64) -> Result<Option<OrderRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM order_info WHERE id = ?1", ORDER_COLUMNS),
                params![id],
                read_order,
            )
            .optional()
            .context("Failed to query order")
    }

    pub fn find_order_by_external_id(&self, external_id: &str) -> Result<Option<OrderRecord>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM order_info WHERE external_id = ?1",
                    ORDER_COLUMNS
                ),
                params![external_id],
                read_order,
            )
            .optional()
            .context("Failed to query order by external id")
    }

    pub fn update_order_snapshot(&self, id: i64, status: &str, snapshot: &str) -> Result<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE order_info SET status = ?1, snapshot = ?2, updated_at = datetime('now')
                 WHERE id = ?3",
                params![status, snapshot, id],
            )
            .context("Failed to update order snapshot")?;
        if updated == 0 {
            return Err(StoreError::RecordNotFound { kind: "order", id }.into());
        }
        Ok(())
    }

    fn query_orders(&self, sql: &str, args: &[&str]) -> Result<Vec<OrderRecord>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare order query")?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), read_order)
            .context("Failed to query orders")?;
        let mut orders = Vec::new();
        for row in rows {
            orders.push(row.context("Failed to read order row")?);
        }
        Ok(orders)
    }

    /// Orders whose status is not terminal, in ledger order.
    pub fn open_orders(&self) -> Result<Vec<OrderRecord>> {
        let terminal = OrderStatus::terminal_labels();
        self.query_orders(
            &format!(
                "SELECT {} FROM order_info WHERE status NOT IN ({}) ORDER BY line",
                ORDER_COLUMNS,
                placeholders(terminal.len())
            ),
            &terminal,
        )
    }

    /// Orders in the dispatch-requested status with no dispatch row yet.
    pub fn orders_awaiting_dispatch(&self) -> Result<Vec<OrderRecord>> {
        self.query_orders(
            &format!(
                "SELECT {} FROM order_info o
                 WHERE o.status = ?1
                   AND NOT EXISTS (SELECT 1 FROM dispatch_info d WHERE d.order_id = o.id)
                 ORDER BY o.line",
                ORDER_COLUMNS
            ),
            &[OrderStatus::DispatchRequest.label()],
        )
    }

    // ── Dispatches ────────────────────────────────────────────────────

    pub fn insert_dispatch(
        &self,
        order_id: i64,
        line: i64,
        status: &str,
        snapshot: &str,
    ) -> Result<DispatchRecord> {
        self.conn
            .execute(
                "INSERT INTO dispatch_info (order_id, line, status, snapshot)
                 VALUES (?1, ?2, ?3, ?4)",
                params![order_id, line, status, snapshot],
            )
            .with_context(|| format!("Failed to insert dispatch for order {}", order_id))?;
        let id = self.conn.last_insert_rowid();
        self.get_dispatch(id)?
            .context("Dispatch not found after insert")
    }

    pub fn get_dispatch(&self, id: i64) -> Result<Option<DispatchRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM dispatch_info WHERE id = ?1", DISPATCH_COLUMNS),
                params![id],
                read_dispatch,
            )
            .optional()
            .context("Failed to query dispatch")
    }

    pub fn dispatch_for_order(&self, order_id: i64) -> Result<Option<DispatchRecord>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM dispatch_info WHERE order_id = ?1",
                    DISPATCH_COLUMNS
                ),
                params![order_id],
                read_dispatch,
            )
            .optional()
            .context("Failed to query dispatch by order")
    }

    pub fn update_dispatch_snapshot(&self, id: i64, status: &str, snapshot: &str) -> Result<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE dispatch_info SET status = ?1, snapshot = ?2, updated_at = datetime('now')
                 WHERE id = ?3",
                params![status, snapshot, id],
            )
            .context("Failed to update dispatch snapshot")?;
        if updated == 0 {
            return Err(StoreError::RecordNotFound {
                kind: "dispatch",
                id,
            }
            .into());
        }
        Ok(())
    }

    /// Dispatches whose status is not terminal, in ledger order.
    pub fn open_dispatches(&self) -> Result<Vec<DispatchRecord>> {
        let terminal = DispatchStatus::terminal_labels();
        let sql = format!(
            "SELECT {} FROM dispatch_info WHERE status NOT IN ({}) ORDER BY line",
            DISPATCH_COLUMNS,
            placeholders(terminal.len())
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare open_dispatches")?;
        let rows = stmt
            .query_map(params_from_iter(terminal.iter()), read_dispatch)
            .context("Failed to query dispatches")?;
        let mut dispatches = Vec::new();
        for row in rows {
            dispatches.push(row.context("Failed to read dispatch row")?);
        }
        Ok(dispatches)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let count = |sql: &str, args: &[&str]| -> Result<i64> {
            self.conn
                .query_row(sql, params_from_iter(args.iter()), |row| row.get(0))
                .context("Failed to count records")
        };
        let order_terminal = OrderStatus::terminal_labels();
        let dispatch_terminal = DispatchStatus::terminal_labels();
        Ok(StoreCounts {
            orders: count("SELECT COUNT(*) FROM order_info", &[])?,
            open_orders: count(
                &format!(
                    "SELECT COUNT(*) FROM order_info WHERE status NOT IN ({})",
                    placeholders(order_terminal.len())
                ),
                &order_terminal,
            )?,
            dispatches: count("SELECT COUNT(*) FROM dispatch_info", &[])?,
            open_dispatches: count(
                &format!(
                    "SELECT COUNT(*) FROM dispatch_info WHERE status NOT IN ({})",
                    placeholders(dispatch_terminal.len())
                ),
                &dispatch_terminal,
            )?,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
