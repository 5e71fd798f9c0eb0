//! The four reconciliation tasks.
//!
//! | Task               | Reads                  | Writes                                |
//! |--------------------|------------------------|---------------------------------------|
//! | `intake`           | order platform         | order ledger, `order_info`            |
//! | `order-changes`    | order ledger           | order log sheet, `order_info`         |
//! | `dispatch`         | order platform         | dispatch ledger, `dispatch_info`      |
//! | `dispatch-changes` | dispatch ledger        | dispatch log sheet, order status cell |
//!
//! Every item that allocates a ledger row runs inside one `StoreTx`, so the
//! counter advance, the ledger write and the record insert either all land
//! or the counter stays put.

mod dispatch;
mod orders;

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::Instrument;

use crate::changelog::ChangeLog;
use crate::config::BridgeConfig;
use crate::ledger::{Ledger, LedgerRow, Sheet};
use crate::notify::Notifier;
use crate::source::projection::ProjectionContext;
use crate::source::{OrderSource, Session};
use crate::store::StoreHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Task {
    /// Pull new orders from the platform into the order ledger.
    Intake,
    /// Diff open order rows against their snapshots.
    OrderChanges,
    /// Create dispatch rows for orders awaiting dispatch.
    Dispatch,
    /// Diff open dispatch rows against their snapshots.
    DispatchChanges,
}

impl Task {
    pub const ALL: [Task; 4] = [
        Task::Intake,
        Task::OrderChanges,
        Task::Dispatch,
        Task::DispatchChanges,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::OrderChanges => "order-changes",
            Self::Dispatch => "dispatch",
            Self::DispatchChanges => "dispatch-changes",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counts for one task run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    /// Items looked at.
    pub examined: usize,
    /// New ledger rows written.
    pub created: usize,
    /// Rows whose content differed from the snapshot.
    pub changed: usize,
    /// Status changes that were acted on.
    pub transitions: usize,
    pub skipped: usize,
}

impl fmt::Display for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "examined {}, created {}, changed {}, transitions {}, skipped {}",
            self.examined, self.created, self.changed, self.transitions, self.skipped
        )
    }
}

/// Outcome of one row compared with its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Unchanged,
    Changed { transition: bool },
}

impl TaskReport {
    fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Unchanged => self.skipped += 1,
            RowOutcome::Changed { transition } => {
                self.changed += 1;
                if transition {
                    self.transitions += 1;
                }
            }
        }
    }
}

pub struct Reconciler {
    config: Arc<BridgeConfig>,
    store: StoreHandle,
    ledger: Arc<dyn Ledger>,
    source: Arc<dyn OrderSource>,
    notifier: Arc<dyn Notifier>,
    order_log: ChangeLog,
    dispatch_log: ChangeLog,
}

impl Reconciler {
    pub fn new(
        config: Arc<BridgeConfig>,
        store: StoreHandle,
        ledger: Arc<dyn Ledger>,
        source: Arc<dyn OrderSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let order_log = ChangeLog::new(
            config.files.order_log_dir.clone(),
            config.files.order_log_prefix.clone(),
        );
        let dispatch_log = ChangeLog::new(
            config.files.dispatch_log_dir.clone(),
            config.files.dispatch_log_prefix.clone(),
        );
        Self {
            config,
            store,
            ledger,
            source,
            notifier,
            order_log,
            dispatch_log,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn order_log(&self) -> &ChangeLog {
        &self.order_log
    }

    pub fn dispatch_log(&self) -> &ChangeLog {
        &self.dispatch_log
    }

    /// Run one task to completion inside a span named after it.
    pub async fn run(&self, task: Task, session: &mut Session) -> Result<TaskReport> {
        let span = tracing::info_span!("task", task = task.name());
        async {
            let report = match task {
                Task::Intake => self.intake_orders(session).await,
                Task::OrderChanges => self.detect_order_changes().await,
                Task::Dispatch => self.promote_dispatches(session).await,
                Task::DispatchChanges => self.detect_dispatch_changes().await,
            }?;
            if report.created > 0 || report.changed > 0 {
                tracing::info!(%report, "Task finished");
            } else {
                tracing::debug!(%report, "Task finished");
            }
            Ok(report)
        }
        .instrument(span)
        .await
    }

    fn projection(&self) -> ProjectionContext<'_> {
        ProjectionContext {
            products: &self.config.source.products,
            dispatch: &self.config.dispatch,
            row_label_offset: self.config.sheets.row_label_offset,
            timezone: self.config.schedule.timezone(),
        }
    }

    /// A row as it will read back from `sheet`.
    fn fit(&self, sheet: Sheet, row: LedgerRow) -> LedgerRow {
        LedgerRow::padded(row.into_cells(), self.config.sheets.range(sheet).width())
    }

    /// The stored snapshot of a row, widened the same way as a fresh read.
    fn stored_row(&self, sheet: Sheet, snapshot: &str) -> Result<LedgerRow> {
        let row = LedgerRow::decode_snapshot(snapshot)
            .with_context(|| format!("Failed to decode {} snapshot", sheet.name()))?;
        Ok(self.fit(sheet, row))
    }

    /// Sheet column index of a range's first column.
    fn first_column(&self, sheet: Sheet) -> Result<usize> {
        Ok(self.config.sheets.first_column(sheet)?)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the task tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::ledger::memory::MemoryLedger;
    use crate::notify::RecordingNotifier;
    use crate::source::{Order, Orderer, ProductItem, ProductOrder};
    use crate::store::LineNumbers;

    /// Order source answering from a fixed list.
    #[derive(Default)]
    pub struct ScriptedSource {
        pub orders: Mutex<Vec<Order>>,
        pub details: Mutex<HashMap<String, Order>>,
    }

    impl ScriptedSource {
        pub fn with_orders(orders: Vec<Order>) -> Self {
            let details = orders
                .iter()
                .map(|o| (o.order_no.clone(), o.clone()))
                .collect();
            Self {
                orders: Mutex::new(orders),
                details: Mutex::new(details),
            }
        }
    }

    #[async_trait]
    impl OrderSource for ScriptedSource {
        async fn list_orders(
            &self,
            _session: &mut Session,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<Order>> {
            Ok(self.orders.lock().unwrap().clone())
        }

        async fn order_detail(&self, _session: &mut Session, order_no: &str) -> Result<Option<Order>> {
            Ok(self.details.lock().unwrap().get(order_no).cloned())
        }
    }

    pub fn order(order_no: &str) -> Order {
        Order {
            order_no: order_no.to_string(),
            order_time: 1_715_475_600,
            orderer: Orderer {
                name: "Kim".into(),
                email: "kim@example.com".into(),
                call: "010-1234-5678".into(),
                ..Orderer::default()
            },
            ..Order::default()
        }
        .with_product_order(ProductOrder {
            items: vec![ProductItem {
                prod_no: 133,
                prod_name: "Private taxi".into(),
                ..ProductItem::default()
            }],
            ..ProductOrder::default()
        })
    }

    pub struct Harness {
        pub reconciler: Reconciler,
        pub ledger: Arc<MemoryLedger>,
        pub source: Arc<ScriptedSource>,
        pub notifier: Arc<RecordingNotifier>,
        pub store: StoreHandle,
        pub _dir: tempfile::TempDir,
    }

    pub async fn harness(orders: Vec<Order>) -> Harness {
        harness_with(orders, |_| {}).await
    }

    /// Like `harness`, with `edit` applied to the default configuration.
    pub async fn harness_with(orders: Vec<Order>, edit: impl FnOnce(&mut BridgeConfig)) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BridgeConfig::default();
        config.files.order_log_dir = dir.path().join("order");
        config.files.dispatch_log_dir = dir.path().join("dispatch");
        edit(&mut config);

        let store = StoreHandle::in_memory().unwrap();
        store
            .call(|db| db.ensure_line_numbers(&LineNumbers::starting_at(3)))
            .await
            .unwrap();
        let ledger = Arc::new(MemoryLedger::new(config.sheets.clone()));
        let source = Arc::new(ScriptedSource::with_orders(orders));
        let notifier = Arc::new(RecordingNotifier::new());
        let reconciler = Reconciler::new(
            Arc::new(config),
            store.clone(),
            ledger.clone(),
            source.clone(),
            notifier.clone(),
        );
        Harness {
            reconciler,
            ledger,
            source,
            notifier,
            store,
            _dir: dir,
        }
    }
}
