//! End-to-end reconciliation scenarios
//!
//! Drives the four tasks against an in-memory ledger, a scripted order
//! source and a recording notifier, the way the scheduler would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use orderbridge::config::BridgeConfig;
use orderbridge::ledger::{MemoryLedger, Sheet};
use orderbridge::notify::{AlertChannel, RecordingNotifier};
use orderbridge::reconcile::{Reconciler, Task};
use orderbridge::source::{Order, OrderSource, Orderer, ProductItem, ProductOrder, Session};
use orderbridge::status::{DispatchStatus, OrderStatus};
use orderbridge::store::{LineNumbers, StoreHandle};

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Default)]
struct ScriptedSource {
    orders: Mutex<Vec<Order>>,
    list_calls: Mutex<usize>,
}

impl ScriptedSource {
    fn push(&self, order: Order) {
        self.orders.lock().unwrap().push(order);
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
        *self.list_calls.lock().unwrap() += 1;
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn order_detail(&self, _session: &mut Session, order_no: &str) -> Result<Option<Order>> {
        let by_no: HashMap<String, Order> = self
            .orders
            .lock()
            .unwrap()
            .iter()
            .map(|o| (o.order_no.clone(), o.clone()))
            .collect();
        Ok(by_no.get(order_no).cloned())
    }
}

fn platform_order(order_no: &str, prod_no: i64) -> Order {
    Order {
        order_no: order_no.to_string(),
        order_time: 1_715_475_600,
        orderer: Orderer {
            name: "Lee".into(),
            email: "lee@example.com".into(),
            call: "010-0000-1111".into(),
            ..Orderer::default()
        },
        ..Order::default()
    }
    .with_product_order(ProductOrder {
        items: vec![ProductItem {
            prod_no,
            prod_name: "Airport pickup".into(),
            ..ProductItem::default()
        }],
        ..ProductOrder::default()
    })
}

struct Bridge {
    reconciler: Reconciler,
    ledger: Arc<MemoryLedger>,
    source: Arc<ScriptedSource>,
    notifier: Arc<RecordingNotifier>,
    store: StoreHandle,
    session: Session,
    _dir: TempDir,
}

impl Bridge {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = BridgeConfig::default();
        config.files.order_log_dir = dir.path().join("order");
        config.files.dispatch_log_dir = dir.path().join("dispatch");

        let store = StoreHandle::in_memory().unwrap();
        let initial = LineNumbers::initial(&config.sheets);
        store
            .call(move |db| db.ensure_line_numbers(&initial))
            .await
            .unwrap();

        let ledger = Arc::new(MemoryLedger::new(config.sheets.clone()));
        let source = Arc::new(ScriptedSource::default());
        let notifier = Arc::new(RecordingNotifier::new());
        let reconciler = Reconciler::new(
            Arc::new(config),
            store.clone(),
            ledger.clone(),
            source.clone(),
            notifier.clone(),
        );
        Self {
            reconciler,
            ledger,
            source,
            notifier,
            store,
            session: Session::new(),
            _dir: dir,
        }
    }

    async fn run(&mut self, task: Task) -> orderbridge::reconcile::TaskReport {
        self.reconciler.run(task, &mut self.session).await.unwrap()
    }

    async fn numbers(&self) -> LineNumbers {
        self.store.call(|db| db.line_numbers()).await.unwrap()
    }

    async fn order_status(&self, order_no: &str) -> String {
        let order_no = order_no.to_string();
        self.store
            .call(move |db| db.find_order_by_external_id(&order_no))
            .await
            .unwrap()
            .unwrap()
            .status
    }
}

// =============================================================================
// Intake
// =============================================================================

#[tokio::test]
async fn new_order_lands_on_next_row() {
    let mut bridge = Bridge::new().await;
    let before = bridge.numbers().await;
    bridge.source.push(platform_order("O-100", 83));

    let report = bridge.run(Task::Intake).await;

    assert_eq!(report.created, 1);
    let after = bridge.numbers().await;
    assert_eq!(after.order, before.order + 1);
    assert_eq!(bridge.order_status("O-100").await, OrderStatus::Receipt.label());
    let row = bridge.ledger.row(Sheet::Order, after.order).unwrap();
    assert_eq!(row.cell(9), "O-100");

    let alerts = bridge.notifier.sent_on(AlertChannel::NewOrder);
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].contains("O-100"));
}

#[tokio::test]
async fn repeated_intake_creates_no_duplicates() {
    let mut bridge = Bridge::new().await;
    bridge.source.push(platform_order("O-100", 83));
    bridge.run(Task::Intake).await;
    bridge.source.push(platform_order("O-101", 122));

    let report = bridge.run(Task::Intake).await;

    assert_eq!(report.created, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(bridge.numbers().await.order, 5);
    assert_eq!(*bridge.source.list_calls.lock().unwrap(), 2);
    let rows: Vec<_> = bridge
        .ledger
        .writes()
        .into_iter()
        .filter(|(sheet, _)| *sheet == Sheet::Order)
        .map(|(_, row)| row)
        .collect();
    assert_eq!(rows, vec![4, 5]);
}

// =============================================================================
// Order changes
// =============================================================================

#[tokio::test]
async fn untouched_rows_cause_no_writes_or_alerts() {
    let mut bridge = Bridge::new().await;
    bridge.source.push(platform_order("O-100", 83));
    bridge.run(Task::Intake).await;
    let writes = bridge.ledger.writes().len();
    let alerts = bridge.notifier.sent().len();

    bridge.run(Task::OrderChanges).await;
    bridge.run(Task::DispatchChanges).await;

    assert_eq!(bridge.ledger.writes().len(), writes);
    assert_eq!(bridge.notifier.sent().len(), alerts);
    assert_eq!(bridge.numbers().await.order_log, 3);
}

#[tokio::test]
async fn dispatch_request_is_recorded_once() {
    let mut bridge = Bridge::new().await;
    bridge.source.push(platform_order("O-100", 83));
    bridge.run(Task::Intake).await;
    bridge
        .ledger
        .edit_cell(Sheet::Order, 4, 1, OrderStatus::DispatchRequest.label());

    let report = bridge.run(Task::OrderChanges).await;

    assert_eq!(report.transitions, 1);
    assert_eq!(bridge.order_status("O-100").await, "배차요청");
    let transitions: Vec<_> = bridge
        .notifier
        .sent_on(AlertChannel::NewOrder)
        .into_iter()
        .filter(|a| a.contains("status changed: 접수 -> 배차요청"))
        .collect();
    assert_eq!(transitions.len(), 1);

    let log_row = bridge.ledger.row(Sheet::OrderLog, 4).unwrap();
    assert_eq!(log_row.cell(2), "배차요청");

    bridge.run(Task::OrderChanges).await;
    let again = bridge
        .notifier
        .sent_on(AlertChannel::NewOrder)
        .into_iter()
        .filter(|a| a.contains("status changed"))
        .count();
    assert_eq!(again, 1);
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn full_cycle_through_dispatch_assignment() {
    let mut bridge = Bridge::new().await;
    bridge.source.push(platform_order("O-100", 133));
    bridge.run(Task::Intake).await;
    bridge
        .ledger
        .edit_cell(Sheet::Order, 4, 1, OrderStatus::DispatchRequest.label());
    bridge.run(Task::OrderChanges).await;

    let promoted = bridge.run(Task::Dispatch).await;
    assert_eq!(promoted.created, 1);
    let dispatch_row = bridge.ledger.row(Sheet::Dispatch, 4).unwrap();
    assert_eq!(dispatch_row.cell(1), "O-100");
    assert_eq!(dispatch_row.cell(8), "대절");
    assert_eq!(bridge.notifier.direct().len(), 1);

    bridge
        .ledger
        .edit_cell(Sheet::Dispatch, 4, 16, DispatchStatus::DispatchDone.label());
    let report = bridge.run(Task::DispatchChanges).await;

    assert_eq!(report.transitions, 1);
    assert_eq!(bridge.order_status("O-100").await, "배차완료");
    assert_eq!(bridge.ledger.row(Sheet::Order, 4).unwrap().cell(1), "배차완료");
    let data_change = bridge.notifier.sent_on(AlertChannel::DataChange);
    assert!(data_change.iter().any(|a| a.contains("-> 배차완료")));
    assert_eq!(bridge.numbers().await.dispatch_log, 4);
    assert_eq!(
        bridge.reconciler.dispatch_log().list().unwrap(),
        vec!["DISPATCH_4.log"]
    );
}

#[tokio::test]
async fn dispatch_assignment_is_announced_once() {
    let mut bridge = Bridge::new().await;
    bridge.source.push(platform_order("O-100", 133));
    bridge.run(Task::Intake).await;
    bridge
        .ledger
        .edit_cell(Sheet::Order, 4, 1, OrderStatus::DispatchRequest.label());
    bridge.run(Task::OrderChanges).await;
    bridge.run(Task::Dispatch).await;
    bridge
        .ledger
        .edit_cell(Sheet::Dispatch, 4, 16, DispatchStatus::DispatchDone.label());

    bridge.run(Task::DispatchChanges).await;
    let report = bridge.run(Task::OrderChanges).await;

    assert_eq!(report.changed, 0);
    let announced = bridge
        .notifier
        .sent()
        .into_iter()
        .filter(|(_, text)| text.contains("status changed: 배차요청 -> 배차완료"))
        .count();
    assert_eq!(announced, 1);
}

#[tokio::test]
async fn counters_match_rows_written() {
    let mut bridge = Bridge::new().await;
    for no in ["O-1", "O-2", "O-3"] {
        bridge.source.push(platform_order(no, 83));
    }
    bridge.run(Task::Intake).await;
    for row in [4, 6] {
        bridge
            .ledger
            .edit_cell(Sheet::Order, row, 1, OrderStatus::DispatchRequest.label());
    }
    bridge.run(Task::OrderChanges).await;
    bridge.run(Task::Dispatch).await;

    let numbers = bridge.numbers().await;
    assert_eq!(numbers.order, 6);
    assert_eq!(numbers.order_log, 5);
    assert_eq!(numbers.dispatch, 5);
    for row in 4..=numbers.dispatch {
        assert!(bridge.ledger.row(Sheet::Dispatch, row).is_some());
    }
    assert!(bridge.ledger.row(Sheet::Dispatch, numbers.dispatch + 1).is_none());
}
