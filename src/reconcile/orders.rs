use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tracing::Instrument;

use super::{Reconciler, RowOutcome, TaskReport};
use crate::ledger::Sheet;
use crate::notify::{self, AlertChannel};
use crate::source::projection::row_label;
use crate::source::{Order, Session};
use crate::status::OrderStatus;
use crate::store::OrderRecord;

impl Reconciler {
    // ── Intake ────────────────────────────────────────────────────────

    /// Register every order of the intake window that has no record yet.
    pub async fn intake_orders(&self, session: &mut Session) -> Result<TaskReport> {
        let to = Utc::now();
        let days = self.config.source.intake_window_days;
        let window = Duration::try_days(days)
            .with_context(|| format!("Intake window of {} days is out of range", days))?;
        let from = to - window;
        let orders = self
            .source
            .list_orders(session, from, to)
            .await
            .context("Failed to list orders")?;

        let mut report = TaskReport::default();
        for order in &orders {
            report.examined += 1;
            let span = tracing::info_span!("order", order_no = %order.order_no);
            if self.intake_order(order).instrument(span).await? {
                report.created += 1;
            } else {
                report.skipped += 1;
            }
        }
        Ok(report)
    }

    /// Returns `false` when the order is already registered.
    async fn intake_order(&self, order: &Order) -> Result<bool> {
        let tx = self.store.begin().await?;
        if tx.find_order_by_external_id(&order.order_no)?.is_some() {
            return Ok(false);
        }

        let mut numbers = tx.line_numbers()?;
        numbers.order += 1;
        let line = numbers.order;
        let status = OrderStatus::Receipt;
        let row = self.fit(
            Sheet::Order,
            self.projection().order_row(order, line, status),
        );
        let snapshot = row.encode_snapshot()?;

        self.ledger
            .write_row(Sheet::Order, line, &row)
            .await
            .with_context(|| format!("Failed to write order row {}", line))?;
        tx.insert_order(&order.order_no, line, status.label(), &snapshot)?;
        tx.save_line_numbers(&numbers)?;
        tx.commit()?;
        tracing::info!(line, "Registered new order");

        let label = row_label(line, self.config.sheets.row_label_offset);
        self.notifier
            .send(
                AlertChannel::NewOrder,
                &notify::new_order_message(&label, line, &order.order_no),
            )
            .await?;
        Ok(true)
    }

    // ── Change detection ──────────────────────────────────────────────

    /// Compare every open order row with its snapshot.
    pub async fn detect_order_changes(&self) -> Result<TaskReport> {
        let records = self.store.call(|db| db.open_orders()).await?;
        let mut report = TaskReport::default();
        for record in &records {
            report.examined += 1;
            let span = tracing::info_span!(
                "order",
                order_no = %record.external_id,
                line = record.line
            );
            let outcome = self.check_order_row(record).instrument(span).await?;
            report.record(outcome);
        }
        Ok(report)
    }

    async fn check_order_row(&self, record: &OrderRecord) -> Result<RowOutcome> {
        let current = self
            .ledger
            .read_row(Sheet::Order, record.line)
            .await
            .with_context(|| format!("Failed to read order row {}", record.line))?;
        let stored = self.stored_row(Sheet::Order, &record.snapshot)?;
        if stored == current {
            return Ok(RowOutcome::Unchanged);
        }

        let index = self.config.sheets.order_status_index()?;
        let old_status = stored.cell(index).trim().to_string();
        let new_status = current.cell(index).trim().to_string();
        let time = notify::alert_time(&self.config.schedule.timezone());

        let transition = old_status != new_status;
        if transition {
            self.apply_order_transition(record, &old_status, &new_status, &time)
                .await?;
        }

        let changes = stored.diff(&current, self.first_column(Sheet::Order)?);
        let message = notify::row_diff_message(&time, "Order", record.line, &changes);
        let snapshot = current.encode_snapshot()?;
        let log_row = current.prepended(time.clone());

        let tx = self.store.begin().await?;
        tx.update_order_snapshot(record.id, &new_status, &snapshot)?;
        let mut numbers = tx.line_numbers()?;
        numbers.order_log += 1;
        let log_line = numbers.order_log;
        self.ledger
            .write_row(Sheet::OrderLog, log_line, &log_row)
            .await
            .with_context(|| format!("Failed to write order log row {}", log_line))?;
        tx.save_line_numbers(&numbers)?;
        tx.commit()?;
        tracing::info!(changed = changes.len(), log_line, "Order row changed");

        self.order_log.append(record.line, &message)?;
        self.notifier.send(AlertChannel::NewOrder, &message).await?;
        Ok(RowOutcome::Changed { transition })
    }

    /// React to an order status cell edited from `old` to `new`.
    ///
    /// Sends the status-change alert, then pushes the status configured in
    /// the order→dispatch cascade table onto the order's dispatch row.
    /// Unknown status text is reported but not cascaded.
    pub async fn apply_order_transition(
        &self,
        record: &OrderRecord,
        old: &str,
        new: &str,
        time: &str,
    ) -> Result<()> {
        tracing::info!(old, new, "Order status changed");
        self.notifier
            .send(
                AlertChannel::NewOrder,
                &notify::status_change_message(time, record.line, old, new),
            )
            .await?;

        let status = match new.parse::<OrderStatus>() {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "Order status not recognised, nothing cascaded");
                return Ok(());
            }
        };
        let Some(dispatch_status) = self.config.status_map.dispatch_status_for(status) else {
            return Ok(());
        };

        let order_id = record.id;
        let Some(dispatch) = self
            .store
            .call(move |db| db.dispatch_for_order(order_id))
            .await?
        else {
            tracing::debug!("No dispatch row to cascade into");
            return Ok(());
        };
        if dispatch.dispatch_status() == Some(dispatch_status) {
            return Ok(());
        }

        self.ledger
            .write_cell(
                Sheet::Dispatch,
                &self.config.sheets.dispatch_status_column,
                dispatch.line,
                dispatch_status.label(),
            )
            .await
            .with_context(|| format!("Failed to write dispatch status on row {}", dispatch.line))?;
        tracing::info!(
            dispatch_line = dispatch.line,
            status = dispatch_status.label(),
            "Cascaded order status to dispatch row"
        );
        Ok(())
    }
}
