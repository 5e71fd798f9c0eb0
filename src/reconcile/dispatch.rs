use anyhow::{Context, Result};
use tracing::Instrument;

use super::{Reconciler, RowOutcome, TaskReport};
use crate::errors::StoreError;
use crate::ledger::Sheet;
use crate::notify::{self, AlertChannel};
use crate::source::Session;
use crate::status::{DispatchStatus, OrderStatus};
use crate::store::{DispatchRecord, OrderRecord};

impl Reconciler {
    // ── Promotion ─────────────────────────────────────────────────────

    /// Give every dispatch-requested order its dispatch row.
    pub async fn promote_dispatches(&self, session: &mut Session) -> Result<TaskReport> {
        let records = self.store.call(|db| db.orders_awaiting_dispatch()).await?;
        let mut report = TaskReport::default();
        for record in &records {
            report.examined += 1;
            let span = tracing::info_span!(
                "dispatch",
                order_no = %record.external_id,
                order_line = record.line
            );
            if self.promote_order(session, record).instrument(span).await? {
                report.created += 1;
            } else {
                report.skipped += 1;
            }
        }
        Ok(report)
    }

    /// Returns `false` when the order already has a dispatch or the platform
    /// no longer knows it.
    async fn promote_order(&self, session: &mut Session, record: &OrderRecord) -> Result<bool> {
        let tx = self.store.begin().await?;
        if tx.dispatch_for_order(record.id)?.is_some() {
            return Ok(false);
        }

        let Some(order) = self
            .source
            .order_detail(session, &record.external_id)
            .await
            .with_context(|| format!("Failed to fetch order {}", record.external_id))?
        else {
            tracing::warn!("Order detail unavailable, dispatch postponed");
            return Ok(false);
        };

        let mut numbers = tx.line_numbers()?;
        numbers.dispatch += 1;
        let line = numbers.dispatch;
        let row = self.fit(Sheet::Dispatch, self.projection().dispatch_row(&order, line));
        let snapshot = row.encode_snapshot()?;

        self.ledger
            .write_row(Sheet::Dispatch, line, &row)
            .await
            .with_context(|| format!("Failed to write dispatch row {}", line))?;
        tx.insert_dispatch(record.id, line, DispatchStatus::Init.label(), &snapshot)?;
        tx.save_line_numbers(&numbers)?;
        tx.commit()?;
        tracing::info!(line, "Dispatch row created");

        let time = notify::alert_time(&self.config.schedule.timezone());
        let message = notify::new_dispatch_message(&time, line, row.cells());
        self.notifier.send(AlertChannel::DataChange, &message).await?;
        self.notifier.send_direct(&message).await?;
        Ok(true)
    }

    // ── Change detection ──────────────────────────────────────────────

    /// Compare every open dispatch row with its snapshot.
    pub async fn detect_dispatch_changes(&self) -> Result<TaskReport> {
        let records = self.store.call(|db| db.open_dispatches()).await?;
        let mut report = TaskReport::default();
        for record in &records {
            report.examined += 1;
            let span = tracing::info_span!("dispatch", line = record.line);
            let outcome = self.check_dispatch_row(record).instrument(span).await?;
            report.record(outcome);
        }
        Ok(report)
    }

    async fn check_dispatch_row(&self, record: &DispatchRecord) -> Result<RowOutcome> {
        let current = self
            .ledger
            .read_row(Sheet::Dispatch, record.line)
            .await
            .with_context(|| format!("Failed to read dispatch row {}", record.line))?;
        let stored = self.stored_row(Sheet::Dispatch, &record.snapshot)?;
        if stored == current {
            return Ok(RowOutcome::Unchanged);
        }

        let index = self.config.sheets.dispatch_status_index()?;
        let old_status = stored.cell(index).trim().to_string();
        let new_status = current.cell(index).trim().to_string();
        let time = notify::alert_time(&self.config.schedule.timezone());

        let mut transition = false;
        if old_status != new_status {
            transition = self
                .apply_dispatch_transition(record, &old_status, &new_status, &time)
                .await?
                .is_some();
        }

        // Blank reads as the initial status; unknown text is kept verbatim.
        let status_label = DispatchStatus::from_cell(&new_status)
            .map(|s| s.label().to_string())
            .unwrap_or(new_status);
        let changes = stored.diff(&current, self.first_column(Sheet::Dispatch)?);
        let message = notify::row_diff_message(&time, "Dispatch", record.line, &changes);
        let snapshot = current.encode_snapshot()?;
        let log_row = current.prepended(time.clone());

        let tx = self.store.begin().await?;
        tx.update_dispatch_snapshot(record.id, &status_label, &snapshot)?;
        let mut numbers = tx.line_numbers()?;
        numbers.dispatch_log += 1;
        let log_line = numbers.dispatch_log;
        self.ledger
            .write_row(Sheet::DispatchLog, log_line, &log_row)
            .await
            .with_context(|| format!("Failed to write dispatch log row {}", log_line))?;
        tx.save_line_numbers(&numbers)?;
        tx.commit()?;
        tracing::info!(changed = changes.len(), log_line, "Dispatch row changed");

        self.dispatch_log.append(record.line, &message)?;
        self.notifier.send(AlertChannel::DataChange, &message).await?;
        self.notifier.send_direct(&message).await?;
        Ok(RowOutcome::Changed { transition })
    }

    /// Carry a dispatch status edit over to the order it belongs to.
    ///
    /// Looks the new status up in the dispatch→order table; when mapped,
    /// writes the order status cell, record and snapshot and announces the
    /// change. Returns the order status applied, or `None` when nothing maps,
    /// the order is already terminal or already has that status.
    pub async fn apply_dispatch_transition(
        &self,
        record: &DispatchRecord,
        old: &str,
        new: &str,
        time: &str,
    ) -> Result<Option<OrderStatus>> {
        tracing::info!(old, new, "Dispatch status changed");
        let dispatch_status = match DispatchStatus::from_cell(new) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(error = %e, "Dispatch status not recognised");
                return Ok(None);
            }
        };
        let Some(order_status) = self.config.status_map.order_status_for(dispatch_status) else {
            tracing::debug!(status = dispatch_status.label(), "No order status mapped");
            return Ok(None);
        };

        let order_id = record.order_id;
        let tx = self.store.begin().await?;
        let order = tx.get_order(order_id)?.ok_or(StoreError::RecordNotFound {
            kind: "order",
            id: order_id,
        })?;
        if let Some(current) = order.order_status()
            && (current.is_terminal() || current == order_status)
        {
            tracing::debug!(
                order_line = order.line,
                order_status = current.label(),
                "Order status left unchanged"
            );
            return Ok(None);
        }

        // Snapshot and ledger agree on the status cell after this write.
        let label = order_status.label();
        let mut snapshot = self.stored_row(Sheet::Order, &order.snapshot)?;
        snapshot.set_cell(self.config.sheets.order_status_index()?, label);
        let snapshot = snapshot.encode_snapshot()?;

        self.ledger
            .write_cell(
                Sheet::Order,
                &self.config.sheets.order_status_column,
                order.line,
                label,
            )
            .await
            .with_context(|| format!("Failed to write order status on row {}", order.line))?;
        tx.update_order_snapshot(order_id, label, &snapshot)?;
        tx.commit()?;
        tracing::info!(
            order_no = %order.external_id,
            order_line = order.line,
            status = label,
            "Order status follows dispatch"
        );

        self.notifier
            .send(
                AlertChannel::DataChange,
                &notify::status_change_message(time, order.line, &order.status, label),
            )
            .await?;
        Ok(Some(order_status))
    }
}
