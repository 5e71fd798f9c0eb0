//! Relational shadow store.
//!
//! Three tables: the singleton `line_numbers` counter row, `order_info` and
//! `dispatch_info`. The store is the authority on "have we seen this order"
//! and "what did we last write to that ledger row".

pub mod db;
pub mod models;

use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{Mutex, OwnedMutexGuard};

pub use db::ShadowDb;
pub use models::{DispatchRecord, LineNumbers, OrderRecord, StoreCounts};

/// Shared handle to the shadow store.
///
/// All access goes through one async mutex. `call` runs short reads on the
/// blocking pool; `begin` hands out a `StoreTx` that keeps the connection
/// (and therefore every other task) waiting until the item it guards is
/// finished, ledger writes included.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<Mutex<ShadowDb>>,
}

impl StoreHandle {
    pub fn new(db: ShadowDb) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(ShadowDb::new(path)?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(ShadowDb::new_in_memory()?))
    }

    /// Run a closure with the database on a blocking thread.
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&ShadowDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let guard = self.inner.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || f(&guard))
            .await
            .context("Store task panicked")?
    }

    /// Start an exclusive transaction (`BEGIN IMMEDIATE`).
    pub async fn begin(&self) -> Result<StoreTx> {
        let guard = self.inner.clone().lock_owned().await;
        guard
            .execute_batch("BEGIN IMMEDIATE")
            .context("Failed to begin transaction")?;
        Ok(StoreTx {
            guard,
            finished: false,
        })
    }
}

/// An open transaction holding the store exclusively.
///
/// Rolled back on drop unless `commit` succeeded. Statements run inline on
/// the calling task; they are single-row operations.
pub struct StoreTx {
    guard: OwnedMutexGuard<ShadowDb>,
    finished: bool,
}

impl StoreTx {
    pub fn commit(mut self) -> Result<()> {
        self.guard
            .execute_batch("COMMIT")
            .context("Failed to commit transaction")?;
        self.finished = true;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.guard
            .execute_batch("ROLLBACK")
            .context("Failed to roll back transaction")
    }
}

impl Deref for StoreTx {
    type Target = ShadowDb;

    fn deref(&self) -> &ShadowDb {
        &self.guard
    }
}

impl Drop for StoreTx {
    fn drop(&mut self) {
        if !self.finished
            && let Err(e) = self.guard.execute_batch("ROLLBACK")
        {
            tracing::warn!(error = %e, "Rollback of abandoned transaction failed");
        }
    }
}
