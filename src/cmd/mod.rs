//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Run`, `Once`    |
//! | `state`  | `Init`, `Status` |
//! | `config` | `Config`         |

pub mod config;
pub mod run;
pub mod state;

pub use config::cmd_config;
pub use run::{cmd_once, cmd_run};
pub use state::{cmd_init, cmd_status};

use std::sync::Arc;

use anyhow::{Context, Result};

use orderbridge::config::BridgeConfig;
use orderbridge::ledger::SheetsLedger;
use orderbridge::notify::WebhookNotifier;
use orderbridge::reconcile::Reconciler;
use orderbridge::source::ImwebClient;
use orderbridge::store::{LineNumbers, StoreHandle};

/// Open the database, seeding the line counters on first use.
pub async fn open_store(config: &BridgeConfig) -> Result<StoreHandle> {
    let store = StoreHandle::open(&config.files.database).with_context(|| {
        format!(
            "Failed to open database {}",
            config.files.database.display()
        )
    })?;
    let initial = LineNumbers::initial(&config.sheets);
    let seeded = store.call(move |db| db.ensure_line_numbers(&initial)).await?;
    if seeded {
        tracing::info!(?initial, "Seeded line counters");
    }
    Ok(store)
}

/// Wire the production ledger, order client and notifier together.
pub async fn build_reconciler(config: BridgeConfig) -> Result<Reconciler> {
    let store = open_store(&config).await?;
    let ledger = Arc::new(SheetsLedger::new(config.sheets.clone()));
    let source = Arc::new(ImwebClient::new(config.source.clone()));
    let notifier = Arc::new(WebhookNotifier::new(config.notify.clone()));
    Ok(Reconciler::new(
        Arc::new(config),
        store,
        ledger,
        source,
        notifier,
    ))
}
