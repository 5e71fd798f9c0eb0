//! Task execution: `orderbridge run` and `orderbridge once <task>`.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use orderbridge::config::BridgeConfig;
use orderbridge::observability;
use orderbridge::reconcile::Task;
use orderbridge::scheduler::{self, Scheduler};
use orderbridge::server::{self, ServerState};
use orderbridge::source::Session;

use super::super::Cli;
use super::build_reconciler;

fn log_warnings(config: &BridgeConfig) {
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
}

pub async fn cmd_run(cli: &Cli, http_port: Option<u16>) -> Result<()> {
    let config = BridgeConfig::resolve(&cli.config)?;
    let _guard = observability::init_logging(
        cli.log_format,
        Some(&config.files.error_log_dir),
        cli.verbose,
    )?;
    log_warnings(&config);

    let reconciler = Arc::new(build_reconciler(config).await?);
    let (stop, mut stopped) = watch::channel(false);

    let server = http_port.map(|port| {
        let state = ServerState::from_reconciler(&reconciler);
        tokio::spawn(server::serve(state, port, async move {
            let _ = stopped.wait_for(|stop| *stop).await;
        }))
    });

    let scheduler = Scheduler::start(reconciler);
    tracing::info!("Order bridge running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    let _ = stop.send(true);
    scheduler.shutdown().await;
    if let Some(server) = server {
        server.await??;
    }
    Ok(())
}

pub async fn cmd_once(cli: &Cli, task: Task) -> Result<()> {
    let _guard = observability::init_logging(cli.log_format, None, cli.verbose)?;
    let config = BridgeConfig::resolve(&cli.config)?;
    log_warnings(&config);
    let reconciler = build_reconciler(config).await?;

    let mut session = Session::new();
    match scheduler::run_reported(&reconciler, task, &mut session).await {
        Some(report) => {
            println!("{}: {}", task, report);
            Ok(())
        }
        None => anyhow::bail!("{} failed, see the log for details", task),
    }
}
