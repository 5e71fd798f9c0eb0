//! Database commands: `orderbridge init` and `orderbridge status`.

use anyhow::Result;

use orderbridge::config::BridgeConfig;
use orderbridge::observability;

use super::super::Cli;
use super::open_store;

pub async fn cmd_init(cli: &Cli) -> Result<()> {
    let _guard = observability::init_logging(cli.log_format, None, cli.verbose)?;
    let config = BridgeConfig::resolve(&cli.config)?;
    let store = open_store(&config).await?;
    let numbers = store.call(|db| db.line_numbers()).await?;

    println!("Database ready at {}", config.files.database.display());
    println!("  order        last row {}", numbers.order);
    println!("  order log    last row {}", numbers.order_log);
    println!("  dispatch     last row {}", numbers.dispatch);
    println!("  dispatch log last row {}", numbers.dispatch_log);
    Ok(())
}

pub async fn cmd_status(cli: &Cli) -> Result<()> {
    let _guard = observability::init_logging(cli.log_format, None, cli.verbose)?;
    let config = BridgeConfig::resolve(&cli.config)?;

    if !config.files.database.exists() {
        println!(
            "No database at {}. Run 'orderbridge init' first.",
            config.files.database.display()
        );
        return Ok(());
    }

    let store = open_store(&config).await?;
    let (numbers, counts) = store
        .call(|db| Ok((db.line_numbers()?, db.counts()?)))
        .await?;

    println!();
    println!("Line counters (last row written)");
    println!("================================");
    println!("  order:        {}", numbers.order);
    println!("  order log:    {}", numbers.order_log);
    println!("  dispatch:     {}", numbers.dispatch);
    println!("  dispatch log: {}", numbers.dispatch_log);
    println!();
    println!("Records");
    println!("=======");
    println!("  orders:     {} ({} open)", counts.orders, counts.open_orders);
    println!(
        "  dispatches: {} ({} open)",
        counts.dispatches, counts.open_dispatches
    );
    println!();
    Ok(())
}
