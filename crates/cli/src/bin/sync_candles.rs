//! Synchronize the raw candle archive with Bitfinex.
//!
//! Requests are issued one at a time; the exchange blocks clients that
//! poll faster.

use anyhow::Context;
use candlestore_cli::{init_tracing, load_config, open_store};
use candlestore_sync::{BitfinexClient, Synchronizer};

fn main() -> anyhow::Result<()> {
    init_tracing();

    let Some(config) = load_config()? else {
        return Ok(());
    };
    let path = match config.datasets.raw_path() {
        Ok(path) => path,
        Err(e) => {
            tracing::error!("{e}");
            return Ok(());
        }
    };

    let client = BitfinexClient::new(&config.remote)?;
    let synchronizer = Synchronizer::from_config(&config);
    let mut store = open_store(path)
        .with_context(|| format!("failed to open raw archive {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        symbol = synchronizer.symbol(),
        resolutions = synchronizer.resolutions().len(),
        "Starting synchronization"
    );

    let reports = synchronizer.sync_all(&mut store, &client);
    store.close()?;
    let reports = reports.context("synchronization failed")?;

    let appended: usize = reports.iter().map(|r| r.appended).sum();
    tracing::info!(appended, "Done");
    Ok(())
}
