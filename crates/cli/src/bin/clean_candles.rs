//! Propagate new raw candles into the clean archive, scaling down wick
//! outliers on the way.

use anyhow::Context;
use candlestore_cli::{init_tracing, load_config, open_store};
use candlestore_cleaning::{propagate_all, OutlierScaler};
use candlestore_core::Resolution;

fn main() -> anyhow::Result<()> {
    init_tracing();

    let Some(config) = load_config()? else {
        return Ok(());
    };
    let paths = config
        .datasets
        .raw_path()
        .and_then(|raw| Ok((raw, config.datasets.clean_path()?)));
    let (raw_path, clean_path) = match paths {
        Ok(paths) => paths,
        Err(e) => {
            tracing::error!("{e}");
            return Ok(());
        }
    };

    let scaler = OutlierScaler::from_config(&config.cleaning);
    let mut raw = open_store(raw_path)
        .with_context(|| format!("failed to open raw archive {}", raw_path.display()))?;
    let mut clean = open_store(clean_path)
        .with_context(|| format!("failed to open clean archive {}", clean_path.display()))?;

    let reports = propagate_all(&raw, &mut clean, &Resolution::ALL, &scaler);
    raw.close()?;
    clean.close()?;
    let reports = reports.context("cleaning failed")?;

    for report in &reports {
        for fix in report.high.iter().chain(&report.low) {
            tracing::debug!(
                resolution = %report.resolution,
                mts = fix.mts,
                original = fix.original,
                corrected = fix.corrected,
                "Corrected wick"
            );
        }
    }
    let corrected: usize = reports.iter().map(|r| r.high.len() + r.low.len()).sum();
    tracing::info!(resolutions = reports.len(), corrected, "Done");
    Ok(())
}
