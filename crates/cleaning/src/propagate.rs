//! Moving corrected candles from the raw archive into the clean one.

use crate::outlier::{CleanReport, Correction, OutlierScaler};
use candlestore_archive::{RangeQuery, SaveMode, SaveReport, SearchSide, Store, TableBackend};
use candlestore_core::{Column, Resolution, Result, TimestampMs};

/// Outcome of propagating one resolution.
#[derive(Debug, Clone)]
pub struct PropagateReport {
    pub resolution: Resolution,
    /// Mode used to save into the clean archive.
    pub mode: SaveMode,
    pub save: SaveReport,
    /// HIGH corrections on rows that were new to the clean archive.
    pub high: Vec<Correction>,
    /// LOW corrections on rows that were new to the clean archive.
    pub low: Vec<Correction>,
}

/// Bring the clean table for `resolution` up to date with the raw one.
///
/// Returns `None` when both tables end at the same timestamp. An empty clean
/// table receives every raw row in `append` mode. Otherwise the raw rows
/// after the clean latest are cleaned together with `stat_length` rows of
/// preceding context and saved in `skip` mode, so rows already in the clean
/// archive keep their values.
pub fn propagate<R, C>(
    raw: &Store<R>,
    clean: &mut Store<C>,
    resolution: Resolution,
    scaler: &OutlierScaler,
) -> Result<Option<PropagateReport>>
where
    R: TableBackend,
    C: TableBackend,
{
    let raw_latest = raw.latest(resolution)?;
    let clean_latest = clean.latest(resolution)?;
    if raw_latest == clean_latest {
        tracing::debug!(%resolution, "Clean archive is up to date");
        return Ok(None);
    }

    let (mode, query, since) = if clean.row_count(resolution)? == 0 {
        (SaveMode::Append, RangeQuery::all(), None)
    } else {
        let first_new = raw.search_mts(resolution, clean_latest as f64, SearchSide::Right)?;
        let start = first_new.saturating_sub(scaler.stat_length());
        (
            SaveMode::Skip,
            RangeQuery::all().start_index(start as i64),
            Some(clean_latest),
        )
    };

    let candles = raw.range(resolution, &query)?;
    let CleanReport {
        candles, high, low, ..
    } = scaler.clean(candles);
    let save = clean.save_candles(resolution, &candles, mode, false)?;

    let is_new = |c: &Correction| since.map_or(true, |ts: TimestampMs| c.mts > ts as f64);
    let high: Vec<_> = high.into_iter().filter(is_new).collect();
    let low: Vec<_> = low.into_iter().filter(is_new).collect();

    tracing::info!(
        %resolution,
        mode = mode.as_str(),
        appended = save.appended,
        high = high.len(),
        low = low.len(),
        "Propagated candles"
    );

    Ok(Some(PropagateReport {
        resolution,
        mode,
        save,
        high,
        low,
    }))
}

/// Run [`propagate`] over `resolutions` in order, skipping the up-to-date ones.
pub fn propagate_all<R, C>(
    raw: &Store<R>,
    clean: &mut Store<C>,
    resolutions: &[Resolution],
    scaler: &OutlierScaler,
) -> Result<Vec<PropagateReport>>
where
    R: TableBackend,
    C: TableBackend,
{
    let mut reports = Vec::new();
    for &resolution in resolutions {
        if let Some(report) = propagate(raw, clean, resolution, scaler)? {
            reports.push(report);
        }
    }
    Ok(reports)
}

/// Correct the rows selected by `query` inside one archive.
///
/// Only HIGH and LOW cells are written back; the row count never changes.
pub fn clean_in_place<B: TableBackend>(
    store: &mut Store<B>,
    resolution: Resolution,
    query: &RangeQuery,
    scaler: &OutlierScaler,
) -> Result<CleanReport> {
    let rows = store.resolve_range(resolution, query)?;
    let candles = store.range(resolution, query)?;
    let report = scaler.clean(candles);
    if report.total() > 0 {
        store.write_cells(resolution, rows.start, &[Column::High, Column::Low], &report.candles)?;
    }
    tracing::info!(
        %resolution,
        rows = report.candles.len(),
        high = report.high.len(),
        low = report.low.len(),
        "Cleaned in place"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candlestore_archive::MemoryBackend;
    use candlestore_core::Candle;
    use approx::assert_abs_diff_eq;

    const STEP: i64 = 60_000;

    fn flat(range: std::ops::Range<i64>) -> Vec<Candle> {
        range
            .map(|i| Candle::new(i * STEP, 100.0, 100.0, 101.0, 99.0, 1.0))
            .collect()
    }

    fn with_spike(range: std::ops::Range<i64>, at: i64) -> Vec<Candle> {
        let start = range.start;
        let mut candles = flat(range);
        candles[(at - start) as usize].set(Column::High, 150.0);
        candles
    }

    fn all_rows(store: &Store<MemoryBackend>) -> Vec<Candle> {
        store.range(Resolution::M1, &RangeQuery::all()).unwrap()
    }

    #[test]
    fn test_first_propagation_appends() {
        let mut raw = Store::in_memory();
        raw.append(Resolution::M1, &with_spike(0..30, 15)).unwrap();
        let mut clean = Store::in_memory();

        let report = propagate(&raw, &mut clean, Resolution::M1, &OutlierScaler::default())
            .unwrap()
            .unwrap();

        assert_eq!(report.mode, SaveMode::Append);
        assert_eq!(report.save.appended, 30);
        assert_eq!(report.high.len(), 1);
        let stored = all_rows(&clean);
        assert_eq!(stored.len(), 30);
        assert_abs_diff_eq!(stored[15].high(), 100.0, epsilon = 1e-9);
        // Raw archive is untouched
        assert_eq!(all_rows(&raw)[15].high(), 150.0);
    }

    #[test]
    fn test_incremental_propagation_skips_context() {
        let mut raw = Store::in_memory();
        raw.append(Resolution::M1, &with_spike(0..30, 15)).unwrap();
        let mut clean = Store::in_memory();
        let scaler = OutlierScaler::default();
        propagate(&raw, &mut clean, Resolution::M1, &scaler).unwrap();

        raw.append(Resolution::M1, &with_spike(30..60, 45)).unwrap();
        let report = propagate(&raw, &mut clean, Resolution::M1, &scaler)
            .unwrap()
            .unwrap();

        assert_eq!(report.mode, SaveMode::Skip);
        assert_eq!(report.save, SaveReport { overlapped: 10, appended: 30 });
        assert_eq!(report.high.len(), 1);
        assert_eq!(report.high[0].mts, (45 * STEP) as f64);

        let stored = all_rows(&clean);
        assert_eq!(stored.len(), 60);
        assert_abs_diff_eq!(stored[15].high(), 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(stored[45].high(), 100.0, epsilon = 1e-9);
        assert_eq!(clean.latest(Resolution::M1).unwrap(), 59 * STEP);
    }

    #[test]
    fn test_up_to_date_is_noop() {
        let mut raw = Store::in_memory();
        raw.append(Resolution::M1, &flat(0..5)).unwrap();
        let mut clean = Store::in_memory();
        clean.append(Resolution::M1, &flat(0..5)).unwrap();

        let result = propagate(&raw, &mut clean, Resolution::M1, &OutlierScaler::default()).unwrap();
        assert!(result.is_none());

        // Both empty
        let reports = propagate_all(
            &raw,
            &mut clean,
            &[Resolution::M5, Resolution::H1],
            &OutlierScaler::default(),
        )
        .unwrap();
        assert!(reports.is_empty());
    }

    #[test]
    fn test_clean_in_place_writes_wicks_only() {
        let mut store = Store::in_memory();
        store.append(Resolution::M1, &with_spike(0..30, 15)).unwrap();

        let report = clean_in_place(
            &mut store,
            Resolution::M1,
            &RangeQuery::all().start_index(5),
            &OutlierScaler::default(),
        )
        .unwrap();
        assert_eq!(report.high.len(), 1);
        assert_eq!(report.high[0].index, 10);

        let stored = all_rows(&store);
        assert_eq!(stored.len(), 30);
        assert_abs_diff_eq!(stored[15].high(), 100.0, epsilon = 1e-9);
        assert_eq!(stored[14].high(), 101.0);
        assert_eq!(stored[15].open(), 100.0);
    }
}
