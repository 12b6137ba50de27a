//! Paginated ingestion from a remote source into the raw archive.
//!
//! Per resolution:
//! 1. Compare the remote latest candle with the local latest; within the
//!    tolerance the table is up to date.
//! 2. Page history ascending from just after the local latest, appending each
//!    page, until a short page arrives.
//! 3. Fetch the latest candle once more and append it if it is newer than
//!    the local tail, since history pages can omit it.

use crate::source::{CandleSource, FetchRequest};
use candlestore_archive::{SaveMode, Store, TableBackend};
use candlestore_core::config::{Config, SyncConfig};
use candlestore_core::{format_mts, Candle, Error, Resolution, Result, TimestampMs};
use std::time::Duration;

/// Outcome of synchronizing one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub resolution: Resolution,
    /// MTS of the remote latest candle at the start.
    pub remote_latest: TimestampMs,
    /// Local latest before syncing.
    pub local_before: TimestampMs,
    /// Local latest after syncing.
    pub local_after: TimestampMs,
    /// History pages fetched.
    pub pages: usize,
    /// Rows appended, confirmation row included.
    pub appended: usize,
    /// Whether the confirmation fetch added the tail candle.
    pub confirmed_tail: bool,
}

impl SyncReport {
    /// Whether the table was already up to date.
    pub fn up_to_date(&self) -> bool {
        self.pages == 0 && self.appended == 0
    }
}

/// Page count estimate for progress output.
pub fn expected_pages(resolution: Resolution, remote_latest: TimestampMs, oldest: TimestampMs) -> u64 {
    let span = (remote_latest - oldest).max(0) as u64;
    span.div_ceil(resolution.duration_secs() as u64 * 1000) + 1
}

/// Drives [`CandleSource`] fetches into a [`Store`].
#[derive(Debug, Clone)]
pub struct Synchronizer {
    symbol: String,
    page_limit: usize,
    tolerance_ms: i64,
    progress_delay: Duration,
    resolutions: Vec<Resolution>,
}

impl Synchronizer {
    pub fn new(symbol: impl Into<String>, config: &SyncConfig) -> Self {
        Self {
            symbol: symbol.into(),
            page_limit: config.page_limit.max(1),
            tolerance_ms: config.tolerance_ms,
            progress_delay: Duration::from_millis(config.progress_delay_ms),
            resolutions: config.resolutions.clone(),
        }
    }

    /// Create a synchronizer for the configured symbol and resolutions.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.remote.symbol.clone(), &config.sync)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn resolutions(&self) -> &[Resolution] {
        &self.resolutions
    }

    /// Synchronize every configured resolution, in order.
    ///
    /// Stops at the first error; resolutions already synced keep their rows.
    pub fn sync_all<B, S>(&self, store: &mut Store<B>, source: &S) -> Result<Vec<SyncReport>>
    where
        B: TableBackend,
        S: CandleSource + ?Sized,
    {
        self.resolutions
            .iter()
            .map(|&resolution| self.sync(store, resolution, source))
            .collect()
    }

    /// Synchronize one resolution.
    pub fn sync<B, S>(&self, store: &mut Store<B>, resolution: Resolution, source: &S) -> Result<SyncReport>
    where
        B: TableBackend,
        S: CandleSource + ?Sized,
    {
        let remote_latest = self.fetch_latest(source, resolution)?.ok_or_else(|| {
            Error::remote(format!("no latest candle returned for {resolution}"))
        })?;
        let local_before = store.latest(resolution)?;

        let mut report = SyncReport {
            resolution,
            remote_latest,
            local_before,
            local_after: local_before,
            pages: 0,
            appended: 0,
            confirmed_tail: false,
        };

        if (remote_latest - local_before).abs() < self.tolerance_ms {
            tracing::info!(
                %resolution,
                latest = %format_mts(local_before),
                "Up to date"
            );
            return Ok(report);
        }

        tracing::info!(
            %resolution,
            local = %describe(local_before),
            remote = %format_mts(remote_latest),
            "Synchronizing"
        );

        let mut expected = None;
        loop {
            let local = store.latest(resolution)?;
            let request =
                FetchRequest::history(resolution, self.symbol.as_str(), local + 1, self.page_limit);
            let page = source.fetch(&request)?;
            report.pages += 1;
            let exhausted = page.len() < self.page_limit;

            if expected.is_none() {
                let oldest = match page.first().and_then(Candle::mts_ms) {
                    Some(mts) => mts,
                    None => {
                        tracing::warn!(%resolution, "Empty first history page, anchoring on remote latest");
                        remote_latest
                    }
                };
                expected = Some(expected_pages(resolution, remote_latest, oldest));
            }

            let fresh = newer_than(page, local);
            let advanced = !fresh.is_empty();
            if advanced {
                report.appended += store
                    .save_candles(resolution, &fresh, SaveMode::Append, false)?
                    .appended;
            }

            tracing::info!(
                %resolution,
                page = report.pages,
                expected = expected.unwrap_or(0),
                rows = fresh.len(),
                "Fetched page"
            );

            if exhausted || !advanced {
                break;
            }
            if !self.progress_delay.is_zero() {
                std::thread::sleep(self.progress_delay);
            }
        }

        // History pages can miss the newest candle
        if let Some(tail) = source.fetch(&FetchRequest::latest(resolution, self.symbol.as_str()))?.pop() {
            let local = store.latest(resolution)?;
            if tail.mts_ms().is_some_and(|mts| mts > local) {
                store.append(resolution, &[tail])?;
                report.appended += 1;
                report.confirmed_tail = true;
                tracing::debug!(%resolution, mts = %format_mts(tail.mts() as TimestampMs), "Appended tail candle");
            }
        }

        report.local_after = store.latest(resolution)?;
        tracing::info!(
            %resolution,
            pages = report.pages,
            appended = report.appended,
            latest = %format_mts(report.local_after),
            "Synchronized"
        );
        Ok(report)
    }

    fn fetch_latest<S: CandleSource + ?Sized>(
        &self,
        source: &S,
        resolution: Resolution,
    ) -> Result<Option<TimestampMs>> {
        let rows = source.fetch(&FetchRequest::latest(resolution, self.symbol.as_str()))?;
        Ok(rows.first().and_then(Candle::mts_ms))
    }
}

/// Rows with an MTS strictly after `local`, keeping the table ascending.
fn newer_than(page: Vec<Candle>, local: TimestampMs) -> Vec<Candle> {
    let total = page.len();
    let fresh: Vec<Candle> = page
        .into_iter()
        .filter(|c| c.mts_ms().is_some_and(|mts| mts > local))
        .collect();
    if fresh.len() < total {
        tracing::warn!(dropped = total - fresh.len(), "Ignoring rows at or before the local latest");
    }
    fresh
}

fn describe(mts: TimestampMs) -> String {
    if mts == 0 {
        "empty".to_string()
    } else {
        format_mts(mts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Selector;
    use candlestore_archive::{MemoryBackend, RangeQuery};
    use std::cell::Cell;
    use tempfile::tempdir;

    const STEP: i64 = 60_000;

    /// In-memory remote source over a fixed series.
    struct FakeSource {
        candles: Vec<Candle>,
        /// Leave the newest candle out of history pages.
        omit_tail: bool,
        /// History pages are always empty.
        empty_history: bool,
        history_calls: Cell<usize>,
    }

    impl FakeSource {
        fn new(count: i64) -> Self {
            let candles = (1..=count)
                .map(|i| Candle::new(i * STEP, i as f64, i as f64 + 0.5, i as f64 + 1.0, i as f64 - 1.0, 1.0))
                .collect();
            Self {
                candles,
                omit_tail: false,
                empty_history: false,
                history_calls: Cell::new(0),
            }
        }
    }

    impl CandleSource for FakeSource {
        fn fetch(&self, request: &FetchRequest) -> Result<Vec<Candle>> {
            match request.selector {
                Selector::Latest => Ok(self.candles.last().copied().into_iter().collect()),
                Selector::History => {
                    self.history_calls.set(self.history_calls.get() + 1);
                    if self.empty_history {
                        return Ok(Vec::new());
                    }
                    let visible = if self.omit_tail {
                        &self.candles[..self.candles.len() - 1]
                    } else {
                        &self.candles[..]
                    };
                    let start = request.start.unwrap_or(0) as f64;
                    Ok(visible
                        .iter()
                        .filter(|c| c.mts() >= start)
                        .take(request.limit.unwrap_or(usize::MAX))
                        .copied()
                        .collect())
                }
            }
        }
    }

    struct FailingSource;

    impl CandleSource for FailingSource {
        fn fetch(&self, _request: &FetchRequest) -> Result<Vec<Candle>> {
            Err(Error::remote("connection reset"))
        }
    }

    fn synchronizer(page_limit: usize) -> Synchronizer {
        let config = SyncConfig {
            page_limit,
            progress_delay_ms: 0,
            ..SyncConfig::default()
        };
        Synchronizer::new("tBTCUSD", &config)
    }

    #[test]
    fn test_sync_from_empty() {
        let source = FakeSource::new(2500);
        let mut store = Store::in_memory();

        let report = synchronizer(1000).sync(&mut store, Resolution::M1, &source).unwrap();

        assert_eq!(report.pages, 3);
        assert_eq!(report.appended, 2500);
        assert!(!report.confirmed_tail);
        assert_eq!(report.local_before, 0);
        assert_eq!(report.local_after, 2500 * STEP);

        let rows = store.range(Resolution::M1, &RangeQuery::all()).unwrap();
        assert_eq!(rows, source.candles);
    }

    #[test]
    fn test_sync_is_idempotent() {
        let source = FakeSource::new(250);
        let mut store = Store::in_memory();
        let sync = synchronizer(100);

        sync.sync(&mut store, Resolution::M1, &source).unwrap();
        let calls = source.history_calls.get();
        let count = store.row_count(Resolution::M1).unwrap();

        let report = sync.sync(&mut store, Resolution::M1, &source).unwrap();
        assert!(report.up_to_date());
        assert_eq!(source.history_calls.get(), calls);
        assert_eq!(store.row_count(Resolution::M1).unwrap(), count);
        assert_eq!(store.latest(Resolution::M1).unwrap(), 250 * STEP);
    }

    #[test]
    fn test_confirmation_appends_omitted_tail() {
        let mut source = FakeSource::new(150);
        source.omit_tail = true;
        let mut store = Store::in_memory();

        let report = synchronizer(100).sync(&mut store, Resolution::M1, &source).unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(report.appended, 150);
        assert!(report.confirmed_tail);
        assert_eq!(store.latest(Resolution::M1).unwrap(), 150 * STEP);
    }

    #[test]
    fn test_empty_history_anchors_on_latest() {
        let mut source = FakeSource::new(10);
        source.empty_history = true;
        let mut store = Store::in_memory();

        let report = synchronizer(100).sync(&mut store, Resolution::Month, &source).unwrap();

        assert_eq!(report.pages, 1);
        assert!(report.confirmed_tail);
        assert_eq!(store.row_count(Resolution::Month).unwrap(), 1);
        assert_eq!(store.latest(Resolution::Month).unwrap(), 10 * STEP);
    }

    #[test]
    fn test_within_tolerance_is_up_to_date() {
        let source = FakeSource::new(10);
        let mut store = Store::in_memory();
        store.append(Resolution::M1, &source.candles[..9]).unwrap();

        let report = synchronizer(100).sync(&mut store, Resolution::M1, &source).unwrap();
        assert!(report.up_to_date());
        assert_eq!(source.history_calls.get(), 0);
        assert_eq!(store.row_count(Resolution::M1).unwrap(), 9);
    }

    #[test]
    fn test_resumes_after_local_latest() {
        let source = FakeSource::new(300);
        let mut store = Store::in_memory();
        store.append(Resolution::M1, &source.candles[..120]).unwrap();

        let report = synchronizer(100).sync(&mut store, Resolution::M1, &source).unwrap();
        assert_eq!(report.local_before, 120 * STEP);
        assert_eq!(report.appended, 180);
        assert_eq!(
            store.range(Resolution::M1, &RangeQuery::all()).unwrap(),
            source.candles
        );
    }

    #[test]
    fn test_remote_error_propagates() {
        let mut store = Store::in_memory();
        let result = synchronizer(100).sync(&mut store, Resolution::M1, &FailingSource);
        assert!(matches!(result, Err(Error::Remote(_))));
        assert_eq!(store.row_count(Resolution::M1).unwrap(), 0);
    }

    #[test]
    fn test_sync_all_on_disk() {
        let dir = tempdir().unwrap();
        let mut store = Store::open_or_create(dir.path().join("raw.db")).unwrap();
        let source = FakeSource::new(42);
        let config = SyncConfig {
            page_limit: 10,
            progress_delay_ms: 0,
            resolutions: vec![Resolution::M1, Resolution::H1],
            ..SyncConfig::default()
        };

        let reports = Synchronizer::new("tBTCUSD", &config)
            .sync_all(&mut store, &source)
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].pages, 5);
        for (resolution, latest) in store.latest_all().unwrap() {
            let expected = if config.resolutions.contains(&resolution) { 42 * STEP } else { 0 };
            assert_eq!(latest, expected);
        }
        store.close().unwrap();
    }

    #[test]
    fn test_expected_pages() {
        assert_eq!(expected_pages(Resolution::M1, 10 * STEP, STEP), 10);
        assert_eq!(expected_pages(Resolution::M1, STEP, STEP), 1);
        assert_eq!(expected_pages(Resolution::M1, 0, STEP), 1);
    }

    #[test]
    fn test_store_type_is_generic() {
        let mut store: Store<MemoryBackend> = Store::in_memory();
        let report = synchronizer(5).sync(&mut store, Resolution::D1, &FakeSource::new(3)).unwrap();
        assert_eq!(report.appended, 3);
    }
}
