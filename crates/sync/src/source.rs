//! The remote candle source contract.

use candlestore_core::{Candle, Resolution, Result, TimestampMs};

/// What a fetch asks the remote source for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// The single most recent candle.
    Latest,
    /// Up to `limit` candles starting at `start`.
    History,
}

impl Selector {
    pub fn as_str(self) -> &'static str {
        match self {
            Selector::Latest => "latest",
            Selector::History => "history",
        }
    }
}

/// Parameters of one remote fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub resolution: Resolution,
    pub symbol: String,
    pub selector: Selector,
    /// Maximum rows for a history fetch.
    pub limit: Option<usize>,
    /// Earliest MTS for a history fetch.
    pub start: Option<TimestampMs>,
    /// 1 for ascending, -1 for descending.
    pub sort: Option<i8>,
}

impl FetchRequest {
    /// Request for the most recent candle.
    pub fn latest(resolution: Resolution, symbol: impl Into<String>) -> Self {
        Self {
            resolution,
            symbol: symbol.into(),
            selector: Selector::Latest,
            limit: None,
            start: None,
            sort: None,
        }
    }

    /// Request for up to `limit` candles from `start`, ascending.
    pub fn history(
        resolution: Resolution,
        symbol: impl Into<String>,
        start: TimestampMs,
        limit: usize,
    ) -> Self {
        Self {
            resolution,
            symbol: symbol.into(),
            selector: Selector::History,
            limit: Some(limit),
            start: Some(start),
            sort: Some(1),
        }
    }
}

/// Anything that can serve candles for a resolution and symbol.
///
/// A `Latest` fetch returns at most one row. A `History` fetch returns up to
/// `limit` rows beginning at `start`, ascending when `sort` is 1.
pub trait CandleSource {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Candle>>;
}

impl<S: CandleSource + ?Sized> CandleSource for &S {
    fn fetch(&self, request: &FetchRequest) -> Result<Vec<Candle>> {
        (**self).fetch(request)
    }
}
