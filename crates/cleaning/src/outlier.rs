//! Wick outlier detection and scaling.
//!
//! A HIGH (or LOW) value is an outlier when the rise into the candle is far
//! above the rises of its neighbours and the series falls back right after
//! it. Each neighbour window holds `stat_length` differences on each side,
//! weighted by a Gaussian so that nearby candles count more. Only
//! differences with the same sign as the excursion being tested enter the
//! statistics.
//!
//! An outlier is replaced by the outer body value (OPEN or CLOSE) plus the
//! weighted mean neighbour rise. Passes repeat on the corrected series until
//! one finds nothing; a timestamp corrected in an earlier pass is never
//! flagged again within the same call. Rows without an MTS are never
//! corrected.
//!
//! The corrected timestamps are returned in [`EditedSets`]. A fresh call on
//! already-cleaned noisy data may flag cells again; handing the sets back
//! through [`OutlierScaler::clean_with`] continues from a converged state.

use crate::stats::{gaussian_window, weighted_avg_and_std};
use candlestore_core::config::CleaningConfig;
use candlestore_core::{Candle, Column};
use ordered_float::OrderedFloat;
use std::collections::HashSet;

/// Which wick a scan works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Upward spikes in HIGH.
    High,
    /// Downward spikes in LOW.
    Low,
}

impl Polarity {
    /// +1 for HIGH, -1 for LOW.
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Polarity::High => 1.0,
            Polarity::Low => -1.0,
        }
    }

    /// Column holding this wick.
    #[inline]
    pub fn column(self) -> Column {
        match self {
            Polarity::High => Column::High,
            Polarity::Low => Column::Low,
        }
    }

    /// The body edge on this wick's side: max(OPEN, CLOSE) for HIGH,
    /// min(OPEN, CLOSE) for LOW.
    #[inline]
    pub fn body(self, candle: &Candle) -> f64 {
        match self {
            Polarity::High => candle.open().max(candle.close()),
            Polarity::Low => candle.open().min(candle.close()),
        }
    }
}

/// Timestamps already corrected, per wick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditedSets {
    high: HashSet<OrderedFloat<f64>>,
    low: HashSet<OrderedFloat<f64>>,
}

impl EditedSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `polarity` wick at `mts` has been corrected.
    pub fn contains(&self, polarity: Polarity, mts: f64) -> bool {
        self.get(polarity).contains(&OrderedFloat(mts))
    }

    /// Number of corrected cells on both wicks.
    pub fn len(&self) -> usize {
        self.high.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, polarity: Polarity) -> &HashSet<OrderedFloat<f64>> {
        match polarity {
            Polarity::High => &self.high,
            Polarity::Low => &self.low,
        }
    }

    fn get_mut(&mut self, polarity: Polarity) -> &mut HashSet<OrderedFloat<f64>> {
        match polarity {
            Polarity::High => &mut self.high,
            Polarity::Low => &mut self.low,
        }
    }
}

/// One corrected wick cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    /// Row position within the cleaned slice.
    pub index: usize,
    /// MTS of the corrected candle.
    pub mts: f64,
    /// Value before correction.
    pub original: f64,
    /// Value written in its place.
    pub corrected: f64,
}

/// Result of a cleaning call.
#[derive(Debug, Clone)]
pub struct CleanReport {
    /// The corrected rows, same length and order as the input.
    pub candles: Vec<Candle>,
    /// HIGH corrections across all passes, in discovery order.
    pub high: Vec<Correction>,
    /// LOW corrections across all passes, in discovery order.
    pub low: Vec<Correction>,
    /// Number of passes run, including the final empty one.
    pub passes: usize,
    /// Every timestamp corrected so far, including those handed in.
    pub edited: EditedSets,
}

impl CleanReport {
    /// Total corrected cells.
    pub fn total(&self) -> usize {
        self.high.len() + self.low.len()
    }
}

/// Statistical wick corrector.
#[derive(Debug, Clone)]
pub struct OutlierScaler {
    stat_length: usize,
    sigma_limit: f64,
    /// Weights for the window around the rise into a candle.
    forward_weights: Vec<f64>,
    /// Same window shifted by one, for the fall out of a candle.
    backward_weights: Vec<f64>,
}

impl OutlierScaler {
    /// Create a scaler looking `stat_length` differences each way and flagging
    /// values more than `sigma_limit` standard deviations past the mean.
    pub fn new(stat_length: usize, sigma_limit: f64) -> Self {
        let s = stat_length;
        let len = 2 * s + 2;
        let weights = gaussian_window(len, 1.25 * len as f64 / 9.0);

        let forward_weights = [&weights[..s], &weights[s + 1..2 * s + 1]].concat();
        let backward_weights = [&weights[1..s + 1], &weights[s + 2..]].concat();

        Self {
            stat_length,
            sigma_limit,
            forward_weights,
            backward_weights,
        }
    }

    /// Create a scaler from configuration.
    pub fn from_config(config: &CleaningConfig) -> Self {
        Self::new(config.stat_length, config.sigma_limit)
    }

    pub fn stat_length(&self) -> usize {
        self.stat_length
    }

    pub fn sigma_limit(&self) -> f64 {
        self.sigma_limit
    }

    /// Correct wick outliers in `candles`.
    ///
    /// The set of already-corrected timestamps lives for this call only.
    pub fn clean(&self, candles: Vec<Candle>) -> CleanReport {
        self.clean_with(candles, EditedSets::new())
    }

    /// Correct wick outliers, never flagging a timestamp already in `edited`.
    pub fn clean_with(&self, candles: Vec<Candle>, edited: EditedSets) -> CleanReport {
        let mut candles = candles;
        let mut edited = edited;
        let mut high = Vec::new();
        let mut low = Vec::new();
        let mut passes = 0;

        loop {
            passes += 1;
            let found_high = self.scan(&mut candles, Polarity::High, &mut edited);
            let found_low = self.scan(&mut candles, Polarity::Low, &mut edited);
            let done = found_high.is_empty() && found_low.is_empty();
            if !done {
                tracing::debug!(
                    pass = passes,
                    high = found_high.len(),
                    low = found_low.len(),
                    "Found wick outliers"
                );
            }
            high.extend(found_high);
            low.extend(found_low);
            if done {
                break;
            }
        }

        CleanReport {
            candles,
            high,
            low,
            passes,
            edited,
        }
    }

    /// One pass over one wick. Corrections are applied to `candles` as they
    /// are found; the differences are taken from the series as it was at the
    /// start of the pass.
    fn scan(
        &self,
        candles: &mut [Candle],
        polarity: Polarity,
        edited: &mut EditedSets,
    ) -> Vec<Correction> {
        let mut found = Vec::new();
        if candles.len() < 2 {
            return found;
        }

        let s = self.stat_length;
        let column = polarity.column();
        let sign = polarity.sign();
        let series: Vec<f64> = candles.iter().map(|c| c.get(column)).collect();

        // diff[s + j] = series[j + 1] - series[j], zero padded on both sides
        let mut diff = vec![0.0; s];
        diff.extend(series.windows(2).map(|w| w[1] - w[0]));
        diff.extend(std::iter::repeat(0.0).take(s + 1));

        for n in 0..candles.len() - 1 {
            let row = n + 1;
            let Some(mts) = candles[row].mts_ms().map(|mts| mts as f64) else {
                continue;
            };
            if edited.contains(polarity, mts) {
                continue;
            }

            let k = n + s;
            let window = &diff[n..k + s + 2];

            // Rise into candle n + 1 against neighbouring rises
            let (values, weights) = same_sign(
                window[..s].iter().chain(&window[s + 1..2 * s + 1]),
                &self.forward_weights,
                |v| sign * v >= 0.0,
            );
            let (rise_mean, rise_std) = weighted_avg_and_std(&values, &weights);
            let rise_limit = rise_mean + sign * self.sigma_limit * rise_std;
            if !(sign * diff[k] > sign * rise_limit) {
                continue;
            }

            // Fall out of candle n + 1 against neighbouring falls
            let (values, weights) = same_sign(
                window[1..s + 1].iter().chain(&window[s + 2..]),
                &self.backward_weights,
                |v| sign * v <= 0.0,
            );
            let (fall_mean, fall_std) = weighted_avg_and_std(&values, &weights);
            let fall_limit = fall_mean - sign * self.sigma_limit * fall_std;
            if !(sign * diff[k + 1] < sign * fall_limit) {
                continue;
            }

            edited.get_mut(polarity).insert(OrderedFloat(mts));
            let corrected = polarity.body(&candles[row]) + rise_mean;
            candles[row].set(column, corrected);
            found.push(Correction {
                index: row,
                mts,
                original: series[row],
                corrected,
            });
        }

        found
    }
}

impl Default for OutlierScaler {
    fn default() -> Self {
        Self::from_config(&CleaningConfig::default())
    }
}

/// Keep the values (and their weights) accepted by `keep`.
fn same_sign<'a>(
    values: impl Iterator<Item = &'a f64>,
    weights: &[f64],
    keep: impl Fn(f64) -> bool,
) -> (Vec<f64>, Vec<f64>) {
    values
        .zip(weights)
        .filter(|(v, _)| keep(**v))
        .map(|(v, w)| (*v, *w))
        .unzip()
}
