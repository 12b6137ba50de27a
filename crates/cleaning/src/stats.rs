//! Weighted statistics used by the outlier scan.

use statrs::statistics::Statistics;

/// Weighted mean and (population) standard deviation.
///
/// `values` and `weights` are paired element-wise. Degenerate input is not an
/// error: when both the weights and the values sum to zero (which includes
/// empty input) the result is `(0, 0)`; when only the weights sum to zero the
/// unweighted mean and standard deviation are returned.
pub fn weighted_avg_and_std(values: &[f64], weights: &[f64]) -> (f64, f64) {
    let weight_sum: f64 = weights.iter().sum();
    let value_sum: f64 = values.iter().sum();

    if weight_sum == 0.0 && value_sum == 0.0 {
        return (0.0, 0.0);
    }
    if weight_sum == 0.0 {
        return (values.iter().mean(), values.iter().population_std_dev());
    }

    let average = values
        .iter()
        .zip(weights)
        .map(|(v, w)| v * w)
        .sum::<f64>()
        / weight_sum;
    let variance = values
        .iter()
        .zip(weights)
        .map(|(v, w)| w * (v - average).powi(2))
        .sum::<f64>()
        / weight_sum;

    (average, variance.sqrt())
}

/// Symmetric Gaussian window of `len` points with standard deviation `std`.
///
/// Peaks at 1.0 in the middle of the window (between the two middle points
/// for even lengths).
pub fn gaussian_window(len: usize, std: f64) -> Vec<f64> {
    let center = (len as f64 - 1.0) / 2.0;
    (0..len)
        .map(|i| {
            let z = (i as f64 - center) / std;
            (-0.5 * z * z).exp()
        })
        .collect()
}
