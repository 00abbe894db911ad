//! Data-sufficiency signals for a historical series.
//!
//! Model:
//! - `trend_strength`: |Pearson correlation| between value and time index.
//! - `seasonality_strength`: |autocorrelation| at a weekly lag, once two full
//!   weeks of points exist.
//! - `noise_level`: coefficient of variation (population std / mean).
//!
//! Missing values count against `completeness` and read as zero elsewhere.

use serde::{Deserialize, Serialize};

use crate::series::Observation;

/// Lag used for the seasonality measure (daily data, weekly cycle).
pub const SEASONAL_LAG: usize = 7;

/// Minimum points before seasonality is measured at all.
pub const MIN_SEASONAL_POINTS: usize = 2 * SEASONAL_LAG;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualitySignals {
    pub point_count: usize,
    /// Fraction of points with a usable value, in \[0, 1\].
    pub completeness: f64,
    /// In \[0, 1\].
    pub trend_strength: f64,
    /// In \[0, 1\].
    pub seasonality_strength: f64,
    /// `>= 0`; 1.0 signals "insufficient" for empty or non-positive series.
    pub noise_level: f64,
}

impl DataQualitySignals {
    /// Signals for a series with no points.
    pub fn insufficient() -> Self {
        Self {
            point_count: 0,
            completeness: 0.0,
            trend_strength: 0.0,
            seasonality_strength: 0.0,
            noise_level: 1.0,
        }
    }
}

/// Assess a series. Pure; never panics, whatever the input.
pub fn assess(series: &[Observation]) -> DataQualitySignals {
    if series.is_empty() {
        return DataQualitySignals::insufficient();
    }

    let point_count = series.len();
    let present = series.iter().filter(|o| o.finite_value().is_some()).count();
    let completeness = present as f64 / point_count as f64;

    let values: Vec<f64> = series
        .iter()
        .map(|o| o.finite_value().unwrap_or(0.0))
        .collect();

    let index: Vec<f64> = (0..point_count).map(|i| i as f64).collect();
    let trend_strength = abs_correlation(&values, &index);

    let seasonality_strength = if point_count >= MIN_SEASONAL_POINTS {
        abs_correlation(
            &values[..point_count - SEASONAL_LAG],
            &values[SEASONAL_LAG..],
        )
    } else {
        0.0
    };

    let m = mean(&values);
    let noise_level = Some(m)
        .filter(|m| m.is_finite() && *m > 0.0)
        .map(|m| stddev_population(&values, m) / m)
        .filter(|cv| cv.is_finite())
        .unwrap_or(1.0);

    DataQualitySignals {
        point_count,
        completeness,
        trend_strength,
        seasonality_strength,
        noise_level,
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / (xs.len() as f64)
}

/// Population standard deviation (n), matching the usual array `std()`.
fn stddev_population(xs: &[f64], mean: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let var = xs
        .iter()
        .map(|x| {
            let d = x - mean;
            d * d
        })
        .sum::<f64>()
        / (xs.len() as f64);
    var.sqrt()
}

/// |Pearson r| of two equally long slices; 0 when undefined (constant input).
fn abs_correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mx = mean(xs);
    let my = mean(ys);

    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        cov += dx * dy;
        vx += dx * dx;
        vy += dy * dy;
        sx += x * x;
        sy += y * y;
    }

    // Spread below rounding noise relative to the values' own scale is constant.
    if vx <= f64::EPSILON * sx || vy <= f64::EPSILON * sy {
        return 0.0;
    }
    let r = cov / (vx.sqrt() * vy.sqrt());
    if r.is_finite() { r.abs().min(1.0) } else { 0.0 }
}
