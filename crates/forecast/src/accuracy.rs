//! Forecast accuracy against observed actuals.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::method::ResultMethod;
use crate::result::Prediction;
use crate::series::Observation;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    /// Percent; dates with a zero actual are excluded, `None` when all are.
    pub mape: Option<f64>,
    /// 0 when the actuals have no variance.
    pub r2_score: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_evaluated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub accuracy_metrics: AccuracyMetrics,
    pub evaluation_period: EvaluationPeriod,
    pub method_used: ResultMethod,
    pub data_points_compared: usize,
    pub generated_at: DateTime<Utc>,
}

/// Reported (not raised) accuracy failures.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "error", content = "detail", rename_all = "snake_case")]
pub enum AccuracyError {
    #[error("invalid evaluation window: {0}")]
    InvalidWindow(String),

    #[error("no actual data in evaluation period")]
    NoActualData,

    #[error("no predictions available for comparison")]
    NoPredictions,

    #[error("no overlapping dates for accuracy calculation")]
    NoOverlap,

    #[error("forecast for evaluation failed: {0}")]
    Forecast(String),

    #[error("historical data unavailable: {0}")]
    History(String),
}

/// Inner-join actuals and predictions by date and score the overlap.
///
/// Actuals without a usable value and dates present on only one side are
/// dropped silently. Returns the metrics and the number of compared dates.
pub fn compare(
    actuals: &[Observation],
    predictions: &[Prediction],
) -> Result<(AccuracyMetrics, usize), AccuracyError> {
    if predictions.is_empty() {
        return Err(AccuracyError::NoPredictions);
    }

    let predicted: BTreeMap<NaiveDate, f64> =
        predictions.iter().map(|p| (p.date, p.point)).collect();

    let pairs: Vec<(f64, f64)> = actuals
        .iter()
        .filter_map(|obs| {
            let actual = obs.finite_value()?;
            let forecast = predicted.get(&obs.date)?;
            Some((actual, *forecast))
        })
        .collect();

    if pairs.is_empty() {
        return Err(AccuracyError::NoOverlap);
    }

    let n = pairs.len() as f64;
    let mae = pairs.iter().map(|(a, p)| (a - p).abs()).sum::<f64>() / n;
    let mse = pairs.iter().map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n;
    let rmse = mse.sqrt();

    let nonzero: Vec<f64> = pairs
        .iter()
        .filter(|(a, _)| *a != 0.0)
        .map(|(a, p)| ((a - p) / a).abs())
        .collect();
    let mape = if nonzero.is_empty() {
        None
    } else {
        Some(nonzero.iter().sum::<f64>() / nonzero.len() as f64 * 100.0)
    };

    let mean_actual = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let ss_tot = pairs
        .iter()
        .map(|(a, _)| (a - mean_actual).powi(2))
        .sum::<f64>();
    let ss_res = pairs.iter().map(|(a, p)| (a - p).powi(2)).sum::<f64>();
    let r2_score = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    Ok((
        AccuracyMetrics {
            mae,
            mse,
            rmse,
            mape,
            r2_score,
        },
        pairs.len(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
    }

    fn p(day: u32, point: f64) -> Prediction {
        Prediction::new(d(day), point, point - 1.0, point + 1.0)
    }

    #[test]
    fn scores_only_the_overlap() {
        let actuals = vec![
            Observation::new(d(1), 10.0),
            Observation::new(d(2), 20.0),
            Observation::new(d(3), 30.0),
        ];
        let predictions = vec![p(2, 22.0), p(3, 27.0), p(4, 99.0)];
        let (m, compared) = compare(&actuals, &predictions).unwrap();
        assert_eq!(compared, 2);
        assert!((m.mae - 2.5).abs() < 1e-12);
        assert!((m.mse - 6.5).abs() < 1e-12);
        assert!((m.rmse - 6.5f64.sqrt()).abs() < 1e-12);
        assert!((m.mape.unwrap() - 10.0).abs() < 1e-9);
        // ss_tot = 50, ss_res = 13
        assert!((m.r2_score - (1.0 - 13.0 / 50.0)).abs() < 1e-12);
    }

    #[test]
    fn zero_actuals_are_excluded_from_mape() {
        let actuals = vec![Observation::new(d(1), 0.0), Observation::new(d(2), 10.0)];
        let (m, _) = compare(&actuals, &[p(1, 1.0), p(2, 12.0)]).unwrap();
        assert!((m.mape.unwrap() - 20.0).abs() < 1e-9);

        let all_zero = vec![Observation::new(d(1), 0.0)];
        let (m, _) = compare(&all_zero, &[p(1, 1.0)]).unwrap();
        assert_eq!(m.mape, None);
    }

    #[test]
    fn constant_actuals_give_zero_r2() {
        let actuals = vec![Observation::new(d(1), 5.0), Observation::new(d(2), 5.0)];
        let (m, _) = compare(&actuals, &[p(1, 4.0), p(2, 6.0)]).unwrap();
        assert_eq!(m.r2_score, 0.0);
    }

    #[test]
    fn disjoint_dates_are_reported() {
        let actuals = vec![Observation::new(d(1), 5.0)];
        assert_eq!(compare(&actuals, &[p(9, 5.0)]), Err(AccuracyError::NoOverlap));
        assert_eq!(compare(&actuals, &[]), Err(AccuracyError::NoPredictions));
    }

    #[test]
    fn errors_serialize_as_tagged_objects() {
        let json = serde_json::to_value(AccuracyError::NoOverlap).unwrap();
        assert_eq!(json["error"], "no_overlap");
    }
}
