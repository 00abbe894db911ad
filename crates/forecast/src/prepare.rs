//! Columnar preparation for the managed backend.
//!
//! The backend expects a complete daily series per item: one row per calendar
//! day between the first and last observation. Gaps are filled by linear
//! interpolation between the nearest known neighbours; anything that cannot
//! be interpolated (leading/trailing missing values) becomes zero.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use vendorflow_core::ItemId;

use crate::result::ForecastError;
use crate::series::Observation;

/// Timestamp layout the backend's dataset schema declares.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedRow {
    pub timestamp: NaiveDate,
    pub target_value: f64,
}

/// Daily, gap-free series for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedSeries {
    pub item_id: ItemId,
    pub rows: Vec<PreparedRow>,
}

impl PreparedSeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.timestamp)
    }

    /// CSV body with a `timestamp,target_value,item_id` header.
    pub fn to_csv(&self) -> String {
        let item = csv_field(self.item_id.as_str());
        let mut out = String::with_capacity(32 + self.rows.len() * (item.len() + 32));
        out.push_str("timestamp,target_value,item_id\n");
        for row in &self.rows {
            let ts = row
                .timestamp
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default();
            out.push_str(&format!("{ts},{},{item}\n", row.target_value));
        }
        out
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

/// Build the backend's daily series from raw observations.
///
/// Several observations on the same day are summed.
pub fn prepare_daily_series(
    item_id: &ItemId,
    series: &[Observation],
) -> Result<PreparedSeries, ForecastError> {
    let mut by_day: BTreeMap<NaiveDate, Option<f64>> = BTreeMap::new();
    for obs in series {
        let slot = by_day.entry(obs.date).or_insert(None);
        if let Some(v) = obs.finite_value() {
            *slot = Some(slot.unwrap_or(0.0) + v);
        }
    }

    let (Some(first), Some(last)) = (
        by_day.keys().next().copied(),
        by_day.keys().next_back().copied(),
    ) else {
        return Err(ForecastError::InvalidInput(
            "no historical data available for forecasting".to_string(),
        ));
    };

    let mut dates = Vec::new();
    let mut day = first;
    while day <= last {
        dates.push(day);
        day = match day.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => break,
        };
    }

    let mut values: Vec<Option<f64>> = dates
        .iter()
        .map(|d| by_day.get(d).copied().flatten())
        .collect();
    interpolate_interior(&mut values);

    let rows = dates
        .into_iter()
        .zip(values)
        .map(|(timestamp, v)| PreparedRow {
            timestamp,
            target_value: v.unwrap_or(0.0),
        })
        .collect();

    Ok(PreparedSeries {
        item_id: item_id.clone(),
        rows,
    })
}

/// Fill every `None` that has a known value on both sides.
fn interpolate_interior(values: &mut [Option<f64>]) {
    let mut prev_known: Option<usize> = None;
    for i in 0..values.len() {
        let Some(right) = values[i] else { continue };
        if let Some(p) = prev_known {
            let gap = i - p;
            if gap > 1 {
                let left = values[p].unwrap_or(0.0);
                let step = (right - left) / gap as f64;
                for k in 1..gap {
                    values[p + k] = Some(left + step * k as f64);
                }
            }
        }
        prev_known = Some(i);
    }
}
