//! Method selection policy.
//!
//! Rules, first match wins:
//! 1. forced preference → used verbatim
//! 2. managed preference → managed if suitable, otherwise hybrid
//! 3. auto → managed for long, complete, trending series; seasonal-local for
//!    seasonal series; tree-local for medium series; seasonal-local otherwise
//!
//! Selection is a pure function of its five inputs.

use serde::{Deserialize, Serialize};

use crate::method::ForecastMethod;
use crate::quality::DataQualitySignals;

pub const MANAGED_MIN_COMPLETENESS_PREFERRED: f64 = 0.8;
pub const MANAGED_MIN_COMPLETENESS_AUTO: f64 = 0.9;
pub const MANAGED_MIN_TREND_STRENGTH: f64 = 0.6;
pub const SEASONAL_MIN_POINTS: usize = 30;
pub const SEASONAL_MIN_STRENGTH: f64 = 0.5;
pub const TREE_MIN_POINTS: usize = 20;

/// Tunables of the selection policy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionPolicy {
    /// Minimum history length before the managed backend is considered.
    pub managed_min_points: usize,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            managed_min_points: 60,
        }
    }
}

/// Point-in-time view of the managed backend's load and availability.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedCapacity {
    pub in_flight: usize,
    pub max_in_flight: usize,
    /// Backend configured and reachable.
    pub available: bool,
}

impl ManagedCapacity {
    pub fn has_budget(&self) -> bool {
        self.in_flight < self.max_in_flight
    }

    pub fn usable(&self) -> bool {
        self.available && self.has_budget()
    }
}

pub fn select_method(
    signals: &DataQualitySignals,
    preferred: Option<ForecastMethod>,
    force: bool,
    capacity: ManagedCapacity,
    policy: &SelectionPolicy,
) -> ForecastMethod {
    if force {
        if let Some(method) = preferred {
            return method;
        }
    }

    let enough_points = signals.point_count >= policy.managed_min_points;

    if preferred == Some(ForecastMethod::ManagedCloud) {
        let suitable = enough_points
            && signals.completeness > MANAGED_MIN_COMPLETENESS_PREFERRED
            && capacity.usable();
        return if suitable {
            ForecastMethod::ManagedCloud
        } else {
            ForecastMethod::Hybrid
        };
    }

    if enough_points
        && signals.completeness > MANAGED_MIN_COMPLETENESS_AUTO
        && signals.trend_strength > MANAGED_MIN_TREND_STRENGTH
        && capacity.usable()
    {
        ForecastMethod::ManagedCloud
    } else if signals.point_count >= SEASONAL_MIN_POINTS
        && signals.seasonality_strength > SEASONAL_MIN_STRENGTH
    {
        ForecastMethod::SeasonalLocal
    } else if signals.point_count >= TREE_MIN_POINTS {
        ForecastMethod::TreeLocal
    } else {
        ForecastMethod::SeasonalLocal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn signals(points: usize, completeness: f64, trend: f64, seasonality: f64) -> DataQualitySignals {
        DataQualitySignals {
            point_count: points,
            completeness,
            trend_strength: trend,
            seasonality_strength: seasonality,
            noise_level: 0.2,
        }
    }

    fn idle() -> ManagedCapacity {
        ManagedCapacity {
            in_flight: 0,
            max_in_flight: 5,
            available: true,
        }
    }

    #[test]
    fn forced_preference_is_verbatim() {
        let s = DataQualitySignals::insufficient();
        let unavailable = ManagedCapacity {
            available: false,
            ..idle()
        };
        let got = select_method(
            &s,
            Some(ForecastMethod::ManagedCloud),
            true,
            unavailable,
            &SelectionPolicy::default(),
        );
        assert_eq!(got, ForecastMethod::ManagedCloud);
    }

    #[test]
    fn force_without_preference_falls_through_to_auto() {
        let got = select_method(&signals(25, 1.0, 0.1, 0.2), None, true, idle(), &SelectionPolicy::default());
        assert_eq!(got, ForecastMethod::TreeLocal);
    }

    #[test]
    fn short_series_downgrades_managed_preference_to_hybrid() {
        let got = select_method(
            &signals(5, 1.0, 0.9, 0.0),
            Some(ForecastMethod::ManagedCloud),
            false,
            idle(),
            &SelectionPolicy {
                managed_min_points: 60,
            },
        );
        assert_eq!(got, ForecastMethod::Hybrid);
    }

    #[test]
    fn managed_preference_honoured_when_suitable() {
        let got = select_method(
            &signals(90, 0.85, 0.0, 0.0),
            Some(ForecastMethod::ManagedCloud),
            false,
            idle(),
            &SelectionPolicy::default(),
        );
        assert_eq!(got, ForecastMethod::ManagedCloud);
    }

    #[test]
    fn exhausted_budget_downgrades_managed_preference() {
        let busy = ManagedCapacity {
            in_flight: 5,
            ..idle()
        };
        let got = select_method(
            &signals(90, 1.0, 0.9, 0.0),
            Some(ForecastMethod::ManagedCloud),
            false,
            busy,
            &SelectionPolicy::default(),
        );
        assert_eq!(got, ForecastMethod::Hybrid);
    }

    #[test]
    fn medium_low_seasonality_series_picks_tree() {
        let got = select_method(&signals(25, 1.0, 0.3, 0.2), None, false, idle(), &SelectionPolicy::default());
        assert_eq!(got, ForecastMethod::TreeLocal);
    }

    #[test]
    fn auto_rules_in_order() {
        let policy = SelectionPolicy::default();
        assert_eq!(
            select_method(&signals(120, 0.95, 0.7, 0.9), None, false, idle(), &policy),
            ForecastMethod::ManagedCloud
        );
        // Completeness must be strictly above 0.9 in auto mode.
        assert_eq!(
            select_method(&signals(120, 0.9, 0.7, 0.9), None, false, idle(), &policy),
            ForecastMethod::SeasonalLocal
        );
        assert_eq!(
            select_method(&signals(40, 1.0, 0.1, 0.6), None, false, idle(), &policy),
            ForecastMethod::SeasonalLocal
        );
        assert_eq!(
            select_method(&signals(10, 1.0, 0.1, 0.0), None, false, idle(), &policy),
            ForecastMethod::SeasonalLocal
        );
    }

    #[test]
    fn unconfigured_backend_is_never_auto_selected() {
        let offline = ManagedCapacity {
            available: false,
            ..idle()
        };
        let got = select_method(&signals(200, 1.0, 0.99, 0.0), None, false, offline, &SelectionPolicy::default());
        assert_eq!(got, ForecastMethod::TreeLocal);
    }

    #[test]
    fn non_managed_preference_uses_auto_rules() {
        let got = select_method(
            &signals(25, 1.0, 0.1, 0.0),
            Some(ForecastMethod::SeasonalLocal),
            false,
            idle(),
            &SelectionPolicy::default(),
        );
        assert_eq!(got, ForecastMethod::TreeLocal);
    }

    fn any_method() -> impl Strategy<Value = Option<ForecastMethod>> {
        prop_oneof![
            Just(None),
            Just(Some(ForecastMethod::ManagedCloud)),
            Just(Some(ForecastMethod::SeasonalLocal)),
            Just(Some(ForecastMethod::TreeLocal)),
            Just(Some(ForecastMethod::Hybrid)),
        ]
    }

    proptest! {
        #[test]
        fn selection_is_deterministic(
            points in 0usize..400,
            completeness in 0.0f64..=1.0,
            trend in 0.0f64..=1.0,
            seasonality in 0.0f64..=1.0,
            preferred in any_method(),
            force in any::<bool>(),
            in_flight in 0usize..8,
            available in any::<bool>(),
        ) {
            let s = signals(points, completeness, trend, seasonality);
            let capacity = ManagedCapacity { in_flight, max_in_flight: 5, available };
            let policy = SelectionPolicy::default();
            let first = select_method(&s, preferred, force, capacity, &policy);
            let second = select_method(&s, preferred, force, capacity, &policy);
            prop_assert_eq!(first, second);
            if first == ForecastMethod::ManagedCloud && !(force && preferred.is_some()) {
                prop_assert!(capacity.usable());
            }
        }
    }
}
