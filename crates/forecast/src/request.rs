use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use vendorflow_core::{DomainError, DomainResult, ItemId, TenantId, VendorId};

use crate::method::ForecastMethod;
use crate::series::DateRange;

pub const MIN_HORIZON: u32 = 1;
pub const MAX_HORIZON: u32 = 365;

/// Which historical quantity is being forecast.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Demand,
    Cost,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Demand => "demand",
            Metric::Cost => "cost",
        }
    }
}

/// One forecast invocation. Built once, never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub vendor_id: VendorId,
    #[serde(default)]
    pub metric: Metric,
    /// Number of daily points requested.
    pub horizon: u32,
    #[serde(default)]
    pub preferred_method: Option<ForecastMethod>,
    /// Use `preferred_method` verbatim, skipping quality checks.
    #[serde(default)]
    pub force_method: bool,
    /// Only history strictly before this date is used (backtesting).
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

impl ForecastRequest {
    pub fn new(tenant_id: TenantId, item_id: ItemId, vendor_id: VendorId, horizon: u32) -> Self {
        Self {
            tenant_id,
            item_id,
            vendor_id,
            metric: Metric::Demand,
            horizon,
            preferred_method: None,
            force_method: false,
            as_of: None,
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_preferred_method(mut self, method: ForecastMethod) -> Self {
        self.preferred_method = Some(method);
        self
    }

    /// Prefer `method` and skip selection entirely.
    pub fn forced(mut self, method: ForecastMethod) -> Self {
        self.preferred_method = Some(method);
        self.force_method = true;
        self
    }

    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if !(MIN_HORIZON..=MAX_HORIZON).contains(&self.horizon) {
            return Err(DomainError::validation(format!(
                "horizon must be within {MIN_HORIZON}..={MAX_HORIZON}, got {}",
                self.horizon
            )));
        }
        Ok(())
    }

    /// History window the request trains on.
    pub fn history_range(&self) -> DateRange {
        match self.as_of.and_then(|d| d.checked_sub_days(Days::new(1))) {
            Some(end) => DateRange::until(end),
            None => DateRange::all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(horizon: u32) -> ForecastRequest {
        ForecastRequest::new(
            TenantId::new(),
            ItemId::new("item-1").unwrap(),
            VendorId::new("vendor-1").unwrap(),
            horizon,
        )
    }

    #[test]
    fn horizon_bounds_are_enforced() {
        assert!(request(0).validate().is_err());
        assert!(request(1).validate().is_ok());
        assert!(request(365).validate().is_ok());
        assert!(request(366).validate().is_err());
    }

    #[test]
    fn decoded_requests_keep_id_rules() {
        let tenant = TenantId::new();
        let decoded: ForecastRequest = serde_json::from_value(serde_json::json!({
            "tenant_id": tenant.to_string(),
            "item_id": "item-1",
            "vendor_id": "vendor-1",
            "horizon": 7,
        }))
        .unwrap();
        assert_eq!(decoded.metric, Metric::Demand);
        assert_eq!(decoded.item_id.as_str(), "item-1");

        let blank = serde_json::from_value::<ForecastRequest>(serde_json::json!({
            "tenant_id": tenant.to_string(),
            "item_id": "",
            "vendor_id": "vendor-1",
            "horizon": 7,
        }));
        assert!(blank.is_err());
    }

    #[test]
    fn as_of_excludes_the_cutoff_day() {
        let cutoff = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let range = request(7).with_as_of(cutoff).history_range();
        assert!(range.contains(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
        assert!(!range.contains(cutoff));
        assert_eq!(request(7).history_range(), DateRange::all());
    }

    #[test]
    fn deserializes_with_defaults() {
        let tenant = TenantId::new();
        let json = serde_json::json!({
            "tenant_id": tenant,
            "item_id": "item-9",
            "vendor_id": "vendor-2",
            "horizon": 14,
            "preferred_method": "managed_cloud"
        });
        let req: ForecastRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.metric, Metric::Demand);
        assert_eq!(req.preferred_method, Some(ForecastMethod::ManagedCloud));
        assert!(!req.force_method);
    }
}
