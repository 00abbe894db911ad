use serde::{Deserialize, Serialize};

/// Forecasting backend a request can be routed to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    /// Billed managed forecasting service (asynchronous, multi-stage).
    ManagedCloud,
    /// Local additive seasonal model.
    SeasonalLocal,
    /// Local gradient-boosted tree model.
    TreeLocal,
    /// Managed and seasonal-local concurrently, fused.
    Hybrid,
}

impl ForecastMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastMethod::ManagedCloud => "managed_cloud",
            ForecastMethod::SeasonalLocal => "seasonal_local",
            ForecastMethod::TreeLocal => "tree_local",
            ForecastMethod::Hybrid => "hybrid",
        }
    }
}

impl core::fmt::Display for ForecastMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local model families run in-process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalMethod {
    Seasonal,
    Tree,
}

impl LocalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocalMethod::Seasonal => "seasonal_local",
            LocalMethod::Tree => "tree_local",
        }
    }
}

impl core::fmt::Display for LocalMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label of the backend that actually produced a result.
///
/// Differs from [`ForecastMethod`]: hybrid never produces a result by itself,
/// and a hybrid run whose managed branch was unusable is labelled
/// `SeasonalLocalFallback`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultMethod {
    ManagedCloud,
    SeasonalLocal,
    TreeLocal,
    SeasonalLocalFallback,
}

impl From<LocalMethod> for ResultMethod {
    fn from(value: LocalMethod) -> Self {
        match value {
            LocalMethod::Seasonal => ResultMethod::SeasonalLocal,
            LocalMethod::Tree => ResultMethod::TreeLocal,
        }
    }
}

impl ResultMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultMethod::ManagedCloud => "managed_cloud",
            ResultMethod::SeasonalLocal => "seasonal_local",
            ResultMethod::TreeLocal => "tree_local",
            ResultMethod::SeasonalLocalFallback => "seasonal_local_fallback",
        }
    }
}

impl core::fmt::Display for ResultMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
