//! Hybrid result fusion.
//!
//! The managed result wins whenever it completed with `success` status; there
//! is no accuracy comparison against the local result. Otherwise the local
//! result is promoted and relabelled as the hybrid fallback.

use crate::method::ResultMethod;
use crate::result::{ForecastError, ForecastResult};

pub fn fuse(
    managed: Option<ForecastResult>,
    local: Result<ForecastResult, ForecastError>,
) -> Result<ForecastResult, ForecastError> {
    match managed {
        Some(mut primary) if primary.is_success() => {
            primary.fallback_method = Some(ResultMethod::SeasonalLocal);
            primary.combined = true;
            Ok(primary)
        }
        _ => {
            let mut local = local?;
            local.method = ResultMethod::SeasonalLocalFallback;
            local.combined = true;
            Ok(local)
        }
    }
}
