//! Reserved encoding units and streaming endpoint capacity.

use std::sync::Arc;

use vidkit_client::MediaService;
use vidkit_core::models::{ReservedUnitSetting, ReservedUnitType, StreamingEndpoint};
use vidkit_core::{QuotaError, ServiceResult};

/// Returned by [`QuotaController::get_reserved_units`] when the count is unknown.
pub const UNKNOWN_UNITS: i64 = -1;

pub struct QuotaController {
    service: Arc<dyn MediaService>,
}

impl QuotaController {
    pub fn new(service: Arc<dyn MediaService>) -> Self {
        Self { service }
    }

    /// Current units for `unit_type`, or [`UNKNOWN_UNITS`] when there is no
    /// record or the lookup fails. Never any other negative value.
    pub async fn get_reserved_units(&self, unit_type: ReservedUnitType) -> i64 {
        match self.try_get_reserved_units(unit_type).await {
            Ok(Some(setting)) => i64::from(setting.current_units),
            Ok(None) => {
                tracing::warn!(unit_type = %unit_type, "No reserved unit record");
                UNKNOWN_UNITS
            }
            Err(e) => {
                tracing::warn!(unit_type = %unit_type, error = %e, "Failed to read reserved units");
                UNKNOWN_UNITS
            }
        }
    }

    /// The raw lookup, for callers that need to tell "no record" from a failure.
    pub async fn try_get_reserved_units(
        &self,
        unit_type: ReservedUnitType,
    ) -> Result<Option<ReservedUnitSetting>, QuotaError> {
        Ok(self.service.get_reserved_units(unit_type).await?)
    }

    /// Apply `count` units of `unit_type`. On failure the previous setting
    /// stays in effect remotely.
    pub async fn set_reserved_units(
        &self,
        unit_type: ReservedUnitType,
        count: i64,
    ) -> Result<ReservedUnitSetting, QuotaError> {
        let units = u32::try_from(count).map_err(|_| QuotaError::InvalidCount {
            count,
            reason: if count < 0 {
                "must not be negative".to_string()
            } else {
                format!("must be at most {}", u32::MAX)
            },
        })?;

        let setting = self.service.set_reserved_units(unit_type, units).await?;
        tracing::info!(
            unit_type = %setting.unit_type,
            units = setting.current_units,
            "Reserved units updated"
        );
        Ok(setting)
    }

    pub async fn list_streaming_endpoints(&self) -> ServiceResult<Vec<StreamingEndpoint>> {
        let endpoints = self.service.list_streaming_endpoints().await?;
        for endpoint in &endpoints {
            tracing::debug!(
                endpoint = %endpoint.name,
                scale_units = endpoint.scale_units,
                state = %endpoint.state,
                "Streaming endpoint"
            );
        }
        Ok(endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidkit_client::InMemoryMediaService;

    #[tokio::test]
    async fn get_reports_configured_units() {
        let controller = QuotaController::new(Arc::new(InMemoryMediaService::new()));
        assert_eq!(controller.get_reserved_units(ReservedUnitType::Basic).await, 1);
    }

    #[tokio::test]
    async fn get_without_record_is_unknown() {
        let controller =
            QuotaController::new(Arc::new(InMemoryMediaService::new().without_reserved_units()));
        assert_eq!(
            controller.get_reserved_units(ReservedUnitType::Standard).await,
            UNKNOWN_UNITS
        );
    }

    #[tokio::test]
    async fn get_failure_is_unknown_but_try_get_surfaces_it() {
        let controller = QuotaController::new(Arc::new(
            InMemoryMediaService::new().with_unavailable_reserved_units(),
        ));
        assert_eq!(
            controller.get_reserved_units(ReservedUnitType::Basic).await,
            UNKNOWN_UNITS
        );
        assert!(matches!(
            controller.try_get_reserved_units(ReservedUnitType::Basic).await,
            Err(QuotaError::Service(_))
        ));
    }

    #[tokio::test]
    async fn set_premium_is_read_back_as_premium() {
        let controller = QuotaController::new(Arc::new(InMemoryMediaService::new()));
        let setting = controller
            .set_reserved_units(ReservedUnitType::Premium, 2)
            .await
            .unwrap();
        assert_eq!(setting.unit_type, ReservedUnitType::Premium);
        assert_eq!(controller.get_reserved_units(ReservedUnitType::Premium).await, 2);
        assert_eq!(controller.get_reserved_units(ReservedUnitType::Basic).await, 1);
    }

    #[tokio::test]
    async fn set_rejects_out_of_range_counts() {
        let controller = QuotaController::new(Arc::new(InMemoryMediaService::new()));
        for count in [-1, i64::from(u32::MAX) + 1] {
            let err = controller
                .set_reserved_units(ReservedUnitType::Basic, count)
                .await
                .unwrap_err();
            assert!(matches!(err, QuotaError::InvalidCount { .. }));
        }
        assert_eq!(controller.get_reserved_units(ReservedUnitType::Basic).await, 1);
    }

    #[tokio::test]
    async fn set_failure_is_returned() {
        let controller = QuotaController::new(Arc::new(
            InMemoryMediaService::new().with_unavailable_reserved_units(),
        ));
        let err = controller
            .set_reserved_units(ReservedUnitType::Standard, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::Service(_)));
    }

    #[tokio::test]
    async fn lists_default_endpoint() {
        let controller = QuotaController::new(Arc::new(InMemoryMediaService::new()));
        let endpoints = controller.list_streaming_endpoints().await.unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].name, "default");
    }
}
