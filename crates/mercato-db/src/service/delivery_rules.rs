//! Delivery fee setting and exclusion rules.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use mercato_core::validation::{validate_non_negative, validate_positive_count};
use mercato_core::{DeliveryFeeExclusion, DeliveryFeeSetting, ExclusionTarget, ValidationError};

use super::error::{EngineError, EngineResult};
use super::EngineState;
use crate::repository::{catalog, delivery_rule};

const MAX_REMARK_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRequest {
    pub item_type: ExclusionTarget,
    pub target_id: i64,
    /// `None` excludes the target outright.
    pub min_quantity_for_free: Option<i64>,
    pub remark: Option<String>,
}

pub struct DeliveryRuleService {
    state: Arc<EngineState>,
}

impl DeliveryRuleService {
    pub(crate) fn new(state: Arc<EngineState>) -> Self {
        DeliveryRuleService { state }
    }

    pub async fn get_setting(&self) -> EngineResult<DeliveryFeeSetting> {
        let mut conn = self.state.db.acquire().await?;
        Ok(delivery_rule::fetch_setting(&mut conn).await?)
    }

    pub async fn upsert_setting(&self, setting: DeliveryFeeSetting) -> EngineResult<DeliveryFeeSetting> {
        validate_non_negative("base_fee", setting.base_fee)?;
        validate_non_negative("free_shipping_threshold", setting.free_shipping_threshold)?;
        let mut conn = self.state.db.acquire().await?;
        delivery_rule::upsert_setting(&mut conn, setting, self.state.now()).await?;
        info!(
            base_fee = %setting.base_fee,
            threshold = %setting.free_shipping_threshold,
            "Delivery fee setting saved"
        );
        Ok(setting)
    }

    pub async fn list_exclusions(&self) -> EngineResult<Vec<DeliveryFeeExclusion>> {
        let mut conn = self.state.db.acquire().await?;
        Ok(delivery_rule::list_exclusions(&mut conn).await?)
    }

    /// A second rule for the same target fails with a unique violation.
    pub async fn create_exclusion(&self, request: ExclusionRequest) -> EngineResult<DeliveryFeeExclusion> {
        validate_min_quantity(request.min_quantity_for_free)?;
        let remark = normalize_remark(request.remark.as_deref())?;
        let mut conn = self.state.db.acquire().await?;

        let exists = match request.item_type {
            ExclusionTarget::Product => catalog::fetch_product(&mut conn, request.target_id).await?.is_some(),
            ExclusionTarget::Category => catalog::fetch_category(&mut conn, request.target_id).await?.is_some(),
        };
        if !exists {
            return Err(EngineError::not_found(
                match request.item_type {
                    ExclusionTarget::Product => "Product",
                    ExclusionTarget::Category => "Category",
                },
                request.target_id,
            ));
        }

        let id = delivery_rule::insert_exclusion(
            &mut conn,
            request.item_type,
            request.target_id,
            request.min_quantity_for_free,
            remark.as_deref(),
            self.state.now(),
        )
        .await?;
        info!(id, item_type = %request.item_type, target_id = request.target_id, "Exclusion rule created");
        fetch_exclusion(&mut conn, id).await
    }

    /// Changes the quantity and remark. The target is fixed once created.
    pub async fn update_exclusion(
        &self,
        id: i64,
        min_quantity_for_free: Option<i64>,
        remark: Option<&str>,
    ) -> EngineResult<DeliveryFeeExclusion> {
        validate_min_quantity(min_quantity_for_free)?;
        let remark = normalize_remark(remark)?;
        let mut conn = self.state.db.acquire().await?;
        if !delivery_rule::update_exclusion(&mut conn, id, min_quantity_for_free, remark.as_deref(), self.state.now())
            .await?
        {
            return Err(EngineError::not_found("DeliveryFeeExclusion", id));
        }
        fetch_exclusion(&mut conn, id).await
    }

    pub async fn delete_exclusion(&self, id: i64) -> EngineResult<()> {
        let mut conn = self.state.db.acquire().await?;
        if !delivery_rule::delete_exclusion(&mut conn, id).await? {
            return Err(EngineError::not_found("DeliveryFeeExclusion", id));
        }
        info!(id, "Exclusion rule deleted");
        Ok(())
    }
}

fn validate_min_quantity(min_quantity_for_free: Option<i64>) -> EngineResult<()> {
    if let Some(min) = min_quantity_for_free {
        validate_positive_count("min_quantity_for_free", min)?;
    }
    Ok(())
}

/// Blank remarks are stored as NULL.
fn normalize_remark(remark: Option<&str>) -> EngineResult<Option<String>> {
    let Some(remark) = remark.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    if remark.chars().count() > MAX_REMARK_LEN {
        return Err(ValidationError::TooLong {
            field: "remark".to_string(),
            max: MAX_REMARK_LEN,
        }
        .into());
    }
    Ok(Some(remark.to_string()))
}

async fn fetch_exclusion(conn: &mut sqlx::SqliteConnection, id: i64) -> EngineResult<DeliveryFeeExclusion> {
    delivery_rule::fetch_exclusion(conn, id)
        .await?
        .ok_or_else(|| EngineError::not_found("DeliveryFeeExclusion", id))
}
