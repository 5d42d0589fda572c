//! Delivery addresses.
//!
//! Text is geocoded on every write; a failed lookup stores null coordinates.
//! A user has at most one default address, and the first one is always default.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use mercato_core::geo::GeoPoint;
use mercato_core::validation::validate_text;
use mercato_core::Address;

use super::error::{EngineError, EngineResult};
use super::rider_payout::RiderPayoutService;
use super::EngineState;
use crate::pool::commit;
use crate::repository::{address, catalog, order as order_repo};

const MAX_TEXT_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAddressRequest {
    pub user_id: i64,
    pub text: String,
    #[serde(default)]
    pub store_type: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

pub struct AddressService {
    state: Arc<EngineState>,
}

impl AddressService {
    pub(crate) fn new(state: Arc<EngineState>) -> Self {
        AddressService { state }
    }

    pub async fn create_address(&self, request: CreateAddressRequest) -> EngineResult<Address> {
        let text = validate_text("text", &request.text, MAX_TEXT_LEN)?;
        let point = self.locate(&text).await?;
        let now = self.state.now();

        let mut tx = self.state.db.begin().await?;
        if catalog::fetch_user(&mut tx, request.user_id).await?.is_none() {
            return Err(EngineError::not_found("User", request.user_id));
        }
        let is_default = request.is_default || address::count_for_user(&mut tx, request.user_id).await? == 0;
        if is_default {
            address::clear_default(&mut tx, request.user_id).await?;
        }
        let id = address::insert(
            &mut tx,
            request.user_id,
            &text,
            point,
            request.store_type.as_deref(),
            is_default,
            now,
        )
        .await?;
        let created = fetch_address(&mut tx, id).await?;
        commit(tx).await?;

        info!(address_id = id, user_id = request.user_id, geocoded = point.is_some(), "Address created");
        Ok(created)
    }

    /// Replaces the text. If the coordinates moved, every live order
    /// delivering there is cascaded.
    pub async fn update_address_text(&self, user_id: i64, address_id: i64, text: &str) -> EngineResult<Address> {
        let text = validate_text("text", text, MAX_TEXT_LEN)?;
        let before = {
            let mut conn = self.state.db.acquire().await?;
            owned_address(&mut conn, user_id, address_id).await?
        };
        let point = self.locate(&text).await?;

        let (updated, live) = {
            let mut conn = self.state.db.acquire().await?;
            address::update_text(&mut conn, address_id, &text, point, self.state.now()).await?;
            let updated = fetch_address(&mut conn, address_id).await?;
            let live = if before.point() != point {
                order_repo::live_at_address(&mut conn, address_id).await?
            } else {
                Vec::new()
            };
            (updated, live)
        };

        let payout = RiderPayoutService::new(Arc::clone(&self.state));
        for order_id in live {
            if let Err(e) = payout.cascade(order_id).await {
                warn!(order_id, address_id, error = %e, "Cascade after address change failed");
                continue;
            }
            // Orders near the old position may have lost their only neighbour.
            if let Some(former) = before.point() {
                if let Err(e) = payout.refresh_around(former, order_id).await {
                    warn!(order_id, address_id, error = %e, "Refresh around former position failed");
                }
            }
        }
        Ok(updated)
    }

    pub async fn set_default(&self, user_id: i64, address_id: i64) -> EngineResult<Address> {
        let mut tx = self.state.db.begin().await?;
        owned_address(&mut tx, user_id, address_id).await?;
        address::clear_default(&mut tx, user_id).await?;
        address::mark_default(&mut tx, address_id, self.state.now()).await?;
        let updated = fetch_address(&mut tx, address_id).await?;
        commit(tx).await?;
        Ok(updated)
    }

    /// Default first.
    pub async fn list_addresses(&self, user_id: i64) -> EngineResult<Vec<Address>> {
        let mut conn = self.state.db.acquire().await?;
        Ok(address::list_for_user(&mut conn, user_id).await?)
    }

    async fn locate(&self, text: &str) -> EngineResult<Option<GeoPoint>> {
        let settings = {
            let mut conn = self.state.db.acquire().await?;
            self.state.settings(&mut conn).await?
        };
        Ok(self.state.geocode(&settings, text).await)
    }
}

/// Another user's address reads as missing.
async fn owned_address(conn: &mut sqlx::SqliteConnection, user_id: i64, address_id: i64) -> EngineResult<Address> {
    address::fetch(conn, address_id)
        .await?
        .filter(|a| a.user_id == user_id)
        .ok_or_else(|| EngineError::not_found("Address", address_id))
}

async fn fetch_address(conn: &mut sqlx::SqliteConnection, address_id: i64) -> EngineResult<Address> {
    address::fetch(conn, address_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Address", address_id))
}
