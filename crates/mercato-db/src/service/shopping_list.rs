//! Shopping list upkeep.
//!
//! Lines are keyed by `(user, product, spec)`; adding again accumulates.
//! The price snapshot is copied from the catalogue whenever a line is added.

use std::sync::Arc;

use tracing::debug;

use mercato_core::validation::validate_quantity;
use mercato_core::ShoppingListItem;

use super::error::{EngineError, EngineResult};
use super::EngineState;
use crate::repository::{catalog, shopping_list};

pub struct ShoppingListService {
    state: Arc<EngineState>,
}

impl ShoppingListService {
    pub(crate) fn new(state: Arc<EngineState>) -> Self {
        ShoppingListService { state }
    }

    /// Adds `quantity` of a product spec, merging into an existing line.
    pub async fn add_item(
        &self,
        user_id: i64,
        product_id: i64,
        spec_name: &str,
        quantity: i64,
        is_special: bool,
    ) -> EngineResult<ShoppingListItem> {
        validate_quantity(quantity)?;
        let now = self.state.now();
        let mut tx = self.state.db.begin().await?;

        if catalog::fetch_user(&mut tx, user_id).await?.is_none() {
            return Err(EngineError::not_found("User", user_id));
        }
        let product = catalog::fetch_product(&mut tx, product_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Product", product_id))?;
        let spec = product
            .spec(spec_name)
            .ok_or_else(|| EngineError::not_found("ProductSpec", spec_name))?;

        let id = match shopping_list::find(&mut tx, user_id, product_id, spec_name).await? {
            Some(existing) => {
                let total = existing.quantity + quantity;
                validate_quantity(total)?;
                shopping_list::update_line(&mut tx, existing.id, total, Some(&spec.prices), now).await?;
                existing.id
            }
            None => {
                shopping_list::insert(
                    &mut tx,
                    user_id,
                    product_id,
                    &product.name,
                    spec_name,
                    &spec.prices,
                    quantity,
                    is_special,
                    product.image.as_deref(),
                    now,
                )
                .await?
            }
        };
        let item = shopping_list::fetch(&mut tx, id)
            .await?
            .ok_or_else(|| EngineError::not_found("ShoppingListItem", id))?;
        crate::pool::commit(tx).await?;

        debug!(user_id, product_id, spec = %spec_name, quantity = item.quantity, "Shopping list line saved");
        Ok(item)
    }

    pub async fn update_quantity(&self, user_id: i64, item_id: i64, quantity: i64) -> EngineResult<ShoppingListItem> {
        validate_quantity(quantity)?;
        let mut conn = self.state.db.acquire().await?;
        let item = owned_item(&mut conn, user_id, item_id).await?;
        shopping_list::update_line(&mut conn, item.id, quantity, None, self.state.now()).await?;
        Ok(ShoppingListItem { quantity, ..item })
    }

    pub async fn remove_item(&self, user_id: i64, item_id: i64) -> EngineResult<()> {
        let mut conn = self.state.db.acquire().await?;
        let item = owned_item(&mut conn, user_id, item_id).await?;
        shopping_list::delete(&mut conn, item.id).await?;
        Ok(())
    }

    pub async fn list_items(&self, user_id: i64) -> EngineResult<Vec<ShoppingListItem>> {
        let mut conn = self.state.db.acquire().await?;
        Ok(shopping_list::list_for_user(&mut conn, user_id).await?)
    }
}

/// Another user's line reads as missing.
async fn owned_item(
    conn: &mut sqlx::SqliteConnection,
    user_id: i64,
    item_id: i64,
) -> EngineResult<ShoppingListItem> {
    shopping_list::fetch(conn, item_id)
        .await?
        .filter(|item| item.user_id == user_id)
        .ok_or_else(|| EngineError::not_found("ShoppingListItem", item_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fixtures::fixture;
    use crate::service::ErrorKind;
    use mercato_core::{Money, MAX_ITEM_QUANTITY};

    #[tokio::test]
    async fn test_add_accumulates_and_snapshots() {
        let f = fixture().await;
        let list = f.engine.shopping_list();

        let first = list.add_item(f.user_id, f.product_id, "10kg", 2, false).await.unwrap();
        let second = list.add_item(f.user_id, f.product_id, "10kg", 3, false).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, 5);
        assert_eq!(second.spec_snapshot.wholesale_price, Money::from_major(50));
        assert_eq!(second.product_name, "Rice");
        assert_eq!(list.list_items(f.user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_quantity_bounds() {
        let f = fixture().await;
        let list = f.engine.shopping_list();

        let err = list.add_item(f.user_id, f.product_id, "10kg", 0, false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let item = list
            .add_item(f.user_id, f.product_id, "10kg", MAX_ITEM_QUANTITY, false)
            .await
            .unwrap();
        let err = list.add_item(f.user_id, f.product_id, "10kg", 1, false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = list.update_quantity(f.user_id, item.id, -1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(list.update_quantity(f.user_id, item.id, 7).await.unwrap().quantity, 7);
    }

    #[tokio::test]
    async fn test_unknown_spec_and_foreign_line() {
        let f = fixture().await;
        let list = f.engine.shopping_list();

        let err = list.add_item(f.user_id, f.product_id, "25kg", 1, false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let item = list.add_item(f.user_id, f.product_id, "10kg", 1, false).await.unwrap();
        let err = list.remove_item(f.user_id + 1, item.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        list.remove_item(f.user_id, item.id).await.unwrap();
        assert!(list.list_items(f.user_id).await.unwrap().is_empty());
    }
}
