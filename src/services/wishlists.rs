use crate::{
    entities::{wishlist_item, Product, WishlistItem},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Wishlist service. Toggling is an explicit lookup followed by a branch:
/// remove the entry if present, add it otherwise.
#[derive(Clone)]
pub struct WishlistService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Outcome of a toggle
#[derive(Debug, Serialize)]
pub struct WishlistToggle {
    pub product_id: Uuid,
    pub added: bool,
}

/// Wishlist entry resolved against the catalog
#[derive(Debug, Serialize)]
pub struct WishlistLine {
    pub product_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
}

impl WishlistService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Toggle a product on the account's wishlist.
    #[instrument(skip(self))]
    pub async fn toggle(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
    ) -> Result<WishlistToggle, ServiceError> {
        let existing = WishlistItem::find()
            .filter(wishlist_item::Column::CustomerId.eq(customer_id))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;

        if let Some(entry) = existing {
            WishlistItem::delete_by_id(entry.id).exec(&*self.db).await?;

            self.event_sender
                .send_or_log(Event::WishlistItemRemoved {
                    customer_id,
                    product_id,
                })
                .await;

            info!("Removed product {} from wishlist", product_id);
            return Ok(WishlistToggle {
                product_id,
                added: false,
            });
        }

        // Only existing products can be wished for
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let entry = wishlist_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            product_id: Set(product_id),
            created_at: Set(Utc::now()),
        };
        entry.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::WishlistItemAdded {
                customer_id,
                product_id,
            })
            .await;

        info!("Added product {} to wishlist", product_id);
        Ok(WishlistToggle {
            product_id,
            added: true,
        })
    }

    /// List the account's wishlist, newest first. Entries whose product has
    /// been deleted are omitted.
    #[instrument(skip(self))]
    pub async fn list(&self, customer_id: Uuid) -> Result<Vec<WishlistLine>, ServiceError> {
        let entries = WishlistItem::find()
            .filter(wishlist_item::Column::CustomerId.eq(customer_id))
            .order_by_desc(wishlist_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(product) = Product::find_by_id(entry.product_id).one(&*self.db).await? {
                lines.push(WishlistLine {
                    product_id: product.id,
                    name: product.name,
                    price: product.price,
                    image: product.image,
                });
            }
        }

        Ok(lines)
    }
}
