use crate::{
    entities::{cart, cart_item, Cart, CartItem, CartModel, Product},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Shopping cart service. Each account owns at most one cart, created lazily
/// on the first add. The cart total is a cache: it is recomputed from current
/// catalog prices on every mutation, so it can go stale between a catalog
/// price change and the next mutation.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Input for adding an item to the cart
#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Cart line resolved against the live catalog
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub image: Option<String>,
}

/// A cart with its resolved lines. `cart` is `None` when the account has
/// never added anything. `total` is the stored cart total (the authoritative
/// figure) while lines carry current catalog prices; the two reconcile on
/// every mutation.
#[derive(Debug, Serialize)]
pub struct CartDetail {
    pub cart: Option<CartModel>,
    pub items: Vec<CartLine>,
    pub total: Decimal,
}

impl CartDetail {
    fn empty() -> Self {
        Self {
            cart: None,
            items: Vec::new(),
            total: Decimal::ZERO,
        }
    }
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Retrieve the account's cart with lines resolved against the catalog.
    /// Never creates a cart.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, customer_id: Uuid) -> Result<CartDetail, ServiceError> {
        let Some(cart) = self.find_cart(customer_id).await? else {
            return Ok(CartDetail::empty());
        };

        let (items, _) = resolve_lines(&*self.db, cart.id).await?;
        let total = cart.total;
        Ok(CartDetail {
            cart: Some(cart),
            items,
            total,
        })
    }

    /// Add a product to the cart, incrementing quantity if already present.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        customer_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartDetail, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        // The product must exist at add time
        Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        let cart = self.get_or_create_cart(&txn, customer_id).await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .one(&txn)
            .await?;

        if let Some(item) = existing {
            let quantity = item.quantity + input.quantity;
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
        } else {
            let now = Utc::now();
            let item = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(input.product_id),
                quantity: Set(input.quantity),
                created_at: Set(now),
                updated_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        let cart = recompute_totals(&txn, cart.id).await?;
        let (items, _) = resolve_lines(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.id,
                product_id: input.product_id,
            })
            .await;

        info!(
            "Added product {} x{} to cart {}",
            input.product_id, input.quantity, cart.id
        );

        let total = cart.total;
        Ok(CartDetail {
            cart: Some(cart),
            items,
            total,
        })
    }

    /// Set the quantity of a cart line. Zero removes the line.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartDetail, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must not be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let cart = self
            .find_cart_on(&txn, customer_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        let item = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
            })?;

        let removed = quantity == 0;
        if removed {
            CartItem::delete_by_id(item.id).exec(&txn).await?;
        } else {
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
        }

        let cart = recompute_totals(&txn, cart.id).await?;
        let (items, _) = resolve_lines(&txn, cart.id).await?;
        txn.commit().await?;

        let event = if removed {
            Event::CartItemRemoved {
                cart_id: cart.id,
                product_id,
            }
        } else {
            Event::CartItemUpdated {
                cart_id: cart.id,
                product_id,
            }
        };
        self.event_sender.send_or_log(event).await;

        let total = cart.total;
        Ok(CartDetail {
            cart: Some(cart),
            items,
            total,
        })
    }

    /// Remove a line from the cart.
    pub async fn remove_item(
        &self,
        customer_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartDetail, ServiceError> {
        self.update_item(customer_id, product_id, 0).await
    }

    /// Empty the account's cart. Absent cart is a no-op.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, customer_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let Some(cart) = self.find_cart_on(&txn, customer_id).await? else {
            return Ok(());
        };

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;

        let cart_id = cart.id;
        let mut active: cart::ActiveModel = cart.into();
        active.total = Set(Decimal::ZERO);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart_id))
            .await;

        info!("Cleared cart: {}", cart_id);
        Ok(())
    }

    async fn find_cart(&self, customer_id: Uuid) -> Result<Option<CartModel>, ServiceError> {
        self.find_cart_on(&*self.db, customer_id).await
    }

    async fn find_cart_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
    ) -> Result<Option<CartModel>, ServiceError> {
        Ok(Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?)
    }

    async fn get_or_create_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        if let Some(cart) = self.find_cart_on(conn, customer_id).await? {
            return Ok(cart);
        }

        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            total: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let cart = cart.insert(conn).await?;

        self.event_sender
            .send_or_log(Event::CartCreated(cart.id))
            .await;

        Ok(cart)
    }
}

/// Resolve cart lines against the live catalog. Lines whose product has been
/// deleted are skipped here; checkout initialization rejects them instead.
pub(crate) async fn resolve_lines<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> Result<(Vec<CartLine>, Decimal), ServiceError> {
    let items = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .all(conn)
        .await?;

    let mut lines = Vec::with_capacity(items.len());
    let mut total = Decimal::ZERO;

    for item in items {
        if let Some(product) = Product::find_by_id(item.product_id).one(conn).await? {
            let line_total = product.price * Decimal::from(item.quantity);
            total += line_total;
            lines.push(CartLine {
                product_id: product.id,
                name: product.name,
                unit_price: product.price,
                quantity: item.quantity,
                line_total,
                image: product.image,
            });
        }
    }

    Ok((lines, total))
}

/// Recompute and persist the cached cart total from current catalog prices.
pub(crate) async fn recompute_totals<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> Result<CartModel, ServiceError> {
    let (_, total) = resolve_lines(conn, cart_id).await?;

    let mut cart: cart::ActiveModel = Cart::find_by_id(cart_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?
        .into();

    cart.total = Set(total);
    cart.updated_at = Set(Utc::now());

    Ok(cart.update(conn).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn line_total_is_price_times_quantity() {
        let unit_price = dec!(25.50);
        let line_total = unit_price * Decimal::from(3);
        assert_eq!(line_total, dec!(76.50));
    }

    #[test]
    fn add_item_input_deserializes() {
        let json = r#"{
            "product_id": "550e8400-e29b-41d4-a716-446655440000",
            "quantity": 2
        }"#;

        let input: AddItemInput = serde_json::from_str(json).expect("deserialize");
        assert_eq!(input.quantity, 2);
    }

    #[test]
    fn empty_detail_has_zero_total() {
        let detail = CartDetail::empty();
        assert!(detail.cart.is_none());
        assert!(detail.items.is_empty());
        assert_eq!(detail.total, Decimal::ZERO);
    }
}
