use crate::{
    entities::{
        cart, cart_item, checkout, checkout_item, Cart, CartItem, Checkout, CheckoutItem,
        CheckoutItemModel, CheckoutModel, CheckoutStatus, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{
        parse_paid_at, ChargeStatus, ChargeVerification, CreateIntentRequest, PaymentGateway,
        WebhookEvent, CHARGE_SUCCESS_EVENT,
    },
    services::notifications::Notifier,
};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Checkout service: snapshots a cart into an immutable priced record,
/// opens a payment intent with the gateway, and drives the record through
/// `pending -> completed | failed | cancelled` from verified gateway events.
///
/// The `pending -> completed` transition is an atomic conditional update;
/// the single winner also empties the originating cart, in the same
/// transaction, so the cart is cleared at most once per record no matter how
/// many confirmation signals race in.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    callback_url: String,
    currency: String,
}

/// Input for initializing a checkout
#[derive(Debug, Deserialize)]
pub struct InitiateCheckoutInput {
    pub shipping_address: String,
    pub payment_method: String,
}

/// A checkout record with its snapshot lines
#[derive(Debug, serde::Serialize)]
pub struct CheckoutDetail {
    pub checkout: CheckoutModel,
    pub items: Vec<CheckoutItemModel>,
}

/// Result of a successful initialization: the pending record plus the
/// gateway-issued authorization handle the shopper is redirected to.
#[derive(Debug, serde::Serialize)]
pub struct InitializedCheckout {
    pub checkout: CheckoutModel,
    pub items: Vec<CheckoutItemModel>,
    pub authorization_url: String,
    pub access_code: String,
}

/// Confirmation details recorded when a charge completes
#[derive(Debug, Clone)]
pub struct ConfirmationDetails {
    pub transaction_id: Option<String>,
    pub paid_at: Option<chrono::DateTime<Utc>>,
    pub channel: Option<String>,
    pub currency: Option<String>,
}

impl From<ChargeVerification> for ConfirmationDetails {
    fn from(v: ChargeVerification) -> Self {
        Self {
            transaction_id: v.transaction_id,
            paid_at: v.paid_at,
            channel: v.channel,
            currency: v.currency,
        }
    }
}

struct SnapshotLine {
    product_id: Uuid,
    name: String,
    unit_price: Decimal,
    quantity: i32,
    line_total: Decimal,
    image: Option<String>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        callback_url: String,
        currency: String,
    ) -> Self {
        Self {
            db,
            event_sender,
            gateway,
            notifier,
            callback_url,
            currency,
        }
    }

    /// Initialize a checkout: snapshot the account's cart against the
    /// catalog, open a payment intent, and persist a pending record carrying
    /// the gateway reference. The cart itself is not touched; it is cleared
    /// only on confirmed payment.
    ///
    /// Ordering matters: the gateway call precedes persistence, so a gateway
    /// failure or timeout leaves no orphaned pending record.
    #[instrument(skip(self, input), fields(customer_id = %customer_id))]
    pub async fn initialize(
        &self,
        customer_id: Uuid,
        email: &str,
        input: InitiateCheckoutInput,
    ) -> Result<InitializedCheckout, ServiceError> {
        if input.shipping_address.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Shipping address must not be empty".to_string(),
            ));
        }
        if input.payment_method.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Payment method must not be empty".to_string(),
            ));
        }

        let cart = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::EmptyCart)?;

        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&*self.db)
            .await?;
        if items.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        // Snapshot: current name/price/image, frozen from here on
        let mut lines = Vec::with_capacity(items.len());
        let mut total = Decimal::ZERO;
        for item in &items {
            let product = Product::find_by_id(item.product_id)
                .one(&*self.db)
                .await?
                .ok_or(ServiceError::StaleProduct(item.product_id))?;

            let line_total = product.price * Decimal::from(item.quantity);
            total += line_total;
            lines.push(SnapshotLine {
                product_id: product.id,
                name: product.name,
                unit_price: product.price,
                quantity: item.quantity,
                line_total,
                image: product.image,
            });
        }

        let checkout_id = Uuid::new_v4();
        let intent = self
            .gateway
            .create_intent(CreateIntentRequest {
                amount_minor: to_minor_units(total)?,
                email: email.to_string(),
                currency: self.currency.clone(),
                callback_url: self.callback_url.clone(),
                metadata: serde_json::json!({
                    "checkout_id": checkout_id,
                    "customer_id": customer_id,
                    "cart_id": cart.id,
                }),
            })
            .await?;

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let record = checkout::ActiveModel {
            id: Set(checkout_id),
            customer_id: Set(customer_id),
            cart_id: Set(cart.id),
            status: Set(CheckoutStatus::Pending),
            payment_method: Set(input.payment_method),
            shipping_address: Set(input.shipping_address),
            total: Set(total),
            currency: Set(self.currency.clone()),
            reference: Set(intent.reference.clone()),
            transaction_id: Set(None),
            paid_at: Set(None),
            channel: Set(None),
            paid_currency: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let record = record.insert(&txn).await?;

        let mut snapshot = Vec::with_capacity(lines.len());
        for line in lines {
            let item = checkout_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                checkout_id: Set(checkout_id),
                product_id: Set(line.product_id),
                name: Set(line.name),
                unit_price: Set(line.unit_price),
                quantity: Set(line.quantity),
                line_total: Set(line.line_total),
                image: Set(line.image),
            };
            snapshot.push(item.insert(&txn).await?);
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CheckoutInitialized {
                checkout_id,
                cart_id: cart.id,
                reference: intent.reference.clone(),
            })
            .await;

        info!(
            "Initialized checkout {} for cart {} (total {}, reference {})",
            checkout_id, cart.id, total, intent.reference
        );

        Ok(InitializedCheckout {
            checkout: record,
            items: snapshot,
            authorization_url: intent.authorization_url,
            access_code: intent.access_code,
        })
    }

    /// Poll path: ask the gateway for the authoritative status of a
    /// reference and transition the matching record. Terminal records
    /// short-circuit idempotently without a gateway call.
    #[instrument(skip(self))]
    pub async fn verify(&self, reference: &str) -> Result<CheckoutModel, ServiceError> {
        let record = self
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("No checkout for reference {}", reference))
            })?;

        if record.status.is_terminal() {
            return Ok(record);
        }

        let verification = self.gateway.verify(reference).await?;
        match verification.status {
            ChargeStatus::Success => self.complete(record, verification.into()).await,
            ChargeStatus::Failed => self.fail(record).await,
            // The gateway has not settled yet; leave the record pending
            ChargeStatus::Pending => Ok(record),
        }
    }

    /// Webhook path: apply a signature-verified gateway notification.
    /// The signature check has already happened at the HTTP boundary; by
    /// contract this method is only reached with an authentic payload.
    ///
    /// Always returns `Ok` for deliveries that do not match a record;
    /// acknowledgment is a delivery receipt, not a business result.
    #[instrument(skip(self, event), fields(event_type = %event.event))]
    pub async fn apply_webhook_event(&self, event: WebhookEvent) -> Result<(), ServiceError> {
        if event.event != CHARGE_SUCCESS_EVENT {
            info!("Ignoring webhook event type: {}", event.event);
            return Ok(());
        }

        let Some(record) = self.find_by_reference(&event.data.reference).await? else {
            warn!(
                "Webhook for unknown reference {}; acknowledging",
                event.data.reference
            );
            return Ok(());
        };

        if record.status.is_terminal() {
            info!(
                "Duplicate confirmation for checkout {} in status {}; no-op",
                record.id,
                record.status.as_str()
            );
            return Ok(());
        }

        let details = ConfirmationDetails {
            transaction_id: event.data.id.map(|id| id.to_string()),
            paid_at: event.data.paid_at.as_deref().and_then(parse_paid_at),
            channel: event.data.channel,
            currency: event.data.currency,
        };

        self.complete(record, details).await?;
        Ok(())
    }

    /// Cancel a pending checkout. Only legal while `pending`; a completed,
    /// failed, or already-cancelled record rejects with the current status.
    /// The cart is never touched by cancellation.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        customer_id: Uuid,
        checkout_id: Uuid,
    ) -> Result<CheckoutModel, ServiceError> {
        let record = self.find_owned(customer_id, checkout_id).await?;

        let result = Checkout::update_many()
            .col_expr(
                checkout::Column::Status,
                Expr::value(CheckoutStatus::Cancelled),
            )
            .col_expr(checkout::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(checkout::Column::Id.eq(record.id))
            .filter(checkout::Column::Status.eq(CheckoutStatus::Pending))
            .exec(&*self.db)
            .await?;

        let updated = self.reload(record.id).await?;

        if result.rows_affected == 0 {
            // Lost to a concurrent confirmation, or was never pending
            return Err(ServiceError::InvalidState(format!(
                "cannot cancel checkout in status {}",
                updated.status.as_str()
            )));
        }

        self.event_sender
            .send_or_log(Event::CheckoutCancelled(updated.id))
            .await;

        info!("Cancelled checkout {}", updated.id);
        Ok(updated)
    }

    /// Fetch one of the account's checkout records with its snapshot.
    pub async fn get_checkout(
        &self,
        customer_id: Uuid,
        checkout_id: Uuid,
    ) -> Result<CheckoutDetail, ServiceError> {
        let record = self.find_owned(customer_id, checkout_id).await?;
        let items = CheckoutItem::find()
            .filter(checkout_item::Column::CheckoutId.eq(record.id))
            .all(&*self.db)
            .await?;

        Ok(CheckoutDetail {
            checkout: record,
            items,
        })
    }

    /// List the account's checkout records, newest first.
    pub async fn list_checkouts(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<CheckoutModel>, u64), ServiceError> {
        let paginator = Checkout::find()
            .filter(checkout::Column::CustomerId.eq(customer_id))
            .order_by_desc(checkout::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((data, total))
    }

    /// Apply `pending -> completed` and clear the originating cart.
    ///
    /// The status update is conditional on the record still being pending;
    /// `rows_affected` tells us whether we won. The winner clears the cart
    /// inside the same transaction, so the clear happens at most once per
    /// record. Losers return the re-read record without error.
    async fn complete(
        &self,
        record: CheckoutModel,
        details: ConfirmationDetails,
    ) -> Result<CheckoutModel, ServiceError> {
        let txn = self.db.begin().await?;

        let result = Checkout::update_many()
            .col_expr(
                checkout::Column::Status,
                Expr::value(CheckoutStatus::Completed),
            )
            .col_expr(
                checkout::Column::TransactionId,
                Expr::value(details.transaction_id.clone()),
            )
            .col_expr(checkout::Column::PaidAt, Expr::value(details.paid_at))
            .col_expr(
                checkout::Column::Channel,
                Expr::value(details.channel.clone()),
            )
            .col_expr(
                checkout::Column::PaidCurrency,
                Expr::value(details.currency.clone()),
            )
            .col_expr(checkout::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(checkout::Column::Id.eq(record.id))
            .filter(checkout::Column::Status.eq(CheckoutStatus::Pending))
            .exec(&txn)
            .await?;

        let won = result.rows_affected == 1;
        if won {
            self.clear_origin_cart(&txn, record.cart_id).await?;
        }

        txn.commit().await?;

        let updated = self.reload(record.id).await?;

        if won {
            self.event_sender
                .send_or_log(Event::CheckoutCompleted {
                    checkout_id: updated.id,
                    reference: updated.reference.clone(),
                })
                .await;

            self.notifier.checkout_completed(&updated).await;

            info!(
                "Checkout {} completed (reference {})",
                updated.id, updated.reference
            );
        }

        Ok(updated)
    }

    /// Apply `pending -> failed`. No-op when the record is already terminal.
    async fn fail(&self, record: CheckoutModel) -> Result<CheckoutModel, ServiceError> {
        let result = Checkout::update_many()
            .col_expr(
                checkout::Column::Status,
                Expr::value(CheckoutStatus::Failed),
            )
            .col_expr(checkout::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(checkout::Column::Id.eq(record.id))
            .filter(checkout::Column::Status.eq(CheckoutStatus::Pending))
            .exec(&*self.db)
            .await?;

        let updated = self.reload(record.id).await?;

        if result.rows_affected == 1 {
            self.event_sender
                .send_or_log(Event::CheckoutFailed {
                    checkout_id: updated.id,
                    reference: updated.reference.clone(),
                })
                .await;

            info!(
                "Checkout {} failed (reference {})",
                updated.id, updated.reference
            );
        }

        Ok(updated)
    }

    /// Reconciler: empty the cart a completed checkout was created from.
    /// Touches only that cart; a concurrently deleted cart is a no-op. Any
    /// items the account added to a fresh cart since initialization belong
    /// to a different cart row and survive untouched.
    async fn clear_origin_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(conn)
            .await?;

        if let Some(cart) = Cart::find_by_id(cart_id).one(conn).await? {
            let mut active: cart::ActiveModel = cart.into();
            active.total = Set(Decimal::ZERO);
            active.updated_at = Set(Utc::now());
            active.update(conn).await?;
        }

        info!("Reconciled cart {} after completed checkout", cart_id);
        Ok(())
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<CheckoutModel>, ServiceError> {
        Ok(Checkout::find()
            .filter(checkout::Column::Reference.eq(reference))
            .one(&*self.db)
            .await?)
    }

    async fn find_owned(
        &self,
        customer_id: Uuid,
        checkout_id: Uuid,
    ) -> Result<CheckoutModel, ServiceError> {
        Checkout::find_by_id(checkout_id)
            .filter(checkout::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Checkout {} not found", checkout_id)))
    }

    async fn reload(&self, checkout_id: Uuid) -> Result<CheckoutModel, ServiceError> {
        Checkout::find_by_id(checkout_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Checkout {} not found", checkout_id)))
    }
}

/// Convert a decimal total to the gateway's minor currency unit.
fn to_minor_units(total: Decimal) -> Result<i64, ServiceError> {
    (total * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError("Checkout total out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn minor_units_scale_by_hundred() {
        assert_eq!(to_minor_units(dec!(20.00)).unwrap(), 2000);
        assert_eq!(to_minor_units(dec!(19.99)).unwrap(), 1999);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
        assert_eq!(to_minor_units(Decimal::ZERO).unwrap(), 0);
    }

    #[test]
    fn minor_units_round_fractional_subunits() {
        assert_eq!(to_minor_units(dec!(10.999)).unwrap(), 1100);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!CheckoutStatus::Pending.is_terminal());
        assert!(CheckoutStatus::Completed.is_terminal());
        assert!(CheckoutStatus::Failed.is_terminal());
        assert!(CheckoutStatus::Cancelled.is_terminal());
    }

    #[test]
    fn verification_maps_to_confirmation_details() {
        let details: ConfirmationDetails = ChargeVerification {
            status: ChargeStatus::Success,
            transaction_id: Some("12345".to_string()),
            paid_at: parse_paid_at("2024-05-01T12:30:00Z"),
            channel: Some("card".to_string()),
            currency: Some("NGN".to_string()),
            ip_address: Some("127.0.0.1".to_string()),
        }
        .into();

        assert_eq!(details.transaction_id.as_deref(), Some("12345"));
        assert_eq!(details.channel.as_deref(), Some("card"));
        assert!(details.paid_at.is_some());
    }
}
