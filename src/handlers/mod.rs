pub mod auth;
pub mod carts;
pub mod checkout;
pub mod common;
pub mod payment_webhooks;
pub mod products;
pub mod wishlists;

use crate::{
    config::PaymentConfig,
    db::DbPool,
    events::EventSender,
    gateway::PaymentGateway,
    services::{
        notifications::Notifier, CartService, CheckoutService, ProductService, WishlistService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer encapsulating business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub products: Arc<ProductService>,
    pub carts: Arc<CartService>,
    pub wishlists: Arc<WishlistService>,
    pub checkout: Arc<CheckoutService>,
}

impl AppServices {
    /// Wire the service container. The payment gateway and notifier come in
    /// as trait objects so the composition root (or a test harness) decides
    /// the concrete adapters.
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        payment: &PaymentConfig,
    ) -> Self {
        let products = Arc::new(ProductService::new(db.clone(), event_sender.clone()));
        let carts = Arc::new(CartService::new(db.clone(), event_sender.clone()));
        let wishlists = Arc::new(WishlistService::new(db.clone(), event_sender.clone()));
        let checkout = Arc::new(CheckoutService::new(
            db,
            event_sender,
            gateway,
            notifier,
            payment.callback_url.clone(),
            payment.currency.clone(),
        ));

        Self {
            products,
            carts,
            wishlists,
            checkout,
        }
    }
}
