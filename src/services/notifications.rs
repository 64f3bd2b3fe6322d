use async_trait::async_trait;
use tracing::info;

use crate::entities::CheckoutModel;

/// Outbound notification seam. Delivery is best-effort and must never block
/// or fail a business operation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn checkout_completed(&self, checkout: &CheckoutModel);
}

/// Default notifier that records notifications in the log stream. A real
/// deployment wires an email provider behind the same trait.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn checkout_completed(&self, checkout: &CheckoutModel) {
        info!(
            checkout_id = %checkout.id,
            reference = %checkout.reference,
            total = %checkout.total,
            "order confirmation notification"
        );
    }
}
