use async_trait::async_trait;

/// External payment collaborator. Cancelling a paid booking owes the
/// customer a refund; this only records that fact downstream. A
/// failure here never rolls back the cancellation.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn mark_refund_owed(&self, booking_id: &str, amount: f64) -> anyhow::Result<()>;
}

/// Default gateway: log the refund obligation and move on. Real
/// processing is out of scope.
pub struct LogPaymentGateway;

#[async_trait]
impl PaymentGateway for LogPaymentGateway {
    async fn mark_refund_owed(&self, booking_id: &str, amount: f64) -> anyhow::Result<()> {
        tracing::info!(booking_id = %booking_id, amount, "refund owed");
        Ok(())
    }
}
