//! Persistence Port: durable payment records and their status history.

pub mod memory;
pub mod postgres;

use crate::entities::{NewPayment, Payment, RefundRecord, StatusRecord};
use crate::status::{PaymentStatus, can_advance};
use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("order id {0} is already taken")]
    DuplicateOrderId(String),

    #[error("payment {0} not found")]
    NotFound(String),

    /// The compare-and-swap found a different current status.
    #[error("payment {payment_id} is {actual}, expected {expected}")]
    StatusConflict {
        payment_id: String,
        expected: PaymentStatus,
        actual: PaymentStatus,
    },

    #[error("illegal status transition {from} -> {to} for payment {payment_id}")]
    IllegalTransition {
        payment_id: String,
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("stored record is invalid: {0}")]
    InvalidRecord(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether the same call may succeed when retried.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(err) => crate::framework::is_transient(err),
            _ => false,
        }
    }
}

/// A compare-and-swap on the current status of one payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub expected: PaymentStatus,
    pub next: PaymentStatus,
}

impl StatusChange {
    pub fn new(expected: PaymentStatus, next: PaymentStatus) -> Self {
        Self { expected, next }
    }
}

/// Whether a swap rejected because the payment is `actual` can be repeated
/// from `actual` towards `next`.
pub fn rebase_target(actual: PaymentStatus, next: PaymentStatus) -> bool {
    actual != next && can_advance(actual, next)
}

/// Refund bookkeeping written together with the `REFUNDED` status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRefund {
    pub expected: PaymentStatus,
    pub reason: String,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persist a payment and its initial `CREATED` history entry atomically.
    ///
    /// Fails with [`StoreError::DuplicateOrderId`] when the order id was ever
    /// used before.
    async fn create(&self, payment: NewPayment) -> Result<Payment, StoreError>;

    /// Whether `order_id` has never been used. Advisory only: `create` is the
    /// enforcement point.
    async fn is_unique(&self, order_id: &str) -> Result<bool, StoreError>;

    async fn get_by_order_id(&self, order_id: &str) -> Result<Payment, StoreError>;

    async fn get_by_payment_id(&self, payment_id: &str) -> Result<Payment, StoreError>;

    /// Most recent history entry.
    async fn get_status(&self, payment_id: &str) -> Result<StatusRecord, StoreError>;

    /// Move the payment from `change.expected` to `change.next` and append the
    /// history entry.
    ///
    /// Rejected with [`StoreError::StatusConflict`] when the stored status is
    /// not `change.expected`, and with [`StoreError::IllegalTransition`] when
    /// `change.next` is not reachable from it.
    async fn mark_status(
        &self,
        payment_id: &str,
        change: StatusChange,
    ) -> Result<StatusRecord, StoreError>;

    /// [`Self::mark_status`] that follows concurrent writers.
    ///
    /// When another writer already moved the payment to a status from which
    /// `change.next` is still reachable, the swap is repeated from that
    /// status. Every repeat starts further along the state table, so the
    /// loop ends.
    async fn advance_status(
        &self,
        payment_id: &str,
        change: StatusChange,
    ) -> Result<StatusRecord, StoreError> {
        let mut change = change;
        loop {
            match self.mark_status(payment_id, change).await {
                Err(StoreError::StatusConflict { actual, .. })
                    if rebase_target(actual, change.next) =>
                {
                    change.expected = actual;
                }
                result => return result,
            }
        }
    }

    /// Compare-and-swap to `REFUNDED` plus a refund row for the stored
    /// amount, atomically.
    async fn record_refund(
        &self,
        payment_id: &str,
        refund: NewRefund,
    ) -> Result<StatusRecord, StoreError>;

    async fn refunds(&self, payment_id: &str) -> Result<Vec<RefundRecord>, StoreError>;

    /// A page of the user's payments, newest first.
    async fn user_payments_list(
        &self,
        user_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Payment>, StoreError>;

    /// Payments created before `created_before` whose status can still
    /// change. `DEPOSITED` payments are included only while their last status
    /// change is newer than `deposited_after`. Open payments come first, then
    /// oldest first.
    async fn list_unsettled(
        &self,
        created_before: time::OffsetDateTime,
        deposited_after: time::OffsetDateTime,
        limit: u64,
    ) -> Result<Vec<Payment>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
