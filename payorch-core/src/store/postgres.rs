//! Postgres implementation of the Persistence Port.
//!
//! Each method runs one query object from
//! [`crate::entities::payment_records`] through the [`DatabaseProcessor`].

use super::{NewRefund, PaymentStore, StatusChange, StoreError};
use crate::entities::payment_records::{
    GetLatestStatus, GetPaymentByOrderId, GetPaymentByPaymentId, GetRefunds, InsertPayment,
    InsertRefund, ListUnsettledPayments, ListUserPayments, OrderIdExists, PaymentRow,
    PingDatabase, StatusUpdateOutcome, UpdatePaymentStatus,
};
use crate::entities::{NewPayment, Payment, RefundRecord, StatusRecord};
use crate::framework::{DatabaseProcessor, is_unique_violation};
use crate::status::{PaymentStatus, can_advance};
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;

pub struct PostgresStore {
    db: DatabaseProcessor,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor::new(pool),
        }
    }

    async fn load(&self, payment_id: &str) -> Result<Payment, StoreError> {
        let row = self
            .db
            .process(GetPaymentByPaymentId {
                payment_id: payment_id.to_string(),
            })
            .await?
            .ok_or_else(|| StoreError::NotFound(payment_id.to_string()))?;
        into_payment(row)
    }
}

fn into_payment(row: PaymentRow) -> Result<Payment, StoreError> {
    let payment_id = row.payment_id.clone();
    Payment::try_from(row)
        .map_err(|e| StoreError::InvalidRecord(format!("payment {payment_id}: {e}")))
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Turns a rejected compare-and-swap into the matching error.
fn stale(payment_id: &str, expected: PaymentStatus, actual: Option<PaymentStatus>) -> StoreError {
    match actual {
        Some(actual) => StoreError::StatusConflict {
            payment_id: payment_id.to_string(),
            expected,
            actual,
        },
        None => StoreError::NotFound(payment_id.to_string()),
    }
}

fn check_reachable(
    payment_id: &str,
    from: PaymentStatus,
    to: PaymentStatus,
) -> Result<(), StoreError> {
    if can_advance(from, to) {
        Ok(())
    } else {
        Err(StoreError::IllegalTransition {
            payment_id: payment_id.to_string(),
            from,
            to,
        })
    }
}

#[async_trait]
impl PaymentStore for PostgresStore {
    async fn create(&self, payment: NewPayment) -> Result<Payment, StoreError> {
        let order_id = payment.order_id.clone();
        let row = self
            .db
            .process(InsertPayment { payment })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateOrderId(order_id)
                } else {
                    StoreError::Database(e)
                }
            })?;
        into_payment(row)
    }

    async fn is_unique(&self, order_id: &str) -> Result<bool, StoreError> {
        let exists = self
            .db
            .process(OrderIdExists {
                order_id: order_id.to_string(),
            })
            .await?;
        Ok(!exists)
    }

    async fn get_by_order_id(&self, order_id: &str) -> Result<Payment, StoreError> {
        let row = self
            .db
            .process(GetPaymentByOrderId {
                order_id: order_id.to_string(),
            })
            .await?
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;
        into_payment(row)
    }

    async fn get_by_payment_id(&self, payment_id: &str) -> Result<Payment, StoreError> {
        self.load(payment_id).await
    }

    async fn get_status(&self, payment_id: &str) -> Result<StatusRecord, StoreError> {
        let row = self
            .db
            .process(GetLatestStatus {
                payment_id: payment_id.to_string(),
            })
            .await?
            .ok_or_else(|| StoreError::NotFound(payment_id.to_string()))?;
        Ok(row.into())
    }

    async fn mark_status(
        &self,
        payment_id: &str,
        change: StatusChange,
    ) -> Result<StatusRecord, StoreError> {
        check_reachable(payment_id, change.expected, change.next)?;
        let outcome = self
            .db
            .process(UpdatePaymentStatus {
                payment_id: payment_id.to_string(),
                expected: change.expected,
                next: change.next,
            })
            .await?;
        match outcome {
            StatusUpdateOutcome::Applied(record) => Ok(record.into()),
            StatusUpdateOutcome::Stale { actual } => Err(stale(payment_id, change.expected, actual)),
        }
    }

    async fn record_refund(
        &self,
        payment_id: &str,
        refund: NewRefund,
    ) -> Result<StatusRecord, StoreError> {
        check_reachable(payment_id, refund.expected, PaymentStatus::Refunded)?;
        let payment = self.load(payment_id).await?;
        let outcome = self
            .db
            .process(InsertRefund {
                payment_id: payment_id.to_string(),
                expected: refund.expected,
                amount: payment.amount.value(),
                currency: payment.currency,
                reason: refund.reason,
            })
            .await?;
        match outcome {
            StatusUpdateOutcome::Applied(record) => Ok(record.into()),
            StatusUpdateOutcome::Stale { actual } => Err(stale(payment_id, refund.expected, actual)),
        }
    }

    async fn refunds(&self, payment_id: &str) -> Result<Vec<RefundRecord>, StoreError> {
        let rows = self
            .db
            .process(GetRefunds {
                payment_id: payment_id.to_string(),
            })
            .await?;
        rows.into_iter()
            .map(|row| {
                RefundRecord::try_from(row).map_err(|e| StoreError::InvalidRecord(e.to_string()))
            })
            .collect()
    }

    async fn user_payments_list(
        &self,
        user_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Payment>, StoreError> {
        let rows = self
            .db
            .process(ListUserPayments {
                user_id: user_id.to_string(),
                offset: to_i64(offset),
                limit: to_i64(limit),
            })
            .await?;
        rows.into_iter().map(into_payment).collect()
    }

    async fn list_unsettled(
        &self,
        created_before: time::OffsetDateTime,
        deposited_after: time::OffsetDateTime,
        limit: u64,
    ) -> Result<Vec<Payment>, StoreError> {
        let rows = self
            .db
            .process(ListUnsettledPayments {
                created_before,
                deposited_after,
                limit: to_i64(limit),
            })
            .await?;
        rows.into_iter().map(into_payment).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.process(PingDatabase).await?;
        Ok(())
    }
}
