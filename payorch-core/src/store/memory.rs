//! In-process store used by tests and local runs.
//!
//! Keeps the same guarantees as the Postgres store: order ids are reserved
//! forever, creation and status changes are atomic under one lock, and
//! status writes are compare-and-swap.

use super::{NewRefund, PaymentStore, StatusChange, StoreError};
use crate::entities::{NewPayment, Payment, RefundRecord, StatusRecord};
use crate::status::{PaymentStatus, can_advance};
use crate::utils::FailurePlan;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Store calls, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Create,
    IsUnique,
    GetByOrderId,
    GetByPaymentId,
    GetStatus,
    MarkStatus,
    RecordRefund,
    Refunds,
    UserPaymentsList,
    ListUnsettled,
    Ping,
}

#[derive(Debug)]
struct StoredPayment {
    seq: u64,
    payment: Payment,
    history: Vec<StatusRecord>,
    refunds: Vec<RefundRecord>,
}

impl StoredPayment {
    fn last_change(&self) -> time::OffsetDateTime {
        self.history
            .last()
            .map_or(self.payment.created_at, |record| record.created_at)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    payments: HashMap<String, StoredPayment>,
    order_index: HashMap<String, String>,
    reserved_order_ids: HashSet<String>,
    next_seq: u64,
    calls: HashMap<StoreOperation, u32>,
    failures: HashMap<StoreOperation, FailurePlan>,
    stale_uniqueness: bool,
}

impl StoreState {
    fn enter(&mut self, operation: StoreOperation) -> Result<(), StoreError> {
        *self.calls.entry(operation).or_default() += 1;
        let tripped = self
            .failures
            .get_mut(&operation)
            .is_some_and(|plan| plan.trip());
        if tripped {
            Err(StoreError::Unavailable(format!(
                "injected {operation:?} failure"
            )))
        } else {
            Ok(())
        }
    }

    fn stored(&self, payment_id: &str) -> Result<&StoredPayment, StoreError> {
        self.payments
            .get(payment_id)
            .ok_or_else(|| StoreError::NotFound(payment_id.to_string()))
    }

    /// Compare-and-swap plus history append.
    fn apply(
        &mut self,
        payment_id: &str,
        change: StatusChange,
    ) -> Result<StatusRecord, StoreError> {
        let stored = self
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| StoreError::NotFound(payment_id.to_string()))?;
        let actual = stored.payment.status;
        if actual != change.expected {
            return Err(StoreError::StatusConflict {
                payment_id: payment_id.to_string(),
                expected: change.expected,
                actual,
            });
        }
        if !can_advance(actual, change.next) {
            return Err(StoreError::IllegalTransition {
                payment_id: payment_id.to_string(),
                from: actual,
                to: change.next,
            });
        }
        let record = StatusRecord {
            payment_id: payment_id.to_string(),
            status: change.next,
            created_at: time::OffsetDateTime::now_utc(),
        };
        stored.payment.status = change.next;
        stored.history.push(record.clone());
        Ok(record)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` fail with a transient error according to `plan`.
    pub async fn fail(&self, operation: StoreOperation, plan: FailurePlan) {
        self.state.lock().await.failures.insert(operation, plan);
    }

    /// Make `is_unique` answer `true` regardless of content, as a concurrent
    /// creator racing past the pre-check would observe.
    pub async fn set_stale_uniqueness(&self, stale: bool) {
        self.state.lock().await.stale_uniqueness = stale;
    }

    pub async fn calls(&self, operation: StoreOperation) -> u32 {
        self.state
            .lock()
            .await
            .calls
            .get(&operation)
            .copied()
            .unwrap_or_default()
    }

    pub async fn total_calls(&self) -> u32 {
        self.state.lock().await.calls.values().sum()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.payments.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn history(&self, payment_id: &str) -> Vec<StatusRecord> {
        self.state
            .lock()
            .await
            .payments
            .get(payment_id)
            .map(|stored| stored.history.clone())
            .unwrap_or_default()
    }

    /// Set the status behind the orchestrator's back, as another instance
    /// would.
    pub async fn force_status(&self, payment_id: &str, status: PaymentStatus) {
        if let Some(stored) = self.state.lock().await.payments.get_mut(payment_id) {
            stored.payment.status = status;
            stored.history.push(StatusRecord {
                payment_id: payment_id.to_string(),
                status,
                created_at: time::OffsetDateTime::now_utc(),
            });
        }
    }

    /// Backdate every history entry of a payment.
    pub async fn set_history_time(&self, payment_id: &str, at: time::OffsetDateTime) {
        if let Some(stored) = self.state.lock().await.payments.get_mut(payment_id) {
            for record in &mut stored.history {
                record.created_at = at;
            }
        }
    }

    /// Backdate a payment so that it qualifies for reconciliation.
    pub async fn set_created_at(&self, payment_id: &str, created_at: time::OffsetDateTime) {
        if let Some(stored) = self.state.lock().await.payments.get_mut(payment_id) {
            stored.payment.created_at = created_at;
        }
    }

    /// Drop a payment. Its order id stays reserved.
    pub async fn remove(&self, payment_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(stored) = state.payments.remove(payment_id) {
            state.order_index.remove(&stored.payment.order_id);
        }
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn create(&self, new: NewPayment) -> Result<Payment, StoreError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOperation::Create)?;

        if state.reserved_order_ids.contains(&new.order_id) {
            return Err(StoreError::DuplicateOrderId(new.order_id));
        }
        if state.payments.contains_key(&new.payment_id) {
            return Err(StoreError::InvalidRecord(format!(
                "payment id {} already stored",
                new.payment_id
            )));
        }

        let now = time::OffsetDateTime::now_utc();
        let payment = Payment {
            payment_id: new.payment_id,
            order_id: new.order_id,
            user_id: new.user_id,
            broker: new.broker,
            amount: new.money.amount,
            currency: new.money.currency,
            operation: new.operation,
            status: PaymentStatus::Created,
            created_at: now,
        };
        let seq = state.next_seq;
        state.next_seq += 1;
        state.reserved_order_ids.insert(payment.order_id.clone());
        state
            .order_index
            .insert(payment.order_id.clone(), payment.payment_id.clone());
        state.payments.insert(
            payment.payment_id.clone(),
            StoredPayment {
                seq,
                payment: payment.clone(),
                history: vec![StatusRecord {
                    payment_id: payment.payment_id.clone(),
                    status: PaymentStatus::Created,
                    created_at: now,
                }],
                refunds: Vec::new(),
            },
        );
        Ok(payment)
    }

    async fn is_unique(&self, order_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOperation::IsUnique)?;
        Ok(state.stale_uniqueness || !state.reserved_order_ids.contains(order_id))
    }

    async fn get_by_order_id(&self, order_id: &str) -> Result<Payment, StoreError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOperation::GetByOrderId)?;
        let payment_id = state
            .order_index
            .get(order_id)
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;
        Ok(state.stored(payment_id)?.payment.clone())
    }

    async fn get_by_payment_id(&self, payment_id: &str) -> Result<Payment, StoreError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOperation::GetByPaymentId)?;
        Ok(state.stored(payment_id)?.payment.clone())
    }

    async fn get_status(&self, payment_id: &str) -> Result<StatusRecord, StoreError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOperation::GetStatus)?;
        state
            .stored(payment_id)?
            .history
            .last()
            .cloned()
            .ok_or_else(|| StoreError::InvalidRecord(format!("payment {payment_id} has no history")))
    }

    async fn mark_status(
        &self,
        payment_id: &str,
        change: StatusChange,
    ) -> Result<StatusRecord, StoreError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOperation::MarkStatus)?;
        state.apply(payment_id, change)
    }

    async fn record_refund(
        &self,
        payment_id: &str,
        refund: NewRefund,
    ) -> Result<StatusRecord, StoreError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOperation::RecordRefund)?;
        let record = state.apply(
            payment_id,
            StatusChange::new(refund.expected, PaymentStatus::Refunded),
        )?;
        if let Some(stored) = state.payments.get_mut(payment_id) {
            stored.refunds.push(RefundRecord {
                payment_id: payment_id.to_string(),
                amount: stored.payment.amount,
                currency: stored.payment.currency,
                reason: refund.reason,
                created_at: record.created_at,
            });
        }
        Ok(record)
    }

    async fn refunds(&self, payment_id: &str) -> Result<Vec<RefundRecord>, StoreError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOperation::Refunds)?;
        Ok(state.stored(payment_id)?.refunds.clone())
    }

    async fn user_payments_list(
        &self,
        user_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Payment>, StoreError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOperation::UserPaymentsList)?;
        let mut matching: Vec<&StoredPayment> = state
            .payments
            .values()
            .filter(|stored| stored.payment.user_id == user_id)
            .collect();
        matching.sort_by(|a, b| {
            b.payment
                .created_at
                .cmp(&a.payment.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        Ok(matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|stored| stored.payment.clone())
            .collect())
    }

    async fn list_unsettled(
        &self,
        created_before: time::OffsetDateTime,
        deposited_after: time::OffsetDateTime,
        limit: u64,
    ) -> Result<Vec<Payment>, StoreError> {
        let mut state = self.state.lock().await;
        state.enter(StoreOperation::ListUnsettled)?;
        let mut matching: Vec<&StoredPayment> = state
            .payments
            .values()
            .filter(|stored| {
                let status = stored.payment.status;
                if status.is_final() || stored.payment.created_at >= created_before {
                    return false;
                }
                status != PaymentStatus::Deposited || stored.last_change() > deposited_after
            })
            .collect();
        matching.sort_by(|a, b| {
            let a_deposited = a.payment.status == PaymentStatus::Deposited;
            let b_deposited = b.payment.status == PaymentStatus::Deposited;
            a_deposited
                .cmp(&b_deposited)
                .then(a.payment.created_at.cmp(&b.payment.created_at))
                .then(a.seq.cmp(&b.seq))
        });
        Ok(matching
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|stored| stored.payment.clone())
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.state.lock().await.enter(StoreOperation::Ping)
    }
}
