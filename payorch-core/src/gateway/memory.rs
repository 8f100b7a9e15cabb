//! In-process gateway used by tests and local runs.
//!
//! Orders live in a map behind a `tokio::sync::Mutex`. Every call is counted
//! per [`GatewayOperation`], and failures can be planned per operation.

use super::{
    GatewayError, GatewayOperation, OrderDetails, OrderRequest, PaymentGateway, RegisteredOrder,
};
use crate::currency::Money;
use crate::status::{PaymentStatus, can_advance};
use crate::utils::FailurePlan;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOrder {
    pub order_id: String,
    pub user_id: String,
    pub money: Money,
    pub status: PaymentStatus,
    pub two_stage: bool,
    pub created_at: time::OffsetDateTime,
}

#[derive(Debug, Default)]
struct GatewayState {
    orders: HashMap<String, RemoteOrder>,
    calls: HashMap<GatewayOperation, u32>,
    failures: HashMap<GatewayOperation, (FailurePlan, GatewayError)>,
    deposits: Vec<(String, Money)>,
    reversals: Vec<(String, Money)>,
    refunds: Vec<(String, Money)>,
    cancellations: Vec<String>,
    latency: Option<Duration>,
}

impl GatewayState {
    /// Counts the call and replays a planned failure, if any.
    fn enter(&mut self, operation: GatewayOperation) -> Result<(), GatewayError> {
        *self.calls.entry(operation).or_default() += 1;
        if let Some((plan, error)) = self.failures.get_mut(&operation) {
            if plan.trip() {
                return Err(error.clone());
            }
        }
        Ok(())
    }

    fn order_mut(&mut self, payment_id: &str) -> Result<&mut RemoteOrder, GatewayError> {
        self.orders
            .get_mut(payment_id)
            .ok_or(GatewayError::NoSuchOrder)
    }
}

pub struct InMemoryGateway {
    name: String,
    state: Mutex<GatewayState>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new("MEMORY")
    }
}

impl InMemoryGateway {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(GatewayState::default()),
        }
    }

    /// Make `operation` fail according to `plan` with `error`.
    pub async fn fail(&self, operation: GatewayOperation, plan: FailurePlan, error: GatewayError) {
        self.state
            .lock()
            .await
            .failures
            .insert(operation, (plan, error));
    }

    /// Delay every call, to exercise deadlines and cancellation.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = Some(latency);
    }

    /// Pretend the buyer (or the bank) moved the order on the gateway side.
    pub async fn set_remote_status(&self, payment_id: &str, status: PaymentStatus) {
        if let Some(order) = self.state.lock().await.orders.get_mut(payment_id) {
            order.status = status;
        }
    }

    pub async fn set_remote_money(&self, payment_id: &str, money: Money) {
        if let Some(order) = self.state.lock().await.orders.get_mut(payment_id) {
            order.money = money;
        }
    }

    /// Register an order directly, bypassing the failure plan and counters.
    pub async fn insert_order(&self, payment_id: impl Into<String>, order: RemoteOrder) {
        self.state
            .lock()
            .await
            .orders
            .insert(payment_id.into(), order);
    }

    pub async fn order(&self, payment_id: &str) -> Option<RemoteOrder> {
        self.state.lock().await.orders.get(payment_id).cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Number of times `operation` was invoked, failed calls included.
    pub async fn calls(&self, operation: GatewayOperation) -> u32 {
        self.state
            .lock()
            .await
            .calls
            .get(&operation)
            .copied()
            .unwrap_or_default()
    }

    /// Total number of calls across all operations.
    pub async fn total_calls(&self) -> u32 {
        self.state.lock().await.calls.values().sum()
    }

    pub async fn deposits(&self) -> Vec<(String, Money)> {
        self.state.lock().await.deposits.clone()
    }

    pub async fn reversals(&self) -> Vec<(String, Money)> {
        self.state.lock().await.reversals.clone()
    }

    pub async fn refunds(&self) -> Vec<(String, Money)> {
        self.state.lock().await.refunds.clone()
    }

    pub async fn cancellations(&self) -> Vec<String> {
        self.state.lock().await.cancellations.clone()
    }

    async fn simulate_latency(&self) {
        let latency = self.state.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn register(
        &self,
        operation: GatewayOperation,
        request: &OrderRequest,
    ) -> Result<RegisteredOrder, GatewayError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.enter(operation)?;

        if state.orders.values().any(|o| o.order_id == request.order_id) {
            return Err(GatewayError::Rejected {
                code: "1".into(),
                message: format!("order {} is already registered", request.order_id),
            });
        }

        let payment_id = uuid::Uuid::new_v4().to_string();
        let redirect_url = Url::parse(&format!("https://gateway.test/payment/{payment_id}"))
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        state.orders.insert(
            payment_id.clone(),
            RemoteOrder {
                order_id: request.order_id.clone(),
                user_id: request.user_id.clone(),
                money: request.money,
                status: PaymentStatus::Created,
                two_stage: operation == GatewayOperation::CreateAuthOrder,
                created_at: time::OffsetDateTime::now_utc(),
            },
        );

        Ok(RegisteredOrder {
            payment_id,
            redirect_url,
        })
    }

    async fn settle(
        &self,
        operation: GatewayOperation,
        payment_id: &str,
        money: Money,
        target: PaymentStatus,
    ) -> Result<(), GatewayError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.enter(operation)?;

        let order = state.order_mut(payment_id)?;
        let allowed = match target {
            PaymentStatus::Refunded => order.status == PaymentStatus::Deposited,
            _ => can_advance(order.status, target),
        };
        if !allowed {
            return Err(impossible(order.status));
        }
        if money.currency != order.money.currency || money.amount > order.money.amount {
            return Err(GatewayError::Rejected {
                code: "5".into(),
                message: format!("invalid amount {money}"),
            });
        }
        order.status = target;

        let entry = (payment_id.to_string(), money);
        match operation {
            GatewayOperation::DepositOrder => state.deposits.push(entry),
            GatewayOperation::ReversalOrder => state.reversals.push(entry),
            _ => state.refunds.push(entry),
        }
        Ok(())
    }
}

fn impossible(status: PaymentStatus) -> GatewayError {
    GatewayError::Rejected {
        code: "7".into(),
        message: format!("operation impossible for order in state {status}"),
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<RegisteredOrder, GatewayError> {
        self.register(GatewayOperation::CreateOrder, request).await
    }

    async fn create_auth_order(
        &self,
        request: &OrderRequest,
    ) -> Result<RegisteredOrder, GatewayError> {
        self.register(GatewayOperation::CreateAuthOrder, request)
            .await
    }

    async fn get_order_status(&self, payment_id: &str) -> Result<PaymentStatus, GatewayError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.enter(GatewayOperation::GetOrderStatus)?;
        Ok(state.order_mut(payment_id)?.status)
    }

    async fn get_order_details(&self, payment_id: &str) -> Result<OrderDetails, GatewayError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.enter(GatewayOperation::GetOrderDetails)?;
        let order = state.order_mut(payment_id)?;
        Ok(OrderDetails {
            payment_id: payment_id.to_string(),
            order_id: Some(order.order_id.clone()),
            status: order.status,
            money: Some(order.money),
            user_id: Some(order.user_id.clone()),
            created_at: Some(order.created_at),
        })
    }

    async fn deposit_order(&self, payment_id: &str, money: Money) -> Result<(), GatewayError> {
        self.settle(
            GatewayOperation::DepositOrder,
            payment_id,
            money,
            PaymentStatus::Deposited,
        )
        .await
    }

    async fn reversal_order(&self, payment_id: &str, money: Money) -> Result<(), GatewayError> {
        self.settle(
            GatewayOperation::ReversalOrder,
            payment_id,
            money,
            PaymentStatus::Reversed,
        )
        .await
    }

    async fn refund_order(&self, payment_id: &str, money: Money) -> Result<(), GatewayError> {
        self.settle(
            GatewayOperation::RefundOrder,
            payment_id,
            money,
            PaymentStatus::Refunded,
        )
        .await
    }

    async fn cancel_order(&self, payment_id: &str) -> Result<(), GatewayError> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        state.enter(GatewayOperation::CancelOrder)?;
        let order = state.order_mut(payment_id)?;
        if order.status != PaymentStatus::Created {
            return Err(impossible(order.status));
        }
        order.status = PaymentStatus::Declined;
        state.cancellations.push(payment_id.to_string());
        Ok(())
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        self.state.lock().await.enter(GatewayOperation::Ping)
    }
}
