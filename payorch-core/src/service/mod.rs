//! The orchestrator.
//!
//! `PaymentService` drives every monetary workflow across the Gateway Port
//! and the Persistence Port. Each downstream call is raced against the
//! caller's [`CallContext`]. Once the gateway has accepted a monetary action,
//! the bookkeeping that follows runs under a detached context, is retried on
//! transient store failures, and surfaces an [`Inconsistency`] when it cannot
//! complete.

pub mod error;
pub mod health;
pub mod retry;

#[cfg(test)]
mod tests;

use crate::context::CallContext;
use crate::currency::{Currency, Money};
use crate::entities::{NewPayment, Payment, PaymentOperation, StatusRecord};
use crate::gateway::{GatewayError, GatewayOperation, OrderRequest, PaymentGateway, RegisteredOrder};
use crate::status::{PaymentStatus, validate_advance};
use crate::store::{NewRefund, PaymentStore, StatusChange, StoreError, rebase_target};
use payorch_sdk::objects::{AmountRequest, CreatePaymentRequest};
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

pub use error::{ErrorKind, Inconsistency, ServiceError, ValidationError};
pub use health::{HealthError, HealthMonitor, HealthReport};
pub use retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Retries of the local write after an accepted gateway action.
    pub write_retry: RetryPolicy,
    /// Budget of the detached context used after an accepted gateway action.
    pub post_commit_timeout: Duration,
    pub max_page_size: u32,
    pub health_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            write_retry: RetryPolicy::default(),
            post_commit_timeout: Duration::from_secs(30),
            max_page_size: 100,
            health_timeout: Duration::from_secs(5),
        }
    }
}

/// Input of [`PaymentService::create_payment`] and
/// [`PaymentService::auth_payment`], as received from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePayment {
    pub order_id: String,
    pub user_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub operation: String,
    pub return_url: Url,
    pub fail_url: Url,
}

impl From<CreatePaymentRequest> for CreatePayment {
    fn from(request: CreatePaymentRequest) -> Self {
        Self {
            order_id: request.order_id,
            user_id: request.user_id,
            amount: request.amount,
            currency: request.currency,
            operation: request.operation,
            return_url: request.return_url,
            fail_url: request.fail_url,
        }
    }
}

/// How much of a held payment to capture or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountSpec {
    /// The amount and currency stored with the payment.
    Full,
    /// An explicit amount in the payment's currency, not above the stored
    /// amount.
    Partial(Money),
}

impl AmountSpec {
    fn resolve(self, payment: &Payment) -> Result<Money, ValidationError> {
        match self {
            AmountSpec::Full => Ok(payment.money()),
            AmountSpec::Partial(money) => {
                if money.currency != payment.currency {
                    return Err(ValidationError::CurrencyMismatch {
                        requested: money.currency,
                        stored: payment.currency,
                    });
                }
                if money.amount > payment.amount {
                    return Err(ValidationError::AmountExceedsPayment {
                        requested: money.amount.value(),
                        stored: payment.amount.value(),
                    });
                }
                Ok(money)
            }
        }
    }
}

/// An absent amount means the full amount. An explicit amount needs its
/// currency and must be positive.
impl TryFrom<AmountRequest> for AmountSpec {
    type Error = ValidationError;

    fn try_from(request: AmountRequest) -> Result<Self, Self::Error> {
        match (request.amount, request.currency) {
            (None, None) => Ok(AmountSpec::Full),
            (None, Some(_)) => Err(ValidationError::MissingField("amount")),
            (Some(_), None) => Err(ValidationError::MissingField("currency")),
            (Some(amount), Some(currency)) => {
                let currency: Currency = currency.parse()?;
                Ok(AmountSpec::Partial(Money::new(amount, currency)?))
            }
        }
    }
}

/// A payment registered at the gateway and persisted locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPayment {
    pub payment: Payment,
    pub redirect_url: Url,
}

pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn PaymentStore>,
    health: HealthMonitor,
    config: ServiceConfig,
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn PaymentStore>,
        config: ServiceConfig,
    ) -> Self {
        let health = HealthMonitor::new(store.clone(), gateway.clone(), config.health_timeout);
        Self {
            gateway,
            store,
            health,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.gateway
    }

    pub fn store(&self) -> &Arc<dyn PaymentStore> {
        &self.store
    }

    fn post_commit_context(&self) -> CallContext {
        CallContext::detached(self.config.post_commit_timeout)
    }

    async fn call_gateway<T, F>(
        &self,
        ctx: &CallContext,
        operation: GatewayOperation,
        call: F,
    ) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        ctx.run(call).await?.map_err(|source| {
            warn!(operation = %operation, error = %source, "Gateway call failed");
            ServiceError::GatewayOperationFailed { operation, source }
        })
    }

    async fn call_store<T, F>(&self, ctx: &CallContext, call: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        Ok(ctx.run(call).await??)
    }

    fn inconsistency(
        &self,
        payment_id: &str,
        order_id: &str,
        operation: GatewayOperation,
        detail: String,
    ) -> ServiceError {
        error!(
            payment_id = %payment_id,
            order_id = %order_id,
            operation = %operation,
            detail = %detail,
            inconsistency = true,
            "Gateway and store diverged"
        );
        ServiceError::Inconsistency(Inconsistency {
            payment_id: payment_id.to_string(),
            order_id: order_id.to_string(),
            operation,
            detail,
        })
    }

    /// Validates a creation request without touching either port.
    fn validate_create(input: &CreatePayment) -> Result<OrderRequest, ValidationError> {
        require("order_id", &input.order_id)?;
        require("user_id", &input.user_id)?;
        let currency: Currency = input.currency.parse()?;
        let operation: PaymentOperation = input.operation.parse()?;
        let money = Money::new(input.amount, currency)?;
        Ok(OrderRequest {
            order_id: input.order_id.trim().to_string(),
            user_id: input.user_id.trim().to_string(),
            money,
            operation,
            return_url: input.return_url.clone(),
            fail_url: input.fail_url.clone(),
        })
    }

    /// Register a one-stage payment and persist it as `CREATED`.
    #[tracing::instrument(skip_all, fields(order_id = %input.order_id))]
    pub async fn create_payment(
        &self,
        ctx: &CallContext,
        input: CreatePayment,
    ) -> Result<CreatedPayment, ServiceError> {
        self.register(ctx, input, GatewayOperation::CreateOrder)
            .await
    }

    /// Register a two-stage payment whose funds are held until
    /// [`Self::deposit_payment`] or [`Self::reversal_payment`].
    #[tracing::instrument(skip_all, fields(order_id = %input.order_id))]
    pub async fn auth_payment(
        &self,
        ctx: &CallContext,
        input: CreatePayment,
    ) -> Result<CreatedPayment, ServiceError> {
        self.register(ctx, input, GatewayOperation::CreateAuthOrder)
            .await
    }

    async fn register(
        &self,
        ctx: &CallContext,
        input: CreatePayment,
        operation: GatewayOperation,
    ) -> Result<CreatedPayment, ServiceError> {
        let request = Self::validate_create(&input)?;

        let unique = self
            .call_store(ctx, self.store.is_unique(&request.order_id))
            .await?;
        if !unique {
            return Err(ServiceError::Conflict(format!(
                "order id {} already exists",
                request.order_id
            )));
        }

        let registered = match operation {
            GatewayOperation::CreateAuthOrder => {
                self.call_gateway(ctx, operation, self.gateway.create_auth_order(&request))
                    .await?
            }
            _ => {
                self.call_gateway(ctx, operation, self.gateway.create_order(&request))
                    .await?
            }
        };
        info!(
            order_id = %request.order_id,
            payment_id = %registered.payment_id,
            operation = %operation,
            "Gateway registered order"
        );

        let new_payment = NewPayment {
            payment_id: registered.payment_id.clone(),
            order_id: request.order_id.clone(),
            user_id: request.user_id.clone(),
            broker: self.gateway.name().to_string(),
            money: request.money,
            operation: request.operation,
        };

        // The remote order exists from here on.
        let post_commit = self.post_commit_context();
        let cause = match post_commit.run(self.store.create(new_payment)).await {
            Ok(Ok(payment)) => {
                info!(
                    order_id = %payment.order_id,
                    payment_id = %payment.payment_id,
                    "Payment created"
                );
                return Ok(CreatedPayment {
                    payment,
                    redirect_url: registered.redirect_url,
                });
            }
            Ok(Err(store_error)) => ServiceError::from(store_error),
            Err(interrupted) => ServiceError::Interrupted(interrupted),
        };

        Err(self
            .compensate_registration(&post_commit, &registered, &request.order_id, operation, cause)
            .await)
    }

    /// Best-effort cancel of an order whose persistence failed.
    ///
    /// Returns `cause` when the cancel succeeds, an [`Inconsistency`] otherwise.
    async fn compensate_registration(
        &self,
        ctx: &CallContext,
        registered: &RegisteredOrder,
        order_id: &str,
        operation: GatewayOperation,
        cause: ServiceError,
    ) -> ServiceError {
        warn!(
            order_id = %order_id,
            payment_id = %registered.payment_id,
            error = %cause,
            "Persisting payment failed, cancelling gateway order"
        );
        match ctx.run(self.gateway.cancel_order(&registered.payment_id)).await {
            Ok(Ok(())) => {
                info!(
                    order_id = %order_id,
                    payment_id = %registered.payment_id,
                    "Gateway order cancelled"
                );
                cause
            }
            Ok(Err(cancel_error)) => self.inconsistency(
                &registered.payment_id,
                order_id,
                operation,
                format!("{cause}; cancel_order failed: {cancel_error}"),
            ),
            Err(interrupted) => self.inconsistency(
                &registered.payment_id,
                order_id,
                operation,
                format!("{cause}; cancel_order interrupted: {interrupted}"),
            ),
        }
    }

    async fn load(&self, ctx: &CallContext, payment_id: &str) -> Result<Payment, ServiceError> {
        require("payment_id", payment_id)?;
        self.call_store(ctx, self.store.get_by_payment_id(payment_id))
            .await
    }

    /// Capture held funds and record `DEPOSITED`.
    #[tracing::instrument(skip_all, fields(payment_id = %payment_id))]
    pub async fn deposit_payment(
        &self,
        ctx: &CallContext,
        payment_id: &str,
        amount: AmountSpec,
    ) -> Result<StatusRecord, ServiceError> {
        self.settle(
            ctx,
            payment_id,
            amount,
            GatewayOperation::DepositOrder,
            PaymentStatus::Deposited,
        )
        .await
    }

    /// Release held funds and record `REVERSED`.
    #[tracing::instrument(skip_all, fields(payment_id = %payment_id))]
    pub async fn reversal_payment(
        &self,
        ctx: &CallContext,
        payment_id: &str,
        amount: AmountSpec,
    ) -> Result<StatusRecord, ServiceError> {
        self.settle(
            ctx,
            payment_id,
            amount,
            GatewayOperation::ReversalOrder,
            PaymentStatus::Reversed,
        )
        .await
    }

    async fn settle(
        &self,
        ctx: &CallContext,
        payment_id: &str,
        amount: AmountSpec,
        operation: GatewayOperation,
        target: PaymentStatus,
    ) -> Result<StatusRecord, ServiceError> {
        let payment = self.load(ctx, payment_id).await?;
        let money = amount.resolve(&payment)?;
        validate_advance(payment.status, target)?;

        match operation {
            GatewayOperation::ReversalOrder => {
                self.call_gateway(
                    ctx,
                    operation,
                    self.gateway.reversal_order(&payment.payment_id, money),
                )
                .await?
            }
            _ => {
                self.call_gateway(
                    ctx,
                    operation,
                    self.gateway.deposit_order(&payment.payment_id, money),
                )
                .await?
            }
        }
        info!(
            payment_id = %payment.payment_id,
            operation = %operation,
            amount = %money,
            "Gateway accepted settlement"
        );

        self.commit_after_gateway(&payment, operation, target, |expected| {
            self.store
                .mark_status(&payment.payment_id, StatusChange::new(expected, target))
        })
        .await
    }

    /// Return captured funds and record `REFUNDED` with the reason.
    ///
    /// Nothing is written locally unless the gateway accepted the refund.
    #[tracing::instrument(skip_all, fields(payment_id = %payment_id))]
    pub async fn refund_payment(
        &self,
        ctx: &CallContext,
        payment_id: &str,
        reason: String,
    ) -> Result<StatusRecord, ServiceError> {
        let payment = self.load(ctx, payment_id).await?;
        validate_advance(payment.status, PaymentStatus::Refunded)?;

        self.call_gateway(
            ctx,
            GatewayOperation::RefundOrder,
            self.gateway
                .refund_order(&payment.payment_id, payment.money()),
        )
        .await?;
        info!(
            payment_id = %payment.payment_id,
            amount = %payment.money(),
            "Gateway accepted refund"
        );

        self.commit_after_gateway(
            &payment,
            GatewayOperation::RefundOrder,
            PaymentStatus::Refunded,
            |expected| {
                self.store.record_refund(
                    &payment.payment_id,
                    NewRefund {
                        expected,
                        reason: reason.clone(),
                    },
                )
            },
        )
        .await
    }

    /// Runs the status write that follows an accepted gateway action.
    ///
    /// `write` receives the status the swap expects, starting from the one
    /// loaded before the gateway call. Transient failures are retried per
    /// [`ServiceConfig::write_retry`]. A conflict whose actual status is
    /// already `target` counts as done. A conflict whose actual status still
    /// leads to `target` (another writer advanced the payment meanwhile) is
    /// swapped again from there. Any other conflict, a vanished payment, or
    /// exhausted retries yield an [`Inconsistency`].
    async fn commit_after_gateway<W, Fut>(
        &self,
        payment: &Payment,
        operation: GatewayOperation,
        target: PaymentStatus,
        write: W,
    ) -> Result<StatusRecord, ServiceError>
    where
        W: Fn(PaymentStatus) -> Fut,
        Fut: Future<Output = Result<StatusRecord, StoreError>>,
    {
        let ctx = self.post_commit_context();
        let policy = self.config.write_retry;
        let mut expected = payment.status;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = match ctx.run(write(expected)).await {
                Ok(result) => result,
                Err(interrupted) => {
                    return Err(self.inconsistency(
                        &payment.payment_id,
                        &payment.order_id,
                        operation,
                        format!("{target} write interrupted: {interrupted}"),
                    ));
                }
            };

            let store_error = match result {
                Ok(record) => {
                    info!(
                        payment_id = %payment.payment_id,
                        status = %record.status,
                        attempt,
                        "Payment status updated"
                    );
                    return Ok(record);
                }
                Err(StoreError::StatusConflict { actual, .. }) if actual == target => {
                    info!(
                        payment_id = %payment.payment_id,
                        status = %target,
                        "Payment already reached the target status"
                    );
                    return Ok(self.current_record(&ctx, payment, target).await);
                }
                Err(StoreError::StatusConflict { actual, .. }) if rebase_target(actual, target) => {
                    info!(
                        payment_id = %payment.payment_id,
                        expected = %expected,
                        actual = %actual,
                        status = %target,
                        "Payment advanced concurrently, swapping from its current status"
                    );
                    expected = actual;
                    attempt -= 1;
                    continue;
                }
                Err(e) => e,
            };

            let retryable = store_error.is_transient() && attempt < policy.max_attempts;
            if !retryable {
                return Err(self.inconsistency(
                    &payment.payment_id,
                    &payment.order_id,
                    operation,
                    format!("{target} write failed after {attempt} attempt(s): {store_error}"),
                ));
            }

            let delay = policy.delay(attempt - 1);
            warn!(
                payment_id = %payment.payment_id,
                attempt,
                error = %store_error,
                delay_ms = delay.as_millis() as u64,
                "Status write failed, retrying"
            );
            if let Err(interrupted) = ctx.run(tokio::time::sleep(delay)).await {
                return Err(self.inconsistency(
                    &payment.payment_id,
                    &payment.order_id,
                    operation,
                    format!("{target} write interrupted after {attempt} attempt(s): {interrupted}; last error: {store_error}"),
                ));
            }
        }
    }

    /// Latest history entry when it is `target`, otherwise a record built now.
    async fn current_record(
        &self,
        ctx: &CallContext,
        payment: &Payment,
        target: PaymentStatus,
    ) -> StatusRecord {
        let latest = ctx
            .run(self.store.get_status(&payment.payment_id))
            .await
            .ok()
            .and_then(Result::ok)
            .filter(|record| record.status == target);
        latest.unwrap_or_else(|| StatusRecord {
            payment_id: payment.payment_id.clone(),
            status: target,
            created_at: time::OffsetDateTime::now_utc(),
        })
    }

    /// Pull the authoritative status after the buyer came back from the
    /// gateway, and record it when the payment is paid.
    #[tracing::instrument(skip_all, fields(payment_id = %payment_id))]
    pub async fn success_payment(
        &self,
        ctx: &CallContext,
        payment_id: &str,
    ) -> Result<StatusRecord, ServiceError> {
        let payment = self.load(ctx, payment_id).await?;
        let remote = self
            .call_gateway(
                ctx,
                GatewayOperation::GetOrderStatus,
                self.gateway.get_order_status(&payment.payment_id),
            )
            .await?;

        if !remote.is_paid() {
            info!(
                payment_id = %payment.payment_id,
                remote = %remote,
                "Payment not paid yet"
            );
            return Err(ServiceError::PaymentNotPaid {
                payment_id: payment.payment_id,
                status: remote,
            });
        }

        if payment.status == remote {
            return self
                .call_store(ctx, self.store.get_status(&payment.payment_id))
                .await;
        }

        validate_advance(payment.status, remote)?;
        let change = StatusChange::new(payment.status, remote);
        match ctx
            .run(self.store.advance_status(&payment.payment_id, change))
            .await?
        {
            Ok(record) => {
                info!(
                    payment_id = %payment.payment_id,
                    status = %record.status,
                    "Payment confirmed"
                );
                Ok(record)
            }
            Err(StoreError::StatusConflict { actual, .. }) if actual == remote => {
                Ok(self.current_record(ctx, &payment, remote).await)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_payment(
        &self,
        ctx: &CallContext,
        payment_id: &str,
    ) -> Result<Payment, ServiceError> {
        self.load(ctx, payment_id).await
    }

    pub async fn get_payment_by_order_id(
        &self,
        ctx: &CallContext,
        order_id: &str,
    ) -> Result<Payment, ServiceError> {
        require("order_id", order_id)?;
        self.call_store(ctx, self.store.get_by_order_id(order_id))
            .await
    }

    pub async fn get_payment_status(
        &self,
        ctx: &CallContext,
        payment_id: &str,
    ) -> Result<StatusRecord, ServiceError> {
        require("payment_id", payment_id)?;
        self.call_store(ctx, self.store.get_status(payment_id))
            .await
    }

    /// One page of a user's payments, newest first. `page` is 1-based.
    pub async fn payments_list(
        &self,
        ctx: &CallContext,
        user_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Payment>, ServiceError> {
        require("user_id", user_id)?;
        if page < 1 {
            return Err(ValidationError::Pagination("page starts at 1".into()).into());
        }
        if page_size < 1 || page_size > self.config.max_page_size {
            return Err(ValidationError::Pagination(format!(
                "page_size must be between 1 and {}",
                self.config.max_page_size
            ))
            .into());
        }
        let offset = u64::from(page - 1) * u64::from(page_size);
        self.call_store(
            ctx,
            self.store
                .user_payments_list(user_id, offset, u64::from(page_size)),
        )
        .await
    }

    /// Liveness of both ports. Never fails; inspect the report instead.
    pub async fn health_check(&self) -> HealthReport {
        self.health.check().await
    }
}
