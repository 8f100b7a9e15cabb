//! Reconciler processor.
//!
//! The Reconciler is responsible for:
//! - Loading a batch of open payments older than `min_age`, plus deposits
//!   changed within `deposit_window` (a refund may still land on them)
//! - Fetching what the gateway knows about each of them
//! - Advancing the local status when the gateway is ahead along a legal path
//! - Logging every other disagreement for operators, without writing
//!
//! It never calls a monetary gateway operation. The sweep is the follow-up
//! for payments whose buyer never came back and for records flagged as
//! inconsistent by the orchestrator.

use crate::entities::Payment;
use crate::gateway::{GatewayError, PaymentGateway};
use crate::status::{PaymentStatus, can_advance};
use crate::store::{PaymentStore, StatusChange, StoreError};
use kanau::processor::Processor;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub interval: Duration,
    pub batch_size: u64,
    /// Younger payments are skipped, their buyer may still be on the payment page.
    pub min_age: Duration,
    /// How long a `DEPOSITED` payment stays in the sweep after its last change.
    pub deposit_window: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 100,
            min_age: Duration::from_secs(15 * 60),
            deposit_window: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub scanned: usize,
    pub advanced: usize,
    pub diverged: usize,
    pub failed: usize,
}

/// Result of reconciling a single payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Unchanged,
    Advanced(PaymentStatus),
    Diverged,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("gateway lookup failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("store write failed: {0}")]
    Store(#[from] StoreError),
}

pub struct Reconciler {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Run sweeps every `interval` until shutdown is signaled.
    ///
    /// A sweep in progress is finished before the shutdown is honored.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "Reconciler started"
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Reconciler received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match self.reconcile_once().await {
                        Ok(summary) if summary.scanned > 0 => {
                            info!(
                                scanned = summary.scanned,
                                advanced = summary.advanced,
                                diverged = summary.diverged,
                                failed = summary.failed,
                                "Reconcile sweep finished"
                            );
                        }
                        Ok(_) => debug!("Reconcile sweep found nothing to do"),
                        Err(e) => warn!(error = %e, "Reconcile sweep could not list payments"),
                    }
                }
            }
        }

        info!("Reconciler shutdown complete");
    }

    /// One sweep over the oldest unsettled payments.
    ///
    /// Fails only when the batch cannot be listed. Per-payment failures are
    /// counted in [`ReconcileSummary::failed`].
    pub async fn reconcile_once(&self) -> Result<ReconcileSummary, StoreError> {
        let now = time::OffsetDateTime::now_utc();
        let batch = self
            .store
            .list_unsettled(
                now - self.config.min_age,
                now - self.config.deposit_window,
                self.config.batch_size,
            )
            .await?;

        let mut summary = ReconcileSummary {
            scanned: batch.len(),
            ..Default::default()
        };
        for payment in batch {
            let payment_id = payment.payment_id.clone();
            match self.process(payment).await {
                Ok(ReconcileOutcome::Unchanged) => {}
                Ok(ReconcileOutcome::Advanced(_)) => summary.advanced += 1,
                Ok(ReconcileOutcome::Diverged) => summary.diverged += 1,
                Err(e) => {
                    warn!(payment_id = %payment_id, error = %e, "Failed to reconcile payment");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    fn diverged(payment: &Payment, detail: &str) -> ReconcileOutcome {
        warn!(
            payment_id = %payment.payment_id,
            order_id = %payment.order_id,
            local = %payment.status,
            detail = %detail,
            divergence = true,
            "Gateway and store disagree"
        );
        ReconcileOutcome::Diverged
    }
}

impl Processor<Payment> for Reconciler {
    type Output = ReconcileOutcome;
    type Error = ReconcileError;

    async fn process(&self, payment: Payment) -> Result<ReconcileOutcome, ReconcileError> {
        let details = match self.gateway.get_order_details(&payment.payment_id).await {
            Ok(details) => details,
            Err(GatewayError::NoSuchOrder) => {
                return Ok(Self::diverged(&payment, "gateway has no such order"));
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(remote_money) = details.money
            && remote_money != payment.money()
        {
            let detail = format!("gateway amount {remote_money}, local {}", payment.money());
            return Ok(Self::diverged(&payment, &detail));
        }

        let remote = details.status;
        if remote == payment.status {
            return Ok(ReconcileOutcome::Unchanged);
        }
        if !can_advance(payment.status, remote) {
            let detail = format!("gateway reports {remote}, not reachable from local status");
            return Ok(Self::diverged(&payment, &detail));
        }

        let change = StatusChange::new(payment.status, remote);
        match self.store.advance_status(&payment.payment_id, change).await {
            Ok(record) => {
                info!(
                    payment_id = %payment.payment_id,
                    from = %payment.status,
                    to = %record.status,
                    "Reconciler advanced payment"
                );
                Ok(ReconcileOutcome::Advanced(record.status))
            }
            Err(StoreError::StatusConflict { actual, .. }) if actual == remote => {
                Ok(ReconcileOutcome::Unchanged)
            }
            Err(e) => Err(e.into()),
        }
    }
}
