//! Payment status state machine.
//!
//! The legal edges live in [`TRANSITIONS`]. Every legality check in the
//! workspace (orchestrator, stores, reconciler) reads that table by value.

use payorch_sdk::objects::PaymentStatus as SdkPaymentStatus;
use std::str::FromStr;
use thiserror::Error;

/// Payment status for database operations and domain logic.
///
/// This is the sqlx::Type version. For API/DTO use, see `payorch_sdk::objects::PaymentStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Order registered at the gateway, nothing paid yet.
    Created,
    /// Buyer authentication finished, funds not yet held.
    Authorized,
    /// Funds are held on the buyer's account.
    Approved,
    /// Funds were captured.
    Deposited,
    /// The gateway or the issuer declined the payment.
    Declined,
    /// The hold was released without capture.
    Reversed,
    /// Captured funds were returned to the buyer.
    Refunded,
}

/// Every legal `(from, to)` edge.
pub const TRANSITIONS: &[(PaymentStatus, PaymentStatus)] = &[
    (PaymentStatus::Created, PaymentStatus::Authorized),
    (PaymentStatus::Authorized, PaymentStatus::Approved),
    (PaymentStatus::Approved, PaymentStatus::Deposited),
    (PaymentStatus::Created, PaymentStatus::Declined),
    (PaymentStatus::Authorized, PaymentStatus::Declined),
    (PaymentStatus::Authorized, PaymentStatus::Reversed),
    (PaymentStatus::Deposited, PaymentStatus::Refunded),
];

/// A status change that the table does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown payment status: {0}")]
pub struct UnknownStatus(pub String);

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 7] = [
        PaymentStatus::Created,
        PaymentStatus::Authorized,
        PaymentStatus::Approved,
        PaymentStatus::Deposited,
        PaymentStatus::Declined,
        PaymentStatus::Reversed,
        PaymentStatus::Refunded,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Created => "CREATED",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Approved => "APPROVED",
            PaymentStatus::Deposited => "DEPOSITED",
            PaymentStatus::Declined => "DECLINED",
            PaymentStatus::Reversed => "REVERSED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    /// Whether the payment has settled. A deposited payment can still be
    /// refunded, every other terminal status is final.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentStatus::Deposited
                | PaymentStatus::Declined
                | PaymentStatus::Reversed
                | PaymentStatus::Refunded
        )
    }

    /// Whether no edge leaves this status.
    pub const fn is_final(self) -> bool {
        matches!(
            self,
            PaymentStatus::Declined | PaymentStatus::Reversed | PaymentStatus::Refunded
        )
    }

    /// Whether the gateway considers the buyer's money secured.
    pub const fn is_paid(self) -> bool {
        matches!(self, PaymentStatus::Approved | PaymentStatus::Deposited)
    }
}

/// Returns true iff `(from, to)` is an edge of [`TRANSITIONS`].
pub fn can_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    TRANSITIONS.contains(&(from, to))
}

/// Returns true iff `to` can be reached from `from` by following one or more
/// edges of [`TRANSITIONS`].
pub fn can_advance(from: PaymentStatus, to: PaymentStatus) -> bool {
    let mut visited = vec![from];
    let mut frontier = vec![from];
    while let Some(state) = frontier.pop() {
        for &(edge_from, edge_to) in TRANSITIONS {
            if edge_from != state {
                continue;
            }
            if edge_to == to {
                return true;
            }
            if !visited.contains(&edge_to) {
                visited.push(edge_to);
                frontier.push(edge_to);
            }
        }
    }
    false
}

pub fn validate_transition(from: PaymentStatus, to: PaymentStatus) -> Result<(), TransitionError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Like [`validate_transition`] but accepts any reachable target.
///
/// Steps performed by the buyer on the gateway (form completion, 3-D Secure,
/// the hold itself) never produce a local write, so the local record may
/// still be a few edges behind when a capture, reversal or reconciliation
/// arrives.
pub fn validate_advance(from: PaymentStatus, to: PaymentStatus) -> Result<(), TransitionError> {
    if can_advance(from, to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl From<PaymentStatus> for SdkPaymentStatus {
    fn from(value: PaymentStatus) -> Self {
        match value {
            PaymentStatus::Created => SdkPaymentStatus::Created,
            PaymentStatus::Authorized => SdkPaymentStatus::Authorized,
            PaymentStatus::Approved => SdkPaymentStatus::Approved,
            PaymentStatus::Deposited => SdkPaymentStatus::Deposited,
            PaymentStatus::Declined => SdkPaymentStatus::Declined,
            PaymentStatus::Reversed => SdkPaymentStatus::Reversed,
            PaymentStatus::Refunded => SdkPaymentStatus::Refunded,
        }
    }
}

impl From<SdkPaymentStatus> for PaymentStatus {
    fn from(value: SdkPaymentStatus) -> Self {
        match value {
            SdkPaymentStatus::Created => PaymentStatus::Created,
            SdkPaymentStatus::Authorized => PaymentStatus::Authorized,
            SdkPaymentStatus::Approved => PaymentStatus::Approved,
            SdkPaymentStatus::Deposited => PaymentStatus::Deposited,
            SdkPaymentStatus::Declined => PaymentStatus::Declined,
            SdkPaymentStatus::Reversed => PaymentStatus::Reversed,
            SdkPaymentStatus::Refunded => PaymentStatus::Refunded,
        }
    }
}
