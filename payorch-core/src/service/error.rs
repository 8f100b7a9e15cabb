use crate::context::Interrupted;
use crate::currency::{AmountError, Currency, CurrencyError};
use crate::entities::UnsupportedOperation;
use crate::gateway::{GatewayError, GatewayOperation};
use crate::status::{PaymentStatus, TransitionError};
use crate::store::StoreError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Coarse classification of [`ServiceError`], stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    GatewayOperationFailed,
    PaymentNotPaid,
    Persistence,
    Inconsistency,
    Interrupted,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::GatewayOperationFailed => "gateway_operation_failed",
            ErrorKind::PaymentNotPaid => "payment_not_paid",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Inconsistency => "inconsistency",
            ErrorKind::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input rejected before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Currency(#[from] CurrencyError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Operation(#[from] UnsupportedOperation),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error("currency {requested} does not match the payment currency {stored}")]
    CurrencyMismatch { requested: Currency, stored: Currency },

    #[error("amount {requested} exceeds the payment amount {stored}")]
    AmountExceedsPayment { requested: Decimal, stored: Decimal },

    #[error("invalid pagination: {0}")]
    Pagination(String),
}

/// The gateway and the store are known to disagree. Needs an operator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "gateway and store disagree on payment {payment_id} (order {order_id}) after {operation}: {detail}"
)]
pub struct Inconsistency {
    pub payment_id: String,
    pub order_id: String,
    pub operation: GatewayOperation,
    /// Last store error, or the compensation failure.
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("gateway {operation} failed: {source}")]
    GatewayOperationFailed {
        operation: GatewayOperation,
        source: GatewayError,
    },

    #[error("payment {payment_id} is not paid, gateway reports {status}")]
    PaymentNotPaid {
        payment_id: String,
        status: PaymentStatus,
    },

    #[error("persistence failed: {0}")]
    Persistence(#[source] StoreError),

    #[error(transparent)]
    Inconsistency(#[from] Inconsistency),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::GatewayOperationFailed { .. } => ErrorKind::GatewayOperationFailed,
            ServiceError::PaymentNotPaid { .. } => ErrorKind::PaymentNotPaid,
            ServiceError::Persistence(_) => ErrorKind::Persistence,
            ServiceError::Inconsistency(_) => ErrorKind::Inconsistency,
            ServiceError::Interrupted(_) => ErrorKind::Interrupted,
        }
    }
}

impl From<TransitionError> for ServiceError {
    fn from(err: TransitionError) -> Self {
        ServiceError::Validation(err.into())
    }
}

/// Store failures outside a post-commit window.
impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateOrderId(order_id) => {
                ServiceError::Conflict(format!("order id {order_id} already exists"))
            }
            StoreError::NotFound(id) => ServiceError::NotFound(format!("payment {id}")),
            err @ StoreError::StatusConflict { .. } => ServiceError::Conflict(err.to_string()),
            StoreError::IllegalTransition { from, to, .. } => {
                ServiceError::Validation(TransitionError { from, to }.into())
            }
            other => ServiceError::Persistence(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_kinds() {
        let cases = [
            (StoreError::DuplicateOrderId("o".into()), ErrorKind::Conflict),
            (StoreError::NotFound("p".into()), ErrorKind::NotFound),
            (
                StoreError::StatusConflict {
                    payment_id: "p".into(),
                    expected: PaymentStatus::Created,
                    actual: PaymentStatus::Deposited,
                },
                ErrorKind::Conflict,
            ),
            (
                StoreError::IllegalTransition {
                    payment_id: "p".into(),
                    from: PaymentStatus::Declined,
                    to: PaymentStatus::Deposited,
                },
                ErrorKind::Validation,
            ),
            (StoreError::Unavailable("down".into()), ErrorKind::Persistence),
            (StoreError::InvalidRecord("bad".into()), ErrorKind::Persistence),
        ];
        for (store_error, kind) in cases {
            assert_eq!(ServiceError::from(store_error).kind(), kind);
        }
    }

    #[test]
    fn inconsistency_names_everything_an_operator_needs() {
        let err = ServiceError::from(Inconsistency {
            payment_id: "pay-1".into(),
            order_id: "order-1".into(),
            operation: GatewayOperation::DepositOrder,
            detail: "store unavailable".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Inconsistency);
        let message = err.to_string();
        assert!(message.contains("pay-1"));
        assert!(message.contains("order-1"));
        assert!(message.contains("deposit_order"));
        assert!(message.contains("store unavailable"));
    }
}
