pub mod payment_records;

use crate::currency::{Amount, Currency, Money};
use crate::status::PaymentStatus;
use payorch_sdk::objects::{PaymentOperation as SdkPaymentOperation, PaymentResponse, StatusResponse};
use std::str::FromStr;
use thiserror::Error;

/// How the buyer pays for an order, for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `payorch_sdk::objects::PaymentOperation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "payment_operation")]
pub enum PaymentOperation {
    #[sqlx(rename = "URL_payment")]
    Redirect,
    #[sqlx(rename = "COF_payment")]
    CardOnFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported payment operation: {0}")]
pub struct UnsupportedOperation(pub String);

impl PaymentOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            PaymentOperation::Redirect => "URL_payment",
            PaymentOperation::CardOnFile => "COF_payment",
        }
    }
}

impl std::fmt::Display for PaymentOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentOperation {
    type Err = UnsupportedOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "URL_payment" => Ok(PaymentOperation::Redirect),
            "COF_payment" => Ok(PaymentOperation::CardOnFile),
            other => Err(UnsupportedOperation(other.to_string())),
        }
    }
}

impl From<PaymentOperation> for SdkPaymentOperation {
    fn from(value: PaymentOperation) -> Self {
        match value {
            PaymentOperation::Redirect => SdkPaymentOperation::Redirect,
            PaymentOperation::CardOnFile => SdkPaymentOperation::CardOnFile,
        }
    }
}

impl From<SdkPaymentOperation> for PaymentOperation {
    fn from(value: SdkPaymentOperation) -> Self {
        match value {
            SdkPaymentOperation::Redirect => PaymentOperation::Redirect,
            SdkPaymentOperation::CardOnFile => PaymentOperation::CardOnFile,
        }
    }
}

/// A payment as held by the system of record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub payment_id: String,
    pub order_id: String,
    pub user_id: String,
    pub broker: String,
    pub amount: Amount,
    pub currency: Currency,
    pub operation: PaymentOperation,
    pub status: PaymentStatus,
    pub created_at: time::OffsetDateTime,
}

impl Payment {
    pub fn money(&self) -> Money {
        Money {
            amount: self.amount,
            currency: self.currency,
        }
    }
}

/// Everything needed to persist a payment the gateway has just registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub payment_id: String,
    pub order_id: String,
    pub user_id: String,
    pub broker: String,
    pub money: Money,
    pub operation: PaymentOperation,
}

/// One entry of the append-only status history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub created_at: time::OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRecord {
    pub payment_id: String,
    pub amount: Amount,
    pub currency: Currency,
    pub reason: String,
    pub created_at: time::OffsetDateTime,
}

impl From<&Payment> for PaymentResponse {
    fn from(payment: &Payment) -> Self {
        PaymentResponse {
            payment_id: payment.payment_id.clone(),
            order_id: payment.order_id.clone(),
            user_id: payment.user_id.clone(),
            broker: payment.broker.clone(),
            amount: payment.amount.value(),
            currency: payment.currency.into(),
            operation: payment.operation.into(),
            status: payment.status.into(),
            created_at: payment.created_at.unix_timestamp(),
        }
    }
}

impl From<&StatusRecord> for StatusResponse {
    fn from(record: &StatusRecord) -> Self {
        StatusResponse {
            payment_id: record.payment_id.clone(),
            status: record.status.into(),
            updated_at: Some(record.created_at.unix_timestamp()),
        }
    }
}
