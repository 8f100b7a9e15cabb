//! Response bodies returned by the payments API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

use super::payment::{CurrencyCode, PaymentOperation, PaymentStatus};

/// A payment as seen by API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResponse {
    /// Identifier assigned by the gateway.
    pub payment_id: String,
    /// Caller-provided order identifier.
    pub order_id: String,
    pub user_id: String,
    /// Name of the gateway that holds the order.
    pub broker: String,
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub operation: PaymentOperation,
    pub status: PaymentStatus,
    /// Unix timestamp of when the payment was created.
    pub created_at: i64,
}

/// Returned by the create and pre-authorize endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePaymentResponse {
    pub payment: PaymentResponse,
    /// Where the buyer should be sent to complete the payment.
    pub redirect_url: Url,
}

/// Current status of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub payment_id: String,
    pub status: PaymentStatus,
    /// Unix timestamp of the status record, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// One page of a user's payments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentsListResponse {
    pub payments: Vec<PaymentResponse>,
    pub page: u32,
    pub page_size: u32,
}

/// Liveness of one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `GET /ready`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub database: DependencyStatus,
    pub gateway: DependencyStatus,
    pub checked_at: i64,
}

/// Error body returned for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind, e.g. `conflict` or `gateway_operation_failed`.
    pub error: String,
    pub message: String,
}
