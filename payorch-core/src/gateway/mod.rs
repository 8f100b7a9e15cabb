//! Gateway Port: the remote payment gateway as the orchestrator sees it.

pub mod memory;
pub mod merchant_api;

use crate::currency::Money;
use crate::entities::PaymentOperation;
use crate::status::PaymentStatus;
use async_trait::async_trait;
use thiserror::Error;
use url::Url;

pub use memory::InMemoryGateway;
pub use merchant_api::{MerchantApiConfig, MerchantApiGateway};

/// Gateway calls, as named in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOperation {
    CreateOrder,
    CreateAuthOrder,
    GetOrderStatus,
    GetOrderDetails,
    DepositOrder,
    ReversalOrder,
    RefundOrder,
    CancelOrder,
    Ping,
}

impl GatewayOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            GatewayOperation::CreateOrder => "create_order",
            GatewayOperation::CreateAuthOrder => "create_auth_order",
            GatewayOperation::GetOrderStatus => "get_order_status",
            GatewayOperation::GetOrderDetails => "get_order_details",
            GatewayOperation::DepositOrder => "deposit_order",
            GatewayOperation::ReversalOrder => "reversal_order",
            GatewayOperation::RefundOrder => "refund_order",
            GatewayOperation::CancelOrder => "cancel_order",
            GatewayOperation::Ping => "ping",
        }
    }
}

impl std::fmt::Display for GatewayOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by a gateway implementation.
///
/// `Clone` so that test doubles can replay a configured failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("gateway transport error: {0}")]
    Transport(String),

    #[error("gateway rejected the request (code {code}): {message}")]
    Rejected { code: String, message: String },

    #[error("gateway has no such order")]
    NoSuchOrder,

    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

/// An order to register at the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub order_id: String,
    pub user_id: String,
    pub money: Money,
    pub operation: PaymentOperation,
    pub return_url: Url,
    pub fail_url: Url,
}

/// The gateway's answer to a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredOrder {
    /// Gateway-assigned payment identifier.
    pub payment_id: String,
    /// Payment form the buyer is sent to.
    pub redirect_url: Url,
}

/// What the gateway knows about an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDetails {
    pub payment_id: String,
    pub order_id: Option<String>,
    pub status: PaymentStatus,
    /// Absent when the gateway did not report a usable amount.
    pub money: Option<Money>,
    pub user_id: Option<String>,
    pub created_at: Option<time::OffsetDateTime>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Broker name stored alongside every payment this gateway registers.
    fn name(&self) -> &str;

    /// Register a one-stage order.
    async fn create_order(&self, request: &OrderRequest) -> Result<RegisteredOrder, GatewayError>;

    /// Register a two-stage order whose funds are held until deposit or reversal.
    async fn create_auth_order(
        &self,
        request: &OrderRequest,
    ) -> Result<RegisteredOrder, GatewayError>;

    async fn get_order_status(&self, payment_id: &str) -> Result<PaymentStatus, GatewayError>;

    async fn get_order_details(&self, payment_id: &str) -> Result<OrderDetails, GatewayError>;

    /// Capture held funds.
    async fn deposit_order(&self, payment_id: &str, money: Money) -> Result<(), GatewayError>;

    /// Release held funds.
    async fn reversal_order(&self, payment_id: &str, money: Money) -> Result<(), GatewayError>;

    async fn refund_order(&self, payment_id: &str, money: Money) -> Result<(), GatewayError>;

    /// Void an order nobody has paid yet.
    async fn cancel_order(&self, payment_id: &str) -> Result<(), GatewayError>;

    async fn ping(&self) -> Result<(), GatewayError>;
}
