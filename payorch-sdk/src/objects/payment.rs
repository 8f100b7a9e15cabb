//! Enumerations that appear in payment requests and responses.

use serde::{Deserialize, Serialize};

/// Payment status for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `payorch-core::status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Created,
    Authorized,
    Approved,
    Deposited,
    Declined,
    Reversed,
    Refunded,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Created => write!(f, "CREATED"),
            PaymentStatus::Authorized => write!(f, "AUTHORIZED"),
            PaymentStatus::Approved => write!(f, "APPROVED"),
            PaymentStatus::Deposited => write!(f, "DEPOSITED"),
            PaymentStatus::Declined => write!(f, "DECLINED"),
            PaymentStatus::Reversed => write!(f, "REVERSED"),
            PaymentStatus::Refunded => write!(f, "REFUNDED"),
        }
    }
}

/// How the buyer pays for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentOperation {
    /// The buyer is redirected to the gateway's payment form.
    #[serde(rename = "URL_payment")]
    Redirect,
    /// The buyer pays with a card previously stored at the gateway.
    #[serde(rename = "COF_payment")]
    CardOnFile,
}

impl PaymentOperation {
    pub const fn as_str(&self) -> &'static str {
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

/// ISO 4217 alpha code of a supported currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurrencyCode {
    KZT,
    USD,
    RUB,
    EUR,
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CurrencyCode::KZT => write!(f, "KZT"),
            CurrencyCode::USD => write!(f, "USD"),
            CurrencyCode::RUB => write!(f, "RUB"),
            CurrencyCode::EUR => write!(f, "EUR"),
        }
    }
}
