//! Request bodies accepted by the payments API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

use super::payment::PaymentOperation;

/// Request payload for creating (or pre-authorizing) a payment.
///
/// `currency` and `operation` travel as plain strings so that an unsupported
/// value is reported by the service as a validation error instead of being
/// rejected by the JSON decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: String,
    pub user_id: String,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default = "default_operation")]
    pub operation: String,
    pub return_url: Url,
    pub fail_url: Url,
}

fn default_operation() -> String {
    PaymentOperation::Redirect.as_str().to_string()
}

/// Request payload for capturing or reversing a held payment.
///
/// Leaving `amount` out captures (or releases) the full stored amount.
/// When `amount` is present, `currency` must be present as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl AmountRequest {
    /// Settle the full amount recorded for the payment.
    pub fn full() -> Self {
        Self::default()
    }

    /// Settle an explicit amount.
    pub fn partial(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount: Some(amount),
            currency: Some(currency.into()),
        }
    }
}

/// Request payload for refunding a deposited payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundPaymentRequest {
    #[serde(default)]
    pub reason: String,
}

/// Query string of `GET /users/{user_id}/payments`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPaymentsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for ListPaymentsQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn create_request_defaults_to_redirect() {
        let json = r#"{
            "order_id": "order-1",
            "user_id": "user-1",
            "amount": "100.00",
            "currency": "USD",
            "return_url": "https://shop.example.com/ok",
            "fail_url": "https://shop.example.com/fail"
        }"#;
        let request: CreatePaymentRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.operation, "URL_payment");
        assert_eq!(request.amount, dec!(100.00));
    }

    #[test]
    fn amount_request_omits_missing_fields() {
        assert_eq!(serde_json::to_string(&AmountRequest::full()).unwrap(), "{}");

        let parsed: AmountRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.amount, None);
        assert_eq!(parsed.currency, None);
    }
}
