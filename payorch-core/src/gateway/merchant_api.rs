//! Gateway implementation for the bank's REST merchant API (the `register.do`
//! family).
//!
//! Every call is a form-encoded POST carrying the merchant credentials. The
//! API answers with JSON whose `errorCode` is `0` (or absent) on success.
//! Amounts travel in minor units and currencies as ISO numeric codes.

use super::{
    GatewayError, GatewayOperation, OrderDetails, OrderRequest, PaymentGateway, RegisteredOrder,
};
use crate::currency::{Currency, Money};
use crate::entities::PaymentOperation;
use crate::status::PaymentStatus;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// `errorCode` the API uses for an unknown order.
const NO_SUCH_ORDER: &str = "6";

#[derive(Debug, Clone)]
pub struct MerchantApiConfig {
    /// Broker name stored with each payment, e.g. `BEREKE`.
    pub name: String,
    /// Root of the REST API, e.g. `https://ecom.bank.kz/payment/rest/`.
    pub base_url: Url,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

pub struct MerchantApiGateway {
    config: MerchantApiConfig,
    http_client: reqwest::Client,
}

impl MerchantApiGateway {
    pub fn new(config: MerchantApiConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn with_http_client(config: MerchantApiConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    fn endpoint(&self, method: &str) -> Result<Url, GatewayError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidResponse("base_url cannot be a base".into()))?
            .pop_if_empty()
            .push(method);
        Ok(url)
    }

    async fn call(
        &self,
        operation: GatewayOperation,
        method: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<MerchantResponse, GatewayError> {
        params.push(("userName", self.config.username.clone()));
        params.push(("password", self.config.password.clone()));

        let url = self.endpoint(method)?;
        debug!(operation = %operation, method, "Calling merchant API");
        let response = self.http_client.post(url).form(&params).send().await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("{method} returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                code: status.as_u16().to_string(),
                message: body,
            });
        }

        let body: MerchantResponse = response.json().await?;
        body.into_result().inspect_err(|e| {
            warn!(operation = %operation, error = %e, "Merchant API rejected the call");
        })
    }

    async fn register(
        &self,
        operation: GatewayOperation,
        method: &str,
        request: &OrderRequest,
    ) -> Result<RegisteredOrder, GatewayError> {
        let mut params = vec![
            ("orderNumber", request.order_id.clone()),
            ("amount", minor_units(&request.money)?.to_string()),
            ("currency", request.money.currency.numeric().to_string()),
            ("returnUrl", request.return_url.to_string()),
            ("failUrl", request.fail_url.to_string()),
        ];
        if request.operation == PaymentOperation::CardOnFile {
            params.push(("clientId", request.user_id.clone()));
        }

        let response = self.call(operation, method, params).await?;
        let payment_id = response
            .order_id
            .ok_or_else(|| GatewayError::InvalidResponse("missing orderId".into()))?;
        let form_url = response
            .form_url
            .ok_or_else(|| GatewayError::InvalidResponse("missing formUrl".into()))?;
        let redirect_url =
            Url::parse(&form_url).map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        Ok(RegisteredOrder {
            payment_id,
            redirect_url,
        })
    }

    async fn settle(
        &self,
        operation: GatewayOperation,
        method: &str,
        payment_id: &str,
        money: Money,
    ) -> Result<(), GatewayError> {
        let params = vec![
            ("orderId", payment_id.to_string()),
            ("amount", minor_units(&money)?.to_string()),
            ("currency", money.currency.numeric().to_string()),
        ];
        self.call(operation, method, params).await?;
        Ok(())
    }

    async fn order_status_extended(
        &self,
        operation: GatewayOperation,
        payment_id: &str,
    ) -> Result<MerchantResponse, GatewayError> {
        self.call(
            operation,
            "getOrderStatusExtended.do",
            vec![("orderId", payment_id.to_string())],
        )
        .await
    }
}

fn minor_units(money: &Money) -> Result<i64, GatewayError> {
    money
        .minor_units()
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl PaymentGateway for MerchantApiGateway {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<RegisteredOrder, GatewayError> {
        self.register(GatewayOperation::CreateOrder, "register.do", request)
            .await
    }

    async fn create_auth_order(
        &self,
        request: &OrderRequest,
    ) -> Result<RegisteredOrder, GatewayError> {
        self.register(
            GatewayOperation::CreateAuthOrder,
            "registerPreAuth.do",
            request,
        )
        .await
    }

    async fn get_order_status(&self, payment_id: &str) -> Result<PaymentStatus, GatewayError> {
        self.order_status_extended(GatewayOperation::GetOrderStatus, payment_id)
            .await?
            .status()
    }

    async fn get_order_details(&self, payment_id: &str) -> Result<OrderDetails, GatewayError> {
        let response = self
            .order_status_extended(GatewayOperation::GetOrderDetails, payment_id)
            .await?;
        response.into_details(payment_id)
    }

    async fn deposit_order(&self, payment_id: &str, money: Money) -> Result<(), GatewayError> {
        self.settle(GatewayOperation::DepositOrder, "deposit.do", payment_id, money)
            .await
    }

    async fn reversal_order(&self, payment_id: &str, money: Money) -> Result<(), GatewayError> {
        self.settle(GatewayOperation::ReversalOrder, "reverse.do", payment_id, money)
            .await
    }

    async fn refund_order(&self, payment_id: &str, money: Money) -> Result<(), GatewayError> {
        self.settle(GatewayOperation::RefundOrder, "refund.do", payment_id, money)
            .await
    }

    async fn cancel_order(&self, payment_id: &str) -> Result<(), GatewayError> {
        let params = vec![
            ("orderId", payment_id.to_string()),
            ("merchantLogin", self.config.username.clone()),
        ];
        self.call(GatewayOperation::CancelOrder, "decline.do", params)
            .await?;
        Ok(())
    }

    /// Any HTTP answer from the API root counts as reachable.
    async fn ping(&self) -> Result<(), GatewayError> {
        self.http_client
            .get(self.config.base_url.clone())
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

/// `errorCode` arrives as a string from some endpoints and as a number from
/// others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LenientCode {
    Text(String),
    Number(i64),
}

fn lenient_code<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let code = Option::<LenientCode>::deserialize(deserializer)?;
    Ok(code.map(|code| match code {
        LenientCode::Text(text) => text,
        LenientCode::Number(number) => number.to_string(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentAmountInfo {
    payment_state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BindingInfo {
    client_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MerchantResponse {
    #[serde(default, deserialize_with = "lenient_code")]
    error_code: Option<String>,
    error_message: Option<String>,
    order_id: Option<String>,
    form_url: Option<String>,
    order_number: Option<String>,
    order_status: Option<i64>,
    amount: Option<i64>,
    #[serde(default, deserialize_with = "lenient_code")]
    currency: Option<String>,
    /// Milliseconds since the epoch.
    date: Option<i64>,
    payment_amount_info: Option<PaymentAmountInfo>,
    binding_info: Option<BindingInfo>,
}

impl MerchantResponse {
    fn into_result(self) -> Result<Self, GatewayError> {
        match self.error_code.as_deref().map(str::trim) {
            None | Some("") | Some("0") => Ok(self),
            Some(NO_SUCH_ORDER) => Err(GatewayError::NoSuchOrder),
            Some(code) => Err(GatewayError::Rejected {
                code: code.to_string(),
                message: self.error_message.clone().unwrap_or_default(),
            }),
        }
    }

    /// Prefers the textual `paymentState`, falling back to the numeric
    /// `orderStatus`.
    fn status(&self) -> Result<PaymentStatus, GatewayError> {
        let state = self
            .payment_amount_info
            .as_ref()
            .and_then(|info| info.payment_state.as_deref());
        if let Some(state) = state {
            return state
                .parse()
                .map_err(|e| GatewayError::InvalidResponse(format!("{e}")));
        }
        match self.order_status {
            Some(code) => status_from_code(code),
            None => Err(GatewayError::InvalidResponse(
                "response carries no order status".into(),
            )),
        }
    }

    fn money(&self) -> Option<Money> {
        let currency = self
            .currency
            .as_deref()
            .and_then(|code| code.parse::<Currency>().ok())?;
        let amount = currency.from_minor_units(self.amount?);
        Money::new(amount, currency).ok()
    }

    fn into_details(self, payment_id: &str) -> Result<OrderDetails, GatewayError> {
        let status = self.status()?;
        let money = self.money();
        let created_at = self.date.and_then(|millis| {
            time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
        });
        Ok(OrderDetails {
            payment_id: self.order_id.unwrap_or_else(|| payment_id.to_string()),
            order_id: self.order_number,
            status,
            money,
            user_id: self.binding_info.and_then(|info| info.client_id),
            created_at,
        })
    }
}

/// Numeric `orderStatus` values of the merchant API.
fn status_from_code(code: i64) -> Result<PaymentStatus, GatewayError> {
    match code {
        0 => Ok(PaymentStatus::Created),
        1 => Ok(PaymentStatus::Approved),
        2 => Ok(PaymentStatus::Deposited),
        3 => Ok(PaymentStatus::Reversed),
        4 => Ok(PaymentStatus::Refunded),
        5 => Ok(PaymentStatus::Authorized),
        6 => Ok(PaymentStatus::Declined),
        other => Err(GatewayError::InvalidResponse(format!(
            "unknown orderStatus {other}"
        ))),
    }
}
