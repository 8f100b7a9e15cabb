//! Payments API client (merchant backend → payorch server).

use reqwest::Client;
use url::Url;

use super::{ClientError, parse_response};
use crate::objects::{
    AmountRequest, CreatePaymentRequest, CreatePaymentResponse, HealthResponse, ListPaymentsQuery,
    PaymentResponse, PaymentsListResponse, RefundPaymentRequest, StatusResponse,
};

/// Typed HTTP client for the payorch **payments API**.
#[derive(Debug, Clone)]
pub struct PaymentClient {
    http: Client,
    base_url: Url,
}

impl PaymentClient {
    /// Create a new `PaymentClient`.
    ///
    /// * `base_url` – root URL of the payorch server (e.g. `https://payments.internal:8080`).
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts or a proxy).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/v1/payments` – register a one-stage payment.
    pub async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<CreatePaymentResponse, ClientError> {
        let url = self.endpoint(&["payments"])?;
        let resp = self.http.post(url).json(request).send().await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/payments/auth` – register a two-stage (hold) payment.
    pub async fn auth_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<CreatePaymentResponse, ClientError> {
        let url = self.endpoint(&["payments", "auth"])?;
        let resp = self.http.post(url).json(request).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/payments/{payment_id}`.
    pub async fn get_payment(&self, payment_id: &str) -> Result<PaymentResponse, ClientError> {
        let url = self.endpoint(&["payments", payment_id])?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/payments/{payment_id}/status`.
    pub async fn get_payment_status(
        &self,
        payment_id: &str,
    ) -> Result<StatusResponse, ClientError> {
        let url = self.endpoint(&["payments", payment_id, "status"])?;
        let resp = self.http.get(url).send().await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/payments/{payment_id}/deposit` – capture held funds.
    pub async fn deposit_payment(
        &self,
        payment_id: &str,
        request: &AmountRequest,
    ) -> Result<StatusResponse, ClientError> {
        let url = self.endpoint(&["payments", payment_id, "deposit"])?;
        let resp = self.http.post(url).json(request).send().await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/payments/{payment_id}/reversal` – release held funds.
    pub async fn reversal_payment(
        &self,
        payment_id: &str,
        request: &AmountRequest,
    ) -> Result<StatusResponse, ClientError> {
        let url = self.endpoint(&["payments", payment_id, "reversal"])?;
        let resp = self.http.post(url).json(request).send().await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/payments/{payment_id}/refund`.
    pub async fn refund_payment(
        &self,
        payment_id: &str,
        reason: impl Into<String>,
    ) -> Result<StatusResponse, ClientError> {
        let url = self.endpoint(&["payments", payment_id, "refund"])?;
        let body = RefundPaymentRequest {
            reason: reason.into(),
        };
        let resp = self.http.post(url).json(&body).send().await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/payments/{payment_id}/success` – confirm a payment after
    /// the buyer returned from the gateway.
    pub async fn success_payment(&self, payment_id: &str) -> Result<StatusResponse, ClientError> {
        let url = self.endpoint(&["payments", payment_id, "success"])?;
        let resp = self.http.post(url).send().await?;
        parse_response(resp).await
    }

    /// `GET /api/v1/users/{user_id}/payments`.
    pub async fn list_payments(
        &self,
        user_id: &str,
        query: ListPaymentsQuery,
    ) -> Result<PaymentsListResponse, ClientError> {
        let url = self.endpoint(&["users", user_id, "payments"])?;
        let resp = self
            .http
            .get(url)
            .query(&[("page", query.page), ("page_size", query.page_size)])
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `GET /ready` – dependency health. A 503 is still decoded into a
    /// [`HealthResponse`] so callers can see which dependency failed.
    pub async fn ready(&self) -> Result<HealthResponse, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidBaseUrl)?
            .pop_if_empty()
            .push("ready");
        let resp = self.http.get(url).send().await?;
        if resp.status() == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            let bytes = resp.bytes().await?;
            return serde_json::from_slice(&bytes).map_err(ClientError::Json);
        }
        parse_response(resp).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidBaseUrl)?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }
}
