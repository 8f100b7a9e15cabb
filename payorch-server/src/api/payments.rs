//! Payments API handlers.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use payorch_core::entities::StatusRecord;
use payorch_core::service::{AmountSpec, CreatedPayment};
use payorch_sdk::objects::{
    AmountRequest, CreatePaymentRequest, CreatePaymentResponse, ListPaymentsQuery,
    PaymentResponse, PaymentsListResponse, RefundPaymentRequest, StatusResponse,
};

use super::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

fn created_response(created: &CreatedPayment) -> (StatusCode, Json<CreatePaymentResponse>) {
    (
        StatusCode::CREATED,
        Json(CreatePaymentResponse {
            payment: PaymentResponse::from(&created.payment),
            redirect_url: created.redirect_url.clone(),
        }),
    )
}

fn status_response(record: &StatusRecord) -> Json<StatusResponse> {
    Json(StatusResponse::from(record))
}

/// `POST /payments`: register a one-stage payment.
pub(super) async fn create_payment(
    State(state): State<AppState>,
    body: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatePaymentResponse>), ApiError> {
    let Json(request) = body?;
    let created = state
        .service
        .create_payment(&state.call_context(), request.into())
        .await?;
    Ok(created_response(&created))
}

/// `POST /payments/auth`: register a two-stage payment.
pub(super) async fn auth_payment(
    State(state): State<AppState>,
    body: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatePaymentResponse>), ApiError> {
    let Json(request) = body?;
    let created = state
        .service
        .auth_payment(&state.call_context(), request.into())
        .await?;
    Ok(created_response(&created))
}

/// `GET /payments/{payment_id}`
pub(super) async fn get_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> ApiResult<PaymentResponse> {
    let payment = state
        .service
        .get_payment(&state.call_context(), &payment_id)
        .await?;
    Ok(Json(PaymentResponse::from(&payment)))
}

/// `GET /payments/{payment_id}/status`
pub(super) async fn get_payment_status(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> ApiResult<StatusResponse> {
    let record = state
        .service
        .get_payment_status(&state.call_context(), &payment_id)
        .await?;
    Ok(status_response(&record))
}

/// `POST /payments/{payment_id}/deposit`: capture held funds.
pub(super) async fn deposit_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    body: Result<Json<AmountRequest>, JsonRejection>,
) -> ApiResult<StatusResponse> {
    let Json(request) = body?;
    let amount = AmountSpec::try_from(request)?;
    let record = state
        .service
        .deposit_payment(&state.call_context(), &payment_id, amount)
        .await?;
    Ok(status_response(&record))
}

/// `POST /payments/{payment_id}/reversal`: release held funds.
pub(super) async fn reversal_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    body: Result<Json<AmountRequest>, JsonRejection>,
) -> ApiResult<StatusResponse> {
    let Json(request) = body?;
    let amount = AmountSpec::try_from(request)?;
    let record = state
        .service
        .reversal_payment(&state.call_context(), &payment_id, amount)
        .await?;
    Ok(status_response(&record))
}

/// `POST /payments/{payment_id}/refund`
pub(super) async fn refund_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
    body: Result<Json<RefundPaymentRequest>, JsonRejection>,
) -> ApiResult<StatusResponse> {
    let Json(request) = body?;
    let record = state
        .service
        .refund_payment(&state.call_context(), &payment_id, request.reason)
        .await?;
    Ok(status_response(&record))
}

/// `POST /payments/{payment_id}/success`: the buyer came back from the
/// gateway's payment page.
pub(super) async fn success_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<String>,
) -> ApiResult<StatusResponse> {
    let record = state
        .service
        .success_payment(&state.call_context(), &payment_id)
        .await?;
    Ok(status_response(&record))
}

/// `GET /users/{user_id}/payments?page&page_size`
pub(super) async fn list_payments(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    query: Result<Query<ListPaymentsQuery>, QueryRejection>,
) -> ApiResult<PaymentsListResponse> {
    let Query(query) = query?;
    let payments = state
        .service
        .payments_list(&state.call_context(), &user_id, query.page, query.page_size)
        .await?;
    Ok(Json(PaymentsListResponse {
        payments: payments.iter().map(PaymentResponse::from).collect(),
        page: query.page,
        page_size: query.page_size,
    }))
}
