//! Payments API.
//!
//! Called by the merchant backend. Mounted under `/api/v1`.
//!
//! # Endpoints
//!
//! - `POST /payments`                         – register a one-stage payment
//! - `POST /payments/auth`                    – register a two-stage payment
//! - `GET  /payments/{payment_id}`            – fetch a payment
//! - `GET  /payments/{payment_id}/status`     – latest status record
//! - `POST /payments/{payment_id}/deposit`    – capture held funds
//! - `POST /payments/{payment_id}/reversal`   – release held funds
//! - `POST /payments/{payment_id}/refund`     – refund a deposited payment
//! - `POST /payments/{payment_id}/success`    – confirm after the buyer returned
//! - `GET  /users/{user_id}/payments`         – one page of a user's payments

pub mod error;
mod payments;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Build the payments API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments", post(payments::create_payment))
        .route("/payments/auth", post(payments::auth_payment))
        .route("/payments/{payment_id}", get(payments::get_payment))
        .route(
            "/payments/{payment_id}/status",
            get(payments::get_payment_status),
        )
        .route(
            "/payments/{payment_id}/deposit",
            post(payments::deposit_payment),
        )
        .route(
            "/payments/{payment_id}/reversal",
            post(payments::reversal_payment),
        )
        .route(
            "/payments/{payment_id}/refund",
            post(payments::refund_payment),
        )
        .route(
            "/payments/{payment_id}/success",
            post(payments::success_payment),
        )
        .route("/users/{user_id}/payments", get(payments::list_payments))
}
