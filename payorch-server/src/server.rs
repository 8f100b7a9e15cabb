//! Axum server setup and router configuration.

use crate::shutdown::wait_for_shutdown;
use crate::state::AppState;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use payorch_sdk::objects::HealthResponse as ReadyResponse;
use serde::Serialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Build the main application router.
///
/// Every request is logged with its method, path, status and latency.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", crate::api::router())
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        )
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Simple health check - returns OK if the server is running.
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Pings the database and the gateway. 503 lists every failing dependency.
async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.service.health_check().await;
    let body = ReadyResponse::from(&report);
    if let Err(e) = report.into_result() {
        tracing::warn!(error = %e, "Readiness check failed");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(body));
    }
    (StatusCode::OK, Json(body))
}

/// Run the server until `shutdown_rx` flips to `true`, then drain in-flight
/// requests.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);
    serve(listener, router, shutdown_rx).await
}

async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Form;
    use axum::routing::post;
    use payorch_core::gateway::{InMemoryGateway, MerchantApiConfig, MerchantApiGateway, PaymentGateway};
    use payorch_core::service::{PaymentService, ServiceConfig};
    use payorch_core::status::PaymentStatus;
    use payorch_core::store::{InMemoryStore, PaymentStore};
    use payorch_sdk::client::PaymentClient;
    use payorch_sdk::objects::{
        AmountRequest, CreatePaymentRequest, ListPaymentsQuery, PaymentStatus as WireStatus,
    };
    use rust_decimal_macros::dec;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use url::Url;

    /// Serves `router` on an ephemeral port until the returned sender flips.
    async fn spawn(router: Router) -> (Url, watch::Sender<bool>, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            serve(listener, router, shutdown_rx).await.unwrap();
        });
        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        (url, shutdown_tx, handle)
    }

    fn app(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn PaymentStore>) -> Router {
        let service = Arc::new(PaymentService::new(gateway, store, ServiceConfig::default()));
        build_router(AppState::new(service, Duration::from_secs(5)))
    }

    fn request(order_id: &str) -> CreatePaymentRequest {
        CreatePaymentRequest {
            order_id: order_id.into(),
            user_id: "user-1".into(),
            amount: dec!(250.00),
            currency: "USD".into(),
            operation: "URL_payment".into(),
            return_url: Url::parse("https://shop.test/ok").unwrap(),
            fail_url: Url::parse("https://shop.test/fail").unwrap(),
        }
    }

    #[tokio::test]
    async fn end_to_end_create_deposit_refund() {
        let gateway = Arc::new(InMemoryGateway::new("BEREKE"));
        let store = Arc::new(InMemoryStore::new());
        let (base_url, shutdown_tx, handle) = spawn(app(gateway.clone(), store.clone())).await;
        let client = PaymentClient::new(base_url);

        let created = client.auth_payment(&request("order-1")).await.unwrap();
        let payment_id = created.payment.payment_id.clone();
        assert_eq!(created.payment.status, WireStatus::Created);

        let deposited = client
            .deposit_payment(&payment_id, &AmountRequest::full())
            .await
            .unwrap();
        assert_eq!(deposited.status, WireStatus::Deposited);

        let refunded = client
            .refund_payment(&payment_id, "changed my mind")
            .await
            .unwrap();
        assert_eq!(refunded.status, WireStatus::Refunded);

        let status = client.get_payment_status(&payment_id).await.unwrap();
        assert_eq!(status.status, WireStatus::Refunded);
        assert_eq!(gateway.refunds().await.len(), 1);
        assert_eq!(store.refunds(&payment_id).await.unwrap()[0].reason, "changed my mind");

        let page = client
            .list_payments("user-1", ListPaymentsQuery::default())
            .await
            .unwrap();
        assert_eq!(page.payments.len(), 1);
        assert_eq!(page.payments[0].status, WireStatus::Refunded);

        let err = client
            .create_payment(&request("order-1"))
            .await
            .unwrap_err();
        assert_eq!(err.status().map(|s| s.as_u16()), Some(409));
        assert_eq!(err.error_response().unwrap().error, "conflict");

        assert!(client.ready().await.unwrap().healthy);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    /// Minimal stand-in for the bank's REST merchant API.
    #[derive(Default)]
    struct FakeBank {
        orders: Mutex<HashMap<String, (String, i64, &'static str)>>,
    }

    fn fake_bank(bank: Arc<FakeBank>, base: Url) -> Router {
        let register = {
            let bank = bank.clone();
            move |Form(form): Form<HashMap<String, String>>| {
                let bank = bank.clone();
                let base = base.clone();
                async move {
                    assert_eq!(form.get("userName").map(String::as_str), Some("shop-api"));
                    let order_id = format!("bank-{}", form["orderNumber"]);
                    let amount: i64 = form["amount"].parse().unwrap();
                    bank.orders.lock().unwrap().insert(
                        order_id.clone(),
                        (form["orderNumber"].clone(), amount, "CREATED"),
                    );
                    Json(json!({
                        "orderId": order_id,
                        "formUrl": format!("{base}pay/{order_id}"),
                    }))
                }
            }
        };
        let deposit = {
            let bank = bank.clone();
            move |Form(form): Form<HashMap<String, String>>| {
                let bank = bank.clone();
                async move {
                    let mut orders = bank.orders.lock().unwrap();
                    match orders.get_mut(&form["orderId"]) {
                        Some(order) => {
                            order.2 = "DEPOSITED";
                            Json(json!({ "errorCode": "0" }))
                        }
                        None => Json(json!({ "errorCode": 6, "errorMessage": "no such order" })),
                    }
                }
            }
        };
        let status = {
            let bank = bank.clone();
            move |Form(form): Form<HashMap<String, String>>| {
                let bank = bank.clone();
                async move {
                    let orders = bank.orders.lock().unwrap();
                    let body: Value = match orders.get(&form["orderId"]) {
                        Some((order_number, amount, state)) => json!({
                            "errorCode": "0",
                            "orderNumber": order_number,
                            "amount": amount,
                            "currency": "840",
                            "paymentAmountInfo": { "paymentState": state },
                        }),
                        None => json!({ "errorCode": "6", "errorMessage": "no such order" }),
                    };
                    Json(body)
                }
            }
        };
        Router::new()
            .route("/payment/rest/register.do", post(register.clone()))
            .route("/payment/rest/registerPreAuth.do", post(register))
            .route("/payment/rest/deposit.do", post(deposit))
            .route("/payment/rest/getOrderStatusExtended.do", post(status))
            .route("/payment/rest/", get(|| async { "ok" }))
    }

    #[tokio::test]
    async fn merchant_api_gateway_against_fake_bank() {
        // Bind first so the fake bank knows its own address.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bank_url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        let bank = Arc::new(FakeBank::default());
        let (bank_tx, bank_rx) = watch::channel(false);
        let bank_router = fake_bank(bank.clone(), bank_url.clone());
        let bank_handle = tokio::spawn(async move {
            serve(listener, bank_router, bank_rx).await.unwrap();
        });

        let gateway = MerchantApiGateway::new(MerchantApiConfig {
            name: "BEREKE".into(),
            base_url: bank_url.join("payment/rest/").unwrap(),
            username: "shop-api".into(),
            password: "secret".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();
        let store = Arc::new(InMemoryStore::new());
        let (base_url, shutdown_tx, handle) = spawn(app(Arc::new(gateway), store.clone())).await;
        let client = PaymentClient::new(base_url);

        let created = client.auth_payment(&request("order-7")).await.unwrap();
        assert_eq!(created.payment.payment_id, "bank-order-7");
        assert_eq!(
            bank.orders.lock().unwrap()["bank-order-7"].1,
            25_000,
            "amount travels in minor units"
        );

        let deposited = client
            .deposit_payment("bank-order-7", &AmountRequest::full())
            .await
            .unwrap();
        assert_eq!(deposited.status, WireStatus::Deposited);

        let confirmed = client.success_payment("bank-order-7").await.unwrap();
        assert_eq!(confirmed.status, WireStatus::Deposited);
        assert_eq!(
            store.get_status("bank-order-7").await.unwrap().status,
            PaymentStatus::Deposited
        );

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        bank_tx.send(true).unwrap();
        bank_handle.await.unwrap();
    }
}
