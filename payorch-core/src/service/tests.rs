use super::*;
use crate::context::Interrupted;
use crate::gateway::InMemoryGateway;
use crate::store::InMemoryStore;
use crate::store::memory::StoreOperation;
use crate::utils::FailurePlan;
use rust_decimal_macros::dec;

struct Fixture {
    service: PaymentService,
    gateway: Arc<InMemoryGateway>,
    store: Arc<InMemoryStore>,
}

fn fixture() -> Fixture {
    let gateway = Arc::new(InMemoryGateway::new("BEREKE"));
    let store = Arc::new(InMemoryStore::new());
    let config = ServiceConfig {
        write_retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
        post_commit_timeout: Duration::from_secs(5),
        max_page_size: 100,
        health_timeout: Duration::from_secs(1),
    };
    let service = PaymentService::new(gateway.clone(), store.clone(), config);
    Fixture {
        service,
        gateway,
        store,
    }
}

fn input(order_id: &str, amount: Decimal, currency: &str) -> CreatePayment {
    CreatePayment {
        order_id: order_id.into(),
        user_id: "user-1".into(),
        amount,
        currency: currency.into(),
        operation: "URL_payment".into(),
        return_url: Url::parse("https://shop.test/ok").unwrap(),
        fail_url: Url::parse("https://shop.test/fail").unwrap(),
    }
}

fn ctx() -> CallContext {
    CallContext::background()
}

async fn created(f: &Fixture, order_id: &str, amount: Decimal, currency: &str) -> Payment {
    f.service
        .create_payment(&ctx(), input(order_id, amount, currency))
        .await
        .unwrap()
        .payment
}

fn usd(amount: Decimal) -> Money {
    Money::new(amount, Currency::Usd).unwrap()
}

// create / auth

#[tokio::test]
async fn create_payment_registers_and_persists() {
    let f = fixture();
    let created = f
        .service
        .create_payment(&ctx(), input("order-1", dec!(100.00), "USD"))
        .await
        .unwrap();

    let payment = &created.payment;
    assert_eq!(payment.status, PaymentStatus::Created);
    assert_eq!(payment.broker, "BEREKE");
    assert_eq!(payment.money(), usd(dec!(100.00)));
    assert!(created.redirect_url.as_str().contains(&payment.payment_id));
    assert_eq!(f.gateway.calls(GatewayOperation::CreateOrder).await, 1);

    let stored = f.store.get_by_order_id("order-1").await.unwrap();
    assert_eq!(&stored, payment);
    let history = f.store.history(&payment.payment_id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, PaymentStatus::Created);
}

#[tokio::test]
async fn auth_payment_uses_the_hold_operation() {
    let f = fixture();
    let created = f
        .service
        .auth_payment(&ctx(), input("order-1", dec!(5000), "KZT"))
        .await
        .unwrap();
    assert_eq!(created.payment.status, PaymentStatus::Created);
    assert_eq!(f.gateway.calls(GatewayOperation::CreateAuthOrder).await, 1);
    assert_eq!(f.gateway.calls(GatewayOperation::CreateOrder).await, 0);
    assert!(
        f.gateway
            .order(&created.payment.payment_id)
            .await
            .unwrap()
            .two_stage
    );
}

#[tokio::test]
async fn card_on_file_operation_is_accepted() {
    let f = fixture();
    let mut request = input("order-1", dec!(10), "EUR");
    request.operation = "COF_payment".into();
    let created = f.service.create_payment(&ctx(), request).await.unwrap();
    assert_eq!(created.payment.operation, PaymentOperation::CardOnFile);
}

#[tokio::test]
async fn duplicate_order_id_is_rejected_before_the_gateway() {
    let f = fixture();
    created(&f, "order-1", dec!(100.00), "USD").await;

    let err = f
        .service
        .create_payment(&ctx(), input("order-1", dec!(100.00), "USD"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(f.gateway.calls(GatewayOperation::CreateOrder).await, 1);
    assert_eq!(f.store.len().await, 1);
}

#[tokio::test]
async fn race_past_the_pre_check_cancels_the_second_order() {
    let f = fixture();
    created(&f, "order-1", dec!(100.00), "USD").await;
    f.store.set_stale_uniqueness(true).await;

    let err = f
        .service
        .create_payment(&ctx(), input("order-1", dec!(100.00), "USD"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(f.gateway.calls(GatewayOperation::CreateOrder).await, 2);
    assert_eq!(f.gateway.cancellations().await.len(), 1);
    assert_eq!(f.store.len().await, 1);
}

#[tokio::test]
async fn persistence_failure_with_successful_cancel_returns_persistence_error() {
    let f = fixture();
    f.store
        .fail(StoreOperation::Create, FailurePlan::Always)
        .await;

    let err = f
        .service
        .create_payment(&ctx(), input("order-1", dec!(100.00), "USD"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert!(f.store.is_empty().await);
    assert_eq!(f.gateway.cancellations().await.len(), 1);
}

#[tokio::test]
async fn persistence_failure_with_failed_cancel_is_an_inconsistency() {
    let f = fixture();
    f.store
        .fail(StoreOperation::Create, FailurePlan::Always)
        .await;
    f.gateway
        .fail(
            GatewayOperation::CancelOrder,
            FailurePlan::Always,
            GatewayError::Transport("connection reset".into()),
        )
        .await;

    let err = f
        .service
        .create_payment(&ctx(), input("order-1", dec!(100.00), "USD"))
        .await
        .unwrap_err();
    let ServiceError::Inconsistency(inconsistency) = err else {
        panic!("expected inconsistency, got {err:?}");
    };
    assert_eq!(inconsistency.order_id, "order-1");
    assert_eq!(inconsistency.operation, GatewayOperation::CreateOrder);
    assert!(inconsistency.detail.contains("connection reset"));
    assert!(!inconsistency.payment_id.is_empty());
}

#[tokio::test]
async fn gateway_failure_on_create_persists_nothing() {
    let f = fixture();
    f.gateway
        .fail(
            GatewayOperation::CreateOrder,
            FailurePlan::Always,
            GatewayError::Rejected {
                code: "5".into(),
                message: "Access denied".into(),
            },
        )
        .await;

    let err = f
        .service
        .create_payment(&ctx(), input("order-1", dec!(100.00), "USD"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::GatewayOperationFailed {
            operation: GatewayOperation::CreateOrder,
            ..
        }
    ));
    assert!(f.store.is_empty().await);
    assert_eq!(f.store.calls(StoreOperation::Create).await, 0);
}

#[tokio::test]
async fn amounts_finer_than_the_minor_unit_are_rejected() {
    let f = fixture();
    for (amount, currency) in [(dec!(10.005), "USD"), (dec!(19.5), "KZT")] {
        let err = f
            .service
            .create_payment(&ctx(), input("order-1", amount, currency))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
    }
    assert_eq!(f.gateway.total_calls().await, 0);
    assert_eq!(f.store.total_calls().await, 0);

    // the stored amount is exactly what the gateway charges
    let payment = created(&f, "order-1", dec!(10.010), "USD").await;
    let remote = f
        .gateway
        .get_order_details(&payment.payment_id)
        .await
        .unwrap();
    assert_eq!(remote.money, Some(payment.money()));
    assert_eq!(payment.money().minor_units().unwrap(), 1001);
}

#[tokio::test]
async fn invalid_input_touches_neither_port() {
    let f = fixture();
    let mut bad_operation = input("order-1", dec!(1), "USD");
    bad_operation.operation = "CASH".into();
    let mut no_user = input("order-1", dec!(1), "USD");
    no_user.user_id = "  ".into();

    let cases = [
        input("order-1", dec!(100.00), "JPY"),
        input("order-1", dec!(0), "USD"),
        input("order-1", dec!(-3), "USD"),
        input("order-1", dec!(0.001), "USD"),
        input("", dec!(1), "USD"),
        bad_operation,
        no_user,
    ];
    for case in cases {
        let err = f.service.create_payment(&ctx(), case).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
    }
    assert_eq!(f.gateway.total_calls().await, 0);
    assert_eq!(f.store.total_calls().await, 0);
}

#[tokio::test]
async fn cancelled_context_stops_before_any_call() {
    let f = fixture();
    let ctx = CallContext::background();
    ctx.token().cancel();

    let err = f
        .service
        .create_payment(&ctx, input("order-1", dec!(1), "USD"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Interrupted(Interrupted::Cancelled)));
    assert_eq!(f.gateway.total_calls().await, 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_during_registration_persists_nothing() {
    let f = fixture();
    f.gateway.set_latency(Duration::from_secs(10)).await;
    let ctx = CallContext::with_timeout(Duration::from_millis(100));

    let err = f
        .service
        .create_payment(&ctx, input("order-1", dec!(1), "USD"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Interrupted);
    assert!(f.store.is_empty().await);
}

// deposit / reversal

#[tokio::test]
async fn full_deposit_captures_the_stored_amount() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;

    let record = f
        .service
        .deposit_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap();
    assert_eq!(record.status, PaymentStatus::Deposited);
    assert_eq!(
        f.gateway.deposits().await,
        vec![(payment.payment_id.clone(), usd(dec!(50.00)))]
    );
    let stored = f.store.get_by_payment_id(&payment.payment_id).await.unwrap();
    assert_eq!(stored.status, PaymentStatus::Deposited);
    assert_eq!(f.store.history(&payment.payment_id).await.len(), 2);
}

#[tokio::test]
async fn partial_deposit_must_fit_the_payment() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;

    let too_much = AmountSpec::Partial(usd(dec!(50.01)));
    let other_currency = AmountSpec::Partial(Money::new(dec!(10), Currency::Eur).unwrap());
    for amount in [too_much, other_currency] {
        let err = f
            .service
            .deposit_payment(&ctx(), &payment.payment_id, amount)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert_eq!(f.gateway.calls(GatewayOperation::DepositOrder).await, 0);

    f.service
        .deposit_payment(
            &ctx(),
            &payment.payment_id,
            AmountSpec::Partial(usd(dec!(20.00))),
        )
        .await
        .unwrap();
    assert_eq!(
        f.gateway.deposits().await,
        vec![(payment.payment_id, usd(dec!(20.00)))]
    );
}

#[tokio::test]
async fn deposit_from_a_terminal_status_is_rejected() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.store
        .force_status(&payment.payment_id, PaymentStatus::Reversed)
        .await;

    let err = f
        .service
        .deposit_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::Transition(_))
    ));
    assert_eq!(f.gateway.calls(GatewayOperation::DepositOrder).await, 0);
}

#[tokio::test]
async fn deposit_write_is_retried_after_transient_failures() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.store
        .fail(StoreOperation::MarkStatus, FailurePlan::Times(2))
        .await;

    let record = f
        .service
        .deposit_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap();
    assert_eq!(record.status, PaymentStatus::Deposited);
    assert_eq!(f.gateway.calls(GatewayOperation::DepositOrder).await, 1);
    assert_eq!(f.store.calls(StoreOperation::MarkStatus).await, 3);
}

#[tokio::test]
async fn exhausted_deposit_retries_are_an_inconsistency() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.store
        .fail(StoreOperation::MarkStatus, FailurePlan::Always)
        .await;

    let err = f
        .service
        .deposit_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap_err();
    let ServiceError::Inconsistency(inconsistency) = err else {
        panic!("expected inconsistency, got {err:?}");
    };
    assert_eq!(inconsistency.payment_id, payment.payment_id);
    assert_eq!(inconsistency.operation, GatewayOperation::DepositOrder);
    assert_eq!(f.gateway.calls(GatewayOperation::DepositOrder).await, 1);
    assert_eq!(f.store.calls(StoreOperation::MarkStatus).await, 3);
}

#[tokio::test(start_paused = true)]
async fn concurrent_duplicate_reaching_the_target_counts_as_success() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.gateway.set_latency(Duration::from_millis(50)).await;

    let store = f.store.clone();
    let payment_id = payment.payment_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.force_status(&payment_id, PaymentStatus::Deposited).await;
    });

    let record = f
        .service
        .deposit_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap();
    assert_eq!(record.status, PaymentStatus::Deposited);
    assert_eq!(f.store.calls(StoreOperation::MarkStatus).await, 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_advance_during_capture_is_followed() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.gateway.set_latency(Duration::from_millis(50)).await;

    let store = f.store.clone();
    let payment_id = payment.payment_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.force_status(&payment_id, PaymentStatus::Approved).await;
    });

    let record = f
        .service
        .deposit_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap();
    assert_eq!(record.status, PaymentStatus::Deposited);
    assert_eq!(f.gateway.deposits().await.len(), 1);
    assert_eq!(f.store.calls(StoreOperation::MarkStatus).await, 2);
    let statuses: Vec<_> = f
        .store
        .history(&payment.payment_id)
        .await
        .into_iter()
        .map(|r| r.status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            PaymentStatus::Created,
            PaymentStatus::Approved,
            PaymentStatus::Deposited
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn conflicting_status_after_capture_is_an_inconsistency() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.gateway.set_latency(Duration::from_millis(50)).await;

    let store = f.store.clone();
    let payment_id = payment.payment_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.force_status(&payment_id, PaymentStatus::Declined).await;
    });

    let err = f
        .service
        .deposit_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inconsistency);
    assert_eq!(f.store.calls(StoreOperation::MarkStatus).await, 1);
}

#[tokio::test(start_paused = true)]
async fn vanished_payment_after_capture_is_an_inconsistency() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.gateway.set_latency(Duration::from_millis(50)).await;

    let store = f.store.clone();
    let payment_id = payment.payment_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.remove(&payment_id).await;
    });

    let err = f
        .service
        .deposit_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inconsistency);
    assert_eq!(f.store.calls(StoreOperation::MarkStatus).await, 1);
}

#[tokio::test]
async fn reversal_releases_the_hold() {
    let f = fixture();
    let payment = f
        .service
        .auth_payment(&ctx(), input("order-1", dec!(75.50), "RUB"))
        .await
        .unwrap()
        .payment;
    f.gateway
        .set_remote_status(&payment.payment_id, PaymentStatus::Authorized)
        .await;

    let record = f
        .service
        .reversal_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap();
    assert_eq!(record.status, PaymentStatus::Reversed);
    assert_eq!(
        f.gateway.reversals().await,
        vec![(
            payment.payment_id.clone(),
            Money::new(dec!(75.50), Currency::Rub).unwrap()
        )]
    );
}

#[tokio::test]
async fn reversal_after_deposit_is_rejected() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.service
        .deposit_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap();

    let err = f
        .service
        .reversal_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(f.gateway.calls(GatewayOperation::ReversalOrder).await, 0);
}

#[tokio::test]
async fn gateway_rejection_leaves_the_record_untouched() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.gateway
        .fail(
            GatewayOperation::DepositOrder,
            FailurePlan::Always,
            GatewayError::Rejected {
                code: "7".into(),
                message: "impossible".into(),
            },
        )
        .await;

    let err = f
        .service
        .deposit_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GatewayOperationFailed);
    assert_eq!(f.store.calls(StoreOperation::MarkStatus).await, 0);
    assert_eq!(f.store.history(&payment.payment_id).await.len(), 1);
}

// refund

#[tokio::test]
async fn refund_after_deposit_records_reason() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.service
        .deposit_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap();

    let record = f
        .service
        .refund_payment(&ctx(), &payment.payment_id, "customer request".into())
        .await
        .unwrap();
    assert_eq!(record.status, PaymentStatus::Refunded);

    let refunds = f.store.refunds(&payment.payment_id).await.unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].reason, "customer request");
    assert_eq!(refunds[0].amount.value(), dec!(50.00));
    assert_eq!(
        f.gateway.refunds().await,
        vec![(payment.payment_id.clone(), usd(dec!(50.00)))]
    );
}

#[tokio::test]
async fn failed_refund_changes_nothing_locally() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.service
        .deposit_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap();
    f.gateway
        .fail(
            GatewayOperation::RefundOrder,
            FailurePlan::Always,
            GatewayError::Unavailable("maintenance".into()),
        )
        .await;

    let err = f
        .service
        .refund_payment(&ctx(), &payment.payment_id, "duplicate".into())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GatewayOperationFailed);

    let status = f.store.get_status(&payment.payment_id).await.unwrap();
    assert_eq!(status.status, PaymentStatus::Deposited);
    assert!(f.store.refunds(&payment.payment_id).await.unwrap().is_empty());
    assert_eq!(f.store.calls(StoreOperation::RecordRefund).await, 0);
}

#[tokio::test]
async fn refund_write_is_retried() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.service
        .deposit_payment(&ctx(), &payment.payment_id, AmountSpec::Full)
        .await
        .unwrap();
    f.store
        .fail(StoreOperation::RecordRefund, FailurePlan::Times(1))
        .await;

    f.service
        .refund_payment(&ctx(), &payment.payment_id, "late delivery".into())
        .await
        .unwrap();
    assert_eq!(f.gateway.refunds().await.len(), 1);
    assert_eq!(f.store.refunds(&payment.payment_id).await.unwrap().len(), 1);
}

// success

#[tokio::test]
async fn success_with_unpaid_remote_is_rejected() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.gateway
        .set_remote_status(&payment.payment_id, PaymentStatus::Declined)
        .await;

    let err = f
        .service
        .success_payment(&ctx(), &payment.payment_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::PaymentNotPaid {
            status: PaymentStatus::Declined,
            ..
        }
    ));
    assert_eq!(
        f.store.get_status(&payment.payment_id).await.unwrap().status,
        PaymentStatus::Created
    );
    assert_eq!(f.store.calls(StoreOperation::MarkStatus).await, 0);
}

#[tokio::test]
async fn success_records_the_remote_status() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.gateway
        .set_remote_status(&payment.payment_id, PaymentStatus::Approved)
        .await;

    let record = f
        .service
        .success_payment(&ctx(), &payment.payment_id)
        .await
        .unwrap();
    assert_eq!(record.status, PaymentStatus::Approved);

    // a second confirmation is a read
    let again = f
        .service
        .success_payment(&ctx(), &payment.payment_id)
        .await
        .unwrap();
    assert_eq!(again.status, PaymentStatus::Approved);
    assert_eq!(f.store.calls(StoreOperation::MarkStatus).await, 1);
    assert_eq!(f.store.history(&payment.payment_id).await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn success_follows_a_concurrent_advance() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.gateway
        .set_remote_status(&payment.payment_id, PaymentStatus::Deposited)
        .await;
    f.gateway.set_latency(Duration::from_millis(50)).await;

    let store = f.store.clone();
    let payment_id = payment.payment_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.force_status(&payment_id, PaymentStatus::Approved).await;
    });

    let record = f
        .service
        .success_payment(&ctx(), &payment.payment_id)
        .await
        .unwrap();
    assert_eq!(record.status, PaymentStatus::Deposited);
    assert_eq!(
        f.store.get_status(&payment.payment_id).await.unwrap().status,
        PaymentStatus::Deposited
    );
}

#[tokio::test]
async fn success_never_moves_backwards() {
    let f = fixture();
    let payment = created(&f, "order-1", dec!(50.00), "USD").await;
    f.store
        .force_status(&payment.payment_id, PaymentStatus::Deposited)
        .await;
    f.gateway
        .set_remote_status(&payment.payment_id, PaymentStatus::Approved)
        .await;

    let err = f
        .service
        .success_payment(&ctx(), &payment.payment_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// reads

#[tokio::test]
async fn unknown_payment_is_not_found() {
    let f = fixture();
    let err = f.service.get_payment(&ctx(), "missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = f
        .service
        .get_payment_status(&ctx(), "missing")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = f
        .service
        .deposit_payment(&ctx(), "missing", AmountSpec::Full)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn payments_list_pages_newest_first() {
    let f = fixture();
    for i in 0..5 {
        created(&f, &format!("order-{i}"), dec!(1), "USD").await;
    }

    let first = f
        .service
        .payments_list(&ctx(), "user-1", 1, 2)
        .await
        .unwrap();
    let third = f
        .service
        .payments_list(&ctx(), "user-1", 3, 2)
        .await
        .unwrap();
    let orders: Vec<_> = first.iter().map(|p| p.order_id.as_str()).collect();
    assert_eq!(orders, vec!["order-4", "order-3"]);
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].order_id, "order-0");
    assert!(
        f.service
            .payments_list(&ctx(), "someone-else", 1, 10)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn payments_list_validates_pagination() {
    let f = fixture();
    for (page, page_size) in [(0, 10), (1, 0), (1, 101)] {
        let err = f
            .service
            .payments_list(&ctx(), "user-1", page, page_size)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert_eq!(f.store.calls(StoreOperation::UserPaymentsList).await, 0);
}

#[tokio::test]
async fn health_check_reports_both_dependencies() {
    let f = fixture();
    assert!(f.service.health_check().await.into_result().is_ok());

    f.store.fail(StoreOperation::Ping, FailurePlan::Always).await;
    f.gateway
        .fail(
            GatewayOperation::Ping,
            FailurePlan::Always,
            GatewayError::Unavailable("down".into()),
        )
        .await;
    let err = f.service.health_check().await.into_result().unwrap_err();
    assert_eq!(err.failures.len(), 2);
}

// AmountSpec

#[test]
fn amount_request_maps_to_amount_spec() {
    assert_eq!(
        AmountSpec::try_from(AmountRequest::full()).unwrap(),
        AmountSpec::Full
    );
    assert_eq!(
        AmountSpec::try_from(AmountRequest::partial(dec!(19.99), "840")).unwrap(),
        AmountSpec::Partial(usd(dec!(19.99)))
    );
    assert!(AmountSpec::try_from(AmountRequest::partial(dec!(0), "USD")).is_err());
    assert!(
        AmountSpec::try_from(AmountRequest {
            amount: Some(dec!(1)),
            currency: None
        })
        .is_err()
    );
    assert!(AmountSpec::try_from(AmountRequest::partial(dec!(1), "JPY")).is_err());
}
