use crate::currency::{Amount, AmountError, Currency};
use crate::entities::{NewPayment, Payment, PaymentOperation, RefundRecord, StatusRecord};
use crate::framework::DatabaseProcessor;
use crate::status::PaymentStatus;
use kanau::processor::Processor;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PaymentRow {
    pub payment_id: String,
    pub order_id: String,
    pub user_id: String,
    pub broker: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub operation: PaymentOperation,
    pub status: PaymentStatus,
    pub created_at: time::OffsetDateTime,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = AmountError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Payment {
            payment_id: row.payment_id,
            order_id: row.order_id,
            user_id: row.user_id,
            broker: row.broker,
            amount: Amount::new(row.amount)?,
            currency: row.currency,
            operation: row.operation,
            status: row.status,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StatusRecordRow {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub created_at: time::OffsetDateTime,
}

impl From<StatusRecordRow> for StatusRecord {
    fn from(row: StatusRecordRow) -> Self {
        StatusRecord {
            payment_id: row.payment_id,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefundRow {
    pub payment_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub reason: String,
    pub created_at: time::OffsetDateTime,
}

impl TryFrom<RefundRow> for RefundRecord {
    type Error = AmountError;

    fn try_from(row: RefundRow) -> Result<Self, Self::Error> {
        Ok(RefundRecord {
            payment_id: row.payment_id,
            amount: Amount::new(row.amount)?,
            currency: row.currency,
            reason: row.reason,
            created_at: row.created_at,
        })
    }
}

/// Result of a compare-and-set on `payments.status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdateOutcome {
    Applied(StatusRecordRow),
    /// The stored status was not the expected one. `None` when the payment
    /// does not exist.
    Stale { actual: Option<PaymentStatus> },
}

#[derive(Debug, Clone)]
/// Reserve the order id, insert the payment and its initial `CREATED`
/// history entry in one transaction.
///
/// A reused order id fails with a unique violation on `payment_order_ids`.
pub struct InsertPayment {
    pub payment: NewPayment,
}

impl Processor<InsertPayment> for DatabaseProcessor {
    type Output = PaymentRow;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertPayment")]
    async fn process(&self, insert: InsertPayment) -> Result<PaymentRow, sqlx::Error> {
        let NewPayment {
            payment_id,
            order_id,
            user_id,
            broker,
            money,
            operation,
        } = insert.payment;

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO payment_order_ids (order_id) VALUES ($1)")
            .bind(&order_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            INSERT INTO payments (payment_id, order_id, user_id, broker, amount, currency, operation, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING payment_id, order_id, user_id, broker, amount, currency, operation, status, created_at
            "#,
        )
        .bind(&payment_id)
        .bind(&order_id)
        .bind(&user_id)
        .bind(&broker)
        .bind(money.amount.value())
        .bind(money.currency)
        .bind(operation)
        .bind(PaymentStatus::Created)
        .fetch_one(&mut *tx)
        .await?;

        PaymentRow::append_status_tx(&mut tx, &payment_id, PaymentStatus::Created).await?;

        tx.commit().await?;
        Ok(row)
    }
}

#[derive(Debug, Clone)]
/// Whether an order id has ever been reserved.
pub struct OrderIdExists {
    pub order_id: String,
}

impl Processor<OrderIdExists> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:OrderIdExists")]
    async fn process(&self, query: OrderIdExists) -> Result<bool, sqlx::Error> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM payment_order_ids WHERE order_id = $1)",
        )
        .bind(&query.order_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[derive(Debug, Clone)]
pub struct GetPaymentByOrderId {
    pub order_id: String,
}

impl Processor<GetPaymentByOrderId> for DatabaseProcessor {
    type Output = Option<PaymentRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPaymentByOrderId")]
    async fn process(&self, query: GetPaymentByOrderId) -> Result<Option<PaymentRow>, sqlx::Error> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT payment_id, order_id, user_id, broker, amount, currency, operation, status, created_at
            FROM payments
            WHERE order_id = $1
            "#,
        )
        .bind(&query.order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[derive(Debug, Clone)]
pub struct GetPaymentByPaymentId {
    pub payment_id: String,
}

impl Processor<GetPaymentByPaymentId> for DatabaseProcessor {
    type Output = Option<PaymentRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPaymentByPaymentId")]
    async fn process(
        &self,
        query: GetPaymentByPaymentId,
    ) -> Result<Option<PaymentRow>, sqlx::Error> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT payment_id, order_id, user_id, broker, amount, currency, operation, status, created_at
            FROM payments
            WHERE payment_id = $1
            "#,
        )
        .bind(&query.payment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[derive(Debug, Clone)]
/// Latest history entry of a payment, ties on `created_at` broken by
/// insertion order.
pub struct GetLatestStatus {
    pub payment_id: String,
}

impl Processor<GetLatestStatus> for DatabaseProcessor {
    type Output = Option<StatusRecordRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetLatestStatus")]
    async fn process(&self, query: GetLatestStatus) -> Result<Option<StatusRecordRow>, sqlx::Error> {
        let row = sqlx::query_as::<_, StatusRecordRow>(
            r#"
            SELECT payment_id, status, created_at
            FROM payment_status_history
            WHERE payment_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(&query.payment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[derive(Debug, Clone)]
/// Move `payments.status` from `expected` to `next` and append the history
/// entry, both or neither.
pub struct UpdatePaymentStatus {
    pub payment_id: String,
    pub expected: PaymentStatus,
    pub next: PaymentStatus,
}

impl Processor<UpdatePaymentStatus> for DatabaseProcessor {
    type Output = StatusUpdateOutcome;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdatePaymentStatus")]
    async fn process(&self, update: UpdatePaymentStatus) -> Result<StatusUpdateOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let outcome = PaymentRow::compare_and_set_status_tx(
            &mut tx,
            &update.payment_id,
            update.expected,
            update.next,
        )
        .await?;
        match outcome {
            StatusUpdateOutcome::Applied(_) => tx.commit().await?,
            StatusUpdateOutcome::Stale { .. } => tx.rollback().await?,
        }
        Ok(outcome)
    }
}

#[derive(Debug, Clone)]
/// Move a payment to `REFUNDED` and store the refund row, both or neither.
pub struct InsertRefund {
    pub payment_id: String,
    pub expected: PaymentStatus,
    pub amount: Decimal,
    pub currency: Currency,
    pub reason: String,
}

impl Processor<InsertRefund> for DatabaseProcessor {
    type Output = StatusUpdateOutcome;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertRefund")]
    async fn process(&self, insert: InsertRefund) -> Result<StatusUpdateOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let outcome = PaymentRow::compare_and_set_status_tx(
            &mut tx,
            &insert.payment_id,
            insert.expected,
            PaymentStatus::Refunded,
        )
        .await?;
        if let StatusUpdateOutcome::Stale { .. } = outcome {
            tx.rollback().await?;
            return Ok(outcome);
        }

        sqlx::query(
            r#"
            INSERT INTO payment_refunds (payment_id, amount, currency, reason)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&insert.payment_id)
        .bind(insert.amount)
        .bind(insert.currency)
        .bind(&insert.reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outcome)
    }
}

#[derive(Debug, Clone)]
pub struct GetRefunds {
    pub payment_id: String,
}

impl Processor<GetRefunds> for DatabaseProcessor {
    type Output = Vec<RefundRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetRefunds")]
    async fn process(&self, query: GetRefunds) -> Result<Vec<RefundRow>, sqlx::Error> {
        let rows = sqlx::query_as::<_, RefundRow>(
            r#"
            SELECT payment_id, amount, currency, reason, created_at
            FROM payment_refunds
            WHERE payment_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(&query.payment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Debug, Clone)]
/// One page of a user's payments, newest first.
pub struct ListUserPayments {
    pub user_id: String,
    pub offset: i64,
    pub limit: i64,
}

impl Processor<ListUserPayments> for DatabaseProcessor {
    type Output = Vec<PaymentRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListUserPayments")]
    async fn process(&self, query: ListUserPayments) -> Result<Vec<PaymentRow>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT payment_id, order_id, user_id, broker, amount, currency, operation, status, created_at
            FROM payments
            WHERE user_id = $1
            ORDER BY created_at DESC, payment_id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&query.user_id)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Debug, Clone)]
/// Payments that can still change, created before a cutoff. Deposits only
/// while recently updated. Open ones first, then oldest first.
pub struct ListUnsettledPayments {
    pub created_before: time::OffsetDateTime,
    pub deposited_after: time::OffsetDateTime,
    pub limit: i64,
}

impl Processor<ListUnsettledPayments> for DatabaseProcessor {
    type Output = Vec<PaymentRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListUnsettledPayments")]
    async fn process(&self, query: ListUnsettledPayments) -> Result<Vec<PaymentRow>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT payment_id, order_id, user_id, broker, amount, currency, operation, status, created_at
            FROM payments
            WHERE created_at < $1
              AND (
                status IN ('CREATED', 'AUTHORIZED', 'APPROVED')
                OR (status = 'DEPOSITED' AND updated_at > $2)
              )
            ORDER BY (status = 'DEPOSITED') ASC, created_at ASC
            LIMIT $3
            "#,
        )
        .bind(query.created_before)
        .bind(query.deposited_after)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PingDatabase;

impl Processor<PingDatabase> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:PingDatabase")]
    async fn process(&self, _: PingDatabase) -> Result<(), sqlx::Error> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

impl PaymentRow {
    /// Append a history entry within a transaction.
    pub async fn append_status_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        payment_id: &str,
        status: PaymentStatus,
    ) -> Result<StatusRecordRow, sqlx::Error> {
        sqlx::query_as::<_, StatusRecordRow>(
            r#"
            INSERT INTO payment_status_history (payment_id, status)
            VALUES ($1, $2)
            RETURNING payment_id, status, created_at
            "#,
        )
        .bind(payment_id)
        .bind(status)
        .fetch_one(&mut **tx)
        .await
    }

    /// Conditional status update plus history append, within a transaction.
    ///
    /// Legality of `expected -> next` is checked by the caller.
    pub async fn compare_and_set_status_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        payment_id: &str,
        expected: PaymentStatus,
        next: PaymentStatus,
    ) -> Result<StatusUpdateOutcome, sqlx::Error> {
        let updated = sqlx::query(
            r#"
            UPDATE payments
            SET status = $3, updated_at = now()
            WHERE payment_id = $1 AND status = $2
            "#,
        )
        .bind(payment_id)
        .bind(expected)
        .bind(next)
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 0 {
            let actual = sqlx::query_scalar::<_, PaymentStatus>(
                "SELECT status FROM payments WHERE payment_id = $1",
            )
            .bind(payment_id)
            .fetch_optional(&mut **tx)
            .await?;
            return Ok(StatusUpdateOutcome::Stale { actual });
        }

        let record = Self::append_status_tx(tx, payment_id, next).await?;
        Ok(StatusUpdateOutcome::Applied(record))
    }
}
