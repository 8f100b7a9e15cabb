//! Request and response types of the payments API.
//!
//! These are plain serde types without any database or gateway concerns,
//! so they can be shared by the server and by its clients.

pub mod payment;
pub mod requests;
pub mod responses;

pub use payment::{CurrencyCode, PaymentOperation, PaymentStatus};
pub use requests::{AmountRequest, CreatePaymentRequest, ListPaymentsQuery, RefundPaymentRequest};
pub use responses::{
    CreatePaymentResponse, DependencyStatus, ErrorResponse, HealthResponse, PaymentResponse,
    PaymentsListResponse, StatusResponse,
};
