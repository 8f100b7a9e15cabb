//! Background processors.
//!
//! - `Reconciler`: periodically diffs unsettled local payments against the
//!   gateway and advances the ones the gateway has moved forward

pub mod reconciler;

pub use reconciler::{ReconcileError, ReconcileOutcome, ReconcileSummary, Reconciler, ReconcilerConfig};
