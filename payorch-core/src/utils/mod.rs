pub mod failure_plan;

pub use failure_plan::FailurePlan;
