/// Failure injection for the in-memory port implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePlan {
    #[default]
    Never,
    /// Fail the next `n` calls, then succeed.
    Times(u32),
    Always,
}

impl FailurePlan {
    /// Returns whether the current call should fail, consuming one planned
    /// failure.
    pub fn trip(&mut self) -> bool {
        match self {
            FailurePlan::Never => false,
            FailurePlan::Always => true,
            FailurePlan::Times(0) => {
                *self = FailurePlan::Never;
                false
            }
            FailurePlan::Times(n) => {
                *n -= 1;
                true
            }
        }
    }
}
