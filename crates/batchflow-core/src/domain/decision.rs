//! Decision model: what a workflow does once a stage reports `next`.

/// The next action for a staged task whose current stage succeeded.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Build the next stage.
    Advance,
    /// Run the final derivation and finish as `done`.
    Complete,
    /// Iteration limit reached without convergence.
    MaxIteration,
    /// Results are unusable; finish as `terminate`.
    Terminate { reason: String },
}
