//! Error Types
//!
//! Build-time violations surface to the model author immediately and are not
//! catchable by runtime flows. Runtime failures are raised to the caller of
//! `react_to` as distinct, named variants - never silently swallowed. A
//! message that simply matches zero steps is NOT an error.

use std::sync::Arc;

use thiserror::Error;

use crate::message::ErrorEvent;

/// Violations detected while assembling a model.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A step, flow, actor or use case name is already taken.
    #[error("element already in model: `{0}`")]
    ElementAlreadyInModel(String),

    /// A named continuation or position target does not exist.
    #[error("no such element in model: `{0}`")]
    NoSuchElementInModel(String),
}

/// Failures raised by a running `ModelRunner`.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A step has no actors configured; detected when the active step set is
    /// computed at `run`.
    #[error("step `{step}` has no actors configured")]
    MissingActorPart { step: String },

    /// A matched step has no reaction configured.
    #[error("step `{step}` has no system reaction configured")]
    MissingSystemReaction { step: String },

    /// Two or more steps can react to the same message. Ambiguity is never
    /// silently resolved.
    #[error("more than one step can react: {}", steps.join(", "))]
    MoreThanOneStepCanReact { steps: Vec<String> },

    /// The bounded autonomous-reaction loop exceeded its repetition limit.
    #[error("autonomous reactions exceeded the repetition limit of {limit} (latest step: {})",
        latest_step.as_deref().unwrap_or("<none>"))]
    InfiniteRepetition {
        limit: usize,
        latest_step: Option<String>,
    },

    /// A continuation reaction named a step the running model does not have.
    #[error("no step named `{0}` in the running model")]
    NoSuchStep(String),

    /// The acting actor is unknown to the running model (or no model is
    /// bound yet).
    #[error("no actor named `{0}` in the running model")]
    NoSuchActor(String),

    /// A reaction failed and no step in the model handles the error.
    #[error("reaction of step `{step}` failed: {event}")]
    ReactionFailed {
        step: String,
        event: Arc<ErrorEvent>,
    },
}
