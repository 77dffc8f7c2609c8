//! Stagehand Runtime - Model Execution
//!
//! The runtime receives messages one at a time and decides, deterministically
//! and exactly once per message, which single step (if any) reacts - then
//! advances through autonomous reactions until nothing more can fire.
//!
//! Execution is single-threaded and synchronous. A [`ModelRunner`] is not
//! safe for concurrent use, but distinct runners are fully independent:
//! allocate one per logical session.

pub mod dispatch;
pub mod recording;
pub mod runner;

pub use recording::Recording;
pub use runner::{ModelRunner, StepToBeRun};

pub mod prelude {
    pub use crate::runner::{ModelRunner, StepToBeRun};
}
