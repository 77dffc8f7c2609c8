//! Stagehand facade crate.
//!
//! Re-exports core and runtime with a single entry point, and provides the
//! fluent [`ModelBuilder`] DSL that assembles [`Model`] values for the
//! runner. The builder has no runtime behavior of its own: it only produces
//! the data model the dispatch engine consumes.

pub use stagehand_core as core;
pub use stagehand_runtime as runtime;

pub mod builder;

pub use builder::{FlowBuilder, ModelBuilder, StepBuilder};
pub use stagehand_core::{
    Actor, Blackboard, BuildError, ErrorEvent, Message, Model, ModelOutline, Reaction,
    ReactionOutcome, RunnerError,
};
pub use stagehand_runtime::{ModelRunner, StepToBeRun};

pub mod prelude {
    pub use crate::builder::{FlowBuilder, ModelBuilder, StepBuilder};
    pub use stagehand_core::prelude::*;
    pub use stagehand_runtime::prelude::*;
}
