//! Stagehand Core - Behavior Model Entities
//!
//! This crate defines the **structural** half of Stagehand:
//! - `Model`, `Actor`, `Flow`, `Step`: the immutable-after-build behavior graph
//! - `Position`: the flow-position predicate algebra ("is this step reachable now?")
//! - `Message` / `ErrorEvent`: the tagged envelopes the runner dispatches on
//! - `Blackboard`: type-safe working state shared by step reactions
//!
//! **IMPORTANT**: This layer is Pure Rust - no IO, no Async. Execution lives
//! in `stagehand-runtime`.

pub mod actor;
pub mod blackboard;
pub mod error;
pub mod flow;
pub mod message;
pub mod model;
pub mod outline;
pub mod step;
pub mod subtype;

pub use actor::{Actor, ActorId, SYSTEM_ACTOR, USER_ACTOR};
pub use blackboard::Blackboard;
pub use error::{BuildError, RunnerError};
pub use flow::{Flow, FlowId, FlowPosition, Position};
pub use message::{ErrorEvent, Message, MessageKind, PayloadMismatch, TypeTag};
pub use model::{Model, ModelParts, UseCase, UseCaseId};
pub use outline::ModelOutline;
pub use step::{Condition, Reaction, ReactionOutcome, ReactionResult, Selector, Step, StepId, StepKind};
pub use subtype::SubtypeRegistry;

pub mod prelude {
    pub use crate::actor::{Actor, ActorId};
    pub use crate::blackboard::Blackboard;
    pub use crate::error::{BuildError, RunnerError};
    pub use crate::flow::{Flow, FlowId, FlowPosition, Position};
    pub use crate::message::{ErrorEvent, Message, MessageKind, TypeTag};
    pub use crate::model::{Model, ModelParts, UseCase, UseCaseId};
    pub use crate::step::{
        Condition, Reaction, ReactionOutcome, ReactionResult, Selector, Step, StepId, StepKind,
    };
    pub use crate::subtype::SubtypeRegistry;
}
