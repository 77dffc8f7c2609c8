//! Actor - Authorization Identity
//!
//! Actors carry no behavior of their own. A step lists the actors that may
//! trigger it; the runner filters its active step set against the acting
//! actor and the model's system actor.

/// Name of the distinguished actor that stands for "whoever drives the runner"
/// unless `as_actor` rebinds it.
pub const USER_ACTOR: &str = "user";

/// Name of the distinguished actor that triggers autonomous reactions.
pub const SYSTEM_ACTOR: &str = "system";

/// Index of an actor inside its owning [`Model`](crate::model::Model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorId(pub usize);

/// A named identity used purely for authorization filtering of steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
}

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
