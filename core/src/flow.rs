//! Flow - Ordered Step Sequences and the Position Algebra
//!
//! A flow is a named, ordered sequence of steps sharing one use case. Its
//! optional entry predicate becomes the [`Position`] of its first step.
//!
//! A `Position` is a pure boolean function over the runner's history: given
//! the latest step that reacted, is this step currently reachable? The
//! algebra is small and closed:
//! - `After(None)`   - nothing has run yet
//! - `After(step)`   - the named step reacted last
//! - `InsteadOf(s)`  - reachable exactly where `s` would be, replacing it
//! - `Anytime`       - regardless of history
//! - an optional `when` condition conjoined with any of the above

use crate::blackboard::Blackboard;
use crate::model::{Model, UseCaseId};
use crate::step::{Condition, StepId};

/// Index of a flow inside its owning [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowId(pub usize);

/// A named, ordered sequence of steps.
#[derive(Debug, Clone)]
pub struct Flow {
    pub name: String,
    pub use_case: Option<UseCaseId>,
    pub steps: Vec<StepId>,
}

impl Flow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            use_case: None,
            steps: Vec::new(),
        }
    }

    pub fn with_use_case(mut self, use_case: UseCaseId) -> Self {
        self.use_case = Some(use_case);
        self
    }

    pub fn with_steps(mut self, steps: Vec<StepId>) -> Self {
        self.steps = steps;
        self
    }
}

/// The place part of a position predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPosition {
    /// True iff the latest step equals the given one; `After(None)` matches
    /// only before anything has run.
    After(Option<StepId>),
    /// True exactly where the target step would be reachable, i.e.
    /// `After(previous-in-flow-of(target))`. Lets an alternative flow fully
    /// replace the target rather than follow it.
    InsteadOf(StepId),
    /// Always true; the flow may start regardless of history.
    Anytime,
}

/// A flow-position predicate: a place plus an optional `when` condition.
#[derive(Clone)]
pub struct Position {
    place: FlowPosition,
    when: Option<Condition>,
}

impl Position {
    pub fn after(step: Option<StepId>) -> Self {
        Self {
            place: FlowPosition::After(step),
            when: None,
        }
    }

    pub fn instead_of(step: StepId) -> Self {
        Self {
            place: FlowPosition::InsteadOf(step),
            when: None,
        }
    }

    pub fn anytime() -> Self {
        Self {
            place: FlowPosition::Anytime,
            when: None,
        }
    }

    /// Conjoin a caller-supplied condition.
    pub fn with_when(mut self, when: Condition) -> Self {
        self.when = Some(when);
        self
    }

    pub fn place(&self) -> FlowPosition {
        self.place
    }

    /// Pure evaluation against runner history. The "not already inside this
    /// flow" guard for interrupting steps is applied by the runner, not here.
    pub fn holds(&self, model: &Model, latest_step: Option<StepId>, board: &Blackboard) -> bool {
        let place_holds = match self.place {
            FlowPosition::After(step) => latest_step == step,
            FlowPosition::InsteadOf(target) => latest_step == model.step(target).previous_in_flow(),
            FlowPosition::Anytime => true,
        };
        place_holds && self.when.as_ref().is_none_or(|when| when(board))
    }
}

impl std::fmt::Debug for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Position")
            .field("place", &self.place)
            .field("has_when", &self.when.is_some())
            .finish()
    }
}
