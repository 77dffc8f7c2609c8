//! Step - The Atomic Unit of Behavior
//!
//! A step is a guarded, typed reaction to a message: it names the actors
//! that may trigger it, the message type it reacts to ([`Selector`]), an
//! optional boolean guard ([`Condition`]), and the [`Reaction`] that runs
//! when it matches.
//!
//! Reactions return control flow as data ([`ReactionOutcome`]) instead of
//! reaching back into the runner: publish a response, jump the run position,
//! or just finish.

use std::sync::Arc;

use crate::actor::ActorId;
use crate::blackboard::Blackboard;
use crate::flow::{FlowId, Position};
use crate::message::{ErrorEvent, Message, PayloadMismatch, TypeTag};

/// Index of a step inside its owning [`Model`](crate::model::Model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepId(pub usize);

/// The closed set of step variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Default continuation in its flow's sequence. Reachable after its
    /// predecessor, and only while no `Interrupting` step can react to the
    /// same message.
    Interruptable,
    /// Explicitly positioned alternative-flow entry. Takes priority over any
    /// `Interruptable` step reachable for the same message.
    Interrupting,
    /// No flow membership; reachable purely via its own condition.
    Flowless,
}

/// What a step reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// An ordinary message whose runtime tag is the declared tag or a
    /// registered subtype of it.
    Signal(TypeTag),
    /// An [`ErrorEvent`] whose original error tag matches the declared tag.
    Error(TypeTag),
    /// No declared message type: reacts to the internal autonomous tick.
    Autonomous,
}

/// A boolean guard over the session's working state.
pub type Condition = Arc<dyn Fn(&Blackboard) -> bool + Send + Sync>;

/// Build a [`Condition`] from a closure.
pub fn condition(f: impl Fn(&Blackboard) -> bool + Send + Sync + 'static) -> Condition {
    Arc::new(f)
}

/// What a reaction asks the runner to do next.
#[derive(Debug)]
pub enum ReactionOutcome {
    /// Nothing further; autonomous reactions may still follow.
    Done,
    /// Hand this message to the response publisher (by default it re-enters
    /// dispatch, enabling chained steps).
    Publish(Message),
    /// Set the run position to the named step, as if it had just reacted.
    ContinueAfter(String),
    /// Rewind the run position to just before the named step so normal
    /// matching re-evaluates it, letting its alternatives preempt it.
    ContinueAt(String),
    /// Like `ContinueAt`, but steps positioned instead-of the named step are
    /// disabled for exactly the next matching cycle.
    ContinueAtWithoutAlternatives(String),
}

pub type ReactionResult = Result<ReactionOutcome, ErrorEvent>;

type ReactionFn = Arc<dyn Fn(&mut Blackboard, &Message) -> ReactionResult + Send + Sync>;

/// The function executed when a step matches.
///
/// Constructors cover the three reaction shapes the engine knows: consume a
/// message, consume and respond, or produce a response from no input - each
/// in an infallible and a fallible (`try_`) variant. Failures are wrapped
/// into an [`ErrorEvent`] tagged with the concrete error type, which then
/// re-enters dispatch as a message.
#[derive(Clone)]
pub struct Reaction {
    f: ReactionFn,
}

impl Reaction {
    /// A reaction over the raw envelope. The escape hatch the typed
    /// constructors are built on.
    pub fn from_fn(f: impl Fn(&mut Blackboard, &Message) -> ReactionResult + Send + Sync + 'static) -> Self {
        Self { f: Arc::new(f) }
    }

    /// Consume a message of type `T`, producing nothing.
    pub fn consumes<T: Send + Sync + 'static>(
        f: impl Fn(&mut Blackboard, &T) + Send + Sync + 'static,
    ) -> Self {
        Self::from_fn(move |board, msg| {
            f(board, expect_payload::<T>(msg)?);
            Ok(ReactionOutcome::Done)
        })
    }

    /// Fallible variant of [`Reaction::consumes`].
    pub fn try_consumes<T, E>(
        f: impl Fn(&mut Blackboard, &T) -> Result<(), E> + Send + Sync + 'static,
    ) -> Self
    where
        T: Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::from_fn(move |board, msg| {
            f(board, expect_payload::<T>(msg)?).map_err(ErrorEvent::new)?;
            Ok(ReactionOutcome::Done)
        })
    }

    /// Consume a message of type `T` and publish the returned response.
    pub fn responds<T, R>(f: impl Fn(&mut Blackboard, &T) -> R + Send + Sync + 'static) -> Self
    where
        T: Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        Self::from_fn(move |board, msg| {
            let response = f(board, expect_payload::<T>(msg)?);
            Ok(ReactionOutcome::Publish(Message::new(response)))
        })
    }

    /// Fallible variant of [`Reaction::responds`].
    pub fn try_responds<T, R, E>(
        f: impl Fn(&mut Blackboard, &T) -> Result<R, E> + Send + Sync + 'static,
    ) -> Self
    where
        T: Send + Sync + 'static,
        R: Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::from_fn(move |board, msg| {
            let response = f(board, expect_payload::<T>(msg)?).map_err(ErrorEvent::new)?;
            Ok(ReactionOutcome::Publish(Message::new(response)))
        })
    }

    /// Produce a response with no input (autonomous reaction).
    pub fn supplies<R>(f: impl Fn(&mut Blackboard) -> R + Send + Sync + 'static) -> Self
    where
        R: Send + Sync + 'static,
    {
        Self::from_fn(move |board, _msg| Ok(ReactionOutcome::Publish(Message::new(f(board)))))
    }

    /// Fallible variant of [`Reaction::supplies`].
    pub fn try_supplies<R, E>(
        f: impl Fn(&mut Blackboard) -> Result<R, E> + Send + Sync + 'static,
    ) -> Self
    where
        R: Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::from_fn(move |board, _msg| {
            let response = f(board).map_err(ErrorEvent::new)?;
            Ok(ReactionOutcome::Publish(Message::new(response)))
        })
    }

    /// Run with no input and no response (autonomous side effect).
    pub fn runs(f: impl Fn(&mut Blackboard) + Send + Sync + 'static) -> Self {
        Self::from_fn(move |board, _msg| {
            f(board);
            Ok(ReactionOutcome::Done)
        })
    }

    /// Fallible variant of [`Reaction::runs`].
    pub fn try_runs<E>(f: impl Fn(&mut Blackboard) -> Result<(), E> + Send + Sync + 'static) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::from_fn(move |board, _msg| {
            f(board).map_err(ErrorEvent::new)?;
            Ok(ReactionOutcome::Done)
        })
    }

    /// Handle the [`ErrorEvent`] of a failed reaction.
    pub fn handles(f: impl Fn(&mut Blackboard, &ErrorEvent) + Send + Sync + 'static) -> Self {
        Self::from_fn(move |board, msg| {
            if let Some(event) = msg.error_event() {
                f(board, event);
            }
            Ok(ReactionOutcome::Done)
        })
    }

    /// Jump the run position to directly after the named step.
    pub fn continues_after(step: impl Into<String>) -> Self {
        let step = step.into();
        Self::from_fn(move |_board, _msg| Ok(ReactionOutcome::ContinueAfter(step.clone())))
    }

    /// Rewind the run position so the named step (and its alternatives) are
    /// re-evaluated by normal matching.
    pub fn continues_at(step: impl Into<String>) -> Self {
        let step = step.into();
        Self::from_fn(move |_board, _msg| Ok(ReactionOutcome::ContinueAt(step.clone())))
    }

    /// Like [`Reaction::continues_at`], disabling the named step's
    /// instead-of alternatives for the next matching cycle.
    pub fn continues_without_alternatives_at(step: impl Into<String>) -> Self {
        let step = step.into();
        Self::from_fn(move |_board, _msg| {
            Ok(ReactionOutcome::ContinueAtWithoutAlternatives(step.clone()))
        })
    }

    pub fn react(&self, board: &mut Blackboard, msg: &Message) -> ReactionResult {
        (self.f)(board, msg)
    }
}

fn expect_payload<'m, T: Send + Sync + 'static>(msg: &'m Message) -> Result<&'m T, ErrorEvent> {
    msg.downcast_ref::<T>().ok_or_else(|| {
        ErrorEvent::new(PayloadMismatch {
            expected: TypeTag::of::<T>().name(),
            actual: msg.tag().name(),
        })
    })
}

/// One step of a behavior model. Immutable once the model is built.
#[derive(Clone)]
pub struct Step {
    name: String,
    kind: StepKind,
    selector: Selector,
    flow: Option<FlowId>,
    previous_in_flow: Option<StepId>,
    position: Option<Position>,
    condition: Option<Condition>,
    react_while: Option<Condition>,
    actors: Vec<ActorId>,
    reaction: Option<Reaction>,
    publish_to: Option<ActorId>,
}

impl Step {
    pub fn new(name: impl Into<String>, kind: StepKind, selector: Selector) -> Self {
        Self {
            name: name.into(),
            kind,
            selector,
            flow: None,
            previous_in_flow: None,
            position: None,
            condition: None,
            react_while: None,
            actors: Vec::new(),
            reaction: None,
            publish_to: None,
        }
    }

    pub fn with_flow(mut self, flow: FlowId, previous: Option<StepId>) -> Self {
        self.flow = Some(flow);
        self.previous_in_flow = previous;
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_react_while(mut self, condition: Condition) -> Self {
        self.react_while = Some(condition);
        self
    }

    pub fn with_actors(mut self, actors: Vec<ActorId>) -> Self {
        self.actors = actors;
        self
    }

    pub fn with_reaction(mut self, reaction: Reaction) -> Self {
        self.reaction = Some(reaction);
        self
    }

    pub fn with_publish_to(mut self, actor: ActorId) -> Self {
        self.publish_to = Some(actor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn selector(&self) -> Selector {
        self.selector
    }

    pub fn flow(&self) -> Option<FlowId> {
        self.flow
    }

    /// The step preceding this one in its flow; `None` for a flow's first
    /// step. Resolved once at build time.
    pub fn previous_in_flow(&self) -> Option<StepId> {
        self.previous_in_flow
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn react_while(&self) -> Option<&Condition> {
        self.react_while.as_ref()
    }

    pub fn actors(&self) -> &[ActorId] {
        &self.actors
    }

    pub fn reaction(&self) -> Option<&Reaction> {
        self.reaction.as_ref()
    }

    pub fn publish_to(&self) -> Option<ActorId> {
        self.publish_to
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("selector", &self.selector)
            .field("flow", &self.flow)
            .field("has_condition", &self.condition.is_some())
            .field("has_reaction", &self.reaction.is_some())
            .finish()
    }
}
