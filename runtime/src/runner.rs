//! ModelRunner - The Dispatch Loop
//!
//! The runner binds a [`Model`] and receives messages one at a time. For
//! each message it scans the active step set, enforces the at-most-one
//! invariant, runs the matched step's reaction, feeds published responses
//! back into dispatch, and finishes with autonomous ticks until nothing more
//! can fire.
//!
//! Failed reactions re-enter dispatch as [`ErrorEvent`] messages so a model
//! can declare recovery steps for concrete error types; an unhandled error
//! propagates to the caller of `react_to`.
//!
//! Runaway chains are cut by an explicit dispatch budget per external call,
//! reported as `RunnerError::InfiniteRepetition` - never a stack fault.

use std::sync::Arc;

use tracing::{debug, debug_span, trace};
use uuid::Uuid;

use stagehand_core::actor::ActorId;
use stagehand_core::flow::Flow;
use stagehand_core::message::{ErrorEvent, Message, MessageKind, TypeTag};
use stagehand_core::model::Model;
use stagehand_core::step::{Reaction, ReactionOutcome, ReactionResult, Step, StepId};
use stagehand_core::{Blackboard, RunnerError};

use crate::dispatch::{candidates, MatchContext};
use crate::recording::Recording;

/// Default dispatch budget per external `react_to`/`run` call.
const DEFAULT_REPETITION_LIMIT: usize = 256;

/// A matched step handed to the message-handler seam. The handler decides
/// when (or whether) to run the reaction.
pub struct StepToBeRun<'a> {
    step_name: &'a str,
    message: &'a Message,
    reaction: &'a Reaction,
    board: &'a mut Blackboard,
}

impl<'a> StepToBeRun<'a> {
    pub fn step_name(&self) -> &str {
        self.step_name
    }

    pub fn message(&self) -> &Message {
        self.message
    }

    pub fn board(&mut self) -> &mut Blackboard {
        self.board
    }

    /// Run the step's reaction.
    pub fn run(self) -> ReactionResult {
        self.reaction.react(self.board, self.message)
    }
}

type MessageHandler = Box<dyn FnMut(StepToBeRun<'_>) -> ReactionResult + Send>;
type UnhandledMessageHandler = Box<dyn FnMut(&Message) + Send>;
type ResponsePublisher = Box<dyn FnMut(Message) -> Option<Message> + Send>;

/// Result of dispatching one message.
enum Dispatch {
    /// No step matched. Normal, expected outcome - not an error.
    NoMatch,
    /// Exactly one step matched and its reaction ran.
    Matched { response: Option<Message> },
    /// Exactly one step matched and its reaction failed.
    Failed { step: String, event: Arc<ErrorEvent> },
}

/// Stateful execution engine for one session. Not safe for concurrent use;
/// distinct runners are fully independent.
pub struct ModelRunner {
    model: Option<Arc<Model>>,
    board: Blackboard,
    acting: Option<ActorId>,
    active: Vec<StepId>,
    latest_step: Option<StepId>,
    running: bool,
    without_alternatives: Option<StepId>,
    recording: Recording,
    repetition_limit: usize,
    run_id: Uuid,
    message_handler: Option<MessageHandler>,
    unhandled_handler: Option<UnhandledMessageHandler>,
    publisher: Option<ResponsePublisher>,
}

impl Default for ModelRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRunner {
    pub fn new() -> Self {
        Self {
            model: None,
            board: Blackboard::new(),
            acting: None,
            active: Vec::new(),
            latest_step: None,
            running: false,
            without_alternatives: None,
            recording: Recording::new(),
            repetition_limit: DEFAULT_REPETITION_LIMIT,
            run_id: Uuid::new_v4(),
            message_handler: None,
            unhandled_handler: None,
            publisher: None,
        }
    }

    /// Cap the number of dispatches (including autonomous ticks) one
    /// external call may trigger before `InfiniteRepetition` is raised.
    pub fn with_repetition_limit(mut self, limit: usize) -> Self {
        self.repetition_limit = limit.max(1);
        self
    }

    /// Wrap every reaction invocation. The handler receives the matched
    /// [`StepToBeRun`] and must call `run()` itself (or swallow it).
    pub fn handle_with(
        &mut self,
        handler: impl FnMut(StepToBeRun<'_>) -> ReactionResult + Send + 'static,
    ) -> &mut Self {
        self.message_handler = Some(Box::new(handler));
        self
    }

    /// Observe messages that matched zero steps. Never invoked for the
    /// internal tick.
    pub fn on_unhandled_message(&mut self, handler: impl FnMut(&Message) + Send + 'static) -> &mut Self {
        self.unhandled_handler = Some(Box::new(handler));
        self
    }

    /// Intercept published responses. Returning `Some(message)` feeds it
    /// back into dispatch (the default); returning `None` consumes it.
    pub fn publish_with(
        &mut self,
        publisher: impl FnMut(Message) -> Option<Message> + Send + 'static,
    ) -> &mut Self {
        self.publisher = Some(Box::new(publisher));
        self
    }

    /// Bind a model, rebind the acting actor to the model's user actor,
    /// compute the active step set, and settle autonomous reactions.
    ///
    /// Binding a different model clears the run position; re-running the
    /// already-bound model keeps it.
    pub fn run(&mut self, model: impl Into<Arc<Model>>) -> Result<(), RunnerError> {
        let model = model.into();
        // Ids recorded against a previous model do not index into this one.
        if self.model.as_ref().is_none_or(|bound| !Arc::ptr_eq(bound, &model)) {
            self.latest_step = None;
            self.without_alternatives = None;
        }
        self.acting = Some(model.user_actor());
        self.model = Some(model);
        self.recompute_active()?;
        self.running = true;

        let span = debug_span!("run", run = %self.run_id);
        let _guard = span.enter();
        let mut budget = self.repetition_limit;
        self.settle(&mut budget)
    }

    /// Rebind the acting actor and recompute the active step set. Does not
    /// reset the run position.
    pub fn as_actor(&mut self, name: &str) -> Result<&mut Self, RunnerError> {
        let acting = self
            .model
            .as_ref()
            .and_then(|model| model.actor_named(name))
            .ok_or_else(|| RunnerError::NoSuchActor(name.to_string()))?;
        self.acting = Some(acting);
        self.recompute_active()?;
        Ok(self)
    }

    /// React to one message, then settle autonomous reactions.
    pub fn react_to<T: Send + Sync + 'static>(&mut self, message: T) -> Result<(), RunnerError> {
        self.react_to_message(Message::new(message))
    }

    /// [`ModelRunner::react_to`] over a prebuilt envelope.
    pub fn react_to_message(&mut self, message: Message) -> Result<(), RunnerError> {
        if !self.running {
            return Ok(());
        }
        let span = debug_span!("react_to", run = %self.run_id, message = message.tag().name());
        let _guard = span.enter();

        let mut budget = self.repetition_limit;
        self.deliver(message, &mut budget)?;
        self.settle(&mut budget)
    }

    /// Can any step currently react to a message of type `T`?
    /// Side-effect-free.
    pub fn can_react_to<T: Send + Sync + 'static>(&self) -> bool {
        !self.steps_that_can_react_to::<T>().is_empty()
    }

    /// Names of the steps that could react to a message of type `T` right
    /// now, without advancing state. Covers signal steps and, when `T` is an
    /// error type, steps declared for that error.
    pub fn steps_that_can_react_to<T: Send + Sync + 'static>(&self) -> Vec<String> {
        let tag = TypeTag::of::<T>();
        let mut names = self.probe(MessageKind::Signal, tag);
        for name in self.probe(MessageKind::Error, tag) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stop reacting; `react_to` becomes a no-op until `run` is called again.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Clear the run position and run the bound model again. Recording
    /// buffers are untouched.
    pub fn restart(&mut self) -> Result<(), RunnerError> {
        let Some(model) = self.model.clone() else {
            return Ok(());
        };
        self.latest_step = None;
        self.without_alternatives = None;
        self.run(model)
    }

    /// The step that reacted most recently, if any.
    pub fn latest_step(&self) -> Option<&Step> {
        let model = self.model.as_ref()?;
        self.latest_step.map(|sid| model.step(sid))
    }

    /// The flow of the latest step, if it has one.
    pub fn latest_flow(&self) -> Option<&Flow> {
        let model = self.model.as_ref()?;
        let fid = self.latest_step.and_then(|sid| model.step(sid).flow())?;
        Some(model.flow(fid))
    }

    pub fn board(&self) -> &Blackboard {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut Blackboard {
        &mut self.board
    }

    pub fn start_recording(&mut self) -> &mut Self {
        self.recording.start();
        self
    }

    pub fn stop_recording(&mut self) -> &mut Self {
        self.recording.stop();
        self
    }

    pub fn recorded_step_names(&self) -> &[String] {
        self.recording.step_names()
    }

    pub fn recorded_messages(&self) -> &[Message] {
        self.recording.messages()
    }

    /// Active step set: steps whose actors intersect {acting, system}. A
    /// step with no actors at all is a configuration fault.
    fn recompute_active(&mut self) -> Result<(), RunnerError> {
        let Some(model) = &self.model else {
            return Ok(());
        };
        let system = model.system_actor();
        let acting = self.acting.unwrap_or(system);

        let mut active = Vec::new();
        for (sid, step) in model.steps() {
            if step.actors().is_empty() {
                return Err(RunnerError::MissingActorPart {
                    step: step.name().to_string(),
                });
            }
            if step.actors().iter().any(|&a| a == acting || a == system) {
                active.push(sid);
            }
        }
        self.active = active;
        Ok(())
    }

    /// Autonomous ticks until one matches nothing.
    fn settle(&mut self, budget: &mut usize) -> Result<(), RunnerError> {
        loop {
            if !self.deliver(Message::tick(), budget)? {
                return Ok(());
            }
        }
    }

    /// Dispatch one message and everything it causes: published responses
    /// re-enter dispatch, failed reactions re-enter as error events. Returns
    /// whether the *first* message matched a step.
    fn deliver(&mut self, first: Message, budget: &mut usize) -> Result<bool, RunnerError> {
        let mut matched_first = false;
        let mut is_first = true;
        // message plus the step whose failure produced it, if any
        let mut next: Option<(Message, Option<String>)> = Some((first, None));

        while let Some((message, origin)) = next.take() {
            if *budget == 0 {
                return Err(self.repetition_fault());
            }
            *budget -= 1;

            match self.dispatch_one(&message)? {
                Dispatch::NoMatch => {
                    if let Some(event) = message.error_event_arc() {
                        // No declared recovery step: the failure surfaces to
                        // the external caller. An error envelope without an
                        // originating step was injected from outside, e.g.
                        // through the publisher seam.
                        return Err(RunnerError::ReactionFailed {
                            step: origin.unwrap_or_else(|| String::from("<injected>")),
                            event,
                        });
                    }
                    if message.kind() == MessageKind::Signal
                        && let Some(handler) = &mut self.unhandled_handler
                    {
                        handler(&message);
                    }
                }
                Dispatch::Matched { response } => {
                    if is_first {
                        matched_first = true;
                    }
                    if let Some(response) = response {
                        let forwarded = match &mut self.publisher {
                            Some(publish) => publish(response),
                            None => Some(response),
                        };
                        next = forwarded.map(|message| (message, None));
                    }
                }
                Dispatch::Failed { step, event } => {
                    if is_first {
                        matched_first = true;
                    }
                    debug!(step = %step, error = %event, "reaction failed, re-dispatching as error event");
                    next = Some((Message::from_error_arc(event), Some(step)));
                }
            }
            is_first = false;
        }
        Ok(matched_first)
    }

    /// One matching cycle: candidate scan, cardinality check, reaction.
    fn dispatch_one(&mut self, message: &Message) -> Result<Dispatch, RunnerError> {
        let Some(model) = self.model.clone() else {
            return Ok(Dispatch::NoMatch);
        };

        let context = MatchContext {
            model: &model,
            active: &self.active,
            latest_step: self.latest_step,
            latest_flow: self.latest_step.and_then(|sid| model.step(sid).flow()),
            board: &self.board,
            without_alternatives: self.without_alternatives,
        };
        let mut found = candidates(&context, message.kind(), message.tag());

        let sid = match found.len() {
            0 => {
                trace!(message = message.tag().name(), "no step reacts");
                return Ok(Dispatch::NoMatch);
            }
            1 => found.remove(0),
            _ => {
                return Err(RunnerError::MoreThanOneStepCanReact {
                    steps: found
                        .into_iter()
                        .map(|sid| model.step(sid).name().to_string())
                        .collect(),
                });
            }
        };

        let step = model.step(sid);
        let reaction = step
            .reaction()
            .cloned()
            .ok_or_else(|| RunnerError::MissingSystemReaction {
                step: step.name().to_string(),
            })?;

        self.latest_step = Some(sid);
        self.without_alternatives = None;
        self.recording.record(step.name(), message);
        debug!(step = step.name(), message = message.tag().name(), "step reacts");

        let to_be_run = StepToBeRun {
            step_name: step.name(),
            message,
            reaction: &reaction,
            board: &mut self.board,
        };
        let result = match &mut self.message_handler {
            Some(handler) => handler(to_be_run),
            None => to_be_run.run(),
        };

        match result {
            Ok(ReactionOutcome::Done) => Ok(Dispatch::Matched { response: None }),
            Ok(ReactionOutcome::Publish(response)) => Ok(Dispatch::Matched {
                response: Some(response),
            }),
            Ok(ReactionOutcome::ContinueAfter(name)) => {
                let (target, _) = self.resolve_step(&model, &name)?;
                self.latest_step = Some(target);
                Ok(Dispatch::Matched { response: None })
            }
            Ok(ReactionOutcome::ContinueAt(name)) => {
                let (_, target_step) = self.resolve_step(&model, &name)?;
                self.latest_step = target_step.previous_in_flow();
                Ok(Dispatch::Matched { response: None })
            }
            Ok(ReactionOutcome::ContinueAtWithoutAlternatives(name)) => {
                let (target, target_step) = self.resolve_step(&model, &name)?;
                self.latest_step = target_step.previous_in_flow();
                self.without_alternatives = Some(target);
                Ok(Dispatch::Matched { response: None })
            }
            Err(event) => Ok(Dispatch::Failed {
                step: step.name().to_string(),
                event: Arc::new(event),
            }),
        }
    }

    fn resolve_step<'m>(
        &self,
        model: &'m Model,
        name: &str,
    ) -> Result<(StepId, &'m Step), RunnerError> {
        model
            .step_named(name)
            .ok_or_else(|| RunnerError::NoSuchStep(name.to_string()))
    }

    fn probe(&self, kind: MessageKind, tag: TypeTag) -> Vec<String> {
        let Some(model) = &self.model else {
            return Vec::new();
        };
        if !self.running {
            return Vec::new();
        }
        let context = MatchContext {
            model,
            active: &self.active,
            latest_step: self.latest_step,
            latest_flow: self.latest_step.and_then(|sid| model.step(sid).flow()),
            board: &self.board,
            without_alternatives: self.without_alternatives,
        };
        candidates(&context, kind, tag)
            .into_iter()
            .map(|sid| model.step(sid).name().to_string())
            .collect()
    }

    fn repetition_fault(&self) -> RunnerError {
        RunnerError::InfiniteRepetition {
            limit: self.repetition_limit,
            latest_step: self.latest_step().map(|step| step.name().to_string()),
        }
    }
}

impl std::fmt::Debug for ModelRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRunner")
            .field("run_id", &self.run_id)
            .field("running", &self.running)
            .field("latest_step", &self.latest_step)
            .field("active_steps", &self.active.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_core::actor::{Actor, SYSTEM_ACTOR, USER_ACTOR};
    use stagehand_core::model::ModelParts;
    use stagehand_core::step::{condition, Selector, StepKind};
    use stagehand_core::SubtypeRegistry;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn model_with(step: Step) -> Model {
        Model::from_parts(ModelParts {
            actors: vec![Actor::new(USER_ACTOR), Actor::new(SYSTEM_ACTOR)],
            use_cases: vec![],
            flows: vec![],
            steps: vec![step],
            subtypes: SubtypeRegistry::new(),
        })
        .expect("valid model")
    }

    #[test]
    fn an_unbound_runner_ignores_messages() {
        let mut runner = ModelRunner::new();

        assert!(runner.react_to(1u8).is_ok());
        assert!(runner.latest_step().is_none());
        assert!(runner.steps_that_can_react_to::<u8>().is_empty());
    }

    #[test]
    fn a_step_without_actors_fails_at_run() {
        init_tracing();
        let step = Step::new("orphan", StepKind::Flowless, Selector::Autonomous)
            .with_reaction(Reaction::runs(|_| {}));

        let mut runner = ModelRunner::new();
        assert!(matches!(
            runner.run(model_with(step)),
            Err(RunnerError::MissingActorPart { step }) if step == "orphan"
        ));
    }

    #[test]
    fn a_matched_step_without_a_reaction_fails() {
        init_tracing();
        let step = Step::new("mute", StepKind::Flowless, Selector::Autonomous)
            .with_actors(vec![ActorId(1)]);

        let mut runner = ModelRunner::new();
        assert!(matches!(
            runner.run(model_with(step)),
            Err(RunnerError::MissingSystemReaction { step }) if step == "mute"
        ));
    }

    #[test]
    fn a_tautological_condition_is_cut_by_the_repetition_limit() {
        init_tracing();
        let step = Step::new("spin", StepKind::Flowless, Selector::Autonomous)
            .with_condition(condition(|_| true))
            .with_reaction(Reaction::runs(|_| {}))
            .with_actors(vec![ActorId(1)]);

        let mut runner = ModelRunner::new().with_repetition_limit(8);
        match runner.run(model_with(step)) {
            Err(RunnerError::InfiniteRepetition { limit, latest_step }) => {
                assert_eq!(limit, 8);
                assert_eq!(latest_step.as_deref(), Some("spin"));
            }
            other => panic!("expected repetition fault, got {other:?}"),
        }
    }
}
