//! ModelBuilder - Fluent Assembly of Behavior Models
//!
//! The builder records drafts and resolves them once at [`ModelBuilder::build`]:
//! forward references ("instead of step X" naming a step declared later) are
//! legal until then. Violations are collected as they happen and the first
//! one is reported at build time.
//!
//! ```
//! use stagehand_kit::ModelBuilder;
//!
//! struct EntersText(String);
//!
//! let mut builder = ModelBuilder::new();
//! builder
//!     .flow("greeting")
//!     .step("S1")
//!     .user::<EntersText>()
//!     .system(|_, text: &EntersText| println!("you said: {}", text.0));
//! let model = builder.build().unwrap();
//! ```

use ahash::AHashMap;

use stagehand_core::actor::{Actor, ActorId, SYSTEM_ACTOR, USER_ACTOR};
use stagehand_core::flow::{Flow, FlowId, Position};
use stagehand_core::message::{ErrorEvent, TypeTag};
use stagehand_core::model::{Model, ModelParts, UseCase};
use stagehand_core::step::{condition, Condition, Reaction, Selector, Step, StepId, StepKind};
use stagehand_core::{Blackboard, BuildError, SubtypeRegistry};

#[derive(Debug, Clone)]
enum PlaceDraft {
    After(String),
    InsteadOf(String),
    Anytime,
}

#[derive(Default)]
struct EntryDraft {
    place: Option<PlaceDraft>,
    when: Option<Condition>,
}

struct FlowDraft {
    name: String,
    use_case: Option<usize>,
    entry: Option<EntryDraft>,
    steps: Vec<usize>,
}

struct StepDraft {
    name: String,
    flow: Option<usize>,
    selector: Selector,
    condition: Option<Condition>,
    react_while: Option<Condition>,
    actors: Vec<String>,
    reaction: Option<Reaction>,
    publish_to: Option<String>,
    continuation: Option<String>,
}

/// Accumulates model drafts; [`ModelBuilder::build`] resolves and validates
/// them into an immutable [`Model`].
#[derive(Default)]
pub struct ModelBuilder {
    actors: Vec<String>,
    use_cases: Vec<String>,
    use_case_index: AHashMap<String, usize>,
    flows: Vec<FlowDraft>,
    steps: Vec<StepDraft>,
    step_index: AHashMap<String, usize>,
    subtypes: SubtypeRegistry,
    error: Option<BuildError>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self {
            actors: vec![USER_ACTOR.to_string(), SYSTEM_ACTOR.to_string()],
            ..Self::default()
        }
    }

    fn fail(&mut self, error: BuildError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Declare an actor. The distinguished `user` and `system` actors are
    /// always present and need not be declared.
    pub fn actor(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if self.actors.contains(&name) {
            self.fail(BuildError::ElementAlreadyInModel(name));
        } else {
            self.actors.push(name);
        }
        self
    }

    /// Declare `Super` a supertype of `Sub` for message matching.
    pub fn subtype<Sub: 'static, Super: 'static>(&mut self) -> &mut Self {
        self.subtypes.register::<Sub, Super>();
        self
    }

    /// Declare a use case grouping flows.
    pub fn use_case(&mut self, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        if self.use_case_index.contains_key(&name) {
            self.fail(BuildError::ElementAlreadyInModel(name));
        } else {
            self.use_case_index.insert(name.clone(), self.use_cases.len());
            self.use_cases.push(name);
        }
        self
    }

    /// Open a new flow. Without an entry position its first step continues
    /// from the very start of the run; with `.after`/`.instead_of`/
    /// `.anytime`/`.when` the first step becomes an interrupting
    /// alternative-flow entry.
    pub fn flow(&mut self, name: impl Into<String>) -> FlowBuilder<'_> {
        let name = name.into();
        if self.flows.iter().any(|f| f.name == name) {
            self.fail(BuildError::ElementAlreadyInModel(name.clone()));
        }
        let ix = self.flows.len();
        self.flows.push(FlowDraft {
            name,
            use_case: None,
            entry: None,
            steps: Vec::new(),
        });
        FlowBuilder { owner: self, flow: ix }
    }

    /// Declare a step with no flow membership, reachable purely via its own
    /// condition.
    pub fn flowless_step(&mut self, name: impl Into<String>) -> StepBuilder<'_> {
        self.new_step(name.into(), None)
    }

    fn new_step(&mut self, name: String, flow: Option<usize>) -> StepBuilder<'_> {
        if self.step_index.contains_key(&name) {
            self.fail(BuildError::ElementAlreadyInModel(name.clone()));
        }
        let ix = self.steps.len();
        self.step_index.insert(name.clone(), ix);
        if let Some(flow_ix) = flow {
            self.flows[flow_ix].steps.push(ix);
        }
        self.steps.push(StepDraft {
            name,
            flow,
            selector: Selector::Autonomous,
            condition: None,
            react_while: None,
            actors: Vec::new(),
            reaction: None,
            publish_to: None,
            continuation: None,
        });
        StepBuilder { owner: self, step: ix, flow }
    }

    fn resolve_step_name(&self, name: &str) -> Result<StepId, BuildError> {
        self.step_index
            .get(name)
            .map(|&ix| StepId(ix))
            .ok_or_else(|| BuildError::NoSuchElementInModel(name.to_string()))
    }

    fn resolve_actor(index: &AHashMap<String, ActorId>, name: &str) -> Result<ActorId, BuildError> {
        index
            .get(name)
            .copied()
            .ok_or_else(|| BuildError::NoSuchElementInModel(name.to_string()))
    }

    /// Resolve all drafts and validate the assembled model.
    pub fn build(self) -> Result<Model, BuildError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let actors: Vec<Actor> = self.actors.iter().map(Actor::new).collect();
        let actor_index: AHashMap<String, ActorId> = self
            .actors
            .iter()
            .enumerate()
            .map(|(ix, name)| (name.clone(), ActorId(ix)))
            .collect();

        // Flow membership metadata per step: (kind, previous, position).
        let mut placements: Vec<(StepKind, Option<StepId>, Option<Position>)> =
            vec![(StepKind::Flowless, None, None); self.steps.len()];

        for flow in &self.flows {
            let mut previous: Option<StepId> = None;
            for (ordinal, &step_ix) in flow.steps.iter().enumerate() {
                let placement = if ordinal == 0 {
                    match &flow.entry {
                        Some(entry) => {
                            let place = match &entry.place {
                                Some(PlaceDraft::After(target)) => {
                                    Position::after(Some(self.resolve_step_name(target)?))
                                }
                                Some(PlaceDraft::InsteadOf(target)) => {
                                    Position::instead_of(self.resolve_step_name(target)?)
                                }
                                Some(PlaceDraft::Anytime) | None => Position::anytime(),
                            };
                            let place = match &entry.when {
                                Some(when) => place.with_when(when.clone()),
                                None => place,
                            };
                            (StepKind::Interrupting, None, Some(place))
                        }
                        None => (StepKind::Interruptable, None, Some(Position::after(None))),
                    }
                } else {
                    (
                        StepKind::Interruptable,
                        previous,
                        Some(Position::after(previous)),
                    )
                };
                placements[step_ix] = placement;
                previous = Some(StepId(step_ix));
            }
        }

        let mut steps = Vec::with_capacity(self.steps.len());
        for (ix, draft) in self.steps.into_iter().enumerate() {
            if let Some(target) = &draft.continuation
                && !self.step_index.contains_key(target)
            {
                return Err(BuildError::NoSuchElementInModel(target.clone()));
            }

            let (kind, previous, position) = placements[ix].clone();
            let mut step = Step::new(draft.name, kind, draft.selector);
            if let Some(flow_ix) = draft.flow {
                step = step.with_flow(FlowId(flow_ix), previous);
            }
            if let Some(position) = position {
                step = step.with_position(position);
            }
            if let Some(condition) = draft.condition {
                step = step.with_condition(condition);
            }
            if let Some(react_while) = draft.react_while {
                step = step.with_react_while(react_while);
            }
            if let Some(reaction) = draft.reaction {
                step = step.with_reaction(reaction);
            }
            if let Some(recipient) = draft.publish_to {
                step = step.with_publish_to(Self::resolve_actor(&actor_index, &recipient)?);
            }

            let actor_ids = if draft.actors.is_empty() {
                // Signal steps default to the user actor; autonomous and
                // error steps belong to the system actor.
                let default = match draft.selector {
                    Selector::Signal(_) => USER_ACTOR,
                    Selector::Error(_) | Selector::Autonomous => SYSTEM_ACTOR,
                };
                vec![Self::resolve_actor(&actor_index, default)?]
            } else {
                draft
                    .actors
                    .iter()
                    .map(|name| Self::resolve_actor(&actor_index, name))
                    .collect::<Result<_, _>>()?
            };
            steps.push(step.with_actors(actor_ids));
        }

        let flows = self
            .flows
            .into_iter()
            .map(|draft| {
                let mut flow = Flow::new(draft.name)
                    .with_steps(draft.steps.into_iter().map(StepId).collect());
                if let Some(uc) = draft.use_case {
                    flow = flow.with_use_case(stagehand_core::UseCaseId(uc));
                }
                flow
            })
            .collect();

        Model::from_parts(ModelParts {
            actors,
            use_cases: self.use_cases.into_iter().map(UseCase::new).collect(),
            flows,
            steps,
            subtypes: self.subtypes,
        })
    }
}

/// Builder for one flow: entry position, then steps in sequence.
pub struct FlowBuilder<'a> {
    owner: &'a mut ModelBuilder,
    flow: usize,
}

impl<'a> FlowBuilder<'a> {
    /// Attach this flow to a previously declared use case.
    pub fn in_use_case(self, name: &str) -> Self {
        match self.owner.use_case_index.get(name).copied() {
            Some(ix) => self.owner.flows[self.flow].use_case = Some(ix),
            None => self
                .owner
                .fail(BuildError::NoSuchElementInModel(name.to_string())),
        }
        self
    }

    fn entry(&mut self) -> &mut EntryDraft {
        self.owner.flows[self.flow].entry.get_or_insert_default()
    }

    /// Enter this flow after the named step has reacted.
    pub fn after(mut self, step: impl Into<String>) -> Self {
        self.entry().place = Some(PlaceDraft::After(step.into()));
        self
    }

    /// Enter this flow exactly where the named step would react, replacing it.
    pub fn instead_of(mut self, step: impl Into<String>) -> Self {
        self.entry().place = Some(PlaceDraft::InsteadOf(step.into()));
        self
    }

    /// Enter this flow regardless of history.
    pub fn anytime(mut self) -> Self {
        self.entry().place = Some(PlaceDraft::Anytime);
        self
    }

    /// Conjoin a condition with the entry position (defaults to `anytime`
    /// when no place is given).
    pub fn when(mut self, when: impl Fn(&Blackboard) -> bool + Send + Sync + 'static) -> Self {
        self.entry().when = Some(condition(when));
        self
    }

    /// Open the next step of this flow.
    pub fn step(self, name: impl Into<String>) -> StepBuilder<'a> {
        let flow = self.flow;
        self.owner.new_step(name.into(), Some(flow))
    }
}

/// Builder for one step. `step(..)` opens the next step in the same flow.
pub struct StepBuilder<'a> {
    owner: &'a mut ModelBuilder,
    step: usize,
    flow: Option<usize>,
}

impl<'a> StepBuilder<'a> {
    fn draft(&mut self) -> &mut StepDraft {
        &mut self.owner.steps[self.step]
    }

    /// React to messages of type `T` supplied by the user actor.
    pub fn user<T: Send + Sync + 'static>(mut self) -> Self {
        self.draft().selector = Selector::Signal(TypeTag::of::<T>());
        self
    }

    /// React to messages of type `T` published by the system (e.g. responses
    /// of earlier steps).
    pub fn on<T: Send + Sync + 'static>(mut self) -> Self {
        self.draft().selector = Selector::Signal(TypeTag::of::<T>());
        self.draft().actors = vec![SYSTEM_ACTOR.to_string()];
        self
    }

    /// React to the failure of an earlier reaction, matched by the concrete
    /// error type `E`.
    pub fn on_error<E: std::error::Error + Send + Sync + 'static>(mut self) -> Self {
        self.draft().selector = Selector::Error(TypeTag::of::<E>());
        self
    }

    /// Restrict the step to the named actors (replacing the default).
    pub fn by<I, S>(mut self, actors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.draft().actors = actors.into_iter().map(Into::into).collect();
        self
    }

    /// Guard the step with a condition over the working state.
    pub fn condition(mut self, f: impl Fn(&Blackboard) -> bool + Send + Sync + 'static) -> Self {
        self.draft().condition = Some(condition(f));
        self
    }

    /// Let the step re-match for consecutive messages while the condition
    /// holds.
    pub fn react_while(mut self, f: impl Fn(&Blackboard) -> bool + Send + Sync + 'static) -> Self {
        self.draft().react_while = Some(condition(f));
        self
    }

    /// Consume the message, producing nothing.
    pub fn system<T: Send + Sync + 'static>(
        mut self,
        f: impl Fn(&mut Blackboard, &T) + Send + Sync + 'static,
    ) -> Self {
        self.draft().reaction = Some(Reaction::consumes(f));
        self
    }

    /// Fallible variant of [`StepBuilder::system`].
    pub fn try_system<T, E>(
        mut self,
        f: impl Fn(&mut Blackboard, &T) -> Result<(), E> + Send + Sync + 'static,
    ) -> Self
    where
        T: Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.draft().reaction = Some(Reaction::try_consumes(f));
        self
    }

    /// Consume the message and publish the returned response.
    pub fn system_publish<T, R>(
        mut self,
        f: impl Fn(&mut Blackboard, &T) -> R + Send + Sync + 'static,
    ) -> Self
    where
        T: Send + Sync + 'static,
        R: Send + Sync + 'static,
    {
        self.draft().reaction = Some(Reaction::responds(f));
        self
    }

    /// Fallible variant of [`StepBuilder::system_publish`].
    pub fn try_system_publish<T, R, E>(
        mut self,
        f: impl Fn(&mut Blackboard, &T) -> Result<R, E> + Send + Sync + 'static,
    ) -> Self
    where
        T: Send + Sync + 'static,
        R: Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.draft().reaction = Some(Reaction::try_responds(f));
        self
    }

    /// Produce a response with no input (autonomous reaction).
    pub fn supplies<R: Send + Sync + 'static>(
        mut self,
        f: impl Fn(&mut Blackboard) -> R + Send + Sync + 'static,
    ) -> Self {
        self.draft().reaction = Some(Reaction::supplies(f));
        self
    }

    /// Fallible variant of [`StepBuilder::supplies`].
    pub fn try_supplies<R, E>(
        mut self,
        f: impl Fn(&mut Blackboard) -> Result<R, E> + Send + Sync + 'static,
    ) -> Self
    where
        R: Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.draft().reaction = Some(Reaction::try_supplies(f));
        self
    }

    /// Run a side effect with no input and no response.
    pub fn runs(mut self, f: impl Fn(&mut Blackboard) + Send + Sync + 'static) -> Self {
        self.draft().reaction = Some(Reaction::runs(f));
        self
    }

    /// Fallible variant of [`StepBuilder::runs`].
    pub fn try_runs<E>(
        mut self,
        f: impl Fn(&mut Blackboard) -> Result<(), E> + Send + Sync + 'static,
    ) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.draft().reaction = Some(Reaction::try_runs(f));
        self
    }

    /// Handle the error event of a failed reaction.
    pub fn handles(
        mut self,
        f: impl Fn(&mut Blackboard, &ErrorEvent) + Send + Sync + 'static,
    ) -> Self {
        self.draft().reaction = Some(Reaction::handles(f));
        self
    }

    /// Install an arbitrary prebuilt reaction.
    pub fn reaction(mut self, reaction: Reaction) -> Self {
        self.draft().reaction = Some(reaction);
        self
    }

    /// Address published responses to the named actor.
    pub fn publish_to(mut self, actor: impl Into<String>) -> Self {
        self.draft().publish_to = Some(actor.into());
        self
    }

    /// Continue directly after the named step, as if it had just reacted.
    pub fn continues_after(mut self, step: impl Into<String>) -> Self {
        let step = step.into();
        self.draft().continuation = Some(step.clone());
        self.draft().reaction = Some(Reaction::continues_after(step));
        self
    }

    /// Rewind to just before the named step so normal matching re-evaluates
    /// it, letting its alternatives preempt.
    pub fn continues_at(mut self, step: impl Into<String>) -> Self {
        let step = step.into();
        self.draft().continuation = Some(step.clone());
        self.draft().reaction = Some(Reaction::continues_at(step));
        self
    }

    /// Like [`StepBuilder::continues_at`], with the named step's instead-of
    /// alternatives disabled for the next matching cycle.
    pub fn continues_without_alternatives_at(mut self, step: impl Into<String>) -> Self {
        let step = step.into();
        self.draft().continuation = Some(step.clone());
        self.draft().reaction = Some(Reaction::continues_without_alternatives_at(step));
        self
    }

    /// Open the next step: in the same flow for flow steps, flowless
    /// otherwise.
    pub fn step(self, name: impl Into<String>) -> StepBuilder<'a> {
        let flow = self.flow;
        self.owner.new_step(name.into(), flow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_core::step::StepKind;

    struct EntersText;
    struct EntersNumber;

    #[test]
    fn builds_a_two_step_flow_with_resolved_positions() {
        let mut builder = ModelBuilder::new();
        builder
            .flow("basic")
            .step("S1")
            .user::<EntersText>()
            .system(|_, _: &EntersText| {})
            .step("S2")
            .user::<EntersNumber>()
            .system(|_, _: &EntersNumber| {});
        let model = builder.build().expect("valid model");

        let (s1_id, s1) = model.step_named("S1").expect("S1");
        let (_, s2) = model.step_named("S2").expect("S2");
        assert_eq!(s1.kind(), StepKind::Interruptable);
        assert_eq!(s1.previous_in_flow(), None);
        assert_eq!(s2.previous_in_flow(), Some(s1_id));
        assert_eq!(model.flows().count(), 1);
    }

    #[test]
    fn flow_entry_position_makes_the_first_step_interrupting() {
        let mut builder = ModelBuilder::new();
        builder
            .flow("basic")
            .step("S1")
            .user::<EntersText>()
            .system(|_, _: &EntersText| {});
        builder
            .flow("alternative")
            .instead_of("S1")
            .step("A1")
            .user::<EntersText>()
            .system(|_, _: &EntersText| {});
        let model = builder.build().expect("valid model");

        let (_, a1) = model.step_named("A1").expect("A1");
        assert_eq!(a1.kind(), StepKind::Interrupting);
    }

    #[test]
    fn duplicate_step_names_fail_the_build() {
        let mut builder = ModelBuilder::new();
        builder.flowless_step("S1").runs(|_| {});
        builder.flowless_step("S1").runs(|_| {});

        assert!(matches!(
            builder.build(),
            Err(BuildError::ElementAlreadyInModel(name)) if name == "S1"
        ));
    }

    #[test]
    fn unresolved_position_target_fails_the_build() {
        let mut builder = ModelBuilder::new();
        builder
            .flow("alternative")
            .instead_of("missing")
            .step("A1")
            .user::<EntersText>()
            .system(|_, _: &EntersText| {});

        assert!(matches!(
            builder.build(),
            Err(BuildError::NoSuchElementInModel(name)) if name == "missing"
        ));
    }

    #[test]
    fn unresolved_continuation_target_fails_the_build() {
        let mut builder = ModelBuilder::new();
        builder.flowless_step("S1").continues_after("missing");

        assert!(matches!(
            builder.build(),
            Err(BuildError::NoSuchElementInModel(name)) if name == "missing"
        ));
    }

    #[test]
    fn actors_default_by_selector_and_resolve_by_name() {
        let mut builder = ModelBuilder::new();
        builder.actor("customer");
        builder
            .flow("basic")
            .step("S1")
            .user::<EntersText>()
            .by(["customer"])
            .system(|_, _: &EntersText| {})
            .step("S2")
            .runs(|_| {});
        let model = builder.build().expect("valid model");

        let customer = model.actor_named("customer").expect("declared actor");
        let (_, s1) = model.step_named("S1").expect("S1");
        let (_, s2) = model.step_named("S2").expect("S2");
        assert_eq!(s1.actors(), &[customer]);
        assert_eq!(s2.actors(), &[model.system_actor()]);
    }
}
