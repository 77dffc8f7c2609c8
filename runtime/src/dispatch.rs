//! Candidate Selection
//!
//! Pure matching logic: given the runner's history and a message tag, which
//! active steps could react? The runner owns the cardinality invariant (at
//! most one candidate proceeds); this module only answers reachability.

use stagehand_core::flow::{FlowId, FlowPosition};
use stagehand_core::message::{MessageKind, TypeTag};
use stagehand_core::model::Model;
use stagehand_core::step::{Selector, Step, StepId, StepKind};
use stagehand_core::Blackboard;

/// A read-only view of the runner state a matching pass needs.
pub(crate) struct MatchContext<'a> {
    pub model: &'a Model,
    pub active: &'a [StepId],
    pub latest_step: Option<StepId>,
    pub latest_flow: Option<FlowId>,
    pub board: &'a Blackboard,
    /// One-shot filter: steps positioned instead-of this target are skipped.
    pub without_alternatives: Option<StepId>,
}

/// All active steps whose (type, predicate) pair is satisfied for a message
/// of the given kind and tag, with the interrupting-over-interruptable
/// precedence rule already applied.
pub(crate) fn candidates(ctx: &MatchContext<'_>, kind: MessageKind, tag: TypeTag) -> Vec<StepId> {
    let mut out = Vec::new();
    let mut any_interrupting = false;

    for &sid in ctx.active {
        let step = ctx.model.step(sid);
        if !selector_admits(ctx.model, step.selector(), kind, tag) {
            continue;
        }
        if !reachable(ctx, sid, step) {
            continue;
        }
        any_interrupting |= step.kind() == StepKind::Interrupting;
        out.push(sid);
    }

    // Explicitly positioned alternatives always preempt the default
    // continuation, without flows knowing about each other.
    if any_interrupting {
        out.retain(|&sid| ctx.model.step(sid).kind() != StepKind::Interruptable);
    }
    out
}

fn selector_admits(model: &Model, selector: Selector, kind: MessageKind, tag: TypeTag) -> bool {
    match (selector, kind) {
        (Selector::Signal(declared), MessageKind::Signal) => {
            model.subtypes().satisfies(declared, tag)
        }
        (Selector::Error(declared), MessageKind::Error) => model.subtypes().satisfies(declared, tag),
        (Selector::Autonomous, MessageKind::Tick) => true,
        _ => false,
    }
}

/// The step's effective predicate: flow position, the not-already-inside
/// guard for interrupting steps, the react-while override, the step's own
/// condition, and the one-shot without-alternatives filter.
fn reachable(ctx: &MatchContext<'_>, sid: StepId, step: &Step) -> bool {
    let mut holds = match step.position() {
        Some(position) => position.holds(ctx.model, ctx.latest_step, ctx.board),
        None => true,
    };

    // A flow, once entered, is never re-entered by its own starting
    // condition while still inside it.
    if holds && step.kind() == StepKind::Interrupting {
        holds = ctx.latest_flow != step.flow();
    }

    // React-while lets a step re-match itself for consecutive messages.
    if !holds
        && let Some(react_while) = step.react_while()
        && ctx.latest_step == Some(sid)
    {
        holds = react_while(ctx.board);
    }

    if holds && let Some(condition) = step.condition() {
        holds = condition(ctx.board);
    }

    if holds
        && let (Some(disabled), Some(position)) = (ctx.without_alternatives, step.position())
        && position.place() == FlowPosition::InsteadOf(disabled)
    {
        holds = false;
    }

    // A conditionless autonomous step fires once per position, not once per
    // tick; an explicit condition (or react-while) opts into re-firing.
    if holds
        && step.selector() == Selector::Autonomous
        && step.condition().is_none()
        && step.react_while().is_none()
        && ctx.latest_step == Some(sid)
    {
        holds = false;
    }

    holds
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_core::actor::{Actor, SYSTEM_ACTOR, USER_ACTOR};
    use stagehand_core::flow::{Flow, Position};
    use stagehand_core::model::ModelParts;
    use stagehand_core::step::condition;
    use stagehand_core::SubtypeRegistry;

    struct EntersText;
    struct EntersNumber;

    fn signal<T: 'static>() -> Selector {
        Selector::Signal(TypeTag::of::<T>())
    }

    /// Two-step basic flow plus an interrupting alternative instead of "s2".
    fn sample_model() -> Model {
        let s1 = Step::new("s1", StepKind::Interruptable, signal::<EntersText>())
            .with_flow(FlowId(0), None)
            .with_position(Position::after(None))
            .with_actors(vec![stagehand_core::ActorId(0)]);
        let s2 = Step::new("s2", StepKind::Interruptable, signal::<EntersNumber>())
            .with_flow(FlowId(0), Some(StepId(0)))
            .with_position(Position::after(Some(StepId(0))))
            .with_actors(vec![stagehand_core::ActorId(0)]);
        let alt = Step::new("alt", StepKind::Interrupting, signal::<EntersNumber>())
            .with_flow(FlowId(1), None)
            .with_position(Position::instead_of(StepId(1)))
            .with_actors(vec![stagehand_core::ActorId(0)]);

        Model::from_parts(ModelParts {
            actors: vec![Actor::new(USER_ACTOR), Actor::new(SYSTEM_ACTOR)],
            use_cases: vec![],
            flows: vec![
                Flow::new("basic").with_steps(vec![StepId(0), StepId(1)]),
                Flow::new("alternative").with_steps(vec![StepId(2)]),
            ],
            steps: vec![s1, s2, alt],
            subtypes: SubtypeRegistry::new(),
        })
        .expect("valid model")
    }

    fn ctx<'a>(
        model: &'a Model,
        active: &'a [StepId],
        latest: Option<StepId>,
        board: &'a Blackboard,
    ) -> MatchContext<'a> {
        MatchContext {
            model,
            active,
            latest_step: latest,
            latest_flow: latest.and_then(|s| model.step(s).flow()),
            board,
            without_alternatives: None,
        }
    }

    #[test]
    fn ordering_holds_before_any_message() {
        let model = sample_model();
        let active = [StepId(0), StepId(1), StepId(2)];
        let board = Blackboard::new();

        let found = candidates(
            &ctx(&model, &active, None, &board),
            MessageKind::Signal,
            TypeTag::of::<EntersNumber>(),
        );
        assert!(found.is_empty(), "s2 must not match before s1 ran");

        let found = candidates(
            &ctx(&model, &active, None, &board),
            MessageKind::Signal,
            TypeTag::of::<EntersText>(),
        );
        assert_eq!(found, vec![StepId(0)]);
    }

    #[test]
    fn interrupting_step_preempts_the_default_continuation() {
        let model = sample_model();
        let active = [StepId(0), StepId(1), StepId(2)];
        let board = Blackboard::new();

        // After s1 both s2 (continuation) and alt (instead of s2) are in
        // position for EntersNumber; only alt survives.
        let found = candidates(
            &ctx(&model, &active, Some(StepId(0)), &board),
            MessageKind::Signal,
            TypeTag::of::<EntersNumber>(),
        );
        assert_eq!(found, vec![StepId(2)]);
    }

    #[test]
    fn without_alternatives_filter_restores_the_continuation() {
        let model = sample_model();
        let active = [StepId(0), StepId(1), StepId(2)];
        let board = Blackboard::new();

        let mut context = ctx(&model, &active, Some(StepId(0)), &board);
        context.without_alternatives = Some(StepId(1));

        let found = candidates(&context, MessageKind::Signal, TypeTag::of::<EntersNumber>());
        assert_eq!(found, vec![StepId(1)]);
    }

    /// Same shape as `sample_model`, but s1 re-matches itself while the
    /// board holds a `u32` flag.
    fn react_while_model() -> Model {
        let s1 = Step::new("s1", StepKind::Interruptable, signal::<EntersText>())
            .with_flow(FlowId(0), None)
            .with_position(Position::after(None))
            .with_react_while(condition(|board| board.contains::<u32>()))
            .with_actors(vec![stagehand_core::ActorId(0)]);

        Model::from_parts(ModelParts {
            actors: vec![Actor::new(USER_ACTOR), Actor::new(SYSTEM_ACTOR)],
            use_cases: vec![],
            flows: vec![Flow::new("basic").with_steps(vec![StepId(0)])],
            steps: vec![s1],
            subtypes: SubtypeRegistry::new(),
        })
        .expect("valid model")
    }

    #[test]
    fn react_while_lets_a_step_rematch_itself() {
        let model = react_while_model();
        let active = [StepId(0)];
        let mut board = Blackboard::new();

        // Normal position After(None) no longer holds once s1 reacted.
        let found = candidates(
            &ctx(&model, &active, Some(StepId(0)), &board),
            MessageKind::Signal,
            TypeTag::of::<EntersText>(),
        );
        assert!(found.is_empty());

        // With the react-while condition satisfied, it matches again.
        board.put(1u32);
        let found = candidates(
            &ctx(&model, &active, Some(StepId(0)), &board),
            MessageKind::Signal,
            TypeTag::of::<EntersText>(),
        );
        assert_eq!(found, vec![StepId(0)]);
    }
}
