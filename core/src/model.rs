//! Model - The Immutable Behavior Graph
//!
//! A `Model` owns the actors, use cases, flows and steps of one piece of
//! interactive behavior. It is assembled once (normally through the
//! `stagehand-kit` builder), validated by [`Model::from_parts`], and treated
//! as read-only by every runner bound to it.

use ahash::AHashMap;

use crate::actor::{Actor, ActorId, SYSTEM_ACTOR, USER_ACTOR};
use crate::error::BuildError;
use crate::flow::{Flow, FlowId, FlowPosition};
use crate::outline::ModelOutline;
use crate::step::{Step, StepId};
use crate::subtype::SubtypeRegistry;

/// Index of a use case inside its owning [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UseCaseId(pub usize);

/// A named grouping of flows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UseCase {
    pub name: String,
}

impl UseCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Raw, fully resolved inputs to [`Model::from_parts`]. Ids in `flows` and
/// `steps` index into these vectors.
pub struct ModelParts {
    pub actors: Vec<Actor>,
    pub use_cases: Vec<UseCase>,
    pub flows: Vec<Flow>,
    pub steps: Vec<Step>,
    pub subtypes: SubtypeRegistry,
}

/// The immutable-after-build behavior graph.
pub struct Model {
    actors: Vec<Actor>,
    use_cases: Vec<UseCase>,
    flows: Vec<Flow>,
    steps: Vec<Step>,
    actor_index: AHashMap<String, ActorId>,
    step_index: AHashMap<String, StepId>,
    user: ActorId,
    system: ActorId,
    subtypes: SubtypeRegistry,
}

impl Model {
    /// Validate raw parts into a model: names must be unique within each
    /// collection, the distinguished `user`/`system` actors must exist, and
    /// every cross-reference must be in range.
    pub fn from_parts(parts: ModelParts) -> Result<Self, BuildError> {
        let ModelParts {
            actors,
            use_cases,
            flows,
            steps,
            subtypes,
        } = parts;

        let mut actor_index = AHashMap::with_capacity(actors.len());
        for (ix, actor) in actors.iter().enumerate() {
            if actor_index.insert(actor.name.clone(), ActorId(ix)).is_some() {
                return Err(BuildError::ElementAlreadyInModel(actor.name.clone()));
            }
        }

        let user = *actor_index
            .get(USER_ACTOR)
            .ok_or_else(|| BuildError::NoSuchElementInModel(USER_ACTOR.to_string()))?;
        let system = *actor_index
            .get(SYSTEM_ACTOR)
            .ok_or_else(|| BuildError::NoSuchElementInModel(SYSTEM_ACTOR.to_string()))?;

        let mut use_case_names = AHashMap::with_capacity(use_cases.len());
        for (ix, use_case) in use_cases.iter().enumerate() {
            if use_case_names.insert(use_case.name.clone(), ix).is_some() {
                return Err(BuildError::ElementAlreadyInModel(use_case.name.clone()));
            }
        }

        let mut flow_names = AHashMap::with_capacity(flows.len());
        for (ix, flow) in flows.iter().enumerate() {
            if flow_names.insert(flow.name.clone(), ix).is_some() {
                return Err(BuildError::ElementAlreadyInModel(flow.name.clone()));
            }
        }

        let mut step_index = AHashMap::with_capacity(steps.len());
        for (ix, step) in steps.iter().enumerate() {
            if step_index
                .insert(step.name().to_string(), StepId(ix))
                .is_some()
            {
                return Err(BuildError::ElementAlreadyInModel(step.name().to_string()));
            }
        }

        let model = Self {
            actors,
            use_cases,
            flows,
            steps,
            actor_index,
            step_index,
            user,
            system,
            subtypes,
        };
        model.check_references()?;
        Ok(model)
    }

    /// Every id a step or flow carries must point into this model.
    fn check_references(&self) -> Result<(), BuildError> {
        for step in &self.steps {
            let dangling = |id: StepId| id.0 >= self.steps.len();
            if step.previous_in_flow().is_some_and(dangling)
                || step.flow().is_some_and(|f| f.0 >= self.flows.len())
                || step.actors().iter().any(|a| a.0 >= self.actors.len())
                || step.publish_to().is_some_and(|a| a.0 >= self.actors.len())
            {
                return Err(BuildError::NoSuchElementInModel(step.name().to_string()));
            }
            if let Some(position) = step.position() {
                let target = match position.place() {
                    FlowPosition::After(step) => step,
                    FlowPosition::InsteadOf(step) => Some(step),
                    FlowPosition::Anytime => None,
                };
                if target.is_some_and(dangling) {
                    return Err(BuildError::NoSuchElementInModel(step.name().to_string()));
                }
            }
        }
        for flow in &self.flows {
            if flow.steps.iter().any(|s| s.0 >= self.steps.len())
                || flow.use_case.is_some_and(|u| u.0 >= self.use_cases.len())
            {
                return Err(BuildError::NoSuchElementInModel(flow.name.clone()));
            }
        }
        Ok(())
    }

    pub fn actor(&self, id: ActorId) -> &Actor {
        &self.actors[id.0]
    }

    pub fn actor_named(&self, name: &str) -> Option<ActorId> {
        self.actor_index.get(name).copied()
    }

    pub fn actors(&self) -> impl Iterator<Item = (ActorId, &Actor)> {
        self.actors.iter().enumerate().map(|(ix, a)| (ActorId(ix), a))
    }

    /// The distinguished actor acting by default.
    pub fn user_actor(&self) -> ActorId {
        self.user
    }

    /// The distinguished actor that triggers autonomous reactions.
    pub fn system_actor(&self) -> ActorId {
        self.system
    }

    pub fn use_case(&self, id: UseCaseId) -> &UseCase {
        &self.use_cases[id.0]
    }

    pub fn use_cases(&self) -> impl Iterator<Item = (UseCaseId, &UseCase)> {
        self.use_cases
            .iter()
            .enumerate()
            .map(|(ix, u)| (UseCaseId(ix), u))
    }

    pub fn flow(&self, id: FlowId) -> &Flow {
        &self.flows[id.0]
    }

    pub fn flows(&self) -> impl Iterator<Item = (FlowId, &Flow)> {
        self.flows.iter().enumerate().map(|(ix, f)| (FlowId(ix), f))
    }

    pub fn step(&self, id: StepId) -> &Step {
        &self.steps[id.0]
    }

    pub fn step_named(&self, name: &str) -> Option<(StepId, &Step)> {
        let id = self.step_index.get(name).copied()?;
        Some((id, &self.steps[id.0]))
    }

    pub fn steps(&self) -> impl Iterator<Item = (StepId, &Step)> {
        self.steps.iter().enumerate().map(|(ix, s)| (StepId(ix), s))
    }

    pub fn subtypes(&self) -> &SubtypeRegistry {
        &self.subtypes
    }

    /// Serializable snapshot of the model's structure.
    pub fn outline(&self) -> ModelOutline {
        ModelOutline::of(self)
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("actors", &self.actors.len())
            .field("use_cases", &self.use_cases.len())
            .field("flows", &self.flows.len())
            .field("steps", &self.steps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{Selector, StepKind};

    fn base_actors() -> Vec<Actor> {
        vec![Actor::new(USER_ACTOR), Actor::new(SYSTEM_ACTOR)]
    }

    #[test]
    fn duplicate_step_names_are_rejected() {
        let parts = ModelParts {
            actors: base_actors(),
            use_cases: vec![],
            flows: vec![],
            steps: vec![
                Step::new("greet", StepKind::Flowless, Selector::Autonomous),
                Step::new("greet", StepKind::Flowless, Selector::Autonomous),
            ],
            subtypes: SubtypeRegistry::new(),
        };

        match Model::from_parts(parts) {
            Err(BuildError::ElementAlreadyInModel(name)) => assert_eq!(name, "greet"),
            other => panic!("expected duplicate-name error, got {other:?}"),
        }
    }

    #[test]
    fn missing_system_actor_is_rejected() {
        let parts = ModelParts {
            actors: vec![Actor::new(USER_ACTOR)],
            use_cases: vec![],
            flows: vec![],
            steps: vec![],
            subtypes: SubtypeRegistry::new(),
        };

        assert!(matches!(
            Model::from_parts(parts),
            Err(BuildError::NoSuchElementInModel(name)) if name == SYSTEM_ACTOR
        ));
    }

    #[test]
    fn dangling_previous_step_is_rejected() {
        let step = Step::new("s1", StepKind::Interruptable, Selector::Autonomous)
            .with_flow(FlowId(0), Some(StepId(7)));
        let parts = ModelParts {
            actors: base_actors(),
            use_cases: vec![],
            flows: vec![Flow::new("basic").with_steps(vec![StepId(0)])],
            steps: vec![step],
            subtypes: SubtypeRegistry::new(),
        };

        assert!(matches!(
            Model::from_parts(parts),
            Err(BuildError::NoSuchElementInModel(_))
        ));
    }
}
