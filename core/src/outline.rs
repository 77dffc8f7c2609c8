//! ModelOutline - The Static View of a Model
//!
//! An outline is the serializable snapshot of a built model: actors, use
//! cases, flows and steps with their declared message types. It is used for
//! documentation and inspection; it carries no closures and no behavior.

use serde::{Deserialize, Serialize};

use crate::model::Model;
use crate::step::{Selector, Step, StepKind};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelOutline {
    pub actors: Vec<String>,
    pub use_cases: Vec<String>,
    pub flows: Vec<FlowOutline>,
    pub flowless_steps: Vec<StepOutline>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowOutline {
    pub name: String,
    pub use_case: Option<String>,
    pub steps: Vec<StepOutline>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutline {
    pub name: String,
    pub kind: String,
    pub message_type: Option<String>,
    pub actors: Vec<String>,
}

impl ModelOutline {
    pub fn of(model: &Model) -> Self {
        let flows = model
            .flows()
            .map(|(_, flow)| FlowOutline {
                name: flow.name.clone(),
                use_case: flow.use_case.map(|u| model.use_case(u).name.clone()),
                steps: flow
                    .steps
                    .iter()
                    .map(|&sid| step_outline(model, model.step(sid)))
                    .collect(),
            })
            .collect();

        Self {
            actors: model.actors().map(|(_, a)| a.name.clone()).collect(),
            use_cases: model.use_cases().map(|(_, u)| u.name.clone()).collect(),
            flows,
            flowless_steps: model
                .steps()
                .filter(|(_, step)| step.kind() == StepKind::Flowless)
                .map(|(_, step)| step_outline(model, step))
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn step_outline(model: &Model, step: &Step) -> StepOutline {
    let (kind, message_type) = match (step.kind(), step.selector()) {
        (kind, Selector::Signal(tag)) => (kind_label(kind), Some(tag.name().to_string())),
        (kind, Selector::Error(tag)) => (kind_label(kind), Some(tag.name().to_string())),
        (kind, Selector::Autonomous) => (kind_label(kind), None),
    };
    StepOutline {
        name: step.name().to_string(),
        kind: kind.to_string(),
        message_type,
        actors: step
            .actors()
            .iter()
            .map(|&a| model.actor(a).name.clone())
            .collect(),
    }
}

fn kind_label(kind: StepKind) -> &'static str {
    match kind {
        StepKind::Interruptable => "interruptable",
        StepKind::Interrupting => "interrupting",
        StepKind::Flowless => "flowless",
    }
}
