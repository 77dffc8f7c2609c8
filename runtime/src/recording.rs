//! Recording - Ordered (step, message) History of a Run
//!
//! Inert unless started. Starting clears the buffers; stopping freezes them.
//! Independent of `restart`, so a recorded session survives a rerun.

use stagehand_core::Message;

#[derive(Debug, Default)]
pub struct Recording {
    active: bool,
    step_names: Vec<String>,
    messages: Vec<Message>,
}

impl Recording {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.active = true;
        self.step_names.clear();
        self.messages.clear();
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn record(&mut self, step_name: &str, message: &Message) {
        if self.active {
            self.step_names.push(step_name.to_string());
            self.messages.push(message.clone());
        }
    }

    pub fn step_names(&self) -> &[String] {
        &self.step_names
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}
