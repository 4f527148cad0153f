//! Fakes for the external capabilities.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use crate::reformat::Reformatter;
use crate::retry::Sleeper;
use crate::text_generation::{GenerationError, TextGenerator};

/// Replays canned answers in order and records every request.
pub struct ScriptedGenerator {
    answers: RefCell<VecDeque<Result<String, GenerationError>>>,
    calls: RefCell<Vec<(String, String)>>,
}

impl ScriptedGenerator {
    pub fn new(answers: Vec<Result<String, GenerationError>>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn answering(answers: &[&str]) -> Self {
        Self::new(answers.iter().map(|a| Ok(a.to_string())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// `(system_role, user_content)` pairs, oldest first.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.borrow().clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, system_role: &str, user_content: &str) -> Result<String, GenerationError> {
        self.calls
            .borrow_mut()
            .push((system_role.to_string(), user_content.to_string()));
        self.answers
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Unknown("script exhausted".into())))
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    waits: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits.borrow_mut().push(duration);
    }
}

/// Counts reformat calls without touching the code.
#[derive(Default)]
pub struct CountingReformatter {
    calls: RefCell<usize>,
}

impl CountingReformatter {
    pub fn calls(&self) -> usize {
        *self.calls.borrow()
    }
}

impl Reformatter for CountingReformatter {
    fn reformat(&self, code: &str) -> String {
        *self.calls.borrow_mut() += 1;
        code.to_string()
    }
}
