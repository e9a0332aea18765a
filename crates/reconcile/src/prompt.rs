//! Operator decisions.
//!
//! The orchestrator never reads a terminal itself. It asks an [`Operator`],
//! which may be a person at a prompt, a blanket "yes" for unattended runs,
//! or a script of canned answers in tests.

use std::collections::VecDeque;

/// Source of yes/no confirmations and free-form answers.
///
/// Calls block until an answer is available.
pub trait Operator {
    /// Ask a yes/no question.
    fn confirm(&mut self, question: &str) -> bool;

    /// Ask an open question. An empty answer means "no answer".
    fn ask(&mut self, question: &str) -> String;
}

impl<T: Operator + ?Sized> Operator for &mut T {
    fn confirm(&mut self, question: &str) -> bool {
        (**self).confirm(question)
    }

    fn ask(&mut self, question: &str) -> String {
        (**self).ask(question)
    }
}

impl<T: Operator + ?Sized> Operator for Box<T> {
    fn confirm(&mut self, question: &str) -> bool {
        (**self).confirm(question)
    }

    fn ask(&mut self, question: &str) -> String {
        (**self).ask(question)
    }
}

/// Approves every confirmation and never answers an open question.
///
/// Candidates that need the operator to pick a canonical record are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Operator for AssumeYes {
    fn confirm(&mut self, question: &str) -> bool {
        tracing::info!(question, "Auto-approved");
        true
    }

    fn ask(&mut self, question: &str) -> String {
        tracing::info!(question, "No answer in unattended mode");
        String::new()
    }
}

/// Replays canned answers and records every question asked.
///
/// Once the script runs out, confirmations answer `false` and open
/// questions answer `""`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOperator {
    confirmations: VecDeque<bool>,
    answers: VecDeque<String>,
    /// Questions in the order they were asked.
    pub asked: Vec<String>,
}

impl ScriptedOperator {
    /// An operator with no answers queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue confirmation answers.
    #[must_use]
    pub fn confirming(mut self, answers: impl IntoIterator<Item = bool>) -> Self {
        self.confirmations.extend(answers);
        self
    }

    /// Queue open-question answers.
    #[must_use]
    pub fn answering<I, A>(mut self, answers: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.answers.extend(answers.into_iter().map(Into::into));
        self
    }
}

impl Operator for ScriptedOperator {
    fn confirm(&mut self, question: &str) -> bool {
        self.asked.push(question.to_owned());
        self.confirmations.pop_front().unwrap_or(false)
    }

    fn ask(&mut self, question: &str) -> String {
        self.asked.push(question.to_owned());
        self.answers.pop_front().unwrap_or_default()
    }
}
