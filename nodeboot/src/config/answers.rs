//! Sources of operator answers

use std::collections::HashMap;

use dialoguer::{Confirm, Input, Password};

use crate::config::keys::{ConfigKey, PromptKind};
use crate::errors::BootstrapError;

/// What a prompt asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKey {
    /// A configuration field
    Field(ConfigKey),
    /// The gate before any mutating action
    ProceedGate,
}

/// A single question put to the operator
#[derive(Debug, Clone)]
pub struct PromptSpec {
    pub key: PromptKey,
    pub label: String,
    pub kind: PromptKind,
    /// Value substituted for empty input, shown to the operator
    pub default: Option<String>,
}

impl PromptSpec {
    /// Prompt for a configuration field
    pub fn field(key: ConfigKey, default: Option<String>) -> Self {
        Self {
            key: PromptKey::Field(key),
            label: key.label().to_string(),
            kind: key.kind(),
            default,
        }
    }

    /// The confirmation asked before provisioning starts
    pub fn proceed_gate() -> Self {
        Self {
            key: PromptKey::ProceedGate,
            label: "Proceed with provisioning?".to_string(),
            kind: PromptKind::Confirm,
            default: Some("no".to_string()),
        }
    }
}

/// Whether an answer counts as "yes"
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Provides the raw answer for a prompt. Returning an empty string means
/// "no input" and lets the caller substitute the default.
pub trait AnswerSource: Send {
    fn next_answer(&mut self, prompt: &PromptSpec) -> Result<String, BootstrapError>;
}

/// Interactive answers from the controlling terminal
#[derive(Debug, Default)]
pub struct TerminalAnswers;

impl TerminalAnswers {
    pub fn new() -> Self {
        Self
    }
}

impl AnswerSource for TerminalAnswers {
    fn next_answer(&mut self, prompt: &PromptSpec) -> Result<String, BootstrapError> {
        match prompt.kind {
            PromptKind::Text => {
                let mut input = Input::<String>::new()
                    .with_prompt(&prompt.label)
                    .allow_empty(true);
                if let Some(default) = &prompt.default {
                    input = input.default(default.clone()).show_default(true);
                }
                Ok(input.interact_text()?)
            }
            PromptKind::Secret => Ok(Password::new()
                .with_prompt(&prompt.label)
                .allow_empty_password(true)
                .interact()?),
            PromptKind::Confirm => {
                let default = prompt.default.as_deref().map(is_affirmative).unwrap_or(false);
                let confirmed = Confirm::new()
                    .with_prompt(&prompt.label)
                    .default(default)
                    .interact()?;
                Ok(if confirmed { "yes" } else { "no" }.to_string())
            }
        }
    }
}

/// Pre-recorded answers, keyed by prompt. Unanswered prompts yield empty input.
#[derive(Debug, Default)]
pub struct ScriptedAnswers {
    answers: HashMap<PromptKey, String>,
    asked: Vec<PromptKey>,
}

impl ScriptedAnswers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the answer for a configuration field
    pub fn with(mut self, key: ConfigKey, answer: impl Into<String>) -> Self {
        self.answers.insert(PromptKey::Field(key), answer.into());
        self
    }

    /// Record the answer for the confirmation gate
    pub fn with_gate(mut self, answer: impl Into<String>) -> Self {
        self.answers.insert(PromptKey::ProceedGate, answer.into());
        self
    }

    /// Prompts asked so far, in order
    pub fn asked(&self) -> &[PromptKey] {
        &self.asked
    }
}

impl AnswerSource for ScriptedAnswers {
    fn next_answer(&mut self, prompt: &PromptSpec) -> Result<String, BootstrapError> {
        self.asked.push(prompt.key);
        Ok(self.answers.get(&prompt.key).cloned().unwrap_or_default())
    }
}
