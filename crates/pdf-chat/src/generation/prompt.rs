//! Prompt templates for query rewriting and grounded answers
//!
//! A template is an ordered list of role/content messages plus a single
//! `history` slot where the conversation so far is spliced in. Content may
//! reference `{name}` placeholders; anything else in braces is literal text.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{ChatMessage, ChatRole};

/// Role of a template entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateRole {
    System,
    User,
    Assistant,
    /// Replaced by the chat history at render time
    History,
}

/// One entry of a prompt template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateMessage {
    pub role: TemplateRole,
    #[serde(default)]
    pub content: String,
}

impl TemplateMessage {
    fn new(role: TemplateRole, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
        }
    }

    fn history() -> Self {
        Self::new(TemplateRole::History, "")
    }
}

/// Role of a rendered message, as understood by the chat API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// A rendered message ready to send to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl From<&ChatMessage> for PromptMessage {
    fn from(message: &ChatMessage) -> Self {
        let role = match message.role {
            ChatRole::Human => PromptRole::User,
            ChatRole::Ai => PromptRole::Assistant,
        };
        Self {
            role,
            content: message.content.clone(),
        }
    }
}

/// Placeholders a template is checked against at startup
#[derive(Debug, Clone, Copy)]
pub struct TemplateSlots {
    /// Template name used in error messages
    pub name: &'static str,
    /// Placeholders that must appear (and are the only ones allowed)
    pub placeholders: &'static [&'static str],
}

/// Slots of the answer template
pub const ANSWER_SLOTS: TemplateSlots = TemplateSlots {
    name: "answer",
    placeholders: &["context", "input"],
};

/// Slots of the rewrite template
pub const REWRITE_SLOTS: TemplateSlots = TemplateSlots {
    name: "rewrite",
    placeholders: &["input"],
};

/// Ordered role/content template with named placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub messages: Vec<TemplateMessage>,
}

impl PromptTemplate {
    /// Answer prompt: context in the system message, then history, then the question
    pub fn default_answer() -> Self {
        Self {
            messages: vec![
                TemplateMessage::new(
                    TemplateRole::System,
                    "Answer the user's question based on the following context: {context}.",
                ),
                TemplateMessage::history(),
                TemplateMessage::new(TemplateRole::User, "{input}"),
            ],
        }
    }

    /// Rewrite prompt: history, the follow-up, then the instruction
    pub fn default_rewrite() -> Self {
        Self {
            messages: vec![
                TemplateMessage::history(),
                TemplateMessage::new(TemplateRole::User, "{input}"),
                TemplateMessage::new(
                    TemplateRole::User,
                    "Given the above conversation, generate a search query to look up to get information relevant to the conversation.",
                ),
            ],
        }
    }

    /// Check placeholders and the history slot
    pub fn validate(&self, slots: &TemplateSlots) -> Result<()> {
        let history_slots = self
            .messages
            .iter()
            .filter(|m| m.role == TemplateRole::History)
            .count();
        if history_slots != 1 {
            return Err(Error::prompt(format!(
                "{} template needs exactly one history slot, found {}",
                slots.name, history_slots
            )));
        }

        let mut seen = Vec::new();
        for message in self.messages.iter().filter(|m| m.role != TemplateRole::History) {
            for name in placeholders(&message.content) {
                if !slots.placeholders.contains(&name) {
                    return Err(Error::prompt(format!(
                        "{} template uses unknown placeholder {{{}}}",
                        slots.name, name
                    )));
                }
                seen.push(name);
            }
        }

        if let Some(missing) = slots.placeholders.iter().find(|p| !seen.contains(*p)) {
            return Err(Error::prompt(format!(
                "{} template is missing placeholder {{{}}}",
                slots.name, missing
            )));
        }

        Ok(())
    }

    /// Render the template with placeholder values and the history slot filled
    pub fn render(&self, vars: &[(&str, &str)], history: &[ChatMessage]) -> Result<Vec<PromptMessage>> {
        let mut rendered = Vec::with_capacity(self.messages.len() + history.len());

        for message in &self.messages {
            let role = match message.role {
                TemplateRole::History => {
                    rendered.extend(history.iter().map(PromptMessage::from));
                    continue;
                }
                TemplateRole::System => PromptRole::System,
                TemplateRole::User => PromptRole::User,
                TemplateRole::Assistant => PromptRole::Assistant,
            };

            rendered.push(PromptMessage {
                role,
                content: substitute(&message.content, vars)?,
            });
        }

        Ok(rendered)
    }
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Names of the `{placeholder}` markers in `content`, in order
fn placeholders(content: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = content;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_placeholder_name(&after[..close]) => {
                names.push(&after[..close]);
                rest = &after[close + 1..];
            }
            _ => rest = after,
        }
    }

    names
}

/// Single-pass substitution; inserted values are never rescanned
fn substitute(content: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut output = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        match after.find('}') {
            Some(close) if is_placeholder_name(&after[..close]) => {
                let name = &after[..close];
                let value = vars
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| Error::prompt(format!("no value for placeholder {{{}}}", name)))?;
                output.push_str(value);
                rest = &after[close + 1..];
            }
            _ => {
                output.push('{');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    Ok(output)
}
