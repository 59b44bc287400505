//! Chat messages and the agent transcript built from them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One chat turn as sent to a completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Conversation of a ReAct agent: instructions, the question, then one
/// reply/observation pair per tool call.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new(instructions: impl Into<String>, question: &str) -> Self {
        Self {
            messages: vec![
                Message::system(instructions),
                Message::user(format!("Question: {question}")),
            ],
        }
    }

    /// Appends the model's reply and what the tool returned for it.
    pub fn record(&mut self, reply: &str, observation: &str) {
        self.messages.push(Message::assistant(reply.trim()));
        self.messages
            .push(Message::user(format!("Observation: {observation}")));
    }

    /// Number of tool calls recorded so far.
    pub fn exchanges(&self) -> usize {
        self.messages.len().saturating_sub(2) / 2
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}
