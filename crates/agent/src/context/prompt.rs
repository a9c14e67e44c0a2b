//! Prompt assembly.
//!
//! Layout, in order:
//!
//! | Message | Content |
//! |---------|---------|
//! | system | base instructions, then the bundle payload as pretty JSON |
//! | user / assistant | remembered turns for this conversation, oldest first |
//! | user | the query text |

use super::selector::ContextBundle;
use eventdesk_core::message::{ConversationEntry, Message};

/// Per-message overhead for role and delimiters in the wire format.
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// An assembled prompt plus its rough size.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub messages: Vec<Message>,
    pub estimated_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    instructions: String,
}

impl PromptBuilder {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
        }
    }

    pub fn build(&self, bundle: &ContextBundle, history: &[ConversationEntry], query: &str) -> Prompt {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.system_text(bundle)));
        messages.extend(history.iter().map(ConversationEntry::to_message));
        messages.push(Message::user(query));

        let estimated_tokens = estimate_messages_tokens(&messages);
        Prompt {
            messages,
            estimated_tokens,
        }
    }

    fn system_text(&self, bundle: &ContextBundle) -> String {
        if bundle.payload.is_empty() {
            return self.instructions.clone();
        }
        let data = serde_json::to_string_pretty(&bundle.payload).unwrap_or_default();
        format!("{}\n\nEVENT DATA:\n{}", self.instructions, data)
    }
}

/// Rough token count: one token per four bytes, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|m| MESSAGE_OVERHEAD_TOKENS + estimate_tokens(&m.content))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use eventdesk_core::message::Role;
    use serde_json::{Map, json};
    use std::collections::BTreeSet;

    fn bundle(payload: serde_json::Value) -> ContextBundle {
        let payload: Map<String, serde_json::Value> = match payload {
            serde_json::Value::Object(map) => map,
            _ => Map::new(),
        };
        ContextBundle {
            topics: BTreeSet::from(["prizes".to_string()]),
            payload,
            is_general_knowledge: false,
        }
    }

    #[test]
    fn layout_is_system_history_query() {
        let now = Utc::now();
        let history = vec![
            ConversationEntry::new(Role::User, "when is lunch", now),
            ConversationEntry::new(Role::Assistant, "12:30 in Hall B", now),
        ];
        let prompt = PromptBuilder::new("Be helpful.").build(
            &bundle(json!({"prizes": {"pool": "$10,000"}})),
            &history,
            "and dinner?",
        );

        assert_eq!(prompt.messages.len(), 4);
        assert_eq!(prompt.messages[0].role, Role::System);
        assert!(prompt.messages[0].content.starts_with("Be helpful."));
        assert!(prompt.messages[0].content.contains("EVENT DATA"));
        assert!(prompt.messages[0].content.contains("$10,000"));
        assert_eq!(prompt.messages[1].content, "when is lunch");
        assert_eq!(prompt.messages[2].role, Role::Assistant);
        assert_eq!(prompt.messages[3].role, Role::User);
        assert_eq!(prompt.messages[3].content, "and dinner?");
    }

    #[test]
    fn empty_payload_sends_bare_instructions() {
        let prompt = PromptBuilder::new("Be helpful.").build(&bundle(json!({})), &[], "hi");
        assert_eq!(prompt.messages[0].content, "Be helpful.");
        assert_eq!(prompt.messages.len(), 2);
    }

    #[test]
    fn token_estimate() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("test"), 1);
        assert_eq!(estimate_tokens("hello"), 2);
        let msgs = vec![Message::user("hello"), Message::assistant("world")];
        assert_eq!(estimate_messages_tokens(&msgs), 12);
    }

    #[test]
    fn prompt_carries_estimate() {
        let prompt = PromptBuilder::new("abcd").build(&bundle(json!({})), &[], "abcd");
        assert_eq!(prompt.estimated_tokens, 10);
    }
}
