//! Conversation types and message normalization
//!
//! Incoming turns carry either a plain string or a list of typed content
//! blocks. Normalization flattens both into role/text turns and drops turns
//! that end up empty. It never fails.

use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// A normalized turn; content is never empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    role: Role,
    content: String,
}

impl ConversationTurn {
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

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Ordered dialogue owned by one request
///
/// Only grows through [`Conversation::with_system_directive`] (prepend) and
/// [`Conversation::push`]; turns are never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Private copy with a system turn in front of every existing turn
    pub fn with_system_directive(&self, directive: &str) -> Self {
        let mut turns = Vec::with_capacity(self.turns.len() + 1);
        turns.push(ConversationTurn::system(directive));
        turns.extend(self.turns.iter().cloned());
        Self { turns }
    }
}

/// A content block inside a block-list message
///
/// Only `type == "text"` blocks contribute; any other fields (image URLs and
/// the like) are accepted and ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Message content as sent by callers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawContent {
    PlainText(String),
    BlockList(Vec<ContentBlock>),
}

impl RawContent {
    /// Resolve to text: the string itself, or all text blocks concatenated in order
    pub fn resolve(&self) -> String {
        match self {
            RawContent::PlainText(text) => text.clone(),
            RawContent::BlockList(blocks) => blocks
                .iter()
                .filter(|block| block.block_type == "text")
                .filter_map(|block| block.text.as_deref())
                .collect(),
        }
    }
}

/// A turn exactly as received over HTTP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTurn {
    pub role: String,
    pub content: RawContent,
}

/// Flatten raw turns into a [`Conversation`]
///
/// Turns whose resolved content is empty, or whose role is not
/// system/user/assistant, are dropped.
pub fn normalize(raw_turns: &[RawTurn]) -> Conversation {
    let turns = raw_turns
        .iter()
        .filter_map(|raw| {
            let content = raw.content.resolve();
            if content.is_empty() {
                return None;
            }
            match Role::parse(&raw.role) {
                Some(role) => Some(ConversationTurn::new(role, content)),
                None => {
                    tracing::debug!(role = %raw.role, "Dropping turn with unsupported role");
                    None
                }
            }
        })
        .collect();

    Conversation::new(turns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_turns(json: &str) -> Vec<RawTurn> {
        serde_json::from_str(json).expect("test turns should deserialize")
    }

    #[test]
    fn test_plain_string_passes_through_unchanged() {
        let raw = parse_turns(r#"[{"role":"user","content":"What is 2+2?"}]"#);
        let conversation = normalize(&raw);
        assert_eq!(
            conversation.turns(),
            &[ConversationTurn::user("What is 2+2?")]
        );
    }

    #[test]
    fn test_block_list_concatenates_text_blocks_in_order() {
        let raw = parse_turns(
            r#"[{"role":"user","content":[
                {"type":"text","text":"Describe "},
                {"type":"image_url","image_url":{"url":"https://example.com/a.png"}},
                {"type":"text","text":"this picture."}
            ]}]"#,
        );
        let conversation = normalize(&raw);
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.turns()[0].content(), "Describe this picture.");
    }

    #[test]
    fn test_empty_turns_are_dropped() {
        let raw = parse_turns(
            r#"[
                {"role":"system","content":""},
                {"role":"user","content":[{"type":"image_url","image_url":{"url":"x"}}]},
                {"role":"user","content":[]},
                {"role":"assistant","content":"kept"}
            ]"#,
        );
        let conversation = normalize(&raw);
        assert_eq!(conversation.turns(), &[ConversationTurn::assistant("kept")]);
    }

    #[test]
    fn test_whitespace_only_content_is_kept() {
        // Only truly empty content is dropped
        let raw = parse_turns(r#"[{"role":"user","content":" "}]"#);
        assert_eq!(normalize(&raw).len(), 1);
    }

    #[test]
    fn test_text_block_without_text_field_is_skipped() {
        let raw = parse_turns(
            r#"[{"role":"user","content":[{"type":"text"},{"type":"text","text":"hi"}]}]"#,
        );
        assert_eq!(normalize(&raw).turns()[0].content(), "hi");
    }

    #[test]
    fn test_unknown_role_is_dropped() {
        let raw = parse_turns(
            r#"[{"role":"tool","content":"result"},{"role":"user","content":"q"}]"#,
        );
        assert_eq!(normalize(&raw).turns(), &[ConversationTurn::user("q")]);
    }

    #[test]
    fn test_dialogue_order_preserved() {
        let raw = parse_turns(
            r#"[
                {"role":"system","content":"be brief"},
                {"role":"user","content":"hi"},
                {"role":"assistant","content":"hello"},
                {"role":"user","content":"bye"}
            ]"#,
        );
        let roles: Vec<Role> = normalize(&raw).turns().iter().map(|t| t.role()).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
    }

    #[test]
    fn test_with_system_directive_prepends_without_touching_original() {
        let original = Conversation::new(vec![ConversationTurn::user("q")]);
        let directed = original.with_system_directive("identity rules");
        assert_eq!(original.len(), 1);
        assert_eq!(
            directed.turns(),
            &[
                ConversationTurn::system("identity rules"),
                ConversationTurn::user("q")
            ]
        );
    }

    #[test]
    fn test_turn_serializes_as_chat_message() {
        let json = serde_json::to_value(ConversationTurn::assistant("4")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "4"}));
    }
}
