//! Turn, content block and conversation domain types.
//!
//! A [`Conversation`] is the append-only log sent in full on every request.
//! It owns the role-alternation and tool-use/tool-result pairing rules, so
//! a history that violates them can never be constructed.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolViolation;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a turn's author. The system prompt travels out-of-band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// A typed unit of content within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// A tool invocation requested by the model. `id` is model-generated.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// The answer to a `ToolUse`, echoing its id verbatim.
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }

    /// Wire name of the block type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
        }
    }
}

/// Turn content: either plain text or an ordered list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// One role-tagged entry in conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Content,
}

impl Turn {
    /// A plain-text user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
        }
    }

    /// A user turn made of blocks (typically tool results).
    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: Content::Blocks(blocks),
        }
    }

    /// An assistant turn made of finalized response blocks.
    pub fn assistant(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Blocks(blocks),
        }
    }

    /// The turn's blocks; empty for plain-text content.
    pub fn blocks(&self) -> &[ContentBlock] {
        match &self.content {
            Content::Text(_) => &[],
            Content::Blocks(blocks) => blocks,
        }
    }

    /// All text in the turn, concatenated in order.
    pub fn text(&self) -> String {
        match &self.content {
            Content::Text(text) => text.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    pub fn tool_use_ids(&self) -> impl Iterator<Item = &str> {
        self.blocks().iter().filter_map(|b| match b {
            ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }

    pub fn tool_result_ids(&self) -> impl Iterator<Item = &str> {
        self.blocks().iter().filter_map(|b| match b {
            ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
            _ => None,
        })
    }
}

/// The append-only history of one session.
///
/// Serializes as a flat, order-preserving document; deserialization replays
/// every turn through [`Conversation::append`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConversationDocument")]
pub struct Conversation {
    pub id: ConversationId,
    pub created_at: DateTime<Utc>,
    turns: Vec<Turn>,
}

#[derive(Deserialize)]
struct ConversationDocument {
    id: ConversationId,
    created_at: DateTime<Utc>,
    #[serde(default)]
    turns: Vec<Turn>,
}

impl TryFrom<ConversationDocument> for Conversation {
    type Error = ProtocolViolation;

    fn try_from(doc: ConversationDocument) -> Result<Self, Self::Error> {
        let mut conversation = Self::from_turns(doc.turns)?;
        conversation.id = doc.id;
        conversation.created_at = doc.created_at;
        Ok(conversation)
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: ConversationId::new(),
            created_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    /// Build a conversation by appending each turn in order.
    pub fn from_turns(turns: impl IntoIterator<Item = Turn>) -> Result<Self, ProtocolViolation> {
        let mut conversation = Self::new();
        for turn in turns {
            conversation.append(turn)?;
        }
        Ok(conversation)
    }

    /// Validate and append a turn.
    pub fn append(&mut self, turn: Turn) -> Result<(), ProtocolViolation> {
        self.validate(&turn)?;
        self.turns.push(turn);
        Ok(())
    }

    /// Immutable ordered view of the history.
    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Tool use ids of the last assistant turn still awaiting results.
    pub fn pending_tool_uses(&self) -> Vec<&str> {
        match self.turns.last() {
            Some(turn) if turn.role == Role::Assistant => turn.tool_use_ids().collect(),
            _ => Vec::new(),
        }
    }

    fn validate(&self, turn: &Turn) -> Result<(), ProtocolViolation> {
        for block in turn.blocks() {
            let misplaced = matches!(
                (turn.role, block),
                (Role::User, ContentBlock::ToolUse { .. })
                    | (Role::Assistant, ContentBlock::ToolResult { .. })
            );
            if misplaced {
                return Err(ProtocolViolation::MisplacedBlock {
                    role: turn.role,
                    block: block.kind(),
                });
            }
        }

        let Some(previous) = self.turns.last() else {
            if turn.role != Role::User {
                return Err(ProtocolViolation::FirstTurnNotUser(turn.role));
            }
            if let Some(id) = turn.tool_result_ids().next() {
                return Err(ProtocolViolation::UnexpectedToolResult(id.to_string()));
            }
            return Ok(());
        };

        if previous.role == turn.role {
            return Err(ProtocolViolation::RoleNotAlternating(turn.role));
        }

        if turn.role == Role::User {
            let pending: Vec<&str> = previous.tool_use_ids().collect();
            let mut answered = HashSet::new();
            for id in turn.tool_result_ids() {
                if !pending.contains(&id) {
                    return Err(ProtocolViolation::UnexpectedToolResult(id.to_string()));
                }
                if !answered.insert(id) {
                    return Err(ProtocolViolation::DuplicateToolResult(id.to_string()));
                }
            }
            if let Some(missing) = pending.iter().find(|id| !answered.contains(*id)) {
                return Err(ProtocolViolation::UnansweredToolUse(missing.to_string()));
            }
        }

        Ok(())
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_use(id: &str) -> ContentBlock {
        ContentBlock::ToolUse {
            id: id.into(),
            name: "get_current_time".into(),
            input: json!({}),
        }
    }

    #[test]
    fn first_turn_must_be_user() {
        let mut conv = Conversation::new();
        let err = conv
            .append(Turn::assistant(vec![ContentBlock::text("hi")]))
            .unwrap_err();
        assert_eq!(err, ProtocolViolation::FirstTurnNotUser(Role::Assistant));
        assert!(conv.is_empty());
    }

    #[test]
    fn roles_must_alternate() {
        let mut conv = Conversation::new();
        conv.append(Turn::user("hello")).unwrap();
        let err = conv.append(Turn::user("again")).unwrap_err();
        assert_eq!(err, ProtocolViolation::RoleNotAlternating(Role::User));

        conv.append(Turn::assistant(vec![ContentBlock::text("hi")])).unwrap();
        let err = conv
            .append(Turn::assistant(vec![ContentBlock::text("more")]))
            .unwrap_err();
        assert_eq!(err, ProtocolViolation::RoleNotAlternating(Role::Assistant));
        assert_eq!(conv.len(), 2);
    }

    #[test]
    fn tool_uses_must_all_be_answered() {
        let mut conv = Conversation::new();
        conv.append(Turn::user("what time is it twice?")).unwrap();
        conv.append(Turn::assistant(vec![tool_use("t1"), tool_use("t2")])).unwrap();
        assert_eq!(conv.pending_tool_uses(), vec!["t1", "t2"]);

        let partial = Turn::user_blocks(vec![ContentBlock::tool_result("t1", "42", false)]);
        assert_eq!(
            conv.append(partial).unwrap_err(),
            ProtocolViolation::UnansweredToolUse("t2".into())
        );

        let stray = Turn::user_blocks(vec![
            ContentBlock::tool_result("t1", "42", false),
            ContentBlock::tool_result("t9", "?", false),
        ]);
        assert_eq!(
            conv.append(stray).unwrap_err(),
            ProtocolViolation::UnexpectedToolResult("t9".into())
        );

        let twice = Turn::user_blocks(vec![
            ContentBlock::tool_result("t1", "42", false),
            ContentBlock::tool_result("t1", "42", false),
        ]);
        assert_eq!(
            conv.append(twice).unwrap_err(),
            ProtocolViolation::DuplicateToolResult("t1".into())
        );

        conv.append(Turn::user_blocks(vec![
            ContentBlock::tool_result("t1", "42", false),
            ContentBlock::tool_result("t2", "43", true),
        ]))
        .unwrap();
        assert_eq!(conv.len(), 3);
        assert!(conv.pending_tool_uses().is_empty());
    }

    #[test]
    fn plain_text_cannot_answer_tool_use() {
        let mut conv = Conversation::new();
        conv.append(Turn::user("go")).unwrap();
        conv.append(Turn::assistant(vec![tool_use("t1")])).unwrap();
        assert_eq!(
            conv.append(Turn::user("never mind")).unwrap_err(),
            ProtocolViolation::UnansweredToolUse("t1".into())
        );
    }

    #[test]
    fn blocks_must_sit_in_the_right_role() {
        let mut conv = Conversation::new();
        let err = conv.append(Turn::user_blocks(vec![tool_use("t1")])).unwrap_err();
        assert_eq!(
            err,
            ProtocolViolation::MisplacedBlock {
                role: Role::User,
                block: "tool_use"
            }
        );
    }

    #[test]
    fn turn_text_concatenates_text_blocks() {
        let turn = Turn::assistant(vec![
            ContentBlock::text("Let me "),
            tool_use("t1"),
            ContentBlock::text("check."),
        ]);
        assert_eq!(turn.text(), "Let me check.");
        assert_eq!(turn.tool_use_ids().collect::<Vec<_>>(), vec!["t1"]);
    }

    #[test]
    fn content_block_wire_shape() {
        let json = serde_json::to_value(ContentBlock::tool_result("t1", "42", false)).unwrap();
        assert_eq!(json, json!({"type": "tool_result", "tool_use_id": "t1", "content": "42"}));

        let json = serde_json::to_value(ContentBlock::tool_result("t1", "boom", true)).unwrap();
        assert_eq!(json["is_error"], true);
    }

    #[test]
    fn conversation_document_is_flat_and_ordered() {
        let conv = Conversation::from_turns([
            Turn::user("hello"),
            Turn::assistant(vec![ContentBlock::text("Hi")]),
        ])
        .unwrap();

        let doc = serde_json::to_value(&conv).unwrap();
        assert_eq!(doc["turns"][0], json!({"role": "user", "content": "hello"}));
        assert_eq!(doc["turns"][1]["content"][0]["text"], "Hi");

        let restored: Conversation = serde_json::from_value(doc).unwrap();
        assert_eq!(restored, conv);
    }

    #[test]
    fn invalid_document_is_rejected_on_load() {
        let doc = json!({
            "id": "abc",
            "created_at": "2026-01-01T00:00:00Z",
            "turns": [{"role": "assistant", "content": "Hi"}]
        });
        assert!(serde_json::from_value::<Conversation>(doc).is_err());
    }
}
