use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 未命名会话的默认标题，清理接口按它识别空会话
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// 聊天会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ConversationMessage>,
}

/// 会话中的一条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// 保存会话的请求体：带 `id` 时整体替换消息，否则新建
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationInput {
    pub id: Option<String>,
    pub title: Option<String>,
    pub messages: Option<Vec<MessageInput>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageInput {
    pub role: String,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl ConversationInput {
    pub fn title_or_default(&self) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_TITLE)
            .to_string()
    }

    pub fn has_messages(&self) -> bool {
        self.messages.as_ref().is_some_and(|m| !m.is_empty())
    }
}
