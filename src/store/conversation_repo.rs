//! 聊天会话与消息
//!
//! 保存会话时整体替换消息列表；消息按提交顺序记录 `position`。

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use uuid::Uuid;

use super::db::{parse_timestamp, timestamp, Database};
use crate::error::{AppError, AppResult};
use crate::models::{
    Conversation, ConversationInput, ConversationMessage, MessageInput, DEFAULT_CONVERSATION_TITLE,
};

#[derive(Clone)]
pub struct ConversationRepo {
    db: Database,
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    user_id: String,
    title: String,
    created_at: String,
    updated_at: String,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    role: String,
    content: String,
    created_at: String,
}

impl ConversationRow {
    fn into_conversation(self, messages: Vec<ConversationMessage>) -> AppResult<Conversation> {
        Ok(Conversation {
            created_at: parse_timestamp("conversation", &self.created_at)?,
            updated_at: parse_timestamp("conversation", &self.updated_at)?,
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            messages,
        })
    }
}

impl MessageRow {
    fn into_message(self) -> AppResult<ConversationMessage> {
        Ok(ConversationMessage {
            created_at: parse_timestamp("message", &self.created_at)?,
            id: self.id,
            conversation_id: self.conversation_id,
            role: self.role,
            content: self.content,
        })
    }
}

async fn insert_messages(
    tx: &mut Transaction<'_, Sqlite>,
    conversation_id: &str,
    messages: &[MessageInput],
    now: &DateTime<Utc>,
) -> AppResult<()> {
    for (position, message) in messages.iter().enumerate() {
        sqlx::query(
            "INSERT INTO message (id, conversation_id, role, content, position, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(conversation_id)
        .bind(&message.role)
        .bind(&message.content)
        .bind(position as i64)
        .bind(timestamp(message.created_at.as_ref().unwrap_or(now)))
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

impl ConversationRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 用户最近更新的会话，每个会话最多带 `message_limit` 条最早的消息
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: u32,
        message_limit: u32,
    ) -> AppResult<Vec<Conversation>> {
        let rows: Vec<ConversationRow> = sqlx::query_as(
            "SELECT id, user_id, title, created_at, updated_at FROM conversation
             WHERE user_id = ?1 ORDER BY updated_at DESC LIMIT ?2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.db.as_ref())
        .await?;

        let mut conversations = Vec::with_capacity(rows.len());
        for row in rows {
            let messages = self.messages_of(&row.id, Some(message_limit)).await?;
            conversations.push(row.into_conversation(messages)?);
        }
        Ok(conversations)
    }

    /// 只返回属于该用户的会话
    pub async fn get(&self, id: &str, user_id: &str) -> AppResult<Option<Conversation>> {
        let row: Option<ConversationRow> = sqlx::query_as(
            "SELECT id, user_id, title, created_at, updated_at FROM conversation
             WHERE id = ?1 AND user_id = ?2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.db.as_ref())
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let messages = self.messages_of(id, None).await?;
        row.into_conversation(messages).map(Some)
    }

    async fn messages_of(
        &self,
        conversation_id: &str,
        limit: Option<u32>,
    ) -> AppResult<Vec<ConversationMessage>> {
        // LIMIT -1 表示不限
        let limit = limit.map_or(-1, i64::from);
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, conversation_id, role, content, created_at FROM message
             WHERE conversation_id = ?1 ORDER BY position ASC LIMIT ?2",
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(MessageRow::into_message).collect()
    }

    pub async fn create(&self, user_id: &str, input: &ConversationInput) -> AppResult<Conversation> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO conversation (id, user_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(input.title_or_default())
        .bind(timestamp(&now))
        .execute(&mut *tx)
        .await?;
        insert_messages(&mut tx, &id, input.messages.as_deref().unwrap_or_default(), &now).await?;
        tx.commit().await?;

        self.get(&id, user_id)
            .await?
            .ok_or_else(|| AppError::Other(format!("会话写入后未找到: {}", id)))
    }

    /// 替换会话的消息，标题只在提交时更新；会话不存在或不属于该用户时返回 None
    pub async fn replace(
        &self,
        id: &str,
        user_id: &str,
        input: &ConversationInput,
    ) -> AppResult<Option<Conversation>> {
        let now = Utc::now();
        let title = input
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let mut tx = self.db.begin().await?;

        let updated = sqlx::query(
            "UPDATE conversation SET title = COALESCE(?3, title), updated_at = ?4
             WHERE id = ?1 AND user_id = ?2",
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(timestamp(&now))
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        sqlx::query("DELETE FROM message WHERE conversation_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_messages(&mut tx, id, input.messages.as_deref().unwrap_or_default(), &now).await?;
        tx.commit().await?;

        self.get(id, user_id).await
    }

    /// 删除会话及其消息，只删除属于该用户的
    pub async fn delete(&self, id: &str, user_id: &str) -> AppResult<bool> {
        let deleted = sqlx::query("DELETE FROM conversation WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(self.db.as_ref())
            .await?;
        Ok(deleted.rows_affected() > 0)
    }

    /// 删除用户所有仍是默认标题的会话
    pub async fn delete_untitled(&self, user_id: &str) -> AppResult<u64> {
        let deleted = sqlx::query("DELETE FROM conversation WHERE user_id = ?1 AND title = ?2")
            .bind(user_id)
            .bind(DEFAULT_CONVERSATION_TITLE)
            .execute(self.db.as_ref())
            .await?;
        Ok(deleted.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db;

    fn message(role: &str, content: &str) -> MessageInput {
        MessageInput {
            role: role.to_string(),
            content: content.to_string(),
            created_at: None,
        }
    }

    fn input(title: Option<&str>, messages: Vec<MessageInput>) -> ConversationInput {
        ConversationInput {
            id: None,
            title: title.map(str::to_string),
            messages: Some(messages),
        }
    }

    async fn repo() -> ConversationRepo {
        ConversationRepo::new(db::connect_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_create_keeps_message_order_and_default_title() {
        let repo = repo().await;
        let created = repo
            .create(
                "u1",
                &input(
                    None,
                    vec![message("user", "What is a buffer?"), message("assistant", "A solution...")],
                ),
            )
            .await
            .unwrap();

        assert_eq!(created.title, DEFAULT_CONVERSATION_TITLE);
        let roles: Vec<&str> = created.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant"]);
        assert!(created.messages.iter().all(|m| m.conversation_id == created.id));
    }

    #[tokio::test]
    async fn test_replace_swaps_messages_for_owner_only() {
        let repo = repo().await;
        let created = repo
            .create("u1", &input(Some("Buffers"), vec![message("user", "hi")]))
            .await
            .unwrap();

        let replacement = input(
            None,
            vec![message("user", "hi"), message("assistant", "hello"), message("user", "pH?")],
        );
        assert!(repo.replace(&created.id, "u2", &replacement).await.unwrap().is_none());

        let replaced = repo.replace(&created.id, "u1", &replacement).await.unwrap().unwrap();
        assert_eq!(replaced.title, "Buffers");
        assert_eq!(replaced.messages.len(), 3);
        assert_eq!(replaced.messages[2].content, "pH?");
        assert!(replaced.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_list_limits_conversations_and_messages() {
        let repo = repo().await;
        let older = repo
            .create("u1", &input(Some("Older"), vec![message("user", "a"), message("assistant", "b")]))
            .await
            .unwrap();
        let newer = repo.create("u1", &input(Some("Newer"), vec![])).await.unwrap();
        repo.create("u2", &input(Some("Someone else"), vec![])).await.unwrap();

        // 替换会刷新 updated_at，把较早的会话顶到最前
        let longer = input(
            None,
            vec![message("user", "a"), message("assistant", "b"), message("user", "c")],
        );
        repo.replace(&older.id, "u1", &longer).await.unwrap();

        let listed = repo.list_for_user("u1", 10, 2).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![older.id.as_str(), newer.id.as_str()]);
        assert_eq!(listed[0].messages.len(), 2);
        assert_eq!(listed[0].messages[0].content, "a");

        assert_eq!(repo.list_for_user("u1", 1, 50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_cleanup_are_owner_scoped() {
        let repo = repo().await;
        let named = repo
            .create("u1", &input(Some("Buffers"), vec![message("user", "hi")]))
            .await
            .unwrap();
        repo.create("u1", &input(None, vec![])).await.unwrap();
        repo.create("u1", &input(Some("  "), vec![])).await.unwrap();
        repo.create("u2", &input(None, vec![])).await.unwrap();

        assert_eq!(repo.delete_untitled("u1").await.unwrap(), 2);
        assert_eq!(repo.list_for_user("u2", 10, 50).await.unwrap().len(), 1);

        assert!(!repo.delete(&named.id, "u2").await.unwrap());
        assert!(repo.delete(&named.id, "u1").await.unwrap());
        assert!(repo.get(&named.id, "u1").await.unwrap().is_none());

        let orphans: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM message")
            .fetch_one(repo.db.as_ref())
            .await
            .unwrap();
        assert_eq!(orphans.0, 0);
    }
}
