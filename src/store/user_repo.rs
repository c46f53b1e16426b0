//! 用户表

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::db::{parse_timestamp, timestamp, Database};
use crate::error::{AppError, AppResult};
use crate::models::{User, UserUpdate};

#[derive(Clone)]
pub struct UserRepo {
    db: Database,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    name: Option<String>,
    level: Option<String>,
    created_at: String,
}

impl UserRow {
    fn into_user(self) -> AppResult<User> {
        Ok(User {
            created_at: parse_timestamp("users", &self.created_at)?,
            id: self.id,
            email: self.email,
            name: self.name,
            level: self.level,
        })
    }
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, name, level, created_at FROM users WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(UserRow::into_user).transpose()
    }

    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, email, name, level, created_at FROM users WHERE id = ?1")
                .bind(id)
                .fetch_optional(self.db.as_ref())
                .await?;
        row.map(UserRow::into_user).transpose()
    }

    /// 按邮箱获取用户，不存在时创建
    ///
    /// 已有用户只走一次查询；并发首次访问由 email 唯一约束兜住。
    pub async fn ensure(&self, email: &str) -> AppResult<User> {
        if let Some(user) = self.find_by_email(email).await? {
            return Ok(user);
        }

        let inserted = sqlx::query(
            "INSERT INTO users (id, email, name, level, created_at)
             VALUES (?1, ?2, NULL, NULL, ?3)
             ON CONFLICT(email) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(email)
        .bind(timestamp(&Utc::now()))
        .execute(self.db.as_ref())
        .await?;
        if inserted.rows_affected() > 0 {
            info!("新用户建档: {}", email);
        }

        self.find_by_email(email)
            .await?
            .ok_or_else(|| AppError::Other(format!("用户建档后未找到: {}", email)))
    }

    /// 只更新提交了的字段；空白 level 视为清空
    pub async fn update(&self, user_id: &str, update: UserUpdate) -> AppResult<Option<User>> {
        let level = update
            .level
            .map(|l| Some(l).filter(|l| !l.trim().is_empty()));

        let result = sqlx::query(
            "UPDATE users SET
                name = CASE WHEN ?2 THEN ?3 ELSE name END,
                level = CASE WHEN ?4 THEN ?5 ELSE level END
             WHERE id = ?1",
        )
        .bind(user_id)
        .bind(update.name.is_some())
        .bind(update.name)
        .bind(level.is_some())
        .bind(level.flatten())
        .execute(self.db.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db;

    #[tokio::test]
    async fn test_ensure_user_is_idempotent() {
        let repo = UserRepo::new(db::connect_memory().await.unwrap());
        let first = repo.ensure("ada@example.com").await.unwrap();
        let second = repo.ensure("ada@example.com").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.level, None);
    }

    #[tokio::test]
    async fn test_concurrent_first_visits_share_one_user() {
        let repo = UserRepo::new(db::connect_memory().await.unwrap());
        let (a, b) = tokio::join!(repo.ensure("ada@example.com"), repo.ensure("ada@example.com"));
        assert_eq!(a.unwrap().id, b.unwrap().id);
    }

    #[tokio::test]
    async fn test_update_only_touches_submitted_fields() {
        let repo = UserRepo::new(db::connect_memory().await.unwrap());
        let user = repo.ensure("ada@example.com").await.unwrap();

        let updated = repo
            .update(
                &user.id,
                UserUpdate {
                    name: Some("Ada".to_string()),
                    level: Some("200".to_string()),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name.as_deref(), Some("Ada"));
        assert_eq!(updated.level.as_deref(), Some("200"));

        let renamed = repo
            .update(
                &user.id,
                UserUpdate {
                    name: Some("Ada L.".to_string()),
                    level: None,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.level.as_deref(), Some("200"));

        let cleared = repo
            .update(
                &user.id,
                UserUpdate {
                    name: None,
                    level: Some("  ".to_string()),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cleared.level, None);
        assert_eq!(cleared.name.as_deref(), Some("Ada L."));

        assert!(repo.update("missing", UserUpdate::default()).await.unwrap().is_none());
    }
}
