//! 课表
//!
//! 同一 level/day/timeSlot 的唯一性由表上的 UNIQUE 约束保证，
//! 冲突以 [`SlotOutcome::Conflict`] 返回而不是错误。

use chrono::Utc;
use uuid::Uuid;

use super::db::{parse_timestamp, timestamp, Database};
use crate::error::AppResult;
use crate::models::{TimetableEntry, TimetableInput};

/// 课表写入结果
#[derive(Debug, Clone, PartialEq)]
pub enum SlotOutcome {
    Saved(TimetableEntry),
    /// 同一 level/day/timeSlot 已有其他条目
    Conflict,
    NotFound,
}

#[derive(Clone)]
pub struct TimetableRepo {
    db: Database,
}

#[derive(sqlx::FromRow)]
struct TimetableRow {
    id: String,
    level: String,
    day: String,
    time_slot: String,
    course_code: String,
    course_title: String,
    created_at: String,
    updated_at: String,
}

impl TimetableRow {
    fn into_entry(self) -> AppResult<TimetableEntry> {
        Ok(TimetableEntry {
            created_at: parse_timestamp("timetable", &self.created_at)?,
            updated_at: parse_timestamp("timetable", &self.updated_at)?,
            id: self.id,
            level: self.level,
            day: self.day,
            time_slot: self.time_slot,
            course_code: self.course_code,
            course_title: self.course_title,
        })
    }
}

const COLUMNS: &str =
    "id, level, day, time_slot, course_code, course_title, created_at, updated_at";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

impl TimetableRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 按 day、timeSlot 升序
    pub async fn for_level(&self, level: &str) -> AppResult<Vec<TimetableEntry>> {
        let rows: Vec<TimetableRow> = sqlx::query_as(&format!(
            "SELECT {} FROM timetable WHERE level = ?1 ORDER BY day ASC, time_slot ASC",
            COLUMNS
        ))
        .bind(level)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(TimetableRow::into_entry).collect()
    }

    async fn get(&self, id: &str) -> AppResult<Option<TimetableEntry>> {
        let row: Option<TimetableRow> =
            sqlx::query_as(&format!("SELECT {} FROM timetable WHERE id = ?1", COLUMNS))
                .bind(id)
                .fetch_optional(self.db.as_ref())
                .await?;
        row.map(TimetableRow::into_entry).transpose()
    }

    pub async fn create(&self, input: TimetableInput) -> AppResult<SlotOutcome> {
        let now = Utc::now();
        let entry = TimetableEntry {
            id: Uuid::new_v4().to_string(),
            level: input.level,
            day: input.day,
            time_slot: input.time_slot,
            course_code: input.course_code,
            course_title: input.course_title,
            created_at: now,
            updated_at: now,
        };

        let inserted = sqlx::query(
            "INSERT INTO timetable (id, level, day, time_slot, course_code, course_title,
                                    created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        )
        .bind(&entry.id)
        .bind(&entry.level)
        .bind(&entry.day)
        .bind(&entry.time_slot)
        .bind(&entry.course_code)
        .bind(&entry.course_title)
        .bind(timestamp(&now))
        .execute(self.db.as_ref())
        .await;

        match inserted {
            Ok(_) => Ok(SlotOutcome::Saved(entry)),
            Err(e) if is_unique_violation(&e) => Ok(SlotOutcome::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn update(&self, id: &str, input: TimetableInput) -> AppResult<SlotOutcome> {
        let updated = sqlx::query(
            "UPDATE timetable
             SET level = ?2, day = ?3, time_slot = ?4, course_code = ?5, course_title = ?6,
                 updated_at = ?7
             WHERE id = ?1",
        )
        .bind(id)
        .bind(&input.level)
        .bind(&input.day)
        .bind(&input.time_slot)
        .bind(&input.course_code)
        .bind(&input.course_title)
        .bind(timestamp(&Utc::now()))
        .execute(self.db.as_ref())
        .await;

        match updated {
            Ok(done) if done.rows_affected() == 0 => Ok(SlotOutcome::NotFound),
            Ok(_) => Ok(self
                .get(id)
                .await?
                .map_or(SlotOutcome::NotFound, SlotOutcome::Saved)),
            Err(e) if is_unique_violation(&e) => Ok(SlotOutcome::Conflict),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let deleted = sqlx::query("DELETE FROM timetable WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(deleted.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db;

    fn slot(level: &str, day: &str, time_slot: &str) -> TimetableInput {
        TimetableInput {
            level: level.to_string(),
            day: day.to_string(),
            time_slot: time_slot.to_string(),
            course_code: "PCH201".to_string(),
            course_title: "Physical Chemistry".to_string(),
        }
    }

    async fn repo() -> TimetableRepo {
        TimetableRepo::new(db::connect_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_timetable_slot_uniqueness() {
        let repo = repo().await;

        let SlotOutcome::Saved(entry) = repo.create(slot("200", "Monday", "08:00")).await.unwrap() else {
            panic!("应创建成功");
        };

        assert_eq!(
            repo.create(slot("200", "Monday", "08:00")).await.unwrap(),
            SlotOutcome::Conflict
        );
        // 其他年级同一时段不冲突
        let SlotOutcome::Saved(other) = repo.create(slot("300", "Monday", "08:00")).await.unwrap() else {
            panic!("其他年级应创建成功");
        };

        // 更新自身到同一时段不算冲突
        assert!(matches!(
            repo.update(&entry.id, slot("200", "Monday", "08:00")).await.unwrap(),
            SlotOutcome::Saved(_)
        ));
        // 移到别人的时段则冲突，且原条目不变
        assert_eq!(
            repo.update(&other.id, slot("200", "Monday", "08:00")).await.unwrap(),
            SlotOutcome::Conflict
        );
        assert_eq!(repo.for_level("300").await.unwrap().len(), 1);

        assert_eq!(
            repo.update("missing", slot("200", "Friday", "10:00")).await.unwrap(),
            SlotOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_timetable_sorted_by_day_then_slot() {
        let repo = repo().await;
        repo.create(slot("200", "Tuesday", "10:00")).await.unwrap();
        repo.create(slot("200", "Monday", "12:00")).await.unwrap();
        repo.create(slot("200", "Monday", "08:00")).await.unwrap();

        let keys: Vec<(String, String)> = repo
            .for_level("200")
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.day, e.time_slot))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("Monday".to_string(), "08:00".to_string()),
                ("Monday".to_string(), "12:00".to_string()),
                ("Tuesday".to_string(), "10:00".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_frees_the_slot() {
        let repo = repo().await;
        let SlotOutcome::Saved(entry) = repo.create(slot("200", "Monday", "08:00")).await.unwrap() else {
            panic!("应创建成功");
        };

        assert!(repo.delete(&entry.id).await.unwrap());
        assert!(!repo.delete(&entry.id).await.unwrap());
        assert!(matches!(
            repo.create(slot("200", "Monday", "08:00")).await.unwrap(),
            SlotOutcome::Saved(_)
        ));
    }
}
