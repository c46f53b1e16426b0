//! 文档记录

use super::db::{parse_timestamp, timestamp, Database};
use crate::error::AppResult;
use crate::models::DocumentRecord;

#[derive(Clone)]
pub struct DocumentRepo {
    db: Database,
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    document_id: String,
    title: Option<String>,
    file_name: Option<String>,
    course_code: Option<String>,
    course_title: Option<String>,
    professor_name: Option<String>,
    topic: Option<String>,
    level: Option<String>,
    chunks_count: i64,
    uploaded_at: String,
}

impl DocumentRow {
    fn into_record(self) -> AppResult<DocumentRecord> {
        Ok(DocumentRecord {
            uploaded_at: parse_timestamp("document", &self.uploaded_at)?,
            chunks_count: usize::try_from(self.chunks_count).unwrap_or_default(),
            document_id: self.document_id,
            title: self.title,
            file_name: self.file_name,
            course_code: self.course_code,
            course_title: self.course_title,
            professor_name: self.professor_name,
            topic: self.topic,
            level: self.level,
        })
    }
}

impl DocumentRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 同一 document_id 重复入库时覆盖旧记录
    pub async fn upsert(&self, document: &DocumentRecord) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO document (document_id, title, file_name, course_code, course_title,
                                   professor_name, topic, level, chunks_count, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(document_id) DO UPDATE SET
                title = excluded.title,
                file_name = excluded.file_name,
                course_code = excluded.course_code,
                course_title = excluded.course_title,
                professor_name = excluded.professor_name,
                topic = excluded.topic,
                level = excluded.level,
                chunks_count = excluded.chunks_count,
                uploaded_at = excluded.uploaded_at",
        )
        .bind(&document.document_id)
        .bind(&document.title)
        .bind(&document.file_name)
        .bind(&document.course_code)
        .bind(&document.course_title)
        .bind(&document.professor_name)
        .bind(&document.topic)
        .bind(&document.level)
        .bind(document.chunks_count as i64)
        .bind(timestamp(&document.uploaded_at))
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// 按入库时间升序
    pub async fn list(&self) -> AppResult<Vec<DocumentRecord>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            "SELECT document_id, title, file_name, course_code, course_title, professor_name,
                    topic, level, chunks_count, uploaded_at
             FROM document ORDER BY uploaded_at ASC, document_id ASC",
        )
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(DocumentRow::into_record).collect()
    }

    pub async fn remove(&self, document_id: &str) -> AppResult<bool> {
        let deleted = sqlx::query("DELETE FROM document WHERE document_id = ?1")
            .bind(document_id)
            .execute(self.db.as_ref())
            .await?;
        Ok(deleted.rows_affected() > 0)
    }
}
