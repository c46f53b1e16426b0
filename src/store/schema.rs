//! 建表语句
//!
//! 全部使用 `IF NOT EXISTS`，每次启动都可重复执行。

use sqlx::SqlitePool;

use crate::error::AppResult;

pub async fn bootstrap_schema(pool: &SqlitePool) -> AppResult<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS users (
    id              TEXT PRIMARY KEY NOT NULL,
    email           TEXT NOT NULL UNIQUE,
    name            TEXT,
    level           TEXT,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS quiz (
    id              TEXT PRIMARY KEY NOT NULL,
    title           TEXT NOT NULL,
    course_code     TEXT NOT NULL,
    course_title    TEXT NOT NULL,
    topic           TEXT,
    level           TEXT NOT NULL,
    difficulty      TEXT NOT NULL CHECK(difficulty IN ('easy','medium','hard')),
    num_questions   INTEGER NOT NULL,
    time_limit      INTEGER,
    user_id         TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS question (
    id              TEXT PRIMARY KEY NOT NULL,
    quiz_id         TEXT NOT NULL REFERENCES quiz(id) ON DELETE CASCADE,
    question_text   TEXT NOT NULL,
    question_type   TEXT NOT NULL CHECK(question_type IN ('MCQ','TRUE_FALSE','OBJECTIVE','SHORT_ANSWER')),
    options         TEXT,
    correct_answer  TEXT NOT NULL,
    explanation     TEXT NOT NULL,
    points          INTEGER NOT NULL,
    position        INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS quiz_result (
    id              TEXT PRIMARY KEY NOT NULL,
    quiz_id         TEXT NOT NULL REFERENCES quiz(id) ON DELETE CASCADE,
    user_id         TEXT NOT NULL,
    answers         TEXT NOT NULL,
    score           INTEGER NOT NULL,
    max_score       INTEGER NOT NULL,
    percentage      REAL NOT NULL,
    time_taken      INTEGER,
    completed_at    TEXT NOT NULL,
    feedback        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS timetable (
    id              TEXT PRIMARY KEY NOT NULL,
    level           TEXT NOT NULL,
    day             TEXT NOT NULL,
    time_slot       TEXT NOT NULL,
    course_code     TEXT NOT NULL,
    course_title    TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE(level, day, time_slot)
);

CREATE TABLE IF NOT EXISTS document (
    document_id     TEXT PRIMARY KEY NOT NULL,
    title           TEXT,
    file_name       TEXT,
    course_code     TEXT,
    course_title    TEXT,
    professor_name  TEXT,
    topic           TEXT,
    level           TEXT,
    chunks_count    INTEGER NOT NULL,
    uploaded_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversation (
    id              TEXT PRIMARY KEY NOT NULL,
    user_id         TEXT NOT NULL,
    title           TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS message (
    id              TEXT PRIMARY KEY NOT NULL,
    conversation_id TEXT NOT NULL REFERENCES conversation(id) ON DELETE CASCADE,
    role            TEXT NOT NULL,
    content         TEXT NOT NULL,
    position        INTEGER NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_question_quiz ON question(quiz_id);
CREATE INDEX IF NOT EXISTS idx_result_user ON quiz_result(user_id, completed_at);
CREATE INDEX IF NOT EXISTS idx_conversation_user ON conversation(user_id, updated_at);
CREATE INDEX IF NOT EXISTS idx_message_conversation ON message(conversation_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
