//! 测验、题目与成绩
//!
//! 测验和它的题目在同一个事务里写入；成绩中的作答与逐题反馈以 JSON 列保存。

use std::collections::HashMap;

use sqlx::types::Json;

use super::db::{parse_timestamp, timestamp, to_count, Database};
use crate::error::{AppError, AppResult};
use crate::models::{
    Difficulty, GradedQuestion, Question, QuestionType, Quiz, QuizResult, SubmittedAnswer,
};

#[derive(Clone)]
pub struct QuizRepo {
    db: Database,
}

#[derive(sqlx::FromRow)]
struct QuizRow {
    id: String,
    title: String,
    course_code: String,
    course_title: String,
    topic: Option<String>,
    level: String,
    difficulty: String,
    num_questions: i64,
    time_limit: Option<i64>,
    user_id: String,
    created_at: String,
}

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: String,
    question_text: String,
    question_type: String,
    options: Option<Json<Vec<String>>>,
    correct_answer: String,
    explanation: String,
    points: i64,
    position: i64,
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    id: String,
    quiz_id: String,
    user_id: String,
    answers: Json<Vec<SubmittedAnswer>>,
    score: i64,
    max_score: i64,
    percentage: f64,
    time_taken: Option<i64>,
    completed_at: String,
    feedback: Json<Vec<GradedQuestion>>,
}

impl QuizRow {
    fn into_quiz(self, questions: Vec<Question>) -> AppResult<Quiz> {
        let difficulty = self
            .difficulty
            .parse::<Difficulty>()
            .map_err(|e| AppError::corrupt_row("quiz", e))?;
        Ok(Quiz {
            created_at: parse_timestamp("quiz", &self.created_at)?,
            num_questions: to_count("quiz", self.num_questions)? as usize,
            time_limit: self.time_limit.map(|t| to_count("quiz", t)).transpose()?,
            id: self.id,
            title: self.title,
            course_code: self.course_code,
            course_title: self.course_title,
            topic: self.topic,
            level: self.level,
            difficulty,
            user_id: self.user_id,
            questions,
        })
    }
}

impl QuestionRow {
    fn into_question(self) -> AppResult<Question> {
        let question_type = self
            .question_type
            .parse::<QuestionType>()
            .map_err(|e| AppError::corrupt_row("question", e))?;
        Ok(Question {
            points: to_count("question", self.points)?,
            order: to_count("question", self.position)? as usize,
            id: self.id,
            question_text: self.question_text,
            question_type,
            options: self.options.map(|Json(options)| options),
            correct_answer: self.correct_answer,
            explanation: self.explanation,
        })
    }
}

impl ResultRow {
    fn into_result(self) -> AppResult<QuizResult> {
        Ok(QuizResult {
            score: to_count("quiz_result", self.score)?,
            max_score: to_count("quiz_result", self.max_score)?,
            time_taken: self
                .time_taken
                .map(|t| to_count("quiz_result", t))
                .transpose()?,
            completed_at: parse_timestamp("quiz_result", &self.completed_at)?,
            id: self.id,
            quiz_id: self.quiz_id,
            user_id: self.user_id,
            answers: self.answers.0,
            percentage: self.percentage,
            feedback: self.feedback.0,
        })
    }
}

const QUIZ_COLUMNS: &str = "id, title, course_code, course_title, topic, level, difficulty, \
                            num_questions, time_limit, user_id, created_at";
const RESULT_COLUMNS: &str = "id, quiz_id, user_id, answers, score, max_score, percentage, \
                              time_taken, completed_at, feedback";

impl QuizRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// 保存测验及全部题目，任一条失败则整体回滚
    pub async fn insert_quiz(&self, quiz: &Quiz) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO quiz (id, title, course_code, course_title, topic, level, difficulty,
                               num_questions, time_limit, user_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&quiz.id)
        .bind(&quiz.title)
        .bind(&quiz.course_code)
        .bind(&quiz.course_title)
        .bind(&quiz.topic)
        .bind(&quiz.level)
        .bind(quiz.difficulty.to_string())
        .bind(quiz.num_questions as i64)
        .bind(quiz.time_limit)
        .bind(&quiz.user_id)
        .bind(timestamp(&quiz.created_at))
        .execute(&mut *tx)
        .await?;

        for question in &quiz.questions {
            sqlx::query(
                "INSERT INTO question (id, quiz_id, question_text, question_type, options,
                                       correct_answer, explanation, points, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(&question.id)
            .bind(&quiz.id)
            .bind(&question.question_text)
            .bind(question.question_type.as_str())
            .bind(question.options.as_ref().map(Json))
            .bind(&question.correct_answer)
            .bind(&question.explanation)
            .bind(question.points)
            .bind(question.order as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_quiz(&self, quiz_id: &str) -> AppResult<Option<Quiz>> {
        let row: Option<QuizRow> =
            sqlx::query_as(&format!("SELECT {} FROM quiz WHERE id = ?1", QUIZ_COLUMNS))
                .bind(quiz_id)
                .fetch_optional(self.db.as_ref())
                .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let questions = self.questions_of(quiz_id).await?;
        row.into_quiz(questions).map(Some)
    }

    async fn questions_of(&self, quiz_id: &str) -> AppResult<Vec<Question>> {
        let rows: Vec<QuestionRow> = sqlx::query_as(
            "SELECT id, question_text, question_type, options, correct_answer, explanation,
                    points, position
             FROM question WHERE quiz_id = ?1 ORDER BY position ASC",
        )
        .bind(quiz_id)
        .fetch_all(self.db.as_ref())
        .await?;
        rows.into_iter().map(QuestionRow::into_question).collect()
    }

    pub async fn insert_result(&self, result: &QuizResult) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO quiz_result (id, quiz_id, user_id, answers, score, max_score, percentage,
                                      time_taken, completed_at, feedback)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&result.id)
        .bind(&result.quiz_id)
        .bind(&result.user_id)
        .bind(Json(&result.answers))
        .bind(result.score)
        .bind(result.max_score)
        .bind(result.percentage)
        .bind(result.time_taken)
        .bind(timestamp(&result.completed_at))
        .bind(Json(&result.feedback))
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// 只返回属于该用户的成绩
    pub async fn get_result(&self, result_id: &str, user_id: &str) -> AppResult<Option<QuizResult>> {
        let row: Option<ResultRow> = sqlx::query_as(&format!(
            "SELECT {} FROM quiz_result WHERE id = ?1 AND user_id = ?2",
            RESULT_COLUMNS
        ))
        .bind(result_id)
        .bind(user_id)
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(ResultRow::into_result).transpose()
    }

    /// 用户的全部成绩及对应测验，按完成时间倒序
    pub async fn results_with_quizzes(&self, user_id: &str) -> AppResult<Vec<(QuizResult, Quiz)>> {
        let rows: Vec<ResultRow> = sqlx::query_as(&format!(
            "SELECT {} FROM quiz_result WHERE user_id = ?1 ORDER BY completed_at DESC",
            RESULT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(self.db.as_ref())
        .await?;

        let mut quizzes: HashMap<String, Option<Quiz>> = HashMap::new();
        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let result = row.into_result()?;
            if !quizzes.contains_key(&result.quiz_id) {
                let quiz = self.get_quiz(&result.quiz_id).await?;
                quizzes.insert(result.quiz_id.clone(), quiz);
            }
            if let Some(Some(quiz)) = quizzes.get(&result.quiz_id) {
                pairs.push((result, quiz.clone()));
            }
        }
        Ok(pairs)
    }
}
