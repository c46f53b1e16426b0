//! 交卷批改流程 - 流程层
//!
//! 流程顺序：
//! 1. 按题目顺序逐题判分
//! 2. 简答题交给模型裁决（失败时判错并写明原因）
//! 3. 汇总分数并保存成绩

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    AnswerValue, Difficulty, GradedQuestion, Question, QuestionType, Quiz, QuizResult,
    SubmittedAnswer, User,
};
use crate::services::grading::{
    apply_verdict, grade_question, parse_verdict, short_answer_messages, summarize, Verdict,
};
use crate::services::{ChatModel, GenerationParams};
use crate::store::QuizRepo;

/// 交卷请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitRequest {
    pub quiz_id: Option<String>,
    pub answers: Option<Vec<SubmittedAnswer>>,
    pub time_taken: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedQuestion {
    pub question_id: String,
    pub question_text: String,
    pub user_answer: AnswerValue,
    pub correct_answer: AnswerValue,
    pub is_correct: bool,
    pub partially_correct: bool,
    pub explanation: String,
    pub points: u32,
    pub earned_points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizBrief {
    pub id: String,
    pub title: String,
    pub course_code: String,
    pub course_title: String,
    pub topic: Option<String>,
    pub level: String,
    pub difficulty: Difficulty,
    pub num_questions: usize,
}

/// 成绩报告
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultReport {
    pub id: String,
    pub score: u32,
    pub max_score: u32,
    pub percentage: f64,
    pub time_taken: Option<u32>,
    pub completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz: Option<QuizBrief>,
    pub questions: Vec<ReportedQuestion>,
}

impl ResultReport {
    /// 组装报告，`with_quiz` 为 true 时附带测验概要
    pub fn new(result: &QuizResult, quiz: &Quiz, with_quiz: bool) -> Self {
        let questions = result
            .feedback
            .iter()
            .map(|graded| ReportedQuestion {
                question_id: graded.question_id.clone(),
                question_text: quiz
                    .questions
                    .iter()
                    .find(|q| q.id == graded.question_id)
                    .map(|q| q.question_text.clone())
                    .unwrap_or_default(),
                user_answer: graded.user_answer.clone(),
                correct_answer: graded.correct_answer.clone(),
                is_correct: graded.is_correct,
                partially_correct: graded.partially_correct,
                explanation: graded.explanation.clone(),
                points: graded.points,
                earned_points: graded.earned_points,
            })
            .collect();

        Self {
            id: result.id.clone(),
            score: result.score,
            max_score: result.max_score,
            percentage: result.percentage,
            time_taken: result.time_taken,
            completed_at: result.completed_at,
            quiz: with_quiz.then(|| QuizBrief {
                id: quiz.id.clone(),
                title: quiz.title.clone(),
                course_code: quiz.course_code.clone(),
                course_title: quiz.course_title.clone(),
                topic: quiz.topic.clone(),
                level: quiz.level.clone(),
                difficulty: quiz.difficulty,
                num_questions: quiz.num_questions,
            }),
            questions,
        }
    }
}

/// 批改流程
pub struct GradingFlow {
    model: Arc<dyn ChatModel>,
    quizzes: QuizRepo,
}

impl GradingFlow {
    /// 创建新的批改流程
    pub fn new(model: Arc<dyn ChatModel>, quizzes: QuizRepo) -> Self {
        Self { model, quizzes }
    }

    /// 批改并保存成绩
    pub async fn run(
        &self,
        user: &User,
        quiz: &Quiz,
        answers: Vec<SubmittedAnswer>,
        time_taken: Option<u32>,
    ) -> Result<QuizResult> {
        let mut questions: Vec<&Question> = quiz.questions.iter().collect();
        questions.sort_by_key(|q| q.order);

        let mut feedback = Vec::with_capacity(questions.len());
        for question in questions {
            let answer = answers
                .iter()
                .find(|a| a.question_id == question.id)
                .map(|a| &a.answer);
            let mut graded = grade_question(question, answer);

            if question.question_type == QuestionType::ShortAnswer {
                let verdict = self.judge_short_answer(question, &graded).await;
                apply_verdict(&mut graded, &verdict);
            }
            feedback.push(graded);
        }

        let summary = summarize(&feedback);
        let result = QuizResult {
            id: Uuid::new_v4().to_string(),
            quiz_id: quiz.id.clone(),
            user_id: user.id.clone(),
            answers,
            score: summary.score,
            max_score: summary.max_score,
            percentage: summary.percentage,
            time_taken,
            completed_at: Utc::now(),
            feedback,
        };

        self.quizzes.insert_result(&result).await?;
        info!(
            "✅ 测验 {} 批改完成: {}/{} ({:.1}%)",
            quiz.id, result.score, result.max_score, result.percentage
        );
        Ok(result)
    }

    async fn judge_short_answer(&self, question: &Question, graded: &GradedQuestion) -> Verdict {
        let messages = short_answer_messages(&question.question_text, graded);
        match self.model.complete(&messages, GenerationParams::GRADING).await {
            Ok(reply) => parse_verdict(&reply),
            Err(e) => {
                warn!("⚠️ 简答题 {} 模型批改失败: {:#}", question.id, e);
                Verdict::failed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_attaches_question_text_and_optional_quiz() {
        let quiz = Quiz {
            id: "quiz1".to_string(),
            title: "PCH201 - General Quiz".to_string(),
            course_code: "PCH201".to_string(),
            course_title: "Physical Chemistry".to_string(),
            topic: None,
            level: "200".to_string(),
            difficulty: Difficulty::Easy,
            num_questions: 1,
            time_limit: None,
            user_id: "u1".to_string(),
            created_at: Utc::now(),
            questions: vec![Question {
                id: "q1".to_string(),
                question_text: "Buffers resist pH change.".to_string(),
                question_type: QuestionType::TrueFalse,
                options: None,
                correct_answer: "True".to_string(),
                explanation: String::new(),
                points: 1,
                order: 1,
            }],
        };
        let graded = grade_question(&quiz.questions[0], Some(&AnswerValue::Text("True".to_string())));
        let summary = summarize(std::slice::from_ref(&graded));
        let result = QuizResult {
            id: "r1".to_string(),
            quiz_id: quiz.id.clone(),
            user_id: "u1".to_string(),
            answers: Vec::new(),
            score: summary.score,
            max_score: summary.max_score,
            percentage: summary.percentage,
            time_taken: Some(30),
            completed_at: Utc::now(),
            feedback: vec![graded],
        };

        let submit_view = serde_json::to_value(ResultReport::new(&result, &quiz, false)).unwrap();
        assert!(submit_view.get("quiz").is_none());
        assert_eq!(submit_view["questions"][0]["questionText"], "Buffers resist pH change.");
        assert_eq!(submit_view["percentage"], 100.0);

        let fetch_view = serde_json::to_value(ResultReport::new(&result, &quiz, true)).unwrap();
        assert_eq!(fetch_view["quiz"]["courseCode"], "PCH201");
    }
}
