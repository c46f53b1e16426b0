//! 出题流程 - 流程层
//!
//! 流程顺序：
//! 1. 按课程检索教学材料
//! 2. 分批请求模型出题（每批最多 7 道，最多 8 次）
//! 3. 解析、校验、去重
//! 4. 数量足够（或至少一半）时保存测验

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Difficulty, Question, QuestionType, Quiz, User};
use crate::services::quiz_parser::{parse_batch, GeneratedQuestion, QuestionPool};
use crate::services::search_service::{CourseFilters, SearchFilters};
use crate::services::{ChatMessage, ChatModel, GenerationParams, SearchRequest, SearchService};
use crate::store::QuizRepo;
use crate::workflow::quiz_ctx::QuizCtx;

pub const BATCH_SIZE: usize = 7;
pub const MAX_ATTEMPTS: usize = 8;
const QUIZ_MAX_CHUNKS: usize = 10;
const QUIZ_MIN_RELEVANCE: f64 = 0.6;

pub const PARTIAL_MESSAGE: &str = "Quality over quantity. We've generated the first set of questions for you. \
Finish these and refresh for a fresh challenge!";

/// 出题请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuizRequest {
    pub course_code: String,
    pub course_title: String,
    pub topic: Option<String>,
    pub level: String,
    pub num_questions: usize,
    pub question_type: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub time_limit: Option<u32>,
}

impl QuizRequest {
    /// courseCode / courseTitle / level 非空且题目数大于 0
    pub fn has_required_fields(&self) -> bool {
        !self.course_code.trim().is_empty()
            && !self.course_title.trim().is_empty()
            && !self.level.trim().is_empty()
            && self.num_questions > 0
    }

    /// 转换为出题上下文，题型无法识别时返回 None
    pub fn to_ctx(&self) -> Option<QuizCtx> {
        let question_type = self.question_type.as_deref()?.parse::<QuestionType>().ok()?;
        Some(QuizCtx {
            course_code: self.course_code.trim().to_string(),
            course_title: self.course_title.trim().to_string(),
            topic: self.topic.clone().filter(|t| !t.trim().is_empty()),
            level: self.level.trim().to_string(),
            question_type,
            difficulty: self.difficulty.unwrap_or_default(),
        })
    }
}

/// 出题结果
#[derive(Debug, Clone, PartialEq)]
pub enum QuizOutcome {
    /// 数量达标
    Complete(Quiz),
    /// 数量不足但至少一半
    Partial(Quiz),
    /// 没有检索到教学材料
    NoContent,
    /// 多次尝试后仍不足一半
    NotEnough { generated: usize },
}

/// 出题流程
///
/// - 编排检索、生成、校验、保存
/// - 决定何时重试、何时接受部分结果
/// - 只依赖业务能力（services）和记录存储
pub struct QuizFlow {
    search: Arc<SearchService>,
    model: Arc<dyn ChatModel>,
    quizzes: QuizRepo,
}

impl QuizFlow {
    /// 创建新的出题流程
    pub fn new(search: Arc<SearchService>, model: Arc<dyn ChatModel>, quizzes: QuizRepo) -> Self {
        Self {
            search,
            model,
            quizzes,
        }
    }

    pub async fn run(
        &self,
        user: &User,
        ctx: &QuizCtx,
        num_questions: usize,
        time_limit: Option<u32>,
    ) -> Result<QuizOutcome> {
        info!("{} 📝 开始出题，目标 {} 道", ctx, num_questions);

        let material = self.gather_material(ctx).await;
        if material.is_empty() {
            warn!("{} ⚠️ 没有检索到教学材料", ctx);
            return Ok(QuizOutcome::NoContent);
        }

        let pool = self.generate(ctx, &material, num_questions).await;
        let generated = pool.len();
        let minimum = num_questions.div_ceil(2);

        if generated < minimum {
            warn!("{} ⚠️ 仅生成 {} 道题，低于最低要求 {}", ctx, generated, minimum);
            return Ok(QuizOutcome::NotEnough { generated });
        }

        let quiz = build_quiz(user, ctx, pool.take(num_questions), time_limit);
        self.quizzes.insert_quiz(&quiz).await?;
        info!("{} ✅ 测验已保存: {} ({} 道题)", ctx, quiz.id, quiz.num_questions);

        if quiz.num_questions < num_questions {
            Ok(QuizOutcome::Partial(quiz))
        } else {
            Ok(QuizOutcome::Complete(quiz))
        }
    }

    /// 检索课程材料，分块正文以空行连接
    async fn gather_material(&self, ctx: &QuizCtx) -> String {
        let request = SearchRequest {
            query: ctx.search_query(),
            context: None,
            filters: SearchFilters {
                max_chunks: Some(QUIZ_MAX_CHUNKS),
                min_relevance: Some(QUIZ_MIN_RELEVANCE),
                course_filters: CourseFilters {
                    course_code: Some(ctx.course_code.clone()),
                    level: Some(ctx.level.clone()),
                },
                ..Default::default()
            },
        };

        match self.search.search(&request).await {
            Ok(response) => response
                .chunks
                .iter()
                .map(|hit| hit.chunk_text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            Err(e) => {
                warn!("{} ⚠️ 材料检索失败: {:#}", ctx, e);
                String::new()
            }
        }
    }

    /// 分批生成，直到数量足够或用完尝试次数
    async fn generate(&self, ctx: &QuizCtx, material: &str, num_questions: usize) -> QuestionPool {
        let mut pool = QuestionPool::new();

        for attempt in 1..=MAX_ATTEMPTS {
            let remaining = num_questions.saturating_sub(pool.len());
            if remaining == 0 {
                break;
            }
            let batch_size = remaining.min(BATCH_SIZE);

            let messages = vec![
                ChatMessage::system(batch_prompt(ctx, material, batch_size)),
                ChatMessage::user("Generate questions based on the above material."),
            ];

            let reply = match self.model.complete(&messages, GenerationParams::QUIZ).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("{} ⚠️ 第 {}/{} 次生成失败: {:#}", ctx, attempt, MAX_ATTEMPTS, e);
                    continue;
                }
            };

            let added = pool.add_batch(&parse_batch(&reply), ctx.question_type);
            info!(
                "{} 第 {}/{} 次生成: 新增 {} 道，累计 {}/{}",
                ctx,
                attempt,
                MAX_ATTEMPTS,
                added,
                pool.len(),
                num_questions
            );
        }

        pool
    }
}

fn build_quiz(
    user: &User,
    ctx: &QuizCtx,
    generated: Vec<GeneratedQuestion>,
    time_limit: Option<u32>,
) -> Quiz {
    let questions: Vec<Question> = generated
        .into_iter()
        .enumerate()
        .map(|(index, q)| Question {
            id: Uuid::new_v4().to_string(),
            correct_answer: q.stored_answer(),
            question_text: q.question_text,
            question_type: q.question_type,
            options: q.options,
            explanation: q.explanation,
            points: q.points,
            order: index + 1,
        })
        .collect();

    Quiz {
        id: Uuid::new_v4().to_string(),
        title: ctx.quiz_title(),
        course_code: ctx.course_code.clone(),
        course_title: ctx.course_title.clone(),
        topic: ctx.topic.clone(),
        level: ctx.level.clone(),
        difficulty: ctx.difficulty,
        num_questions: questions.len(),
        time_limit,
        user_id: user.id.clone(),
        created_at: Utc::now(),
        questions,
    }
}

/// 出题提示词
pub fn batch_prompt(ctx: &QuizCtx, material: &str, batch_size: usize) -> String {
    format!(
        r#"You are an expert exam setter for {code} - {title} at {level} level.

Using the following course material, generate {n} questions of type {kind}. The difficulty level should be {difficulty}.

MATERIAL:
{material}

INSTRUCTIONS:
1. For OBJECTIVE questions: Generate a question with 4 options. Only one option is correct, the rest are clearly incorrect. Mark the correct answer.
2. For MCQ questions: YOU MUST generate EXACTLY {n} questions. For each MCQ, generate EXACTLY 5 options. Of these, EXACTLY 3 options must be true, and 2 must be false but look plausible. Output the correct answers as an array of the 3 true options. DO NOT generate more or fewer than 5 options per question. DO NOT generate more or fewer than 3 correct answers per question.
3. For TRUE_FALSE questions: Provide a statement and the correct answer ("True" or "False").
4. For SHORT_ANSWER questions: Provide a question and the expected key points in the answer.
5. Each question should test understanding, not just memorization.
6. Include brief explanations for correct answers.
7. Questions should be relevant to the provided material.

RESPONSE FORMAT (JSON):
{{
  "questions": [
    {{
      "questionText": "...",
      "questionType": "OBJECTIVE" | "MCQ" | "TRUE_FALSE" | "SHORT_ANSWER",
      "options": ["...", ...],
      "correctAnswer": "...",
      "correctAnswers": ["...", ...],
      "explanation": "...",
      "points": 1
    }}
  ]
}}

Use "correctAnswer" for OBJECTIVE, TRUE_FALSE and SHORT_ANSWER, and "correctAnswers" (the 3 true options) for MCQ.
IMPORTANT: For MCQ, always generate 5 options (3 true, 2 false-but-plausible). Return ONLY valid JSON, no extra text, no comments, and no trailing commas. Do not include any explanations or markdown. Only output the JSON object."#,
        code = ctx.course_code,
        title = ctx.course_title,
        level = ctx.level,
        n = batch_size,
        kind = ctx.question_type,
        difficulty = ctx.difficulty,
        material = material,
    )
}
