//! 批改能力
//!
//! 客观题（MCQ / OBJECTIVE / TRUE_FALSE）在这里直接判分；
//! 简答题只负责拼装批改提示词和解析模型裁决，实际调用由工作流完成。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::{AnswerValue, GradedQuestion, Question, QuestionType};
use crate::services::llm_service::ChatMessage;
use crate::services::quiz_parser::{extract_json_span, repair_json, MCQ_CORRECT_COUNT};

pub const INVALID_RESPONSE_EXPLANATION: &str = "AI did not return a valid response.";
pub const GRADING_FAILED_EXPLANATION: &str = "AI grading failed.";

const GRADER_INSTRUCTION: &str = "You are an expert grader. Compare the student's answer with the expected answer. \
If they mean the same thing, mark it correct. \
Return a JSON like { 'verdict': 'correct' | 'incorrect', 'explanation': '...' }.";

/// 解析存储的 MCQ 答案（JSON 数组字符串），失败时视为单个选项
pub fn parse_stored_choices(stored: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(stored) {
        Ok(choices) => choices,
        Err(_) if stored.is_empty() => Vec::new(),
        Err(_) => vec![stored.to_string()],
    }
}

/// 必须恰好选 3 项且与正确答案集合完全一致
pub fn mcq_is_correct(user: &[String], correct: &[String]) -> bool {
    if user.len() != MCQ_CORRECT_COUNT || correct.len() != MCQ_CORRECT_COUNT {
        return false;
    }
    let user_set: HashSet<&String> = user.iter().collect();
    let correct_set: HashSet<&String> = correct.iter().collect();
    user.iter().all(|a| correct_set.contains(a)) && correct.iter().all(|a| user_set.contains(a))
}

/// 判分（简答题先记为错误，等待模型裁决）
pub fn grade_question(question: &Question, answer: Option<&AnswerValue>) -> GradedQuestion {
    let answer = answer.cloned().unwrap_or_default();

    let (user_answer, correct_answer, is_correct) = match question.question_type {
        QuestionType::Mcq => {
            let correct = parse_stored_choices(&question.correct_answer);
            let user = answer.to_choices();
            let is_correct = mcq_is_correct(&user, &correct);
            (AnswerValue::Choices(user), AnswerValue::Choices(correct), is_correct)
        }
        QuestionType::Objective | QuestionType::TrueFalse => {
            let is_correct = matches!(&answer, AnswerValue::Text(text) if *text == question.correct_answer);
            (answer, AnswerValue::Text(question.correct_answer.clone()), is_correct)
        }
        QuestionType::ShortAnswer => (
            answer,
            AnswerValue::Text(question.correct_answer.clone()),
            false,
        ),
    };

    GradedQuestion {
        question_id: question.id.clone(),
        user_answer,
        correct_answer,
        is_correct,
        partially_correct: false,
        explanation: question.explanation.clone(),
        points: question.points,
        earned_points: if is_correct { question.points } else { 0 },
    }
}

/// 简答题批改结论
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Verdict {
    #[serde(default)]
    pub verdict: String,
    #[serde(default)]
    pub explanation: String,
}

impl Verdict {
    pub fn invalid() -> Self {
        Self {
            verdict: "incorrect".to_string(),
            explanation: INVALID_RESPONSE_EXPLANATION.to_string(),
        }
    }

    pub fn failed() -> Self {
        Self {
            verdict: "incorrect".to_string(),
            explanation: GRADING_FAILED_EXPLANATION.to_string(),
        }
    }

    pub fn is_correct(&self) -> bool {
        self.verdict.trim().eq_ignore_ascii_case("correct")
    }
}

/// 从模型回复中读取裁决
pub fn parse_verdict(reply: &str) -> Verdict {
    let Some(span) = extract_json_span(reply) else {
        return Verdict::invalid();
    };

    serde_json::from_str::<Verdict>(span)
        .or_else(|_| serde_json::from_str::<Verdict>(&repair_json(&span.replace('\'', "\""))))
        .unwrap_or_else(|_| Verdict::invalid())
}

/// 应用裁决
pub fn apply_verdict(graded: &mut GradedQuestion, verdict: &Verdict) {
    graded.is_correct = verdict.is_correct();
    graded.earned_points = if graded.is_correct { graded.points } else { 0 };
    graded.explanation = verdict.explanation.clone();
}

/// 简答题批改消息
pub fn short_answer_messages(question_text: &str, graded: &GradedQuestion) -> Vec<ChatMessage> {
    let payload = json!({
        "question": question_text,
        "expected_answer": graded.correct_answer,
        "student_answer": graded.user_answer,
        "instruction": GRADER_INSTRUCTION,
    });

    vec![
        ChatMessage::system(GRADER_INSTRUCTION),
        ChatMessage::user(payload.to_string()),
    ]
}

/// 总分统计
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub score: u32,
    pub max_score: u32,
    pub percentage: f64,
}

pub fn summarize(graded: &[GradedQuestion]) -> ScoreSummary {
    let score: u64 = graded.iter().map(|g| u64::from(g.earned_points)).sum();
    let max_score: u64 = graded.iter().map(|g| u64::from(g.points)).sum();
    let percentage = if max_score > 0 {
        score as f64 / max_score as f64 * 100.0
    } else {
        0.0
    };

    ScoreSummary {
        score: u32::try_from(score).unwrap_or(u32::MAX),
        max_score: u32::try_from(max_score).unwrap_or(u32::MAX),
        percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(question_type: QuestionType, correct: &str, points: u32) -> Question {
        Question {
            id: "q1".to_string(),
            question_text: "text".to_string(),
            question_type,
            options: None,
            correct_answer: correct.to_string(),
            explanation: "because".to_string(),
            points,
            order: 1,
        }
    }

    fn choices(items: &[&str]) -> AnswerValue {
        AnswerValue::Choices(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_mcq_requires_exact_three_choice_set() {
        let q = question(QuestionType::Mcq, r#"["a","b","c"]"#, 2);

        let graded = grade_question(&q, Some(&choices(&["c", "a", "b"])));
        assert!(graded.is_correct);
        assert_eq!(graded.earned_points, 2);
        assert_eq!(graded.correct_answer, choices(&["a", "b", "c"]));

        assert!(!grade_question(&q, Some(&choices(&["a", "b"]))).is_correct);
        assert!(!grade_question(&q, Some(&choices(&["a", "b", "c", "d"]))).is_correct);
        assert!(!grade_question(&q, Some(&choices(&["a", "a", "b"]))).is_correct);
        assert!(!grade_question(&q, None).is_correct);
    }

    #[test]
    fn test_stored_choices_fallback_to_single_entry() {
        assert_eq!(parse_stored_choices("not json"), vec!["not json"]);
        assert!(parse_stored_choices("").is_empty());
    }

    #[test]
    fn test_objective_uses_exact_equality() {
        let q = question(QuestionType::TrueFalse, "True", 1);
        assert!(grade_question(&q, Some(&AnswerValue::Text("True".to_string()))).is_correct);
        assert!(!grade_question(&q, Some(&AnswerValue::Text("true".to_string()))).is_correct);
    }

    #[test]
    fn test_parse_verdict_variants() {
        let ok = parse_verdict("Sure! {\"verdict\": \"correct\", \"explanation\": \"Same meaning.\"}");
        assert!(ok.is_correct());
        assert_eq!(ok.explanation, "Same meaning.");

        let single_quoted = parse_verdict("{ 'verdict': 'incorrect', 'explanation': 'Missing key point' }");
        assert!(!single_quoted.is_correct());
        assert_eq!(single_quoted.explanation, "Missing key point");

        assert_eq!(parse_verdict("I think it is right"), Verdict::invalid());
    }

    #[test]
    fn test_apply_verdict_and_summary() {
        let q = question(QuestionType::ShortAnswer, "Resists pH change", 3);
        let mut graded = grade_question(&q, Some(&AnswerValue::Text("keeps pH stable".to_string())));
        assert!(!graded.is_correct);

        apply_verdict(
            &mut graded,
            &Verdict {
                verdict: "correct".to_string(),
                explanation: "Equivalent".to_string(),
            },
        );
        assert_eq!(graded.earned_points, 3);

        let other = grade_question(&question(QuestionType::TrueFalse, "False", 1), None);
        let summary = summarize(&[graded, other]);
        assert_eq!(summary.score, 3);
        assert_eq!(summary.max_score, 4);
        assert!((summary.percentage - 75.0).abs() < f64::EPSILON);

        assert_eq!(summarize(&[]).percentage, 0.0);
    }

    #[test]
    fn test_summary_saturates_instead_of_overflowing() {
        let q = question(QuestionType::TrueFalse, "True", u32::MAX);
        let answer = AnswerValue::Text("True".to_string());
        let graded = vec![
            grade_question(&q, Some(&answer)),
            grade_question(&q, Some(&answer)),
        ];

        let summary = summarize(&graded);
        assert_eq!(summary.score, u32::MAX);
        assert_eq!(summary.max_score, u32::MAX);
        assert!((summary.percentage - 100.0).abs() < f64::EPSILON);
    }
}
