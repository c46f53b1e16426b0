use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    /// 五选三多选题
    Mcq,
    /// 判断题
    TrueFalse,
    /// 四选一单选题
    Objective,
    /// 简答题（LLM 批改）
    ShortAnswer,
}

/// 题型别名表，LLM 输出的题型字段并不总是规范写法
static QUESTION_TYPE_ALIASES: phf::Map<&'static str, QuestionType> = phf::phf_map! {
    "MCQ" => QuestionType::Mcq,
    "MULTIPLE_CHOICE" => QuestionType::Mcq,
    "MULTI_SELECT" => QuestionType::Mcq,
    "TRUE_FALSE" => QuestionType::TrueFalse,
    "TRUEFALSE" => QuestionType::TrueFalse,
    "BOOLEAN" => QuestionType::TrueFalse,
    "OBJECTIVE" => QuestionType::Objective,
    "SINGLE_CHOICE" => QuestionType::Objective,
    "SHORT_ANSWER" => QuestionType::ShortAnswer,
    "SHORTANSWER" => QuestionType::ShortAnswer,
    "THEORY" => QuestionType::ShortAnswer,
};

impl QuestionType {
    /// 标准名称
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::Mcq => "MCQ",
            QuestionType::TrueFalse => "TRUE_FALSE",
            QuestionType::Objective => "OBJECTIVE",
            QuestionType::ShortAnswer => "SHORT_ANSWER",
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['-', ' ', '/'], "_");
        QUESTION_TYPE_ALIASES
            .get(normalized.as_str())
            .copied()
            .ok_or_else(|| format!("未知题型: {}", s))
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 难度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(format!("未知难度: {}", s)),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        f.write_str(s)
    }
}

/// 题目（含答案，仅存储与批改时使用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub question_text: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    /// MCQ 存储为 JSON 数组字符串，其他题型为纯文本
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
    pub points: u32,
    /// 从 1 开始
    pub order: usize,
}

/// 测验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    pub title: String,
    pub course_code: String,
    pub course_title: String,
    pub topic: Option<String>,
    pub level: String,
    pub difficulty: Difficulty,
    pub num_questions: usize,
    pub time_limit: Option<u32>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub questions: Vec<Question>,
}

/// 对外展示的题目（不含答案和解析）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: String,
    pub question_text: String,
    pub question_type: QuestionType,
    pub options: Option<Vec<String>>,
    pub order: usize,
}

/// 对外展示的测验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuiz {
    pub id: String,
    pub title: String,
    pub course_code: String,
    pub course_title: String,
    pub topic: Option<String>,
    pub level: String,
    pub difficulty: Difficulty,
    pub num_questions: usize,
    pub time_limit: Option<u32>,
    pub questions: Vec<PublicQuestion>,
}

impl Quiz {
    /// 去掉答案后的视图
    pub fn public_view(&self) -> PublicQuiz {
        let mut questions: Vec<PublicQuestion> = self
            .questions
            .iter()
            .map(|q| PublicQuestion {
                id: q.id.clone(),
                question_text: q.question_text.clone(),
                question_type: q.question_type,
                options: q.options.clone(),
                order: q.order,
            })
            .collect();
        questions.sort_by_key(|q| q.order);

        PublicQuiz {
            id: self.id.clone(),
            title: self.title.clone(),
            course_code: self.course_code.clone(),
            course_title: self.course_title.clone(),
            topic: self.topic.clone(),
            level: self.level.clone(),
            difficulty: self.difficulty,
            num_questions: self.num_questions,
            time_limit: self.time_limit,
            questions,
        }
    }
}

/// 作答内容：单选/判断/简答为字符串，多选为数组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Choices(Vec<String>),
}

impl Default for AnswerValue {
    fn default() -> Self {
        AnswerValue::Text(String::new())
    }
}

impl AnswerValue {
    /// 转为选项列表，空字符串视为未作答
    pub fn to_choices(&self) -> Vec<String> {
        match self {
            AnswerValue::Choices(items) => items.clone(),
            AnswerValue::Text(s) if s.is_empty() => Vec::new(),
            AnswerValue::Text(s) => vec![s.clone()],
        }
    }

    /// 转为文本，多选答案以逗号连接
    pub fn to_text(&self) -> String {
        match self {
            AnswerValue::Text(s) => s.clone(),
            AnswerValue::Choices(items) => items.join(", "),
        }
    }
}

/// 提交的单题答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    #[serde(default)]
    pub answer: AnswerValue,
}

/// 单题批改结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedQuestion {
    pub question_id: String,
    pub user_answer: AnswerValue,
    pub correct_answer: AnswerValue,
    pub is_correct: bool,
    #[serde(default)]
    pub partially_correct: bool,
    pub explanation: String,
    pub points: u32,
    pub earned_points: u32,
}

/// 测验成绩
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub id: String,
    pub quiz_id: String,
    pub user_id: String,
    pub answers: Vec<SubmittedAnswer>,
    pub score: u32,
    pub max_score: u32,
    pub percentage: f64,
    pub time_taken: Option<u32>,
    pub completed_at: DateTime<Utc>,
    pub feedback: Vec<GradedQuestion>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_question_type_aliases() {
        assert_eq!("mcq".parse::<QuestionType>().unwrap(), QuestionType::Mcq);
        assert_eq!("True/False".parse::<QuestionType>().unwrap(), QuestionType::TrueFalse);
        assert_eq!("short answer".parse::<QuestionType>().unwrap(), QuestionType::ShortAnswer);
        assert_eq!("OBJECTIVE".parse::<QuestionType>().unwrap(), QuestionType::Objective);
        assert!("essay".parse::<QuestionType>().is_err());
    }

    #[test]
    fn test_difficulty_parses_its_display_form() {
        for difficulty in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
            assert_eq!(difficulty.to_string().parse::<Difficulty>().unwrap(), difficulty);
        }
        assert_eq!(" Hard ".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("brutal".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_answer_value_accepts_string_or_array() {
        let single: SubmittedAnswer =
            serde_json::from_value(json!({"questionId": "q1", "answer": "True"})).unwrap();
        assert_eq!(single.answer, AnswerValue::Text("True".to_string()));

        let multi: SubmittedAnswer =
            serde_json::from_value(json!({"questionId": "q2", "answer": ["a", "b"]})).unwrap();
        assert_eq!(multi.answer.to_choices(), vec!["a", "b"]);

        let missing: SubmittedAnswer = serde_json::from_value(json!({"questionId": "q3"})).unwrap();
        assert!(missing.answer.to_choices().is_empty());
    }

    #[test]
    fn test_public_view_hides_answers_and_sorts_by_order() {
        let quiz = Quiz {
            id: "quiz1".to_string(),
            title: "PCH201 - Buffers Quiz".to_string(),
            course_code: "PCH201".to_string(),
            course_title: "Physical Chemistry".to_string(),
            topic: Some("Buffers".to_string()),
            level: "200".to_string(),
            difficulty: Difficulty::Medium,
            num_questions: 2,
            time_limit: None,
            user_id: "u1".to_string(),
            created_at: Utc::now(),
            questions: vec![
                Question {
                    id: "b".to_string(),
                    question_text: "second".to_string(),
                    question_type: QuestionType::TrueFalse,
                    options: None,
                    correct_answer: "True".to_string(),
                    explanation: String::new(),
                    points: 1,
                    order: 2,
                },
                Question {
                    id: "a".to_string(),
                    question_text: "first".to_string(),
                    question_type: QuestionType::TrueFalse,
                    options: None,
                    correct_answer: "False".to_string(),
                    explanation: String::new(),
                    points: 1,
                    order: 1,
                },
            ],
        };

        let view = serde_json::to_value(quiz.public_view()).unwrap();
        assert_eq!(view["questions"][0]["id"], "a");
        assert!(view["questions"][0].get("correctAnswer").is_none());
        assert_eq!(view["courseCode"], "PCH201");
    }
}
