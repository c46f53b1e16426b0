/// 出题结果解析
///
/// 大模型的回复经常带有代码块、注释、尾逗号或中文引号，
/// 这里负责提取 JSON、修复常见格式问题、校验题目结构并去重。
use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::QuestionType;

/// MCQ 固定 5 个选项、3 个正确答案
pub const MCQ_OPTION_COUNT: usize = 5;
pub const MCQ_CORRECT_COUNT: usize = 3;
/// OBJECTIVE 固定 4 个选项
pub const OBJECTIVE_OPTION_COUNT: usize = 4;

/// 模型输出的原始题目
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawQuestion {
    pub question_text: String,
    pub options: Option<Vec<Value>>,
    pub correct_answer: Option<Value>,
    pub correct_answers: Option<Vec<Value>>,
    pub explanation: Option<String>,
    pub points: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBatch {
    #[serde(default)]
    questions: Vec<RawQuestion>,
}

/// 校验通过的题目
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuestion {
    pub question_text: String,
    pub question_type: QuestionType,
    pub options: Option<Vec<String>>,
    /// 非 MCQ 题目的答案
    pub correct_answer: String,
    /// MCQ 的三个正确选项
    pub correct_answers: Vec<String>,
    pub explanation: String,
    pub points: u32,
}

impl GeneratedQuestion {
    /// 持久化用的答案：MCQ 为 JSON 数组字符串
    pub fn stored_answer(&self) -> String {
        match self.question_type {
            QuestionType::Mcq => {
                serde_json::to_string(&self.correct_answers).unwrap_or_else(|_| "[]".to_string())
            }
            _ => self.correct_answer.clone(),
        }
    }
}

/// 取第一个 `{` 到最后一个 `}` 之间的内容
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// 修复常见的 JSON 格式问题
///
/// - 去掉 ``` 代码块标记
/// - 去掉字符串外的 `//` 与 `/* */` 注释
/// - 中文双引号作为定界符时换成 `"`，出现在字符串内部时转义
/// - 去掉 `}` / `]` 前的尾逗号
pub fn repair_json(text: &str) -> String {
    let without_fences: String = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let cleaned = strip_comments_and_quotes(&without_fences);
    strip_trailing_commas(&cleaned)
}

fn strip_comments_and_quotes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut smart_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            match c {
                '\\' => {
                    out.push(c);
                    if let Some(next) = chars.get(i + 1) {
                        out.push(*next);
                        i += 1;
                    }
                }
                '"' if !smart_string => {
                    out.push('"');
                    in_string = false;
                }
                '”' if smart_string => {
                    out.push('"');
                    in_string = false;
                }
                '“' | '”' | '"' => out.push_str("\\\""),
                '‘' | '’' => out.push('\''),
                _ => out.push(c),
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                smart_string = false;
                out.push('"');
            }
            '“' | '”' => {
                in_string = true;
                smart_string = true;
                out.push('"');
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i += 2;
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }

    out
}

/// 从回复中解析题目列表，无法解析时返回空列表
pub fn parse_batch(reply: &str) -> Vec<RawQuestion> {
    let Some(span) = extract_json_span(reply) else {
        warn!("⚠️ 回复中没有找到 JSON 对象");
        return Vec::new();
    };

    match serde_json::from_str::<RawBatch>(span) {
        Ok(batch) => batch.questions,
        Err(first_err) => {
            debug!("JSON 直接解析失败，尝试修复: {}", first_err);
            match serde_json::from_str::<RawBatch>(&repair_json(span)) {
                Ok(batch) => batch.questions,
                Err(e) => {
                    warn!("⚠️ JSON 修复后仍无法解析: {}", e);
                    Vec::new()
                }
            }
        }
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Bool(true) => Some("True".to_string()),
        Value::Bool(false) => Some("False".to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn values_to_texts(values: &[Value]) -> Vec<String> {
    values.iter().filter_map(value_to_text).collect()
}

/// 单题分值上限，模型给出更大的值时截断
pub const MAX_QUESTION_POINTS: u32 = 100;

fn parse_points(value: Option<&Value>) -> u32 {
    let points = match value {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };
    match points {
        0 => 1,
        p => u32::try_from(p).unwrap_or(MAX_QUESTION_POINTS).min(MAX_QUESTION_POINTS),
    }
}

/// 校验单题结构，并统一写入请求的题型
pub fn validate_question(raw: &RawQuestion, question_type: QuestionType) -> Option<GeneratedQuestion> {
    let question_text = raw.question_text.trim();
    if question_text.is_empty() {
        return None;
    }

    let options = raw.options.as_deref().map(values_to_texts);
    let correct_answer = raw.correct_answer.as_ref().and_then(value_to_text);
    let correct_answers = raw.correct_answers.as_deref().map(values_to_texts).unwrap_or_default();

    match question_type {
        QuestionType::Mcq => {
            let option_count = options.as_ref().map_or(0, Vec::len);
            if option_count != MCQ_OPTION_COUNT || correct_answers.len() != MCQ_CORRECT_COUNT {
                return None;
            }
        }
        QuestionType::Objective => {
            let option_count = options.as_ref().map_or(0, Vec::len);
            if option_count != OBJECTIVE_OPTION_COUNT || correct_answer.is_none() {
                return None;
            }
        }
        QuestionType::TrueFalse | QuestionType::ShortAnswer => {}
    }

    let correct_answer = match (question_type, correct_answer) {
        (QuestionType::TrueFalse, Some(answer)) => normalize_true_false(&answer),
        (_, answer) => answer.unwrap_or_default(),
    };

    Some(GeneratedQuestion {
        question_text: question_text.to_string(),
        question_type,
        options,
        correct_answer,
        correct_answers,
        explanation: raw.explanation.clone().unwrap_or_default(),
        points: parse_points(raw.points.as_ref()),
    })
}

fn normalize_true_false(answer: &str) -> String {
    match answer.to_lowercase().as_str() {
        "true" | "t" => "True".to_string(),
        "false" | "f" => "False".to_string(),
        _ => answer.to_string(),
    }
}

/// 去重用的题干规范化：小写、只保留字母数字、合并空白
pub fn normalize_question_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 跨批次累积题目并去重
#[derive(Debug, Default)]
pub struct QuestionPool {
    questions: Vec<GeneratedQuestion>,
    seen: HashSet<String>,
}

impl QuestionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入一批原始题目，返回实际新增数量
    pub fn add_batch(&mut self, raw: &[RawQuestion], question_type: QuestionType) -> usize {
        let mut added = 0;
        for question in raw.iter().filter_map(|q| validate_question(q, question_type)) {
            if self.seen.insert(normalize_question_text(&question.question_text)) {
                self.questions.push(question);
                added += 1;
            }
        }
        debug!("本批 {} 道题，校验去重后新增 {} 道", raw.len(), added);
        added
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// 取前 `limit` 道题
    pub fn take(mut self, limit: usize) -> Vec<GeneratedQuestion> {
        self.questions.truncate(limit);
        self.questions
    }
}
