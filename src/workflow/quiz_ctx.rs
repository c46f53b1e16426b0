//! 出题上下文
//!
//! 封装"我正在为哪门课、哪个年级出什么题"这一信息

use std::fmt::Display;

use crate::models::{Difficulty, QuestionType};

/// 出题上下文
///
/// 出题流程的每一步都只读取这份信息
#[derive(Debug, Clone)]
pub struct QuizCtx {
    /// 课程代码
    pub course_code: String,

    /// 课程名称
    pub course_title: String,

    /// 主题（可选）
    pub topic: Option<String>,

    /// 年级
    pub level: String,

    /// 题型
    pub question_type: QuestionType,

    /// 难度
    pub difficulty: Difficulty,
}

impl QuizCtx {
    /// 检索语句：`<code> <title>[ <topic>]`
    pub fn search_query(&self) -> String {
        match self.topic.as_deref().filter(|t| !t.is_empty()) {
            Some(topic) => format!("{} {} {}", self.course_code, self.course_title, topic),
            None => format!("{} {}", self.course_code, self.course_title),
        }
    }

    /// 测验标题：`<code> - <topic|General> Quiz`
    pub fn quiz_title(&self) -> String {
        let topic = self
            .topic
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or("General");
        format!("{} - {} Quiz", self.course_code, topic)
    }
}

impl Display for QuizCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[课程 {} 年级 {} 题型 {}]",
            self.course_code, self.level, self.question_type
        )
    }
}
