/// 测验历史与成绩分析
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Difficulty, Quiz, QuizResult};

const DEFAULT_PAGE_SIZE: usize = 10;

/// 查询参数
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub course_code: Option<String>,
    pub level: Option<String>,
}

impl HistoryQuery {
    fn page(&self) -> usize {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }

    fn limit(&self) -> usize {
        self.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE_SIZE)
    }

    fn matches(&self, quiz: &Quiz) -> bool {
        let code_ok = self
            .course_code
            .as_deref()
            .filter(|c| !c.is_empty())
            .map_or(true, |c| quiz.course_code == c);
        let level_ok = self
            .level
            .as_deref()
            .filter(|l| !l.is_empty())
            .map_or(true, |l| quiz.level == l);
        code_ok && level_ok
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub id: String,
    pub title: String,
    pub course_code: String,
    pub course_title: String,
    pub topic: Option<String>,
    pub level: String,
    pub difficulty: Difficulty,
    pub num_questions: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub score: u32,
    pub max_score: u32,
    pub percentage: f64,
    pub time_taken: Option<u32>,
    pub completed_at: DateTime<Utc>,
    pub quiz: QuizSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePerformance {
    pub course_code: String,
    pub course_title: String,
    pub level: String,
    pub average_score: f64,
    pub quiz_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub percentage: f64,
    pub completed_at: DateTime<Utc>,
    pub course_code: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub average_score: f64,
    pub total_quizzes: usize,
    pub total_points: u64,
    pub course_performance: Vec<CoursePerformance>,
    pub recent_trend: Vec<TrendPoint>,
    pub recent_trend_average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizHistory {
    pub results: Vec<HistoryEntry>,
    pub pagination: Pagination,
    pub analytics: Analytics,
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn to_entry(result: &QuizResult, quiz: &Quiz) -> HistoryEntry {
    HistoryEntry {
        id: result.id.clone(),
        score: result.score,
        max_score: result.max_score,
        percentage: result.percentage,
        time_taken: result.time_taken,
        completed_at: result.completed_at,
        quiz: QuizSummary {
            id: quiz.id.clone(),
            title: quiz.title.clone(),
            course_code: quiz.course_code.clone(),
            course_title: quiz.course_title.clone(),
            topic: quiz.topic.clone(),
            level: quiz.level.clone(),
            difficulty: quiz.difficulty,
            num_questions: quiz.num_questions,
            created_at: quiz.created_at,
        },
    }
}

/// 计算分析指标（基于用户全部成绩，不受筛选条件影响）
///
/// `pairs` 需按完成时间倒序
pub fn analytics(pairs: &[(QuizResult, Quiz)]) -> Analytics {
    let mut course_performance: Vec<(CoursePerformance, f64)> = Vec::new();
    for (result, quiz) in pairs {
        let existing = course_performance.iter_mut().find(|(c, _)| {
            c.course_code == quiz.course_code && c.course_title == quiz.course_title && c.level == quiz.level
        });
        match existing {
            Some((course, total)) => {
                course.quiz_count += 1;
                *total += result.percentage;
            }
            None => course_performance.push((
                CoursePerformance {
                    course_code: quiz.course_code.clone(),
                    course_title: quiz.course_title.clone(),
                    level: quiz.level.clone(),
                    average_score: 0.0,
                    quiz_count: 1,
                },
                result.percentage,
            )),
        }
    }

    let recent_trend: Vec<TrendPoint> = pairs
        .iter()
        .take(10)
        .map(|(result, quiz)| TrendPoint {
            percentage: result.percentage,
            completed_at: result.completed_at,
            course_code: quiz.course_code.clone(),
            title: quiz.title.clone(),
        })
        .collect();

    Analytics {
        average_score: average(pairs.iter().map(|(r, _)| r.percentage)),
        total_quizzes: pairs.len(),
        total_points: pairs.iter().map(|(r, _)| u64::from(r.score)).sum(),
        course_performance: course_performance
            .into_iter()
            .map(|(mut course, total)| {
                course.average_score = total / course.quiz_count as f64;
                course
            })
            .collect(),
        recent_trend_average: average(recent_trend.iter().take(5).map(|t| t.percentage)),
        recent_trend,
    }
}

/// 分页历史 + 分析
pub fn build_history(pairs: &[(QuizResult, Quiz)], query: &HistoryQuery) -> QuizHistory {
    let page = query.page();
    let limit = query.limit();

    let filtered: Vec<&(QuizResult, Quiz)> = pairs.iter().filter(|(_, quiz)| query.matches(quiz)).collect();
    let total = filtered.len();

    let results = filtered
        .iter()
        .skip(page.saturating_sub(1).saturating_mul(limit))
        .take(limit)
        .map(|(result, quiz)| to_entry(result, quiz))
        .collect();

    QuizHistory {
        results,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        },
        analytics: analytics(pairs),
    }
}
