use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 课表条目
///
/// 同一 level + day + timeSlot 只允许一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    pub id: String,
    pub level: String,
    pub day: String,
    pub time_slot: String,
    pub course_code: String,
    pub course_title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新建/更新课表时提交的字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimetableInput {
    pub level: String,
    pub day: String,
    pub time_slot: String,
    pub course_code: String,
    pub course_title: String,
}

impl TimetableInput {
    /// 所有字段都必须非空
    pub fn is_complete(&self) -> bool {
        [
            &self.level,
            &self.day,
            &self.time_slot,
            &self.course_code,
            &self.course_title,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }
}
