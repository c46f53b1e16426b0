use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 已入库的文档记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub title: Option<String>,
    pub file_name: Option<String>,
    #[serde(rename = "courseCode")]
    pub course_code: Option<String>,
    #[serde(rename = "courseTitle")]
    pub course_title: Option<String>,
    #[serde(rename = "professorName")]
    pub professor_name: Option<String>,
    pub topic: Option<String>,
    pub level: Option<String>,
    pub chunks_count: usize,
    #[serde(rename = "uploadedAt")]
    pub uploaded_at: DateTime<Utc>,
}

/// 课程（由文档记录去重得到）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub course_code: String,
    pub course_title: String,
    pub level: String,
}

impl DocumentRecord {
    /// 课程代码、名称、年级齐全时返回课程
    pub fn course(&self) -> Option<Course> {
        match (&self.course_code, &self.course_title, &self.level) {
            (Some(code), Some(title), Some(level))
                if !code.is_empty() && !title.is_empty() && !level.is_empty() =>
            {
                Some(Course {
                    course_code: code.clone(),
                    course_title: title.clone(),
                    level: level.clone(),
                })
            }
            _ => None,
        }
    }
}
