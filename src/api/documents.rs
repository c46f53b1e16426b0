use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::{HttpError, HttpResult};
use super::state::AppState;
use crate::error::{AppError, FileError};
use crate::models::Course;
use crate::workflow::{IngestError, IngestRequest};

/// POST /api/process-document
pub async fn process_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> HttpResult<Json<Value>> {
    let Some(document_id) = request.document_id.clone().filter(|id| !id.trim().is_empty()) else {
        return Err(HttpError::bad_request("Missing required parameter: documentId"));
    };
    let has_file = request.file_key.as_deref().is_some_and(|k| !k.trim().is_empty());
    if request.text.is_none() && !has_file {
        return Err(HttpError::bad_request("Missing required parameter: fileKey"));
    }

    match state.ingest.run(&document_id, &request).await {
        Ok(report) => Ok(Json(json!({
            "success": true,
            "document_id": report.document_id,
            "chunks_count": report.chunks_count,
        }))),
        Err(IngestError::NoText) => Err(HttpError::bad_request("No text could be extracted from the file")),
        Err(IngestError::File(AppError::File(FileError::NotFound { .. }))) => {
            Err(HttpError::not_found("File not found"))
        }
        Err(IngestError::File(AppError::File(FileError::InvalidPath { .. }))) => {
            Err(HttpError::bad_request("Invalid fileKey"))
        }
        Err(IngestError::File(e)) => Err(HttpError::internal("Failed to extract text from file", e)),
        Err(IngestError::Embedding(e)) => Err(HttpError::internal(
            "Failed to generate embeddings. Please check if the embedding service is available.",
            e,
        )),
        Err(IngestError::Storage(e)) => Err(HttpError::internal("Failed to store document in database", e)),
    }
}

/// GET /api/documents
pub async fn list_handler(State(state): State<Arc<AppState>>) -> HttpResult<Json<Value>> {
    let documents = state
        .documents
        .list()
        .await
        .map_err(|e| HttpError::internal("Failed to fetch documents", e))?;
    Ok(Json(json!({ "documents": documents })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DeleteDocumentRequest {
    pub document_id: Option<String>,
}

/// DELETE /api/documents
pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteDocumentRequest>,
) -> HttpResult<Json<Value>> {
    let Some(document_id) = request.document_id.filter(|id| !id.is_empty()) else {
        return Err(HttpError::bad_request("Missing document_id"));
    };

    state
        .ingest
        .remove(&document_id)
        .await
        .map_err(|e| HttpError::internal("Failed to delete document", e))?;
    Ok(Json(json!({ "success": true })))
}

/// 按 (代码, 名称, 年级) 去重，保留首次出现的顺序
pub fn distinct_courses(courses: impl IntoIterator<Item = Course>) -> Vec<Course> {
    let mut distinct: Vec<Course> = Vec::new();
    for course in courses {
        if !distinct.contains(&course) {
            distinct.push(course);
        }
    }
    distinct
}

/// GET /api/documents/courses
pub async fn courses_handler(State(state): State<Arc<AppState>>) -> HttpResult<Json<Value>> {
    let documents = state
        .documents
        .list()
        .await
        .map_err(|e| HttpError::internal("Failed to fetch courses", e))?;
    let courses = distinct_courses(documents.iter().filter_map(|d| d.course()));
    Ok(Json(json!({ "courses": courses })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(code: &str, level: &str) -> Course {
        Course {
            course_code: code.to_string(),
            course_title: format!("{} title", code),
            level: level.to_string(),
        }
    }

    #[test]
    fn test_distinct_courses_keeps_first_seen_order() {
        let courses = distinct_courses(vec![
            course("PHY301", "300"),
            course("PCH201", "200"),
            course("PHY301", "300"),
            course("PHY301", "400"),
        ]);
        assert_eq!(
            courses,
            vec![course("PHY301", "300"), course("PCH201", "200"), course("PHY301", "400")]
        );
    }
}
