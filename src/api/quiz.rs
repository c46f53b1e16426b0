use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};

use super::auth::CurrentUser;
use super::error::{HttpError, HttpResult};
use super::state::AppState;
use crate::services::quiz_history::{build_history, HistoryQuery};
use crate::workflow::quiz_flow::{MAX_ATTEMPTS, PARTIAL_MESSAGE};
use crate::workflow::{QuizOutcome, QuizRequest, ResultReport, SubmitRequest};

const NO_CONTENT_MESSAGE: &str =
    "No relevant content found for this course/topic. Please ensure documents are uploaded for this course.";

/// POST /api/quiz/generate
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<QuizRequest>,
) -> HttpResult<Json<Value>> {
    if !request.has_required_fields() || request.question_type.is_none() {
        return Err(HttpError::bad_request("Missing required fields"));
    }
    let ctx = request
        .to_ctx()
        .ok_or_else(|| HttpError::bad_request("Invalid question type"))?;

    let outcome = state
        .quiz
        .run(&user, &ctx, request.num_questions, request.time_limit)
        .await
        .map_err(|e| HttpError::internal("Failed to generate quiz", e))?;

    match outcome {
        QuizOutcome::Complete(quiz) => Ok(Json(json!({
            "success": true,
            "quiz": quiz.public_view(),
        }))),
        QuizOutcome::Partial(quiz) => Ok(Json(json!({
            "success": true,
            "message": PARTIAL_MESSAGE,
            "quiz": quiz.public_view(),
        }))),
        QuizOutcome::NoContent => Err(HttpError::not_found(NO_CONTENT_MESSAGE)),
        QuizOutcome::NotEnough { .. } => Err(HttpError::Internal {
            message: format!(
                "Could not generate enough unique questions after {} attempts. \
                 Try reducing the number of questions or broadening your topic.",
                MAX_ATTEMPTS
            ),
            details: None,
        }),
    }
}

/// GET /api/quiz/{id}，不含答案
pub async fn quiz_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Path(quiz_id): Path<String>,
) -> HttpResult<Json<Value>> {
    let quiz = state
        .quizzes
        .get_quiz(&quiz_id)
        .await
        .map_err(|e| HttpError::internal("Failed to fetch quiz", e))?
        .ok_or_else(|| HttpError::not_found("Quiz not found"))?;

    Ok(Json(json!({ "success": true, "quiz": quiz.public_view() })))
}

/// POST /api/quiz/submit
pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<SubmitRequest>,
) -> HttpResult<Json<Value>> {
    let (Some(quiz_id), Some(answers)) = (request.quiz_id.filter(|id| !id.is_empty()), request.answers) else {
        return Err(HttpError::bad_request("Missing required fields"));
    };

    let quiz = state
        .quizzes
        .get_quiz(&quiz_id)
        .await
        .map_err(|e| HttpError::internal("Failed to submit quiz", e))?
        .ok_or_else(|| HttpError::not_found("Quiz not found"))?;

    let result = state
        .grading
        .run(&user, &quiz, answers, request.time_taken)
        .await
        .map_err(|e| HttpError::internal("Failed to submit quiz", e))?;

    Ok(Json(json!({
        "success": true,
        "result": ResultReport::new(&result, &quiz, false),
    })))
}

/// GET /api/quiz/results/{id}，只能查看自己的成绩
pub async fn result_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(result_id): Path<String>,
) -> HttpResult<Json<Value>> {
    let result = state
        .quizzes
        .get_result(&result_id, &user.id)
        .await
        .map_err(|e| HttpError::internal("Failed to fetch quiz result", e))?
        .ok_or_else(|| HttpError::not_found("Result not found"))?;
    let quiz = state
        .quizzes
        .get_quiz(&result.quiz_id)
        .await
        .map_err(|e| HttpError::internal("Failed to fetch quiz result", e))?
        .ok_or_else(|| HttpError::not_found("Result not found"))?;

    Ok(Json(json!({
        "success": true,
        "result": ResultReport::new(&result, &quiz, true),
    })))
}

/// GET /api/quiz/history
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> HttpResult<Json<Value>> {
    let pairs = state
        .quizzes
        .results_with_quizzes(&user.id)
        .await
        .map_err(|e| HttpError::internal("Failed to fetch quiz history", e))?;
    Ok(Json(json!({
        "success": true,
        "data": build_history(&pairs, &query),
    })))
}
