use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::CurrentUser;
use super::error::{HttpError, HttpResult};
use super::state::AppState;
use crate::models::{TimetableEntry, TimetableInput};
use crate::store::SlotOutcome;

const SLOT_TAKEN: &str = "A timetable entry already exists for this level, day, and time slot";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TimetableQuery {
    pub level: Option<String>,
    pub id: Option<String>,
}

impl TimetableQuery {
    fn id(&self) -> HttpResult<&str> {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| HttpError::bad_request("ID parameter is required"))
    }
}

fn require_complete(input: &TimetableInput) -> HttpResult<()> {
    if input.is_complete() {
        Ok(())
    } else {
        Err(HttpError::bad_request("All fields are required"))
    }
}

fn saved_entry(outcome: SlotOutcome) -> HttpResult<Json<TimetableEntry>> {
    match outcome {
        SlotOutcome::Saved(entry) => Ok(Json(entry)),
        SlotOutcome::Conflict => Err(HttpError::Conflict(SLOT_TAKEN.to_string())),
        SlotOutcome::NotFound => Err(HttpError::not_found("Timetable entry not found")),
    }
}

/// GET /api/admin/timetable?level=
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Query(query): Query<TimetableQuery>,
) -> HttpResult<Json<Vec<TimetableEntry>>> {
    let level = query
        .level
        .filter(|l| !l.is_empty())
        .ok_or_else(|| HttpError::bad_request("Level parameter is required"))?;
    let entries = state
        .timetable
        .for_level(&level)
        .await
        .map_err(|e| HttpError::internal("Internal server error", e))?;
    Ok(Json(entries))
}

/// POST /api/admin/timetable
pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Json(input): Json<TimetableInput>,
) -> HttpResult<Json<TimetableEntry>> {
    require_complete(&input)?;
    let outcome = state
        .timetable
        .create(input)
        .await
        .map_err(|e| HttpError::internal("Internal server error", e))?;
    saved_entry(outcome)
}

/// PUT /api/admin/timetable?id=
pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Query(query): Query<TimetableQuery>,
    Json(input): Json<TimetableInput>,
) -> HttpResult<Json<TimetableEntry>> {
    let id = query.id()?;
    require_complete(&input)?;
    let outcome = state
        .timetable
        .update(id, input)
        .await
        .map_err(|e| HttpError::internal("Internal server error", e))?;
    saved_entry(outcome)
}

/// DELETE /api/admin/timetable?id=
pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Query(query): Query<TimetableQuery>,
) -> HttpResult<Json<Value>> {
    let id = query.id()?;
    let removed = state
        .timetable
        .delete(id)
        .await
        .map_err(|e| HttpError::internal("Internal server error", e))?;
    if !removed {
        return Err(HttpError::not_found("Timetable entry not found"));
    }
    Ok(Json(json!({ "success": true })))
}

/// GET /api/timetable，按当前用户年级返回课表
pub async fn user_timetable_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> HttpResult<Json<Value>> {
    let level = user
        .level
        .filter(|l| !l.is_empty())
        .ok_or_else(|| HttpError::bad_request("User level not set"))?;
    let timetables = state
        .timetable
        .for_level(&level)
        .await
        .map_err(|e| HttpError::internal("Internal server error", e))?;
    Ok(Json(json!({ "level": level, "timetables": timetables })))
}
