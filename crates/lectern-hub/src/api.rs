//! JSON command handlers for the transport boundary. Each maps a request
//! onto a lifecycle / moment / session operation and the shared error
//! taxonomy onto HTTP statuses.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use lectern_core::{DeviceId, FeedbackKind, SessionId};

use crate::error::HubError;
use crate::server::AppState;

/// Anonymous device identifier header, defaulting like the mobile client.
const DEVICE_HEADER: &str = "x-device-id";

pub fn device_id(headers: &HeaderMap) -> DeviceId {
    let raw = headers
        .get(DEVICE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("anonymous");
    DeviceId::from_raw(raw)
}

/// HubError carried across the axum boundary.
pub struct ApiError(HubError);

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            HubError::Unauthorized(_) => StatusCode::FORBIDDEN,
            HubError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            HubError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            HubError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

// ── Courses & sessions ──

pub async fn list_courses(State(state): State<AppState>) -> ApiResult {
    let courses = lectern_store::courses::CourseRepo::new(state.db.clone())
        .list()
        .map_err(HubError::from)?;
    Ok(Json(courses).into_response())
}

pub async fn today_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult {
    let today = chrono::Local::now().date_naive().to_string();
    let (course, session) = state.sessions.today_session(&code, &today)?;
    Ok(Json(json!({
        "session_id": session.id,
        "course_code": course.code,
        "date": session.date,
        "is_active": session.is_active,
    }))
    .into_response())
}

pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult {
    let session_id = SessionId::from_raw(session_id);
    let closed = state.sessions.end_session(&session_id).await?;
    Ok(Json(json!({"status": "ok", "closed_connections": closed})).into_response())
}

pub async fn session_summary(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult {
    let summary = state.sessions.summary(&SessionId::from_raw(session_id))?;
    Ok(Json(summary).into_response())
}

// ── Feedback ──

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub feedback_kind: Option<String>,
}

pub async fn submit_feedback(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<FeedbackRequest>,
) -> ApiResult {
    let kind: FeedbackKind = body
        .feedback_kind
        .as_deref()
        .ok_or_else(|| HubError::InvalidArgument("feedback_kind is required".into()))?
        .parse()
        .map_err(HubError::InvalidArgument)?;

    let event = state
        .lifecycle
        .submit_feedback(&SessionId::from_raw(session_id), &device_id(&headers), kind)
        .await?;
    Ok(Json(json!({"status": "ok", "created_at": event.created_at})).into_response())
}

// ── Questions ──

pub async fn start_question(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    let question = state
        .lifecycle
        .start_intent(&SessionId::from_raw(session_id), &device_id(&headers))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"question_id": question.id, "created_at": question.created_at})),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    pub capture_url: Option<String>,
}

pub async fn register_capture(
    State(state): State<AppState>,
    Path(question_id): Path<i64>,
    Json(body): Json<CaptureRequest>,
) -> ApiResult {
    let capture_url = body
        .capture_url
        .as_deref()
        .ok_or_else(|| HubError::InvalidArgument("capture_url is required".into()))?;
    let moment = state.lifecycle.register_capture(question_id, capture_url).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"question_id": question_id, "capture_url": moment.capture_url})),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub original_text: Option<String>,
}

pub async fn submit_text(
    State(state): State<AppState>,
    Path(question_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<TextRequest>,
) -> ApiResult {
    let original_text = body
        .original_text
        .as_deref()
        .ok_or_else(|| HubError::InvalidArgument("original_text is required".into()))?;
    let question = state
        .lifecycle
        .submit_text(question_id, &device_id(&headers), original_text)
        .await?;
    Ok(Json(json!({
        "id": question.id,
        "original_text": question.original_text,
        "cleaned_text": question.cleaned_text,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub override_cleaned_text: Option<String>,
}

pub async fn request_answer(
    State(state): State<AppState>,
    Path(question_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<AnswerRequest>,
) -> ApiResult {
    let question = state
        .lifecycle
        .request_answer(
            question_id,
            &device_id(&headers),
            body.override_cleaned_text.as_deref(),
        )
        .await?;
    Ok(Json(json!({
        "id": question.id,
        "cleaned_text": question.cleaned_text,
        "ai_answer": question.ai_answer,
    }))
    .into_response())
}

pub async fn forward_question(
    State(state): State<AppState>,
    Path(question_id): Path<i64>,
) -> ApiResult {
    state.lifecycle.forward(question_id).await?;
    Ok(Json(json!({"status": "ok"})).into_response())
}

pub async fn like_question(
    State(state): State<AppState>,
    Path(question_id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult {
    let outcome = state.lifecycle.like(question_id, &device_id(&headers)).await?;
    Ok(Json(json!({
        "question_id": question_id,
        "like_count": outcome.like_count,
        "newly_liked": outcome.newly_liked,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct QuestionListQuery {
    pub forwarded_only: Option<bool>,
}

pub async fn list_questions(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<QuestionListQuery>,
) -> ApiResult {
    let questions = state.lifecycle.list_questions(
        &SessionId::from_raw(session_id),
        query.forwarded_only.unwrap_or(false),
    )?;
    Ok(Json(questions).into_response())
}

// ── Moments ──

#[derive(Debug, Deserialize)]
pub struct ImportantRequest {
    pub note: Option<String>,
    pub capture_url: Option<String>,
}

pub async fn mark_important(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<ImportantRequest>,
) -> ApiResult {
    let moment = state
        .moments
        .mark_important(
            &SessionId::from_raw(session_id),
            body.note.as_deref().unwrap_or(""),
            body.capture_url.as_deref(),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": moment.id,
            "note": moment.note,
            "capture_url": moment.capture_url,
        })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct HardCaptureRequest {
    pub capture_url: Option<String>,
    pub hard_ratio: Option<f64>,
}

pub async fn hard_capture(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<HardCaptureRequest>,
) -> ApiResult {
    let capture_url = body
        .capture_url
        .as_deref()
        .ok_or_else(|| HubError::InvalidArgument("capture_url is required".into()))?;
    let moment = state
        .moments
        .hard_capture(&SessionId::from_raw(session_id), capture_url, body.hard_ratio)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"id": moment.id, "capture_url": moment.capture_url})),
    )
        .into_response())
}

pub async fn get_moment(
    State(state): State<AppState>,
    Path(moment_id): Path<i64>,
) -> ApiResult {
    let moment = state.moments.get(moment_id)?;
    Ok(Json(moment).into_response())
}
