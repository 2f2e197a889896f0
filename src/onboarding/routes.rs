//! REST endpoints the app shell uses to drive and inspect onboarding.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::{I18nError, OnboardingError};
use crate::i18n::Translations;

use super::catalog::Catalog;
use super::manager::{OnboardingManager, OnboardingSelection};

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub manager: Arc<OnboardingManager>,
}

/// Body of `POST /api/onboarding/complete`.
#[derive(Debug, Deserialize)]
struct CompleteRequest {
    #[serde(flatten)]
    selection: OnboardingSelection,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

fn status_code_for(err: &OnboardingError) -> StatusCode {
    match err {
        OnboardingError::MissingDomain
        | OnboardingError::MissingGoal
        | OnboardingError::UnknownCountry(_)
        | OnboardingError::Language(I18nError::UnsupportedLanguage(_)) => StatusCode::BAD_REQUEST,
        OnboardingError::AlreadyInProgress => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &OnboardingError) -> Response {
    let status = status_code_for(err);
    let message = if status.is_server_error() {
        tracing::error!(error = %err, "Onboarding request failed");
        "Something went wrong. Please try again.".to_string()
    } else {
        err.to_string()
    };
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/onboarding/status
async fn get_status(State(state): State<OnboardingRouteState>) -> Response {
    match state.manager.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /api/onboarding/catalog
async fn get_catalog() -> impl IntoResponse {
    Json(Catalog::builtin())
}

/// POST /api/onboarding/complete
///
/// Everything in the body is validated before the optional language and
/// country are applied, so a rejected request leaves storage untouched.
async fn complete(
    State(state): State<OnboardingRouteState>,
    Json(request): Json<CompleteRequest>,
) -> Response {
    if let Err(e) = validate(&request) {
        return error_response(&e);
    }
    if let Some(ref language) = request.language
        && let Err(e) = state.manager.select_language(language).await
    {
        return error_response(&e);
    }
    if let Some(ref country) = request.country
        && let Err(e) = state.manager.select_country(country).await
    {
        return error_response(&e);
    }

    match state.manager.complete_onboarding(&request.selection).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => error_response(&e),
    }
}

fn validate(request: &CompleteRequest) -> Result<(), OnboardingError> {
    request.selection.require()?;
    if let Some(ref language) = request.language
        && !Translations::builtin().supports(language)
    {
        return Err(I18nError::UnsupportedLanguage(language.clone()).into());
    }
    if let Some(ref country) = request.country
        && Catalog::builtin().country(country).is_none()
    {
        return Err(OnboardingError::UnknownCountry(country.clone()));
    }
    Ok(())
}

/// GET /api/goals/{id}
async fn get_goal(
    State(state): State<OnboardingRouteState>,
    Path(goal_id): Path<String>,
) -> Response {
    match state.manager.service().goal_breakdown(&goal_id).await {
        Ok(Some(breakdown)) => Json(breakdown).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Goal not found" })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/goals/{id}
async fn delete_goal(
    State(state): State<OnboardingRouteState>,
    Path(goal_id): Path<String>,
) -> Response {
    match state.manager.service().delete_goal_completely(&goal_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Goal not found" })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/onboarding/status", get(get_status))
        .route("/api/onboarding/catalog", get(get_catalog))
        .route("/api/onboarding/complete", post(complete))
        .route("/api/goals/{id}", get(get_goal).delete(delete_goal))
        .with_state(state)
}
