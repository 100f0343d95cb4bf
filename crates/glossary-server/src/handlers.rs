use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::backend::GlossaryBackend;
use crate::config::DEFAULT_NAMESPACE;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<GlossaryBackend>,
}

#[derive(Deserialize)]
pub struct AnnotateRequest {
    pub html: String,
    pub namespace: Option<i64>,
}

#[derive(Serialize)]
pub struct AnnotateResponse {
    html: String,
    replacements: usize,
}

#[derive(Serialize)]
pub struct TermsResponse {
    size: usize,
    min_term_length: usize,
    terms: Vec<String>,
}

#[derive(Serialize)]
pub struct TermResponse {
    term: String,
    aliases: Vec<String>,
    definition: String,
}

#[derive(Serialize)]
pub struct PurgeResponse {
    page: String,
    purged: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/annotate", post(annotate))
        .route("/v1/terms", get(terms))
        .route("/v1/terms/{term}", get(term))
        .route("/v1/pages/{page}/purge", post(purge_page))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn annotate(
    State(state): State<AppState>,
    payload: Result<Json<AnnotateRequest>, JsonRejection>,
) -> Result<Json<AnnotateResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let namespace = request.namespace.unwrap_or(DEFAULT_NAMESPACE);

    let backend = Arc::clone(&state.backend);
    let annotated = tokio::task::spawn_blocking(move || backend.annotate(namespace, &request.html))
        .await
        .map_err(|err| {
            error!("annotation task failed: {err}");
            ApiError::Internal
        })?;
    debug!("annotate request made {} replacements", annotated.replacements);

    Ok(Json(AnnotateResponse {
        html: annotated.html,
        replacements: annotated.replacements,
    }))
}

async fn terms(State(state): State<AppState>) -> Result<Json<TermsResponse>, ApiError> {
    let backend = Arc::clone(&state.backend);
    let response = tokio::task::spawn_blocking(move || {
        let glossary = backend.glossary();
        let index = glossary.index();
        TermsResponse {
            size: index.size(),
            min_term_length: index.min_term_length(),
            terms: index.all_terms().map(|t| t.to_string()).collect(),
        }
    })
    .await
    .map_err(|err| {
        error!("terms task failed: {err}");
        ApiError::Internal
    })?;
    Ok(Json(response))
}

async fn term(
    State(state): State<AppState>,
    Path(term): Path<String>,
) -> Result<Json<TermResponse>, ApiError> {
    let backend = Arc::clone(&state.backend);
    let wanted = term.trim().to_string();
    let lookup = wanted.clone();
    let found = tokio::task::spawn_blocking(move || {
        let glossary = backend.glossary();
        glossary.index().lookup(&lookup).map(|entry| {
            (
                entry.terms().iter().map(|t| t.to_string()).collect::<Vec<_>>(),
                entry.definition().to_string(),
            )
        })
    })
    .await
    .map_err(|err| {
        error!("term lookup task failed: {err}");
        ApiError::Internal
    })?;
    let (aliases, definition) =
        found.ok_or_else(|| ApiError::NotFound(format!("\"{wanted}\" is not defined")))?;

    Ok(Json(TermResponse {
        term: wanted,
        aliases,
        definition,
    }))
}

async fn purge_page(State(state): State<AppState>, Path(page): Path<String>) -> Json<PurgeResponse> {
    let purged = state.backend.purge_if_glossary_page(&page);
    Json(PurgeResponse { page, purged })
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        ApiError::BadRequest(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: msg })).into_response()
            }
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { error: msg })).into_response()
            }
            ApiError::Internal => {
                let body = Json(json!({ "error": "internal server error" }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}
