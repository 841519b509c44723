//! HTTP front end: analysis, Fathom webhook, history, dictionary and ruleset routes.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use doc_review_core::extractor::SourceError;
use doc_review_core::publish::SlackApiError;
use doc_review_core::{
    comment_body, AnalysisResult, ConnectionCheck, DocumentType, ProviderError, ProviderKind,
    Ruleset, RulesetValidationError, WebhookPayload,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;

/// JSON error body with the status it maps to.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

fn status_for(err: &anyhow::Error) -> StatusCode {
    for cause in err.chain() {
        if cause.downcast_ref::<RulesetValidationError>().is_some() {
            return StatusCode::UNPROCESSABLE_ENTITY;
        }
        if let Some(provider) = cause.downcast_ref::<ProviderError>() {
            return match provider {
                ProviderError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                ProviderError::Auth { .. }
                | ProviderError::Quota { .. }
                | ProviderError::Http { .. } => StatusCode::BAD_GATEWAY,
            };
        }
        if let Some(source) = cause.downcast_ref::<SourceError>() {
            return match source {
                SourceError::NotFound(_) => StatusCode::NOT_FOUND,
                SourceError::AccessDenied(_) => StatusCode::FORBIDDEN,
                SourceError::Unsupported(_)
                | SourceError::InvalidId(_)
                | SourceError::CommentsUnsupported(_) => StatusCode::BAD_REQUEST,
                SourceError::MissingCredentials => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }
        if cause.downcast_ref::<SlackApiError>().is_some() {
            return StatusCode::BAD_GATEWAY;
        }
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            warn!(error = %format!("{err:#}"), %status, "request failed");
        }
        Self::new(status, format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

fn parse_provider(provider: Option<&str>) -> std::result::Result<Option<ProviderKind>, ApiError> {
    provider
        .map(|name| name.parse::<ProviderKind>())
        .transpose()
        .map_err(|err| ApiError::bad_request(err.to_string()))
}

/// Publish outcome as JSON: the receipt, or `{error}` when publishing failed.
fn outcome<T: Serialize>(action: &str, result: Result<T>) -> Value {
    match result {
        Ok(receipt) => serde_json::to_value(receipt).unwrap_or(Value::Null),
        Err(err) => {
            warn!(action, error = %format!("{err:#}"), "publishing failed");
            json!({ "error": format!("{err:#}") })
        }
    }
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/integrations", get(integrations))
        .route("/analyze", post(analyze))
        .route("/analyze/fathom", post(analyze_fathom))
        .route("/webhook/fathom", post(fathom_webhook))
        .route("/history/:id", get(history))
        .route("/dictionary", get(list_dictionary).post(add_dictionary))
        .route("/rulesets", get(list_rulesets).put(put_ruleset))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let timeout = state.config.request_timeout()?;
    let app = router(state, timeout);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "doc-review server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn integrations(State(state): State<AppState>) -> Json<Value> {
    let slack = state.notifier.test_connection().await;
    let fathom = match state.fathom() {
        Ok(client) => client.test_connection().await,
        Err(err) => ConnectionCheck::failed(err.to_string()),
    };
    Json(json!({ "slack": slack, "fathom": fathom }))
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    url: String,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default, rename = "type")]
    doc_type: Option<String>,
    #[serde(default)]
    slack: bool,
    #[serde(default)]
    comment: bool,
}

#[derive(Debug, Serialize)]
struct AnalyzeResponse {
    analysis: AnalysisResult,
    history_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    slack: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<Value>,
}

async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<AnalyzeResponse> {
    if request.url.trim().is_empty() {
        return Err(ApiError::bad_request("url is required"));
    }
    let provider = parse_provider(request.provider.as_deref())?;
    let doc_type = request
        .doc_type
        .as_deref()
        .map(str::parse::<DocumentType>)
        .transpose()
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let analyzer = state.analyzer(provider)?;
    let document = state.source.fetch(request.url.trim()).await?;
    let result = analyzer.analyze_document(&document, doc_type).await?;
    let history_id = state.history.save(&result).await?;

    let slack = if request.slack {
        Some(outcome("slack", state.notifier.post_analysis(&result).await))
    } else {
        None
    };
    let comment = if request.comment {
        let body = comment_body(&result);
        Some(outcome(
            "comment",
            state.source.add_comment(&document.source, &body).await,
        ))
    } else {
        None
    };

    Ok(Json(AnalyzeResponse {
        analysis: result,
        history_id,
        slack,
        comment,
    }))
}

#[derive(Debug, Deserialize)]
struct FathomAnalyzeRequest {
    recording_id: String,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    is_sales_call: bool,
    #[serde(default)]
    slack: bool,
}

async fn analyze_fathom(
    State(state): State<AppState>,
    Json(request): Json<FathomAnalyzeRequest>,
) -> ApiResult<Value> {
    let provider = parse_provider(request.provider.as_deref())?;
    let analyzer = state.analyzer(provider)?;
    let fathom = state.fathom()?;

    let transcript = fathom.get_transcript(request.recording_id.trim()).await?;
    let text = transcript.full_text();
    if text.trim().is_empty() {
        return Err(ApiError::bad_request(format!(
            "recording {} has no transcript",
            request.recording_id
        )));
    }
    let mut result = analyzer
        .analyze_transcript(&text, request.is_sales_call, &transcript.title)
        .await?;
    result.document_url = transcript.link();
    let history_id = state.history.save(&result).await?;

    let mut body = json!({
        "analysis": result,
        "history_id": history_id,
        "fathom": {
            "recording_id": transcript.recording_id,
            "title": transcript.title,
            "url": transcript.url,
            "share_url": transcript.share_url,
            "created_at": transcript.created_at,
            "summary": transcript.summary,
            "action_items": transcript.action_items,
            "text_length": text.chars().count(),
        },
    });
    if request.slack {
        body["slack"] = outcome("slack", state.notifier.post_analysis(&result).await);
    }
    Ok(Json(body))
}

async fn fathom_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> Json<Value> {
    info!(recording_id = %payload.recording_id, title = %payload.title, "Fathom webhook received");
    let recording_id = payload.recording_id.clone();
    tokio::spawn(async move {
        if let Err(err) = process_recording(state, payload).await {
            warn!(error = %format!("{err:#}"), "Fathom webhook processing failed");
        }
    });
    Json(json!({ "received": true, "recording_id": recording_id }))
}

async fn process_recording(state: AppState, payload: WebhookPayload) -> Result<()> {
    state
        .notifier
        .post_fathom_recording(&payload)
        .await
        .context("failed to post recording notice")?;

    let text = payload.full_text();
    if text.trim().is_empty() {
        return Ok(());
    }
    let analyzer = state.analyzer(None)?;
    let mut result = analyzer
        .analyze_transcript(&text, payload.is_external(), &payload.title)
        .await?;
    if let Some(link) = payload.link() {
        result.document_url = link.to_string();
    }
    let id = state.history.save(&result).await?;
    info!(recording_id = %payload.recording_id, history_id = %id, "webhook transcript analyzed");
    state.notifier.post_analysis(&result).await?;
    Ok(())
}

async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<AnalysisResult> {
    let id = Uuid::parse_str(id.trim())
        .map_err(|_| ApiError::bad_request(format!("invalid analysis id `{id}`")))?;
    match state.history.get(id).await? {
        Some(result) => Ok(Json(result)),
        None => Err(ApiError::not_found(format!("analysis {id} not found"))),
    }
}

#[derive(Debug, Deserialize)]
struct DictionaryRequest {
    terms: Vec<String>,
}

async fn list_dictionary(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "terms": state.dictionary.terms() }))
}

async fn add_dictionary(
    State(state): State<AppState>,
    Json(request): Json<DictionaryRequest>,
) -> ApiResult<Value> {
    if request.terms.iter().all(|term| term.trim().is_empty()) {
        return Err(ApiError::bad_request("terms must contain at least one word"));
    }
    let added = state.dictionary.add(request.terms)?;
    Ok(Json(json!({ "added": added, "terms": state.dictionary.terms() })))
}

async fn list_rulesets(State(state): State<AppState>) -> ApiResult<Vec<Ruleset>> {
    Ok(Json(state.rulesets.load_all().await?))
}

async fn put_ruleset(
    State(state): State<AppState>,
    Json(ruleset): Json<Ruleset>,
) -> ApiResult<Ruleset> {
    Ok(Json(state.rulesets.put(ruleset).await?))
}
