//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version and key pool state |
//! | `GET`  | `/projects` | Active projects, newest first |
//! | `POST` | `/projects` | Create a project; indexing and commit polling run in the background |
//! | `POST` | `/projects/{id}/archive` | Archive a project |
//! | `GET`  | `/projects/{id}/progress` | Latest indexing status |
//! | `POST` | `/projects/{id}/ask` | Answer a question |
//! | `GET`  | `/projects/{id}/commits` | Stored commits (starts a background poll) |
//! | `GET`  | `/projects/{id}/questions` | Saved questions |
//! | `GET`  | `/projects/{id}/tree` | File tree |
//! | `POST` | `/rewrite` | Rewrite a rough question into a clearer one |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Project not found: 42" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `quota_exhausted` (429),
//! `upstream_error` (502), `internal` (500).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use repolens_core::error::UpstreamError;
use repolens_core::keyring::PoolStatus;
use repolens_core::models::{CommitRecord, Project, QuestionRecord};
use repolens_core::tree::FileNode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::app::{AppContext, ProjectNotFound};
use crate::ask::{ask, rewrite_question, Answer};
use crate::commits::poll_commits;
use crate::github::RepoRef;
use crate::ingest::index_project;
use crate::progress::IngestStatus;

type AppState = Arc<AppContext>;

pub fn router(ctx: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/projects", get(handle_list_projects).post(handle_create_project))
        .route("/projects/{id}/archive", post(handle_archive))
        .route("/projects/{id}/progress", get(handle_progress))
        .route("/projects/{id}/ask", post(handle_ask))
        .route("/projects/{id}/commits", get(handle_commits))
        .route("/projects/{id}/questions", get(handle_questions))
        .route("/projects/{id}/tree", get(handle_tree))
        .route("/rewrite", post(handle_rewrite))
        .layer(cors)
        .with_state(ctx)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(ctx: AppState) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let app = router(ctx);

    println!("RepoLens server listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        if err.downcast_ref::<ProjectNotFound>().is_some() {
            return AppError::new(StatusCode::NOT_FOUND, "not_found", message);
        }
        match err.downcast_ref::<UpstreamError>() {
            Some(UpstreamError::QuotaExhausted | UpstreamError::RateLimited { .. }) => {
                AppError::new(StatusCode::TOO_MANY_REQUESTS, "quota_exhausted", message)
            }
            Some(_) => AppError::new(StatusCode::BAD_GATEWAY, "upstream_error", message),
            None => {
                tracing::error!(error = %message, "request failed");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct KeyPools {
    embedding: PoolStatus,
    generation: PoolStatus,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    keys: KeyPools,
}

async fn handle_health(State(ctx): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        keys: KeyPools {
            embedding: ctx.embedding_keys.status(),
            generation: ctx.generation_keys.status(),
        },
    })
}

// ============ Projects ============

#[derive(Serialize)]
struct ProjectList {
    projects: Vec<Project>,
}

async fn handle_list_projects(State(ctx): State<AppState>) -> Result<Json<ProjectList>, AppError> {
    let projects = ctx.store.list_projects(false).await?;
    Ok(Json(ProjectList { projects }))
}

#[derive(Deserialize)]
struct CreateProjectRequest {
    name: String,
    github_url: String,
    #[serde(default)]
    branch: Option<String>,
}

async fn handle_create_project(
    State(ctx): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    if req.name.trim().is_empty() {
        return Err(bad_request("name must not be empty"));
    }
    RepoRef::parse(&req.github_url).map_err(|e| bad_request(e.to_string()))?;

    let branch = req
        .branch
        .filter(|b| !b.trim().is_empty())
        .unwrap_or_else(|| ctx.config.github.default_branch.clone());
    let project = Project::new(req.name.trim(), &req.github_url, &branch);
    ctx.store.create_project(&project).await?;

    let bg_ctx = ctx.clone();
    let bg_project = project.clone();
    tokio::spawn(async move {
        let status = bg_ctx.status.clone();
        match index_project(&bg_ctx, &bg_project, status.as_ref()).await {
            Ok(stats) => tracing::info!(project_id = %bg_project.id, ?stats, "indexing finished"),
            Err(e) => tracing::error!(project_id = %bg_project.id, error = %e, "indexing failed"),
        }
        if let Err(e) = poll_commits(&bg_ctx, &bg_project).await {
            tracing::error!(project_id = %bg_project.id, error = %e, "commit polling failed");
        }
    });

    Ok((StatusCode::CREATED, Json(project)))
}

async fn handle_archive(
    State(ctx): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Project>, AppError> {
    if !ctx.store.archive_project(&id).await? {
        return Err(anyhow::Error::new(ProjectNotFound(id.clone())).into());
    }
    Ok(Json(ctx.project(&id).await?))
}

// ============ Per-project ============

#[derive(Serialize)]
struct ProgressResponse {
    project_id: String,
    /// `None` until indexing has started in this server process.
    status: Option<IngestStatus>,
}

async fn handle_progress(
    State(ctx): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProgressResponse>, AppError> {
    let project = ctx.project(&id).await?;
    Ok(Json(ProgressResponse {
        status: ctx.status.get(&project.id),
        project_id: project.id,
    }))
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    save: bool,
}

async fn handle_ask(
    State(ctx): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    if req.limit == Some(0) {
        return Err(bad_request("limit must be >= 1"));
    }
    Ok(Json(ask(&ctx, &id, &req.question, req.limit, req.save).await?))
}

#[derive(Serialize)]
struct CommitList {
    commits: Vec<CommitRecord>,
}

async fn handle_commits(
    State(ctx): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CommitList>, AppError> {
    let project = ctx.project(&id).await?;
    let commits = ctx.store.list_commits(&project.id).await?;

    let bg_ctx = ctx.clone();
    tokio::spawn(async move {
        match poll_commits(&bg_ctx, &project).await {
            Ok(n) => tracing::debug!(project_id = %project.id, inserted = n, "commit poll done"),
            Err(e) => tracing::warn!(project_id = %project.id, error = %e, "commit poll failed"),
        }
    });

    Ok(Json(CommitList { commits }))
}

#[derive(Serialize)]
struct QuestionList {
    questions: Vec<QuestionRecord>,
}

async fn handle_questions(
    State(ctx): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QuestionList>, AppError> {
    let project = ctx.project(&id).await?;
    let questions = ctx.store.list_questions(&project.id).await?;
    Ok(Json(QuestionList { questions }))
}

#[derive(Serialize)]
struct TreeResponse {
    tree: Vec<FileNode>,
}

async fn handle_tree(
    State(ctx): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TreeResponse>, AppError> {
    let project = ctx.project(&id).await?;
    let tree = ctx.store.get_file_tree(&project.id).await?.unwrap_or_default();
    Ok(Json(TreeResponse { tree }))
}

// ============ POST /rewrite ============

#[derive(Deserialize)]
struct RewriteRequest {
    text: String,
}

#[derive(Serialize)]
struct RewriteResponse {
    rewritten_text: String,
}

async fn handle_rewrite(
    State(ctx): State<AppState>,
    Json(req): Json<RewriteRequest>,
) -> Result<Json<RewriteResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    let rewritten_text = rewrite_question(&ctx, &req.text).await?;
    Ok(Json(RewriteResponse { rewritten_text }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(err: anyhow::Error) -> (StatusCode, &'static str) {
        let e = AppError::from(err);
        (e.status, e.code)
    }

    #[test]
    fn maps_errors_to_codes() {
        assert_eq!(
            classify(ProjectNotFound("x".into()).into()),
            (StatusCode::NOT_FOUND, "not_found")
        );
        assert_eq!(
            classify(UpstreamError::QuotaExhausted.into()),
            (StatusCode::TOO_MANY_REQUESTS, "quota_exhausted")
        );
        assert_eq!(
            classify(UpstreamError::from_status(401, "bad key").into()),
            (StatusCode::BAD_GATEWAY, "upstream_error")
        );
        assert_eq!(
            classify(anyhow::anyhow!("disk full")),
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        );
    }

    #[test]
    fn context_wrapped_upstream_error_keeps_its_code() {
        use anyhow::Context;
        let err = Err::<(), _>(UpstreamError::QuotaExhausted)
            .context("embedding query")
            .unwrap_err();
        assert_eq!(classify(err).1, "quota_exhausted");
    }
}
