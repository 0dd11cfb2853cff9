//! HTTP surface: job submission, job polling and health.
//!
//! - `POST /api/v1/jobs` (multipart) → `202 {"jobId": ...}`
//! - `GET /api/v1/jobs/{job_id}` → the job's [`JobView`](crate::query::JobView) or 404
//! - `GET /health`

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_multipart::{Field, Multipart};
use actix_web::middleware::Logger;
use actix_web::{App, HttpResponse, HttpServer, web};
use futures_util::StreamExt;
use serde_json::json;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::jobs::{JobInput, ProviderModels};
use crate::orchestrator::{InputArtifact, JobOrchestrator};
use crate::providers::ProviderId;
use crate::query::StatusQuery;

/// Extensions accepted by every configured back-end.
const ALLOWED_EXTENSIONS: &[&str] = &[
    "flac", "m4a", "mp3", "mp4", "mpeg", "mpga", "oga", "ogg", "wav", "webm",
];

// Text form fields are short; anything longer is a malformed request.
const MAX_TEXT_FIELD_BYTES: usize = 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
    pub query: StatusQuery,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &AppConfig, orchestrator: Arc<JobOrchestrator>) -> Self {
        Self {
            query: StatusQuery::new(Arc::clone(orchestrator.store())),
            orchestrator,
            upload_dir: config
                .server
                .upload_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            max_upload_bytes: config.server.max_upload_bytes(),
        }
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/jobs", web::post().to(submit_job))
            .route("/jobs/{job_id}", web::get().to(get_job)),
    )
    .route("/health", web::get().to(health));
}

/// Bind and serve until the server is stopped (Ctrl+C / SIGTERM).
pub async fn run(config: &AppConfig, orchestrator: Arc<JobOrchestrator>) -> anyhow::Result<()> {
    let state = AppState::new(config, orchestrator);
    std::fs::create_dir_all(&state.upload_dir)?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    info!(%bind_addr, upload_dir = %state.upload_dir.display(), "starting HTTP server");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Logger::default())
            .configure(routes)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn submit_job(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut upload: Option<(String, TempPath)> = None;
    let mut language = None;
    let mut requested = None;
    let mut models = ProviderModels::default();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ApiError::BadRequest(format!("Multipart error: {e}")))?;
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                let file_name = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("File field has no file name".into()))?;
                let extension = audio_extension(&file_name)?;
                let temp = spool_upload(
                    &mut field,
                    &state.upload_dir,
                    &extension,
                    state.max_upload_bytes,
                )
                .await?;
                upload = Some((file_name, temp));
            }
            "language" => language = non_empty(read_text(&mut field).await?),
            "providers" => requested = non_empty(read_text(&mut field).await?),
            "openai_model" => models.openai = non_empty(read_text(&mut field).await?),
            "deepgram_model" => models.deepgram = non_empty(read_text(&mut field).await?),
            other => {
                debug!(field = other, "ignoring unknown form field");
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| ApiError::BadRequest(format!("Multipart error: {e}")))?;
                }
            }
        }
    }

    let (file_name, temp) = upload
        .ok_or_else(|| ApiError::BadRequest("No audio file provided in field `file`".into()))?;

    let providers = match requested {
        Some(list) => parse_providers(&list)?,
        None => state.orchestrator.providers().ids().into_iter().collect(),
    };

    let input = JobInput {
        file_name,
        language,
        models,
    };
    let submission = state
        .orchestrator
        .submit(input, InputArtifact::Upload(temp), providers)?;
    let job_id = submission.job_id;

    Ok(HttpResponse::Accepted().json(json!({
        "jobId": job_id,
        "statusUrl": format!("/api/v1/jobs/{job_id}")
    })))
}

async fn get_job(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let raw = path.into_inner();
    // A malformed id can never have been issued, so it is simply unknown.
    let view = Uuid::parse_str(&raw)
        .ok()
        .and_then(|id| state.query.query(id))
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {raw}")))?;
    Ok(HttpResponse::Ok().json(view))
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": state.orchestrator.providers().ids(),
        "jobs": state.orchestrator.store().stats(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Lower-cased extension of `file_name`, if it is an accepted audio format.
fn audio_extension(file_name: &str) -> Result<String, ApiError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(ApiError::BadRequest(format!(
            "Unsupported audio format `{file_name}`; expected one of: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )))
    }
}

fn parse_providers(list: &str) -> Result<BTreeSet<ProviderId>, ApiError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<ProviderId>().map_err(|e| ApiError::BadRequest(e.to_string())))
        .collect()
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

async fn read_text(field: &mut Field) -> Result<String, ApiError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| ApiError::BadRequest(format!("Multipart error: {e}")))?;
        bytes.extend_from_slice(&chunk);
        if bytes.len() > MAX_TEXT_FIELD_BYTES {
            return Err(ApiError::BadRequest("Form field too long".into()));
        }
    }
    String::from_utf8(bytes)
        .map_err(|_| ApiError::BadRequest("Form field is not valid UTF-8".into()))
}

/// Stream the upload into a temp file. The file is deleted if anything fails.
async fn spool_upload(
    field: &mut Field,
    dir: &Path,
    extension: &str,
    limit: usize,
) -> Result<TempPath, ApiError> {
    let (file, temp) = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&format!(".{extension}"))
        .tempfile_in(dir)?
        .into_parts();
    // Writes go through tokio so large uploads do not stall the worker thread.
    let mut file = tokio::fs::File::from_std(file);

    let mut written = 0usize;
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| ApiError::BadRequest(format!("Multipart error: {e}")))?;
        written += chunk.len();
        if written > limit {
            return Err(ApiError::PayloadTooLarge(format!(
                "File too large (max: {limit} bytes)"
            )));
        }
        file.write_all(&chunk).await?;
    }

    if written == 0 {
        return Err(ApiError::BadRequest("Uploaded file is empty".into()));
    }
    file.flush().await?;
    debug!(bytes = written, path = %temp.display(), "upload spooled");
    Ok(temp)
}
