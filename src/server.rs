//! HTTP JSON API for the studio front-desk UI.
//!
//! Exposes record CRUD, text search, image upload/serving, similarity
//! search, OCR extraction, and the CSV/ZIP exports over axum.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/records` | Create a record |
//! | `GET`  | `/records` | List all records |
//! | `GET`  | `/records/paged` | Paginated, filtered listing |
//! | `GET`  | `/records/search` | Free-text search |
//! | `GET`  | `/records/{id}` | Fetch one record |
//! | `PATCH`| `/records/{id}` | Partial update |
//! | `PATCH`| `/records/{id}/status` | Move through the workflow |
//! | `DELETE`|`/records/{id}` | Delete a record |
//! | `POST` | `/records/{id}/images/{role}` | Attach a photo (base64 JSON) |
//! | `GET`  | `/images/{name}` | Serve a stored image |
//! | `POST` | `/search/similar` | Rank recent records by visual similarity |
//! | `POST` | `/ocr/extract` | Best-effort intake-form text extraction |
//! | `GET`  | `/export/csv` | All records as CSV |
//! | `GET`  | `/export/images.zip` | All stored images as a ZIP |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "customer_name must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the UI is served from
//! a different origin during development.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::blobs::BlobStore;
use crate::config::Config;
use crate::models::{CustomerRecord, JobStatus, MatchType, NewRecord, RecordFilter, RecordPatch};
use crate::similarity::{self, Candidate};
use crate::{db, export, ocr, store};

/// Shared application state. The pool and blob store are opened once at
/// startup and injected into every handler.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    blobs: BlobStore,
}

/// Starts the HTTP server. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;
    let state = AppState {
        config: Arc::new(config.clone()),
        blobs: BlobStore::new(config.images.dir.clone()),
        pool,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/records", post(handle_create).get(handle_list))
        .route("/records/paged", get(handle_paged))
        .route("/records/search", get(handle_search))
        .route(
            "/records/{id}",
            get(handle_get).patch(handle_update).delete(handle_delete),
        )
        .route("/records/{id}/status", patch(handle_status))
        .route("/records/{id}/images/{role}", post(handle_attach_image))
        .route("/images/{name}", get(handle_serve_image))
        .route("/search/similar", post(handle_similar))
        .route("/ocr/extract", post(handle_ocr))
        .route("/export/csv", get(handle_export_csv))
        .route("/export/images.zip", get(handle_export_images))
        .layer(cors)
        .with_state(state);

    println!("kiln server listening on http://{}", bind_addr);

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

/// Internal error type that converts into an axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Store validation failures map to 400, everything else to 500. The store
/// marks rejected input with a typed error so this never has to guess from
/// message text.
fn classify_error(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<store::InvalidInput>() {
        Some(invalid) => bad_request(invalid.to_string()),
        None => internal(err.to_string()),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Record CRUD ============

async fn handle_create(
    State(state): State<AppState>,
    Json(new): Json<NewRecord>,
) -> Result<(StatusCode, Json<CustomerRecord>), AppError> {
    let record = store::create(&state.pool, &new)
        .await
        .map_err(classify_error)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn handle_list(
    State(state): State<AppState>,
) -> Result<Json<Vec<CustomerRecord>>, AppError> {
    let records = store::list(&state.pool).await.map_err(classify_error)?;
    Ok(Json(records))
}

#[derive(Deserialize)]
struct PagedParams {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
    date_from: Option<String>,
    date_to: Option<String>,
    status: Option<String>,
    program: Option<String>,
    q: Option<String>,
}

fn default_page() -> i64 {
    1
}
fn default_page_size() -> i64 {
    25
}

async fn handle_paged(
    State(state): State<AppState>,
    Query(params): Query<PagedParams>,
) -> Result<Json<crate::models::RecordPage>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(|s| JobStatus::parse(s).ok_or_else(|| bad_request(format!("unknown status: {}", s))))
        .transpose()?;
    let program = params
        .program
        .as_deref()
        .map(|p| {
            crate::models::ProgramType::parse(p)
                .ok_or_else(|| bad_request(format!("unknown program: {}", p)))
        })
        .transpose()?;

    let filter = RecordFilter {
        date_from: params.date_from,
        date_to: params.date_to,
        status,
        program,
        query: params.q,
    };

    let page = store::list_paginated(&state.pool, params.page, params.page_size, &filter)
        .await
        .map_err(classify_error)?;
    Ok(Json(page))
}

#[derive(Deserialize)]
struct SearchParams {
    q: String,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<CustomerRecord>>, AppError> {
    let records = store::search(&state.pool, &params.q)
        .await
        .map_err(classify_error)?;
    Ok(Json(records))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CustomerRecord>, AppError> {
    let record = store::get(&state.pool, id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found(format!("record not found: {}", id)))?;
    Ok(Json(record))
}

async fn handle_update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<RecordPatch>,
) -> Result<Json<CustomerRecord>, AppError> {
    let record = store::update(&state.pool, id, &patch)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found(format!("record not found: {}", id)))?;
    Ok(Json(record))
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
}

async fn handle_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<StatusBody>,
) -> Result<Json<CustomerRecord>, AppError> {
    let status = JobStatus::parse(&body.status)
        .ok_or_else(|| bad_request(format!("unknown status: {}", body.status)))?;
    let record = store::update_status(&state.pool, id, status)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found(format!("record not found: {}", id)))?;
    Ok(Json(record))
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let orphaned = store::delete(&state.pool, id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found(format!("record not found: {}", id)))?;

    // The record's photos go with it, unless another record attached the
    // same bytes and still references the shared file
    for name in &orphaned {
        state.blobs.delete_quiet(name);
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============ Images ============

#[derive(Deserialize)]
struct ImageBody {
    image_base64: String,
}

fn decode_image_body(body: &ImageBody) -> Result<Vec<u8>, AppError> {
    base64::engine::general_purpose::STANDARD
        .decode(&body.image_base64)
        .map_err(|_| bad_request("image_base64 is not valid base64"))
}

async fn handle_attach_image(
    State(state): State<AppState>,
    Path((id, role)): Path<(i64, String)>,
    Json(body): Json<ImageBody>,
) -> Result<Json<CustomerRecord>, AppError> {
    let role = MatchType::parse(&role)
        .ok_or_else(|| bad_request(format!("unknown image role: {} (use customer or work)", role)))?;
    let bytes = decode_image_body(&body)?;

    let stored_name = state
        .blobs
        .save(&bytes, role)
        .map_err(|e| bad_request(e.to_string()))?;

    // Stored names are content hashes shared between records, so neither
    // cleanup path may touch a file another record still references
    let previous = match store::set_image(&state.pool, id, role, &stored_name)
        .await
        .map_err(classify_error)?
    {
        Some(previous) => previous,
        None => {
            if !store::image_referenced(&state.pool, &stored_name, id)
                .await
                .map_err(classify_error)?
            {
                state.blobs.delete_quiet(&stored_name);
            }
            return Err(not_found(format!("record not found: {}", id)));
        }
    };
    if let Some(old) = previous {
        if old != stored_name
            && !store::image_referenced(&state.pool, &old, id)
                .await
                .map_err(classify_error)?
        {
            state.blobs.delete_quiet(&old);
        }
    }

    let record = store::get(&state.pool, id)
        .await
        .map_err(classify_error)?
        .ok_or_else(|| not_found(format!("record not found: {}", id)))?;
    Ok(Json(record))
}

async fn handle_serve_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let bytes = state
        .blobs
        .load(&name)
        .map_err(|e| not_found(e.to_string()))?;

    let content_type = match name.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

// ============ POST /search/similar ============

#[derive(Serialize)]
struct SimilarResponse {
    matches: Vec<SimilarMatchResponse>,
}

#[derive(Serialize)]
struct SimilarMatchResponse {
    record_id: i64,
    business_id: String,
    customer_name: String,
    match_type: MatchType,
    image: String,
    score: f64,
    label: &'static str,
}

async fn handle_similar(
    State(state): State<AppState>,
    Json(body): Json<ImageBody>,
) -> Result<Json<SimilarResponse>, AppError> {
    let query_bytes = decode_image_body(&body)?;

    let records = store::recent_with_images(&state.pool, state.config.similarity.window_months)
        .await
        .map_err(classify_error)?;

    let candidates = load_candidates(&state.blobs, &records);
    let similarity_config = state.config.similarity.clone();

    // The scoring loop is pure CPU; keep it off the async worker threads
    let matches = tokio::task::spawn_blocking(move || {
        similarity::search(&query_bytes, candidates, &similarity_config)
    })
    .await
    .map_err(|e| internal(e.to_string()))?;

    Ok(Json(SimilarResponse {
        matches: matches
            .into_iter()
            .map(|m| {
                let label = m.label();
                SimilarMatchResponse {
                    record_id: m.record_id,
                    business_id: m.business_id,
                    customer_name: m.customer_name,
                    match_type: m.match_type,
                    image: m.image,
                    score: m.score,
                    label,
                }
            })
            .collect(),
    }))
}

/// Resolve image bytes for every (record, role) pair in the window. A file
/// that went missing on disk just drops that candidate.
fn load_candidates(blobs: &BlobStore, records: &[CustomerRecord]) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for record in records {
        let slots = [
            (MatchType::Customer, record.customer_image.as_ref()),
            (MatchType::Work, record.work_image.as_ref()),
        ];
        for (match_type, name) in slots {
            let Some(name) = name else { continue };
            match blobs.load(name) {
                Ok(bytes) => candidates.push(Candidate {
                    record_id: record.id,
                    business_id: record.business_id.clone(),
                    customer_name: record.customer_name.clone(),
                    match_type,
                    image: name.clone(),
                    bytes,
                }),
                Err(e) => eprintln!("warning: skipping candidate image: {}", e),
            }
        }
    }
    candidates
}

// ============ POST /ocr/extract ============

#[derive(Serialize)]
struct OcrResponse {
    text: Option<String>,
}

async fn handle_ocr(
    State(state): State<AppState>,
    Json(body): Json<ImageBody>,
) -> Result<Json<OcrResponse>, AppError> {
    let bytes = decode_image_body(&body)?;

    let provider =
        ocr::create_provider(&state.config.ocr).map_err(|e| bad_request(e.to_string()))?;
    let text = ocr::extract_text(provider.as_ref(), &state.config.ocr, &bytes).await;

    Ok(Json(OcrResponse { text }))
}

// ============ Exports ============

async fn handle_export_csv(State(state): State<AppState>) -> Result<Response, AppError> {
    let csv = export::records_csv(&state.pool)
        .await
        .map_err(|e| internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/csv")], csv).into_response())
}

async fn handle_export_images(State(state): State<AppState>) -> Result<Response, AppError> {
    let blobs = state.blobs.clone();
    let archive = tokio::task::spawn_blocking(move || export::images_zip(&blobs))
        .await
        .map_err(|e| internal(e.to_string()))?
        .map_err(|e| internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"images.zip\"",
            ),
        ],
        archive,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_validation_as_bad_request() {
        let err = anyhow::Error::from(store::InvalidInput(
            "customer_name must not be empty".to_string(),
        ));
        let app = classify_error(err);
        assert_eq!(app.status, StatusCode::BAD_REQUEST);
        assert_eq!(app.code, "bad_request");
        assert_eq!(app.message, "customer_name must not be empty");
    }

    #[test]
    fn test_classify_other_errors_as_internal() {
        // Message text that merely looks like a validation phrase must not
        // turn an internal failure into a client error
        let err = anyhow::anyhow!("invalid utf-8 while reading socket; stream must be re-opened");
        let app = classify_error(err);
        assert_eq!(app.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.code, "internal");
    }
}
