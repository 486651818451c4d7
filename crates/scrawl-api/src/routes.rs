use std::hash::{Hash, Hasher};
use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use chrono::Utc;
use scrawl_core::models::RemoteNote;
use scrawl_core::{InMemoryRemote, NoteId, OwnerId};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, AuthenticatedOwner, TokenVerifier};
use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    verifier: Arc<TokenVerifier>,
    notes: InMemoryRemote,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        Self {
            verifier: Arc::new(TokenVerifier::new(config.tokens.clone())),
            notes: InMemoryRemote::new(),
            config,
        }
    }

    /// Handle to the note store backing the routes.
    pub const fn notes(&self) -> &InMemoryRemote {
        &self.notes
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/notes", get(list_notes).post(create_note))
        .route("/notes/{id}", put(update_note).delete(delete_note))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    notes: usize,
    revision: u64,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        notes: state.notes.len(),
        revision: state.notes.revision(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let owner = state.verifier.verify_access_token(token)?;
    request.extensions_mut().insert(owner);
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    owner: Option<String>,
    #[serde(default)]
    since: u64,
}

#[derive(Debug, Deserialize)]
struct VersionQuery {
    expected_version: i64,
}

async fn list_notes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedOwner>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RemoteNote>>, AppError> {
    if let Some(owner) = query.owner.as_deref() {
        if owner != user.owner_id.as_str() {
            return Err(AppError::forbidden("Cannot list notes of another owner"));
        }
    }

    let notes = state.notes.list_since(&user.owner_id, query.since);
    tracing::debug!(
        user = owner_fingerprint(&user.owner_id),
        since = query.since,
        count = notes.len(),
        "Listed notes"
    );
    Ok(Json(notes))
}

async fn create_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedOwner>,
    Json(note): Json<RemoteNote>,
) -> Result<Json<RemoteNote>, AppError> {
    ensure_payload_owner(&note, &user)?;
    ensure_note_owner(&state, &note.id, &user)?;

    let created = state.notes.create(&note)?;
    tracing::info!(
        user = owner_fingerprint(&user.owner_id),
        note = %created.id,
        version = created.version,
        revision = created.revision,
        "Created note"
    );
    Ok(Json(created))
}

async fn update_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedOwner>,
    Path(id): Path<String>,
    Query(query): Query<VersionQuery>,
    Json(note): Json<RemoteNote>,
) -> Result<Json<RemoteNote>, AppError> {
    let id = parse_note_id(&id)?;
    ensure_payload_owner(&note, &user)?;
    ensure_note_owner(&state, &id, &user)?;

    let updated = state.notes.update(&id, &note, query.expected_version)?;
    tracing::info!(
        user = owner_fingerprint(&user.owner_id),
        note = %updated.id,
        version = updated.version,
        revision = updated.revision,
        "Updated note"
    );
    Ok(Json(updated))
}

async fn delete_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedOwner>,
    Path(id): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<RemoteNote>, AppError> {
    let id = parse_note_id(&id)?;
    ensure_note_owner(&state, &id, &user)?;

    let deleted = state.notes.delete(&id, query.expected_version)?;
    tracing::info!(
        user = owner_fingerprint(&user.owner_id),
        note = %deleted.id,
        version = deleted.version,
        revision = deleted.revision,
        "Deleted note"
    );
    Ok(Json(deleted))
}

fn parse_note_id(raw: &str) -> Result<NoteId, AppError> {
    raw.parse()
        .map_err(|_| AppError::bad_request(format!("invalid note id '{raw}'")))
}

fn ensure_payload_owner(note: &RemoteNote, user: &AuthenticatedOwner) -> Result<(), AppError> {
    if note.owner_id == user.owner_id {
        Ok(())
    } else {
        Err(AppError::forbidden("Note payload belongs to another owner"))
    }
}

/// Notes of other owners are reported as forbidden, never returned.
fn ensure_note_owner(
    state: &AppState,
    id: &NoteId,
    user: &AuthenticatedOwner,
) -> Result<(), AppError> {
    match state.notes.owner_of(id) {
        Some(owner) if owner != user.owner_id => {
            Err(AppError::forbidden("Note belongs to another owner"))
        }
        _ => Ok(()),
    }
}

fn owner_fingerprint(owner_id: &OwnerId) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    owner_id.as_str().hash(&mut hasher);
    hasher.finish()
}
