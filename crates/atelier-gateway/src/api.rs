use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use atelier_auth::{InputValidator, password};
use atelier_common::{Error, NewMessage};
use atelier_db::search::{DEFAULT_SIMILAR_LIMIT, DEFAULT_SIMILARITY_THRESHOLD};
use atelier_db::{NewProject, ProjectChanges, SaveChatRequest, User};

use crate::auth::authenticate;
use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Public view of an account; the hash stays server-side.
#[derive(Serialize)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            avatar_url: user.avatar_url,
        }
    }
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Deserialize)]
pub struct CreateChatRequest {
    pub messages: Vec<NewMessage>,
}

#[derive(Deserialize)]
pub struct SaveChatBody {
    pub chat_id: Option<String>,
    pub project_id: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub messages: Vec<NewMessage>,
}

#[derive(Deserialize)]
pub struct ForkRequest {
    pub message_id: String,
}

#[derive(Deserialize)]
pub struct SnapshotRequest {
    pub snapshot_data: serde_json::Value,
}

#[derive(Deserialize)]
pub struct SimilarRequest {
    pub embedding: Vec<f32>,
    pub limit: Option<usize>,
    pub threshold: Option<f32>,
}

#[derive(Serialize)]
struct ChatIdResponse {
    chat_id: String,
}

/// POST /api/auth/register — create an account and issue a token.
pub async fn register(
    State(state): State<SharedState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    InputValidator::validate_email(&body.email)?;
    InputValidator::validate_password(&body.password)?;
    if let Some(name) = &body.name {
        InputValidator::validate_display_name(name)?;
    }

    // Key stretching is CPU-bound; keep it off the async workers.
    let password = body.password;
    let password_hash = tokio::task::spawn_blocking(move || password::hash(&password))
        .await
        .map_err(|e| Error::Gateway(format!("hashing task failed: {e}")))??;

    let user = state
        .users
        .create_user(
            &body.email,
            &password_hash,
            body.name.as_deref(),
            body.avatar_url.as_deref(),
        )
        .await?;

    let token = state.signer.sign(&user.id, state.token_ttl())?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// POST /api/auth/login — verify credentials and issue a token. Unknown
/// email and wrong password are indistinguishable to the caller.
pub async fn login(
    State(state): State<SharedState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(user) = state.users.get_user_by_email(&body.email).await? else {
        return Err(Error::Unauthorized("invalid email or password".into()).into());
    };

    let password = body.password;
    let stored_hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || password::verify(&password, &stored_hash))
        .await
        .map_err(|e| Error::Gateway(format!("verification task failed: {e}")))?;

    if !verified {
        return Err(Error::Unauthorized("invalid email or password".into()).into());
    }

    let token = state.signer.sign(&user.id, state.token_ttl())?;
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

/// GET /api/auth/me — the authenticated caller's account.
pub async fn me(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<UserInfo>, ApiError> {
    let user = authenticate(&state, &headers).await?;
    Ok(Json(user.into()))
}

/// POST /api/projects — create a project owned by the caller.
pub async fn create_project(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<NewProject>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let project = state.projects.create_project(&user.id, body).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/projects — the caller's projects, most recently touched first.
pub async fn list_projects(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let projects = state.projects.get_projects_by_user_id(&user.id).await?;
    Ok(Json(projects))
}

/// GET /api/projects/{id}
pub async fn get_project(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    match state.projects.get_project_by_id(&project_id, &user.id).await? {
        Some(project) => Ok(Json(project)),
        None => Err(ApiError::not_found()),
    }
}

/// PATCH /api/projects/{id} — apply a partial update.
pub async fn update_project(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(changes): Json<ProjectChanges>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    match state
        .projects
        .update_project(&project_id, &user.id, changes)
        .await?
    {
        Some(project) => Ok(Json(project)),
        None => Err(ApiError::not_found()),
    }
}

/// DELETE /api/projects/{id}
pub async fn delete_project(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    if state.projects.delete_project(&project_id, &user.id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found())
    }
}

/// POST /api/projects/{id}/chats — start a chat under a project.
pub async fn create_chat(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(body): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    match state
        .chats
        .create_chat(&user.id, &project_id, &body.messages)
        .await?
    {
        Some(chat_id) => Ok((StatusCode::CREATED, Json(ChatIdResponse { chat_id }))),
        None => Err(ApiError::not_found()),
    }
}

/// GET /api/projects/{id}/chats
pub async fn list_chats(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let chats = state
        .chats
        .get_chats_by_project_id(&project_id, &user.id)
        .await?;
    Ok(Json(chats))
}

/// POST /api/projects/{id}/similar — rank the project's chats against a
/// query embedding.
pub async fn find_similar_chats(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(body): Json<SimilarRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let results = state
        .search
        .find_similar_chats(
            &project_id,
            &user.id,
            &body.embedding,
            body.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT),
            body.threshold.unwrap_or(DEFAULT_SIMILARITY_THRESHOLD),
        )
        .await?;
    Ok(Json(results))
}

/// GET /api/chats/{id} — the chat with its full message history.
pub async fn get_chat(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    match state.chats.get_chat_by_id(&chat_id, &user.id).await? {
        Some(chat) => Ok(Json(chat)),
        None => Err(ApiError::not_found()),
    }
}

/// DELETE /api/chats/{id}
pub async fn delete_chat(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    if state.chats.delete_chat(&chat_id, &user.id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found())
    }
}

/// POST /api/chats — create-or-append through the single save path.
pub async fn save_chat(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<SaveChatBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let created = body.chat_id.is_none();
    let request = SaveChatRequest {
        chat_id: body.chat_id,
        project_id: body.project_id,
        description: body.description,
        metadata: body.metadata,
    };

    match state
        .lineage
        .save_chat_messages(&user.id, &body.messages, request)
        .await?
    {
        Some(chat_id) => {
            let status = if created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            Ok((status, Json(ChatIdResponse { chat_id })))
        }
        None => Err(ApiError::not_found()),
    }
}

/// DELETE /api/chats — destroy every chat the caller owns.
pub async fn delete_all_chats(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let deleted = state.lineage.delete_all_chat_data_for_user(&user.id).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

/// POST /api/chats/{id}/duplicate
pub async fn duplicate_chat(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    match state.lineage.duplicate_chat(&chat_id, &user.id).await? {
        Some(chat_id) => Ok((StatusCode::CREATED, Json(ChatIdResponse { chat_id }))),
        None => Err(ApiError::not_found()),
    }
}

/// POST /api/chats/{id}/fork — fork at a message in the history.
pub async fn fork_chat(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
    Json(body): Json<ForkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    match state
        .lineage
        .fork_chat(&chat_id, &body.message_id, &user.id)
        .await?
    {
        Some(chat_id) => Ok((StatusCode::CREATED, Json(ChatIdResponse { chat_id }))),
        None => Err(ApiError::not_found()),
    }
}

/// POST /api/chats/{id}/snapshot — append a workspace snapshot.
pub async fn save_snapshot(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
    Json(body): Json<SnapshotRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    match state
        .chats
        .save_snapshot(&chat_id, &user.id, body.snapshot_data)
        .await?
    {
        Some(snapshot_id) => Ok((
            StatusCode::CREATED,
            Json(serde_json::json!({ "snapshot_id": snapshot_id })),
        )),
        None => Err(ApiError::not_found()),
    }
}

/// GET /api/chats/{id}/snapshot — the latest snapshot, if any.
pub async fn latest_snapshot(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;
    match state.chats.latest_snapshot(&chat_id, &user.id).await? {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(ApiError::not_found()),
    }
}
