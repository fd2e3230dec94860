use axum::{
    Form, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
};
use pdf_chat::{
    ChatConfig, ChatError, DocumentLoader, GeminiClient, InMemorySessionStore, Responder,
    SessionController, SessionState, SessionStore, SubmitOutcome, spawn_session_sweeper,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    models::{
        ChatForm, MessageRequest, MessageResponse, MessageStatus, SessionCreatedResponse,
        SessionResponse,
    },
    ui::ChatPage,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn generation_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn error_status(e: &ChatError) -> StatusCode {
    if e.is_recoverable() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[derive(Clone)]
pub struct AppState {
    pub controller: SessionController,
    pub sessions: Arc<dyn SessionStore>,
    pub page: Arc<ChatPage>,
}

impl AppState {
    pub fn new(controller: SessionController, sessions: Arc<dyn SessionStore>) -> anyhow::Result<Self> {
        Ok(Self {
            controller,
            sessions,
            page: Arc::new(ChatPage::new()?),
        })
    }
}

/// Load the document, connect the model client and build the router.
///
/// The document is loaded here, before the listener is bound, so a missing or
/// unreadable file fails startup rather than the first request.
pub async fn create_app(config: &ChatConfig) -> anyhow::Result<Router> {
    let loader = DocumentLoader::new();
    let document = loader.load(&config.pdf_path).await?;
    info!(
        "Loaded {} ({} characters)",
        config.pdf_path.display(),
        document.len()
    );

    let client = Arc::new(GeminiClient::new(&config.api_key));
    let responder = Responder::new(client, config.generation_timeout);
    let controller = SessionController::new(document, responder);

    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    spawn_session_sweeper(sessions.clone(), config.session_ttl);

    let state = AppState::new(controller, sessions)?;
    Ok(build_router(state))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(new_chat))
        .route("/health", get(health_check))
        .route("/chat/{session_id}", get(show_chat).post(submit_chat))
        .route("/chat/{session_id}/end", post(end_chat))
        .route("/chat/{session_id}/transcript", get(download_transcript))
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/{session_id}",
            get(get_session).delete(delete_session),
        )
        .route("/api/sessions/{session_id}/messages", post(send_message))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

// --- HTML chat form ---

async fn new_chat(State(state): State<AppState>) -> Redirect {
    let handle = state.sessions.create().await;
    let session_id = handle.lock().await.id.clone();
    Redirect::to(&format!("/chat/{session_id}"))
}

async fn show_chat(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    let Some(handle) = state.sessions.get(&session_id).await else {
        return session_not_found_page();
    };
    let session = handle.lock().await;
    render_page(&state, StatusCode::OK, &session.id, &session.transcript, None)
}

async fn submit_chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Form(form): Form<ChatForm>,
) -> Response {
    let Some(handle) = state.sessions.get(&session_id).await else {
        return session_not_found_page();
    };

    // Held for the whole turn; concurrent submissions for this session queue here.
    let mut session = handle.lock().await;
    match state.controller.submit(&mut session, &form.message).await {
        // Redirect so a reload does not resubmit the question.
        Ok(_) => Redirect::to(&format!("/chat/{}", session.id)).into_response(),
        Err(e) => {
            let message = e.to_string();
            render_page(
                &state,
                error_status(&e),
                &session.id,
                &session.transcript,
                Some(&message),
            )
        }
    }
}

async fn download_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(handle) = state.sessions.get(&session_id).await else {
        return session_not_found_page();
    };
    let session = handle.lock().await;
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        session.transcript.render(),
    )
        .into_response()
}

async fn end_chat(State(state): State<AppState>, Path(session_id): Path<String>) -> Redirect {
    state.sessions.delete(&session_id).await;
    Redirect::to("/")
}

fn render_page(
    state: &AppState,
    status: StatusCode,
    session_id: &str,
    transcript: &pdf_chat::Transcript,
    error_message: Option<&str>,
) -> Response {
    match state.page.render(session_id, transcript, error_message) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("Failed to render chat page: {}", e);
            internal_error("Failed to render chat page", &e.to_string()).into_response()
        }
    }
}

fn session_not_found_page() -> Response {
    (
        StatusCode::NOT_FOUND,
        Html(r#"<p>This chat session has ended. <a href="/">Start a new one</a>.</p>"#),
    )
        .into_response()
}

// --- JSON API ---

async fn create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionCreatedResponse>) {
    let handle = state.sessions.create().await;
    let session_id = handle.lock().await.id.clone();
    (StatusCode::CREATED, Json(SessionCreatedResponse { session_id }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionResponse> {
    let handle = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| not_found_error("Session not found", &session_id))?;

    // The session lock is held for the whole turn, so a busy lock means a turn
    // is being generated.
    let response = match handle.try_lock() {
        Ok(session) => SessionResponse {
            session_id: session.id.clone(),
            state: session.state,
            transcript: Some(session.transcript.clone()),
        },
        Err(_) => SessionResponse {
            session_id: session_id.clone(),
            state: SessionState::Generating,
            transcript: None,
        },
    };
    Ok(Json(response))
}

async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> ApiResult<MessageResponse> {
    let handle = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| not_found_error("Session not found", &session_id))?;
    let mut session = handle.lock().await;

    match state.controller.submit(&mut session, &request.message).await {
        Ok(outcome) => {
            let (status, reply) = match outcome {
                SubmitOutcome::Answered(turn) => (MessageStatus::Answered, Some(turn.assistant)),
                SubmitOutcome::Ignored => (MessageStatus::Ignored, None),
            };
            Ok(Json(MessageResponse {
                session_id: session.id.clone(),
                status,
                reply,
                transcript: session.transcript.clone(),
            }))
        }
        Err(e) if e.is_recoverable() => {
            Err(generation_error("Failed to generate a response", &e.to_string()))
        }
        Err(e) => Err(internal_error("Failed to process message", &e.to_string())),
    }
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.delete(&session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found_error("Session not found", &session_id))
    }
}
