//! HTTP route handlers for the relay and session API.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use crate::llm::AudioClip;
use crate::relay::{AudioRequest, StreamRelay, TextReply, TextRequest};
use crate::sessions::{
    group_by_recency, ChatSession, FavouriteUpdate, NewSession, RecencyGroups, SessionId, SessionListing,
};

use super::error::ApiError;
use super::extract::{ApiJson, CallerIdentity};
use super::state::AppState;

/// Upper bound on an audio upload.
pub const MAX_AUDIO_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

const NOT_MULTIPART: &str = "Content-Type must be multipart/form-data";

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chat/sync", post(chat_sync))
        .route("/chat/stream", post(chat_stream))
        .route("/chat/text-stream", post(chat_stream))
        .route(
            "/chat/audio-stream",
            post(chat_audio_stream).layer(DefaultBodyLimit::max(MAX_AUDIO_UPLOAD_BYTES)),
        )
        .route("/chat/sessions", get(list_sessions))
        .route("/chat/sessions/grouped", get(list_sessions_grouped))
        .route("/chat/session", post(save_session))
        .route("/chat/session/{id}", get(get_session))
        .route("/chat/session/{id}/favourite", post(set_favourite))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "giftgpt-relay",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn stream_response(relay: StreamRelay) -> Response {
    (
        [
            (header::CONTENT_TYPE, relay.content_type),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(relay.body),
    )
        .into_response()
}

async fn chat_sync(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TextRequest>,
) -> Result<Json<TextReply>, ApiError> {
    Ok(Json(state.relay.handle_text_sync(request).await?))
}

async fn chat_stream(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TextRequest>,
) -> Result<Response, ApiError> {
    let relay = state.relay.handle_text_stream(request).await?;
    Ok(stream_response(relay))
}

async fn chat_audio_stream(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let multipart = multipart.map_err(|_| ApiError::Validation(NOT_MULTIPART.to_string()))?;
    let request = read_audio_request(multipart).await?;
    tracing::debug!(?request, "audio relay request");

    let relay = state.relay.handle_audio_stream(request).await?;
    Ok(stream_response(relay))
}

/// Collect the `audio`, `text` and `apiKey`/`credential` parts; other parts are ignored.
async fn read_audio_request(mut multipart: Multipart) -> Result<AudioRequest, ApiError> {
    let invalid = |e: axum::extract::multipart::MultipartError| ApiError::Validation(e.body_text());
    let mut request = AudioRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                let file_name = field.file_name().map(ToOwned::to_owned);
                let content_type = field.content_type().map(ToOwned::to_owned);
                let bytes = field.bytes().await.map_err(invalid)?;
                request.audio = Some(AudioClip {
                    bytes,
                    file_name,
                    content_type,
                });
            }
            "text" => request.text = Some(field.text().await.map_err(invalid)?),
            "apiKey" | "credential" => request.credential = field.text().await.map_err(invalid)?,
            _ => {}
        }
    }

    Ok(request)
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    CallerIdentity(owner): CallerIdentity,
) -> Result<Json<Vec<SessionListing>>, ApiError> {
    Ok(Json(state.sessions.list_by_owner(&owner).await?))
}

async fn list_sessions_grouped(
    State(state): State<Arc<AppState>>,
    CallerIdentity(owner): CallerIdentity,
) -> Result<Json<RecencyGroups<SessionListing>>, ApiError> {
    let listings = state.sessions.list_by_owner(&owner).await?;
    Ok(Json(group_by_recency(listings, Utc::now())))
}

async fn save_session(
    State(state): State<Arc<AppState>>,
    CallerIdentity(owner): CallerIdentity,
    ApiJson(session): ApiJson<NewSession>,
) -> Result<Json<SessionListing>, ApiError> {
    let saved = state.sessions.insert(&owner, session).await?;
    tracing::info!(session_id = %saved.id, messages = saved.messages.len(), "session saved");
    Ok(Json(SessionListing::from(&saved)))
}

/// Fetch a session the caller owns. Malformed ids and other owners' sessions look missing.
async fn owned_session(state: &AppState, owner: &CallerIdentity, raw_id: &str) -> Result<ChatSession, ApiError> {
    let not_found = || ApiError::NotFound(format!("Session {raw_id} not found"));
    let id: SessionId = raw_id.parse().map_err(|_| not_found())?;
    let session = state.sessions.get(id).await?;
    if session.owner_id != owner.0 {
        return Err(not_found());
    }
    Ok(session)
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<ChatSession>, ApiError> {
    Ok(Json(owned_session(&state, &caller, &id).await?))
}

async fn set_favourite(
    State(state): State<Arc<AppState>>,
    caller: CallerIdentity,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<FavouriteUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = owned_session(&state, &caller, &id).await?;
    state.sessions.set_favourite(session.id, update.is_favourite).await?;
    Ok(Json(serde_json::json!({
        "id": session.id,
        "isFavourite": update.is_favourite
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::to_bytes;
    use axum::http::{HeaderName, Request, StatusCode};
    use tower::ServiceExt;

    use crate::config::ProviderConfig;
    use crate::llm::UpstreamError;
    use crate::relay::RelayController;
    use crate::sessions::SqliteSessionStore;
    use crate::test_utils::{sse_frame, StubUpstream};

    const OWNER_HEADER: &str = "x-owner-id";
    const BOUNDARY: &str = "giftgpt-test-boundary";

    async fn app(stub: &Arc<StubUpstream>) -> Router {
        let store = SqliteSessionStore::in_memory().await.unwrap();
        let state = AppState::from_parts(
            RelayController::new(stub.clone(), &ProviderConfig::default()),
            Arc::new(store),
            HeaderName::from_static(OWNER_HEADER),
        );
        create_router(state)
    }

    fn json_post(uri: &str, owner: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(owner) = owner {
            builder = builder.header(OWNER_HEADER, owner);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn owned_get(uri: &str, owner: &str) -> Request<Body> {
        Request::get(uri).header(OWNER_HEADER, owner).body(Body::empty()).unwrap()
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, file_name, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match file_name {
                Some(file_name) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: audio/webm\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_post(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        Request::post("/chat/audio-stream")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let stub = Arc::new(StubUpstream::text("unused"));
        let response = app(&stub)
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_sync_returns_text_reply() {
        let stub = Arc::new(StubUpstream::text("A scented candle"));
        let response = app(&stub)
            .await
            .oneshot(json_post(
                "/chat/sync",
                None,
                serde_json::json!({"message": "gift for mum?", "apiKey": "sk-test"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["text"], "A scented candle");
        assert_eq!(json["audioCapable"], false);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected_before_upstream() {
        let stub = Arc::new(StubUpstream::chunks(vec![sse_frame("never")]));
        let response = app(&stub)
            .await
            .oneshot(json_post(
                "/chat/stream",
                None,
                serde_json::json!({"message": "", "credential": "sk-test"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Missing required fields.");
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let stub = Arc::new(StubUpstream::text("unused"));
        let request = Request::post("/chat/sync")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"message\": "))
            .unwrap();
        let response = app(&stub).await.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_stream_forwards_fragments_as_event_stream() {
        let stub = Arc::new(StubUpstream::chunks(vec![
            sse_frame("Try "),
            sse_frame("a candle"),
            "data: [DONE]\n\n".to_string(),
        ]));
        let response = app(&stub)
            .await
            .oneshot(json_post(
                "/chat/text-stream",
                None,
                serde_json::json!({"message": "gift?", "credential": "sk-test"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(body_bytes(response).await, b"Try a candle");
    }

    #[tokio::test]
    async fn test_upstream_auth_failure_is_forwarded() {
        let stub = Arc::new(StubUpstream::failing(UpstreamError::from_status(
            401,
            r#"{"error":{"message":"Incorrect API key provided"}}"#,
        )));
        let response = app(&stub)
            .await
            .oneshot(json_post(
                "/chat/stream",
                None,
                serde_json::json!({"message": "gift?", "credential": "sk-wrong"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["message"], "Incorrect API key provided");
    }

    #[tokio::test]
    async fn test_audio_requires_multipart() {
        let stub = Arc::new(StubUpstream::audio(None, vec![b"ID3".to_vec()]));
        let response = app(&stub)
            .await
            .oneshot(json_post(
                "/chat/audio-stream",
                None,
                serde_json::json!({"text": "hi", "apiKey": "sk-test"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], NOT_MULTIPART);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_audio_without_input_is_rejected() {
        let stub = Arc::new(StubUpstream::audio(None, vec![b"ID3".to_vec()]));
        let response = app(&stub)
            .await
            .oneshot(multipart_post(&[("apiKey", None, b"sk-test".as_slice())]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Missing audio or text input");
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_audio_bytes_pass_through_with_upstream_content_type() {
        let stub = Arc::new(StubUpstream::audio(
            Some("audio/ogg"),
            vec![vec![0x4f, 0x67], vec![0x67, 0x53]],
        ));
        let response = app(&stub)
            .await
            .oneshot(multipart_post(&[
                ("apiKey", None, b"sk-test".as_slice()),
                ("audio", Some("clip.webm"), [1_u8, 2, 3].as_slice()),
                ("text", None, b"what should I buy?".as_slice()),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/ogg");
        assert_eq!(body_bytes(response).await, vec![0x4f, 0x67, 0x67, 0x53]);
        assert_eq!(stub.last_audio_parts(), Some((true, true)));
    }

    #[tokio::test]
    async fn test_sessions_require_identity() {
        let stub = Arc::new(StubUpstream::text("unused"));
        let response = app(&stub)
            .await
            .oneshot(Request::get("/chat/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let stub = Arc::new(StubUpstream::text("unused"));
        let app = app(&stub).await;

        let saved = app
            .clone()
            .oneshot(json_post(
                "/chat/session",
                Some("alice"),
                serde_json::json!({
                    "title": "Birthday",
                    "ownerId": "mallory",
                    "messages": [
                        {"role": "user", "content": "Gift ideas for my sister", "timestamp": "2024-05-01T10:00:00Z"},
                        {"role": "llm", "content": "A pottery class", "timestamp": "2024-05-01T10:00:05Z"}
                    ]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(saved.status(), StatusCode::OK);
        let saved = body_json(saved).await;
        let id = saved["id"].as_str().unwrap().to_string();
        assert_eq!(saved["summary"], "Gift ideas for my sister");

        let listing = body_json(app.clone().oneshot(owned_get("/chat/sessions", "alice")).await.unwrap()).await;
        assert_eq!(listing.as_array().unwrap().len(), 1);
        assert_eq!(listing[0]["id"], id.as_str());

        let grouped = body_json(
            app.clone()
                .oneshot(owned_get("/chat/sessions/grouped", "alice"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(grouped["today"].as_array().unwrap().len(), 1);

        let favourite = app
            .clone()
            .oneshot(json_post(
                &format!("/chat/session/{id}/favourite"),
                Some("alice"),
                serde_json::json!({"isFavourite": true}),
            ))
            .await
            .unwrap();
        assert_eq!(favourite.status(), StatusCode::OK);

        let fetched = app
            .clone()
            .oneshot(owned_get(&format!("/chat/session/{id}"), "alice"))
            .await
            .unwrap();
        assert_eq!(fetched.status(), StatusCode::OK);
        let fetched = body_json(fetched).await;
        assert_eq!(fetched["ownerId"], "alice");
        assert_eq!(fetched["isFavourite"], true);
        assert_eq!(fetched["messages"][1]["role"], "assistant");

        let foreign = app
            .clone()
            .oneshot(owned_get(&format!("/chat/session/{id}"), "bob"))
            .await
            .unwrap();
        assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_saved_session_summary_is_never_blank() {
        let stub = Arc::new(StubUpstream::text("unused"));
        let response = app(&stub)
            .await
            .oneshot(json_post(
                "/chat/session",
                Some("alice"),
                serde_json::json!({"messages": [{"role": "llm", "content": "Hi!"}]}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["summary"], "New chat");
    }

    #[tokio::test]
    async fn test_unknown_or_malformed_session_id_is_not_found() {
        let stub = Arc::new(StubUpstream::text("unused"));
        let app = app(&stub).await;

        let malformed = app
            .clone()
            .oneshot(owned_get("/chat/session/not-a-uuid", "alice"))
            .await
            .unwrap();
        assert_eq!(malformed.status(), StatusCode::NOT_FOUND);

        let missing = app
            .oneshot(json_post(
                &format!("/chat/session/{}/favourite", SessionId::new()),
                Some("alice"),
                serde_json::json!({"isFavourite": true}),
            ))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_non_boolean_favourite_is_rejected() {
        let stub = Arc::new(StubUpstream::text("unused"));
        let response = app(&stub)
            .await
            .oneshot(json_post(
                &format!("/chat/session/{}/favourite", SessionId::new()),
                Some("alice"),
                serde_json::json!({"isFavourite": "yes"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
