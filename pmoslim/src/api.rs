//! API HTTP du serveur slimproto
//!
//! Routes :
//! - `GET /player/{id}/audio.pcm` : flux PCM du relais, que le lecteur
//!   télécharge après `strm s`
//! - `GET /api/players` et `GET /api/players/{id}` : état des lecteurs
//! - `POST /api/players/{id}/play` : lecture d'une piste, avec une playlist
//!   de contexte éventuelle
//! - `POST /api/players/{id}/{next,previous,pause,reset}` : transport
//! - `POST /api/players/{id}/volume` : volume absolu
//! - `GET /api/players/events` : flux SSE des événements

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::registry::{PlayerStatus, SlimRegistry};
use crate::session::SlimSession;
use crate::track::Track;

const AUDIO_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayRequest {
    #[serde(default)]
    pub queue_type: String,
    #[serde(default)]
    pub queue_id: Option<String>,
    pub start_track: Track,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRequest {
    pub level: i32,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

fn find_session(registry: &SlimRegistry, id: &str) -> Result<Arc<SlimSession>, ApiError> {
    registry
        .get(id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Player {} not found", id)))
}

fn success(message: impl Into<String>) -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: message.into(),
    })
}

/// GET /player/{id}/audio.pcm
async fn audio_stream(
    State(registry): State<Arc<SlimRegistry>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let session = find_session(&registry, &id)?;
    info!(player = %id, "🔈 audio stream opened");

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    let body = Body::from_stream(session.player().relay().clone().stream(AUDIO_CHUNK));
    Ok((headers, body).into_response())
}

/// GET /api/players
async fn list_players(State(registry): State<Arc<SlimRegistry>>) -> Json<Vec<PlayerStatus>> {
    Json(registry.statuses())
}

/// GET /api/players/{id}
async fn get_player(
    State(registry): State<Arc<SlimRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<PlayerStatus>, ApiError> {
    Ok(Json(find_session(&registry, &id)?.status()))
}

/// POST /api/players/{id}/play
async fn play(
    State(registry): State<Arc<SlimRegistry>>,
    Path(id): Path<String>,
    Json(request): Json<PlayRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let session = find_session(&registry, &id)?;
    if request.start_track.video_id.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "start_track.videoId is empty"));
    }
    let video_id = request.start_track.video_id.clone();
    session
        .play_request(
            &request.queue_type,
            request.queue_id.as_deref(),
            request.start_track,
        )
        .await;
    Ok(success(format!("Playing {}", video_id)))
}

/// POST /api/players/{id}/next
async fn next(
    State(registry): State<Arc<SlimRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    find_session(&registry, &id)?.queue().next().await;
    Ok(success("next"))
}

/// POST /api/players/{id}/previous
async fn previous(
    State(registry): State<Arc<SlimRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    find_session(&registry, &id)?.queue().previous().await;
    Ok(success("previous"))
}

/// POST /api/players/{id}/pause
async fn pause(
    State(registry): State<Arc<SlimRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    find_session(&registry, &id)?.queue().toggle_pause().await;
    Ok(success("pause toggled"))
}

/// POST /api/players/{id}/reset
async fn reset(
    State(registry): State<Arc<SlimRegistry>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    find_session(&registry, &id)?.queue().reset().await;
    Ok(success("reset"))
}

/// POST /api/players/{id}/volume
async fn set_volume(
    State(registry): State<Arc<SlimRegistry>>,
    Path(id): Path<String>,
    Json(request): Json<VolumeRequest>,
) -> Result<Json<PlayerStatus>, ApiError> {
    let session = find_session(&registry, &id)?;
    session.set_volume(request.level).await.map_err(|e| {
        warn!(player = %id, "❌ volume change failed: {}", e);
        api_error(StatusCode::BAD_GATEWAY, e.to_string())
    })?;
    Ok(Json(session.status()))
}

/// GET /api/players/events
async fn events_sse(State(registry): State<Arc<SlimRegistry>>) -> impl IntoResponse {
    let mut events = registry.subscribe();

    let stream = stream! {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok::<_, axum::Error>(Event::default().event("player").data(json));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "SSE client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Router complet, à monter à la racine du serveur HTTP.
pub fn router(registry: Arc<SlimRegistry>) -> Router {
    Router::new()
        .route("/player/{id}/audio.pcm", get(audio_stream))
        .route("/api/players", get(list_players))
        .route("/api/players/events", get(events_sse))
        .route("/api/players/{id}", get(get_player))
        .route("/api/players/{id}/play", post(play))
        .route("/api/players/{id}/next", post(next))
        .route("/api/players/{id}/previous", post(previous))
        .route("/api/players/{id}/pause", post(pause))
        .route("/api/players/{id}/reset", post(reset))
        .route("/api/players/{id}/volume", post(set_volume))
        .with_state(registry)
}

/// Extension de `pmoserver::Server` pour l'API slimproto
#[async_trait]
pub trait SlimServerExt {
    /// Enregistre le flux audio, l'API REST et le flux SSE des lecteurs.
    async fn register_slim_api(&mut self, registry: Arc<SlimRegistry>);
}

#[async_trait]
impl SlimServerExt for pmoserver::Server {
    async fn register_slim_api(&mut self, registry: Arc<SlimRegistry>) {
        self.add_router("/", router(registry)).await;
        info!("✅ Slim API registered on /api/players");
    }
}
