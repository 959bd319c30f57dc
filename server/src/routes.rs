//! HTTP surface: the `/game` WebSocket upgrade and the `/health` probe.
//!
//! Each accepted socket is split; a writer task drains the connection's
//! outbound channel into the sink while the reader half feeds inbound text
//! frames to the session. Handshake failures (bad mode, failed auth, missing
//! gameId) send one typed error frame and close.

use crate::auth::{AuthError, Authenticator};
use crate::game::GameId;
use crate::manager::SharedManager;
use crate::net::{self, ConnectionHandle};
use crate::session::Session;
use crate::utils::timestamp_ms;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use shared::{GameMode, PlayerInfo};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub struct AppState {
    pub registry: SharedManager,
    pub auth: Arc<dyn Authenticator>,
    started_at: Instant,
    connected: AtomicUsize,
    next_conn_id: AtomicU64,
}

impl AppState {
    pub fn new(registry: SharedManager, auth: Arc<dyn Authenticator>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            auth,
            started_at: Instant::now(),
            connected: AtomicUsize::new(0),
            next_conn_id: AtomicU64::new(0),
        })
    }

    pub fn connected_clients(&self) -> usize {
        self.connected.load(Ordering::Relaxed)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/game", get(game_ws))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct GameQuery {
    mode: Option<String>,
    #[serde(rename = "gameId")]
    game_id: Option<GameId>,
    token: Option<String>,
}

async fn game_ws(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GameQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: GameQuery) {
    state.connected.fetch_add(1, Ordering::Relaxed);
    run_socket(socket, &state, query).await;
    state.connected.fetch_sub(1, Ordering::Relaxed);
}

async fn run_socket(socket: WebSocket, state: &Arc<AppState>, query: GameQuery) {
    let conn_id = state.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1;
    let (mut sink, mut stream) = socket.split();
    let (conn, mut rx) = ConnectionHandle::channel(conn_id);

    // Writer task: ends (and closes the socket) once every handle clone is
    // dropped, which teardown guarantees.
    let writer = tokio::spawn(async move {
        while let Some(json) = rx.recv().await {
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mode = match query.mode.as_deref().map(str::parse::<GameMode>) {
        Some(Ok(mode)) => mode,
        Some(Err(_)) => {
            warn!("connection {} requested unknown mode {:?}", conn_id, query.mode);
            net::send_error(&conn, "Unknown game mode");
            drop(conn);
            let _ = writer.await;
            return;
        }
        None => {
            net::send_error(&conn, "Missing mode parameter");
            drop(conn);
            let _ = writer.await;
            return;
        }
    };

    let player = if mode.requires_auth() {
        let Some(token) = query.token.as_deref().filter(|t| !t.is_empty()) else {
            net::send_error(
                &conn,
                &format!("Authentication failed: {}", AuthError::MissingToken),
            );
            drop(conn);
            let _ = writer.await;
            return;
        };
        match state.auth.authenticate(token).await {
            Ok(player) => player,
            Err(e) => {
                warn!("connection {} failed auth: {}", conn_id, e);
                net::send_error(&conn, &format!("Authentication failed: {}", e));
                drop(conn);
                let _ = writer.await;
                return;
            }
        }
    } else {
        PlayerInfo::local()
    };

    info!(
        "connection {} accepted ({} mode, {})",
        conn_id, mode, player.username
    );

    let mut session = match Session::connect(
        mode,
        player,
        query.game_id,
        conn.clone(),
        Arc::clone(&state.registry),
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            net::send_error(&conn, &e.to_string());
            drop(conn);
            let _ = writer.await;
            return;
        }
    };

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => session.handle_frame(&text).await,
            Ok(Message::Close(_)) => break,
            // Ping/pong is answered by the library; binary frames are not
            // part of the protocol.
            Ok(_) => {}
            Err(e) => {
                debug!("connection {} read error: {}", conn_id, e);
                break;
            }
        }
    }

    session.on_close().await;
    drop(session);
    drop(conn);
    let _ = writer.await;
    info!("connection {} closed", conn_id);
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    status: &'static str,
    timestamp: u64,
    /// Seconds since process start.
    uptime: u64,
    active_games: usize,
    connected_clients: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthBody> {
    let active_games = state.registry.lock().await.active_games();
    Json(HealthBody {
        status: "ok",
        timestamp: timestamp_ms(),
        uptime: state.started_at.elapsed().as_secs(),
        active_games,
        connected_clients: state.connected_clients(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StubAuthenticator;
    use crate::manager;
    use shared::ServerFrame;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    fn test_state() -> Arc<AppState> {
        AppState::new(
            manager::shared(),
            Arc::new(StubAuthenticator {
                user_id: "1".to_string(),
                username: "tester".to_string(),
            }),
        )
    }

    /// Authenticator that fails every token, for the rejection paths.
    struct RejectingAuthenticator;

    #[async_trait::async_trait]
    impl Authenticator for RejectingAuthenticator {
        async fn verify(&self, _token: &str) -> Result<String, AuthError> {
            Err(AuthError::InvalidToken)
        }

        async fn lookup_username(&self, _user_id: &str, _token: &str) -> Result<String, AuthError> {
            Err(AuthError::UnknownUser)
        }
    }

    async fn spawn_server(state: Arc<AppState>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("ws://{}/game", addr)
    }

    /// Connects, expects one typed error frame containing `needle`, then a
    /// server-initiated close.
    async fn expect_error_then_close(url: &str, needle: &str) {
        let (mut ws, _) = connect_async(url).await.unwrap();

        let msg = ws.next().await.expect("frame before close").unwrap();
        let frame: ServerFrame = serde_json::from_str(msg.to_text().unwrap()).unwrap();
        match frame {
            ServerFrame::Error { message, .. } => {
                assert!(message.contains(needle), "got: {}", message)
            }
            other => panic!("expected error frame, got {:?}", other),
        }

        match ws.next().await {
            None | Some(Ok(WsMessage::Close(_))) => {}
            other => panic!("expected close, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_mode_gets_error_then_close() {
        let url = spawn_server(test_state()).await;
        expect_error_then_close(&format!("{}?mode=bogus", url), "Unknown game mode").await;
    }

    #[tokio::test]
    async fn test_missing_mode_gets_error_then_close() {
        let url = spawn_server(test_state()).await;
        expect_error_then_close(&url, "Missing mode parameter").await;
    }

    #[tokio::test]
    async fn test_remote_without_token_gets_error_then_close() {
        let url = spawn_server(test_state()).await;
        expect_error_then_close(&format!("{}?mode=remote", url), "missing auth token").await;
    }

    #[tokio::test]
    async fn test_rejected_token_gets_error_then_close() {
        let state = AppState::new(manager::shared(), Arc::new(RejectingAuthenticator));
        let url = spawn_server(state).await;
        expect_error_then_close(
            &format!("{}?mode=remote&token=bad", url),
            "Authentication failed",
        )
        .await;
    }

    #[tokio::test]
    async fn test_friend_without_game_id_gets_error_then_close() {
        let url = spawn_server(test_state()).await;
        expect_error_then_close(
            &format!("{}?mode=friend&token=tok", url),
            "gameId is required",
        )
        .await;
    }

    #[tokio::test]
    async fn test_local_connect_receives_game_setup() {
        let state = test_state();
        let url = spawn_server(Arc::clone(&state)).await;

        let (mut ws, _) = connect_async(format!("{}?mode=local", url)).await.unwrap();
        let msg = ws.next().await.unwrap().unwrap();
        let frame: ServerFrame = serde_json::from_str(msg.to_text().unwrap()).unwrap();
        assert!(matches!(frame, ServerFrame::GameSetup { .. }));
        assert_eq!(state.connected_clients(), 1);
    }

    #[test]
    fn test_health_body_uses_camel_case() {
        let body = HealthBody {
            status: "ok",
            timestamp: 1,
            uptime: 2,
            active_games: 3,
            connected_clients: 4,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains(r#""activeGames":3"#));
        assert!(json.contains(r#""connectedClients":4"#));
    }

    #[test]
    fn test_game_query_field_names() {
        let query: GameQuery =
            serde_json::from_str(r#"{"mode":"friend","gameId":7,"token":"abc"}"#).unwrap();
        assert_eq!(query.mode.as_deref(), Some("friend"));
        assert_eq!(query.game_id, Some(7));
        assert_eq!(query.token.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_state_counts_start_at_zero() {
        let state = test_state();
        assert_eq!(state.connected_clients(), 0);
        assert_eq!(state.registry.lock().await.active_games(), 0);
    }

    #[test]
    fn test_router_builds() {
        let _router = router(test_state());
    }
}
