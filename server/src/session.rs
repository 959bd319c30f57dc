//! Connection session: the per-WebSocket state machine.
//!
//! One generic `Session` covers all five modes; the `GameMode` tag selects
//! the creation, matchmaking, and teardown paths instead of five parallel
//! session types. States run Connecting → Active → Terminated. All registry
//! mutations for one inbound frame happen under a single lock acquisition,
//! so concurrent sessions never observe a half-applied matchmaking step.

use crate::game::{self, GameId};
use crate::manager::{SharedManager, WaitingSlot};
use crate::net::{self, ConnectionHandle};
use log::{debug, info};
use shared::{ClientFrame, GameMode, PlayerInfo, PlayerInput, ServerFrame};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("gameId is required for {0} mode")]
    MissingGameId(GameMode),
    #[error("game {0} is already full")]
    GameFull(GameId),
    #[error("game {0} is not available for {1} mode")]
    ModeMismatch(GameId, GameMode),
    #[error("you cannot play against yourself")]
    SelfMatch,
    #[error("you already have an active game")]
    AlreadyActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Terminated,
}

pub struct Session {
    mode: GameMode,
    player: PlayerInfo,
    conn: ConnectionHandle,
    registry: SharedManager,
    game_id: Option<GameId>,
    /// Which paddle this connection controls in networked modes.
    slot: u8,
    state: SessionState,
}

impl Session {
    /// Builds a session for a fresh connection. Local/AI modes create and
    /// start their game immediately; friend/tournament join the shared game
    /// id supplied at the front door; remote waits for a `startGame` frame.
    pub async fn connect(
        mode: GameMode,
        player: PlayerInfo,
        requested_game: Option<GameId>,
        conn: ConnectionHandle,
        registry: SharedManager,
    ) -> Result<Session, SessionError> {
        let mut session = Session {
            mode,
            player,
            conn,
            registry,
            game_id: None,
            slot: 1,
            state: SessionState::Connecting,
        };

        match mode {
            GameMode::Local | GameMode::Ai => {
                session.create_solo_game().await;
            }
            GameMode::Remote => {
                // Game is created lazily on the first startGame frame.
            }
            GameMode::Friend | GameMode::Tournament => {
                let shared_id = requested_game.ok_or(SessionError::MissingGameId(mode))?;
                session.join_shared_game(shared_id).await?;
            }
        }

        session.state = SessionState::Active;
        Ok(session)
    }

    pub fn game_id(&self) -> Option<GameId> {
        self.game_id
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn player(&self) -> &PlayerInfo {
        &self.player
    }

    /// Entry point for one inbound text frame.
    pub async fn handle_frame(&mut self, raw: &str) {
        if self.state == SessionState::Terminated {
            return;
        }

        let frame = match serde_json::from_str::<ClientFrame>(raw) {
            Ok(frame) => frame,
            Err(_) => {
                net::send_error(&self.conn, "Invalid message format");
                return;
            }
        };

        match frame {
            ClientFrame::PlayerInput { data } => self.handle_input(data).await,
            ClientFrame::StartGame { player, .. } => self.handle_start(player).await,
            ClientFrame::NextGame { .. } => self.handle_next().await,
            // Unknown frame types are ignored for forward compatibility.
            ClientFrame::Unknown => {}
        }
    }

    /// Socket closed: tear down the game, notify the opponent, release the
    /// registry entries. Runs synchronously to completion so no further
    /// ticks fire for an abandoned game.
    pub async fn on_close(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        self.teardown(true).await;
        self.state = SessionState::Terminated;
        debug!("session for connection {} terminated", self.conn.id());
    }

    async fn handle_input(&mut self, input: PlayerInput) {
        if input.player != 1 && input.player != 2 {
            net::send_error(&self.conn, "Invalid player slot");
            return;
        }
        let Some(game_id) = self.game_id else {
            debug!("input before any game on connection {}", self.conn.id());
            return;
        };

        // Networked players only ever control their own paddle; the
        // explicit slot field is honored for local/AI where both paddles
        // ride one socket.
        let slot = if self.mode.requires_auth() {
            self.slot
        } else {
            input.player
        };

        let mut mgr = self.registry.lock().await;
        if let Some(game) = mgr.lookup_mut(game_id) {
            game.state.apply_input(slot, input.action);
        }
    }

    async fn handle_start(&mut self, frame_player: Option<PlayerInfo>) {
        // A startGame frame may carry the identity for networked play when
        // the session does not have one yet.
        if self.mode.requires_auth() && self.player.is_local() {
            if let Some(player) = frame_player {
                self.player = player;
            }
        }

        match self.mode {
            GameMode::Local | GameMode::Ai => {
                match self.game_id {
                    // Re-arm: idempotent when already running.
                    Some(id) => game::start(&self.registry, id).await,
                    None => self.create_solo_game().await,
                }
            }
            GameMode::Remote => self.start_remote().await,
            GameMode::Friend | GameMode::Tournament => {
                let Some(id) = self.game_id else { return };
                let ready = {
                    let mgr = self.registry.lock().await;
                    mgr.lookup(id).map(|g| g.clients.len() == 2).unwrap_or(false)
                };
                if ready {
                    game::start(&self.registry, id).await;
                }
            }
        }
    }

    /// `nextGame`: stop the current match and re-run the mode's start path.
    async fn handle_next(&mut self) {
        self.teardown(true).await;

        match self.mode {
            GameMode::Local | GameMode::Ai => self.create_solo_game().await,
            GameMode::Remote => self.start_remote().await,
            // Friend and tournament games need a fresh invite/schedule id;
            // the client reconnects with it.
            GameMode::Friend | GameMode::Tournament => {}
        }
    }

    /// Local/AI: one synthetic player in slot 1, game starts frozen and the
    /// countdown fires immediately.
    async fn create_solo_game(&mut self) {
        let game_id = {
            let mut mgr = self.registry.lock().await;
            let game_id = mgr.create_game(self.mode);
            mgr.register_client(game_id, 1, PlayerInfo::local(), self.conn.clone());
            game_id
        };
        self.game_id = Some(game_id);
        self.slot = 1;
        game::start(&self.registry, game_id).await;
    }

    async fn start_remote(&mut self) {
        let identity = self.player.clone();
        if identity.is_local() {
            net::send_error(&self.conn, "Authentication required for remote play");
            return;
        }

        let started = {
            let mut mgr = self.registry.lock().await;
            let waiter = mgr
                .waiting()
                .map(|w| (w.conn.id(), w.player.user_id.clone(), w.game_id));

            match waiter {
                // Re-request from the waiting connection itself: no-op.
                Some((conn_id, _, _)) if conn_id == self.conn.id() => None,
                Some((_, ref user_id, _)) if *user_id == identity.user_id => {
                    net::send_error(&self.conn, "You cannot play against yourself");
                    None
                }
                Some((_, _, game_id)) => {
                    if mgr.is_player_active(&identity.user_id) {
                        net::send_error(&self.conn, "You already have an active game");
                        None
                    } else if !mgr.register_client(game_id, 2, identity.clone(), self.conn.clone())
                    {
                        // Slot 2 occupied means the waiting game somehow
                        // filled without the slot being cleared; never
                        // promote onto it.
                        net::send_error(&self.conn, "Game is already full");
                        None
                    } else {
                        // Promotion is atomic: slot 2 registration, index
                        // binding and waiting-slot clearing all happen under
                        // this one lock acquisition.
                        let Some(waiter) = mgr.clear_waiting() else {
                            return;
                        };
                        mgr.bind_player(&identity.user_id, game_id);
                        self.game_id = Some(game_id);
                        self.slot = 2;

                        waiter.conn.send(&ServerFrame::Ready {
                            message: "Opponent found, game starting".to_string(),
                            game_mode: GameMode::Remote,
                            player_number: 1,
                        });
                        self.conn.send(&ServerFrame::Ready {
                            message: "Opponent found, game starting".to_string(),
                            game_mode: GameMode::Remote,
                            player_number: 2,
                        });
                        info!(
                            "matched {} against {} in game {}",
                            waiter.player.username, identity.username, game_id
                        );
                        Some(game_id)
                    }
                }
                None => {
                    if mgr.is_player_active(&identity.user_id) {
                        net::send_error(&self.conn, "You already have an active game");
                    } else {
                        let game_id = mgr.create_game(GameMode::Remote);
                        mgr.register_client(game_id, 1, identity.clone(), self.conn.clone());
                        mgr.bind_player(&identity.user_id, game_id);
                        mgr.set_waiting(WaitingSlot {
                            player: identity.clone(),
                            conn: self.conn.clone(),
                            game_id,
                            since: Instant::now(),
                        });
                        self.game_id = Some(game_id);
                        self.slot = 1;

                        if let Some(game) = mgr.lookup(game_id) {
                            self.conn.send(&ServerFrame::GameSetup {
                                data: game.setup_snapshot(),
                            });
                        }
                        self.conn.send(&ServerFrame::Waiting {
                            message: "Waiting for an opponent".to_string(),
                            game_mode: GameMode::Remote,
                            player_number: 1,
                        });
                        info!("{} is waiting in game {}", identity.username, game_id);
                    }
                    None
                }
            }
        };

        if let Some(game_id) = started {
            game::start(&self.registry, game_id).await;
        }
    }

    /// Friend/tournament: both participants supply the same shared game id
    /// with distinct authenticated identities. The game is auto-created on
    /// the first join; the second join starts the countdown.
    async fn join_shared_game(&mut self, shared_id: GameId) -> Result<(), SessionError> {
        let identity = self.player.clone();

        let started = {
            let mut mgr = self.registry.lock().await;
            mgr.ensure_game(shared_id, self.mode);

            let game = mgr.lookup(shared_id).expect("game ensured above");
            // Invite ids share a namespace with auto-allocated ids; a
            // colliding id must never join a game of another mode.
            if game.mode != self.mode {
                return Err(SessionError::ModeMismatch(shared_id, self.mode));
            }
            if game
                .clients
                .values()
                .any(|c| c.player.user_id == identity.user_id)
            {
                return Err(SessionError::SelfMatch);
            }
            let slot = if !game.clients.contains_key(&1) {
                1
            } else if !game.clients.contains_key(&2) {
                2
            } else {
                return Err(SessionError::GameFull(shared_id));
            };
            if mgr.is_player_active(&identity.user_id) {
                return Err(SessionError::AlreadyActive);
            }

            if !mgr.register_client(shared_id, slot, identity.clone(), self.conn.clone()) {
                return Err(SessionError::GameFull(shared_id));
            }
            mgr.bind_player(&identity.user_id, shared_id);
            self.game_id = Some(shared_id);
            self.slot = slot;

            if let Some(game) = mgr.lookup(shared_id) {
                self.conn.send(&ServerFrame::GameSetup {
                    data: game.setup_snapshot(),
                });
            }
            if slot == 1 {
                self.conn.send(&ServerFrame::Waiting {
                    message: "Waiting for your friend to join".to_string(),
                    game_mode: self.mode,
                    player_number: 1,
                });
                false
            } else {
                let peer = mgr
                    .lookup(shared_id)
                    .and_then(|g| g.clients.get(&1))
                    .map(|c| c.conn.clone());
                if let Some(peer) = peer {
                    peer.send(&ServerFrame::Ready {
                        message: "Your friend joined, game starting".to_string(),
                        game_mode: self.mode,
                        player_number: 1,
                    });
                }
                self.conn.send(&ServerFrame::Ready {
                    message: "Your friend joined, game starting".to_string(),
                    game_mode: self.mode,
                    player_number: 2,
                });
                true
            }
        };

        if started {
            game::start(&self.registry, shared_id).await;
        }
        Ok(())
    }

    async fn teardown(&mut self, notify_peer: bool) {
        let mut mgr = self.registry.lock().await;
        if let Some(game_id) = self.game_id.take() {
            if notify_peer {
                if let Some(game) = mgr.lookup(game_id) {
                    for client in game.clients.values() {
                        if client.conn.id() != self.conn.id() {
                            client.conn.send(&ServerFrame::PlayerLeft {
                                message: "Your opponent left the game".to_string(),
                            });
                        }
                    }
                }
            }
            // Also clears the waiting slot and active-player bindings.
            mgr.stop_game(game_id);
        }
        mgr.unbind_player(&self.player.user_id);
    }
}
