//! Game registry: all live games, the remote-mode waiting slot, and the
//! active-player index enforcing one game per user.
//!
//! The manager is the single owner of this process-wide state. Everything
//! else goes through its operations while holding the shared lock; no
//! operation awaits with the lock held, so each mutation is one atomic
//! message-handling step.

use crate::game::{Game, GameClient, GameId};
use crate::net::ConnectionHandle;
use log::{info, warn};
use shared::{GameMode, PlayerInfo};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Single-occupancy holding area for a remote-mode player with no opponent.
#[derive(Debug, Clone)]
pub struct WaitingSlot {
    pub player: PlayerInfo,
    pub conn: ConnectionHandle,
    pub game_id: GameId,
    pub since: Instant,
}

pub struct GameManager {
    games: HashMap<GameId, Game>,
    waiting: Option<WaitingSlot>,
    /// userId -> game the user currently occupies. Local identities are
    /// never bound here.
    active_players: HashMap<String, GameId>,
    next_game_id: GameId,
}

pub type SharedManager = Arc<Mutex<GameManager>>;

pub fn shared() -> SharedManager {
    Arc::new(Mutex::new(GameManager::new()))
}

impl GameManager {
    pub fn new() -> Self {
        Self {
            games: HashMap::new(),
            waiting: None,
            active_players: HashMap::new(),
            next_game_id: 1,
        }
    }

    /// Allocates and registers a new game, returning its id.
    pub fn create_game(&mut self, mode: GameMode) -> GameId {
        let id = self.next_game_id;
        self.next_game_id += 1;
        self.games.insert(id, Game::new(id, mode));
        info!("created game {} ({} mode)", id, mode);
        id
    }

    /// Registers a game under an externally supplied id (friend invites and
    /// tournament schedules carry their own ids). Existing games keep their
    /// entry.
    pub fn ensure_game(&mut self, id: GameId, mode: GameMode) -> GameId {
        if !self.games.contains_key(&id) {
            self.games.insert(id, Game::new(id, mode));
            self.next_game_id = self.next_game_id.max(id + 1);
            info!("created game {} ({} mode, shared id)", id, mode);
        }
        id
    }

    pub fn lookup(&self, id: GameId) -> Option<&Game> {
        self.games.get(&id)
    }

    pub fn lookup_mut(&mut self, id: GameId) -> Option<&mut Game> {
        self.games.get_mut(&id)
    }

    /// Binds a participant to a player slot. Idempotent per slot: an
    /// occupied slot is never silently overwritten, reassignment goes
    /// through an explicit remove first.
    pub fn register_client(
        &mut self,
        game_id: GameId,
        slot: u8,
        player: PlayerInfo,
        conn: ConnectionHandle,
    ) -> bool {
        debug_assert!(slot == 1 || slot == 2);
        let Some(game) = self.games.get_mut(&game_id) else {
            warn!("register_client on unknown game {}", game_id);
            return false;
        };
        if let Some(existing) = game.clients.get(&slot) {
            // Same connection re-registering is a no-op success.
            return existing.conn.id() == conn.id();
        }
        game.clients.insert(slot, GameClient { player, conn });
        true
    }

    /// Stops a game and releases every reference to it: the registry entry,
    /// its players' active-index bindings, and the waiting slot if it points
    /// here. Safe to call multiple times.
    pub fn stop_game(&mut self, id: GameId) {
        if self.waiting.as_ref().map(|w| w.game_id) == Some(id) {
            self.waiting = None;
        }
        self.active_players.retain(|_, bound| *bound != id);
        if let Some(mut game) = self.games.remove(&id) {
            game.stop();
        }
    }

    /// Stops every live game. Used only at process shutdown.
    pub fn stop_all_games(&mut self) {
        let ids: Vec<GameId> = self.games.keys().copied().collect();
        info!("stopping all games ({} active)", ids.len());
        for id in ids {
            self.stop_game(id);
        }
    }

    pub fn waiting(&self) -> Option<&WaitingSlot> {
        self.waiting.as_ref()
    }

    pub fn set_waiting(&mut self, slot: WaitingSlot) {
        self.waiting = Some(slot);
    }

    pub fn clear_waiting(&mut self) -> Option<WaitingSlot> {
        self.waiting.take()
    }

    pub fn is_player_active(&self, user_id: &str) -> bool {
        self.active_players.contains_key(user_id)
    }

    pub fn bind_player(&mut self, user_id: &str, game_id: GameId) {
        if user_id != "local" {
            self.active_players.insert(user_id.to_string(), game_id);
        }
    }

    pub fn unbind_player(&mut self, user_id: &str) {
        self.active_players.remove(user_id);
    }

    pub fn player_game(&self, user_id: &str) -> Option<GameId> {
        self.active_players.get(user_id).copied()
    }

    /// Number of live games, for the health endpoint.
    pub fn active_games(&self) -> usize {
        self.games.len()
    }

    /// Clears a waiting slot that has sat unmatched longer than `max_idle`
    /// and stops its frozen game. Nobody is notified: no opponent ever
    /// arrived. Returns the stopped game id if the sweep fired.
    pub fn sweep_waiting(&mut self, max_idle: Duration) -> Option<GameId> {
        let stale = self
            .waiting
            .as_ref()
            .filter(|w| w.since.elapsed() > max_idle)
            .map(|w| w.game_id)?;
        info!("waiting slot idle past {:?}, clearing game {}", max_idle, stale);
        self.stop_game(stale);
        Some(stale)
    }
}

impl Default for GameManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: u64) -> ConnectionHandle {
        // Receiver is dropped on purpose: these tests never read frames.
        ConnectionHandle::channel(id).0
    }

    fn player(id: &str) -> PlayerInfo {
        PlayerInfo {
            user_id: id.to_string(),
            username: format!("user-{}", id),
        }
    }

    #[test]
    fn test_create_game_assigns_sequential_ids() {
        let mut mgr = GameManager::new();
        let a = mgr.create_game(GameMode::Remote);
        let b = mgr.create_game(GameMode::Local);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(mgr.active_games(), 2);
    }

    #[test]
    fn test_ensure_game_is_idempotent_and_bumps_counter() {
        let mut mgr = GameManager::new();
        mgr.ensure_game(42, GameMode::Friend);
        mgr.ensure_game(42, GameMode::Friend);
        assert_eq!(mgr.active_games(), 1);

        // Fresh allocations skip past the externally supplied id.
        let next = mgr.create_game(GameMode::Remote);
        assert_eq!(next, 43);
    }

    #[test]
    fn test_register_client_rejects_occupied_slot() {
        let mut mgr = GameManager::new();
        let id = mgr.create_game(GameMode::Remote);

        assert!(mgr.register_client(id, 1, player("a"), conn(1)));
        // Same connection again: idempotent success.
        assert!(mgr.register_client(id, 1, player("a"), conn(1)));
        // Different connection may not steal the slot.
        assert!(!mgr.register_client(id, 1, player("b"), conn(2)));

        assert_eq!(mgr.lookup(id).unwrap().clients.len(), 1);
    }

    #[test]
    fn test_register_client_unknown_game() {
        let mut mgr = GameManager::new();
        assert!(!mgr.register_client(99, 1, player("a"), conn(1)));
    }

    #[test]
    fn test_stop_game_releases_everything() {
        let mut mgr = GameManager::new();
        let id = mgr.create_game(GameMode::Remote);
        mgr.register_client(id, 1, player("7"), conn(1));
        mgr.bind_player("7", id);
        mgr.set_waiting(WaitingSlot {
            player: player("7"),
            conn: conn(1),
            game_id: id,
            since: Instant::now(),
        });

        mgr.stop_game(id);

        assert!(mgr.lookup(id).is_none());
        assert!(!mgr.is_player_active("7"));
        assert!(mgr.waiting().is_none());
    }

    #[test]
    fn test_stop_game_twice_is_safe() {
        let mut mgr = GameManager::new();
        let id = mgr.create_game(GameMode::Local);
        mgr.stop_game(id);
        mgr.stop_game(id);
        assert_eq!(mgr.active_games(), 0);
    }

    #[test]
    fn test_stop_all_games() {
        let mut mgr = GameManager::new();
        let a = mgr.create_game(GameMode::Remote);
        let b = mgr.create_game(GameMode::Ai);
        mgr.bind_player("1", a);
        mgr.bind_player("2", b);

        mgr.stop_all_games();

        assert_eq!(mgr.active_games(), 0);
        assert!(!mgr.is_player_active("1"));
        assert!(!mgr.is_player_active("2"));
    }

    #[test]
    fn test_local_identity_never_bound() {
        let mut mgr = GameManager::new();
        let id = mgr.create_game(GameMode::Local);
        mgr.bind_player("local", id);
        assert!(!mgr.is_player_active("local"));
    }

    #[test]
    fn test_active_player_index() {
        let mut mgr = GameManager::new();
        let id = mgr.create_game(GameMode::Remote);
        mgr.bind_player("9", id);

        assert!(mgr.is_player_active("9"));
        assert_eq!(mgr.player_game("9"), Some(id));

        mgr.unbind_player("9");
        assert!(!mgr.is_player_active("9"));
    }

    #[test]
    fn test_sweep_waiting_only_when_stale() {
        let mut mgr = GameManager::new();
        let id = mgr.create_game(GameMode::Remote);
        mgr.set_waiting(WaitingSlot {
            player: player("1"),
            conn: conn(1),
            game_id: id,
            since: Instant::now(),
        });

        // Fresh slot survives.
        assert_eq!(mgr.sweep_waiting(Duration::from_secs(300)), None);
        assert!(mgr.waiting().is_some());

        // Backdate it past the idle limit.
        mgr.waiting.as_mut().unwrap().since = Instant::now() - Duration::from_secs(301);
        assert_eq!(mgr.sweep_waiting(Duration::from_secs(300)), Some(id));
        assert!(mgr.waiting().is_none());
        assert!(mgr.lookup(id).is_none());
    }
}
