//! Game entity: the authoritative state of one match plus its two periodic
//! tasks (physics tick and render broadcast) with deterministic start/stop.

use crate::manager::SharedManager;
use crate::net::{self, ConnectionHandle};
use crate::physics::{self, GameState, TickOutcome};
use log::{debug, info};
use rand::Rng;
use shared::{GameMode, PlayerInfo, SetupSnapshot, StateSnapshot, COUNTDOWN_SECS, PHYSICS_HZ, RENDER_HZ};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

pub type GameId = u32;

/// One registered participant: identity plus the send capability for
/// broadcasts. Slot 1 is the left paddle, slot 2 the right.
#[derive(Debug, Clone)]
pub struct GameClient {
    pub player: PlayerInfo,
    pub conn: ConnectionHandle,
}

pub struct Game {
    pub id: GameId,
    pub mode: GameMode,
    pub state: GameState,
    /// True between start() and stop().
    running: bool,
    /// Player slot (1 or 2) to participant. Never more than two entries.
    pub clients: HashMap<u8, GameClient>,
    physics_task: Option<JoinHandle<()>>,
    render_task: Option<JoinHandle<()>>,
}

impl Game {
    pub fn new(id: GameId, mode: GameMode) -> Self {
        Game {
            id,
            mode,
            state: GameState::new(),
            running: false,
            clients: HashMap::new(),
            physics_task: None,
            render_task: None,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    /// Disarms both periodic tasks. Idempotent: stopping an already-stopped
    /// game is a no-op.
    pub fn stop(&mut self) {
        if let Some(task) = self.physics_task.take() {
            task.abort();
        }
        if let Some(task) = self.render_task.take() {
            task.abort();
        }
        if self.running {
            self.running = false;
            info!("game {} stopped", self.id);
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            ball: shared::BallSnapshot {
                x: self.state.ball.x,
                y: self.state.ball.y,
                speed_x: self.state.ball.speed_x,
                speed_y: self.state.ball.speed_y,
                radius: self.state.ball.radius,
            },
            paddles: self
                .state
                .paddles
                .iter()
                .map(|p| shared::PaddleSnapshot {
                    cy: p.cy,
                    length: p.length,
                    side: p.side,
                })
                .collect(),
            score: self.state.score,
            countdown: self.state.countdown,
        }
    }

    pub fn setup_snapshot(&self) -> SetupSnapshot {
        SetupSnapshot {
            width: self.state.width,
            height: self.state.height,
            ball_radius: self.state.ball.radius,
            paddle_length: shared::PADDLE_LENGTH,
            state: self.snapshot(),
        }
    }
}

impl Drop for Game {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Arms the physics and render tasks for the given game. Idempotent:
/// calling on an already-running game is a no-op. The ball starts frozen;
/// the countdown is stepped inside the physics task (one decrement per
/// second of ticks) and the ball is served when it reaches zero.
pub async fn start(registry: &SharedManager, game_id: GameId) {
    let mut mgr = registry.lock().await;
    let Some(game) = mgr.lookup_mut(game_id) else {
        debug!("start requested for unknown game {}", game_id);
        return;
    };
    if game.running {
        return;
    }

    game.running = true;
    game.state.countdown = COUNTDOWN_SECS;
    game.state.reset_ball();
    info!("game {} started ({} mode)", game_id, game.mode);

    // Everyone re-syncs on the full geometry at (re)start.
    net::broadcast_setup(game);

    game.physics_task = Some(spawn_physics_task(Arc::clone(registry), game_id));
    game.render_task = Some(spawn_render_task(Arc::clone(registry), game_id));
}

fn spawn_physics_task(registry: SharedManager, game_id: GameId) -> JoinHandle<()> {
    tokio::spawn(async move {
        let dt = 1.0 / PHYSICS_HZ as f32;
        let mut ticker = interval(Duration::from_secs_f32(dt));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Whole ticks elapsed within the current countdown second.
        let mut countdown_ticks: u32 = 0;

        loop {
            ticker.tick().await;

            let mut mgr = registry.lock().await;
            let Some(game) = mgr.lookup_mut(game_id) else { break };
            if !game.running {
                break;
            }

            if game.mode == GameMode::Ai {
                drive_ai_paddle(&mut game.state);
            }

            if game.state.countdown > 0 {
                countdown_ticks += 1;
                if countdown_ticks >= PHYSICS_HZ {
                    countdown_ticks = 0;
                    game.state.countdown -= 1;
                    if game.state.countdown == 0 {
                        let mut rng = rand::thread_rng();
                        let toward_left = rng.gen_bool(0.5);
                        let vertical = rng.gen_range(-100.0..100.0);
                        game.state.serve(toward_left, vertical);
                    }
                }
                // Paddles still move while the ball is frozen.
                physics::step(&mut game.state, dt);
                continue;
            }

            if let TickOutcome::Scored { scorer } = physics::step(&mut game.state, dt) {
                debug!("game {}: player {} scored ({:?})", game_id, scorer, game.state.score);
                game.state.countdown = COUNTDOWN_SECS;
                countdown_ticks = 0;
            }
        }
    })
}

fn spawn_render_task(registry: SharedManager, game_id: GameId) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs_f32(1.0 / RENDER_HZ as f32));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let mgr = registry.lock().await;
            let Some(game) = mgr.lookup(game_id) else { break };
            if !game.running() {
                break;
            }
            net::broadcast_state(game);
        }
    })
}

/// Follow-the-ball heuristic for the right paddle, with a dead-zone of a
/// quarter paddle length around the center to avoid jitter.
pub fn drive_ai_paddle(state: &mut GameState) {
    let paddle = &mut state.paddles[1];
    let offset = state.ball.y - paddle.cy;
    if offset.abs() <= paddle.length / 4.0 {
        paddle.y_speed = 0.0;
    } else if offset < 0.0 {
        paddle.y_speed = -paddle.speed;
    } else {
        paddle.y_speed = paddle.speed;
    }
}
