//! Pure physics kernel: ball/paddle motion, collision and scoring for one tick.
//!
//! No I/O and no state beyond the `GameState` passed in. Evaluation order
//! within a tick is fixed: paddles move, the ball advances, top/bottom wall
//! reflection resolves first, then the paddle check runs on the corrected
//! trajectory. A ball exactly on the paddle plane counts as a hit.

use shared::{
    InputAction, PaddleSide, ARENA_HEIGHT, ARENA_WIDTH, BALL_MAX_ANGLE_SPEED, BALL_RADIUS,
    BALL_SPEED_X, PADDLE_LENGTH, PADDLE_MARGIN, PADDLE_SPEED,
};

#[derive(Debug, Clone, Copy)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub speed_x: f32,
    pub speed_y: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct Paddle {
    /// Center y of the paddle.
    pub cy: f32,
    pub length: f32,
    pub speed: f32,
    /// Current vertical velocity, set by player input.
    pub y_speed: f32,
    pub side: PaddleSide,
}

impl Paddle {
    pub fn new(side: PaddleSide) -> Self {
        Paddle {
            cy: ARENA_HEIGHT / 2.0,
            length: PADDLE_LENGTH,
            speed: PADDLE_SPEED,
            y_speed: 0.0,
            side,
        }
    }
}

/// The mutable simulation state of one match.
#[derive(Debug, Clone)]
pub struct GameState {
    pub width: f32,
    pub height: f32,
    pub ball: Ball,
    pub paddles: [Paddle; 2],
    pub score: [u32; 2],
    /// Seconds until the ball is released. 0 means live play.
    pub countdown: u32,
}

impl GameState {
    pub fn new() -> Self {
        GameState {
            width: ARENA_WIDTH,
            height: ARENA_HEIGHT,
            ball: Ball {
                x: ARENA_WIDTH / 2.0,
                y: ARENA_HEIGHT / 2.0,
                speed_x: 0.0,
                speed_y: 0.0,
                radius: BALL_RADIUS,
            },
            paddles: [Paddle::new(PaddleSide::Left), Paddle::new(PaddleSide::Right)],
            score: [0, 0],
            countdown: shared::COUNTDOWN_SECS,
        }
    }

    /// Applies a player input to the paddle owned by `slot` (1 or 2).
    /// Out-of-range slots are rejected by the caller before this point.
    pub fn apply_input(&mut self, slot: u8, action: InputAction) {
        let paddle = &mut self.paddles[(slot - 1) as usize];
        paddle.y_speed = match action {
            InputAction::Up => -paddle.speed,
            InputAction::Down => paddle.speed,
            InputAction::Stop => 0.0,
        };
    }

    /// Releases the ball from center. `toward_left` picks the serve
    /// direction, `vertical` the initial y velocity. Deterministic;
    /// the game entity supplies the randomness.
    pub fn serve(&mut self, toward_left: bool, vertical: f32) {
        self.ball.speed_x = if toward_left { -BALL_SPEED_X } else { BALL_SPEED_X };
        self.ball.speed_y = vertical.clamp(-BALL_MAX_ANGLE_SPEED, BALL_MAX_ANGLE_SPEED);
    }

    /// Re-centers the ball with zero velocity.
    pub fn reset_ball(&mut self) {
        self.ball.x = self.width / 2.0;
        self.ball.y = self.height / 2.0;
        self.ball.speed_x = 0.0;
        self.ball.speed_y = 0.0;
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one authoritative tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// The given slot (1 or 2) scored; the ball has been reset to center
    /// with zero velocity. The caller re-arms the countdown.
    Scored { scorer: u8 },
}

/// Advances the simulation by `dt` seconds.
pub fn step(state: &mut GameState, dt: f32) -> TickOutcome {
    step_paddles(state, dt);

    state.ball.x += state.ball.speed_x * dt;
    state.ball.y += state.ball.speed_y * dt;

    // Wall reflection resolves before the paddle check so a simultaneous
    // corner contact sees the corrected trajectory.
    resolve_walls(state);

    if resolve_paddle_hit(state) {
        return TickOutcome::Continue;
    }

    check_scoring(state)
}

fn step_paddles(state: &mut GameState, dt: f32) {
    let height = state.height;
    for paddle in &mut state.paddles {
        let half = paddle.length / 2.0;
        paddle.cy = (paddle.cy + paddle.y_speed * dt).clamp(half, height - half);
    }
}

fn resolve_walls(state: &mut GameState) {
    let ball = &mut state.ball;
    if ball.y - ball.radius <= 0.0 {
        ball.y = ball.radius;
        ball.speed_y = ball.speed_y.abs();
    } else if ball.y + ball.radius >= state.height {
        ball.y = state.height - ball.radius;
        ball.speed_y = -ball.speed_y.abs();
    }
}

/// Returns true if the ball bounced off a paddle this tick.
fn resolve_paddle_hit(state: &mut GameState) -> bool {
    let left_plane = PADDLE_MARGIN;
    let right_plane = state.width - PADDLE_MARGIN;

    let (paddle, plane, moving_toward) = if state.ball.speed_x < 0.0 {
        (state.paddles[0], left_plane, state.ball.x - state.ball.radius <= left_plane)
    } else if state.ball.speed_x > 0.0 {
        (state.paddles[1], right_plane, state.ball.x + state.ball.radius >= right_plane)
    } else {
        return false;
    };

    if !moving_toward {
        return false;
    }

    // Equality counts as a hit: a ball exactly on the plane at the tick
    // boundary keeps the rally alive instead of tunneling into a miss.
    let overlap = (state.ball.y - paddle.cy).abs() <= paddle.length / 2.0 + state.ball.radius;
    if !overlap {
        return false;
    }

    let ball = &mut state.ball;
    match paddle.side {
        PaddleSide::Left => {
            ball.x = plane + ball.radius;
            ball.speed_x = ball.speed_x.abs();
        }
        PaddleSide::Right => {
            ball.x = plane - ball.radius;
            ball.speed_x = -ball.speed_x.abs();
        }
    }

    // Classic Pong angling: outgoing vertical speed scales with the
    // impact offset from the paddle center.
    let offset = (ball.y - paddle.cy) / (paddle.length / 2.0);
    ball.speed_y = offset.clamp(-1.0, 1.0) * BALL_MAX_ANGLE_SPEED;

    true
}

fn check_scoring(state: &mut GameState) -> TickOutcome {
    let scorer = if state.ball.x - state.ball.radius <= 0.0 {
        Some(2)
    } else if state.ball.x + state.ball.radius >= state.width {
        Some(1)
    } else {
        None
    };

    match scorer {
        Some(slot) => {
            state.score[(slot - 1) as usize] += 1;
            state.reset_ball();
            TickOutcome::Scored { scorer: slot }
        }
        None => TickOutcome::Continue,
    }
}
