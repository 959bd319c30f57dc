//! # Pong Game Server Library
//!
//! Authoritative server for real-time multiplayer Pong over WebSockets. It
//! owns the canonical game state for every live match, steps the physics on
//! a fixed tick, and broadcasts snapshots so every connected client renders
//! the same game.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! All physics runs server-side at a fixed 60Hz tick. Clients only send
//! inputs; they never move the ball or paddles themselves, so a modified
//! client cannot manufacture a different game.
//!
//! ### Session Lifecycle
//! One session per WebSocket connection, covering five modes: local and AI
//! play on a single socket, remote matchmaking through a single waiting
//! slot, friend games joined by a shared invite id, and tournament matches
//! joined by a scheduled match id.
//!
//! ### State Broadcasting
//! Snapshots go out at 30Hz, decoupled from the physics rate. Delivery is
//! best-effort per recipient: one dead peer never blocks the broadcast to
//! the rest.
//!
//! ## Architecture Design
//!
//! The process-wide registry ([`manager::GameManager`]) lives behind one
//! async mutex. Every mutation happens under a single lock acquisition with
//! no await points inside, which makes each message-handling step atomic
//! with respect to every other connection. Games are referenced by id, never
//! by raw handle, so a stopped game disappears for everyone at once.
//!
//! ## Module Organization
//!
//! - [`physics`]: pure arena simulation, collisions and scoring
//! - [`game`]: one match's state plus its physics and render tasks
//! - [`manager`]: the registry, waiting slot, and active-player index
//! - [`session`]: the per-connection state machine for all five modes
//! - [`net`]: transport adapter, typed frames over a per-socket channel
//! - [`auth`]: boundary to the external auth/user HTTP service
//! - [`routes`]: the `/game` WebSocket upgrade and `/health` probe
//! - [`tournament`]: single-elimination bracket advancement

pub mod auth;
pub mod game;
pub mod manager;
pub mod net;
pub mod physics;
pub mod routes;
pub mod session;
pub mod tournament;
pub mod utils;
