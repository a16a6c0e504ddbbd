//! Petri Arena Server Library
//!
//! Authoritative world-simulation engine for a cell-growth arena game:
//! a fixed-cadence tick loop advances a single mutable world (growth,
//! decay, splitting, merging, consumption), a spatial hash grid provides
//! the collision broad phase, and per-session view state turns each tick
//! into an `{added, updated, removed}` diff for the transport layer.
//!
//! Transport, rendering, and bot logic live outside this crate; the
//! engine's outbound contract is [`net::view::ViewDiff`] plus the
//! messages on the [`game::game_loop`] channel.

pub mod config;
pub mod error;
pub mod game;
pub mod net;
pub mod util;
