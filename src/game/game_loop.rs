//! Fixed-cadence tick loop: the single writer of the world.
//!
//! All mutation funnels through here: commands drained at the tick boundary,
//! one physics step, population upkeep, then per-session diffs pushed to the
//! outbound channel. Overruns skip ticks rather than reorder them, so the
//! tick counter stays monotonic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TrySendError};
use parking_lot::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::game::entity::SessionId;
use crate::game::input::{CommandBuffer, CommandSender, EngineCommand};
use crate::game::physics::{self, TickEvents};
use crate::game::world::World;
use crate::net::leaderboard::{self, LeaderboardEntry};
use crate::net::view::{ViewDiff, ViewManager};

/// Message from the engine to the transport layer.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Per-session view delta for one tick (empty diffs are not sent)
    TickUpdate { session: SessionId, diff: ViewDiff },
    Leaderboard { entries: Vec<LeaderboardEntry> },
    /// Spawn was refused because the world is at capacity
    SpawnRefused { session: SessionId },
    /// The session's last cell was lost this tick
    SessionDied { session: SessionId },
}

/// Cadence of the periodic timing log, in ticks
const TIMING_LOG_INTERVAL: u64 = 250;

pub struct TickScheduler {
    world: World,
    views: ViewManager,
    commands: CommandBuffer,
    outbound: Sender<OutboundMessage>,
    /// Latest leaderboard snapshot, shared with out-of-loop readers
    leaderboard: Arc<RwLock<Vec<LeaderboardEntry>>>,
}

impl TickScheduler {
    pub fn new(config: EngineConfig, seed: u64, outbound: Sender<OutboundMessage>) -> Self {
        let commands = CommandBuffer::new(config.command_buffer_capacity);
        Self {
            world: World::new(config, seed),
            views: ViewManager::new(),
            commands,
            outbound,
            leaderboard: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Handle for connection handlers to submit commands.
    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    /// Shared read handle for the latest leaderboard snapshot.
    pub fn leaderboard_handle(&self) -> Arc<RwLock<Vec<LeaderboardEntry>>> {
        Arc::clone(&self.leaderboard)
    }

    #[inline]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Run one tick synchronously.
    pub fn step(&mut self) {
        let started = Instant::now();

        self.apply_commands();
        let commands_done = Instant::now();

        let events = physics::step(&mut self.world);
        let physics_done = Instant::now();

        self.world.replenish();
        let upkeep_done = Instant::now();

        self.broadcast(events);
        let broadcast_done = Instant::now();

        if self.world.tick % TIMING_LOG_INTERVAL == 0 {
            let stats = self.world.grid().stats();
            debug!(
                tick = self.world.tick,
                entities = self.world.entity_count(),
                grid_cells = stats.non_empty_cells,
                commands_us = (commands_done - started).as_micros() as u64,
                physics_us = (physics_done - commands_done).as_micros() as u64,
                upkeep_us = (upkeep_done - physics_done).as_micros() as u64,
                broadcast_us = (broadcast_done - upkeep_done).as_micros() as u64,
                "tick timing"
            );
        }
    }

    /// Drive the loop at the configured cadence until the task is dropped.
    pub async fn run(mut self) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.world.config.tick_interval_ms));
        // Late ticks are skipped, never replayed
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            self.step();
        }
    }

    fn apply_commands(&mut self) {
        for command in self.commands.drain() {
            match command {
                EngineCommand::Connect { session } => {
                    self.world.connect_session(session);
                    self.views.register(session);
                }
                EngineCommand::Spawn { session, name } => {
                    match self.world.spawn_player(session, name) {
                        Ok(_) => {}
                        Err(EngineError::WorldFull(cap)) => {
                            warn!("spawn refused for {}: world at capacity {}", session, cap);
                            self.send(OutboundMessage::SpawnRefused { session });
                        }
                        Err(e) => {
                            warn!("spawn failed for {}: {}", session, e);
                        }
                    }
                }
                EngineCommand::Input { session, mut input } => {
                    if !input.sanitize(&self.world.bounds()) {
                        continue;
                    }
                    // Input for a session that disconnected mid-flight is stale,
                    // not an error
                    let _ = self.world.apply_input(session, input);
                }
                EngineCommand::Disconnect { session } => {
                    self.world.disconnect_session(session);
                    self.views.unregister(session);
                }
            }
        }
    }

    fn broadcast(&mut self, events: TickEvents) {
        for session in self.world.session_ids() {
            match self.views.compute_diff(session, &self.world) {
                Ok(diff) => {
                    if !diff.added.is_empty()
                        || !diff.updated.is_empty()
                        || !diff.removed.is_empty()
                    {
                        self.send(OutboundMessage::TickUpdate { session, diff });
                    }
                }
                Err(e) => warn!("view diff failed for {}: {}", session, e),
            }
        }

        for session in events.died {
            self.send(OutboundMessage::SessionDied { session });
        }

        if self.world.tick % self.world.config.leaderboard_interval_ticks == 0 {
            let entries = leaderboard::compute(&self.world, self.world.config.leaderboard_size);
            *self.leaderboard.write() = entries.clone();
            self.send(OutboundMessage::Leaderboard { entries });
        }
    }

    fn send(&self, message: OutboundMessage) {
        match self.outbound.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("outbound channel full, dropping message");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("outbound channel disconnected");
            }
        }
    }
}
