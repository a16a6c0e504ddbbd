//! Lock-free command buffer feeding the tick loop
//!
//! Uses crossbeam-channel for lock-free MPSC communication from connection
//! handlers to the single-writer game loop. All session lifecycle and input
//! traffic arrives through here and is drained at the start of each tick.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::game::entity::SessionId;
use crate::game::spatial::Aabb;
use crate::util::vec2::Vec2;

/// Per-tick control state for one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlInput {
    /// Steering target in world coordinates
    pub target: Vec2,
    /// Split request, latched until the next tick applies it
    pub split: bool,
    /// Eject request, latched until the next tick applies it
    pub eject: bool,
}

impl ControlInput {
    /// Sanitize in place against the world bounds.
    ///
    /// Non-finite targets invalidate the whole input; out-of-range targets
    /// are clamped. Returns false if the input should be dropped.
    pub fn sanitize(&mut self, bounds: &Aabb) -> bool {
        if !self.target.is_finite() {
            return false;
        }
        self.target.x = self.target.x.clamp(bounds.min.x, bounds.max.x);
        self.target.y = self.target.y.clamp(bounds.min.y, bounds.max.y);
        true
    }
}

/// Command from a connection handler to the engine.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Register a session (view state, no cells yet)
    Connect { session: SessionId },
    /// Request a spawn; refused via `SpawnRefused` when the world is full
    Spawn { session: SessionId, name: String },
    /// Control input for the session's cells
    Input {
        session: SessionId,
        input: ControlInput,
    },
    /// Deferred disconnect, applied at the next tick boundary
    Disconnect { session: SessionId },
}

/// Lock-free command buffer using a bounded channel
///
/// Multiple connection handlers submit without blocking; the game loop
/// drains all pending commands at the start of each tick.
pub struct CommandBuffer {
    /// Sender side - cloned to each connection handler
    sender: Sender<EngineCommand>,
    /// Receiver side - used by the game loop
    receiver: Receiver<EngineCommand>,
    capacity: usize,
}

impl CommandBuffer {
    /// Create a new command buffer with given capacity
    ///
    /// Capacity should cover burst traffic between ticks.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Create a new sender handle for a connection
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            sender: self.sender.clone(),
        }
    }

    /// Try to submit a command (non-blocking)
    #[inline]
    pub fn try_submit(&self, command: EngineCommand) -> bool {
        self.sender.try_send(command).is_ok()
    }

    /// Drain all pending commands for this tick
    pub fn drain(&self) -> Vec<EngineCommand> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Clonable sender handle for connection handlers
#[derive(Clone)]
pub struct CommandSender {
    sender: Sender<EngineCommand>,
}

impl CommandSender {
    /// Submit a command (non-blocking)
    #[inline]
    pub fn try_send(&self, command: EngineCommand) -> Result<(), CommandBufferError> {
        self.sender.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => CommandBufferError::Full,
            TrySendError::Disconnected(_) => CommandBufferError::Disconnected,
        })
    }
}

/// Command buffer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferError {
    /// Buffer is full (backpressure)
    Full,
    /// Channel disconnected (game loop stopped)
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn input_cmd(session: SessionId, x: f32, y: f32) -> EngineCommand {
        EngineCommand::Input {
            session,
            input: ControlInput {
                target: Vec2::new(x, y),
                split: false,
                eject: false,
            },
        }
    }

    #[test]
    fn test_submit_and_drain() {
        let buffer = CommandBuffer::new(10);
        let session = Uuid::new_v4();

        assert!(buffer.try_submit(input_cmd(session, 1.0, 0.0)));
        assert!(buffer.try_submit(input_cmd(session, 2.0, 0.0)));
        assert_eq!(buffer.pending_count(), 2);

        let commands = buffer.drain();
        assert_eq!(commands.len(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_backpressure() {
        let buffer = CommandBuffer::new(2);
        let session = Uuid::new_v4();

        assert!(buffer.try_submit(input_cmd(session, 1.0, 0.0)));
        assert!(buffer.try_submit(input_cmd(session, 2.0, 0.0)));
        assert!(!buffer.try_submit(input_cmd(session, 3.0, 0.0)));

        buffer.drain();
        assert!(buffer.try_submit(input_cmd(session, 3.0, 0.0)));
    }

    #[test]
    fn test_sender_clone() {
        let buffer = CommandBuffer::new(10);
        let session = Uuid::new_v4();

        let sender1 = buffer.sender();
        let sender2 = buffer.sender();
        assert!(sender1.try_send(input_cmd(session, 1.0, 0.0)).is_ok());
        assert!(sender2.try_send(input_cmd(session, 2.0, 0.0)).is_ok());

        assert_eq!(buffer.drain().len(), 2);
    }

    #[test]
    fn test_sender_full_error() {
        let buffer = CommandBuffer::new(1);
        let session = Uuid::new_v4();
        let sender = buffer.sender();

        assert!(sender.try_send(input_cmd(session, 1.0, 0.0)).is_ok());
        assert_eq!(
            sender.try_send(input_cmd(session, 2.0, 0.0)),
            Err(CommandBufferError::Full)
        );
    }

    #[test]
    fn test_sanitize_clamps_target() {
        let bounds = Aabb::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0));
        let mut input = ControlInput {
            target: Vec2::new(500.0, -500.0),
            split: false,
            eject: false,
        };
        assert!(input.sanitize(&bounds));
        assert_eq!(input.target, Vec2::new(100.0, -100.0));
    }

    #[test]
    fn test_sanitize_rejects_non_finite() {
        let bounds = Aabb::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0));
        let mut input = ControlInput {
            target: Vec2::new(f32::NAN, 0.0),
            split: true,
            eject: false,
        };
        assert!(!input.sanitize(&bounds));
    }
}
