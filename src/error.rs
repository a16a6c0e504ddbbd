use crate::game::entity::{EntityId, SessionId};

/// Engine error taxonomy.
///
/// Consistency faults (`UnknownEntity`, `DuplicateEntity`) indicate a bug in
/// the engine itself: callers `debug_assert!` on them in debug builds and
/// log-and-skip in release. Resource exhaustion (`WorldFull`) is a refusal,
/// not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),

    #[error("entity {0} already indexed")]
    DuplicateEntity(EntityId),

    #[error("entity limit reached ({0})")]
    WorldFull(usize),

    #[error("unknown session {0}")]
    UnknownSession(SessionId),
}

/// Handle a spatial-index consistency fault: fail fast in debug builds,
/// log and continue in release.
pub fn index_fault(context: &'static str, err: EngineError) {
    debug_assert!(false, "index fault in {context}: {err}");
    tracing::error!("index fault in {}: {}", context, err);
}
