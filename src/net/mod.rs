//! Outbound-facing read models: per-session visibility diffs and the
//! leaderboard query.

pub mod leaderboard;
pub mod view;
