//! Core simulation: entity model, storage, spatial index, physics pipeline,
//! and the tick loop that drives them.

pub mod entity;
pub mod game_loop;
pub mod input;
pub mod physics;
pub mod spatial;
pub mod store;
pub mod world;
