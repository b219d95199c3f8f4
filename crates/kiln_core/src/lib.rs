//! Kiln Core
//!
//! Scene storage for the Kiln engine:
//! - Entity-component store (`Scene`, `ComponentVector`, component registry)
//! - Binary scene streams
//! - Stock components shared by the engine's subsystems

pub mod components;
pub mod config;
pub mod ecs;
pub mod stream;

pub use config::SceneConfig;
pub use glam;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
