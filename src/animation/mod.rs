//! Named animations and the player that binds them to the clock.

mod builtin;
/// Animation player contract and the registry-backed manager.
pub mod player;

pub use player::{AnimationDef, AnimationInstance, AnimationManager, AnimationParams, AnimationPlayer};
