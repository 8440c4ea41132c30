//! Renderer contract, deterministic clock driver, and the built-in software renderer.

/// Frame buffers, tick options and the [`Renderer`](backend::Renderer) trait.
pub mod backend;
/// Simulation clock.
pub mod clock;
/// [`RenderContext`](context::RenderContext): the single owner of viewer state.
pub mod context;
/// Animated scene content (camera, model index).
pub mod scene;
/// Deterministic CPU renderer.
pub mod software;

pub use backend::{FrameBuffer, Renderer, SceneFrame, TickOpts};
pub use clock::Clock;
pub use context::RenderContext;
pub use scene::{Camera, SceneState};
pub use software::{SoftwareRenderer, SoftwareRendererOpts};
