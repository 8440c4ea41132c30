use std::ops::{Deref, DerefMut};

use crate::foundation::core::Rgba8;
use crate::presentation::PostprocessProps;
use crate::render::context::RenderContext;
use crate::render::scene::SceneState;

/// Viewer state captured before an export job mutates it.
#[derive(Clone, Debug, PartialEq)]
pub struct PresentationSnapshot {
    /// Whether the animation loop (clock) was running.
    pub was_animating: bool,
    pub clock_time_ms: f64,
    pub background: Rgba8,
    pub transparent_background: bool,
    pub postprocessing: PostprocessProps,
    pub scene: SceneState,
}

impl PresentationSnapshot {
    /// Pure capture; does not touch the context.
    pub fn capture(ctx: &RenderContext) -> Self {
        let p = ctx.presentation();
        Self {
            was_animating: ctx.clock().is_running(),
            clock_time_ms: ctx.clock().time_ms(),
            background: p.background,
            transparent_background: p.transparent_background,
            postprocessing: p.postprocessing.clone(),
            scene: ctx.scene().clone(),
        }
    }

    /// Put the context back into the captured state.
    ///
    /// Order: stop playback, restore presentation and scene, then restore the clock (resumed only
    /// if it was running at capture). Idempotent. A failure to stop playback is logged and does
    /// not prevent the rest of the restoration.
    pub fn restore(&self, ctx: &mut RenderContext) {
        if ctx.player().is_playing()
            && let Err(e) = ctx.player_mut().stop()
        {
            tracing::warn!(error = %e, "failed to stop animation playback during restore");
        }

        let p = ctx.presentation_mut();
        p.background = self.background;
        p.transparent_background = self.transparent_background;
        p.postprocessing = self.postprocessing.clone();
        *ctx.scene_mut() = self.scene.clone();

        let clock = ctx.clock_mut();
        clock.set_time(self.clock_time_ms);
        if self.was_animating {
            clock.resume();
        } else {
            clock.stop();
        }
    }
}

/// Scoped ownership of a [`RenderContext`] that restores the captured state on every exit path.
///
/// Dereferences to the context, so the job body mutates it through the guard. Restoration runs
/// on [`StateGuard::release`] or, failing that, on drop (early `?` returns, cancellation, panics
/// during unwinding).
pub struct StateGuard<'a> {
    ctx: &'a mut RenderContext,
    snapshot: PresentationSnapshot,
    released: bool,
}

impl<'a> StateGuard<'a> {
    pub fn new(ctx: &'a mut RenderContext) -> Self {
        let snapshot = PresentationSnapshot::capture(ctx);
        Self {
            ctx,
            snapshot,
            released: false,
        }
    }

    pub fn snapshot(&self) -> &PresentationSnapshot {
        &self.snapshot
    }

    /// Restore now and give the context back.
    pub fn release(mut self) {
        self.restore_once();
    }

    fn restore_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.snapshot.restore(self.ctx);
        tracing::debug!(
            clock_resumed = self.snapshot.was_animating,
            "presentation state restored"
        );
    }
}

impl Deref for StateGuard<'_> {
    type Target = RenderContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.restore_once();
    }
}
