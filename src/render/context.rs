use crate::animation::AnimationPlayer;
use crate::foundation::core::NormalizedViewport;
use crate::foundation::error::{ExportError, ExportResult};
use crate::presentation::PresentationState;
use crate::render::backend::{FrameBuffer, Renderer, SceneFrame, TickOpts};
use crate::render::clock::Clock;
use crate::render::scene::SceneState;

/// Explicitly owned viewer state an export job runs against.
///
/// Bundles the renderer, the simulation clock, the animation player, the scene and the
/// presentation state. A job borrows the context mutably for its whole duration, so two jobs can
/// never interleave on the same context.
pub struct RenderContext {
    renderer: Box<dyn Renderer>,
    player: Box<dyn AnimationPlayer>,
    clock: Clock,
    scene: SceneState,
    presentation: PresentationState,
    draw_pending: bool,
}

impl RenderContext {
    /// Build a context; presentation starts from the renderer's post-processing defaults over a
    /// black background, with a running clock.
    pub fn new(
        renderer: impl Renderer + 'static,
        player: impl AnimationPlayer + 'static,
    ) -> Self {
        let presentation = PresentationState::new(
            crate::foundation::core::Rgba8::BLACK,
            renderer.postprocess_defaults(),
        );
        Self {
            renderer: Box::new(renderer),
            player: Box::new(player),
            clock: Clock::new(),
            scene: SceneState::default(),
            presentation,
            draw_pending: true,
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    pub fn scene(&self) -> &SceneState {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut SceneState {
        self.draw_pending = true;
        &mut self.scene
    }

    pub fn presentation(&self) -> &PresentationState {
        &self.presentation
    }

    pub fn presentation_mut(&mut self) -> &mut PresentationState {
        self.draw_pending = true;
        &mut self.presentation
    }

    pub fn player(&self) -> &dyn AnimationPlayer {
        self.player.as_ref()
    }

    pub fn player_mut(&mut self) -> &mut dyn AnimationPlayer {
        self.player.as_mut()
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    /// Drive the clock to `time_ms`, apply the playing animation, and draw.
    ///
    /// With [`TickOpts::EXPORT`] the clock jumps to exactly `time_ms` and the draw has completed
    /// when this returns; no interpolation happens between ticks.
    pub fn tick(&mut self, time_ms: f64, opts: TickOpts) -> ExportResult<()> {
        if !time_ms.is_finite() {
            return Err(ExportError::validation("tick timestamp must be finite"));
        }
        if opts.manual_advance {
            if time_ms < 0.0 {
                return Err(ExportError::validation("tick timestamp must be >= 0"));
            }
            self.clock.set_time(time_ms);
        } else {
            self.clock.advance(time_ms);
        }

        self.player.apply(self.clock.time_ms(), &mut self.scene);
        self.draw_pending = true;
        if opts.synchronous {
            self.draw()?;
        }
        Ok(())
    }

    /// Capture the current render state into an owned frame tagged with `index`.
    ///
    /// A deferred draw (non-synchronous tick, or state changed since the last draw) is flushed
    /// first.
    pub fn capture(
        &mut self,
        index: u64,
        width: u32,
        height: u32,
        viewport: NormalizedViewport,
    ) -> ExportResult<FrameBuffer> {
        if self.draw_pending {
            self.draw()?;
        }
        let data = self.renderer.read_pixels(width, height, viewport)?;
        let expected = viewport.width() as usize * viewport.height() as usize * 4;
        if data.len() != expected {
            return Err(ExportError::render(format!(
                "renderer returned {} bytes for a {}x{} viewport, expected {expected}",
                data.len(),
                viewport.width(),
                viewport.height()
            )));
        }
        Ok(FrameBuffer::new(
            index,
            viewport.width(),
            viewport.height(),
            data,
        ))
    }

    fn draw(&mut self) -> ExportResult<()> {
        let frame = SceneFrame {
            time_ms: self.clock.time_ms(),
            scene: &self.scene,
            presentation: &self.presentation,
        };
        self.renderer.draw(&frame)?;
        self.draw_pending = false;
        Ok(())
    }
}
