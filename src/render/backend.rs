use crate::foundation::core::NormalizedViewport;
use crate::foundation::error::ExportResult;
use crate::presentation::{PostprocessProps, PresentationState};
use crate::render::scene::SceneState;

/// One captured frame: straight-alpha RGBA8 pixels tagged with the sample index it belongs to.
///
/// Immutable once captured. Frames are moved from the renderer to the sampler and on to the
/// encoder sink; nothing holds a second handle to the pixel data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    index: u64,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameBuffer {
    pub(crate) fn new(index: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 4);
        Self {
            index,
            width,
            height,
            data,
        }
    }

    /// Sample index (0-based) this frame was captured for.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Everything a renderer needs to draw one instant of the scene.
#[derive(Clone, Copy, Debug)]
pub struct SceneFrame<'a> {
    pub time_ms: f64,
    pub scene: &'a SceneState,
    pub presentation: &'a PresentationState,
}

/// Options for [`RenderContext::tick`](crate::render::RenderContext::tick).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickOpts {
    /// Draw before returning. When `false` the draw is deferred until the next pixel read.
    pub synchronous: bool,
    /// Treat the timestamp as absolute clock time instead of a delta for a free-running clock.
    pub manual_advance: bool,
}

impl TickOpts {
    /// Lock-step export ticks: absolute timestamp, blocking draw.
    pub const EXPORT: Self = Self {
        synchronous: true,
        manual_advance: true,
    };
}

/// Renderer contract consumed by the export pipeline.
///
/// `draw` must be synchronous: when it returns, the next `read_pixels` observes exactly that
/// instant. Implementations never interpolate, skip, or coalesce draws.
pub trait Renderer {
    /// Pass defaults that post-processing overrides are merged into.
    fn postprocess_defaults(&self) -> PostprocessProps;

    /// Render the scene at one instant.
    fn draw(&mut self, frame: &SceneFrame<'_>) -> ExportResult<()>;

    /// Read `viewport` out of the last draw rendered at `width` x `height`.
    ///
    /// Returns `viewport.width() * viewport.height() * 4` bytes of straight-alpha RGBA8, row-major.
    fn read_pixels(
        &mut self,
        width: u32,
        height: u32,
        viewport: NormalizedViewport,
    ) -> ExportResult<Vec<u8>>;
}
