use std::fs::File;
use std::path::PathBuf;

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};

use crate::encode::sink::{
    EncoderSink, FrameOrder, SinkConfig, check_frame_size, ensure_parent_dir, output_path,
};
use crate::foundation::core::Fps;
use crate::foundation::error::{ExportError, ExportResult};
use crate::render::backend::FrameBuffer;

/// GIF quantizer speed range; 1 is slowest and best quality.
const MIN_SPEED: u32 = 1;
const MAX_SPEED: u32 = 30;

/// Options for [`GifSink`].
#[derive(Clone, Debug)]
pub struct GifSinkOpts {
    /// Loop forever instead of playing once.
    pub looping: bool,
    /// Overwrite the output file if it already exists.
    pub overwrite: bool,
}

impl Default for GifSinkOpts {
    fn default() -> Self {
        Self {
            looping: true,
            overwrite: true,
        }
    }
}

struct GifState {
    encoder: GifEncoder<File>,
    cfg: SinkConfig,
    path: PathBuf,
    delay: Delay,
}

/// In-process encoder writing an animated GIF with the `image` crate's GIF codec.
///
/// The quality parameter maps to the quantizer speed (clamped to `1..=30`), so lower values
/// still mean better quality.
#[derive(Default)]
pub struct GifSink {
    opts: GifSinkOpts,
    state: Option<GifState>,
    order: FrameOrder,
}

impl GifSink {
    pub fn new(opts: GifSinkOpts) -> Self {
        Self {
            opts,
            state: None,
            order: FrameOrder::default(),
        }
    }
}

/// Per-frame delay (`1000 * den / num` ms) as a reduced fraction that fits the codec's `u32`s.
fn frame_delay(fps: Fps) -> ExportResult<Delay> {
    fps.validate()?;
    let numer = 1000 * u64::from(fps.den);
    let denom = u64::from(fps.num);
    let g = gcd(numer, denom);
    let (numer, denom) = (numer / g, denom / g);
    match (u32::try_from(numer), u32::try_from(denom)) {
        (Ok(numer), Ok(denom)) => Ok(Delay::from_numer_denom_ms(numer, denom)),
        _ => Err(ExportError::validation(format!(
            "frame rate {}/{} gives a gif frame delay out of range",
            fps.num, fps.den
        ))),
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn quality_to_speed(quality: u32) -> i32 {
    quality.clamp(MIN_SPEED, MAX_SPEED) as i32
}

impl EncoderSink for GifSink {
    fn begin(&mut self, cfg: SinkConfig) -> ExportResult<()> {
        cfg.validate()?;
        let delay = frame_delay(cfg.fps)?;
        if cfg.width > u32::from(u16::MAX) || cfg.height > u32::from(u16::MAX) {
            return Err(ExportError::validation(
                "gif frames are limited to 65535x65535",
            ));
        }

        let path = output_path(&cfg.out_path, "gif");
        ensure_parent_dir(&path)?;
        if !self.opts.overwrite && path.exists() {
            return Err(ExportError::validation(format!(
                "output file '{}' already exists",
                path.display()
            )));
        }

        let file = File::create(&path).map_err(|e| {
            ExportError::encoder_unavailable(format!(
                "failed to create '{}': {e}",
                path.display()
            ))
        })?;
        let mut encoder = GifEncoder::new_with_speed(file, quality_to_speed(cfg.quality));
        let repeat = if self.opts.looping {
            Repeat::Infinite
        } else {
            Repeat::Finite(0)
        };
        encoder.set_repeat(repeat).map_err(|e| {
            ExportError::encoder_unavailable(format!("failed to configure gif encoder: {e}"))
        })?;

        tracing::info!(
            path = %path.display(),
            width = cfg.width,
            height = cfg.height,
            speed = quality_to_speed(cfg.quality),
            "gif encoder started"
        );

        self.state = Some(GifState {
            encoder,
            cfg,
            path,
            delay,
        });
        self.order = FrameOrder::default();
        Ok(())
    }

    fn push_frame(&mut self, frame: FrameBuffer) -> ExportResult<()> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| ExportError::encoding_failed("gif sink not started"))?;
        check_frame_size(&frame, &state.cfg)?;
        self.order.check(frame.index())?;

        let index = frame.index();
        let (width, height) = (frame.width(), frame.height());
        let image = RgbaImage::from_raw(width, height, frame.into_data()).ok_or_else(|| {
            ExportError::encoding_failed("frame data does not match its dimensions")
        })?;
        state
            .encoder
            .encode_frame(Frame::from_parts(image, 0, 0, state.delay))
            .map_err(|e| ExportError::encoding_failed(format!("gif frame {index}: {e}")))
    }

    fn finish(&mut self) -> ExportResult<Vec<PathBuf>> {
        let state = self
            .state
            .take()
            .ok_or_else(|| ExportError::encoding_failed("gif sink not started"))?;
        let GifState { encoder, path, .. } = state;
        // Dropping the encoder writes the GIF trailer.
        drop(encoder);
        Ok(vec![path])
    }

    fn abort(&mut self) {
        if let Some(state) = self.state.take() {
            tracing::info!(path = %state.path.display(), "gif encoder aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_maps_into_speed_range() {
        assert_eq!(quality_to_speed(0), 1);
        assert_eq!(quality_to_speed(10), 10);
        assert_eq!(quality_to_speed(51), 30);
    }

    #[test]
    fn frame_delay_is_reduced_and_range_checked() {
        assert_eq!(
            frame_delay(Fps::new(30000, 1001).unwrap()).unwrap(),
            Delay::from_numer_denom_ms(1001, 30)
        );
        assert_eq!(
            frame_delay(Fps::new(25, 1).unwrap()).unwrap(),
            Delay::from_numer_denom_ms(40, 1)
        );
        let err = frame_delay(Fps::new(1, 5_000_000).unwrap()).unwrap_err();
        assert!(matches!(err, ExportError::Validation(_)));
        assert!(frame_delay(Fps::new(1, u32::MAX).unwrap()).is_err());
    }

    #[test]
    fn push_before_begin_fails() {
        let mut sink = GifSink::default();
        let err = sink
            .push_frame(FrameBuffer::new(0, 2, 2, vec![0; 16]))
            .unwrap_err();
        assert!(matches!(err, ExportError::EncodingFailed(_)));
        sink.abort();
    }
}
