use std::path::PathBuf;

use animcast::{
    AnimationManager, AnimationParams, ExportError, ExportJob, FfmpegSink, FfmpegSinkOpts, Fps,
    GifSink, GifSinkOpts, OutputFormat, PresentationSnapshot, RenderContext, SoftwareRenderer,
    TaskCtx, run_export,
};
use image::AnimationDecoder as _;

fn out_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from("target").join("encode_sinks").join(name);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn context() -> RenderContext {
    RenderContext::new(SoftwareRenderer::new(), AnimationManager::with_builtins())
}

fn spin_job(out: PathBuf) -> ExportJob {
    ExportJob::new("camera-spin", 48, 32, out)
        .with_params(AnimationParams::new().with("duration_ms", 500))
        .with_fps(Fps::new(10, 1).unwrap())
}

#[test]
fn gif_export_contains_every_sample() {
    let base = out_dir("gif").join("spin");
    let mut sink = GifSink::new(GifSinkOpts::default());
    let report = run_export(&mut context(), &spin_job(base.clone()), &mut sink, &mut TaskCtx::new())
        .unwrap();

    let gif_path = base.with_extension("gif");
    assert_eq!(report.outputs, vec![gif_path.clone()]);

    let f = std::io::BufReader::new(std::fs::File::open(&gif_path).unwrap());
    let decoder = image::codecs::gif::GifDecoder::new(f).unwrap();
    let frames = decoder.into_frames().collect_frames().unwrap();
    assert_eq!(frames.len() as u64, report.frames_captured);
    assert_eq!(frames.len(), 6);
    let first = frames[0].buffer();
    assert_eq!((first.width(), first.height()), (48, 32));
}

#[test]
fn missing_ffmpeg_is_encoder_unavailable() {
    let mut ctx = context();
    let before = PresentationSnapshot::capture(&ctx);

    let mut sink = FfmpegSink::new(FfmpegSinkOpts {
        program: PathBuf::from("definitely-not-an-ffmpeg-binary"),
        ..FfmpegSinkOpts::default()
    });
    let base = out_dir("missing").join("never");
    let err = run_export(&mut ctx, &spin_job(base), &mut sink, &mut TaskCtx::new()).unwrap_err();

    assert!(matches!(err, ExportError::EncoderUnavailable(_)), "{err}");
    assert_eq!(PresentationSnapshot::capture(&ctx), before);
}

#[test]
fn gif_rejects_frame_rates_without_a_representable_delay() {
    let mut ctx = context();
    let before = PresentationSnapshot::capture(&ctx);

    let base = out_dir("gif_slow").join("spin");
    let job = spin_job(base).with_fps(Fps::new(1, 5_000_000).unwrap());
    let mut sink = GifSink::new(GifSinkOpts::default());
    let err = run_export(&mut ctx, &job, &mut sink, &mut TaskCtx::new()).unwrap_err();

    assert!(matches!(err, ExportError::Validation(_)), "{err}");
    assert_eq!(PresentationSnapshot::capture(&ctx), before);
}

/// Stand-in `ffmpeg` that answers `-version`, then reads a few bytes of the frame stream, reports
/// an error and exits non-zero. Its pid is written to `pid_path`.
#[cfg(unix)]
fn failing_ffmpeg(dir: &std::path::Path, pid_path: &std::path::Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt as _;

    let script = dir.join("ffmpeg-fails");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\n\
             if [ \"$1\" = \"-version\" ]; then exit 0; fi\n\
             echo $$ > '{}'\n\
             head -c 100 > /dev/null\n\
             echo \"Unknown encoder 'libx264' stub-failure\" >&2\n\
             exit 1\n",
            pid_path.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[cfg(unix)]
#[test]
fn ffmpeg_failing_mid_stream_reports_its_stderr_and_restores_state() {
    let dir = out_dir("ffmpeg_fails");
    let pid_path = dir.join("ffmpeg.pid");
    let _ = std::fs::remove_file(&pid_path);
    let program = failing_ffmpeg(&dir, &pid_path);

    let mut ctx = context();
    ctx.clock_mut().set_time(250.0);
    let before = PresentationSnapshot::capture(&ctx);

    // Frames larger than a pipe buffer, so the write blocks until the process is gone.
    let job = ExportJob::new("camera-spin", 256, 256, dir.join("spin"))
        .with_params(AnimationParams::new().with("duration_ms", 500))
        .with_fps(Fps::new(10, 1).unwrap());
    let mut sink = FfmpegSink::new(FfmpegSinkOpts {
        program,
        ..FfmpegSinkOpts::default()
    });
    let err = run_export(&mut ctx, &job, &mut sink, &mut TaskCtx::new()).unwrap_err();

    match &err {
        ExportError::EncodingFailed(msg) => {
            assert!(msg.contains("stub-failure"), "{msg}");
            assert!(msg.contains("exit status"), "{msg}");
        }
        other => panic!("expected EncodingFailed, got {other}"),
    }
    assert_eq!(PresentationSnapshot::capture(&ctx), before);
    assert!(!ctx.player().is_playing());
    assert!(ctx.clock().is_running());

    let pid = std::fs::read_to_string(&pid_path).unwrap();
    let pid = pid.trim();
    assert!(!pid.is_empty());
    #[cfg(target_os = "linux")]
    assert!(
        !PathBuf::from("/proc").join(pid).exists(),
        "ffmpeg process {pid} was not reaped"
    );
}

#[test]
fn ffmpeg_writes_mp4_and_webm_from_one_stream() {
    if !animcast::encode::is_ffmpeg_on_path() {
        eprintln!("skipping: ffmpeg not on PATH");
        return;
    }

    let base = out_dir("ffmpeg").join("spin");
    let mut sink = FfmpegSink::new(
        FfmpegSinkOpts::default().with_formats([OutputFormat::Mp4, OutputFormat::Webm]),
    );
    let report = run_export(&mut context(), &spin_job(base.clone()), &mut sink, &mut TaskCtx::new())
        .unwrap();

    let expected = vec![base.with_extension("mp4"), base.with_extension("webm")];
    assert_eq!(report.outputs, expected);
    for path in &expected {
        let len = std::fs::metadata(path).unwrap().len();
        assert!(len > 0, "{} is empty", path.display());
    }
}
