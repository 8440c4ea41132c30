use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};

use animcast::{
    AnimationManager, AnimationParams, CustomBackground, EncoderSink, ExportJob, FfmpegSink,
    FfmpegSinkOpts, Fps, GifSink, GifSinkOpts, OutputFormat, PostprocessProps, Progress,
    RenderContext, Rgba8, SoftwareRenderer, TaskCtx, Viewport,
};

#[derive(Parser, Debug)]
#[command(name = "animcast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export an animation to video (MP4/WebM need `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Render one sample of an export as a PNG.
    Frame(FrameArgs),
    /// Run every job of a JSON array one after another.
    Batch(BatchArgs),
    /// List the registered animations.
    List,
}

#[derive(Args, Debug)]
struct JobArgs {
    /// JSON job file; flags below override its fields.
    #[arg(long)]
    job: Option<PathBuf>,

    /// Animation name (see `animcast list`).
    #[arg(long)]
    animation: Option<String>,

    /// Duration for time-based animations (sets the `duration_ms` parameter).
    #[arg(long)]
    duration_ms: Option<f64>,

    /// Animation parameter, value parsed as JSON (repeatable).
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Render target width.
    #[arg(long)]
    width: Option<u32>,

    /// Render target height.
    #[arg(long)]
    height: Option<u32>,

    /// Capture rectangle as `x,y,width,height`.
    #[arg(long)]
    viewport: Option<Viewport>,

    /// Frame rate, `30` or `30000/1001`.
    #[arg(long)]
    fps: Option<Fps>,

    /// Quantization parameter (lower is better).
    #[arg(long)]
    quality: Option<u32>,

    /// Custom background color (`#rrggbb` or `#rrggbbaa`).
    #[arg(long)]
    background: Option<Rgba8>,

    /// Keep the background transparent.
    #[arg(long)]
    transparent_background: bool,

    /// Post-processing override, value parsed as JSON (repeatable).
    #[arg(long = "post", value_name = "KEY=VALUE")]
    post: Vec<String>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    job: JobArgs,

    /// Base output path; the container extension is appended.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Output formats (repeatable).
    #[arg(long = "format", value_enum, default_values_t = [FormatChoice::Mp4])]
    formats: Vec<FormatChoice>,

    /// Flatten alpha over this color before video encoding.
    #[arg(long)]
    flatten_over: Option<Rgba8>,

    /// `ffmpeg` executable.
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    #[command(flatten)]
    job: JobArgs,

    /// Sample index (0-based).
    #[arg(long, default_value_t = 0)]
    sample: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct BatchArgs {
    /// JSON file holding an array of jobs.
    #[arg(long)]
    jobs: PathBuf,

    /// Output formats (repeatable).
    #[arg(long = "format", value_enum, default_values_t = [FormatChoice::Mp4])]
    formats: Vec<FormatChoice>,

    /// `ffmpeg` executable.
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FormatChoice {
    Mp4,
    Webm,
    Gif,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Batch(args) => cmd_batch(args),
        Command::List => cmd_list(),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn new_context() -> RenderContext {
    RenderContext::new(SoftwareRenderer::new(), AnimationManager::with_builtins())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let f = File::open(path).with_context(|| format!("open {what} '{}'", path.display()))?;
    let r = BufReader::new(f);
    serde_json::from_reader(r).with_context(|| format!("parse {what} JSON '{}'", path.display()))
}

impl JobArgs {
    fn into_job(self, out: Option<PathBuf>) -> anyhow::Result<ExportJob> {
        let mut job = match &self.job {
            Some(path) => read_json::<ExportJob>(path, "job")?,
            None => {
                let animation = self
                    .animation
                    .clone()
                    .context("--animation is required without --job")?;
                ExportJob::new(animation, 1280, 720, PathBuf::new())
            }
        };

        if let Some(animation) = self.animation {
            job.animation = animation;
        }
        if let Some(duration_ms) = self.duration_ms {
            job.params.insert("duration_ms", duration_ms);
        }
        for p in &self.params {
            let (k, v) = PostprocessProps::parse_assignment(p)?;
            job.params.insert(k, v);
        }
        if let Some(width) = self.width {
            job.width = width;
        }
        if let Some(height) = self.height {
            job.height = height;
        }
        if self.viewport.is_some() {
            job.viewport = self.viewport;
        }
        if let Some(fps) = self.fps {
            job.fps = fps;
        }
        if let Some(quality) = self.quality {
            job.quality = quality;
        }
        match (self.background, self.transparent_background) {
            (Some(color), transparent) => {
                job.custom_background = Some(CustomBackground { color, transparent });
            }
            (None, true) => {
                let color = job.custom_background.map_or(Rgba8::BLACK, |bg| bg.color);
                job.custom_background = Some(CustomBackground {
                    color,
                    transparent: true,
                });
            }
            (None, false) => {}
        }
        if !self.post.is_empty() {
            let mut overrides = job.postprocessing.take().unwrap_or_default();
            for p in &self.post {
                let (k, v) = PostprocessProps::parse_assignment(p)?;
                overrides.insert(k, v);
            }
            job.postprocessing = Some(overrides);
        }
        if let Some(out) = out {
            job.out_path = out;
        }
        if job.out_path.as_os_str().is_empty() {
            anyhow::bail!("--out is required without a job file");
        }
        Ok(job)
    }
}

fn make_sink(
    formats: &[FormatChoice],
    ffmpeg: &Path,
    flatten_over: Option<Rgba8>,
) -> anyhow::Result<Box<dyn EncoderSink>> {
    if formats.contains(&FormatChoice::Gif) {
        if formats.len() > 1 {
            anyhow::bail!("gif output cannot be combined with video formats");
        }
        return Ok(Box::new(GifSink::new(GifSinkOpts::default())));
    }

    let mut video = Vec::new();
    for f in formats {
        let f = match f {
            FormatChoice::Mp4 => OutputFormat::Mp4,
            FormatChoice::Webm => OutputFormat::Webm,
            FormatChoice::Gif => continue,
        };
        if !video.contains(&f) {
            video.push(f);
        }
    }
    let opts = FfmpegSinkOpts {
        flatten_over,
        program: ffmpeg.to_path_buf(),
        ..FfmpegSinkOpts::default()
    }
    .with_formats(video);
    Ok(Box::new(FfmpegSink::new(opts)))
}

fn progress_logger() -> impl FnMut(&Progress) {
    let mut last_decile = None;
    move |p: &Progress| {
        let decile = (p.current * 10) / p.total.max(1);
        if last_decile != Some(decile) {
            last_decile = Some(decile);
            tracing::info!("sampling {}/{} ({}%)", p.current + 1, p.total, decile * 10);
        }
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let job = args.job.into_job(args.out)?;
    let mut sink = make_sink(&args.formats, &args.ffmpeg, args.flatten_over)?;

    let mut ctx = new_context();
    let mut task = TaskCtx::new().on_progress(progress_logger());
    let report = animcast::run_export(&mut ctx, &job, sink.as_mut(), &mut task)?;

    for out in &report.outputs {
        eprintln!("wrote {}", out.display());
    }
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let out = args.out;
    let job = args.job.into_job(Some(out.clone()))?;

    let mut ctx = new_context();
    let frame = animcast::render_still(&mut ctx, &job, args.sample)?;

    if let Some(parent) = out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        &out,
        frame.data(),
        frame.width(),
        frame.height(),
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", out.display()))?;

    eprintln!("wrote {}", out.display());
    Ok(())
}

fn cmd_batch(args: BatchArgs) -> anyhow::Result<()> {
    let jobs: Vec<ExportJob> = read_json(&args.jobs, "batch")?;
    if jobs.is_empty() {
        anyhow::bail!("batch file '{}' holds no jobs", args.jobs.display());
    }

    let mut ctx = new_context();
    let mut task = TaskCtx::new().on_progress(progress_logger());
    let reports = animcast::run_batch(
        &mut ctx,
        &jobs,
        |_| make_sink(&args.formats, &args.ffmpeg, None).map_err(animcast::ExportError::from),
        &mut task,
    )?;

    for out in reports.iter().flat_map(|r| &r.outputs) {
        eprintln!("wrote {}", out.display());
    }
    Ok(())
}

fn cmd_list() -> anyhow::Result<()> {
    let manager = AnimationManager::with_builtins();
    for def in manager.definitions() {
        println!("{:<18} {}", def.name(), def.description());
    }
    // Parameter-free defaults, to show which animations are exportable as-is.
    for def in manager.definitions() {
        let params = AnimationParams::new();
        if let Ok(instance) = def.instantiate(&params)
            && instance.duration_ms().is_none()
        {
            eprintln!("note: '{}' needs parameters to have a finite duration", def.name());
        }
    }
    Ok(())
}
