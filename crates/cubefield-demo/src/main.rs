//! Demo driver that runs the cube grid renderer for a fixed number of frames.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Edits to the file during a run update grid bounds and request coalescing.
//! Run with `cargo run -p cubefield-demo -- --script up,up,vbo,stride,down`.
//! Add `--backend wgpu --screenshot frame.png` to render on the GPU and keep the
//! last frame.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use clap::Parser;
use cubefield_app::{CubeGridRenderer, PipelineState, RequestCommand, RotationDeltas, parse_script};
use cubefield_config::{Backend, CliArgs, Config, default_config_dir};
use cubefield_render::{GpuBufferApi, HeadlessGpu, LoggingErrorHandler, ReadbackError, WgpuGpu};
use tracing::{error, info, warn};

/// Upper bound on frames spent waiting for queued generations after the run.
const MAX_SETTLE_FRAMES: u32 = 10_000;

/// Frames between checks of `config.ron` for edits.
const RELOAD_INTERVAL_FRAMES: u32 = 60;

#[derive(Debug, thiserror::Error)]
enum ScreenshotError {
    #[error("readback failed: {0}")]
    Readback(#[from] ReadbackError),
    #[error("failed to write screenshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode PNG: {0}")]
    Encode(#[from] png::EncodingError),
}

enum DemoGpu {
    Headless(HeadlessGpu),
    Wgpu(Box<WgpuGpu>),
}

impl DemoGpu {
    fn create(config: &Config) -> Self {
        match config.render.backend {
            Backend::Headless => Self::Headless(HeadlessGpu::new()),
            Backend::Wgpu => match WgpuGpu::new(
                config.surface.width,
                config.surface.height,
                config.render.clear_color,
            ) {
                Ok(gpu) => Self::Wgpu(Box::new(gpu)),
                Err(e) => {
                    warn!("wgpu backend unavailable ({e}), falling back to headless");
                    Self::Headless(HeadlessGpu::new())
                }
            },
        }
    }

    fn api(&mut self) -> &mut dyn GpuBufferApi {
        match self {
            Self::Headless(gpu) => gpu as &mut dyn GpuBufferApi,
            Self::Wgpu(gpu) => &mut **gpu,
        }
    }
}

/// Feeds a slow drag into the renderer until stopped.
fn spawn_drag_input(deltas: Arc<RotationDeltas>, stop: Arc<AtomicBool>) -> Option<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("cubefield-input".to_string())
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                deltas.add(1.5, 0.5);
                std::thread::sleep(Duration::from_millis(16));
            }
        })
        .map_err(|e| warn!("Failed to spawn input thread: {e}"))
        .ok()
}

fn write_screenshot(gpu: &mut WgpuGpu, path: &Path) -> Result<(), ScreenshotError> {
    let pixels = gpu.read_pixels()?;
    let (width, height) = gpu.size();
    let file = std::fs::File::create(path)?;
    let mut encoder = png::Encoder::new(std::io::BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&pixels)?;
    Ok(())
}

fn main() {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| PathBuf::from(".cubefield"));

    // Load or create config, then apply CLI overrides
    let mut file_config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    let mut config = file_config.clone();
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    cubefield_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let script = match args.script.as_deref().map(parse_script).transpose() {
        Ok(script) => script.unwrap_or_default(),
        Err(e) => {
            error!("{e}");
            std::process::exit(2);
        }
    };

    let mut gpu = DemoGpu::create(&config);
    let mut renderer = match CubeGridRenderer::new(&config, Arc::new(LoggingErrorHandler)) {
        Ok(renderer) => renderer,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let input = spawn_drag_input(renderer.rotation_input(), Arc::clone(&stop));
    let status = renderer.pipeline().status_updates();

    info!(
        scene = ?config.render.scene,
        backend = ?config.render.backend,
        frames = config.debug.frames,
        "Starting run"
    );
    let started = Instant::now();
    renderer.on_surface_created(gpu.api());
    renderer.on_surface_changed(config.surface.width, config.surface.height);

    let mut commands = script.into_iter();
    for frame in 0..config.debug.frames {
        if let Some(command) = commands.next()
            && !command.apply(&mut renderer)
        {
            info!(frame, ?command, "Request ignored");
        }
        if frame > 0 && frame % RELOAD_INTERVAL_FRAMES == 0 {
            match file_config.reload(&config_dir) {
                Ok(Some(reloaded)) => {
                    config = reloaded.clone();
                    config.apply_cli_overrides(&args);
                    renderer.apply_config(&config);
                    file_config = reloaded;
                }
                Ok(None) => {}
                Err(e) => warn!(frame, "Config reload failed: {e}"),
            }
        }
        renderer.on_draw_frame(gpu.api());
        for update in status.try_iter() {
            info!(frame, "Now drawing {update}");
        }
    }
    let leftover: Vec<RequestCommand> = commands.collect();
    if !leftover.is_empty() {
        warn!(count = leftover.len(), "Script longer than the run, skipped the rest");
    }

    let mut settle = 0;
    while renderer.pipeline().state() != PipelineState::Idle && settle < MAX_SETTLE_FRAMES {
        std::thread::sleep(Duration::from_millis(1));
        renderer.on_draw_frame(gpu.api());
        settle += 1;
    }

    stop.store(true, Ordering::Relaxed);
    if let Some(input) = input
        && input.join().is_err()
    {
        warn!("Input thread panicked");
    }

    let stats = renderer.pipeline().stats();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        swaps = stats.succeeded,
        failed = stats.failed,
        "Run finished"
    );
    if let Some(active) = renderer.pipeline().active() {
        info!(
            grid_factor = %active.grid_factor(),
            storage = ?active.storage(),
            layout = ?active.layout(),
            "Final cube set"
        );
    }

    if let Some(path) = &config.debug.screenshot {
        match &mut gpu {
            DemoGpu::Wgpu(device) => match write_screenshot(device, path) {
                Ok(()) => info!("Wrote screenshot to {}", path.display()),
                Err(e) => error!("{e}"),
            },
            DemoGpu::Headless(_) => warn!("Screenshots need the wgpu backend"),
        }
    }

    renderer.release(gpu.api());
    renderer.shutdown();
}
