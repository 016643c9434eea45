//! Command-line argument parsing for Cubefield.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;
use crate::config::{Backend, Scene};

/// Cubefield command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "cubefield", about = "Cube grid vertex-buffer strategy demo")]
pub struct CliArgs {
    /// Surface width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Surface height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Grid factor requested at startup.
    #[arg(long)]
    pub grid_factor: Option<u32>,

    /// Backend: headless or wgpu.
    #[arg(long, value_parser = parse_backend)]
    pub backend: Option<Backend>,

    /// Scene: cubes or heightmap.
    #[arg(long, value_parser = parse_scene)]
    pub scene: Option<Scene>,

    /// Fold requests that complete in the same frame into one swap.
    #[arg(long)]
    pub coalesce: Option<bool>,

    /// Number of frames to render.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Comma-separated request script, e.g. `up,up,vbo,stride,down`.
    #[arg(long)]
    pub script: Option<String>,

    /// Write the last frame to this PNG file (wgpu backend).
    #[arg(long)]
    pub screenshot: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn parse_backend(value: &str) -> Result<Backend, String> {
    match value.to_ascii_lowercase().as_str() {
        "headless" => Ok(Backend::Headless),
        "wgpu" => Ok(Backend::Wgpu),
        other => Err(format!("unknown backend `{other}`")),
    }
}

fn parse_scene(value: &str) -> Result<Scene, String> {
    match value.to_ascii_lowercase().as_str() {
        "cubes" => Ok(Scene::Cubes),
        "heightmap" | "height-map" => Ok(Scene::HeightMap),
        other => Err(format!("unknown scene `{other}`")),
    }
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.surface.width = w;
        }
        if let Some(h) = args.height {
            self.surface.height = h;
        }
        if let Some(n) = args.grid_factor {
            self.generation.initial_grid_factor = n;
        }
        if let Some(backend) = args.backend {
            self.render.backend = backend;
        }
        if let Some(scene) = args.scene {
            self.render.scene = scene;
        }
        if let Some(coalesce) = args.coalesce {
            self.generation.coalesce_requests = coalesce;
        }
        if let Some(frames) = args.frames {
            self.debug.frames = frames;
        }
        if let Some(ref path) = args.screenshot {
            self.debug.screenshot = Some(path.clone());
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_args() -> CliArgs {
        CliArgs {
            width: None,
            height: None,
            grid_factor: None,
            backend: None,
            scene: None,
            coalesce: None,
            frames: None,
            script: None,
            screenshot: None,
            log_level: None,
            config: None,
        }
    }

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            width: Some(1920),
            grid_factor: Some(7),
            backend: Some(Backend::Wgpu),
            ..empty_args()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.surface.width, 1920);
        assert_eq!(config.generation.initial_grid_factor, 7);
        assert_eq!(config.render.backend, Backend::Wgpu);
        // Non-overridden fields retain defaults
        assert_eq!(config.surface.height, 480);
        assert_eq!(config.render.scene, Scene::Cubes);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&empty_args());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_enums() {
        let args = CliArgs::try_parse_from([
            "cubefield",
            "--backend",
            "WGPU",
            "--scene",
            "heightmap",
            "--script",
            "up,vbo",
        ])
        .unwrap();
        assert_eq!(args.backend, Some(Backend::Wgpu));
        assert_eq!(args.scene, Some(Scene::HeightMap));
        assert_eq!(args.script.as_deref(), Some("up,vbo"));
    }

    #[test]
    fn test_cli_rejects_unknown_backend() {
        assert!(CliArgs::try_parse_from(["cubefield", "--backend", "vulkan"]).is_err());
    }
}
