//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Drawing surface settings.
    pub surface: SurfaceConfig,
    /// Cube grid generation settings.
    pub generation: GenerationConfig,
    /// Rendering settings.
    pub render: RenderConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Drawing surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Surface width in pixels.
    pub width: u32,
    /// Surface height in pixels.
    pub height: u32,
}

/// Cube grid generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Grid factor requested when the surface is created.
    pub initial_grid_factor: u32,
    /// Smallest grid factor the request surface will ask for.
    pub min_grid_factor: u32,
    /// Largest grid factor the request surface will ask for.
    pub max_grid_factor: u32,
    /// Start with GPU-resident buffers instead of client-side arrays.
    pub use_vbos: bool,
    /// Start with the interleaved layout instead of separate buffers.
    pub use_stride: bool,
    /// Fold all results that arrive in one frame into a single swap.
    pub coalesce_requests: bool,
}

/// Which GPU backend draws the frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Backend {
    /// In-memory emulation; always available.
    #[default]
    Headless,
    /// Real GPU through wgpu, rendering offscreen.
    Wgpu,
}

/// Which lesson scene to draw.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Scene {
    /// The regenerating cube grid.
    #[default]
    Cubes,
    /// The procedural heightmap.
    HeightMap,
}

/// Rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Backend selection.
    pub backend: Backend,
    /// Scene selection.
    pub scene: Scene,
    /// RGBA clear colour.
    pub clear_color: [f32; 4],
    /// Vertices per side of the heightmap.
    pub height_map_size: u32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Number of frames the demo driver renders before exiting.
    pub frames: u32,
    /// Optional PNG path for the last frame (wgpu backend only).
    pub screenshot: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            initial_grid_factor: 3,
            min_grid_factor: 1,
            max_grid_factor: 16,
            use_vbos: true,
            use_stride: true,
            coalesce_requests: false,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Headless,
            scene: Scene::Cubes,
            clear_color: [0.0, 0.0, 0.0, 0.0],
            height_map_size: 32,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            frames: 240,
            screenshot: None,
        }
    }
}

impl GenerationConfig {
    /// Check that the grid factor bounds describe a usable range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_grid_factor == 0 || self.min_grid_factor > self.max_grid_factor {
            return Err(ConfigError::InvalidGridBounds {
                min: self.min_grid_factor,
                max: self.max_grid_factor,
            });
        }
        Ok(())
    }

    /// The initial grid factor clamped into the configured bounds.
    pub fn clamped_initial_grid_factor(&self) -> u32 {
        self.initial_grid_factor
            .clamp(self.min_grid_factor, self.max_grid_factor.max(self.min_grid_factor))
    }
}

/// Platform config directory for Cubefield, if the platform has one.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cubefield"))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.generation.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    ///
    /// A file with unusable grid bounds is an error, same as at load.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.generation.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("initial_grid_factor: 3"));
        assert!(ron_str.contains("max_grid_factor: 16"));
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(surface: (), render: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.generation, GenerationConfig::default());
        assert_eq!(config.debug.frames, 240);
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_enum_fields_parse() {
        let ron_str = "(render: (backend: Wgpu, scene: HeightMap))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.render.backend, Backend::Wgpu);
        assert_eq!(config.render.scene, Scene::HeightMap);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.generation.initial_grid_factor = 5;
        config.generation.coalesce_requests = true;
        config.debug.screenshot = Some(PathBuf::from("frame.png"));

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_load_rejects_inverted_bounds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.ron"),
            "(generation: (min_grid_factor: 8, max_grid_factor: 2))",
        )
        .unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(
            result,
            Err(ConfigError::InvalidGridBounds { min: 8, max: 2 })
        ));
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.generation.use_vbos = false;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(!result.unwrap().generation.use_vbos);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_reload_rejects_inverted_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        std::fs::write(
            dir.path().join("config.ron"),
            "(generation: (min_grid_factor: 9, max_grid_factor: 3))",
        )
        .unwrap();
        assert!(matches!(
            config.reload(dir.path()),
            Err(ConfigError::InvalidGridBounds { min: 9, max: 3 })
        ));
    }

    #[test]
    fn test_initial_factor_is_clamped() {
        let generation = GenerationConfig {
            initial_grid_factor: 40,
            ..GenerationConfig::default()
        };
        assert_eq!(generation.clamped_initial_grid_factor(), 16);

        let generation = GenerationConfig {
            initial_grid_factor: 0,
            ..GenerationConfig::default()
        };
        assert_eq!(generation.clamped_initial_grid_factor(), 1);
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }
}
