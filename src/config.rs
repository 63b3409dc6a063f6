use crate::allocator::error::AllocatorError;
use crate::grid::spawn::SpawnExclusion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.yml";

/// Widest spawn exclusion, in lattice rings, that still lets the allocator
/// reach its first usable ring in reasonable time.
pub const MAX_EXCLUSION_RINGS: u32 = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Grid step between plot centers, in blocks.
    pub island_spacing: i32,
    /// Chebyshev radius in blocks around the origin that never gets a plot.
    pub spawn_exclusion_radius: i32,
    /// Relative paths resolve against the asset root.
    pub storage_dir: PathBuf,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        AllocatorConfig {
            island_spacing: 128,
            spawn_exclusion_radius: 0,
            storage_dir: PathBuf::from("data"),
        }
    }
}

/// Validated allocator parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorSettings {
    pub spacing: i32,
    pub exclusion: SpawnExclusion,
    pub storage_dir: PathBuf,
}

impl AllocatorConfig {
    /// Reads `<root>/config.yml` (defaults when missing), then applies
    /// `SKYPLOT_*` environment overrides.
    pub fn load(root: &Path) -> Result<Self, AllocatorError> {
        let path = root.join(CONFIG_FILE_NAME);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(data) => Self::parse(&data)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                return Err(AllocatorError::Config(format!(
                    "read failed for {}: {}",
                    path.display(),
                    err
                )))
            }
        };
        config.apply_env_overrides()?;
        if config.storage_dir.is_relative() {
            config.storage_dir = root.join(&config.storage_dir);
        }
        Ok(config)
    }

    pub fn parse(data: &str) -> Result<Self, AllocatorError> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(data)
            .map_err(|err| AllocatorError::Config(format!("{} is invalid: {}", CONFIG_FILE_NAME, err)))
    }

    fn apply_env_overrides(&mut self) -> Result<(), AllocatorError> {
        if let Some(value) = env_value("SKYPLOT_ISLAND_SPACING") {
            self.island_spacing = value.parse::<i32>().map_err(|_| {
                AllocatorError::Config(format!("SKYPLOT_ISLAND_SPACING '{}' is not an integer", value))
            })?;
        }
        if let Some(value) = env_value("SKYPLOT_SPAWN_RADIUS") {
            self.spawn_exclusion_radius = value.parse::<i32>().map_err(|_| {
                AllocatorError::Config(format!("SKYPLOT_SPAWN_RADIUS '{}' is not an integer", value))
            })?;
        }
        if let Some(value) = env_value("SKYPLOT_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<AllocatorSettings, AllocatorError> {
        if self.island_spacing <= 0 {
            return Err(AllocatorError::ExhaustedConfiguration(format!(
                "island spacing must be positive, got {}",
                self.island_spacing
            )));
        }
        if self.spawn_exclusion_radius < 0 {
            return Err(AllocatorError::ExhaustedConfiguration(format!(
                "spawn exclusion radius must not be negative, got {}",
                self.spawn_exclusion_radius
            )));
        }
        let exclusion = SpawnExclusion::new(self.spawn_exclusion_radius as u32);
        let rings = exclusion.rings(self.island_spacing);
        if rings > MAX_EXCLUSION_RINGS {
            return Err(AllocatorError::ExhaustedConfiguration(format!(
                "spawn exclusion radius {} covers {} rings at spacing {} (max {})",
                self.spawn_exclusion_radius, rings, self.island_spacing, MAX_EXCLUSION_RINGS
            )));
        }
        Ok(AllocatorSettings {
            spacing: self.island_spacing,
            exclusion,
            storage_dir: self.storage_dir.clone(),
        })
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Status,
    Allocate { owner: String },
    Release { x: i32, z: i32 },
    Compact,
}

#[derive(Debug)]
pub struct AppConfig {
    pub root: PathBuf,
    pub command: CliCommand,
}

impl AppConfig {
    pub fn from_args(args: &[String]) -> Result<Self, String> {
        if args.len() < 2 {
            return Err(
                "usage: skyplot <root> [status | allocate <owner> | release <x> <z> | compact]"
                    .to_string(),
            );
        }
        let root = Path::new(&args[1]).to_path_buf();
        let command = match args.get(2).map(|value| value.to_ascii_lowercase()) {
            None => CliCommand::Status,
            Some(name) => match name.as_str() {
                "status" => CliCommand::Status,
                "allocate" => CliCommand::Allocate {
                    owner: args
                        .get(3)
                        .cloned()
                        .ok_or_else(|| "allocate needs an owner".to_string())?,
                },
                "release" => CliCommand::Release {
                    x: parse_i32(args.get(3), "x")?,
                    z: parse_i32(args.get(4), "z")?,
                },
                "compact" => CliCommand::Compact,
                other => return Err(format!("unknown command '{}'", other)),
            },
        };
        Ok(Self { root, command })
    }
}

fn parse_i32(value: Option<&String>, label: &str) -> Result<i32, String> {
    let value = value.ok_or_else(|| format!("release needs a {} coordinate", label))?;
    value
        .trim()
        .parse::<i32>()
        .map_err(|_| format!("release expected integer {}, got '{}'", label, value))
}
