use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::PathBuf;

/// Tolerance for surface and boundary comparisons, in geometry units.
pub const GEOMETRY_EPSILON: f64 = 1e-9;
/// Default recursion guard. A fill chain deeper than this is treated as a cycle.
pub const MAX_GEOMETRY_LEVELS: usize = 64;
/// Target number of bodies per search grid cell.
pub const SEARCH_GRID_OCCUPANCY: f64 = 2.0;
/// Upper bound on search grid cells along one axis.
pub const SEARCH_GRID_MAX_DIVISIONS: usize = 64;
/// Number of tolerant-mode substitutions that are logged individually.
pub const UNDEFINED_WARN_LIMIT: u64 = 10;

/// Runtime configuration for the resolver and the survey driver.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    /// Path to the JSON geometry catalog.
    pub geometry: String,
    /// Substitute the undefined material for unresolved points instead of failing.
    pub tolerant: bool,
    /// Number of substitutions allowed before tolerant mode gives up.
    pub undefined_cap: u64,
    /// Level depth from which pebble beds are enumerated per pebble type.
    pub pebble_coarsening_depth: usize,
    /// Recursion guard for the fill graph.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Number of random points located by the survey.
    pub samples: usize,
    pub seed: Option<u64>,
    /// Run the survey in plot mode.
    #[serde(default)]
    pub plot: bool,
    /// Where to write the JSON run report, if anywhere.
    #[serde(default)]
    pub report: Option<String>,
}

fn default_max_depth() -> usize {
    MAX_GEOMETRY_LEVELS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            geometry: "config/pin_cell.json".to_string(),
            tolerant: false,
            undefined_cap: 1000,
            pebble_coarsening_depth: 3,
            max_depth: MAX_GEOMETRY_LEVELS,
            samples: 100_000,
            seed: None,
            plot: false,
            report: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_depth > 0, "max_depth must be greater than 0");
        anyhow::ensure!(
            self.max_depth <= 4 * MAX_GEOMETRY_LEVELS,
            "max_depth of {} is unreasonably deep",
            self.max_depth
        );
        Ok(())
    }
}

pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let settings = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .context("Error loading configuration")?;

    let config: Settings = settings
        .try_deserialize()
        .context("Error deserializing configuration")?;

    config.validate()?;

    Ok(config)
}

pub fn load_config() -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    // Check if local config exists, if not use default
    let config_file = if local_config.exists() {
        log::info!("using local configuration: {:?}", local_config);
        local_config
    } else {
        log::info!("using default configuration: {:?}", default_config_file);
        default_config_file
    };

    let settings = Config::builder()
        .add_source(File::from(config_file).required(true))
        .add_source(Environment::with_prefix("zonetrack"))
        .build()
        .context("Error loading configuration")?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("Error deserializing configuration")?;

    // Parse command-line arguments and override values
    let args = CliArgs::parse();

    if let Some(geometry) = args.geo {
        config.geometry = geometry;
    }
    if args.tolerant {
        config.tolerant = true;
    }
    if let Some(cap) = args.cap {
        config.undefined_cap = cap;
    }
    if let Some(depth) = args.coarsen {
        config.pebble_coarsening_depth = depth;
    }
    if let Some(depth) = args.depth {
        config.max_depth = depth;
    }
    if let Some(samples) = args.samples {
        config.samples = samples;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if args.plot {
        config.plot = true;
    }
    if let Some(report) = args.report {
        config.report = Some(report);
    }

    config.validate()?;

    log::debug!("{:#?}", config);

    Ok(config)
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the ZONETRACK_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("ZONETRACK_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    let exe_path = env::current_exe().context("Failed to get current executable path")?;
    let mut current_dir = exe_path
        .parent()
        .context("Failed to get executable directory")?
        .to_path_buf();

    loop {
        if current_dir.join("config").is_dir() {
            return Ok(current_dir);
        }
        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => anyhow::bail!("Could not find project root directory"),
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "zonetrack - point location and depletion zone enumeration")]
pub struct CliArgs {
    /// File path to the JSON geometry catalog.
    #[arg(short, long)]
    geo: Option<String>,

    /// Substitute the undefined material for points outside every region.
    #[arg(long)]
    tolerant: bool,

    /// Maximum number of undefined-material substitutions in tolerant mode.
    #[arg(long)]
    cap: Option<u64>,

    /// Level depth at which pebble beds switch to per-type zones.
    #[arg(long)]
    coarsen: Option<usize>,

    /// Recursion guard for the fill graph.
    #[arg(long)]
    depth: Option<usize>,

    /// Number of random points to locate in the survey.
    #[arg(short = 'n', long)]
    samples: Option<usize>,

    /// Random seed for the survey.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Locate in plot mode: geometry errors become the undefined sentinel.
    #[arg(long)]
    plot: bool,

    /// Write a JSON run report to this path.
    #[arg(short, long)]
    report: Option<String>,
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings:
  - Geometry: {}
  - Tolerant: {} (cap {})
  - Pebble Coarsening Depth: {}
  - Max Depth: {}
  - Samples: {}
  - Seed: {:?}
  - Plot: {}
  ",
            self.geometry,
            self.tolerant,
            self.undefined_cap,
            self.pebble_coarsening_depth,
            self.max_depth,
            self.samples,
            self.seed,
            self.plot,
        )
    }
}
