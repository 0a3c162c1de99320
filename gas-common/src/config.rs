use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::SimParams;
use std::f64::consts::{PI, TAU};
use std::path::Path;

// Enclosure geometry and spatial index resolution
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EnclosureConfig {
    pub width: f64,
    pub height: f64,
    // Signed so that bad values reach validation instead of failing the parse
    pub width_divisions: i64,
    pub height_divisions: i64,
}

// Configuration for timing
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    /// Number of frames to run.
    pub frames: u64,
    /// A snapshot is emitted for every frame index that is a multiple of this value.
    pub keyframe_interval: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PhysicsConfig {
    /// Resolve molecule-molecule collisions. When false only walls reflect molecules.
    #[serde(default = "default_particle_collisions")]
    pub particle_collisions: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig { particle_collisions: default_particle_collisions() }
    }
}

fn default_particle_collisions() -> bool {
    true
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct InitialConditions {
    /// Seed for the emission RNG (speed jitter).
    #[serde(default)]
    pub seed: u64,
    /// Nozzle position. Defaults to the center of the top edge.
    #[serde(default)]
    pub launch_x: Option<f64>,
    #[serde(default)]
    pub launch_y: Option<f64>,
}

/// Physical constants of one species.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SpeciesConfig {
    pub name: String,
    pub mass: f64,
    pub radius: f64,
}

/// One nozzle burst: `count` molecules of `species` fanned over `angle_spread`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EmissionConfig {
    pub species: String,
    pub count: i64,
    pub speed: f64,
    #[serde(default = "default_start_angle")]
    pub start_angle: f64,
    #[serde(default = "default_angle_spread")]
    pub angle_spread: f64,
    #[serde(default)]
    pub speed_jitter: f64,
}

fn default_start_angle() -> f64 {
    7.0 / 6.0 * PI
}

fn default_angle_spread() -> f64 {
    TAU
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
    Bincode,
    #[serde(alias = "msgpack")]
    MessagePack,
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_base_filename")]
    pub base_filename: String,
    #[serde(default)]
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig { base_filename: default_base_filename(), format: OutputFormat::default() }
    }
}

fn default_base_filename() -> String {
    "frames".to_string()
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub enclosure: EnclosureConfig,
    pub timing: TimingConfig,
    #[serde(default)]
    pub physics: PhysicsConfig,
    #[serde(default)]
    pub initial_conditions: InitialConditions,
    #[serde(default = "default_species")]
    pub species: Vec<SpeciesConfig>,
    #[serde(default)]
    pub emission: Vec<EmissionConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// The three gases known out of the box.
pub fn default_species() -> Vec<SpeciesConfig> {
    vec![
        SpeciesConfig { name: "oxygen".to_string(), mass: 32.0, radius: 4.0 },
        SpeciesConfig { name: "fuel".to_string(), mass: 100.0, radius: 4.0 },
        SpeciesConfig { name: "carbon_dioxide".to_string(), mass: 44.0, radius: 4.0 },
    ]
}

impl Default for SimulationConfig {
    /// A slow oxygen cloud and a fast fuel jet leaving a nozzle at the top of a 600x600 box.
    fn default() -> Self {
        let emission = |species: &str, count: i64, speed: f64| EmissionConfig {
            species: species.to_string(),
            count,
            speed,
            start_angle: default_start_angle(),
            angle_spread: default_angle_spread(),
            speed_jitter: 0.0,
        };

        SimulationConfig {
            enclosure: EnclosureConfig {
                width: 600.0,
                height: 600.0,
                width_divisions: 10,
                height_divisions: 10,
            },
            timing: TimingConfig { frames: 300, keyframe_interval: 5 },
            physics: PhysicsConfig::default(),
            initial_conditions: InitialConditions::default(),
            species: default_species(),
            emission: vec![
                emission("oxygen", 200, 0.5),
                emission("fuel", 100, 5.0),
                emission("carbon_dioxide", 0, 0.5),
            ],
            output: OutputConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML from '{}': {}", path_ref.display(), e))
    }

    /// Parses a configuration from TOML text. Range checks are left to the engine.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(text)?;
        Ok(config)
    }

    /// Largest collision radius among the configured species.
    pub fn max_radius(&self) -> f64 {
        self.species.iter().map(|s| s.radius).fold(0.0, f64::max)
    }

    /// Converts the configuration into simulation parameters used at runtime.
    /// Expects a configuration that passed validation.
    pub fn get_sim_params(&self) -> SimParams {
        let width = self.enclosure.width;
        let height = self.enclosure.height;
        let max_radius = self.max_radius();

        // Cells must be at least one molecule diameter wide so that a 3x3 neighborhood
        // covers every possible contact.
        let width_divisions = effective_divisions(width, self.enclosure.width_divisions, max_radius);
        let height_divisions = effective_divisions(height, self.enclosure.height_divisions, max_radius);

        let cell_width = width / width_divisions as f64;
        let cell_height = height / height_divisions as f64;

        // One margin cell on each side.
        let grid_dim_x = width_divisions + 2;
        let grid_dim_y = height_divisions + 2;

        SimParams {
            width,
            height,
            width_divisions,
            height_divisions,
            cell_width,
            cell_height,
            inv_cell_width: 1.0 / cell_width,
            inv_cell_height: 1.0 / cell_height,
            grid_dim_x,
            grid_dim_y,
            num_grid_cells: grid_dim_x * grid_dim_y,
            max_radius,
            keyframe_interval: self.timing.keyframe_interval.max(1),
            particle_collisions: self.physics.particle_collisions,
        }
    }
}

fn effective_divisions(extent: f64, requested: i64, max_radius: f64) -> u32 {
    let requested = requested.clamp(1, u32::MAX as i64) as u32;
    let min_cell = 2.0 * max_radius;
    if min_cell <= 0.0 {
        return requested;
    }
    let fitting = (extent / min_cell).floor();
    if fitting < 1.0 {
        1
    } else {
        requested.min(fitting.min(u32::MAX as f64) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [enclosure]
        width = 600.0
        height = 400.0
        width_divisions = 10
        height_divisions = 8

        [timing]
        frames = 50
        keyframe_interval = 5

        [[emission]]
        species = "fuel"
        count = 12
        speed = 5.0
    "#;

    #[test]
    fn minimal_config_fills_defaults() -> Result<()> {
        let config = SimulationConfig::from_toml_str(MINIMAL)?;
        assert_eq!(config.species, default_species());
        assert!(config.physics.particle_collisions);
        assert_eq!(config.output.format, OutputFormat::Csv);
        assert_eq!(config.output.base_filename, "frames");
        assert_eq!(config.emission.len(), 1);
        assert!((config.emission[0].start_angle - 7.0 / 6.0 * PI).abs() < 1e-12);
        assert!((config.emission[0].angle_spread - TAU).abs() < 1e-12);
        assert_eq!(config.emission[0].speed_jitter, 0.0);
        Ok(())
    }

    #[test]
    fn negative_count_parses_for_later_validation() -> Result<()> {
        let text = MINIMAL.replace("count = 12", "count = -3");
        let config = SimulationConfig::from_toml_str(&text)?;
        assert_eq!(config.emission[0].count, -3);
        Ok(())
    }

    #[test]
    fn sim_params_add_margin_ring() -> Result<()> {
        let params = SimulationConfig::from_toml_str(MINIMAL)?.get_sim_params();
        assert_eq!(params.grid_dim_x, 12);
        assert_eq!(params.grid_dim_y, 10);
        assert_eq!(params.num_grid_cells, 120);
        assert!((params.cell_width - 60.0).abs() < 1e-12);
        assert!((params.cell_height - 50.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn divisions_shrink_to_fit_largest_molecule() {
        let mut config = SimulationConfig::default();
        config.enclosure.width_divisions = 200;
        let params = config.get_sim_params();
        // 600 / (2 * 4) = 75 cells at most
        assert_eq!(params.width_divisions, 75);
        assert!(params.cell_width >= 2.0 * params.max_radius);
        assert_eq!(params.height_divisions, 10);
    }

    #[test]
    fn output_format_reads_names_and_alias() -> Result<()> {
        let with_format = |name: &str| format!("{MINIMAL}\n[output]\nformat = \"{name}\"\n");
        let config = SimulationConfig::from_toml_str(&with_format("msgpack"))?;
        assert_eq!(config.output.format, OutputFormat::MessagePack);
        let config = SimulationConfig::from_toml_str(&with_format("messagepack"))?;
        assert_eq!(config.output.format, OutputFormat::MessagePack);
        let config = SimulationConfig::from_toml_str(&with_format("json"))?;
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(SimulationConfig::from_toml_str(&with_format("yaml")).is_err());
        Ok(())
    }

    #[test]
    fn shipped_config_parses() -> Result<()> {
        let config = SimulationConfig::from_toml_str(include_str!("../../config.toml"))?;
        assert_eq!(config.species, default_species());
        assert_eq!(config.emission.len(), 3);
        assert_eq!(config.emission[1].speed_jitter, 0.25);
        assert_eq!(config.timing.frames, 300);
        Ok(())
    }

    #[test]
    fn default_config_matches_nozzle_setup() {
        let config = SimulationConfig::default();
        let counts: Vec<i64> = config.emission.iter().map(|e| e.count).collect();
        assert_eq!(counts, vec![200, 100, 0]);
        assert_eq!(config.timing.keyframe_interval, 5);
        assert_eq!(config.max_radius(), 4.0);
    }
}
