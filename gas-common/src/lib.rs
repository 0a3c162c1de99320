pub mod config;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    default_species, EmissionConfig, EnclosureConfig, InitialConditions, OutputConfig, OutputFormat,
    PhysicsConfig, SimulationConfig, SpeciesConfig, TimingConfig,
};
pub use sim_params::SimParams;
pub use snapshot::{MoleculeRecord, Snapshot};
pub use vecmath::{angle_to_vec, vec_to_angle, wrap_angle, Vec2};
