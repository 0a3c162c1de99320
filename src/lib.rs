//! 2-D gas of disc molecules in a rectangular box: wall reflection, elastic
//! pair collisions found through a uniform grid, and keyframe snapshots.

pub mod collision;
pub mod cpu_state;
pub mod error;
pub mod grid;
pub mod molecule;
pub mod output;
pub mod simulation;
pub mod species;

pub use error::{GasError, Result};
pub use grid::SpatialIndex;
pub use molecule::{Molecule, MoleculeId};
pub use output::{MemorySink, SnapshotSink};
pub use simulation::{GasSimulation, Placement, StepReport};
pub use species::{Species, SpeciesId, SpeciesTable};
