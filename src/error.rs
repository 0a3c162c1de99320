use thiserror::Error;

use crate::molecule::MoleculeId;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, GasError>;

/// Errors raised by the simulation core.
///
/// Configuration and species problems are fatal and surface before the first frame.
/// `CorruptFrameState` is only ever reported through the log and the step report.
#[derive(Debug, Error)]
pub enum GasError {
    /// Bad enclosure dimensions, division counts, populations or emission values.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A species id or name that is not registered in the species table.
    #[error("unknown species: {0}")]
    UnknownSpecies(String),

    /// A molecule ended a frame far outside the enclosure (tunneling).
    #[error("corrupt frame state: molecule {id} at ({x:.3}, {y:.3}) is outside the enclosure margin")]
    CorruptFrameState { id: MoleculeId, x: f64, y: f64 },
}

impl GasError {
    pub fn invalid(message: impl Into<String>) -> Self {
        GasError::InvalidConfiguration(message.into())
    }
}
