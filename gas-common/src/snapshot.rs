use serde::{Serialize, Deserialize};

/// State of one molecule as handed to snapshot consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoleculeRecord {
    pub id: u64,
    /// Index into the species table.
    pub species: u16,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
}

/// Full state of the enclosure at a keyframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Index of the frame this snapshot was taken at.
    pub frame: u64,
    /// Every live molecule, ordered by id.
    pub molecules: Vec<MoleculeRecord>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.molecules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.molecules.is_empty()
    }
}
