use gas_common::{MoleculeRecord, Vec2};

use crate::species::SpeciesId;

pub type MoleculeId = u64;

/// State of one molecule at one frame.
///
/// Molecules are plain values: a frame's set is never edited in place, the
/// driver writes successors into a fresh buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Molecule {
    pub id: MoleculeId,
    pub species: SpeciesId,
    pub position: Vec2,
    pub velocity: Vec2,
}

impl Molecule {
    pub fn new(id: MoleculeId, species: SpeciesId, position: Vec2, velocity: Vec2) -> Self {
        Self { id, species, position, velocity }
    }

    /// Successor after one frame of ballistic motion with `velocity`.
    #[inline(always)]
    pub fn advanced(&self, velocity: Vec2) -> Self {
        Self {
            id: self.id,
            species: self.species,
            position: self.position + velocity,
            velocity,
        }
    }

    pub fn record(&self) -> MoleculeRecord {
        MoleculeRecord {
            id: self.id,
            species: self.species.0,
            x: self.position.x,
            y: self.position.y,
            vx: self.velocity.x,
            vy: self.velocity.y,
        }
    }
}

/// Monotonic id source owned by the driver. Ids are never handed out twice.
#[derive(Debug, Default)]
pub struct IdCounter {
    next: MoleculeId,
}

impl IdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> MoleculeId {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Number of ids allocated so far.
    pub fn allocated(&self) -> u64 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advanced_keeps_identity() {
        let m = Molecule::new(4, SpeciesId(2), Vec2::new(1.0, 1.0), Vec2::new(0.5, -2.0));
        let next = m.advanced(Vec2::new(-0.5, 2.0));
        assert_eq!(next.id, 4);
        assert_eq!(next.species, SpeciesId(2));
        assert_eq!(next.position, Vec2::new(0.5, 3.0));
        assert_eq!(next.velocity, Vec2::new(-0.5, 2.0));
        // the original is untouched
        assert_eq!(m.position, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn id_counter_is_monotonic() {
        let mut ids = IdCounter::new();
        let drawn: Vec<MoleculeId> = (0..5).map(|_| ids.next_id()).collect();
        assert_eq!(drawn, vec![0, 1, 2, 3, 4]);
        assert_eq!(ids.allocated(), 5);
    }
}
