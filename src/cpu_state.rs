use gas_common::{SimParams, Vec2};

use crate::molecule::Molecule;

/// Holds the molecule sets and per-frame scratch buffers on the CPU.
#[derive(Debug)]
pub struct CpuState {
    pub params: SimParams,

    // --- Ping-Pong Buffers ---
    // Current frame's molecules, read-only while a frame is computed
    pub molecules_in: Vec<Molecule>,
    // Next frame's molecules, each slot written exactly once
    pub molecules_out: Vec<Molecule>,

    // --- Per-frame collision scratch (indexed by slot) ---
    // Velocity after collision resolution
    pub velocities: Vec<Vec2>,
    // Set when a wall reflection was applied this frame
    pub wall_hit: Vec<bool>,
    // Set when the molecule took part in a pair collision this frame
    pub paired: Vec<bool>,
}

impl CpuState {
    pub fn new(initial: Vec<Molecule>, params: SimParams) -> Self {
        let n = initial.len();
        Self {
            params,
            molecules_in: initial,
            molecules_out: Vec::with_capacity(n),
            velocities: Vec::with_capacity(n),
            wall_hit: Vec::with_capacity(n),
            paired: Vec::with_capacity(n),
        }
    }

    pub fn num_molecules(&self) -> usize {
        self.molecules_in.len()
    }

    /// Resets the scratch buffers for a new frame, seeding velocities from the current set.
    pub fn reset_scratch(&mut self) {
        let n = self.molecules_in.len();
        self.velocities.clear();
        self.velocities.extend(self.molecules_in.iter().map(|m| m.velocity));
        self.wall_hit.clear();
        self.wall_hit.resize(n, false);
        self.paired.clear();
        self.paired.resize(n, false);
    }

    /// Output becomes input for the next frame. The old set is dropped at the next write.
    pub fn swap_buffers(&mut self) {
        std::mem::swap(&mut self.molecules_in, &mut self.molecules_out);
        self.molecules_out.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::species::SpeciesId;
    use gas_common::SimulationConfig;

    #[test]
    fn swap_promotes_next_frame() {
        let params = SimulationConfig::default().get_sim_params();
        let first = Molecule::new(0, SpeciesId(0), Vec2::new(1.0, 1.0), Vec2::new(1.0, 0.0));
        let mut state = CpuState::new(vec![first], params);

        state.reset_scratch();
        assert_eq!(state.velocities, vec![Vec2::new(1.0, 0.0)]);
        assert_eq!(state.wall_hit, vec![false]);

        state.molecules_out.push(first.advanced(state.velocities[0]));
        state.swap_buffers();

        assert_eq!(state.molecules_in[0].position, Vec2::new(2.0, 1.0));
        assert!(state.molecules_out.is_empty());
        assert_eq!(state.num_molecules(), 1);
    }
}
