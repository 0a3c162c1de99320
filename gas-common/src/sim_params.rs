use serde::{Deserialize, Serialize};

/// Simulation parameters derived from the configuration, used frequently during simulation steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Enclosure
    pub width: f64,
    pub height: f64,

    // Grid (effective divisions, after fitting cells to the largest molecule)
    pub width_divisions: u32,
    pub height_divisions: u32,
    pub cell_width: f64,
    pub cell_height: f64,
    pub inv_cell_width: f64,
    pub inv_cell_height: f64,
    pub grid_dim_x: u32, // width_divisions + 2 margin cells
    pub grid_dim_y: u32,
    pub num_grid_cells: u32,

    // Molecules
    pub max_radius: f64,

    // Time
    pub keyframe_interval: u64,

    pub particle_collisions: bool,
}

impl SimParams {
    /// Distance beyond the enclosure at which a molecule is considered lost.
    pub fn corrupt_margin(&self) -> f64 {
        self.cell_width.max(self.cell_height)
    }

    pub fn is_keyframe(&self, frame: u64) -> bool {
        frame % self.keyframe_interval == 0
    }
}
