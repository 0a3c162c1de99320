use gas_common::{SimParams, Vec2};
use rayon::prelude::*;

use crate::molecule::{Molecule, MoleculeId};

/// Uniform grid over the enclosure with a one-cell margin ring on every side.
///
/// Buckets are stored as a counting sort: `cell_counts` and `cell_starts`
/// (prefix sum) index into `cell_molecule_slots`, which lists molecule slots
/// grouped by cell. Slots inside a cell stay in ascending order, so queries are
/// deterministic.
#[derive(Debug)]
pub struct SpatialIndex {
    inv_cell_width: f64,
    inv_cell_height: f64,
    grid_dim_x: u32,
    grid_dim_y: u32,

    // Grid cell index for each molecule slot
    molecule_cells: Vec<u32>,
    // Number of molecules in each grid cell
    cell_counts: Vec<u32>,
    // Start index in cell_molecule_slots for each grid cell (prefix sum)
    cell_starts: Vec<u32>,
    // Molecule slots sorted by grid cell
    cell_molecule_slots: Vec<u32>,
    // Per-cell write cursor used while filling cell_molecule_slots
    write_offsets: Vec<u32>,

    // Copies taken at rebuild so queries never see a half-updated frame
    positions: Vec<Vec2>,
    ids: Vec<MoleculeId>,
}

impl SpatialIndex {
    /// Creates an empty index sized from the runtime parameters.
    pub fn new(params: &SimParams) -> Self {
        let num_grid_cells = params.num_grid_cells as usize;
        Self {
            inv_cell_width: params.inv_cell_width,
            inv_cell_height: params.inv_cell_height,
            grid_dim_x: params.grid_dim_x,
            grid_dim_y: params.grid_dim_y,
            molecule_cells: Vec::new(),
            cell_counts: vec![0; num_grid_cells],
            cell_starts: vec![0; num_grid_cells],
            cell_molecule_slots: Vec::new(),
            write_offsets: vec![0; num_grid_cells],
            positions: Vec::new(),
            ids: Vec::new(),
        }
    }

    /// Grid coordinates of `pos`, margin included (0 is the left/top margin column/row).
    /// Positions beyond the margin are clamped into the outermost ring.
    #[inline(always)]
    fn grid_coords(&self, pos: Vec2) -> (i64, i64) {
        // Clamp in f64: a runaway position must not overflow the integer offset.
        let gx = ((pos.x * self.inv_cell_width).floor() + 1.0).clamp(0.0, (self.grid_dim_x - 1) as f64);
        let gy = ((pos.y * self.inv_cell_height).floor() + 1.0).clamp(0.0, (self.grid_dim_y - 1) as f64);
        (gx as i64, gy as i64)
    }

    #[inline(always)]
    fn grid_cell_idx(&self, pos: Vec2) -> u32 {
        let (gx, gy) = self.grid_coords(pos);
        gy as u32 * self.grid_dim_x + gx as u32
    }

    /// Clears all buckets and assigns every molecule to exactly one of them.
    pub fn rebuild(&mut self, molecules: &[Molecule]) {
        let num_molecules = molecules.len();

        self.positions.clear();
        self.positions.extend(molecules.iter().map(|m| m.position));
        self.ids.clear();
        self.ids.extend(molecules.iter().map(|m| m.id));

        // Phase 1: grid cell per molecule (parallel)
        {
            let this = &*self;
            let cells: Vec<u32> = this
                .positions
                .par_iter()
                .map(|&pos| this.grid_cell_idx(pos))
                .collect();
            self.molecule_cells = cells;
        }

        // Phase 2: count molecules per cell
        self.cell_counts.iter_mut().for_each(|c| *c = 0);
        for &cell in &self.molecule_cells {
            self.cell_counts[cell as usize] += 1;
        }

        // Phase 3: prefix sum into cell starts
        let mut total = 0u32;
        for (start, &count) in self.cell_starts.iter_mut().zip(self.cell_counts.iter()) {
            *start = total;
            total += count;
        }
        debug_assert_eq!(total as usize, num_molecules);

        // Phase 4: scatter slots, in slot order within each cell
        self.write_offsets.iter_mut().for_each(|o| *o = 0);
        self.cell_molecule_slots.resize(num_molecules, 0);
        for (slot, &cell) in self.molecule_cells.iter().enumerate() {
            let cell = cell as usize;
            let write_idx = (self.cell_starts[cell] + self.write_offsets[cell]) as usize;
            self.cell_molecule_slots[write_idx] = slot as u32;
            self.write_offsets[cell] += 1;
        }
    }

    /// Number of molecules indexed by the last rebuild.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Bucket of the molecule in `slot`, in enclosure cell coordinates
    /// (`-1` and `divisions` are the margin).
    pub fn cell_of(&self, slot: usize) -> Option<(i64, i64)> {
        let cell = *self.molecule_cells.get(slot)?;
        let gx = (cell % self.grid_dim_x) as i64 - 1;
        let gy = (cell / self.grid_dim_x) as i64 - 1;
        Some((gx, gy))
    }

    /// Number of molecules in the bucket at enclosure cell coordinates `(cx, cy)`.
    pub fn bucket_len(&self, cx: i64, cy: i64) -> usize {
        let (gx, gy) = (cx + 1, cy + 1);
        if gx < 0 || gy < 0 || gx >= self.grid_dim_x as i64 || gy >= self.grid_dim_y as i64 {
            return 0;
        }
        self.cell_counts[(gy as u32 * self.grid_dim_x + gx as u32) as usize] as usize
    }

    /// Calls `f(neighbor_slot, distance_squared)` for every molecule in the 3x3 cell
    /// block around `slot` that lies within `search_radius`, skipping `slot` itself.
    /// Stops early when `f` returns `false`.
    ///
    /// `search_radius` must not exceed one cell's width or height.
    pub fn for_each_neighbor<F>(&self, slot: usize, search_radius: f64, mut f: F)
    where
        F: FnMut(usize, f64) -> bool,
    {
        let Some(&pos) = self.positions.get(slot) else { return };
        let max_dist_sq = search_radius * search_radius;
        let (center_x, center_y) = self.grid_coords(pos);

        for dy in -1..=1 {
            for dx in -1..=1 {
                let check_x = center_x + dx;
                let check_y = center_y + dy;
                if check_x < 0 || check_x >= self.grid_dim_x as i64
                    || check_y < 0 || check_y >= self.grid_dim_y as i64
                {
                    continue;
                }

                let grid_idx = (check_y as u32 * self.grid_dim_x + check_x as u32) as usize;
                let start = self.cell_starts[grid_idx] as usize;
                let end = start + self.cell_counts[grid_idx] as usize;

                for &neighbor in &self.cell_molecule_slots[start..end] {
                    let neighbor = neighbor as usize;
                    if neighbor == slot {
                        continue;
                    }
                    let dist_sq = pos.distance_squared(self.positions[neighbor]);
                    if dist_sq <= max_dist_sq && !f(neighbor, dist_sq) {
                        return;
                    }
                }
            }
        }
    }

    /// Ids of all molecules within `search_radius` of the molecule in `slot`,
    /// excluding itself, in ascending id order.
    pub fn neighbors(&self, slot: usize, search_radius: f64) -> Vec<MoleculeId> {
        let mut found = Vec::new();
        self.for_each_neighbor(slot, search_radius, |neighbor, _| {
            found.push(self.ids[neighbor]);
            true
        });
        found.sort_unstable();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::species::SpeciesId;
    use gas_common::SimulationConfig;

    fn params_600() -> SimParams {
        // 600x600 with 10x10 divisions, 60 unit cells
        SimulationConfig::default().get_sim_params()
    }

    fn molecule(id: MoleculeId, x: f64, y: f64) -> Molecule {
        Molecule::new(id, SpeciesId(0), Vec2::new(x, y), Vec2::zero())
    }

    #[test]
    fn rebuild_places_each_molecule_in_one_bucket() {
        let mut index = SpatialIndex::new(&params_600());
        let molecules = vec![
            molecule(0, 10.0, 10.0),
            molecule(1, 70.0, 10.0),
            molecule(2, 599.0, 599.0),
            molecule(3, 65.0, 15.0),
        ];
        index.rebuild(&molecules);

        assert_eq!(index.len(), 4);
        assert_eq!(index.cell_of(0), Some((0, 0)));
        assert_eq!(index.cell_of(1), Some((1, 0)));
        assert_eq!(index.cell_of(2), Some((9, 9)));
        assert_eq!(index.bucket_len(1, 0), 2);
        assert_eq!(index.bucket_len(5, 5), 0);
    }

    #[test]
    fn stray_molecules_land_in_margin_ring() {
        let mut index = SpatialIndex::new(&params_600());
        let molecules = vec![
            molecule(0, -3.0, 300.0),
            molecule(1, 605.0, -1.0),
            molecule(2, -5000.0, 9000.0),
        ];
        index.rebuild(&molecules);

        assert_eq!(index.cell_of(0), Some((-1, 5)));
        assert_eq!(index.cell_of(1), Some((10, -1)));
        // far outside is clamped into the corner of the ring
        assert_eq!(index.cell_of(2), Some((-1, 10)));
    }

    #[test]
    fn runaway_positions_clamp_to_the_matching_side() {
        let mut index = SpatialIndex::new(&params_600());
        let molecules = vec![
            molecule(0, 1e300, 300.0),
            molecule(1, -1e300, 1e300),
            molecule(2, f64::MAX, f64::MIN),
            molecule(3, f64::INFINITY, 300.0),
        ];
        index.rebuild(&molecules);

        assert_eq!(index.cell_of(0), Some((10, 5)));
        assert_eq!(index.cell_of(1), Some((-1, 10)));
        assert_eq!(index.cell_of(2), Some((10, -1)));
        assert_eq!(index.cell_of(3), Some((10, 5)));
        assert_eq!(index.neighbors(0, 8.0), Vec::<MoleculeId>::new());
    }

    #[test]
    fn neighbors_respect_radius_and_skip_self() {
        let mut index = SpatialIndex::new(&params_600());
        let molecules = vec![
            molecule(0, 59.0, 59.0),
            molecule(1, 61.0, 61.0),  // adjacent cell, close
            molecule(2, 59.0, 52.0),  // same cell, 7 away
            molecule(3, 119.0, 59.0), // adjacent cell, far
            molecule(4, 300.0, 300.0),
        ];
        index.rebuild(&molecules);

        assert_eq!(index.neighbors(0, 8.0), vec![1, 2]);
        assert_eq!(index.neighbors(0, 5.0), vec![1]);
        assert!(index.neighbors(4, 8.0).is_empty());
    }

    #[test]
    fn rebuild_clears_previous_frame() {
        let mut index = SpatialIndex::new(&params_600());
        index.rebuild(&[molecule(0, 10.0, 10.0), molecule(1, 12.0, 10.0)]);
        assert_eq!(index.neighbors(0, 5.0), vec![1]);

        index.rebuild(&[molecule(0, 10.0, 10.0), molecule(1, 400.0, 10.0)]);
        assert!(index.neighbors(0, 5.0).is_empty());
        assert_eq!(index.bucket_len(0, 0), 1);
    }

    #[test]
    fn early_stop_halts_iteration() {
        let mut index = SpatialIndex::new(&params_600());
        let molecules: Vec<Molecule> = (0..6).map(|i| molecule(i, 30.0 + i as f64, 30.0)).collect();
        index.rebuild(&molecules);

        let mut visited = 0;
        index.for_each_neighbor(0, 10.0, |_, _| {
            visited += 1;
            false
        });
        assert_eq!(visited, 1);
    }

    #[test]
    fn empty_index_yields_nothing() {
        let index = SpatialIndex::new(&params_600());
        assert!(index.is_empty());
        assert!(index.neighbors(0, 10.0).is_empty());
    }
}
