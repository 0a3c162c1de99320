use crate::collision::{resolve_elastic_collision, resolve_wall_collision, Body};
use crate::cpu_state::CpuState;
use crate::error::{GasError, Result};
use crate::grid::SpatialIndex;
use crate::molecule::{IdCounter, Molecule};
use crate::output::SnapshotSink;
use crate::species::{SpeciesId, SpeciesTable};
use gas_common::{SimParams, SimulationConfig, Snapshot, Vec2};
use log::{debug, error, info, trace, warn};
use rand::prelude::*;
use rand_distr::Normal;
use rayon::prelude::*;
use std::time::Instant;

/// A molecule to place explicitly instead of using nozzle emission.
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub species: SpeciesId,
    pub position: Vec2,
    pub velocity: Vec2,
}

/// What happened during one frame.
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    /// Index of the frame that was computed.
    pub frame: u64,
    pub wall_collisions: usize,
    pub particle_collisions: usize,
    /// Molecules found beyond the enclosure margin after integration.
    pub corrupt_molecules: usize,
    /// Present on keyframes only.
    pub snapshot: Option<Snapshot>,
}

/// Owns the molecules and advances the gas one frame at a time.
pub struct GasSimulation {
    /// The simulation configuration, including emission parameters.
    config: SimulationConfig,
    species: SpeciesTable,
    /// The molecule buffers stored in CPU memory.
    state: CpuState,
    index: SpatialIndex,
    ids: IdCounter,
    /// Index of the next frame to compute.
    current_frame: u64,
}

impl GasSimulation {
    /// Validates the configuration and emits the initial molecules from the nozzle.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let species = prepare(&config)?;
        let params = config.get_sim_params();
        let mut rng = StdRng::seed_from_u64(config.initial_conditions.seed);
        let mut ids = IdCounter::new();

        let molecules = emit_nozzle(&config, &species, &params, &mut ids, &mut rng)?;
        info!("Emitted {} molecules across {} species.", molecules.len(), species.len());

        Ok(Self::assemble(config, species, params, ids, molecules))
    }

    /// Builds a simulation from explicit placements; emission entries in `config` are ignored.
    pub fn with_placements(config: SimulationConfig, placements: &[Placement]) -> Result<Self> {
        let species = prepare(&config)?;
        let params = config.get_sim_params();
        let mut ids = IdCounter::new();

        let mut molecules = Vec::with_capacity(placements.len());
        for p in placements {
            species.lookup(p.species)?;
            if !p.position.is_finite() || !p.velocity.is_finite() {
                return Err(GasError::invalid("placement position and velocity must be finite"));
            }
            molecules.push(Molecule::new(ids.next_id(), p.species, p.position, p.velocity));
        }

        Ok(Self::assemble(config, species, params, ids, molecules))
    }

    fn assemble(
        config: SimulationConfig,
        species: SpeciesTable,
        params: SimParams,
        ids: IdCounter,
        molecules: Vec<Molecule>,
    ) -> Self {
        if params.width_divisions as i64 != config.enclosure.width_divisions
            || params.height_divisions as i64 != config.enclosure.height_divisions
        {
            warn!(
                "Grid divisions lowered from {}x{} to {}x{} so cells fit the largest molecule (radius {}).",
                config.enclosure.width_divisions,
                config.enclosure.height_divisions,
                params.width_divisions,
                params.height_divisions,
                params.max_radius
            );
        }
        debug!("Simulation Parameters: {:#?}", params);

        let index = SpatialIndex::new(&params);
        let state = CpuState::new(molecules, params);
        Self { config, species, state, index, ids, current_frame: 0 }
    }

    /// Advances one frame and returns the snapshot if the frame is a keyframe.
    pub fn advance(&mut self) -> Result<Option<Snapshot>> {
        Ok(self.step()?.snapshot)
    }

    /// Advances one frame: rebuild index, resolve collisions, integrate, swap.
    pub fn step(&mut self) -> Result<StepReport> {
        let frame = self.current_frame;

        // --- 1. Rebuild Spatial Index ---
        self.index.rebuild(&self.state.molecules_in);
        self.state.reset_scratch();

        // --- 2. Resolve Collisions ---
        let wall_collisions = self.resolve_walls()?;
        let particle_collisions = if self.state.params.particle_collisions {
            self.resolve_pairs()?
        } else {
            0
        };

        // --- 3. Integrate into the next-frame buffer ---
        let CpuState { molecules_in, molecules_out, velocities, .. } = &mut self.state;
        molecules_in
            .par_iter()
            .zip(velocities.par_iter())
            .map(|(m, &v)| m.advanced(v))
            .collect_into_vec(molecules_out);

        let corrupt_molecules = self.report_corrupt_molecules();

        // --- 4. Swap Buffers: Output becomes Input for next frame ---
        self.state.swap_buffers();

        // --- 5. Keyframe ---
        let snapshot = if self.state.params.is_keyframe(frame) {
            let snapshot = self.snapshot(frame);
            debug!(
                "Keyframe {}: {} molecules | KE {:.4} | momentum ({:.4}, {:.4})",
                frame,
                snapshot.len(),
                self.kinetic_energy(),
                self.momentum().x,
                self.momentum().y
            );
            Some(snapshot)
        } else {
            None
        };

        self.current_frame += 1;
        Ok(StepReport { frame, wall_collisions, particle_collisions, corrupt_molecules, snapshot })
    }

    /// Wall phase, in parallel over molecules. Returns the number of reflections.
    fn resolve_walls(&mut self) -> Result<usize> {
        let species = &self.species;
        let (width, height) = (self.state.params.width, self.state.params.height);

        let reflections: Vec<Option<Vec2>> = self
            .state
            .molecules_in
            .par_iter()
            .map(|m| -> Result<Option<Vec2>> {
                let radius = species.lookup(m.species)?.radius;
                Ok(resolve_wall_collision(m.position, m.velocity, radius, width, height).map(|(_, v)| v))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut count = 0;
        for (slot, reflected) in reflections.into_iter().enumerate() {
            if let Some(v) = reflected {
                self.state.velocities[slot] = v;
                self.state.wall_hit[slot] = true;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Particle phase, serial in id order. Each molecule joins at most one pair,
    /// and molecules reflected off a wall this frame are left out.
    fn resolve_pairs(&mut self) -> Result<usize> {
        let max_radius = self.species.max_radius();
        let index = &self.index;
        let species = &self.species;
        let CpuState { molecules_in, velocities, wall_hit, paired, .. } = &mut self.state;

        let mut candidates: Vec<usize> = Vec::new();
        let mut count = 0;

        for slot in 0..molecules_in.len() {
            if wall_hit[slot] || paired[slot] {
                continue;
            }
            let a = molecules_in[slot];
            let a_species = species.lookup(a.species)?;

            candidates.clear();
            index.for_each_neighbor(slot, a_species.radius + max_radius, |neighbor, _| {
                if !wall_hit[neighbor] && !paired[neighbor] {
                    candidates.push(neighbor);
                }
                true
            });
            candidates.sort_unstable_by_key(|&neighbor| molecules_in[neighbor].id);

            let body_a = Body {
                position: a.position,
                velocity: velocities[slot],
                mass: a_species.mass,
                radius: a_species.radius,
            };
            for &neighbor in &candidates {
                let b = molecules_in[neighbor];
                let b_species = species.lookup(b.species)?;
                let body_b = Body {
                    position: b.position,
                    velocity: velocities[neighbor],
                    mass: b_species.mass,
                    radius: b_species.radius,
                };
                if let Some((va, vb)) = resolve_elastic_collision(&body_a, &body_b) {
                    trace!("Pair collision between molecules {} and {}", a.id, b.id);
                    velocities[slot] = va;
                    velocities[neighbor] = vb;
                    paired[slot] = true;
                    paired[neighbor] = true;
                    count += 1;
                    break;
                }
            }
        }
        Ok(count)
    }

    /// Logs every freshly integrated molecule that ended up beyond the enclosure margin.
    fn report_corrupt_molecules(&self) -> usize {
        let params = &self.state.params;
        let margin = params.corrupt_margin();
        let mut count = 0;
        for m in &self.state.molecules_out {
            let p = m.position;
            let outside = !p.is_finite()
                || p.x < -margin
                || p.y < -margin
                || p.x > params.width + margin
                || p.y > params.height + margin;
            if outside {
                warn!("{}", GasError::CorruptFrameState { id: m.id, x: p.x, y: p.y });
                count += 1;
            }
        }
        count
    }

    /// Runs `frames` frames, handing every keyframe to `sink`. Returns the number of snapshots.
    pub fn run(&mut self, frames: u64, sink: &mut dyn SnapshotSink) -> anyhow::Result<u64> {
        info!("Starting simulation loop for {} frames...", frames);
        let start_time = Instant::now();
        let mut previous_print_time = start_time;
        let print_interval_secs = 5.0;
        let mut snapshots = 0;
        let mut corrupt_total = 0;

        for i in 0..frames {
            let step_start_time = Instant::now();
            let report = self.step()?;
            let step_duration = step_start_time.elapsed();
            corrupt_total += report.corrupt_molecules;

            trace!(
                "Frame [{}/{}] completed in {:.3} ms | wall {} | pairs {}",
                report.frame,
                frames,
                step_duration.as_secs_f64() * 1000.0,
                report.wall_collisions,
                report.particle_collisions
            );

            if let Some(snapshot) = &report.snapshot {
                if let Err(e) = sink.write_snapshot(snapshot) {
                    error!("Error recording snapshot at frame {}: {}", report.frame, e);
                    return Err(e);
                }
                snapshots += 1;
            }

            let now = Instant::now();
            let is_last = i + 1 == frames;
            if is_last || now.duration_since(previous_print_time).as_secs_f64() >= print_interval_secs {
                info!(
                    "Frame [{}/{}] | Molecules: {} | Snapshots: {} | Elapsed: {:.2} s",
                    report.frame + 1,
                    frames,
                    self.molecule_count(),
                    snapshots,
                    start_time.elapsed().as_secs_f64()
                );
                previous_print_time = now;
            }
        }

        if let Err(e) = sink.finish() {
            error!("Error finishing snapshot output: {}", e);
            return Err(e);
        }
        if corrupt_total > 0 {
            warn!("{} molecule-frames ended outside the enclosure margin.", corrupt_total);
        }
        info!(
            "Simulation finished in {:.3} seconds with {} snapshots.",
            start_time.elapsed().as_secs_f64(),
            snapshots
        );
        Ok(snapshots)
    }

    /// Snapshot of the current molecule set tagged with `frame`.
    fn snapshot(&self, frame: u64) -> Snapshot {
        Snapshot {
            frame,
            molecules: self.state.molecules_in.iter().map(Molecule::record).collect(),
        }
    }

    /// Total kinetic energy of all molecules.
    pub fn kinetic_energy(&self) -> f64 {
        self.state
            .molecules_in
            .iter()
            .filter_map(|m| {
                let mass = self.species.lookup(m.species).ok()?.mass;
                Some(0.5 * mass * m.velocity.length_squared())
            })
            .sum()
    }

    /// Total linear momentum of all molecules.
    pub fn momentum(&self) -> Vec2 {
        self.state
            .molecules_in
            .iter()
            .filter_map(|m| {
                let mass = self.species.lookup(m.species).ok()?.mass;
                Some(m.velocity * mass)
            })
            .fold(Vec2::zero(), |acc, p| acc + p)
    }

    /// Current molecules, ordered by id.
    pub fn molecules(&self) -> &[Molecule] {
        &self.state.molecules_in
    }

    pub fn molecule_count(&self) -> usize {
        self.state.num_molecules()
    }

    /// Index of the next frame `advance` will compute.
    pub fn frame(&self) -> u64 {
        self.current_frame
    }

    /// Number of molecule ids handed out so far.
    pub fn ids_allocated(&self) -> u64 {
        self.ids.allocated()
    }

    pub fn species(&self) -> &SpeciesTable {
        &self.species
    }

    /// Provides access to the simulation parameters.
    pub fn params(&self) -> &SimParams {
        &self.state.params
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Provides access to the original simulation configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

/// Range checks on the configuration and species table construction.
fn prepare(config: &SimulationConfig) -> Result<SpeciesTable> {
    validate_config(config)?;
    let species = SpeciesTable::from_config(&config.species)?;

    let diameter = 2.0 * species.max_radius();
    if diameter > config.enclosure.width || diameter > config.enclosure.height {
        return Err(GasError::invalid(format!(
            "enclosure {}x{} cannot hold a molecule of radius {}",
            config.enclosure.width,
            config.enclosure.height,
            species.max_radius()
        )));
    }
    Ok(species)
}

fn validate_config(config: &SimulationConfig) -> Result<()> {
    let enclosure = &config.enclosure;
    if !enclosure.width.is_finite() || enclosure.width <= 0.0 {
        return Err(GasError::invalid(format!("width must be > 0 (got {})", enclosure.width)));
    }
    if !enclosure.height.is_finite() || enclosure.height <= 0.0 {
        return Err(GasError::invalid(format!("height must be > 0 (got {})", enclosure.height)));
    }
    if enclosure.width_divisions <= 0 || enclosure.height_divisions <= 0 {
        return Err(GasError::invalid(format!(
            "division counts must be > 0 (got {}x{})",
            enclosure.width_divisions, enclosure.height_divisions
        )));
    }
    if config.timing.keyframe_interval == 0 {
        return Err(GasError::invalid("keyframe_interval must be > 0"));
    }

    let ic = &config.initial_conditions;
    for (name, value) in [("launch_x", ic.launch_x), ("launch_y", ic.launch_y)] {
        if let Some(v) = value {
            if !v.is_finite() {
                return Err(GasError::invalid(format!("{} must be finite (got {})", name, v)));
            }
        }
    }

    for emission in &config.emission {
        if emission.count < 0 {
            return Err(GasError::invalid(format!(
                "population of '{}' must not be negative (got {})",
                emission.species, emission.count
            )));
        }
        if !emission.speed.is_finite()
            || !emission.start_angle.is_finite()
            || !emission.angle_spread.is_finite()
        {
            return Err(GasError::invalid(format!(
                "emission of '{}': speed and angles must be finite",
                emission.species
            )));
        }
        if !emission.speed_jitter.is_finite() || emission.speed_jitter < 0.0 {
            return Err(GasError::invalid(format!(
                "emission of '{}': speed_jitter must be >= 0 (got {})",
                emission.species, emission.speed_jitter
            )));
        }
    }
    Ok(())
}

/// Nozzle emission: every molecule of an entry starts at the launch point with
/// its direction fanned evenly over `angle_spread` from `start_angle`.
fn emit_nozzle(
    config: &SimulationConfig,
    species: &SpeciesTable,
    params: &SimParams,
    ids: &mut IdCounter,
    rng: &mut StdRng,
) -> Result<Vec<Molecule>> {
    let total: i64 = config.emission.iter().map(|e| e.count.max(0)).sum();
    let mut molecules = Vec::with_capacity(total as usize);

    for emission in &config.emission {
        let species_id = species.resolve(&emission.species)?;
        let radius = species.lookup(species_id)?.radius;
        let launch = Vec2::new(
            config.initial_conditions.launch_x.unwrap_or(params.width / 2.0),
            config.initial_conditions.launch_y.unwrap_or(2.0 * radius),
        );
        let jitter = if emission.speed_jitter > 0.0 {
            let dist = Normal::new(0.0, emission.speed_jitter)
                .map_err(|e| GasError::invalid(format!("speed_jitter for '{}': {}", emission.species, e)))?;
            Some(dist)
        } else {
            None
        };

        let count = emission.count.max(0) as u64;
        for i in 0..count {
            let angle = emission.start_angle + emission.angle_spread * (i as f64 / count as f64);
            let speed = emission.speed + jitter.as_ref().map_or(0.0, |d| rng.sample(d));
            molecules.push(Molecule::new(ids.next_id(), species_id, launch, Vec2::from_polar(angle, speed)));
        }
        debug!(
            "Nozzle emitted {} '{}' molecules at ({:.1}, {:.1}), speed {}",
            count, emission.species, launch.x, launch.y, emission.speed
        );
    }
    Ok(molecules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gas_common::{EmissionConfig, SpeciesConfig};
    use std::f64::consts::PI;

    fn single_species_config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.species = vec![SpeciesConfig { name: "test".into(), mass: 1.0, radius: 4.0 }];
        config.emission.clear();
        config
    }

    #[test]
    fn rejects_bad_dimensions_and_counts() {
        let mut config = SimulationConfig::default();
        config.enclosure.width = 0.0;
        assert!(matches!(GasSimulation::new(config), Err(GasError::InvalidConfiguration(_))));

        let mut config = SimulationConfig::default();
        config.enclosure.height_divisions = 0;
        assert!(matches!(GasSimulation::new(config), Err(GasError::InvalidConfiguration(_))));

        let mut config = SimulationConfig::default();
        config.emission[0].count = -1;
        assert!(matches!(GasSimulation::new(config), Err(GasError::InvalidConfiguration(_))));

        let mut config = SimulationConfig::default();
        config.timing.keyframe_interval = 0;
        assert!(matches!(GasSimulation::new(config), Err(GasError::InvalidConfiguration(_))));
    }

    #[test]
    fn unknown_emission_species_fails() {
        let mut config = SimulationConfig::default();
        config.emission[0].species = "argon".into();
        assert!(matches!(GasSimulation::new(config), Err(GasError::UnknownSpecies(_))));
    }

    #[test]
    fn placement_with_unregistered_species_fails() {
        let placements = [Placement { species: SpeciesId(3), position: Vec2::new(10.0, 10.0), velocity: Vec2::zero() }];
        let result = GasSimulation::with_placements(single_species_config(), &placements);
        assert!(matches!(result, Err(GasError::UnknownSpecies(_))));
    }

    #[test]
    fn nozzle_fans_velocities_from_launch_point() -> Result<()> {
        let mut config = single_species_config();
        config.emission.push(EmissionConfig {
            species: "test".into(),
            count: 4,
            speed: 2.0,
            start_angle: 0.0,
            angle_spread: 2.0 * PI,
            speed_jitter: 0.0,
        });
        let sim = GasSimulation::new(config)?;
        let molecules = sim.molecules();
        assert_eq!(molecules.len(), 4);
        for (i, m) in molecules.iter().enumerate() {
            assert_eq!(m.id, i as u64);
            assert_eq!(m.position, Vec2::new(300.0, 8.0));
            assert!((m.velocity.length() - 2.0).abs() < 1e-12);
        }
        // quarter turns
        assert!((molecules[1].velocity.y - 2.0).abs() < 1e-12);
        assert!((molecules[2].velocity.x + 2.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn pair_collision_happens_once_per_frame() -> Result<()> {
        let placements = [
            Placement { species: SpeciesId(0), position: Vec2::new(100.0, 100.0), velocity: Vec2::new(1.0, 0.0) },
            Placement { species: SpeciesId(0), position: Vec2::new(106.0, 100.0), velocity: Vec2::new(-1.0, 0.0) },
            Placement { species: SpeciesId(0), position: Vec2::new(103.0, 105.0), velocity: Vec2::new(0.0, -1.0) },
        ];
        let mut sim = GasSimulation::with_placements(single_species_config(), &placements)?;
        let report = sim.step()?;
        assert_eq!(report.particle_collisions, 1);
        assert_eq!(report.wall_collisions, 0);

        let m = sim.molecules();
        // 0 and 1 swapped velocities, 2 was left alone this frame
        assert!((m[0].velocity.x + 1.0).abs() < 1e-12);
        assert!((m[1].velocity.x - 1.0).abs() < 1e-12);
        assert_eq!(m[2].velocity, Vec2::new(0.0, -1.0));
        Ok(())
    }

    #[test]
    fn collisions_can_be_disabled() -> Result<()> {
        let mut config = single_species_config();
        config.physics.particle_collisions = false;
        let placements = [
            Placement { species: SpeciesId(0), position: Vec2::new(100.0, 100.0), velocity: Vec2::new(1.0, 0.0) },
            Placement { species: SpeciesId(0), position: Vec2::new(106.0, 100.0), velocity: Vec2::new(-1.0, 0.0) },
        ];
        let mut sim = GasSimulation::with_placements(config, &placements)?;
        let report = sim.step()?;
        assert_eq!(report.particle_collisions, 0);
        assert_eq!(sim.molecules()[0].position, Vec2::new(101.0, 100.0));
        Ok(())
    }

    #[test]
    fn wall_hit_excludes_pairing() -> Result<()> {
        let placements = [
            Placement { species: SpeciesId(0), position: Vec2::new(2.0, 300.0), velocity: Vec2::new(-1.0, 0.0) },
            Placement { species: SpeciesId(0), position: Vec2::new(8.0, 300.0), velocity: Vec2::new(-2.0, 0.0) },
        ];
        let mut sim = GasSimulation::with_placements(single_species_config(), &placements)?;
        let report = sim.step()?;
        assert_eq!(report.wall_collisions, 1);
        assert_eq!(report.particle_collisions, 0);
        assert!((sim.molecules()[0].velocity.x - 1.0).abs() < 1e-12);
        assert_eq!(sim.molecules()[1].velocity, Vec2::new(-2.0, 0.0));
        Ok(())
    }

    #[test]
    fn escaped_molecule_is_reported_not_fatal() -> Result<()> {
        let placements = [Placement { species: SpeciesId(0), position: Vec2::new(300.0, 300.0), velocity: Vec2::new(1000.0, 0.0) }];
        let mut sim = GasSimulation::with_placements(single_species_config(), &placements)?;
        let report = sim.step()?;
        assert_eq!(report.corrupt_molecules, 1);
        assert!(sim.step().is_ok());
        Ok(())
    }

    #[test]
    fn runaway_molecule_keeps_the_run_going() -> Result<()> {
        let placements = [Placement { species: SpeciesId(0), position: Vec2::new(300.0, 300.0), velocity: Vec2::new(1e300, 0.0) }];
        let mut sim = GasSimulation::with_placements(single_species_config(), &placements)?;

        assert_eq!(sim.step()?.corrupt_molecules, 1);
        // now far past the right margin: bounced back, but thrown off vertically
        assert_eq!(sim.step()?.corrupt_molecules, 1);
        for _ in 0..5 {
            sim.step()?;
        }
        assert_eq!(sim.frame(), 7);
        assert_eq!(sim.molecule_count(), 1);
        Ok(())
    }

    #[test]
    fn extreme_nozzle_speed_keeps_the_run_going() -> Result<()> {
        let mut config = SimulationConfig::default();
        config.emission[1].speed = 1e300;
        let mut sim = GasSimulation::new(config)?;

        assert_eq!(sim.step()?.corrupt_molecules, 100);
        for _ in 0..5 {
            sim.step()?;
        }
        assert_eq!(sim.molecule_count(), 300);
        Ok(())
    }

    #[test]
    fn jitter_requires_non_negative_spread() {
        let mut config = SimulationConfig::default();
        config.emission[1].speed_jitter = -0.5;
        assert!(matches!(GasSimulation::new(config), Err(GasError::InvalidConfiguration(_))));
    }
}
