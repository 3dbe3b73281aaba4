//! Deterministic evolutionary cellular-automaton engine.
//!
//! A rectangular grid of packed cells — empty space, falling food, and
//! genome-driven agents — advances in synchronous ticks. Every tick is a
//! pure double-buffered transform: all cells are recomputed in parallel from
//! a snapshot of the previous tick, contention is settled by snapshot-only
//! arbitration rules, and the buffers swap. Given the same seed, runs are
//! bit-for-bit reproducible across thread counts.
//!
//! The engine exposes a small surface for renderers and inspectors: the
//! read-only configuration, the packed snapshot buffer, single-cell reads,
//! and a step-once command.

use rand::{rngs::SmallRng, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

pub mod cell;
pub mod environment;
pub mod genome;
mod kernel;
mod rng;

pub use cell::{Cell, CellKind, Diet, Direction, PackedCell, AGE_LIMIT, CELL_WORDS};
pub use genome::{
    Genome, Instruction, GENE_CHECK_ENERGY, GENE_CHECK_FORWARD, GENE_CONVERT_MINERALS,
    GENE_EAT_FORWARD, GENE_MOVE_FORWARD, GENE_PHOTOSYNTHESIZE, GENE_REPRODUCE_BACKWARD,
    GENE_REPRODUCE_FORWARD, GENE_TURN_CCW, GENE_TURN_CW, GENOME_LEN, NUM_GENES,
};

use rng::RngLattice;

/// High level simulation clock (ticks processed since reset).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Errors surfaced by the simulation API.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimulationError {
    /// A single-cell read outside the world bounds.
    #[error("cell ({x}, {y}) is outside the {width}x{height} world")]
    OutOfRange {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// A configuration field was unknown or carried an invalid value.
    #[error("configuration rejected: {0}")]
    ConfigRejected(&'static str),
    /// The parallel execution backend could not be brought up.
    #[error("execution backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Static and hot-editable configuration for a world.
///
/// Scalar fields may be edited between steps through
/// [`Simulation::set_config`]; the grid dimensions are fixed for the life of
/// the simulator because they determine buffer geometry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldConfig {
    /// Grid width in cells. X wraps at this width.
    pub world_width: u32,
    /// Grid height in cells. Row 0 is the sunlit top.
    pub world_height: u32,
    /// Death-by-age threshold; at most [`AGE_LIMIT`].
    pub node_max_age: u32,
    /// Energy ceiling applied every tick; at most 255.
    pub node_max_energy: u32,
    /// Mineral ceiling; at most 15.
    pub node_max_minerals: u32,
    /// Energy produced per mineral on conversion.
    pub mineral_energy: u32,
    /// Sunlight at the top row.
    pub sun_amount: u32,
    /// Rows per one-point sunlight falloff band.
    pub sun_level_height: u32,
    /// Mineral deposition at the bottom row.
    pub mineral_amount: u32,
    /// Rows per one-point mineral falloff band.
    pub mineral_level_height: u32,
    /// Maximum genome Hamming distance still considered kin.
    pub relative_threshold: u32,
    /// Energy subtracted before a reproduction split.
    pub reproduction_cost: u32,
    /// Mutation chance per birth, as an integer percentage 0..=100.
    pub mutation_rate: u32,
    /// Energy of the food a dead agent leaves behind; at most 255.
    pub food_energy: u32,
    /// Optional seed for reproducible worlds.
    pub rng_seed: Option<u64>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            world_width: 300,
            world_height: 150,
            node_max_age: 300,
            node_max_energy: 255,
            node_max_minerals: 15,
            mineral_energy: 4,
            sun_amount: 5,
            sun_level_height: 10,
            mineral_amount: 5,
            mineral_level_height: 10,
            relative_threshold: 2,
            reproduction_cost: 14,
            mutation_rate: 25,
            food_energy: 10,
            rng_seed: None,
        }
    }
}

impl WorldConfig {
    /// Validates every field against its encodable range.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.world_width == 0 || self.world_height == 0 {
            return Err(SimulationError::ConfigRejected(
                "world dimensions must be non-zero",
            ));
        }
        if self.node_max_age == 0 || self.node_max_age > u32::from(AGE_LIMIT) {
            return Err(SimulationError::ConfigRejected(
                "NODE_MAX_AGE must be in 1..=511",
            ));
        }
        if self.node_max_energy == 0 || self.node_max_energy > 255 {
            return Err(SimulationError::ConfigRejected(
                "NODE_MAX_ENERGY must be in 1..=255",
            ));
        }
        if self.node_max_minerals > 15 {
            return Err(SimulationError::ConfigRejected(
                "NODE_MAX_MINERALS must be at most 15",
            ));
        }
        if self.sun_level_height == 0 || self.mineral_level_height == 0 {
            return Err(SimulationError::ConfigRejected(
                "field falloff band heights must be non-zero",
            ));
        }
        if self.relative_threshold > GENOME_LEN as u32 {
            return Err(SimulationError::ConfigRejected(
                "RELATIVE_THRESHOLD cannot exceed the genome length",
            ));
        }
        if self.reproduction_cost > 255 {
            return Err(SimulationError::ConfigRejected(
                "REPRODUCTION_COST must be at most 255",
            ));
        }
        if self.mutation_rate > 100 {
            return Err(SimulationError::ConfigRejected(
                "MUTATION_RATE is an integer percentage 0..=100",
            ));
        }
        if self.food_energy == 0 || self.food_energy > 255 {
            return Err(SimulationError::ConfigRejected(
                "FOOD_ENERGY must be in 1..=255",
            ));
        }
        Ok(())
    }

    /// Number of cells in the grid.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.world_width as usize * self.world_height as usize
    }

    /// Rows of the sunlit spawn band, clamped to the world height.
    #[must_use]
    pub fn spawn_band_rows(&self) -> u32 {
        (self.sun_amount * self.sun_level_height).clamp(1, self.world_height)
    }

    /// Returns the configured RNG, falling back to entropy when unseeded.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::seed_from_u64(rand::random()),
        }
    }
}

/// Parameters for seeding a fresh world.
#[derive(Debug, Clone)]
pub struct ResetSetup {
    /// How many agents to scatter across the sunlit band.
    pub node_count: u32,
    /// Starting energy of each seeded agent.
    pub node_energy: u8,
    /// Program every seeded agent starts with.
    pub genome: Genome,
}

impl Default for ResetSetup {
    fn default() -> Self {
        Self {
            node_count: 100,
            node_energy: 100,
            genome: Genome::uniform(GENE_PHOTOSYNTHESIZE),
        }
    }
}

/// Cell population counts computed by parallel reduction over the snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CellCensus {
    pub active: u32,
    pub food: u32,
}

/// The simulator: two packed world buffers, the per-cell RNG lattice, and a
/// dedicated thread pool.
pub struct Simulation {
    config: WorldConfig,
    prev: Vec<u32>,
    next: Vec<u32>,
    lattice: RngLattice,
    seeder: SmallRng,
    tick: Tick,
    pool: rayon::ThreadPool,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .finish()
    }
}

impl Simulation {
    /// Build a simulator for `config`.
    ///
    /// The world starts empty; call [`Simulation::reset`] to seed it.
    /// Thread-pool construction failure surfaces as
    /// [`SimulationError::BackendUnavailable`].
    pub fn new(config: WorldConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .build()
            .map_err(|error| SimulationError::BackendUnavailable(error.to_string()))?;
        let words = config.cell_count() * CELL_WORDS;
        let mut seeder = config.seeded_rng();
        let lattice = RngLattice::new(config.cell_count(), &mut seeder);
        Ok(Self {
            prev: vec![0; words],
            next: vec![0; words],
            lattice,
            seeder,
            tick: Tick::zero(),
            config,
            pool,
        })
    }

    /// Clear the world and scatter `setup.node_count` agents across the
    /// sunlit band, skipping draws that land on occupied cells.
    ///
    /// Both buffers are initialised identically, the tick counter returns to
    /// zero, and the RNG lattice is reseeded, so two resets with the same
    /// seed produce identical worlds.
    pub fn reset(&mut self, setup: &ResetSetup) {
        self.prev.fill(0);
        self.next.fill(0);
        self.seeder = self.config.seeded_rng();
        self.lattice.reseed(&mut self.seeder);
        self.tick = Tick::zero();

        let band = self.config.spawn_band_rows();
        let budget = setup.node_count.saturating_mul(8).max(64);
        let mut placed = 0u32;
        for _ in 0..budget {
            if placed >= setup.node_count {
                break;
            }
            let x = self.seeder.random_range(0..self.config.world_width);
            let y = self.seeder.random_range(0..band);
            let base = (x as usize * self.config.world_height as usize + y as usize) * CELL_WORDS;
            if self.next[base] & 0x7 != CellKind::Air as u32 {
                continue;
            }
            let direction = match self.seeder.random_range(0..4u8) {
                0 => Direction::East,
                1 => Direction::North,
                2 => Direction::West,
                _ => Direction::South,
            };
            let node = Cell {
                kind: CellKind::Active,
                direction,
                age: 0,
                energy: setup.node_energy,
                minerals: 0,
                diet: Diet::NONE,
                color: 0,
                current_gene: 0,
                genome: setup.genome,
            };
            let record = cell::pack(&node);
            self.next[base..base + CELL_WORDS].copy_from_slice(&record);
            self.prev[base..base + CELL_WORDS].copy_from_slice(&record);
            placed += 1;
        }
        debug!(requested = setup.node_count, placed, "world reset");
    }

    /// Advance the world by one tick.
    ///
    /// The buffers swap by pointer exchange, then every cell of the new
    /// buffer is recomputed in parallel from the old one. Reads never touch
    /// the buffer being written; each task writes exactly one cell and owns
    /// that cell's RNG slot.
    pub fn step(&mut self) {
        std::mem::swap(&mut self.prev, &mut self.next);
        let config = &self.config;
        let height = i64::from(config.world_height);
        let snapshot = kernel::Snapshot::new(&self.prev, config.world_width, config.world_height);
        let next = &mut self.next;
        let slots = self.lattice.slots_mut();
        self.pool.install(|| {
            next.par_chunks_mut(CELL_WORDS)
                .zip(slots.par_iter_mut())
                .enumerate()
                .for_each(|(index, (record, slot))| {
                    let x = index as i64 / height;
                    let y = index as i64 % height;
                    record.copy_from_slice(&kernel::transition(&snapshot, config, x, y, slot));
                });
        });
        self.tick = self.tick.next();
    }

    /// Decode the cell at `(x, y)` from the published buffer.
    pub fn get(&self, x: u32, y: u32) -> Result<Cell, SimulationError> {
        let base = self.offset(x, y)?;
        let record: &PackedCell = self.next[base..base + CELL_WORDS]
            .try_into()
            .expect("cell record width");
        Ok(cell::unpack(record))
    }

    /// Overwrite the cell at `(x, y)` in both buffers.
    ///
    /// Scenario setup hook for tests and tooling; the change is visible to
    /// readers immediately and to the kernel on the next step.
    pub fn put(&mut self, x: u32, y: u32, node: &Cell) -> Result<(), SimulationError> {
        let base = self.offset(x, y)?;
        let record = cell::pack(node);
        self.next[base..base + CELL_WORDS].copy_from_slice(&record);
        self.prev[base..base + CELL_WORDS].copy_from_slice(&record);
        Ok(())
    }

    /// The packed snapshot buffer, column-major, 18 little-endian words per
    /// cell. This is the renderer/inspector wire contract.
    #[must_use]
    pub fn snapshot(&self) -> &[u32] {
        &self.next
    }

    /// Read-only access to the configuration block.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Update one recognized configuration field by its published name.
    ///
    /// Unknown names and out-of-range values are rejected without touching
    /// the live configuration. `&mut self` excludes concurrent stepping.
    pub fn set_config(&mut self, name: &str, value: u32) -> Result<(), SimulationError> {
        let mut candidate = self.config.clone();
        match name {
            "NODE_MAX_AGE" => candidate.node_max_age = value,
            "NODE_MAX_ENERGY" => candidate.node_max_energy = value,
            "NODE_MAX_MINERALS" => candidate.node_max_minerals = value,
            "MINERAL_ENERGY" => candidate.mineral_energy = value,
            "SUN_AMOUNT" => candidate.sun_amount = value,
            "SUN_LEVEL_HEIGHT" => candidate.sun_level_height = value,
            "MINERAL_AMOUNT" => candidate.mineral_amount = value,
            "MINERAL_LEVEL_HEIGHT" => candidate.mineral_level_height = value,
            "RELATIVE_THRESHOLD" => candidate.relative_threshold = value,
            "REPRODUCTION_COST" => candidate.reproduction_cost = value,
            "MUTATION_RATE" => candidate.mutation_rate = value,
            "FOOD_ENERGY" => candidate.food_energy = value,
            "WORLD_SIZE" | "WORLD_WIDTH" | "WORLD_HEIGHT" => {
                return Err(SimulationError::ConfigRejected(
                    "world dimensions are fixed at construction",
                ));
            }
            _ => {
                return Err(SimulationError::ConfigRejected(
                    "unrecognized configuration field",
                ));
            }
        }
        candidate.validate()?;
        debug!(field = name, value, "configuration updated");
        self.config = candidate;
        Ok(())
    }

    /// Count live agents and food cells by parallel reduction over the
    /// published buffer.
    #[must_use]
    pub fn census(&self) -> CellCensus {
        let (active, food) = self.pool.install(|| {
            self.next
                .par_chunks(CELL_WORDS)
                .map(|record| match record[0] & 0x7 {
                    bits if bits == CellKind::Active as u32 => (1u32, 0u32),
                    bits if bits == CellKind::Food as u32 => (0, 1),
                    _ => (0, 0),
                })
                .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1))
        });
        CellCensus { active, food }
    }

    fn offset(&self, x: u32, y: u32) -> Result<usize, SimulationError> {
        if x >= self.config.world_width || y >= self.config.world_height {
            return Err(SimulationError::OutOfRange {
                x,
                y,
                width: self.config.world_width,
                height: self.config.world_height,
            });
        }
        Ok((x as usize * self.config.world_height as usize + y as usize) * CELL_WORDS)
    }
}
