//! Per-cell transition function and contention arbitration.
//!
//! The step is a gather: `next[p]` is a pure function of the previous
//! snapshot, so every parallel task writes exactly one cell and conflict-free
//! writes hold by construction. Cross-cell agreement comes from both sides of
//! every interaction re-deriving the same answer from snapshot-only data —
//! an agent that leaves its cell and the cell it arrives in run the same
//! checks against the same snapshot. No locks, no atomics.

use crate::cell::{self, Cell, CellKind, Diet, Direction, PackedCell, CELL_WORDS};
use crate::environment;
use crate::genome::{
    Instruction, GENE_EAT_FORWARD, GENE_MOVE_FORWARD, GENE_REPRODUCE_BACKWARD,
    GENE_REPRODUCE_FORWARD, GENOME_LEN, NUM_GENES,
};
use crate::rng;
use crate::WorldConfig;

/// Read-only view of the previous tick's packed buffer.
///
/// X wraps modulo the world width; Y does not, and out-of-range rows read as
/// the WALL sentinel.
pub(crate) struct Snapshot<'a> {
    cells: &'a [u32],
    width: i64,
    height: i64,
}

impl<'a> Snapshot<'a> {
    pub(crate) fn new(cells: &'a [u32], width: u32, height: u32) -> Self {
        debug_assert_eq!(
            cells.len(),
            width as usize * height as usize * CELL_WORDS,
            "snapshot buffer does not match world dimensions"
        );
        Self {
            cells,
            width: i64::from(width),
            height: i64::from(height),
        }
    }

    pub(crate) fn cell(&self, x: i64, y: i64) -> Cell {
        if y < 0 || y >= self.height {
            return Cell::WALL;
        }
        let x = x.rem_euclid(self.width);
        let base = (x * self.height + y) as usize * CELL_WORDS;
        let record: &PackedCell = self.cells[base..base + CELL_WORDS]
            .try_into()
            .expect("cell record width");
        cell::unpack(record)
    }

    fn height(&self) -> i64 {
        self.height
    }
}

/// Compute the next value of the cell at `(x, y)`.
///
/// `slot` is the RNG stream owned by this position; only child spawns
/// advance it.
pub(crate) fn transition(
    snapshot: &Snapshot<'_>,
    config: &WorldConfig,
    x: i64,
    y: i64,
    slot: &mut u32,
) -> PackedCell {
    let current = snapshot.cell(x, y);
    match current.kind {
        CellKind::Wall => cell::WALL_RECORD,
        CellKind::Air => resolve_claims(snapshot, config, x, y, slot),
        CellKind::Food => food_next(snapshot, &current, x, y),
        CellKind::Active => active_next(snapshot, config, current, x, y),
    }
}

/// Movement gate shared by walkers, falling food, and reproduction.
///
/// The target must be empty, and every rival claimant adjacent to it — a
/// walker whose gene is MOVE_FORWARD pointing back at the target, or food
/// directly above it — must carry strictly less energy than the actor.
/// Ties lose on both sides, which is what keeps parallel writers disjoint.
pub(crate) fn can_move(
    snapshot: &Snapshot<'_>,
    actor_energy: i32,
    from: (i64, i64),
    to: (i64, i64),
) -> bool {
    if snapshot.cell(to.0, to.1).kind != CellKind::Air {
        return false;
    }
    for direction in Direction::ALL {
        let (dx, dy) = direction.offset();
        let rival_pos = (to.0 + dx, to.1 + dy);
        if rival_pos == from {
            continue;
        }
        let rival = snapshot.cell(rival_pos.0, rival_pos.1);
        match rival.kind {
            CellKind::Active => {
                if rival.genome.gene(rival.current_gene) == GENE_MOVE_FORWARD
                    && rival.direction == direction.opposite()
                    && actor_energy <= i32::from(rival.energy)
                {
                    return false;
                }
            }
            CellKind::Food if direction == Direction::North => {
                if actor_energy <= i32::from(rival.energy) {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}

/// Whether some neighbour executes EAT_FORWARD facing `(x, y)` this tick.
pub(crate) fn is_eaten(snapshot: &Snapshot<'_>, x: i64, y: i64) -> bool {
    Direction::ALL.iter().any(|&direction| {
        let (dx, dy) = direction.offset();
        let neighbour = snapshot.cell(x + dx, y + dy);
        neighbour.kind == CellKind::Active
            && neighbour.genome.gene(neighbour.current_gene) == GENE_EAT_FORWARD
            && neighbour.direction == direction.opposite()
    })
}

fn food_next(snapshot: &Snapshot<'_>, food: &Cell, x: i64, y: i64) -> PackedCell {
    if is_eaten(snapshot, x, y) {
        return cell::AIR_RECORD;
    }
    if y + 1 >= snapshot.height() {
        // Food that rested on the floor for one tick is absorbed.
        return cell::AIR_RECORD;
    }
    if can_move(snapshot, i32::from(food.energy), (x, y), (x, y + 1)) {
        return cell::AIR_RECORD;
    }
    cell::pack(food)
}

fn active_next(
    snapshot: &Snapshot<'_>,
    config: &WorldConfig,
    mut node: Cell,
    x: i64,
    y: i64,
) -> PackedCell {
    if is_eaten(snapshot, x, y) {
        return cell::AIR_RECORD;
    }
    let cursor = node.current_gene;
    let mut energy = i32::from(node.energy);
    let mut advance: u8 = 1;
    match Instruction::decode(node.genome.gene(cursor)) {
        Instruction::Jump(byte) => {
            if byte != 0 {
                advance = byte;
            }
        }
        Instruction::MoveForward => {
            let (dx, dy) = node.direction.offset();
            if can_move(snapshot, energy, (x, y), (x + dx, y + dy)) {
                // The destination task re-derives the same outcome and
                // materializes the walker there.
                return cell::AIR_RECORD;
            }
        }
        Instruction::TurnCcw => node.direction = node.direction.ccw(),
        Instruction::TurnCw => node.direction = node.direction.cw(),
        Instruction::EatForward => {
            let (dx, dy) = node.direction.offset();
            let target = snapshot.cell(x + dx, y + dy);
            if target.kind >= CellKind::Food {
                energy += i32::from(target.energy);
                node.diet.eat = Diet::bumped(node.diet.eat);
                advance = node.genome.arg(cursor, 1);
            } else {
                advance = node.genome.arg(cursor, 2);
            }
        }
        Instruction::ReproduceForward | Instruction::ReproduceBackward => {
            let towards = if node.genome.gene(cursor) == GENE_REPRODUCE_FORWARD {
                node.direction
            } else {
                node.direction.opposite()
            };
            let (dx, dy) = towards.offset();
            let half = (energy - config.reproduction_cost as i32) / 2;
            if half > 0 && can_move(snapshot, energy, (x, y), (x + dx, y + dy)) {
                energy -= half;
                advance = node.genome.arg(cursor, 2);
            } else {
                advance = node.genome.arg(cursor, 3);
            }
        }
        Instruction::Photosynthesize => {
            let sun = environment::sun_at(config, y as u32);
            if sun > 0 {
                energy += sun as i32;
                node.diet.photo = Diet::bumped(node.diet.photo);
            }
        }
        Instruction::CheckForward => {
            let (dx, dy) = node.direction.offset();
            let target = snapshot.cell(x + dx, y + dy);
            advance = match target.kind {
                CellKind::Active
                    if node
                        .genome
                        .is_related(&target.genome, config.relative_threshold) =>
                {
                    node.genome.arg(cursor, 1)
                }
                CellKind::Active => node.genome.arg(cursor, 2),
                CellKind::Food => node.genome.arg(cursor, 3),
                CellKind::Air => node.genome.arg(cursor, 4),
                CellKind::Wall => node.genome.arg(cursor, 5),
            };
        }
        Instruction::CheckEnergy => {
            // Both arms read the same argument slot; the behaviour is kept
            // as shipped.
            advance = if energy > i32::from(node.genome.arg(cursor, 1)) {
                node.genome.arg(cursor, 2)
            } else {
                node.genome.arg(cursor, 2)
            };
        }
        Instruction::ConvertMinerals => {
            if node.minerals > 0 {
                energy += i32::from(node.minerals) * config.mineral_energy as i32;
                node.minerals = 0;
                node.diet.mineral = Diet::bumped(node.diet.mineral);
            }
        }
        Instruction::Nop => {}
    }
    settle(config, node, energy, advance, y)
}

/// End-of-tick bookkeeping for an active cell landing at row `y`: advance
/// the gene cursor, pay upkeep, absorb minerals, age, and die into food when
/// spent or worn out.
fn settle(config: &WorldConfig, mut node: Cell, energy: i32, advance: u8, y: i64) -> PackedCell {
    node.current_gene =
        ((u32::from(node.current_gene) + u32::from(advance)) % GENOME_LEN as u32) as u8;
    let energy = (energy - 1).min(config.node_max_energy as i32);
    let age = u32::from(node.age) + 1;
    if energy <= 0 || age > config.node_max_age {
        return cell::pack(&Cell::food(config.food_energy as u8));
    }
    node.energy = energy as u8;
    node.minerals = (u32::from(node.minerals) + environment::mineral_at(config, y as u32))
        .min(config.node_max_minerals) as u8;
    node.age = age as u16;
    cell::pack(&node)
}

/// A walker arriving at row `y`: MOVE_FORWARD has no side effects beyond the
/// move itself, so only the default bookkeeping applies.
fn arrive(config: &WorldConfig, walker: Cell, y: i64) -> PackedCell {
    settle(config, walker, i32::from(walker.energy), 1, y)
}

/// Decide what, if anything, enters an empty cell.
///
/// Walkers and falling food go first — the strict-inequality energy rule in
/// [`can_move`] admits at most one of them. Reproduction claims are not
/// covered by that rule, so the first passing parent in scan order wins the
/// slot deterministically.
fn resolve_claims(
    snapshot: &Snapshot<'_>,
    config: &WorldConfig,
    x: i64,
    y: i64,
    slot: &mut u32,
) -> PackedCell {
    for direction in Direction::ALL {
        let (dx, dy) = direction.offset();
        let claimant_pos = (x + dx, y + dy);
        let claimant = snapshot.cell(claimant_pos.0, claimant_pos.1);
        match claimant.kind {
            CellKind::Active => {
                if claimant.genome.gene(claimant.current_gene) == GENE_MOVE_FORWARD
                    && claimant.direction == direction.opposite()
                    && !is_eaten(snapshot, claimant_pos.0, claimant_pos.1)
                    && can_move(snapshot, i32::from(claimant.energy), claimant_pos, (x, y))
                {
                    return arrive(config, claimant, y);
                }
            }
            CellKind::Food if direction == Direction::North => {
                if !is_eaten(snapshot, claimant_pos.0, claimant_pos.1)
                    && can_move(snapshot, i32::from(claimant.energy), claimant_pos, (x, y))
                {
                    return cell::pack(&claimant);
                }
            }
            _ => {}
        }
    }
    for direction in Direction::ALL {
        let (dx, dy) = direction.offset();
        let parent_pos = (x + dx, y + dy);
        let parent = snapshot.cell(parent_pos.0, parent_pos.1);
        if parent.kind != CellKind::Active {
            continue;
        }
        let spawn_towards = match parent.genome.gene(parent.current_gene) {
            GENE_REPRODUCE_FORWARD => parent.direction,
            GENE_REPRODUCE_BACKWARD => parent.direction.opposite(),
            _ => continue,
        };
        if spawn_towards != direction.opposite() {
            continue;
        }
        if is_eaten(snapshot, parent_pos.0, parent_pos.1) {
            continue;
        }
        let half = (i32::from(parent.energy) - config.reproduction_cost as i32) / 2;
        if half <= 0 {
            continue;
        }
        if !can_move(snapshot, i32::from(parent.energy), parent_pos, (x, y)) {
            continue;
        }
        return spawn_child(config, &parent, half, slot);
    }
    cell::AIR_RECORD
}

/// Materialize a newborn in the claimed cell, mutating with the configured
/// probability from this cell's own RNG stream.
fn spawn_child(config: &WorldConfig, parent: &Cell, half: i32, slot: &mut u32) -> PackedCell {
    let mut genome = parent.genome;
    let mut color = parent.color;
    if config.mutation_rate > 0 && rng::next_range(slot, 0, 100) < config.mutation_rate {
        let index = rng::next_range(slot, 0, GENOME_LEN as u32) as u8;
        let code = rng::next_range(slot, 0, u32::from(NUM_GENES)) as u8;
        genome.set_gene(index, code);
        color = color.wrapping_add(1);
    }
    let child = Cell {
        kind: CellKind::Active,
        direction: parent.direction,
        age: 0,
        energy: half as u8,
        minerals: 0,
        diet: Diet::NONE,
        color,
        current_gene: parent.genome.arg(parent.current_gene, 1) % GENOME_LEN as u8,
        genome,
    };
    cell::pack(&child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::Genome;

    fn empty_world(width: u32, height: u32) -> Vec<u32> {
        vec![0; width as usize * height as usize * CELL_WORDS]
    }

    fn put(buffer: &mut [u32], height: u32, x: i64, y: i64, node: &Cell) {
        let base = (x * i64::from(height) + y) as usize * CELL_WORDS;
        buffer[base..base + CELL_WORDS].copy_from_slice(&cell::pack(node));
    }

    fn walker(direction: Direction, energy: u8) -> Cell {
        Cell {
            kind: CellKind::Active,
            direction,
            energy,
            genome: Genome::uniform(GENE_MOVE_FORWARD),
            ..Cell::AIR
        }
    }

    #[test]
    fn out_of_range_rows_read_as_wall() {
        let buffer = empty_world(3, 3);
        let snapshot = Snapshot::new(&buffer, 3, 3);
        assert_eq!(snapshot.cell(1, -1).kind, CellKind::Wall);
        assert_eq!(snapshot.cell(1, 3).kind, CellKind::Wall);
        assert_eq!(snapshot.cell(1, 1).kind, CellKind::Air);
    }

    #[test]
    fn x_coordinate_wraps() {
        let mut buffer = empty_world(3, 3);
        put(&mut buffer, 3, 0, 1, &Cell::food(9));
        let snapshot = Snapshot::new(&buffer, 3, 3);
        assert_eq!(snapshot.cell(3, 1), Cell::food(9));
        assert_eq!(snapshot.cell(-3, 1), Cell::food(9));
    }

    #[test]
    fn lower_energy_walker_loses_the_target() {
        // Two walkers face the empty middle cell from either side.
        let mut buffer = empty_world(3, 1);
        put(&mut buffer, 1, 0, 0, &walker(Direction::East, 20));
        put(&mut buffer, 1, 2, 0, &walker(Direction::West, 10));
        let snapshot = Snapshot::new(&buffer, 3, 1);
        assert!(can_move(&snapshot, 20, (0, 0), (1, 0)));
        assert!(!can_move(&snapshot, 10, (2, 0), (1, 0)));
    }

    #[test]
    fn equal_energy_walkers_both_lose() {
        let mut buffer = empty_world(3, 1);
        put(&mut buffer, 1, 0, 0, &walker(Direction::East, 15));
        put(&mut buffer, 1, 2, 0, &walker(Direction::West, 15));
        let snapshot = Snapshot::new(&buffer, 3, 1);
        assert!(!can_move(&snapshot, 15, (0, 0), (1, 0)));
        assert!(!can_move(&snapshot, 15, (2, 0), (1, 0)));
    }

    #[test]
    fn falling_food_contests_the_target() {
        // Food above the target outweighs the walker approaching from the west.
        let mut buffer = empty_world(3, 2);
        put(&mut buffer, 2, 0, 1, &walker(Direction::East, 5));
        put(&mut buffer, 2, 1, 0, &Cell::food(8));
        let snapshot = Snapshot::new(&buffer, 3, 2);
        assert!(!can_move(&snapshot, 5, (0, 1), (1, 1)));
        assert!(can_move(&snapshot, 8, (1, 0), (1, 1)));
    }

    #[test]
    fn occupied_targets_are_never_enterable() {
        let mut buffer = empty_world(2, 1);
        put(&mut buffer, 1, 1, 0, &Cell::food(1));
        let snapshot = Snapshot::new(&buffer, 2, 1);
        assert!(!can_move(&snapshot, 200, (0, 0), (1, 0)));
    }

    #[test]
    fn eaten_detects_a_facing_eater() {
        let mut buffer = empty_world(3, 1);
        let eater = Cell {
            genome: Genome::uniform(GENE_EAT_FORWARD),
            ..walker(Direction::East, 10)
        };
        put(&mut buffer, 1, 0, 0, &eater);
        put(&mut buffer, 1, 1, 0, &Cell::food(3));
        let snapshot = Snapshot::new(&buffer, 3, 1);
        assert!(is_eaten(&snapshot, 1, 0));
        assert!(!is_eaten(&snapshot, 2, 0));
    }

    #[test]
    fn eater_facing_away_does_not_eat() {
        let mut buffer = empty_world(3, 1);
        let eater = Cell {
            genome: Genome::uniform(GENE_EAT_FORWARD),
            ..walker(Direction::West, 10)
        };
        put(&mut buffer, 1, 0, 0, &eater);
        put(&mut buffer, 1, 1, 0, &Cell::food(3));
        let snapshot = Snapshot::new(&buffer, 3, 1);
        assert!(!is_eaten(&snapshot, 1, 0));
    }
}
