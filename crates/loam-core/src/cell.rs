//! Packed cell records shared between the step kernel and external consumers.
//!
//! Every cell in the world occupies a fixed 18-word record so the grid is a
//! flat `u32` array. The first two words carry the tagged header, the
//! remaining sixteen carry the genome at four genes per word. The layout is
//! the renderer/inspector wire contract; changing it is a breaking version
//! bump.

use crate::genome::{Genome, GENOME_LEN};

/// Number of `u32` words in one packed cell record.
pub const CELL_WORDS: usize = 18;

/// One packed cell as it appears in the snapshot buffer.
pub type PackedCell = [u32; CELL_WORDS];

/// Packed sentinel for empty space.
pub const AIR_RECORD: PackedCell = [0; CELL_WORDS];

/// Packed sentinel for the out-of-world boundary.
pub const WALL_RECORD: PackedCell = {
    let mut words = [0u32; CELL_WORDS];
    words[0] = CellKind::Wall as u32;
    words
};

/// Discriminant stored in the low three bits of word 0.
///
/// The ordering is load-bearing: predation targets are `kind >= Food` and
/// movement targets are `kind == Air`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum CellKind {
    Air = 0,
    Wall = 1,
    Food = 2,
    Active = 3,
}

impl CellKind {
    pub(crate) fn from_bits(bits: u32) -> Self {
        match bits {
            0 => Self::Air,
            1 => Self::Wall,
            2 => Self::Food,
            3 => Self::Active,
            other => unreachable!("corrupt cell record: kind bits {other}"),
        }
    }
}

/// Facing of an active cell; also used as a neighbour offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Direction {
    East = 0,
    North = 1,
    West = 2,
    South = 3,
}

impl Direction {
    /// All four directions, in arbitration scan order.
    pub const ALL: [Direction; 4] = [
        Direction::East,
        Direction::North,
        Direction::West,
        Direction::South,
    ];

    pub(crate) fn from_bits(bits: u32) -> Self {
        match bits {
            0 => Self::East,
            1 => Self::North,
            2 => Self::West,
            3 => Self::South,
            other => unreachable!("corrupt cell record: direction bits {other}"),
        }
    }

    /// Quarter turn counter-clockwise.
    #[must_use]
    pub const fn ccw(self) -> Self {
        Self::from_index((self as u32 + 1) % 4)
    }

    /// Quarter turn clockwise.
    #[must_use]
    pub const fn cw(self) -> Self {
        Self::from_index((self as u32 + 3) % 4)
    }

    /// The reverse facing.
    #[must_use]
    pub const fn opposite(self) -> Self {
        Self::from_index((self as u32 + 2) % 4)
    }

    /// Grid offset of one step in this direction. `y` grows downward, so
    /// south is `(0, 1)`.
    #[must_use]
    pub const fn offset(self) -> (i64, i64) {
        match self {
            Direction::East => (1, 0),
            Direction::North => (0, -1),
            Direction::West => (-1, 0),
            Direction::South => (0, 1),
        }
    }

    const fn from_index(index: u32) -> Self {
        match index {
            0 => Self::East,
            1 => Self::North,
            2 => Self::West,
            _ => Self::South,
        }
    }
}

/// Saturating 2-bit counters recording how an agent has been gaining energy.
///
/// Lineage/phenotype hint only; the counters never influence behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diet {
    pub eat: u8,
    pub photo: u8,
    pub mineral: u8,
}

impl Diet {
    pub const NONE: Diet = Diet {
        eat: 0,
        photo: 0,
        mineral: 0,
    };

    /// Bump one counter, saturating at the 2-bit ceiling.
    #[must_use]
    pub(crate) const fn bumped(counter: u8) -> u8 {
        if counter >= 3 {
            3
        } else {
            counter + 1
        }
    }
}

/// Decoded cell state.
///
/// AIR and WALL carry no payload, FOOD carries `energy` only, ACTIVE carries
/// every field. [`pack`] normalizes payload fields the kind does not carry,
/// so a round trip through the codec yields the normalized cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub kind: CellKind,
    pub direction: Direction,
    /// Ticks lived, 9 bits: 0..=511.
    pub age: u16,
    pub energy: u8,
    /// Accumulated minerals, 4 bits: 0..=15.
    pub minerals: u8,
    pub diet: Diet,
    /// Lineage tag; increments when reproduction mutates the genome.
    pub color: u8,
    /// Program counter into the genome, 0..=63.
    pub current_gene: u8,
    pub genome: Genome,
}

impl Cell {
    /// Empty space.
    pub const AIR: Cell = Cell {
        kind: CellKind::Air,
        direction: Direction::East,
        age: 0,
        energy: 0,
        minerals: 0,
        diet: Diet::NONE,
        color: 0,
        current_gene: 0,
        genome: Genome::ZERO,
    };

    /// Boundary sentinel returned for out-of-range reads.
    pub const WALL: Cell = Cell {
        kind: CellKind::Wall,
        ..Cell::AIR
    };

    /// Falling organic matter carrying `energy`.
    #[must_use]
    pub const fn food(energy: u8) -> Cell {
        Cell {
            kind: CellKind::Food,
            energy,
            ..Cell::AIR
        }
    }
}

const KIND_MASK: u32 = 0x7;
const DIRECTION_SHIFT: u32 = 3;
const DIET_EAT_SHIFT: u32 = 6;
const AGE_LOW_SHIFT: u32 = 8;
const ENERGY_SHIFT: u32 = 16;
const MINERALS_SHIFT: u32 = 24;
const DIET_PHOTO_SHIFT: u32 = 28;
const DIET_MINERAL_SHIFT: u32 = 30;
const GENE_SHIFT: u32 = 24;
const AGE_HIGH_SHIFT: u32 = 30;

/// Maximum encodable age (9 bits).
pub const AGE_LIMIT: u16 = 511;

/// Encode a cell into its fixed 18-word record.
///
/// Payload fields the kind does not carry are dropped, so the result always
/// satisfies the empty-space-is-all-zero invariant. Field overflow is a
/// programming error and aborts.
#[must_use]
pub fn pack(cell: &Cell) -> PackedCell {
    let mut words = [0u32; CELL_WORDS];
    words[0] = cell.kind as u32 & KIND_MASK;
    match cell.kind {
        CellKind::Air | CellKind::Wall => {}
        CellKind::Food => {
            words[0] |= u32::from(cell.energy) << ENERGY_SHIFT;
        }
        CellKind::Active => {
            assert!(cell.age <= AGE_LIMIT, "age {} exceeds 9 bits", cell.age);
            assert!(
                usize::from(cell.current_gene) < GENOME_LEN,
                "gene cursor {} exceeds genome length",
                cell.current_gene
            );
            assert!(
                cell.minerals <= 15,
                "minerals {} exceed 4 bits",
                cell.minerals
            );
            assert!(
                cell.diet.eat <= 3 && cell.diet.photo <= 3 && cell.diet.mineral <= 3,
                "diet counter exceeds 2 bits"
            );
            words[0] |= (cell.direction as u32) << DIRECTION_SHIFT
                | u32::from(cell.diet.eat) << DIET_EAT_SHIFT
                | (u32::from(cell.age) & 0xFF) << AGE_LOW_SHIFT
                | u32::from(cell.energy) << ENERGY_SHIFT
                | u32::from(cell.minerals) << MINERALS_SHIFT
                | u32::from(cell.diet.photo) << DIET_PHOTO_SHIFT
                | u32::from(cell.diet.mineral) << DIET_MINERAL_SHIFT;
            words[1] = u32::from(cell.color)
                | u32::from(cell.current_gene) << GENE_SHIFT
                | (u32::from(cell.age) >> 8) << AGE_HIGH_SHIFT;
            for (word, genes) in words[2..].iter_mut().zip(cell.genome.bytes().chunks_exact(4)) {
                *word = u32::from_le_bytes([genes[0], genes[1], genes[2], genes[3]]);
            }
        }
    }
    words
}

/// Decode a fixed 18-word record back into a cell.
#[must_use]
pub fn unpack(words: &PackedCell) -> Cell {
    match CellKind::from_bits(words[0] & KIND_MASK) {
        CellKind::Air => Cell::AIR,
        CellKind::Wall => Cell::WALL,
        CellKind::Food => Cell::food(((words[0] >> ENERGY_SHIFT) & 0xFF) as u8),
        CellKind::Active => {
            let mut genes = [0u8; GENOME_LEN];
            for (bytes, word) in genes.chunks_exact_mut(4).zip(&words[2..]) {
                bytes.copy_from_slice(&word.to_le_bytes());
            }
            Cell {
                kind: CellKind::Active,
                direction: Direction::from_bits((words[0] >> DIRECTION_SHIFT) & KIND_MASK),
                age: (((words[0] >> AGE_LOW_SHIFT) & 0xFF)
                    | ((words[1] >> AGE_HIGH_SHIFT) & 0x1) << 8) as u16,
                energy: ((words[0] >> ENERGY_SHIFT) & 0xFF) as u8,
                minerals: ((words[0] >> MINERALS_SHIFT) & 0xF) as u8,
                diet: Diet {
                    eat: ((words[0] >> DIET_EAT_SHIFT) & 0x3) as u8,
                    photo: ((words[0] >> DIET_PHOTO_SHIFT) & 0x3) as u8,
                    mineral: ((words[0] >> DIET_MINERAL_SHIFT) & 0x3) as u8,
                },
                color: (words[1] & 0xFF) as u8,
                current_gene: ((words[1] >> GENE_SHIFT) & 0x3F) as u8,
                genome: Genome::new(genes),
            }
        }
    }
}
