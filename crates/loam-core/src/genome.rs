//! Genomes and the instruction table they encode.
//!
//! A genome is a circular sequence of 64 bytes. Each byte is a gene code:
//! codes below [`GENE_MOVE_FORWARD`] are relative jumps, the next ten codes
//! are the agent operations, and everything above the table is inert.

use std::fmt;

/// Genes per genome; also the modulus for the gene cursor.
pub const GENOME_LEN: usize = 64;

/// Exclusive upper bound of the gene-code table; mutation draws below it.
pub const NUM_GENES: u8 = 74;

pub const GENE_MOVE_FORWARD: u8 = 64;
pub const GENE_TURN_CCW: u8 = 65;
pub const GENE_TURN_CW: u8 = 66;
pub const GENE_EAT_FORWARD: u8 = 67;
pub const GENE_REPRODUCE_FORWARD: u8 = 68;
pub const GENE_REPRODUCE_BACKWARD: u8 = 69;
pub const GENE_PHOTOSYNTHESIZE: u8 = 70;
pub const GENE_CHECK_FORWARD: u8 = 71;
pub const GENE_CHECK_ENERGY: u8 = 72;
pub const GENE_CONVERT_MINERALS: u8 = 73;

/// Fixed-length agent program, addressed modulo [`GENOME_LEN`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Genome([u8; GENOME_LEN]);

impl Genome {
    /// The all-zero genome (an endless no-op loop).
    pub const ZERO: Genome = Genome([0; GENOME_LEN]);

    #[must_use]
    pub const fn new(genes: [u8; GENOME_LEN]) -> Self {
        Self(genes)
    }

    /// A genome repeating a single gene code.
    #[must_use]
    pub const fn uniform(code: u8) -> Self {
        Self([code; GENOME_LEN])
    }

    /// Raw gene bytes in program order.
    #[must_use]
    pub const fn bytes(&self) -> &[u8; GENOME_LEN] {
        &self.0
    }

    /// Gene at `index`, wrapping around the circular program.
    #[must_use]
    pub fn gene(&self, index: u8) -> u8 {
        self.0[usize::from(index) % GENOME_LEN]
    }

    /// Overwrite the gene at `index` (wrapping).
    pub fn set_gene(&mut self, index: u8, code: u8) {
        self.0[usize::from(index) % GENOME_LEN] = code;
    }

    /// Argument fetch: the gene `k` slots after `cursor`, wrapping.
    #[must_use]
    pub fn arg(&self, cursor: u8, k: u8) -> u8 {
        self.0[(usize::from(cursor) + usize::from(k)) % GENOME_LEN]
    }

    /// Byte-wise Hamming distance to another genome.
    #[must_use]
    pub fn hamming(&self, other: &Genome) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .filter(|(a, b)| a != b)
            .count() as u32
    }

    /// Two genomes are related when they differ in at most `threshold` genes.
    #[must_use]
    pub fn is_related(&self, other: &Genome, threshold: u32) -> bool {
        self.hamming(other) <= threshold
    }
}

impl Default for Genome {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Genome[{} {} {} {}..]", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// One decoded gene, executed once per tick per active cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Codes 0..=63: relative jump by the code itself. Zero falls through to
    /// the default advance of one.
    Jump(u8),
    MoveForward,
    TurnCcw,
    TurnCw,
    EatForward,
    ReproduceForward,
    ReproduceBackward,
    Photosynthesize,
    CheckForward,
    CheckEnergy,
    ConvertMinerals,
    /// Codes above the table do nothing.
    Nop,
}

impl Instruction {
    /// Decode one gene code. Total over all byte values.
    #[must_use]
    pub fn decode(code: u8) -> Self {
        match code {
            0..=63 => Self::Jump(code),
            GENE_MOVE_FORWARD => Self::MoveForward,
            GENE_TURN_CCW => Self::TurnCcw,
            GENE_TURN_CW => Self::TurnCw,
            GENE_EAT_FORWARD => Self::EatForward,
            GENE_REPRODUCE_FORWARD => Self::ReproduceForward,
            GENE_REPRODUCE_BACKWARD => Self::ReproduceBackward,
            GENE_PHOTOSYNTHESIZE => Self::Photosynthesize,
            GENE_CHECK_FORWARD => Self::CheckForward,
            GENE_CHECK_ENERGY => Self::CheckEnergy,
            GENE_CONVERT_MINERALS => Self::ConvertMinerals,
            _ => Self::Nop,
        }
    }
}
