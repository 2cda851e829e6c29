//! Memory handling for the LC-3 simulator.
//!
//! This module consists of:
//! - [`MemArray`]: The memory.
//! - [`RegFile`]: The register file.
//! - [`MachineInitStrategy`]: How memory and registers are filled before a program is loaded.

use rand::rngs::StdRng;
use rand::Rng;

use crate::ast::Reg;

/// Trait that describes types that can be used to create the initial data for a machine word.
pub trait WordFiller {
    /// Generate the data.
    fn generate(&mut self) -> u16;
}
impl WordFiller for () {
    /// This creates unseeded, non-deterministic values.
    fn generate(&mut self) -> u16 {
        rand::random()
    }
}
impl WordFiller for u16 {
    /// Sets each word to the given value.
    fn generate(&mut self) -> u16 {
        *self
    }
}
impl WordFiller for StdRng {
    /// This creates values from the standard random number generator.
    ///
    /// This can be used to create deterministic, seeded values.
    fn generate(&mut self) -> u16 {
        self.gen()
    }
}

/// Strategy used to initialize the `reg_file` and `mem` of the [`Simulator`].
///
/// The default is a zeroed machine. The random strategies are useful for checking
/// that a program does not depend on memory or registers it never wrote.
///
/// [`Simulator`]: super::Simulator
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MachineInitStrategy {
    /// Initializes each word randomly and non-deterministically.
    Unseeded,

    /// Initializes each word randomly and deterministically.
    Seeded {
        /// The seed the RNG was initialized with.
        seed: u64
    },

    /// Initializes each word to a known value.
    Known {
        /// The value to initialize each value to.
        value: u16
    }
}
impl Default for MachineInitStrategy {
    fn default() -> Self {
        MachineInitStrategy::Known { value: 0 }
    }
}

impl MachineInitStrategy {
    pub(super) fn generator(&self) -> impl WordFiller {
        use rand::SeedableRng;

        match self {
            MachineInitStrategy::Unseeded => WCGenerator::Unseeded,
            MachineInitStrategy::Seeded { seed } => WCGenerator::Seeded(Box::new(StdRng::seed_from_u64(*seed))),
            MachineInitStrategy::Known { value } => WCGenerator::Known(*value),
        }
    }
}

enum WCGenerator {
    Unseeded,
    Seeded(Box<StdRng>),
    Known(u16)
}
impl WordFiller for WCGenerator {
    fn generate(&mut self) -> u16 {
        match self {
            WCGenerator::Unseeded  => ().generate(),
            WCGenerator::Seeded(r) => r.generate(),
            WCGenerator::Known(k)  => k.generate(),
        }
    }
}

const N: usize = 1 << 16;

/// Memory.
///
/// This is a flat array of 65,536 words which holds both code and data.
/// It can be indexed with any `u16` (16-bit address), so every address
/// computed with wrapping arithmetic is in bounds.
///
/// ```
/// use minilc3::sim::mem::MemArray;
///
/// let mut mem = MemArray::new(&mut 0u16);
/// mem[0x3000] = 11;
/// assert_eq!(mem[0x3000], 11);
/// ```
#[derive(Debug)]
pub struct MemArray(Box<[u16; N]>);
impl MemArray {
    /// Creates a new memory with a provided word creation strategy.
    pub fn new(filler: &mut impl WordFiller) -> Self {
        Self(std::iter::repeat_with(|| filler.generate())
            .take(N)
            .collect::<Box<_>>()
            .try_into()
            .unwrap_or_else(|_| unreachable!("iterator should have had {N} elements"))
        )
    }

    /// Copies a contiguous block of words into memory, starting at `start`.
    ///
    /// The block must fit before the end of the address space.
    pub fn copy_block(&mut self, start: u16, data: &[u16]) {
        let si = usize::from(start);
        self.0[si..si + data.len()].copy_from_slice(data);
    }

    /// Gets a reference to the backing slice of this memory.
    pub fn as_slice(&self) -> &[u16] {
        &*self.0
    }
}
impl std::ops::Index<u16> for MemArray {
    type Output = u16;

    fn index(&self, index: u16) -> &Self::Output {
        &self.0[usize::from(index)]
    }
}
impl std::ops::IndexMut<u16> for MemArray {
    fn index_mut(&mut self, index: u16) -> &mut Self::Output {
        &mut self.0[usize::from(index)]
    }
}

/// The register file.
///
/// This struct can be indexed with a [`Reg`]
/// (which can be constructed using the [`crate::ast::reg_consts`] module).
///
/// # Example
///
/// ```
/// use minilc3::sim::mem::RegFile;
/// use minilc3::ast::reg_consts::R0;
///
/// let mut reg = RegFile::new(&mut 0u16);
/// reg[R0] = 11;
/// assert_eq!(reg[R0], 11);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegFile([u16; 8]);
impl RegFile {
    /// Creates a register file filled by the given strategy.
    pub fn new(filler: &mut impl WordFiller) -> Self {
        Self(std::array::from_fn(|_| filler.generate()))
    }
}
impl std::ops::Index<Reg> for RegFile {
    type Output = u16;

    fn index(&self, index: Reg) -> &Self::Output {
        &self.0[usize::from(index)]
    }
}
impl std::ops::IndexMut<Reg> for RegFile {
    fn index_mut(&mut self, index: Reg) -> &mut Self::Output {
        &mut self.0[usize::from(index)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::reg_consts::{R0, R7};

    #[test]
    fn test_known_fill() {
        let mut fill = MachineInitStrategy::default().generator();
        let mem = MemArray::new(&mut fill);
        assert!(mem.as_slice().iter().all(|&w| w == 0));
        assert_eq!(mem.as_slice().len(), 1 << 16);

        let mut fill = MachineInitStrategy::Known { value: 0xBEEF }.generator();
        let reg = RegFile::new(&mut fill);
        assert_eq!(reg[R0], 0xBEEF);
        assert_eq!(reg[R7], 0xBEEF);
    }

    #[test]
    fn test_seeded_fill_is_deterministic() {
        let strat = MachineInitStrategy::Seeded { seed: 2110 };
        let a = RegFile::new(&mut strat.generator());
        let b = RegFile::new(&mut strat.generator());
        assert_eq!(a, b);
    }

    #[test]
    fn test_copy_block_to_end() {
        let mut mem = MemArray::new(&mut 0u16);
        mem.copy_block(0xFFFE, &[1, 2]);
        assert_eq!(mem[0xFFFE], 1);
        assert_eq!(mem[0xFFFF], 2);
        assert_eq!(mem[0x0000], 0);
    }
}
