//! Components used to represent decoded LC-3 instructions.
//!
//! These are the operand building blocks of [`sim::SimInstr`]
//! (a data structure holding a single decoded bytecode instruction).

pub mod sim;

use std::fmt::Write as _;
use offset_base::OffsetBacking;

/// A register. Must be between 0 and 7.
///
/// This `Reg` struct is constructed by selecting a register from [`reg_consts`],
/// or by decoding it out of an instruction word.
///
/// ## Examples
///
/// ```text
/// AND R0, R0, #0
///     ~~  ~~
/// ADD R1, R1, R0
///     ~~  ~~  ~~
/// LD R2, VALUE
///    ~~
/// NOT R1, R2
///     ~~  ~~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Reg(pub(crate) u8);

/// Register constants!
pub mod reg_consts {
    use super::Reg;

    /// The 0th register in the register file.
    pub const R0: Reg = Reg(0);
    /// The 1st register in the register file.
    pub const R1: Reg = Reg(1);
    /// The 2nd register in the register file.
    pub const R2: Reg = Reg(2);
    /// The 3rd register in the register file.
    pub const R3: Reg = Reg(3);
    /// The 4th register in the register file.
    pub const R4: Reg = Reg(4);
    /// The 5th register in the register file.
    pub const R5: Reg = Reg(5);
    /// The 6th register in the register file.
    pub const R6: Reg = Reg(6);
    /// The 7th register in the register file (the link register for `JSR`/`JSRR`).
    pub const R7: Reg = Reg(7);
}
impl Reg {
    /// Gets the register number of this [`Reg`]. This is always between 0 and 7.
    pub fn reg_no(self) -> u8 {
        self.0
    }

    /// Creates a register from the low 3 bits of a value, discarding the rest.
    pub(crate) fn from_bits(bits: u16) -> Self {
        Reg((bits & 0b111) as u8)
    }
}
impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}", self.0)
    }
}
impl From<Reg> for usize {
    // Used for indexing the reg file in [`crate::sim::mem::RegFile`].
    fn from(value: Reg) -> Self {
        usize::from(value.0)
    }
}

/// A condition code mask (used for `BR`), must be between 0 and 7.
///
/// The condition codes are listed below:
///
/// | instruction   | code (bin) |
/// |---------------|------------|
/// | (invalid)     | `000`      |
/// | `BRn`         | `100`      |
/// | `BRz`         | `010`      |
/// | `BRnz`        | `110`      |
/// | `BRp`         | `001`      |
/// | `BRnp`        | `101`      |
/// | `BRzp`        | `011`      |
/// | `BR`, `BRnzp` | `111`      |
///
/// An all-zero mask is rejected when decoding (see [`crate::sim::SimErr::InvalidCondition`]).
pub type CondCode = u8;

/// A value representing a signed offset or a signed immediate value.
///
/// `N` indicates the maximum bit size of this offset/immediate value.
///
/// ## Examples
///
/// `IOffset<5>` is used to represent `ADD`'s imm5 operand,
/// `IOffset<6>` is `LDR`/`STR`'s base offset,
/// `IOffset<9>` is the PC offset of `BR`, `LD`, `LDI`, `LEA`, `ST`, and `STI`,
/// and `IOffset<11>` is `JSR`'s PC offset.
pub type IOffset<const N: u32> = Offset<i16, N>;
/// A value representing an unsigned (zero-extended) immediate value.
///
/// `UOffset<5>` is used to represent `AND`'s imm5 operand.
pub type UOffset<const N: u32> = Offset<u16, N>;
/// An unsigned 8-bit trap vector (used for `TRAP`).
///
/// ## Examples
///
/// ```text
/// TRAP x25
///      ~~~
/// ```
pub type TrapVect8 = Offset<u16, 8>;

/// A value representing either an immediate value or a register.
///
/// This is used to handle cases where an operand can be either
/// an immediate value or a register (e.g., in `AND` or `ADD`,
/// or the offset/base register in `JSR`/`JSRR`).
///
/// The immediate is signed by default. `AND` uses an unsigned one
/// (`ImmOrReg<5, u16>`), as its imm5 is zero-extended.
///
/// ## Examples
/// ```text
/// AND R0, R0, #0
/// AND R1, R1, R1
/// ADD R2, R2, #2
/// ADD R3, R3, R3
///             ^^
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ImmOrReg<const N: u32, OFF = i16> {
    #[allow(missing_docs)]
    Imm(Offset<OFF, N>),
    #[allow(missing_docs)]
    Reg(Reg)
}
impl<const N: u32, OFF: std::fmt::Display> std::fmt::Display for ImmOrReg<N, OFF> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImmOrReg::Imm(imm) => imm.fmt(f),
            ImmOrReg::Reg(reg) => reg.fmt(f),
        }
    }
}

/// A value representing an offset or an immediate value.
///
/// The `OFF` type represents the backing type of this offset.
/// The signedness of this offset type is dependent on the signedness of the `OFF` type:
/// - `Offset<i16, _>`: signed offset (also aliased as [`IOffset`])
/// - `Offset<u16, _>`: unsigned offset
///
/// `N` indicates the maximum bit size of this offset/immediate value.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Offset<OFF, const N: u32>(OFF);

impl<OFF: std::fmt::Display, const N: u32> std::fmt::Display for Offset<OFF, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_char('#')?;
        self.0.fmt(f)
    }
}

mod offset_base {
    /// Any type that could store a value for [`Offset`].
    ///
    /// [`Offset`]: super::Offset
    pub trait OffsetBacking: Copy + Eq {
        /// How many bits are contained within this backing.
        const BITS: u32;

        /// Truncates the given value to the provided `bit_size`,
        /// extending it back out according to the signedness of the backing.
        fn truncate(self, bit_size: u32) -> Self;
    }

    macro_rules! impl_offset_backing_for_ints {
        ($($Int:ty),*) => {
            $(
                impl OffsetBacking for $Int {
                    const BITS: u32 = Self::BITS;

                    fn truncate(self, bit_size: u32) -> Self {
                        (self << (Self::BITS - bit_size)) >> (Self::BITS - bit_size)
                    }
                }
            )*
        }
    }
    impl_offset_backing_for_ints! { u16, i16 }
}

impl<OFF: OffsetBacking, const N: u32> Offset<OFF, N> {
    /// Creates a new offset by extending the first N bits of the integer,
    /// and discarding the rest.
    ///
    /// The extension is considered sign-extended if the offset's backing is signed,
    /// and zero-extended if the offset's backing is unsigned.
    ///
    /// # Examples
    ///
    /// ```
    /// # use minilc3::ast::Offset;
    /// #
    /// assert_eq!(Offset::<i16, 5>::new_trunc(-5).get(), -5);  // 0b11011
    /// assert_eq!(Offset::<i16, 5>::new_trunc(16).get(), -16); // 0b10000
    /// assert_eq!(Offset::<u16, 5>::new_trunc(32).get(), 0);   // 0b00000
    /// ```
    ///
    /// # Panics
    ///
    /// This will panic if `N` is larger than the offset backing (e.g., for backing `u16`, larger than 16).
    pub fn new_trunc(n: OFF) -> Self {
        assert!(N <= OFF::BITS, "bit size {N} exceeds size of backing ({})", OFF::BITS);
        Self(n.truncate(N))
    }

    /// Gets the value of the offset.
    pub fn get(&self) -> OFF {
        self.0
    }
}
