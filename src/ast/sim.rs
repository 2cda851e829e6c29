//! Decoding of raw 16-bit instruction words.
//!
//! This module holds the pure bit-level accessors used to pick apart an
//! instruction word ([`opcode`], [`field`], [`sign_extend`], and the named
//! operand accessors), as well as [`SimInstr`], the fully validated form
//! of an instruction that the simulator executes.
//!
//! ```
//! use minilc3::ast::sim::{self, Opcode, SimInstr};
//! use minilc3::ast::{ImmOrReg, IOffset};
//! use minilc3::ast::reg_consts::R1;
//!
//! // ADD R1, R1, #-1
//! let word = 0x127F;
//! assert_eq!(sim::opcode(word), Opcode::ADD);
//! assert_eq!(sim::imm5(word), -1);
//! assert_eq!(
//!     SimInstr::decode(word).unwrap(),
//!     SimInstr::ADD(R1, R1, ImmOrReg::Imm(IOffset::new_trunc(-1)))
//! );
//! ```

use super::{CondCode, IOffset, ImmOrReg, Reg, TrapVect8, UOffset};
use crate::sim::SimErr;

/// The 4-bit operation tag held in the top bits of every instruction.
///
/// All 16 values are represented, including the ones
/// which are never valid to execute ([`Opcode::RTI`] and [`Opcode::Reserved`]).
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[repr(u8)]
pub enum Opcode {
    #[allow(missing_docs)] BR = 0x0,
    #[allow(missing_docs)] ADD = 0x1,
    #[allow(missing_docs)] LD = 0x2,
    #[allow(missing_docs)] ST = 0x3,
    #[allow(missing_docs)] JSR = 0x4,
    #[allow(missing_docs)] AND = 0x5,
    #[allow(missing_docs)] LDR = 0x6,
    #[allow(missing_docs)] STR = 0x7,
    #[allow(missing_docs)] RTI = 0x8,
    #[allow(missing_docs)] NOT = 0x9,
    #[allow(missing_docs)] LDI = 0xA,
    #[allow(missing_docs)] STI = 0xB,
    #[allow(missing_docs)] JMP = 0xC,
    /// The unused opcode `1101`.
    Reserved = 0xD,
    #[allow(missing_docs)] LEA = 0xE,
    #[allow(missing_docs)] TRAP = 0xF,
}
impl Opcode {
    const ALL: [Opcode; 16] = [
        Opcode::BR,  Opcode::ADD, Opcode::LD,  Opcode::ST,
        Opcode::JSR, Opcode::AND, Opcode::LDR, Opcode::STR,
        Opcode::RTI, Opcode::NOT, Opcode::LDI, Opcode::STI,
        Opcode::JMP, Opcode::Reserved, Opcode::LEA, Opcode::TRAP,
    ];

    /// Gets the opcode from the top 4 bits of the word.
    pub fn from_word(word: u16) -> Self {
        Self::ALL[usize::from(word >> 12)]
    }

    /// The opcode's bits, positioned at the top of an instruction word.
    fn bits(self) -> u16 {
        u16::from(self as u8) << 12
    }
}
impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Opcode::BR  => f.write_str("BR"),
            Opcode::ADD => f.write_str("ADD"),
            Opcode::LD  => f.write_str("LD"),
            Opcode::ST  => f.write_str("ST"),
            Opcode::JSR => f.write_str("JSR/JSRR"),
            Opcode::AND => f.write_str("AND"),
            Opcode::LDR => f.write_str("LDR"),
            Opcode::STR => f.write_str("STR"),
            Opcode::RTI => f.write_str("RTI"),
            Opcode::NOT => f.write_str("NOT"),
            Opcode::LDI => f.write_str("LDI"),
            Opcode::STI => f.write_str("STI"),
            Opcode::JMP => f.write_str("JMP/RET"),
            Opcode::Reserved => f.write_str("reserved"),
            Opcode::LEA  => f.write_str("LEA"),
            Opcode::TRAP => f.write_str("TRAP"),
        }
    }
}

/// Gets the opcode of an instruction word (bits 15-12).
pub fn opcode(word: u16) -> Opcode {
    Opcode::from_word(word)
}

/// Extracts the inclusive bit range `[hi, lo]` of the word, shifted down to bit 0.
///
/// ```
/// # use minilc3::ast::sim::field;
/// assert_eq!(field(0b1010_0000_0000_0000, 15, 12), 0b1010);
/// assert_eq!(field(0xFFFF, 4, 3), 0b11);
/// ```
///
/// # Panics
///
/// Panics if `hi < lo` or `hi > 15`. These indicate a bug in the caller,
/// not a malformed instruction.
pub fn field(word: u16, hi: u32, lo: u32) -> u16 {
    assert!(lo <= hi && hi < 16, "invalid bit range [{hi}:{lo}]");
    let width = hi - lo + 1;
    let mask = u16::MAX >> (16 - width);
    (word >> lo) & mask
}

/// Sign-extends the low `width` bits of `value` (as a two's complement value) to 16 bits.
///
/// ```
/// # use minilc3::ast::sim::sign_extend;
/// assert_eq!(sign_extend(0b11111, 5), -1);
/// assert_eq!(sign_extend(0b01111, 5), 15);
/// assert_eq!(sign_extend(0x100, 9), -256);
/// ```
///
/// # Panics
///
/// Panics if `width` is not between 1 and 16.
pub fn sign_extend(value: u16, width: u32) -> i16 {
    assert!((1..=16).contains(&width), "invalid sign extension width {width}");
    let shift = 16 - width;
    ((value << shift) as i16) >> shift
}

/// The destination (or `ST*` source) register, bits 11-9.
pub fn dr(word: u16) -> Reg {
    Reg::from_bits(field(word, 11, 9))
}
/// The first source (or base) register, bits 8-6.
pub fn sr1(word: u16) -> Reg {
    Reg::from_bits(field(word, 8, 6))
}
/// The second source register, bits 2-0.
pub fn sr2(word: u16) -> Reg {
    Reg::from_bits(field(word, 2, 0))
}
/// The 5-bit immediate of `ADD`, sign-extended.
pub fn imm5(word: u16) -> i16 {
    sign_extend(field(word, 4, 0), 5)
}
/// The 5-bit immediate of `AND`, zero-extended.
///
/// ```
/// # use minilc3::ast::sim::{imm5, uimm5};
/// // AND R0, R0, #x1F
/// assert_eq!(uimm5(0x503F), 0x1F);
/// assert_eq!(imm5(0x503F), -1);
/// ```
pub fn uimm5(word: u16) -> u16 {
    field(word, 4, 0)
}
/// The 6-bit base offset of `LDR`/`STR`, sign-extended.
pub fn offset6(word: u16) -> i16 {
    sign_extend(field(word, 5, 0), 6)
}
/// The 9-bit PC offset, sign-extended.
pub fn pc_offset9(word: u16) -> i16 {
    sign_extend(field(word, 8, 0), 9)
}
/// The 11-bit PC offset of `JSR`, sign-extended.
pub fn pc_offset11(word: u16) -> i16 {
    sign_extend(field(word, 10, 0), 11)
}
/// The 8-bit trap vector of `TRAP`.
pub fn trap_vect8(word: u16) -> u8 {
    field(word, 7, 0) as u8
}

/// A decoded instruction that the simulator can execute.
///
/// Every variant corresponds to one opcode, and holds only the operands
/// that opcode uses. Construction through [`SimInstr::decode`] guarantees
/// that every reserved and padding bit of the source word was valid.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum SimInstr {
    /// `BR[n][z][p] PCoffset9`. The condition mask is never zero.
    BR(CondCode, IOffset<9>),
    /// `ADD DR, SR1, SR2` or `ADD DR, SR1, imm5`.
    ADD(Reg, Reg, ImmOrReg<5>),
    /// `LD DR, PCoffset9`.
    LD(Reg, IOffset<9>),
    /// `ST SR, PCoffset9`.
    ST(Reg, IOffset<9>),
    /// `JSR PCoffset11` (immediate) or `JSRR BaseR` (register).
    JSR(ImmOrReg<11>),
    /// `AND DR, SR1, SR2` or `AND DR, SR1, imm5`. The immediate is zero-extended.
    AND(Reg, Reg, ImmOrReg<5, u16>),
    /// `LDR DR, BaseR, offset6`.
    LDR(Reg, Reg, IOffset<6>),
    /// `STR SR, BaseR, offset6`.
    STR(Reg, Reg, IOffset<6>),
    /// `RTI`.
    RTI,
    /// `NOT DR, SR`.
    NOT(Reg, Reg),
    /// `LDI DR, PCoffset9`.
    LDI(Reg, IOffset<9>),
    /// `STI SR, PCoffset9`.
    STI(Reg, IOffset<9>),
    /// `JMP BaseR` (`RET` when the base register is R7).
    JMP(Reg),
    /// `LEA DR, PCoffset9`.
    LEA(Reg, IOffset<9>),
    /// `TRAP trapvect8`.
    TRAP(TrapVect8),
}

impl SimInstr {
    /// Gets the opcode of this instruction.
    pub fn opcode(&self) -> Opcode {
        match self {
            SimInstr::BR(_, _)     => Opcode::BR,
            SimInstr::ADD(_, _, _) => Opcode::ADD,
            SimInstr::LD(_, _)     => Opcode::LD,
            SimInstr::ST(_, _)     => Opcode::ST,
            SimInstr::JSR(_)       => Opcode::JSR,
            SimInstr::AND(_, _, _) => Opcode::AND,
            SimInstr::LDR(_, _, _) => Opcode::LDR,
            SimInstr::STR(_, _, _) => Opcode::STR,
            SimInstr::RTI          => Opcode::RTI,
            SimInstr::NOT(_, _)    => Opcode::NOT,
            SimInstr::LDI(_, _)    => Opcode::LDI,
            SimInstr::STI(_, _)    => Opcode::STI,
            SimInstr::JMP(_)       => Opcode::JMP,
            SimInstr::LEA(_, _)    => Opcode::LEA,
            SimInstr::TRAP(_)      => Opcode::TRAP,
        }
    }

    /// Decodes a word into an instruction, validating its reserved bits.
    ///
    /// This fails with:
    /// - [`SimErr::InvalidInstrFormat`] if a padding field holds the wrong bits,
    /// - [`SimErr::InvalidCondition`] if a `BR` has an all-zero condition mask,
    /// - [`SimErr::IllegalOpcode`] for the reserved opcode.
    ///
    /// `RTI` decodes successfully; it is the simulator that refuses to execute it.
    pub fn decode(word: u16) -> Result<Self, SimErr> {
        let opcode = Opcode::from_word(word);
        let bad_format = || SimErr::InvalidInstrFormat { opcode, word };

        let instr = match opcode {
            Opcode::BR => {
                let cc = field(word, 11, 9) as CondCode;
                if cc == 0 { return Err(SimErr::InvalidCondition(word)) };
                SimInstr::BR(cc, IOffset::new_trunc(pc_offset9(word)))
            },
            Opcode::ADD | Opcode::AND => {
                let imm_mode = field(word, 5, 5) != 0;
                if !imm_mode && field(word, 4, 3) != 0 { return Err(bad_format()) };

                match (opcode, imm_mode) {
                    (Opcode::ADD, true)  => SimInstr::ADD(dr(word), sr1(word), ImmOrReg::Imm(IOffset::new_trunc(imm5(word)))),
                    (Opcode::ADD, false) => SimInstr::ADD(dr(word), sr1(word), ImmOrReg::Reg(sr2(word))),
                    (_, true)  => SimInstr::AND(dr(word), sr1(word), ImmOrReg::Imm(UOffset::new_trunc(uimm5(word)))),
                    (_, false) => SimInstr::AND(dr(word), sr1(word), ImmOrReg::Reg(sr2(word))),
                }
            },
            Opcode::NOT => {
                if field(word, 5, 0) != 0b111111 { return Err(bad_format()) };
                SimInstr::NOT(dr(word), sr1(word))
            },
            Opcode::LD  => SimInstr::LD(dr(word), IOffset::new_trunc(pc_offset9(word))),
            Opcode::LDI => SimInstr::LDI(dr(word), IOffset::new_trunc(pc_offset9(word))),
            Opcode::LEA => SimInstr::LEA(dr(word), IOffset::new_trunc(pc_offset9(word))),
            Opcode::ST  => SimInstr::ST(dr(word), IOffset::new_trunc(pc_offset9(word))),
            Opcode::STI => SimInstr::STI(dr(word), IOffset::new_trunc(pc_offset9(word))),
            Opcode::LDR => SimInstr::LDR(dr(word), sr1(word), IOffset::new_trunc(offset6(word))),
            Opcode::STR => SimInstr::STR(dr(word), sr1(word), IOffset::new_trunc(offset6(word))),
            Opcode::JMP => {
                if field(word, 11, 9) != 0 || field(word, 5, 0) != 0 { return Err(bad_format()) };
                SimInstr::JMP(sr1(word))
            },
            Opcode::JSR => match field(word, 11, 11) != 0 {
                true => SimInstr::JSR(ImmOrReg::Imm(IOffset::new_trunc(pc_offset11(word)))),
                false => {
                    if field(word, 11, 9) != 0 || field(word, 5, 0) != 0 { return Err(bad_format()) };
                    SimInstr::JSR(ImmOrReg::Reg(sr1(word)))
                }
            },
            Opcode::TRAP => {
                if field(word, 11, 8) != 0 { return Err(bad_format()) };
                SimInstr::TRAP(TrapVect8::new_trunc(u16::from(trap_vect8(word))))
            },
            Opcode::RTI => SimInstr::RTI,
            Opcode::Reserved => return Err(SimErr::IllegalOpcode(word)),
        };

        Ok(instr)
    }

    /// Encodes this instruction back into its word representation.
    ///
    /// All padding bits are written in their required form,
    /// so `SimInstr::decode(instr.encode())` always yields `instr` back.
    pub fn encode(&self) -> u16 {
        fn reg(r: Reg, lo: u32) -> u16 {
            u16::from(r.reg_no()) << lo
        }
        fn off<const N: u32>(o: IOffset<N>) -> u16 {
            (o.get() as u16) & (u16::MAX >> (16 - N))
        }
        fn imm_or_reg(op: ImmOrReg<5>) -> u16 {
            match op {
                ImmOrReg::Imm(i) => 1 << 5 | off(i),
                ImmOrReg::Reg(r) => reg(r, 0),
            }
        }
        fn uimm_or_reg(op: ImmOrReg<5, u16>) -> u16 {
            match op {
                ImmOrReg::Imm(i) => 1 << 5 | (i.get() & 0b11111),
                ImmOrReg::Reg(r) => reg(r, 0),
            }
        }

        let operands = match *self {
            SimInstr::BR(cc, o)       => u16::from(cc & 0b111) << 9 | off(o),
            SimInstr::ADD(d, s, op)   => reg(d, 9) | reg(s, 6) | imm_or_reg(op),
            SimInstr::AND(d, s, op)   => reg(d, 9) | reg(s, 6) | uimm_or_reg(op),
            SimInstr::NOT(d, s)       => reg(d, 9) | reg(s, 6) | 0b111111,
            SimInstr::LD(r, o)        => reg(r, 9) | off(o),
            SimInstr::LDI(r, o)       => reg(r, 9) | off(o),
            SimInstr::LEA(r, o)       => reg(r, 9) | off(o),
            SimInstr::ST(r, o)        => reg(r, 9) | off(o),
            SimInstr::STI(r, o)       => reg(r, 9) | off(o),
            SimInstr::LDR(r, b, o)    => reg(r, 9) | reg(b, 6) | off(o),
            SimInstr::STR(r, b, o)    => reg(r, 9) | reg(b, 6) | off(o),
            SimInstr::JMP(b)          => reg(b, 6),
            SimInstr::JSR(ImmOrReg::Imm(o)) => 1 << 11 | off(o),
            SimInstr::JSR(ImmOrReg::Reg(b)) => reg(b, 6),
            SimInstr::TRAP(v)         => v.get() & 0xFF,
            SimInstr::RTI             => 0,
        };

        self.opcode().bits() | operands
    }
}
impl std::fmt::Display for SimInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimInstr::BR(cc, off) => {
                f.write_str("BR")?;
                if cc & 0b100 != 0 { f.write_str("n")?; };
                if cc & 0b010 != 0 { f.write_str("z")?; };
                if cc & 0b001 != 0 { f.write_str("p")?; };
                write!(f, " {off}")
            },
            SimInstr::ADD(dr, sr1, sr2) => write!(f, "ADD {dr}, {sr1}, {sr2}"),
            SimInstr::AND(dr, sr1, sr2) => write!(f, "AND {dr}, {sr1}, {sr2}"),
            SimInstr::NOT(dr, sr)       => write!(f, "NOT {dr}, {sr}"),
            SimInstr::LD(dr, off)       => write!(f, "LD {dr}, {off}"),
            SimInstr::LDI(dr, off)      => write!(f, "LDI {dr}, {off}"),
            SimInstr::LEA(dr, off)      => write!(f, "LEA {dr}, {off}"),
            SimInstr::ST(sr, off)       => write!(f, "ST {sr}, {off}"),
            SimInstr::STI(sr, off)      => write!(f, "STI {sr}, {off}"),
            SimInstr::LDR(dr, br, off)  => write!(f, "LDR {dr}, {br}, {off}"),
            SimInstr::STR(sr, br, off)  => write!(f, "STR {sr}, {br}, {off}"),
            SimInstr::JMP(br) if br.reg_no() == 7 => f.write_str("RET"),
            SimInstr::JMP(br)           => write!(f, "JMP {br}"),
            SimInstr::JSR(ImmOrReg::Imm(off)) => write!(f, "JSR {off}"),
            SimInstr::JSR(ImmOrReg::Reg(br))  => write!(f, "JSRR {br}"),
            SimInstr::TRAP(vect)        => write!(f, "TRAP x{:02X}", vect.get()),
            SimInstr::RTI               => f.write_str("RTI"),
        }
    }
}
