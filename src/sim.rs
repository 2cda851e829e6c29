//! Simulating and execution for LC-3 program images.
//!
//! This module is focused on executing loaded program images (i.e., [`Image`]).
//!
//! This module consists of:
//! - [`Simulator`]: The struct that simulates loaded code.
//! - [`mem`]: The module handling memory and the register file.
//! - [`io`]: The module handling the console the trap routines talk to.
//! - [`trap`]: The module handling the trap routines.
//!
//! # Usage
//!
//! To simulate some code, you need to instantiate a Simulator and load an image to it:
//!
//! ```
//! use minilc3::image::Image;
//! use minilc3::sim::Simulator;
//!
//! // .orig x3000
//! // HALT
//! let image = Image::from_bytes(&[0x30, 0x00, 0xF0, 0x25]).unwrap();
//!
//! let mut simulator = Simulator::new(Default::default());
//! simulator.load_image(&image);
//! simulator.run().unwrap();
//! assert!(simulator.hit_halt());
//! ```
//!
//! ## Flags
//!
//! Here, we define `simulator` to have the default flags.
//! We could also configure the simulator by editing the flags. For example,
//! if we wish to fill memory with random garbage before loading:
//!
//! ```
//! # use minilc3::sim::{Simulator, SimFlags};
//! use minilc3::sim::mem::MachineInitStrategy;
//!
//! let mut simulator = Simulator::new(SimFlags {
//!     machine_init: MachineInitStrategy::Seeded { seed: 2110 },
//!     ..Default::default()
//! });
//! ```
//!
//! All of the available flags can be found in [`SimFlags`].
//!
//! ## Execution
//!
//! Beyond the basic [`Simulator::run`] (which runs until halting),
//! there are also:
//! - [`Simulator::step_in`]: manual step-by-step simulation
//! - [`Simulator::run_while`], [`Simulator::run_with_limit`]: more advanced programmatic execution
//!
//! ```
//! use minilc3::image::Image;
//! use minilc3::sim::Simulator;
//! use minilc3::ast::reg_consts::R0;
//!
//! // .orig x3000
//! // AND R0, R0, #0
//! // ADD R0, R0, #1
//! // ADD R0, R0, #1
//! // ADD R0, R0, #1
//! // HALT
//! let image = Image::new(0x3000, vec![0x5020, 0x1021, 0x1021, 0x1021, 0xF025]).unwrap();
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.load_image(&image);
//!
//! // Running step by step:
//! sim.step_in().unwrap();
//! assert_eq!(sim.reg_file[R0], 0);
//! sim.step_in().unwrap();
//! assert_eq!(sim.reg_file[R0], 1);
//! sim.step_in().unwrap();
//! assert_eq!(sim.reg_file[R0], 2);
//! sim.step_in().unwrap();
//! assert_eq!(sim.reg_file[R0], 3);
//! assert!(sim.cc().is_p());
//! ```
//!
//! ## Querying State
//!
//! You can query (or set) a variety of different state values from the simulator.
//!
//! - If you wish to access the PC, it can simply be done through the `sim.pc` field.
//! - If you wish to access the condition code, the [`Simulator::cc`] method is present to query it.
//! - If you wish to access the register file, you can access it through the `sim.reg_file` field.
//! - If you wish to access the memory, you can access it through the `sim.mem` field.
//!
//! ```
//! use minilc3::sim::Simulator;
//! use minilc3::ast::reg_consts::R0;
//!
//! let mut sim = Simulator::new(Default::default());
//!
//! sim.reg_file[R0] = 0x1234;
//! assert_eq!(sim.reg_file[R0], 0x1234);
//! sim.mem[0x3000] = 0x5678;
//! assert_eq!(sim.mem[0x3000], 0x5678);
//! ```

pub mod mem;
pub mod io;
pub mod trap;

use crate::ast::reg_consts::R7;
use crate::ast::sim::{Opcode, SimInstr};
use crate::ast::ImmOrReg;
use crate::image::Image;

use self::io::SimIO;
use self::mem::{MachineInitStrategy, MemArray, RegFile};

/// Errors that can occur during simulation.
///
/// All of these are fatal. Execution stops at the offending instruction
/// (see [`Simulator::prefetch_pc`]).
#[derive(Debug, thiserror::Error)]
pub enum SimErr {
    /// Word was decoded, and the opcode is recognized,
    /// but one of the instruction's fixed bit fields is invalid.
    #[error("invalid padding for {opcode} (x{word:04X})")]
    InvalidInstrFormat {
        /// The opcode of the instruction.
        opcode: Opcode,
        /// The instruction word.
        word: u16
    },
    /// A `BR` instruction had none of its condition bits set.
    #[error("invalid condition for BR[nzp] (x{0:04X})")]
    InvalidCondition(u16),
    /// `RTI` was executed. The simulator has no supervisor mode, so this always fails.
    #[error("cannot use RTI in non-supervisor mode")]
    PrivilegeViolation,
    /// The reserved opcode was executed.
    #[error("cannot use reserved instruction (x{0:04X})")]
    IllegalOpcode(u16),
    /// A `TRAP` was executed with a vector that has no routine.
    #[error("invalid TRAP vector x{0:02X}")]
    InvalidTrapVect(u8),
    /// A trap routine needed a character, but console input is closed.
    #[error("console input closed while waiting for a character")]
    InputClosed,
    /// The console failed.
    #[error("console I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that can cause a step to abruptly fail to finish.
enum StepBreak {
    /// A HALT was executed.
    Halt,
    /// A simulation error occurred.
    Err(SimErr),
}
impl From<SimErr> for StepBreak {
    fn from(value: SimErr) -> Self {
        Self::Err(value)
    }
}

/// Configuration flags for [`Simulator`].
///
/// These can be modified after the `Simulator` is created with [`Simulator::new`]
/// and their effects should still apply.
///
/// Read the field descriptions for more details.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SimFlags {
    /// The creation strategy for the memory and register file,
    /// applied when the simulator is created or reset.
    ///
    /// By default, this is [`MachineInitStrategy::Known`] with a value of 0.
    pub machine_init: MachineInitStrategy,

    /// The prompt the `IN` trap prints before reading a character.
    ///
    /// By default, this is `"Input> "`.
    pub in_prompt: &'static str,
}
impl Default for SimFlags {
    fn default() -> Self {
        Self {
            machine_init: Default::default(),
            in_prompt: "Input> ",
        }
    }
}

/// Executes assembled code.
#[derive(Debug)]
pub struct Simulator {
    // ------------------ SIMULATION STATE ------------------
    // Calling [`Simulator::reset`] resets these values.

    /// The simulator's memory.
    ///
    /// Note that this is held in the heap, as it is too large for the stack.
    pub mem: MemArray,

    /// The simulator's register file.
    pub reg_file: RegFile,

    /// The program counter.
    pub pc: u16,

    /// The condition code, set by the result of the last instruction that writes one.
    cc: ConditionCode,

    /// The number of instructions successfully run since this `Simulator` was initialized.
    ///
    /// This can be set to 0 to reset the counter.
    pub instructions_run: u64,

    /// Indicates whether the PC has been incremented in the fetch stage yet.
    ///
    /// This is just for error handling purposes. It's used to compute
    /// the PC of the instruction that caused an error. See [`Simulator::prefetch_pc`].
    prefetch: bool,

    /// Whether the last execution of the simulator ended by halting.
    halted: bool,

    /// Whether the last character a trap routine wrote was a newline
    /// (or no character has been written yet).
    on_new_line: bool,

    // ------------------ CONFIG/DEBUG STATE ------------------
    // Calling [`Simulator::reset`] does not reset these values.

    /// Configuration settings for the simulator.
    ///
    /// These are preserved between resets.
    ///
    /// See [`SimFlags`] for more details on what configuration
    /// settings are available.
    pub flags: SimFlags,

    /// The console the trap routines read from and write to.
    io: SimIO,
}

impl Simulator {
    /// Creates a new simulator with the provided flags, without a loaded image.
    ///
    /// Memory and registers are filled according to [`SimFlags::machine_init`],
    /// and no console is attached (see [`Simulator::open_io`]).
    pub fn new(flags: SimFlags) -> Self {
        let mut filler = flags.machine_init.generator();

        Self {
            mem: MemArray::new(&mut filler),
            reg_file: RegFile::new(&mut filler),
            pc: 0x3000,
            cc: ConditionCode::new(),
            instructions_run: 0,
            prefetch: false,
            halted: false,
            on_new_line: true,

            flags,
            io: SimIO::Empty,
        }
    }

    /// Resets the simulator.
    ///
    /// This resets the state of the `Simulator` back to before any execution calls,
    /// while preserving configuration and the attached console.
    pub fn reset(&mut self) {
        let flags = self.flags;
        let io = std::mem::take(&mut self.io);

        *self = Self::new(flags);
        self.io = io;
    }

    /// Loads an image into this simulator, resetting it first.
    ///
    /// After loading, the PC points to the image's origin.
    pub fn load_image(&mut self, image: &Image) {
        self.reset();

        self.mem.copy_block(image.origin(), image.words());
        self.pc = image.origin();
        log::debug!("loaded {} words at x{:04X}", image.words().len(), image.origin());
    }

    /// Sets and initializes the console the trap routines use.
    pub fn open_io<IO: Into<SimIO>>(&mut self, io: IO) {
        self.io = io.into();
    }

    /// Gets a reference to the condition code.
    pub fn cc(&self) -> &ConditionCode {
        &self.cc
    }

    /// Sets the condition codes using the provided result.
    fn set_cc(&mut self, result: u16) {
        match (result as i16).cmp(&0) {
            std::cmp::Ordering::Less    => self.cc.set_cc_n(),
            std::cmp::Ordering::Equal   => self.cc.set_cc_z(),
            std::cmp::Ordering::Greater => self.cc.set_cc_p(),
        }
    }

    /// Gets the value of the prefetch PC.
    ///
    /// This function is useful as it returns the location of the currently
    /// executing instruction in memory.
    pub fn prefetch_pc(&self) -> u16 {
        self.pc.wrapping_sub(u16::from(!self.prefetch))
    }

    /// Indicates whether the last execution of the simulator resulted in a HALT successfully occurring.
    pub fn hit_halt(&self) -> bool {
        self.halted
    }

    /// Runs until the tripwire condition returns false (or the program halts or fails).
    pub fn run_while(&mut self, mut tripwire: impl FnMut(&mut Simulator) -> bool) -> Result<(), SimErr> {
        self.halted = false;

        loop {
            if !tripwire(self) {
                break Ok(());
            }

            match self.step() {
                Ok(()) => {},
                Err(StepBreak::Halt) => {
                    self.halted = true;
                    log::debug!("halted at x{:04X} after {} instructions", self.pc, self.instructions_run);
                    break Ok(());
                },
                Err(StepBreak::Err(e)) => break Err(e),
            }
        }
    }

    /// Execute the program.
    ///
    /// This blocks until the program ends.
    /// If you would like to limit the maximum number of steps to execute, consider [`Simulator::run_with_limit`].
    pub fn run(&mut self) -> Result<(), SimErr> {
        self.run_while(|_| true)
    }

    /// Execute the program with a limit on how many steps to execute.
    ///
    /// This blocks until the program ends or until the number of steps to execute has been hit.
    pub fn run_with_limit(&mut self, max_steps: u64) -> Result<(), SimErr> {
        let i = self.instructions_run;
        self.run_while(|sim| sim.instructions_run.wrapping_sub(i) < max_steps)
    }

    /// Simulate one step, executing one instruction.
    ///
    /// This function can return [`StepBreak::Halt`] as an error,
    /// whereas [`Simulator::step_in`] will ignore that error.
    fn step(&mut self) -> Result<(), StepBreak> {
        self.prefetch = true;

        let word = self.mem[self.pc];
        let instr = SimInstr::decode(word)?;
        log::trace!("x{:04X}: {instr}", self.pc);

        self.pc = self.pc.wrapping_add(1);
        self.prefetch = false;

        match instr {
            SimInstr::BR(cc, off) => {
                if cc & self.cc.cc() != 0 {
                    self.pc = self.pc.wrapping_add_signed(off.get());
                }
            },
            SimInstr::ADD(dr, sr1, sr2) => {
                let val1 = self.reg_file[sr1];
                let val2 = match sr2 {
                    ImmOrReg::Imm(i2) => i2.get() as u16,
                    ImmOrReg::Reg(r2) => self.reg_file[r2],
                };

                let result = val1.wrapping_add(val2);
                self.reg_file[dr] = result;
                self.set_cc(result);
            },
            SimInstr::LD(dr, off) => {
                let ea = self.pc.wrapping_add_signed(off.get());

                let val = self.mem[ea];
                self.reg_file[dr] = val;
                self.set_cc(val);
            },
            SimInstr::ST(sr, off) => {
                let ea = self.pc.wrapping_add_signed(off.get());
                self.mem[ea] = self.reg_file[sr];
            },
            SimInstr::JSR(op) => {
                // R7 is written before BaseR is read, so JSRR R7 continues at the next instruction.
                self.reg_file[R7] = self.pc;
                self.pc = match op {
                    ImmOrReg::Imm(off) => self.pc.wrapping_add_signed(off.get()),
                    ImmOrReg::Reg(br)  => self.reg_file[br],
                };
            },
            SimInstr::AND(dr, sr1, sr2) => {
                let val1 = self.reg_file[sr1];
                let val2 = match sr2 {
                    ImmOrReg::Imm(i2) => i2.get(),
                    ImmOrReg::Reg(r2) => self.reg_file[r2],
                };

                let result = val1 & val2;
                self.reg_file[dr] = result;
                self.set_cc(result);
            },
            SimInstr::LDR(dr, br, off) => {
                let ea = self.reg_file[br].wrapping_add_signed(off.get());

                let val = self.mem[ea];
                self.reg_file[dr] = val;
                self.set_cc(val);
            },
            SimInstr::STR(sr, br, off) => {
                let ea = self.reg_file[br].wrapping_add_signed(off.get());
                self.mem[ea] = self.reg_file[sr];
            },
            SimInstr::RTI => return Err(SimErr::PrivilegeViolation.into()),
            SimInstr::NOT(dr, sr) => {
                let result = !self.reg_file[sr];
                self.reg_file[dr] = result;
                self.set_cc(result);
            },
            SimInstr::LDI(dr, off) => {
                let shifted_pc = self.pc.wrapping_add_signed(off.get());
                let ea = self.mem[shifted_pc];

                let val = self.mem[ea];
                self.reg_file[dr] = val;
                self.set_cc(val);
            },
            SimInstr::STI(sr, off) => {
                let shifted_pc = self.pc.wrapping_add_signed(off.get());
                let ea = self.mem[shifted_pc];
                self.mem[ea] = self.reg_file[sr];
            },
            SimInstr::JMP(br) => {
                self.pc = self.reg_file[br];
            },
            SimInstr::LEA(dr, off) => {
                // LEA does not touch the condition code.
                self.reg_file[dr] = self.pc.wrapping_add_signed(off.get());
            },
            SimInstr::TRAP(vect) => {
                self.handle_trap(vect)?;
            },
        }

        self.instructions_run = self.instructions_run.wrapping_add(1);
        Ok(())
    }

    /// Simulate one step, executing one instruction.
    ///
    /// Stepping onto a `HALT` is not an error. [`Simulator::hit_halt`] reports whether it happened.
    pub fn step_in(&mut self) -> Result<(), SimErr> {
        self.halted = false;
        match self.step() {
            Ok(()) => Ok(()),
            Err(StepBreak::Halt) => {
                self.halted = true;
                Ok(())
            },
            Err(StepBreak::Err(e)) => Err(e)
        }
    }
}
impl Default for Simulator {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

/// The condition code register.
///
/// Exactly one of its three flags is ever set:
///
/// ```text
/// n z p
/// 1 0 0   negative  (0x4)
/// 0 1 0   zero      (0x2)
/// 0 0 1   positive  (0x1)
/// ```
///
/// Each of these are exposed as the [`ConditionCode::is_n`], [`ConditionCode::is_z`], and [`ConditionCode::is_p`] values.
#[derive(PartialEq, Eq, Clone, Copy)]
#[repr(transparent)]
pub struct ConditionCode(u8);

impl ConditionCode {
    /// Creates a condition code with the `z` flag set.
    pub fn new() -> Self {
        ConditionCode(0b010)
    }

    /// Gets the bit-representation of the condition code.
    pub fn cc(&self) -> u8 {
        self.0
    }
    /// Checks the condition code is `n`.
    pub fn is_n(&self) -> bool {
        self.0 & 0b100 != 0
    }
    /// Checks the condition code is `z`.
    pub fn is_z(&self) -> bool {
        self.0 & 0b010 != 0
    }
    /// Checks the condition code is `p`.
    pub fn is_p(&self) -> bool {
        self.0 & 0b001 != 0
    }

    /// Sets the condition code.
    ///
    /// Anything other than exactly one flag is treated as `z`.
    pub fn set_cc(&mut self, mut cc: u8) {
        // Guard from invalid CC.
        cc &= 0b111;
        if cc.count_ones() != 1 { cc = 0b010 };
        self.0 = cc;
    }
    /// Sets the condition code to `n`.
    pub fn set_cc_n(&mut self) {
        self.set_cc(0b100)
    }
    /// Sets the condition code to `z`.
    pub fn set_cc_z(&mut self) {
        self.set_cc(0b010)
    }
    /// Sets the condition code to `p`.
    pub fn set_cc_p(&mut self) {
        self.set_cc(0b001)
    }
}
impl Default for ConditionCode {
    fn default() -> Self {
        Self::new()
    }
}
impl std::fmt::Debug for ConditionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use std::fmt::Write;

        f.write_str("ConditionCode(")?;
        if self.is_n() { f.write_char('N')?; };
        if self.is_z() { f.write_char('Z')?; };
        if self.is_p() { f.write_char('P')?; };
        f.write_char(')')
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::ast::reg_consts::{R0, R1, R2, R3, R4, R5, R6, R7};
    use crate::ast::sim::SimInstr;
    use crate::ast::{IOffset, ImmOrReg, TrapVect8, UOffset};
    use crate::image::Image;
    use crate::sim::io::BufferedIO;

    use super::*;

    const HALT: u16 = 0xF025;

    fn load(program: &[u16]) -> Simulator {
        let image = Image::new(0x3000, program.to_vec()).unwrap();
        let mut sim = Simulator::new(Default::default());
        sim.load_image(&image);
        sim
    }

    fn imm5(n: i16) -> ImmOrReg<5> {
        ImmOrReg::Imm(IOffset::new_trunc(n))
    }
    fn uimm5(n: u16) -> ImmOrReg<5, u16> {
        ImmOrReg::Imm(UOffset::new_trunc(n))
    }

    #[test]
    fn test_halt_image() {
        let image = Image::from_bytes(&[0x30, 0x00, 0xF0, 0x25]).unwrap();
        let io = BufferedIO::new();

        let mut sim = Simulator::new(Default::default());
        sim.open_io(io.clone());
        sim.load_image(&image);
        sim.run().unwrap();

        assert!(sim.hit_halt());
        assert_eq!(sim.instructions_run, 0);
        assert!(io.get_output().read().unwrap().is_empty());
    }

    #[test]
    fn test_lea_puts_hi() {
        let program = [
            SimInstr::LEA(R0, IOffset::new_trunc(2)).encode(), // x3000
            SimInstr::TRAP(TrapVect8::new_trunc(0x22)).encode(),
            HALT,
            0x0068, // 'h'
            0x0069, // 'i'
            0x0000,
        ];
        let io = BufferedIO::new();
        let mut sim = load(&program);
        sim.open_io(io.clone());
        sim.run().unwrap();

        assert!(sim.hit_halt());
        assert_eq!(sim.reg_file[R0], 0x3003);
        assert_eq!(&*io.get_output().read().unwrap(), b"hi");
    }

    #[test]
    fn test_initial_state() {
        let sim = load(&[HALT]);
        assert_eq!(sim.pc, 0x3000);
        assert!(sim.cc().is_z());
        for r in [R0, R1, R2, R3, R4, R5, R6, R7] {
            assert_eq!(sim.reg_file[r], 0);
        }
    }

    #[test]
    fn test_add_padding_does_not_mutate() {
        // ADD R1, R1, R2 with bit 3 set
        let mut sim = load(&[0b0001_001_001_001_010, HALT]);
        sim.reg_file[R1] = 5;
        sim.reg_file[R2] = 7;

        let err = sim.run().unwrap_err();
        assert!(matches!(err, SimErr::InvalidInstrFormat { opcode: Opcode::ADD, word: 0x124A }));
        assert_eq!(sim.reg_file[R1], 5);
        assert_eq!(sim.reg_file[R2], 7);
        assert!(sim.cc().is_z());
        assert_eq!(sim.prefetch_pc(), 0x3000);
        assert!(!sim.hit_halt());
    }

    #[test]
    fn test_trap_99() {
        let mut sim = load(&[0xF099]);
        assert!(matches!(sim.run(), Err(SimErr::InvalidTrapVect(0x99))));
        assert_eq!(sim.prefetch_pc(), 0x3000);
    }

    #[test]
    fn test_rti_and_reserved() {
        let mut sim = load(&[0x8000]);
        assert!(matches!(sim.run(), Err(SimErr::PrivilegeViolation)));
        assert_eq!(sim.prefetch_pc(), 0x3000);

        let mut sim = load(&[0xD123]);
        assert!(matches!(sim.run(), Err(SimErr::IllegalOpcode(0xD123))));

        let mut sim = load(&[0x0000]);
        assert!(matches!(sim.run(), Err(SimErr::InvalidCondition(0x0000))));
    }

    #[test]
    fn test_cc_matches_result() {
        let mut rng = StdRng::seed_from_u64(0x25);
        let mut sim = load(&[
            SimInstr::ADD(R2, R0, ImmOrReg::Reg(R1)).encode(),
            SimInstr::AND(R3, R0, ImmOrReg::Reg(R1)).encode(),
            SimInstr::NOT(R4, R0).encode(),
            HALT,
        ]);

        for _ in 0..1024 {
            let (a, b): (u16, u16) = (rng.gen(), rng.gen());
            sim.pc = 0x3000;
            sim.reg_file[R0] = a;
            sim.reg_file[R1] = b;

            for dr in [R2, R3, R4] {
                sim.step_in().unwrap();

                let result = sim.reg_file[dr] as i16;
                let cc = sim.cc();
                assert_eq!(cc.cc().count_ones(), 1);
                assert_eq!(cc.is_n(), result < 0, "{dr} = {result}");
                assert_eq!(cc.is_z(), result == 0, "{dr} = {result}");
                assert_eq!(cc.is_p(), result > 0, "{dr} = {result}");
            }
            assert_eq!(sim.reg_file[R2], a.wrapping_add(b));
            assert_eq!(sim.reg_file[R3], a & b);
            assert_eq!(sim.reg_file[R4], !a);
        }
    }

    #[test]
    fn test_add_wraps() {
        let mut sim = load(&[SimInstr::ADD(R0, R0, imm5(1)).encode(), HALT]);
        sim.reg_file[R0] = 0xFFFF;
        sim.run().unwrap();
        assert_eq!(sim.reg_file[R0], 0);
        assert!(sim.cc().is_z());

        let mut sim = load(&[SimInstr::ADD(R0, R0, imm5(1)).encode(), HALT]);
        sim.reg_file[R0] = 0x7FFF;
        sim.run().unwrap();
        assert_eq!(sim.reg_file[R0], 0x8000);
        assert!(sim.cc().is_n());
    }

    #[test]
    fn test_lea_keeps_cc() {
        let mut sim = load(&[
            SimInstr::ADD(R0, R0, imm5(-1)).encode(),
            SimInstr::LEA(R1, IOffset::new_trunc(-2)).encode(),
            HALT,
        ]);
        sim.run().unwrap();
        assert_eq!(sim.reg_file[R1], 0x3000);
        assert!(sim.cc().is_n());
    }

    #[test]
    fn test_loads_and_stores() {
        let mut sim = load(&[
            SimInstr::LD(R0, IOffset::new_trunc(6)).encode(),   // x3000: R0 = x8000
            SimInstr::LDI(R1, IOffset::new_trunc(6)).encode(),  // x3001: R1 = mem[x4000]
            SimInstr::STI(R0, IOffset::new_trunc(5)).encode(),  // x3002: mem[x4000] = R0
            SimInstr::LEA(R2, IOffset::new_trunc(4)).encode(),  // x3003: R2 = x3008
            SimInstr::STR(R1, R2, IOffset::new_trunc(1)).encode(), // x3004: mem[x3009] = R1
            SimInstr::LDR(R3, R2, IOffset::new_trunc(1)).encode(), // x3005: R3 = mem[x3009]
            HALT,                                               // x3006
            0x8000,                                             // x3007
            0x4000,                                             // x3008
            0x0000,                                             // x3009
        ]);
        sim.mem[0x4000] = 0x1234;
        sim.run().unwrap();

        assert_eq!(sim.reg_file[R0], 0x8000);
        assert_eq!(sim.reg_file[R1], 0x1234);
        assert_eq!(sim.mem[0x4000], 0x8000);
        assert_eq!(sim.mem[0x3009], 0x1234);
        assert_eq!(sim.reg_file[R3], 0x1234);
        assert!(sim.cc().is_p());

        let mut sim = load(&[SimInstr::ST(R0, IOffset::new_trunc(-1)).encode(), HALT]);
        sim.reg_file[R0] = 0xBEEF;
        sim.run().unwrap();
        assert_eq!(sim.mem[0x3000], 0xBEEF);
    }

    #[test]
    fn test_ld_sets_cc_st_does_not() {
        let mut sim = load(&[
            SimInstr::LD(R0, IOffset::new_trunc(2)).encode(),
            SimInstr::ST(R1, IOffset::new_trunc(2)).encode(),
            HALT,
            0xFFFF,
            0x0000,
        ]);
        sim.reg_file[R1] = 1;
        sim.run().unwrap();
        assert!(sim.cc().is_n());
        assert_eq!(sim.mem[0x3004], 1);
    }

    #[test]
    fn test_and_imm_zero_extends() {
        // AND R0, R0, #x1F
        let mut sim = load(&[0x503F, HALT]);
        sim.reg_file[R0] = 0xFFFF;
        sim.run().unwrap();
        assert_eq!(sim.reg_file[R0], 0x001F);
        assert!(sim.cc().is_p());

        // ADD's immediate is still sign-extended: ADD R0, R0, #-1
        let mut sim = load(&[0x103F, HALT]);
        sim.reg_file[R0] = 5;
        sim.run().unwrap();
        assert_eq!(sim.reg_file[R0], 4);

        let mut sim = load(&[SimInstr::AND(R1, R0, uimm5(0x10)).encode(), HALT]);
        sim.reg_file[R0] = 0x8010;
        sim.run().unwrap();
        assert_eq!(sim.reg_file[R1], 0x0010);
    }

    #[test]
    fn test_br() {
        // R0 = 3; loop: R0 -= 1; BRp loop
        let mut sim = load(&[
            SimInstr::AND(R0, R0, uimm5(0)).encode(),
            SimInstr::ADD(R0, R0, imm5(3)).encode(),
            SimInstr::ADD(R0, R0, imm5(-1)).encode(),
            SimInstr::BR(0b001, IOffset::new_trunc(-2)).encode(),
            HALT,
        ]);
        sim.run().unwrap();
        assert_eq!(sim.reg_file[R0], 0);
        assert_eq!(sim.instructions_run, 2 + 3 * 2);

        // BRn is not taken on zero
        let mut sim = load(&[
            SimInstr::BR(0b100, IOffset::new_trunc(1)).encode(),
            HALT,
            0xFFFF,
        ]);
        sim.run().unwrap();
        assert_eq!(sim.pc, 0x3001);
    }

    #[test]
    fn test_jsr_ret() {
        let mut sim = load(&[
            SimInstr::JSR(ImmOrReg::Imm(IOffset::new_trunc(2))).encode(), // x3000
            HALT,                                                         // x3001
            0xFFFF,                                                       // x3002
            SimInstr::ADD(R0, R0, imm5(7)).encode(),                      // x3003
            SimInstr::JMP(R7).encode(),                                   // x3004
        ]);
        sim.run().unwrap();
        assert_eq!(sim.reg_file[R0], 7);
        assert_eq!(sim.reg_file[R7], 0x3001);
        assert_eq!(sim.pc, 0x3001);
    }

    #[test]
    fn test_jsrr_and_jmp() {
        let mut sim = load(&[
            SimInstr::JSR(ImmOrReg::Reg(R1)).encode(), // x3000
            HALT,                                      // x3001
        ]);
        sim.reg_file[R1] = 0x4000;
        sim.mem[0x4000] = SimInstr::JMP(R7).encode();
        sim.run().unwrap();
        assert_eq!(sim.reg_file[R7], 0x3001);
        assert!(sim.hit_halt());

        // JSRR R7 links first, so it lands on the next instruction
        let mut sim = load(&[SimInstr::JSR(ImmOrReg::Reg(R7)).encode(), HALT]);
        sim.reg_file[R7] = 0x5000;
        sim.step_in().unwrap();
        assert_eq!(sim.pc, 0x3001);
        assert_eq!(sim.reg_file[R7], 0x3001);
    }

    #[test]
    fn test_pc_wraps() {
        let mut sim = Simulator::new(Default::default());
        sim.pc = 0xFFFF;
        sim.mem[0xFFFF] = SimInstr::ADD(R0, R0, imm5(1)).encode();
        sim.mem[0x0000] = HALT;
        sim.run().unwrap();
        assert!(sim.hit_halt());
        assert_eq!(sim.pc, 0x0000);
        assert_eq!(sim.reg_file[R0], 1);

        // PC-relative addressing wraps too
        let mut sim = Simulator::new(Default::default());
        sim.pc = 0x0000;
        sim.mem[0x0000] = SimInstr::LEA(R0, IOffset::new_trunc(-2)).encode();
        sim.step_in().unwrap();
        assert_eq!(sim.reg_file[R0], 0xFFFF);

        // so does base + offset: xFFFF + 1 is x0000
        let mut sim = load(&[SimInstr::STR(R0, R1, IOffset::new_trunc(1)).encode(), HALT]);
        sim.reg_file[R0] = 0xABCD;
        sim.reg_file[R1] = 0xFFFF;
        sim.run().unwrap();
        assert_eq!(sim.mem[0x0000], 0xABCD);
    }

    #[test]
    fn test_run_with_limit() {
        // BR #-1: an infinite loop
        let mut sim = load(&[SimInstr::BR(0b111, IOffset::new_trunc(-1)).encode()]);
        sim.run_with_limit(100).unwrap();
        assert_eq!(sim.instructions_run, 100);
        assert!(!sim.hit_halt());
        assert_eq!(sim.pc, 0x3000);
    }

    #[test]
    fn test_step_in_halt() {
        let mut sim = load(&[SimInstr::NOT(R0, R0).encode(), HALT]);
        sim.step_in().unwrap();
        assert!(!sim.hit_halt());
        assert_eq!(sim.reg_file[R0], 0xFFFF);
        sim.step_in().unwrap();
        assert!(sim.hit_halt());
    }

    #[test]
    fn test_reset_keeps_flags_and_io() {
        let io = BufferedIO::new();
        let mut sim = Simulator::new(SimFlags { in_prompt: "> ", ..Default::default() });
        sim.open_io(io.clone());
        sim.mem[0x3000] = 0xF021;
        sim.reg_file[R0] = u16::from(b'!');
        sim.reset();

        assert_eq!(sim.flags.in_prompt, "> ");
        assert_eq!(sim.mem[0x3000], 0);
        assert_eq!(sim.reg_file[R0], 0);

        sim.mem[0x3000] = 0xF021;
        sim.mem[0x3001] = HALT;
        sim.reg_file[R0] = u16::from(b'!');
        sim.run().unwrap();
        assert_eq!(&*io.get_output().read().unwrap(), b"!");
    }

    #[test]
    fn test_seeded_machine_init() {
        let flags = SimFlags { machine_init: MachineInitStrategy::Seeded { seed: 7 }, ..Default::default() };
        let a = Simulator::new(flags);
        let b = Simulator::new(flags);
        assert_eq!(a.reg_file, b.reg_file);
        assert_eq!(a.mem.as_slice(), b.mem.as_slice());
        assert!(a.mem.as_slice().iter().any(|&w| w != 0));
    }

    #[test]
    fn test_set_cc_guard() {
        let mut cc = ConditionCode::new();
        cc.set_cc(0b101);
        assert_eq!(cc.cc(), 0b010);
        cc.set_cc(0b1001);
        assert_eq!(cc.cc(), 0b001);
        assert_eq!(format!("{cc:?}"), "ConditionCode(P)");
    }

    #[test]
    fn test_random_programs_never_panic() {
        // Arbitrary words either execute or produce an error, never a panic.
        let mut rng = StdRng::seed_from_u64(0xDEAD);
        for _ in 0..16 {
            let mut sim = Simulator::new(Default::default());
            for addr in 0..=u16::MAX {
                sim.mem[addr] = rng.gen();
            }
            sim.pc = rng.gen();
            let _ = sim.run_with_limit(10_000);
        }
    }
}
