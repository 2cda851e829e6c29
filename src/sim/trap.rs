//! The trap routines of the simulator.
//!
//! `TRAP` instructions are not dispatched through a trap vector table in memory.
//! Instead, the simulator recognizes the six standard vectors of [`TrapVect`]
//! and runs a native routine for each one, talking to the console
//! attached with [`Simulator::open_io`].
//!
//! Any other vector is an error ([`SimErr::InvalidTrapVect`]).

use crate::ast::reg_consts::R0;
use crate::ast::TrapVect8;

use super::io::Console;
use super::{SimErr, Simulator, StepBreak};

macro_rules! trap_vect {
    ($(#[$m:meta])* $Type:ident, {$($(#[$vm:meta])* $name:ident = $value:literal),+ $(,)?}) => {
        $(#[$m])*
        #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
        pub enum $Type {
            $($(#[$vm])* $name = $value),+
        }
        impl TryFrom<u16> for $Type {
            type Error = ();

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$name)),+,
                    _ => Err(())
                }
            }
        }
    }
}
trap_vect!(
    /// The trap vectors the simulator provides a routine for.
    TrapVect, {
    /// Reads one character from the console into R0, without echoing it.
    Getc = 0x20,
    /// Writes the low byte of R0 to the console.
    Out = 0x21,
    /// Writes the string starting at the address in R0, one character per word.
    Puts = 0x22,
    /// Prompts for a character, echoes it, and stores it in R0.
    In = 0x23,
    /// Writes the string starting at the address in R0, two characters per word.
    Putsp = 0x24,
    /// Stops execution.
    Halt = 0x25,
});

impl Simulator {
    /// Runs the routine for the given trap vector.
    pub(super) fn handle_trap(&mut self, vect: TrapVect8) -> Result<(), StepBreak> {
        let Ok(tv) = TrapVect::try_from(vect.get()) else {
            return Err(SimErr::InvalidTrapVect(vect.get() as u8).into());
        };

        match tv {
            TrapVect::Getc => {
                let ch = self.read_char()?;
                self.reg_file[R0] = u16::from(ch);
            },
            TrapVect::Out => {
                self.write_char(self.reg_file[R0] as u8)?;
                self.flush_console()?;
            },
            TrapVect::Puts => {
                let start = self.reg_file[R0];
                let chars = (0..=u16::MAX)
                    .map(|i| self.mem[start.wrapping_add(i)] as u8)
                    .take_while(|&ch| ch != 0)
                    .collect::<Vec<_>>();

                for ch in chars {
                    self.write_char(ch)?;
                }
                self.flush_console()?;
            },
            TrapVect::In => {
                if !self.on_new_line {
                    self.write_char(b'\n')?;
                }
                let prompt = self.flags.in_prompt;
                for &b in prompt.as_bytes() {
                    self.write_char(b)?;
                }
                self.flush_console()?;

                let ch = self.read_char()?;
                self.write_char(ch)?;
                self.reg_file[R0] = u16::from(ch);
                self.flush_console()?;
            },
            TrapVect::Putsp => {
                let start = self.reg_file[R0];
                let chars = (0..=u16::MAX)
                    .map(|i| self.mem[start.wrapping_add(i)])
                    .flat_map(u16::to_le_bytes)
                    .take_while(|&ch| ch != 0)
                    .collect::<Vec<_>>();

                for ch in chars {
                    self.write_char(ch)?;
                }
                self.flush_console()?;
            },
            TrapVect::Halt => {
                self.flush_console()?;

                // Rewind, so that running again halts here again.
                self.pc = self.pc.wrapping_sub(1);
                self.prefetch = true;
                return Err(StepBreak::Halt);
            },
        }

        Ok(())
    }

    /// Blocks until the console provides a character.
    fn read_char(&mut self) -> Result<u8, SimErr> {
        self.io.read_byte()?.ok_or(SimErr::InputClosed)
    }

    fn write_char(&mut self, ch: u8) -> Result<(), SimErr> {
        self.io.write_byte(ch)?;
        self.on_new_line = ch == b'\n';
        Ok(())
    }

    fn flush_console(&mut self) -> Result<(), SimErr> {
        self.io.flush()?;
        Ok(())
    }
}
