//! A minimal LC-3 virtual machine.
//!
//! This crate runs pre-assembled LC-3 program images: a big-endian stream of 16-bit words
//! whose first word is the address the program is loaded at.
//! There is no assembler, operating system image, or interrupt support;
//! the six standard `TRAP` routines are provided natively by the simulator.
//!
//! # Usage
//!
//! To run an image, it must be loaded (see [`image`]) and then executed with the simulator:
//! ```
//! use minilc3::image::Image;
//! use minilc3::sim::Simulator;
//! use minilc3::sim::io::BufferedIO;
//!
//! // .orig x3000
//! // LEA R0, HELLO
//! // PUTS
//! // HALT
//! // HELLO .stringz "hi"
//! let image = Image::new(0x3000, vec![0xE002, 0xF022, 0xF025, 0x0068, 0x0069, 0x0000]).unwrap();
//!
//! let io = BufferedIO::new();
//! let mut simulator = Simulator::new(Default::default());
//! simulator.open_io(io.clone());
//! simulator.load_image(&image);
//! simulator.run().unwrap(); // <-- Result can be handled accordingly
//!
//! assert_eq!(&*io.get_output().read().unwrap(), b"hi");
//! ```
//!
//! If more granularity is needed for simulation, there is also a step-in function.
//! See the [`sim`] module for more details.
#![warn(missing_docs)]

pub mod ast;
pub mod image;
pub mod sim;
