//! Command line runner for LC-3 program images.
//!
//! Loads the image given as the only argument and runs it on the terminal.
//!
//! Exit codes:
//! - 0: the program halted
//! - 1: bad command line usage
//! - 2: the image could not be opened, read, or loaded
//! - 3: the program executed an invalid instruction (or the console failed)

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use minilc3::image::Image;
use minilc3::sim::io::StdIO;
use minilc3::sim::Simulator;

// The only accepted argument is a path, so flags (help and version included) are usage errors.
#[derive(Parser, Debug)]
#[command(about, disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// Big-endian program image. The first word is the load address.
    #[arg(value_name = "FILE", value_parser = parse_image_path)]
    file: PathBuf,
}

fn parse_image_path(arg: &str) -> Result<PathBuf, String> {
    match arg {
        "" => Err(String::from("image path must not be empty")),
        a if a.starts_with('-') => Err(String::from("image path must not start with '-'")),
        a => Ok(PathBuf::from(a)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Exit {
    Success = 0,
    Usage = 1,
    Image = 2,
    Instruction = 3,
}
impl From<Exit> for ExitCode {
    fn from(value: Exit) -> Self {
        ExitCode::from(value as u8)
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // If printing fails there is nowhere left to report it.
            let _ = e.print();
            return Exit::Usage.into();
        }
    };

    let image = match Image::open(&args.file) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("{}: {e}", args.file.display());
            return Exit::Image.into();
        }
    };

    let mut sim = Simulator::new(Default::default());
    sim.open_io(StdIO);
    sim.load_image(&image);

    match sim.run() {
        Ok(()) => Exit::Success.into(),
        Err(e) => {
            eprintln!("error at x{:04X}: {e}", sim.prefetch_pc());
            Exit::Instruction.into()
        }
    }
}
