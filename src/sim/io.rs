//! Console IO handling for LC-3.
//!
//! The interface for consoles is defined with the [`Console`] trait.
//! This is exposed to the simulator with the [`SimIO`] enum.
//!
//! Besides those two key items, this module also includes:
//! - [`EmptyIO`]: A `Console` holding the implementation for a lack of IO support.
//! - [`StdIO`]: A `Console` bound to the process's terminal.
//! - [`BufferedIO`]: A `Console` holding a buffered implementation for IO.
//! - [`BiChannelIO`]: A `Console` holding a channel implementation for IO.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use crossbeam_channel as cbc;

/// A character console that the trap routines read from and write to.
pub trait Console {
    /// Blocks until a byte of input is available and takes it.
    ///
    /// This returns `Ok(None)` if the input is closed and no byte will ever arrive.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Writes a byte to the output.
    ///
    /// The byte does not have to be visible until [`Console::flush`] is called.
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Makes all written bytes visible.
    fn flush(&mut self) -> io::Result<()>;
}
impl dyn Console {} // assert Console is dyn safe

/// No IO. Input is always closed and output is discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyIO;
impl Console for EmptyIO {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(None)
    }

    fn write_byte(&mut self, _byte: u8) -> io::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// IO bound to the process's standard input and output.
///
/// Each read puts the terminal into raw mode (no line buffering and no echo)
/// for exactly the duration of the read. If standard input is not a terminal,
/// it is read as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdIO;
impl Console for StdIO {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let _raw = RawTerminal::enter();

        let mut buf = [0];
        loop {
            match io::stdin().lock().read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        io::stdout().lock().write_all(&[byte])
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().lock().flush()
    }
}

/// Scoped raw mode for the terminal attached to standard input.
///
/// Canonical mode and echo are disabled when this is created
/// and the previous settings are restored when it is dropped.
struct RawTerminal {
    #[cfg(unix)]
    saved: Option<libc::termios>,
}
impl RawTerminal {
    #[cfg(unix)]
    fn enter() -> Self {
        let fd = libc::STDIN_FILENO;
        let mut tty = std::mem::MaybeUninit::<libc::termios>::uninit();

        // SAFETY: tcgetattr only writes to the provided termios struct.
        if unsafe { libc::tcgetattr(fd, tty.as_mut_ptr()) } != 0 {
            log::trace!("stdin is not a terminal, reading without raw mode");
            return Self { saved: None };
        }
        // SAFETY: tcgetattr succeeded, so it fully initialized the struct.
        let saved = unsafe { tty.assume_init() };

        let mut raw = saved;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO);
        // SAFETY: raw is a valid termios struct obtained from tcgetattr.
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
            log::warn!("could not put terminal into raw mode: {}", io::Error::last_os_error());
            return Self { saved: None };
        }

        Self { saved: Some(saved) }
    }

    #[cfg(not(unix))]
    fn enter() -> Self {
        Self {}
    }
}
impl Drop for RawTerminal {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(saved) = &self.saved {
            // SAFETY: saved is the termios struct originally read from this fd.
            if unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, saved) } != 0 {
                log::warn!("could not restore terminal mode: {}", io::Error::last_os_error());
            }
        }
    }
}

/// IO that reads from an input buffer and writes to an output buffer.
///
/// The buffers can be accessed in code via [`BufferedIO::get_input`] and [`BufferedIO::get_output`].
/// Once the input buffer is empty, the input is considered closed.
///
/// ```
/// use minilc3::sim::io::{BufferedIO, Console};
///
/// let mut io = BufferedIO::new();
/// io.get_input().write().unwrap().extend(b"a");
///
/// assert_eq!(io.read_byte().unwrap(), Some(b'a'));
/// assert_eq!(io.read_byte().unwrap(), None);
///
/// io.write_byte(b'!').unwrap();
/// assert_eq!(&*io.get_output().read().unwrap(), b"!");
/// ```
#[derive(Clone, Default, Debug)]
pub struct BufferedIO {
    input: Arc<RwLock<VecDeque<u8>>>,
    output: Arc<RwLock<Vec<u8>>>
}
impl BufferedIO {
    /// Creates a new BufferedIO.
    pub fn new() -> Self {
        Self { input: Default::default(), output: Default::default() }
    }

    fn input(&self) -> RwLockWriteGuard<'_, VecDeque<u8>> {
        // A poisoned buffer is still a perfectly fine buffer.
        self.input.write().unwrap_or_else(|e| e.into_inner())
    }
    fn output(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.output.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Gets a reference to the input buffer.
    pub fn get_input(&self) -> &Arc<RwLock<VecDeque<u8>>> {
        &self.input
    }
    /// Gets a reference to the output buffer.
    pub fn get_output(&self) -> &Arc<RwLock<Vec<u8>>> {
        &self.output
    }
}
impl Console for BufferedIO {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.input().pop_front())
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output().push(byte);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// An IO that reads from one channel and writes to another.
///
/// This allows the simulator to run on one thread
/// while its console is driven from another.
/// Input is closed once every sender of the input channel has been dropped.
///
/// ```
/// use minilc3::sim::io::{BiChannelIO, Console};
///
/// let (mut io, input, output) = BiChannelIO::unbounded();
/// input.send(b'x').unwrap();
/// drop(input);
///
/// assert_eq!(io.read_byte().unwrap(), Some(b'x'));
/// assert_eq!(io.read_byte().unwrap(), None);
///
/// io.write_byte(b'y').unwrap();
/// assert_eq!(output.recv().unwrap(), b'y');
/// ```
#[derive(Debug)]
pub struct BiChannelIO {
    read_data:  cbc::Receiver<u8>,
    write_data: cbc::Sender<u8>
}
impl BiChannelIO {
    /// Creates a new bi-channel IO device which reads from `reader` and writes to `writer`.
    pub fn new(reader: cbc::Receiver<u8>, writer: cbc::Sender<u8>) -> Self {
        Self { read_data: reader, write_data: writer }
    }

    /// Creates a bi-channel IO device over two new unbounded channels,
    /// returning the device, the sending half of its input,
    /// and the receiving half of its output.
    pub fn unbounded() -> (Self, cbc::Sender<u8>, cbc::Receiver<u8>) {
        let (read_tx, read_rx) = cbc::unbounded();
        let (write_tx, write_rx) = cbc::unbounded();

        (Self::new(read_rx, write_tx), read_tx, write_rx)
    }
}
impl Console for BiChannelIO {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        // A disconnected channel means no more input is coming.
        Ok(self.read_data.recv().ok())
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.write_data.send(byte)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "console output channel disconnected"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// All the variants of IO accepted by the Simulator.
#[derive(Default)]
pub enum SimIO {
    /// No IO. This corresponds to the implementation of [`EmptyIO`].
    #[default]
    Empty,
    /// The process's terminal. See [`StdIO`].
    Std(StdIO),
    /// A buffered implementation. See [`BufferedIO`].
    Buffered(BufferedIO),
    /// A bi-channel IO implementation. See [`BiChannelIO`].
    BiChannel(BiChannelIO),
    /// A custom IO implementation.
    Custom(Box<dyn Console + Send>)
}
impl std::fmt::Debug for SimIO {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            SimIO::Empty        => "Empty",
            SimIO::Std(_)       => "Std",
            SimIO::Buffered(_)  => "Buffered",
            SimIO::BiChannel(_) => "BiChannel",
            SimIO::Custom(_)    => "Custom",
        };
        f.debug_tuple("SimIO")
            .field(&kind)
            .finish()
    }
}
impl From<EmptyIO> for SimIO {
    fn from(_value: EmptyIO) -> Self {
        SimIO::Empty
    }
}
impl From<StdIO> for SimIO {
    fn from(value: StdIO) -> Self {
        SimIO::Std(value)
    }
}
impl From<BufferedIO> for SimIO {
    fn from(value: BufferedIO) -> Self {
        SimIO::Buffered(value)
    }
}
impl From<BiChannelIO> for SimIO {
    fn from(value: BiChannelIO) -> Self {
        SimIO::BiChannel(value)
    }
}
impl From<Box<dyn Console + Send>> for SimIO {
    fn from(value: Box<dyn Console + Send>) -> Self {
        SimIO::Custom(value)
    }
}
impl Console for SimIO {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        match self {
            SimIO::Empty => EmptyIO.read_byte(),
            SimIO::Std(io) => io.read_byte(),
            SimIO::Buffered(io) => io.read_byte(),
            SimIO::BiChannel(io) => io.read_byte(),
            SimIO::Custom(io) => io.read_byte(),
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        match self {
            SimIO::Empty => EmptyIO.write_byte(byte),
            SimIO::Std(io) => io.write_byte(byte),
            SimIO::Buffered(io) => io.write_byte(byte),
            SimIO::BiChannel(io) => io.write_byte(byte),
            SimIO::Custom(io) => io.write_byte(byte),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SimIO::Empty => EmptyIO.flush(),
            SimIO::Std(io) => io.flush(),
            SimIO::Buffered(io) => io.flush(),
            SimIO::BiChannel(io) => io.flush(),
            SimIO::Custom(io) => io.flush(),
        }
    }
}
