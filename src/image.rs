//! Loading program images from disk.
//!
//! A program image is a big-endian stream of 16-bit words.
//! The first word is the origin (the address the program is loaded at and starts executing from),
//! and every word after it is copied into memory contiguously starting at the origin.
//!
//! ```text
//! origin  payload...
//! [30 00] [F0 25]
//!   x3000   HALT
//! ```
//!
//! ```
//! use minilc3::image::Image;
//!
//! let image = Image::from_bytes(&[0x30, 0x00, 0xF0, 0x25]).unwrap();
//! assert_eq!(image.origin(), 0x3000);
//! assert_eq!(image.words(), &[0xF025]);
//! ```

use std::io::{self, Read};
use std::path::Path;

/// The most bytes read from an image stream: an origin word,
/// plus one word more than the whole address space can hold.
///
/// Anything past this is certain to be [`ImageErr::TooLong`], so it is never buffered.
const MAX_IMAGE_BYTES: u64 = 2 * (1 + (1 << 16) + 1);

/// Errors that can occur when loading an [`Image`].
#[derive(Debug, thiserror::Error)]
pub enum ImageErr {
    /// The image file could not be opened.
    #[error("failed to open file: {0}")]
    Open(#[source] io::Error),
    /// The image could not be read.
    #[error("failed to read file: {0}")]
    Read(#[source] io::Error),
    /// The image does not contain a full origin word.
    #[error("file is too short: missing origin address")]
    MissingOrigin,
    /// The image has an origin, but nothing to load there.
    #[error("file is too short: no words to load")]
    NoPayload,
    /// The payload runs past the end of the address space.
    #[error("file is too long: {words} words starting at x{origin:04X} do not fit in memory")]
    TooLong {
        /// The origin of the image.
        origin: u16,
        /// The number of words in the payload.
        words: usize
    },
}

/// A program image, ready to be loaded into a [`Simulator`].
///
/// An image always has at least one word, and all of its words fit
/// between its origin and the end of the address space.
///
/// [`Simulator`]: crate::sim::Simulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    origin: u16,
    words: Vec<u16>
}
impl Image {
    /// Creates an image from an origin and its payload, verifying that the payload fits.
    pub fn new(origin: u16, words: Vec<u16>) -> Result<Self, ImageErr> {
        let room = (1 << 16) - usize::from(origin);
        if words.len() > room {
            return Err(ImageErr::TooLong { origin, words: words.len() });
        }
        if words.is_empty() {
            return Err(ImageErr::NoPayload);
        }

        Ok(Self { origin, words })
    }

    /// Parses an image from its big-endian byte representation.
    ///
    /// A trailing odd byte (half of a word) is ignored.
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, ImageErr> {
        let origin = take::<2>(&mut bytes)
            .map(u16::from_be_bytes)
            .ok_or(ImageErr::MissingOrigin)?;

        let chunks = bytes.chunks_exact(2);
        if !chunks.remainder().is_empty() {
            log::warn!("image has a dangling odd byte, ignoring it");
        }
        let words = chunks
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();

        let image = Self::new(origin, words)?;
        log::debug!("parsed image with {} words at x{:04X}", image.words.len(), image.origin);
        Ok(image)
    }

    /// Reads an image from a reader until the end of its stream.
    ///
    /// Streams too long to fit in memory are rejected without being read to the end.
    pub fn read_from(reader: impl Read) -> Result<Self, ImageErr> {
        let mut bytes = vec![];
        reader.take(MAX_IMAGE_BYTES)
            .read_to_end(&mut bytes)
            .map_err(ImageErr::Read)?;
        Self::from_bytes(&bytes)
    }

    /// Opens and reads the image at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageErr> {
        let file = std::fs::File::open(path).map_err(ImageErr::Open)?;
        Self::read_from(io::BufReader::new(file))
    }

    /// Serializes the image into its big-endian byte representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        std::iter::once(self.origin)
            .chain(self.words.iter().copied())
            .flat_map(u16::to_be_bytes)
            .collect()
    }

    /// The address the image is loaded at.
    pub fn origin(&self) -> u16 {
        self.origin
    }

    /// The words of the image, in load order.
    pub fn words(&self) -> &[u16] {
        &self.words
    }
}

fn take<const N: usize>(data: &mut &[u8]) -> Option<[u8; N]> {
    if N > data.len() { return None; }
    let (left, right) = data.split_at(N);
    *data = right;
    <[_; N]>::try_from(left).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_halt() {
        let image = Image::from_bytes(&[0x30, 0x00, 0xF0, 0x25]).unwrap();
        assert_eq!(image.origin(), 0x3000);
        assert_eq!(image.words(), &[0xF025]);
        assert_eq!(image.to_bytes(), [0x30, 0x00, 0xF0, 0x25]);
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(Image::from_bytes(&[]), Err(ImageErr::MissingOrigin)));
        assert!(matches!(Image::from_bytes(&[0x30]), Err(ImageErr::MissingOrigin)));
        assert!(matches!(Image::from_bytes(&[0x30, 0x00]), Err(ImageErr::NoPayload)));
        assert!(matches!(Image::from_bytes(&[0x30, 0x00, 0xF0]), Err(ImageErr::NoPayload)));
    }

    #[test]
    fn test_dangling_byte_ignored() {
        let image = Image::from_bytes(&[0x30, 0x00, 0xF0, 0x25, 0xAA]).unwrap();
        assert_eq!(image.words(), &[0xF025]);
    }

    #[test]
    fn test_fits_to_end_of_memory() {
        // two words at xFFFE fill memory exactly
        let image = Image::from_bytes(&[0xFF, 0xFE, 0x12, 0x34, 0x56, 0x78]).unwrap();
        assert_eq!(image.words(), &[0x1234, 0x5678]);

        // three do not
        let err = Image::from_bytes(&[0xFF, 0xFE, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);
        assert!(matches!(err, Err(ImageErr::TooLong { origin: 0xFFFE, words: 3 })));

        // a full memory image starting at x0000
        assert!(Image::new(0x0000, vec![0; 1 << 16]).is_ok());
        assert!(Image::new(0x0000, vec![0; (1 << 16) + 1]).is_err());
    }

    #[test]
    fn test_read_from() {
        let bytes: &[u8] = &[0x40, 0x00, 0x00, 0x01, 0x00, 0x02];
        let image = Image::read_from(bytes).unwrap();
        assert_eq!(image.origin(), 0x4000);
        assert_eq!(image.words(), &[1, 2]);
    }

    #[test]
    fn test_read_from_endless_stream() {
        let err = Image::read_from(std::io::repeat(0));
        assert!(matches!(err, Err(ImageErr::TooLong { origin: 0, words: 65537 })));

        let err = Image::read_from(std::io::repeat(0xFF));
        assert!(matches!(err, Err(ImageErr::TooLong { origin: 0xFFFF, words: 65537 })));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Image::open(dir.path().join("nope.obj"));
        assert!(matches!(err, Err(ImageErr::Open(_))));
    }
}
