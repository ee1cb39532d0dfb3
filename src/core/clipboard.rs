// src/core/clipboard.rs
//! Clipboard image access
//!
//! This module provides:
//! - A decoded RGBA snapshot of the clipboard image (`ClipboardImage`)
//! - The `ClipboardSource` seam the watcher polls
//! - The `arboard`-backed system implementation

use std::fmt;

use thiserror::Error;
use tracing::trace;

/// Errors raised while reading the clipboard
#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard is not available on this system: {0}")]
    Unavailable(String),

    #[error("clipboard is occupied by another process")]
    Busy,

    #[error("clipboard access error: {0}")]
    Access(String),

    #[error("malformed clipboard image: {width}x{height} with {len} bytes")]
    MalformedImage { width: u32, height: u32, len: usize },
}

/// An image taken from the clipboard, stored as tightly packed RGBA8 pixels
#[derive(Clone, PartialEq, Eq)]
pub struct ClipboardImage {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl ClipboardImage {
    /// Build an image, checking that the buffer matches the dimensions
    pub fn from_rgba(width: u32, height: u32, bytes: Vec<u8>) -> Result<Self, ClipboardError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|px| px.checked_mul(4));
        if width == 0 || height == 0 || expected != Some(bytes.len()) {
            return Err(ClipboardError::MalformedImage {
                width,
                height,
                len: bytes.len(),
            });
        }
        Ok(Self {
            width,
            height,
            bytes,
        })
    }

    /// Whether two snapshots hold the same picture
    pub fn same_content(&self, other: &ClipboardImage) -> bool {
        self == other
    }
}

// Pixel buffers can be tens of megabytes; keep Debug output readable.
impl fmt::Debug for ClipboardImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipboardImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl fmt::Display for ClipboardImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} image", self.width, self.height)
    }
}

/// Anything the watcher can poll for images
pub trait ClipboardSource: Send {
    /// Return the current clipboard image, or `None` when it holds something else
    fn read_image(&mut self) -> Result<Option<ClipboardImage>, ClipboardError>;

    /// Snapshot used as the baseline when monitoring starts.
    /// Errors count as "no image" so a busy clipboard never blocks startup.
    fn signature(&mut self) -> Option<ClipboardImage> {
        self.read_image().ok().flatten()
    }
}

/// System clipboard backed by `arboard`
///
/// The OS clipboard is opened for each read and released right after,
/// so other applications are never locked out between polls.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl SystemClipboard {
    pub fn new() -> Self {
        Self
    }
}

impl ClipboardSource for SystemClipboard {
    fn read_image(&mut self) -> Result<Option<ClipboardImage>, ClipboardError> {
        let mut clipboard = arboard::Clipboard::new().map_err(map_arboard_error)?;

        let data = match clipboard.get_image() {
            Ok(data) => data,
            Err(arboard::Error::ContentNotAvailable) => {
                trace!("clipboard does not contain an image");
                return Ok(None);
            }
            Err(e) => return Err(map_arboard_error(e)),
        };

        let width = u32::try_from(data.width).map_err(|_| ClipboardError::MalformedImage {
            width: u32::MAX,
            height: data.height as u32,
            len: data.bytes.len(),
        })?;
        let height = u32::try_from(data.height).map_err(|_| ClipboardError::MalformedImage {
            width,
            height: u32::MAX,
            len: data.bytes.len(),
        })?;

        ClipboardImage::from_rgba(width, height, data.bytes.into_owned()).map(Some)
    }
}

fn map_arboard_error(e: arboard::Error) -> ClipboardError {
    match &e {
        arboard::Error::ClipboardOccupied => ClipboardError::Busy,
        arboard::Error::ClipboardNotSupported => ClipboardError::Unavailable(e.to_string()),
        _ => ClipboardError::Access(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba_accepts_matching_buffer() {
        let img = ClipboardImage::from_rgba(2, 3, vec![0; 24]).unwrap();
        assert_eq!(img.width, 2);
        assert_eq!(img.height, 3);
        assert_eq!(img.to_string(), "2x3 image");
    }

    #[test]
    fn test_from_rgba_rejects_short_buffer() {
        let err = ClipboardImage::from_rgba(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            ClipboardError::MalformedImage {
                width: 2,
                height: 2,
                len: 15
            }
        ));
    }

    #[test]
    fn test_from_rgba_rejects_empty_image() {
        assert!(ClipboardImage::from_rgba(0, 5, Vec::new()).is_err());
    }

    #[test]
    fn test_same_content_compares_pixels_and_size() {
        let a = ClipboardImage::from_rgba(1, 2, vec![1; 8]).unwrap();
        let b = ClipboardImage::from_rgba(2, 1, vec![1; 8]).unwrap();
        let c = ClipboardImage::from_rgba(1, 2, vec![1; 8]).unwrap();
        assert!(!a.same_content(&b));
        assert!(a.same_content(&c));
    }

    #[test]
    fn test_debug_hides_pixels() {
        let img = ClipboardImage::from_rgba(1, 1, vec![9; 4]).unwrap();
        assert_eq!(
            format!("{:?}", img),
            "ClipboardImage { width: 1, height: 1, bytes: 4 }"
        );
    }
}
