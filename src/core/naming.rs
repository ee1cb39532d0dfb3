// src/core/naming.rs
//! Sequential file names for saved images (`img_1.png`, `img_2.png`, ...)

use std::fs;
use std::io;
use std::path::Path;

pub const FILE_PREFIX: &str = "img_";
pub const FILE_EXTENSION: &str = ".png";

/// Build the file name for a given index
pub fn file_name(index: u64) -> String {
    format!("{}{}{}", FILE_PREFIX, index, FILE_EXTENSION)
}

/// Parse the index out of a saved-image file name.
///
/// Only `img_<digits>.png` counts; `img_3_copy.png` or `img_.png` do not.
pub fn parse_index(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_EXTENSION)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Next free index in `folder`: one past the highest existing index, or 1
pub fn next_index(folder: &Path) -> io::Result<u64> {
    let mut highest = 0u64;
    for entry in fs::read_dir(folder)? {
        let entry = entry?;
        if let Some(index) = entry.file_name().to_str().and_then(parse_index) {
            highest = highest.max(index);
        }
    }
    Ok(highest.saturating_add(1))
}
