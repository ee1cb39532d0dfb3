// src/core/storage.rs
//! Persisting clipboard images into the save folder

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use thiserror::Error;
use tracing::{debug, warn};

use super::clipboard::ClipboardImage;
use super::naming;

/// Attempts at finding a free name before giving up
const MAX_NAME_ATTEMPTS: u32 = 64;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no save folder was given")]
    EmptyPath,

    #[error("could not create/open folder {path}: {source}")]
    CreateFolder {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("folder does not exist: {0}")]
    MissingFolder(PathBuf),

    #[error("could not scan folder {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not encode PNG {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("no free file name left in {0}")]
    NamesExhausted(PathBuf),

    #[error("could not launch file manager: {0}")]
    Launch(#[source] io::Error),
}

/// A file written by [`ImageFolder::save`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    pub index: u64,
    pub file_name: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// The folder images are saved into
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
}

impl ImageFolder {
    /// Open the save folder, creating it (and parents) when missing
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = path.as_ref();
        if root.as_os_str().is_empty() {
            return Err(StorageError::EmptyPath);
        }
        fs::create_dir_all(root).map_err(|source| StorageError::CreateFolder {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Encode `image` as PNG under the next sequential name.
    ///
    /// Existing files are never overwritten: when the computed name is taken
    /// by the time the file is created, the following index is tried.
    pub fn save(&self, image: &ClipboardImage) -> Result<SavedImage, StorageError> {
        let index = naming::next_index(&self.root).map_err(|source| StorageError::Scan {
            path: self.root.clone(),
            source,
        })?;
        self.save_from(image, index, MAX_NAME_ATTEMPTS)
    }

    /// Create the first free `img_<N>.png` for `N` in `first..first + attempts`
    fn save_from(
        &self,
        image: &ClipboardImage,
        first: u64,
        attempts: u32,
    ) -> Result<SavedImage, StorageError> {
        let mut index = first;
        for _ in 0..attempts {
            let file_name = naming::file_name(index);
            let path = self.root.join(&file_name);

            let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!("{} appeared while saving, trying next index", file_name);
                    index += 1;
                    continue;
                }
                Err(source) => return Err(StorageError::Write { path, source }),
            };

            if let Err(e) = write_png(file, &path, image) {
                if let Err(cleanup) = fs::remove_file(&path) {
                    warn!("could not remove partial file {}: {}", path.display(), cleanup);
                }
                return Err(e);
            }

            return Ok(SavedImage {
                index,
                file_name,
                path,
                width: image.width,
                height: image.height,
            });
        }

        Err(StorageError::NamesExhausted(self.root.clone()))
    }

    /// Open the folder in the platform file manager
    pub fn open_in_file_manager(path: &Path) -> Result<(), StorageError> {
        if path.as_os_str().is_empty() {
            return Err(StorageError::EmptyPath);
        }
        if !path.is_dir() {
            return Err(StorageError::MissingFolder(path.to_path_buf()));
        }

        #[cfg(target_os = "windows")]
        let program = "explorer";
        #[cfg(target_os = "macos")]
        let program = "open";
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let program = "xdg-open";

        std::process::Command::new(program)
            .arg(path)
            .spawn()
            .map(|_| ())
            .map_err(StorageError::Launch)
    }
}

fn write_png(file: File, path: &Path, image: &ClipboardImage) -> Result<(), StorageError> {
    let mut writer = BufWriter::new(file);
    PngEncoder::new(&mut writer)
        .write_image(&image.bytes, image.width, image.height, ExtendedColorType::Rgba8)
        .map_err(|source| StorageError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    writer.flush().map_err(|source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn red_square() -> ClipboardImage {
        ClipboardImage::from_rgba(2, 2, [255, 0, 0, 255].repeat(4)).unwrap()
    }

    #[test]
    fn test_open_creates_nested_folder() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let folder = ImageFolder::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(folder.path(), nested.as_path());
    }

    #[test]
    fn test_open_rejects_empty_path() {
        assert!(matches!(ImageFolder::open(""), Err(StorageError::EmptyPath)));
    }

    #[test]
    fn test_save_numbers_sequentially_and_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let folder = ImageFolder::open(dir.path()).unwrap();

        let first = folder.save(&red_square()).unwrap();
        let second = folder.save(&red_square()).unwrap();
        assert_eq!(first.file_name, "img_1.png");
        assert_eq!(second.file_name, "img_2.png");

        let decoded = image::open(&first.path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 2));
        assert_eq!(decoded.get_pixel(1, 1).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_save_continues_after_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("img_7.png"), b"existing").unwrap();
        let folder = ImageFolder::open(dir.path()).unwrap();

        let saved = folder.save(&red_square()).unwrap();
        assert_eq!(saved.index, 8);
        assert_eq!(fs::read(dir.path().join("img_7.png")).unwrap(), b"existing");
    }

    #[test]
    fn test_taken_name_is_skipped_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let folder = ImageFolder::open(dir.path()).unwrap();
        // Written after the scan would have picked index 1.
        fs::write(dir.path().join("img_1.png"), b"someone else").unwrap();

        let saved = folder.save_from(&red_square(), 1, MAX_NAME_ATTEMPTS).unwrap();

        assert_eq!(saved.index, 2);
        assert_eq!(saved.file_name, "img_2.png");
        assert_eq!(fs::read(dir.path().join("img_1.png")).unwrap(), b"someone else");
        assert!(image::open(&saved.path).is_ok());
    }

    #[test]
    fn test_gives_up_when_every_candidate_is_taken() {
        let dir = tempfile::tempdir().unwrap();
        let folder = ImageFolder::open(dir.path()).unwrap();
        for i in 4..7 {
            fs::write(dir.path().join(naming::file_name(i)), b"taken").unwrap();
        }

        let result = folder.save_from(&red_square(), 4, 3);

        assert!(matches!(result, Err(StorageError::NamesExhausted(_))));
        assert!(!dir.path().join("img_7.png").exists());
        assert_eq!(fs::read(dir.path().join("img_6.png")).unwrap(), b"taken");
    }

    #[test]
    fn test_open_in_file_manager_requires_existing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            ImageFolder::open_in_file_manager(&missing),
            Err(StorageError::MissingFolder(_))
        ));
    }
}
