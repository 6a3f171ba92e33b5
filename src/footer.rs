//! Trailer the ransomware appends to every file it encrypts.
//!
//! The footer is 314 bytes at end-of-file.  Only three fields matter here,
//! all addressed from the end of the file:
//!
//! ```text
//!   -314                    -23   -22          -14    -12          0
//!    | ... opaque state ... | ver | counter (LE) | ..  | magic (12) |
//! ```
//!
//! `ver` must be `0x06`.  The counter records how far the ransomware got.
//! The magic is 11 configured bytes and a NUL.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{MagicConfig, MAGIC_LEN};

/// Total size of the footer in bytes.
pub const FOOTER_SIZE:       u64 = 314;
/// Negative offset of the version byte.
pub const VERSION_OFFSET:    u64 = 23;
/// Negative offset of the 8-byte progress counter.
pub const COUNTER_OFFSET:    u64 = 22;
/// Negative offset of the magic marker.
pub const MAGIC_OFFSET:      u64 = MAGIC_LEN as u64;
pub const SUPPORTED_VERSION: u8  = 0x06;
/// Suffix of the sidecar file holding the stripped footer.
pub const BACKUP_SUFFIX:     &str = "kbckp";

#[derive(Error, Debug)]
pub enum FooterError {
    #[error("file is {len} bytes, too short to hold a {needed}-byte footer field")]
    TooShort { len: u64, needed: u64 },
    #[error("unsupported footer version {0:#04x}, only 0x06 can be handled")]
    UnsupportedVersion(u8),
    #[error("footer backup already exists: {}", .0.display())]
    BackupExists(PathBuf),
    #[error("magic extension is not configured, cannot name the footer backup")]
    NoExtension,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Seek `back` bytes before end-of-file, failing cleanly on short files.
fn seek_from_end<S: Seek>(s: &mut S, back: u64) -> Result<u64, FooterError> {
    let len = s.seek(SeekFrom::End(0))?;
    if len < back {
        return Err(FooterError::TooShort { len, needed: back });
    }
    Ok(s.seek(SeekFrom::Start(len - back))?)
}

/// Read the trailing 12 bytes where the magic would be.
pub fn read_magic<R: Read + Seek>(mut reader: R) -> Result<[u8; MAGIC_LEN], FooterError> {
    seek_from_end(&mut reader, MAGIC_OFFSET)?;
    let mut magic = [0u8; MAGIC_LEN];
    reader.read_exact(&mut magic)?;
    Ok(magic)
}

/// Read the footer version byte.  Errors unless it is `0x06`.
pub fn read_version<R: Read + Seek>(mut reader: R) -> Result<u8, FooterError> {
    seek_from_end(&mut reader, VERSION_OFFSET)?;
    let version = reader.read_u8()?;
    if version != SUPPORTED_VERSION {
        return Err(FooterError::UnsupportedVersion(version));
    }
    Ok(version)
}

/// Read the little-endian progress counter.
pub fn read_counter<R: Read + Seek>(mut reader: R) -> Result<u64, FooterError> {
    seek_from_end(&mut reader, COUNTER_OFFSET)?;
    let counter = reader.read_u64::<LittleEndian>()?;
    log::debug!("read counter {counter} ({})", hex::encode(counter.to_le_bytes()));
    Ok(counter)
}

/// Overwrite the progress counter in place.
pub fn write_counter<W: Write + Seek>(mut writer: W, value: u64) -> Result<(), FooterError> {
    seek_from_end(&mut writer, COUNTER_OFFSET)?;
    log::info!("setting counter to {value} ({})", hex::encode(value.to_le_bytes()));
    writer.write_u64::<LittleEndian>(value)?;
    writer.flush()?;
    Ok(())
}

// ── Magic inspection ─────────────────────────────────────────────────────────

/// What an encrypted file suggests the configuration should be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicReport {
    pub magic:     [u8; MAGIC_LEN],
    /// Final extension, if it has the length the ransomware uses.
    pub extension: Option<String>,
}

impl MagicReport {
    /// A real marker always ends in a NUL byte.
    pub fn looks_legit(&self) -> bool {
        self.magic[MAGIC_LEN - 1] == 0
    }

    /// Shell assignment that would configure this magic, if printable.
    pub fn env_line(&self) -> Option<String> {
        let chars = std::str::from_utf8(&self.magic[..MAGIC_LEN - 1]).ok()?;
        let ext = self.extension.as_deref()?;
        Some(format!("{}={chars} {}={ext}", crate::config::ENV_MAGIC, crate::config::ENV_MAGIC_EXT))
    }
}

/// Read the magic candidate and extension of a file believed to be encrypted.
pub fn inspect_magic(path: &Path) -> Result<MagicReport, FooterError> {
    let magic = read_magic(File::open(path)?)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().count() == crate::config::MAGIC_EXT_LEN)
        .map(str::to_owned);
    Ok(MagicReport { magic, extension })
}

// ── FooterModel ──────────────────────────────────────────────────────────────

/// Footer operations on files, parameterised by the magic configuration.
#[derive(Debug, Clone, Copy)]
pub struct FooterModel<'c> {
    config: &'c MagicConfig,
}

impl<'c> FooterModel<'c> {
    pub fn new(config: &'c MagicConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MagicConfig {
        self.config
    }

    /// Compare the trailing 12 bytes against the configured magic.
    pub fn has_magic<R: Read + Seek>(&self, reader: R) -> Result<bool, FooterError> {
        let expected = match &self.config.magic {
            Some(m) => m,
            None => {
                log::warn!("magic is unknown, treating file as footer-less");
                return Ok(false);
            }
        };
        let found = read_magic(reader)?;
        if &found != expected {
            log::debug!("read magic {:?}", String::from_utf8_lossy(&found));
        }
        Ok(&found == expected)
    }

    pub fn detect_magic(&self, path: &Path) -> Result<bool, FooterError> {
        let is_magic = self.has_magic(File::open(path)?)?;
        log::info!("file {} is {}magic", path.display(), if is_magic { "" } else { "not " });
        Ok(is_magic)
    }

    /// File size minus the footer, if there is one.
    pub fn usable_size(&self, path: &Path) -> Result<u64, FooterError> {
        let size = fs::metadata(path)?.len();
        if self.detect_magic(path)? {
            return size
                .checked_sub(FOOTER_SIZE)
                .ok_or(FooterError::TooShort { len: size, needed: FOOTER_SIZE });
        }
        Ok(size)
    }

    pub fn detect_version(&self, path: &Path) -> Result<u8, FooterError> {
        read_version(File::open(path)?)
    }

    /// Where [`backup_and_strip`](Self::backup_and_strip) saves the footer:
    /// the final extension replaced by `<magic_ext>.kbckp`.
    pub fn backup_path(&self, path: &Path) -> Result<PathBuf, FooterError> {
        let ext = self.config.extension.as_deref().ok_or(FooterError::NoExtension)?;
        Ok(path.with_extension(format!("{ext}.{BACKUP_SUFFIX}")))
    }

    /// Copy the footer to its sidecar and truncate it off the file.
    ///
    /// Returns the sidecar path, or `None` when the file has no magic.
    /// An existing sidecar is never overwritten, and the file is left
    /// untouched in that case.  Calling this twice on one file is a caller
    /// error.
    pub fn backup_and_strip(&self, path: &Path) -> Result<Option<PathBuf>, FooterError> {
        if !self.detect_magic(path)? {
            return Ok(None);
        }
        let backup = self.backup_path(path)?;

        let mut src = OpenOptions::new().read(true).write(true).open(path)?;
        let footer_start = seek_from_end(&mut src, FOOTER_SIZE)?;
        let mut footer = vec![0u8; FOOTER_SIZE as usize];
        src.read_exact(&mut footer)?;

        let mut sidecar = match OpenOptions::new().write(true).create_new(true).open(&backup) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(FooterError::BackupExists(backup));
            }
            Err(e) => return Err(e.into()),
        };
        sidecar.write_all(&footer)?;
        sidecar.sync_all()?;

        src.set_len(footer_start)?;
        log::info!("footer of {} saved to {}", path.display(), backup.display());
        Ok(Some(backup))
    }

    /// Drop the ransomware's extension from the file name, if present.
    pub fn rename_stripped(&self, path: &Path) -> Result<PathBuf, FooterError> {
        let ext = match self.config.extension.as_deref() {
            Some(e) => e,
            None => return Ok(path.to_path_buf()),
        };
        log::debug!("suffix: {:?}; magic ext: {ext}", path.extension());
        if path.extension().and_then(|e| e.to_str()) != Some(ext) {
            return Ok(path.to_path_buf());
        }
        let renamed = path.with_extension("");
        log::info!("renaming {} to {}", path.display(), renamed.display());
        fs::rename(path, &renamed)?;
        Ok(renamed)
    }

    pub fn read_counter(&self, path: &Path) -> Result<u64, FooterError> {
        read_counter(File::open(path)?)
    }

    pub fn write_counter(&self, path: &Path, value: u64) -> Result<(), FooterError> {
        write_counter(OpenOptions::new().read(true).write(true).open(path)?, value)
    }
}
