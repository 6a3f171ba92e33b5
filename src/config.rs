//! Magic-marker configuration.
//!
//! Built once at startup, either from the environment or from a JSON file,
//! and passed by reference to everything that needs to recognise the footer.
//!
//! | Variable            | Meaning                                          |
//! |---------------------|--------------------------------------------------|
//! | `SRL_BBB_MAGIC`     | 11 magic characters; a trailing NUL is appended   |
//! | `SRL_BBB_MAGIC_EXT` | 9-character extension of encrypted files          |
//! | `SRL_IGNORE_MAGIC`  | any non-empty value: run without a known magic    |

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const ENV_MAGIC:        &str = "SRL_BBB_MAGIC";
pub const ENV_MAGIC_EXT:    &str = "SRL_BBB_MAGIC_EXT";
pub const ENV_IGNORE_MAGIC: &str = "SRL_IGNORE_MAGIC";

/// Magic marker length including the trailing NUL.
pub const MAGIC_LEN:     usize = 12;
/// Length of the extension the ransomware appends.
pub const MAGIC_EXT_LEN: usize = 9;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("magic is not configured; set SRL_BBB_MAGIC or SRL_IGNORE_MAGIC if you know what you are doing")]
    MissingMagic,
    #[error("magic extension is not configured; set SRL_BBB_MAGIC_EXT or SRL_IGNORE_MAGIC")]
    MissingExtension,
    #[error("expected 11 magic characters, got {0}")]
    MagicLength(usize),
    #[error("magic must end in a NUL byte")]
    MagicNotTerminated,
    #[error("expected 9 extension characters, got {0}")]
    ExtensionLength(usize),
    #[error("config file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// On-disk form of the configuration.  `magic` is the 11 printable
/// characters, exactly as in the environment variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    magic:        Option<String>,
    #[serde(default, alias = "magic_ext")]
    extension:    Option<String>,
    #[serde(default)]
    ignore_magic: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MagicConfig {
    /// Full 12-byte marker, trailing NUL included.
    pub magic:        Option<[u8; MAGIC_LEN]>,
    /// Extension without the leading dot.
    pub extension:    Option<String>,
    pub ignore_magic: bool,
}

impl MagicConfig {
    /// Configuration with a known magic and extension.
    pub fn new(magic: &str, extension: &str) -> Result<Self, ConfigError> {
        Self::from_parts(Some(magic), Some(extension), false)
    }

    /// Configuration that never detects a footer.
    pub fn ignoring_magic() -> Self {
        Self { magic: None, extension: None, ignore_magic: true }
    }

    /// Read `SRL_BBB_MAGIC`, `SRL_BBB_MAGIC_EXT` and `SRL_IGNORE_MAGIC`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let magic  = non_empty_var(ENV_MAGIC);
        let ext    = non_empty_var(ENV_MAGIC_EXT);
        let ignore = non_empty_var(ENV_IGNORE_MAGIC).is_some();
        Self::from_parts(magic.as_deref(), ext.as_deref(), ignore)
    }

    /// Load a JSON file of the form
    /// `{"magic": "...", "extension": "...", "ignore_magic": false}`.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        Self::from_json(&bytes)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let f: ConfigFile = serde_json::from_slice(bytes)?;
        Self::from_parts(f.magic.as_deref(), f.extension.as_deref(), f.ignore_magic)
    }

    fn from_parts(magic: Option<&str>, ext: Option<&str>, ignore_magic: bool) -> Result<Self, ConfigError> {
        let magic = magic.map(encode_magic).transpose()?;
        let cfg = Self { magic, extension: ext.map(str::to_owned), ignore_magic };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fail fast unless both magic and extension are known, or the
    /// override is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(m) = &self.magic {
            if m[MAGIC_LEN - 1] != 0 {
                return Err(ConfigError::MagicNotTerminated);
            }
        }
        if let Some(ext) = &self.extension {
            let n = ext.chars().count();
            if n != MAGIC_EXT_LEN {
                return Err(ConfigError::ExtensionLength(n));
            }
        }
        if self.ignore_magic {
            return Ok(());
        }
        if self.magic.is_none() {
            return Err(ConfigError::MissingMagic);
        }
        if self.extension.is_none() {
            return Err(ConfigError::MissingExtension);
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Append the NUL terminator to the configured magic characters.
fn encode_magic(s: &str) -> Result<[u8; MAGIC_LEN], ConfigError> {
    let bytes = s.as_bytes();
    if bytes.len() != MAGIC_LEN - 1 {
        return Err(ConfigError::MagicLength(bytes.len()));
    }
    let mut out = [0u8; MAGIC_LEN];
    out[..MAGIC_LEN - 1].copy_from_slice(bytes);
    Ok(out)
}
