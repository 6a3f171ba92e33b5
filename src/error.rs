//! Crate-wide error type.
//!
//! Every component has its own error enum; this one sorts them into the
//! categories a caller acts on.  Nothing is retried: a failed run is
//! restarted explicitly, with explicit bounds.

use std::io;
use thiserror::Error;

use crate::config::ConfigError;
use crate::decrypt::DecryptError;
use crate::footer::FooterError;
use crate::recovery::KeyRecoveryError;

#[derive(Error, Debug)]
pub enum Error {
    /// Magic or extension missing without the override.  Raised before any
    /// file is touched.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    /// File too short for a footer field, or an unsupported footer version.
    #[error("malformed input: {0}")]
    MalformedInput(FooterError),
    /// Refusing to overwrite a footer backup, or no extension to name one.
    #[error("footer: {0}")]
    Footer(FooterError),
    /// No write has happened when this is raised.
    #[error("key recovery failed: {0}")]
    KeyRecovery(KeyRecoveryError),
    /// A generated range shorter than one block.  Always a bug.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<FooterError> for Error {
    fn from(e: FooterError) -> Self {
        match e {
            FooterError::Io(io) => Error::Io(io),
            e @ (FooterError::TooShort { .. } | FooterError::UnsupportedVersion(_)) => Error::MalformedInput(e),
            other => Error::Footer(other),
        }
    }
}

impl From<KeyRecoveryError> for Error {
    fn from(e: KeyRecoveryError) -> Self {
        match e {
            KeyRecoveryError::Io(io) => Error::Io(io),
            other                    => Error::KeyRecovery(other),
        }
    }
}

impl From<DecryptError> for Error {
    fn from(e: DecryptError) -> Self {
        match e {
            DecryptError::Io(io) => Error::Io(io),
            e @ DecryptError::RangeTooShort { .. } => Error::InvariantViolation(e.to_string()),
            e @ DecryptError::InvalidBounds { .. } => Error::InvalidArgument(e.to_string()),
        }
    }
}
