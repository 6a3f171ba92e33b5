//! The whole recovery of one file:
//!
//! 1. check the footer version, if there is a footer
//! 2. back up and strip the footer (skipped on dry runs)
//! 3. recover the key, unless one was supplied
//! 4. decrypt
//! 5. drop the ransomware's extension (skipped on dry runs)

use std::path::{Path, PathBuf};

use crate::block::KeyBlock;
use crate::config::MagicConfig;
use crate::decrypt::{decrypt_file, DecryptOptions, DecryptStats};
use crate::error::Result;
use crate::footer::FooterModel;
use crate::recovery::recover_key;

#[derive(Debug, Clone, Default)]
pub struct AutoOptions {
    pub dry_run:     bool,
    pub lower_limit: Option<u64>,
    pub upper_limit: Option<u64>,
    /// Skip key recovery and use this key.
    pub key:         Option<KeyBlock>,
}

#[derive(Debug, Clone)]
pub struct AutoReport {
    /// Final location of the file, renamed unless this was a dry run.
    pub path:        PathBuf,
    pub backup:      Option<PathBuf>,
    pub key:         KeyBlock,
    pub usable_size: u64,
    pub stats:       DecryptStats,
}

pub fn auto_decrypt(path: &Path, config: &MagicConfig, opts: &AutoOptions) -> Result<AutoReport> {
    let footer = FooterModel::new(config);

    if footer.detect_magic(path)? {
        footer.detect_version(path)?;
    }

    let backup = if opts.dry_run { None } else { footer.backup_and_strip(path)? };
    let usable_size = footer.usable_size(path)?;

    let key = match opts.key {
        Some(k) => k,
        None    => recover_key(path, usable_size, opts.lower_limit, None)?,
    };
    log::info!("using key {key}");

    let dopts = DecryptOptions {
        dry_run:     opts.dry_run,
        lower_limit: opts.lower_limit,
        upper_limit: opts.upper_limit,
        ..DecryptOptions::default()
    };
    let stats = decrypt_file(path, &key, usable_size, &dopts)?;

    let path = if opts.dry_run { path.to_path_buf() } else { footer.rename_stripped(path)? };
    Ok(AutoReport { path, backup, key, usable_size, stats })
}
