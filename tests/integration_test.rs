use kbdecrypt::block::{encrypt_range, Block, KeyBlock, BLOCK_SIZE};
use kbdecrypt::config::MagicConfig;
use kbdecrypt::decrypt::{decrypt_file, DecryptOptions};
use kbdecrypt::footer::{FooterError, FooterModel, FOOTER_SIZE, SUPPORTED_VERSION};
use kbdecrypt::pipeline::{auto_decrypt, AutoOptions};
use kbdecrypt::ranges::ranges;
use kbdecrypt::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const MAGIC: &str = "abcdefghijk";
const EXT:   &str = "basta1234";

fn config() -> MagicConfig {
    MagicConfig::new(MAGIC, EXT).unwrap()
}

fn key() -> KeyBlock {
    let mut k = [0u8; BLOCK_SIZE];
    k[BLOCK_SIZE - 1] = 0x01;
    Block(k)
}

fn footer(version: u8, counter: u64) -> Vec<u8> {
    let mut f = vec![0u8; FOOTER_SIZE as usize];
    let n = f.len();
    f[n - 23] = version;
    f[n - 22..n - 14].copy_from_slice(&counter.to_le_bytes());
    f[n - 12..n - 1].copy_from_slice(MAGIC.as_bytes());
    f
}

/// Encrypt `plain` the way the ransomware does and append a footer.
fn write_victim(dir: &Path, plain: &[u8], version: u8) -> PathBuf {
    let k = key();
    let mut data = plain.to_vec();
    for r in ranges(plain.len() as u64) {
        encrypt_range(&mut data[r.offset as usize..r.end() as usize], &k);
    }
    data.extend(footer(version, plain.len() as u64));
    let p = dir.join(format!("disk.img.{EXT}"));
    fs::write(&p, data).unwrap();
    p
}

/// Non-zero head, zero everywhere else so key recovery has candidates.
fn sparse_plaintext(n: usize) -> Vec<u8> {
    (0..n).map(|i| if i < 512 { (i % 251 + 1) as u8 } else { 0 }).collect()
}

fn text_plaintext(n: usize) -> Vec<u8> {
    b"The quick brown fox jumps over the lazy dog. ".iter().cycle().take(n).copied().collect()
}

#[test]
fn decrypt_with_known_key() {
    let dir = tempdir().unwrap();
    let cfg = config();
    let fm = FooterModel::new(&cfg);
    let plain = text_plaintext(10_000);
    let p = write_victim(dir.path(), &plain, SUPPORTED_VERSION);

    let backup = fm.backup_and_strip(&p).unwrap().unwrap();
    assert_eq!(backup, dir.path().join(format!("disk.img.{EXT}.kbckp")));
    assert_eq!(fs::read(&backup).unwrap(), footer(SUPPORTED_VERSION, 10_000));

    let usable = fm.usable_size(&p).unwrap();
    assert_eq!(usable, 10_000);
    let stats = decrypt_file(&p, &key(), usable, &DecryptOptions::default()).unwrap();
    assert_eq!(stats.ranges, ranges(10_000).count() as u64);

    let renamed = fm.rename_stripped(&p).unwrap();
    assert_eq!(renamed, dir.path().join("disk.img"));
    assert!(!p.exists());
    assert_eq!(fs::read(&renamed).unwrap(), plain);
}

#[test]
fn auto_recovers_key_and_decrypts() {
    let dir = tempdir().unwrap();
    let plain = sparse_plaintext(20_000);
    let p = write_victim(dir.path(), &plain, SUPPORTED_VERSION);

    let report = auto_decrypt(&p, &config(), &AutoOptions::default()).unwrap();
    assert_eq!(report.key, key());
    assert_eq!(report.usable_size, 20_000);
    assert_eq!(report.path, dir.path().join("disk.img"));
    assert!(report.backup.as_ref().is_some_and(|b| b.exists()));
    assert_eq!(fs::read(&report.path).unwrap(), plain);
}

#[test]
fn dry_run_leaves_file_alone() {
    let dir = tempdir().unwrap();
    let p = write_victim(dir.path(), &sparse_plaintext(20_000), SUPPORTED_VERSION);
    let before = fs::read(&p).unwrap();

    let opts = AutoOptions { dry_run: true, ..AutoOptions::default() };
    let report = auto_decrypt(&p, &config(), &opts).unwrap();
    assert_eq!(report.key, key());
    assert_eq!(report.path, p);
    assert!(report.backup.is_none());
    assert_eq!(fs::read(&p).unwrap(), before);
    assert!(!dir.path().join(format!("disk.img.{EXT}.kbckp")).exists());
}

#[test]
fn unsupported_version_is_refused_before_any_write() {
    let dir = tempdir().unwrap();
    let p = write_victim(dir.path(), &sparse_plaintext(20_000), 0x05);
    let before = fs::read(&p).unwrap();

    let err = auto_decrypt(&p, &config(), &AutoOptions::default()).unwrap_err();
    assert!(matches!(err, Error::MalformedInput(FooterError::UnsupportedVersion(5))));
    assert_eq!(fs::read(&p).unwrap(), before);
}

#[test]
fn existing_backup_is_never_overwritten() {
    let dir = tempdir().unwrap();
    let cfg = config();
    let fm = FooterModel::new(&cfg);
    let p = write_victim(dir.path(), &text_plaintext(10_000), SUPPORTED_VERSION);
    let sidecar = fm.backup_path(&p).unwrap();
    fs::write(&sidecar, b"earlier run").unwrap();
    let before = fs::read(&p).unwrap();

    let err = fm.backup_and_strip(&p).unwrap_err();
    assert!(matches!(err, FooterError::BackupExists(ref b) if *b == sidecar));
    assert_eq!(fs::read(&sidecar).unwrap(), b"earlier run");
    assert_eq!(fs::read(&p).unwrap(), before);

    let err: Error = err.into();
    assert!(matches!(err, Error::Footer(_)));
}

#[test]
fn zero_file_has_no_key() {
    let dir = tempdir().unwrap();
    let p = dir.path().join("zeros.bin");
    fs::write(&p, vec![0u8; 20_000]).unwrap();

    let cfg = MagicConfig::ignoring_magic();
    let err = auto_decrypt(&p, &cfg, &AutoOptions::default()).unwrap_err();
    assert!(matches!(err, Error::KeyRecovery(_)));
    assert_eq!(fs::read(&p).unwrap(), vec![0u8; 20_000]);
}

#[test]
fn supplied_key_skips_recovery() {
    let dir = tempdir().unwrap();
    let plain = text_plaintext(10_000);
    let p = write_victim(dir.path(), &plain, SUPPORTED_VERSION);

    let opts = AutoOptions { key: Some(key()), ..AutoOptions::default() };
    let report = auto_decrypt(&p, &config(), &opts).unwrap();
    assert_eq!(fs::read(&report.path).unwrap(), plain);
}
