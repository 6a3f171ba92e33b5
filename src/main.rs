use clap::{Parser, Subcommand};
use kbdecrypt::block::{Block, KeyBlock, BLOCK_SIZE};
use kbdecrypt::config::MagicConfig;
use kbdecrypt::decrypt::{decrypt_file, DecryptOptions};
use kbdecrypt::footer::{inspect_magic, FooterModel};
use kbdecrypt::limits::{resolve, Limit};
use kbdecrypt::monitor::{sample_progress, set_counter_to_size};
use kbdecrypt::pipeline::{auto_decrypt, AutoOptions};
use kbdecrypt::ranges::ranges;
use kbdecrypt::recovery::{extract_block, find_block, recover_key, xor_at};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "kbdecrypt", about = "Recover files hit by intermittent chained-XOR encryption")]
struct Cli {
    /// JSON file with magic, extension and ignore_magic; overrides the environment
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the key from encrypted zero runs and decrypt the whole file
    Auto {
        file: PathBuf,
        /// Do not write anything
        #[arg(long)]
        dry: bool,
        /// Start here (bytes, 0x-hex, or N%)
        #[arg(long)]
        start_at: Option<Limit>,
        #[arg(long)]
        end_at: Option<Limit>,
        /// Use this 64-byte key file instead of detecting one
        #[arg(long)]
        key: Option<PathBuf>,
    },
    /// Decrypt with a known 64-byte key file
    Decrypt {
        file: PathBuf,
        key: PathBuf,
        #[arg(long)]
        dry: bool,
        #[arg(long)]
        start_at: Option<Limit>,
        #[arg(long)]
        end_at: Option<Limit>,
        /// Generate ranges for this size instead of the file's usable size
        #[arg(long)]
        assume_size: Option<Limit>,
    },
    /// Cut a chunk out of a file, or detect the key with `auto`
    ExtractKey {
        file: PathBuf,
        /// Byte offset, or `auto`
        offset: KeyOffset,
        /// Chunk size for explicit offsets
        #[arg(long, default_value_t = BLOCK_SIZE)]
        size: usize,
        #[arg(long)]
        start_at: Option<Limit>,
        /// Write the chunk here (never overwrites) rather than to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        hexdump: bool,
    },
    /// Print the encrypted ranges of a file
    Ranges {
        file: Option<PathBuf>,
        /// Use this size instead of a file
        #[arg(long, conflicts_with = "file")]
        size: Option<u64>,
    },
    /// Read, watch or reset the footer progress counter
    Counter {
        file: PathBuf,
        /// Set the counter to the file's usable size
        #[arg(long)]
        set_to_size: bool,
        /// Re-read every N seconds
        #[arg(long, num_args = 0..=1, default_missing_value = "30")]
        wait: Option<u64>,
        /// Stop after this many re-reads
        #[arg(long)]
        samples: Option<usize>,
    },
    /// Show the magic and extension of an encrypted file
    Magic {
        file: PathBuf,
    },
    /// Print generated range offsets whose block equals a given chunk
    Find {
        file: PathBuf,
        block: PathBuf,
        #[arg(long)]
        start_at: Option<Limit>,
        #[arg(long)]
        end_at: Option<Limit>,
    },
    /// XOR one chunk of a file at an offset with a key
    Xor {
        file: PathBuf,
        key: PathBuf,
        offset: Limit,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug)]
enum KeyOffset {
    Auto,
    At(Limit),
}

impl FromStr for KeyOffset {
    type Err = kbdecrypt::limits::LimitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "auto" {
            return Ok(KeyOffset::Auto);
        }
        s.parse().map(KeyOffset::At)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(Some(env_logger::TimestampPrecision::Seconds))
        .init();

    match cli.command {

        // ── Auto ─────────────────────────────────────────────────────────────
        Commands::Auto { file, dry, start_at, end_at, key } => {
            let config = load_config(&cli.config)?;
            let size = FooterModel::new(&config).usable_size(&file)?;
            let opts = AutoOptions {
                dry_run:     dry,
                lower_limit: resolve(start_at, size),
                upper_limit: resolve(end_at, size),
                key:         key.as_deref().map(read_key).transpose()?,
            };
            let report = auto_decrypt(&file, &config, &opts)?;
            if let Some(b) = &report.backup {
                eprintln!("Footer saved to: {}", b.display());
            }
            if dry {
                println!("Dry run, key {}: {}", report.key, report.path.display());
            } else {
                println!("Decrypted: {}", report.path.display());
            }
        }

        // ── Decrypt ──────────────────────────────────────────────────────────
        Commands::Decrypt { file, key, dry, start_at, end_at, assume_size } => {
            let config = load_config(&cli.config)?;
            let key = read_key(&key)?;
            let footer = FooterModel::new(&config);
            if !dry {
                footer.backup_and_strip(&file)?;
            }
            let usable = footer.usable_size(&file)?;
            let size = resolve(assume_size, usable).unwrap_or(usable);
            let opts = DecryptOptions {
                dry_run:     dry,
                lower_limit: resolve(start_at, size),
                upper_limit: resolve(end_at, size),
                ..DecryptOptions::default()
            };
            let stats = decrypt_file(&file, &key, size, &opts)?;
            let path = if dry { file } else { footer.rename_stripped(&file)? };
            println!("Decrypted {} block(s): {}", stats.blocks, path.display());
        }

        // ── ExtractKey ───────────────────────────────────────────────────────
        Commands::ExtractKey { file, offset, size, start_at, output, hexdump } => {
            let chunk = match offset {
                KeyOffset::Auto => {
                    let config = load_config(&cli.config)?;
                    let usable = FooterModel::new(&config).usable_size(&file)?;
                    recover_key(&file, usable, resolve(start_at, usable), None)?.0.to_vec()
                }
                KeyOffset::At(at) => {
                    let len = File::open(&file)?.metadata()?.len();
                    extract_block(&mut File::open(&file)?, at.resolve(len), size)?
                }
            };
            if hexdump {
                eprint!("{}", hex_dump(&chunk));
            }
            write_output(output.as_deref(), &chunk)?;
        }

        // ── Ranges ───────────────────────────────────────────────────────────
        Commands::Ranges { file, size } => {
            let size = match (size, file) {
                (Some(s), _) => s,
                (None, Some(f)) => FooterModel::new(&load_config(&cli.config)?).usable_size(&f)?,
                (None, None) => return Err("provide a file or --size".into()),
            };
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for r in ranges(size) {
                writeln!(out, "{:#x} {}", r.offset, r.length)?;
            }
        }

        // ── Counter ──────────────────────────────────────────────────────────
        Commands::Counter { file, set_to_size, wait, samples } => {
            let config = load_config(&cli.config)?;
            let footer = FooterModel::new(&config);
            println!("Counter for {} is {}", file.display(), footer.read_counter(&file)?);
            if set_to_size {
                println!("Counter set to {}", set_counter_to_size(&footer, &file)?);
            }
            if let Some(secs) = wait {
                log::info!("waiting for changes every {secs} seconds");
                sample_progress(&footer, &file, Duration::from_secs(secs), samples, |s| println!("{s}"))?;
            }
        }

        // ── Magic ────────────────────────────────────────────────────────────
        Commands::Magic { file } => {
            let report = inspect_magic(&file)?;
            println!("Your magic is {:?}", String::from_utf8_lossy(&report.magic));
            if !report.looks_legit() {
                println!("Your magic does not look legit: last byte is {:#04x}", report.magic[11]);
            }
            if let Some(ext) = &report.extension {
                println!("Your magic extension is {ext}");
            }
            if let Some(line) = report.env_line() {
                println!();
                println!("Run with:");
                println!("env {line} kbdecrypt auto {}", file.display());
            }
        }

        // ── Find ─────────────────────────────────────────────────────────────
        Commands::Find { file, block, start_at, end_at } => {
            let needle = read_key(&block)?;
            let size = File::open(&file)?.metadata()?.len();
            let lower = resolve(start_at, size).unwrap_or(0);
            let upper = resolve(end_at, size).unwrap_or(size);
            log::info!("looking for\n{}in {} (from {lower} to {upper})", hex_dump(&needle.0), file.display());
            for offset in find_block(&mut File::open(&file)?, size, &needle, lower, upper)? {
                println!("{offset}");
            }
        }

        // ── Xor ──────────────────────────────────────────────────────────────
        Commands::Xor { file, key, offset, output } => {
            let key = std::fs::read(&key)?;
            let len = File::open(&file)?.metadata()?.len();
            let at = offset.resolve(len);
            let original = extract_block(&mut File::open(&file)?, at, key.len())?;
            let result = xor_at(&mut File::open(&file)?, at, &key)?;
            println!("Key:\n{}", hex_dump(&key));
            println!("Original:\n{}", hex_dump(&original));
            println!("Result:\n{}", hex_dump(&result));
            if let Some(out) = output {
                write_output(Some(&out), &result)?;
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn load_config(path: &Option<PathBuf>) -> Result<MagicConfig, kbdecrypt::config::ConfigError> {
    match path {
        Some(p) => MagicConfig::from_json_file(p),
        None    => MagicConfig::from_env(),
    }
}

fn read_key(path: &Path) -> Result<KeyBlock, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path)?;
    Block::from_slice(&bytes).ok_or_else(|| {
        format!("{} is {} bytes, a key is exactly {BLOCK_SIZE}", path.display(), bytes.len()).into()
    })
}

/// Write to a new file (never overwriting) or to stdout.
fn write_output(path: Option<&Path>, data: &[u8]) -> std::io::Result<()> {
    match path {
        Some(p) => OpenOptions::new().write(true).create_new(true).open(p)?.write_all(data),
        None    => std::io::stdout().lock().write_all(data),
    }
}

fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(16).enumerate() {
        let ascii: String = line
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}: {:<32}  {}\n", i * 16, hex::encode(line), ascii));
    }
    out
}
