pub mod block;
pub mod config;
pub mod decrypt;
pub mod error;
pub mod footer;
pub mod io_stream;
pub mod limits;
pub mod monitor;
pub mod pipeline;
pub mod progress;
pub mod ranges;
pub mod recovery;

pub use block::{Block, KeyBlock, BLOCK_SIZE};
pub use config::MagicConfig;
pub use decrypt::{decrypt_file, decrypt_store, DecryptOptions, DecryptStats};
pub use error::{Error, Result};
pub use footer::FooterModel;
pub use pipeline::{auto_decrypt, AutoOptions, AutoReport};
pub use ranges::{ranges, ByteRange};
pub use recovery::{recover_key, RecoveryOutcome};
