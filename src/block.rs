//! 64-byte blocks and the chained-XOR transform.
//!
//! The ransomware encrypts every selected range block by block:
//!
//! ```text
//! c[0] = p[0] ^ key
//! c[i] = p[i] ^ key ^ c[i-1]
//! ```
//!
//! so inverting a block needs the key and the *ciphertext* of the block
//! before it.  The chain is seeded with the zero block at the start of
//! every range.

use std::fmt;

/// Size of one block in bytes.  Every cryptographic operation is block-wise.
pub const BLOCK_SIZE: usize = 64;

/// Exactly 64 raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block(pub [u8; BLOCK_SIZE]);

/// The recovered (or user-supplied) key.  Immutable once determined.
pub type KeyBlock = Block;

impl Block {
    pub const ZERO: Block = Block([0u8; BLOCK_SIZE]);

    /// Build a block from a slice; `None` unless the slice is exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; BLOCK_SIZE] = bytes.try_into().ok()?;
        Some(Block(arr))
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// XOR two blocks.  Both sides are viewed as native-endian u64 lanes,
    /// so the result is identical to a byte-wise XOR on any host.
    pub fn xor(&self, other: &Block) -> Block {
        let mut out = [0u8; BLOCK_SIZE];
        let lanes = out
            .chunks_exact_mut(8)
            .zip(self.0.chunks_exact(8))
            .zip(other.0.chunks_exact(8));
        for ((o, a), b) in lanes {
            o.copy_from_slice(&(lane(a) ^ lane(b)).to_ne_bytes());
        }
        Block(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

fn lane(bytes: &[u8]) -> u64 {
    let mut w = [0u8; 8];
    w.copy_from_slice(bytes);
    u64::from_ne_bytes(w)
}

impl Default for Block {
    fn default() -> Self {
        Block::ZERO
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({})", self.to_hex())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// XOR two byte strings of possibly different length.  The result is
/// truncated to the shorter input.
pub fn xor_bytes(data: &[u8], key: &[u8]) -> Vec<u8> {
    data.iter().zip(key.iter()).map(|(a, b)| a ^ b).collect()
}

// ── Chain state ──────────────────────────────────────────────────────────────

/// Inversion state for one range.  Feed ciphertext blocks in order.
#[derive(Debug, Clone)]
pub struct ChainDecoder<'k> {
    key:      &'k KeyBlock,
    previous: Block,
}

impl<'k> ChainDecoder<'k> {
    /// Start a new range; the chain is seeded with the zero block.
    pub fn new(key: &'k KeyBlock) -> Self {
        Self { key, previous: Block::ZERO }
    }

    /// Recover the plaintext of the next block.  The ciphertext, not the
    /// plaintext, becomes the chaining input for the following block.
    pub fn decode(&mut self, ciphertext: &Block) -> Block {
        let plain = ciphertext.xor(self.key).xor(&self.previous);
        self.previous = *ciphertext;
        plain
    }
}

/// Forward transform, the way the ransomware applies it.
#[derive(Debug, Clone)]
pub struct ChainEncoder<'k> {
    key:      &'k KeyBlock,
    previous: Block,
}

impl<'k> ChainEncoder<'k> {
    pub fn new(key: &'k KeyBlock) -> Self {
        Self { key, previous: Block::ZERO }
    }

    pub fn encode(&mut self, plaintext: &Block) -> Block {
        let cipher = plaintext.xor(self.key).xor(&self.previous);
        self.previous = cipher;
        cipher
    }
}

/// Apply the forward chained XOR to every whole block of `data` in place.
/// Trailing bytes that do not fill a block are left untouched.
pub fn encrypt_range(data: &mut [u8], key: &KeyBlock) {
    let mut enc = ChainEncoder::new(key);
    for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
        if let Some(p) = Block::from_slice(chunk) {
            chunk.copy_from_slice(enc.encode(&p).as_bytes());
        }
    }
}

/// Invert [`encrypt_range`] in place.
pub fn decrypt_range(data: &mut [u8], key: &KeyBlock) {
    let mut dec = ChainDecoder::new(key);
    for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
        if let Some(c) = Block::from_slice(chunk) {
            chunk.copy_from_slice(dec.decode(&c).as_bytes());
        }
    }
}
