//! Offline feature-hashing encoder.
//!
//! Each lower-cased alphanumeric token is hashed with a seeded mix into one of
//! `dimensions` buckets; a second seed picks the sign so unrelated tokens that
//! collide tend to cancel instead of piling up. Output is deterministic across
//! runs and platforms, which makes it usable for development corpora and tests
//! without a model server.

use super::{EncodingError, Encoder};

const BUCKET_SEED: u64 = 0x517c_c1b7_2722_0a95;
const SIGN_SEED: u64 = 0x9e37_79b1_85eb_ca87;

/// Bag-of-tokens encoder using the hashing trick.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimensions: usize,
    model: String,
}

impl HashingEncoder {
    /// Builds an encoder emitting `dimensions`-wide vectors.
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model: format!("hashing-{dimensions}"),
        }
    }
}

impl Encoder for HashingEncoder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let bytes = token.as_bytes();
            let bucket = (mix_hash(bytes, BUCKET_SEED) % self.dimensions as u64) as usize;
            let sign = if mix_hash(bytes, SIGN_SEED) & 1 == 0 {
                1.0
            } else {
                -1.0
            };
            vector[bucket] += sign;
        }
        Ok(vector)
    }
}

/// Lower-cased alphanumeric runs of at least two characters.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_lowercase)
}

fn mix_hash(data: &[u8], seed: u64) -> u64 {
    let mut hash = seed ^ data.len() as u64;
    for &byte in data {
        hash ^= (byte as u64).wrapping_mul(0x1000_0000_01b3);
        hash = hash.rotate_left(13).wrapping_mul(0xff51_afd7_ed55_8ccd);
    }
    hash ^ (hash >> 33)
}
