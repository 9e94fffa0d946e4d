//! Offline FNV-1a feature-hashing embedder.
//!
//! Character 3- and 4-grams of the lowercased text are hashed into a fixed
//! number of buckets with a hash-derived sign, then L2-normalised. No model
//! download and no network; the same text always maps to the same vector.
//! Used for tests, dry runs, and machines without an embedding server.

use async_trait::async_trait;
use docrag_core::embedding::Embedder;
use docrag_core::{Error, Result};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001B3;

pub const DEFAULT_HASH_DIMS: usize = 256;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    name: String,
    dims: usize,
    ngram_range: (usize, usize),
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            return Err(Error::Config("hash embedder dims must be > 0".to_string()));
        }
        Ok(Self {
            name: format!("fnv1a-hash-{}", dims),
            dims,
            ngram_range: (3, 4),
        })
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for n in self.ngram_range.0..=self.ngram_range.1 {
            if n > chars.len() {
                continue;
            }
            for window in chars.windows(n) {
                let ngram: String = window.iter().collect();
                let h = fnv1a(ngram.as_bytes());
                let bucket = (h % self.dims as u64) as usize;
                let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
                vector[bucket] += sign;
            }
        }

        l2_normalize(&mut vector);
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            name: format!("fnv1a-hash-{}", DEFAULT_HASH_DIMS),
            dims: DEFAULT_HASH_DIMS,
            ngram_range: (3, 4),
        }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }
}
