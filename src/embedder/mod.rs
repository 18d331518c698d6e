//! Text encoders that map queries and postings into the corpus embedding space.

pub mod hashing;
pub mod openai;

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

/// The encoder could not produce a vector for the given text.
#[derive(Debug, thiserror::Error)]
#[error("{model} failed to encode text: {message}")]
pub struct EncodingError {
    model: String,
    message: String,
}

impl EncodingError {
    /// Builds an error attributed to `model`.
    pub fn new(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Model that failed.
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Deterministic text-to-vector capability.
///
/// Output vectors are treated as untrusted: callers sanitize them before any
/// arithmetic.
pub trait Encoder: Send + Sync {
    /// Output width.
    fn dimensions(&self) -> usize;

    /// Identifier reported in logs and errors.
    fn model_name(&self) -> &str;

    /// Encodes a single text.
    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError>;

    /// Encodes several texts, preserving input order.
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EncodingError> {
        texts.iter().map(|text| self.encode(text)).collect()
    }
}

impl<E: Encoder + ?Sized> Encoder for Arc<E> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError> {
        (**self).encode(text)
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EncodingError> {
        (**self).encode_batch(texts)
    }
}

/// Memoizes successful query embeddings in an LRU keyed by the exact text.
pub struct CachedEncoder<E> {
    inner: E,
    cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl<E: Encoder> CachedEncoder<E> {
    /// Wraps `inner`; a `capacity` of 0 disables caching.
    pub fn new(inner: E, capacity: usize) -> Self {
        let cache = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Self { inner, cache }
    }

    /// Number of cached embeddings.
    pub fn cached(&self) -> usize {
        self.cache.as_ref().map_or(0, |cache| cache.lock().len())
    }
}

impl<E: Encoder> Encoder for CachedEncoder<E> {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError> {
        let Some(cache) = &self.cache else {
            return self.inner.encode(text);
        };
        if let Some(hit) = cache.lock().get(text).cloned() {
            return Ok(hit);
        }
        // encode outside the lock so one slow request does not stall the rest
        let embedding = self.inner.encode(text)?;
        cache.lock().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EncodingError> {
        self.inner.encode_batch(texts)
    }
}
