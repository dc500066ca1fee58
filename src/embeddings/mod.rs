//! Provides abstractions for generating embeddings from text and images.
//!
//! The search engine only sees these traits. Whatever model runtime sits
//! behind an implementation, its output is converted to a plain `Vec<f32>`
//! before it leaves the provider.

use crate::error::EmbeddingError;

/// A trait for providers that can generate embeddings from text.
///
/// The `Send` and `Sync` bounds are required to allow the embedder to be shared
/// by concurrent searches.
pub trait TextEmbedder: Send + Sync {
  /// Generates an embedding vector for a given string slice.
  fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

  /// Dimensionality of every vector this embedder returns.
  fn dimension(&self) -> usize;

  /// Name of the underlying model, for diagnostics.
  fn model_name(&self) -> &str;

  /// Generates embeddings for a batch of string slices.
  ///
  /// The default implementation embeds one text at a time. Implementors can
  /// override this when their model batches natively.
  fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    texts.iter().map(|t| self.embed(t)).collect()
  }
}

/// A trait for providers that can generate embeddings from image data.
pub trait ImageEmbedder: Send + Sync {
  /// Generates an embedding vector for the given encoded image bytes.
  fn embed(&self, image_data: &[u8]) -> Result<Vec<f32>, EmbeddingError>;

  /// Dimensionality of every vector this embedder returns.
  fn dimension(&self) -> usize;

  /// Name of the underlying model, for diagnostics.
  fn model_name(&self) -> &str;
}

/// Checks that `vector` has exactly `expected` components.
pub fn check_dimension(vector: &[f32], expected: usize) -> Result<(), EmbeddingError> {
  if vector.len() == expected {
    Ok(())
  } else {
    Err(EmbeddingError::DimensionMismatch {
      expected,
      actual: vector.len(),
    })
  }
}

/// Scales `vector` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
  let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
  if norm > f32::EPSILON {
    for x in vector.iter_mut() {
      *x /= norm;
    }
  }
}

/// Dot product of two equal-length vectors; mismatched lengths score 0.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() {
    return 0.0;
  }
  a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Deterministic pseudo-random unit vector seeded from `bytes`.
///
/// Uses a simple linear congruential generator so the same input always
/// yields the same vector.
fn seeded_vector(bytes: &[u8], dimension: usize) -> Vec<f32> {
  let hash = bytes
    .iter()
    .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as u64));

  let mut vec = Vec::with_capacity(dimension);
  let mut seed = hash;

  for _ in 0..dimension {
    seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
    let val = ((seed / 65536) % 32768) as f32 / 32768.0;
    // Center around zero so unrelated inputs are not all strongly similar.
    vec.push(val - 0.5);
  }

  l2_normalize(&mut vec);
  vec
}

/// A stub implementation of `TextEmbedder` for testing and demonstration.
///
/// This embedder does not use a real model. It hashes the input text into a
/// deterministic unit vector.
pub struct StubTextEmbedder {
  /// The dimensionality of the vectors to be generated.
  dimension: usize,
}

impl StubTextEmbedder {
  /// Creates a new `StubTextEmbedder` with a specified vector dimension.
  pub fn new(dimension: usize) -> Self {
    Self { dimension }
  }
}

impl Default for StubTextEmbedder {
  /// Matches the 1024-dim text space of BGE-M3 style encoders.
  fn default() -> Self {
    Self::new(1024)
  }
}

impl TextEmbedder for StubTextEmbedder {
  fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let text = text.trim();
    if text.is_empty() {
      return Err(EmbeddingError::EmptyInput);
    }
    Ok(seeded_vector(text.to_lowercase().as_bytes(), self.dimension))
  }

  fn dimension(&self) -> usize {
    self.dimension
  }

  fn model_name(&self) -> &str {
    "stub-text"
  }
}

/// A stub implementation of `ImageEmbedder`, hashing the raw image bytes.
pub struct StubImageEmbedder {
  dimension: usize,
}

impl StubImageEmbedder {
  pub fn new(dimension: usize) -> Self {
    Self { dimension }
  }
}

impl Default for StubImageEmbedder {
  /// Matches the 768-dim image space of SigLIP style encoders.
  fn default() -> Self {
    Self::new(768)
  }
}

impl ImageEmbedder for StubImageEmbedder {
  fn embed(&self, image_data: &[u8]) -> Result<Vec<f32>, EmbeddingError> {
    if image_data.is_empty() {
      return Err(EmbeddingError::EmptyInput);
    }
    Ok(seeded_vector(image_data, self.dimension))
  }

  fn dimension(&self) -> usize {
    self.dimension
  }

  fn model_name(&self) -> &str {
    "stub-image"
  }
}
