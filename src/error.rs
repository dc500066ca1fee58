//! Error types for every layer of the search pipeline.
//!
//! Collaborator failures ([`EmbeddingError`], [`StoreError`]) are wrapped in a
//! [`RetrievalError`] for the modality they broke, and the engine translates
//! whatever is left into a [`SearchError`] before returning to the caller.

use crate::types::Modality;
use thiserror::Error;

/// Errors surfaced by [`SearchEngine`](crate::engine::SearchEngine).
#[derive(Debug, Error)]
pub enum SearchError {
  /// The query is missing both modalities or a parameter is out of bounds.
  #[error("invalid query: {0}")]
  InvalidQuery(String),
  /// Every attempted retrieval failed, so there is nothing to rank.
  #[error("no candidates: {0}")]
  NoCandidates(String),
  /// The engine could not be assembled from the supplied parts.
  #[error("engine misconfigured: {0}")]
  Configuration(String),
  /// A maintenance call (stats, indexing) could not reach its collaborator.
  #[error("backend unavailable: {0}")]
  Unavailable(String),
}

impl SearchError {
  pub(crate) fn invalid(message: impl Into<String>) -> Self {
    SearchError::InvalidQuery(message.into())
  }
}

impl From<RetrievalError> for SearchError {
  fn from(err: RetrievalError) -> Self {
    SearchError::Unavailable(err.to_string())
  }
}

impl From<ConfigError> for SearchError {
  fn from(err: ConfigError) -> Self {
    SearchError::Configuration(err.to_string())
  }
}

/// A single modality's nearest-neighbour lookup failed.
#[derive(Debug, Error)]
#[error("{modality} retrieval failed: {cause}")]
pub struct RetrievalError {
  /// The modality whose retrieval broke.
  pub modality: Modality,
  /// What went wrong.
  #[source]
  pub cause: RetrievalCause,
}

impl RetrievalError {
  pub fn new(modality: Modality, cause: impl Into<RetrievalCause>) -> Self {
    Self {
      modality,
      cause: cause.into(),
    }
  }

  pub fn malformed(modality: Modality, message: impl Into<String>) -> Self {
    Self::new(modality, RetrievalCause::Malformed(message.into()))
  }
}

/// Underlying reason for a [`RetrievalError`].
#[derive(Debug, Error)]
pub enum RetrievalCause {
  #[error("embedding failed: {0}")]
  Embedding(#[from] EmbeddingError),
  #[error("vector store failed: {0}")]
  Store(#[from] StoreError),
  #[error("malformed data: {0}")]
  Malformed(String),
}

/// Errors produced by embedding providers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbeddingError {
  /// Nothing to embed.
  #[error("empty input")]
  EmptyInput,
  /// The model produced a vector of the wrong length.
  #[error("embedding has dimension {actual}, expected {expected}")]
  DimensionMismatch { expected: usize, actual: usize },
  /// Model or runtime failure.
  #[error("inference failure: {0}")]
  Inference(String),
}

/// Errors produced by vector store backends.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
  /// The backend could not be reached or its state is unusable.
  #[error("store unavailable: {0}")]
  Unavailable(String),
  /// The named index does not exist.
  #[error("unknown index: {0}")]
  UnknownIndex(String),
  /// A vector does not match the index dimension.
  #[error("vector has dimension {actual}, index expects {expected}")]
  DimensionMismatch { expected: usize, actual: usize },
  /// The backend returned or was given data it cannot interpret.
  #[error("malformed data: {0}")]
  Malformed(String),
}

/// Errors raised while loading or validating [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to load config: {0}")]
  Load(#[from] config::ConfigError),
  #[error("validation error: {0}")]
  Validation(String),
}
