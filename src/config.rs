//! Engine configuration.
//!
//! Settings come from an optional `lookbook.{toml,yaml,json}` file in the
//! working directory, overridden by `LOOKBOOK__*` environment variables:
//!
//! ```toml
//! namespace = "catalog-v2"
//! backend = "dual_index"
//! image_index = "product-images"
//! text_index = "product-text"
//! fusion = "rrf"
//! rrf_k = 60.0
//! candidate_width = 50
//! max_top_k = 50
//! index_batch_size = 100
//! ```

use crate::error::ConfigError;
use crate::fusion::{FusionStrategy, DEFAULT_RERANK_MULTIPLIER, DEFAULT_RRF_K};
use crate::retriever::RetrieverKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which fusion algorithm the engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
  /// Reciprocal rank fusion over independent image and text retrievals.
  Rrf,
  /// Image retrieval reranked by stored text vectors.
  Weighted,
}

/// Tunables for [`SearchEngine`](crate::engine::SearchEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
  /// Vector store namespace queried by every search.
  #[serde(default = "default_namespace")]
  pub namespace: String,

  /// Storage layout of the vectors.
  #[serde(default = "default_backend")]
  pub backend: RetrieverKind,

  /// Image index name for the dual-index layout.
  #[serde(default = "default_image_index")]
  pub image_index: String,

  /// Text index name for the dual-index layout.
  #[serde(default = "default_text_index")]
  pub text_index: String,

  /// Index name for the tagged single-index layout.
  #[serde(default = "default_shared_index")]
  pub shared_index: String,

  #[serde(default = "default_fusion")]
  pub fusion: FusionMethod,

  /// RRF smoothing constant.
  #[serde(default = "default_rrf_k")]
  pub rrf_k: f32,

  /// Candidates retrieved per modality before RRF, regardless of `top_k`.
  #[serde(default = "default_candidate_width")]
  pub candidate_width: usize,

  /// Primary candidates per requested result when weighted reranking.
  #[serde(default = "default_rerank_multiplier")]
  pub rerank_multiplier: usize,

  /// `top_k` used when a query leaves it unset.
  #[serde(default = "default_top_k")]
  pub default_top_k: usize,

  /// Upper bound accepted for `top_k`.
  #[serde(default = "default_max_top_k")]
  pub max_top_k: usize,

  /// L2-normalise query embeddings before they are used.
  #[serde(default = "default_true")]
  pub normalize_queries: bool,

  /// Products embedded and upserted together by `index_products`.
  #[serde(default = "default_index_batch_size")]
  pub index_batch_size: usize,
}

fn default_namespace() -> String {
  "default".to_string()
}

fn default_backend() -> RetrieverKind {
  RetrieverKind::DualIndex
}

fn default_image_index() -> String {
  "product-images".to_string()
}

fn default_text_index() -> String {
  "product-text".to_string()
}

fn default_shared_index() -> String {
  "product-search".to_string()
}

fn default_fusion() -> FusionMethod {
  FusionMethod::Rrf
}

fn default_rrf_k() -> f32 {
  DEFAULT_RRF_K
}

fn default_candidate_width() -> usize {
  50
}

fn default_rerank_multiplier() -> usize {
  DEFAULT_RERANK_MULTIPLIER
}

fn default_top_k() -> usize {
  10
}

fn default_max_top_k() -> usize {
  50
}

fn default_true() -> bool {
  true
}

fn default_index_batch_size() -> usize {
  100
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      namespace: default_namespace(),
      backend: default_backend(),
      image_index: default_image_index(),
      text_index: default_text_index(),
      shared_index: default_shared_index(),
      fusion: default_fusion(),
      rrf_k: default_rrf_k(),
      candidate_width: default_candidate_width(),
      rerank_multiplier: default_rerank_multiplier(),
      default_top_k: default_top_k(),
      max_top_k: default_max_top_k(),
      normalize_queries: default_true(),
      index_batch_size: default_index_batch_size(),
    }
  }
}

impl EngineConfig {
  /// Load from an optional `lookbook.*` file and `LOOKBOOK__*` environment variables.
  pub fn load() -> Result<Self, ConfigError> {
    let settings = config::Config::builder()
      .add_source(config::File::with_name("lookbook").required(false))
      .add_source(
        config::Environment::with_prefix("LOOKBOOK")
          .separator("__")
          .try_parsing(true),
      )
      .build()?;

    let cfg: EngineConfig = settings.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
  }

  /// Load from an explicit file; the format follows the extension.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path.as_ref()))
      .build()?;

    let cfg: EngineConfig = settings.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
  }

  /// Check the settings for internal consistency.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.candidate_width == 0 {
      return Err(ConfigError::Validation("candidate_width must be positive".into()));
    }
    if self.max_top_k == 0 {
      return Err(ConfigError::Validation("max_top_k must be positive".into()));
    }
    if self.default_top_k == 0 || self.default_top_k > self.max_top_k {
      return Err(ConfigError::Validation(format!(
        "default_top_k must be in 1..={}, got {}",
        self.max_top_k, self.default_top_k
      )));
    }
    if !(self.rrf_k.is_finite() && self.rrf_k > 0.0) {
      return Err(ConfigError::Validation(format!(
        "rrf_k must be a positive number, got {}",
        self.rrf_k
      )));
    }
    if self.rerank_multiplier == 0 {
      return Err(ConfigError::Validation("rerank_multiplier must be at least 1".into()));
    }
    if self.index_batch_size == 0 {
      return Err(ConfigError::Validation("index_batch_size must be positive".into()));
    }
    if self.namespace.is_empty() {
      return Err(ConfigError::Validation("namespace must not be empty".into()));
    }
    Ok(())
  }

  /// The fusion strategy these settings select.
  pub fn fusion_strategy(&self) -> FusionStrategy {
    match self.fusion {
      FusionMethod::Rrf => FusionStrategy::ReciprocalRank { k: self.rrf_k },
      FusionMethod::Weighted => FusionStrategy::WeightedRerank {
        candidate_multiplier: self.rerank_multiplier,
      },
    }
  }
}
