//! Fusion and reranking of per-modality candidate lists.
//!
//! Two strategies are available and an engine uses exactly one of them:
//!
//! - [`reciprocal_rank_fusion`] merges independent image and text lists by
//!   rank only, since similarities from different embedding spaces are not on
//!   a common scale.
//! - [`weighted_rerank`] keeps the image list as the candidate pool and mixes
//!   in a text similarity computed against each candidate's stored text vector.
//!
//! Single-modality searches skip fusion and go through [`format_single`].
//! Every function here returns results sorted but untruncated; the caller cuts
//! to `top_k` afterwards.

use crate::types::{Candidate, FusedResult, Modality, ProductId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Smoothing constant for reciprocal rank fusion.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// How many primary candidates weighted reranking fetches per requested result.
pub const DEFAULT_RERANK_MULTIPLIER: usize = 2;

/// The fusion algorithm an engine applies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
  /// Reciprocal rank fusion with smoothing constant `k`.
  ///
  /// Larger `k` flattens the curve so lower ranks keep more influence.
  ReciprocalRank { k: f32 },
  /// Image retrieval reranked by text similarity.
  ///
  /// `candidate_multiplier × top_k` image candidates are retrieved when a text
  /// query is present, so the rerank has headroom.
  WeightedRerank { candidate_multiplier: usize },
}

impl Default for FusionStrategy {
  fn default() -> Self {
    FusionStrategy::ReciprocalRank { k: DEFAULT_RRF_K }
  }
}

impl fmt::Display for FusionStrategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FusionStrategy::ReciprocalRank { k } => write!(f, "rrf(k={k})"),
      FusionStrategy::WeightedRerank { candidate_multiplier } => {
        write!(f, "weighted_rerank(x{candidate_multiplier})")
      }
    }
  }
}

/// Sorts results by descending score, ties by ascending product id.
pub fn sort_results(results: &mut [FusedResult]) {
  results.sort_by(|a, b| {
    b.score
      .total_cmp(&a.score)
      .then_with(|| a.product_id.cmp(&b.product_id))
  });
}

/// Merges image and text candidate lists with reciprocal rank fusion.
///
/// A candidate at 0-based position `r` contributes `alpha / (k + r)` from the
/// image list and `(1 - alpha) / (k + r)` from the text list. A product's score
/// is the sum of its contributions; `image_score` and `text_score` keep the raw
/// similarities for inspection.
///
/// Products found only in a zero-weighted list stay in the output with score 0
/// and sort last.
pub fn reciprocal_rank_fusion(
  image: &[Candidate],
  text: &[Candidate],
  alpha: f32,
  k: f32,
) -> Vec<FusedResult> {
  // Insertion order is kept so ties resolve the same way on every run before
  // the id tie-break applies.
  let mut order: Vec<ProductId> = Vec::new();
  let mut fused: HashMap<ProductId, FusedResult> = HashMap::new();

  let lists = [(Modality::Image, image, alpha), (Modality::Text, text, 1.0 - alpha)];

  for (modality, candidates, weight) in lists {
    for (rank, candidate) in candidates.iter().enumerate() {
      let entry = fused
        .entry(candidate.product_id.clone())
        .or_insert_with(|| {
          order.push(candidate.product_id.clone());
          FusedResult::seeded_from(candidate)
        });

      entry.score += weight / (k + rank as f32);
      entry.observe(modality, candidate.score);
    }
  }

  let mut results: Vec<FusedResult> = order
    .into_iter()
    .filter_map(|id| fused.remove(&id))
    .collect();
  sort_results(&mut results);
  results
}

/// Formats one modality's candidates as results, keeping their order.
///
/// The raw similarity becomes the score; the other modality's score is 0.
pub fn format_single(candidates: &[Candidate], modality: Modality) -> Vec<FusedResult> {
  candidates
    .iter()
    .map(|candidate| {
      let mut result = FusedResult::seeded_from(candidate);
      result.score = candidate.score;
      result.observe(modality, candidate.score);
      result
    })
    .collect()
}

/// Image and text weights for [`weighted_rerank`], summing to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankWeights {
  pub image: f32,
  pub text: f32,
}

impl RerankWeights {
  /// Normalises raw weights to sum to 1.
  ///
  /// Returns `None` for negative or non-finite weights or a zero sum.
  pub fn normalize(image_weight: f32, text_weight: f32) -> Option<Self> {
    let valid = |w: f32| w.is_finite() && w >= 0.0;
    if !valid(image_weight) || !valid(text_weight) {
      return None;
    }
    let total = image_weight + text_weight;
    if total <= 0.0 {
      return None;
    }
    Some(Self {
      image: image_weight / total,
      text: text_weight / total,
    })
  }

  /// The weight for `modality`.
  pub fn for_modality(&self, modality: Modality) -> f32 {
    match modality {
      Modality::Image => self.image,
      Modality::Text => self.text,
    }
  }
}

/// Reranks a primary candidate list using a secondary query vector.
///
/// `stored` maps product ids to their stored vectors in the secondary space.
/// The secondary similarity is the dot product of `secondary_query` (expected
/// to be unit length) with the stored vector. A product missing from `stored`
/// gets a secondary score of 0 and is still ranked; so does one whose stored
/// vector yields a non-finite similarity. Reporting either is the caller's job.
pub fn weighted_rerank(
  primary: &[Candidate],
  secondary_query: &[f32],
  stored: &HashMap<ProductId, Vec<f32>>,
  weights: RerankWeights,
) -> Vec<FusedResult> {
  let mut results: Vec<FusedResult> = primary
    .iter()
    .map(|candidate| {
      let primary_modality = candidate.modality;
      let secondary_modality = other(primary_modality);

      let mut result = FusedResult::seeded_from(candidate);
      result.observe(primary_modality, candidate.score);

      let similarity = stored
        .get(&candidate.product_id)
        .map(|vector| crate::embeddings::dot(secondary_query, vector))
        .filter(|similarity| similarity.is_finite());
      let secondary_score = match similarity {
        Some(similarity) => {
          result.observe(secondary_modality, similarity);
          similarity
        }
        None => 0.0,
      };

      result.score = weights.for_modality(primary_modality) * candidate.score
        + weights.for_modality(secondary_modality) * secondary_score;
      result
    })
    .collect();

  sort_results(&mut results);
  results
}

fn other(modality: Modality) -> Modality {
  match modality {
    Modality::Image => Modality::Text,
    Modality::Text => Modality::Image,
  }
}
