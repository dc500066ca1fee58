//! The `Retriever` trait, which defines the interface for candidate retrieval backends.

use crate::error::{RetrievalError, StoreError};
use crate::filter::FilterExpr;
use crate::index::{IndexStats, StoreMatch};
use crate::types::{
  product_id_from_key, Candidate, Metadata, Modality, ProductId, ProductRecord, CATEGORY_FIELD,
  FILENAME_FIELD, PRODUCT_ID_FIELD, UNKNOWN_CATEGORY,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Parameters for one modality's nearest-neighbour query.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalRequest<'a> {
  pub modality: Modality,
  /// Query embedding in the modality's space.
  pub vector: &'a [f32],
  /// How many candidates to ask the store for.
  pub width: usize,
  /// Caller restrictions. Backends AND in their own isolation terms.
  pub filter: Option<&'a FilterExpr>,
  pub namespace: &'a str,
}

/// The storage layouts a retriever can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrieverKind {
  /// One physical index per modality.
  DualIndex,
  /// One shared index, vectors tagged with their modality.
  TaggedIndex,
}

impl fmt::Display for RetrieverKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RetrieverKind::DualIndex => f.write_str("dual_index"),
      RetrieverKind::TaggedIndex => f.write_str("tagged_index"),
    }
  }
}

/// A trait for backends that turn a query vector into ranked candidates.
///
/// A `Retriever` owns the knowledge of how vectors are laid out in the store
/// (which index, which keys, which tags). The [`SearchEngine`](crate::engine::SearchEngine)
/// and the fusion step only ever see [`Candidate`]s, so backends are
/// interchangeable.
pub trait Retriever: Send + Sync {
  /// Returns the `RetrieverKind` of this backend.
  fn kind(&self) -> RetrieverKind;

  /// Runs one nearest-neighbour query.
  ///
  /// Candidates come back in the order the store ranked them, with `rank`
  /// set to their 0-based position.
  fn retrieve(&self, request: &RetrievalRequest<'_>) -> Result<Vec<Candidate>, RetrievalError>;

  /// Fetches the stored `modality` vector of each product by its composite
  /// key. Products without such a vector are absent from the map.
  fn fetch_vectors(
    &self,
    product_ids: &[ProductId],
    modality: Modality,
    namespace: &str,
  ) -> Result<HashMap<ProductId, Vec<f32>>, RetrievalError>;

  /// Writes the `modality` vectors of many products with one upsert, using
  /// this backend's layout. Returns how many records were written.
  fn index_products(
    &self,
    modality: Modality,
    items: Vec<(&ProductRecord, Vec<f32>)>,
    namespace: &str,
  ) -> Result<usize, RetrievalError>;

  /// Writes one product vector using this backend's layout.
  fn index_product(
    &self,
    product: &ProductRecord,
    modality: Modality,
    vector: Vec<f32>,
    namespace: &str,
  ) -> Result<(), RetrievalError> {
    self
      .index_products(modality, vec![(product, vector)], namespace)
      .map(|_| ())
  }

  /// Size and namespaces of every physical index this backend reads.
  fn index_stats(&self) -> Result<Vec<IndexStats>, StoreError>;
}

/// Converts store hits into ranked candidates for `modality`.
///
/// The product id is read from the `product_id` metadata field, falling back
/// to the prefix of the composite record key.
pub fn candidates_from_matches(
  matches: Vec<StoreMatch>,
  modality: Modality,
) -> Result<Vec<Candidate>, RetrievalError> {
  matches
    .into_iter()
    .enumerate()
    .map(|(rank, m)| {
      if !m.score.is_finite() {
        return Err(RetrievalError::malformed(
          modality,
          format!("non-finite score for record {}", m.id),
        ));
      }

      let product_id = match m.metadata.get(PRODUCT_ID_FIELD).and_then(|v| v.as_str()) {
        Some(id) => id.to_string(),
        None => product_id_from_key(&m.id).to_string(),
      };
      if product_id.is_empty() {
        return Err(RetrievalError::malformed(modality, "record without product id"));
      }

      Ok(Candidate {
        category: text_field(&m.metadata, CATEGORY_FIELD).unwrap_or(UNKNOWN_CATEGORY).to_string(),
        filename: text_field(&m.metadata, FILENAME_FIELD).unwrap_or_default().to_string(),
        product_id,
        score: m.score,
        rank,
        modality,
        metadata: m.metadata,
      })
    })
    .collect()
}

fn text_field<'m>(metadata: &'m Metadata, field: &str) -> Option<&'m str> {
  metadata.get(field).and_then(|v| v.as_str())
}
