//! Defines the `VectorStore` trait for pluggable vector database backends.

use crate::error::StoreError;
use crate::filter::FilterExpr;
use crate::types::Metadata;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A vector with its id and metadata, as written to a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
  pub id: String,
  pub values: Vec<f32>,
  #[serde(default)]
  pub metadata: Metadata,
}

/// One hit returned by [`VectorStore::query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMatch {
  pub id: String,
  /// Cosine similarity between the query and the stored vector.
  pub score: f32,
  #[serde(default)]
  pub metadata: Metadata,
}

/// A nearest-neighbour request against one index.
#[derive(Debug, Clone, Copy)]
pub struct VectorQuery<'a> {
  pub vector: &'a [f32],
  pub top_k: usize,
  pub filter: Option<&'a FilterExpr>,
  pub namespace: &'a str,
}

/// Size and layout of one index, as reported by [`VectorStore::describe`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
  pub name: String,
  pub dimension: usize,
  pub total_vectors: usize,
  /// Vector count per namespace.
  pub namespaces: BTreeMap<String, usize>,
}

/// A trait that defines the common interface for a vector database.
///
/// Implementations may be a hosted service or the in-process
/// [`InMemVectorStore`](crate::index::InMemVectorStore). The `Send` and `Sync`
/// bounds let one client be shared by every search in the process.
pub trait VectorStore: Send + Sync {
  /// Returns the `top_k` vectors most similar to the query, best first,
  /// restricted to those whose metadata satisfies the filter.
  fn query(&self, index: &str, query: &VectorQuery<'_>) -> Result<Vec<StoreMatch>, StoreError>;

  /// Inserts or replaces records, returning how many were written.
  fn upsert(
    &self,
    index: &str,
    namespace: &str,
    records: Vec<VectorRecord>,
  ) -> Result<usize, StoreError>;

  /// Looks up stored vectors by id. Ids that are not present are simply
  /// missing from the returned map.
  fn fetch(
    &self,
    index: &str,
    namespace: &str,
    ids: &[String],
  ) -> Result<HashMap<String, Vec<f32>>, StoreError>;

  /// Reports the size and namespaces of an index.
  fn describe(&self, index: &str) -> Result<IndexStats, StoreError>;

  /// Removes every vector from a namespace of an index.
  fn delete_all(&self, index: &str, namespace: &str) -> Result<(), StoreError>;
}
