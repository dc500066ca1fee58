//! A `Retriever` backed by one physical index per modality.

use crate::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Retrieves image and text candidates from two separate indexes.
///
/// Image vectors and text vectors usually differ in dimensionality (for
/// example 768 for a SigLIP image encoder and 1024 for a BGE-M3 text encoder),
/// so each modality gets its own index. Records are keyed
/// `{product_id}#{modality}` in both.
pub struct DualIndexRetriever {
  store: Arc<dyn VectorStore>,
  image_index: String,
  text_index: String,
}

impl DualIndexRetriever {
  /// Creates a retriever over the given image and text index names.
  pub fn new(
    store: Arc<dyn VectorStore>,
    image_index: impl Into<String>,
    text_index: impl Into<String>,
  ) -> Self {
    Self {
      store,
      image_index: image_index.into(),
      text_index: text_index.into(),
    }
  }

  fn index_for(&self, modality: Modality) -> &str {
    match modality {
      Modality::Image => &self.image_index,
      Modality::Text => &self.text_index,
    }
  }
}

impl Retriever for DualIndexRetriever {
  fn kind(&self) -> RetrieverKind {
    RetrieverKind::DualIndex
  }

  fn retrieve(&self, request: &RetrievalRequest<'_>) -> Result<Vec<Candidate>, RetrievalError> {
    let index = self.index_for(request.modality);
    let matches = self
      .store
      .query(
        index,
        &VectorQuery {
          vector: request.vector,
          top_k: request.width,
          filter: request.filter,
          namespace: request.namespace,
        },
      )
      .map_err(|e| RetrievalError::new(request.modality, e))?;

    candidates_from_matches(matches, request.modality)
  }

  fn fetch_vectors(
    &self,
    product_ids: &[ProductId],
    modality: Modality,
    namespace: &str,
  ) -> Result<HashMap<ProductId, Vec<f32>>, RetrievalError> {
    let keys: Vec<String> = product_ids.iter().map(|id| vector_key(id, modality)).collect();
    let fetched = self
      .store
      .fetch(self.index_for(modality), namespace, &keys)
      .map_err(|e| RetrievalError::new(modality, e))?;

    Ok(fetched
      .into_iter()
      .map(|(key, vector)| (product_id_from_key(&key).to_string(), vector))
      .collect())
  }

  fn index_products(
    &self,
    modality: Modality,
    items: Vec<(&ProductRecord, Vec<f32>)>,
    namespace: &str,
  ) -> Result<usize, RetrievalError> {
    let records: Vec<VectorRecord> = items
      .into_iter()
      .map(|(product, vector)| VectorRecord {
        id: vector_key(&product.product_id, modality),
        values: vector,
        metadata: product.metadata(),
      })
      .collect();
    let written = records.len();
    self
      .store
      .upsert(self.index_for(modality), namespace, records)
      .map_err(|e| RetrievalError::new(modality, e))?;
    Ok(written)
  }

  fn index_stats(&self) -> Result<Vec<IndexStats>, StoreError> {
    Ok(vec![
      self.store.describe(&self.image_index)?,
      self.store.describe(&self.text_index)?,
    ])
  }
}
