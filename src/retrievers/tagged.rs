//! A `Retriever` over a single shared index with modality tags.

use crate::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Retrieves candidates from one index that holds both image and text vectors.
///
/// Every record carries a `kind` metadata field (`"img"` or `"txt"`). Each
/// query is isolated to its modality by ANDing `kind == tag` into the caller's
/// filter. Both spaces must share a dimension for this layout to work.
pub struct TaggedIndexRetriever {
  store: Arc<dyn VectorStore>,
  index: String,
}

impl TaggedIndexRetriever {
  /// Creates a retriever over the shared index `index`.
  pub fn new(store: Arc<dyn VectorStore>, index: impl Into<String>) -> Self {
    Self {
      store,
      index: index.into(),
    }
  }

  /// The filter actually sent to the store for `modality`.
  pub fn isolation_filter(modality: Modality, caller: Option<&FilterExpr>) -> FilterExpr {
    let kind = FilterExpr::eq(KIND_FIELD, modality.tag());
    match caller {
      Some(filter) => kind.and(filter.clone()),
      None => kind,
    }
  }
}

impl Retriever for TaggedIndexRetriever {
  fn kind(&self) -> RetrieverKind {
    RetrieverKind::TaggedIndex
  }

  fn retrieve(&self, request: &RetrievalRequest<'_>) -> Result<Vec<Candidate>, RetrievalError> {
    let filter = Self::isolation_filter(request.modality, request.filter);
    let matches = self
      .store
      .query(
        &self.index,
        &VectorQuery {
          vector: request.vector,
          top_k: request.width,
          filter: Some(&filter),
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
      .fetch(&self.index, namespace, &keys)
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
      .map(|(product, vector)| {
        let mut metadata = product.metadata();
        metadata.insert(KIND_FIELD.to_string(), modality.tag().into());
        VectorRecord {
          id: vector_key(&product.product_id, modality),
          values: vector,
          metadata,
        }
      })
      .collect();
    let written = records.len();
    self
      .store
      .upsert(&self.index, namespace, records)
      .map_err(|e| RetrievalError::new(modality, e))?;
    Ok(written)
  }

  fn index_stats(&self) -> Result<Vec<IndexStats>, StoreError> {
    Ok(vec![self.store.describe(&self.index)?])
  }
}
