#![allow(dead_code)]

use lookbook::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const DIM: usize = 4;
pub const IMAGE_QUERY: &[u8] = b"query.jpg";
pub const TEXT_QUERY: &str = "red dress";
pub const NAMESPACE: &str = "default";
pub const IMAGE_INDEX: &str = "product-images";
pub const TEXT_INDEX: &str = "product-text";
pub const SHARED_INDEX: &str = "product-search";

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

/// Text embedder with a fixed vector per known input.
pub struct FixedTextEmbedder {
  vectors: HashMap<String, Vec<f32>>,
}

impl Default for FixedTextEmbedder {
  fn default() -> Self {
    let mut vectors = HashMap::new();
    vectors.insert(TEXT_QUERY.to_string(), vec![0.0, 0.0, 1.0, 0.0]);
    Self { vectors }
  }
}

impl TextEmbedder for FixedTextEmbedder {
  fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    self
      .vectors
      .get(text.trim())
      .cloned()
      .ok_or_else(|| EmbeddingError::Inference(format!("no vector for {text:?}")))
  }

  fn dimension(&self) -> usize {
    DIM
  }

  fn model_name(&self) -> &str {
    "fixed-text"
  }
}

/// Image embedder with a fixed vector per known byte string.
pub struct FixedImageEmbedder {
  vectors: HashMap<Vec<u8>, Vec<f32>>,
}

impl Default for FixedImageEmbedder {
  fn default() -> Self {
    let mut vectors = HashMap::new();
    vectors.insert(IMAGE_QUERY.to_vec(), vec![1.0, 0.0, 0.0, 0.0]);
    Self { vectors }
  }
}

impl ImageEmbedder for FixedImageEmbedder {
  fn embed(&self, image_data: &[u8]) -> Result<Vec<f32>, EmbeddingError> {
    self
      .vectors
      .get(image_data)
      .cloned()
      .ok_or_else(|| EmbeddingError::Inference("unrecognised image".into()))
  }

  fn dimension(&self) -> usize {
    DIM
  }

  fn model_name(&self) -> &str {
    "fixed-image"
  }
}

/// Wraps a store and fails selected operations.
pub struct FailingStore {
  inner: InMemVectorStore,
  failing_indexes: HashSet<String>,
  fail_fetch: bool,
  corrupted: HashSet<String>,
}

impl FailingStore {
  pub fn new(inner: InMemVectorStore) -> Self {
    Self {
      inner,
      failing_indexes: HashSet::new(),
      fail_fetch: false,
      corrupted: HashSet::new(),
    }
  }

  /// Every query against `index` fails.
  pub fn fail_queries_on(mut self, index: &str) -> Self {
    self.failing_indexes.insert(index.to_string());
    self
  }

  /// Every fetch fails.
  pub fn fail_fetch(mut self) -> Self {
    self.fail_fetch = true;
    self
  }

  /// Fetched vectors of `product_id` come back as NaN.
  pub fn corrupt_fetch_for(mut self, product_id: &str) -> Self {
    self.corrupted.insert(product_id.to_string());
    self
  }
}

impl VectorStore for FailingStore {
  fn query(&self, index: &str, query: &VectorQuery<'_>) -> Result<Vec<StoreMatch>, StoreError> {
    if self.failing_indexes.contains(index) {
      return Err(StoreError::Unavailable(format!("{index} timed out")));
    }
    self.inner.query(index, query)
  }

  fn upsert(
    &self,
    index: &str,
    namespace: &str,
    records: Vec<VectorRecord>,
  ) -> Result<usize, StoreError> {
    self.inner.upsert(index, namespace, records)
  }

  fn fetch(
    &self,
    index: &str,
    namespace: &str,
    ids: &[String],
  ) -> Result<HashMap<String, Vec<f32>>, StoreError> {
    if self.fail_fetch {
      return Err(StoreError::Unavailable("fetch timed out".into()));
    }
    let mut fetched = self.inner.fetch(index, namespace, ids)?;
    for (key, vector) in fetched.iter_mut() {
      if self.corrupted.contains(product_id_from_key(key)) {
        vector.fill(f32::NAN);
      }
    }
    Ok(fetched)
  }

  fn describe(&self, index: &str) -> Result<IndexStats, StoreError> {
    self.inner.describe(index)
  }

  fn delete_all(&self, index: &str, namespace: &str) -> Result<(), StoreError> {
    self.inner.delete_all(index, namespace)
  }
}

/// A product with optional vectors in each space.
pub struct Fixture {
  pub product: ProductRecord,
  pub image: Option<Vec<f32>>,
  pub text: Option<Vec<f32>>,
}

fn fixture(id: &str, category: &str, image: Option<Vec<f32>>, text: Option<Vec<f32>>) -> Fixture {
  Fixture {
    product: ProductRecord::new(id, category).filename(format!("{id}.jpg")),
    image,
    text,
  }
}

/// Image ranking for `IMAGE_QUERY`: A (1.0), B (0.8).
/// Text ranking for `TEXT_QUERY`: B (1.0), C (0.6).
pub fn rrf_fixtures() -> Vec<Fixture> {
  vec![
    fixture("A", "Dresses", Some(vec![1.0, 0.0, 0.0, 0.0]), None),
    fixture(
      "B",
      "Dresses",
      Some(vec![0.8, 0.6, 0.0, 0.0]),
      Some(vec![0.0, 0.0, 1.0, 0.0]),
    ),
    fixture("C", "Shoes", None, Some(vec![0.0, 0.0, 0.6, 0.8])),
  ]
}

/// Image ranking: P (0.9), Q (0.6), R (0.5).
/// Stored text similarity to `TEXT_QUERY`: P 0.4, Q missing, R 1.0.
pub fn rerank_fixtures() -> Vec<Fixture> {
  vec![
    fixture(
      "P",
      "Bags",
      Some(vec![0.9, 0.435_889_9, 0.0, 0.0]),
      Some(vec![0.0, 0.0, 0.4, 0.916_515_1]),
    ),
    fixture("Q", "Bags", Some(vec![0.6, 0.8, 0.0, 0.0]), None),
    fixture(
      "R",
      "Bags",
      Some(vec![0.5, 0.0, 0.0, 0.866_025_4]),
      Some(vec![0.0, 0.0, 1.0, 0.0]),
    ),
  ]
}

/// An empty store with the dual and shared indexes created.
pub fn empty_store() -> InMemVectorStore {
  InMemVectorStore::new()
    .with_index(IMAGE_INDEX, DIM)
    .with_index(TEXT_INDEX, DIM)
    .with_index(SHARED_INDEX, DIM)
}

/// Writes fixtures through `retriever`'s layout.
pub fn load(retriever: &dyn Retriever, fixtures: &[Fixture]) {
  for f in fixtures {
    if let Some(v) = &f.image {
      retriever
        .index_product(&f.product, Modality::Image, v.clone(), NAMESPACE)
        .unwrap();
    }
    if let Some(v) = &f.text {
      retriever
        .index_product(&f.product, Modality::Text, v.clone(), NAMESPACE)
        .unwrap();
    }
  }
}

/// A dual-index store holding `fixtures`.
pub fn dual_store(fixtures: &[Fixture]) -> InMemVectorStore {
  let store = Arc::new(empty_store());
  let retriever = DualIndexRetriever::new(store.clone(), IMAGE_INDEX, TEXT_INDEX);
  load(&retriever, fixtures);
  drop(retriever);
  match Arc::try_unwrap(store) {
    Ok(store) => store,
    Err(_) => panic!("store still shared"),
  }
}

/// An engine over `store` with fixed embedders.
pub fn engine(store: Arc<dyn VectorStore>, fusion: FusionStrategy) -> SearchEngine {
  init_tracing();
  SearchEngine::builder()
    .image_embedder(Arc::new(FixedImageEmbedder::default()))
    .text_embedder(Arc::new(FixedTextEmbedder::default()))
    .store(store)
    .fusion(fusion)
    .build()
    .unwrap()
}

pub fn rrf() -> FusionStrategy {
  FusionStrategy::ReciprocalRank { k: DEFAULT_RRF_K }
}

pub fn weighted() -> FusionStrategy {
  FusionStrategy::WeightedRerank {
    candidate_multiplier: DEFAULT_RERANK_MULTIPLIER,
  }
}

pub fn ids(results: &[FusedResult]) -> Vec<&str> {
  results.iter().map(|r| r.product_id.as_str()).collect()
}

pub fn assert_close(actual: f32, expected: f32) {
  assert!(
    (actual - expected).abs() < 1e-4,
    "expected {expected}, got {actual}"
  );
}
