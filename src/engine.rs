//! The search façade that turns a query into ranked products.

use crate::config::EngineConfig;
use crate::embeddings::{check_dimension, l2_normalize, ImageEmbedder, TextEmbedder};
use crate::error::{RetrievalError, SearchError};
use crate::filter::{CompareOp, FilterExpr};
use crate::fusion::{
  format_single, reciprocal_rank_fusion, weighted_rerank, FusionStrategy, RerankWeights,
};
use crate::index::{IndexStats, VectorStore};
use crate::retriever::{RetrievalRequest, Retriever, RetrieverKind};
use crate::retrievers::{DualIndexRetriever, TaggedIndexRetriever};
use crate::types::{
  Candidate, CatalogEntry, FusedResult, Modality, ProductId, ProductRecord, QueryKind,
  SearchQuery, SearchResponse, CATEGORY_FIELD,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The main search engine.
///
/// `SearchEngine` owns the embedders, the retrieval backend and the fusion
/// strategy, and runs every query through the same pipeline:
///
/// 1. **Validation**: at least one modality, `top_k` and fusion parameters in
///    bounds.
/// 2. **Filtering**: the category restriction is ANDed with any extra filter.
/// 3. **Embedding**: each present modality is embedded, dimension-checked and
///    L2-normalised.
/// 4. **Retrieval**: the backend returns ranked candidates per modality. A
///    modality that fails is logged and left out; the query only fails when
///    nothing could be retrieved at all.
/// 5. **Fusion**: reciprocal rank fusion or weighted reranking, depending on
///    the configured [`FusionStrategy`].
/// 6. **Truncation** to `top_k`.
///
/// The engine holds no per-request state and can be shared across threads.
///
/// Create a `SearchEngine` using the [`SearchEngineBuilder`].
///
/// # Examples
///
/// ```rust
/// use lookbook::prelude::*;
/// use std::sync::Arc;
///
/// let store = InMemVectorStore::new()
///     .with_index("product-images", 16)
///     .with_index("product-text", 16);
///
/// let engine = SearchEngine::builder()
///     .image_embedder(Arc::new(StubImageEmbedder::new(16)))
///     .text_embedder(Arc::new(StubTextEmbedder::new(16)))
///     .store(Arc::new(store))
///     .build()
///     .unwrap();
///
/// let product = ProductRecord::new("sku-1", "Bags").filename("sku-1.jpg");
/// engine
///     .index_product(&product, Some(&b"sku-1.jpg"[..]), Some("red leather tote"))
///     .unwrap();
///
/// let query = SearchQuery::builder().text("red leather tote").top_k(5).build();
/// let results = engine.search(&query).unwrap();
/// assert_eq!(results[0].product_id, "sku-1");
/// ```
pub struct SearchEngine {
  image_embedder: Arc<dyn ImageEmbedder>,
  text_embedder: Arc<dyn TextEmbedder>,
  retriever: Arc<dyn Retriever>,
  fusion: FusionStrategy,
  config: EngineConfig,
}

/// Static description of an engine, for health and diagnostics output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineInfo {
  pub retriever: RetrieverKind,
  pub fusion: FusionStrategy,
  pub image_model: String,
  pub image_dimension: usize,
  pub text_model: String,
  pub text_dimension: usize,
  pub namespace: String,
}

/// A validated query, ready to execute.
struct QueryPlan {
  kind: QueryKind,
  top_k: usize,
  filter: Option<FilterExpr>,
}

/// Per-modality retrieval outcomes, before fusion.
#[derive(Default)]
struct Legs {
  image: Option<Vec<Candidate>>,
  text: Option<Vec<Candidate>>,
  degraded: Vec<Modality>,
  failures: Vec<String>,
}

impl Legs {
  /// Files one modality's outcome. `None` means the modality was not attempted.
  fn settle(&mut self, modality: Modality, outcome: Option<Result<Vec<Candidate>, RetrievalError>>) {
    let candidates = match outcome {
      None => return,
      Some(Ok(candidates)) => {
        debug!(%modality, count = candidates.len(), "retrieved candidates");
        candidates
      }
      Some(Err(err)) => {
        self.fail(err);
        return;
      }
    };
    match modality {
      Modality::Image => self.image = Some(candidates),
      Modality::Text => self.text = Some(candidates),
    }
  }

  fn fail(&mut self, err: RetrievalError) {
    warn!(modality = %err.modality, error = %err, "retrieval failed, continuing without it");
    self.degraded.push(err.modality);
    self.failures.push(err.to_string());
  }

  /// True when something was attempted and every attempt failed.
  fn all_failed(&self) -> bool {
    self.image.is_none() && self.text.is_none() && !self.failures.is_empty()
  }

  fn no_candidates(&self) -> SearchError {
    SearchError::NoCandidates(self.failures.join("; "))
  }
}

impl SearchEngine {
  /// Creates a new `SearchEngineBuilder` to construct an engine.
  pub fn builder() -> SearchEngineBuilder {
    SearchEngineBuilder::new()
  }

  /// Builds an engine from settings, choosing the retriever layout named by
  /// `config.backend` over `store`.
  pub fn from_config(
    config: EngineConfig,
    store: Arc<dyn VectorStore>,
    image_embedder: Arc<dyn ImageEmbedder>,
    text_embedder: Arc<dyn TextEmbedder>,
  ) -> Result<Self, SearchError> {
    SearchEngineBuilder::new()
      .config(config)
      .store(store)
      .image_embedder(image_embedder)
      .text_embedder(text_embedder)
      .build()
  }

  /// The settings this engine runs with.
  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Describes the engine's collaborators.
  pub fn info(&self) -> EngineInfo {
    EngineInfo {
      retriever: self.retriever.kind(),
      fusion: self.fusion,
      image_model: self.image_embedder.model_name().to_string(),
      image_dimension: self.image_embedder.dimension(),
      text_model: self.text_embedder.model_name().to_string(),
      text_dimension: self.text_embedder.dimension(),
      namespace: self.config.namespace.clone(),
    }
  }

  /// Size of every index the retriever reads.
  pub fn index_stats(&self) -> Result<Vec<IndexStats>, SearchError> {
    self
      .retriever
      .index_stats()
      .map_err(|e| SearchError::Unavailable(e.to_string()))
  }

  /// Embeds and stores a product under the configured namespace.
  ///
  /// Each supplied modality is embedded and written through the retriever's
  /// layout; a modality left out is not touched.
  pub fn index_product(
    &self,
    product: &ProductRecord,
    image: Option<&[u8]>,
    text: Option<&str>,
  ) -> Result<(), SearchError> {
    self
      .index_products(&[CatalogEntry {
        product,
        image,
        text,
      }])
      .map(|_| ())
  }

  /// Embeds and stores many products, `index_batch_size` at a time.
  ///
  /// Texts of a batch go through one [`TextEmbedder::embed_batch`] call and
  /// each modality of a batch is written with one upsert. Batches before a
  /// failing one stay written. Returns the number of products indexed.
  pub fn index_products(&self, entries: &[CatalogEntry<'_>]) -> Result<usize, SearchError> {
    let namespace = &self.config.namespace;
    let mut indexed = 0;

    for batch in entries.chunks(self.config.index_batch_size) {
      let mut images = Vec::new();
      for entry in batch {
        if let Some(bytes) = entry.image {
          images.push((entry.product, self.embed_image(bytes)?));
        }
      }

      let with_text: Vec<(&ProductRecord, &str)> = batch
        .iter()
        .filter_map(|e| e.text.map(|text| (e.product, text)))
        .collect();
      let texts: Vec<&str> = with_text.iter().map(|(_, text)| *text).collect();
      let vectors = if texts.is_empty() {
        Vec::new()
      } else {
        self
          .text_embedder
          .embed_batch(&texts)
          .map_err(|e| RetrievalError::new(Modality::Text, e))?
      };
      if vectors.len() != texts.len() {
        return Err(
          RetrievalError::malformed(
            Modality::Text,
            format!("{} vectors returned for {} texts", vectors.len(), texts.len()),
          )
          .into(),
        );
      }
      let mut text_items = Vec::with_capacity(vectors.len());
      for ((product, _), vector) in with_text.into_iter().zip(vectors) {
        text_items.push((product, self.prepare(Modality::Text, vector)?));
      }

      if !images.is_empty() {
        self
          .retriever
          .index_products(Modality::Image, images, namespace)?;
      }
      if !text_items.is_empty() {
        self
          .retriever
          .index_products(Modality::Text, text_items, namespace)?;
      }

      indexed += batch.len();
      debug!(batch = batch.len(), indexed, "indexed batch");
    }
    Ok(indexed)
  }

  /// Searches the catalog and returns at most `top_k` ranked products.
  ///
  /// # Errors
  ///
  /// - [`SearchError::InvalidQuery`] when neither modality has content or a
  ///   parameter is out of bounds.
  /// - [`SearchError::NoCandidates`] when every attempted retrieval failed.
  pub fn search(&self, query: &SearchQuery) -> Result<Vec<FusedResult>, SearchError> {
    self.search_response(query).map(|response| response.results)
  }

  /// Like [`search`](Self::search), but also reports the query kind and any
  /// modality that was dropped because its retrieval failed.
  #[instrument(skip_all, fields(kind = ?query.kind(), top_k = ?query.top_k, fusion = %self.fusion))]
  pub fn search_response(&self, query: &SearchQuery) -> Result<SearchResponse, SearchError> {
    let plan = self.plan(query)?;

    let (mut results, degraded) = match self.fusion {
      FusionStrategy::ReciprocalRank { k } => self.search_rrf(query, &plan, k)?,
      FusionStrategy::WeightedRerank {
        candidate_multiplier,
      } => self.search_weighted(query, &plan, candidate_multiplier)?,
    };
    results.truncate(plan.top_k);

    info!(results = results.len(), degraded = degraded.len(), "search complete");
    Ok(SearchResponse {
      query_kind: plan.kind,
      total_results: results.len(),
      results,
      degraded,
    })
  }

  fn plan(&self, query: &SearchQuery) -> Result<QueryPlan, SearchError> {
    let kind = query
      .kind()
      .ok_or_else(|| SearchError::invalid("must provide at least one of: image or text"))?;

    let top_k = query.top_k.unwrap_or(self.config.default_top_k);
    if top_k == 0 || top_k > self.config.max_top_k {
      return Err(SearchError::invalid(format!(
        "top_k must be in 1..={}, got {top_k}",
        self.config.max_top_k
      )));
    }

    let params = &query.fusion;
    match self.fusion {
      FusionStrategy::ReciprocalRank { .. } => {
        if !(params.alpha.is_finite() && (0.0..=1.0).contains(&params.alpha)) {
          return Err(SearchError::invalid(format!(
            "alpha must be in [0, 1], got {}",
            params.alpha
          )));
        }
      }
      FusionStrategy::WeightedRerank { .. } => {
        if kind == QueryKind::Hybrid && params.rerank {
          rerank_weights(query)?;
        }
      }
    }

    let category = query
      .category
      .as_deref()
      .map(str::trim)
      .filter(|c| !c.is_empty())
      .map(|c| FilterExpr::compare(CATEGORY_FIELD, CompareOp::Eq, c));
    let filter = FilterExpr::merge(category, query.filters.clone());

    Ok(QueryPlan {
      kind,
      top_k,
      filter,
    })
  }

  fn search_rrf(
    &self,
    query: &SearchQuery,
    plan: &QueryPlan,
    k: f32,
  ) -> Result<(Vec<FusedResult>, Vec<Modality>), SearchError> {
    let width = self.config.candidate_width.max(plan.top_k);
    let leg = |modality: Modality| self.retrieve_leg(query, modality, width, plan.filter.as_ref());

    #[cfg(feature = "parallel")]
    let (image, text) = rayon::join(|| leg(Modality::Image), || leg(Modality::Text));
    #[cfg(not(feature = "parallel"))]
    let (image, text) = (leg(Modality::Image), leg(Modality::Text));

    let mut legs = Legs::default();
    legs.settle(Modality::Image, image);
    legs.settle(Modality::Text, text);
    if legs.all_failed() {
      return Err(legs.no_candidates());
    }

    let results = match (legs.image.as_deref(), legs.text.as_deref()) {
      (Some(image), Some(text)) if !image.is_empty() && !text.is_empty() => {
        reciprocal_rank_fusion(image, text, query.fusion.alpha, k)
      }
      (Some(image), _) if !image.is_empty() => format_single(image, Modality::Image),
      (_, Some(text)) => format_single(text, Modality::Text),
      _ => Vec::new(),
    };
    Ok((results, legs.degraded))
  }

  fn search_weighted(
    &self,
    query: &SearchQuery,
    plan: &QueryPlan,
    multiplier: usize,
  ) -> Result<(Vec<FusedResult>, Vec<Modality>), SearchError> {
    let filter = plan.filter.as_ref();
    let mut legs = Legs::default();

    if plan.kind == QueryKind::TextOnly {
      legs.settle(
        Modality::Text,
        self.retrieve_leg(query, Modality::Text, plan.top_k, filter),
      );
      if legs.all_failed() {
        return Err(legs.no_candidates());
      }
      let text = legs.text.unwrap_or_default();
      return Ok((format_single(&text, Modality::Text), legs.degraded));
    }

    let rerank = plan.kind == QueryKind::Hybrid && query.fusion.rerank;
    let width = if rerank {
      plan.top_k.saturating_mul(multiplier)
    } else {
      plan.top_k
    };

    legs.settle(
      Modality::Image,
      self.retrieve_leg(query, Modality::Image, width, filter),
    );

    let image = match legs.image.take() {
      Some(image) if !image.is_empty() => image,
      answered => {
        // No image hits, or the image leg failed: fall back to a plain text
        // search when there is text.
        legs.image = answered;
        legs.settle(
          Modality::Text,
          self.retrieve_leg(query, Modality::Text, plan.top_k, filter),
        );
        if legs.all_failed() {
          return Err(legs.no_candidates());
        }
        let text = legs.text.unwrap_or_default();
        return Ok((format_single(&text, Modality::Text), legs.degraded));
      }
    };

    if !rerank {
      return Ok((format_single(&image, Modality::Image), legs.degraded));
    }

    // From here on a lost text signal scores every text term as 0, so the
    // image term keeps its weight whichever step failed.
    let weights = rerank_weights(query)?;
    let text_query = match query.text_input().map(|text| self.embed_text(text)) {
      Some(Ok(vector)) => Some(vector),
      Some(Err(err)) => {
        legs.fail(err);
        None
      }
      None => None,
    };
    let stored = match &text_query {
      Some(_) => self.fetch_text_vectors(&image, &mut legs),
      None => HashMap::new(),
    };
    debug!(candidates = image.len(), fetched = stored.len(), "reranking");

    let text_query = text_query.unwrap_or_default();
    Ok((
      weighted_rerank(&image, &text_query, &stored, weights),
      legs.degraded,
    ))
  }

  /// Stored text vectors of `candidates`. Missing and non-finite vectors are
  /// logged and left out; a failed fetch marks text as degraded.
  fn fetch_text_vectors(
    &self,
    candidates: &[Candidate],
    legs: &mut Legs,
  ) -> HashMap<ProductId, Vec<f32>> {
    let ids: Vec<ProductId> = candidates.iter().map(|c| c.product_id.clone()).collect();
    let mut stored = match self
      .retriever
      .fetch_vectors(&ids, Modality::Text, &self.config.namespace)
    {
      Ok(stored) => stored,
      Err(err) => {
        legs.fail(err);
        return HashMap::new();
      }
    };

    for id in &ids {
      match stored.get(id) {
        None => warn!(product_id = %id, "stored text vector missing, scoring text as 0"),
        Some(vector) if vector.iter().any(|x| !x.is_finite()) => {
          warn!(product_id = %id, "stored text vector is not finite, scoring text as 0")
        }
        Some(_) => {}
      }
    }
    stored.retain(|_, vector| vector.iter().all(|x| x.is_finite()));
    stored
  }

  /// Embeds and retrieves one modality. `None` when the query lacks it.
  fn retrieve_leg(
    &self,
    query: &SearchQuery,
    modality: Modality,
    width: usize,
    filter: Option<&FilterExpr>,
  ) -> Option<Result<Vec<Candidate>, RetrievalError>> {
    let vector = match modality {
      Modality::Image => self.embed_image(&query.image_input()?.bytes),
      Modality::Text => self.embed_text(query.text_input()?),
    };

    Some(vector.and_then(|vector| {
      self.retriever.retrieve(&RetrievalRequest {
        modality,
        vector: &vector,
        width,
        filter,
        namespace: &self.config.namespace,
      })
    }))
  }

  fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, RetrievalError> {
    let vector = self
      .image_embedder
      .embed(bytes)
      .map_err(|e| RetrievalError::new(Modality::Image, e))?;
    self.prepare(Modality::Image, vector)
  }

  fn embed_text(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
    let vector = self
      .text_embedder
      .embed(text)
      .map_err(|e| RetrievalError::new(Modality::Text, e))?;
    self.prepare(Modality::Text, vector)
  }

  /// Checks an embedder's output against its declared dimension and normalises it.
  fn prepare(&self, modality: Modality, mut vector: Vec<f32>) -> Result<Vec<f32>, RetrievalError> {
    let expected = match modality {
      Modality::Image => self.image_embedder.dimension(),
      Modality::Text => self.text_embedder.dimension(),
    };
    check_dimension(&vector, expected).map_err(|e| RetrievalError::new(modality, e))?;
    if vector.iter().any(|x| !x.is_finite()) {
      return Err(RetrievalError::malformed(modality, "embedding has non-finite components"));
    }
    if self.config.normalize_queries {
      l2_normalize(&mut vector);
    }
    Ok(vector)
  }
}

fn rerank_weights(query: &SearchQuery) -> Result<RerankWeights, SearchError> {
  let params = &query.fusion;
  RerankWeights::normalize(params.image_weight, params.text_weight).ok_or_else(|| {
    SearchError::invalid(format!(
      "rerank weights must be non-negative with a positive sum, got image={} text={}",
      params.image_weight, params.text_weight
    ))
  })
}

/// A builder for creating `SearchEngine` instances.
///
/// Either pass a ready [`Retriever`] or a [`VectorStore`]; with a store the
/// builder picks the layout named by the config's `backend`. The fusion
/// strategy defaults to the one the config selects.
#[derive(Default)]
pub struct SearchEngineBuilder {
  image_embedder: Option<Arc<dyn ImageEmbedder>>,
  text_embedder: Option<Arc<dyn TextEmbedder>>,
  retriever: Option<Arc<dyn Retriever>>,
  store: Option<Arc<dyn VectorStore>>,
  fusion: Option<FusionStrategy>,
  config: Option<EngineConfig>,
}

impl SearchEngineBuilder {
  /// Creates a new, empty `SearchEngineBuilder`.
  pub fn new() -> Self {
    Self::default()
  }

  pub fn image_embedder(mut self, embedder: Arc<dyn ImageEmbedder>) -> Self {
    self.image_embedder = Some(embedder);
    self
  }

  pub fn text_embedder(mut self, embedder: Arc<dyn TextEmbedder>) -> Self {
    self.text_embedder = Some(embedder);
    self
  }

  /// Uses `retriever` as is. Takes precedence over [`store`](Self::store).
  pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
    self.retriever = Some(retriever);
    self
  }

  /// Builds the retriever over `store` from the config's backend and index names.
  pub fn store(mut self, store: Arc<dyn VectorStore>) -> Self {
    self.store = Some(store);
    self
  }

  /// Overrides the strategy derived from the config.
  pub fn fusion(mut self, fusion: FusionStrategy) -> Self {
    self.fusion = Some(fusion);
    self
  }

  pub fn config(mut self, config: EngineConfig) -> Self {
    self.config = Some(config);
    self
  }

  /// Builds the `SearchEngine`.
  ///
  /// Fails with [`SearchError::Configuration`] when an embedder or the
  /// retrieval backend is missing, or when the settings are invalid.
  pub fn build(self) -> Result<SearchEngine, SearchError> {
    let config = self.config.unwrap_or_default();
    config.validate()?;

    let image_embedder = self
      .image_embedder
      .ok_or_else(|| SearchError::Configuration("no image embedder".into()))?;
    let text_embedder = self
      .text_embedder
      .ok_or_else(|| SearchError::Configuration("no text embedder".into()))?;

    let retriever: Arc<dyn Retriever> = match (self.retriever, self.store) {
      (Some(retriever), _) => retriever,
      (None, Some(store)) => match config.backend {
        RetrieverKind::DualIndex => Arc::new(DualIndexRetriever::new(
          store,
          config.image_index.clone(),
          config.text_index.clone(),
        )),
        RetrieverKind::TaggedIndex => {
          Arc::new(TaggedIndexRetriever::new(store, config.shared_index.clone()))
        }
      },
      (None, None) => {
        return Err(SearchError::Configuration(
          "no retriever or vector store".into(),
        ))
      }
    };

    let fusion = self.fusion.unwrap_or_else(|| config.fusion_strategy());
    match fusion {
      FusionStrategy::ReciprocalRank { k } if !(k.is_finite() && k > 0.0) => {
        return Err(SearchError::Configuration(format!(
          "rrf k must be positive, got {k}"
        )));
      }
      FusionStrategy::WeightedRerank {
        candidate_multiplier: 0,
      } => {
        return Err(SearchError::Configuration(
          "candidate multiplier must be at least 1".into(),
        ));
      }
      _ => {}
    }

    Ok(SearchEngine {
      image_embedder,
      text_embedder,
      retriever,
      fusion,
      config,
    })
  }
}
