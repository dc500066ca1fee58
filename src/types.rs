//! Core data types for the lookbook search pipeline.

use crate::filter::FilterExpr;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Type alias for product identifiers.
///
/// Identifiers are opaque and stable; the pipeline never parses them except to
/// strip the `#modality` suffix of a composite vector key.
pub type ProductId = String;

/// Metadata stored next to each vector, keyed by field name.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Metadata field holding the product identifier.
pub const PRODUCT_ID_FIELD: &str = "product_id";
/// Metadata field holding the product category.
pub const CATEGORY_FIELD: &str = "category";
/// Metadata field holding the product's source filename.
pub const FILENAME_FIELD: &str = "filename";
/// Metadata field that tags vectors in a shared index with their modality.
pub const KIND_FIELD: &str = "kind";
/// Category reported when a product has none.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// An embedding space a query or a stored vector lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
  /// Image space, produced by the image encoder.
  Image,
  /// Text space, produced by the text encoder.
  Text,
}

impl Modality {
  /// Both modalities in their canonical order.
  pub const ALL: [Modality; 2] = [Modality::Image, Modality::Text];

  /// Human-readable name, also used in composite vector keys.
  pub fn as_str(self) -> &'static str {
    match self {
      Modality::Image => "image",
      Modality::Text => "text",
    }
  }

  /// Short tag written to the `kind` field of a shared index.
  pub fn tag(self) -> &'static str {
    match self {
      Modality::Image => "img",
      Modality::Text => "txt",
    }
  }
}

impl fmt::Display for Modality {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Builds the composite key `{product_id}#{modality}` a vector is stored under.
pub fn vector_key(product_id: &str, modality: Modality) -> String {
  format!("{product_id}#{}", modality.as_str())
}

/// Recovers the product id from a composite vector key.
pub fn product_id_from_key(key: &str) -> &str {
  key.split_once('#').map(|(id, _)| id).unwrap_or(key)
}

/// A scalar metadata value.
///
/// `#[serde(untagged)]` keeps the JSON form plain (`"shoes"`, `12.5`, `true`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
  String(String),
  Number(f64),
  Bool(bool),
}

impl MetadataValue {
  /// Returns the string payload, if this is a string.
  pub fn as_str(&self) -> Option<&str> {
    match self {
      MetadataValue::String(s) => Some(s),
      _ => None,
    }
  }
}

impl From<&str> for MetadataValue {
  fn from(value: &str) -> Self {
    MetadataValue::String(value.to_string())
  }
}

impl From<String> for MetadataValue {
  fn from(value: String) -> Self {
    MetadataValue::String(value)
  }
}

impl From<f64> for MetadataValue {
  fn from(value: f64) -> Self {
    MetadataValue::Number(value)
  }
}

impl From<bool> for MetadataValue {
  fn from(value: bool) -> Self {
    MetadataValue::Bool(value)
  }
}

/// A catalogue product as written to the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
  pub product_id: ProductId,
  pub category: String,
  pub filename: String,
  /// Any further fields to store alongside the vectors.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub extra: Metadata,
}

impl ProductRecord {
  pub fn new(product_id: impl Into<ProductId>, category: impl Into<String>) -> Self {
    Self {
      product_id: product_id.into(),
      category: category.into(),
      filename: String::new(),
      extra: Metadata::new(),
    }
  }

  pub fn filename(mut self, filename: impl Into<String>) -> Self {
    self.filename = filename.into();
    self
  }

  pub fn field(mut self, name: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
    self.extra.insert(name.into(), value.into());
    self
  }

  /// Flattens the record into store metadata.
  pub fn metadata(&self) -> Metadata {
    let mut metadata = self.extra.clone();
    metadata.insert(PRODUCT_ID_FIELD.into(), self.product_id.clone().into());
    metadata.insert(CATEGORY_FIELD.into(), self.category.clone().into());
    metadata.insert(FILENAME_FIELD.into(), self.filename.clone().into());
    metadata
  }
}

/// A product to index together with the raw inputs to embed for it.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry<'a> {
  pub product: &'a ProductRecord,
  /// Image bytes; `None` leaves the image vector untouched.
  pub image: Option<&'a [u8]>,
  /// Product description; `None` leaves the text vector untouched.
  pub text: Option<&'a str>,
}

/// One match from a single modality's nearest-neighbour query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
  pub product_id: ProductId,
  /// Similarity reported by the vector store.
  pub score: f32,
  /// 0-based position in this modality's result list.
  pub rank: usize,
  pub modality: Modality,
  pub category: String,
  pub filename: String,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub metadata: Metadata,
}

impl Candidate {
  /// Creates a candidate with default category and filename.
  pub fn new(product_id: impl Into<ProductId>, score: f32, rank: usize, modality: Modality) -> Self {
    Self {
      product_id: product_id.into(),
      score,
      rank,
      modality,
      category: UNKNOWN_CATEGORY.to_string(),
      filename: String::new(),
      metadata: Metadata::new(),
    }
  }

  pub fn with_category(mut self, category: impl Into<String>) -> Self {
    self.category = category.into();
    self
  }

  pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
    self.filename = filename.into();
    self
  }
}

/// A ranked product in the final result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
  pub product_id: ProductId,
  /// The fused score; results are ordered by it.
  pub score: f32,
  /// Raw image-space similarity, 0 if the image list did not contain the product.
  pub image_score: f32,
  /// Raw text-space similarity, 0 if unavailable.
  pub text_score: f32,
  pub category: String,
  pub filename: String,
  /// Modalities that contributed to this result. Never empty.
  pub sources: BTreeSet<Modality>,
}

impl FusedResult {
  /// Starts a result from the first candidate seen for a product.
  pub(crate) fn seeded_from(candidate: &Candidate) -> Self {
    Self {
      product_id: candidate.product_id.clone(),
      score: 0.0,
      image_score: 0.0,
      text_score: 0.0,
      category: candidate.category.clone(),
      filename: candidate.filename.clone(),
      sources: BTreeSet::new(),
    }
  }

  /// Records a modality's raw similarity and marks it as a source.
  pub(crate) fn observe(&mut self, modality: Modality, similarity: f32) {
    match modality {
      Modality::Image => self.image_score = similarity,
      Modality::Text => self.text_score = similarity,
    }
    self.sources.insert(modality);
  }

  /// Raw similarity for the given modality.
  pub fn modality_score(&self, modality: Modality) -> f32 {
    match modality {
      Modality::Image => self.image_score,
      Modality::Text => self.text_score,
    }
  }
}

/// Image data supplied with a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
  /// The raw byte content of the image file.
  pub bytes: Vec<u8>,
  /// The MIME type of the image, e.g., "image/png" or "image/jpeg".
  pub mime_type: Option<String>,
  /// The width of the image in pixels, if known.
  pub width: Option<u32>,
  /// The height of the image in pixels, if known.
  pub height: Option<u32>,
}

impl ImageData {
  pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
    Self {
      bytes: bytes.into(),
      mime_type: None,
      width: None,
      height: None,
    }
  }

  pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
    self.mime_type = Some(mime_type.into());
    self
  }
}

/// Caller-tunable fusion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionParams {
  /// Image share of the RRF contribution: 0 = text only, 1 = image only.
  #[serde(default = "default_alpha")]
  pub alpha: f32,
  /// Image weight for weighted reranking, normalised against `text_weight`.
  #[serde(default = "default_image_weight")]
  pub image_weight: f32,
  /// Text weight for weighted reranking.
  #[serde(default = "default_text_weight")]
  pub text_weight: f32,
  /// Whether weighted mode reranks image candidates with the text query.
  #[serde(default = "default_rerank")]
  pub rerank: bool,
}

fn default_alpha() -> f32 {
  0.5
}

fn default_image_weight() -> f32 {
  0.7
}

fn default_text_weight() -> f32 {
  0.3
}

fn default_rerank() -> bool {
  true
}

impl Default for FusionParams {
  fn default() -> Self {
    Self {
      alpha: default_alpha(),
      image_weight: default_image_weight(),
      text_weight: default_text_weight(),
      rerank: default_rerank(),
    }
  }
}

impl FusionParams {
  pub fn alpha(mut self, alpha: f32) -> Self {
    self.alpha = alpha;
    self
  }

  pub fn weights(mut self, image_weight: f32, text_weight: f32) -> Self {
    self.image_weight = image_weight;
    self.text_weight = text_weight;
    self
  }

  pub fn rerank(mut self, rerank: bool) -> Self {
    self.rerank = rerank;
    self
  }
}

/// A search request.
///
/// At least one of `image` and `text` must carry content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
  pub image: Option<ImageData>,
  pub text: Option<String>,
  /// Number of results wanted. `None` falls back to the engine default.
  pub top_k: Option<usize>,
  /// Exact-match category restriction.
  pub category: Option<String>,
  /// Further metadata restrictions, ANDed with the category.
  pub filters: Option<FilterExpr>,
  #[serde(default)]
  pub fusion: FusionParams,
}

impl SearchQuery {
  /// Creates a new `QueryBuilder`.
  pub fn builder() -> QueryBuilder {
    QueryBuilder::default()
  }

  /// The query text, if it has any non-whitespace content.
  pub fn text_input(&self) -> Option<&str> {
    self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
  }

  /// The query image, if it has any bytes.
  pub fn image_input(&self) -> Option<&ImageData> {
    self.image.as_ref().filter(|img| !img.bytes.is_empty())
  }

  /// Which modalities this query supplies.
  pub fn kind(&self) -> Option<QueryKind> {
    match (self.image_input().is_some(), self.text_input().is_some()) {
      (true, true) => Some(QueryKind::Hybrid),
      (true, false) => Some(QueryKind::ImageOnly),
      (false, true) => Some(QueryKind::TextOnly),
      (false, false) => None,
    }
  }
}

/// A builder for [`SearchQuery`].
#[derive(Debug, Default)]
pub struct QueryBuilder {
  query: SearchQuery,
}

impl QueryBuilder {
  pub fn image(mut self, image: ImageData) -> Self {
    self.query.image = Some(image);
    self
  }

  pub fn text(mut self, text: impl Into<String>) -> Self {
    self.query.text = Some(text.into());
    self
  }

  pub fn top_k(mut self, top_k: usize) -> Self {
    self.query.top_k = Some(top_k);
    self
  }

  pub fn category(mut self, category: impl Into<String>) -> Self {
    self.query.category = Some(category.into());
    self
  }

  pub fn filters(mut self, filters: FilterExpr) -> Self {
    self.query.filters = Some(filters);
    self
  }

  pub fn fusion(mut self, fusion: FusionParams) -> Self {
    self.query.fusion = fusion;
    self
  }

  /// Shorthand for setting only the RRF `alpha`.
  pub fn alpha(mut self, alpha: f32) -> Self {
    self.query.fusion.alpha = alpha;
    self
  }

  pub fn build(self) -> SearchQuery {
    self.query
  }
}

/// Which modalities a query carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
  Hybrid,
  ImageOnly,
  TextOnly,
}

/// A search result list together with how it was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
  pub query_kind: QueryKind,
  pub total_results: usize,
  pub results: Vec<FusedResult>,
  /// Modalities whose retrieval failed and were left out of the ranking.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub degraded: Vec<Modality>,
}
