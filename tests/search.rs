mod common;

use common::*;
use lookbook::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn hybrid(alpha: f32) -> SearchQuery {
  SearchQuery::builder()
    .image(ImageData::new(IMAGE_QUERY))
    .text(TEXT_QUERY)
    .alpha(alpha)
    .build()
}

fn rrf_engine() -> SearchEngine {
  engine(Arc::new(dual_store(&rrf_fixtures())), rrf())
}

#[test]
fn hybrid_query_fuses_both_rankings() {
  let engine = rrf_engine();
  let results = engine.search(&hybrid(0.5)).unwrap();

  assert_eq!(ids(&results), vec!["B", "A", "C"]);
  assert_close(results[0].score, 0.5 / 60.0 + 0.5 / 61.0);
  assert_close(results[1].score, 0.5 / 60.0);
  assert_close(results[2].score, 0.5 / 61.0);

  let b = &results[0];
  assert_eq!(b.sources, BTreeSet::from([Modality::Image, Modality::Text]));
  assert_close(b.image_score, 0.8);
  assert_close(b.text_score, 1.0);
  assert_eq!(b.category, "Dresses");
  assert_eq!(b.filename, "B.jpg");
}

#[test]
fn query_without_modalities_is_rejected() {
  let engine = rrf_engine();
  let err = engine.search(&SearchQuery::default()).unwrap_err();
  assert!(matches!(err, SearchError::InvalidQuery(_)));
}

#[test]
fn image_only_query_has_no_text_contribution() {
  let engine = rrf_engine();
  let query = SearchQuery::builder().image(ImageData::new(IMAGE_QUERY)).build();
  let results = engine.search(&query).unwrap();

  assert_eq!(ids(&results), vec!["A", "B"]);
  assert_close(results[0].score, 1.0);
  assert_close(results[1].score, 0.8);
  for r in &results {
    assert_eq!(r.text_score, 0.0);
    assert_eq!(r.sources, BTreeSet::from([Modality::Image]));
  }
}

#[test]
fn top_k_larger_than_catalog_returns_everything_once() {
  let engine = rrf_engine();
  let query = SearchQuery::builder()
    .image(ImageData::new(IMAGE_QUERY))
    .text(TEXT_QUERY)
    .top_k(50)
    .build();
  let results = engine.search(&query).unwrap();
  assert_eq!(results.len(), 3);
}

#[test]
fn results_are_truncated_to_top_k() {
  let engine = rrf_engine();
  let query = SearchQuery::builder()
    .image(ImageData::new(IMAGE_QUERY))
    .text(TEXT_QUERY)
    .top_k(1)
    .build();
  assert_eq!(ids(&engine.search(&query).unwrap()), vec!["B"]);
}

#[test]
fn out_of_range_parameters_are_rejected() {
  let engine = rrf_engine();
  let base = || SearchQuery::builder().text(TEXT_QUERY);

  for query in [
    base().top_k(0).build(),
    base().top_k(51).build(),
    base().alpha(1.5).build(),
    base().alpha(-0.1).build(),
    base().alpha(f32::NAN).build(),
  ] {
    let err = engine.search(&query).unwrap_err();
    assert!(matches!(err, SearchError::InvalidQuery(_)), "{err}");
  }
}

#[test]
fn same_query_gives_same_results() {
  let engine = rrf_engine();
  let first = engine.search(&hybrid(0.5)).unwrap();
  let second = engine.search(&hybrid(0.5)).unwrap();
  assert_eq!(first, second);
}

#[test]
fn alpha_one_ranks_text_only_products_last() {
  let engine = rrf_engine();
  let results = engine.search(&hybrid(1.0)).unwrap();

  assert_eq!(ids(&results), vec!["A", "B", "C"]);
  assert_close(results[0].score, 1.0 / 60.0);
  assert_close(results[1].score, 1.0 / 61.0);
  assert_eq!(results[2].score, 0.0);
}

#[test]
fn category_restricts_both_modalities() {
  let engine = rrf_engine();
  let query = SearchQuery::builder()
    .image(ImageData::new(IMAGE_QUERY))
    .text(TEXT_QUERY)
    .category("Shoes")
    .build();
  let results = engine.search(&query).unwrap();

  // No shoe has an image vector, so only the text side contributes.
  assert_eq!(ids(&results), vec!["C"]);
  assert_close(results[0].score, 0.6);
  assert_eq!(results[0].sources, BTreeSet::from([Modality::Text]));
}

#[test]
fn extra_filters_are_anded_with_category() {
  let engine = rrf_engine();
  let query = SearchQuery::builder()
    .text(TEXT_QUERY)
    .category("Dresses")
    .filters(FilterExpr::compare(
      FILENAME_FIELD,
      CompareOp::Ne,
      "B.jpg",
    ))
    .build();
  assert!(engine.search(&query).unwrap().is_empty());
}

#[test]
fn failed_text_embedding_degrades_to_image_results() {
  let engine = rrf_engine();
  let query = SearchQuery::builder()
    .image(ImageData::new(IMAGE_QUERY))
    .text("something the model cannot embed")
    .build();
  let response = engine.search_response(&query).unwrap();

  assert_eq!(response.query_kind, QueryKind::Hybrid);
  assert_eq!(response.degraded, vec![Modality::Text]);
  assert_eq!(ids(&response.results), vec!["A", "B"]);
  assert!(response.results.iter().all(|r| r.text_score == 0.0));
}

#[test]
fn failed_text_index_degrades_to_image_results() {
  let store = FailingStore::new(dual_store(&rrf_fixtures())).fail_queries_on(TEXT_INDEX);
  let engine = engine(Arc::new(store), rrf());
  let response = engine.search_response(&hybrid(0.5)).unwrap();

  assert_eq!(response.degraded, vec![Modality::Text]);
  assert_eq!(ids(&response.results), vec!["A", "B"]);
  assert_eq!(response.total_results, 2);
}

#[test]
fn every_retrieval_failing_is_an_error() {
  let store = FailingStore::new(dual_store(&rrf_fixtures()))
    .fail_queries_on(IMAGE_INDEX)
    .fail_queries_on(TEXT_INDEX);
  let engine = engine(Arc::new(store), rrf());

  let err = engine.search(&hybrid(0.5)).unwrap_err();
  assert!(matches!(err, SearchError::NoCandidates(_)));
  assert!(err.to_string().contains("image retrieval failed"));

  let text_only = SearchQuery::builder().text(TEXT_QUERY).build();
  assert!(matches!(
    engine.search(&text_only),
    Err(SearchError::NoCandidates(_))
  ));
}

#[test]
fn empty_catalog_is_not_an_error() {
  let engine = engine(Arc::new(empty_store()), rrf());
  let response = engine.search_response(&hybrid(0.5)).unwrap();
  assert!(response.results.is_empty());
  assert!(response.degraded.is_empty());
}

#[test]
fn engine_reports_its_indexes() {
  let engine = rrf_engine();
  let stats = engine.index_stats().unwrap();

  assert_eq!(stats.len(), 2);
  assert_eq!(stats[0].name, IMAGE_INDEX);
  assert_eq!(stats[0].total_vectors, 2);
  assert_eq!(stats[1].name, TEXT_INDEX);
  assert_eq!(stats[1].namespaces.get(NAMESPACE), Some(&2));

  let info = engine.info();
  assert_eq!(info.retriever, RetrieverKind::DualIndex);
  assert_eq!(info.text_model, "fixed-text");
  assert_eq!(info.namespace, NAMESPACE);
}

#[test]
fn index_product_makes_a_product_searchable() {
  let engine = engine(Arc::new(empty_store()), rrf());
  let product = ProductRecord::new("D", "Dresses").filename("D.jpg");
  engine
    .index_product(&product, Some(IMAGE_QUERY), Some(TEXT_QUERY))
    .unwrap();

  let results = engine.search(&hybrid(0.5)).unwrap();
  assert_eq!(ids(&results), vec!["D"]);
  assert_close(results[0].image_score, 1.0);
  assert_close(results[0].text_score, 1.0);
}

#[test]
fn engine_is_shareable_across_threads() {
  let engine = Arc::new(rrf_engine());
  let handles: Vec<_> = (0..4)
    .map(|_| {
      let engine = Arc::clone(&engine);
      std::thread::spawn(move || engine.search(&hybrid(0.5)).unwrap())
    })
    .collect();

  for handle in handles {
    assert_eq!(ids(&handle.join().unwrap()), vec!["B", "A", "C"]);
  }
}

/// Stub text embedder that counts `embed_batch` calls.
struct CountingTextEmbedder {
  inner: StubTextEmbedder,
  batches: AtomicUsize,
}

impl TextEmbedder for CountingTextEmbedder {
  fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    self.inner.embed(text)
  }

  fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    self.batches.fetch_add(1, Ordering::SeqCst);
    self.inner.embed_batch(texts)
  }

  fn dimension(&self) -> usize {
    self.inner.dimension()
  }

  fn model_name(&self) -> &str {
    "counting-text"
  }
}

fn batching_engine(batch_size: usize) -> (SearchEngine, Arc<CountingTextEmbedder>) {
  init_tracing();
  let text = Arc::new(CountingTextEmbedder {
    inner: StubTextEmbedder::new(DIM),
    batches: AtomicUsize::new(0),
  });
  let engine = SearchEngine::builder()
    .image_embedder(Arc::new(StubImageEmbedder::new(DIM)))
    .text_embedder(text.clone())
    .store(Arc::new(empty_store()))
    .fusion(rrf())
    .config(EngineConfig {
      index_batch_size: batch_size,
      ..EngineConfig::default()
    })
    .build()
    .unwrap();
  (engine, text)
}

#[test]
fn index_products_embeds_texts_per_batch() {
  let (engine, counter) = batching_engine(2);
  let products: Vec<ProductRecord> = (0..5)
    .map(|i| ProductRecord::new(format!("sku-{i}"), "Bags").filename(format!("sku-{i}.jpg")))
    .collect();
  let descriptions = [
    Some("tan leather tote"),
    Some("black canvas backpack"),
    None,
    None,
    Some("red suede clutch"),
  ];
  let entries: Vec<CatalogEntry<'_>> = products
    .iter()
    .zip(descriptions)
    .map(|(product, text)| CatalogEntry {
      product,
      image: Some(product.filename.as_bytes()),
      text,
    })
    .collect();

  assert_eq!(engine.index_products(&entries).unwrap(), 5);
  // Batches [0, 1] and [4] carry text; [2, 3] does not.
  assert_eq!(counter.batches.load(Ordering::SeqCst), 2);

  let stats = engine.index_stats().unwrap();
  assert_eq!(stats[0].total_vectors, 5);
  assert_eq!(stats[1].total_vectors, 3);

  let query = SearchQuery::builder().text("red suede clutch").top_k(1).build();
  assert_eq!(ids(&engine.search(&query).unwrap()), vec!["sku-4"]);
}

#[test]
fn index_products_keeps_batches_written_before_a_failure() {
  let (engine, _) = batching_engine(2);
  let first = ProductRecord::new("ok-1", "Bags");
  let second = ProductRecord::new("ok-2", "Bags");
  let broken = ProductRecord::new("broken", "Bags");
  let entries = [
    CatalogEntry {
      product: &first,
      image: Some(&b"ok-1.jpg"[..]),
      text: Some("first bag"),
    },
    CatalogEntry {
      product: &second,
      image: Some(&b"ok-2.jpg"[..]),
      text: Some("second bag"),
    },
    CatalogEntry {
      product: &broken,
      image: Some(&b"broken.jpg"[..]),
      text: Some("   "),
    },
  ];

  let err = engine.index_products(&entries).unwrap_err();
  assert!(matches!(err, SearchError::Unavailable(_)));

  let stats = engine.index_stats().unwrap();
  assert_eq!(stats[0].total_vectors, 2);
  assert_eq!(stats[1].total_vectors, 2);
}
