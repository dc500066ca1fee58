use lookbook::prelude::*;
use std::sync::Arc;

/// A catalogue entry for the demos.
pub struct Product {
  pub id: &'static str,
  pub category: &'static str,
  pub filename: &'static str,
  pub description: &'static str,
}

/// A small fashion catalogue.
pub fn sample_products() -> Vec<Product> {
  vec![
    Product {
      id: "sku-1001",
      category: "Dresses",
      filename: "sku-1001.jpg",
      description: "red floral midi dress with puff sleeves",
    },
    Product {
      id: "sku-1002",
      category: "Dresses",
      filename: "sku-1002.jpg",
      description: "black satin slip dress",
    },
    Product {
      id: "sku-2001",
      category: "Shoes",
      filename: "sku-2001.jpg",
      description: "white leather low-top sneakers",
    },
    Product {
      id: "sku-2002",
      category: "Shoes",
      filename: "sku-2002.jpg",
      description: "red suede ankle boots",
    },
    Product {
      id: "sku-3001",
      category: "Bags",
      filename: "sku-3001.jpg",
      description: "tan leather tote bag",
    },
  ]
}

/// Installs a `fmt` subscriber; `RUST_LOG=lookbook=debug` shows the pipeline.
pub fn init_tracing() {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lookbook=info")),
    )
    .with_target(false)
    .init();
}

/// An in-memory store laid out for `config`, sized for the stub embedders.
pub fn store_for(config: &EngineConfig) -> Arc<dyn VectorStore> {
  let image = StubImageEmbedder::default().dimension();
  let text = StubTextEmbedder::default().dimension();
  let store = match config.backend {
    RetrieverKind::DualIndex => InMemVectorStore::new()
      .with_index(config.image_index.as_str(), image)
      .with_index(config.text_index.as_str(), text),
    // One index holds both spaces, so both use the image dimension.
    RetrieverKind::TaggedIndex => InMemVectorStore::new().with_index(config.shared_index.as_str(), image),
  };
  Arc::new(store)
}

/// Builds an engine over stub embedders and indexes the sample catalogue.
pub fn demo_engine(config: EngineConfig) -> Result<SearchEngine, SearchError> {
  let image = StubImageEmbedder::default();
  let text = match config.backend {
    RetrieverKind::DualIndex => StubTextEmbedder::default(),
    RetrieverKind::TaggedIndex => StubTextEmbedder::new(image.dimension()),
  };

  let store = store_for(&config);
  let engine = SearchEngine::from_config(config, store, Arc::new(image), Arc::new(text))?;

  let products = sample_products();
  let records: Vec<ProductRecord> = products
    .iter()
    .map(|p| ProductRecord::new(p.id, p.category).filename(p.filename))
    .collect();
  // The stub image embedder hashes bytes, so the filename stands in for pixels.
  let entries: Vec<CatalogEntry<'_>> = products
    .iter()
    .zip(&records)
    .map(|(p, product)| CatalogEntry {
      product,
      image: Some(p.filename.as_bytes()),
      text: Some(p.description),
    })
    .collect();
  engine.index_products(&entries)?;
  Ok(engine)
}

pub fn print_results(results: &[FusedResult]) {
  for (i, r) in results.iter().enumerate() {
    let sources: Vec<_> = r.sources.iter().map(|m| m.as_str()).collect();
    println!(
      "{}. {} [{}] score={:.5} image={:.3} text={:.3} via {}",
      i + 1,
      r.product_id,
      r.category,
      r.score,
      r.image_score,
      r.text_score,
      sources.join("+"),
    );
  }
  println!();
}
