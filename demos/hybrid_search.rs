//! Hybrid image + text search with reciprocal rank fusion.
//!
//! Reads `lookbook.toml` / `LOOKBOOK__*` if present, otherwise runs on defaults.

mod common;

use common::{demo_engine, init_tracing, print_results};
use lookbook::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
  init_tracing();
  println!("=== Lookbook Hybrid Search Example ===\n");

  let config = EngineConfig::load()?;
  let engine = demo_engine(config)?;

  let info = engine.info();
  println!(
    "retriever={} fusion={} image={}({}) text={}({})\n",
    info.retriever,
    info.fusion,
    info.image_model,
    info.image_dimension,
    info.text_model,
    info.text_dimension
  );

  println!("Query: photo of sku-2002 + \"red floral midi dress with puff sleeves\"");
  let query = SearchQuery::builder()
    .image(ImageData::new("sku-2002.jpg").mime_type("image/jpeg"))
    .text("red floral midi dress with puff sleeves")
    .top_k(5)
    .build();
  print_results(&engine.search(&query)?);

  println!("Same query, alpha = 0.9 (mostly image)");
  let query = SearchQuery::builder()
    .image(ImageData::new("sku-2002.jpg"))
    .text("red floral midi dress with puff sleeves")
    .alpha(0.9)
    .top_k(5)
    .build();
  print_results(&engine.search(&query)?);

  println!("Text only, category = Shoes");
  let query = SearchQuery::builder()
    .text("white leather low-top sneakers")
    .category("Shoes")
    .build();
  let response = engine.search_response(&query)?;
  println!("{:?}: {} result(s)", response.query_kind, response.total_results);
  print_results(&response.results);

  println!("Invalid query (no image, no text)");
  match engine.search(&SearchQuery::default()) {
    Ok(_) => println!("unexpectedly succeeded\n"),
    Err(e) => println!("error: {e}\n"),
  }

  for stats in engine.index_stats()? {
    println!(
      "index {} (dim {}): {} vectors",
      stats.name, stats.dimension, stats.total_vectors
    );
  }

  Ok(())
}
