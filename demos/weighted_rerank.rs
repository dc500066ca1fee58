//! Image retrieval reranked by stored text vectors.

mod common;

use common::{demo_engine, init_tracing, print_results};
use lookbook::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
  init_tracing();
  println!("=== Lookbook Weighted Rerank Example ===\n");

  let config = EngineConfig {
    fusion: FusionMethod::Weighted,
    ..EngineConfig::load()?
  };
  let engine = demo_engine(config)?;
  println!("fusion={}\n", engine.info().fusion);

  let image = ImageData::new("sku-1001.jpg");
  let text = "red suede ankle boots";

  println!("Image only");
  let query = SearchQuery::builder().image(image.clone()).top_k(3).build();
  print_results(&engine.search(&query)?);

  println!("Image + text, weights 0.7 / 0.3");
  let query = SearchQuery::builder()
    .image(image.clone())
    .text(text)
    .fusion(FusionParams::default().weights(0.7, 0.3))
    .top_k(3)
    .build();
  print_results(&engine.search(&query)?);

  println!("Image + text, weights 0.2 / 0.8");
  let query = SearchQuery::builder()
    .image(image.clone())
    .text(text)
    .fusion(FusionParams::default().weights(0.2, 0.8))
    .top_k(3)
    .build();
  print_results(&engine.search(&query)?);

  println!("Image + text, rerank off");
  let query = SearchQuery::builder()
    .image(image)
    .text(text)
    .fusion(FusionParams::default().rerank(false))
    .top_k(3)
    .build();
  print_results(&engine.search(&query)?);

  Ok(())
}
