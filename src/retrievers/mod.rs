//! Built-in `Retriever` implementations.
//!
//! - [`DualIndexRetriever`](crate::retrievers::DualIndexRetriever): separate image and text indexes.
//! - [`TaggedIndexRetriever`](crate::retrievers::TaggedIndexRetriever): one shared index, vectors
//!   tagged with `kind = "img" | "txt"`.
//!
//! # Example
//!
//! ```rust
//! use lookbook::prelude::*;
//! use lookbook::retrievers::DualIndexRetriever;
//! use std::sync::Arc;
//!
//! let store = InMemVectorStore::new()
//!     .with_index("product-images", 768)
//!     .with_index("product-text", 1024);
//! let retriever = DualIndexRetriever::new(Arc::new(store), "product-images", "product-text");
//! assert_eq!(retriever.kind(), RetrieverKind::DualIndex);
//! ```

/// Implements retrieval from one index per modality.
pub mod dual;
/// Implements retrieval from a shared, tagged index.
pub mod tagged;

pub use dual::DualIndexRetriever;
pub use tagged::TaggedIndexRetriever;
