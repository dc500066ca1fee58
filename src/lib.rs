//! Lookbook - multimodal product search over image and text embeddings.
//!
//! Lookbook embeds a query image and/or query text, retrieves nearest
//! neighbours per modality from a vector store, and merges them into one
//! ranked product list with reciprocal rank fusion or weighted reranking.

pub mod types;
pub mod error;
pub mod filter;
pub mod embeddings;
pub mod index;
pub mod retriever;
pub mod retrievers;
pub mod fusion;
pub mod engine;
pub mod config;

pub mod prelude {
    //! Convenient re-exports for common types and traits.

    pub use crate::types::*;
    pub use crate::error::*;
    pub use crate::filter::*;
    pub use crate::embeddings::*;
    pub use crate::index::*;
    pub use crate::retriever::*;
    pub use crate::retrievers::*;
    pub use crate::fusion::*;
    pub use crate::engine::*;
    pub use crate::config::*;
}
