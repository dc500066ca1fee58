//! Vector store adapters for lookbook.

pub mod adapter;
pub mod memory;

pub use adapter::{IndexStats, StoreMatch, VectorQuery, VectorRecord, VectorStore};
pub use memory::InMemVectorStore;
