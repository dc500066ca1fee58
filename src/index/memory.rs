//! In-memory vector store.

use crate::error::StoreError;
use crate::index::adapter::{IndexStats, StoreMatch, VectorQuery, VectorRecord, VectorStore};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// One named index: a fixed dimension and its namespaces.
struct IndexState {
    dimension: usize,
    namespaces: HashMap<String, HashMap<String, VectorRecord>>,
}

/// In-memory vector store using brute-force cosine similarity.
///
/// Indexes must be created with [`create_index`](Self::create_index) before use;
/// every vector written to an index must match its dimension.
pub struct InMemVectorStore {
    indexes: RwLock<HashMap<String, IndexState>>,
}

impl InMemVectorStore {
    /// Create a new store with no indexes.
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Create (or reset) an index of the given dimension.
    pub fn create_index(&self, name: impl Into<String>, dimension: usize) -> Result<(), StoreError> {
        let mut indexes = self.indexes.write().map_err(poisoned)?;
        indexes.insert(
            name.into(),
            IndexState {
                dimension,
                namespaces: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Builder-style variant of [`create_index`](Self::create_index).
    pub fn with_index(mut self, name: impl Into<String>, dimension: usize) -> Self {
        if let Ok(indexes) = self.indexes.get_mut() {
            indexes.insert(
                name.into(),
                IndexState {
                    dimension,
                    namespaces: HashMap::new(),
                },
            );
        }
        self
    }
}

impl Default for InMemVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorStore for InMemVectorStore {
    fn query(&self, index: &str, query: &VectorQuery<'_>) -> Result<Vec<StoreMatch>, StoreError> {
        let indexes = self.indexes.read().map_err(poisoned)?;
        let state = indexes
            .get(index)
            .ok_or_else(|| StoreError::UnknownIndex(index.to_string()))?;

        if query.vector.len() != state.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: state.dimension,
                actual: query.vector.len(),
            });
        }

        let Some(records) = state.namespaces.get(query.namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<StoreMatch> = records
            .values()
            .filter(|r| query.filter.map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| StoreMatch {
                id: r.id.clone(),
                score: cosine_similarity(query.vector, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();

        // Sort by similarity (descending), ids keep the order stable.
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(query.top_k);

        Ok(matches)
    }

    fn upsert(
        &self,
        index: &str,
        namespace: &str,
        records: Vec<VectorRecord>,
    ) -> Result<usize, StoreError> {
        let mut indexes = self.indexes.write().map_err(poisoned)?;
        let state = indexes
            .get_mut(index)
            .ok_or_else(|| StoreError::UnknownIndex(index.to_string()))?;

        // Validate the whole batch first so a bad record leaves the index untouched.
        if let Some(bad) = records.iter().find(|r| r.values.len() != state.dimension) {
            return Err(StoreError::DimensionMismatch {
                expected: state.dimension,
                actual: bad.values.len(),
            });
        }
        if let Some(bad) = records.iter().find(|r| r.values.iter().any(|x| !x.is_finite())) {
            return Err(StoreError::Malformed(format!(
                "record {} has non-finite components",
                bad.id
            )));
        }

        let written = records.len();
        let space = state.namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            space.insert(record.id.clone(), record);
        }

        Ok(written)
    }

    fn fetch(
        &self,
        index: &str,
        namespace: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<f32>>, StoreError> {
        let indexes = self.indexes.read().map_err(poisoned)?;
        let state = indexes
            .get(index)
            .ok_or_else(|| StoreError::UnknownIndex(index.to_string()))?;

        let Some(records) = state.namespaces.get(namespace) else {
            return Ok(HashMap::new());
        };

        Ok(ids
            .iter()
            .filter_map(|id| records.get(id).map(|r| (id.clone(), r.values.clone())))
            .collect())
    }

    fn describe(&self, index: &str) -> Result<IndexStats, StoreError> {
        let indexes = self.indexes.read().map_err(poisoned)?;
        let state = indexes
            .get(index)
            .ok_or_else(|| StoreError::UnknownIndex(index.to_string()))?;

        let namespaces: BTreeMap<String, usize> = state
            .namespaces
            .iter()
            .map(|(name, records)| (name.clone(), records.len()))
            .collect();

        Ok(IndexStats {
            name: index.to_string(),
            dimension: state.dimension,
            total_vectors: namespaces.values().sum(),
            namespaces,
        })
    }

    fn delete_all(&self, index: &str, namespace: &str) -> Result<(), StoreError> {
        let mut indexes = self.indexes.write().map_err(poisoned)?;
        let state = indexes
            .get_mut(index)
            .ok_or_else(|| StoreError::UnknownIndex(index.to_string()))?;
        state.namespaces.remove(namespace);
        Ok(())
    }
}

fn poisoned<E>(_: E) -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

/// Cosine similarity; zero-length vectors score 0.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, na, nb), (x, y)| {
            (d + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
