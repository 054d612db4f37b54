//! Read-mostly layer metadata cache.
//!
//! An immutable snapshot swapped wholesale on configuration change.
//! Readers clone the `Arc` under a short read lock and can never observe
//! a partially applied update; there is no partial invalidation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use feature_common::LayerMetadata;

type Snapshot = HashMap<String, LayerMetadata>;

/// Shared snapshot cache of layer metadata, keyed by collection id.
#[derive(Debug, Default)]
pub struct MetadataCache {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl MetadataCache {
    pub fn new(layers: impl IntoIterator<Item = LayerMetadata>) -> Self {
        let map: Snapshot = layers
            .into_iter()
            .map(|l| (l.collection_id.clone(), l))
            .collect();
        Self {
            snapshot: RwLock::new(Arc::new(map)),
        }
    }

    /// Fetch one layer from the current snapshot.
    pub fn layer(&self, collection_id: &str) -> Option<LayerMetadata> {
        self.current().get(collection_id).cloned()
    }

    /// The current snapshot as a whole.
    pub fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .expect("metadata cache lock poisoned")
            .clone()
    }

    /// Replace the snapshot wholesale.
    pub fn replace(&self, layers: impl IntoIterator<Item = LayerMetadata>) {
        let map: Snapshot = layers
            .into_iter()
            .map(|l| (l.collection_id.clone(), l))
            .collect();
        let count = map.len();
        *self
            .snapshot
            .write()
            .expect("metadata cache lock poisoned") = Arc::new(map);
        tracing::debug!(layers = count, "metadata snapshot replaced");
    }
}
