//! Adapter registry.
//!
//! Read by every dispatch, written only when an adapter is added. Writers
//! publish a new snapshot atomically so readers never see a partial update.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{info, warn};

use super::adapter::BoxedAdapter;
use crate::foundation::ConnectorType;

/// An immutable view of the registered adapters.
#[derive(Default, Clone)]
pub struct RegistrySnapshot {
    by_application_id: HashMap<String, BoxedAdapter>,
    by_connector_type: HashMap<ConnectorType, BoxedAdapter>,
}

impl RegistrySnapshot {
    /// Adapter serving `application_id`.
    pub fn by_application_id(&self, application_id: &str) -> Option<&BoxedAdapter> {
        self.by_application_id.get(application_id)
    }

    /// First adapter registered for `connector_type`.
    pub fn by_connector_type(&self, connector_type: &ConnectorType) -> Option<&BoxedAdapter> {
        self.by_connector_type.get(connector_type)
    }

    /// Iterates over the adapters, keyed by application id.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BoxedAdapter)> {
        self.by_application_id.iter()
    }

    /// Number of adapters.
    pub fn len(&self) -> usize {
        self.by_application_id.len()
    }

    /// Returns true when no adapter is registered.
    pub fn is_empty(&self) -> bool {
        self.by_application_id.is_empty()
    }
}

/// Copy-on-write registry of adapters.
#[derive(Default)]
pub struct AdapterRegistry {
    inner: ArcSwap<RegistrySnapshot>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an adapter, replacing any adapter serving the same application id.
    pub fn register(&self, adapter: BoxedAdapter) {
        let application_id = adapter.application_id().to_string();
        let connector_type = adapter.connector_type().clone();

        self.inner.rcu(|current| {
            let mut next = RegistrySnapshot::clone(current);
            if next.by_application_id.contains_key(&application_id) {
                warn!(application_id = %application_id, "Replacing adapter");
            }
            next.by_application_id
                .insert(application_id.clone(), Arc::clone(&adapter));
            next.by_connector_type
                .entry(connector_type.clone())
                .or_insert_with(|| Arc::clone(&adapter));
            next
        });

        info!(
            application_id = %application_id,
            connector_type = %connector_type,
            adapter = adapter.name(),
            "Adapter registered"
        );
    }

    /// Adapter serving `application_id`.
    pub fn by_application_id(&self, application_id: &str) -> Option<BoxedAdapter> {
        self.inner.load().by_application_id(application_id).cloned()
    }

    /// First adapter registered for `connector_type`.
    pub fn by_connector_type(&self, connector_type: &ConnectorType) -> Option<BoxedAdapter> {
        self.inner.load().by_connector_type(connector_type).cloned()
    }

    /// Adapter that renders for `target` on behalf of an adapter of type `from`.
    ///
    /// Returns `None` when no delegation is needed or no adapter is known
    /// for the target.
    pub fn delegate(&self, from: &ConnectorType, target: &ConnectorType) -> Option<BoxedAdapter> {
        if from == target {
            return None;
        }
        self.by_connector_type(target)
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.inner.load_full()
    }

    /// Number of adapters.
    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    /// Returns true when no adapter is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }
}
