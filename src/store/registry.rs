use std::collections::BTreeMap;
use std::fmt;

use super::{ArrayStore, CarrayStore, TiledStore, ZarrStore};

/// Stores available to the benchmark, keyed by name
pub struct StoreRegistry {
    stores: BTreeMap<String, Box<dyn ArrayStore>>,
}

impl StoreRegistry {
    /// Registry with no stores
    pub fn empty() -> Self {
        Self {
            stores: BTreeMap::new(),
        }
    }

    /// Add a store, replacing any store registered under the same name
    pub fn register(&mut self, store: Box<dyn ArrayStore>) {
        self.stores.insert(store.name().to_string(), store);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, store: impl ArrayStore + 'static) -> Self {
        self.register(Box::new(store));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn ArrayStore> {
        self.stores.get(name).map(|store| store.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stores.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.stores.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn ArrayStore> {
        self.stores.values().map(|store| store.as_ref())
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::empty()
            .with(TiledStore::new())
            .with(ZarrStore::new())
            .with(CarrayStore::new())
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.names())
            .finish()
    }
}
