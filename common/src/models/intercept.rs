// common/src/models/intercept.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// database -> object store -> key -> value
pub type IndexedDbOverrides = BTreeMap<String, BTreeMap<String, BTreeMap<String, Value>>>;

/// Storage reads an embedded app should see instead of what it persisted.
///
/// Serialized as-is into the page, so field names follow the browser APIs
/// the injected script patches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterceptConfiguration {
    #[serde(rename = "indexedDB", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indexed_db: IndexedDbOverrides,
    #[serde(rename = "localStorage", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub local_storage: BTreeMap<String, LocalStorageOverride>,
}

/// Override for one `localStorage` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LocalStorageOverride {
    /// Returned verbatim from `getItem`
    Value(String),
    /// Dot-path assignments applied to the stored JSON document
    Patch(BTreeMap<String, Value>),
}

impl InterceptConfiguration {
    pub fn is_empty(&self) -> bool {
        let no_indexed_db = self
            .indexed_db
            .values()
            .flat_map(|stores| stores.values())
            .all(|keys| keys.is_empty());
        no_indexed_db && self.local_storage.is_empty()
    }

    pub fn with_indexed_db(
        mut self,
        database: impl Into<String>,
        store: impl Into<String>,
        key: impl Into<String>,
        value: Value,
    ) -> Self {
        self.indexed_db
            .entry(database.into())
            .or_default()
            .entry(store.into())
            .or_default()
            .insert(key.into(), value);
        self
    }

    pub fn with_local_storage(mut self, key: impl Into<String>, rule: LocalStorageOverride) -> Self {
        self.local_storage.insert(key.into(), rule);
        self
    }
}
