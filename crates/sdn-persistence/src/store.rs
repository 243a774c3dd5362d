// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `PersistenceStore`: the external key-value store this controller treats
//! as its durable memory for routes, shadow flow-table snapshots, and
//! recovery bookkeeping.
//!
//! Grounded on `hdds-persistence/src/store.rs`'s trait shape (a narrow set
//! of save/load/clear operations returning `anyhow::Result`, meant to be
//! implemented by exactly one real backend plus test doubles); generalized
//! from DDS `Sample` records to plain string keys and JSON-text values,
//! matching the flat `namespace:id` key layout the persistence layer
//! actually uses.

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A durable key-value store plus the two role-toggle operations the
/// cluster mastership state machine drives as it promotes or demotes
/// itself.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// All keys beginning with `prefix`, unordered.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
    async fn clear(&self) -> Result<()>;

    /// Promotes this node's datastore to master (`REPLICAOF NO ONE`).
    async fn setup_master_role(&self) -> Result<()>;
    /// Configures this node's datastore as a replica of `address:port`.
    async fn setup_slave_of(&self, address: &str, port: u16) -> Result<()>;
}

/// JSON convenience helpers layered over the byte-string primitives above.
/// Every caller in this workspace stores structured state (routes, shadow
/// flow entries, DPID lists) as JSON text, so this is the surface they
/// actually use day to day.
#[async_trait]
pub trait PersistenceStoreExt: PersistenceStore {
    async fn put_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.put(key, &text).await
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }
}

impl<S: PersistenceStore + ?Sized> PersistenceStoreExt for S {}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory stand-in used by `sdn-core`'s own tests so they don't
    /// need a live Redis instance.
    #[derive(Default)]
    pub struct MockStore {
        data: Mutex<HashMap<String, String>>,
        pub role: Mutex<Option<(Option<String>, Option<u16>)>>,
    }

    impl MockStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl PersistenceStore for MockStore {
        async fn put(&self, key: &str, value: &str) -> Result<()> {
            self.data.lock().await.insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.data.lock().await.get(key).cloned())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.data.lock().await.remove(key);
            Ok(())
        }

        async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self.data.lock().await.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
        }

        async fn clear(&self) -> Result<()> {
            self.data.lock().await.clear();
            Ok(())
        }

        async fn setup_master_role(&self) -> Result<()> {
            *self.role.lock().await = None;
            Ok(())
        }

        async fn setup_slave_of(&self, address: &str, port: u16) -> Result<()> {
            *self.role.lock().await = Some((Some(address.to_string()), Some(port)));
            Ok(())
        }
    }

    #[tokio::test]
    async fn put_get_json_round_trips() {
        let store = MockStore::new();
        store.put_json("topology:route:1", &vec![1u64, 2, 3]).await.unwrap();
        let value: Option<Vec<u64>> = store.get_json("topology:route:1").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn keys_filters_by_prefix() {
        let store = MockStore::new();
        store.put("flow-entries-verifier:state:1:0", "{}").await.unwrap();
        store.put("flow-entries-verifier:state:1:1", "{}").await.unwrap();
        store.put("topology:route:1", "{}").await.unwrap();
        let mut keys = store.keys("flow-entries-verifier:state:1:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["flow-entries-verifier:state:1:0", "flow-entries-verifier:state:1:1"]);
    }
}
