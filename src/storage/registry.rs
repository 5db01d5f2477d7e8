// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Registry of per-category stores.
//!
//! One [`Storage`] owns three disjoint maps (authenticated, mailbox, append-only) from category
//! name to store. The first access to a category inserts an empty slot under a short write
//! lock; the store is then opened under that slot's own lock, so racing callers get the same
//! instance while other categories stay readable.

use crate::core::{config::StorageConfig, metadata::MetaData, types::ContentHash};
use crate::monitoring::metrics::Metrics;
use crate::storage::{
    data_store::{AppendOnlyDataStore, AuthenticatedDataStore, DataStore, MailboxDataStore},
    persistence::PersistenceError,
    policy::{AppendOnlyPolicy, AuthenticatedPolicy, MailboxPolicy, StorePolicy, StoreType},
    record::{AddDataRequest, PutOutcome},
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError},
};
use thiserror::Error;
use tracing::{info, warn};

/// Registry errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("persistence: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("invalid category name")]
    InvalidCategory,
}

type Slot<P> = Arc<Mutex<Option<Arc<DataStore<P>>>>>;
type Family<P> = RwLock<HashMap<String, Slot<P>>>;

fn lock_slot<P: StorePolicy>(slot: &Slot<P>) -> MutexGuard<'_, Option<Arc<DataStore<P>>>> {
    match slot.lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    }
}

/// Store of `slot` if it is open. A slot whose store is still being opened reads as empty.
fn peek_slot<P: StorePolicy>(slot: &Slot<P>) -> Option<Arc<DataStore<P>>> {
    match slot.try_lock() {
        Ok(g) => g.clone(),
        Err(TryLockError::Poisoned(p)) => p.into_inner().clone(),
        Err(TryLockError::WouldBlock) => None,
    }
}

/// Lazily populated cache of stores, one per category and family.
pub struct Storage {
    root: PathBuf,
    cfg: StorageConfig,
    metrics: Arc<Metrics>,
    authenticated: Family<AuthenticatedPolicy>,
    mailbox: Family<MailboxPolicy>,
    append_only: Family<AppendOnlyPolicy>,
}

fn valid_category(category: &str) -> bool {
    !category.is_empty()
        && category != "."
        && category != ".."
        && category.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

impl Storage {
    /// Create a registry rooted at `<data_dir>/db`.
    pub fn open(
        data_dir: impl AsRef<Path>,
        cfg: StorageConfig,
        metrics: Arc<Metrics>,
    ) -> Result<Self, StorageError> {
        let root = data_dir.as_ref().join("db");
        fs::create_dir_all(&root)?;
        info!(root = %root.display(), "storage registry opened");
        Ok(Self {
            root,
            cfg,
            metrics,
            authenticated: RwLock::new(HashMap::new()),
            mailbox: RwLock::new(HashMap::new()),
            append_only: RwLock::new(HashMap::new()),
        })
    }

    fn get_or_create<P: StorePolicy>(
        &self,
        family: &Family<P>,
        meta: &MetaData,
    ) -> Result<Arc<DataStore<P>>, StorageError> {
        if !valid_category(&meta.category) {
            return Err(StorageError::InvalidCategory);
        }
        let existing = {
            let map = match family.read() {
                Ok(m) => m,
                Err(p) => p.into_inner(),
            };
            map.get(&meta.category).cloned()
        };
        let slot = match existing {
            Some(slot) => slot,
            None => {
                let mut map = match family.write() {
                    Ok(m) => m,
                    Err(p) => p.into_inner(),
                };
                map.entry(meta.category.clone()).or_default().clone()
            }
        };

        let mut guard = lock_slot(&slot);
        // Another caller may have opened it while we waited for the slot.
        if let Some(store) = guard.as_ref() {
            return Ok(store.clone());
        }
        let dir = self.root.join(P::STORE_TYPE.store_name()).join(&meta.category);
        let store = Arc::new(DataStore::<P>::open(&dir, meta.clone(), &self.cfg, self.metrics.clone())?);
        *guard = Some(store.clone());
        self.metrics.stores_open.inc();
        Ok(store)
    }

    /// Store for owner-authenticated data of `meta.category`.
    pub fn get_authenticated_store(
        &self,
        meta: &MetaData,
    ) -> Result<Arc<AuthenticatedDataStore>, StorageError> {
        self.get_or_create(&self.authenticated, meta)
    }

    /// Store for mailbox messages of `meta.category`.
    pub fn get_mailbox_store(&self, meta: &MetaData) -> Result<Arc<MailboxDataStore>, StorageError> {
        self.get_or_create(&self.mailbox, meta)
    }

    /// Store for append-only data of `meta.category`.
    pub fn get_append_only_store(
        &self,
        meta: &MetaData,
    ) -> Result<Arc<AppendOnlyDataStore>, StorageError> {
        self.get_or_create(&self.append_only, meta)
    }

    /// Route an inbound add to the store of its family and category.
    pub fn on_add_request(&self, request: AddDataRequest) -> Result<PutOutcome, StorageError> {
        let outcome = match request {
            AddDataRequest::Authenticated { meta, record } => {
                self.get_authenticated_store(&meta)?.put(record.key(), record)
            }
            AddDataRequest::Mailbox { meta, record } => {
                self.get_mailbox_store(&meta)?.put(record.key(), record)
            }
            AddDataRequest::AppendOnly { meta, record } => {
                self.get_append_only_store(&meta)?.put(record.key(), record)
            }
        };
        Ok(outcome)
    }

    fn snapshot<P: StorePolicy>(family: &Family<P>) -> Vec<Arc<DataStore<P>>> {
        let slots: Vec<Slot<P>> = match family.read() {
            Ok(m) => m.values().cloned().collect(),
            Err(p) => p.into_inner().values().cloned().collect(),
        };
        slots.iter().filter_map(peek_slot).collect()
    }

    /// Prune expired records in every cached store. Returns the total removed.
    pub fn prune_all(&self, now: u64) -> usize {
        let mut total = 0;
        for s in Self::snapshot(&self.authenticated) {
            total += s.prune_expired(now);
        }
        for s in Self::snapshot(&self.mailbox) {
            total += s.prune_expired(now);
        }
        for s in Self::snapshot(&self.append_only) {
            total += s.prune_expired(now);
        }
        total
    }

    /// Keys of every cached store of one family.
    pub fn keys(&self, store_type: StoreType) -> Vec<ContentHash> {
        match store_type {
            StoreType::Authenticated => {
                Self::snapshot(&self.authenticated).iter().flat_map(|s| s.keys()).collect()
            }
            StoreType::Mailbox => {
                Self::snapshot(&self.mailbox).iter().flat_map(|s| s.keys()).collect()
            }
            StoreType::AppendOnly => {
                Self::snapshot(&self.append_only).iter().flat_map(|s| s.keys()).collect()
            }
        }
    }

    /// Number of cached stores across all families.
    pub fn store_count(&self) -> usize {
        Self::snapshot(&self.authenticated).len()
            + Self::snapshot(&self.mailbox).len()
            + Self::snapshot(&self.append_only).len()
    }

    fn shutdown_family<P: StorePolicy>(&self, family: &Family<P>) {
        let slots: Vec<(String, Slot<P>)> = {
            let mut map = match family.write() {
                Ok(m) => m,
                Err(p) => p.into_inner(),
            };
            map.drain().collect()
        };
        for (category, slot) in slots {
            // Waits for a store that is still being opened.
            let Some(store) = lock_slot(&slot).take() else { continue };
            if let Err(e) = store.shutdown() {
                warn!(store = P::STORE_TYPE.store_name(), %category, ?e, "store shutdown failed; continuing");
            }
            self.metrics.stores_open.dec();
        }
    }

    /// Shut down every cached store. Failures are logged and do not stop the others.
    pub fn shutdown_all(&self) {
        self.shutdown_family(&self.authenticated);
        self.shutdown_family(&self.mailbox);
        self.shutdown_family(&self.append_only);
        info!("all stores shut down");
    }
}
