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

//! Per-store durable backing using sled.
//!
//! Each store owns one [`Backend`], a sled database in production. Mutations are handed to a
//! dedicated writer thread as batches of [`KvOp`]s and committed atomically; the mutation path
//! never waits for disk. A failed batch is logged and retried together with the next one.
//! While retrying, later ops on the same key replace earlier ones.

use crate::core::types::{decode_canonical_limited, encode_canonical, ContentHash, PubKeyHash};
use crate::monitoring::metrics::Metrics;
use crate::storage::record::{OwnerSequence, StoredEntry};
use sled::transaction::ConflictableTransactionError;
use std::{
    collections::BTreeMap,
    path::Path,
    sync::{mpsc, Arc, Mutex},
    thread,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, warn};

const RECORD_PREFIX: &[u8] = b"r/";
const SEQUENCE_PREFIX: &[u8] = b"s/";

/// Upper bound for a single persisted value.
const MAX_VALUE_BYTES: usize = 4 * 1024 * 1024;

/// Distinct keys kept for retry before unpersisted ops are dropped.
pub const MAX_PENDING_KEYS: usize = 1 << 20;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("db open")]
    DbOpen,
    #[error("db io")]
    DbIo,
    #[error("tx conflict")]
    TxConflict,
    #[error("codec")]
    Codec,
    #[error("writer stopped")]
    WriterStopped,
    #[error("flush timed out")]
    FlushTimeout,
}

/// Storage operation.
#[derive(Clone, Debug)]
pub enum KvOp {
    /// Put key/value.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete key.
    Del { key: Vec<u8> },
}

impl KvOp {
    /// Key the op touches.
    pub fn key(&self) -> &[u8] {
        match self {
            KvOp::Put { key, .. } | KvOp::Del { key } => key,
        }
    }

    /// Store or overwrite a record.
    pub fn put_record(key: &ContentHash, entry: &StoredEntry) -> Result<Self, PersistenceError> {
        let value = encode_canonical(entry).map_err(|_| PersistenceError::Codec)?;
        Ok(KvOp::Put { key: prefixed(RECORD_PREFIX, key.as_bytes()), value })
    }

    /// Delete a record.
    pub fn del_record(key: &ContentHash) -> Self {
        KvOp::Del { key: prefixed(RECORD_PREFIX, key.as_bytes()) }
    }

    /// Store an owner's sequence bookkeeping.
    pub fn put_sequence(owner: &PubKeyHash, seq: &OwnerSequence) -> Result<Self, PersistenceError> {
        let value = encode_canonical(seq).map_err(|_| PersistenceError::Codec)?;
        Ok(KvOp::Put { key: prefixed(SEQUENCE_PREFIX, owner.as_bytes()), value })
    }

    /// Forget an owner's sequence bookkeeping.
    pub fn del_sequence(owner: &PubKeyHash) -> Self {
        KvOp::Del { key: prefixed(SEQUENCE_PREFIX, owner.as_bytes()) }
    }
}

fn prefixed(prefix: &[u8], id: &[u8; 32]) -> Vec<u8> {
    let mut k = Vec::with_capacity(prefix.len() + 32);
    k.extend_from_slice(prefix);
    k.extend_from_slice(id);
    k
}

fn id_from_key(prefix: &[u8], key: &[u8]) -> Option<[u8; 32]> {
    let rest = key.strip_prefix(prefix)?;
    if rest.len() != 32 {
        return None;
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(rest);
    Some(out)
}

/// Contents read back on open.
#[derive(Debug, Default)]
pub struct LoadedStore {
    /// Records by key.
    pub records: Vec<(ContentHash, StoredEntry)>,
    /// Owner sequence bookkeeping.
    pub sequences: Vec<(PubKeyHash, OwnerSequence)>,
}

/// Key-value engine under a store.
pub trait Backend: Send + Sync + 'static {
    /// Every key/value pair.
    fn scan(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, PersistenceError>;
    /// Apply `ops` all or nothing.
    fn commit(&self, ops: &[KvOp]) -> Result<(), PersistenceError>;
    /// Make committed ops durable.
    fn flush(&self) -> Result<(), PersistenceError>;
}

impl Backend for sled::Db {
    fn scan(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, PersistenceError> {
        self.iter()
            .map(|item| {
                item.map(|(k, v)| (k.to_vec(), v.to_vec())).map_err(|_| PersistenceError::DbIo)
            })
            .collect()
    }

    fn commit(&self, ops: &[KvOp]) -> Result<(), PersistenceError> {
        commit_atomic(self, ops)
    }

    fn flush(&self) -> Result<(), PersistenceError> {
        sled::Tree::flush(self).map(|_| ()).map_err(|_| PersistenceError::DbIo)
    }
}

enum Command {
    Write(Vec<KvOp>),
    Flush(mpsc::Sender<Result<(), PersistenceError>>),
}

/// Durable backing of one store.
pub struct Persistence {
    backend: Arc<dyn Backend>,
    label: String,
    tx: Mutex<Option<mpsc::Sender<Command>>>,
    writer: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Persistence {
    /// Open (or create) the sled database at `path` and start its writer thread.
    pub fn open(
        path: &Path,
        label: impl Into<String>,
        flush_every_ms: u64,
        metrics: Arc<Metrics>,
    ) -> Result<Self, PersistenceError> {
        let label = label.into();
        let db = sled::Config::new()
            .path(path)
            .flush_every_ms(Some(flush_every_ms.max(1)))
            .open()
            .map_err(|_| PersistenceError::DbOpen)?;
        Self::with_backend(Arc::new(db), label, metrics)
    }

    /// Start a writer thread over an already opened backend.
    pub fn with_backend(
        backend: Arc<dyn Backend>,
        label: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, PersistenceError> {
        let label = label.into();
        let (tx, rx) = mpsc::channel::<Command>();
        let writer_backend = backend.clone();
        let writer_label = label.clone();
        let writer = thread::Builder::new()
            .name(format!("persist-{label}"))
            .spawn(move || run_writer(writer_backend, writer_label, rx, metrics))
            .map_err(|_| PersistenceError::DbOpen)?;

        Ok(Self { backend, label, tx: Mutex::new(Some(tx)), writer: Mutex::new(Some(writer)) })
    }

    /// Read all records and sequences. Undecodable entries are skipped.
    pub fn load(&self) -> Result<LoadedStore, PersistenceError> {
        let mut out = LoadedStore::default();
        for (k, v) in self.backend.scan()? {
            if let Some(id) = id_from_key(RECORD_PREFIX, &k) {
                match decode_canonical_limited::<StoredEntry>(&v, MAX_VALUE_BYTES) {
                    Ok(r) => out.records.push((ContentHash::from_bytes(id), r)),
                    Err(e) => warn!(store = %self.label, key = %hex::encode(id), ?e, "skipping undecodable record"),
                }
            } else if let Some(id) = id_from_key(SEQUENCE_PREFIX, &k) {
                match decode_canonical_limited::<OwnerSequence>(&v, MAX_VALUE_BYTES) {
                    Ok(s) => out.sequences.push((PubKeyHash::from_bytes(id), s)),
                    Err(e) => warn!(store = %self.label, owner = %hex::encode(id), ?e, "skipping undecodable sequence"),
                }
            }
        }
        Ok(out)
    }

    /// Queue ops for the writer thread (fire-and-forget).
    pub fn persist(&self, ops: Vec<KvOp>) {
        if ops.is_empty() {
            return;
        }
        let guard = match self.tx.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(Command::Write(ops)).is_err() {
                    warn!(store = %self.label, "persistence writer gone; dropping write");
                }
            }
            None => warn!(store = %self.label, "persist after shutdown; dropping write"),
        }
    }

    /// Flush queued writes and stop the writer, waiting at most `timeout`.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), PersistenceError> {
        let tx = match self.tx.lock() {
            Ok(mut g) => g.take(),
            Err(p) => p.into_inner().take(),
        };
        let Some(tx) = tx else {
            return Ok(());
        };
        let (reply_tx, reply_rx) = mpsc::channel();
        tx.send(Command::Flush(reply_tx)).map_err(|_| PersistenceError::WriterStopped)?;
        // Dropping the sender lets the writer exit once the flush is answered.
        drop(tx);
        let res = match reply_rx.recv_timeout(timeout) {
            Ok(res) => res,
            Err(mpsc::RecvTimeoutError::Timeout) => return Err(PersistenceError::FlushTimeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(PersistenceError::WriterStopped),
        };
        // The writer answered and has no sender left, so it exits right away and releases its
        // handle on the database.
        let writer = match self.writer.lock() {
            Ok(mut g) => g.take(),
            Err(p) => p.into_inner().take(),
        };
        if let Some(handle) = writer {
            let _ = handle.join();
        }
        res
    }
}

fn run_writer(
    backend: Arc<dyn Backend>,
    label: String,
    rx: mpsc::Receiver<Command>,
    metrics: Arc<Metrics>,
) {
    let mut pending: BTreeMap<Vec<u8>, KvOp> = BTreeMap::new();
    while let Ok(first) = rx.recv() {
        let mut replies = Vec::new();
        let mut next = Some(first);
        // Batch everything already queued behind the first command.
        while let Some(cmd) = next.take() {
            match cmd {
                Command::Write(ops) => {
                    for op in ops {
                        pending.insert(op.key().to_vec(), op);
                    }
                }
                Command::Flush(reply) => replies.push(reply),
            }
            next = rx.try_recv().ok();
        }

        if !pending.is_empty() {
            let batch: Vec<KvOp> = std::mem::take(&mut pending).into_values().collect();
            match backend.commit(&batch) {
                Ok(()) => debug!(store = %label, ops = batch.len(), "persisted batch"),
                Err(e) => {
                    metrics.persistence_errors_total.inc();
                    if batch.len() > MAX_PENDING_KEYS {
                        error!(store = %label, ops = batch.len(), ?e, "persist keeps failing; dropping unpersisted ops");
                    } else {
                        warn!(store = %label, ops = batch.len(), ?e, "persist failed; retrying with next write");
                        pending = batch.into_iter().map(|op| (op.key().to_vec(), op)).collect();
                    }
                }
            }
        }

        if !replies.is_empty() {
            let res = if pending.is_empty() { backend.flush() } else { Err(PersistenceError::DbIo) };
            for reply in replies {
                let _ = reply.send(match &res {
                    Ok(()) => Ok(()),
                    Err(_) => Err(PersistenceError::DbIo),
                });
            }
        }
    }
    debug!(store = %label, "persistence writer stopped");
}

/// Atomic commit using sled transactions.
fn commit_atomic(db: &sled::Db, ops: &[KvOp]) -> Result<(), PersistenceError> {
    let res: Result<(), ConflictableTransactionError<PersistenceError>> = (|| {
        db.transaction(|t| {
            for op in ops.iter() {
                match op {
                    KvOp::Put { key, value } => {
                        t.insert(key.as_slice(), value.as_slice()).map_err(|_| {
                            ConflictableTransactionError::Abort(PersistenceError::DbIo)
                        })?;
                    }
                    KvOp::Del { key } => {
                        t.remove(key.as_slice()).map_err(|_| {
                            ConflictableTransactionError::Abort(PersistenceError::DbIo)
                        })?;
                    }
                }
            }
            Ok(())
        })
        .map_err(|e| match e {
            sled::transaction::TransactionError::Abort(pe) => ConflictableTransactionError::Abort(pe),
            sled::transaction::TransactionError::Storage(_) => {
                ConflictableTransactionError::Abort(PersistenceError::DbIo)
            }
        })
    })();

    match res {
        Ok(()) => Ok(()),
        Err(ConflictableTransactionError::Abort(e)) => Err(e),
        Err(ConflictableTransactionError::Conflict) => Err(PersistenceError::TxConflict),
        Err(ConflictableTransactionError::Storage(_)) => Err(PersistenceError::DbIo),
    }
}
