//! paramxml storage
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       DOCUMENT STORE                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  register(label) ──┐                  ┌── parameters table   │
//! │                    ▼                  │   (label, ident)     │
//! │             ┌─────────────┐    ┌──────┴──────┐               │
//! │             │  WAL (tx)   │───►│  in-memory  │               │
//! │             └─────────────┘    │   tables    │               │
//! │                    ▲           └──────┬──────┘               │
//! │  save_document ────┘                  └── documents table    │
//! │                                           (file, title, xml) │
//! │                                                              │
//! │  checkpoint: tables ──► snapshot.bin, WAL truncated          │
//! │  store.meta: label matching mode, fixed at creation          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`DocumentStore`] is both the durable [`ParameterRegistry`] and the
//! relational-style document sink. [`XmlFileSink`] writes standalone `.xml`
//! files. Both implement [`DocumentSink`].

pub mod sinks;
pub mod wal;


pub use sinks::{DocumentSink, Persisted, SinkError, XmlFileSink};

use chrono::{DateTime, Utc};
use paramxml_core::{
    registry::Assignment, Document, LabelMatching, ParameterIdentifier, ParameterLabel,
    ParameterMapping, ParameterRegistry, RegistryError, RegistryTable,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use wal::{WalEntry, WriteAheadLog};

const WAL_FILE: &str = "paramxml.wal";
const SNAPSHOT_FILE: &str = "snapshot.bin";
const META_FILE: &str = "store.meta";

// ============================================================================
// Types
// ============================================================================

/// A row of the documents table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: u64,
    pub original_filename: String,
    pub title: String,
    pub parameters: Vec<ParameterIdentifier>,
    pub xml: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("store encoding error: {0}")]
    Codec(#[from] bincode::Error),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("store was created with label matching {found:?}, opened with {expected:?}")]
    MatchingMismatch {
        found: LabelMatching,
        expected: LabelMatching,
    },
}

/// Configuration for the document store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the WAL and snapshot
    pub dir: PathBuf,
    /// How labels are compared; fixed for the lifetime of a store
    pub label_matching: LabelMatching,
    /// fsync after every WAL append
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./paramxml-db"),
            label_matching: LabelMatching::Exact,
            sync_writes: true,
        }
    }
}

/// Written once when the store is created.
#[derive(Debug, Serialize, Deserialize)]
struct StoreMeta {
    label_matching: LabelMatching,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    label_matching: LabelMatching,
    /// Every transaction up to and including this id is in the snapshot.
    last_tx_id: u64,
    parameters: Vec<ParameterMapping>,
    documents: Vec<DocumentRecord>,
}

struct Tables {
    parameters: RegistryTable,
    documents: Vec<DocumentRecord>,
}

impl Tables {
    fn apply(&mut self, entry: WalEntry) -> Result<(), StoreError> {
        match entry {
            WalEntry::AddParameter { mapping, .. } => self.parameters.insert(mapping)?,
            WalEntry::AddDocument { record, .. } => self.documents.push(record),
            WalEntry::BeginTx { .. } | WalEntry::CommitTx { .. } => {}
        }
        Ok(())
    }
}

/// Write `bytes` to `path` via a synced temp file and rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)
}

// ============================================================================
// Document store
// ============================================================================

pub struct DocumentStore {
    config: StoreConfig,
    wal: WriteAheadLog,
    tables: Mutex<Tables>,
    next_tx_id: AtomicU64,
    next_document_id: AtomicU64,
}

impl DocumentStore {
    /// Open (or create) a store, recovering snapshot + committed WAL entries.
    ///
    /// The label matching mode is fixed when the store is created; opening it
    /// with another mode fails before anything is replayed.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.dir)?;
        Self::check_matching(&config)?;

        let mut tables = Tables {
            parameters: RegistryTable::new(config.label_matching),
            documents: Vec::new(),
        };

        let mut snapshot_tx = 0;
        let snapshot_path = config.dir.join(SNAPSHOT_FILE);
        if snapshot_path.exists() {
            let bytes = std::fs::read(&snapshot_path)?;
            let snapshot: Snapshot = bincode::deserialize(&bytes)?;
            if snapshot.label_matching != config.label_matching {
                return Err(StoreError::MatchingMismatch {
                    found: snapshot.label_matching,
                    expected: config.label_matching,
                });
            }
            for mapping in snapshot.parameters {
                tables.parameters.insert(mapping)?;
            }
            tables.documents = snapshot.documents;
            snapshot_tx = snapshot.last_tx_id;
        }

        let wal = WriteAheadLog::open(&config.dir.join(WAL_FILE), config.sync_writes)?;
        let max_tx = Self::recover(&wal, &mut tables, snapshot_tx)?;

        let next_document_id = tables.documents.iter().map(|d| d.id).max().map_or(1, |m| m + 1);
        tracing::debug!(
            dir = %config.dir.display(),
            parameters = tables.parameters.len(),
            documents = tables.documents.len(),
            "opened document store"
        );

        Ok(Self {
            config,
            wal,
            tables: Mutex::new(tables),
            next_tx_id: AtomicU64::new(max_tx.max(snapshot_tx) + 1),
            next_document_id: AtomicU64::new(next_document_id),
        })
    }

    /// Compare against `store.meta`, writing it on first open.
    fn check_matching(config: &StoreConfig) -> Result<(), StoreError> {
        let path = config.dir.join(META_FILE);
        if path.exists() {
            let meta: StoreMeta = bincode::deserialize(&std::fs::read(&path)?)?;
            if meta.label_matching != config.label_matching {
                return Err(StoreError::MatchingMismatch {
                    found: meta.label_matching,
                    expected: config.label_matching,
                });
            }
            return Ok(());
        }
        let meta = StoreMeta {
            label_matching: config.label_matching,
        };
        write_atomic(&path, &bincode::serialize(&meta)?)?;
        Ok(())
    }

    /// Replay committed transactions newer than `snapshot_tx`, in commit
    /// order. Returns the highest tx id seen.
    fn recover(
        wal: &WriteAheadLog,
        tables: &mut Tables,
        snapshot_tx: u64,
    ) -> Result<u64, StoreError> {
        let mut pending: HashMap<u64, Vec<WalEntry>> = HashMap::new();
        let mut committed: Vec<WalEntry> = Vec::new();
        let mut max_tx = 0;

        wal.replay(|entry| {
            let tx_id = entry.tx_id();
            max_tx = max_tx.max(tx_id);
            if tx_id <= snapshot_tx {
                return Ok(());
            }
            match entry {
                WalEntry::BeginTx { .. } => {
                    pending.insert(tx_id, Vec::new());
                }
                WalEntry::AddParameter { .. } | WalEntry::AddDocument { .. } => {
                    pending.entry(tx_id).or_default().push(entry);
                }
                WalEntry::CommitTx { .. } => {
                    committed.extend(pending.remove(&tx_id).unwrap_or_default());
                }
            }
            Ok(())
        })?;

        if !pending.is_empty() {
            tracing::warn!(
                transactions = pending.len(),
                "discarding uncommitted wal transactions"
            );
        }
        for write in committed {
            tables.apply(write)?;
        }
        Ok(max_tx)
    }

    /// Write `payload` as one committed transaction.
    fn commit(&self, payload: impl FnOnce(u64) -> WalEntry) -> io::Result<()> {
        let tx_id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
        let entries = [
            WalEntry::BeginTx {
                tx_id,
                timestamp: Utc::now().timestamp(),
            },
            payload(tx_id),
            WalEntry::CommitTx { tx_id },
        ];
        self.wal.append(&entries)?;
        Ok(())
    }

    /// Insert a row into the documents table.
    pub fn save_document(
        &self,
        original_filename: &str,
        document: &Document,
        xml: &str,
    ) -> Result<DocumentRecord, StoreError> {
        let mut tables = self.tables.lock();
        let record = DocumentRecord {
            id: self.next_document_id.fetch_add(1, Ordering::SeqCst),
            original_filename: original_filename.to_string(),
            title: document.title.clone(),
            parameters: document.identifiers().cloned().collect(),
            xml: xml.to_string(),
            created_at: Utc::now(),
        };
        self.commit(|tx_id| WalEntry::AddDocument {
            tx_id,
            record: record.clone(),
        })?;
        tables.documents.push(record.clone());
        Ok(record)
    }

    pub fn documents(&self) -> Vec<DocumentRecord> {
        self.tables.lock().documents.clone()
    }

    pub fn parameter_count(&self) -> usize {
        self.tables.lock().parameters.len()
    }

    /// Persist all tables to a snapshot and truncate the WAL.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        let tables = self.tables.lock();
        // Commits happen under the tables lock, so every id below the
        // counter is already applied.
        let snapshot = Snapshot {
            label_matching: self.config.label_matching,
            last_tx_id: self.next_tx_id.load(Ordering::SeqCst) - 1,
            parameters: tables.parameters.rows().to_vec(),
            documents: tables.documents.clone(),
        };
        let bytes = bincode::serialize(&snapshot)?;

        write_atomic(&self.config.dir.join(SNAPSHOT_FILE), &bytes)?;
        // A crash before the truncate is harmless: recovery skips WAL
        // transactions the snapshot already holds.
        self.wal.truncate()?;

        tracing::info!(
            parameters = snapshot.parameters.len(),
            documents = snapshot.documents.len(),
            "checkpointed document store"
        );
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }
}

impl ParameterRegistry for DocumentStore {
    fn lookup(&self, label: &ParameterLabel) -> Result<Option<ParameterIdentifier>, RegistryError> {
        Ok(self.tables.lock().parameters.get(label).cloned())
    }

    fn register(
        &self,
        label: &ParameterLabel,
        proposed: ParameterIdentifier,
    ) -> Result<ParameterIdentifier, RegistryError> {
        // Held across the WAL write: check-and-insert is one critical section.
        let mut tables = self.tables.lock();
        let mapping = match tables.parameters.assign(label, proposed) {
            Assignment::Existing(identifier) => return Ok(identifier),
            Assignment::New(mapping) => mapping,
        };

        self.commit(|tx_id| WalEntry::AddParameter {
            tx_id,
            mapping: mapping.clone(),
        })
        .map_err(|e| RegistryError::Persistence(e.to_string()))?;

        let identifier = mapping.identifier.clone();
        tables.parameters.insert(mapping)?;
        tracing::debug!(label = %label, identifier = %identifier, "registered parameter");
        Ok(identifier)
    }

    fn mappings(&self) -> Result<Vec<ParameterMapping>, RegistryError> {
        Ok(self.tables.lock().parameters.rows().to_vec())
    }
}
