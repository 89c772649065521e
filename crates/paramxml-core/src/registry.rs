//! Parameter registry: the durable label -> identifier mapping.
//!
//! ```text
//!   lookup(label)            register(label, proposed)
//!        │                            │
//!        ▼                            ▼
//!  ┌───────────────┐   lock   ┌──────────────────┐
//!  │ RegistryTable │◄─────────│ check label       │
//!  │  by_label     │          │ pick free suffix  │
//!  │  by_ident     │          │ persist + insert  │
//!  │  rows (order) │          └──────────────────┘
//!  └───────────────┘
//! ```
//!
//! Every backend keeps a [`RegistryTable`] behind a mutex and holds that lock
//! across the whole check-and-insert, so two concurrent registrations can never
//! both observe an identifier as free.

use crate::ident::{ParameterIdentifier, ParameterLabel};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One persisted `(label, identifier)` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterMapping {
    pub label: ParameterLabel,
    pub identifier: ParameterIdentifier,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Storage-level race on the uniqueness constraint.
    #[error("registry conflict: identifier `{identifier}` is already taken (label {label:?})")]
    Conflict {
        label: String,
        identifier: ParameterIdentifier,
    },
    #[error("registry persistence failure: {0}")]
    Persistence(String),
}

/// How labels are compared when looking up an existing mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelMatching {
    /// Byte-for-byte equality.
    #[default]
    Exact,
    /// Trimmed, Unicode lower-cased equality.
    CaseInsensitive,
}

impl LabelMatching {
    pub fn key(self, label: &ParameterLabel) -> String {
        match self {
            LabelMatching::Exact => label.as_str().to_string(),
            LabelMatching::CaseInsensitive => label.as_str().trim().to_lowercase(),
        }
    }
}

/// The registry contract shared by every backend.
pub trait ParameterRegistry: Send + Sync {
    fn lookup(&self, label: &ParameterLabel) -> Result<Option<ParameterIdentifier>, RegistryError>;

    /// Insert-or-fetch. An existing label keeps its identifier and `proposed`
    /// is ignored; a new label gets `proposed` or its first free `_N` suffix.
    fn register(
        &self,
        label: &ParameterLabel,
        proposed: ParameterIdentifier,
    ) -> Result<ParameterIdentifier, RegistryError>;

    /// All mappings in registration order.
    fn mappings(&self) -> Result<Vec<ParameterMapping>, RegistryError>;
}

// ============================================================================
// Table
// ============================================================================

/// Outcome of [`RegistryTable::assign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Existing(ParameterIdentifier),
    /// Not yet inserted; the backend persists it and then calls [`RegistryTable::insert`].
    New(ParameterMapping),
}

/// In-memory index over registry rows; the building block for backends.
#[derive(Debug, Clone, Default)]
pub struct RegistryTable {
    matching: LabelMatching,
    by_label: HashMap<String, usize>,
    by_ident: HashMap<ParameterIdentifier, usize>,
    rows: Vec<ParameterMapping>,
}

impl RegistryTable {
    pub fn new(matching: LabelMatching) -> Self {
        Self {
            matching,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ParameterMapping] {
        &self.rows
    }

    pub fn get(&self, label: &ParameterLabel) -> Option<&ParameterIdentifier> {
        let idx = self.by_label.get(&self.matching.key(label))?;
        Some(&self.rows[*idx].identifier)
    }

    pub fn is_taken(&self, identifier: &ParameterIdentifier) -> bool {
        self.by_ident.contains_key(identifier)
    }

    /// Decide what `register(label, proposed)` would return, without mutating.
    pub fn assign(&self, label: &ParameterLabel, proposed: ParameterIdentifier) -> Assignment {
        if let Some(existing) = self.get(label) {
            return Assignment::Existing(existing.clone());
        }

        let mut identifier = proposed.clone();
        let mut n = 2;
        while self.is_taken(&identifier) {
            identifier = proposed.with_suffix(n);
            n += 1;
        }

        Assignment::New(ParameterMapping {
            label: label.clone(),
            identifier,
            created_at: Utc::now(),
        })
    }

    /// Add a row. Rows violating either uniqueness constraint are rejected.
    pub fn insert(&mut self, mapping: ParameterMapping) -> Result<(), RegistryError> {
        if let Some(existing) = self.get(&mapping.label) {
            if *existing == mapping.identifier {
                return Ok(());
            }
            return Err(RegistryError::Conflict {
                label: mapping.label.as_str().to_string(),
                identifier: mapping.identifier,
            });
        }
        if self.is_taken(&mapping.identifier) {
            return Err(RegistryError::Conflict {
                label: mapping.label.as_str().to_string(),
                identifier: mapping.identifier,
            });
        }

        let idx = self.rows.len();
        self.by_label.insert(self.matching.key(&mapping.label), idx);
        self.by_ident.insert(mapping.identifier.clone(), idx);
        self.rows.push(mapping);
        Ok(())
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Registry that lives for the duration of the process. Used with `--no-db`
/// and in tests.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    table: Mutex<RegistryTable>,
}

impl MemoryRegistry {
    pub fn new(matching: LabelMatching) -> Self {
        Self {
            table: Mutex::new(RegistryTable::new(matching)),
        }
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

impl ParameterRegistry for MemoryRegistry {
    fn lookup(&self, label: &ParameterLabel) -> Result<Option<ParameterIdentifier>, RegistryError> {
        Ok(self.table.lock().get(label).cloned())
    }

    fn register(
        &self,
        label: &ParameterLabel,
        proposed: ParameterIdentifier,
    ) -> Result<ParameterIdentifier, RegistryError> {
        let mut table = self.table.lock();
        match table.assign(label, proposed) {
            Assignment::Existing(identifier) => Ok(identifier),
            Assignment::New(mapping) => {
                let identifier = mapping.identifier.clone();
                table.insert(mapping)?;
                tracing::debug!(label = %label, identifier = %identifier, "registered parameter");
                Ok(identifier)
            }
        }
    }

    fn mappings(&self) -> Result<Vec<ParameterMapping>, RegistryError> {
        Ok(self.table.lock().rows().to_vec())
    }
}
