//! Interned symbols for entities and relations.
//!
//! Every entity and relation label in the knowledge base is mapped once to a
//! [`SymbolId`]. The [`SymbolTable`] keeps the bidirectional label ↔ ID
//! mapping in two `DashMap`s so fact files can be interned from several
//! loader threads at the same time.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

use crate::error::{KbError, KbResult};

/// Unique, niche-optimized identifier for a symbol.
///
/// Uses `NonZeroU64` so that `Option<SymbolId>` is the same size as `SymbolId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SymbolId(NonZeroU64);

impl SymbolId {
    /// Create a `SymbolId` from a raw `u64`.
    ///
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(SymbolId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sym:{}", self.0)
    }
}

/// Thread-safe symbol ID allocator.
///
/// Produces monotonically increasing IDs starting from 1.
#[derive(Debug)]
pub struct AtomicSymbolAllocator {
    next: AtomicU64,
}

impl AtomicSymbolAllocator {
    /// Create a new allocator that starts from ID 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next symbol ID.
    pub fn next_id(&self) -> KbResult<SymbolId> {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        SymbolId::new(raw).ok_or(KbError::SymbolsExhausted)
    }
}

impl Default for AtomicSymbolAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Bidirectional label ↔ ID table.
///
/// Labels are stored verbatim: knowledge-graph identifiers such as
/// `<isCitizenOf>` are case sensitive.
#[derive(Debug, Default)]
pub struct SymbolTable {
    allocator: AtomicSymbolAllocator,
    by_label: DashMap<String, SymbolId>,
    by_id: DashMap<SymbolId, String>,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the ID for `label`, allocating one on first sight.
    ///
    /// Concurrent calls for the same label always observe the same ID.
    pub fn intern(&self, label: &str) -> KbResult<SymbolId> {
        if let Some(id) = self.by_label.get(label) {
            return Ok(*id.value());
        }
        match self.by_label.entry(label.to_string()) {
            Entry::Occupied(entry) => Ok(*entry.get()),
            Entry::Vacant(entry) => {
                let id = self.allocator.next_id()?;
                self.by_id.insert(id, label.to_string());
                entry.insert(id);
                Ok(id)
            }
        }
    }

    /// Look up the ID of an already interned label.
    pub fn lookup(&self, label: &str) -> Option<SymbolId> {
        self.by_label.get(label).map(|r| *r.value())
    }

    /// Label of `id`, if it was interned here.
    pub fn label(&self, id: SymbolId) -> Option<String> {
        self.by_id.get(&id).map(|r| r.value().clone())
    }

    /// Resolve an ID to a human-readable string, falling back to `sym:{id}`.
    pub fn resolve_label(&self, id: SymbolId) -> String {
        self.label(id).unwrap_or_else(|| id.to_string())
    }

    /// Number of interned symbols.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
