//! Stock inventory (§3 "Stock inventory", §6 "Inventory store").
//!
//! The core only ever sees the opaque `InventoryStore` trait — `reserve`,
//! `release`, and `apply_delta` (spec.md §1). CSV/DB ingestion is out of
//! scope; `JsonFileInventory` is this workspace's default implementation,
//! backed by a JSON seed file, matching the "relational, two tables"
//! shape described in §6: one keyed by symbol for current availability,
//! one time-keyed for scheduled deltas.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use mutualnet_core::message::LogicalDate;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Invariant I2 (§3): `available(s) >= 0` always, enforced by `u32`.
pub trait InventoryStore: Send {
    fn available(&self, symbol: &str) -> Option<u32>;

    /// Attempt to decrement `symbol`'s available quantity by `qty`.
    /// Returns `false` (no-op) if the symbol is unknown or `qty` exceeds
    /// what's available.
    fn reserve(&mut self, symbol: &str, qty: u32) -> bool;

    /// Add `qty` back to `symbol`'s available quantity (cancel path).
    fn release(&mut self, symbol: &str, qty: u32);

    /// Apply a scheduled or ad-hoc quantity delta. Only positive deltas
    /// are expected from scheduled issuance (§2.1 supplemented feature);
    /// unknown symbols are created with the delta as their initial
    /// quantity.
    fn apply_delta(&mut self, symbol: &str, delta: i64);

    /// Fire every scheduled-issuance row matching `(date, hour)` that
    /// hasn't already fired, returning the `(symbol, qty)` pairs applied.
    /// Backends with no scheduled-issuance table (or tests that don't
    /// care) get a no-op default.
    fn apply_scheduled(&mut self, date: LogicalDate, hour: u8) -> Vec<(String, u32)> {
        let _ = (date, hour);
        Vec::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledIssuance {
    pub date: LogicalDate,
    pub hour: u8,
    pub symbol: String,
    pub qty: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct InventorySeed {
    #[serde(default)]
    available: HashMap<String, u32>,
    #[serde(default)]
    scheduled: Vec<ScheduledIssuance>,
}

/// JSON-file-backed inventory. The file is read once at startup; this
/// crate does not write it back (the live quantities are process-local
/// and not persisted across restarts, matching "no persistent replication
/// of the order log" in the Non-goals).
pub struct JsonFileInventory {
    available: HashMap<String, u32>,
    scheduled: Vec<ScheduledIssuance>,
    applied: Vec<bool>,
}

impl JsonFileInventory {
    pub fn load(path: impl AsRef<Path>) -> mutualnet_core::error::Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let text = std::fs::read_to_string(&path)?;
        let seed: InventorySeed = serde_json::from_str(&text)?;
        let applied = vec![false; seed.scheduled.len()];
        info!(path = %path.display(), symbols = seed.available.len(), "loaded inventory seed");
        Ok(Self {
            available: seed.available,
            scheduled: seed.scheduled,
            applied,
        })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            available: HashMap::new(),
            scheduled: Vec::new(),
            applied: Vec::new(),
        }
    }

    pub fn seed(mut self, symbol: impl Into<String>, qty: u32) -> Self {
        self.available.insert(symbol.into(), qty);
        self
    }
}

impl InventoryStore for JsonFileInventory {
    fn available(&self, symbol: &str) -> Option<u32> {
        self.available.get(symbol).copied()
    }

    fn reserve(&mut self, symbol: &str, qty: u32) -> bool {
        match self.available.get_mut(symbol) {
            Some(available) if *available >= qty => {
                *available -= qty;
                true
            }
            _ => false,
        }
    }

    fn release(&mut self, symbol: &str, qty: u32) {
        *self.available.entry(symbol.to_string()).or_insert(0) += qty;
    }

    fn apply_delta(&mut self, symbol: &str, delta: i64) {
        let entry = self.available.entry(symbol.to_string()).or_insert(0);
        *entry = (*entry as i64 + delta).max(0) as u32;
    }

    /// Apply every scheduled-issuance row matching `(date, hour)` that
    /// hasn't already fired (§2.1, §3 "Logical time"). Called by the
    /// exchange node's message loop whenever a `TimeUpdate` arrives.
    fn apply_scheduled(&mut self, date: LogicalDate, hour: u8) -> Vec<(String, u32)> {
        let mut applied_now = Vec::new();
        for (idx, row) in self.scheduled.iter().enumerate() {
            if self.applied[idx] {
                continue;
            }
            if row.date == date && row.hour == hour && row.qty > 0 {
                *self.available.entry(row.symbol.clone()).or_insert(0) += row.qty;
                applied_now.push((row.symbol.clone(), row.qty));
                self.applied[idx] = true;
            }
        }
        applied_now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_fails_on_insufficient_stock() {
        let mut inv = JsonFileInventory::empty().seed("AERO", 50);
        assert!(!inv.reserve("AERO", 100));
        assert_eq!(inv.available("AERO"), Some(50));
    }

    #[test]
    fn reserve_fails_on_unknown_symbol() {
        let mut inv = JsonFileInventory::empty();
        assert!(!inv.reserve("NOPE", 1));
    }

    #[test]
    fn reserve_then_release_restores_quantity() {
        let mut inv = JsonFileInventory::empty().seed("AAPL", 50);
        assert!(inv.reserve("AAPL", 10));
        assert_eq!(inv.available("AAPL"), Some(40));
        inv.release("AAPL", 10);
        assert_eq!(inv.available("AAPL"), Some(50));
    }

    #[test]
    fn scheduled_issuance_fires_once_on_matching_tick() {
        let mut inv = JsonFileInventory::empty().seed("AAPL", 10);
        inv.scheduled.push(ScheduledIssuance {
            date: LogicalDate::new(2026, 7, 28),
            hour: 9,
            symbol: "AAPL".to_string(),
            qty: 5,
        });
        inv.applied.push(false);
        let applied = inv.apply_scheduled(LogicalDate::new(2026, 7, 28), 9);
        assert_eq!(applied, vec![("AAPL".to_string(), 5)]);
        assert_eq!(inv.available("AAPL"), Some(15));
        // firing again for the same tick is a no-op.
        let applied_again = inv.apply_scheduled(LogicalDate::new(2026, 7, 28), 9);
        assert!(applied_again.is_empty());
    }
}
