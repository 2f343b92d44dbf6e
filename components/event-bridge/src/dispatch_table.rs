// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Call id → method name resolution.
//!
//! Event sources fire notifications by numeric id. The owning collaborator
//! resolves the event interface's names to ids once, and the bridge keeps the
//! pairs in a [`DispatchTable`] that never changes afterwards, so lookups need
//! no synchronisation.

use drasi_dispatch_abi::DispId;

use crate::error::{BridgeError, Result};

/// One `(name, id)` pair of the event interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEntry {
    pub name: String,
    pub dispid: DispId,
}

/// Fixed-size, immutable table of the methods a bridge forwards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatchTable {
    entries: Box<[DispatchEntry]>,
}

impl DispatchTable {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, DispId)>,
        S: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(name, dispid)| DispatchEntry {
                name: name.into(),
                dispid,
            })
            .collect();
        Self { entries }
    }

    /// Build from the parallel name/id lists an interface lookup produces.
    pub fn from_parallel<S: Into<String>>(names: Vec<S>, dispids: &[DispId]) -> Result<Self> {
        if names.len() != dispids.len() {
            return Err(BridgeError::invalid_config(format!(
                "dispatch table has {} names but {} ids",
                names.len(),
                dispids.len()
            )));
        }
        Ok(Self::from_entries(
            names.into_iter().zip(dispids.iter().copied()),
        ))
    }

    /// Name of the first entry whose id is `dispid`.
    ///
    /// A linear scan: tables hold a few dozen entries at most.
    pub fn resolve_name(&self, dispid: DispId) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.dispid == dispid)
            .map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DispatchEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_and_unknown_ids() {
        let table = DispatchTable::from_entries([("Click", 1), ("Close", 2)]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve_name(1), Some("Click"));
        assert_eq!(table.resolve_name(2), Some("Close"));
        assert_eq!(table.resolve_name(99), None);
    }

    #[test]
    fn test_first_match_wins_on_duplicate_ids() {
        let table = DispatchTable::from_entries([("BeforeClose", 7), ("Close", 7)]);
        assert_eq!(table.resolve_name(7), Some("BeforeClose"));
    }

    #[test]
    fn test_empty_table_resolves_nothing() {
        let table = DispatchTable::default();
        assert!(table.is_empty());
        assert_eq!(table.resolve_name(0), None);
    }

    #[test]
    fn test_from_parallel() {
        let table =
            DispatchTable::from_parallel(vec!["SheetChange", "SheetActivate"], &[0x616, 0x619])
                .unwrap();
        let names: Vec<_> = table.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["SheetChange", "SheetActivate"]);
        assert_eq!(table.resolve_name(0x619), Some("SheetActivate"));
    }

    #[test]
    fn test_from_parallel_length_mismatch() {
        let err = DispatchTable::from_parallel(vec!["Click"], &[1, 2]).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidConfig { .. }));
    }
}
