//! Ordered snapshot history of one view
//!
//! A `Timeline` always holds between one and [`MAX_SNAPSHOTS`] snapshots,
//! `snapshot_order` is always a permutation of the stored ids, and the
//! current pointer always resolves. Every mutating operation either keeps
//! those three facts or returns an error without touching anything.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::TimelineError;
use crate::model::{Snapshot, SnapshotContent, SnapshotId};

/// Upper bound on snapshots per view.
pub const MAX_SNAPSHOTS: usize = 21;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    #[serde(with = "snapshot_list")]
    snapshots: BTreeMap<SnapshotId, Snapshot>,
    current_snapshot_id: SnapshotId,
    snapshot_order: Vec<SnapshotId>,
}

/// Listing entry for a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub label: String,
    pub description: String,
    pub timestamp: Option<String>,
    pub created: DateTime<Utc>,
    pub node_count: usize,
    pub edge_count: usize,
    pub is_current: bool,
}

impl Timeline {
    pub fn new(initial: Snapshot) -> Self {
        let id = initial.id.clone();
        let mut snapshots = BTreeMap::new();
        snapshots.insert(id.clone(), initial);
        Timeline {
            snapshots,
            current_snapshot_id: id.clone(),
            snapshot_order: vec![id],
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.snapshots.len() >= MAX_SNAPSHOTS
    }

    pub fn current_id(&self) -> &SnapshotId {
        &self.current_snapshot_id
    }

    pub fn current(&self) -> Result<&Snapshot, TimelineError> {
        self.snapshots
            .get(&self.current_snapshot_id)
            .ok_or_else(|| TimelineError::NotFound(self.current_snapshot_id.clone()))
    }

    fn current_mut(&mut self) -> Result<&mut Snapshot, TimelineError> {
        self.snapshots
            .get_mut(&self.current_snapshot_id)
            .ok_or_else(|| TimelineError::NotFound(self.current_snapshot_id.clone()))
    }

    pub fn get(&self, id: &SnapshotId) -> Option<&Snapshot> {
        self.snapshots.get(id)
    }

    pub fn order(&self) -> &[SnapshotId] {
        &self.snapshot_order
    }

    /// Snapshots in navigation order.
    pub fn ordered(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshot_order
            .iter()
            .filter_map(move |id| self.snapshots.get(id))
    }

    pub fn summaries(&self) -> Vec<SnapshotSummary> {
        self.ordered()
            .map(|s| SnapshotSummary {
                id: s.id.clone(),
                label: s.label.clone(),
                description: s.description.clone(),
                timestamp: s.timestamp.clone(),
                created: s.created,
                node_count: s.layout.len(),
                edge_count: s.edges.len(),
                is_current: s.id == self.current_snapshot_id,
            })
            .collect()
    }

    /// Fails with `StaleSnapshot` unless `id` is the current snapshot.
    pub fn ensure_current(&self, id: &SnapshotId) -> Result<(), TimelineError> {
        if id == &self.current_snapshot_id {
            Ok(())
        } else {
            Err(TimelineError::StaleSnapshot {
                canvas: id.clone(),
                current: self.current_snapshot_id.clone(),
            })
        }
    }

    /// Write in-flight canvas content into the current snapshot.
    pub fn capture(&mut self, content: SnapshotContent) -> Result<(), TimelineError> {
        self.current_mut()?.apply(content);
        Ok(())
    }

    /// Copy the current snapshot into a new one and make it current.
    pub fn create_snapshot(
        &mut self,
        label: &str,
        description: Option<&str>,
        timestamp: Option<&str>,
    ) -> Result<&Snapshot, TimelineError> {
        if self.is_full() {
            return Err(TimelineError::LimitExceeded {
                limit: MAX_SNAPSHOTS,
            });
        }
        let label = label.trim();
        if label.is_empty() {
            return Err(TimelineError::EmptyInput { field: "label" });
        }

        let mut snapshot = Snapshot::new(label);
        snapshot.description = description.unwrap_or_default().to_string();
        snapshot.timestamp = timestamp.map(str::to_string);
        snapshot.apply(self.current()?.content());

        let id = snapshot.id.clone();
        debug!("Created snapshot {} ({}) from {}", id, label, self.current_snapshot_id);
        self.snapshots.insert(id.clone(), snapshot);
        self.snapshot_order.push(id.clone());
        self.current_snapshot_id = id.clone();
        self.current()
    }

    /// Save `outgoing` into the current snapshot, then move to `id`.
    ///
    /// Returns an owned copy of the target's content; the stored history
    /// is never reachable through it.
    pub fn switch_snapshot(
        &mut self,
        id: &SnapshotId,
        outgoing: SnapshotContent,
    ) -> Result<SnapshotContent, TimelineError> {
        if !self.snapshots.contains_key(id) {
            return Err(TimelineError::NotFound(id.clone()));
        }
        self.capture(outgoing)?;
        debug!("Switching snapshot {} -> {}", self.current_snapshot_id, id);
        self.current_snapshot_id = id.clone();
        Ok(self.current()?.content())
    }

    /// Remove one snapshot. If it was current, the previous entry in the
    /// order becomes current, or the next one when it was first.
    pub fn delete_snapshot(&mut self, id: &SnapshotId) -> Result<Snapshot, TimelineError> {
        if self.snapshots.len() <= 1 {
            return Err(TimelineError::LastItemProtected);
        }
        let position = self
            .snapshot_order
            .iter()
            .position(|s| s == id)
            .ok_or_else(|| TimelineError::NotFound(id.clone()))?;

        if id == &self.current_snapshot_id {
            let replacement = if position > 0 {
                self.snapshot_order[position - 1].clone()
            } else {
                self.snapshot_order[position + 1].clone()
            };
            self.current_snapshot_id = replacement;
        }

        self.snapshot_order.remove(position);
        self.snapshots
            .remove(id)
            .ok_or_else(|| TimelineError::NotFound(id.clone()))
    }

    pub fn rename_snapshot(&mut self, id: &SnapshotId, label: &str) -> Result<(), TimelineError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(TimelineError::EmptyInput { field: "label" });
        }
        let snapshot = self
            .snapshots
            .get_mut(id)
            .ok_or_else(|| TimelineError::NotFound(id.clone()))?;
        snapshot.label = label.to_string();
        Ok(())
    }

    /// Replace the navigation order. `new_order` must name every snapshot
    /// exactly once.
    pub fn reorder_snapshots(&mut self, new_order: Vec<SnapshotId>) -> Result<(), TimelineError> {
        let proposed: HashSet<&SnapshotId> = new_order.iter().collect();
        let same_members = proposed.len() == new_order.len()
            && new_order.len() == self.snapshots.len()
            && proposed.iter().all(|id| self.snapshots.contains_key(*id));
        if !same_members {
            return Err(TimelineError::OrderMismatch {
                expected: self.snapshots.len(),
                found: new_order.len(),
            });
        }
        self.snapshot_order = new_order;
        Ok(())
    }

    pub fn next(&self, id: &SnapshotId) -> Option<&SnapshotId> {
        match self.snapshot_order.iter().position(|s| s == id) {
            Some(i) => self.snapshot_order.get(i + 1),
            None => {
                warn!("next: snapshot {} is not in the timeline", id);
                None
            }
        }
    }

    pub fn previous(&self, id: &SnapshotId) -> Option<&SnapshotId> {
        match self.snapshot_order.iter().position(|s| s == id) {
            Some(0) => None,
            Some(i) => self.snapshot_order.get(i - 1),
            None => {
                warn!("previous: snapshot {} is not in the timeline", id);
                None
            }
        }
    }

    /// Apply `f` to every snapshot; used by pool-wide sweeps.
    pub fn for_each_snapshot_mut(&mut self, mut f: impl FnMut(&mut Snapshot)) {
        for snapshot in self.snapshots.values_mut() {
            f(snapshot);
        }
    }

    /// Restore the invariants of a timeline read from disk.
    ///
    /// Returns a description of each repair made. A timeline with no
    /// snapshots, or with more than the cap, cannot be repaired.
    pub fn repair(&mut self) -> Result<Vec<String>, TimelineError> {
        if self.snapshots.is_empty() {
            return Err(TimelineError::Empty);
        }
        if self.snapshots.len() > MAX_SNAPSHOTS {
            return Err(TimelineError::LimitExceeded {
                limit: MAX_SNAPSHOTS,
            });
        }

        let mut repairs = Vec::new();
        let mut seen = HashSet::new();
        let snapshots = &self.snapshots;
        self.snapshot_order.retain(|id| {
            let keep = snapshots.contains_key(id) && seen.insert(id.clone());
            if !keep {
                repairs.push(format!("dropped order entry {}", id));
            }
            keep
        });
        for id in self.snapshots.keys() {
            if !seen.contains(id) {
                repairs.push(format!("appended missing order entry {}", id));
                self.snapshot_order.push(id.clone());
            }
        }
        if !self.snapshots.contains_key(&self.current_snapshot_id) {
            let first = self.snapshot_order[0].clone();
            repairs.push(format!(
                "current snapshot {} missing, using {}",
                self.current_snapshot_id, first
            ));
            self.current_snapshot_id = first;
        }

        for repair in &repairs {
            warn!("Timeline repair: {}", repair);
        }
        Ok(repairs)
    }
}

/// On disk the snapshots are a list; in memory they are keyed by id.
mod snapshot_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use crate::model::{Snapshot, SnapshotId};

    pub fn serialize<S: Serializer>(
        snapshots: &BTreeMap<SnapshotId, Snapshot>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(snapshots.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<SnapshotId, Snapshot>, D::Error> {
        let list = Vec::<Snapshot>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|s| (s.id.clone(), s)).collect())
    }
}
