//! Valve store: the pool of physical sample valves and their status machine.
//!
//! ```text
//!                claim                 mark_sampled
//!  AVAILABLE ───────────▶ OPERATING ────────────────▶ SAMPLED
//!      ▲                      │
//!      └──────────────────────┘
//!        set_free_if_not_yet_sampled
//!
//!  UNAVAILABLE: administrative only, never entered or left automatically
//! ```
//!
//! Mutations mark the valve dirty; [`ValveStore::persist_dirty`] writes
//! the changed valves back so a power loss never forgets a claim.

use std::collections::BTreeSet;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::StoragePort;
use crate::error::Result;
use crate::pins::MAX_VALVES;

/// Valve identity; equals the valve's output offset past the first register.
pub type ValveId = u8;

/// Maximum length of a valve's group label (bytes).
pub const GROUP_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValveStatus {
    /// Not fitted or taken out of service by an operator.
    Unavailable,
    /// Empty and free to be claimed by a task.
    Available,
    /// Claimed by the running task.
    Operating,
    /// Holds a completed sample.
    Sampled,
}

impl ValveStatus {
    /// Counted towards [`ValveStore::in_use_count`].
    pub fn is_in_use(self) -> bool {
        !matches!(self, Self::Unavailable | Self::Available)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ValveRecord")]
pub struct Valve {
    pub id: ValveId,
    pub status: ValveStatus,
    pub group: heapless::String<GROUP_LENGTH>,
}

/// Wire shape accepted on load; the group may be longer than the slot.
#[derive(Deserialize)]
struct ValveRecord {
    id: ValveId,
    status: ValveStatus,
    #[serde(default)]
    group: String,
}

impl From<ValveRecord> for Valve {
    fn from(r: ValveRecord) -> Self {
        let mut valve = Valve::new(r.id, r.status);
        valve.set_group(&r.group);
        valve
    }
}

impl Valve {
    pub fn new(id: ValveId, status: ValveStatus) -> Self {
        Self {
            id,
            status,
            group: heapless::String::new(),
        }
    }

    /// Set the group label, truncating at a char boundary if it is too long.
    pub fn set_group(&mut self, group: &str) {
        self.group.clear();
        for c in group.chars() {
            if self.group.push(c).is_err() {
                warn!(
                    "Valve {}: group name exceeds {} bytes and was truncated",
                    self.id, GROUP_LENGTH
                );
                break;
            }
        }
    }
}

/// All valves, indexed by id.  Empty slots are unfitted valves.
pub struct ValveStore {
    slots: Vec<Option<Valve>>,
    dirty: BTreeSet<ValveId>,
}

impl Default for ValveStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ValveStore {
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_VALVES],
            dirty: BTreeSet::new(),
        }
    }

    /// Build a store from in-memory valves (later duplicates win).
    pub fn from_valves(valves: impl IntoIterator<Item = Valve>) -> Self {
        let mut store = Self::new();
        for valve in valves {
            store.insert(valve);
        }
        store
    }

    /// Load every `*.json` valve file in `folder`.  Unreadable files are
    /// skipped with a warning; a listing failure is an error.
    pub fn load_from_directory(storage: &dyn StoragePort, folder: &str) -> Result<Self> {
        let mut store = Self::new();
        for name in storage.list(folder)? {
            if !name.ends_with(".json") {
                continue;
            }
            let path = format!("{folder}/{name}");
            let decoded = storage
                .read(&path)
                .map_err(crate::error::Error::from)
                .and_then(|bytes| serde_json::from_slice::<Valve>(&bytes).map_err(Into::into));
            match decoded {
                Ok(valve) => {
                    store.insert(valve);
                }
                Err(e) => warn!("Valve file {} skipped: {}", path, e),
            }
        }
        info!(
            "ValveStore: loaded {} valves ({} in use) from '{}'",
            store.iter().count(),
            store.in_use_count(),
            folder
        );
        Ok(store)
    }

    fn insert(&mut self, valve: Valve) -> bool {
        let idx = valve.id as usize;
        if idx >= self.slots.len() {
            warn!("Valve {} is outside the manifold ({} valves), ignored", valve.id, MAX_VALVES);
            return false;
        }
        self.slots[idx] = Some(valve);
        true
    }

    pub fn get(&self, id: ValveId) -> Option<&Valve> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    pub fn status(&self, id: ValveId) -> Option<ValveStatus> {
        self.get(id).map(|v| v.status)
    }

    /// Administrative status write.  Automatic paths use [`claim`],
    /// [`mark_sampled`] and [`set_free_if_not_yet_sampled`] instead.
    ///
    /// [`claim`]: Self::claim
    /// [`mark_sampled`]: Self::mark_sampled
    /// [`set_free_if_not_yet_sampled`]: Self::set_free_if_not_yet_sampled
    pub fn set_status(&mut self, id: ValveId, status: ValveStatus) -> bool {
        let Some(valve) = self.slots.get_mut(id as usize).and_then(Option::as_mut) else {
            warn!("Valve {}: no such valve", id);
            return false;
        };
        if valve.status != status {
            info!("Valve {}: {:?} -> {:?}", id, valve.status, status);
            valve.status = status;
            self.dirty.insert(id);
        }
        true
    }

    /// `available → operating`.  Returns `false` and leaves the valve
    /// alone from any other status.
    pub fn claim(&mut self, id: ValveId) -> bool {
        match self.status(id) {
            Some(ValveStatus::Available) => self.set_status(id, ValveStatus::Operating),
            other => {
                warn!("Valve {}: cannot claim from {:?}", id, other);
                false
            }
        }
    }

    /// `operating → sampled`.
    pub fn mark_sampled(&mut self, id: ValveId) -> bool {
        match self.status(id) {
            Some(ValveStatus::Operating) => self.set_status(id, ValveStatus::Sampled),
            other => {
                warn!("Valve {}: cannot mark sampled from {:?}", id, other);
                false
            }
        }
    }

    /// `operating | available → available`.  Never regresses a sampled
    /// valve and never touches an unavailable one; idempotent.
    pub fn set_free_if_not_yet_sampled(&mut self, id: ValveId) {
        match self.status(id) {
            Some(ValveStatus::Operating | ValveStatus::Available) => {
                self.set_status(id, ValveStatus::Available);
            }
            Some(status) => debug!("Valve {}: left {:?}", id, status),
            None => warn!("Valve {}: no such valve", id),
        }
    }

    /// Valves whose status is neither unavailable nor available.
    pub fn in_use_count(&self) -> usize {
        self.iter().filter(|v| v.status.is_in_use()).count()
    }

    /// Fitted valves in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Valve> + '_ {
        self.slots.iter().flatten()
    }

    /// Whether any valve has unsaved changes.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Write back every valve changed since the last persist.
    pub fn persist_dirty(&mut self, storage: &mut dyn StoragePort, folder: &str) -> Result<usize> {
        let ids: Vec<ValveId> = self.dirty.iter().copied().collect();
        for &id in &ids {
            if let Some(valve) = self.get(id) {
                Self::write_valve(storage, folder, valve)?;
            }
            self.dirty.remove(&id);
        }
        Ok(ids.len())
    }

    /// Write back every fitted valve.
    pub fn persist_all(&mut self, storage: &mut dyn StoragePort, folder: &str) -> Result<()> {
        for valve in self.slots.iter().flatten() {
            Self::write_valve(storage, folder, valve)?;
        }
        self.dirty.clear();
        Ok(())
    }

    fn write_valve(storage: &mut dyn StoragePort, folder: &str, valve: &Valve) -> Result<()> {
        let bytes = serde_json::to_vec(valve)?;
        storage.write(&format!("{folder}/{}.json", valve.id), &bytes)?;
        Ok(())
    }
}
