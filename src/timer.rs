//! Deferred-action timer.
//!
//! A fixed pool of named one-shot actions keyed off the monotonic clock.
//! The scheduler arms `BeginSampling` a few seconds before a task's start
//! time; the control loop polls once per tick and runs whatever is due.
//!
//! ```text
//!  TaskScheduler ──run()──▶ ┌─────────────────┐
//!                           │  ActionScheduler│ ──poll(now)──▶ due actions
//!  TaskScheduler ─cancel()─▶│  [slot; 4]      │                    │
//!                           └─────────────────┘                    ▼
//!                                                  SamplerService dispatch
//! ```

use log::{debug, info, warn};

// ═══════════════════════════════════════════════════════════════
//  Action types
// ═══════════════════════════════════════════════════════════════

/// Work the control loop performs when a timer expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredAction {
    /// Start the sampling procedure for an already-configured task.
    BeginSampling { task_id: crate::store::task::TaskId },
}

impl DeferredAction {
    /// Name used to cancel every pending action of this kind.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::BeginSampling { .. } => BEGIN_SAMPLING,
        }
    }
}

/// Label of [`DeferredAction::BeginSampling`].
pub const BEGIN_SAMPLING: &str = "delayTaskExecution";

// ═══════════════════════════════════════════════════════════════
//  Timer engine
// ═══════════════════════════════════════════════════════════════

/// Maximum number of pending actions (stack-allocated).
pub const MAX_ACTIONS: usize = 4;

#[derive(Debug, Clone, Copy)]
struct Pending {
    action: DeferredAction,
    due_ms: u64,
}

/// Fixed-slot one-shot timer.
pub struct ActionScheduler {
    slots: [Option<Pending>; MAX_ACTIONS],
}

impl Default for ActionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionScheduler {
    pub fn new() -> Self {
        Self {
            slots: [None; MAX_ACTIONS],
        }
    }

    /// Arm `action` to fire `delay_ms` after `now_ms`.  Returns the slot
    /// index, or `None` if every slot is taken.
    pub fn run(&mut self, action: DeferredAction, delay_ms: u64, now_ms: u64) -> Option<usize> {
        let due_ms = now_ms.saturating_add(delay_ms);
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                info!("Timer: '{}' armed in {}ms (slot {})", action.label(), delay_ms, i);
                *slot = Some(Pending { action, due_ms });
                return Some(i);
            }
        }
        warn!("Timer: no free slot for '{}'", action.label());
        None
    }

    /// Drop every pending action named `label`.  Idempotent; returns how
    /// many were removed.
    pub fn cancel(&mut self, label: &str) -> usize {
        let mut removed = 0;
        for slot in self.slots.iter_mut() {
            if slot.is_some_and(|p| p.action.label() == label) {
                *slot = None;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Timer: cancelled {} '{}'", removed, label);
        } else {
            debug!("Timer: nothing to cancel for '{}'", label);
        }
        removed
    }

    /// Remove and return every action due at `now_ms`, earliest first.
    pub fn poll(&mut self, now_ms: u64) -> heapless::Vec<DeferredAction, MAX_ACTIONS> {
        let mut due: heapless::Vec<Pending, MAX_ACTIONS> = heapless::Vec::new();
        for slot in self.slots.iter_mut() {
            if let Some(p) = *slot {
                if now_ms >= p.due_ms {
                    // Capacity equals slot count.
                    let _ = due.push(p);
                    *slot = None;
                }
            }
        }
        due.sort_unstable_by_key(|p| p.due_ms);
        due.into_iter().map(|p| p.action).collect()
    }

    /// Due time of the pending action named `label`, if any.
    pub fn due_at(&self, label: &str) -> Option<u64> {
        self.slots
            .iter()
            .flatten()
            .find(|p| p.action.label() == label)
            .map(|p| p.due_ms)
    }

    pub fn pending_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
