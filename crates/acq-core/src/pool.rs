//! Circular pool of frame-slot metadata.
//!
//! The pool mirrors the hardware's native circular frame buffer: absolute
//! frame `i` lives in physical slot `i % capacity`. Each slot records which
//! absolute frame currently occupies it, whether that frame has been captured
//! and saved, and the metadata captured at arm time (e.g. motor positions)
//! that is correlated with it.
//!
//! # Staleness
//!
//! The write head is the cumulative number of frames captured. Once the head
//! has moved more than `capacity` frames past an index, the physical slot has
//! been reused and the frame is gone:
//!
//! ```text
//!   stale          live (head - capacity .. head)        not yet written
//! ──────────┼───────────────────────────────────────────┼──────────────────
//!           oldest_available                            head
//! ```

use crate::error::AcquisitionError;
use serde_json::Value;
use std::cmp::Ordering;
use std::ops::Range;
use tracing::warn;

/// Metadata for one physical slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSlot {
    /// Absolute frame number of the current occupant.
    pub absolute_index: u64,
    pub captured: bool,
    pub saved: bool,
    /// Arm-time metadata correlated with the frame.
    pub correlated_metadata: Option<Value>,
}

impl FrameSlot {
    /// Re-assign the slot to `absolute_index` for a new session.
    fn reset(&mut self, absolute_index: u64, metadata: Option<Value>) {
        self.absolute_index = absolute_index;
        self.captured = false;
        self.saved = false;
        self.correlated_metadata = metadata;
    }
}

/// Fixed-capacity circular array of [`FrameSlot`]s.
#[derive(Debug, Clone)]
pub struct FrameSlotPool {
    slots: Vec<FrameSlot>,
    head: u64,
}

impl FrameSlotPool {
    /// Create a pool with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![FrameSlot::default(); capacity.max(1)],
            head: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Cumulative number of frames captured into the pool.
    pub fn head(&self) -> u64 {
        self.head
    }

    /// Oldest absolute index still held.
    pub fn oldest_available(&self) -> u64 {
        self.head.saturating_sub(self.capacity() as u64)
    }

    fn physical(&self, absolute_index: u64) -> usize {
        (absolute_index % self.capacity() as u64) as usize
    }

    /// Physical ranges covered by a window, split at the wrap point.
    fn window_ranges(&self, start: u64, count: usize) -> (Range<usize>, Range<usize>) {
        let capacity = self.capacity();
        let count = count.min(capacity);
        let first_start = self.physical(start);
        let first_len = count.min(capacity - first_start);
        (
            first_start..first_start + first_len,
            0..count - first_len,
        )
    }

    /// Prepare slots for frames `[start, start + count)`.
    ///
    /// `count` is clamped to the capacity. Slots outside the window are not
    /// touched, including when the window wraps.
    pub fn reset_window(&mut self, start: u64, count: usize, metadata: Option<Value>) {
        let (first, second) = self.window_ranges(start, count);
        let first_len = first.len() as u64;
        let first_start = first.start;

        for (offset, slot) in self.slots[first].iter_mut().enumerate() {
            slot.reset(start + offset as u64, metadata.clone());
        }
        for (offset, slot) in self.slots[second].iter_mut().enumerate() {
            slot.reset(start + first_len + offset as u64, metadata.clone());
        }
        tracing::trace!(start, count, first_start, "Frame slot window reset");
    }

    /// Drop unsaved frames with absolute indices in `frames`.
    ///
    /// Only the last `capacity` indices of the range can still be held.
    /// Saved frames keep their slot so a reader can still fetch them.
    pub fn discard(&mut self, frames: Range<u64>) {
        let start = frames.start.max(frames.end.saturating_sub(self.capacity() as u64));
        for absolute_index in start..frames.end {
            let physical = self.physical(absolute_index);
            let slot = &mut self.slots[physical];
            if slot.absolute_index == absolute_index && !slot.saved {
                slot.captured = false;
                slot.correlated_metadata = None;
            }
        }
    }

    fn check_live(&self, absolute_index: u64) -> Result<(), AcquisitionError> {
        if self.head.saturating_sub(absolute_index) > self.capacity() as u64 {
            return Err(AcquisitionError::StaleFrameRequested {
                requested: absolute_index,
                oldest_available: self.oldest_available(),
            });
        }
        Ok(())
    }

    /// Slot for `absolute_index`.
    ///
    /// # Errors
    ///
    /// `StaleFrameRequested` when the index is more than `capacity` frames
    /// behind the write head or the slot already holds a later frame.
    /// `FrameNotReady` when the slot still holds an earlier frame.
    pub fn resolve(&mut self, absolute_index: u64) -> Result<&mut FrameSlot, AcquisitionError> {
        self.check_live(absolute_index)?;
        let oldest_available = self.oldest_available();
        let last_available = self.last_available();
        let physical = self.physical(absolute_index);
        let slot = &mut self.slots[physical];
        match slot.absolute_index.cmp(&absolute_index) {
            Ordering::Equal => Ok(slot),
            Ordering::Greater => Err(AcquisitionError::StaleFrameRequested {
                requested: absolute_index,
                oldest_available: oldest_available.max(slot.absolute_index),
            }),
            Ordering::Less => Err(AcquisitionError::FrameNotReady {
                requested: absolute_index,
                last_available,
            }),
        }
    }

    fn last_available(&self) -> i64 {
        i64::try_from(self.head).map_or(i64::MAX, |head| head - 1)
    }

    /// Read-only view of the slot for `absolute_index`, if it still holds it.
    pub fn get(&self, absolute_index: u64) -> Option<&FrameSlot> {
        self.check_live(absolute_index).ok()?;
        self.slots
            .get(self.physical(absolute_index))
            .filter(|slot| slot.absolute_index == absolute_index)
    }

    /// Mark a captured frame as saved. Idempotent.
    ///
    /// # Errors
    ///
    /// `FrameNotReady` for a frame at or beyond the write head, plus the
    /// errors of [`resolve`](Self::resolve).
    pub fn mark_saved(&mut self, absolute_index: u64) -> Result<(), AcquisitionError> {
        if absolute_index >= self.head {
            return Err(AcquisitionError::FrameNotReady {
                requested: absolute_index,
                last_available: self.last_available(),
            });
        }
        let slot = self.resolve(absolute_index)?;
        slot.saved = true;
        Ok(())
    }

    /// Record that the hardware finished `absolute_index` and advance the head.
    ///
    /// Returns `true` if an unsaved frame was overwritten (an overrun).
    pub fn mark_captured(&mut self, absolute_index: u64) -> bool {
        let physical = self.physical(absolute_index);
        let slot = &mut self.slots[physical];
        let mut overrun = false;

        if slot.absolute_index != absolute_index {
            overrun = slot.captured && !slot.saved;
            if overrun {
                warn!(
                    overwritten = slot.absolute_index,
                    new = absolute_index,
                    "Frame slot overrun: unsaved frame overwritten"
                );
            }
            let metadata = slot.correlated_metadata.take();
            slot.reset(absolute_index, metadata);
        }
        slot.captured = true;
        self.head = self.head.max(absolute_index.saturating_add(1));
        overrun
    }

    /// Move the head forward without touching slots.
    ///
    /// Used when an arm snapshots a frame counter that the pool has not seen.
    pub fn advance_head(&mut self, head: u64) {
        self.head = self.head.max(head);
    }

    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dirty_pool(capacity: usize) -> FrameSlotPool {
        let mut pool = FrameSlotPool::new(capacity);
        for (i, slot) in pool.slots.iter_mut().enumerate() {
            slot.absolute_index = 1000 + i as u64;
            slot.captured = true;
            slot.saved = true;
            slot.correlated_metadata = Some(json!({ "old": i }));
        }
        pool
    }

    #[test]
    fn test_reset_window_touches_only_window() {
        let capacity = 8;
        let cases = [(0u64, 3usize), (5, 6), (14, 8), (7, 1), (3, 0), (21, 20)];

        for (start, count) in cases {
            let mut pool = dirty_pool(capacity);
            let before = pool.slots().to_vec();
            pool.reset_window(start, count, Some(json!({ "x": 1.5 })));

            let effective = count.min(capacity) as u64;
            for i in 0..effective {
                let slot = pool.resolve(start + i).unwrap();
                assert!(!slot.saved, "start={start} count={count} i={i}");
                assert_eq!(slot.absolute_index, start + i);
                assert_eq!(slot.correlated_metadata, Some(json!({ "x": 1.5 })));
            }

            let touched: Vec<usize> = (0..effective)
                .map(|i| ((start + i) % capacity as u64) as usize)
                .collect();
            for (physical, (old, new)) in before.iter().zip(pool.slots()).enumerate() {
                if !touched.contains(&physical) {
                    assert_eq!(old, new, "slot {physical} changed for start={start} count={count}");
                }
            }
        }
    }

    #[test]
    fn test_stale_index_rejected() {
        let mut pool = FrameSlotPool::new(4);
        for i in 0..10 {
            pool.mark_captured(i);
        }
        assert_eq!(pool.head(), 10);
        assert_eq!(pool.oldest_available(), 6);
        assert!(pool.resolve(6).is_ok());
        assert!(pool.resolve(9).is_ok());
        let err = pool.resolve(5).unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::StaleFrameRequested {
                requested: 5,
                oldest_available: 6
            }
        ));
        assert!(pool.get(5).is_none());
    }

    #[test]
    fn test_mark_saved_is_idempotent() {
        let mut pool = FrameSlotPool::new(4);
        pool.reset_window(0, 4, None);
        pool.mark_captured(2);
        pool.mark_saved(2).unwrap();
        pool.mark_saved(2).unwrap();
        assert!(pool.get(2).unwrap().saved);
    }

    #[test]
    fn test_overrun_detected_for_unsaved_frames() {
        let mut pool = FrameSlotPool::new(2);
        pool.reset_window(0, 2, Some(json!("pos")));
        assert!(!pool.mark_captured(0));
        assert!(!pool.mark_captured(1));
        pool.mark_saved(1).unwrap();
        // Frame 0 was never saved.
        assert!(pool.mark_captured(2));
        // Frame 1 was saved.
        assert!(!pool.mark_captured(3));
        let slot = pool.get(3).unwrap();
        assert!(slot.captured && !slot.saved);
        assert_eq!(slot.correlated_metadata, Some(json!("pos")));
    }

    #[test]
    fn test_discard_keeps_saved_frames() {
        let mut pool = FrameSlotPool::new(4);
        pool.reset_window(0, 3, Some(json!(1)));
        pool.mark_captured(0);
        pool.mark_captured(1);
        pool.mark_saved(0).unwrap();
        pool.discard(0..3);

        assert!(pool.get(0).unwrap().captured);
        assert_eq!(pool.get(0).unwrap().correlated_metadata, Some(json!(1)));
        assert!(!pool.get(1).unwrap().captured);
        assert!(pool.get(1).unwrap().correlated_metadata.is_none());
    }

    #[test]
    fn test_discard_reaches_frames_past_the_window() {
        // Twenty frames through a pool of four: 16..20 are still held.
        let mut pool = FrameSlotPool::new(4);
        pool.reset_window(0, 20, Some(json!("pos")));
        for i in 0..20 {
            pool.mark_captured(i);
        }
        pool.mark_saved(18).unwrap();
        pool.discard(0..20);

        let kept: Vec<u64> = pool
            .slots()
            .iter()
            .filter(|slot| slot.captured)
            .map(|slot| slot.absolute_index)
            .collect();
        assert_eq!(kept, vec![18]);
    }

    #[test]
    fn test_discard_leaves_other_occupants() {
        let mut pool = FrameSlotPool::new(4);
        for i in 0..4 {
            pool.mark_captured(i);
        }
        // Indices 4..6 were never captured; slots 0 and 1 still hold 0 and 1.
        pool.discard(4..6);
        assert!(pool.get(0).unwrap().captured);
        assert!(pool.get(1).unwrap().captured);
    }

    #[test]
    fn test_mark_saved_rejects_uncaptured_frames() {
        let mut pool = FrameSlotPool::new(8);
        for i in 0..8 {
            pool.mark_captured(i);
        }
        pool.reset_window(8, 1, None);

        // Slot 5 holds frame 5, which a save of frame 13 must not touch.
        let err = pool.mark_saved(13).unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::FrameNotReady {
                requested: 13,
                last_available: 7
            }
        ));
        assert!(!pool.get(5).unwrap().saved);

        // Frame 8 has a slot prepared but has not been captured.
        assert!(pool.mark_saved(8).is_err());
        assert!(pool.mark_saved(5).is_ok());
    }

    #[test]
    fn test_resolve_checks_slot_occupant() {
        let mut pool = FrameSlotPool::new(4);
        for i in 0..6 {
            pool.mark_captured(i);
        }
        // Slot 2 was prepared for frame 6 ahead of the head.
        pool.reset_window(6, 1, None);
        let err = pool.resolve(2).unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::StaleFrameRequested {
                requested: 2,
                oldest_available: 6
            }
        ));

        // Slot 3 still holds frame 3 while frame 7 is requested.
        let err = pool.resolve(7).unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::FrameNotReady {
                requested: 7,
                last_available: 5
            }
        ));
        assert_eq!(pool.resolve(5).unwrap().absolute_index, 5);
    }

    #[test]
    fn test_zero_capacity_is_promoted() {
        let pool = FrameSlotPool::new(0);
        assert_eq!(pool.capacity(), 1);
    }
}
