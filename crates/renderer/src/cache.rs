//! Cache of GPU resources derived from imported hardware buffers.
//!
//! Importing a buffer is expensive (memory import, YCbCr conversion, a whole
//! pipeline), and a decoder cycles through the same small pool of buffers, so
//! each buffer is imported once and its resources are kept in a slot keyed by
//! [`BufferId`].
//!
//! A slot is never evicted to make room. It is released between frames by
//! [`ImportCache::evict_unreferenced`], once the producer has dropped the
//! buffer *and* no frame still shows it. Running out of slots is therefore an
//! error: it means more buffers are alive than the cache was sized for.
//!
//! Lookups are linear scans, which is fine for decoder pools of a few dozen
//! buffers.

use tracing::debug;

use crate::error::{RenderError, RenderResult};
use crate::producer::BufferId;

/// Index of a cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    #[cfg(test)]
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A valid slot.
///
/// `resource` is declared before `buffer` so that the derived GPU objects are
/// destroyed before the buffer reference is released.
struct Entry<B, R> {
    id: BufferId,
    resource: R,
    _buffer: B,
    /// The producer may still hand out this buffer.
    in_producer: bool,
    /// Frames currently holding a unit backed by this buffer.
    active_units: usize,
}

impl<B, R> Entry<B, R> {
    fn is_evictable(&self) -> bool {
        !self.in_producer && self.active_units == 0
    }
}

/// Fixed-capacity map from buffer identity to imported resources.
pub struct ImportCache<B, R> {
    slots: Vec<Option<Entry<B, R>>>,
}

impl<B, R> ImportCache<B, R> {
    /// Creates a cache with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of valid slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// The valid slot holding `id`, if any.
    pub fn find(&self, id: BufferId) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|entry| entry.id == id))
            .map(SlotId)
    }

    /// Returns the slot for `id`, importing it with `create` on a miss.
    ///
    /// `create` returns the strong buffer reference and the resources derived
    /// from it. It is only called on a miss, after a free slot was found.
    /// A hit marks the buffer as referenced by the producer again, since the
    /// producer just delivered it.
    ///
    /// # Errors
    ///
    /// - [`RenderError::CacheFull`] if there is no free slot
    /// - any error returned by `create`; the cache is left unchanged
    pub fn import<F>(&mut self, id: BufferId, create: F) -> RenderResult<SlotId>
    where
        F: FnOnce() -> RenderResult<(B, R)>,
    {
        if let Some(slot) = self.find(id) {
            if let Some(entry) = self.slots[slot.0].as_mut() {
                entry.in_producer = true;
            }
            return Ok(slot);
        }

        let free = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(RenderError::CacheFull {
                capacity: self.capacity(),
            })?;

        let (buffer, resource) = create()?;
        self.slots[free] = Some(Entry {
            id,
            resource,
            _buffer: buffer,
            in_producer: true,
            active_units: 0,
        });
        debug!("Imported buffer {} into slot {}", id, free);

        Ok(SlotId(free))
    }

    pub fn resource(&self, slot: SlotId) -> Option<&R> {
        self.entry(slot).map(|entry| &entry.resource)
    }

    pub fn buffer_id(&self, slot: SlotId) -> Option<BufferId> {
        self.entry(slot).map(|entry| entry.id)
    }

    /// Whether the producer still references the slot's buffer.
    pub fn in_producer(&self, slot: SlotId) -> bool {
        self.entry(slot).is_some_and(|entry| entry.in_producer)
    }

    /// Frames currently holding a unit of the slot's buffer.
    pub fn active_units(&self, slot: SlotId) -> usize {
        self.entry(slot).map_or(0, |entry| entry.active_units)
    }

    /// A frame took a unit backed by the slot's buffer.
    pub fn mark_active(&mut self, slot: SlotId) {
        if let Some(entry) = self.entry_mut(slot) {
            entry.active_units += 1;
        }
    }

    /// A frame released a unit backed by the slot's buffer.
    pub fn release_unit(&mut self, slot: SlotId) {
        if let Some(entry) = self.entry_mut(slot) {
            debug_assert!(entry.active_units > 0, "unbalanced release of {:?}", slot);
            entry.active_units = entry.active_units.saturating_sub(1);
        }
    }

    /// The producer dropped `id`. The slot is evicted later, once no frame
    /// uses it. Returns whether a slot matched.
    pub fn invalidate(&mut self, id: BufferId) -> bool {
        let Some(slot) = self.find(id) else {
            return false;
        };
        if let Some(entry) = self.entry_mut(slot) {
            entry.in_producer = false;
            debug!("Buffer {} removed by producer (slot {})", id, slot.0);
        }
        true
    }

    /// Releases every slot that neither the producer nor a frame references.
    /// Returns the number of slots released.
    pub fn evict_unreferenced(&mut self) -> usize {
        let mut evicted = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.as_ref().is_some_and(Entry::is_evictable) {
                if let Some(entry) = slot.take() {
                    debug!("Evicted buffer {} from slot {}", entry.id, index);
                }
                evicted += 1;
            }
        }
        evicted
    }

    /// Releases every slot regardless of references.
    ///
    /// Only valid once no frame can still be using any slot.
    pub fn clear(&mut self) {
        let released = self.len();
        self.slots.iter_mut().for_each(|slot| *slot = None);
        if released > 0 {
            debug!("Released {} cached import(s)", released);
        }
    }

    fn entry(&self, slot: SlotId) -> Option<&Entry<B, R>> {
        self.slots.get(slot.0).and_then(Option::as_ref)
    }

    fn entry_mut(&mut self, slot: SlotId) -> Option<&mut Entry<B, R>> {
        self.slots.get_mut(slot.0).and_then(Option::as_mut)
    }
}
