use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam::queue::ArrayQueue;

use super::PoolError;

/// A buffer checked out of a [`BufferPool`].
///
/// Must be handed back with [`BufferPool::release`]; dropping it instead
/// permanently shrinks the pool.
#[derive(Debug)]
pub struct PooledBuffer {
    slot: usize,
    data: Box<[u8]>,
}

impl PooledBuffer {
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Fixed set of equally sized byte buffers allocated once at startup.
///
/// Every buffer's heap address is recorded at construction so a buffer can be
/// mapped back to its slot without the caller tracking an index.
#[derive(Debug)]
pub struct BufferPool {
    free: ArrayQueue<PooledBuffer>,
    slots_by_addr: HashMap<usize, usize>,
    checked_out: Box<[AtomicBool]>,
    in_use: AtomicUsize,
    buffer_size: usize,
}

impl BufferPool {
    /// Zero-sized buffers would share one address, so sizes are raised to 1.
    #[must_use]
    pub fn new(count: usize, buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        let free = ArrayQueue::new(count.max(1));
        let mut slots_by_addr = HashMap::with_capacity(count);
        for slot in 0..count {
            let data = vec![0u8; buffer_size].into_boxed_slice();
            slots_by_addr.insert(data.as_ptr() as usize, slot);
            // Sized to `count`, so the push cannot fail.
            let _ = free.push(PooledBuffer { slot, data });
        }
        Self {
            free,
            slots_by_addr,
            checked_out: (0..count).map(|_| AtomicBool::new(false)).collect(),
            in_use: AtomicUsize::new(0),
            buffer_size,
        }
    }

    pub fn acquire(&self) -> Result<PooledBuffer, PoolError> {
        let Some(buffer) = self.free.pop() else {
            tracing::warn!(capacity = self.capacity(), "buffer pool exhausted");
            return Err(PoolError::Exhausted {
                pool: "buffer",
                capacity: self.capacity(),
            });
        };
        if let Some(flag) = self.checked_out.get(buffer.slot) {
            flag.store(true, Ordering::Release);
        }
        self.in_use.fetch_add(1, Ordering::Relaxed);
        Ok(buffer)
    }

    /// Return a buffer, identified by its address rather than its slot tag.
    pub fn release(&self, buffer: PooledBuffer) -> Result<(), PoolError> {
        let Some(slot) = self.slot_of(&buffer) else {
            tracing::warn!(slot = buffer.slot, "rejected buffer that does not belong to this pool");
            return Err(PoolError::ForeignBuffer);
        };
        let was_out = self
            .checked_out
            .get(slot)
            .is_some_and(|flag| flag.swap(false, Ordering::AcqRel));
        if !was_out {
            tracing::warn!(slot, "rejected release of a buffer that is not checked out");
            return Err(PoolError::NotCheckedOut { slot });
        }
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        let _ = self.free.push(PooledBuffer {
            slot,
            data: buffer.data,
        });
        Ok(())
    }

    /// Slot index owning `buffer`, if it is one of this pool's buffers.
    #[must_use]
    pub fn slot_of(&self, buffer: &[u8]) -> Option<usize> {
        self.slots_by_addr.get(&(buffer.as_ptr() as usize)).copied()
    }

    #[must_use]
    pub fn is_checked_out(&self, slot: usize) -> bool {
        self.checked_out
            .get(slot)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.checked_out.len()
    }

    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_until_empty_then_release() {
        let pool = BufferPool::new(2, 16);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a.slot(), b.slot());
        assert_eq!(a.len(), 16);
        assert!(matches!(pool.acquire(), Err(PoolError::Exhausted { .. })));

        pool.release(a).unwrap();
        assert_eq!(pool.free_count(), 1);
        pool.release(b).unwrap();
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_slot_lookup_by_identity() {
        let pool = BufferPool::new(3, 8);
        let buffer = pool.acquire().unwrap();
        assert_eq!(pool.slot_of(&buffer), Some(buffer.slot()));
        assert!(pool.is_checked_out(buffer.slot()));
        assert_eq!(pool.slot_of(&[0u8; 8]), None);
        pool.release(buffer).unwrap();
    }

    #[test]
    fn test_foreign_buffer_rejected() {
        let pool = BufferPool::new(1, 8);
        let other = BufferPool::new(1, 8);
        let stranger = other.acquire().unwrap();
        assert_eq!(pool.release(stranger), Err(PoolError::ForeignBuffer));
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_writes_survive_the_round_trip_through_the_pool() {
        let pool = BufferPool::new(1, 4);
        let mut buffer = pool.acquire().unwrap();
        buffer[..4].copy_from_slice(&[1, 2, 3, 4]);
        pool.release(buffer).unwrap();
        let again = pool.acquire().unwrap();
        assert_eq!(&again[..], &[1, 2, 3, 4]);
    }
}
