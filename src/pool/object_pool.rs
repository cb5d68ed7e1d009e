use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::queue::SegQueue;

use super::PoolError;

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;
type Hook<T> = Box<dyn Fn(&mut T) + Send + Sync>;

/// Lock-free free list of reusable objects.
///
/// The pool is pre-filled with `capacity` instances. [`acquire`](Pool::acquire)
/// runs the spawn hook after taking an object out; [`release`](Pool::release)
/// runs the despawn hook before putting it back. When the free list is empty
/// the pool either allocates a fresh instance (expand) or reports
/// [`PoolError::Exhausted`].
pub struct Pool<T> {
    name: &'static str,
    free: SegQueue<T>,
    factory: Factory<T>,
    on_spawn: Option<Hook<T>>,
    on_despawn: Option<Hook<T>>,
    expand: bool,
    capacity: usize,
    allocated: AtomicUsize,
    in_use: AtomicUsize,
}

pub struct PoolBuilder<T> {
    name: &'static str,
    factory: Factory<T>,
    on_spawn: Option<Hook<T>>,
    on_despawn: Option<Hook<T>>,
    expand: bool,
    capacity: usize,
}

impl<T> PoolBuilder<T> {
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn expand(mut self, expand: bool) -> Self {
        self.expand = expand;
        self
    }

    #[must_use]
    pub fn on_spawn(mut self, hook: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.on_spawn = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_despawn(mut self, hook: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.on_despawn = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn build(self) -> Pool<T> {
        let free = SegQueue::new();
        for _ in 0..self.capacity {
            free.push((self.factory)());
        }
        Pool {
            name: self.name,
            free,
            factory: self.factory,
            on_spawn: self.on_spawn,
            on_despawn: self.on_despawn,
            expand: self.expand,
            capacity: self.capacity,
            allocated: AtomicUsize::new(self.capacity),
            in_use: AtomicUsize::new(0),
        }
    }
}

impl<T> Pool<T> {
    pub fn builder(factory: impl Fn() -> T + Send + Sync + 'static) -> PoolBuilder<T> {
        PoolBuilder {
            name: std::any::type_name::<T>(),
            factory: Box::new(factory),
            on_spawn: None,
            on_despawn: None,
            expand: true,
            capacity: 10,
        }
    }

    pub fn acquire(&self) -> Result<T, PoolError> {
        let mut item = match self.free.pop() {
            Some(item) => item,
            None if self.expand => {
                let total = self.allocated.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(pool = self.name, total, "pool empty, allocating");
                (self.factory)()
            }
            None => {
                tracing::warn!(
                    pool = self.name,
                    capacity = self.capacity,
                    "pool exhausted"
                );
                return Err(PoolError::Exhausted {
                    pool: self.name,
                    capacity: self.capacity,
                });
            }
        };
        if let Some(hook) = &self.on_spawn {
            hook(&mut item);
        }
        self.in_use.fetch_add(1, Ordering::Relaxed);
        Ok(item)
    }

    pub fn release(&self, mut item: T) {
        if let Some(hook) = &self.on_despawn {
            hook(&mut item);
        }
        // Saturating: objects built outside the pool may be donated to it.
        let _ = self
            .in_use
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        self.free.push(item);
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    #[must_use]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    /// Instances created so far, including overflow allocations.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .field("in_use", &self.in_use())
            .field("expand", &self.expand)
            .finish()
    }
}
