//! Allocation-free reuse of packets and receive buffers.

pub mod buffer_pool;
pub mod object_pool;

pub use buffer_pool::{BufferPool, PooledBuffer};
pub use object_pool::{Pool, PoolBuilder};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("{pool} pool exhausted (capacity {capacity})")]
    Exhausted { pool: &'static str, capacity: usize },
    #[error("buffer does not belong to this pool")]
    ForeignBuffer,
    #[error("buffer slot {slot} is not checked out")]
    NotCheckedOut { slot: usize },
}
