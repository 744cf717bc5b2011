//! Byte buffers, typed views, and the bucketed slab pool
//!
//! The slab pool hands out power-of-two byte regions; `ByteBuffer` wraps a
//! region with a position/limit/mark cursor and endian-aware codecs;
//! `TypedView` projects a buffer as elements of a fixed wire type.

pub mod byte_buffer;
pub mod error;
pub mod pool;
pub mod typed_view;

pub use byte_buffer::{
    BufferState, ByteBuffer, ByteOrder, SeekOrigin, EXPANSION_FACTOR, INITIAL_CAPACITY,
    MAX_CAPACITY, MAX_STRING_WRITE_LENGTH, MIN_EXPANSION,
};
pub use error::BufferError;
pub use pool::{BucketStats, BufferPool, BufferPoolStats, OutOfMemoryHook, Slab, MIN_SLAB_SIZE};
pub use typed_view::{ElementType, TypedView, TypedViewIter, ViewElement};
