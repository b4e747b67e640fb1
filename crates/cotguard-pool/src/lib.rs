//! cotguard object pools
//!
//! Reusable allocations for decoded events and serialization buffers under
//! sustained throughput.
//!
//! Every value goes back through [`Reset`] before another caller can see it,
//! and the scoped [`Pooled`] guard makes the return automatic:
//!
//! ```
//! use cotguard_pool::Pool;
//!
//! let buffers: Pool<Vec<u8>> = Pool::new();
//! let len = buffers.with(|buf| {
//!     buf.extend_from_slice(b"<event/>");
//!     buf.len()
//! });
//! assert_eq!(len, 8);
//! assert!(buffers.checkout().is_empty());
//! ```

pub mod pool;

pub use pool::{Pool, PoolConfig, PoolStats, Pooled, Reset};
