//! Utility Module
//!
//! - [`Pool`]: frame-reused buffer with logical length tracking
//! - [`time`]: frame and stage timing
//!
//! # Pooling
//!
//! Every per-frame array the pipeline builds lives in a [`Pool`]. Clearing a
//! pool resets its logical length and recycles the used slots, so the next
//! frame refills the same allocations.
//!
//! ```rust,ignore
//! use saga::utils::Pool;
//!
//! let mut pool: Pool<Vec<u32>> = Pool::with_capacity(8);
//! pool.next_slot().push(1);
//! pool.clear();
//! assert!(pool.is_empty());
//! ```

pub mod pool;
pub mod time;

pub use pool::{Pool, Recycle};
pub use time::{Stopwatch, Timer};
