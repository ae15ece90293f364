//! Synchronization primitives for dynmap
//!
//! Every crate in the workspace locks through these so the whole stack
//! stays usable in a no_std environment.

pub use spin::Mutex;
pub use spin::MutexGuard;
pub use spin::RwLock;
pub use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
