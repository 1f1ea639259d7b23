//! ## appvakt-inventory
//! **Live process inventory backed by the OS process table**
//!
//! Pure OS query, no mutation. Each pass re-resolves the process table and
//! the socket table from scratch; nothing is cached across calls, because a
//! handle is only as alive as the process it names.

mod system;

pub use system::SystemInventory;
