//! Synchronization primitives for the halrt plugin runtime.
//!
//! The runtime exposes object state to two kinds of callers at once: control
//! threads that mutate it, and a real-time I/O thread that must never wait on
//! them. [`VersionedCell`] is the container used for every such piece of state.
//!
//! # Features
//!
//! - **Non-blocking reads**: readers never wait on a writer that is publishing
//! - **Serialized writes**: one writer at a time, whole-value replacement
//! - **Prompt teardown**: the retired value is released as soon as its
//!   readers drain, for types with drop glue
//!
//! # Example
//!
//! ```rust
//! use halrt_sync::VersionedCell;
//!
//! let cell = VersionedCell::new(vec![1, 2, 3]);
//! assert_eq!(cell.read().len(), 3);
//!
//! cell.update(|v| v.push(4));
//! assert_eq!(cell.read_copy(), vec![1, 2, 3, 4]);
//! ```

mod cell;

pub use cell::{CellRef, VersionedCell};
