//! Object registry for the halrt plugin runtime.
//!
//! Every object the host can address is identified by an [`ObjectId`]. The
//! [`ObjectRegistry`] hands out those ids, maps them back to live objects,
//! and coordinates lookups from the real-time thread with objects being
//! destroyed on control threads.
//!
//! # Features
//!
//! - **Delayed id reuse**: freed ids are recycled only after the allocator
//!   wraps, so stale ids held by callers fail lookups instead of aliasing
//! - **Reserved ids**: [`ObjectId::UNKNOWN`] and [`ObjectId::PLUGIN`] are never
//!   auto-allocated
//! - **Weak map**: the registry never keeps an object alive
//! - **Real-time lookup**: [`ObjectRegistry::find`] never parks
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use halrt_registry::{ObjectId, ObjectRegistry};
//!
//! let registry = ObjectRegistry::<String>::new();
//! let name = Arc::new(String::from("device"));
//!
//! let id = registry.register(Arc::downgrade(&name), None).unwrap();
//! assert_ne!(id, ObjectId::PLUGIN);
//! assert!(Arc::ptr_eq(&registry.find(id).unwrap(), &name));
//!
//! registry.unregister(id);
//! assert!(registry.find(id).is_none());
//! ```

mod id;
mod registry;

pub use id::{DEFAULT_ID_CEILING, IdSpace, ObjectId};
pub use registry::{ObjectRegistry, RegistryOptions};
