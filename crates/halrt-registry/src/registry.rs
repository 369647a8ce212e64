//! Weak id-to-object map with safe concurrent removal.
//!
//! The map itself lives in a [`VersionedCell`], so lookups never wait on a
//! registration in progress. Each entry carries a small reader/writer lock:
//! lookups `try_read` it while upgrading the weak reference, and
//! [`ObjectRegistry::unregister`] takes it exclusively before returning, which
//! drains every lookup that could still be touching the entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use halrt_sync::VersionedCell;
use parking_lot::{Mutex, RwLock};

use crate::id::{DEFAULT_ID_CEILING, IdSpace, ObjectId};

/// Registry construction options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Initial soft ceiling for auto-allocated ids.
    pub id_ceiling: u32,
    /// Emit a trace event for every registration and removal.
    pub verbose: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            id_ceiling: DEFAULT_ID_CEILING,
            verbose: false,
        }
    }
}

impl RegistryOptions {
    /// Set the initial id ceiling.
    pub fn with_id_ceiling(mut self, id_ceiling: u32) -> Self {
        self.id_ceiling = id_ceiling;
        self
    }

    /// Enable per-registration trace events.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

struct Entry<O: ?Sized> {
    alive: AtomicBool,
    object: Weak<O>,
    in_use: RwLock<()>,
}

type EntryMap<O> = HashMap<ObjectId, Arc<Entry<O>>>;

/// Maps [`ObjectId`]s to live objects without owning them.
///
/// `register` and `unregister` belong on control threads. `find` is safe on
/// the real-time thread.
pub struct ObjectRegistry<O: ?Sized> {
    entries: VersionedCell<EntryMap<O>>,
    ids: Mutex<IdSpace>,
    verbose: bool,
}

impl<O: ?Sized> Default for ObjectRegistry<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ?Sized> ObjectRegistry<O> {
    /// Create a registry with default options.
    pub fn new() -> Self {
        Self::with_options(RegistryOptions::default())
    }

    /// Create a registry with the given options.
    pub fn with_options(options: RegistryOptions) -> Self {
        Self {
            entries: VersionedCell::new(HashMap::new()),
            ids: Mutex::new(IdSpace::new(options.id_ceiling)),
            verbose: options.verbose,
        }
    }

    /// Register an object.
    ///
    /// With `requested` unset (or [`ObjectId::UNKNOWN`]) a fresh id is
    /// allocated. Otherwise `requested` is used as-is, which is how well-known
    /// singletons such as the plugin root get [`ObjectId::PLUGIN`]. Returns
    /// `None` if the requested id is taken or the id space is exhausted.
    pub fn register(&self, object: Weak<O>, requested: Option<ObjectId>) -> Option<ObjectId> {
        let mut ids = self.ids.lock();

        let id = match requested.filter(|id| !id.is_unknown()) {
            None => {
                let Some(id) = ids.allocate() else {
                    tracing::error!("ObjectRegistry: object id space exhausted");
                    return None;
                };
                id
            }
            Some(id) => {
                if self.entries.read().contains_key(&id) || !ids.claim(id) {
                    tracing::warn!("ObjectRegistry: id {id} is already registered");
                    return None;
                }
                id
            }
        };

        let entry = Arc::new(Entry {
            alive: AtomicBool::new(true),
            object,
            in_use: RwLock::new(()),
        });
        self.entries.update(|map| map.insert(id, entry));

        if self.verbose {
            tracing::trace!(object_id = %id, "ObjectRegistry: registered");
        }
        Some(id)
    }

    /// Remove an object.
    ///
    /// Blocks until every [`find`](Self::find) that reached this entry has
    /// finished, so after return no lookup can observe the object. The id is
    /// then returned to the allocator. Unknown ids are ignored.
    pub fn unregister(&self, id: ObjectId) {
        let mut ids = self.ids.lock();

        let Some(entry) = self.entries.read().get(&id).cloned() else {
            tracing::warn!("ObjectRegistry: unregister of unknown id {id}");
            return;
        };

        entry.alive.store(false, Ordering::SeqCst);
        self.entries.update(|map| map.remove(&id));
        drop(entry.in_use.write());

        ids.release(id);

        if self.verbose {
            tracing::trace!(object_id = %id, "ObjectRegistry: unregistered");
        }
    }

    /// Look up a live object.
    ///
    /// Returns `None` if `id` is not registered, is being unregistered, or
    /// names an object whose last strong reference is already gone. Never
    /// parks the calling thread.
    pub fn find(&self, id: ObjectId) -> Option<Arc<O>> {
        let entry = self.entries.read().get(&id).cloned()?;
        let _in_use = entry.in_use.try_read()?;
        if !entry.alive.load(Ordering::SeqCst) {
            return None;
        }
        entry.object.upgrade()
    }

    /// Whether `id` is currently registered.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries
            .read()
            .get(&id)
            .is_some_and(|entry| entry.alive.load(Ordering::SeqCst))
    }

    /// Registered ids, in ascending order.
    pub fn ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<_> = self.entries.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered objects.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no objects are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current soft ceiling of the id allocator.
    pub fn id_ceiling(&self) -> u32 {
        self.ids.lock().ceiling()
    }
}

impl<O: ?Sized> std::fmt::Debug for ObjectRegistry<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("len", &self.len())
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}
