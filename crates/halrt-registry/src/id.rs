//! Object identifiers and the id allocator.

use std::fmt;

/// Initial soft ceiling for auto-allocated ids.
pub const DEFAULT_ID_CEILING: u32 = 1000;

const BITS: u32 = u64::BITS;

/// Numeric identifier of an object visible to the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    /// The null id. Never assigned to an object.
    pub const UNKNOWN: Self = Self(0);
    /// Well-known id of the plugin root object.
    pub const PLUGIN: Self = Self(1);

    /// Ids the allocator never hands out.
    pub const RESERVED: [Self; 2] = [Self::UNKNOWN, Self::PLUGIN];

    /// Wrap a raw host id.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw `u32` value for host communication.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this is [`ObjectId::UNKNOWN`].
    pub const fn is_unknown(self) -> bool {
        self.0 == Self::UNKNOWN.0
    }

    /// Whether the allocator must skip this id.
    pub const fn is_reserved(self) -> bool {
        self.0 == Self::UNKNOWN.0 || self.0 == Self::PLUGIN.0
    }
}

impl From<u32> for ObjectId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<ObjectId> for u32 {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocator for [`ObjectId`]s.
///
/// Ids are handed out sequentially from the last allocation. Once the next id
/// would reach the ceiling the allocator either doubles the ceiling (when more
/// than half of it is in use) or wraps and scans the bitset for the lowest
/// free id. A freed id therefore stays unused until the sequence comes back
/// around to it.
#[derive(Debug, Clone)]
pub struct IdSpace {
    /// One bit per id; set means allocated.
    bits: Vec<u64>,
    last: u32,
    ceiling: u32,
    allocated: u32,
}

impl Default for IdSpace {
    fn default() -> Self {
        Self::new(DEFAULT_ID_CEILING)
    }
}

impl IdSpace {
    /// Create an allocator with the given initial ceiling.
    ///
    /// The ceiling is raised to fit at least one non-reserved id.
    pub fn new(ceiling: u32) -> Self {
        Self {
            bits: Vec::new(),
            last: ObjectId::PLUGIN.raw(),
            ceiling: ceiling.max(ObjectId::RESERVED.len() as u32 + 1),
            allocated: 0,
        }
    }

    /// Current soft ceiling.
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Number of ids currently marked allocated.
    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Whether `id` is marked allocated.
    pub fn is_allocated(&self, id: ObjectId) -> bool {
        let (chunk, bit) = locate(id.raw());
        self.bits.get(chunk).is_some_and(|word| word & (1u64 << bit) != 0)
    }

    fn is_free(&self, id: u32) -> bool {
        !ObjectId::new(id).is_reserved() && !self.is_allocated(ObjectId::new(id))
    }

    /// Allocate a fresh id. Returns `None` only if the id space is exhausted.
    pub fn allocate(&mut self) -> Option<ObjectId> {
        let mut next = self.last.checked_add(1).unwrap_or(u32::MAX);

        if next >= self.ceiling && self.allocated > self.ceiling / 2 && self.ceiling <= u32::MAX / 2
        {
            self.ceiling *= 2;
        }

        if next >= self.ceiling {
            next = self.find_free(0)?;
        } else if !self.is_free(next) {
            next = self.find_free(next.checked_add(1)?)?;
        }

        self.mark(next, true);
        self.allocated += 1;
        self.last = next;
        Some(ObjectId::new(next))
    }

    /// Mark a caller-chosen id as allocated.
    ///
    /// Reserved ids are accepted but never tracked. Returns `false` if `id`
    /// was already allocated.
    pub fn claim(&mut self, id: ObjectId) -> bool {
        if id.is_reserved() {
            return true;
        }
        if self.is_allocated(id) {
            return false;
        }
        self.mark(id.raw(), true);
        self.allocated += 1;
        true
    }

    /// Return an id to the free set. Reserved and untracked ids are ignored.
    pub fn release(&mut self, id: ObjectId) {
        if id.is_reserved() || !self.is_allocated(id) {
            return;
        }
        self.mark(id.raw(), false);
        self.allocated -= 1;
    }

    /// Lowest free id at or after `start`, wrapping once around the bitset,
    /// else the first id past the bitset.
    fn find_free(&self, start: u32) -> Option<u32> {
        let size = self.bits.len();
        if size > 0 {
            let (mut start_chunk, start_bit) = locate(start);
            let mut first_mask = u64::MAX << start_bit;
            if start_chunk >= size {
                start_chunk = 0;
                first_mask = u64::MAX;
            }

            for n in 0..=size {
                let chunk = (start_chunk + n) % size;
                let mut free = !self.bits[chunk];
                if n == 0 {
                    free &= first_mask;
                }
                while free != 0 {
                    let bit = free.trailing_zeros();
                    let id = u32::try_from(chunk).ok()?.checked_mul(BITS)? + bit;
                    if !ObjectId::new(id).is_reserved() {
                        return Some(id);
                    }
                    free &= free - 1;
                }
            }
        }

        let mut id = u32::try_from(size).ok()?.checked_mul(BITS)?;
        while ObjectId::new(id).is_reserved() {
            id += 1;
        }
        Some(id)
    }

    fn mark(&mut self, id: u32, allocated: bool) {
        let (chunk, bit) = locate(id);
        if chunk >= self.bits.len() {
            self.bits.resize(chunk + 1, 0);
        }
        if allocated {
            self.bits[chunk] |= 1u64 << bit;
        } else {
            self.bits[chunk] &= !(1u64 << bit);
        }
    }
}

#[inline]
fn locate(id: u32) -> (usize, u32) {
    ((id / BITS) as usize, id % BITS)
}
