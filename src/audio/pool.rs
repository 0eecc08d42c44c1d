use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to one fragment of a [`FragmentPool`].
///
/// Handles are minted once, when the pool is built, and are neither `Clone`
/// nor `Copy`. Holding the handle is what grants access to the fragment's
/// samples, so moving it between threads moves the right to touch the data.
#[derive(Debug, PartialEq, Eq)]
pub struct Fragment {
    pool_id: u64,
    index: usize,
}

impl Fragment {
    /// Position of this fragment inside its pool.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// One contiguous block of interleaved i16 samples, carved into equally
/// sized fragments. The block is allocated once and never resized.
pub struct FragmentPool {
    id: u64,
    fragment_len: usize,
    count: usize,
    samples: Box<[UnsafeCell<i16>]>,
}

// SAFETY: a fragment's region is only reachable through its unique
// `Fragment` handle (`&Fragment` for reads, `&mut Fragment` for writes),
// and `region` rejects handles minted by another pool. Two threads can
// therefore never alias the same region mutably.
unsafe impl Sync for FragmentPool {}

impl FragmentPool {
    /// Allocates `count` fragments of `fragment_len` i16 values each and
    /// returns the pool together with the only handles that will ever exist
    /// for it, ordered by index.
    pub fn new(fragment_len: usize, count: usize) -> (Self, Vec<Fragment>) {
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let samples = (0..fragment_len * count)
            .map(|_| UnsafeCell::new(0i16))
            .collect::<Box<[_]>>();
        let handles = (0..count)
            .map(|index| Fragment { pool_id: id, index })
            .collect();
        (
            Self {
                id,
                fragment_len,
                count,
                samples,
            },
            handles,
        )
    }

    /// Number of i16 values in one fragment (channels included).
    pub fn fragment_len(&self) -> usize {
        self.fragment_len
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn owns(&self, fragment: &Fragment) -> bool {
        fragment.pool_id == self.id
    }

    /// Read access to a fragment's samples.
    ///
    /// Panics if `fragment` was minted by a different pool.
    pub fn samples<'a>(&'a self, fragment: &'a Fragment) -> &'a [i16] {
        let ptr = self.region(fragment);
        // SAFETY: `region` returned a pointer to `fragment_len` initialized
        // values owned by this pool; the shared borrow of the unique handle
        // excludes any concurrent `samples_mut` on the same region.
        unsafe { std::slice::from_raw_parts(ptr, self.fragment_len) }
    }

    /// Write access to a fragment's samples.
    ///
    /// Panics if `fragment` was minted by a different pool.
    pub fn samples_mut<'a>(&'a self, fragment: &'a mut Fragment) -> &'a mut [i16] {
        let ptr = self.region(fragment);
        // SAFETY: as in `samples`; the exclusive borrow of the unique handle
        // guarantees no other reference to this region is alive.
        unsafe { std::slice::from_raw_parts_mut(ptr, self.fragment_len) }
    }

    fn region(&self, fragment: &Fragment) -> *mut i16 {
        assert!(
            self.owns(fragment),
            "fragment {} belongs to pool {}, not pool {}",
            fragment.index,
            fragment.pool_id,
            self.id
        );
        let start = fragment.index * self.fragment_len;
        let cells = &self.samples[start..start + self.fragment_len];
        UnsafeCell::raw_get(cells.as_ptr())
    }
}

impl std::fmt::Debug for FragmentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentPool")
            .field("id", &self.id)
            .field("fragment_len", &self.fragment_len)
            .field("count", &self.count)
            .finish()
    }
}
