//! Hash set of the unique values
//!
//! Each bucket caches the hash of its key, growing the set or combining two sets never
//! hashes the key again

use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

use hashbrown::{HashTable, TryReserveError};
use snafu::Snafu;

/// Hasher of all the sets. Sets of different partitions are combined with the cached
/// hashes, so every set hashes with the same seeds
pub type UniqHasher = ahash::RandomState;

/// Seeded [`UniqHasher`] shared by every [`UniqSet`]
pub const UNIQ_HASHER: UniqHasher = UniqHasher::with_seeds(9, 7, 9, 8);

#[allow(missing_docs)]
#[derive(Debug, Snafu)]
pub enum HashSetError {
    #[snafu(display(
        "Failed to grow the hash set that holds `{len}` keys to capacity `{capacity}`: {error:?}"
    ))]
    Grow {
        len: usize,
        capacity: usize,
        error: TryReserveError,
    },
}

type Result<T> = std::result::Result<T, HashSetError>;

/// Policy that determines how the [`UniqSet`] grows
pub trait GrowthPolicy: Debug + 'static {
    /// Number of keys the set can hold when it is created
    const INITIAL_CAPACITY: usize;

    /// Capacity of the set after growing, when the set is full with `len` keys
    #[inline]
    fn grown_capacity(len: usize) -> usize {
        Self::INITIAL_CAPACITY.max(len.saturating_mul(2))
    }
}

/// Growth of the set that stores fixed width values. Values are small, start with 16
#[derive(Debug)]
pub struct FixedGrowth;

impl GrowthPolicy for FixedGrowth {
    const INITIAL_CAPACITY: usize = 16;
}

/// Growth of the set that stores the keys in the arena. Most of the groups only have
/// a few unique values, start with 2
#[derive(Debug)]
pub struct GenericGrowth;

impl GrowthPolicy for GenericGrowth {
    const INITIAL_CAPACITY: usize = 2;
}

#[derive(Debug)]
struct Bucket<K> {
    key: K,
    hash: u64,
}

/// Hash set that stores unique keys
#[derive(Debug)]
pub struct UniqSet<K, P> {
    table: HashTable<Bucket<K>>,
    build_hasher: UniqHasher,
    _phantom: PhantomData<P>,
}

impl<K: Hash + Eq, P: GrowthPolicy> Default for UniqSet<K, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq, P: GrowthPolicy> UniqSet<K, P> {
    /// Create a new [`UniqSet`] with the initial capacity of the policy
    pub fn new() -> Self {
        Self {
            table: HashTable::with_capacity(P::INITIAL_CAPACITY),
            build_hasher: UNIQ_HASHER,
            _phantom: PhantomData,
        }
    }

    /// Number of keys in the set
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if the set does not contain any key
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Number of keys the set can hold without growing
    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Hash the key with the hasher of the set. Any type whose hash equals to the hash of
    /// `K` can be used to look up the set, for example `[u8]` for `&[u8]`
    #[inline]
    pub fn hash_of<Q: Hash + ?Sized>(&self, key: &Q) -> u64 {
        self.build_hasher.hash_one(key)
    }

    /// Find the key with the hash
    #[inline]
    pub fn find_hashed(&self, hash: u64, mut eq: impl FnMut(&K) -> bool) -> Option<&K> {
        self.table
            .find(hash, |bucket| bucket.hash == hash && eq(&bucket.key))
            .map(|bucket| &bucket.key)
    }

    /// Returns true if the set contains the key
    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        let hash = self.hash_of(key);
        self.find_hashed(hash, |k| k == key).is_some()
    }

    /// Make sure the next insertion does not grow the set
    pub fn try_reserve_one(&mut self) -> Result<()> {
        let len = self.table.len();
        if len < self.table.capacity() {
            return Ok(());
        }
        let capacity = P::grown_capacity(len);
        self.table
            .try_reserve(capacity - len, |bucket| bucket.hash)
            .map_err(|error| HashSetError::Grow {
                len,
                capacity,
                error,
            })
    }

    /// Insert the key that is not in the set, caller should call [`Self::try_reserve_one`]
    /// before it. Otherwise the allocation failure aborts
    #[inline]
    pub fn insert_unique_hashed(&mut self, hash: u64, key: K) {
        debug_assert!(self.find_hashed(hash, |k| k == &key).is_none());
        self.table
            .insert_unique(hash, Bucket { key, hash }, |bucket| bucket.hash);
    }

    /// Insert the key, returns true if the key is new
    pub fn insert(&mut self, key: K) -> Result<bool> {
        let hash = self.hash_of(&key);
        if self.find_hashed(hash, |k| k == &key).is_some() {
            return Ok(false);
        }
        self.try_reserve_one()?;
        self.insert_unique_hashed(hash, key);
        Ok(true)
    }

    /// Iterate the keys in the set, the order is unspecified
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &K> + '_ {
        self.table.iter().map(|bucket| &bucket.key)
    }

    /// Iterate the keys and their cached hashes
    #[inline]
    pub fn iter_hashed(&self) -> impl Iterator<Item = (u64, &K)> + '_ {
        self.table.iter().map(|bucket| (bucket.hash, &bucket.key))
    }
}
