//! Arena that stores the keys of the aggregation states
//!
//! Keys are never freed individually, all of them are freed when the arena is dropped.
//! The only exception is [`Arena::rollback`]: the most recent allocation can be given
//! back, it is used to discard the speculative allocation of a key that turns out to
//! be a duplicate

use std::alloc::Layout;
use std::cell::Cell;
use std::ptr::NonNull;

use allocator_api2::alloc::Allocator;
use bumpalo::Bump;
use snafu::{OptionExt, Snafu};

#[allow(missing_docs)]
#[derive(Debug, Snafu)]
pub enum ArenaError {
    #[snafu(display("Failed to allocate `{len}` bytes in the arena"))]
    Alloc { len: usize },
}

type Result<T> = std::result::Result<T, ArenaError>;

/// Bump arena that owns the bytes of the keys
///
/// It is `Send` but not `Sync`: each partition owns its arena
#[derive(Debug, Default)]
pub struct Arena {
    bump: Bump,
    /// Bytes of the live allocations
    used_bytes: Cell<usize>,
    /// Number of non-empty allocations, used to check the rollback
    #[cfg(debug_assertions)]
    sequence: Cell<u64>,
}

/// Bytes allocated in the [`Arena`]. It should be either kept with [`Allocation::keep`]
/// or given back with [`Arena::rollback`]
#[derive(Debug)]
pub struct Allocation<'a> {
    bytes: &'a mut [u8],
    #[cfg(debug_assertions)]
    sequence: u64,
}

impl<'a> Allocation<'a> {
    /// Get the allocated bytes
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        self.bytes
    }

    /// Get the mutable allocated bytes
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.bytes
    }

    /// Keep the allocation, the bytes live as long as the arena
    #[inline]
    pub fn keep(self) -> &'a [u8] {
        self.bytes
    }
}

impl Arena {
    /// Create a new empty [`Arena`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new [`Arena`] that can hold `bytes` without allocating new chunk
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bump: Bump::with_capacity(bytes),
            used_bytes: Cell::new(0),
            #[cfg(debug_assertions)]
            sequence: Cell::new(0),
        }
    }

    /// Allocate `len` zeroed bytes, caller writes the key into it
    pub fn alloc(&self, len: usize) -> Result<Allocation<'_>> {
        if len == 0 {
            return Ok(self.empty());
        }
        let ptr = self.alloc_raw(len)?;
        // SAFETY: ptr points to `len` allocated bytes, they are initialized here
        let bytes = unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, len);
            std::slice::from_raw_parts_mut(ptr.as_ptr(), len)
        };
        Ok(self.allocation(bytes))
    }

    /// Copy the bytes into the arena
    pub fn insert(&self, bytes: &[u8]) -> Result<Allocation<'_>> {
        if bytes.is_empty() {
            return Ok(self.empty());
        }
        let ptr = self.alloc_raw(bytes.len())?;
        // SAFETY: ptr points to `bytes.len()` allocated bytes, they do not overlap
        // with the source
        let copied = unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len());
            std::slice::from_raw_parts_mut(ptr.as_ptr(), bytes.len())
        };
        Ok(self.allocation(copied))
    }

    /// Copy the bytes into the arena and keep them
    #[inline]
    pub fn store(&self, bytes: &[u8]) -> Result<&[u8]> {
        self.insert(bytes).map(Allocation::keep)
    }

    /// Give back the allocation
    ///
    /// The space is reclaimed only if the `allocation` is the most recent allocation of
    /// the arena. Caller should guarantee no other allocation happens after it, otherwise
    /// the space is leaked until the arena is dropped. The contract is checked in debug
    /// build only
    pub fn rollback(&self, allocation: Allocation<'_>) {
        let len = allocation.bytes.len();
        if len == 0 {
            return;
        }

        #[cfg(debug_assertions)]
        assert_eq!(
            allocation.sequence,
            self.sequence.get(),
            "Only the most recent allocation can be rolled back"
        );

        let ptr = NonNull::from(allocation.bytes).cast::<u8>();
        // SAFETY: the ptr is allocated by the bump with this layout, bump accepts any
        // valid layout
        unsafe {
            let layout = Layout::from_size_align_unchecked(len, 1);
            Allocator::deallocate(&&self.bump, ptr, layout);
        }
        self.used_bytes.set(self.used_bytes.get() - len);
        #[cfg(debug_assertions)]
        self.sequence.set(self.sequence.get() - 1);
    }

    /// Bytes of the keys that are kept in the arena
    #[inline]
    pub fn used_bytes(&self) -> usize {
        self.used_bytes.get()
    }

    /// Bytes of the chunks allocated by the arena, including the unused space
    #[inline]
    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }

    fn alloc_raw(&self, len: usize) -> Result<NonNull<u8>> {
        let layout = Layout::array::<u8>(len).ok().context(AllocSnafu { len })?;
        let ptr = self
            .bump
            .try_alloc_layout(layout)
            .ok()
            .context(AllocSnafu { len })?;
        self.used_bytes.set(self.used_bytes.get() + len);
        Ok(ptr)
    }

    #[inline]
    fn empty(&self) -> Allocation<'_> {
        Allocation {
            bytes: &mut [],
            #[cfg(debug_assertions)]
            sequence: self.sequence.get(),
        }
    }

    #[inline]
    fn allocation<'a>(&'a self, bytes: &'a mut [u8]) -> Allocation<'a> {
        #[cfg(debug_assertions)]
        self.sequence.set(self.sequence.get() + 1);

        Allocation {
            bytes,
            #[cfg(debug_assertions)]
            sequence: self.sequence.get(),
        }
    }
}
