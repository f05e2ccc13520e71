//! Copy-on-write pointers designed for sharing the buffers of the arrays
//!
//! Large immutable objects, like the buffers of an array, are shared between readers through
//! [`CowPtr`]. Writers need exclusive ownership, which is represented by [`MutPtr`]. The
//! only way to get a [`MutPtr`] from a [`CowPtr`] is [`CowPtr::mutate`]: if the pointer is
//! the unique owner of the object, the object is reused in place. Otherwise, the object is
//! cloned and the other owners keep reading the old one.
//!
//! Objects are born mutable: [`MutPtr::create`] is the only constructor. Converting the
//! [`MutPtr`] into [`CowPtr`] makes the object shareable.
//!
//! ```
//! use data_block::cow::{CowPtr, MutPtr};
//!
//! let x: CowPtr<Vec<i32>> = MutPtr::create(vec![1]).into();
//! let y = x.clone();
//! let mut mutate_x = x.mutate();
//! mutate_x.push(2);
//! let x: CowPtr<Vec<i32>> = mutate_x.into();
//!
//! assert_eq!(*x, [1, 2]);
//! assert_eq!(*y, [1]);
//! ```
//!
//! # Note
//!
//! COW is bad practice if the values are small or copying is done implicitly. It is
//! designed for the cases that sharing the state of large objects is required and the
//! modification of the shared state should be controlled precisely.

use std::fmt::Debug;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Trait for objects that can be cloned when a shared object needs to be mutated
///
/// All of the `Clone` types implement it. For the base interface of a hierarchy, for
/// example `dyn Column`, implement it by forwarding to the object safe clone method of
/// the interface, see [`CowLeaf`]
pub trait CowClone {
    /// Clone self into a new exclusively owned object
    fn cow_clone(&self) -> MutPtr<Self>;
}

impl<T: Clone> CowClone for T {
    #[inline]
    fn cow_clone(&self) -> MutPtr<Self> {
        MutPtr::create(self.clone())
    }
}

/// Helper for the concrete leaf types of a base interface `B`, usually `B` is a
/// `dyn Trait`. The leaf only needs to tell how to erase itself behind the interface,
/// `create`/`clone` are forwarded to the leaf by the default methods.
///
/// ```
/// use std::sync::Arc;
/// use data_block::cow::{CowClone, CowLeaf, CowPtr, MutPtr};
///
/// trait Counter: Send + Sync {
///     fn get(&self) -> u32;
///     fn incr(&mut self);
///     fn clone_counter(&self) -> MutPtr<dyn Counter>;
/// }
///
/// impl CowClone for dyn Counter {
///     fn cow_clone(&self) -> MutPtr<Self> {
///         self.clone_counter()
///     }
/// }
///
/// #[derive(Clone)]
/// struct Simple(u32);
///
/// impl CowLeaf<dyn Counter> for Simple {
///     fn upcast(this: Arc<Self>) -> Arc<dyn Counter> {
///         this
///     }
/// }
///
/// impl Counter for Simple {
///     fn get(&self) -> u32 {
///         self.0
///     }
///     fn incr(&mut self) {
///         self.0 += 1;
///     }
///     fn clone_counter(&self) -> MutPtr<dyn Counter> {
///         self.clone_base()
///     }
/// }
///
/// let counter: CowPtr<dyn Counter> = Simple(1).create_base().into();
/// let alias = counter.clone();
/// let mut counter = counter.mutate();
/// counter.incr();
/// assert_eq!(counter.get(), 2);
/// assert_eq!(alias.get(), 1);
/// ```
pub trait CowLeaf<B: ?Sized>: Clone + Sized + 'static {
    /// Erase the concrete type behind the base interface. The returned `Arc` must be the
    /// only reference to the object, [`Self::create_base`] and [`MutPtr::upcast`] panic
    /// if another strong or weak reference is kept
    fn upcast(this: Arc<Self>) -> Arc<B>;

    /// Create a new exclusively owned object, viewed as the base interface
    #[inline]
    fn create_base(self) -> MutPtr<B> {
        MutPtr::from_upcast(Self::upcast(Arc::new(self)))
    }

    /// Clone self into a new exclusively owned object, viewed as the base interface
    #[inline]
    fn clone_base(&self) -> MutPtr<B> {
        self.clone().create_base()
    }
}

/// Reference counted pointer to an immutable object. Cloning it only increases the
/// reference count
pub struct CowPtr<T: ?Sized> {
    inner: Arc<T>,
}

/// Pointer to a mutable object. It is the unique owner of the object, therefore it
/// can not be cloned. Move it into [`CowPtr`] to share the object
pub struct MutPtr<T: ?Sized> {
    /// Invariant: strong count is 1 and no weak pointer exists
    inner: Arc<T>,
}

impl<T> MutPtr<T> {
    /// Create a new object, the returned pointer is its unique owner
    #[inline]
    pub fn create(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }
}

impl<T: ?Sized> MutPtr<T> {
    /// Give up the exclusive ownership, the object becomes shareable
    #[inline]
    pub fn share(self) -> CowPtr<T> {
        CowPtr { inner: self.inner }
    }

    /// Address of the object
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        Arc::as_ptr(&self.inner)
    }

    /// View the leaf as its base interface. The object is not moved
    #[inline]
    pub fn upcast<B: ?Sized>(self) -> MutPtr<B>
    where
        T: CowLeaf<B>,
    {
        MutPtr::from_upcast(T::upcast(self.inner))
    }

    /// Panics if `inner` is not the unique owner of the object
    #[inline]
    fn from_upcast(mut inner: Arc<T>) -> Self {
        assert!(
            Arc::get_mut(&mut inner).is_some(),
            "CowLeaf::upcast should return the unique reference to the object"
        );
        Self { inner }
    }
}

impl<T: ?Sized> Deref for MutPtr<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: ?Sized> DerefMut for MutPtr<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        debug_assert_eq!(Arc::strong_count(&self.inner), 1);
        // SAFETY: MutPtr is the unique owner of the object, no one else can read it
        unsafe { &mut *(Arc::as_ptr(&self.inner) as *mut T) }
    }
}

impl<T: ?Sized + Debug> Debug for MutPtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MutPtr").field(&&*self.inner).finish()
    }
}

impl<T: Default> Default for MutPtr<T> {
    #[inline]
    fn default() -> Self {
        Self::create(T::default())
    }
}

impl<T: ?Sized> Clone for CowPtr<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized> Deref for CowPtr<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: ?Sized> From<MutPtr<T>> for CowPtr<T> {
    #[inline]
    fn from(ptr: MutPtr<T>) -> Self {
        ptr.share()
    }
}

impl<T: Default> Default for CowPtr<T> {
    #[inline]
    fn default() -> Self {
        MutPtr::<T>::default().share()
    }
}

impl<T: ?Sized + Debug> Debug for CowPtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CowPtr").field(&&*self.inner).finish()
    }
}

impl<T> CowPtr<T> {
    /// Create a shared pointer of the object. Same as `MutPtr::create(value).share()`
    #[inline]
    pub fn new(value: T) -> Self {
        MutPtr::create(value).share()
    }
}

impl<T: ?Sized> CowPtr<T> {
    /// Number of the [`CowPtr`]s that share the object
    #[inline]
    pub fn use_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Returns true if two pointers share the same object
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    /// Address of the object
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        Arc::as_ptr(&self.inner)
    }

    /// View the leaf as its base interface. The object is not moved
    #[inline]
    pub fn upcast<B: ?Sized>(self) -> CowPtr<B>
    where
        T: CowLeaf<B>,
    {
        CowPtr {
            inner: T::upcast(self.inner),
        }
    }

    /// Convert self into [`MutPtr`] without checking whether self is the unique owner
    ///
    /// # Safety
    ///
    /// Caller should guarantee no other [`CowPtr`] shares the object, for example the
    /// object is created and has not been shared yet. Otherwise, writing through the
    /// returned pointer is a data race
    #[inline]
    pub unsafe fn assume_mutable(self) -> MutPtr<T> {
        debug_assert_eq!(self.use_count(), 1);
        MutPtr { inner: self.inner }
    }
}

impl<T: ?Sized + CowClone> CowPtr<T> {
    /// Get the exclusive ownership of the object. If self is the unique owner, the object
    /// is reused without copy. Otherwise, the object is cloned and other owners still
    /// read the old object
    #[inline]
    pub fn mutate(self) -> MutPtr<T> {
        let mut inner = self.inner;
        if Arc::get_mut(&mut inner).is_some() {
            MutPtr { inner }
        } else {
            T::cow_clone(&inner)
        }
    }

    /// Mutate the object in place. Same as `*self = self.mutate().into()` and returns the
    /// mutable reference to the object
    #[inline]
    pub fn make_mut(&mut self) -> &mut T {
        if Arc::get_mut(&mut self.inner).is_none() {
            self.inner = T::cow_clone(&self.inner).inner;
        }
        // SAFETY: self is the unique owner of the object now
        unsafe { &mut *(Arc::as_ptr(&self.inner) as *mut T) }
    }
}
