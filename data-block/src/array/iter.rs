//! Iterator of the Array

use super::Array;

/// Iterator of the [`Array`]. Each item is `None` if the element is null
#[derive(Debug)]
pub struct ArrayIter<'a, A: Array> {
    array: &'a A,
    current: usize,
    len: usize,
}

impl<'a, A: Array> ArrayIter<'a, A> {
    /// Create a new [`ArrayIter`]
    #[inline]
    pub fn new(array: &'a A) -> Self {
        Self {
            array,
            current: 0,
            len: array.len(),
        }
    }
}

impl<'a, A: Array> Iterator for ArrayIter<'a, A> {
    type Item = Option<A::ValueRef<'a>>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.current == self.len {
            return None;
        }
        let index = self.current;
        self.current += 1;
        if self.array.is_valid(index) {
            // SAFETY: index < len
            Some(Some(unsafe { self.array.get_value_unchecked(index) }))
        } else {
            Some(None)
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len - self.current, Some(self.len - self.current))
    }
}

impl<A: Array> ExactSizeIterator for ArrayIter<'_, A> {}
