//! Read-only, fixed-length views over native arrays
//!
//! A view is filled either one element at a time (one native call per index,
//! memoised per slot) or all at once from a bulk list that is copied and then
//! handed back to the native side.

use crate::error::{BindingError, Result};
use once_cell::sync::OnceCell;
use std::fmt;
use tokenbridge_abi::RawList;

type FetchOne<T> = Box<dyn Fn(usize) -> Result<T> + Send + Sync>;

pub struct LazyIndexedView<T> {
    len: usize,
    source: Source<T>,
}

enum Source<T> {
    PerIndex {
        fetch: FetchOne<T>,
        slots: Box<[OnceCell<T>]>,
    },
    Materialized(Vec<T>),
}

/// Hands a bulk list back to its releaser exactly once.
struct ListGuard<R: FnOnce(RawList)> {
    list: RawList,
    release: Option<R>,
}

impl<R: FnOnce(RawList)> Drop for ListGuard<R> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.list);
        }
    }
}

impl<T> LazyIndexedView<T> {
    /// View whose elements are fetched on first read of each index
    pub(crate) fn per_index<F>(len: usize, fetch: F) -> Self
    where
        F: Fn(usize) -> Result<T> + Send + Sync + 'static,
    {
        let slots = (0..len).map(|_| OnceCell::new()).collect();
        Self {
            len,
            source: Source::PerIndex {
                fetch: Box::new(fetch),
                slots,
            },
        }
    }

    pub(crate) fn from_values(values: Vec<T>) -> Self {
        Self {
            len: values.len(),
            source: Source::Materialized(values),
        }
    }

    /// Materialise a view from one bulk native call.
    ///
    /// `release` receives the list once whether extraction succeeds or not.
    pub(crate) fn from_bulk<B, E, R>(
        expected_len: usize,
        bulk: B,
        extract: E,
        release: R,
    ) -> Result<Self>
    where
        B: FnOnce() -> Result<RawList>,
        E: Fn(&RawList, usize) -> Result<T>,
        R: FnOnce(RawList),
    {
        let list = bulk()?;
        let guard = ListGuard {
            list,
            release: Some(release),
        };

        if guard.list.len != expected_len {
            log::error!(
                "Native list length {} does not match encoding length {}",
                guard.list.len,
                expected_len
            );
            return Err(BindingError::LengthMismatch {
                expected: expected_len,
                actual: guard.list.len,
            });
        }

        let values = (0..guard.list.len)
            .map(|index| extract(&guard.list, index))
            .collect::<Result<Vec<T>>>()?;

        drop(guard);
        Ok(Self::from_values(values))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element at `index`. Out-of-range indices fail without touching native memory.
    pub fn get(&self, index: usize) -> Result<&T> {
        if index >= self.len {
            return Err(BindingError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        match &self.source {
            Source::Materialized(values) => Ok(&values[index]),
            Source::PerIndex { fetch, slots } => slots[index].get_or_try_init(|| fetch(index)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<&T>> + '_ {
        (0..self.len).map(move |index| self.get(index))
    }

    /// True once every element is held host-side
    pub fn is_materialized(&self) -> bool {
        match &self.source {
            Source::Materialized(_) => true,
            Source::PerIndex { slots, .. } => slots.iter().all(|slot| slot.get().is_some()),
        }
    }
}

impl<T: Clone> LazyIndexedView<T> {
    pub fn to_vec(&self) -> Result<Vec<T>> {
        self.iter().map(|value| value.cloned()).collect()
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyIndexedView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for index in 0..self.len {
            match &self.source {
                Source::Materialized(values) => {
                    list.entry(&values[index]);
                }
                Source::PerIndex { slots, .. } => match slots[index].get() {
                    Some(value) => {
                        list.entry(value);
                    }
                    None => {
                        list.entry(&format_args!("<unfetched>"));
                    }
                },
            }
        }
        list.finish()
    }
}
