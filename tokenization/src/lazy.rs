use crate::error::Result;
use once_cell::sync::OnceCell;
use std::fmt;

/// A value computed on first read and kept for the owner's lifetime.
///
/// A failed computation stores nothing, so the next read tries again.
/// Internal to the crate:
///
/// ```compile_fail
/// use tokenbridge_tokenization::LazyField;
/// ```
pub(crate) struct LazyField<T> {
    cell: OnceCell<T>,
}

impl<T> LazyField<T> {
    pub(crate) const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub(crate) fn get_or_try_init<F>(&self, init: F) -> Result<&T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.cell.get_or_try_init(init)
    }

    #[cfg(test)]
    fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: fmt::Debug> fmt::Debug for LazyField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(value) => f.debug_tuple("LazyField").field(value).finish(),
            None => f.write_str("LazyField(<unset>)"),
        }
    }
}
