use crate::handle::{HandleKind, NativeHandle};
use crate::library::NativeLibrary;
use std::sync::Arc;
use tokenbridge_abi::ReleaseHandleFn;

/// Exclusive owner of one native handle.
///
/// The bound release function runs exactly once: on [`ResourceOwner::release`]
/// or, failing that, on drop. Not `Clone`.
pub(crate) struct ResourceOwner {
    handle: Option<NativeHandle>,
    kind: HandleKind,
    release_fn: ReleaseHandleFn,
    library: Arc<NativeLibrary>,
}

impl ResourceOwner {
    pub(crate) fn acquire(
        library: Arc<NativeLibrary>,
        handle: NativeHandle,
        release_fn: ReleaseHandleFn,
        kind: HandleKind,
    ) -> Self {
        log::debug!("Acquired native {} {:?}", kind.name(), handle);
        Self {
            handle: Some(handle),
            kind,
            release_fn,
            library,
        }
    }

    /// Owner for a handle of `kind`, bound to the library's release function
    pub(crate) fn for_kind(
        library: Arc<NativeLibrary>,
        handle: NativeHandle,
        kind: HandleKind,
    ) -> Self {
        let release_fn = match kind {
            HandleKind::Tokenizer => library.functions().release_tokenizer,
            HandleKind::Encoding => library.functions().release_encoding,
        };
        Self::acquire(library, handle, release_fn, kind)
    }

    /// The owned handle. Only `None` inside `release`/`drop`.
    pub(crate) fn handle(&self) -> NativeHandle {
        match self.handle {
            Some(handle) => handle,
            None => unreachable!("native {} used after release", self.kind.name()),
        }
    }

    pub(crate) fn library(&self) -> &Arc<NativeLibrary> {
        &self.library
    }

    /// Release now instead of at drop
    pub(crate) fn release(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(handle) = self.handle.take() {
            // SAFETY: `handle` came from this library and `take` guarantees
            // it is passed to the release function only once.
            unsafe { (self.release_fn)(handle.as_raw()) };
            log::debug!("Freed native {} {:?}", self.kind.name(), handle);
        }
    }
}

impl Drop for ResourceOwner {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for ResourceOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceOwner")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .finish()
    }
}
