use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;
use tokenbridge_abi::RawHandle;

/// Opaque, non-null pointer to a native tokenizer or encoding.
///
/// Equality is pointer identity. The pointee is never dereferenced on this
/// side of the boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NativeHandle(NonNull<c_void>);

impl NativeHandle {
    pub(crate) fn new(raw: RawHandle) -> Option<Self> {
        NonNull::new(raw).map(Self)
    }

    pub(crate) fn as_raw(self) -> RawHandle {
        self.0.as_ptr()
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:p})", self.0)
    }
}

// SAFETY: the handle is an address passed back to the native library verbatim;
// thread-safety of the pointee is the native library's contract.
unsafe impl Send for NativeHandle {}
unsafe impl Sync for NativeHandle {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandleKind {
    Tokenizer,
    Encoding,
}

impl HandleKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Tokenizer => "tokenizer",
            Self::Encoding => "encoding",
        }
    }
}
