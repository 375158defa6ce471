//! C ABI for the tokenbridge native library
//!
//! Both sides of the boundary compile against this crate: the native library
//! fills a [`TokenizerFunctions`] table with its `extern "C"` entry points and
//! the binding layer calls through it. Every layout here is `#[repr(C)]` and
//! must stay in sync with the exported symbols.

use std::alloc::{self, Layout, LayoutError};
use std::ffi::{c_char, c_void, CString};
use std::fmt::Display;
use std::mem;
use std::ptr;

/// Opaque pointer to a native tokenizer or encoding
pub type RawHandle = *mut c_void;

/// Outcome of every native call.
///
/// `error_msg` is checked first: when it is non-null the call failed, the
/// message is owned by the native side and must be handed back through
/// `release_string`, and `value` holds an unspecified default.
#[repr(C)]
#[derive(Debug)]
pub struct RawResult<T> {
    pub value: T,
    pub error_msg: *mut c_char,
}

impl<T> RawResult<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            error_msg: ptr::null_mut(),
        }
    }

    /// Failed result carrying `error` as an owned C string.
    ///
    /// Interior NUL bytes are escaped so the message always survives the trip.
    pub fn error<E: Display>(default: T, error: E) -> Self {
        let message = error.to_string().replace('\0', "\\0");
        let error_msg = CString::new(message).unwrap_or_default().into_raw();
        Self {
            value: default,
            error_msg,
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error_msg.is_null()
    }
}

impl<T> RawResult<*mut T> {
    pub fn error_null<E: Display>(error: E) -> Self {
        Self::error(ptr::null_mut(), error)
    }
}

impl<T: Default> RawResult<T> {
    pub fn error_default<E: Display>(error: E) -> Self {
        Self::error(T::default(), error)
    }
}

impl RawResult<RawList> {
    pub fn error_empty<E: Display>(error: E) -> Self {
        Self::error(RawList::empty(), error)
    }
}

/// Native-allocated array descriptor.
///
/// The array is released through `release_list` with the element size and
/// alignment it was allocated with. A null `ptr` with `len == 0` is a valid
/// empty list; a null `ptr` with `len > 0` is a broken result.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawList {
    pub ptr: *mut c_void,
    pub len: usize,
}

impl Default for RawList {
    fn default() -> Self {
        Self::empty()
    }
}

impl RawList {
    pub fn empty() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: 0,
        }
    }

    /// Hand a vector's storage to the other side of the boundary.
    pub fn from_vec<T>(vec: Vec<T>) -> Self {
        if vec.is_empty() || mem::size_of::<T>() == 0 {
            return Self::empty();
        }
        let len = vec.len();
        let boxed = vec.into_boxed_slice();
        Self {
            ptr: Box::into_raw(boxed) as *mut T as *mut c_void,
            len,
        }
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Read element `index` as a `T`.
    ///
    /// # Safety
    /// `ptr` must point to at least `len` initialized values of `T` and
    /// `index` must be below `len`.
    pub unsafe fn read<T: Copy>(&self, index: usize) -> T {
        debug_assert!(index < self.len);
        ptr::read((self.ptr as *const T).add(index))
    }

    /// Free storage allocated by [`RawList::from_vec`].
    ///
    /// # Safety
    /// `size` and `align` must be the size and alignment of the element type
    /// the list was created with, and the list must not be used afterwards.
    /// Elements are not dropped.
    pub unsafe fn dealloc(self, size: usize, align: usize) -> Result<(), LayoutError> {
        if self.ptr.is_null() || self.len == 0 || size == 0 {
            return Ok(());
        }
        let layout = Layout::from_size_align(size.saturating_mul(self.len), align)?;
        alloc::dealloc(self.ptr as *mut u8, layout);
        Ok(())
    }
}

/// Element size and alignment to pass to `release_list` for a list of `T`.
pub fn layout_of<T>() -> (usize, usize) {
    (mem::size_of::<T>(), mem::align_of::<T>())
}

/// Sequence ids travel as `usize` with 0 meaning "no sequence" and `n + 1`
/// meaning sequence `n`.
pub fn encode_sequence_id(id: Option<usize>) -> usize {
    match id {
        Some(id) => id + 1,
        None => 0,
    }
}

pub fn decode_sequence_id(raw: usize) -> Option<usize> {
    raw.checked_sub(1)
}

pub type NewTokenizerFromStrFn = unsafe extern "C" fn(*const c_char) -> RawResult<RawHandle>;
pub type NewTokenizerFromBytesFn = unsafe extern "C" fn(*const u8, usize) -> RawResult<RawHandle>;
pub type TokenizerEncodeFn =
    unsafe extern "C" fn(RawHandle, *const c_char, bool) -> RawResult<RawHandle>;
pub type TokenizerEncodeBatchFn =
    unsafe extern "C" fn(RawHandle, *const *const c_char, usize, bool) -> RawResult<RawList>;
pub type TokenizerDecodeFn =
    unsafe extern "C" fn(RawHandle, *const u32, usize, bool) -> RawResult<*mut c_char>;
pub type TokenizerVocabSizeFn = unsafe extern "C" fn(RawHandle, bool) -> RawResult<usize>;
pub type EncodingListFn = unsafe extern "C" fn(RawHandle) -> RawResult<RawList>;
pub type EncodingTokenAtFn = unsafe extern "C" fn(RawHandle, usize) -> RawResult<*mut c_char>;
pub type EncodingU32AtFn = unsafe extern "C" fn(RawHandle, usize) -> RawResult<u32>;
pub type EncodingUsizeAtFn = unsafe extern "C" fn(RawHandle, usize) -> RawResult<usize>;
pub type EncodingLenFn = unsafe extern "C" fn(RawHandle) -> RawResult<usize>;
pub type EncodingEqFn = unsafe extern "C" fn(RawHandle, RawHandle) -> RawResult<bool>;
pub type ReleaseHandleFn = unsafe extern "C" fn(RawHandle);
pub type ReleaseListFn = unsafe extern "C" fn(RawList, usize, usize);
pub type ReleaseStringFn = unsafe extern "C" fn(*mut c_char);

/// Entry-point table of the native library.
///
/// Field names match the exported symbol names.
#[derive(Debug, Clone, Copy)]
pub struct TokenizerFunctions {
    // Construction
    pub new_tokenizer_from_identifier: NewTokenizerFromStrFn,
    pub new_tokenizer_from_file: NewTokenizerFromStrFn,
    pub new_tokenizer_from_bytes: NewTokenizerFromBytesFn,

    // Tokenizer
    pub tokenizer_encode: TokenizerEncodeFn,
    pub tokenizer_encode_batch: TokenizerEncodeBatchFn,
    pub tokenizer_decode: TokenizerDecodeFn,
    pub tokenizer_get_vocab_size: TokenizerVocabSizeFn,

    // Encoding, bulk
    pub encoding_get_tokens: EncodingListFn,
    pub encoding_get_ids: EncodingListFn,
    pub encoding_get_sequence_ids: EncodingListFn,
    pub encoding_get_attention_mask: EncodingListFn,

    // Encoding, single index
    pub encoding_get_token_at: EncodingTokenAtFn,
    pub encoding_get_id_at: EncodingU32AtFn,
    pub encoding_get_sequence_id_at: EncodingUsizeAtFn,
    pub encoding_get_attention_mask_at: EncodingU32AtFn,

    pub encoding_get_len: EncodingLenFn,
    pub encoding_eq: EncodingEqFn,

    // Release
    pub release_tokenizer: ReleaseHandleFn,
    pub release_encoding: ReleaseHandleFn,
    pub release_list: ReleaseListFn,
    pub release_string: ReleaseStringFn,
}
