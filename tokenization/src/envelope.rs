//! Result envelope decoding
//!
//! Every native call returns a `RawResult`. The error arm is checked first and
//! its message buffer is handed back to the native side on every path; the
//! raw struct never leaves this module.

use crate::error::{BindingError, Result};
use crate::handle::NativeHandle;
use crate::library::NativeLibrary;
use std::ffi::{c_char, CStr};
use tokenbridge_abi::{RawHandle, RawList, RawResult};

/// A native-owned C string, released on drop.
pub(crate) struct NativeString<'a> {
    library: &'a NativeLibrary,
    ptr: *mut c_char,
}

impl<'a> NativeString<'a> {
    /// # Safety
    /// `ptr` must be null or a string allocated by the native library that
    /// nothing else will release.
    pub(crate) unsafe fn new(library: &'a NativeLibrary, ptr: *mut c_char) -> Self {
        Self { library, ptr }
    }

    pub(crate) fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Copy the contents out. Invalid UTF-8 is replaced rather than failing,
    /// so reading never skips the release.
    pub(crate) fn read(&self) -> String {
        if self.ptr.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(self.ptr) }
            .to_string_lossy()
            .into_owned()
    }
}

impl Drop for NativeString<'_> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { (self.library.functions().release_string)(self.ptr) };
        }
    }
}

/// Split a raw result into its payload or the native error message.
pub(crate) fn decode<T>(library: &NativeLibrary, raw: RawResult<T>) -> Result<T> {
    if !raw.error_msg.is_null() {
        let message = unsafe { NativeString::new(library, raw.error_msg) };
        return Err(BindingError::Native(message.read()));
    }
    Ok(raw.value)
}

pub(crate) fn empty_result(operation: &'static str) -> BindingError {
    log::error!("Native contract violation: `{}` returned an empty result", operation);
    BindingError::EmptyResult { operation }
}

pub(crate) fn decode_handle(
    library: &NativeLibrary,
    raw: RawResult<RawHandle>,
    operation: &'static str,
) -> Result<NativeHandle> {
    let ptr = decode(library, raw)?;
    NativeHandle::new(ptr).ok_or_else(|| empty_result(operation))
}

pub(crate) fn decode_list(
    library: &NativeLibrary,
    raw: RawResult<RawList>,
    operation: &'static str,
) -> Result<RawList> {
    let list = decode(library, raw)?;
    if list.ptr.is_null() && list.len > 0 {
        return Err(empty_result(operation));
    }
    Ok(list)
}

pub(crate) fn decode_string(
    library: &NativeLibrary,
    raw: RawResult<*mut c_char>,
    operation: &'static str,
) -> Result<String> {
    let ptr = decode(library, raw)?;
    let string = unsafe { NativeString::new(library, ptr) };
    if string.is_null() {
        return Err(empty_result(operation));
    }
    Ok(string.read())
}
