//! Native tokenizer library
//!
//! Exports the tokenbridge C ABI over HuggingFace tokenizers. Every entry point
//! returns a [`RawResult`]; failures (including panics) are reported through
//! `error_msg` and never unwind across the boundary.
//!
//! Build as a `cdylib` to load it at runtime, or link the `rlib` and pass
//! [`functions()`] to the binding directly.

mod bridge;

use std::ffi::{c_char, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::slice;
use tokenbridge_abi::{encode_sequence_id, RawHandle, RawList, RawResult, TokenizerFunctions};

const NIL_TOKENIZER: &str = "Nil tokenizer pointer.";
const NIL_ENCODING: &str = "Nil encoding pointer.";

/// Entry-point table backed by this crate's exported functions.
pub fn functions() -> TokenizerFunctions {
    TokenizerFunctions {
        new_tokenizer_from_identifier,
        new_tokenizer_from_file,
        new_tokenizer_from_bytes,
        tokenizer_encode,
        tokenizer_encode_batch,
        tokenizer_decode,
        tokenizer_get_vocab_size,
        encoding_get_tokens,
        encoding_get_ids,
        encoding_get_sequence_ids,
        encoding_get_attention_mask,
        encoding_get_token_at,
        encoding_get_id_at,
        encoding_get_sequence_id_at,
        encoding_get_attention_mask_at,
        encoding_get_len,
        encoding_eq,
        release_tokenizer,
        release_encoding,
        release_list,
        release_string,
    }
}

/// Run `body`, turning a panic into an error result.
fn guarded<T>(fallback: impl FnOnce() -> T, body: impl FnOnce() -> RawResult<T>) -> RawResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("Native panic caught at FFI boundary: {}", message);
            RawResult::error(fallback(), format!("Native panic: {message}"))
        }
    }
}

unsafe fn str_arg<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, String> {
    if ptr.is_null() {
        return Err(format!("Nil {what} pointer."));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|e| format!("FFI string conversion failed for {what}: {e}"))
}

fn string_result(value: &str) -> RawResult<*mut c_char> {
    match CString::new(value) {
        Ok(s) => RawResult::ok(s.into_raw()),
        Err(err) => RawResult::error_null(format!("Rust-to-C string conversion failed: {err}")),
    }
}

fn handle_result(result: tokenizers::Result<RawHandle>) -> RawResult<RawHandle> {
    match result {
        Ok(ptr) => RawResult::ok(ptr),
        Err(err) => RawResult::error_null(err),
    }
}

fn out_of_range(index: usize, len: usize) -> String {
    format!("Index {index} out of range for encoding of length {len}")
}

#[no_mangle]
pub unsafe extern "C" fn new_tokenizer_from_identifier(
    identifier: *const c_char,
) -> RawResult<RawHandle> {
    guarded(std::ptr::null_mut, || match str_arg(identifier, "identifier") {
        Ok(identifier) => handle_result(bridge::new_tokenizer_from_identifier(identifier)),
        Err(err) => RawResult::error_null(err),
    })
}

#[no_mangle]
pub unsafe extern "C" fn new_tokenizer_from_file(filename: *const c_char) -> RawResult<RawHandle> {
    guarded(std::ptr::null_mut, || match str_arg(filename, "filename") {
        Ok(filename) => handle_result(bridge::new_tokenizer_from_file(filename)),
        Err(err) => RawResult::error_null(err),
    })
}

#[no_mangle]
pub unsafe extern "C" fn new_tokenizer_from_bytes(
    bytes: *const u8,
    length: usize,
) -> RawResult<RawHandle> {
    guarded(std::ptr::null_mut, || {
        if bytes.is_null() {
            return RawResult::error_null("Nil bytes pointer.");
        }
        let buffer = slice::from_raw_parts(bytes, length);
        handle_result(bridge::new_tokenizer_from_bytes(buffer))
    })
}

#[no_mangle]
pub unsafe extern "C" fn tokenizer_encode(
    ptr: RawHandle,
    input: *const c_char,
    add_special_tokens: bool,
) -> RawResult<RawHandle> {
    guarded(std::ptr::null_mut, || {
        let input = match str_arg(input, "input") {
            Ok(input) => input,
            Err(err) => return RawResult::error_null(err),
        };
        match bridge::tokenizer_encode(ptr, input, add_special_tokens) {
            None => RawResult::error_null(NIL_TOKENIZER),
            Some(result) => handle_result(result),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn tokenizer_encode_batch(
    ptr: RawHandle,
    inputs: *const *const c_char,
    input_count: usize,
    add_special_tokens: bool,
) -> RawResult<RawList> {
    guarded(RawList::empty, || {
        if inputs.is_null() && input_count > 0 {
            return RawResult::error_empty("Nil inputs pointer.");
        }
        let mut texts = Vec::with_capacity(input_count);
        for idx in 0..input_count {
            match str_arg(*inputs.add(idx), "input") {
                Ok(text) => texts.push(text),
                Err(err) => return RawResult::error_empty(format!("{err} (input index {idx})")),
            }
        }
        match bridge::tokenizer_encode_batch(ptr, texts, add_special_tokens) {
            None => RawResult::error_empty(NIL_TOKENIZER),
            Some(Ok(handles)) => RawResult::ok(RawList::from_vec(handles)),
            Some(Err(err)) => RawResult::error_empty(err),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn tokenizer_decode(
    ptr: RawHandle,
    ids: *const u32,
    id_count: usize,
    skip_special_tokens: bool,
) -> RawResult<*mut c_char> {
    guarded(std::ptr::null_mut, || {
        let ids = if id_count == 0 {
            &[][..]
        } else if ids.is_null() {
            return RawResult::error_null("Nil ids pointer.");
        } else {
            slice::from_raw_parts(ids, id_count)
        };
        match bridge::tokenizer_decode(ptr, ids, skip_special_tokens) {
            None => RawResult::error_null(NIL_TOKENIZER),
            Some(Ok(text)) => string_result(&text),
            Some(Err(err)) => RawResult::error_null(err),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn tokenizer_get_vocab_size(
    ptr: RawHandle,
    with_added_tokens: bool,
) -> RawResult<usize> {
    guarded(Default::default, || {
        match bridge::tokenizer_get_vocab_size(ptr, with_added_tokens) {
            None => RawResult::error_default(NIL_TOKENIZER),
            Some(size) => RawResult::ok(size),
        }
    })
}

#[no_mangle]
pub unsafe extern "C" fn encoding_get_tokens(ptr: RawHandle) -> RawResult<RawList> {
    guarded(RawList::empty, || {
        let Some(tokens) = bridge::encoding_get_tokens(ptr) else {
            return RawResult::error_empty(NIL_ENCODING);
        };
        let mut strings: Vec<*mut c_char> = Vec::with_capacity(tokens.len());
        for token in tokens {
            match CString::new(token.as_str()) {
                Ok(s) => strings.push(s.into_raw()),
                Err(err) => {
                    for s in strings {
                        drop(CString::from_raw(s));
                    }
                    return RawResult::error_empty(format!(
                        "Rust-to-C string conversion failed: {err}"
                    ));
                }
            }
        }
        RawResult::ok(RawList::from_vec(strings))
    })
}

#[no_mangle]
pub unsafe extern "C" fn encoding_get_ids(ptr: RawHandle) -> RawResult<RawList> {
    guarded(RawList::empty, || match bridge::encoding_get_ids(ptr) {
        None => RawResult::error_empty(NIL_ENCODING),
        Some(ids) => RawResult::ok(RawList::from_vec(ids.to_vec())),
    })
}

#[no_mangle]
pub unsafe extern "C" fn encoding_get_sequence_ids(ptr: RawHandle) -> RawResult<RawList> {
    guarded(RawList::empty, || match bridge::encoding_get_sequence_ids(ptr) {
        None => RawResult::error_empty(NIL_ENCODING),
        Some(ids) => RawResult::ok(RawList::from_vec(
            ids.into_iter().map(encode_sequence_id).collect::<Vec<usize>>(),
        )),
    })
}

#[no_mangle]
pub unsafe extern "C" fn encoding_get_attention_mask(ptr: RawHandle) -> RawResult<RawList> {
    guarded(RawList::empty, || match bridge::encoding_get_attention_mask(ptr) {
        None => RawResult::error_empty(NIL_ENCODING),
        Some(mask) => RawResult::ok(RawList::from_vec(mask.to_vec())),
    })
}

#[no_mangle]
pub unsafe extern "C" fn encoding_get_token_at(
    ptr: RawHandle,
    index: usize,
) -> RawResult<*mut c_char> {
    guarded(std::ptr::null_mut, || match bridge::encoding_get_tokens(ptr) {
        None => RawResult::error_null(NIL_ENCODING),
        Some(tokens) => match tokens.get(index) {
            Some(token) => string_result(token),
            None => RawResult::error_null(out_of_range(index, tokens.len())),
        },
    })
}

#[no_mangle]
pub unsafe extern "C" fn encoding_get_id_at(ptr: RawHandle, index: usize) -> RawResult<u32> {
    guarded(Default::default, || match bridge::encoding_get_ids(ptr) {
        None => RawResult::error_default(NIL_ENCODING),
        Some(ids) => match ids.get(index) {
            Some(id) => RawResult::ok(*id),
            None => RawResult::error_default(out_of_range(index, ids.len())),
        },
    })
}

#[no_mangle]
pub unsafe extern "C" fn encoding_get_sequence_id_at(
    ptr: RawHandle,
    index: usize,
) -> RawResult<usize> {
    guarded(Default::default, || match bridge::encoding_get_sequence_id_at(ptr, index) {
        None => RawResult::error_default(NIL_ENCODING),
        Some(Ok(id)) => RawResult::ok(encode_sequence_id(id)),
        Some(Err(len)) => RawResult::error_default(out_of_range(index, len)),
    })
}

#[no_mangle]
pub unsafe extern "C" fn encoding_get_attention_mask_at(
    ptr: RawHandle,
    index: usize,
) -> RawResult<u32> {
    guarded(Default::default, || match bridge::encoding_get_attention_mask(ptr) {
        None => RawResult::error_default(NIL_ENCODING),
        Some(mask) => match mask.get(index) {
            Some(value) => RawResult::ok(*value),
            None => RawResult::error_default(out_of_range(index, mask.len())),
        },
    })
}

#[no_mangle]
pub unsafe extern "C" fn encoding_get_len(ptr: RawHandle) -> RawResult<usize> {
    guarded(Default::default, || match bridge::encoding_get_len(ptr) {
        None => RawResult::error_default(NIL_ENCODING),
        Some(len) => RawResult::ok(len),
    })
}

#[no_mangle]
pub unsafe extern "C" fn encoding_eq(ptr: RawHandle, other_ptr: RawHandle) -> RawResult<bool> {
    guarded(Default::default, || match bridge::encoding_eq(ptr, other_ptr) {
        None => RawResult::error_default(NIL_ENCODING),
        Some(eq) => RawResult::ok(eq),
    })
}

#[no_mangle]
pub unsafe extern "C" fn release_tokenizer(ptr: RawHandle) {
    bridge::release_tokenizer(ptr)
}

#[no_mangle]
pub unsafe extern "C" fn release_encoding(ptr: RawHandle) {
    bridge::release_encoding(ptr)
}

#[no_mangle]
pub unsafe extern "C" fn release_list(list: RawList, size: usize, align: usize) {
    if let Err(err) = list.dealloc(size, align) {
        log::error!("release_list called with invalid layout ({size}, {align}): {err}");
    }
}

#[no_mangle]
pub unsafe extern "C" fn release_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}
