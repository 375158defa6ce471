//! Safe-ish operations on boxed tokenizers and encodings
//!
//! Handles are `Box::into_raw` pointers. A null handle yields `None`; any other
//! handle is trusted to come from this module and to still be live.

use std::path::Path;
use tokenbridge_abi::RawHandle;
use tokenizers::{Encoding, Tokenizer};

pub fn new_tokenizer_from_identifier(identifier: &str) -> tokenizers::Result<RawHandle> {
    let tokenizer = from_identifier(identifier)?;
    Ok(into_handle(tokenizer))
}

#[cfg(feature = "http")]
fn from_identifier(identifier: &str) -> tokenizers::Result<Tokenizer> {
    Tokenizer::from_pretrained(identifier, None)
}

#[cfg(not(feature = "http"))]
fn from_identifier(identifier: &str) -> tokenizers::Result<Tokenizer> {
    Err(format!(
        "Cannot resolve tokenizer identifier `{identifier}`: \
         native library was built without the `http` feature"
    )
    .into())
}

pub fn new_tokenizer_from_file<P: AsRef<Path>>(filename: P) -> tokenizers::Result<RawHandle> {
    Ok(into_handle(Tokenizer::from_file(filename)?))
}

pub fn new_tokenizer_from_bytes<B: AsRef<[u8]>>(bytes: B) -> tokenizers::Result<RawHandle> {
    Ok(into_handle(Tokenizer::from_bytes(bytes)?))
}

pub fn tokenizer_encode(
    ptr: RawHandle,
    input: &str,
    add_special_tokens: bool,
) -> Option<tokenizers::Result<RawHandle>> {
    let tokenizer = unsafe { tokenizer_ref(ptr) }?;
    Some(
        tokenizer
            .encode(input, add_special_tokens)
            .map(into_handle),
    )
}

pub fn tokenizer_encode_batch(
    ptr: RawHandle,
    inputs: Vec<&str>,
    add_special_tokens: bool,
) -> Option<tokenizers::Result<Vec<RawHandle>>> {
    let tokenizer = unsafe { tokenizer_ref(ptr) }?;
    Some(
        tokenizer
            .encode_batch(inputs, add_special_tokens)
            .map(|encodings| encodings.into_iter().map(into_handle).collect()),
    )
}

pub fn tokenizer_decode(
    ptr: RawHandle,
    ids: &[u32],
    skip_special_tokens: bool,
) -> Option<tokenizers::Result<String>> {
    let tokenizer = unsafe { tokenizer_ref(ptr) }?;
    Some(tokenizer.decode(ids, skip_special_tokens))
}

pub fn tokenizer_get_vocab_size(ptr: RawHandle, with_added_tokens: bool) -> Option<usize> {
    let tokenizer = unsafe { tokenizer_ref(ptr) }?;
    Some(tokenizer.get_vocab_size(with_added_tokens))
}

pub fn release_tokenizer(ptr: RawHandle) {
    if !ptr.is_null() {
        drop(unsafe { Box::from_raw(ptr as *mut Tokenizer) });
    }
}

pub fn encoding_get_tokens<'a>(ptr: RawHandle) -> Option<&'a [String]> {
    Some(unsafe { encoding_ref(ptr) }?.get_tokens())
}

pub fn encoding_get_ids<'a>(ptr: RawHandle) -> Option<&'a [u32]> {
    Some(unsafe { encoding_ref(ptr) }?.get_ids())
}

pub fn encoding_get_sequence_ids(ptr: RawHandle) -> Option<Vec<Option<usize>>> {
    Some(unsafe { encoding_ref(ptr) }?.get_sequence_ids())
}

/// Sequence id of one token, or the encoding length when `index` is out of range.
pub fn encoding_get_sequence_id_at(
    ptr: RawHandle,
    index: usize,
) -> Option<Result<Option<usize>, usize>> {
    let encoding = unsafe { encoding_ref(ptr) }?;
    if index >= encoding.len() {
        return Some(Err(encoding.len()));
    }
    Some(Ok(encoding.token_to_sequence(index)))
}

pub fn encoding_get_attention_mask<'a>(ptr: RawHandle) -> Option<&'a [u32]> {
    Some(unsafe { encoding_ref(ptr) }?.get_attention_mask())
}

pub fn encoding_get_len(ptr: RawHandle) -> Option<usize> {
    Some(unsafe { encoding_ref(ptr) }?.len())
}

pub fn encoding_eq(ptr: RawHandle, other_ptr: RawHandle) -> Option<bool> {
    let encoding = unsafe { encoding_ref(ptr) }?;
    let other = unsafe { encoding_ref(other_ptr) }?;
    Some(encoding == other)
}

pub fn release_encoding(ptr: RawHandle) {
    if !ptr.is_null() {
        drop(unsafe { Box::from_raw(ptr as *mut Encoding) });
    }
}

fn into_handle<T>(value: T) -> RawHandle {
    Box::into_raw(Box::new(value)) as RawHandle
}

unsafe fn tokenizer_ref<'a>(ptr: RawHandle) -> Option<&'a Tokenizer> {
    (ptr as *const Tokenizer).as_ref()
}

unsafe fn encoding_ref<'a>(ptr: RawHandle) -> Option<&'a Encoding> {
    (ptr as *const Encoding).as_ref()
}
