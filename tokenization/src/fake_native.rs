//! In-process stand-in for the native library, for unit tests.
//!
//! Objects are leaked on purpose so a second release is observed and counted
//! instead of freeing twice. Counters are per thread, which keeps parallel
//! tests independent.
//!
//! Trigger inputs:
//! - identifier `hello` fails, identifier `empty` returns neither value nor error
//! - file `missing.json` fails, empty byte buffers fail
//! - text containing `<fail>` fails to encode, `<empty>` returns no handle
//! - token `<null>` becomes a null element in the bulk token list
//! - text containing `<badlen>` reports one more element than its lists hold
//! - batch item `<null-handle>` becomes a null handle, `<skip>` is dropped

use crate::config::BindingConfig;
use crate::library::NativeLibrary;
use std::cell::Cell;
use std::ffi::{c_char, CStr, CString};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokenbridge_abi::{
    encode_sequence_id, RawHandle, RawList, RawResult, TokenizerFunctions,
};

pub(crate) const CLS_ID: u32 = 101;
pub(crate) const SEP_ID: u32 = 102;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Stats {
    pub tokenizers_created: usize,
    pub tokenizers_released: usize,
    pub encodings_created: usize,
    pub encodings_released: usize,
    pub double_releases: usize,
    pub strings_created: usize,
    pub strings_released: usize,
    pub lists_created: usize,
    pub lists_released: usize,
    pub bulk_calls: usize,
    pub index_calls: usize,
}

impl Stats {
    pub(crate) fn balanced(&self) -> bool {
        self.tokenizers_created == self.tokenizers_released
            && self.encodings_created == self.encodings_released
            && self.strings_created == self.strings_released
            && self.lists_created == self.lists_released
            && self.double_releases == 0
    }
}

thread_local! {
    static STATS: Cell<Stats> = Cell::new(Stats::default());
}

fn bump(update: impl FnOnce(&mut Stats)) {
    STATS.with(|cell| {
        let mut stats = cell.get();
        update(&mut stats);
        cell.set(stats);
    });
}

pub(crate) fn stats() -> Stats {
    STATS.with(Cell::get)
}

pub(crate) fn reset() {
    STATS.with(|cell| cell.set(Stats::default()));
}

pub(crate) fn library() -> Arc<NativeLibrary> {
    library_with(BindingConfig::default())
}

pub(crate) fn library_with(config: BindingConfig) -> Arc<NativeLibrary> {
    NativeLibrary::from_functions(functions(), config)
}

pub(crate) fn functions() -> TokenizerFunctions {
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

struct FakeTokenizer {
    released: AtomicBool,
}

struct FakeEncoding {
    tokens: Vec<String>,
    ids: Vec<u32>,
    sequence_ids: Vec<Option<usize>>,
    attention_mask: Vec<u32>,
    reported_len: usize,
    released: AtomicBool,
}

/// Deterministic id for a non-special word
pub(crate) fn word_id(word: &str) -> u32 {
    1000 + word.bytes().map(u32::from).sum::<u32>()
}

fn build_encoding(text: &str, add_special_tokens: bool) -> FakeEncoding {
    let mut tokens = Vec::new();
    let mut ids = Vec::new();
    let mut sequence_ids = Vec::new();
    if add_special_tokens {
        tokens.push("[CLS]".to_string());
        ids.push(CLS_ID);
        sequence_ids.push(None);
    }
    for word in text.split_whitespace() {
        tokens.push(word.to_string());
        ids.push(word_id(word));
        sequence_ids.push(Some(0));
    }
    if add_special_tokens {
        tokens.push("[SEP]".to_string());
        ids.push(SEP_ID);
        sequence_ids.push(None);
    }
    let attention_mask = vec![1; tokens.len()];
    let reported_len = tokens.len() + usize::from(text.contains("<badlen>"));
    FakeEncoding {
        tokens,
        ids,
        sequence_ids,
        attention_mask,
        reported_len,
        released: AtomicBool::new(false),
    }
}

fn leak_encoding(encoding: FakeEncoding) -> RawHandle {
    bump(|s| s.encodings_created += 1);
    Box::into_raw(Box::new(encoding)) as RawHandle
}

fn leak_tokenizer() -> RawHandle {
    bump(|s| s.tokenizers_created += 1);
    Box::into_raw(Box::new(FakeTokenizer {
        released: AtomicBool::new(false),
    })) as RawHandle
}

/// Raw encoding handle holding `words` without special tokens
pub(crate) fn new_encoding_handle(words: &[&str]) -> RawHandle {
    leak_encoding(build_encoding(&words.join(" "), false))
}

pub(crate) fn alloc_string(text: &str) -> *mut c_char {
    track_string(CString::new(text.replace('\0', "")).unwrap_or_default())
}

pub(crate) fn track_string(string: CString) -> *mut c_char {
    bump(|s| s.strings_created += 1);
    string.into_raw()
}

fn fail<T>(default: T, message: &str) -> RawResult<T> {
    RawResult {
        value: default,
        error_msg: alloc_string(message),
    }
}

fn list<T>(values: Vec<T>) -> RawList {
    bump(|s| s.lists_created += 1);
    RawList::from_vec(values)
}

unsafe fn text_arg(ptr: *const c_char) -> String {
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

unsafe fn encoding<'a>(ptr: RawHandle) -> Option<&'a FakeEncoding> {
    (ptr as *const FakeEncoding).as_ref()
}

unsafe fn at<T: Copy + Default>(
    ptr: RawHandle,
    index: usize,
    field: fn(&FakeEncoding) -> &[T],
) -> RawResult<T> {
    bump(|s| s.index_calls += 1);
    match encoding(ptr) {
        None => fail(T::default(), "Nil encoding pointer."),
        Some(enc) => match field(enc).get(index) {
            Some(value) => RawResult::ok(*value),
            None => fail(T::default(), &format!("Index {index} out of range")),
        },
    }
}

unsafe extern "C" fn new_tokenizer_from_identifier(
    identifier: *const c_char,
) -> RawResult<RawHandle> {
    match text_arg(identifier).as_str() {
        "hello" => fail(
            ptr::null_mut(),
            "Model \"hello\" on the Hub doesn't have a tokenizer",
        ),
        "empty" => RawResult::ok(ptr::null_mut()),
        _ => RawResult::ok(leak_tokenizer()),
    }
}

unsafe extern "C" fn new_tokenizer_from_file(filename: *const c_char) -> RawResult<RawHandle> {
    if text_arg(filename).ends_with("missing.json") {
        return fail(ptr::null_mut(), "No such file or directory (os error 2)");
    }
    RawResult::ok(leak_tokenizer())
}

unsafe extern "C" fn new_tokenizer_from_bytes(
    _bytes: *const u8,
    length: usize,
) -> RawResult<RawHandle> {
    if length == 0 {
        return fail(ptr::null_mut(), "EOF while parsing a value at line 1 column 0");
    }
    RawResult::ok(leak_tokenizer())
}

unsafe extern "C" fn tokenizer_encode(
    handle: RawHandle,
    input: *const c_char,
    add_special_tokens: bool,
) -> RawResult<RawHandle> {
    if handle.is_null() {
        return fail(ptr::null_mut(), "Nil tokenizer pointer.");
    }
    let text = text_arg(input);
    if text.contains("<fail>") {
        return fail(ptr::null_mut(), "encode failed");
    }
    if text.contains("<empty>") {
        return RawResult::ok(ptr::null_mut());
    }
    RawResult::ok(leak_encoding(build_encoding(&text, add_special_tokens)))
}

unsafe extern "C" fn tokenizer_encode_batch(
    handle: RawHandle,
    inputs: *const *const c_char,
    count: usize,
    add_special_tokens: bool,
) -> RawResult<RawList> {
    if handle.is_null() {
        return fail(RawList::empty(), "Nil tokenizer pointer.");
    }
    let texts: Vec<String> = (0..count).map(|i| text_arg(*inputs.add(i))).collect();
    if texts.iter().any(|t| t.contains("<fail>")) {
        return fail(RawList::empty(), "encode failed");
    }
    let handles: Vec<RawHandle> = texts
        .iter()
        .filter(|t| t.as_str() != "<skip>")
        .map(|t| {
            if t == "<null-handle>" {
                ptr::null_mut()
            } else {
                leak_encoding(build_encoding(t, add_special_tokens))
            }
        })
        .collect();
    RawResult::ok(list(handles))
}

unsafe extern "C" fn tokenizer_decode(
    handle: RawHandle,
    ids: *const u32,
    count: usize,
    skip_special_tokens: bool,
) -> RawResult<*mut c_char> {
    if handle.is_null() {
        return fail(ptr::null_mut(), "Nil tokenizer pointer.");
    }
    let ids = if count == 0 { &[][..] } else { std::slice::from_raw_parts(ids, count) };
    let text = ids
        .iter()
        .filter(|id| !skip_special_tokens || (**id != CLS_ID && **id != SEP_ID))
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    RawResult::ok(alloc_string(&text))
}

unsafe extern "C" fn tokenizer_get_vocab_size(
    handle: RawHandle,
    with_added_tokens: bool,
) -> RawResult<usize> {
    if handle.is_null() {
        return fail(0, "Nil tokenizer pointer.");
    }
    RawResult::ok(if with_added_tokens { 44 } else { 42 })
}

unsafe extern "C" fn encoding_get_tokens(handle: RawHandle) -> RawResult<RawList> {
    bump(|s| s.bulk_calls += 1);
    let Some(enc) = encoding(handle) else {
        return fail(RawList::empty(), "Nil encoding pointer.");
    };
    let strings: Vec<*mut c_char> = enc
        .tokens
        .iter()
        .map(|t| if t == "<null>" { ptr::null_mut() } else { alloc_string(t) })
        .collect();
    RawResult::ok(list(strings))
}

unsafe extern "C" fn encoding_get_ids(handle: RawHandle) -> RawResult<RawList> {
    bump(|s| s.bulk_calls += 1);
    match encoding(handle) {
        None => fail(RawList::empty(), "Nil encoding pointer."),
        Some(enc) => RawResult::ok(list(enc.ids.clone())),
    }
}

unsafe extern "C" fn encoding_get_sequence_ids(handle: RawHandle) -> RawResult<RawList> {
    bump(|s| s.bulk_calls += 1);
    match encoding(handle) {
        None => fail(RawList::empty(), "Nil encoding pointer."),
        Some(enc) => RawResult::ok(list(
            enc.sequence_ids.iter().copied().map(encode_sequence_id).collect::<Vec<usize>>(),
        )),
    }
}

unsafe extern "C" fn encoding_get_attention_mask(handle: RawHandle) -> RawResult<RawList> {
    bump(|s| s.bulk_calls += 1);
    match encoding(handle) {
        None => fail(RawList::empty(), "Nil encoding pointer."),
        Some(enc) => RawResult::ok(list(enc.attention_mask.clone())),
    }
}

unsafe extern "C" fn encoding_get_token_at(
    handle: RawHandle,
    index: usize,
) -> RawResult<*mut c_char> {
    bump(|s| s.index_calls += 1);
    match encoding(handle) {
        None => fail(ptr::null_mut(), "Nil encoding pointer."),
        Some(enc) => match enc.tokens.get(index) {
            Some(token) if token == "<null>" => RawResult::ok(ptr::null_mut()),
            Some(token) => RawResult::ok(alloc_string(token)),
            None => fail(ptr::null_mut(), &format!("Index {index} out of range")),
        },
    }
}

unsafe extern "C" fn encoding_get_id_at(handle: RawHandle, index: usize) -> RawResult<u32> {
    at(handle, index, |enc| enc.ids.as_slice())
}

unsafe extern "C" fn encoding_get_sequence_id_at(
    handle: RawHandle,
    index: usize,
) -> RawResult<usize> {
    bump(|s| s.index_calls += 1);
    match encoding(handle) {
        None => fail(0, "Nil encoding pointer."),
        Some(enc) => match enc.sequence_ids.get(index) {
            Some(id) => RawResult::ok(encode_sequence_id(*id)),
            None => fail(0, &format!("Index {index} out of range")),
        },
    }
}

unsafe extern "C" fn encoding_get_attention_mask_at(
    handle: RawHandle,
    index: usize,
) -> RawResult<u32> {
    at(handle, index, |enc| enc.attention_mask.as_slice())
}

unsafe extern "C" fn encoding_get_len(handle: RawHandle) -> RawResult<usize> {
    match encoding(handle) {
        None => fail(0, "Nil encoding pointer."),
        Some(enc) => RawResult::ok(enc.reported_len),
    }
}

unsafe extern "C" fn encoding_eq(handle: RawHandle, other: RawHandle) -> RawResult<bool> {
    match (encoding(handle), encoding(other)) {
        (Some(a), Some(b)) => RawResult::ok(a.tokens == b.tokens && a.ids == b.ids),
        _ => fail(false, "Nil encoding pointer."),
    }
}

unsafe extern "C" fn release_tokenizer(handle: RawHandle) {
    if let Some(tokenizer) = (handle as *const FakeTokenizer).as_ref() {
        if tokenizer.released.swap(true, Ordering::SeqCst) {
            bump(|s| s.double_releases += 1);
        } else {
            bump(|s| s.tokenizers_released += 1);
        }
    }
}

unsafe extern "C" fn release_encoding(handle: RawHandle) {
    if let Some(enc) = encoding(handle) {
        if enc.released.swap(true, Ordering::SeqCst) {
            bump(|s| s.double_releases += 1);
        } else {
            bump(|s| s.encodings_released += 1);
        }
    }
}

unsafe extern "C" fn release_list(list: RawList, size: usize, align: usize) {
    bump(|s| s.lists_released += 1);
    if let Err(err) = list.dealloc(size, align) {
        log::error!("release_list called with invalid layout ({size}, {align}): {err}");
    }
}

unsafe extern "C" fn release_string(string: *mut c_char) {
    if !string.is_null() {
        bump(|s| s.strings_released += 1);
        drop(CString::from_raw(string));
    }
}
