use crate::encoding::{take_handle_list, Encoding};
use crate::envelope;
use crate::error::{BindingError, Result};
use crate::handle::{HandleKind, NativeHandle};
use crate::library::NativeLibrary;
use crate::owner::ResourceOwner;
use std::ffi::{c_char, CString};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokenbridge_abi::{RawHandle, RawResult};

/// A native tokenizer.
///
/// Immutable once built. The native tokenizer is released on [`Tokenizer::close`]
/// or when the value is dropped.
pub struct Tokenizer {
    owner: ResourceOwner,
}

fn c_string(value: &str, what: &str) -> Result<CString> {
    CString::new(value).map_err(|e| {
        BindingError::InvalidInput(format!(
            "{} contains a NUL byte at position {}",
            what,
            e.nul_position()
        ))
    })
}

impl Tokenizer {
    /// Resolve a named tokenizer through the native library (e.g. a hub model id)
    pub fn from_identifier(library: &Arc<NativeLibrary>, identifier: &str) -> Result<Self> {
        let identifier = c_string(identifier, "identifier")?;
        let raw =
            unsafe { (library.functions().new_tokenizer_from_identifier)(identifier.as_ptr()) };
        Self::from_raw(library, raw, "new_tokenizer_from_identifier")
    }

    /// Load a serialized tokenizer definition (`tokenizer.json`) from disk
    pub fn from_file<P: AsRef<Path>>(library: &Arc<NativeLibrary>, path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_str().ok_or_else(|| {
            BindingError::InvalidInput(format!("path is not valid UTF-8: {}", path.display()))
        })?;
        let filename = c_string(path_str, "path")?;
        let raw = unsafe { (library.functions().new_tokenizer_from_file)(filename.as_ptr()) };
        Self::from_raw(library, raw, "new_tokenizer_from_file")
    }

    /// Load a serialized tokenizer definition from memory
    pub fn from_bytes(library: &Arc<NativeLibrary>, bytes: &[u8]) -> Result<Self> {
        let raw =
            unsafe { (library.functions().new_tokenizer_from_bytes)(bytes.as_ptr(), bytes.len()) };
        Self::from_raw(library, raw, "new_tokenizer_from_bytes")
    }

    fn from_raw(
        library: &Arc<NativeLibrary>,
        raw: RawResult<RawHandle>,
        operation: &'static str,
    ) -> Result<Self> {
        let handle = envelope::decode_handle(library, raw, operation)?;
        Ok(Self {
            owner: ResourceOwner::for_kind(library.clone(), handle, HandleKind::Tokenizer),
        })
    }

    fn handle(&self) -> NativeHandle {
        self.owner.handle()
    }

    fn library(&self) -> &Arc<NativeLibrary> {
        self.owner.library()
    }

    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Encoding> {
        let input = c_string(text, "text")?;
        let raw = unsafe {
            (self.library().functions().tokenizer_encode)(
                self.handle().as_raw(),
                input.as_ptr(),
                add_special_tokens,
            )
        };
        let handle = envelope::decode_handle(self.library(), raw, "tokenizer_encode")?;
        Encoding::from_handle(self.library().clone(), handle)
    }

    /// Encode with the configured single-text default (special tokens on unless
    /// configured otherwise)
    pub fn encode_default(&self, text: &str) -> Result<Encoding> {
        self.encode(text, self.library().config().add_special_tokens)
    }

    /// Encode many texts in one native call. Output order matches input order.
    pub fn encode_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        add_special_tokens: bool,
    ) -> Result<Vec<Encoding>> {
        let inputs = texts
            .iter()
            .enumerate()
            .map(|(i, text)| c_string(text.as_ref(), &format!("text {i}")))
            .collect::<Result<Vec<_>>>()?;
        let pointers: Vec<*const c_char> = inputs.iter().map(|s| s.as_ptr()).collect();

        let library = self.library();
        let raw = unsafe {
            (library.functions().tokenizer_encode_batch)(
                self.handle().as_raw(),
                pointers.as_ptr(),
                pointers.len(),
                add_special_tokens,
            )
        };
        let list = envelope::decode_list(library, raw, "tokenizer_encode_batch")?;

        // Own every handle before validating, so nothing leaks on error
        let owners: Vec<Option<ResourceOwner>> = take_handle_list(library, list)
            .into_iter()
            .map(|handle| {
                handle.map(|h| ResourceOwner::for_kind(library.clone(), h, HandleKind::Encoding))
            })
            .collect();

        if owners.len() != texts.len() {
            log::error!(
                "Native contract violation: batch of {} texts returned {} encodings",
                texts.len(),
                owners.len()
            );
            return Err(BindingError::LengthMismatch {
                expected: texts.len(),
                actual: owners.len(),
            });
        }
        if let Some(index) = owners.iter().position(Option::is_none) {
            log::error!("Native contract violation: null encoding at batch index {}", index);
            return Err(BindingError::NullElement { index });
        }

        owners
            .into_iter()
            .flatten()
            .map(Encoding::from_owner)
            .collect()
    }

    /// Batch encode with the configured batch default (special tokens off unless
    /// configured otherwise)
    pub fn encode_batch_default<S: AsRef<str>>(&self, texts: &[S]) -> Result<Vec<Encoding>> {
        self.encode_batch(texts, self.library().config().batch_add_special_tokens)
    }

    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        let raw = unsafe {
            (self.library().functions().tokenizer_decode)(
                self.handle().as_raw(),
                ids.as_ptr(),
                ids.len(),
                skip_special_tokens,
            )
        };
        envelope::decode_string(self.library(), raw, "tokenizer_decode")
    }

    pub fn vocab_size(&self, with_added_tokens: bool) -> Result<usize> {
        let raw = unsafe {
            (self.library().functions().tokenizer_get_vocab_size)(
                self.handle().as_raw(),
                with_added_tokens,
            )
        };
        envelope::decode(self.library(), raw)
    }

    /// Release the native tokenizer now. Encodings already produced stay valid.
    pub fn close(self) {
        self.owner.release();
    }
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("handle", &self.handle())
            .field("library", &self.library().origin())
            .finish()
    }
}
