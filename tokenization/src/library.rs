//! Native library loading
//!
//! Resolves the tokenbridge entry-point table either from a shared library on
//! disk (via `libloading`) or from a statically linked native crate.

use crate::config::BindingConfig;
use crate::error::{BindingError, Result};
use libloading::{Library, Symbol};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenbridge_abi::TokenizerFunctions;

/// A loaded native library and its entry-point table.
///
/// Every tokenizer and encoding holds an `Arc` to the library it came from, so
/// the shared object stays mapped until the last native handle is released.
pub struct NativeLibrary {
    functions: TokenizerFunctions,
    config: BindingConfig,
    origin: Option<PathBuf>,
    // Dropped last: function pointers above point into this mapping
    _library: Option<Library>,
}

impl NativeLibrary {
    /// Load the library at `config.resolved_library_path()`
    pub fn load(config: BindingConfig) -> Result<Arc<Self>> {
        let path = config.resolved_library_path();
        Self::load_from(path, config)
    }

    /// Load the library at an explicit path
    pub fn load_from<P: AsRef<Path>>(library_path: P, config: BindingConfig) -> Result<Arc<Self>> {
        let library_path = library_path.as_ref();

        // SAFETY: loading runs the library's initializers; the tokenbridge
        // native library has none beyond Rust's runtime setup.
        let library = unsafe {
            Library::new(library_path).map_err(|e| {
                let path = library_path.display();
                BindingError::LibraryLoad(format!("Failed to load {path}: {e}"))
            })?
        };

        let functions = Self::load_functions(&library)?;

        log::info!("Loaded native tokenizer library: {}", library_path.display());

        Ok(Arc::new(Self {
            functions,
            config,
            origin: Some(library_path.to_path_buf()),
            _library: Some(library),
        }))
    }

    /// Wrap an entry-point table from a statically linked native crate
    pub fn from_functions(functions: TokenizerFunctions, config: BindingConfig) -> Arc<Self> {
        log::debug!("Using statically linked native tokenizer functions");
        Arc::new(Self {
            functions,
            config,
            origin: None,
            _library: None,
        })
    }

    fn load_functions(library: &Library) -> Result<TokenizerFunctions> {
        // SAFETY: every symbol is declared with the signature the native crate
        // exports it with (see tokenbridge-abi); the pointers stay valid while
        // `library` is held by the returned NativeLibrary.
        unsafe {
            Ok(TokenizerFunctions {
                new_tokenizer_from_identifier: symbol(library, b"new_tokenizer_from_identifier\0")?,
                new_tokenizer_from_file: symbol(library, b"new_tokenizer_from_file\0")?,
                new_tokenizer_from_bytes: symbol(library, b"new_tokenizer_from_bytes\0")?,
                tokenizer_encode: symbol(library, b"tokenizer_encode\0")?,
                tokenizer_encode_batch: symbol(library, b"tokenizer_encode_batch\0")?,
                tokenizer_decode: symbol(library, b"tokenizer_decode\0")?,
                tokenizer_get_vocab_size: symbol(library, b"tokenizer_get_vocab_size\0")?,
                encoding_get_tokens: symbol(library, b"encoding_get_tokens\0")?,
                encoding_get_ids: symbol(library, b"encoding_get_ids\0")?,
                encoding_get_sequence_ids: symbol(library, b"encoding_get_sequence_ids\0")?,
                encoding_get_attention_mask: symbol(library, b"encoding_get_attention_mask\0")?,
                encoding_get_token_at: symbol(library, b"encoding_get_token_at\0")?,
                encoding_get_id_at: symbol(library, b"encoding_get_id_at\0")?,
                encoding_get_sequence_id_at: symbol(library, b"encoding_get_sequence_id_at\0")?,
                encoding_get_attention_mask_at: symbol(
                    library,
                    b"encoding_get_attention_mask_at\0",
                )?,
                encoding_get_len: symbol(library, b"encoding_get_len\0")?,
                encoding_eq: symbol(library, b"encoding_eq\0")?,
                release_tokenizer: symbol(library, b"release_tokenizer\0")?,
                release_encoding: symbol(library, b"release_encoding\0")?,
                release_list: symbol(library, b"release_list\0")?,
                release_string: symbol(library, b"release_string\0")?,
            })
        }
    }

    pub(crate) fn functions(&self) -> &TokenizerFunctions {
        &self.functions
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// Path the library was loaded from, `None` when statically linked
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("origin", &self.origin)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

unsafe fn symbol<T: Copy>(library: &Library, name: &[u8]) -> Result<T> {
    let symbol: Symbol<T> = library.get(name).map_err(|e| {
        let name = String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name)).into_owned();
        BindingError::MissingSymbol(format!("{}: {}", name, e))
    })?;
    Ok(*symbol)
}
