//! Ownership-tracking bindings over the tokenbridge native tokenizer library
//!
//! Tokenization itself happens in native code reached through a C entry-point
//! table. This crate turns that table into safe types: every native handle has
//! exactly one owner that releases it once, native errors become
//! [`BindingError`]s without leaking their message buffers, and encoding fields
//! are read lazily through [`LazyIndexedView`]s.
//!
//! ```no_run
//! use tokenbridge_tokenization::{BindingConfig, NativeLibrary, Tokenizer};
//!
//! let library = NativeLibrary::load(BindingConfig::from_env()?)?;
//! let tokenizer = Tokenizer::from_file(&library, "tokenizer.json")?;
//! let encoding = tokenizer.encode("Hey there!", true)?;
//! println!("{:?}", encoding.ids()?.to_vec()?);
//! # Ok::<(), tokenbridge_tokenization::BindingError>(())
//! ```

pub mod config;
pub mod error;

mod encoding;
mod envelope;
mod handle;
mod lazy;
mod library;
mod owner;
mod tokenizer;
mod view;

#[cfg(test)]
mod fake_native;

pub use config::{native_library_file_name, BindingConfig, FetchStrategy};
pub use encoding::{Encoding, EncodingSnapshot};
pub use error::{BindingError, Result};
pub use library::NativeLibrary;
pub use tokenizer::Tokenizer;
pub use view::LazyIndexedView;
