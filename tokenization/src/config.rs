//! Binding configuration
//!
//! Where to find the native library, how encoding fields are fetched across
//! the boundary, and the special-token defaults for `encode_default` /
//! `encode_batch_default`.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};

pub const ENV_LIBRARY_DIR: &str = "TOKENBRIDGE_LIBRARY_DIR";
pub const ENV_LIBRARY_NAME: &str = "TOKENBRIDGE_LIBRARY_NAME";
pub const ENV_FETCH: &str = "TOKENBRIDGE_FETCH";

/// How an encoding's derived sequences are read from the native side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// One native call copies the whole list, which is then released
    #[default]
    Bulk,
    /// One native call per element, on first read of that element
    PerIndex,
}

impl FetchStrategy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bulk" => Some(Self::Bulk),
            "per_index" | "per-index" | "index" => Some(Self::PerIndex),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindingConfig {
    /// Directory containing the native shared library (None = system search path)
    pub library_dir: Option<PathBuf>,

    /// File name override for the native shared library
    pub library_name: Option<String>,

    pub fetch: FetchStrategy,

    /// Default for single-text encodes
    pub add_special_tokens: bool,

    /// Default for batch encodes
    pub batch_add_special_tokens: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            library_dir: None,
            library_name: None,
            fetch: FetchStrategy::Bulk,
            add_special_tokens: true,
            batch_add_special_tokens: false,
        }
    }
}

impl BindingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.library_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_library_name(mut self, name: impl Into<String>) -> Self {
        self.library_name = Some(name.into());
        self
    }

    pub fn with_fetch(mut self, fetch: FetchStrategy) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_special_token_defaults(mut self, single: bool, batch: bool) -> Self {
        self.add_special_tokens = single;
        self.batch_add_special_tokens = batch;
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Defaults overridden by `TOKENBRIDGE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_LIBRARY_DIR).filter(|v| !v.is_empty()) {
            self.library_dir = Some(PathBuf::from(dir));
        }
        if let Some(name) = lookup(ENV_LIBRARY_NAME).filter(|v| !v.is_empty()) {
            self.library_name = Some(name);
        }
        if let Some(fetch) = lookup(ENV_FETCH) {
            self.fetch = FetchStrategy::parse(&fetch).ok_or_else(|| {
                let message = format!("{ENV_FETCH}: unknown fetch strategy `{fetch}`");
                crate::BindingError::Config(message)
            })?;
        }
        Ok(self)
    }

    /// Full path (or bare file name) of the native library to load
    pub fn resolved_library_path(&self) -> PathBuf {
        let name = self
            .library_name
            .clone()
            .unwrap_or_else(native_library_file_name);
        match &self.library_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }
}

/// Platform file name of the native library (`libtokenbridge_native.so`, ...)
pub fn native_library_file_name() -> String {
    format!("{DLL_PREFIX}tokenbridge_native{DLL_SUFFIX}")
}
