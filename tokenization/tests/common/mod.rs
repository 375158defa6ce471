//! Shared fixtures for the integration tests
//!
//! A small cased WordPiece tokenizer whose ids follow bert-base-cased for the
//! words used in the tests, so no model download is needed.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokenbridge_tokenization::{BindingConfig, NativeLibrary, Tokenizer};

pub const TOKENIZER_JSON: &str = r###"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [
    {"id": 0, "content": "[PAD]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 100, "content": "[UNK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 101, "content": "[CLS]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 102, "content": "[SEP]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 103, "content": "[MASK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
  ],
  "normalizer": {
    "type": "BertNormalizer",
    "clean_text": true,
    "handle_chinese_chars": true,
    "strip_accents": null,
    "lowercase": false
  },
  "pre_tokenizer": {
    "type": "BertPreTokenizer"
  },
  "post_processor": {
    "type": "TemplateProcessing",
    "single": [
      {"SpecialToken": {"id": "[CLS]", "type_id": 0}},
      {"Sequence": {"id": "A", "type_id": 0}},
      {"SpecialToken": {"id": "[SEP]", "type_id": 0}}
    ],
    "pair": [
      {"SpecialToken": {"id": "[CLS]", "type_id": 0}},
      {"Sequence": {"id": "A", "type_id": 0}},
      {"SpecialToken": {"id": "[SEP]", "type_id": 0}},
      {"Sequence": {"id": "B", "type_id": 1}},
      {"SpecialToken": {"id": "[SEP]", "type_id": 1}}
    ],
    "special_tokens": {
      "[CLS]": {"id": "[CLS]", "ids": [101], "tokens": ["[CLS]"]},
      "[SEP]": {"id": "[SEP]", "ids": [102], "tokens": ["[SEP]"]}
    }
  },
  "decoder": {
    "type": "WordPiece",
    "prefix": "##",
    "cleanup": true
  },
  "model": {
    "type": "WordPiece",
    "unk_token": "[UNK]",
    "continuing_subword_prefix": "##",
    "max_input_chars_per_word": 100,
    "vocab": {
      "[PAD]": 0,
      "[UNK]": 100,
      "[CLS]": 101,
      "[SEP]": 102,
      "[MASK]": 103,
      "!": 106,
      "'": 112,
      ".": 119,
      "?": 136,
      "s": 188,
      "there": 1175,
      "good": 1363,
      "What": 1327,
      "¡": 1096,
      "##la": 1742,
      "##ut": 3818,
      "Hey": 4403,
      "ho": 16358,
      "Sal": 25203
    }
  }
}"###;

/// Entries in the fixture's model vocabulary
pub const VOCAB_SIZE: usize = 19;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Write the fixture to a temp dir; keep the `TempDir` alive while the path is used
pub fn create_test_tokenizer() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let tokenizer_path = temp_dir.path().join("tokenizer.json");
    std::fs::write(&tokenizer_path, TOKENIZER_JSON).expect("Failed to write tokenizer.json");
    (temp_dir, tokenizer_path)
}

/// The native crate linked statically, default config
pub fn library() -> Arc<NativeLibrary> {
    library_with(BindingConfig::default())
}

pub fn library_with(config: BindingConfig) -> Arc<NativeLibrary> {
    init_logging();
    NativeLibrary::from_functions(tokenbridge_native::functions(), config)
}

pub fn tokenizer(library: &Arc<NativeLibrary>) -> Tokenizer {
    Tokenizer::from_bytes(library, TOKENIZER_JSON.as_bytes()).expect("fixture tokenizer loads")
}
