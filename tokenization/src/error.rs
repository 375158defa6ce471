use thiserror::Error;

pub type Result<T> = std::result::Result<T, BindingError>;

#[derive(Error, Debug)]
pub enum BindingError {
    /// Failure reported by the native library, message passed through verbatim.
    #[error("{0}")]
    Native(String),

    #[error("Native call `{operation}` returned neither a value nor an error")]
    EmptyResult { operation: &'static str },

    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Native list length {actual} does not match expected length {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Native list contains a null element at index {index}")]
    NullElement { index: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to load native library: {0}")]
    LibraryLoad(String),

    #[error("Missing native symbol: {0}")]
    MissingSymbol(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BindingError {
    /// True when the native side broke the boundary contract rather than
    /// reporting an ordinary failure.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::EmptyResult { .. } | Self::LengthMismatch { .. } | Self::NullElement { .. }
        )
    }

    /// The native error message, if this is a native failure.
    pub fn native_message(&self) -> Option<&str> {
        match self {
            Self::Native(message) => Some(message),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for BindingError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
