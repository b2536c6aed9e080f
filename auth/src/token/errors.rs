use thiserror::Error;

/// Error type for token generation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenGeneratorError {
    #[error("Invalid code length: must be between 1 and {max} digits, got {actual}")]
    InvalidCodeLength { max: u32, actual: u32 },
}
