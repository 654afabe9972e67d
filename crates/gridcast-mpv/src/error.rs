//! Error types for decoder operations

use thiserror::Error;

/// Errors surfaced by a decoder backend or handle
///
/// Every failing call is also logged by the adapter with the call name,
/// arguments, and the decoder's error text; the error value carries the
/// same fields for callers that match on them.
#[derive(Error, Debug)]
pub enum DecoderError {
    /// The decoder refused to create a handle
    ///
    /// libmpv returns a null context when allocation fails or the process
    /// environment is unusable (wrong locale, missing config home).
    #[error("decoder handle creation failed")]
    Create,

    /// A call on an existing handle failed
    #[error("{call}({args}) failed: {message} (code {code})")]
    Call {
        /// Decoder API entry point that failed
        call: &'static str,
        /// Rendered arguments, for the log record
        args: String,
        /// Raw error code from the decoder
        code: i32,
        /// The decoder's own description of the error
        message: String,
    },
}

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecoderError>;
