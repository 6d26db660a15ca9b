//! Error types for the Thunder IR.

/// Errors raised while building, analyzing or persisting IR.
///
/// All variants are fatal for the request that produced them: there is no
/// partial output once one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// An index does not resolve, an atom of the wrong kind sits where a
    /// specific kind is required, or a field chain is malformed.
    ///
    /// `dump` carries the assembly listing of the offending buffer.
    #[error("structural error: {message}\n{dump}")]
    Structural { message: String, dump: String },

    /// No overload of an operator or intrinsic accepts the argument types.
    #[error(
        "no overload of `{target}` accepts ({attempted}); candidates:\n{}",
        candidates.join("\n")
    )]
    OverloadResolution {
        target: String,
        attempted: String,
        candidates: Vec<String>,
    },

    /// A persisted function stream is malformed.
    #[error("malformed function stream: {0}")]
    Stream(String),

    /// Reading or writing a persisted stream failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IrError {
    /// Structural error without an attached listing.
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural {
            message: message.into(),
            dump: String::new(),
        }
    }
}
