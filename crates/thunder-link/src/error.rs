use thunder_ir::{CallableId, Index, IrError};

/// Errors raised while linking functions into a unit.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The call graph contains a cycle through the named functions.
    #[error("call graph cycle through {}", functions.join(", "))]
    Cycle { functions: Vec<String> },

    /// A struct type used by a function was never registered.
    #[error("function {function} uses struct at {index} with no registered aggregate")]
    MissingAggregate { function: CallableId, index: Index },

    /// A call targets an id the context does not know.
    #[error("call to unknown callable ${0}")]
    UnknownCallable(CallableId),

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
