use thiserror::Error;

/// Errors produced by priority tree operations.
///
/// Every operation validates its inputs before touching any state, so a
/// returned error means the tree is exactly as it was before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// A stream with this ID is already in the tree.
    #[error("stream {0} is already in the tree")]
    DuplicateStream(u32),

    /// The named stream is not in the tree.
    #[error("stream {0} is not in the tree")]
    MissingStream(u32),

    /// The tree is at its configured stream limit.
    #[error("tree is full ({0} streams)")]
    TooManyStreams(usize),

    /// Stream weight outside the valid range 1..=256.
    #[error("weight {0} is outside 1..=256")]
    BadWeight(u16),

    /// Attempt to insert or modify stream 0, the connection pseudo-stream.
    #[error("stream 0 is reserved and cannot be modified")]
    PseudoStream,

    /// A stream may not depend on itself.
    #[error("stream {0} cannot depend on itself")]
    PriorityLoop(u32),

    /// `maximum_streams` must be at least 1.
    #[error("maximum_streams must be at least 1")]
    BadTreeConfig,

    /// No stream is active, so none can be scheduled. Unblocking a stream
    /// makes scheduling valid again.
    #[error("no active streams to schedule")]
    Deadlock,
}
