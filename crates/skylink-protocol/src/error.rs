//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding envelopes.
///
/// A frame that fails to decode is dropped by the layers above and
/// reported on the diagnostics channel; it never reaches a listener.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON, or a field has the wrong shape.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The frame is JSON but has no non-empty string `type` field.
    #[error("frame has no `type` field")]
    MissingType,

    /// Serialization failed (turning an envelope into a frame).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}
