//! Error types for the connection layer.

use skylink_protocol::ProtocolError;
use skylink_transport::TransportError;

use crate::ConnectionState;

/// Why [`ConnectionManager::send`](crate::ConnectionManager::send) did
/// not send anything.
///
/// Sends are never queued: on error the envelope is gone and retrying is
/// up to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The link is not `Connected`. No transport call was made.
    #[error("not connected (state: {0})")]
    NotConnected(ConnectionState),

    /// The envelope could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport refused the frame.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
