/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed (or never finished opening).
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Opening a connection failed before any I/O happened.
    #[error("open failed: {0}")]
    OpenFailed(String),

    /// Handing a frame to the connection failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// No async runtime was available to drive the connection.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),
}
