use cloudplay_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the local socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Accepting the producer connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The stream kept failing to read; the last error is attached.
    #[error("receive failed after {attempts} consecutive errors: {source}")]
    ReceiveFailed {
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// The byte stream broke the record contract.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
