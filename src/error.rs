// Error kinds for the per-connection pipeline. Every variant is recovered
// at the connection boundary: a single failing connection never brings
// down another.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("malformed request")]
    MalformedRequest,

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(#[source] io::Error),

    #[error("failed to write request to upstream: {0}")]
    UpstreamWriteFailed(#[source] io::Error),

    #[error("failed to read response from upstream: {0}")]
    UpstreamReadFailed(#[source] io::Error),

    #[error("failed to write response to client: {0}")]
    ClientWriteFailed(#[source] io::Error),
}

impl ProxyError {
    // HTTP status this error maps to when a response can still reach the
    // client. None means the connection is simply abandoned.
    pub fn client_status(&self) -> Option<(u16, &'static str, &'static str)> {
        match self {
            ProxyError::MalformedRequest => {
                Some((400, "Bad Request", "Received a malformed request"))
            }
            ProxyError::UnsupportedMethod(_) => {
                Some((501, "Not Implemented", "Server does not support this method"))
            }
            ProxyError::UpstreamWriteFailed(_) => {
                Some((500, "Server Error", "Cannot write to server"))
            }
            ProxyError::UpstreamUnreachable(_)
            | ProxyError::UpstreamReadFailed(_)
            | ProxyError::ClientWriteFailed(_) => None,
        }
    }
}
