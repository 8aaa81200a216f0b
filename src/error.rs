// ============================================================================
// ERROR TAXONOMY — every failure a user action can surface
// ============================================================================
//
// All errors are recovered at the operation boundary (load / apply / export)
// and turned into a user-visible message; nothing propagates past the CLI
// top level. There are no automatic retries anywhere — every failure requires
// a new user-initiated action.

use std::fmt;

/// Crate-wide error type.
#[derive(Debug)]
pub enum SignError {
    /// Bad or missing sign-catalog configuration.
    Config(String),
    /// Contract call failure.
    Chain(ChainError),
    /// Metadata / image / upload transport failure.
    Network(NetworkError),
    /// Fetched image bytes failed to decode.
    Decode(String),
    /// The output surface received cross-origin pixel data without permission;
    /// pixel readback and export are blocked. In-memory overlay state is intact.
    TaintedSurface,
    /// Encode / download / upload failure.
    Export(String),
    /// Missing or invalid user input (non-numeric token id, non-PNG sign, …).
    Validation(String),
    /// Another load / apply / export is already in flight; the new invocation
    /// is refused, not queued.
    Busy(&'static str),
}

/// Contract-call failures, split so "no such token" gets its own message.
#[derive(Debug)]
pub enum ChainError {
    /// The call reverted — the token id does not exist in this collection.
    TokenMissing { collection: String, token_id: u64 },
    /// Any other RPC-level failure.
    Rpc(String),
}

/// Transport failures, with timeout as a distinct subkind.
#[derive(Debug)]
pub enum NetworkError {
    /// The bounded request timeout elapsed; the in-flight request was cancelled.
    Timeout(String),
    /// Non-success HTTP status.
    Http { status: u16, url: String },
    /// Connection / IO level failure.
    Io(String),
}

impl fmt::Display for SignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignError::Config(msg) => write!(f, "sign config error: {}", msg),
            SignError::Chain(e) => write!(f, "chain error: {}", e),
            SignError::Network(e) => write!(f, "network error: {}", e),
            SignError::Decode(msg) => write!(f, "image decode error: {}", msg),
            SignError::TaintedSurface => write!(
                f,
                "canvas is tainted by cross-origin image data; export is blocked"
            ),
            SignError::Export(msg) => write!(f, "export error: {}", msg),
            SignError::Validation(msg) => write!(f, "invalid input: {}", msg),
            SignError::Busy(op) => write!(f, "{} is already in progress", op),
        }
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::TokenMissing {
                collection,
                token_id,
            } => write!(f, "token #{} does not exist in {}", token_id, collection),
            ChainError::Rpc(msg) => write!(f, "RPC call failed: {}", msg),
        }
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::Timeout(url) => write!(f, "request timed out: {}", url),
            NetworkError::Http { status, url } => write!(f, "HTTP {} from {}", status, url),
            NetworkError::Io(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SignError {}

impl From<ChainError> for SignError {
    fn from(e: ChainError) -> Self {
        SignError::Chain(e)
    }
}

impl From<NetworkError> for SignError {
    fn from(e: NetworkError) -> Self {
        SignError::Network(e)
    }
}

impl From<image::ImageError> for SignError {
    fn from(e: image::ImageError) -> Self {
        SignError::Decode(e.to_string())
    }
}

/// Map a `ureq` transport/status error onto the taxonomy, keeping timeouts
/// distinguishable from other transport failures.
pub fn from_ureq(e: ureq::Error, url: &str) -> SignError {
    match e {
        ureq::Error::Status(status, _) => SignError::Network(NetworkError::Http {
            status,
            url: url.to_string(),
        }),
        ureq::Error::Transport(t) => {
            let msg = t.to_string();
            if msg.contains("timed out") || msg.contains("timeout") {
                SignError::Network(NetworkError::Timeout(url.to_string()))
            } else {
                SignError::Network(NetworkError::Io(msg))
            }
        }
    }
}
