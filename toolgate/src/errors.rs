//! Gateway error type.
//!
//! Only protocol-level failures travel as `Err`: malformed envelopes, unknown
//! tool names, schema-invalid arguments, transport breakage. Operational tool
//! failures (file not found, pattern not found, dead child provider) are
//! reported as ordinary text results so the client sees one response shape.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Internal(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
