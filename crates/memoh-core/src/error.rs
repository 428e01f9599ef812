use thiserror::Error;

/// Error taxonomy for the conversation gateway core.
///
/// Mirrors the `Kind` column of the error-handling design: each variant maps
/// 1:1 to a recovery/propagation policy the resolver and adapters apply.
#[derive(Debug, Error)]
pub enum MemohError {
    /// Missing required fields, unknown model/provider, malformed request.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Agent gateway returned a non-2xx response.
    #[error("gateway error: {0}")]
    Gateway(String),

    /// The gateway's JSON body did not match any recognized envelope shape.
    #[error("gateway response parse error: {0}")]
    GatewayParse(String),

    /// SSE decode failed (oversized line, invalid framing).
    #[error("stream decode error: {0}")]
    StreamDecode(String),

    /// Platform rate-limited a send/edit call.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Network-level or 5xx failure that the core does not retry itself.
    #[error("transient error: {0}")]
    Transient(String),

    /// Attachment/platform send failure — logged, never fatal to the round.
    #[error("platform error: {0}")]
    Platform(String),

    /// Storage write failed — degrades persistence, does not abort delivery.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MemohError {
    /// Stable short code, analogous to `SkynetError::code`, usable in
    /// client-facing JSON error bodies and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            MemohError::Validation(_) => "FAIL_VALIDATION",
            MemohError::Gateway(_) => "FAIL_GATEWAY",
            MemohError::GatewayParse(_) => "FAIL_GATEWAY_PARSE",
            MemohError::StreamDecode(_) => "FAIL_STREAM_DECODE",
            MemohError::RateLimited { .. } => "FAIL_RATE_LIMITED",
            MemohError::Transient(_) => "FAIL_TRANSIENT",
            MemohError::Platform(_) => "FAIL_PLATFORM",
            MemohError::Storage(_) => "FAIL_STORAGE",
            MemohError::Config(_) => "CONFIG_ERROR",
            MemohError::Serialization(_) => "SERIALIZATION_ERROR",
            MemohError::Io(_) => "IO_ERROR",
            MemohError::Http(_) => "HTTP_ERROR",
            MemohError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, MemohError>;
