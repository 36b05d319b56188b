use thiserror::Error;

/// Application-level failures reported inside an otherwise successful HTTP
/// response. Transport failures stay as `anyhow` errors with context.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The Ecowitt cloud envelope carried `code != 0`.
    #[error("Ecowitt API error: code={code}, msg={msg}")]
    Ecowitt { code: i64, msg: String },

    /// Open-Meteo answered with `{"error": true, "reason": ...}`.
    #[error("Open-Meteo API error: {reason}")]
    OpenMeteo { reason: String },
}
